//! HTML pages served by the download side
//!
//! Pages are small enough to build as strings. Every value that comes from
//! a sender (names, avatar URLs, file names) goes through [`escape_html`].

use trisend_common::TransferMetadata;
use trisend_common::time::format_remaining;

use crate::transfers::TransferFailure;

/// Escape text for use in HTML content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{} - trisend</title>\n\
         </head>\n\
         <body>\n\
         <main>\n{}\n</main>\n\
         </body>\n\
         </html>\n",
        escape_html(title),
        body
    )
}

/// Home page explaining how to send
pub fn index_page(ssh_target: &str) -> String {
    let host = escape_html(ssh_target);
    // sftp spells the port flag in upper case
    let sftp_host = escape_html(&ssh_target.replacen("-p ", "-P ", 1));
    let body = format!(
        "<h1>trisend</h1>\n\
         <p>Send a file over SSH and get a one-time download link.</p>\n\
         <pre>ssh {host} &lt;filename&gt; &lt; &lt;filepath&gt;</pre>\n\
         <p>Or upload several files and folders at once:</p>\n\
         <pre>sftp {sftp_host}\nsftp&gt; put -r &lt;folder&gt;</pre>\n\
         <p>Nothing is stored: the sender waits until someone opens the link.</p>"
    );
    layout("Send files over SSH", &body)
}

/// Page for an unknown, expired or already downloaded transfer
pub fn not_found_page() -> String {
    layout(
        "Not found",
        "<h1>Transfer not found</h1>\n\
         <p>This link has expired or the file was already downloaded.</p>",
    )
}

/// Landing page of a waiting transfer
pub fn landing_page(metadata: &TransferMetadata, direct_url: &str) -> String {
    let avatar = if metadata.owner_avatar.is_empty() {
        String::new()
    } else {
        format!(
            "<img src=\"{}\" alt=\"\" width=\"48\" height=\"48\">\n",
            escape_html(&metadata.owner_avatar)
        )
    };
    let body = format!(
        "{avatar}<h1>{owner} is sending you a file</h1>\n\
         <p><strong>{filename}</strong></p>\n\
         <p>This link expires in {remaining}.</p>\n\
         <p><a href=\"{url}\" download>Download</a></p>",
        owner = escape_html(&metadata.owner_display_name),
        filename = escape_html(&metadata.archive_filename()),
        remaining = format_remaining(metadata.remaining()),
        url = escape_html(direct_url),
    );
    layout(&metadata.archive_filename(), &body)
}

/// Page shown when the upload failed before any byte was sent
pub fn failure_page(failure: &TransferFailure) -> String {
    let body = format!(
        "<h1>Transfer failed</h1>\n\
         <p>{}</p>\n\
         <p>Ask the sender to try again.</p>",
        escape_html(&failure.message)
    );
    layout("Transfer failed", &body)
}
