//! SFTP batch uploads collected through the HTTP router

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::Response;
use common::*;
use russh_sftp::protocol::{FileAttributes, OpenFlags, StatusCode as SftpStatus};
use russh_sftp::server::Handler;
use trisend_server::transfers::{
    CapturedOutput, EXIT_FAILURE, EXIT_SUCCESS, SftpHandler, TransferContext, sftp_session,
};

const TIMEOUT: Duration = Duration::from_secs(600);

fn write_flags() -> OpenFlags {
    OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE
}

async fn put(
    handler: &mut SftpHandler<CapturedOutput>,
    id: u32,
    path: &str,
    data: &[u8],
) -> Result<(), SftpStatus> {
    let handle = handler
        .open(id, path.to_string(), write_flags(), FileAttributes::default())
        .await?
        .handle;
    handler.write(id + 1, handle.clone(), 0, data.to_vec()).await?;
    handler.close(id + 2, handle).await?;
    Ok(())
}

/// Follow the link as soon as the session prints it
fn spawn_browser(
    ctx: &TransferContext,
    output: &Arc<CapturedOutput>,
) -> tokio::task::JoinHandle<Response> {
    let ctx = ctx.clone();
    let output = output.clone();
    tokio::spawn(async move {
        let id = wait_for_link(&output).await;
        get(&ctx, &format!("/download/direct/{id}")).await
    })
}

#[tokio::test]
async fn test_directory_batch_round_trip() {
    let ctx = make_context(1024 * 1024, TIMEOUT);
    let output = Arc::new(CapturedOutput::new());
    let (mut handler, finisher) =
        sftp_session(ctx.clone(), Some(alice()), output.clone()).unwrap();
    let browser = spawn_browser(&ctx, &output);

    // What `put -r site` sends
    handler
        .mkdir(1, "/site".to_string(), FileAttributes::default())
        .await
        .unwrap();
    put(&mut handler, 2, "/site/index.html", b"<h1>hi</h1>").await.unwrap();
    handler
        .mkdir(5, "/site/css".to_string(), FileAttributes::default())
        .await
        .unwrap();
    put(&mut handler, 6, "/site/css/main.css", b"body{}").await.unwrap();

    // Channel closed
    drop(handler);
    let finish = tokio::spawn(finisher.finish());

    let response = browser.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"site.zip\""
    );

    let (names, contents) = read_zip(body_bytes(response).await, "site/css/main.css");
    assert_eq!(
        names,
        vec!["site/", "site/css/", "site/css/main.css", "site/index.html"]
    );
    assert_eq!(contents, b"body{}");

    assert_eq!(finish.await.unwrap(), EXIT_SUCCESS);
    assert_eq!(ctx.registry.active_count(), 0);
}

#[tokio::test]
async fn test_batch_over_aggregate_ceiling() {
    let ctx = make_context(10, TIMEOUT);
    let output = Arc::new(CapturedOutput::new());
    let (mut handler, finisher) =
        sftp_session(ctx.clone(), Some(alice()), output.clone()).unwrap();
    let browser = spawn_browser(&ctx, &output);

    put(&mut handler, 1, "/a.txt", b"12345").await.unwrap();
    let result = put(&mut handler, 4, "/b.txt", b"67890").await;
    assert_eq!(result, Err(SftpStatus::Failure));

    let finish = tokio::spawn(finisher.finish());
    let response = browser.await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("Limit reached"));

    drop(handler);
    assert_eq!(finish.await.unwrap(), EXIT_FAILURE);
    assert!(output.stderr_text().contains("Limit reached"));
    assert_eq!(ctx.registry.active_count(), 0);
}

#[tokio::test]
async fn test_unknown_key_gets_no_session() {
    let ctx = make_context(10, TIMEOUT);
    let output = Arc::new(CapturedOutput::new());
    assert!(sftp_session(ctx.clone(), None, output).is_err());
    assert_eq!(ctx.registry.active_count(), 0);
}
