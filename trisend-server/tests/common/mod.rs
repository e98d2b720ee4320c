//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use tower::ServiceExt;
use trisend_common::TransferId;
use trisend_server::constants::MSG_LINK;
use trisend_server::http;
use trisend_server::identity::Identity;
use trisend_server::transfers::{CapturedOutput, TransferContext, TransferRegistry, TransferSettings};

/// Context with its own registry
pub fn make_context(max_upload_bytes: u64, timeout: Duration) -> TransferContext {
    TransferContext::new(
        Arc::new(TransferRegistry::new()),
        TransferSettings {
            public_url: "http://localhost:3000".to_string(),
            max_upload_bytes,
            timeout,
        },
    )
}

pub fn alice() -> Identity {
    Identity {
        username: "alice".to_string(),
        avatar: "https://example.com/alice.png".to_string(),
    }
}

pub fn router(ctx: &TransferContext) -> Router {
    http::router(ctx.clone(), "-p 2222 localhost")
}

/// Issue a GET against the router
pub async fn get(ctx: &TransferContext, uri: &str) -> Response {
    router(ctx)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

/// Wait until the session prints its link, on stdout (exec) or stderr (sftp)
pub async fn wait_for_link(output: &CapturedOutput) -> TransferId {
    loop {
        let text = output.stdout_text() + &output.stderr_text();
        let id = text
            .lines()
            .find_map(|line| line.strip_prefix(MSG_LINK))
            .and_then(|link| link.trim().rsplit('/').next())
            .and_then(TransferId::parse);
        if let Some(id) = id {
            return id;
        }
        tokio::task::yield_now().await;
    }
}

/// Download a transfer the way a browser following the link would
pub async fn download(ctx: &TransferContext, id: &TransferId) -> (StatusCode, Response) {
    let landing = get(ctx, &format!("/download/{id}")).await;
    assert_eq!(landing.status(), StatusCode::OK);

    let response = get(ctx, &format!("/download/direct/{id}")).await;
    (response.status(), response)
}

/// Sorted entry names and the contents of one entry
pub fn read_zip(bytes: Vec<u8>, entry: &str) -> (Vec<String>, Vec<u8>) {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
    names.sort();

    let mut contents = Vec::new();
    zip.by_name(entry)
        .unwrap()
        .read_to_end(&mut contents)
        .unwrap();
    (names, contents)
}
