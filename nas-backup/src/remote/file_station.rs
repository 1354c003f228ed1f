//! QNAP File Station API on top of an authenticated session.

use super::{
    split_path, ByteStream, Listing, QnapSession, RemoteEntry, RemoteFileService, UploadOutcome,
    UploadSession,
};
use crate::utils::errors::RemoteError;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const UTIL_REQUEST: &str = "/cgi-bin/filemanager/utilRequest.cgi";

/// Status code for "ok" on file operations.
const STATUS_OK: i64 = 1;
/// Status code for "target already exists" on rename and upload.
const STATUS_EXISTS: i64 = 2;

pub struct FileStation {
    session: QnapSession,
}

impl FileStation {
    pub fn new(session: QnapSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &QnapSession {
        &self.session
    }

    async fn call(&self, func: &str, params: &[(&str, String)]) -> Result<Value, RemoteError> {
        let res = self
            .session
            .post_form(UTIL_REQUEST, &[("func", func)], params)
            .await?;
        let body = res.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// List all shares.
    pub async fn list_shares(&self) -> Result<Vec<RemoteEntry>, RemoteError> {
        let value = self
            .call("get_tree", &[("node", "share_root".to_string())])
            .await?;
        let shares = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(Value::as_str))
                    .map(RemoteEntry::folder)
                    .collect()
            })
            .unwrap_or_default();
        Ok(shares)
    }

    /// Get file information.
    pub async fn stat(&self, path: &str) -> Result<Value, RemoteError> {
        let (dir, name) = split_path(path);
        self.call(
            "stat",
            &[("path", dir.to_string()), ("file_name", name.to_string())],
        )
        .await
    }

    /// Rename without overwrite.
    pub async fn rename(&self, path: &str, new_name: &str) -> Result<(), RemoteError> {
        let (dir, name) = split_path(path);
        let value = self
            .call(
                "rename",
                &[
                    ("path", dir.to_string()),
                    ("source_name", name.to_string()),
                    ("dest_name", new_name.to_string()),
                ],
            )
            .await?;
        expect_status("rename", &value, STATUS_OK)
    }

    /// Download a file into `dest`, returning the byte count written.
    pub async fn download(&self, path: &str, dest: &Path) -> Result<u64, RemoteError> {
        let (dir, name) = split_path(path);
        // The file name in the URL path only names the download for the browser.
        let request_path = format!("{}/{}", UTIL_REQUEST, name);
        let res = self
            .session
            .post_form(
                &request_path,
                &[],
                &[
                    ("func", "download".to_string()),
                    ("isfolder", "0".to_string()),
                    ("source_total", "1".to_string()),
                    ("source_path", dir.to_string()),
                    ("source_file", name.to_string()),
                ],
            )
            .await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = res.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(path = %path, bytes = written, "Downloaded {}", dest.display());
        Ok(written)
    }
}

#[async_trait]
impl RemoteFileService for FileStation {
    async fn list(&self, dir: &str, limit: usize) -> Result<Listing, RemoteError> {
        let value = self
            .call(
                "get_list",
                &[("path", dir.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        // A missing or unreadable directory answers with a bare status object.
        if value.get("datas").is_none() {
            return Err(RemoteError::Api {
                op: "get_list",
                status: status_of(&value).unwrap_or(-1),
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let (dir, name) = split_path(path);
        let value = self
            .call(
                "delete",
                &[
                    ("path", dir.to_string()),
                    ("file_name", name.to_string()),
                    ("file_total", "1".to_string()),
                    ("v", "1".to_string()),
                    ("force", "1".to_string()),
                ],
            )
            .await?;
        expect_status("delete", &value, STATUS_OK)?;
        debug!(path = %path, "Deleted");
        Ok(())
    }

    async fn start_chunked_upload(&self, root_dir: &str) -> Result<String, RemoteError> {
        let value = self
            .call(
                "start_chunked_upload",
                &[("upload_root_dir", root_dir.to_string())],
            )
            .await?;
        expect_status("start_chunked_upload", &value, 0)?;
        value
            .get("upload_id")
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or(RemoteError::Api {
                op: "start_chunked_upload",
                status: 0,
            })
    }

    async fn chunked_upload(
        &self,
        session: &UploadSession,
        body: ByteStream,
    ) -> Result<UploadOutcome, RemoteError> {
        let query = [
            ("func", "chunked_upload".to_string()),
            ("upload_id", session.upload_id.clone()),
            ("dest_path", session.dest_dir.clone()),
            ("upload_root_dir", session.root_dir.clone()),
            ("upload_name", session.dest_name.clone()),
            ("overwrite", if session.overwrite { "1" } else { "0" }.to_string()),
            ("offset", session.offset.to_string()),
            ("filesize", session.total_size.to_string()),
        ];

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), session.total_size)
            .file_name("blob")
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("fileName", session.dest_name.clone())
            .part("file", part);

        let res = self
            .session
            .post_multipart(UTIL_REQUEST, &query, form)
            .await?;
        let body = res.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        Ok(upload_outcome(value, session.overwrite))
    }
}

/// Interpret the reply to the last chunk of an upload.
fn upload_outcome(value: Value, overwrite: bool) -> UploadOutcome {
    match status_of(&value) {
        Some(STATUS_OK) => UploadOutcome::Completed(value),
        Some(STATUS_EXISTS) if !overwrite => UploadOutcome::DestinationExists,
        _ => UploadOutcome::Rejected(value),
    }
}

/// Numeric `status` field of a response, tolerating string encodings.
pub fn status_of(value: &Value) -> Option<i64> {
    match value.get("status")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn expect_status(op: &'static str, value: &Value, ok: i64) -> Result<(), RemoteError> {
    match status_of(value) {
        Some(status) if status == ok => Ok(()),
        Some(status) => Err(RemoteError::Api { op, status }),
        None => Err(RemoteError::Api { op, status: -1 }),
    }
}
