//! In-memory remote file service that records every call.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use nas_backup::remote::{
    split_path, ByteStream, Listing, RemoteEntry, RemoteFileService, UploadOutcome, UploadSession,
};
use nas_backup::utils::errors::RemoteError;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List { dir: String, limit: usize },
    Delete(String),
    StartUpload(String),
    Upload { path: String, bytes: u64, upload_id: String },
}

#[derive(Debug, Clone)]
pub struct Behaviour {
    /// Fail the n-th (0-based) list call and every later one
    pub fail_list_from: Option<usize>,
    pub start_status: i64,
    pub upload_transport_error: bool,
    pub upload_response: UploadOutcome,
    pub fail_delete: HashSet<String>,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            fail_list_from: None,
            start_status: 0,
            upload_transport_error: false,
            upload_response: UploadOutcome::Completed(json!({"status": 1})),
            fail_delete: HashSet::new(),
        }
    }
}

pub struct StubRemote {
    entries: Mutex<Vec<RemoteEntry>>,
    calls: Mutex<Vec<Call>>,
    pub behaviour: Behaviour,
}

impl StubRemote {
    pub fn with_files(names: &[&str]) -> Self {
        Self::with_behaviour(names, Behaviour::default())
    }

    pub fn with_behaviour(names: &[&str], behaviour: Behaviour) -> Self {
        Self {
            entries: Mutex::new(names.iter().map(|n| RemoteEntry::file(*n)).collect()),
            calls: Mutex::new(Vec::new()),
            behaviour,
        }
    }

    pub fn add_folder(&self, name: &str) {
        self.entries.lock().unwrap().push(RemoteEntry::folder(name));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> Vec<(String, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload { path, bytes, .. } => Some((path, bytes)),
                _ => None,
            })
            .collect()
    }

    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| !e.is_dir())
            .map(|e| e.filename.clone())
            .collect();
        names.sort();
        names
    }

    fn record(&self, call: Call) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        calls.len()
    }

    fn list_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, Call::List { .. }))
            .count()
    }
}

#[async_trait]
impl RemoteFileService for StubRemote {
    async fn list(&self, dir: &str, limit: usize) -> Result<Listing, RemoteError> {
        let index = self.list_calls();
        self.record(Call::List {
            dir: dir.to_string(),
            limit,
        });
        if matches!(self.behaviour.fail_list_from, Some(n) if index >= n) {
            return Err(RemoteError::Status {
                path: dir.to_string(),
                status: 500,
            });
        }
        let entries = self.entries.lock().unwrap().clone();
        Ok(Listing {
            total: Some(entries.len() as u64),
            entries,
        })
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        self.record(Call::Delete(path.to_string()));
        if self.behaviour.fail_delete.contains(path) {
            return Err(RemoteError::Api {
                op: "delete",
                status: 0,
            });
        }
        let (_, name) = split_path(path);
        self.entries.lock().unwrap().retain(|e| e.filename != name);
        Ok(())
    }

    async fn start_chunked_upload(&self, root_dir: &str) -> Result<String, RemoteError> {
        self.record(Call::StartUpload(root_dir.to_string()));
        match self.behaviour.start_status {
            0 => Ok("upload-1".to_string()),
            status => Err(RemoteError::Api {
                op: "start_chunked_upload",
                status,
            }),
        }
    }

    async fn chunked_upload(
        &self,
        session: &UploadSession,
        mut body: ByteStream,
    ) -> Result<UploadOutcome, RemoteError> {
        let mut bytes = 0u64;
        while let Some(chunk) = body.next().await {
            bytes += chunk?.len() as u64;
        }
        self.record(Call::Upload {
            path: session.dest_path(),
            bytes,
            upload_id: session.upload_id.clone(),
        });

        if self.behaviour.upload_transport_error {
            return Err(RemoteError::Status {
                path: session.dest_path(),
                status: 502,
            });
        }
        let outcome = self.behaviour.upload_response.clone();
        if let UploadOutcome::Completed(_) = outcome {
            self.entries
                .lock()
                .unwrap()
                .push(RemoteEntry::file(session.dest_name.clone()));
        }
        Ok(outcome)
    }
}

/// Write `contents` to a temp file named `name`.
pub fn local_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}
