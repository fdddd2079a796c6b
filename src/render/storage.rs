//! Remote file storage for rendered PNG artifacts.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use super::FileArtifact;
use crate::{AppError, Result};

/// Uploads artifacts on behalf of the requesting caller.
pub trait FileStorage: Send + Sync {
    /// Upload `bytes` under `file_name`, authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Storage` if the upload is rejected or the storage
    /// service is unreachable.
    fn upload<'a>(
        &'a self,
        bytes: Bytes,
        file_name: &'a str,
        mime_type: &'a str,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<FileArtifact>> + Send + 'a>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadReply {
    #[serde(alias = "id")]
    file_id: String,
    url: String,
    #[serde(default)]
    mime_type: Option<String>,
}

/// [`FileStorage`] posting a multipart form to an upload endpoint.
///
/// The caller's bearer token is forwarded unchanged, so the storage
/// service decides who may upload.
#[derive(Debug, Clone)]
pub struct HttpFileStorage {
    client: reqwest::Client,
    upload_url: String,
}

impl HttpFileStorage {
    /// Create a storage client posting to `upload_url`.
    #[must_use]
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            upload_url: upload_url.into(),
        }
    }

    async fn post_file(
        &self,
        bytes: Bytes,
        file_name: &str,
        mime_type: &str,
        token: &str,
    ) -> Result<FileArtifact> {
        let size = bytes.len();
        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name.to_owned())
            .mime_str(mime_type)
            .map_err(|err| AppError::Storage(format!("invalid mime type: {err}")))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.upload_url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|err| AppError::Storage(format!("failed to upload file: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, body = %body, "storage rejected upload");
            return Err(AppError::Storage(format!("upload rejected with status {status}")));
        }

        let reply: UploadReply = response
            .json()
            .await
            .map_err(|err| AppError::Storage(format!("invalid upload response: {err}")))?;

        info!(file_id = %reply.file_id, file_name, size, "file uploaded");
        Ok(FileArtifact {
            file_id: reply.file_id,
            url: reply.url,
            mime_type: reply.mime_type.unwrap_or_else(|| mime_type.to_owned()),
        })
    }
}

impl FileStorage for HttpFileStorage {
    fn upload<'a>(
        &'a self,
        bytes: Bytes,
        file_name: &'a str,
        mime_type: &'a str,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<FileArtifact>> + Send + 'a>> {
        Box::pin(self.post_file(bytes, file_name, mime_type, token))
    }
}

/// [`FileStorage`] used when no upload URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStorage;

impl FileStorage for DisabledStorage {
    fn upload<'a>(
        &'a self,
        _bytes: Bytes,
        _file_name: &'a str,
        _mime_type: &'a str,
        _token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<FileArtifact>> + Send + 'a>> {
        Box::pin(async {
            Err(AppError::Storage(
                "file storage is not configured; set storage.upload_url".into(),
            ))
        })
    }
}
