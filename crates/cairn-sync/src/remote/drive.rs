//! Google Drive v3 `appDataFolder` client.
//!
//! The app data folder is private to the OAuth client and hidden from the
//! user's Drive UI. Creates use a `multipart/related` upload (metadata part
//! then media part); updates use a plain media upload.

use std::sync::Arc;

use async_trait::async_trait;
use cairn_auth::AccessTokenProvider;
use cairn_settings::SyncSettings;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{RemoteFile, RemoteStore};
use crate::errors::{Result, SyncError};

const SPACE: &str = "appDataFolder";
const FILE_FIELDS: &str = "id,name,modifiedTime,size";

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    modified_time: Option<String>,
    #[serde(default)]
    size: Option<String>,
}

impl From<DriveFile> for RemoteFile {
    fn from(f: DriveFile) -> Self {
        Self {
            id: f.id,
            name: f.name,
            modified_time: f.modified_time,
            size: f.size.and_then(|s| s.parse().ok()),
        }
    }
}

/// [`RemoteStore`] over the Drive REST API.
pub struct DriveAppDataStore {
    client: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
    api_base: String,
    upload_base: String,
}

impl DriveAppDataStore {
    /// Client using the endpoints in `settings`.
    pub fn new(tokens: Arc<dyn AccessTokenProvider>, settings: &SyncSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            api_base: settings.api_base_url.trim_end_matches('/').to_string(),
            upload_base: settings.upload_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Send an authorized request, retrying once with a fresh token on 401.
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.tokens.access_token().await?;
        let resp = build(&token).send().await?;
        let resp = if resp.status() == StatusCode::UNAUTHORIZED {
            warn!("remote rejected access token, refreshing and retrying");
            self.tokens.invalidate().await;
            let token = self.tokens.access_token().await?;
            build(&token).send().await?
        } else {
            resp
        };

        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            Err(SyncError::Remote { status, message })
        }
    }
}

/// Quote a value for a Drive `q` expression.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Assemble a `multipart/related` body. Returns `(content_type, body)`.
fn multipart_related(metadata: &serde_json::Value, mime: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!("cairn-{:016x}", rand::random::<u64>());
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: {mime}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/related; boundary={boundary}"), body)
}

#[async_trait]
impl RemoteStore for DriveAppDataStore {
    #[instrument(skip(self))]
    async fn find(&self, name: &str) -> Result<Option<RemoteFile>> {
        let url = format!("{}/drive/v3/files", self.api_base);
        let q = format!("name = {} and trashed = false", quote(name));
        let fields = format!("files({FILE_FIELDS})");
        let resp = self
            .send(|token| {
                self.client.get(&url).bearer_auth(token).query(&[
                    ("spaces", SPACE),
                    ("q", q.as_str()),
                    ("fields", fields.as_str()),
                    ("orderBy", "modifiedTime desc"),
                    ("pageSize", "1"),
                ])
            })
            .await?;
        let list: FileList = resp.json().await?;
        Ok(list.files.into_iter().next().map(RemoteFile::from))
    }

    #[instrument(skip(self))]
    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/drive/v3/files/{id}", self.api_base);
        let resp = self
            .send(|token| {
                self.client
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("alt", "media")])
            })
            .await?;
        let bytes = resp.bytes().await?;
        debug!(len = bytes.len(), "downloaded blob");
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn create(&self, name: &str, mime: &str, bytes: Vec<u8>) -> Result<RemoteFile> {
        let url = format!("{}/upload/drive/v3/files", self.upload_base);
        let metadata = serde_json::json!({ "name": name, "parents": [SPACE] });
        let (content_type, body) = multipart_related(&metadata, mime, &bytes);
        let resp = self
            .send(|token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
                    .header(CONTENT_TYPE, content_type.as_str())
                    .body(body.clone())
            })
            .await?;
        let file: DriveFile = resp.json().await?;
        Ok(file.into())
    }

    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn update(&self, id: &str, mime: &str, bytes: Vec<u8>) -> Result<RemoteFile> {
        let url = format!("{}/upload/drive/v3/files/{id}", self.upload_base);
        let resp = self
            .send(|token| {
                self.client
                    .patch(&url)
                    .bearer_auth(token)
                    .query(&[("uploadType", "media"), ("fields", FILE_FIELDS)])
                    .header(CONTENT_TYPE, mime)
                    .body(bytes.clone())
            })
            .await?;
        let file: DriveFile = resp.json().await?;
        Ok(file.into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
