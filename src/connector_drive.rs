//! Google Drive connector.
//!
//! Lists and downloads files through the Drive v3 REST API using a
//! bearer token from `GOOGLE_DRIVE_ACCESS_TOKEN`. A target's
//! `folder_id` is the Drive folder id holding that organization's
//! documents.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::connector::SourceConnector;
use crate::models::SourceFile;

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

pub struct DriveConnector {
    client: reqwest::Client,
    token: String,
}

impl DriveConnector {
    /// # Errors
    ///
    /// Fails if `GOOGLE_DRIVE_ACCESS_TOKEN` is not set.
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let token = std::env::var("GOOGLE_DRIVE_ACCESS_TOKEN").map_err(|_| {
            anyhow::anyhow!("GOOGLE_DRIVE_ACCESS_TOKEN environment variable not set")
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { client, token })
    }
}

#[async_trait]
impl SourceConnector for DriveConnector {
    async fn list(&self, folder_id: &str) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/files", DRIVE_API_BASE))
                .bearer_auth(&self.token)
                .query(&[
                    (
                        "q",
                        format!("'{}' in parents and trashed = false", folder_id).as_str(),
                    ),
                    ("fields", "nextPageToken, files(id, name, mimeType, modifiedTime)"),
                    ("pageSize", "1000"),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let resp = request.send().await?;
            let status = resp.status();
            if !status.is_success() {
                bail!(
                    "Drive list error {}: {}",
                    status,
                    resp.text().await.unwrap_or_default()
                );
            }

            let json: serde_json::Value = resp.json().await?;
            let empty = Vec::new();
            for f in json.get("files").and_then(|f| f.as_array()).unwrap_or(&empty) {
                let id = f.get("id").and_then(|v| v.as_str()).unwrap_or_default();
                let name = f.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                if id.is_empty() || name.is_empty() {
                    continue;
                }
                let mime_type = f
                    .get("mimeType")
                    .and_then(|v| v.as_str())
                    .unwrap_or("application/octet-stream");
                let modified_time = f
                    .get("modifiedTime")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);

                files.push(SourceFile {
                    id: id.to_string(),
                    name: name.to_string(),
                    mime_type: mime_type.to_string(),
                    modified_time,
                });
            }

            page_token = json
                .get("nextPageToken")
                .and_then(|v| v.as_str())
                .map(String::from);
            if page_token.is_none() {
                break;
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(format!("{}/files/{}", DRIVE_API_BASE, file_id))
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            bail!(
                "Drive download error {} for {}: {}",
                status,
                file_id,
                resp.text().await.unwrap_or_default()
            );
        }

        Ok(resp.bytes().await?.to_vec())
    }
}
