//! OCR engine abstraction and implementations.
//!
//! Converts raw document bytes into ordered, 1-indexed [`Page`]s:
//! - **[`MistralOcr`]** — Mistral's file-upload + OCR flow for scanned
//!   PDFs and DOCX files.
//! - **[`PlainTextOcr`]** — UTF-8 passthrough for text files; also the
//!   engine used by tests.
//!
//! OCR output frequently renders form tables as markdown. Those rows are
//! flattened into `key: value` lines ([`flatten_tables`]) before chunking
//! so the cell pairs stay adjacent in retrieval windows.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::OcrConfig;
use crate::models::Page;

/// Converts document bytes to ordered page text.
///
/// Implementations fail with an error on unsupported or corrupt input;
/// the ingestion pipeline classifies that as a per-file OCR failure and
/// continues with the next document.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn process(&self, bytes: &[u8], file_name: &str) -> Result<Vec<Page>>;
}

/// Flatten markdown table rows into `key: value` lines.
///
/// Compliance forms OCR into two-column tables; pairing adjacent cells
/// keeps a field and its value inside the same retrieval window.
///
/// ```rust
/// use audit_harness::ocr::flatten_tables;
///
/// let text = "| Approved by | J. Smith |";
/// assert_eq!(flatten_tables(text), "Approved by: J. Smith");
/// ```
pub fn flatten_tables(markdown: &str) -> String {
    markdown
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('|') && line.contains('|') {
                let cells: Vec<&str> = line
                    .split('|')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .collect();
                let mut pairs = Vec::new();
                for pair in cells.chunks(2) {
                    let key = pair[0];
                    let value = pair.get(1).copied().unwrap_or("");
                    if !key.is_empty() || !value.is_empty() {
                        pairs.push(format!("{}: {}", key, value));
                    }
                }
                pairs.join("\n")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============ Plain Text ============

/// Treats input bytes as UTF-8 text. Form feeds (`\x0c`) delimit pages;
/// without them the whole file is a single page.
pub struct PlainTextOcr;

#[async_trait]
impl OcrEngine for PlainTextOcr {
    async fn process(&self, bytes: &[u8], file_name: &str) -> Result<Vec<Page>> {
        let text = std::str::from_utf8(bytes)
            .with_context(|| format!("'{}' is not valid UTF-8 text", file_name))?;

        let pages: Vec<Page> = text
            .split('\x0c')
            .enumerate()
            .map(|(i, page_text)| Page {
                page_number: (i + 1) as u32,
                text: page_text.trim().to_string(),
            })
            .filter(|p| !p.text.is_empty())
            .collect();

        Ok(pages)
    }
}

// ============ Mistral OCR ============

/// OCR via the Mistral API: upload the file, obtain a signed URL, then
/// run the OCR model against it. Page text is table-flattened markdown.
pub struct MistralOcr {
    client: reqwest::Client,
    model: String,
    api_key: String,
    max_retries: u32,
}

const MISTRAL_API_BASE: &str = "https://api.mistral.ai/v1";

impl MistralOcr {
    /// # Errors
    ///
    /// Fails if `MISTRAL_API_KEY` is not set.
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let api_key = std::env::var("MISTRAL_API_KEY")
            .map_err(|_| anyhow::anyhow!("MISTRAL_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
        })
    }

    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", "ocr")
            .part("file", part);

        let resp = self
            .client
            .post(format!("{}/files", MISTRAL_API_BASE))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Mistral upload error {}: {}", status, resp.text().await.unwrap_or_default());
        }

        let json: serde_json::Value = resp.json().await?;
        json.get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("Mistral upload returned no file id"))
    }

    async fn signed_url(&self, file_id: &str) -> Result<String> {
        let resp = self
            .client
            .get(format!("{}/files/{}/url", MISTRAL_API_BASE, file_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Mistral signed-url error {}: {}", status, resp.text().await.unwrap_or_default());
        }

        let json: serde_json::Value = resp.json().await?;
        json.get("url")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("Mistral returned no signed URL"))
    }

    async fn run_ocr(&self, document_url: &str) -> Result<Vec<Page>> {
        let body = serde_json::json!({
            "model": self.model,
            "document": {
                "type": "document_url",
                "document_url": document_url,
            },
            "include_image_base64": false,
        });

        let resp = self
            .client
            .post(format!("{}/ocr", MISTRAL_API_BASE))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Mistral OCR error {}: {}", status, resp.text().await.unwrap_or_default());
        }

        let json: serde_json::Value = resp.json().await?;
        let pages = json
            .get("pages")
            .and_then(|p| p.as_array())
            .ok_or_else(|| anyhow::anyhow!("Mistral OCR response missing pages array"))?;

        let mut out = Vec::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            let index = page.get("index").and_then(|v| v.as_u64()).unwrap_or(i as u64);
            let markdown = page.get("markdown").and_then(|v| v.as_str()).unwrap_or("");
            out.push(Page {
                page_number: (index + 1) as u32,
                text: flatten_tables(markdown).trim().to_string(),
            });
        }
        out.sort_by_key(|p| p.page_number);
        Ok(out)
    }

    async fn process_once(&self, bytes: &[u8], file_name: &str) -> Result<Vec<Page>> {
        let file_id = self.upload(bytes, file_name).await?;
        let url = self.signed_url(&file_id).await?;
        self.run_ocr(&url).await
    }
}

#[async_trait]
impl OcrEngine for MistralOcr {
    async fn process(&self, bytes: &[u8], file_name: &str) -> Result<Vec<Page>> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1 << (attempt - 1).min(5))).await;
            }
            match self.process_once(bytes, file_name).await {
                Ok(pages) => return Ok(pages),
                Err(e) => last_err = Some(e),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("OCR failed after retries")))
    }
}
