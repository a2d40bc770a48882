//! Grounded answer synthesis.
//!
//! The synthesizer turns retrieved chunks into a structured audit
//! answer. The language model is instructed to use only the supplied
//! excerpts: every sub-claim of a compound question must be supported
//! before `found_in_context` may be true, and partial answers must name
//! what the excerpts do not cover. With no chunks at all the fixed
//! "does not contain this information" template is returned without a
//! model call.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::PipelineError;
use crate::models::{AnswerResult, Citation, RetrievedChunk};

/// Chat-style language model seam.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}

/// Answer synthesis seam the query router drives.
#[async_trait]
pub trait Synthesize: Send + Sync {
    async fn synthesize(
        &self,
        question: &str,
        doc_type_label: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<AnswerResult, PipelineError>;
}

const SYSTEM_PROMPT: &str = "You are an audit assistant answering questions about an \
organization's compliance documents. You are given numbered excerpts from those documents. \
Answer using ONLY the excerpts; never use outside knowledge.\n\
\n\
Rules:\n\
1. If the excerpts fully answer the question, answer concisely and set foundInContext to true.\n\
2. For a compound question, every part must be supported by the excerpts before \
foundInContext may be true.\n\
3. If the excerpts answer only part of the question, answer the supported part, explicitly \
name what the excerpts do not cover, and set foundInContext to false.\n\
4. If the excerpts are unrelated to the question, say the documents do not contain this \
information and set foundInContext to false.\n\
5. When an excerpt references a form (e.g. \"FM-105: Supplier Evaluation Form\"), name the \
form in your answer.\n\
\n\
Respond with a single JSON object and nothing else:\n\
{\"answer\": \"<your answer>\", \"foundInContext\": <true|false>}";

pub struct AnswerSynthesizer {
    llm: Arc<dyn LanguageModel>,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    fn build_user_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
        let mut prompt = String::new();
        prompt.push_str("Excerpts:\n\n");
        for (i, chunk) in chunks.iter().enumerate() {
            prompt.push_str(&format!(
                "[{}] {} ({}, page {})\n",
                i + 1,
                chunk.metadata.title,
                chunk.metadata.file_name,
                chunk.metadata.page
            ));
            if let Some(form_ref) = &chunk.form_ref {
                prompt.push_str(&format!("References form {}\n", form_ref.display()));
            }
            prompt.push_str(&chunk.text);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!("Question: {}", question));
        prompt
    }
}

#[async_trait]
impl Synthesize for AnswerSynthesizer {
    async fn synthesize(
        &self,
        question: &str,
        doc_type_label: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<AnswerResult, PipelineError> {
        if chunks.is_empty() {
            return Ok(AnswerResult::not_in_context(doc_type_label));
        }

        let user = Self::build_user_prompt(question, chunks);
        let raw = self
            .llm
            .generate(SYSTEM_PROMPT, &user)
            .await
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;

        let citation = Some(Citation {
            title: chunks[0].metadata.title.clone(),
            file_name: chunks[0].metadata.file_name.clone(),
            page: chunks[0].metadata.page,
        });

        match parse_llm_answer(&raw) {
            Some((answer, found_in_context)) => Ok(AnswerResult {
                answer,
                found_in_context,
                citation,
            }),
            // Unparseable model output degrades to the safe template.
            None => Ok(AnswerResult::not_in_context(doc_type_label)),
        }
    }
}

#[derive(serde::Deserialize)]
struct LlmAnswer {
    answer: String,
    #[serde(rename = "foundInContext")]
    found_in_context: bool,
}

/// Parse the model's JSON answer, tolerating code fences and leading
/// prose around the object.
fn parse_llm_answer(raw: &str) -> Option<(String, bool)> {
    let trimmed = raw.trim();
    let candidate = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        if end <= start {
            return None;
        }
        trimmed[start..=end].to_string()
    };

    serde_json::from_str::<LlmAnswer>(&candidate)
        .ok()
        .map(|a| (a.answer, a.found_in_context))
}

/// OpenAI chat-completions client.
///
/// Retries follow the same classification as the embedder: 429 and 5xx
/// retry with backoff, other 4xx fail immediately. Requires
/// `OPENAI_API_KEY`.
pub struct OpenAiChat {
    client: reqwest::Client,
    model: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

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
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1 << (attempt - 1).min(5))).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let content = json
                            .get("choices")
                            .and_then(|c| c.get(0))
                            .and_then(|c| c.get("message"))
                            .and_then(|m| m.get("content"))
                            .and_then(|v| v.as_str())
                            .ok_or_else(|| {
                                anyhow::anyhow!("Invalid chat response: missing message content")
                            })?;
                        return Ok(content.to_string());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Chat completion failed after retries")))
    }
}
