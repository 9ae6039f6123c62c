//! Docstring augmentation by paraphrasing.
//!
//! Every record is kept; records with a non-empty docstring additionally get
//! a copy whose docstring is a paraphrase, with `_aug` appended to the id.
//! The paraphrasing model is opaque: anything implementing [`Paraphraser`]
//! works, and [`ChatParaphraser`] talks to an OpenAI-compatible endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::AugmentError;
use crate::records::Record;

/// Suffix appended to the id of an augmented record.
pub const AUGMENTED_ID_SUFFIX: &str = "_aug";

/// Opaque text-to-text paraphrasing function.
#[async_trait]
pub trait Paraphraser: Send + Sync {
    async fn paraphrase(&self, text: &str) -> Result<String, AugmentError>;
}

/// Default OpenAI-compatible API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default paraphrasing model.
pub const DEFAULT_MODEL: &str = "google/flan-t5-large";

const MAX_RETRIES: u32 = 3;

const BASE_RETRY_DELAY_MS: u64 = 1000;

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Output length cap, in tokens.
const MAX_OUTPUT_TOKENS: u32 = 128;

/// Paraphraser backed by a `/chat/completions` endpoint.
pub struct ChatParaphraser {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl ChatParaphraser {
    pub fn new(api_key: String) -> Result<Self, AugmentError> {
        Self::with_endpoint(
            api_key,
            DEFAULT_BASE_URL.to_string(),
            DEFAULT_MODEL.to_string(),
        )
    }

    pub fn with_endpoint(
        api_key: String,
        base_url: String,
        model: String,
    ) -> Result<Self, AugmentError> {
        if api_key.is_empty() {
            return Err(AugmentError::MissingApiKey);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AugmentError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn execute_request(&self, text: &str) -> Result<String, AugmentError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!("paraphrase: {}", text),
            }],
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AugmentError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            if status.as_u16() == 429 {
                return Err(AugmentError::RateLimited(body));
            }
            return Err(AugmentError::ApiError {
                code: status.as_u16(),
                message: body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AugmentError::ParseError(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(AugmentError::EmptyResponse);
        }
        Ok(content)
    }
}

fn is_transient(err: &AugmentError) -> bool {
    match err {
        AugmentError::RequestFailed(_) | AugmentError::RateLimited(_) => true,
        AugmentError::ApiError { code, .. } => *code >= 500,
        _ => false,
    }
}

#[async_trait]
impl Paraphraser for ChatParaphraser {
    async fn paraphrase(&self, text: &str) -> Result<String, AugmentError> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay_ms = BASE_RETRY_DELAY_MS * (1 << (attempt - 1));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.execute_request(text).await {
                Ok(paraphrase) => return Ok(paraphrase),
                Err(err) if is_transient(&err) => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        error = %err,
                        "Transient paraphrase error, will retry"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AugmentError::RequestFailed("Max retries exceeded with no error captured".to_string())
        }))
    }
}

/// Records produced by [`augment_records`] and counters for reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AugmentOutput {
    /// Originals, each followed by its augmented copy when one was made.
    pub records: Vec<Record>,
    pub augmented: usize,
    pub skipped_empty: usize,
    pub failed: usize,
}

/// Settings for [`augment_records`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AugmentOptions {
    /// Only the first `limit` records are processed.
    pub limit: Option<usize>,
    /// Paraphrase requests in flight at once.
    pub concurrency: usize,
}

impl Default for AugmentOptions {
    fn default() -> Self {
        Self {
            limit: None,
            concurrency: 4,
        }
    }
}

/// Adds a paraphrased copy of every record that has a docstring.
///
/// Output order is the input order with each augmented copy right after its
/// original. A failed or empty paraphrase is logged and the record is kept
/// without a copy.
pub async fn augment_records<P: Paraphraser + ?Sized>(
    records: Vec<Record>,
    paraphraser: &P,
    options: AugmentOptions,
) -> AugmentOutput {
    let limit = options.limit.unwrap_or(records.len());
    let selected: Vec<Record> = records.into_iter().take(limit).collect();
    info!(records = selected.len(), "Paraphrasing records");

    let results: Vec<(Record, Option<Result<String, AugmentError>>)> = stream::iter(selected)
        .map(|record| async move {
            if record.docstring.is_empty() {
                return (record, None);
            }
            let result = paraphraser.paraphrase(&record.docstring).await;
            (record, Some(result))
        })
        .buffered(options.concurrency.max(1))
        .collect()
        .await;

    let mut output = AugmentOutput::default();
    for (record, result) in results {
        match result {
            None => {
                output.skipped_empty += 1;
                output.records.push(record);
            }
            Some(Ok(paraphrase)) if !paraphrase.trim().is_empty() => {
                let mut copy = record.clone();
                copy.docstring = paraphrase;
                copy.id = format!("{}{}", record.id, AUGMENTED_ID_SUFFIX);
                debug!(id = %record.id, "Augmented record");
                output.records.push(record);
                output.records.push(copy);
                output.augmented += 1;
            }
            Some(Ok(_)) => {
                warn!(id = %record.id, "Paraphraser returned empty text, keeping original only");
                output.failed += 1;
                output.records.push(record);
            }
            Some(Err(err)) => {
                warn!(id = %record.id, error = %err, "Could not paraphrase docstring");
                output.failed += 1;
                output.records.push(record);
            }
        }
    }

    info!(
        augmented = output.augmented,
        skipped_empty = output.skipped_empty,
        failed = output.failed,
        total = output.records.len(),
        "Augmentation finished"
    );
    output
}
