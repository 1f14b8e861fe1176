//! Review-impression summarizer backed by an OpenAI-compatible chat
//! completions endpoint.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use cosme_core::{Product, MAX_SUMMARIES, MAX_SUMMARY_CHARS};
use cosme_pipeline::{CollaboratorError, Summarizer};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{status_error, ClientError};
use crate::retry::retry_with_backoff;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const BACKOFF_BASE_MS: u64 = 1_000;

/// Leading list markers such as `1.`, `2)`, `-`, `・`, `*`.
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+\s*[.)．、]|[-・*•])\s*").expect("valid list marker regex")
});

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
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

pub struct OpenAiSummarizer {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl OpenAiSummarizer {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(api_key: &str, model: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        Self::with_base_url(api_key, model, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a summarizer against a custom endpoint (proxies, wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built.
    pub fn with_base_url(
        api_key: &str,
        model: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.to_owned(),
            max_retries: 3,
            backoff_base_ms: BACKOFF_BASE_MS,
        })
    }

    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Requests impressions for `product` and parses them.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport failure after retries, on a
    /// non-success status, or when no usable line comes back.
    pub async fn generate(&self, product: &Product) -> Result<Vec<String>, ClientError> {
        let prompt = user_prompt(product);
        let content = retry_with_backoff("openai", self.max_retries, self.backoff_base_ms, || {
            self.complete(&prompt)
        })
        .await?;

        let summaries = parse_summaries(&content);
        if summaries.is_empty() {
            return Err(ClientError::EmptyResponse(format!(
                "no impressions in completion for {}",
                product.product_id
            )));
        }
        tracing::info!(
            product_id = %product.product_id,
            count = summaries.len(),
            "generated review impressions"
        );
        Ok(summaries)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ClientError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_owned(),
                content: prompt.to_owned(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("openai", response).await);
        }

        let body = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::Deserialize {
                context: "chat completion".to_owned(),
                source: e,
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ClientError::EmptyResponse("completion had no choices".to_owned()))
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, product: &Product) -> Result<Vec<String>, CollaboratorError> {
        self.generate(product).await.map_err(CollaboratorError::from)
    }
}

fn user_prompt(product: &Product) -> String {
    format!(
        "「{brand}」の「{name}」についての感想を{count}つ作成してください。\n\
         ジャンル: {genre}\n\n\
         各感想は必ず{chars}文字以内にしてください。\n\
         出力は{count}行でそれぞれの感想だけをシンプルに書いてください。",
        brand = product.brand,
        name = product.name,
        genre = product.genre,
        count = MAX_SUMMARIES,
        chars = MAX_SUMMARY_CHARS,
    )
}

/// Splits a completion into at most [`MAX_SUMMARIES`] impressions of at most
/// [`MAX_SUMMARY_CHARS`] characters each, stripping list markers and blank
/// lines.
pub(crate) fn parse_summaries(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().to_owned())
        .filter(|line| !line.is_empty())
        .take(MAX_SUMMARIES)
        .map(|line| line.chars().take(MAX_SUMMARY_CHARS).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markers_and_blank_lines() {
        let content = "1. 肌がもっちり潤う\n\n2) つけ心地さっぱり\n- 乾燥知らずになった\n・余分な行";
        assert_eq!(
            parse_summaries(content),
            vec!["肌がもっちり潤う", "つけ心地さっぱり", "乾燥知らずになった"]
        );
    }

    #[test]
    fn truncates_long_lines_by_character() {
        let long = "あ".repeat(30);
        let parsed = parse_summaries(&long);
        assert_eq!(parsed[0].chars().count(), MAX_SUMMARY_CHARS);
    }

    #[test]
    fn keeps_plain_lines_untouched() {
        assert_eq!(parse_summaries("  伸びがいいのに軽い  "), vec!["伸びがいいのに軽い"]);
    }

    #[test]
    fn empty_completion_yields_nothing() {
        assert!(parse_summaries("\n \n").is_empty());
    }

    #[test]
    fn prompt_names_brand_product_and_genre() {
        let product = Product {
            product_id: "1".to_owned(),
            genre: "化粧水".to_owned(),
            channel: "ドラッグストア".to_owned(),
            name: "極潤ヒアルロン液".to_owned(),
            brand: "肌ラボ".to_owned(),
            image_url: String::new(),
            product_url: None,
            brand_url: None,
            scraped_rank: 1,
            first_seen: chrono::DateTime::UNIX_EPOCH,
            last_used: None,
        };
        let prompt = user_prompt(&product);
        assert!(prompt.contains("肌ラボ"));
        assert!(prompt.contains("極潤ヒアルロン液"));
        assert!(prompt.contains("化粧水"));
        assert!(prompt.contains("20文字以内"));
    }
}
