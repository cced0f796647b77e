//! Vision and chat model client
//!
//! Uses Gemini's `generateContent` endpoint for both screenshot commentary and
//! chat replies.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::capture::Screenshot;
use crate::{Error, Result};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Describes a screenshot according to a prompt
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the model call fails
    async fn analyze(&self, prompt: &str, image: &Screenshot) -> Result<String>;
}

/// Completes a text-only prompt
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the model call fails
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Gemini REST client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

/// `generateContent` request
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

/// `generateContent` response
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    /// Create a new Gemini client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "Gemini API key required (set GEMINI_API_KEY)".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Use a specific model
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    async fn generate(&self, parts: Vec<Part<'_>>) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content { parts }],
        };
        let url = format!("{GEMINI_API_URL}/{}:generateContent", self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Analysis(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Analysis(format!("API error {status}: {body}")));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Analysis(format!("parse error: {e}")))?;

        let text = extract_text(result);
        tracing::debug!(model = %self.model, chars = text.chars().count(), "model responded");
        Ok(text)
    }
}

/// Join the text parts of the first candidate
fn extract_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl VisionAnalyzer for GeminiClient {
    async fn analyze(&self, prompt: &str, image: &Screenshot) -> Result<String> {
        let data = base64::engine::general_purpose::STANDARD.encode(image.bytes());
        self.generate(vec![
            Part::Text { text: prompt },
            Part::Image {
                inline_data: InlineData {
                    mime_type: image.mime_type(),
                    data,
                },
            },
        ])
        .await
    }
}

#[async_trait]
impl ChatCompleter for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(vec![Part::Text { text: prompt }]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: "hi" },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: "image/png",
                            data: "AAAA".to_string(),
                        },
                    },
                ],
            }],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contents": [{
                    "parts": [
                        { "text": "hi" },
                        { "inlineData": { "mimeType": "image/png", "data": "AAAA" } }
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Ugh, " }, { "text": "spreadsheets again?" }] }
            }]
        }))
        .unwrap();

        assert_eq!(extract_text(response), "Ugh, spreadsheets again?");
    }

    #[test]
    fn test_extract_text_blocked_response() {
        let response: GenerateResponse =
            serde_json::from_value(serde_json::json!({ "candidates": [{}] })).unwrap();
        assert_eq!(extract_text(response), "");

        let response: GenerateResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(extract_text(response), "");
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(matches!(GeminiClient::new(String::new()), Err(Error::Config(_))));
    }
}
