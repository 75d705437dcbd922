use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use nutrifit_core::ai::TextGenerator;
use nutrifit_core::error::PipelineError;

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<GeminiError>,
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

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

/// Text generation backed by the Google Generative Language REST API.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<&str>, model: &str) -> Result<Self, PipelineError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                PipelineError::ServiceConfiguration(
                    "GEMINI_API_KEY is not set; set it to use AI plan generation".into(),
                )
            })?;
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "nutrifit/{} (diet planner)",
                env!("CARGO_PKG_VERSION")
            ))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| {
                PipelineError::ServiceConfiguration(format!("failed to build HTTP client: {e}"))
            })?;
        tracing::info!(model, "Gemini client ready");
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: API_BASE_URL.to_string(),
        })
    }

    // Must not contain the API key: reqwest errors echo the URL.
    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn map_api_error(status: u16, body: &str) -> PipelineError {
        let message = serde_json::from_str::<GeminiResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .map_or_else(|| body.to_owned(), |e| e.message);
        match status {
            429 => PipelineError::Service(
                "AI service quota exceeded. Please wait a moment and try again.".into(),
            ),
            _ => PipelineError::Service(format!("Gemini API error ({status}): {message}")),
        }
    }

    fn extract_text(body: &str) -> Result<String, PipelineError> {
        let response: GeminiResponse = serde_json::from_str(body)
            .map_err(|e| PipelineError::Service(format!("unreadable Gemini response: {e}")))?;
        if let Some(error) = response.error {
            return Err(PipelineError::Service(format!(
                "Gemini API error: {}",
                error.message
            )));
        }
        response
            .candidates
            .unwrap_or_default()
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
            .filter(|text| !text.is_empty())
            .ok_or_else(|| PipelineError::Service("Gemini returned no content".into()))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                tracing::error!(error = %e, "Gemini request failed");
                PipelineError::Service(format!("failed to reach Gemini: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            PipelineError::Service(format!(
                "failed to read Gemini response: {}",
                e.without_url()
            ))
        })?;

        if !status.is_success() {
            tracing::error!(status = %status, "Gemini API error");
            return Err(Self::map_api_error(status.as_u16(), &body));
        }
        Self::extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = GeminiClient::new(None, "gemini-2.5-flash").err().unwrap();
        assert!(matches!(err, PipelineError::ServiceConfiguration(_)));
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let err = GeminiClient::new(Some("   "), "gemini-2.5-flash").err().unwrap();
        assert!(matches!(err, PipelineError::ServiceConfiguration(_)));
    }

    #[test]
    fn test_endpoint_format() {
        let client = GeminiClient::new(Some("k123"), "gemini-2.5-flash").unwrap();
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert!(!client.endpoint().contains("k123"));
    }

    #[tokio::test]
    async fn test_unreachable_service_does_not_leak_key() {
        let mut client = GeminiClient::new(Some("SECRET-KEY-123"), "gemini-2.5-flash").unwrap();
        client.base_url = "http://127.0.0.1:9".to_string();

        let err = client.generate("hi").await.unwrap_err();
        assert!(matches!(err, PipelineError::Service(_)));
        let message = err.to_string();
        assert!(message.starts_with("AI service error: failed to reach Gemini"));
        assert!(!message.contains("SECRET-KEY-123"), "{message}");
        assert!(!message.contains("127.0.0.1"), "{message}");
    }

    #[test]
    fn test_request_shape() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![RequestPart { text: "hi" }],
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{"candidates": [{"content": {"role": "model",
            "parts": [{"text": "```json\n{\"a\":"}, {"text": " 1}\n```"}]}}]}"#;
        assert_eq!(
            GeminiClient::extract_text(body).unwrap(),
            "```json\n{\"a\": 1}\n```"
        );
    }

    #[test]
    fn test_extract_text_empty_candidates() {
        let err = GeminiClient::extract_text(r#"{"candidates": []}"#).unwrap_err();
        assert_eq!(err.to_string(), "AI service error: Gemini returned no content");
    }

    #[test]
    fn test_extract_text_error_payload() {
        let err =
            GeminiClient::extract_text(r#"{"error": {"message": "API key not valid"}}"#)
                .unwrap_err();
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn test_map_api_error() {
        let err = GeminiClient::map_api_error(429, "{}");
        assert!(err.to_string().contains("quota exceeded"));
        let err = GeminiClient::map_api_error(
            400,
            r#"{"error": {"message": "Invalid argument"}}"#,
        );
        assert_eq!(
            err.to_string(),
            "AI service error: Gemini API error (400): Invalid argument"
        );
    }

    #[tokio::test]
    #[ignore = "hits the Gemini API and needs GEMINI_API_KEY"]
    async fn test_live_generate() {
        let key = std::env::var("GEMINI_API_KEY").ok();
        let client = GeminiClient::new(key.as_deref(), crate::config::DEFAULT_GEMINI_MODEL).unwrap();
        let text = client
            .generate("Reply with the JSON object {\"ok\": true} and nothing else.")
            .await
            .unwrap();
        let value: serde_json::Value = nutrifit_core::ai::parse_json_response(&text).unwrap();
        assert_eq!(value["ok"], true);
    }
}
