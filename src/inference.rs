use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::InferenceError;
use crate::models::RawAnalysis;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ANALYZE_PROMPT: &str = r#"You are not a doctor. Give non-diagnostic guidance for a visible skin concern.

Analyze this image and return ONLY a valid JSON object with this exact structure:
{
  "summary": "1-2 sentence plain-English description of what you observe",
  "likely_categories": ["category1", "category2"],
  "risk_level": "low" or "medium" or "high",
  "next_steps": ["step 1", "step 2", "step 3"]
}

Rules:
- Be concise and respectful
- Use plain language, no medical jargon
- Provide 2-4 likely categories (e.g., acne, eczema, dry skin, rash)
- Give 2-4 concrete, actionable next steps
- Always include "Consult a dermatologist if it persists or worsens" as a next step
- Return ONLY valid JSON, no other text"#;

const OFFLINE_CHAT_REPLY: &str =
    "The assistant is currently offline because no inference backend is configured. \
     Please try again once the service has been set up with an API key.";

/// Seam to the hosted multimodal model. The pipeline and chat orchestrators
/// only see this trait; tests substitute counting stubs.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Run the fixed analysis rubric against one image. Returns the raw,
    /// untrusted payload the model embedded in its reply; validation and
    /// fallback substitution happen upstream.
    async fn analyze(&self, image_base64: &str) -> Result<RawAnalysis, InferenceError>;

    /// Free-form conversational turn with zero or more inline images.
    /// Returns the trimmed raw text.
    async fn converse(
        &self,
        prompt: &str,
        images: &[String],
    ) -> Result<String, InferenceError>;
}

/// HTTP client for the Gemini `generateContent` REST API.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Self {
        if config.degraded_mode() {
            warn!("GEMINI_API_KEY not set, running in degraded mode with mock responses");
        }
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    async fn generate(&self, prompt: &str, images: &[String]) -> Result<String, InferenceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| InferenceError::Unavailable("no API key configured".to_string()))?;

        let mut parts = vec![json!({ "text": prompt })];
        for image in images {
            parts.push(json!({
                "inline_data": {
                    "mime_type": "image/jpeg",
                    "data": strip_data_url_prefix(image),
                }
            }));
        }
        let payload = json!({ "contents": [{ "parts": parts }] });

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| InferenceError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InferenceError::Unavailable(format!(
                "model request failed with status {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::Unavailable(e.to_string()))?;

        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                InferenceError::Format("response carried no candidate text".to_string())
            })?;

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl VisionModel for GeminiClient {
    async fn analyze(&self, image_base64: &str) -> Result<RawAnalysis, InferenceError> {
        if self.api_key.is_none() {
            info!("degraded mode: returning mock analysis");
            return Ok(mock_analysis());
        }

        let images = [image_base64.to_string()];
        let text = self.generate(ANALYZE_PROMPT, &images).await?;
        parse_embedded_analysis(&text)
    }

    async fn converse(
        &self,
        prompt: &str,
        images: &[String],
    ) -> Result<String, InferenceError> {
        if self.api_key.is_none() {
            info!("degraded mode: returning fixed chat reply");
            return Ok(OFFLINE_CHAT_REPLY.to_string());
        }

        self.generate(prompt, images).await
    }
}

/// Parse the analysis payload the model was instructed to return. The model
/// may wrap the JSON in prose, so the first balanced `{...}` span is located
/// before parsing.
pub fn parse_embedded_analysis(text: &str) -> Result<RawAnalysis, InferenceError> {
    let span = first_json_object(text)
        .ok_or_else(|| InferenceError::Format("no JSON object in model output".to_string()))?;
    serde_json::from_str(span).map_err(|e| InferenceError::Format(e.to_string()))
}

/// Locate the first balanced top-level `{...}` span, tracking string
/// literals and escapes so braces inside strings do not miscount.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fixed placeholder report used when no credential is configured, so the
/// service stays demonstrable without a live model.
fn mock_analysis() -> RawAnalysis {
    RawAnalysis {
        summary: Some("Looks like a mild inflammatory lesion with even borders.".to_string()),
        likely_categories: Some(vec!["acne".to_string(), "folliculitis".to_string()]),
        risk_level: Some("low".to_string()),
        next_steps: Some(vec![
            "Keep area clean".to_string(),
            "Avoid picking".to_string(),
            "Use OTC benzoyl peroxide 2.5%".to_string(),
        ]),
        confidence_percentages: None,
    }
}

/// Camera captures arrive as `data:image/jpeg;base64,...` URLs; the model
/// API wants the bare payload.
fn strip_data_url_prefix(image: &str) -> &str {
    match image.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_json_wrapped_in_prose() {
        let text = "Sure! Here is the result:\n{\"summary\": \"ok\"}\nHope that helps.";
        assert_eq!(first_json_object(text), Some("{\"summary\": \"ok\"}"));
    }

    #[test]
    fn handles_nested_objects_and_braces_in_strings() {
        let text = r#"prefix {"a": {"b": "br}ace"}, "c": 1} suffix"#;
        assert_eq!(
            first_json_object(text),
            Some(r#"{"a": {"b": "br}ace"}, "c": 1}"#)
        );
    }

    #[test]
    fn no_object_yields_none() {
        assert!(first_json_object("the model rambled with no JSON at all").is_none());
        assert!(first_json_object("unbalanced { forever").is_none());
    }

    #[test]
    fn parse_failure_is_a_format_error() {
        let err = parse_embedded_analysis("no json here").unwrap_err();
        assert!(matches!(err, InferenceError::Format(_)));

        let err = parse_embedded_analysis("{not valid json}").unwrap_err();
        assert!(matches!(err, InferenceError::Format(_)));
    }

    #[test]
    fn parses_well_formed_analysis() {
        let raw = parse_embedded_analysis(
            r#"{"summary":"Mild redness","likely_categories":["eczema"],"risk_level":"medium","next_steps":["Moisturize"]}"#,
        )
        .unwrap();
        assert_eq!(raw.summary.as_deref(), Some("Mild redness"));
        assert_eq!(raw.risk_level.as_deref(), Some("medium"));
    }

    #[test]
    fn strips_data_url_prefixes_only() {
        assert_eq!(strip_data_url_prefix("data:image/jpeg;base64,abcd"), "abcd");
        assert_eq!(strip_data_url_prefix("abcd"), "abcd");
        assert_eq!(strip_data_url_prefix("ab,cd"), "ab,cd");
    }

    fn keyless_config() -> AppConfig {
        AppConfig {
            gemini_api_key: None,
            gemini_model: "gemini-1.5-flash".to_string(),
            python_service_url: "http://localhost:8788".to_string(),
            port: 8787,
        }
    }

    #[tokio::test]
    async fn degraded_mode_analyze_returns_mock_without_network() {
        let client = GeminiClient::new(&keyless_config());

        let raw = client.analyze("img").await.unwrap();

        assert_eq!(
            raw.summary.as_deref(),
            Some("Looks like a mild inflammatory lesion with even borders.")
        );
        assert_eq!(
            raw.likely_categories,
            Some(vec!["acne".to_string(), "folliculitis".to_string()])
        );
        assert_eq!(raw.risk_level.as_deref(), Some("low"));
    }

    #[tokio::test]
    async fn degraded_mode_converse_returns_offline_reply() {
        let client = GeminiClient::new(&keyless_config());

        let reply = client.converse("hello", &[]).await.unwrap();

        assert_eq!(reply, OFFLINE_CHAT_REPLY);
    }
}
