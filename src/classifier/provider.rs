//! Change-analysis capability and its HTTP realization.
//!
//! [`AnalysisProvider`] is the seam the classifier consumes; anything that
//! can turn a shaped changeset into an [`AiAnalysis`] qualifies.
//! [`HttpAnalysisProvider`] talks to an OpenAI-compatible chat-completions
//! endpoint.
//!
//! # Configuration
//!
//! Endpoint settings can be configured via environment variables:
//! - `WEB_VISION_AI_ENDPOINT`: API endpoint URL
//! - `WEB_VISION_AI_MODEL`: Model name
//! - `WEB_VISION_AI_MAX_TOKENS`: Max tokens in response
//! - `WEB_VISION_AI_TIMEOUT`: Response timeout (seconds)
//! - `WEB_VISION_AI_CONNECT_TIMEOUT`: Connection timeout (seconds)

use std::process::Command;

use tracing::debug;

use crate::classifier::types::{AiAnalysis, AnalysisRequest};
use crate::config;
use crate::error::{VisionError, VisionResult};

/// Capability that classifies a changeset into visual-impact analysis
pub trait AnalysisProvider: Send + Sync {
    /// Analyze a shaped changeset request
    fn analyze(&self, request: &AnalysisRequest) -> VisionResult<AiAnalysis>;
}

/// Analysis provider backed by an OpenAI-compatible HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpAnalysisProvider {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name to use
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Timeout for initial connection (seconds)
    pub connection_timeout: u64,
    /// Timeout for the full response (seconds)
    pub response_timeout: u64,
}

impl Default for HttpAnalysisProvider {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            endpoint: cfg.ai.endpoint.clone(),
            model: cfg.ai.model.clone(),
            max_tokens: cfg.ai.max_tokens,
            connection_timeout: cfg.ai.connect_timeout,
            response_timeout: cfg.ai.response_timeout,
        }
    }
}

impl HttpAnalysisProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn response_timeout(mut self, seconds: u64) -> Self {
        self.response_timeout = seconds;
        self
    }
}

impl AnalysisProvider for HttpAnalysisProvider {
    fn analyze(&self, request: &AnalysisRequest) -> VisionResult<AiAnalysis> {
        let prompt = build_classification_prompt(request);

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": prompt
            }],
            "max_tokens": self.max_tokens,
            "temperature": 0
        });

        let body_json = serde_json::to_string(&body)
            .map_err(|e| VisionError::Classification(e.to_string()))?;

        debug!(endpoint = %self.endpoint, model = %self.model, "sending analysis request");

        let output = Command::new("curl")
            .args([
                "-s",
                "-X", "POST",
                &self.endpoint,
                "-H", "Content-Type: application/json",
                "-d", &body_json,
                "--connect-timeout", &self.connection_timeout.to_string(),
                "--max-time", &self.response_timeout.to_string(),
            ])
            .output()
            .map_err(|e| VisionError::Classification(format!("failed to spawn curl: {}", e)))?;

        if !output.status.success() {
            return Err(VisionError::Classification(format!(
                "analysis endpoint unreachable: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let response: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| VisionError::Classification(format!("invalid response: {}", e)))?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");

        if content.is_empty() {
            return Err(VisionError::Classification(
                "analysis response carried no content".to_string(),
            ));
        }

        parse_analysis(content)
    }
}

/// Parse the model's text reply into an [`AiAnalysis`].
///
/// The reply may wrap its JSON in markdown fences or surrounding prose; the
/// first balanced JSON object is extracted and deserialized.
pub fn parse_analysis(content: &str) -> VisionResult<AiAnalysis> {
    let json = extract_json(content).ok_or_else(|| {
        VisionError::Classification("no JSON object found in analysis reply".to_string())
    })?;

    serde_json::from_str(json)
        .map_err(|e| VisionError::Classification(format!("malformed analysis JSON: {}", e)))
}

/// Extract the first balanced JSON object from free-form text
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Build the classification prompt for a shaped changeset request
pub fn build_classification_prompt(request: &AnalysisRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are reviewing a code change to a web application to decide which routes \
         need visual regression testing.\n\n",
    );

    if let Some(context) = &request.project_context {
        prompt.push_str("Project context:\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Changed files:\n");
    for file in &request.changed_files {
        prompt.push_str("- ");
        prompt.push_str(file);
        prompt.push('\n');
    }

    prompt.push_str("\nKnown application routes (recommend ONLY from this list):\n");
    for route in &request.known_routes {
        prompt.push_str("- ");
        prompt.push_str(route);
        prompt.push('\n');
    }

    prompt.push_str("\nDiff:\n```\n");
    prompt.push_str(&request.diff);
    prompt.push_str("\n```\n\n");

    prompt.push_str(
        "Reply with a single JSON object, no prose, using this shape:\n\
         {\n\
         \x20 \"changes\": [{\"file\": \"...\", \"category\": \"component|store|util|route|layout|style|other\", \
         \"visualImpact\": true, \"rationale\": \"...\", \"affectedElements\": [\"...\"]}],\n\
         \x20 \"routes\": [{\"route\": \"...\", \"rationale\": \"...\", \"priority\": \"high|medium|low\", \
         \"authRequired\": false, \"wait\": \"networkidle|domcontentloaded|load|custom\", \"customWait\": null}],\n\
         \x20 \"loginFlow\": {\"loginUrl\": \"...\", \"usernameSelector\": \"...\", \"passwordSelector\": \"...\", \
         \"submitSelector\": \"...\", \"successIndicator\": \"...\", \"expectedUrl\": null},\n\
         \x20 \"confidence\": 0.0,\n\
         \x20 \"reasoning\": \"...\"\n\
         }\n\
         Omit loginFlow unless some recommended route requires authentication.",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            diff: "diff --git a/src/Cart.vue b/src/Cart.vue".to_string(),
            changed_files: vec!["src/Cart.vue".to_string()],
            known_routes: vec!["/cart".to_string(), "/checkout".to_string()],
            project_context: Some("Vue storefront".to_string()),
        }
    }

    #[test]
    fn test_prompt_includes_inventory_and_files() {
        let prompt = build_classification_prompt(&request());
        assert!(prompt.contains("/cart"));
        assert!(prompt.contains("/checkout"));
        assert!(prompt.contains("src/Cart.vue"));
        assert!(prompt.contains("Vue storefront"));
    }

    #[test]
    fn test_extract_json_plain() {
        let text = r#"{"routes": []}"#;
        assert_eq!(extract_json(text), Some(r#"{"routes": []}"#));
    }

    #[test]
    fn test_extract_json_fenced_with_prose() {
        let text = "Here is my analysis:\n```json\n{\"confidence\": 0.8}\n```\nHope that helps.";
        assert_eq!(extract_json(text), Some("{\"confidence\": 0.8}"));
    }

    #[test]
    fn test_extract_json_nested_and_strings() {
        let text = r#"{"a": {"b": "closing } inside string"}, "c": 1} trailing"#;
        assert_eq!(
            extract_json(text),
            Some(r#"{"a": {"b": "closing } inside string"}, "c": 1}"#)
        );
    }

    #[test]
    fn test_parse_analysis_malformed_is_classification_error() {
        let err = parse_analysis("no json here at all").unwrap_err();
        assert!(matches!(err, VisionError::Classification(_)));

        let err = parse_analysis("{\"routes\": [{]}").unwrap_err();
        assert!(matches!(err, VisionError::Classification(_)));
    }

    #[test]
    fn test_parse_analysis_valid() {
        let analysis =
            parse_analysis("```json\n{\"routes\": [{\"route\": \"/cart\"}], \"confidence\": 0.7}\n```")
                .unwrap();
        assert_eq!(analysis.routes.len(), 1);
        assert!((analysis.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_provider_builder() {
        let provider = HttpAnalysisProvider::new("http://localhost:8080")
            .model("llama3")
            .max_tokens(500)
            .response_timeout(30);

        assert_eq!(provider.endpoint, "http://localhost:8080");
        assert_eq!(provider.model, "llama3");
        assert_eq!(provider.max_tokens, 500);
        assert_eq!(provider.response_timeout, 30);
    }
}
