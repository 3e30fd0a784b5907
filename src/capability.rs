//! Client for the hosted capability service.
//!
//! Every stage of the pipeline is an invocation of a named capability on the
//! assistant. The transport is a single POST per invocation; the service
//! expands `{placeholder}` templates in context values, so lone braces in a
//! context value must be doubled before transmission. That escaping happens
//! here, not at the call sites.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::AssistantConfig;
use crate::error::{AssistantError, Result};

lazy_static! {
    static ref BRACE_RUN: Regex = Regex::new(r"\{+|\}+").unwrap();
}

/// Double lone braces so the capability transport treats them as literals.
/// Runs of two or more are already escaped and pass through unchanged,
/// which makes this safe to apply more than once.
pub fn escape_braces(text: &str) -> String {
    BRACE_RUN
        .replace_all(text, |caps: &Captures| {
            let run = &caps[0];
            if run.len() == 1 {
                format!("{0}{0}", run)
            } else {
                run.to_string()
            }
        })
        .into_owned()
}

/// One capability invocation.
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    pub capability_name: String,
    pub query: String,
    pub context: Option<HashMap<String, String>>,
    pub history: Option<String>,
    pub stream: bool,
    pub timeout_secs: u64,
    pub model_key: Option<String>,
}

/// Structured reply from a capability. Fields the service omits
/// deserialize to their empty values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub related_queries: Vec<String>,
    #[serde(default)]
    pub conversation_history: String,
}

/// Transport seam for capability invocations. The production client speaks
/// to the hosted service; tests substitute a scripted invoker.
#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    async fn invoke(&self, request: &CapabilityRequest) -> Result<CapabilityResponse>;
}

/// HTTP client for the Conva capability endpoint.
pub struct ConvaClient {
    assistant_id: String,
    api_key: String,
    assistant_version: String,
    base_url: String,
    client: reqwest::Client,
}

impl ConvaClient {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            assistant_id: config.assistant_id.clone(),
            api_key: config.api_key.clone(),
            assistant_version: config.assistant_version.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn build_payload(&self, request: &CapabilityRequest) -> Value {
        let context: Map<String, Value> = request
            .context
            .iter()
            .flatten()
            .map(|(key, value)| (key.clone(), Value::String(escape_braces(value))))
            .collect();

        serde_json::json!({
            "assistant_id": self.assistant_id,
            "assistant_version": self.assistant_version,
            "capability_name": request.capability_name,
            "query": request.query,
            "capability_context": context,
            "history": request.history,
            "stream": request.stream,
            "timeout": request.timeout_secs,
            "llm_key": request.model_key,
        })
    }
}

#[async_trait]
impl CapabilityInvoker for ConvaClient {
    async fn invoke(&self, request: &CapabilityRequest) -> Result<CapabilityResponse> {
        let payload = self.build_payload(request);
        debug!(
            "Invoking {} for query {:?}",
            request.capability_name, request.query
        );

        let response = self
            .client
            .post(format!("{}/v1/capabilities/invoke", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(request.timeout_secs))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                AssistantError::Capability(format!(
                    "{} call failed: {}",
                    request.capability_name, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Capability(format!(
                "{} returned {}: {}",
                request.capability_name, status, body
            )));
        }

        let parsed = response.json::<CapabilityResponse>().await.map_err(|e| {
            AssistantError::Capability(format!(
                "Failed to parse {} response: {}",
                request.capability_name, e
            ))
        })?;
        debug!(
            "{} replied: {} chars, {} parameters, {} related",
            request.capability_name,
            parsed.message.len(),
            parsed.parameters.len(),
            parsed.related_queries.len()
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_lone_braces() {
        assert_eq!(escape_braces("{state}"), "{{state}}");
        assert_eq!(escape_braces("a { b } c"), "a {{ b }} c");
    }

    #[test]
    fn leaves_doubled_braces_alone() {
        assert_eq!(escape_braces("{{state}}"), "{{state}}");
        assert_eq!(escape_braces("{{{x}}}"), "{{{x}}}");
    }

    #[test]
    fn escaping_is_idempotent() {
        let inputs = ["{state}", "{{state}}", "plain text", "{a} and {{b}}"];
        for input in inputs {
            let once = escape_braces(input);
            assert_eq!(escape_braces(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn payload_carries_escaped_context() {
        let config = AssistantConfig {
            assistant_id: "asst".to_string(),
            api_key: "key".to_string(),
            assistant_version: "6.0.0".to_string(),
            base_url: "https://api.example.com".to_string(),
            generation_model_key: "openai-gpt-4o-2024-08-06".to_string(),
            capability_timeout_secs: 600,
            transactions_csv: "data/pp_transactions.csv".into(),
            users_csv: "data/pp_users.csv".into(),
            related_seed: "data/related.json".into(),
        };
        let client = ConvaClient::new(&config);
        let request = CapabilityRequest {
            capability_name: "data_analysis".to_string(),
            query: "how is {state} doing".to_string(),
            context: Some(HashMap::from([(
                "data_analysis".to_string(),
                "Results: {state}".to_string(),
            )])),
            history: None,
            stream: false,
            timeout_secs: 600,
            model_key: None,
        };

        let payload = client.build_payload(&request);
        assert_eq!(
            payload["capability_context"]["data_analysis"],
            serde_json::json!("Results: {{state}}")
        );
        assert_eq!(payload["assistant_id"], serde_json::json!("asst"));
        assert_eq!(payload["assistant_version"], serde_json::json!("6.0.0"));
        assert_eq!(payload["timeout"], serde_json::json!(600));
        assert_eq!(payload["llm_key"], Value::Null);
        assert_eq!(payload["query"], serde_json::json!("how is {state} doing"));
    }

    #[test]
    fn response_fields_default_when_missing() {
        let response: CapabilityResponse =
            serde_json::from_value(serde_json::json!({ "message": "hello" })).unwrap();
        assert_eq!(response.message, "hello");
        assert!(response.parameters.is_empty());
        assert!(response.related_queries.is_empty());
        assert_eq!(response.conversation_history, "");
    }
}
