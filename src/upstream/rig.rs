//! rig-core integration for LLM-backed code analysis.
//!
//! Uses rig-core's provider clients and Agent abstraction. Currently
//! supports Anthropic, OpenAI, and any OpenAI-compatible API (e.g.
//! Ollama, Together, local servers).

use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::config::ProviderConfig;
use crate::models::ProviderName;

use super::{RawAnalysis, UpstreamAnalyzer, UpstreamError};

/// Maximum tokens per LLM completion response.
///
/// Set high enough to accommodate thinking models that consume part of
/// the budget for internal reasoning tokens.
const MAX_TOKENS: u64 = 65536;

/// Maximum length of LLM response text to include in parse error messages.
const PARSE_ERROR_PREVIEW_LEN: usize = 2000;

/// System prompt for the analysis agent.
const SYSTEM_PROMPT: &str = "You are a code analysis engine. You examine source code and \
    return a structured quality assessment: an overall quality score (0-100), concrete \
    improvement suggestions with line numbers, detected design patterns, security issues, \
    and basic metrics. Respond with a single JSON object and nothing else.";

/// Build a simple agent from a rig-core client and prompt it.
///
/// Always sets `max_tokens`: all rig-core providers support it and
/// without it some default to a low limit that truncates responses.
macro_rules! prompt_analysis {
    ($client:expr, $model:expr, $user:expr, $label:expr) => {{
        let agent = $client
            .agent($model)
            .preamble(SYSTEM_PROMPT)
            .temperature(0.0)
            .max_tokens(MAX_TOKENS)
            .output_schema::<RawAnalysis>()
            .build();
        agent.prompt($user).await.map_err(|e| {
            let message = format!("{} API error: {e}", $label);
            UpstreamError::Api {
                status: extract_status(&message),
                message,
            }
        })
    }};
}

/// rig-core based upstream analyzer.
///
/// Wraps rig-core's multi-provider client system. The provider name in
/// config selects which rig-core provider to use.
pub struct RigAnalyzer {
    config: ProviderConfig,
}

impl RigAnalyzer {
    /// Create a new analyzer with the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, UpstreamError> {
        if config.api_key.is_none() {
            return Err(UpstreamError::NotConfigured(format!(
                "no API key found for provider '{}'. Set {} or the provider-specific env var.",
                config.name,
                crate::constants::ENV_API_KEY
            )));
        }
        Ok(Self { config })
    }

    /// Get the API key or return an error.
    fn api_key(&self) -> Result<&str, UpstreamError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| UpstreamError::NotConfigured("missing API key".to_string()))
    }

    /// Require `base_url` for OpenAI-compatible providers.
    fn require_base_url(&self) -> Result<&str, UpstreamError> {
        self.config.base_url.as_deref().ok_or_else(|| {
            UpstreamError::NotConfigured(
                "openai-compatible provider requires base_url to be set".to_string(),
            )
        })
    }

    /// Make a completion call through rig-core and return the raw response text.
    async fn call_rig(&self, user_prompt: &str) -> Result<String, UpstreamError> {
        let api_key = self.api_key()?;
        let model = self.config.model.as_str();

        match self.config.name {
            ProviderName::Anthropic => {
                let client: providers::anthropic::Client = providers::anthropic::Client::builder()
                    .api_key(api_key)
                    .build()
                    .map_err(|e| UpstreamError::Api {
                        status: None,
                        message: format!("failed to create Anthropic client: {e}"),
                    })?;
                prompt_analysis!(client, model, user_prompt, "Anthropic")
            }
            ProviderName::OpenAI => {
                let mut builder = providers::openai::CompletionsClient::builder().api_key(api_key);
                if let Some(ref base_url) = self.config.base_url {
                    builder = builder.base_url(base_url);
                }
                let client: providers::openai::CompletionsClient =
                    builder.build().map_err(|e| UpstreamError::Api {
                        status: None,
                        message: format!("failed to create OpenAI client: {e}"),
                    })?;
                prompt_analysis!(client, model, user_prompt, "OpenAI")
            }
            ProviderName::OpenAICompatible => {
                let base_url = self.require_base_url()?;
                let client: providers::openai::CompletionsClient =
                    providers::openai::CompletionsClient::builder()
                        .api_key(api_key)
                        .base_url(base_url)
                        .build()
                        .map_err(|e| UpstreamError::Api {
                            status: None,
                            message: format!("failed to create OpenAI-compatible client: {e}"),
                        })?;
                prompt_analysis!(client, model, user_prompt, "OpenAI-compatible")
            }
        }
    }
}

#[async_trait]
impl UpstreamAnalyzer for RigAnalyzer {
    async fn invoke(
        &self,
        code_content: &str,
        file_path: &str,
        options: &IndexMap<String, serde_json::Value>,
    ) -> Result<RawAnalysis, UpstreamError> {
        let prompt = build_analysis_prompt(code_content, file_path, options);
        let response = self.call_rig(&prompt).await?;
        parse_analysis_response(&response)
    }
}

/// Build the user prompt for a single analysis.
fn build_analysis_prompt(
    code_content: &str,
    file_path: &str,
    options: &IndexMap<String, serde_json::Value>,
) -> String {
    let mut prompt = format!("## File: {file_path}\n\n```\n{code_content}\n```\n\n");

    if !options.is_empty() {
        let opts = serde_json::to_string_pretty(options).unwrap_or_else(|_| "{}".to_string());
        prompt.push_str(&format!("## Options\n\n```json\n{opts}\n```\n\n"));
    }

    prompt.push_str(
        "## Instructions\n\n\
        Analyze the code above. Return a JSON object with:\n\
        - \"quality_score\": integer 0-100\n\
        - \"suggestions\": array of {\"kind\", \"severity\", \"line\", \"column\", \
        \"message\", \"suggested_fix\", \"confidence\"}\n\
        - \"patterns\": array of detected design pattern names\n\
        - \"security_issues\": array of {\"severity\", \"description\", \"line\"}\n\
        - \"metrics\": {\"complexity\", \"maintainability_index\", \"lines_of_code\", \"language\"}\n\n\
        \"kind\" MUST be one of: \"security\", \"performance\", \"maintainability\", \"style\".\n\
        \"severity\" MUST be one of: \"critical\", \"high\", \"medium\", \"low\".\n\
        \"confidence\" is a number between 0 and 1.\n\
        If the code has no issues, return an empty suggestions array.\n",
    );

    prompt
}

/// Regex for extracting content inside markdown code fences.
///
/// The closing ``` must appear at the start of a line (`\n````) to avoid
/// matching triple-backticks embedded inside JSON string values (e.g.
/// suggested_fix fields containing code examples).
static FENCE_RE: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n```").unwrap());

/// Regex for pulling an HTTP status code out of an error message.
static STATUS_RE: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"\b([45]\d{2})\b").unwrap());

/// Extract an HTTP status code from a provider error message, if one
/// is present. rig-core flattens HTTP failures into strings, so this
/// is the only place the code appears.
pub(crate) fn extract_status(message: &str) -> Option<u16> {
    STATUS_RE
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse the LLM response text into a structured analysis.
///
/// With `output_schema` enforcing the JSON schema at the provider
/// level, the response is expected to be valid JSON. Some providers
/// still wrap it in markdown code fences or prose, so candidate
/// extraction runs first.
fn parse_analysis_response(response: &str) -> Result<RawAnalysis, UpstreamError> {
    let trimmed = response.trim();

    if trimmed.is_empty() {
        return Err(UpstreamError::Parse("empty response".to_string()));
    }

    for candidate in extract_json_candidates(trimmed) {
        if let Ok(raw) = serde_json::from_str::<RawAnalysis>(&candidate) {
            return Ok(raw);
        }
    }

    Err(UpstreamError::Parse(format!(
        "could not parse LLM response as analysis JSON. Response: {}",
        &response[..response.len().min(PARSE_ERROR_PREVIEW_LEN)]
    )))
}

/// Extract candidate JSON strings from a response.
///
/// Returns the trimmed response itself, the outermost `{...}` slice,
/// and any content inside markdown code fences.
fn extract_json_candidates(text: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    // First candidate: the raw text
    candidates.push(text.to_string());

    // Second: brace extraction — find the first '{' and last '}'.
    // This is the most robust strategy when the response contains
    // nested code fences inside JSON string values.
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(text[start..=end].to_string());
        }
    }

    // Third: extract content from markdown code fences.
    for cap in FENCE_RE.captures_iter(text) {
        if let Some(inner) = cap.get(1) {
            let inner_trimmed = inner.as_str().trim();
            if !inner_trimmed.is_empty() {
                candidates.push(inner_trimmed.to_string());
            }
        }
    }

    candidates
}
