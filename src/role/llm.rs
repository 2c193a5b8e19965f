//! LLM identifiers and local-model discovery.

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Bare model names accepted without a provider prefix.
pub const KNOWN_BARE_MODELS: &[&str] = &[
    "claude-3-5-sonnet",
    "claude-3-5-haiku",
    "claude-3-opus",
    "claude-3-sonnet",
    "claude-3-haiku",
    "claude-sonnet-4",
    "claude-opus-4",
    "gpt-4",
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4-turbo",
    "gpt-3.5-turbo",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
];

/// How long `ollama list` may take before Ollama is considered unavailable.
pub const LOCAL_LIST_TIMEOUT: Duration = Duration::from_secs(5);

static PROVIDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("Invalid provider regex"));

static MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:/-]*$").expect("Invalid model name regex")
});

/// A parsed LLM identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmId {
    /// `local:ollama:<model>`
    Ollama { model: String },
    /// `<provider>:<model>`
    Api { provider: String, model: String },
    /// A known bare model name such as `gpt-4o`.
    Bare { model: String },
}

impl LlmId {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("LLM identifier is empty".to_string());
        }

        if let Some(rest) = raw.strip_prefix("local:") {
            return match rest.split_once(':') {
                Some(("ollama", model)) if MODEL_RE.is_match(model) => Ok(LlmId::Ollama {
                    model: model.to_string(),
                }),
                _ => Err(format!(
                    "invalid local LLM '{}': expected local:ollama:<model>",
                    raw
                )),
            };
        }

        if let Some((provider, model)) = raw.split_once(':') {
            if PROVIDER_RE.is_match(provider) && MODEL_RE.is_match(model) {
                return Ok(LlmId::Api {
                    provider: provider.to_string(),
                    model: model.to_string(),
                });
            }
            return Err(format!(
                "invalid LLM '{}': expected <provider>:<model> or local:ollama:<model>",
                raw
            ));
        }

        if KNOWN_BARE_MODELS.contains(&raw) {
            return Ok(LlmId::Bare {
                model: raw.to_string(),
            });
        }
        Err(format!(
            "invalid LLM '{}': unknown bare model name, use <provider>:<model>",
            raw
        ))
    }

    pub fn model(&self) -> &str {
        match self {
            LlmId::Ollama { model } | LlmId::Api { model, .. } | LlmId::Bare { model } => model,
        }
    }

    /// Model name to hand the Claude CLI via `--model`, if it can take it.
    pub fn claude_model(&self) -> Option<&str> {
        match self {
            LlmId::Api { provider, model } if provider == "anthropic" => Some(model),
            LlmId::Bare { model } if model.starts_with("claude") => Some(model),
            _ => None,
        }
    }
}

impl fmt::Display for LlmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmId::Ollama { model } => write!(f, "local:ollama:{}", model),
            LlmId::Api { provider, model } => write!(f, "{}:{}", provider, model),
            LlmId::Bare { model } => f.write_str(model),
        }
    }
}

/// Availability of one configured LLM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmAvailability {
    pub llm: String,
    pub available: bool,
    pub reason: Option<String>,
}

/// Source of installed local models.
#[async_trait]
pub trait LocalModelLister: Send + Sync {
    /// Installed model names, or a reason local models cannot be listed.
    async fn list_models(&self) -> Result<Vec<String>, String>;
}

/// Lists models via `ollama list`.
#[derive(Debug, Clone)]
pub struct OllamaLister {
    binary: String,
    timeout: Duration,
}

impl OllamaLister {
    pub fn new() -> Self {
        Self {
            binary: "ollama".to_string(),
            timeout: LOCAL_LIST_TIMEOUT,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

impl Default for OllamaLister {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalModelLister for OllamaLister {
    async fn list_models(&self) -> Result<Vec<String>, String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("list")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("failed to run '{} list': {}", self.binary, e)),
            Err(_) => {
                return Err(format!(
                    "'{} list' timed out after {}s",
                    self.binary,
                    self.timeout.as_secs()
                ));
            }
        };

        if !output.status.success() {
            return Err(format!(
                "'{} list' failed: {}",
                self.binary,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let models = parse_ollama_list(&String::from_utf8_lossy(&output.stdout));
        debug!(count = models.len(), "listed local ollama models");
        Ok(models)
    }
}

/// Parse `ollama list` output: a header line, then one model per line with the
/// name in the first column.
pub fn parse_ollama_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| !name.eq_ignore_ascii_case("NAME"))
        .map(str::to_string)
        .collect()
}

/// Whether `model` is among `installed`, treating a missing tag as `:latest`.
pub fn is_model_installed(model: &str, installed: &[String]) -> bool {
    installed.iter().any(|name| {
        name == model
            || (!model.contains(':') && name.strip_suffix(":latest") == Some(model))
            || (model.ends_with(":latest") && model.strip_suffix(":latest") == Some(name.as_str()))
    })
}
