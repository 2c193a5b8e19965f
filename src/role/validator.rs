//! Business-rule validation of role definitions and LLM availability.

use super::definition::{RoleDefinition, validate_role_name};
use super::llm::{LlmAvailability, LlmId, LocalModelLister, OllamaLister, is_model_installed};
use super::restriction::RestrictionType;
use super::tool_group::{OPTION_FILE_PATTERN, OPTION_FILE_REGEX, OPTION_MAX_DEPTH, ToolGroup};
use globset::Glob;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Outcome of validating one role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Checks roles before they are handed to the executor.
///
/// The installed local-model list is fetched at most once per validator.
pub struct RoleValidator {
    lister: Arc<dyn LocalModelLister>,
    local_models: OnceCell<Result<Vec<String>, String>>,
}

impl RoleValidator {
    pub fn new(lister: Arc<dyn LocalModelLister>) -> Self {
        Self {
            lister,
            local_models: OnceCell::new(),
        }
    }

    /// Validator that discovers local models with `ollama list`.
    pub fn with_ollama() -> Self {
        Self::new(Arc::new(OllamaLister::new()))
    }

    /// Full validation: structure, consistency and LLM availability.
    pub async fn validate_role(&self, role: &RoleDefinition) -> ValidationReport {
        let (mut errors, mut warnings) = check_structure(role);

        let candidates = role.llm_candidates();
        if candidates.is_empty() {
            warnings.push(format!(
                "Role '{}' configures no LLM; the CLI default model will be used",
                role.name
            ));
            return ValidationReport::from_parts(errors, warnings);
        }

        let mut available = Vec::new();
        let mut unavailable = Vec::new();
        for llm in candidates {
            match LlmId::parse(llm) {
                Err(message) => errors.push(message),
                Ok(id) => {
                    let status = self.availability(&id).await;
                    if status.available {
                        available.push(status);
                    } else {
                        unavailable.push(status);
                    }
                }
            }
        }

        let describe = |status: &LlmAvailability| match &status.reason {
            Some(reason) => format!("{} ({})", status.llm, reason),
            None => status.llm.clone(),
        };

        if available.is_empty() && !unavailable.is_empty() {
            errors.push(format!(
                "No configured LLM is available: {}",
                unavailable.iter().map(describe).collect::<Vec<_>>().join(", ")
            ));
        } else if !unavailable.is_empty() {
            warnings.push(format!(
                "Some configured LLMs are unavailable: {}",
                unavailable.iter().map(describe).collect::<Vec<_>>().join(", ")
            ));
        }

        ValidationReport::from_parts(errors, warnings)
    }

    /// Availability of a single LLM identifier.
    pub async fn check_llm_availability(&self, llm: &str) -> LlmAvailability {
        match LlmId::parse(llm) {
            Ok(id) => self.availability(&id).await,
            Err(reason) => LlmAvailability {
                llm: llm.to_string(),
                available: false,
                reason: Some(reason),
            },
        }
    }

    /// First usable LLM in preference order.
    pub async fn first_available_llm(&self, role: &RoleDefinition) -> Option<LlmId> {
        for llm in role.llm_candidates() {
            if let Ok(id) = LlmId::parse(llm)
                && self.availability(&id).await.available
            {
                return Some(id);
            }
        }
        None
    }

    async fn availability(&self, id: &LlmId) -> LlmAvailability {
        let llm = id.to_string();
        match id {
            LlmId::Ollama { model } => match self.installed_models().await {
                Ok(installed) if is_model_installed(model, installed) => LlmAvailability {
                    llm,
                    available: true,
                    reason: None,
                },
                Ok(_) => LlmAvailability {
                    llm,
                    available: false,
                    reason: Some(format!("model '{}' is not installed in ollama", model)),
                },
                Err(reason) => LlmAvailability {
                    llm,
                    available: false,
                    reason: Some(reason.clone()),
                },
            },
            // API keys are not checked here.
            LlmId::Api { .. } | LlmId::Bare { .. } => LlmAvailability {
                llm,
                available: true,
                reason: None,
            },
        }
    }

    async fn installed_models(&self) -> &Result<Vec<String>, String> {
        self.local_models
            .get_or_init(|| async { self.lister.list_models().await })
            .await
    }
}

/// Structural and consistency checks that need no I/O.
///
/// Returns `(errors, warnings)`.
pub fn check_structure(role: &RoleDefinition) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if role.name.trim().is_empty() {
        errors.push("Role name is required".to_string());
    } else if let Err(e) = validate_role_name(&role.name) {
        errors.push(e.to_string());
    }
    if role.description.trim().is_empty() {
        warnings.push("Role has no description".to_string());
    }
    if role.system_prompt.trim().is_empty() {
        warnings.push("Role has no system prompt".to_string());
    }
    if role.tool_groups.is_empty() {
        warnings.push("Role grants no tool groups".to_string());
    }

    for (kind, value) in role.restrictions.iter() {
        if let Err(message) = kind.check_value(value) {
            errors.push(format!("Restriction '{}': {}", kind, message));
        }
    }

    let mut seen = Vec::new();
    for entry in &role.tool_groups {
        if seen.contains(&entry.group) {
            warnings.push(format!("Tool group '{}' is listed more than once", entry.group));
        }
        seen.push(entry.group);

        if let Some(pattern) = entry.option(OPTION_FILE_PATTERN) {
            match pattern.as_str() {
                Some(glob) => {
                    if let Err(e) = Glob::new(glob) {
                        errors.push(format!("Invalid file_pattern '{}': {}", glob, e));
                    }
                }
                None => errors.push(format!("file_pattern must be text, got {}", pattern.kind())),
            }
        }
        if let Some(pattern) = entry.option(OPTION_FILE_REGEX) {
            match pattern.as_str() {
                Some(re) => {
                    if let Err(e) = Regex::new(re) {
                        errors.push(format!("Invalid file_regex '{}': {}", re, e));
                    }
                }
                None => errors.push(format!("file_regex must be text, got {}", pattern.kind())),
            }
        }
        if let Some(depth) = entry.option(OPTION_MAX_DEPTH)
            && depth.as_u64().is_none_or(|d| d == 0)
        {
            errors.push(format!("max_depth must be a positive integer, got '{}'", depth));
        }
    }

    if role.has_tool_group(ToolGroup::Edit)
        && !role.restrictions.contains(RestrictionType::MaxFileChanges)
    {
        warnings.push(
            "Role has edit access but no max_file_changes restriction".to_string(),
        );
    }
    if role.has_tool_group(ToolGroup::Command)
        && !role.restrictions.is_enabled(RestrictionType::RequireApproval)
    {
        warnings.push(
            "Role has command access but does not require approval".to_string(),
        );
    }
    if role.has_tool_group(ToolGroup::Coordination) && role.max_task_depth().is_none() {
        warnings.push(
            "Role can coordinate subtasks but declares no max_task_depth".to_string(),
        );
    }

    if role.parent_role.as_deref().map(str::trim) == Some(role.name.as_str()) {
        warnings.push("Role lists itself as its parent".to_string());
    }

    (errors, warnings)
}

/// Heuristic LLM suggestions for a role, excluding LLMs it already configures.
pub fn suggest_llm_alternatives(role: &RoleDefinition) -> Vec<String> {
    let has_task = |types: &[&str]| {
        role.task_types
            .iter()
            .any(|t| types.contains(&t.to_ascii_lowercase().as_str()))
    };

    let mut pool: Vec<&str> = Vec::new();
    if role.has_tool_group(ToolGroup::Edit)
        || role.has_tool_group(ToolGroup::Command)
        || has_task(&["implementation", "bugfix", "refactoring", "testing", "coding"])
    {
        pool.extend([
            "anthropic:claude-3-5-sonnet",
            "openai:gpt-4o",
            "local:ollama:codellama",
        ]);
    }
    if role.has_tool_group(ToolGroup::Browser) || has_task(&["research", "analysis", "documentation"]) {
        pool.extend([
            "anthropic:claude-3-5-sonnet",
            "google:gemini-1.5-pro",
            "openai:gpt-4o",
        ]);
    }
    if role.has_tool_group(ToolGroup::Coordination) || has_task(&["planning", "coordination"]) {
        pool.extend(["anthropic:claude-3-opus", "openai:gpt-4o"]);
    }
    if role.granted_groups() == [ToolGroup::Read] || has_task(&["review", "audit"]) {
        pool.extend(["anthropic:claude-3-5-haiku", "openai:gpt-4o-mini"]);
    }
    if pool.is_empty() {
        pool.extend(["anthropic:claude-3-5-sonnet", "openai:gpt-4o", "local:ollama:llama3"]);
    }

    let configured = role.llm_candidates();
    let mut suggestions: Vec<String> = Vec::new();
    for llm in pool {
        if !configured.contains(&llm) && !suggestions.iter().any(|s| s == llm) {
            suggestions.push(llm.to_string());
        }
    }
    suggestions
}
