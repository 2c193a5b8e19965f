//! Everything an execution hands to the agent, and how it is rendered.
//!
//! The rendered prompt is the only channel through which role instructions
//! reach the agent. The role preamble (header, instructions, tool access and
//! restrictions) is kept within a character budget; the task itself and its
//! reference material are never shortened.

use crate::role::{RoleDefinition, ToolGroup};
use crate::role::tool_group::{OPTION_FILE_PATTERN, OPTION_FILE_REGEX, OPTION_MAX_DEPTH};
use std::fmt::Write as _;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Appended when the role preamble had to be cut.
pub const TRUNCATION_MARKER: &str = "\n[... role instructions truncated ...]";

const CLOSING_INSTRUCTIONS: &str = "Work only within the tool access and restrictions listed above. \
If a restriction prevents you from completing the task, stop and explain which restriction \
blocked you and what would be needed to finish. Report every file you create or change on its \
own line as `Created: <path>` or `Modified: <path>`.";

/// A reference document attached to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedDocument {
    pub title: String,
    pub location: Option<String>,
    pub content: String,
}

impl LinkedDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            location: None,
            content: content.into(),
        }
    }

    /// Read a document from disk, titled by its file name.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            title,
            location: Some(path.display().to_string()),
            content,
        })
    }
}

/// Material for one execution. Owned by that execution alone.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub role: Arc<RoleDefinition>,
    pub task_prompt: String,
    pub linked_documents: Vec<LinkedDocument>,
    pub project_context: Option<String>,
    pub parent_context: Option<String>,
    /// Human-readable restriction descriptions.
    pub restrictions: Vec<String>,
    pub validation_requirements: Vec<String>,
    /// Character budget for the role preamble; unlimited when `None`.
    pub preamble_limit: Option<usize>,
}

impl ExecutionContext {
    pub fn new(role: Arc<RoleDefinition>, task_prompt: impl Into<String>) -> Self {
        let restrictions = role.restrictions.descriptions();
        let validation_requirements = role.validation_rules.clone();
        Self {
            role,
            task_prompt: task_prompt.into(),
            linked_documents: Vec::new(),
            project_context: None,
            parent_context: None,
            restrictions,
            validation_requirements,
            preamble_limit: None,
        }
    }

    pub fn with_documents(mut self, documents: Vec<LinkedDocument>) -> Self {
        self.linked_documents = documents;
        self
    }

    pub fn with_project_context(mut self, context: Option<String>) -> Self {
        self.project_context = non_blank(context);
        self
    }

    pub fn with_parent_context(mut self, context: Option<String>) -> Self {
        self.parent_context = non_blank(context);
        self
    }

    pub fn with_preamble_limit(mut self, limit: usize) -> Self {
        self.preamble_limit = Some(limit);
        self
    }

    /// The complete prompt written to the agent's stdin.
    pub fn render_prompt(&self) -> String {
        let mut out = self.render_preamble();
        out.push_str("\n\n");

        if !self.validation_requirements.is_empty() {
            out.push_str("## Validation Requirements\n");
            for rule in &self.validation_requirements {
                let _ = writeln!(out, "- {}", rule);
            }
            out.push('\n');
        }

        if !self.linked_documents.is_empty() {
            out.push_str("## Reference Documents\n");
            for doc in &self.linked_documents {
                match &doc.location {
                    Some(location) => {
                        let _ = writeln!(out, "\n### {} ({})", doc.title, location);
                    }
                    None => {
                        let _ = writeln!(out, "\n### {}", doc.title);
                    }
                }
                out.push_str(doc.content.trim_end());
                out.push('\n');
            }
            out.push('\n');
        }

        if let Some(context) = &self.project_context {
            let _ = write!(out, "## Project Context\n{}\n\n", context.trim_end());
        }
        if let Some(context) = &self.parent_context {
            let _ = write!(out, "## Parent Task Context\n{}\n\n", context.trim_end());
        }

        let _ = write!(out, "## Task\n{}\n\n", self.task_prompt.trim());
        let _ = write!(out, "## Completion\n{}\n", CLOSING_INSTRUCTIONS);
        out
    }

    /// The role preamble, shortened to fit [`preamble_limit`](Self::preamble_limit).
    pub fn render_preamble(&self) -> String {
        let full = self.full_preamble();
        let Some(limit) = self.preamble_limit else {
            return full;
        };
        if full.chars().count() <= limit {
            return full;
        }

        let compact = self.compact_preamble();
        if compact.chars().count() <= limit {
            return compact;
        }
        truncate_with_marker(&compact, limit)
    }

    fn full_preamble(&self) -> String {
        let role = &self.role;
        let mut out = format!("# Role: {}", role.title());
        if role.title() != role.name {
            let _ = write!(out, " ({})", role.name);
        }
        out.push('\n');
        if !role.description.trim().is_empty() {
            let _ = writeln!(out, "{}", role.description.trim());
        }

        if !role.system_prompt.trim().is_empty() {
            let _ = write!(out, "\n## Instructions\n{}\n", role.system_prompt.trim());
        }

        out.push_str("\n## Tool Access\n");
        if role.tool_groups.is_empty() {
            out.push_str("- none: answer from the provided material only\n");
        }
        for entry in &role.tool_groups {
            let _ = write!(out, "- {}: {}", entry.group, entry.group.describe());
            if let Some(note) = tool_group_note(entry.group, role) {
                let _ = write!(out, " ({})", note);
            }
            out.push('\n');
        }

        out.push_str("\n## Restrictions\n");
        if self.restrictions.is_empty() {
            out.push_str("- none\n");
        }
        for restriction in &self.restrictions {
            let _ = writeln!(out, "- {}", restriction);
        }
        out.trim_end().to_string()
    }

    fn compact_preamble(&self) -> String {
        let role = &self.role;
        let mut out = format!("# Role: {}\n", role.name);
        if let Some(first) = role
            .system_prompt
            .split("\n\n")
            .map(str::trim)
            .find(|p| !p.is_empty())
        {
            let _ = writeln!(out, "{}", first.replace('\n', " "));
        }

        let tools = role
            .tool_groups
            .iter()
            .map(|entry| entry.summary())
            .collect::<Vec<_>>();
        let _ = writeln!(
            out,
            "Tools: {}",
            if tools.is_empty() { "none".to_string() } else { tools.join(", ") }
        );
        if !self.restrictions.is_empty() {
            let _ = writeln!(out, "Restrictions: {}", self.restrictions.join("; "));
        }
        out.trim_end().to_string()
    }
}

fn tool_group_note(group: ToolGroup, role: &RoleDefinition) -> Option<String> {
    let entry = role.tool_group(group)?;
    if let Some(pattern) = entry.option(OPTION_FILE_PATTERN) {
        return Some(format!("only paths matching `{}`", pattern));
    }
    if let Some(pattern) = entry.option(OPTION_FILE_REGEX) {
        return Some(format!("only paths matching regex `{}`", pattern));
    }
    entry
        .option(OPTION_MAX_DEPTH)
        .map(|depth| format!("subtask depth below {}", depth))
}

fn truncate_with_marker(text: &str, limit: usize) -> String {
    let keep = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{RestrictionType, ScalarValue, ToolGroupEntry};

    fn coder() -> Arc<RoleDefinition> {
        let mut role = RoleDefinition::new("coder");
        role.display_name = "Coder".to_string();
        role.description = "Writes code".to_string();
        role.system_prompt = "Write careful code.\n\nAlways run the tests.".to_string();
        role.tool_groups = vec![
            ToolGroupEntry::new(ToolGroup::Read),
            ToolGroupEntry::new(ToolGroup::Edit)
                .with_option(OPTION_FILE_PATTERN, ScalarValue::Text("*.py".to_string())),
        ];
        role.restrictions
            .insert(RestrictionType::MaxFileChanges, ScalarValue::Int(3));
        role.validation_rules = vec!["tests_pass".to_string()];
        Arc::new(role)
    }

    #[test]
    fn test_renders_every_section_in_order() {
        let ctx = ExecutionContext::new(coder(), "Fix the parser")
            .with_documents(vec![LinkedDocument::new("Design", "Use a lexer.")])
            .with_project_context(Some("A CLI tool".to_string()))
            .with_parent_context(Some("Epic: parsing".to_string()));
        let prompt = ctx.render_prompt();

        let order = [
            "# Role: Coder (coder)",
            "## Instructions",
            "## Tool Access",
            "only paths matching `*.py`",
            "## Restrictions",
            "You may modify at most 3 files",
            "## Validation Requirements",
            "## Reference Documents",
            "### Design",
            "## Project Context",
            "## Parent Task Context",
            "## Task\nFix the parser",
            "## Completion",
            "explain which restriction",
        ];
        let mut last = 0;
        for needle in order {
            let pos = prompt[last..]
                .find(needle)
                .unwrap_or_else(|| panic!("missing or out of order: {}", needle));
            last += pos;
        }
    }

    #[test]
    fn test_blank_contexts_are_omitted() {
        let ctx = ExecutionContext::new(coder(), "Task")
            .with_project_context(Some("  ".to_string()))
            .with_parent_context(None);
        let prompt = ctx.render_prompt();
        assert!(!prompt.contains("## Project Context"));
        assert!(!prompt.contains("## Parent Task Context"));
    }

    #[test]
    fn test_preamble_within_limit_is_untouched() {
        let ctx = ExecutionContext::new(coder(), "Task");
        let full = ctx.render_preamble();
        let limited = ctx.clone().with_preamble_limit(10_000).render_preamble();
        assert_eq!(full, limited);
    }

    #[test]
    fn test_oversized_preamble_switches_to_compact_form() {
        let ctx = ExecutionContext::new(coder(), "Task");
        let full_len = ctx.render_preamble().chars().count();
        let limited = ctx.with_preamble_limit(full_len - 1);
        let preamble = limited.render_preamble();

        assert!(preamble.chars().count() < full_len);
        assert!(preamble.starts_with("# Role: coder"));
        assert!(preamble.contains("Tools: read, edit (file_pattern=*.py)"));
        assert!(!preamble.contains(TRUNCATION_MARKER));
        assert!(!preamble.contains("Always run the tests"));
    }

    #[test]
    fn test_still_oversized_preamble_is_truncated_with_marker() {
        let ctx = ExecutionContext::new(coder(), "The task stays whole").with_preamble_limit(60);
        let preamble = ctx.render_preamble();
        assert_eq!(preamble.chars().count(), 60);
        assert!(preamble.ends_with(TRUNCATION_MARKER));
        assert!(ctx.render_prompt().contains("The task stays whole"));
    }

    #[test]
    fn test_restriction_descriptions_come_from_role() {
        let ctx = ExecutionContext::new(coder(), "Task");
        assert_eq!(ctx.restrictions, vec!["You may modify at most 3 files"]);
        assert_eq!(ctx.validation_requirements, vec!["tests_pass"]);
    }
}
