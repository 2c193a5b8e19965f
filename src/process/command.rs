//! Argument vector for the agent CLI.
//!
//! The vector is handed straight to the OS; no shell ever sees it. There is no
//! system-prompt flag: oversized flag values crash some CLI builds, so role
//! and task text go over stdin.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

static MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:-]{0,127}$").expect("Invalid model regex"));

/// The model name if it is safe to pass as a flag value.
pub fn sanitize_model(model: &str) -> Option<&str> {
    let model = model.trim();
    if MODEL_RE.is_match(model) {
        Some(model)
    } else {
        warn!(model = model, "dropping malformed model name");
        None
    }
}

/// Build `[binary, --print, --output-format, stream-json, --verbose, ...]`.
///
/// `tools` must already be allow-list filtered.
pub fn build_command_args(
    binary: &str,
    model: Option<&str>,
    tools: &[String],
    add_dir: Option<&Path>,
) -> Vec<String> {
    let mut args = vec![
        binary.to_string(),
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ];

    if let Some(model) = model.and_then(sanitize_model) {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    if !tools.is_empty() {
        args.push("--allowed-tools".to_string());
        args.push(tools.join(","));
    }
    if let Some(dir) = add_dir {
        args.push("--add-dir".to_string());
        args.push(dir.display().to_string());
    }
    args
}
