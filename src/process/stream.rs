//! Tolerant parsing of the agent's stream-json output.
//!
//! Each stdout line should be one JSON event. Lines that are not JSON are kept
//! as raw text instead of failing the parse.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static MODIFIED_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:Created|Modified|Updated):\s*[`'"]?([^\s`'",;()]+)"#)
        .expect("Invalid modified file regex")
});

/// Turn raw stream-json output into the agent's text.
///
/// Recognized events:
///
/// - `{"type":"assistant","message":{"content":[{"type":"text","text":...}]}}`
/// - `{"type":"result","result":...}`
/// - `{"type":"system",...}` (ignored)
/// - `{"type":"content_block_delta","delta":{"text":...}}`
/// - `{"type":"text","text":...}`
/// - `{"type":"message","content":...}` with string or block content
///
/// When nothing could be extracted the raw output is returned unchanged.
pub fn parse_stream_json(raw: &str) -> String {
    let mut pieces: Vec<String> = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(event) => {
                if let Some(text) = event_text(&event) {
                    pieces.push(text);
                }
            }
            Err(_) => pieces.push(line.to_string()),
        }
    }

    if pieces.is_empty() {
        raw.to_string()
    } else {
        pieces.join("\n")
    }
}

fn event_text(event: &Value) -> Option<String> {
    let Some(kind) = event.get("type").and_then(Value::as_str) else {
        // A JSON line without a type is not ours to interpret.
        return non_empty(event.get("text").and_then(Value::as_str).map(str::to_string));
    };

    match kind {
        "system" => None,
        "assistant" => event
            .get("message")
            .and_then(|message| message.get("content"))
            .and_then(content_text),
        "result" => non_empty(event.get("result").and_then(Value::as_str).map(str::to_string)),
        "content_block_delta" => non_empty(
            event
                .get("delta")
                .and_then(|delta| delta.get("text"))
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
        "text" => non_empty(event.get("text").and_then(Value::as_str).map(str::to_string)),
        "message" => event
            .get("content")
            .or_else(|| event.get("message").and_then(|m| m.get("content")))
            .and_then(content_text),
        _ => None,
    }
}

/// Text from a `content` field: a string or a list of blocks.
fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => non_empty(Some(text.clone())),
        Value::Array(blocks) => {
            let text: Vec<&str> = blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            non_empty(Some(text.concat()))
        }
        _ => None,
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}

/// Paths the agent reported as `Created:`, `Modified:` or `Updated:`.
///
/// Best effort; this is the agent's own claim, not an audit of the disk.
pub fn extract_modified_files(output: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for line in output.lines() {
        for captures in MODIFIED_FILE_RE.captures_iter(line) {
            let Some(path) = captures.get(1) else {
                continue;
            };
            let path = path.as_str().trim_end_matches(['.', ':']);
            if looks_like_path(path) && !files.iter().any(|f| f == path) {
                files.push(path.to_string());
            }
        }
    }
    files
}

fn looks_like_path(candidate: &str) -> bool {
    !candidate.is_empty()
        && (candidate.contains('/') || candidate.contains('.') || candidate.contains('\\'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_text_blocks_are_concatenated() {
        let raw = r#"{"type":"system","subtype":"init"}
{"type":"assistant","message":{"content":[{"type":"text","text":"hel"},{"type":"tool_use","name":"read"},{"type":"text","text":"lo"}]}}
{"type":"result","result":"done"}"#;
        assert_eq!(parse_stream_json(raw), "hello\ndone");
    }

    #[test]
    fn test_malformed_lines_are_kept_as_raw_text() {
        let raw = "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"hello\"}]}}\n{not json\n";
        let parsed = parse_stream_json(raw);
        assert!(parsed.contains("hello"));
        assert!(parsed.contains("{not json"));
    }

    #[test]
    fn test_legacy_event_shapes_are_supported() {
        let raw = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"a"}}
{"type":"text","text":"b"}
{"type":"message","content":"c"}
{"type":"message","content":[{"type":"text","text":"d"}]}"#;
        assert_eq!(parse_stream_json(raw), "a\nb\nc\nd");
    }

    #[test]
    fn test_output_without_content_is_returned_raw() {
        let raw = "{\"type\":\"system\"}\n";
        assert_eq!(parse_stream_json(raw), raw);
        assert_eq!(parse_stream_json(""), "");
    }

    #[test]
    fn test_plain_text_output_survives() {
        assert_eq!(parse_stream_json("just text\nmore"), "just text\nmore");
    }

    #[test]
    fn test_modified_files_are_extracted_and_deduplicated() {
        let output = "Created: src/new.rs\n\
                      I also Modified: `tests/app_test.py` and then\n\
                      Updated: README.md.\n\
                      Modified: src/new.rs\n\
                      Nothing to see: here";
        assert_eq!(
            extract_modified_files(output),
            vec!["src/new.rs", "tests/app_test.py", "README.md"]
        );
    }

    #[test]
    fn test_non_paths_are_ignored() {
        assert!(extract_modified_files("Updated: everything").is_empty());
    }
}
