// ABOUTME: Recovers a JSON object from free-form model output using layered strategies.
// ABOUTME: Also holds the lenient field readers the role mappers use to validate recovered keys.

use serde_json::{Map, Value};

/// A structured record recovered from model text.
pub type Record = Map<String, Value>;

/// Extract a JSON object from LLM output using a 3-tier strategy:
/// 1. Try parsing the entire trimmed text
/// 2. Try the interior of each fenced code block, in order
/// 3. Find the first `{` to last `}` and try that substring
///
/// Returns None when no strategy yields a JSON object.
pub fn extract_record(text: &str) -> Option<Record> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Tier 1: the whole text
    if let Some(record) = parse_object(trimmed) {
        return Some(record);
    }

    // Tier 2: fenced code blocks
    for block in fenced_blocks(trimmed) {
        if let Some(record) = parse_object(block) {
            return Some(record);
        }
    }

    // Tier 3: first { to last }
    let first_brace = trimmed.find('{');
    let last_brace = trimmed.rfind('}');
    if let (Some(start), Some(end)) = (first_brace, last_brace)
        && start < end
    {
        return parse_object(&trimmed[start..=end]);
    }

    None
}

fn parse_object(candidate: &str) -> Option<Record> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Interiors of the ``` fenced blocks in `text`. The opening fence may carry
/// a language tag (```json); an unterminated fence runs to the end of text.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_fence = &rest[open + 3..];
        // Skip the info string (language tag) up to the end of the line.
        let body_start = match after_fence.find('\n') {
            Some(nl) if is_info_string(&after_fence[..nl]) => nl + 1,
            _ => 0,
        };
        let body = &after_fence[body_start..];

        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => {
                blocks.push(body);
                break;
            }
        }
    }

    blocks
}

fn is_info_string(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// First key among `keys` holding a non-empty string.
pub(crate) fn string_field(record: &Record, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// First key among `keys` holding a number or a numeric string.
pub(crate) fn number_field(record: &Record, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
}

/// First key among `keys` holding a boolean or a "true"/"false" string.
pub(crate) fn bool_field(record: &Record, keys: &[&str]) -> Option<bool> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find_map(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        })
}

/// String items of the first array found under `keys`; other items are dropped.
pub(crate) fn string_list_field(record: &Record, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find_map(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RECORD: &str = r#"{"title": "The Last Ember", "score": 7.5, "issues": ["pacing"]}"#;

    fn expected() -> Record {
        match json!({"title": "The Last Ember", "score": 7.5, "issues": ["pacing"]}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn bare_fenced_and_prose_wrapped_agree() {
        let bare = RECORD.to_string();
        let padded = format!("\n\n  {}  \n", RECORD);
        let fenced_json = format!("```json\n{}\n```", RECORD);
        let fenced_plain = format!("```\n{}\n```", RECORD);
        let fenced_in_prose = format!("Here is my answer:\n```json\n{}\n```\nThanks!", RECORD);
        let prose = format!("Sure! {} Hope this helps.", RECORD);

        for text in [bare, padded, fenced_json, fenced_plain, fenced_in_prose, prose] {
            assert_eq!(extract_record(&text), Some(expected()), "input: {text}");
        }
    }

    #[test]
    fn later_fenced_block_is_used_when_first_is_not_json() {
        let text = format!("```rust\nfn main() {{}}\n```\nand\n```json\n{}\n```", RECORD);
        assert_eq!(extract_record(&text), Some(expected()));
    }

    #[test]
    fn unterminated_fence_still_parses() {
        let text = format!("```json\n{}\n", RECORD);
        assert_eq!(extract_record(&text), Some(expected()));
    }

    #[test]
    fn fence_on_same_line_as_json() {
        let text = format!("```{}```", RECORD);
        assert_eq!(extract_record(&text), Some(expected()));
    }

    #[test]
    fn malformed_text_yields_none() {
        for text in [
            "",
            "   ",
            "Once upon a time there was a dragon.",
            "{not json at all}",
            "} backwards {",
            "```json\n{\"broken\": \n```",
        ] {
            assert_eq!(extract_record(text), None, "input: {text:?}");
        }
    }

    #[test]
    fn non_object_json_is_not_a_record() {
        assert_eq!(extract_record("[1, 2, 3]"), None);
        assert_eq!(extract_record("\"just a string\""), None);
        assert_eq!(extract_record("42"), None);
    }

    #[test]
    fn field_readers_accept_lenient_shapes() {
        let record = match json!({
            "summary": "  ",
            "summarized_prompt": "A hero story",
            "score": "8.5",
            "approved": "TRUE",
            "issues": ["a", 3, "b"],
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        assert_eq!(
            string_field(&record, &["summary", "summarized_prompt"]).as_deref(),
            Some("A hero story")
        );
        assert_eq!(number_field(&record, &["score"]), Some(8.5));
        assert_eq!(bool_field(&record, &["approved"]), Some(true));
        assert_eq!(
            string_list_field(&record, &["issues"]),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(string_field(&record, &["missing"]), None);
        assert!(string_list_field(&record, &["missing"]).is_empty());
    }
}
