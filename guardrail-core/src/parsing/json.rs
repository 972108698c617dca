//! JSON extractor with fuzzy repair

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::extractor::{ExtractionFailure, ExtractorConfig, ResultExtractor};

/// Extracts the first JSON value from model text
#[derive(Debug, Clone, Default)]
pub struct JsonResultExtractor {
    config: ExtractorConfig,
}

impl JsonResultExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Extractor that never repairs
    pub fn strict() -> Self {
        Self::with_config(ExtractorConfig::strict())
    }

    /// Contents of the first fenced block, else the input
    fn strip_code_fences<'a>(&self, input: &'a str) -> &'a str {
        static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"```(?:json|JSON)?[ \t]*\n?([\s\S]*?)\n?```").expect("valid regex")
        });

        CODE_FENCE_RE
            .captures(input)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .unwrap_or(input)
    }

    fn parse(&self, candidate: &str) -> Option<Value> {
        serde_json::from_str(candidate).ok()
    }

    fn repaired(&self, candidate: &str) -> Option<Value> {
        if !self.config.attempt_repair {
            return None;
        }
        let repaired = repair_json(candidate);
        let value = self.parse(&repaired)?;
        tracing::debug!(original_len = candidate.len(), "Repaired malformed JSON");
        Some(value)
    }
}

impl ResultExtractor for JsonResultExtractor {
    fn extract(&self, raw: &str) -> Result<Value, ExtractionFailure> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ExtractionFailure::EmptyInput);
        }

        let input = if self.config.strip_code_fences {
            self.strip_code_fences(trimmed)
        } else {
            trimmed
        };

        if let Some(value) = self.parse(input) {
            return Ok(value);
        }

        let Some(start) = input.find(['{', '[']) else {
            return Err(ExtractionFailure::NotFound);
        };

        match balanced_span(&input[start..]) {
            Some(candidate) => self
                .parse(candidate)
                .or_else(|| self.repaired(candidate))
                .ok_or_else(|| {
                    ExtractionFailure::Malformed(truncate(candidate, 80).to_string())
                }),
            // unterminated: everything after the opener is the candidate
            None => self
                .repaired(&input[start..])
                .ok_or_else(|| ExtractionFailure::Malformed("unterminated JSON value".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// The shortest prefix of `input` (which starts at an opener) that closes it
fn balanced_span(input: &str) -> Option<&str> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in input.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => stack.push(c),
            '}' | ']' if !in_string => {
                let open = stack.pop()?;
                if (open == '{') != (c == '}') {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&input[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Repair common defects in model-written JSON
fn repair_json(input: &str) -> String {
    static TRAILING_COMMA_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));
    static UNQUOTED_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)").expect("valid regex")
    });

    let mut result = strip_comments(input);
    result = fix_quotes(&result);
    result = UNQUOTED_KEY_RE.replace_all(&result, r#"$1"$2"$3"#).into_owned();
    result = TRAILING_COMMA_RE.replace_all(&result, "$1").into_owned();
    close_open_values(&mut result);
    result
}

/// Remove `//` and `/* */` comments outside strings
fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some(&'/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some(&'*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Convert single-quoted strings to double-quoted ones
fn fix_quotes(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut in_double = false;
    let mut in_single = false;
    let mut escape_next = false;

    for c in input.chars() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        match c {
            '\\' => {
                result.push(c);
                escape_next = true;
            }
            '"' if in_single => result.push_str("\\\""),
            '"' => {
                in_double = !in_double;
                result.push(c);
            }
            '\'' if !in_double => {
                in_single = !in_single;
                result.push('"');
            }
            _ => result.push(c),
        }
    }
    result
}

/// Append closers for any strings, objects and arrays left open
fn close_open_values(json: &mut String) {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for c in json.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                stack.pop();
            }
            _ => {}
        }
    }

    if in_string {
        json.push('"');
    }
    while let Some(closer) = stack.pop() {
        json.push(closer);
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(raw: &str) -> Result<Value, ExtractionFailure> {
        JsonResultExtractor::new().extract(raw)
    }

    #[test]
    fn test_plain_values() {
        assert_eq!(extract(r#"{"key": "value"}"#).unwrap()["key"], "value");
        assert_eq!(extract("42").unwrap(), json!(42));
        assert_eq!(extract("[1, 2, 3]").unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_code_fence() {
        let input = "Here is the result:\n```json\n{\"items\": [1, 2]}\n```\nDone.";
        assert_eq!(extract(input).unwrap(), json!({"items": [1, 2]}));
    }

    #[test]
    fn test_value_inside_prose() {
        let input = r#"The answer is [{"id": 1}, {"id": 2}] as requested {"unused": true}"#;
        assert_eq!(extract(input).unwrap(), json!([{"id": 1}, {"id": 2}]));
    }

    #[test]
    fn test_brackets_inside_strings_are_ignored() {
        let input = r#"Result: {"note": "a } b ] c", "n": 1} trailing"#;
        assert_eq!(extract(input).unwrap()["n"], 1);
    }

    #[test]
    fn test_repairs() {
        assert_eq!(extract(r#"{"key": "value",}"#).unwrap()["key"], "value");
        assert_eq!(extract(r#"{'key': 'value'}"#).unwrap()["key"], "value");
        assert_eq!(extract(r#"{key: "value"}"#).unwrap()["key"], "value");
        assert_eq!(extract(r#"[1, 2, 3,]"#).unwrap(), json!([1, 2, 3]));
        assert_eq!(
            extract(r#"{"key": "value", "nested": {"a": [1, 2"#).unwrap(),
            json!({"key": "value", "nested": {"a": [1, 2]}})
        );
    }

    #[test]
    fn test_comments_outside_strings_only() {
        let input = r#"{
            // the endpoint
            "url": "http://api.test/items", /* inline */
            "n": 2
        }"#;
        let value = extract(input).unwrap();
        assert_eq!(value["url"], "http://api.test/items");
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn test_failures() {
        assert_eq!(extract("   "), Err(ExtractionFailure::EmptyInput));
        assert_eq!(extract("no structured data here"), Err(ExtractionFailure::NotFound));
    }

    #[test]
    fn test_strict_does_not_repair() {
        let extractor = JsonResultExtractor::strict();
        assert!(matches!(
            extractor.extract(r#"{"key": "value",}"#),
            Err(ExtractionFailure::Malformed(_))
        ));
        assert!(extractor.extract(r#"{"key": "value"}"#).is_ok());
    }
}
