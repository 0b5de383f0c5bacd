use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    literal::parse_literal,
    types::{ParseFailure, ParseOutcome, ResultRecord},
};

/// Raw replies longer than this are cut in log lines.
pub const MAX_LOGGED_REPLY_CHARS: usize = 2_000;

/// One way of turning cleaned reply text into a JSON value.
pub trait ParseStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, text: &str) -> Result<Value, String>;
}

/// serde_json, no leniency.
pub struct StrictJson;

impl ParseStrategy for StrictJson {
    fn name(&self) -> &'static str {
        "strict_json"
    }

    fn parse(&self, text: &str) -> Result<Value, String> {
        serde_json::from_str(text).map_err(|e| e.to_string())
    }
}

/// Single quotes, `True`/`None`, tuples and trailing commas.
pub struct PythonLiteral;

impl ParseStrategy for PythonLiteral {
    fn name(&self) -> &'static str {
        "python_literal"
    }

    fn parse(&self, text: &str) -> Result<Value, String> {
        parse_literal(text).map_err(|e| e.to_string())
    }
}

/// Strategies in the order they are tried.
pub fn default_strategies() -> [&'static dyn ParseStrategy; 2] {
    [&StrictJson, &PythonLiteral]
}

/// Remove a markdown code fence the model added despite being told not to.
///
/// Only applies when the reply opens with a fence. The fenced body is the
/// text between the first two fence markers; an info string such as `json`
/// on the opening line is dropped with it.
pub fn strip_fences(text: &str) -> &str {
    let t = text.trim();
    if !t.starts_with("```") {
        return t;
    }
    let Some(body) = t.split("```").nth(1) else {
        return t;
    };
    let body = body.trim();
    match body.split_once('\n') {
        Some((first, rest)) if is_info_string(first) => rest.trim(),
        // A bare tag with nothing after it leaves nothing to parse
        None if is_info_string(body) => "",
        _ => body,
    }
}

fn is_info_string(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty()
        && line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
        && !line.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-')
}

/// Python truthiness: only null, `false`, zero and empty values are false.
/// Any non-empty string is true, `"false"` included.
pub fn coerce_assign(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Check the top-level shape and turn it into records.
///
/// An array of objects maps one-to-one. A lone object (what the graphical and
/// abstract cases tend to produce) becomes a one-element sequence.
fn into_records(value: Value) -> Result<Vec<ResultRecord>, String> {
    let objects: Vec<Map<String, Value>> = match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(obj) => Ok(obj),
                other => Err(format!("element {i} is {}, not an object", kind(&other))),
            })
            .collect::<Result<_, _>>()?,
        Value::Object(obj) => vec![obj],
        other => return Err(format!("top-level value is {}, not an array", kind(&other))),
    };

    Ok(objects
        .into_iter()
        .map(|obj| {
            let assign = obj.get("assign").is_some_and(coerce_assign);
            ResultRecord::from_object(obj, assign)
        })
        .collect())
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Run `strategies` in order on the fence-stripped reply.
///
/// The first strategy whose output has the right shape wins. Failures from
/// every strategy are kept so the caller can log them.
pub fn classify_with(raw: &str, strategies: &[&dyn ParseStrategy]) -> ParseOutcome {
    let cleaned = strip_fences(raw);
    debug!(cleaned = %truncate_for_log(cleaned), "cleaned model reply");

    let mut failures = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        let parsed = strategy.parse(cleaned).and_then(into_records);
        match parsed {
            Ok(records) => {
                if !failures.is_empty() {
                    debug!(strategy = strategy.name(), "fallback parse succeeded");
                }
                return ParseOutcome::Parsed(records);
            },
            Err(reason) => {
                debug!(strategy = strategy.name(), %reason, "parse strategy failed");
                failures.push(ParseFailure {
                    strategy: strategy.name(),
                    reason,
                });
            },
        }
    }
    ParseOutcome::Unparseable(failures)
}

/// Classify with the default strict-then-literal strategies.
pub fn classify_reply(raw: &str) -> ParseOutcome {
    classify_with(raw, &default_strategies())
}

/// Turn a raw model reply into records. Never fails: an unparseable reply is
/// logged and comes back as an empty list.
pub fn normalize_reply(raw: &str) -> Vec<ResultRecord> {
    debug!(raw = %truncate_for_log(raw), raw_len = raw.len(), "raw model reply");

    match classify_reply(raw) {
        ParseOutcome::Parsed(records) => {
            info!(
                records = records.len(),
                assignments = records.iter().filter(|r| r.assign).count(),
                "model reply normalized"
            );
            debug!(records = ?records, "normalized records");
            records
        },
        ParseOutcome::Unparseable(failures) => {
            let reasons = failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            warn!(
                raw = %truncate_for_log(raw),
                raw_len = raw.len(),
                %reasons,
                "model reply unparseable, returning no results"
            );
            Vec::new()
        },
    }
}

/// Cut `s` to at most [`MAX_LOGGED_REPLY_CHARS`] chars, marking the cut.
pub fn truncate_for_log(s: &str) -> std::borrow::Cow<'_, str> {
    match s.char_indices().nth(MAX_LOGGED_REPLY_CHARS) {
        None => s.into(),
        Some((idx, _)) => format!("{}… [{} bytes total]", &s[..idx], s.len()).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_fences_plain() {
        assert_eq!(strip_fences(r#"  [{"expr":"1"}]  "#), r#"[{"expr":"1"}]"#);
    }

    #[test]
    fn strip_fences_with_language_tag() {
        let text = "```json\n[{\"expr\": \"x\"}]\n```";
        assert_eq!(strip_fences(text), r#"[{"expr": "x"}]"#);
    }

    #[test]
    fn strip_fences_without_tag() {
        let text = "```\n[1]\n```";
        assert_eq!(strip_fences(text), "[1]");
    }

    #[test]
    fn strip_fences_same_line_payload() {
        assert_eq!(strip_fences("```[1, 2]```"), "[1, 2]");
    }

    #[test]
    fn strip_fences_unclosed() {
        assert_eq!(strip_fences("```json\n[1]"), "[1]");
    }

    #[test]
    fn strip_fences_ignores_text_after_closing_fence() {
        let text = "```json\n[1]\n```\nHope this helps!";
        assert_eq!(strip_fences(text), "[1]");
    }

    #[test]
    fn info_string_detection() {
        assert!(is_info_string("json"));
        assert!(is_info_string("python3"));
        assert!(!is_info_string("[1]"));
        assert!(!is_info_string("42"));
        assert!(!is_info_string(""));
    }

    #[test]
    fn coerce_assign_truthiness() {
        assert!(coerce_assign(&json!(true)));
        assert!(coerce_assign(&json!("true")));
        assert!(coerce_assign(&json!(1)));
        assert!(coerce_assign(&json!("yes")));
        assert!(coerce_assign(&json!([0])));
        assert!(!coerce_assign(&json!(false)));
        assert!(!coerce_assign(&json!(0)));
        assert!(!coerce_assign(&json!(0.0)));
        assert!(!coerce_assign(&json!(null)));
        assert!(!coerce_assign(&json!("")));
        assert!(!coerce_assign(&json!({})));
    }

    #[test]
    fn coerce_assign_nonempty_strings_are_true() {
        for s in ["false", "False", "0", "no", "none", "null", " "] {
            assert!(coerce_assign(&json!(s)), "{s:?}");
        }
    }

    #[test]
    fn scalar_top_level_is_rejected() {
        let err = into_records(json!(4)).unwrap_err();
        assert!(err.contains("a number"));
    }

    #[test]
    fn non_object_element_is_rejected() {
        let err = into_records(json!([{"expr": "a"}, "b"])).unwrap_err();
        assert!(err.contains("element 1"));
    }

    #[test]
    fn truncate_short_is_borrowed() {
        assert!(matches!(truncate_for_log("abc"), std::borrow::Cow::Borrowed("abc")));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "é".repeat(MAX_LOGGED_REPLY_CHARS + 10);
        let cut = truncate_for_log(&long);
        assert!(cut.starts_with(&"é".repeat(MAX_LOGGED_REPLY_CHARS)));
        assert!(cut.ends_with("bytes total]"));
    }
}
