//! Response normalizer: any variant's reply becomes one [`ResponseEnvelope`].
//!
//! Three shape families are recognised:
//! 1. flat JSON with aliased text and citation fields;
//! 2. a forwarded function-style wrapper (`statusCode` + `body`), unwrapped first;
//! 3. nothing recognisable, which yields [`FALLBACK_TEXT`] rather than an error.

use crate::error::NormalizeError;
use crate::shared::{Citation, CitationOrigin, LogicalAction, ResponseEnvelope};
use serde_json::{Map, Value};

/// Text shown when a reply carries no recognisable answer.
pub const FALLBACK_TEXT: &str = "I couldn't find enough information to answer that.";

/// How many top results become inferred citations when none were returned.
pub const INFERRED_CITATION_LIMIT: usize = 3;

const TEXT_ALIASES: [&str; 3] = ["answer", "answerText", "response"];
const CITATION_ALIASES: [&str; 2] = ["citations", "sources"];
const URI_ALIASES: [&str; 4] = ["uri", "clickUri", "clickableUri", "clickableuri"];
const SESSION_ALIASES: [&str; 2] = ["sessionId", "session_id"];
const RESULT_ALIASES: [&str; 4] = ["results", "items", "passages", "completions"];

/// Maps a raw downstream reply into the canonical envelope.
///
/// `variant_tag` is the `backendMode` the request carried; it tags citations that name no source.
pub fn normalize(action: LogicalAction, variant_tag: &str, raw: Value) -> Result<ResponseEnvelope, NormalizeError> {
    let raw = unwrap(raw)?;
    let obj = match raw {
        Value::Object(m) => m,
        Value::String(s) => return Ok(text_only(s)),
        other => {
            tracing::debug!(target: "switchboard::normalize", action = %action, kind = value_kind(&other), "unrecognised reply shape");
            Map::new()
        }
    };

    let text = TEXT_ALIASES
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string);

    let result_list = RESULT_ALIASES
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array))
        .cloned();

    let mut citations: Vec<Citation> = CITATION_ALIASES
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array))
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| citation(e, variant_tag, CitationOrigin::Downstream))
                .collect()
        })
        .unwrap_or_default();

    if citations.is_empty() && matches!(action, LogicalAction::Answer | LogicalAction::Chat) {
        if let Some(results) = result_list.as_ref() {
            citations = results
                .iter()
                .filter_map(|r| citation(r, variant_tag, CitationOrigin::Inferred))
                .take(INFERRED_CITATION_LIMIT)
                .collect();
        }
    }

    let session_id = SESSION_ALIASES
        .iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
        .map(str::to_string);

    let (text, fallback) = match text {
        Some(t) => (t, false),
        // Search-like replies carry their payload in the result list.
        None if !action_expects_text(action) && result_list.is_some() => (String::new(), false),
        None => (FALLBACK_TEXT.to_string(), true),
    };

    Ok(ResponseEnvelope {
        text,
        fallback,
        citations,
        session_id,
        result_list,
        total_count: obj.get("totalCount").and_then(Value::as_u64),
        facets: obj.get("facets").filter(|f| !f.is_null()).cloned(),
    })
}

fn action_expects_text(action: LogicalAction) -> bool {
    matches!(action, LogicalAction::Answer | LogicalAction::Chat | LogicalAction::Content)
}

fn text_only(s: String) -> ResponseEnvelope {
    let fallback = s.trim().is_empty();
    ResponseEnvelope {
        text: if fallback { FALLBACK_TEXT.to_string() } else { s },
        fallback,
        citations: Vec::new(),
        session_id: None,
        result_list: None,
        total_count: None,
        facets: None,
    }
}

/// Strips a `statusCode`/`body` wrapper, repeatedly if wrappers were nested.
fn unwrap(mut raw: Value) -> Result<Value, NormalizeError> {
    loop {
        let Some(obj) = raw.as_object() else {
            return Ok(raw);
        };
        let (Some(status), Some(body)) = (obj.get("statusCode").and_then(Value::as_u64), obj.get("body")) else {
            return Ok(raw);
        };
        if !(body.is_string() || body.is_object()) {
            return Ok(raw);
        }
        let status = u16::try_from(status).unwrap_or(500);
        let inner = match body {
            Value::String(s) => serde_json::from_str::<Value>(s).unwrap_or_else(|_| Value::String(s.clone())),
            other => other.clone(),
        };
        if !(200..300).contains(&status) {
            let message = failure_message(&inner);
            tracing::warn!(target: "switchboard::normalize", status, message = %message, "wrapped reply reports failure");
            return Err(NormalizeError::WrappedFailure { status, message });
        }
        raw = inner;
    }
}

fn failure_message(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        Value::Object(m) => {
            let error = m.get("error").and_then(Value::as_str);
            let details = m.get("details").and_then(Value::as_str);
            match (error, details) {
                (Some(e), Some(d)) => format!("{}: {}", e, d),
                (Some(e), None) => e.to_string(),
                (None, Some(d)) => d.to_string(),
                (None, None) => body.to_string(),
            }
        }
        other => other.to_string(),
    }
}

fn citation(entry: &Value, variant_tag: &str, origin: CitationOrigin) -> Option<Citation> {
    let obj = entry.as_object()?;
    let uri = URI_ALIASES.iter().find_map(|k| field(obj, k));
    let title = field(obj, "title");
    if uri.is_none() && title.is_none() {
        return None;
    }
    let uri = uri.unwrap_or_default().to_string();
    let title = title.map(str::to_string).unwrap_or_else(|| uri.clone());
    let source_tag = field(obj, "source")
        .or_else(|| field(obj, "project"))
        .unwrap_or(variant_tag)
        .to_string();
    Some(Citation {
        title,
        uri,
        source_tag,
        origin,
    })
}

/// Non-blank string field, looked up directly or under a search result's `raw` map.
fn field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .or_else(|| obj.get("raw").and_then(|r| r.get(key)))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
