use serde::de::DeserializeOwned;
use serde_json::Value;

use super::sanitize::{quote_closes_string, sanitize};
use super::types::OutputKind;
use super::ExtractionFailure;

/// Turn raw upstream text into a structured payload of the requested kind.
///
/// Locates a JSON object candidate, repairs it, checks the kind's required
/// top-level fields and deserializes into `T`. Nothing is repaired after
/// validation: a returned value always matches the schema.
pub fn extract<T: DeserializeOwned>(raw: &str, kind: OutputKind) -> Result<T, ExtractionFailure> {
    let value = extract_value(raw, kind)?;
    serde_json::from_value(value).map_err(|e| ExtractionFailure::SchemaMismatch {
        kind: kind.label(),
        detail: e.to_string(),
    })
}

/// Same as [`extract`] but stops at the validated JSON value.
///
/// Candidates are tried in order until one parses; the first parse error is
/// reported when none does.
pub fn extract_value(raw: &str, kind: OutputKind) -> Result<Value, ExtractionFailure> {
    let candidates = locate_candidates(raw);
    if candidates.is_empty() {
        return Err(ExtractionFailure::NoCandidateFound);
    }

    let mut first_error = None;
    for candidate in candidates {
        let repaired = sanitize(candidate);
        match serde_json::from_str::<Value>(&repaired) {
            Ok(value) => {
                validate_shape(&value, kind)?;
                return Ok(value);
            }
            Err(e) => {
                tracing::debug!(
                    kind = kind.label(),
                    candidate_len = candidate.len(),
                    error = %e,
                    "Candidate did not parse after sanitizing"
                );
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    Err(ExtractionFailure::SanitizeFailed(first_error.unwrap_or_default()))
}

/// Check the kind's required top-level fields.
fn validate_shape(value: &Value, kind: OutputKind) -> Result<(), ExtractionFailure> {
    let mismatch = |detail: String| ExtractionFailure::SchemaMismatch {
        kind: kind.label(),
        detail,
    };

    let object = value
        .as_object()
        .ok_or_else(|| mismatch("top-level value is not an object".into()))?;

    if let Some(missing) = kind.required_fields().iter().find(|f| !object.contains_key(**f)) {
        return Err(mismatch(format!("missing field '{missing}'")));
    }

    if kind == OutputKind::ChatReply {
        if object["content"].as_str().map_or(true, |c| c.trim().is_empty()) {
            return Err(mismatch("'content' is not a non-empty string".into()));
        }
        if !object["metadata"].is_object() {
            return Err(mismatch("'metadata' is not an object".into()));
        }
    }

    Ok(())
}

/// Object candidates in `raw`, most likely first: every top-level balanced
/// span, then the naive brace span, then a line holding a whole object.
fn locate_candidates(raw: &str) -> Vec<&str> {
    let mut found = Vec::new();

    let mut offset = 0;
    while let Some((start, end)) = balanced_span(&raw[offset..]) {
        push_unique(&mut found, &raw[offset + start..offset + end]);
        offset += end;
    }
    if let Some(span) = naive_brace_span(raw) {
        push_unique(&mut found, span);
    }
    if let Some(line) = object_line(raw) {
        push_unique(&mut found, line);
    }
    found
}

fn push_unique<'a>(found: &mut Vec<&'a str>, candidate: &'a str) {
    if !found.contains(&candidate) {
        found.push(candidate);
    }
}

/// Byte range of the first balanced `{...}` span, ignoring braces inside
/// strings. String ends are detected with the same heuristic the sanitizer
/// uses, so an unescaped quote inside a value does not end the string early.
fn balanced_span(raw: &str) -> Option<(usize, usize)> {
    let start = raw.find('{')?;
    let chars: Vec<(usize, char)> = raw[start..].char_indices().collect();
    let plain: Vec<char> = chars.iter().map(|(_, c)| *c).collect();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &(offset, c)) in chars.iter().enumerate() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' && quote_closes_string(&plain, i) {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some((start, start + offset + c.len_utf8()));
                }
            }
            _ => {}
        }
    }
    None
}

/// First balanced span by brace depth alone.
fn naive_brace_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    for (offset, c) in raw[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// A single line that holds a whole object.
fn object_line(raw: &str) -> Option<&str> {
    raw.lines()
        .map(str::trim)
        .find(|line| line.len() >= 2 && line.starts_with('{') && line.ends_with('}'))
}
