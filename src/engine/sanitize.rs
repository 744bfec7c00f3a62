// Best-effort repair of a JSON candidate produced by the upstream service.
// Handles the failure modes actually seen in model output: markdown fences,
// stray control bytes, raw line breaks and stray quotes inside strings,
// trailing commas and bare keys. Not a grammar parser.
//
// Steps run in a fixed order; each assumes the previous ones ran.

use std::sync::LazyLock;

use regex::Regex;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").expect("Invalid code fence regex"));

/// Repair `raw` into text that has a good chance of parsing as JSON.
pub(crate) fn sanitize(raw: &str) -> String {
    let text = strip_code_fences(raw);
    let text = replace_control_chars(&text);
    let text = escape_raw_whitespace_in_strings(&text);
    let text = normalize_quote_escaping(&text);
    let text = remove_trailing_commas(&text);
    quote_bare_keys(&text)
}

/// Whether the quote at `idx` ends the string it belongs to: the next
/// non-whitespace character must be a structural one, or nothing at all.
pub(crate) fn quote_closes_string(chars: &[char], idx: usize) -> bool {
    chars[idx + 1..]
        .iter()
        .find(|c| !c.is_whitespace())
        .map_or(true, |c| matches!(c, ',' | ':' | '}' | ']'))
}

/// Step 1: drop ``` markers, with or without a language tag.
fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").into_owned()
}

/// Step 2: raw control bytes become a single space. Line breaks and tabs are
/// kept for step 3, which knows whether they sit inside a string.
fn replace_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| {
            let is_control = (c as u32) < 0x20 || c == '\u{7F}';
            if is_control && !matches!(c, '\n' | '\r' | '\t') {
                ' '
            } else {
                c
            }
        })
        .collect()
}

/// Step 3: escape literal newline, carriage return and tab inside strings.
fn escape_raw_whitespace_in_strings(text: &str) -> String {
    rewrite_strings(text, Repair::Whitespace)
}

/// Step 4: escape quotes that sit inside a string without closing it, and
/// undo over-escaping (`{\"key\": \"value\"}`) around strings.
fn normalize_quote_escaping(text: &str) -> String {
    rewrite_strings(text, Repair::Quotes)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Repair {
    Whitespace,
    Quotes,
}

/// Walk `text` tracking string boundaries with the closing-quote heuristic.
/// Steps 3 and 4 share this walk so they agree on where strings are; `repair`
/// picks what gets rewritten.
fn rewrite_strings(text: &str, repair: Repair) -> String {
    let fix_quotes = repair == Repair::Quotes;
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len() + 8);
    let mut in_string = false;
    // The current string was opened by an over-escaped `\"`.
    let mut opened_escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if !in_string {
            if c == '\\' && chars.get(i + 1) == Some(&'"') {
                in_string = true;
                opened_escaped = true;
                result.push_str(if fix_quotes { "\"" } else { "\\\"" });
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = true;
                opened_escaped = false;
            }
            result.push(c);
            i += 1;
            continue;
        }

        match c {
            '\\' => {
                if opened_escaped
                    && chars.get(i + 1) == Some(&'"')
                    && quote_closes_string(&chars, i + 1)
                {
                    in_string = false;
                    result.push_str(if fix_quotes { "\"" } else { "\\\"" });
                    i += 2;
                    continue;
                }
                result.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    result.push(next);
                }
                i += 2;
            }
            '"' => {
                if quote_closes_string(&chars, i) {
                    in_string = false;
                    result.push('"');
                } else if fix_quotes {
                    result.push_str("\\\"");
                } else {
                    result.push('"');
                }
                i += 1;
            }
            '\n' if repair == Repair::Whitespace => {
                result.push_str("\\n");
                i += 1;
            }
            '\r' if repair == Repair::Whitespace => {
                result.push_str("\\r");
                i += 1;
            }
            '\t' if repair == Repair::Whitespace => {
                result.push_str("\\t");
                i += 1;
            }
            _ => {
                result.push(c);
                i += 1;
            }
        }
    }

    result
}

/// Step 5: drop commas directly before `}` or `]`.
fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &c) in chars.iter().enumerate() {
        if escape_next {
            escape_next = false;
            result.push(c);
            continue;
        }
        match c {
            '\\' if in_string => {
                escape_next = true;
                result.push(c);
            }
            '"' => {
                in_string = !in_string;
                result.push(c);
            }
            ',' if !in_string => {
                let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    result.push(c);
                }
            }
            _ => result.push(c),
        }
    }

    result
}

/// Step 6: quote identifier keys (`{mood: "ok"}`) and single-quoted keys.
fn quote_bare_keys(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escape_next = false;
    let mut expect_key = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            result.push(c);
            i += 1;
            continue;
        }

        if expect_key && (c.is_ascii_alphabetic() || c == '_' || c == '\'') {
            let quoted = c == '\'';
            let start = if quoted { i + 1 } else { i };
            let mut end = start;
            while end < chars.len()
                && (if quoted {
                    chars[end] != '\''
                } else {
                    chars[end].is_ascii_alphanumeric() || chars[end] == '_' || chars[end] == '-'
                })
            {
                end += 1;
            }
            let after = if quoted { end + 1 } else { end };
            let next = chars.get(after..).and_then(|rest| rest.iter().find(|n| !n.is_whitespace()));
            if next == Some(&':') {
                let key: String = chars[start..end.min(chars.len())].iter().collect();
                result.push('"');
                result.push_str(&key.replace('"', "\\\""));
                result.push('"');
                i = after.min(chars.len());
                expect_key = false;
                continue;
            }
        }

        match c {
            '"' => {
                in_string = true;
                expect_key = false;
            }
            '{' | ',' => expect_key = true,
            _ if c.is_whitespace() => {}
            _ => expect_key = false,
        }
        result.push(c);
        i += 1;
    }

    result
}
