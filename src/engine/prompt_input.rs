// Neutralize client-authored text before it is quoted into a prompt.
// Invisible and control characters go, lines that impersonate a speaker or
// try to steer the model are dropped, blank runs collapse, length is capped.

/// Maximum characters of a client message embedded in a prompt.
pub const MAX_MESSAGE_LENGTH: usize = 4_000;

/// Maximum characters of a single note embedded in a prompt.
pub const MAX_NOTE_LENGTH: usize = 2_000;

/// Line openings that forge a speaker turn or one of the prompt's own blocks.
const FORGED_PREFIXES: &[&str] = &[
    "system:",
    "assistant:",
    "[system]",
    "[inst]",
    "<<sys>>",
    "<client_message",
    "</client_message",
    "<notes",
    "</notes",
    "<transcript",
    "</transcript",
];

/// Phrases asking the model to drop its rules or rewrite its answer.
const STEERING_PHRASES: &[&str] = &[
    "ignore previous instructions",
    "ignore all instructions",
    "ignore the above",
    "disregard your instructions",
    "forget your instructions",
    "new instructions:",
    "you are now",
    "respond only with",
    "set urgency to",
];

/// Neutralize `raw` and cap it at `max_chars` characters, cutting at a word
/// boundary. `source` labels the audit line; content is never logged.
pub fn neutralize(raw: &str, max_chars: usize, source: &str) -> String {
    let visible: String = raw.chars().filter(|c| is_kept_char(*c)).collect();
    let (kept, removed) = drop_steering_lines(&visible);

    if removed > 0 {
        tracing::warn!(
            source = %source,
            removed_lines = removed,
            "Instruction-like lines removed from prompt input"
        );
    }

    cap_chars(&collapse_blank_lines(&kept), max_chars)
}

fn is_kept_char(c: char) -> bool {
    match c {
        ' ' | '\n' | '\t' => true,
        // zero-width, bidi overrides, invisible operators, BOM
        '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}' => false,
        c => !c.is_control(),
    }
}

fn is_forged(lower: &str) -> bool {
    FORGED_PREFIXES.iter().any(|p| lower.starts_with(p))
}

fn is_steering(lower: &str) -> bool {
    STEERING_PHRASES.iter().any(|p| lower.contains(p))
}

/// Keep the lines that neither forge a turn nor steer the model. A steering
/// phrase split over two otherwise-clean lines drops both.
fn drop_steering_lines(text: &str) -> (Vec<&str>, usize) {
    let lines: Vec<&str> = text.lines().collect();
    let lowered: Vec<String> = lines.iter().map(|l| l.trim().to_lowercase()).collect();

    let flagged: Vec<bool> = lowered.iter().map(|l| is_forged(l) || is_steering(l)).collect();
    let mut dropped = flagged.clone();

    for i in 1..lines.len() {
        let pair_clean = !flagged[i - 1] && !flagged[i] && !dropped[i - 1];
        if pair_clean && is_steering(&format!("{} {}", lowered[i - 1], lowered[i])) {
            dropped[i - 1] = true;
            dropped[i] = true;
        }
    }

    let removed = dropped.iter().filter(|d| **d).count();
    let kept = lines
        .into_iter()
        .zip(dropped)
        .filter_map(|(line, drop)| (!drop).then_some(line))
        .collect();
    (kept, removed)
}

/// Trim each line, keep at most one blank line between paragraphs, and drop
/// blank lines at either end.
fn collapse_blank_lines(lines: &[&str]) -> String {
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for line in lines.iter().map(|l| l.trim()) {
        let prev_blank = out.last().map_or(true, |l| l.is_empty());
        if !line.is_empty() || !prev_blank {
            out.push(line);
        }
    }
    while out.last() == Some(&"") {
        out.pop();
    }
    out.join("\n")
}

/// Cut to `max_chars` characters, backing up to the last whitespace when
/// there is one, and mark the cut with an ellipsis.
fn cap_chars(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let head = &text[..cut];
    match head.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => format!("{}…", &head[..pos]),
        _ => format!("{head}…"),
    }
}
