//! Canonical modifier-combination strings.
//!
//! Every combination is stored as its lowercase modifier tokens, deduplicated,
//! sorted alphabetically and joined with `+`. A press without modifiers is
//! stored as [`NO_MODIFIERS`].

pub const NO_MODIFIERS: &str = "none";
pub const SEPARATOR: char = '+';

/// Base modifiers tracked by the read side, in display order.
pub const BASE_MODIFIERS: [&str; 4] = ["shift", "ctrl", "alt", "super"];

fn normalize_token(token: &str) -> Option<String> {
    let token = token.trim().to_ascii_lowercase();
    let token = match token.as_str() {
        "" | NO_MODIFIERS => return None,
        "control" => "ctrl".to_string(),
        "win" | "windows" | "meta" | "cmd" | "command" => "super".to_string(),
        "option" => "alt".to_string(),
        _ => token,
    };
    Some(token)
}

/// Canonicalizes a modifier-combination string.
///
/// `"shift+ctrl"`, `"Ctrl + Shift"` and `"ctrl+shift+ctrl"` all become
/// `"ctrl+shift"`. An empty input or `"none"` becomes `"none"`.
pub fn canonicalize(raw: &str) -> String {
    let mut tokens: Vec<String> = raw.split(SEPARATOR).filter_map(normalize_token).collect();
    if tokens.is_empty() {
        return NO_MODIFIERS.to_string();
    }
    tokens.sort_unstable();
    tokens.dedup();
    tokens.join("+")
}

/// Splits a canonical combination into its base modifiers.
///
/// `"none"` yields nothing.
pub fn components(combination: &str) -> impl Iterator<Item = &str> {
    combination
        .split(SEPARATOR)
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != NO_MODIFIERS)
}

pub fn is_none(combination: &str) -> bool {
    combination == NO_MODIFIERS
}
