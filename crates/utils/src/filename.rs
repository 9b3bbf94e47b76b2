//! Upload filename handling

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_.-]").expect("valid regex");
}

/// Reduce a client-supplied filename to a safe, flat file name.
///
/// Path separators become spaces, whitespace runs become a single `_`,
/// anything outside `[A-Za-z0-9_.-]` is dropped and leading/trailing dots
/// and underscores are trimmed. Returns `None` when nothing usable is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let flattened = raw.replace(['/', '\\'], " ");
    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_CHARS.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Case-insensitive extension check, `extension` without the dot
pub fn has_extension(filename: &str, extension: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
