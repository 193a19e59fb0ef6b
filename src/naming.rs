//! Archive entry naming: collision-free names, sanitizing, and archive names.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

/// Longest file name we produce, in characters.
const MAX_FILENAME_LEN: usize = 255;

/// Fallback used when sanitizing leaves nothing behind.
const FALLBACK_NAME: &str = "media";

const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Splits `name` into stem and extension (including the dot).
///
/// A leading dot is part of the stem, so `.hidden` has no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx < name.len() - 1 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Returns `desired` if it is not in `used`, otherwise the first free
/// `{stem}-{n}{ext}` for `n = 1, 2, ...`.
///
/// ```
/// use std::collections::HashSet;
/// use media_bundle::naming::unique_filename;
///
/// let mut used = HashSet::new();
/// used.insert("1.jpg".to_string());
/// assert_eq!(unique_filename("1.jpg", &used), "1-1.jpg");
/// assert_eq!(unique_filename("2.jpg", &used), "2.jpg");
/// ```
#[must_use]
pub fn unique_filename(desired: &str, used: &HashSet<String>) -> String {
    if !used.contains(desired) {
        return desired.to_string();
    }
    let (stem, ext) = split_extension(desired);
    (1_usize..)
        .map(|n| format!("{stem}-{n}{ext}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| desired.to_string())
}

fn is_invisible(ch: char) -> bool {
    matches!(
        u32::from(ch),
        0x00..=0x1f | 0x7f..=0x9f | 0x200b..=0x200f | 0x202a..=0x202e | 0x2060 | 0x2066..=0x2069
    )
}

/// Makes `name` safe to use as a file name on common file systems.
///
/// Control and bidi characters are dropped, `<>:"/\|?*` become `_`, leading
/// and trailing dots or whitespace are trimmed from the stem, and Windows
/// device names get a `_` prefix. The result is at most 255 characters.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let visible: String = name.chars().filter(|c| !is_invisible(*c)).collect();
    let (stem, ext) = split_extension(&visible);

    let replaced: String = stem
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();
    let mut safe = replaced
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string();

    if RESERVED_NAMES.contains(&safe.to_lowercase().as_str()) {
        safe.insert(0, '_');
    }
    if safe.is_empty() {
        safe = FALLBACK_NAME.to_string();
    }

    let ext: String = ext
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let budget = MAX_FILENAME_LEN.saturating_sub(ext.chars().count());
    let mut result: String = safe.chars().take(budget).collect();
    result.push_str(&ext);
    result.chars().take(MAX_FILENAME_LEN).collect()
}

/// Builds an archive name of the form `{prefix}_{unix_millis}.zip`.
#[must_use]
pub fn zip_filename(prefix: &str, at: DateTime<Utc>) -> String {
    sanitize_filename(&format!("{prefix}_{}.zip", at.timestamp_millis()))
}
