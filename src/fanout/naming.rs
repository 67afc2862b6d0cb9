use regex::Regex;

/// Longest sheet name Excel accepts, in characters
const SHEET_NAME_LIMIT: usize = 31;

/// Turns a group key into a valid sheet name.
///
/// Characters Excel rejects (`[ ] : * ? / \`) and a leading or trailing apostrophe
/// become `_`, the result is cut to 31 characters.
pub(crate) fn sheet_name(key: &str) -> String {
    let pattern = Regex::new(r"[\[\]:*?/\\]|^'|'$").expect("Hardcode regex pattern");
    let name: String = pattern
        .replace_all(key, "_")
        .chars()
        .take(SHEET_NAME_LIMIT)
        .collect();
    let name = name.trim_end_matches('\'').to_owned();
    if name.trim().is_empty() {
        "Sheet".to_owned()
    } else {
        name
    }
}

/// Turns a group key into an archive entry name without extension
pub(crate) fn entry_stem(key: &str) -> String {
    let stem = key.replace(['/', '\\'], "_");
    if stem.trim().is_empty() {
        "_".to_owned()
    } else {
        stem
    }
}
