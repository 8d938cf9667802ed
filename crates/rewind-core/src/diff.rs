//! Unified-diff generation for recorded file changes.
//!
//! The change log stores a human-readable diff next to each change so
//! listings can show what happened without re-diffing contents.

use similar::TextDiff;

/// Marker stored in place of a text diff for binary content.
pub const BINARY_DIFF_MARKER: &str = "Binary files differ";

/// Whether content looks binary (contains NUL bytes).
pub fn is_binary(content: &[u8]) -> bool {
    content.contains(&0)
}

/// Generate a unified diff string (like `diff -u` output).
///
/// Either side may be `None` for created or deleted files. Binary content
/// on either side yields [`BINARY_DIFF_MARKER`] instead of a text diff.
pub fn generate_unified_diff(
    old_content: Option<&[u8]>,
    new_content: Option<&[u8]>,
    old_path: &str,
    new_path: &str,
    context_lines: usize,
) -> String {
    if old_content.map(is_binary).unwrap_or(false) || new_content.map(is_binary).unwrap_or(false) {
        return BINARY_DIFF_MARKER.to_string();
    }

    let old_str = old_content.map(|c| String::from_utf8_lossy(c));
    let new_str = new_content.map(|c| String::from_utf8_lossy(c));

    let old_text = old_str.as_deref().unwrap_or("");
    let new_text = new_str.as_deref().unwrap_or("");

    let diff = TextDiff::from_lines(old_text, new_text);

    diff.unified_diff()
        .context_radius(context_lines)
        .header(old_path, new_path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_files_produce_no_hunks() {
        let content = b"line1\nline2\nline3\n";
        let unified = generate_unified_diff(Some(content), Some(content), "a/f", "b/f", 3);
        assert!(!unified.contains("@@"));
    }

    #[test]
    fn test_new_file() {
        let unified = generate_unified_diff(None, Some(b"line1\nline2\n"), "a/f.txt", "b/f.txt", 3);
        assert!(unified.contains("+++ b/f.txt"));
        assert!(unified.contains("+line1"));
        assert!(unified.contains("+line2"));
    }

    #[test]
    fn test_deleted_file() {
        let unified = generate_unified_diff(Some(b"line1\nline2\n"), None, "a/f.txt", "b/f.txt", 3);
        assert!(unified.contains("-line1"));
        assert!(unified.contains("-line2"));
    }

    #[test]
    fn test_modified_file() {
        let old = b"line1\nline2\nline3\n";
        let new = b"line1\nmodified\nline3\n";
        let unified = generate_unified_diff(Some(old), Some(new), "a/f.txt", "b/f.txt", 3);

        assert!(unified.contains("--- a/f.txt"));
        assert!(unified.contains("+++ b/f.txt"));
        assert!(unified.contains("-line2"));
        assert!(unified.contains("+modified"));
    }

    #[test]
    fn test_binary_detection() {
        assert!(is_binary(b"hello\x00world"));
        assert!(!is_binary(b"hello world"));

        let unified = generate_unified_diff(Some(b"hello\x00world"), Some(b"text"), "a/f", "b/f", 3);
        assert_eq!(unified, BINARY_DIFF_MARKER);
    }
}
