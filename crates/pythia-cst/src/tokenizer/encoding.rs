//! PEP 263 source-encoding detection.
//!
//! The coding declaration is honored only on the first two physical lines
//! of a file, and a UTF-8 byte-order mark overrides any declaration. In
//! the absence of both, sources are treated as UTF-8.

use regex::Regex;
use std::sync::OnceLock;

/// The UTF-8 byte-order mark.
pub const BOM_UTF8: &[u8] = b"\xef\xbb\xbf";

fn coding_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[ \t\x0c]*#.*?coding[:=][ \t]*([-_.a-zA-Z0-9]+)").unwrap())
}

/// Scan the first two lines of `source` for a PEP 263 coding declaration.
///
/// Returns the declared encoding name, or `None` when no declaration is
/// present. Callers must apply the BOM-override rule with
/// [`detect_encoding`] rather than calling this directly on raw bytes.
pub fn scan_coding_declaration(source: &str) -> Option<String> {
    for line in source.lines().take(2) {
        if let Some(caps) = coding_re().captures(line) {
            return Some(caps[1].to_string());
        }
        // A line with code on it ends the search even before line two.
        let trimmed = line.trim_start();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            break;
        }
    }
    None
}

/// Determine the effective source encoding of a byte buffer.
///
/// A UTF-8 BOM forces `"utf-8"` regardless of any declaration; otherwise
/// the PEP 263 declaration is used; otherwise UTF-8 is assumed.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if bytes.starts_with(BOM_UTF8) {
        return "utf-8".to_string();
    }
    let head_len = bytes.len().min(1024);
    let head = String::from_utf8_lossy(&bytes[..head_len]);
    scan_coding_declaration(&head).unwrap_or_else(|| "utf-8".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emacs_style_declaration() {
        let src = "# -*- coding: latin-1 -*-\nx = 1\n";
        assert_eq!(scan_coding_declaration(src).as_deref(), Some("latin-1"));
    }

    #[test]
    fn vim_style_declaration_on_second_line() {
        let src = "#!/usr/bin/env python\n# vim: set fileencoding=cp1252 :\n";
        assert_eq!(scan_coding_declaration(src).as_deref(), Some("cp1252"));
    }

    #[test]
    fn declaration_after_code_is_ignored() {
        let src = "x = 1\n# coding: latin-1\n";
        assert_eq!(scan_coding_declaration(src), None);
    }

    #[test]
    fn third_line_is_ignored() {
        let src = "#\n#\n# coding: latin-1\n";
        assert_eq!(scan_coding_declaration(src), None);
    }

    #[test]
    fn bom_overrides_declaration() {
        let mut bytes = BOM_UTF8.to_vec();
        bytes.extend_from_slice(b"# coding: latin-1\n");
        assert_eq!(detect_encoding(&bytes), "utf-8");
    }

    #[test]
    fn default_is_utf8() {
        assert_eq!(detect_encoding(b"x = 1\n"), "utf-8");
    }
}
