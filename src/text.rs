//! Display-safe text helpers.
//!
//! Feed messages and device names come from the network, so they are stripped of
//! escape sequences and control characters before they reach the terminal. Width
//! handling respects UTF-8 boundaries and wide characters.

use strip_ansi_escapes::strip;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Remove ANSI escapes and control characters, collapsing newlines and tabs to spaces.
pub fn sanitize_display(raw: &str) -> String {
    let stripped = String::from_utf8_lossy(&strip(raw.as_bytes())).into_owned();
    let cleaned: String = stripped
        .chars()
        .map(|c| if c == '\n' || c == '\t' || c == '\r' { ' ' } else { c })
        .filter(|c| !c.is_control() && *c != '\u{200B}' && *c != '\u{FEFF}')
        .collect();
    cleaned.trim().to_string()
}

/// Truncate to at most `max_cols` terminal columns, appending `…` when cut.
pub fn truncate_columns(s: &str, max_cols: usize) -> String {
    if max_cols == 0 {
        return String::new();
    }
    if UnicodeWidthStr::width(s) <= max_cols {
        return s.to_string();
    }
    let budget = max_cols - 1;
    let mut out = String::new();
    let mut used = 0usize;
    for ch in s.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_escapes_and_controls() {
        assert_eq!(
            sanitize_display("\x1b[31mbreach\x1b[0m on CONE_A\x07"),
            "breach on CONE_A"
        );
        assert_eq!(sanitize_display("  zero\u{200B}width  "), "zerowidth");
    }

    #[test]
    fn truncate_respects_wide_characters() {
        assert_eq!(truncate_columns("short", 10), "short");
        assert_eq!(truncate_columns("abcdefgh", 5), "abcd…");
        assert_eq!(truncate_columns("日本語テキスト", 5), "日本…");
        assert_eq!(truncate_columns("anything", 0), "");
    }
}
