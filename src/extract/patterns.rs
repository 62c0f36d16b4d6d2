// file: src/extract/patterns.rs
// description: compiled regex patterns for text cleanup and query normalization
// reference: https://docs.rs/regex

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Text cleanup
    pub static ref EXCESS_NEWLINES: Regex = Regex::new(
        r"\n{3,}"
    ).expect("EXCESS_NEWLINES regex is valid");

    pub static ref HORIZONTAL_SPACE: Regex = Regex::new(
        r"[ \t\u{00A0}]+"
    ).expect("HORIZONTAL_SPACE regex is valid");

    pub static ref CONTROL_CHARS: Regex = Regex::new(
        r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]"
    ).expect("CONTROL_CHARS regex is valid");

    // Query normalization
    pub static ref PUNCTUATION: Regex = Regex::new(
        r"[^\w\s]"
    ).expect("PUNCTUATION regex is valid");

    pub static ref WHITESPACE: Regex = Regex::new(
        r"\s+"
    ).expect("WHITESPACE regex is valid");
}

/// Strips control characters and collapses runs of blank lines and spaces.
pub fn clean_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = CONTROL_CHARS.replace_all(&text, "");
    let text = HORIZONTAL_SPACE.replace_all(&text, " ");
    let text = text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");

    EXCESS_NEWLINES.replace_all(&text, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        let raw = "Thông  báo\t\tsố 12\r\n\n\n\n\nNội dung\x07 chính   \n";
        assert_eq!(clean_text(raw), "Thông báo số 12\n\nNội dung chính");
    }

    #[test]
    fn test_punctuation_keeps_vietnamese_letters() {
        let cleaned = PUNCTUATION.replace_all("học phí: 2025-2026?", " ");
        assert_eq!(cleaned, "học phí  2025 2026 ");
    }
}
