// file: src/retrieval/normalizer.rs
// description: canonicalizes vietnamese queries before they reach the indexes
// reference: https://docs.rs/unicode-normalization

use crate::error::{PipelineError, Result};
use crate::extract::patterns::{PUNCTUATION, WHITESPACE};
use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

pub const DEFAULT_MAX_QUERY_CHARS: usize = 1000;

/// Longest domain phrase, in words.
const MAX_PHRASE_WORDS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "và", "hoặc", "nhưng", "mà", "nếu", "thì", "là", "của", "trong", "ngoài", "trên", "dưới",
    "trước", "sau", "giữa", "bên", "cạnh", "đối", "với", "theo", "từ", "đến", "ở", "tại", "về",
    "để", "cho", "vì", "do", "bởi", "nên", "đã", "đang", "sẽ", "được", "bị", "phải", "có",
    "không", "chưa", "rất", "quá", "lắm", "nhiều", "ít", "mấy", "bao", "nào", "gì", "đâu", "sao",
    "thế", "vậy", "này", "kia", "đó", "đây", "ấy", "nọ", "tôi", "tao", "mày", "bạn", "các",
    "những", "cái", "con", "người", "việc", "điều", "câu", "chuyện", "lúc", "khi", "nơi", "chỗ",
    "đấy",
];

/// Never dropped, even where a word is also a stop word.
const DOMAIN_KEYWORDS: &[&str] = &[
    "mã hp", "lớp học phần", "khóa học", "số tc", "số sv", "hình thức học", "tuần học", "thứ",
    "tiết", "phòng học", "cơ sở", "giáo viên", "khoa", "viện", "thông báo", "quyết định",
    "văn bản", "nghị quyết", "kế hoạch", "lịch", "đào tạo", "sinh viên", "học phí", "học bổng",
    "tốt nghiệp", "thi", "điểm", "kỳ", "học kỳ", "năm học", "chương trình", "ngành",
];

lazy_static! {
    static ref STOP_WORD_SET: HashSet<String> =
        STOP_WORDS.iter().map(|w| w.nfc().collect()).collect();
    static ref DOMAIN_KEYWORD_SET: HashSet<String> =
        DOMAIN_KEYWORDS.iter().map(|w| w.nfc().collect()).collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    DomainKeyword,
    Content,
    Stopword,
    /// Single characters carry no signal on their own.
    TooShort,
}

impl TokenKind {
    pub fn is_kept(&self) -> bool {
        matches!(self, TokenKind::DomainKeyword | TokenKind::Content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryToken {
    pub text: String,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedQuery {
    pub original: String,
    /// What is sent to the indexes.
    pub text: String,
    pub tokens: Vec<QueryToken>,
    pub truncated: bool,
    /// True when normalization failed and `text` is the raw query.
    pub fell_back: bool,
}

impl NormalizedQuery {
    pub fn kept_tokens(&self) -> impl Iterator<Item = &QueryToken> {
        self.tokens.iter().filter(|t| t.kind.is_kept())
    }
}

#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    max_chars: usize,
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUERY_CHARS)
    }
}

impl QueryNormalizer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    /// Rejects only empty queries; every other failure falls back to the raw text.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedQuery> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::Validation("Query is empty".to_string()));
        }

        let (bounded, truncated) = truncate_chars(trimmed, self.max_chars);
        if truncated {
            debug!("Query truncated to {} characters", self.max_chars);
        }

        match self.pipeline(bounded) {
            Ok((text, tokens)) => Ok(NormalizedQuery {
                original: raw.to_string(),
                text,
                tokens,
                truncated,
                fell_back: false,
            }),
            Err(e) => {
                warn!("Query normalization failed, using raw query: {}", e);
                Ok(NormalizedQuery {
                    original: raw.to_string(),
                    text: bounded.to_string(),
                    tokens: Vec::new(),
                    truncated,
                    fell_back: true,
                })
            }
        }
    }

    fn pipeline(&self, query: &str) -> Result<(String, Vec<QueryToken>)> {
        let composed: String = query.nfc().collect();
        let stripped = PUNCTUATION.replace_all(&composed, " ");
        let collapsed = WHITESPACE.replace_all(&stripped, " ");
        let cleaned = collapsed.to_lowercase().trim().to_string();

        if cleaned.is_empty() {
            return Err(PipelineError::Validation(
                "nothing left after removing punctuation".to_string(),
            ));
        }

        let tokens = tokenize(&cleaned);
        let kept: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind.is_kept())
            .map(|t| t.text.as_str())
            .collect();

        if kept.is_empty() {
            debug!("No content tokens in query, using cleaned text");
            return Ok((cleaned, tokens));
        }

        Ok((kept.join(" "), tokens))
    }
}

/// Classifies words, matching multi-word domain phrases longest first.
fn tokenize(cleaned: &str) -> Vec<QueryToken> {
    let words: Vec<&str> = cleaned.split(' ').filter(|w| !w.is_empty()).collect();
    let mut tokens = Vec::with_capacity(words.len());
    let mut i = 0;

    while i < words.len() {
        let longest = MAX_PHRASE_WORDS.min(words.len() - i);
        let phrase = (1..=longest).rev().find_map(|n| {
            let candidate = words[i..i + n].join(" ");
            DOMAIN_KEYWORD_SET.contains(&candidate).then_some((candidate, n))
        });

        if let Some((text, n)) = phrase {
            tokens.push(QueryToken {
                text,
                kind: TokenKind::DomainKeyword,
            });
            i += n;
            continue;
        }

        let word = words[i];
        let kind = if STOP_WORD_SET.contains(word) {
            TokenKind::Stopword
        } else if word.chars().count() <= 1 {
            TokenKind::TooShort
        } else {
            TokenKind::Content
        };
        tokens.push(QueryToken {
            text: word.to_string(),
            kind,
        });
        i += 1;
    }

    tokens
}

fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => (&text[..byte_index], true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn normalize(query: &str) -> NormalizedQuery {
        QueryNormalizer::default().normalize(query).unwrap()
    }

    #[test]
    fn test_keeps_domain_phrases_and_drops_stop_words() {
        let query = normalize("Lịch thi học kỳ 1 của sinh viên là khi nào?");
        assert_eq!(query.text, "lịch thi học kỳ sinh viên");

        let keywords: Vec<&str> = query
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::DomainKeyword)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(keywords, vec!["lịch", "thi", "học kỳ", "sinh viên"]);
    }

    #[test]
    fn test_content_words_survive() {
        let query = normalize("Học phí ngành Khoa học máy tính!!!");
        assert_eq!(query.text, "học phí ngành khoa học máy tính");
    }

    #[test]
    fn test_only_stop_words_fall_back_to_cleaned_text() {
        let query = normalize("Cái đó là gì vậy?");
        assert_eq!(query.text, "cái đó là gì vậy");
        assert_eq!(query.kept_tokens().count(), 0);
        assert!(!query.fell_back);
    }

    #[test]
    fn test_decomposed_input_is_composed() {
        // "học phí" with combining marks
        let decomposed = "ho\u{0323}c phi\u{0301}";
        assert_eq!(normalize(decomposed).text, "học phí");
    }

    #[test]
    fn test_punctuation_only_falls_back_to_raw() {
        let query = normalize("?!...");
        assert!(query.fell_back);
        assert_eq!(query.text, "?!...");
    }

    #[test]
    fn test_truncates_long_query() {
        let query = QueryNormalizer::new(9).normalize(&"điểm rèn luyện ".repeat(10)).unwrap();
        assert!(query.truncated);
        assert_eq!(query.text, "điểm rèn");
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(QueryNormalizer::default().normalize("  \n ").is_err());
    }
}
