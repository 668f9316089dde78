//! Heuristic quality scoring of generated content.
//!
//! [`QualityScorer::score`] combines four signals, each in `[0, 1]`:
//!
//! | Signal | Measure |
//! |---|---|
//! | readability | simplified Flesch reading ease `/ 100` |
//! | diversity | unique tokens / total tokens |
//! | relevance | share of prompt and context keywords found in the content |
//! | structure | paragraphs and headings for bodies, single-paragraph form for short kinds, comma items for tag lists |
//!
//! The combination is a weighted sum normalized by the weight total. Scoring
//! is pure and deterministic; empty or blank content scores 0.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{ContentKind, GenerationRequest};

/// Vowels counted as syllable nuclei (Latin and Cyrillic).
const VOWELS: &str = "aeiouyаеёиоуыэюя";

/// Words too common to count as topical keywords.
const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "also", "been", "before", "being", "between", "both",
    "could", "does", "doing", "down", "during", "each", "from", "further", "have", "having",
    "here", "into", "just", "more", "most", "only", "other", "over", "same", "should", "some",
    "such", "than", "that", "their", "them", "then", "there", "these", "they", "this", "those",
    "through", "under", "until", "very", "were", "what", "when", "where", "which", "while",
    "with", "would", "your", "write", "please",
];

/// Weights of the four quality signals.
///
/// ```toml
/// [quality]
/// readability = 0.3
/// diversity = 0.3
/// relevance = 0.2
/// structure = 0.2
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub readability: f64,
    pub diversity: f64,
    pub relevance: f64,
    pub structure: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            readability: 0.3,
            diversity: 0.3,
            relevance: 0.2,
            structure: 0.2,
        }
    }
}

/// Per-signal scores behind an overall quality score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QualityBreakdown {
    pub readability: f64,
    pub diversity: f64,
    pub relevance: f64,
    pub structure: f64,
    pub overall: f64,
}

/// Pure, deterministic content scorer.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    weights: QualityWeights,
}

impl QualityScorer {
    pub fn new(weights: QualityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.weights
    }

    /// Overall score in `[0, 1]`.
    pub fn score(&self, content: &str, request: &GenerationRequest) -> f64 {
        self.breakdown(content, request).overall
    }

    /// Score with every signal exposed.
    pub fn breakdown(&self, content: &str, request: &GenerationRequest) -> QualityBreakdown {
        if content.trim().is_empty() {
            return QualityBreakdown::default();
        }
        let tokens = tokenize(content);
        let signals = QualityBreakdown {
            readability: readability(content),
            diversity: diversity(&tokens),
            relevance: relevance(&tokens, request),
            structure: structure(content, request.kind),
            overall: 0.0,
        };

        let w = &self.weights;
        let total = w.readability + w.diversity + w.relevance + w.structure;
        let overall = if total.is_finite() && total > 0.0 {
            (w.readability * signals.readability
                + w.diversity * signals.diversity
                + w.relevance * signals.relevance
                + w.structure * signals.structure)
                / total
        } else {
            0.0
        };
        QualityBreakdown {
            overall: unit(overall),
            ..signals
        }
    }
}

/// Lowercased alphanumeric runs.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn readability(text: &str) -> f64 {
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphabetic() && c != '\'')
        .filter(|w| w.chars().any(char::is_alphabetic))
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let sentences = text
        .split(['.', '!', '?'])
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .count()
        .max(1);
    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();

    let words_per_sentence = words.len() as f64 / sentences as f64;
    let syllables_per_word = syllables as f64 / words.len() as f64;
    let flesch = 206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word;
    unit(flesch.clamp(0.0, 100.0) / 100.0)
}

fn count_syllables(word: &str) -> usize {
    let lower = word.to_lowercase();
    let mut count = 0;
    let mut in_vowel_group = false;
    for c in lower.chars() {
        let is_vowel = VOWELS.contains(c);
        if is_vowel && !in_vowel_group {
            count += 1;
        }
        in_vowel_group = is_vowel;
    }
    // Silent trailing 'e' ("make"), but not "-le" ("table").
    if count > 1 && lower.ends_with('e') && !lower.ends_with("le") {
        count -= 1;
    }
    count.max(1)
}

fn diversity(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
    unique.len() as f64 / tokens.len() as f64
}

fn keywords(request: &GenerationRequest) -> HashSet<String> {
    std::iter::once(request.prompt.as_str())
        .chain(request.context.values().map(String::as_str))
        .flat_map(tokenize)
        .filter(|t| t.chars().count() > 3 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn relevance(tokens: &[String], request: &GenerationRequest) -> f64 {
    let keywords = keywords(request);
    if keywords.is_empty() {
        return 0.0;
    }
    let present: HashSet<&str> = tokens.iter().map(String::as_str).collect();
    let hits = keywords.iter().filter(|k| present.contains(k.as_str())).count();
    hits as f64 / keywords.len() as f64
}

fn paragraphs(text: &str) -> usize {
    let mut count = 0;
    let mut in_paragraph = false;
    for line in text.lines() {
        let blank = line.trim().is_empty();
        if !blank && !in_paragraph {
            count += 1;
        }
        in_paragraph = !blank;
    }
    count
}

fn structure(text: &str, kind: ContentKind) -> f64 {
    match kind {
        ContentKind::Body => {
            let mut score = 0.0;
            if paragraphs(text) >= 2 {
                score += 0.5;
            }
            let has_heading = text.lines().any(|l| {
                let l = l.trim_start();
                l.starts_with('#') || l.to_lowercase().starts_with("<h")
            });
            if has_heading {
                score += 0.5;
            }
            score
        }
        ContentKind::TagList => {
            let items = text
                .split([',', '\n'])
                .filter(|t| !t.trim().is_empty())
                .count();
            match items {
                0 => 0.0,
                1 => 0.5,
                _ => 1.0,
            }
        }
        ContentKind::Title | ContentKind::Excerpt | ContentKind::Comment => {
            if paragraphs(text) == 1 { 1.0 } else { 0.5 }
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}
