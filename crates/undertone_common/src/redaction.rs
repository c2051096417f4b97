//! Privacy Sanitizer
//!
//! Replaces recognizable identifiers with fixed placeholder tokens before
//! content may leave the local environment:
//! - Email addresses -> `[EMAIL]`
//! - Payment-card-like digit runs -> `[CARD]`
//! - Phone numbers -> `[PHONE]`
//!
//! Pattern classes, not lookup tables. Every string carried by a [`Content`]
//! is sanitized: message text, image alt text and source URIs, metadata values.
//!
//! Sanitization runs to a fixpoint. Placeholders contain neither digits nor
//! `@`, and every match removes at least one of them, so the loop terminates
//! and `sanitize(sanitize(x)) == sanitize(x)` holds for all input.

use crate::types::{Content, ImageRef};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

// =============================================================================
// Identifier Types
// =============================================================================

/// Classes of identifiers the sanitizer recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Email,
    Card,
    Phone,
}

impl IdentifierKind {
    pub fn placeholder(&self) -> &'static str {
        match self {
            IdentifierKind::Email => "[EMAIL]",
            IdentifierKind::Card => "[CARD]",
            IdentifierKind::Phone => "[PHONE]",
        }
    }
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.placeholder())
    }
}

// =============================================================================
// Compiled Patterns
// =============================================================================

struct IdentifierPattern {
    regex: Regex,
    kind: IdentifierKind,
}

impl IdentifierPattern {
    fn new(pattern: &str, kind: IdentifierKind) -> Option<Self> {
        Regex::new(pattern).ok().map(|regex| Self { regex, kind })
    }
}

// Order matters: emails before digit classes so a number inside an address
// goes with the address, and cards before phones so long runs stay whole.
static IDENTIFIER_PATTERNS: LazyLock<Vec<IdentifierPattern>> = LazyLock::new(|| {
    let patterns: Vec<(&str, IdentifierKind)> = vec![
        (
            r"[\p{L}\p{N}._%+\-]+@[\p{L}\p{N}.\-]+\.\p{L}{2,}",
            IdentifierKind::Email,
        ),
        // 13-19 digits, optionally grouped by spaces or dashes
        (r"\b(?:\d[ \-]?){12,18}\d\b", IdentifierKind::Card),
        (
            r"(?:\+\d{1,3}[\s.\-]?)?(?:\(\d{2,4}\)\s?|\b\d{2,4}[\s.\-])\d{3,4}[\s.\-]?\d{3,4}\b",
            IdentifierKind::Phone,
        ),
        (r"\+?\b\d{10,12}\b", IdentifierKind::Phone),
    ];

    patterns
        .into_iter()
        .filter_map(|(p, kind)| IdentifierPattern::new(p, kind))
        .collect()
});

// =============================================================================
// Text-level API
// =============================================================================

/// Counts of replacements made, by identifier class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionSummary {
    pub counts: BTreeMap<IdentifierKind, usize>,
}

impl RedactionSummary {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn record(&mut self, kind: IdentifierKind, n: usize) {
        if n > 0 {
            *self.counts.entry(kind).or_insert(0) += n;
        }
    }

    fn absorb(&mut self, other: RedactionSummary) {
        for (kind, n) in other.counts {
            self.record(kind, n);
        }
    }
}

fn redact_pass(text: &str, summary: &mut RedactionSummary) -> String {
    let mut out = text.to_string();
    for pattern in IDENTIFIER_PATTERNS.iter() {
        let hits = pattern.regex.find_iter(&out).count();
        if hits > 0 {
            summary.record(pattern.kind, hits);
            out = pattern
                .regex
                .replace_all(&out, pattern.kind.placeholder())
                .into_owned();
        }
    }
    out
}

/// Replace identifiers in a single string, returning what was replaced
pub fn redact_text_with_summary(text: &str) -> (String, RedactionSummary) {
    let mut summary = RedactionSummary::default();
    let mut current = text.to_string();
    loop {
        let next = redact_pass(&current, &mut summary);
        if next == current {
            return (current, summary);
        }
        current = next;
    }
}

/// Replace identifiers in a single string
pub fn redact_text(text: &str) -> String {
    redact_text_with_summary(text).0
}

/// Whether any identifier class matches the string
pub fn contains_identifiers(text: &str) -> bool {
    IDENTIFIER_PATTERNS.iter().any(|p| p.regex.is_match(text))
}

/// Identifier classes present in the string, in pattern order
pub fn detect_identifiers(text: &str) -> Vec<IdentifierKind> {
    let mut kinds: Vec<IdentifierKind> = IDENTIFIER_PATTERNS
        .iter()
        .filter(|p| p.regex.is_match(text))
        .map(|p| p.kind)
        .collect();
    kinds.dedup();
    kinds
}

// =============================================================================
// Content-level API
// =============================================================================

/// Sanitize every string in the content and report what was replaced.
/// Never fails; unmatched input passes through unchanged.
pub fn sanitize_with_summary(content: &Content) -> (Content, RedactionSummary) {
    let mut summary = RedactionSummary::default();

    let (text, s) = redact_text_with_summary(content.text());
    summary.absorb(s);

    let images = content
        .images()
        .iter()
        .map(|image| {
            let (source_uri, s1) = redact_text_with_summary(&image.source_uri);
            let (alt_text, s2) = redact_text_with_summary(&image.alt_text);
            summary.absorb(s1);
            summary.absorb(s2);
            ImageRef {
                source_uri,
                alt_text,
                pixel_area: image.pixel_area,
            }
        })
        .collect();

    let metadata = content
        .metadata()
        .iter()
        .map(|(key, value)| {
            let (value, s) = redact_text_with_summary(value);
            summary.absorb(s);
            (key.clone(), value)
        })
        .collect();

    (Content::from_sanitized_parts(text, images, metadata), summary)
}

/// Sanitize every string in the content
pub fn sanitize(content: &Content) -> Content {
    sanitize_with_summary(content).0
}

/// Whether any string in the content still carries an identifier
pub fn content_contains_identifiers(content: &Content) -> bool {
    contains_identifiers(content.text())
        || content
            .images()
            .iter()
            .any(|i| contains_identifiers(&i.source_uri) || contains_identifiers(&i.alt_text))
        || content.metadata().values().any(|v| contains_identifiers(v))
}
