//! Fixed lexicons for the local heuristic backend.
//!
//! Terms are lowercase and matched on word boundaries against normalized
//! text (see [`NormalizedText`]), so "but" never matches "button".

/// Directive, hierarchical phrasing
pub const POWER_LANGUAGE: &[&str] = &[
    "you must",
    "you need to",
    "i require",
    "i expect",
    "you should",
    "it is mandatory",
    "compliance required",
    "immediately",
    "demand",
    "insist",
    "non negotiable",
    "no exceptions",
];

/// Collaborative counterweights to power language
pub const COLLABORATIVE_LANGUAGE: &[&str] = &[
    "we",
    "our",
    "together",
    "team",
    "collaborate",
    "collaboration",
    "partner",
    "partnership",
    "suggest",
    "recommend",
    "consider",
];

/// First-person singular; weighs against collaboration
pub const INDIVIDUAL_LANGUAGE: &[&str] = &["i", "my", "me", "mine", "myself"];

pub const TRUST_LANGUAGE: &[&str] = &[
    "trust",
    "confidence",
    "rely",
    "depend",
    "believe",
    "transparent",
    "honest",
];

pub const DISTRUST_LANGUAGE: &[&str] = &[
    "doubt",
    "verify",
    "double check",
    "not sure",
    "suspicious",
    "questionable",
];

pub const PASSIVE_AGGRESSIVE: &[&str] = &[
    "per my last email",
    "as i mentioned",
    "as previously stated",
    "for future reference",
    "just to clarify",
    "hopefully this helps",
    "i assume you know",
    "you should know",
    "going forward",
    "not sure if you saw",
];

/// Words that inflate enthusiasm. Several at once read as excessive.
pub const ENTHUSIASM: &[&str] = &[
    "thrilled",
    "happier",
    "happiest",
    "delighted",
    "ecstatic",
    "wonderful",
    "amazing",
    "fantastic",
    "perfect",
    "brilliant",
    "awesome",
    "incredible",
    "love",
    "excellent",
];

pub const HYPERBOLE: &[&str] = &[
    "absolutely",
    "nothing makes me",
    "best ever",
    "worst ever",
    "of all time",
    "literally",
    "totally",
    "completely",
    "never",
    "always",
    "can't wait",
    "couldn't be happier",
];

/// Contrastive connectors; paired with enthusiasm they suggest contradiction
pub const CONTRAST_MARKERS: &[&str] = &[
    "but",
    "however",
    "although",
    "though",
    "yet again",
    "unfortunately",
];

/// Explicit irony markers
pub const SARCASM_MARKERS: &[&str] = &[
    "yeah right",
    "oh great",
    "just great",
    "sure thing",
    "how nice",
    "thanks a lot",
    "big surprise",
    "what a surprise",
];

pub const POSITIVE: &[&str] = &[
    "thank you",
    "thanks",
    "appreciate",
    "excellent",
    "great work",
    "well done",
    "looking forward",
    "pleasure",
    "good",
    "great",
    "glad",
    "happy",
];

pub const NEGATIVE: &[&str] = &[
    "unfortunately",
    "problem",
    "issue",
    "concern",
    "disappointed",
    "frustrated",
    "wrong",
    "failed",
    "error",
    "terrible",
    "bad",
    "sorry",
];

pub const URGENCY_HIGH: &[&str] = &["asap", "urgent", "immediately", "emergency", "today", "right now"];
pub const URGENCY_MEDIUM: &[&str] = &["soon", "prompt", "attention", "important", "follow up"];

pub const FORMAL_MARKERS: &[&str] = &["dear", "sincerely", "regards", "respectfully", "kindly", "furthermore"];
pub const INFORMAL_MARKERS: &[&str] = &["hey", "hi", "cheers", "lol", "gonna", "wanna", "thx"];

/// Alt-text cues for coarse image sentiment
pub const IMAGE_POSITIVE: &[&str] = &["happy", "celebration", "success", "achievement", "party", "smile"];
pub const IMAGE_NEGATIVE: &[&str] = &["sad", "problem", "error", "conflict", "tired", "angry"];

/// Emoji that read as upbeat
pub const POSITIVE_EMOJI: &[char] = &['😊', '👍', '🎉', '❤', '⭐', '😀', '🙂', '😍'];

/// Phrases worth pointing out to the writer: likely to read as critical
pub const KEY_RISK_TERMS: &[&str] = &["should", "need to", "must", "wrong", "error", "mistake", "unacceptable"];
/// Phrases worth pointing out to the writer: they help the tone
pub const KEY_POSITIVE_TERMS: &[&str] = &["thanks", "thank you", "appreciate", "excellent", "collaboration", "together"];

/// Recurring communication habits and the label each one maps to
pub const COMMUNICATION_PATTERNS: &[(&str, &str)] = &[
    ("per my last email", "repetitive_reference"),
    ("as i mentioned", "repetitive_emphasis"),
    ("just to clarify", "clarification_seeking"),
    ("hopefully this helps", "passive_helpful"),
];

// ============================================================================
// Normalized Text
// ============================================================================

/// Lowercased text with punctuation folded to single spaces and padded, so
/// word-boundary lookups are plain substring checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    padded: String,
}

impl NormalizedText {
    pub fn new(text: &str) -> Self {
        let mut padded = String::with_capacity(text.len() + 2);
        padded.push(' ');
        let mut last_space = true;
        for c in text.chars().flat_map(char::to_lowercase) {
            let c = if c == '’' { '\'' } else { c };
            if c.is_alphanumeric() || c == '\'' {
                padded.push(c);
                last_space = false;
            } else if !last_space {
                padded.push(' ');
                last_space = true;
            }
        }
        if !last_space {
            padded.push(' ');
        }
        Self { padded }
    }

    /// Whether the term occurs on word boundaries
    pub fn contains(&self, term: &str) -> bool {
        self.padded.contains(&format!(" {} ", term))
    }

    /// Number of distinct lexicon terms present
    pub fn count_terms(&self, terms: &[&str]) -> usize {
        terms.iter().filter(|t| self.contains(t)).count()
    }

    /// Lexicon terms present, in lexicon order
    pub fn matching_terms(&self, terms: &[&'static str]) -> Vec<&'static str> {
        terms.iter().copied().filter(|t| self.contains(t)).collect()
    }

    pub fn as_str(&self) -> &str {
        self.padded.trim()
    }
}

/// Total number of terms across all lexicons; zero means nothing loaded
pub fn loaded_term_count() -> usize {
    [
        POWER_LANGUAGE,
        COLLABORATIVE_LANGUAGE,
        TRUST_LANGUAGE,
        DISTRUST_LANGUAGE,
        PASSIVE_AGGRESSIVE,
        ENTHUSIASM,
        HYPERBOLE,
        CONTRAST_MARKERS,
        SARCASM_MARKERS,
        POSITIVE,
        NEGATIVE,
    ]
    .iter()
    .map(|l| l.len())
    .sum()
}
