//! Local heuristic backend.
//!
//! Keyword and pattern scoring over the fixed lexicons in
//! [`undertone_common::lexicon`]. Never suspends and never fails: the same
//! content and mode always produce the same scores.

use super::{AnalysisBackend, BackendError};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use undertone_common::lexicon::{self, NormalizedText};
use undertone_common::{
    clamp_score, AnalysisMode, AnalysisResult, BackendId, Content, Dimension, EscalationStatus,
    ImageRef, Signal, MAX_RECOMMENDATIONS,
};

// ============================================================================
// Scoring Constants
// ============================================================================

const EXCESSIVE_POSITIVITY_SCORE: f64 = 25.0;
const HYPERBOLE_SCORE: f64 = 30.0;
const CONTRADICTION_SCORE: f64 = 35.0;
const PASSIVE_AGGRESSIVE_SCORE: f64 = 40.0;
const INCONGRUENT_VISUAL_SCORE: f64 = 20.0;

/// Enthusiasm hits (terms plus shouted words) that read as excessive
const EXCESSIVE_POSITIVITY_HITS: usize = 3;

const TEXTUAL_WEIGHT: f64 = 0.7;
const VISUAL_WEIGHT: f64 = 0.3;

/// Images smaller than this are treated as icons and ignored
const MIN_IMAGE_AREA: u64 = 32 * 32;

const BASE_CONFIDENCE: f64 = 0.45;
const CONFIDENCE_PER_CATEGORY: f64 = 0.05;
const MAX_CONFIDENCE: f64 = 0.75;

const SARCASTIC_TONE_AT: u8 = 50;
const LOW_TRUST_BELOW: u8 = 40;

// ============================================================================
// Text Signals
// ============================================================================

#[derive(Debug, Default)]
struct TextSignals {
    power: usize,
    collaborative: usize,
    individual: usize,
    trust: usize,
    distrust: usize,
    passive_aggressive: usize,
    enthusiasm: usize,
    shouted: usize,
    hyperbole: usize,
    contrast: usize,
    sarcasm_markers: usize,
    positive: usize,
    negative: usize,
    urgency_high: usize,
    urgency_medium: usize,
    formal: usize,
    informal: usize,
    patterns: Vec<String>,
    words: usize,
    sentences: usize,
}

impl TextSignals {
    fn collect(text: &str) -> Self {
        let norm = NormalizedText::new(text);
        let words = text.split_whitespace().count();
        let sentences = text
            .split(|c: char| matches!(c, '.' | '!' | '?'))
            .filter(|s| !s.trim().is_empty())
            .count();

        Self {
            power: norm.count_terms(lexicon::POWER_LANGUAGE),
            collaborative: norm.count_terms(lexicon::COLLABORATIVE_LANGUAGE),
            individual: norm.count_terms(lexicon::INDIVIDUAL_LANGUAGE),
            trust: norm.count_terms(lexicon::TRUST_LANGUAGE),
            distrust: norm.count_terms(lexicon::DISTRUST_LANGUAGE),
            passive_aggressive: norm.count_terms(lexicon::PASSIVE_AGGRESSIVE),
            enthusiasm: norm.count_terms(lexicon::ENTHUSIASM),
            shouted: count_shouted_words(text),
            hyperbole: norm.count_terms(lexicon::HYPERBOLE),
            contrast: norm.count_terms(lexicon::CONTRAST_MARKERS),
            sarcasm_markers: norm.count_terms(lexicon::SARCASM_MARKERS),
            positive: norm.count_terms(lexicon::POSITIVE),
            negative: norm.count_terms(lexicon::NEGATIVE),
            urgency_high: norm.count_terms(lexicon::URGENCY_HIGH),
            urgency_medium: norm.count_terms(lexicon::URGENCY_MEDIUM),
            formal: norm.count_terms(lexicon::FORMAL_MARKERS),
            informal: norm.count_terms(lexicon::INFORMAL_MARKERS),
            patterns: lexicon::COMMUNICATION_PATTERNS
                .iter()
                .filter(|(phrase, _)| norm.contains(phrase))
                .map(|(_, label)| label.to_string())
                .collect(),
            words,
            sentences,
        }
    }

    /// Number of distinct lexicon categories with at least one hit
    fn categories_hit(&self) -> usize {
        [
            self.power,
            self.collaborative,
            self.trust,
            self.distrust,
            self.passive_aggressive,
            self.enthusiasm,
            self.hyperbole,
            self.contrast,
            self.sarcasm_markers,
            self.positive,
            self.negative,
        ]
        .iter()
        .filter(|&&n| n > 0)
        .count()
    }

    fn is_negative(&self) -> bool {
        self.negative > self.positive
    }
}

/// All-caps words of three or more letters
fn count_shouted_words(text: &str) -> usize {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() >= 3 && w.chars().all(|c| c.is_uppercase()))
        .count()
}

// ============================================================================
// Sarcasm
// ============================================================================

#[derive(Debug, Default)]
struct SarcasmReading {
    score: f64,
    patterns: Vec<String>,
}

fn textual_sarcasm(signals: &TextSignals) -> SarcasmReading {
    let mut reading = SarcasmReading::default();

    if signals.enthusiasm + signals.shouted >= EXCESSIVE_POSITIVITY_HITS {
        reading.score += EXCESSIVE_POSITIVITY_SCORE;
        reading.patterns.push("excessive_positivity".into());
    }
    if signals.hyperbole > 0 {
        reading.score += HYPERBOLE_SCORE;
        reading.patterns.push("unexpected_hyperbole".into());
    }
    let praises = signals.enthusiasm + signals.positive > 0;
    if (signals.contrast > 0 && praises) || signals.sarcasm_markers > 0 {
        reading.score += CONTRADICTION_SCORE;
        reading.patterns.push("contextual_contradiction".into());
    }
    if signals.passive_aggressive > 0 {
        reading.score += PASSIVE_AGGRESSIVE_SCORE;
        reading.patterns.push("passive_aggressive_language".into());
    }

    reading.score = reading.score.min(100.0);
    reading
}

fn image_is_upbeat(image: &ImageRef) -> bool {
    let alt = NormalizedText::new(&image.alt_text);
    alt.count_terms(lexicon::IMAGE_POSITIVE) > alt.count_terms(lexicon::IMAGE_NEGATIVE)
}

/// Visual reading, or `None` when the content carries no visual context
fn visual_sarcasm(content: &Content, text_is_negative: bool) -> Option<SarcasmReading> {
    let images: Vec<&ImageRef> = content
        .images()
        .iter()
        .filter(|i| i.pixel_area == 0 || i.pixel_area >= MIN_IMAGE_AREA)
        .collect();
    let emoji: Vec<char> = content
        .text()
        .chars()
        .filter(|c| lexicon::POSITIVE_EMOJI.contains(c))
        .collect();

    if images.is_empty() && emoji.is_empty() {
        return None;
    }

    let mut reading = SarcasmReading::default();
    if text_is_negative {
        for image in images.iter().filter(|i| image_is_upbeat(i)) {
            reading.score += INCONGRUENT_VISUAL_SCORE;
            if !reading.patterns.iter().any(|p| p == "incongruent_image") {
                reading.patterns.push("incongruent_image".into());
            }
            tracing::trace!(alt = %image.alt_text, "Upbeat image on negative text");
        }
        if !emoji.is_empty() {
            reading.score += INCONGRUENT_VISUAL_SCORE * emoji.len() as f64;
            reading.patterns.push("incongruent_emoji".into());
        }
    }
    reading.score = reading.score.min(100.0);
    Some(reading)
}

fn combine(textual: SarcasmReading, visual: Option<SarcasmReading>) -> SarcasmReading {
    match visual {
        None => textual,
        Some(visual) => {
            let mut patterns = textual.patterns;
            for p in visual.patterns {
                if !patterns.contains(&p) {
                    patterns.push(p);
                }
            }
            SarcasmReading {
                score: (textual.score * TEXTUAL_WEIGHT + visual.score * VISUAL_WEIGHT).min(100.0),
                patterns,
            }
        }
    }
}

// ============================================================================
// Dimensions
// ============================================================================

fn power_dynamics(s: &TextSignals) -> &'static str {
    if s.power > s.collaborative + 2 {
        "high"
    } else if s.collaborative > s.power + 2 {
        "low"
    } else {
        "balanced"
    }
}

fn communication_style(s: &TextSignals) -> &'static str {
    match s.formal.cmp(&s.informal) {
        std::cmp::Ordering::Greater => "formal",
        std::cmp::Ordering::Less => "informal",
        std::cmp::Ordering::Equal => "neutral",
    }
}

fn complexity(s: &TextSignals) -> &'static str {
    let avg = s.words as f64 / s.sentences.max(1) as f64;
    if avg > 25.0 {
        "high"
    } else if avg > 15.0 {
        "medium"
    } else {
        "low"
    }
}

fn urgency(s: &TextSignals) -> &'static str {
    if s.urgency_high > 0 {
        "high"
    } else if s.urgency_medium > 0 {
        "medium"
    } else {
        "low"
    }
}

fn tone(s: &TextSignals, sarcasm: u8) -> &'static str {
    if sarcasm >= SARCASTIC_TONE_AT {
        "sarcastic"
    } else if s.positive > s.negative {
        "positive"
    } else if s.negative > s.positive {
        "negative"
    } else {
        "neutral"
    }
}

fn overall_risk(s: &TextSignals, sarcasm: f64) -> u8 {
    let mut risk = 10.0;
    risk += 15.0 * s.passive_aggressive as f64;
    risk += 12.0 * s.power as f64;
    risk += 8.0 * s.negative as f64;
    risk += 0.3 * sarcasm;
    if s.urgency_high > 0 {
        risk += 10.0;
    }
    risk -= 5.0 * s.positive as f64;
    risk -= 3.0 * s.trust as f64;
    clamp_score(risk)
}

fn recommendations(
    s: &TextSignals,
    sarcasm: u8,
    tone: &str,
    power: &str,
    trust: u8,
) -> Vec<String> {
    let mut recs = Vec::new();
    if sarcasm >= SARCASTIC_TONE_AT {
        recs.push("Sarcasm likely: confirm intent before replying to the literal message".to_string());
    } else if sarcasm > 30 {
        recs.push("Possible sarcasm: read the message against its context".to_string());
    }
    if s.passive_aggressive > 0 {
        recs.push("Passive-aggressive phrasing: address the underlying concern directly".to_string());
    }
    if power == "high" {
        recs.push("Directive language: consider phrasing requests as suggestions".to_string());
    }
    if tone == "negative" {
        recs.push("Negative tone: acknowledge the concern before proposing next steps".to_string());
    }
    if trust < LOW_TRUST_BELOW {
        recs.push("Low trust signals: be explicit about commitments and follow-through".to_string());
    }
    if s.urgency_high > 0 {
        recs.push("Urgent request: confirm the actual deadline".to_string());
    }
    recs.truncate(MAX_RECOMMENDATIONS);
    recs
}

/// Score content against the lexicons. Pure apart from the timestamp.
pub fn analyze_content(content: &Content, mode: AnalysisMode) -> AnalysisResult {
    let signals = TextSignals::collect(content.text());

    let textual = textual_sarcasm(&signals);
    let visual = match mode {
        AnalysisMode::Multimodal => visual_sarcasm(content, signals.is_negative()),
        _ => None,
    };
    let sarcasm_reading = combine(textual, visual);
    let sarcasm = clamp_score(sarcasm_reading.score);

    let tone = tone(&signals, sarcasm);
    let power = power_dynamics(&signals);
    let trust = clamp_score(50.0 + (signals.trust as f64 - signals.distrust as f64) * 20.0);
    let collaboration =
        clamp_score(50.0 + (signals.collaborative as f64 - signals.individual as f64) * 10.0);
    let emotional_score =
        clamp_score(50.0 + (signals.positive as f64 - signals.negative as f64) * 10.0);

    let mut strategic = Dimension::new();
    strategic.insert("powerDynamics".into(), Signal::label(power));
    strategic.insert("communicationStyle".into(), Signal::label(communication_style(&signals)));
    strategic.insert("complexity".into(), Signal::label(complexity(&signals)));
    strategic.insert("urgency".into(), Signal::label(urgency(&signals)));

    let mut emotional = Dimension::new();
    emotional.insert("tone".into(), Signal::label(tone));
    emotional.insert("score".into(), Signal::Number(emotional_score as f64));
    emotional.insert("sarcasmPatterns".into(), Signal::List(sarcasm_reading.patterns));

    let mut relational = Dimension::new();
    relational.insert("trust".into(), Signal::Number(trust as f64));
    relational.insert("collaboration".into(), Signal::Number(collaboration as f64));
    relational.insert(
        "communicationPatterns".into(),
        Signal::List(signals.patterns.clone()),
    );

    let confidence = (BASE_CONFIDENCE + CONFIDENCE_PER_CATEGORY * signals.categories_hit() as f64)
        .min(MAX_CONFIDENCE);

    AnalysisResult {
        recommendations: recommendations(&signals, sarcasm, tone, power, trust),
        strategic,
        emotional,
        relational,
        overall_risk: overall_risk(&signals, sarcasm_reading.score),
        sarcasm_score: sarcasm,
        confidence,
        source: BackendId::LocalHeuristic,
        timestamp: Utc::now(),
        escalation: EscalationStatus::NotNeeded,
    }
}

// ============================================================================
// Backend
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct HeuristicBackend;

impl HeuristicBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AnalysisBackend for HeuristicBackend {
    fn id(&self) -> BackendId {
        BackendId::LocalHeuristic
    }

    async fn analyze(
        &self,
        content: &Content,
        mode: AnalysisMode,
        _timeout: Duration,
    ) -> Result<AnalysisResult, BackendError> {
        Ok(analyze_content(content, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(dim: &Dimension, key: &str) -> Vec<String> {
        match dim.get(key) {
            Some(Signal::List(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_positive_message() {
        let content = Content::new("Thank you for the excellent work, really appreciate the team");
        let result = analyze_content(&content, AnalysisMode::Quick);
        assert_eq!(result.tone(), Some("positive"));
        assert!(result.overall_risk < 30);
        assert_eq!(result.sarcasm_score, 0);
        assert!(result.recommendations.is_empty());
        assert_eq!(result.source, BackendId::LocalHeuristic);
    }

    #[test]
    fn test_enthusiastic_hyperbole_is_ambiguous_sarcasm() {
        let content = Content::new(
            "I'm absolutely THRILLED the deadline moved up, nothing makes me happier than working weekends",
        );
        let result = analyze_content(&content, AnalysisMode::Deep);
        assert_eq!(result.sarcasm_score, 55);
        let patterns = labels(&result.emotional, "sarcasmPatterns");
        assert!(patterns.contains(&"excessive_positivity".to_string()));
        assert!(patterns.contains(&"unexpected_hyperbole".to_string()));
        assert_eq!(result.tone(), Some("sarcastic"));
        assert!(result.confidence < 0.6);
    }

    #[test]
    fn test_passive_aggressive_raises_risk() {
        let content = Content::new(
            "Per my last email, you must send the report immediately. As I mentioned, this is urgent.",
        );
        let result = analyze_content(&content, AnalysisMode::Quick);
        assert!(result.overall_risk > 70, "risk was {}", result.overall_risk);
        assert_eq!(
            labels(&result.relational, "communicationPatterns"),
            vec!["repetitive_reference".to_string(), "repetitive_emphasis".to_string()]
        );
        assert_eq!(result.strategic["urgency"], Signal::label("high"));
        assert!(result.recommendations.len() <= MAX_RECOMMENDATIONS);
    }

    #[test]
    fn test_contrast_with_praise_is_contradiction() {
        let content = Content::new("Great presentation, but the numbers were wrong again.");
        let result = analyze_content(&content, AnalysisMode::Quick);
        let patterns = labels(&result.emotional, "sarcasmPatterns");
        assert!(patterns.contains(&"contextual_contradiction".to_string()));
        assert_eq!(result.sarcasm_score, 35);
    }

    #[test]
    fn test_deterministic() {
        let content = Content::new("Hopefully this helps. Just to clarify, we need it today.");
        let a = analyze_content(&content, AnalysisMode::Deep);
        let b = analyze_content(&content, AnalysisMode::Deep);
        assert_eq!(a.strategic, b.strategic);
        assert_eq!(a.emotional, b.emotional);
        assert_eq!(a.relational, b.relational);
        assert_eq!(a.overall_risk, b.overall_risk);
        assert_eq!(a.sarcasm_score, b.sarcasm_score);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.recommendations, b.recommendations);
    }

    #[test]
    fn test_empty_text_still_has_confidence() {
        let result = analyze_content(&Content::new(""), AnalysisMode::Quick);
        assert!(result.confidence > 0.0);
        assert_eq!(result.tone(), Some("neutral"));
        assert_eq!(result.strategic["complexity"], Signal::label("low"));
    }

    #[test]
    fn test_multimodal_incongruent_visuals() {
        let content = Content::new("The deploy failed again, terrible problem 😊").with_image(
            ImageRef::new("https://cdn.example.com/party.png", "team party celebration", 800 * 600),
        );

        let textual_only = analyze_content(&content, AnalysisMode::Deep);
        let multimodal = analyze_content(&content, AnalysisMode::Multimodal);

        // textual 0, visual 40 -> 0.3 * 40
        assert_eq!(textual_only.sarcasm_score, 0);
        assert_eq!(multimodal.sarcasm_score, 12);
        let patterns = labels(&multimodal.emotional, "sarcasmPatterns");
        assert!(patterns.contains(&"incongruent_image".to_string()));
        assert!(patterns.contains(&"incongruent_emoji".to_string()));
    }

    #[test]
    fn test_icons_are_ignored() {
        let content = Content::new("Bad news, the build failed")
            .with_image(ImageRef::new("icon.png", "celebration", 16 * 16));
        let result = analyze_content(&content, AnalysisMode::Multimodal);
        assert_eq!(result.sarcasm_score, 0);
    }

    #[test]
    fn test_shouted_words() {
        assert_eq!(count_shouted_words("I'm SO HAPPY, OK? ASAP"), 2);
    }

    #[tokio::test]
    async fn test_backend_never_fails() {
        let backend = HeuristicBackend::new();
        let result = backend
            .analyze(&Content::new("hello"), AnalysisMode::Quick, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(backend.id(), BackendId::LocalHeuristic);
        assert_eq!(result.source, BackendId::LocalHeuristic);
    }
}
