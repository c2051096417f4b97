//! Explanations
//!
//! Turns a finished result into sentences a writer can act on: a one-line
//! verdict, per-dimension readings, the phrases in the message that drove
//! them, and concrete rewrites. Pure, and safe on degraded results.
//!
//! Dimension signals arrive either as labels (`"high"`, `"weak"`) or as
//! 0-100 numbers, depending on the backend; both are folded into three
//! levels before anything is said about them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use undertone_common::lexicon::{NormalizedText, KEY_POSITIVE_TERMS, KEY_RISK_TERMS};
use undertone_common::{clamp_score, AnalysisResult, Dimension, Signal};

/// Score at or above which a message reads as effective
pub const EFFECTIVE_SCORE: u8 = 80;
/// Score at or above which a message is acceptable with some review
pub const REVIEW_SCORE: u8 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Effective,
    NeedsReview,
    HighRisk,
}

impl Verdict {
    pub fn from_score(score: u8) -> Self {
        if score >= EFFECTIVE_SCORE {
            Verdict::Effective
        } else if score >= REVIEW_SCORE {
            Verdict::NeedsReview
        } else {
            Verdict::HighRisk
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Effective => "effective",
            Verdict::NeedsReview => "needs_review",
            Verdict::HighRisk => "high_risk",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            Verdict::Effective => {
                "Effective and professional communication. Good balance across all dimensions."
            }
            Verdict::NeedsReview => {
                "Acceptable communication with areas to improve. Review the suggestions below."
            }
            Verdict::HighRisk => "High-risk communication. Review it fully before sending.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Risk,
    Positive,
}

/// A phrase in the message that shaped the reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyElement {
    pub kind: ElementKind,
    pub term: String,
    pub impact: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub verdict: Verdict,
    pub summary: String,
    /// 0-100, higher is better
    pub overall_score: u8,
    /// Dimension name to its readings; dimensions with nothing to say are left out
    pub dimensions: BTreeMap<String, Vec<String>>,
    pub key_elements: Vec<KeyElement>,
    pub actions: Vec<String>,
}

// ============================================================================
// Signal levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Low,
    Medium,
    High,
}

fn level(signal: &Signal) -> Option<Level> {
    match signal {
        Signal::Number(n) if *n >= 70.0 => Some(Level::High),
        Signal::Number(n) if *n < 40.0 => Some(Level::Low),
        Signal::Number(_) => Some(Level::Medium),
        Signal::Label(label) => match label.trim().to_lowercase().as_str() {
            "high" | "strong" => Some(Level::High),
            "medium" | "moderate" | "balanced" => Some(Level::Medium),
            "low" | "weak" => Some(Level::Low),
            _ => None,
        },
        _ => None,
    }
}

fn level_of(dimension: &Dimension, key: &str) -> Option<Level> {
    dimension.get(key).and_then(level)
}

fn label_of<'a>(dimension: &'a Dimension, key: &str) -> Option<&'a str> {
    dimension.get(key).and_then(Signal::as_label)
}

/// Reading for a levelled signal, or "`name`: value" for anything unrecognized
fn describe(
    dimension: &Dimension,
    key: &str,
    name: &str,
    readings: [&str; 3],
) -> Option<String> {
    let signal = dimension.get(key)?;
    let [low, medium, high] = readings;
    Some(match level(signal) {
        Some(Level::Low) => low.to_string(),
        Some(Level::Medium) => medium.to_string(),
        Some(Level::High) => high.to_string(),
        None => match signal {
            Signal::Label(label) if !label.is_empty() => format!("{}: {}", name, label),
            _ => return None,
        },
    })
}

// ============================================================================
// Dimensions
// ============================================================================

fn explain_strategic(strategic: &Dimension) -> Vec<String> {
    [
        describe(
            strategic,
            "powerDynamics",
            "Power dynamics",
            [
                "Collaborative, non-hierarchical language",
                "Balanced mix of directive and collaborative language",
                "Directive and hierarchical language detected",
            ],
        ),
        describe(
            strategic,
            "hiddenAgendas",
            "Agendas",
            [
                "Transparent about intentions",
                "Possible omission of important context",
                "Signals of undeclared agendas present",
            ],
        ),
        describe(
            strategic,
            "urgency",
            "Urgency",
            [
                "No time pressure",
                "Some expectation of a prompt reply",
                "Strong time pressure on the reader",
            ],
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn explain_emotional(emotional: &Dimension) -> Vec<String> {
    let mut readings = Vec::new();

    if let Some(tone) = label_of(emotional, "tone") {
        readings.push(match tone {
            "positive" => "Constructive and encouraging language".to_string(),
            "neutral" => "Standard professional communication".to_string(),
            "negative" => "Tone that may generate resistance".to_string(),
            "sarcastic" => "Possible sarcasm or irony detected".to_string(),
            other => format!("Tone: {}", other),
        });
    }

    if let Some(subtext) = label_of(emotional, "subtext") {
        readings.push(match subtext {
            "clear" => "Message aligned with its explicit content".to_string(),
            "ambiguous" => "Open to alternative interpretations".to_string(),
            "contradictory" => "Contradictory emotional signals".to_string(),
            other => format!("Subtext: {}", other),
        });
    }

    match emotional.get("score").and_then(Signal::as_number) {
        Some(score) if score < 30.0 => readings.push("Predominantly negative tone".to_string()),
        Some(score) if score > 70.0 => readings.push("Predominantly positive tone".to_string()),
        _ => {}
    }

    readings
}

fn explain_relational(relational: &Dimension) -> Vec<String> {
    let connection_key = if relational.contains_key("connection") {
        "connection"
    } else {
        "collaboration"
    };
    [
        describe(
            relational,
            "trust",
            "Trust",
            [
                "Elements that may erode trust",
                "Standard professional communication",
                "Language that builds trust",
            ],
        ),
        describe(
            relational,
            connection_key,
            "Connection",
            [
                "May create relational distance",
                "Maintains professional relationships",
                "Encourages collaboration and connection",
            ],
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

// ============================================================================
// Score, elements, actions
// ============================================================================

/// 0-100, higher is better. Starts from the inverse of the overall risk and
/// moves with the emotional score, power, agendas and trust.
pub fn overall_score(result: &AnalysisResult) -> u8 {
    let mut score = 100.0 - f64::from(result.overall_risk);

    if let Some(emotional) = result.emotional.get("score").and_then(Signal::as_number) {
        if emotional.is_finite() {
            score += (emotional - 50.0) * 0.3;
        }
    }
    if level_of(&result.strategic, "powerDynamics") == Some(Level::High) {
        score -= 15.0;
    }
    if level_of(&result.strategic, "hiddenAgendas") == Some(Level::High) {
        score -= 20.0;
    }
    match level_of(&result.relational, "trust") {
        Some(Level::High) => score += 10.0,
        Some(Level::Low) => score -= 15.0,
        _ => {}
    }

    clamp_score(score)
}

fn key_elements(text: &str) -> Vec<KeyElement> {
    let norm = NormalizedText::new(text);
    let risk = norm
        .matching_terms(KEY_RISK_TERMS)
        .into_iter()
        .map(|term| KeyElement {
            kind: ElementKind::Risk,
            term: term.to_string(),
            impact: "May be perceived as authoritarian or critical".to_string(),
            suggestion: "Consider more collaborative language".to_string(),
        });
    let positive = norm
        .matching_terms(KEY_POSITIVE_TERMS)
        .into_iter()
        .map(|term| KeyElement {
            kind: ElementKind::Positive,
            term: term.to_string(),
            impact: "Contributes to a constructive tone".to_string(),
            suggestion: "Keep this kind of language".to_string(),
        });
    risk.chain(positive).collect()
}

fn actions(result: &AnalysisResult) -> Vec<String> {
    let strategic = &result.strategic;
    let emotional = &result.emotional;
    let relational = &result.relational;

    let checks = [
        (
            level_of(strategic, "powerDynamics") == Some(Level::High),
            "Consider more collaborative and less directive language",
        ),
        (
            level_of(strategic, "hiddenAgendas") == Some(Level::High),
            "Be more explicit about intentions and expectations",
        ),
        (
            label_of(emotional, "tone") == Some("negative"),
            "Rephrase to use more constructive language",
        ),
        (
            label_of(emotional, "subtext") == Some("contradictory"),
            "Align the explicit message with its emotional signals",
        ),
        (
            level_of(relational, "trust") == Some(Level::Low),
            "Include elements that build trust and transparency",
        ),
        (
            level_of(relational, "connection").or_else(|| level_of(relational, "collaboration"))
                == Some(Level::Low),
            "Encourage connection and collaboration",
        ),
    ];

    checks
        .into_iter()
        .filter(|(applies, _)| *applies)
        .map(|(_, action)| action.to_string())
        .collect()
}

/// Explain `result` for the writer of `text`
pub fn explain(result: &AnalysisResult, text: &str) -> Explanation {
    let mut dimensions = BTreeMap::new();
    for (name, readings) in [
        ("strategic", explain_strategic(&result.strategic)),
        ("emotional", explain_emotional(&result.emotional)),
        ("relational", explain_relational(&result.relational)),
    ] {
        if !readings.is_empty() {
            dimensions.insert(name.to_string(), readings);
        }
    }

    let overall_score = overall_score(result);
    let verdict = Verdict::from_score(overall_score);
    let summary = if result.is_degraded() {
        "Only a minimal analysis was possible. Treat this reading as provisional.".to_string()
    } else {
        verdict.summary().to_string()
    };

    Explanation {
        verdict,
        summary,
        overall_score,
        dimensions,
        key_elements: key_elements(text),
        actions: actions(result),
    }
}
