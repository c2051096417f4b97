//! JSON shape shared by the generative and remote backends.
//!
//! Backend output is loosely typed: dimension values may be strings, numbers,
//! booleans, lists or nested objects, and score keys come in camelCase or
//! snake_case. Everything is folded into the canonical [`AnalysisResult`].

use super::BackendError;
use chrono::Utc;
use serde_json::{Map, Value};
use undertone_common::{
    clamp_score, AnalysisResult, BackendId, Dimension, EscalationStatus, Signal,
    MAX_RECOMMENDATIONS,
};

pub(crate) const DIMENSIONS: [&str; 3] = ["strategic", "emotional", "relational"];

/// Confidence assumed when the backend reports none
const DEFAULT_CONFIDENCE: f64 = 0.7;
/// Floor keeping confidence strictly positive
const MIN_CONFIDENCE: f64 = 0.05;
const DEFAULT_RISK: f64 = 50.0;

/// Which dimension keys must be present for the output to be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Required {
    AnyDimension,
    AllDimensions,
}

fn signal_from_value(value: &Value) -> Signal {
    match value {
        Value::Bool(b) => Signal::Flag(*b),
        Value::Number(n) => Signal::Number(n.as_f64().unwrap_or_default()),
        Value::String(s) => Signal::Label(s.clone()),
        Value::Array(items) => Signal::List(
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        Value::Null => Signal::Label(String::new()),
        Value::Object(_) => Signal::Label(value.to_string()),
    }
}

fn dimension_from_map(map: &Map<String, Value>) -> Dimension {
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), signal_from_value(v)))
        .collect()
}

fn finite_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// First finite number under any of `keys`. "NaN" and "inf" count as absent.
fn number_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(finite_number)
}

/// Missing confidence takes the default; a present one must be a finite number
fn confidence_field(obj: &Map<String, Value>) -> Result<f64, BackendError> {
    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => DEFAULT_CONFIDENCE,
        Some(value) => finite_number(value).ok_or_else(|| {
            BackendError::invalid(format!("confidence is not a finite number: {}", value))
        })?,
    };
    let confidence = if confidence > 1.0 {
        confidence / 100.0
    } else {
        confidence
    };
    Ok(confidence.clamp(MIN_CONFIDENCE, 1.0))
}

/// Fold a backend JSON object into a result attributed to `source`
pub(crate) fn parse_result(
    value: &Value,
    source: BackendId,
    required: Required,
) -> Result<AnalysisResult, BackendError> {
    let obj = value
        .as_object()
        .ok_or_else(|| BackendError::invalid("response is not a JSON object"))?;

    let present: Vec<&str> = DIMENSIONS
        .iter()
        .copied()
        .filter(|k| obj.get(*k).map(Value::is_object).unwrap_or(false))
        .collect();

    match required {
        Required::AllDimensions if present.len() < DIMENSIONS.len() => {
            let missing: Vec<&str> = DIMENSIONS
                .iter()
                .copied()
                .filter(|k| !present.contains(k))
                .collect();
            return Err(BackendError::invalid(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }
        Required::AnyDimension if present.is_empty() => {
            return Err(BackendError::invalid("no analysis dimensions in response"));
        }
        _ => {}
    }

    let dimension = |key: &str| {
        obj.get(key)
            .and_then(Value::as_object)
            .map(dimension_from_map)
            .unwrap_or_default()
    };

    let confidence = confidence_field(obj)?;

    let mut recommendations: Vec<String> = obj
        .get("recommendations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Object(o) => o
                        .get("message")
                        .or_else(|| o.get("text"))
                        .and_then(Value::as_str)
                        .map(|s| s.trim().to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    recommendations.truncate(MAX_RECOMMENDATIONS);

    Ok(AnalysisResult {
        strategic: dimension("strategic"),
        emotional: dimension("emotional"),
        relational: dimension("relational"),
        overall_risk: clamp_score(
            number_field(obj, &["overallRisk", "overall_risk", "risk"]).unwrap_or(DEFAULT_RISK),
        ),
        sarcasm_score: clamp_score(
            number_field(obj, &["sarcasmScore", "sarcasm_score", "sarcasm"]).unwrap_or(0.0),
        ),
        confidence,
        source,
        recommendations,
        timestamp: Utc::now(),
        escalation: EscalationStatus::NotNeeded,
    })
}

/// Slice from the first `{` to the last `}`; models like to wrap JSON in prose
pub(crate) fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
