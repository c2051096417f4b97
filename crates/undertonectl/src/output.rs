//! Terminal output, ASCII only.

use owo_colors::OwoColorize;
use undertone_common::{AnalysisResult, BackendId, Dimension, EscalationStatus, Signal};
use undertone_core::explain::ElementKind;
use undertone_core::history::HistoryEntry;
use undertone_core::{AnalysisReport, Capabilities, Explanation, PerformanceReport, Verdict};

const KEY_WIDTH: usize = 20;
const SEPARATOR: &str = "----------------------------------------";

fn print_kv(key: &str, value: &str) {
    println!("  {:width$} {}", key, value, width = KEY_WIDTH);
}

fn risk_label(risk: u8) -> String {
    let text = format!("{}/100", risk);
    if risk > 70 {
        text.bright_red().to_string()
    } else if risk >= 30 {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

fn confidence_label(confidence: f64) -> String {
    let text = format!("{:.2}", confidence);
    if confidence >= 0.7 {
        text.bright_green().to_string()
    } else if confidence >= 0.5 {
        text.yellow().to_string()
    } else {
        text.bright_red().to_string()
    }
}

fn source_label(source: BackendId) -> String {
    match source {
        BackendId::UltimateFallback => format!("{} (degraded)", source).bright_red().to_string(),
        BackendId::Hybrid => source.as_str().cyan().to_string(),
        _ => source.as_str().to_string(),
    }
}

/// One-line rendering of an escalation marker
pub fn escalation_label(status: &EscalationStatus) -> String {
    match status {
        EscalationStatus::NotNeeded => "not needed".to_string(),
        EscalationStatus::Direct => "remote answered directly".to_string(),
        EscalationStatus::Merged => "merged with remote".to_string(),
        EscalationStatus::Unattempted { reason } => format!("not attempted ({})", reason),
        EscalationStatus::Failed { kind } => format!("failed ({})", kind),
    }
}

fn signal_text(signal: &Signal) -> String {
    match signal {
        Signal::Flag(b) => b.to_string(),
        Signal::Number(n) if n.fract() == 0.0 => format!("{:.0}", n),
        Signal::Number(n) => format!("{:.2}", n),
        Signal::Label(s) => s.clone(),
        Signal::List(items) if items.is_empty() => "-".to_string(),
        Signal::List(items) => items.join(", "),
    }
}

fn print_dimension(name: &str, dimension: &Dimension) {
    if dimension.is_empty() {
        return;
    }
    println!("[{}]", name.to_uppercase());
    for (key, signal) in dimension {
        print_kv(key, &signal_text(signal));
    }
}

pub fn print_result(result: &AnalysisResult) {
    println!();
    print_kv("source", &source_label(result.source));
    if let Some(tone) = result.tone() {
        print_kv("tone", tone);
    }
    print_kv("risk", &risk_label(result.overall_risk));
    print_kv("sarcasm", &format!("{}/100", result.sarcasm_score));
    print_kv("confidence", &confidence_label(result.confidence));
    print_kv("escalation", &escalation_label(&result.escalation));
    println!();

    print_dimension("strategic", &result.strategic);
    print_dimension("emotional", &result.emotional);
    print_dimension("relational", &result.relational);

    if !result.recommendations.is_empty() {
        println!("[RECOMMENDATIONS]");
        for rec in &result.recommendations {
            println!("  * {}", rec);
        }
    }
}

pub fn print_report(report: &AnalysisReport) {
    print_result(&report.result);
    println!();
    println!("{}", SEPARATOR.dimmed());
    for attempt in &report.attempts {
        let outcome = match attempt.error_kind {
            None => "ok".green().to_string(),
            Some(kind) => kind.as_str().red().to_string(),
        };
        println!(
            "  {:22} {:>6}ms  {}",
            attempt.backend_id.as_str(),
            attempt.duration_ms,
            outcome
        );
    }
    let origin = if report.cached { " (cached)" } else { "" };
    println!(
        "{}",
        format!("request {} in {}ms{}", report.request_id, report.duration_ms, origin).dimmed()
    );
    println!();
}

fn verdict_label(verdict: Verdict) -> String {
    let text = verdict.as_str().to_uppercase().replace('_', " ");
    match verdict {
        Verdict::Effective => text.bright_green().to_string(),
        Verdict::NeedsReview => text.yellow().to_string(),
        Verdict::HighRisk => text.bright_red().to_string(),
    }
}

pub fn print_explanation(explanation: &Explanation) {
    println!("[SUMMARY]");
    print_kv("verdict", &verdict_label(explanation.verdict));
    print_kv("score", &format!("{}/100", explanation.overall_score));
    println!("  {}", explanation.summary);

    for (dimension, readings) in &explanation.dimensions {
        if readings.is_empty() {
            continue;
        }
        println!("  {}:", dimension);
        for reading in readings {
            println!("    - {}", reading);
        }
    }

    if !explanation.key_elements.is_empty() {
        println!("[KEY ELEMENTS]");
        for element in &explanation.key_elements {
            let mark = match element.kind {
                ElementKind::Risk => "[!]".bright_red().to_string(),
                ElementKind::Positive => "[+]".green().to_string(),
            };
            println!("  {} \"{}\" {}", mark, element.term, element.impact);
            println!("      {}", element.suggestion.dimmed());
        }
    }

    if !explanation.actions.is_empty() {
        println!("[ACTIONS]");
        for action in &explanation.actions {
            println!("  > {}", action);
        }
    }
    println!();
}

pub fn print_capabilities(caps: &Capabilities) {
    println!();
    for (name, available) in caps.flags() {
        let mark = if available {
            "[OK]".green().to_string()
        } else {
            "[--]".dimmed().to_string()
        };
        println!("  {} {}", mark, name);
    }
    println!(
        "{}",
        format!("probed {}", caps.refreshed_at.format("%Y-%m-%d %H:%M:%S UTC")).dimmed()
    );
    println!();
}

pub fn print_metrics(report: &PerformanceReport) {
    println!("[METRICS]");
    print_kv("requests", &report.total_requests.to_string());
    print_kv("success_rate", &format!("{:.1}%", report.success_rate));
    print_kv("fallback_usage", &report.fallback_usage_count.to_string());
    print_kv("ultimate_fallback", &report.ultimate_fallback_count.to_string());
    print_kv("merged", &report.merged_count.to_string());
    print_kv("cache_hits", &report.cache_hits.to_string());
    print_kv("avg_latency", &format!("{:.1}ms", report.avg_latency_ms));
    for (backend, stats) in &report.backends {
        print_kv(
            backend.as_str(),
            &format!(
                "{} attempts, {} ok, {} failed",
                stats.attempts,
                stats.successes,
                stats.failure_count()
            ),
        );
    }
    println!();
}

pub fn print_history(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("[INFO] No history yet");
        return;
    }
    println!();
    for entry in entries {
        let result = &entry.result;
        println!(
            "  {}  {:10} {:20} risk {:>3}  sarcasm {:>3}  {}",
            entry.recorded_at.format("%Y-%m-%d %H:%M"),
            entry.mode.as_str(),
            result.source.as_str(),
            result.overall_risk,
            result.sarcasm_score,
            result.tone().unwrap_or("-")
        );
    }
    println!();
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {}", message.red());
}

#[cfg(test)]
mod tests {
    use super::*;
    use undertone_common::ErrorKind;

    #[test]
    fn test_escalation_labels() {
        assert_eq!(escalation_label(&EscalationStatus::Merged), "merged with remote");
        assert_eq!(
            escalation_label(&EscalationStatus::Failed { kind: ErrorKind::Timeout }),
            "failed (timeout)"
        );
        assert_eq!(
            escalation_label(&EscalationStatus::Unattempted {
                reason: "offline".into()
            }),
            "not attempted (offline)"
        );
    }

    #[test]
    fn test_verdict_label_is_readable() {
        assert!(verdict_label(Verdict::NeedsReview).contains("NEEDS REVIEW"));
        assert!(verdict_label(Verdict::HighRisk).contains("HIGH RISK"));
        assert!(verdict_label(Verdict::Effective).contains("EFFECTIVE"));
    }

    #[test]
    fn test_signal_text() {
        assert_eq!(signal_text(&Signal::Number(72.0)), "72");
        assert_eq!(signal_text(&Signal::Number(0.25)), "0.25");
        assert_eq!(signal_text(&Signal::List(vec![])), "-");
        assert_eq!(
            signal_text(&Signal::List(vec!["a".into(), "b".into()])),
            "a, b"
        );
    }
}
