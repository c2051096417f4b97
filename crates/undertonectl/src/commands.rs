//! Subcommand implementations.

use crate::cli::AnalyzeArgs;
use crate::output;
use anyhow::{bail, Context, Result};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use undertone_common::config::UndertoneConfig;
use undertone_common::{AnalysisRequest, Content};
use undertone_core::{HistoryStore, Orchestrator};

/// Request from parsed arguments and the message text
pub fn build_request(args: &AnalyzeArgs, text: String) -> AnalysisRequest {
    let mut content = Content::new(text);
    for image in args.image_refs() {
        content = content.with_image(image);
    }
    for (key, value) in &args.metadata {
        content = content.with_metadata(key.clone(), value.clone());
    }

    let mut request = AnalysisRequest::new(content, args.mode);
    request.options.allow_remote = args.remote_override();
    request.options.timeout_ms = args.timeout_ms;
    request
}

async fn read_stdin() -> Result<String> {
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("Failed to read message from stdin")?;
    Ok(text)
}

pub async fn analyze(orchestrator: &Orchestrator, args: AnalyzeArgs) -> Result<()> {
    let text = match &args.text {
        Some(text) => text.clone(),
        None => read_stdin().await?,
    };
    if text.trim().is_empty() && args.images.is_empty() {
        bail!("Nothing to analyze: pass a message or pipe one on stdin");
    }

    let request = build_request(&args, text.clone());
    debug!(mode = %request.mode, "Built request");

    // Ctrl-C abandons the request
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let outcome = orchestrator.analyze_with_cancel(request, &cancel).await;
    watcher.abort();
    let report = outcome.context("Analysis failed")?;
    let explanation = undertone_core::explain(&report.result, &text);

    if args.json {
        let mut value = serde_json::to_value(&report)?;
        value["explanation"] = serde_json::to_value(&explanation)?;
        if args.metrics {
            value["metrics"] = serde_json::to_value(orchestrator.performance_report())?;
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        output::print_report(&report);
        output::print_explanation(&explanation);
        if args.metrics {
            output::print_metrics(&orchestrator.performance_report());
        }
    }
    Ok(())
}

pub fn capabilities(orchestrator: &Orchestrator, json: bool) -> Result<()> {
    let caps = orchestrator.refresh_capabilities();
    if json {
        println!("{}", serde_json::to_string_pretty(caps.as_ref())?);
    } else {
        output::print_capabilities(&caps);
    }
    Ok(())
}

pub async fn history(orchestrator: &Orchestrator, limit: usize, json: bool) -> Result<()> {
    let Some(store) = orchestrator.history() else {
        bail!("History is disabled in the configuration");
    };
    let entries = store
        .recent(limit)
        .await
        .context("Failed to read history")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        output::print_history(&entries);
    }
    Ok(())
}

pub fn config(config: &UndertoneConfig, source: Option<&Path>) -> Result<()> {
    match source {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# built-in defaults"),
    }
    print!("{}", config.to_toml_string().context("Failed to render configuration")?);
    Ok(())
}
