//! Command-line definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use undertone_common::{AnalysisMode, ImageRef};

#[derive(Debug, Parser)]
#[command(name = "undertonectl")]
#[command(about = "Undertone - tone, risk and sarcasm analysis for written messages", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to $UNDERTONE_CONFIG, then the XDG config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze a message (reads stdin when no text is given)
    Analyze(AnalyzeArgs),

    /// Show which analysis backends are usable right now
    Capabilities {
        #[arg(long)]
        json: bool,
    },

    /// Show recent analysis results
    History {
        /// Number of entries to show
        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Message text
    pub text: Option<String>,

    /// quick, deep, multimodal, local-only or cloud-only
    #[arg(long, default_value = "quick")]
    pub mode: AnalysisMode,

    /// Permit remote enhancement for this request (settings must allow it too)
    #[arg(long, conflicts_with = "no_remote")]
    pub allow_remote: bool,

    /// Forbid remote enhancement for this request
    #[arg(long)]
    pub no_remote: bool,

    /// Bound for remote calls in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Attached image as ALT[:PIXEL_AREA]; repeatable
    #[arg(long = "image", value_name = "ALT[:AREA]")]
    pub images: Vec<String>,

    /// Metadata as KEY=VALUE; repeatable
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
    pub metadata: Vec<(String, String)>,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,

    /// Print performance metrics after the result
    #[arg(long)]
    pub metrics: bool,
}

impl AnalyzeArgs {
    /// Per-request remote override: `None` defers to settings
    pub fn remote_override(&self) -> Option<bool> {
        if self.no_remote {
            Some(false)
        } else if self.allow_remote {
            Some(true)
        } else {
            None
        }
    }

    pub fn image_refs(&self) -> Vec<ImageRef> {
        self.images
            .iter()
            .enumerate()
            .map(|(i, raw)| parse_image(i, raw))
            .collect()
    }
}

/// `KEY=VALUE`, key must be non-empty
pub fn parse_meta(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

/// `ALT[:AREA]`. A suffix that is not a number stays part of the alt text.
pub fn parse_image(index: usize, raw: &str) -> ImageRef {
    let (alt, area) = match raw.rsplit_once(':') {
        Some((alt, area)) => match area.trim().parse::<u64>() {
            Ok(area) => (alt, area),
            Err(_) => (raw, 0),
        },
        None => (raw, 0),
    };
    ImageRef::new(format!("cli://image/{}", index), alt.trim(), area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze_flags() {
        let cli = Cli::parse_from([
            "undertonectl",
            "analyze",
            "hello there",
            "--mode",
            "cloud-only",
            "--no-remote",
            "--image",
            "smiling team:250000",
            "--meta",
            "channel=email",
        ]);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(args.text.as_deref(), Some("hello there"));
        assert_eq!(args.mode, AnalysisMode::CloudOnly);
        assert_eq!(args.remote_override(), Some(false));
        assert_eq!(args.image_refs()[0].pixel_area, 250_000);
        assert_eq!(args.metadata, vec![("channel".to_string(), "email".to_string())]);
    }

    #[test]
    fn test_remote_flags_conflict() {
        let parsed = Cli::try_parse_from(["undertonectl", "analyze", "x", "--allow-remote", "--no-remote"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_image() {
        let image = parse_image(0, "party hats:4096");
        assert_eq!(image.alt_text, "party hats");
        assert_eq!(image.pixel_area, 4096);

        let image = parse_image(1, "time: 9am");
        assert_eq!(image.alt_text, "time: 9am");
        assert_eq!(image.pixel_area, 0);
        assert_eq!(image.source_uri, "cli://image/1");
    }

    #[test]
    fn test_parse_meta() {
        assert_eq!(parse_meta("k=v=w").unwrap(), ("k".to_string(), "v=w".to_string()));
        assert!(parse_meta("novalue").is_err());
        assert!(parse_meta("=v").is_err());
    }
}
