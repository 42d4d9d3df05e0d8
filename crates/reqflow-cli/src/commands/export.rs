//! Export command.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use clap::Args;
use colored::Colorize;

use reqflow_core::capability::ExportFormat;
use reqflow_core::orchestrator::Completion;
use reqflow_core::requirement::AnalysisSelection;

use super::records::parse_selection;
use super::{absolute, Session, SessionOptions, SessionSetup};
use crate::progress;

fn parse_format(s: &str) -> Result<ExportFormat, String> {
    ExportFormat::from_str(s).ok_or_else(|| format!("unknown format '{s}' (json, markdown, text)"))
}

#[derive(Args)]
pub struct ExportArgs {
    /// Output file
    pub destination: PathBuf,

    /// Output format; inferred from the file extension when omitted
    #[arg(long, value_parser = parse_format)]
    pub format: Option<ExportFormat>,

    /// Which requirements to export (all, analyzed, unanalyzed, modified)
    #[arg(short, long, default_value = "all", value_parser = parse_selection)]
    pub filter: AnalysisSelection,
}

/// Pick the export format from the flag or the destination's extension.
fn resolve_format(explicit: Option<ExportFormat>, destination: &Path) -> Result<ExportFormat> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    destination
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ExportFormat::from_str)
        .ok_or_else(|| anyhow!("Cannot infer the export format of {}; pass --format", destination.display()))
}

pub async fn execute(args: ExportArgs, options: &SessionOptions) -> Result<()> {
    let format = resolve_format(args.format, &args.destination)?;
    let session = Session::open(options, SessionSetup::default()).await?;

    let records: Vec<_> = session
        .mediator
        .requirements_sorted()
        .into_iter()
        .filter(|r| args.filter.matches(r))
        .collect();
    if records.is_empty() {
        println!("{}", "Nothing to export.".dimmed());
        session.close().await;
        return Ok(());
    }

    let destination = absolute(&args.destination);
    let (bar, sink) = progress::percent_bar("export");
    let outcome = session
        .mediator
        .export(&records, format, &destination, Some(sink), &session.cancel)
        .await;
    bar.finish_and_clear();
    session.close().await;

    let outcome = outcome?;
    match outcome.completion {
        Completion::Succeeded => {}
        Completion::Cancelled => {
            println!("{} Export cancelled", "!".yellow().bold());
            return Ok(());
        }
        Completion::Failed(reason) => bail!(reason),
    }
    println!(
        "{} Exported {} requirement(s) as {} to {}",
        "✓".green().bold(),
        outcome.count.to_string().cyan(),
        format,
        destination.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_format() {
        assert_eq!(resolve_format(None, Path::new("out.md")).unwrap(), ExportFormat::Markdown);
        assert_eq!(
            resolve_format(Some(ExportFormat::Text), Path::new("out.md")).unwrap(),
            ExportFormat::Text
        );
        assert!(resolve_format(None, Path::new("out")).is_err());
        assert!(parse_format("yaml").is_err());
    }
}
