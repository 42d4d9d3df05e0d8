//! Quality analysis command.

use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;

use reqflow_core::orchestrator::Completion;
use reqflow_core::requirement::AnalysisSelection;

use super::records::parse_selection;
use super::{Session, SessionOptions, SessionSetup};
use crate::{output, progress};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Analyze only this requirement
    pub id: Option<String>,

    /// Which requirements to analyze when no id is given
    /// (all, analyzed, unanalyzed, modified)
    #[arg(short, long, default_value = "unanalyzed", value_parser = parse_selection)]
    pub filter: AnalysisSelection,

    /// Ollama model (overrides OLLAMA_GEN_MODEL)
    #[arg(short, long)]
    pub model: Option<String>,
}

pub async fn execute(args: AnalyzeArgs, options: &SessionOptions) -> Result<()> {
    let setup = SessionSetup {
        model: args.model,
        ..SessionSetup::default()
    };
    let session = Session::open(options, setup).await?;
    let mediator = &session.mediator;

    let result = match &args.id {
        Some(id) => {
            let (bar, sink) = progress::percent_bar(id);
            let outcome = mediator.analyze_one(id, Some(sink), &session.cancel).await;
            bar.finish_and_clear();

            match outcome {
                Ok(outcome) => match &outcome.completion {
                    Completion::Succeeded => {
                        output::print_requirement(&outcome.requirement);
                        Ok(())
                    }
                    Completion::Failed(reason) => Err(anyhow!("Analysis of {id} failed: {reason}")),
                    Completion::Cancelled => {
                        println!("{} Analysis cancelled", "!".yellow().bold());
                        Ok(())
                    }
                },
                Err(e) => Err(e.into()),
            }
        }
        None => {
            let (bar, sink) = progress::percent_bar("analyze");
            let summary = mediator
                .analyze_selection(args.filter, Some(sink), &session.cancel)
                .await;
            bar.finish_and_clear();

            summary.map(|s| output::print_batch_summary(&s)).map_err(Into::into)
        }
    };

    // Results committed before a failure or cancellation are still saved
    let saved = session.save_if_dirty().await;
    session.close().await;
    result.and(saved)
}
