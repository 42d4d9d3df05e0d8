//! Listing, showing and removing requirements.

use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;

use reqflow_core::requirement::AnalysisSelection;

use super::{Session, SessionOptions, SessionSetup};
use crate::output;

/// Parse an analysis selection for clap.
pub fn parse_selection(s: &str) -> Result<AnalysisSelection, String> {
    AnalysisSelection::from_str(s)
        .ok_or_else(|| format!("unknown selection '{s}' (all, analyzed, unanalyzed, modified)"))
}

#[derive(Args)]
pub struct ListArgs {
    /// Which requirements to list (all, analyzed, unanalyzed, modified)
    #[arg(short, long, default_value = "all", value_parser = parse_selection)]
    pub filter: AnalysisSelection,

    /// Keep document order instead of sorting by identifier
    #[arg(long)]
    pub document_order: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Requirement identifier (defaults to the current requirement)
    pub id: Option<String>,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Requirement identifier
    pub id: String,
}

pub async fn list(args: ListArgs, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options, SessionSetup::default()).await?;
    let mediator = &session.mediator;

    let records: Vec<_> = if args.document_order {
        mediator.requirements()
    } else {
        mediator.requirements_sorted()
    }
    .into_iter()
    .filter(|r| args.filter.matches(r))
    .collect();

    let current = mediator.current_requirement().map(|r| r.global_id);
    output::print_requirements_table(&records, current.as_deref());

    session.close().await;
    Ok(())
}

pub async fn show(args: ShowArgs, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options, SessionSetup::default()).await?;

    let requirement = match &args.id {
        Some(id) => session.mediator.requirement(id),
        None => session.mediator.current_requirement(),
    };
    let result = match requirement {
        Some(r) => {
            output::print_requirement(&r);
            Ok(())
        }
        None => Err(match args.id {
            Some(id) => anyhow!("Requirement not found: {id}"),
            None => anyhow!("No requirements in this workspace. Import a document first."),
        }),
    };

    session.close().await;
    result
}

pub async fn remove(args: RemoveArgs, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options, SessionSetup::default()).await?;

    let result = match session.mediator.remove_requirement(&args.id) {
        Ok(removed) => {
            println!(
                "{} Removed {} {} ({} left)",
                "✓".green().bold(),
                removed.global_id.cyan(),
                removed.name.dimmed(),
                session.mediator.total_requirements()
            );
            session.save_if_dirty().await
        }
        Err(e) => Err(e.into()),
    };

    session.close().await;
    result
}
