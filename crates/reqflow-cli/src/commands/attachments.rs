//! Attachment discovery command.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use reqflow_core::orchestrator::Completion;

use super::{Session, SessionOptions, SessionSetup};
use crate::{output, progress};

#[derive(Args)]
pub struct AttachmentArgs {
    /// Project identifier
    pub project: String,

    /// Directory containing one sub-directory per project
    /// (defaults to <workspace>/attachments)
    #[arg(long)]
    pub root: Option<PathBuf>,
}

pub async fn execute(args: AttachmentArgs, options: &SessionOptions) -> Result<()> {
    let setup = SessionSetup {
        attachments_root: args.root,
        ..SessionSetup::default()
    };
    let session = Session::open(options, setup).await?;

    let (bar, sink) = progress::percent_bar("scan");
    let outcome = session
        .mediator
        .scan_attachments(&args.project, Some(sink), &session.cancel)
        .await;
    bar.finish_and_clear();
    session.close().await;

    let outcome = outcome?;
    match outcome.completion {
        Completion::Succeeded => {
            output::print_attachments(&args.project, &outcome.attachments);
            Ok(())
        }
        Completion::Cancelled => {
            println!("{} Scan cancelled", "!".yellow().bold());
            Ok(())
        }
        Completion::Failed(reason) => bail!("Attachment scan failed: {reason}"),
    }
}
