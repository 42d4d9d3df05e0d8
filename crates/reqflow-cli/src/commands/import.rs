//! Document import command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::{absolute, Session, SessionOptions, SessionSetup};
use crate::{output, progress};

#[derive(Args)]
pub struct ImportArgs {
    /// Document to import (.json, .md, .txt)
    pub source: PathBuf,

    /// Merge into the existing requirements instead of replacing them
    #[arg(short, long)]
    pub append: bool,
}

pub async fn execute(args: ImportArgs, options: &SessionOptions) -> Result<()> {
    let session = Session::open(options, SessionSetup::default()).await?;
    let source = absolute(&args.source);

    let (bar, sink) = progress::percent_bar("import");
    let outcome = if args.append {
        session
            .mediator
            .import_additional(&source, Some(sink), &session.cancel)
            .await
    } else {
        session.mediator.import(&source, Some(sink), &session.cancel).await
    };
    bar.finish_and_clear();

    let result = match outcome {
        Ok(outcome) => {
            output::print_import_outcome(&outcome, args.append);
            if outcome.completion.is_success() {
                session.save_if_dirty().await
            } else {
                Err(anyhow::anyhow!("import did not complete"))
            }
        }
        Err(e) => Err(e.into()),
    };

    session.close().await;
    result
}
