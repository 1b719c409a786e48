//! `whereisit completions <shell>`
//!
//! Usage: `whereisit completions bash > ~/.local/share/bash-completion/completions/whereisit`

use std::io::Write;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::Shell;

use crate::output::OutputFormat;

const BIN_NAME: &str = "whereisit";

/// Arguments for the completions subcommand
#[derive(Debug, clap::Args)]
pub struct CompletionsCommand {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsCommand {
    /// Prints the completion script to stdout; `--json` has no effect
    pub async fn execute(&self, _format: OutputFormat) -> Result<()> {
        self.write_to(&mut std::io::stdout().lock());
        Ok(())
    }

    fn write_to(&self, out: &mut dyn Write) {
        let mut cmd = crate::Cli::command();
        clap_complete::generate(self.shell, &mut cmd, BIN_NAME, out);
    }
}
