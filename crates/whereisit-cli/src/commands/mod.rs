//! CLI subcommands

pub mod auth;
pub mod claim;
pub mod completions;
pub mod config;
pub mod items;
pub mod profile;

use whereisit_core::ClientError;

/// Turns a use-case failure into the message shown to the user, keeping the
/// typed error as the source
pub(crate) fn user_facing(err: ClientError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}
