//! Profile and recovery record commands

use anyhow::Result;

use crate::app::App;
use crate::commands::user_facing;
use crate::output::{get_formatter, record_line, user_line, OutputFormat};

/// Arguments for the profile command
#[derive(Debug, clap::Args)]
pub struct ProfileCommand {}

impl ProfileCommand {
    /// Shows the session user with posted, recovered and found counters
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let stats = app.workflow.profile_stats().await.map_err(user_facing)?;
        let session = app.session();
        let Some(user) = session.user() else {
            anyhow::bail!("Session ended while loading the profile");
        };

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({"user": user, "stats": stats}));
            return Ok(());
        }

        fmt.success(&user_line(user));
        if let Some(photo) = &user.photo_url {
            fmt.info(&format!("Photo:           {photo}"));
        }
        fmt.info(&format!("Items posted:    {}", stats.items_posted));
        fmt.info(&format!("Items recovered: {}", stats.items_recovered));
        fmt.info(&format!("Items found:     {}", stats.items_found));
        Ok(())
    }
}

/// Arguments for the recoveries command
#[derive(Debug, clap::Args)]
pub struct RecoveriesCommand {}

impl RecoveriesCommand {
    /// Lists the recovery records the backend shows to the session user
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let records = app.workflow.recoveries().await.map_err(user_facing)?;

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({"recoveries": records}));
            return Ok(());
        }

        if records.is_empty() {
            fmt.info("No recoveries yet");
            return Ok(());
        }
        fmt.success(&format!("{} recovery record(s)", records.len()));
        for record in &records {
            fmt.info(&record_line(record));
        }
        Ok(())
    }
}
