//! `whereisit claim` - submit a recovery claim for an item

use anyhow::{Context, Result};
use chrono::NaiveDate;

use whereisit_core::domain::{ClaimDetails, ItemId};

use crate::app::App;
use crate::commands::user_facing;
use crate::output::{get_formatter, item_line, OutputFormat};

/// Arguments for the claim command
#[derive(Debug, clap::Args)]
pub struct ClaimCommand {
    /// Item id
    pub id: String,

    /// Where the item was found or lost
    #[arg(long)]
    pub location: String,

    /// When, as YYYY-MM-DD
    #[arg(long, value_parser = parse_claim_date)]
    pub date: NaiveDate,

    /// Anything that helps the poster recognise the claim
    #[arg(long)]
    pub notes: Option<String>,
}

impl ClaimCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let id = ItemId::new(self.id.as_str()).context("Invalid item id")?;

        let mut details = ClaimDetails::new(self.location.as_str(), self.date);
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            details = details.with_notes(notes);
        }

        let outcome = app
            .workflow
            .submit_recovery(&id, details)
            .await
            .map_err(user_facing)?;

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "record": outcome.record,
                "item": outcome.item,
            }));
            return Ok(());
        }

        fmt.success(&format!("Claim recorded for item {id}"));
        fmt.info(&format!("Recovery record: {}", outcome.record.id));
        match &outcome.item {
            Some(item) => fmt.info(&item_line(item, app.workflow.claim_eligibility(item))),
            None => fmt.warn("The item could not be reloaded; its listing may be out of date"),
        }
        Ok(())
    }
}

fn parse_claim_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD ({e})"))
}
