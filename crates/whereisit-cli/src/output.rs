//! Output formatting for the CLI
//!
//! Every command writes through an [`OutputFormatter`] so `--json` switches
//! the whole program between human-readable lines and machine-readable
//! documents. Item and record renderers live here as well so commands share
//! one layout.

use whereisit_core::domain::{ClaimEligibility, Item, RecoveryRecord, UserProfile};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
}

pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonFormatter)
    } else {
        Box::new(HumanFormatter)
    }
}

/// One-line summary of an item, as shown in lists
pub fn item_line(item: &Item, eligibility: ClaimEligibility) -> String {
    let date = item
        .date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string());
    format!(
        "[{}] {} {:<5} {:<9} {} @ {} ({})",
        item.id,
        date,
        item.post_type.to_string(),
        item.status.to_string(),
        item.title,
        item.location,
        eligibility.label()
    )
}

/// Item document with its claim eligibility attached
pub fn item_json(item: &Item, eligibility: ClaimEligibility) -> serde_json::Value {
    let mut value = serde_json::to_value(item).unwrap_or_default();
    if let Some(map) = value.as_object_mut() {
        map.insert("claimable".into(), eligibility.is_claimable().into());
        map.insert("claimLabel".into(), eligibility.label().into());
    }
    value
}

/// Detailed, multi-line description of an item
pub fn item_details(item: &Item, eligibility: ClaimEligibility) -> Vec<String> {
    let mut lines = vec![
        format!("Type:        {}", item.post_type),
        format!("Status:      {}", item.status),
        format!("Location:    {}", item.location),
    ];
    if let Some(date) = item.date {
        lines.push(format!("Date:        {}", date.format("%Y-%m-%d")));
    }
    if !item.category.is_empty() {
        lines.push(format!("Category:    {}", item.category));
    }
    if !item.description.is_empty() {
        lines.push(format!("Description: {}", item.description));
    }
    let contact = if item.contact_name.is_empty() {
        item.owner_email.to_string()
    } else {
        format!("{} <{}>", item.contact_name, item.owner_email)
    };
    lines.push(format!("Posted by:   {contact}"));
    lines.push(format!("Claim:       {}", eligibility.label()));
    lines
}

/// One-line summary of a recovery record
pub fn record_line(record: &RecoveryRecord) -> String {
    let date = record
        .recovered_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string());
    let by = record
        .recovered_by
        .as_ref()
        .map(|party| party.email.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "[{}] {} item {} \"{}\" at {} by {}",
        record.id,
        date,
        record.item_id,
        record.item_title().unwrap_or("untitled"),
        record.recovered_location,
        by
    )
}

/// Header line for a signed-in user
pub fn user_line(user: &UserProfile) -> String {
    if user.display_name.is_empty() {
        format!("{} ({})", user.email, user.role)
    } else {
        format!("{} <{}> ({})", user.display_name, user.email, user.role)
    }
}
