//! Items commands - browse lost and found posts through the item cache,
//! and post, edit or delete your own

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Args, Subcommand};

use whereisit_core::domain::{ItemDraft, ItemId, PostType};
use whereisit_core::ports::{GatewayError, IItemCache, ListQuery};
use whereisit_core::usecases::recover_item::classify_read_error;
use whereisit_core::usecases::ItemChange;
use whereisit_core::{ClientError, ValidationRule};

use crate::app::App;
use crate::commands::user_facing;
use crate::output::{get_formatter, item_details, item_json, item_line, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ItemsCommand {
    /// List items, newest first
    List {
        /// Only the N most recent items (`cache.latest_items` if no value)
        #[arg(long, num_args = 0..=1, default_missing_value = "0")]
        latest: Option<usize>,
    },
    /// Show one item
    Show {
        /// Item id
        id: String,
    },
    /// List the items you posted
    Mine,
    /// Post a lost or found item
    Add {
        #[command(flatten)]
        fields: ItemFields,
    },
    /// Edit an item you posted; only the given fields change
    Update {
        /// Item id
        id: String,
        #[command(flatten)]
        fields: ItemFields,
    },
    /// Delete an item you posted
    Delete {
        /// Item id
        id: String,
        /// Confirm the deletion; it cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

/// Item fields accepted by `add` and `update`
#[derive(Debug, Default, Args)]
pub struct ItemFields {
    /// lost or found
    #[arg(long = "type", value_parser = parse_post_type)]
    pub post_type: Option<PostType>,
    /// Short title
    #[arg(long)]
    pub title: Option<String>,
    /// Description
    #[arg(long)]
    pub description: Option<String>,
    /// Category (Electronics, Documents, Jewelry, Clothing, Pets, ...)
    #[arg(long)]
    pub category: Option<String>,
    /// Where it was lost or found
    #[arg(long)]
    pub location: Option<String>,
    /// When, as YYYY-MM-DD (today if omitted on add)
    #[arg(long, value_parser = parse_item_day)]
    pub date: Option<DateTime<Utc>>,
    /// Image URL
    #[arg(long)]
    pub image: Option<String>,
    /// Contact name (your display name if omitted on add)
    #[arg(long)]
    pub contact_name: Option<String>,
}

impl ItemFields {
    fn is_empty(&self) -> bool {
        self.post_type.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.location.is_none()
            && self.date.is_none()
            && self.image.is_none()
            && self.contact_name.is_none()
    }

    /// Overwrites the draft fields that were given
    fn apply_to(&self, draft: &mut ItemDraft) {
        if let Some(post_type) = self.post_type {
            draft.post_type = post_type;
        }
        if let Some(date) = self.date {
            draft.date = date;
        }
        let text_fields = [
            (&self.title, &mut draft.title),
            (&self.description, &mut draft.description),
            (&self.category, &mut draft.category),
            (&self.location, &mut draft.location),
            (&self.image, &mut draft.thumbnail),
            (&self.contact_name, &mut draft.contact_name),
        ];
        for (given, field) in text_fields {
            if let Some(value) = given {
                *field = value.clone();
            }
        }
    }
}

impl ItemsCommand {
    pub async fn execute(&self, app: &App, format: OutputFormat) -> Result<()> {
        match self {
            ItemsCommand::List { latest } => {
                let query = list_query(*latest, app.config.cache.latest_items);
                self.execute_list(app, query, format).await
            }
            ItemsCommand::Show { id } => self.execute_show(app, id, format).await,
            ItemsCommand::Mine => self.execute_mine(app, format).await,
            ItemsCommand::Add { fields } => self.execute_add(app, fields, format).await,
            ItemsCommand::Update { id, fields } => {
                self.execute_update(app, id, fields, format).await
            }
            ItemsCommand::Delete { id, yes } => self.execute_delete(app, id, *yes, format).await,
        }
    }

    async fn execute_mine(&self, app: &App, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let items = app.items.my_items().await.map_err(user_facing)?;

        if format == OutputFormat::Json {
            let docs: Vec<_> = items
                .iter()
                .map(|item| item_json(item, app.workflow.claim_eligibility(item)))
                .collect();
            fmt.print_json(&serde_json::json!({"items": docs}));
            return Ok(());
        }

        if items.is_empty() {
            fmt.info("You have not posted any items");
            return Ok(());
        }
        fmt.success(&format!("{} item(s) posted by you", items.len()));
        for item in &items {
            fmt.info(&item_line(item, app.workflow.claim_eligibility(item)));
        }
        Ok(())
    }

    async fn execute_add(&self, app: &App, fields: &ItemFields, format: OutputFormat) -> Result<()> {
        let session = app.session();
        let user = session
            .user()
            .ok_or_else(|| user_facing(ClientError::Validation(ValidationRule::NotAuthenticated)))?;

        let mut draft = ItemDraft {
            post_type: PostType::Lost,
            title: String::new(),
            description: String::new(),
            category: String::new(),
            location: String::new(),
            date: Utc::now(),
            thumbnail: String::new(),
            contact_name: user.display_label().to_string(),
            contact_email: user.email.clone(),
        };
        fields.apply_to(&mut draft);

        let change = app.items.post_item(draft).await.map_err(user_facing)?;
        report_change(app, &change, "Posted", format);
        Ok(())
    }

    async fn execute_update(
        &self,
        app: &App,
        id: &str,
        fields: &ItemFields,
        format: OutputFormat,
    ) -> Result<()> {
        if fields.is_empty() {
            bail!("Nothing to update; pass at least one field");
        }
        let id = ItemId::new(id).context("Invalid item id")?;

        let mut draft = app.items.draft_for(&id).await.map_err(user_facing)?;
        fields.apply_to(&mut draft);
        let change = app
            .items
            .update_item(&id, draft)
            .await
            .map_err(user_facing)?;
        report_change(app, &change, "Updated", format);
        Ok(())
    }

    async fn execute_delete(&self, app: &App, id: &str, yes: bool, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let id = ItemId::new(id).context("Invalid item id")?;
        if !yes {
            bail!("Deleting item {id} cannot be undone; pass --yes to confirm");
        }

        app.items.delete_item(&id).await.map_err(user_facing)?;

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({"success": true, "deleted": id}));
        } else {
            fmt.success(&format!("Deleted item {id}"));
        }
        Ok(())
    }

    async fn execute_list(&self, app: &App, query: ListQuery, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let items = app
            .cache
            .list_items(query)
            .await
            .map_err(|e| user_facing(classify_read_error(e)))?;

        if format == OutputFormat::Json {
            let docs: Vec<_> = items
                .iter()
                .map(|item| item_json(item, app.workflow.claim_eligibility(item)))
                .collect();
            fmt.print_json(&serde_json::json!({"query": query, "items": docs}));
            return Ok(());
        }

        if items.is_empty() {
            fmt.info("No items posted yet");
            return Ok(());
        }
        fmt.success(&format!("{} item(s)", items.len()));
        for item in &items {
            fmt.info(&item_line(item, app.workflow.claim_eligibility(item)));
        }
        Ok(())
    }

    async fn execute_show(&self, app: &App, id: &str, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        let id = ItemId::new(id).context("Invalid item id")?;
        let item = app
            .cache
            .get_item(&id)
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(_) => user_facing(ClientError::ItemNotFound(id.clone())),
                other => user_facing(classify_read_error(other)),
            })?;
        let eligibility = app.workflow.claim_eligibility(&item);

        if format == OutputFormat::Json {
            fmt.print_json(&item_json(&item, eligibility));
            return Ok(());
        }

        fmt.success(&format!("{} [{}]", item.title, item.id));
        for line in item_details(&item, eligibility) {
            fmt.info(&line);
        }
        Ok(())
    }
}

fn report_change(app: &App, change: &ItemChange, verb: &str, format: OutputFormat) {
    let fmt = get_formatter(format == OutputFormat::Json);
    if format == OutputFormat::Json {
        fmt.print_json(&serde_json::json!({
            "success": true,
            "id": change.id,
            "item": change.item,
        }));
        return;
    }

    fmt.success(&format!("{verb} item {}", change.id));
    match &change.item {
        Some(item) => fmt.info(&item_line(item, app.workflow.claim_eligibility(item))),
        None => fmt.warn("The item could not be reloaded; its listing may be out of date"),
    }
}

fn parse_post_type(value: &str) -> Result<PostType, String> {
    PostType::try_from(value.to_string()).map_err(|_| "expected lost or found".to_string())
}

fn parse_item_day(value: &str) -> Result<DateTime<Utc>, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|day| day.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| format!("expected YYYY-MM-DD ({e})"))
}

/// `--latest` without a value uses the configured home-page size
fn list_query(latest: Option<usize>, configured: usize) -> ListQuery {
    match latest {
        None => ListQuery::All,
        Some(0) => ListQuery::Latest(configured),
        Some(n) => ListQuery::Latest(n),
    }
}
