//! Lost/found item entity
//!
//! Items are owned by the backend; the client only ever holds read-only
//! copies of confirmed server state. The client-observed lifecycle is:
//!
//! ```text
//! Active ──[recovery accepted]──► Recovered   (terminal)
//! Active ──[recovery rejected]──► Active      (no change)
//! ```
//!
//! There is no pending state on the entity. A fetched copy that claims a
//! `Recovered` item is `Active` again is not a transition at all; callers
//! detect it with [`Item::check_replacement`] and treat it as staleness.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::errors::DomainError;
use super::newtypes::{Email, ItemId};
use super::session::Session;
use crate::error::ValidationRule;

// ============================================================================
// PostType
// ============================================================================

/// Whether the poster lost the item or found it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum PostType {
    /// The poster lost this item
    Lost,
    /// The poster found this item
    Found,
}

impl PostType {
    /// Returns the wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Lost => "lost",
            PostType::Found => "found",
        }
    }
}

impl TryFrom<String> for PostType {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lost" => Ok(PostType::Lost),
            "found" => Ok(PostType::Found),
            _ => Err(DomainError::UnknownValue {
                field: "postType",
                value,
            }),
        }
    }
}

impl std::fmt::Display for PostType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ItemStatus
// ============================================================================

/// Recovery status of an item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ItemStatus {
    /// Open for claims
    #[default]
    Active,
    /// Recovered; terminal
    Recovered,
}

impl ItemStatus {
    /// Returns the state name
    pub fn name(&self) -> &'static str {
        match self {
            ItemStatus::Active => "Active",
            ItemStatus::Recovered => "Recovered",
        }
    }

    /// Checks if a transition to `target` is allowed
    ///
    /// Only `Active -> Recovered` moves the status; staying put is always
    /// allowed. `Recovered` is terminal.
    pub fn can_transition_to(&self, target: ItemStatus) -> bool {
        match (self, target) {
            (ItemStatus::Active, _) => true,
            (ItemStatus::Recovered, ItemStatus::Recovered) => true,
            (ItemStatus::Recovered, ItemStatus::Active) => false,
        }
    }
}

impl From<String> for ItemStatus {
    fn from(value: String) -> Self {
        // The backend only ever writes "recovered"; any other label
        // ("active", "open", empty) means the item is still claimable.
        if value.trim().eq_ignore_ascii_case("recovered") {
            ItemStatus::Recovered
        } else {
            ItemStatus::Active
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Item
// ============================================================================

/// A lost or found item as published by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Backend document id
    #[serde(rename = "_id", alias = "id")]
    pub id: ItemId,
    /// Lost or found
    pub post_type: PostType,
    /// Recovery status
    #[serde(default)]
    pub status: ItemStatus,
    /// Email of the user who posted the item
    #[serde(rename = "contactEmail", alias = "ownerEmail")]
    pub owner_email: Email,
    /// Short title
    #[serde(default)]
    pub title: String,
    /// Where the item was lost or found
    #[serde(default)]
    pub location: String,
    /// When the item was lost or found
    #[serde(default, deserialize_with = "lenient_date")]
    pub date: Option<DateTime<Utc>>,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    /// Category label ("Electronics", "Pets", ...)
    #[serde(default)]
    pub category: String,
    /// Thumbnail URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Display name of the poster
    #[serde(default)]
    pub contact_name: String,
}

impl Item {
    /// Returns true if `email` posted this item
    pub fn is_owned_by(&self, email: &Email) -> bool {
        &self.owner_email == email
    }

    /// Returns true if the item has been recovered
    pub fn is_recovered(&self) -> bool {
        self.status == ItemStatus::Recovered
    }

    /// Checks that `fresh` may replace this copy
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if `fresh` would move a recovered
    /// item back to active, or `DomainError::ValidationFailed` if the two
    /// copies are for different items.
    pub fn check_replacement(&self, fresh: &Item) -> Result<(), DomainError> {
        if self.id != fresh.id {
            return Err(DomainError::ValidationFailed(format!(
                "cannot replace item {} with item {}",
                self.id, fresh.id
            )));
        }
        if !self.status.can_transition_to(fresh.status) {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: fresh.status.name().to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// ItemDraft
// ============================================================================

/// Fields of an item the poster writes, for `POST /items` and
/// `PUT /items/{id}`
///
/// Status is not part of a draft. Only a recovery moves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    /// Lost or found
    pub post_type: PostType,
    /// Short title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Category label
    pub category: String,
    /// Where the item was lost or found
    pub location: String,
    /// When the item was lost or found
    pub date: DateTime<Utc>,
    /// Image URL
    pub thumbnail: String,
    /// Name shown to claimants
    pub contact_name: String,
    /// Email shown to claimants; the backend records it as the owner
    pub contact_email: Email,
}

impl ItemDraft {
    /// Starts a draft from an existing item, for editing
    ///
    /// An undated item gets `now` as its date.
    pub fn from_item(item: &Item, now: DateTime<Utc>) -> Self {
        Self {
            post_type: item.post_type,
            title: item.title.clone(),
            description: item.description.clone(),
            category: item.category.clone(),
            location: item.location.clone(),
            date: item.date.unwrap_or(now),
            thumbnail: item.thumbnail.clone().unwrap_or_default(),
            contact_name: item.contact_name.clone(),
            contact_email: item.owner_email.clone(),
        }
    }

    /// Trims every text field and checks that none is blank
    ///
    /// # Errors
    ///
    /// `ValidationRule::MissingItemField` naming the first blank field.
    pub fn normalized(mut self) -> Result<Self, ValidationRule> {
        let fields = [
            ("title", &mut self.title),
            ("description", &mut self.description),
            ("category", &mut self.category),
            ("location", &mut self.location),
            ("thumbnail", &mut self.thumbnail),
            ("contact name", &mut self.contact_name),
        ];
        for (name, value) in fields {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(ValidationRule::MissingItemField(name));
            }
            *value = trimmed.to_string();
        }
        Ok(self)
    }
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates; anything else is
/// treated as absent rather than failing the whole item.
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| parse_item_date(&s)))
}

pub(crate) fn parse_item_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

// ============================================================================
// Claim eligibility
// ============================================================================

/// What a claim on an item means for the claimant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    /// Someone found it and the claimant says it is theirs
    ThisIsMine,
    /// Someone lost it and the claimant found it
    FoundThis,
}

impl ClaimKind {
    /// Claim kind for a post type
    pub fn for_post(post_type: PostType) -> Self {
        match post_type {
            PostType::Found => ClaimKind::ThisIsMine,
            PostType::Lost => ClaimKind::FoundThis,
        }
    }
}

/// Whether the current session may claim an item, and why not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "eligibility", content = "kind")]
pub enum ClaimEligibility {
    /// No authenticated session
    SignInRequired,
    /// The item is already recovered
    AlreadyRecovered,
    /// The session user posted the item
    OwnItem,
    /// A claim may be submitted
    Claimable(ClaimKind),
}

impl ClaimEligibility {
    /// Evaluates the claim preconditions for `item` under `session`
    ///
    /// Recovered status wins over ownership so owners also see that their
    /// item is done.
    pub fn evaluate(item: &Item, session: &Session) -> Self {
        if item.is_recovered() {
            return ClaimEligibility::AlreadyRecovered;
        }
        let Some(user) = session.user() else {
            return ClaimEligibility::SignInRequired;
        };
        if item.is_owned_by(&user.email) {
            return ClaimEligibility::OwnItem;
        }
        ClaimEligibility::Claimable(ClaimKind::for_post(item.post_type))
    }

    /// Returns true if a claim may be submitted
    pub fn is_claimable(&self) -> bool {
        matches!(self, ClaimEligibility::Claimable(_))
    }

    /// Button label shown next to the item
    pub fn label(&self) -> &'static str {
        match self {
            ClaimEligibility::SignInRequired => "Sign in to claim",
            ClaimEligibility::AlreadyRecovered => "Already Recovered",
            ClaimEligibility::OwnItem => "Your Item",
            ClaimEligibility::Claimable(ClaimKind::ThisIsMine) => "This is Mine!",
            ClaimEligibility::Claimable(ClaimKind::FoundThis) => "Found This!",
        }
    }
}
