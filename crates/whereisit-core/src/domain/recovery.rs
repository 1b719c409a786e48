//! Recovery (claim) types
//!
//! A [`RecoveryRequest`] is built fresh for each submission and only through
//! [`RecoveryRequest::new`], which refuses to build one for a recovered item
//! or for the item's own poster. The backend answers with a
//! [`RecoveryRecord`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::item::{Item, PostType};
use super::newtypes::{Email, ItemId, RecoveryId, SubjectId};
use super::user::UserProfile;
use crate::error::ValidationRule;

/// Claim details entered by the claimant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimDetails {
    /// Where the claimant found or received the item
    pub claimed_location: String,
    /// When the claimant found or received the item
    pub claimed_date: NaiveDate,
    /// Optional free-text notes
    pub notes: Option<String>,
}

impl ClaimDetails {
    /// Creates claim details without notes
    pub fn new(claimed_location: impl Into<String>, claimed_date: NaiveDate) -> Self {
        Self {
            claimed_location: claimed_location.into(),
            claimed_date,
            notes: None,
        }
    }

    /// Adds notes; blank notes are dropped
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        let notes = notes.into();
        self.notes = if notes.trim().is_empty() {
            None
        } else {
            Some(notes)
        };
        self
    }
}

/// A claim ready to be submitted to `POST /items/{id}/recover`
///
/// Serializes to the request body only; the item id goes in the path and
/// the requester is carried by the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRequest {
    #[serde(skip)]
    item_id: ItemId,
    #[serde(skip)]
    requester_id: SubjectId,
    claimed_location: String,
    claimed_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

impl RecoveryRequest {
    /// Builds a request for `item` on behalf of `requester`
    ///
    /// # Errors
    ///
    /// Returns the first violated [`ValidationRule`]: the item is recovered,
    /// the requester posted it, or the claimed location is blank.
    pub fn new(
        item: &Item,
        requester: &UserProfile,
        details: ClaimDetails,
    ) -> Result<Self, ValidationRule> {
        if item.is_recovered() {
            return Err(ValidationRule::ItemAlreadyRecovered);
        }
        if item.is_owned_by(&requester.email) {
            return Err(ValidationRule::OwnItem);
        }
        let claimed_location = details.claimed_location.trim().to_string();
        if claimed_location.is_empty() {
            return Err(ValidationRule::MissingClaimLocation);
        }

        Ok(Self {
            item_id: item.id.clone(),
            requester_id: requester.subject_id.clone(),
            claimed_location,
            claimed_date: details.claimed_date,
            notes: details.notes,
        })
    }

    /// Item being claimed
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    /// Subject id of the claimant
    pub fn requester_id(&self) -> &SubjectId {
        &self.requester_id
    }

    /// Claimed location, trimmed
    pub fn claimed_location(&self) -> &str {
        &self.claimed_location
    }

    /// Claimed date
    pub fn claimed_date(&self) -> NaiveDate {
        self.claimed_date
    }

    /// Notes, if any
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

/// A person referenced by a recovery record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    /// Backend or identity id, when the backend includes it
    #[serde(default, alias = "uid", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email
    pub email: Email,
}

/// Snapshot of the item stored alongside a recovery record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    /// Item title at the time of recovery
    #[serde(default)]
    pub title: String,
}

/// Recovery record returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRecord {
    /// Record id
    #[serde(rename = "_id", alias = "id")]
    pub id: RecoveryId,
    /// Item that was recovered
    pub item_id: ItemId,
    /// Location given by the claimant
    #[serde(default, alias = "claimedLocation")]
    pub recovered_location: String,
    /// Date given by the claimant
    #[serde(default, alias = "claimedDate", deserialize_with = "lenient_timestamp")]
    pub recovered_date: Option<DateTime<Utc>>,
    /// Claimant notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// The claimant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered_by: Option<Party>,
    /// The poster of the item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_owner: Option<Party>,
    /// Post type of the item at recovery time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_post_type: Option<PostType>,
    /// Item snapshot at recovery time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_item_data: Option<ItemSnapshot>,
    /// Backend-side status label ("pending", "completed")
    #[serde(default)]
    pub recovery_status: String,
    /// When the record was created
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RecoveryRecord {
    /// Title of the recovered item, if the backend stored one
    pub fn item_title(&self) -> Option<&str> {
        self.original_item_data
            .as_ref()
            .map(|snapshot| snapshot.title.as_str())
            .filter(|title| !title.is_empty())
    }

    fn recovered_by_email(&self) -> Option<&Email> {
        self.recovered_by.as_ref().map(|party| &party.email)
    }

    fn original_owner_email(&self) -> Option<&Email> {
        self.original_owner.as_ref().map(|party| &party.email)
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| super::item::parse_item_date(&s)))
}

/// Per-user counters shown on the profile page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    /// Items posted by the user
    pub items_posted: usize,
    /// Recoveries where the user was the original owner
    pub items_recovered: usize,
    /// Recoveries where the user was the claimant
    pub items_found: usize,
}

impl ProfileStats {
    /// Computes the counters for `email` from item and recovery listings
    pub fn compute(email: &Email, items: &[Item], recoveries: &[RecoveryRecord]) -> Self {
        Self {
            items_posted: items.iter().filter(|item| item.is_owned_by(email)).count(),
            items_recovered: recoveries
                .iter()
                .filter(|r| r.original_owner_email() == Some(email))
                .count(),
            items_found: recoveries
                .iter()
                .filter(|r| r.recovered_by_email() == Some(email))
                .count(),
        }
    }
}
