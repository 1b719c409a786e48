//! Domain entities and business logic
//!
//! This module contains the core domain types for WhereIsIt:
//! - Newtypes for type-safe identifiers and validated domain types
//! - User profile and role types
//! - The process-wide session value and its status machine
//! - Lost/found items and their recovery lifecycle
//! - Recovery requests and backend recovery records
//! - Domain-specific error types

pub mod errors;
pub mod item;
pub mod newtypes;
pub mod recovery;
pub mod session;
pub mod user;

// Re-export commonly used types
pub use errors::DomainError;
pub use item::{ClaimEligibility, ClaimKind, Item, ItemDraft, ItemStatus, PostType};
pub use newtypes::*;
pub use recovery::{
    ClaimDetails, ItemSnapshot, Party, ProfileStats, RecoveryRecord, RecoveryRequest,
};
pub use session::{Session, SessionStatus};
pub use user::{NewProfile, Role, UserProfile};
