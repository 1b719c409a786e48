//! Use cases (interactors) for WhereIsIt
//!
//! This module contains the application use cases that orchestrate
//! domain entities and port interfaces. Use cases are thin coordinators
//! that delegate business rules to domain methods and I/O to ports.
//!
//! ## Use Cases
//!
//! - [`SessionBridge`] - Identity events to backend session, single session state
//! - [`RecoveryWorkflow`] - Claim submission, cache reconciliation, profile stats
//! - [`ItemManager`] - Posting, editing and deleting the user's own items

pub mod manage_items;
pub mod recover_item;
pub mod session_bridge;

pub use manage_items::{ItemChange, ItemManager};
pub use recover_item::{RecoveryOutcome, RecoveryWorkflow};
pub use session_bridge::{
    check_password_policy, BridgeHandle, SessionBridge, SessionSubscription, SignOutReport,
};
