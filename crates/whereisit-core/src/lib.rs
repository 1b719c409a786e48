//! WhereIsIt Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Session`, `UserProfile`, `Item`, `RecoveryRequest`, `RecoveryRecord`
//! - **Use cases** - `SessionBridge`, `RecoveryWorkflow`
//! - **Port definitions** - Traits for adapters: `ICredentialProvider`, `ISessionGateway`, `IItemCache`
//! - **State machine** - `Active → Recovered` item lifecycle and the session status machine
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`whereisit-gateway` for HTTP, `whereisit-cache` for the item cache).
//! Use cases orchestrate domain entities through port interfaces.

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod usecases;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ClientError, IdentityCreationReason, ValidationRule};
