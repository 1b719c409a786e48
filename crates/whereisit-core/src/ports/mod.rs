//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ICredentialProvider`] - External identity service (tokens, identity events)
//! - [`ISessionGateway`] - Backend session exchange, items and recoveries
//! - [`IItemCache`] - Per-item cache the recovery workflow invalidates through

pub mod credential_provider;
pub mod item_cache;
pub mod session_gateway;

pub use credential_provider::{
    CredentialError, ICredentialProvider, Identity, IdentityEvent, IdentityToken,
};
pub use item_cache::{CachedCopy, IItemCache, ListQuery, QuerySource};
pub use session_gateway::{GatewayError, ISessionGateway};
