//! WhereIsIt Gateway - Backend and identity service adapters
//!
//! Provides async clients for:
//! - The WhereIsIt backend (cookie session, items, recoveries)
//! - The identity service REST API (sign-up, sign-in, profile, refresh)
//! - The provider-hosted consent flow (OAuth2 Authorization Code with PKCE)
//! - Persisting the signed-in identity between runs
//!
//! ## Modules
//!
//! - [`client`] - `GatewayClient`, the `ISessionGateway` adapter
//! - [`identity`] - Identity service HTTP client
//! - [`auth`] - OAuth2 PKCE consent flow components
//! - [`storage`] - Keyring and file persistence of the identity
//! - [`provider`] - `IdentityProvider`, the `ICredentialProvider` adapter

pub mod auth;
pub mod client;
pub mod identity;
pub mod provider;
pub mod storage;

pub use client::GatewayClient;
pub use identity::IdentityClient;
pub use provider::IdentityProvider;
pub use storage::{FileTokenStore, IdentityStore, KeyringTokenStorage, PersistedIdentity};
