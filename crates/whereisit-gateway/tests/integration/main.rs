//! Integration tests for whereisit-gateway
//!
//! Uses wiremock to simulate the WhereIsIt backend and the identity
//! service, and verifies end-to-end behavior of GatewayClient,
//! IdentityClient and IdentityProvider.

mod common;

mod test_items;
mod test_provider;
mod test_recovery;
mod test_session;
