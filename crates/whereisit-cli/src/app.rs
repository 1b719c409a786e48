//! Wiring of adapters and use cases for a single CLI invocation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use whereisit_cache::ItemCache;
use whereisit_core::config::Config;
use whereisit_core::domain::Session;
use whereisit_core::ports::{ICredentialProvider, IItemCache, ISessionGateway};
use whereisit_core::usecases::{
    BridgeHandle, ItemManager, RecoveryWorkflow, SessionBridge, SessionSubscription,
};
use whereisit_gateway::{GatewayClient, IdentityProvider, IdentityStore, KeyringTokenStorage};

/// Adapters and use cases shared by the session-aware commands
pub struct App {
    /// Configuration the app was built from
    pub config: Config,
    /// Item cache in front of the backend
    pub cache: Arc<ItemCache>,
    /// Session state owner
    pub bridge: SessionBridge,
    /// Claims, recoveries and profile counters
    pub workflow: RecoveryWorkflow,
    /// Posting, editing and deleting the user's items
    pub items: ItemManager,
    pump: BridgeHandle,
    _cache_reset: SessionSubscription,
}

impl App {
    /// Builds the adapters, starts the identity event pump and restores
    /// the persisted identity
    ///
    /// A failed restore is logged and leaves the session unauthenticated.
    pub async fn start(config: &Config) -> Result<Self> {
        let gateway = Arc::new(
            GatewayClient::new(&config.backend).context("Failed to create backend client")?,
        );
        let store: Arc<dyn IdentityStore> = Arc::new(KeyringTokenStorage);
        let credentials = Arc::new(
            IdentityProvider::from_config(config, Some(store))
                .context("Failed to create identity client")?,
        );
        let cache = Arc::new(ItemCache::new(
            Arc::clone(&gateway) as Arc<dyn ISessionGateway>
        ));

        let bridge = SessionBridge::new(
            credentials as Arc<dyn ICredentialProvider>,
            Arc::clone(&gateway) as Arc<dyn ISessionGateway>,
        );
        let workflow = RecoveryWorkflow::new(
            bridge.clone(),
            Arc::clone(&gateway) as Arc<dyn ISessionGateway>,
            Arc::clone(&cache) as Arc<dyn IItemCache>,
        );
        let items = ItemManager::new(
            bridge.clone(),
            gateway as Arc<dyn ISessionGateway>,
            Arc::clone(&cache) as Arc<dyn IItemCache>,
        );

        let cache_reset = clear_cache_on_sign_out(&bridge, Arc::clone(&cache));
        let pump = bridge.start();

        match bridge.restore().await {
            Ok(Some(user)) => info!(email = %user.email, "Restored session"),
            Ok(None) => debug!("No session to restore"),
            Err(e) => warn!(error = %e, "Could not restore session"),
        }
        let session = bridge.settled().await;
        debug!(status = %session.status(), "Session settled");

        Ok(Self {
            config: config.clone(),
            cache,
            bridge,
            workflow,
            items,
            pump,
            _cache_reset: cache_reset,
        })
    }

    /// Current session snapshot
    pub fn session(&self) -> Session {
        self.bridge.current_session()
    }

    /// Stops the identity event pump
    pub async fn shutdown(self) {
        self.pump.shutdown().await;
    }
}

/// Empties the item cache whenever the session leaves `Authenticated`
fn clear_cache_on_sign_out(bridge: &SessionBridge, cache: Arc<ItemCache>) -> SessionSubscription {
    let was_authenticated = AtomicBool::new(bridge.current_session().is_authenticated());
    bridge.on_session_change(move |session| {
        let now = session.is_authenticated();
        if was_authenticated.swap(now, Ordering::SeqCst) && !now {
            debug!(status = %session.status(), entries = cache.len(), "Clearing item cache");
            cache.clear();
        }
    })
}
