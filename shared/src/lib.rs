pub mod types;
pub mod error;
pub mod access;
pub mod store;
pub mod config;
pub mod signature;
pub mod response;
pub mod identity;
pub mod users;
pub mod plans;
pub mod follows;
pub mod subscriptions;
pub mod checkout;
pub mod feed;

use checkout::CheckoutProcessor;
use config::Config;
use std::sync::Arc;
use store::Store;

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub processor: Arc<dyn CheckoutProcessor>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        processor: Arc<dyn CheckoutProcessor>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            processor,
            config,
        })
    }
}
