//! Bot module - catalog, orders, conversation routing and persistence.

pub mod catalog;
pub mod commands;
pub mod handlers;
pub mod keyboards;
pub mod order;
pub mod payment;
pub mod router;
pub mod store;

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::config::Config;
use order::PendingOrder;
use payment::PaymentClient;
use router::Router;
use store::Store;

/// Shared application state, one per process, injected into every handler.
pub struct BotState {
    pub config: Config,
    pub bot_username: String,
    pub router: Router,
    pub store: Store,
    /// `None` when no payment API is configured.
    pub payments: Option<PaymentClient>,
    /// Per-user catalog selection awaiting payment or cancellation.
    pub pending_orders: Mutex<HashMap<i64, PendingOrder>>,
}

impl BotState {
    pub fn new(config: Config, bot_username: String, store: Store) -> Self {
        let payments = config.payment_api_url.clone().map(|url| {
            PaymentClient::new(url, config.payment_api_key.clone())
        });
        Self {
            config,
            bot_username,
            router: Router::new(),
            store,
            payments,
            pending_orders: Mutex::new(HashMap::new()),
        }
    }
}
