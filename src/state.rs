use crate::config::Config;
use crate::db::{AddressStore, OrderStore};
use std::sync::Arc;

/// Shared by the HTTP handlers. The API only writes the watch-list and reads orders.
pub struct AppState {
    pub config: Config,
    pub addresses: Arc<dyn AddressStore>,
    pub orders: Arc<dyn OrderStore>,
}
