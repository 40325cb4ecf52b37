use crate::watchdog::Watchdog;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub watchdog: Arc<Watchdog>,
}
