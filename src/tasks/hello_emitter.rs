//! Periodic HELLO origination and neighbor-expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::time::sleep;

use crate::core::state::RouterState;
use crate::handlers::pwospf_handler;

pub async fn run(state: Arc<RouterState>) {
    loop {
        if state.is_stopping() {
            return;
        }
        sleep(Duration::from_secs(state.hello_interval as u64)).await;

        for ifc in &state.interfaces {
            if let Err(e) = pwospf_handler::originate_hello(&state, &ifc.name).await {
                warn!("failed to originate hello on {}: {e}", ifc.name);
            }
        }

        if pwospf_handler::expire_neighbors(&state) {
            state.dijkstra_dirty.notify_waiters();
        }
    }
}
