//! Periodic LSU origination: every 30 seconds regardless of
//! topology change, so stale neighbors time out our advertisements too.

use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio::time::sleep;

use crate::core::state::RouterState;
use crate::handlers::pwospf_handler;

const LSU_INTERVAL: Duration = Duration::from_secs(30);

pub async fn run(state: Arc<RouterState>) {
    loop {
        if state.is_stopping() {
            return;
        }
        sleep(LSU_INTERVAL).await;
        if let Err(e) = pwospf_handler::originate_lsu(&state).await {
            warn!("failed to originate lsu: {e}");
        }
    }
}
