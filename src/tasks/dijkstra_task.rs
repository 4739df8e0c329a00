//! Recomputes the routing table whenever the topology changes.
//! Also runs on a 1-second tick as a backstop, so a notification lost
//! to a shutdown race is never fatal to convergence.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::time::timeout;

use crate::core::dijkstra;
use crate::core::state::RouterState;
use crate::hwsync;

const TICK: Duration = Duration::from_secs(1);

pub async fn run(state: Arc<RouterState>) {
    loop {
        if state.is_stopping() {
            return;
        }
        let _ = timeout(TICK, state.dijkstra_dirty.notified()).await;
        if state.is_stopping() {
            return;
        }
        recompute(&state).await;
    }
}

async fn recompute(state: &RouterState) {
    let new_rows = {
        let mut topo = state.topology.lock().await;
        dijkstra::compute_routes(&mut topo, &state.interfaces, state.area_id)
    };
    let changed = {
        let mut rtable = state.rtable.write().await;
        let before = rtable.rows().to_vec();
        rtable.replace_dynamic(new_rows);
        rtable.rows() != before.as_slice()
    };
    if changed {
        info!("routing table updated by dijkstra");
        let rtable = state.rtable.read().await;
        if let Err(e) = hwsync::sync_routing_table(state, &rtable).await {
            log::error!("failed to sync routing table to hardware: {e}");
        }
    }
}
