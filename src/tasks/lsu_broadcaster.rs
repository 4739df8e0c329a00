//! Drains `lsu_out`, an async condition-variable queue for outbound
//! LSU frames: wakes on `lsu_notify` rather than polling, since holding
//! the queue's mutex across an `.await` would violate the
//! suspension-point rule for any lock but the send-mutex.

use std::sync::Arc;

use log::warn;

use crate::core::state::RouterState;
use crate::handlers::pwospf_handler::decode_queued_frame;

pub async fn run(state: Arc<RouterState>) {
    loop {
        if state.is_stopping() {
            return;
        }
        state.lsu_notify.notified().await;
        if state.is_stopping() {
            return;
        }

        let batch = {
            let mut queue = state.lsu_out.lock().await;
            std::mem::take(&mut *queue)
        };
        for entry in batch {
            let (ifc_name, frame) = decode_queued_frame(&entry);
            let Some(egress) = state.egress.get(ifc_name) else {
                warn!("no egress port for {ifc_name}, dropping queued lsu frame");
                continue;
            };
            if let Err(e) = egress.lock().await.send_frame(frame).await {
                warn!("failed to send queued lsu frame on {ifc_name}: {e}");
            }
        }
    }
}
