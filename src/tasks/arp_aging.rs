//! 1 Hz ARP maintenance: cache expiry + HW resync, and outstanding
//! resolution retries.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::time::sleep;

use crate::core::packet::Ipv4Header;
use crate::core::state::RouterState;
use crate::handlers::{arp_handler, ip_handler};
use crate::hwsync;

const TICK: Duration = Duration::from_secs(1);

pub async fn run(state: Arc<RouterState>) {
    loop {
        if state.is_stopping() {
            return;
        }
        sleep(TICK).await;

        let expired = {
            let mut cache = state.arp_cache.write().await;
            cache.expire(chrono::Utc::now())
        };
        if expired {
            let cache = state.arp_cache.read().await;
            if let Err(e) = hwsync::sync_arp_cache(&state, &cache).await {
                warn!("failed to resync arp cache to hardware: {e}");
            }
        }

        let abandoned = arp_handler::retry_pending_resolutions(&state).await;
        for (next_hop, frames) in abandoned {
            info!("giving up arp resolution for {next_hop} after max retries");
            for pending in frames {
                if let Ok(header) = Ipv4Header::parse(&pending.bytes[14..]) {
                    let payload = &pending.bytes[34..];
                    if let Err(e) = ip_handler::reply_icmp_host_unreachable(&state, header, payload).await {
                        warn!("failed to send icmp host unreachable: {e}");
                    }
                }
            }
        }
    }
}
