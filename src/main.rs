use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;

use pwospf_router_core::config;
use pwospf_router_core::core::state::RouterState;
use pwospf_router_core::handlers::dispatcher::Dispatcher;
use pwospf_router_core::netio::loopback::{LoopbackEgress, LoopbackIngress, LoopbackRegisters};
use pwospf_router_core::netio::PortEgress;
use pwospf_router_core::tasks;
use pwospf_router_core::utils::logger;

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let interfaces_path = args.next().unwrap_or_else(|| "config/interfaces.conf".to_string());
    let routes_path = args.next().unwrap_or_else(|| "config/routes.conf".to_string());
    let identity_path = args.next().unwrap_or_else(|| "config/identity.conf".to_string());

    let interface_configs = config::parse_interfaces(&fs::read_to_string(&interfaces_path).expect("failed to read interfaces config"))
        .expect("failed to parse interfaces config");
    let static_routes = config::parse_static_routes(&fs::read_to_string(&routes_path).expect("failed to read routes config"))
        .expect("failed to parse static routes config");
    let identity = config::parse_identity(&fs::read_to_string(&identity_path).expect("failed to read identity config"))
        .expect("failed to parse router identity config");

    logger::init_logger("router-core", identity.router_id, 3).expect("failed to init logger");
    info!("booting router-core: router_id={} area_id={}", identity.router_id, identity.area_id);

    let mut egress: HashMap<String, Mutex<Box<dyn PortEgress>>> = HashMap::new();
    let mut ingress_ports = Vec::new();
    let mut interfaces = Vec::new();
    for ifc_cfg in interface_configs {
        let name = ifc_cfg.name.clone();
        egress.insert(name.clone(), Mutex::new(Box::new(LoopbackEgress::new()) as Box<dyn PortEgress>));
        // The raw-socket/hardware-DMA ingress backend is out of this
        // crate's scope; production deployments swap this for the
        // real port driver. The loopback stand-in never produces frames
        // on its own, so the control plane here idles until one is fed.
        let (_tx, ingress) = LoopbackIngress::new();
        ingress_ports.push((name, Box::new(ingress) as Box<_>));
        interfaces.push(ifc_cfg.into_interface());
    }

    let state = Arc::new(RouterState::new(identity.router_id, identity.area_id, identity.hello_interval, interfaces, egress, Box::new(LoopbackRegisters::new())));

    {
        let mut rtable = state.rtable.write().await;
        for route in static_routes {
            rtable.insert(route);
        }
    }

    let dispatcher = Dispatcher::new(state.clone());
    let mut handles = dispatcher.spawn_all(ingress_ports);

    handles.push(tokio::spawn(tasks::arp_aging::run(state.clone())));
    handles.push(tokio::spawn(tasks::hello_emitter::run(state.clone())));
    handles.push(tokio::spawn(tasks::lsu_timer::run(state.clone())));
    handles.push(tokio::spawn(tasks::lsu_broadcaster::run(state.clone())));
    handles.push(tokio::spawn(tasks::dijkstra_task::run(state.clone())));

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    info!("shutting down");
    state.request_shutdown();
    for handle in handles {
        let _ = handle.await;
    }
}
