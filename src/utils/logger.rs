use colored::*;
use log::{Level, LevelFilter};
use std::fs;

/// Targets whose every line also lands in a dedicated `routing.log`,
/// independent of `verbosity` — topology/route changes are what an
/// operator needs to reconstruct after the fact, unlike per-packet
/// dispatcher noise.
const ROUTING_TARGETS: &[&str] = &[
    "pwospf_router_core::core::dijkstra",
    "pwospf_router_core::core::topology",
    "pwospf_router_core::core::rtable",
    "pwospf_router_core::handlers::pwospf_handler",
];

fn is_routing_target(target: &str) -> bool {
    ROUTING_TARGETS.iter().any(|t| target.starts_with(t))
}

/// `router_id` is stamped into every line so logs from several router
/// processes aggregated onto one collector can still be told apart.
pub fn init_logger(app_name: impl AsRef<str>, router_id: u32, verbosity: u64) -> Result<(), fern::InitError> {
    let log_root = format_args!("log/{}", app_name.as_ref()).to_string();

    fs::create_dir_all(log_root.clone()).expect("Failed to init log files !");

    let stdout_dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] [router {:#010x}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                match record.level() {
                    Level::Error => format!("{}", record.level()).red(),
                    Level::Warn => format!("{}", record.level()).yellow(),
                    Level::Info => format!("{}", record.level()).cyan(),
                    Level::Debug => format!("{}", record.level()).purple(),
                    Level::Trace => format!("{}", record.level()).normal(),
                },
                router_id,
                record.target(),
                message
            ))
        })
        .level(match verbosity {
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            3 => LevelFilter::Debug,
            _4_or_more => LevelFilter::Trace,
        })
        .level_for(app_name.as_ref().to_string(), LevelFilter::Trace)
        .chain(std::io::stdout());

    let log_file_root = format!(
        "{}/{}.{}",
        log_root,
        app_name.as_ref(),
        chrono::Utc::now().format("%Y_%m_%d")
    );

    let out_file_dispatch = fern::Dispatch::new()
        .level(LevelFilter::Off)
        .level_for(app_name.as_ref().to_string(), LevelFilter::Trace)
        .chain(fern::log_file(format!("{}.log", log_file_root))?);

    let full_file_dispatch =
        fern::Dispatch::new().chain(fern::log_file(format!("{}.full.log", log_file_root))?);

    let routing_file_dispatch = fern::Dispatch::new()
        .level(LevelFilter::Off)
        .filter(|metadata| is_routing_target(metadata.target()))
        .level_for("pwospf_router_core::core::dijkstra", LevelFilter::Trace)
        .level_for("pwospf_router_core::core::topology", LevelFilter::Trace)
        .level_for("pwospf_router_core::core::rtable", LevelFilter::Trace)
        .level_for("pwospf_router_core::handlers::pwospf_handler", LevelFilter::Trace)
        .chain(fern::log_file(format!("{}.routing.log", log_file_root))?);

    let files_dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] [router {:#010x}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                router_id,
                record.target(),
                message
            ))
        })
        .chain(out_file_dispatch)
        .chain(full_file_dispatch)
        .chain(routing_file_dispatch);

    fern::Dispatch::new()
        .chain(stdout_dispatch)
        .chain(files_dispatch)
        .apply()?;

    Ok(())
}
