//! Probe host binary
//!
//! Wires configuration, logging, the reference channel mapping and the
//! simulated probes into a running engine. Pass a JSON config file path as
//! the first argument to override the defaults.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use rdp_probe_host::core::{ChannelId, Error, EventType, HostConfig, MetaType, Result};
use rdp_probe_host::engine::ProbeEngine;
use rdp_probe_host::protocol::ChannelRegistry;
use rdp_probe_host::sensor::sim::SimulatedProbe;
use rdp_probe_host::sensor::{SensorBinding, SensorRead};
use rdp_probe_host::snapshot::SnapshotWriter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    info!(serial = %config.serial, port = config.server_port, "probe host starting");

    // Reference deployment: bean temperature on channel 1, three auxiliary
    // environmental streams re-tagged as temperature-class events so the
    // remote grapher renders them as curves
    let probes: [(u8, MetaType, Arc<dyn SensorRead>); 4] = [
        (1, MetaType::BeanTemp, Arc::new(SimulatedProbe::bean_temp())),
        (2, MetaType::Exhaust, Arc::new(SimulatedProbe::exhaust_temp())),
        (3, MetaType::Ambient, Arc::new(SimulatedProbe::humidity())),
        (4, MetaType::MaxEnvTemp, Arc::new(SimulatedProbe::gas())),
    ];

    let mut registry = ChannelRegistry::new();
    let mut bindings = Vec::new();
    for (number, meta_type, source) in probes {
        let channel = ChannelId::new(number)?;
        registry.register(channel, EventType::Temperature, meta_type)?;
        bindings.push(SensorBinding::new(channel, config.poll_interval, source));
    }
    info!(streams = bindings.len(), "monitoring data streams");

    let (engine, handle) = ProbeEngine::new(&config, registry, bindings)?;

    if let Some(path) = &config.snapshot_path {
        let writer = SnapshotWriter::new(path.clone(), handle.packets());
        tokio::spawn(writer.run());
    }

    let engine_task = tokio::spawn(engine.run());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    handle.shutdown();

    engine_task
        .await
        .map_err(|e| Error::invalid_state(format!("engine task failed: {}", e)))?
}
