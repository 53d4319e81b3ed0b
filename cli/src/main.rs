// eventmesh-cli: desktop tooling for the BLE broadcast transport
//
// Encode and decode advertisement packets by hand, inspect mesh headers, and
// run a loopback simulation of several nodes sharing the air.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use eventmesh_core::transport::ble::{
    decode, encode, BroadcastTransport, LoopbackRadio, MeshHeader, PermissionGate, RadioLayout,
    RadioPacket, StaticPermissions, TransportError, MESH_HEADER_SIZE,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Upper bound on simulated receivers
const MAX_SIMULATED_NODES: usize = 256;

#[derive(Parser)]
#[command(name = "eventmesh")]
#[command(about = "EventMesh: BLE advertisement broadcast tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Frame a hex payload into an advertisement packet
    Encode {
        #[arg(short, long, default_value = "manufacturer")]
        layout: RadioLayout,
        payload: String,
    },
    /// Recover the payload from a hex advertisement packet
    Decode {
        #[arg(short, long, default_value = "manufacturer")]
        layout: RadioLayout,
        packet: String,
    },
    /// Print the mesh header at the start of a hex payload
    Inspect { payload: String },
    /// Broadcast a message from one loopback node to `nodes` receivers
    Simulate {
        #[arg(short, long, default_value = "2")]
        nodes: usize,
        #[arg(short, long)]
        layout: Option<RadioLayout>,
        message: String,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
    /// Show where the config file lives
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    eventmesh_core::init_logging(&config.log_level);

    match cli.command {
        Commands::Encode { layout, payload } => cmd_encode(layout, &payload),
        Commands::Decode { layout, packet } => cmd_decode(layout, &packet),
        Commands::Inspect { payload } => cmd_inspect(&payload),
        Commands::Simulate {
            nodes,
            layout,
            message,
        } => cmd_simulate(config, nodes, layout, message).await,
        Commands::Config { action } => cmd_config(config, action),
    }
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(&cleaned).with_context(|| format!("Invalid hex: {}", input))
}

fn cmd_encode(layout: RadioLayout, payload: &str) -> Result<()> {
    let payload = parse_hex(payload)?;
    let packet = encode(&payload, &layout).context("Failed to encode payload")?;

    println!("{} ({} byte payload)", layout.to_string().bold(), payload.len());
    match &packet {
        RadioPacket::ServiceData {
            service_uuid,
            service_data,
        } => {
            println!("  Service UUID: {}", service_uuid.to_string().bright_cyan());
            println!("  Service data: {}", hex::encode(service_data).bright_yellow());
        }
        RadioPacket::ManufacturerData { company_id, data } => {
            println!("  Company id:   {}", format!("0x{:04X}", company_id).bright_cyan());
            println!("  Data:         {}", hex::encode(data).bright_yellow());
        }
        RadioPacket::Frame(frame) => {
            println!("  Length:       {}", frame[0].to_string().bright_cyan());
            println!("  Type:         {}", frame[1]);
        }
    }
    println!("  Raw ({:>2} B):  {}", packet.len(), hex::encode(packet.to_bytes()));

    Ok(())
}

fn cmd_decode(layout: RadioLayout, packet: &str) -> Result<()> {
    let bytes = parse_hex(packet)?;
    match decode(&bytes, &layout) {
        Ok(payload) => {
            println!("{} Decoded {} bytes", "✓".green(), payload.len());
            println!("  {}", hex::encode(&payload).bright_yellow());
            if let Some(header) = MeshHeader::peek(&payload) {
                println!("  {}", header.to_string().dimmed());
            }
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            anyhow::bail!("Packet rejected for {}", layout)
        }
    }
}

fn cmd_inspect(payload: &str) -> Result<()> {
    let bytes = parse_hex(payload)?;
    let header = MeshHeader::peek(&bytes).with_context(|| {
        format!(
            "Payload has {} bytes, a mesh header needs {}",
            bytes.len(),
            MESH_HEADER_SIZE
        )
    })?;

    println!("{}", "Mesh Header".bold());
    println!("  TTL:        {}", header.ttl);
    println!("  Receiver:   {}", header.receiver);
    println!("  Increment:  {}", header.increment);
    println!("  User id:    {}", header.user_id);
    println!("  Type:       {}", header.message_type);
    println!("  Longitude:  {}", header.longitude);
    println!("  Latitude:   {}", header.latitude);
    println!("  Timestamp:  {}", header.timestamp);
    if bytes.len() > MESH_HEADER_SIZE {
        println!("  Body:       {}", hex::encode(&bytes[MESH_HEADER_SIZE..]).bright_yellow());
    }

    Ok(())
}

async fn cmd_simulate(
    config: config::Config,
    nodes: usize,
    layout: Option<RadioLayout>,
    message: String,
) -> Result<()> {
    check_node_count(nodes)?;

    let mut transport_config = config.transport;
    if let Some(layout) = layout {
        transport_config.layout = layout;
    }
    let layout = transport_config.layout;
    debug!("Simulation config: {:?}", transport_config);

    let radio = LoopbackRadio::new();
    let node = || {
        BroadcastTransport::new(
            transport_config.clone(),
            radio.clone(),
            Arc::new(PermissionGate::new(StaticPermissions::all())),
        )
    };

    let sender = node()?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut receivers = Vec::with_capacity(nodes);
    for index in 1..=nodes {
        let receiver = node()?;
        let tx = tx.clone();
        receiver.begin_receiving(move |payload| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((index, payload));
            }
        })?;
        receivers.push(receiver);
    }
    drop(tx);

    println!(
        "{} 1 sender, {} receivers on {}",
        "Simulating".bold(),
        nodes,
        layout.to_string().bright_cyan()
    );

    let mut events = sender.subscribe();
    sender
        .begin_transmitting(message.as_bytes())
        .context("Sender could not start broadcasting")?;
    while let Ok(event) = events.try_recv() {
        if let Some(failure) = event.failure() {
            return Err(TransportError::from(failure)).context("Radio refused the broadcast");
        }
    }
    let delivered = radio.tick();
    println!("  {} Broadcast reached {} scanners", "✓".green(), delivered);

    for _ in 0..delivered {
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some((index, payload))) => {
                println!(
                    "  node {} received {}",
                    index.to_string().bright_cyan(),
                    String::from_utf8_lossy(&payload).bright_yellow()
                );
            }
            _ => {
                println!("  {}", "a receiver never delivered".red());
                break;
            }
        }
    }

    sender.stop_transmitting()?;
    for receiver in &receivers {
        receiver.stop_receiving()?;
    }

    let dropped: u64 = receivers.iter().map(|r| r.stats().packets_dropped).sum();
    if dropped > 0 {
        println!("  {} {} packets dropped", "!".yellow(), dropped);
    }

    Ok(())
}

fn check_node_count(nodes: usize) -> Result<()> {
    anyhow::ensure!(nodes >= 1, "Need at least one receiving node");
    anyhow::ensure!(
        nodes <= MAX_SIMULATED_NODES,
        "At most {} receiving nodes can be simulated",
        MAX_SIMULATED_NODES
    );
    Ok(())
}

fn cmd_config(mut config: config::Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<24} {}", key.bright_cyan(), value);
            }
        }

        ConfigAction::Path => {
            println!("{}", config::Config::config_file()?.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_count_bounds() {
        assert!(check_node_count(0).is_err());
        assert!(check_node_count(1).is_ok());
        assert!(check_node_count(MAX_SIMULATED_NODES).is_ok());
        assert!(check_node_count(usize::MAX).is_err());
    }

    #[tokio::test]
    async fn test_simulate_rejects_huge_node_count() {
        let result = cmd_simulate(config::Config::default(), usize::MAX, None, "hi".into()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_hex_accepts_separators() {
        assert_eq!(parse_hex("0xa9:f1 01").unwrap(), vec![0xA9, 0xF1, 0x01]);
        assert!(parse_hex("zz").is_err());
    }
}
