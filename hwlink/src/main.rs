use std::io::BufWriter;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use hwlink_core::{DeviceLink, DiscoveryState, SimTransport, StatusSink};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Demo(DemoArgs),
    States(StatesArgs),
}

#[derive(clap::Args, Debug)]
struct DemoArgs {
    /// Number of simulated devices plugged in
    #[clap(long, default_value_t = 1)]
    devices: u32,
    /// Delay before each simulated device appears, in milliseconds
    #[clap(long, default_value_t = 200)]
    delay_ms: u64,
    /// Discovery timeout in milliseconds
    #[clap(long, env = "HWLINK_TIMEOUT_MS", default_value_t = 30_000)]
    timeout_ms: u64,
    /// How long to hold the session before disconnecting, in milliseconds
    #[clap(long, default_value_t = 500)]
    hold_ms: u64,
    /// Make the connect attempt fail with this message
    #[clap(long)]
    fail_connect: Option<String>,
    /// Make the discovery stream fail with this message
    #[clap(long)]
    stream_error: Option<String>,
}

#[derive(clap::Args, Debug)]
struct StatesArgs {
    /// Output file path
    #[clap(short, long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Cli = Cli::parse();
    match args.command {
        Commands::Demo(args) => demo(args).await?,
        Commands::States(args) => states(args)?,
    }
    Ok(())
}

/// Console rendering of the status sink
struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn status(&self, _state: DiscoveryState, message: &str) {
        println!("[hwlink] {message}");
    }

    fn device_connected(&self, model: &str, session: &str) {
        println!("[hwlink] device_model: {model}");
        println!("[hwlink] session_id: {session}");
    }

    fn trigger(&self, enabled: bool) {
        tracing::debug!("trigger enabled: {enabled}");
    }
}

const MODELS: &[(&str, &str)] = &[("Nano X", "NanoX"), ("Stax", "Stax"), ("Flex", "Flex")];

async fn demo(args: DemoArgs) -> anyhow::Result<()> {
    let mut transport = SimTransport::new();
    for i in 0..args.devices {
        let (name, model) = MODELS[i as usize % MODELS.len()];
        transport = transport.with_device(
            format!("usb-{i}"),
            name,
            model,
            Duration::from_millis(args.delay_ms),
        );
    }
    if let Some(message) = &args.stream_error {
        transport = transport.failing_stream(message.clone(), Duration::from_millis(args.delay_ms));
    }
    if let Some(message) = &args.fail_connect {
        transport = transport.failing_connect(message.clone());
    }

    let link = DeviceLink::with_timeout(
        transport,
        ConsoleSink,
        Duration::from_millis(args.timeout_ms),
    );
    println!("[hwlink] {}", DiscoveryState::Idle.message());
    link.start_discovery().await;

    // Wait for the cycle to reach a terminal state
    let budget = args.timeout_ms + args.delay_ms * (u64::from(args.devices) + 1) + 1_000;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(budget);
    loop {
        match link.state().await {
            DiscoveryState::Connected | DiscoveryState::Error | DiscoveryState::TimedOut => break,
            _ => {}
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("demo did not reach a terminal state within {budget}ms");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    if link.state().await == DiscoveryState::Connected {
        tokio::time::sleep(Duration::from_millis(args.hold_ms)).await;
        link.disconnect().await;
    }
    Ok(())
}

#[derive(Serialize)]
struct StateLine {
    state: DiscoveryState,
    message: &'static str,
}

fn states(args: StatesArgs) -> anyhow::Result<()> {
    let table: Vec<StateLine> = [
        DiscoveryState::Idle,
        DiscoveryState::Searching,
        DiscoveryState::Found,
        DiscoveryState::Connected,
        DiscoveryState::Disconnected,
        DiscoveryState::TimedOut,
        DiscoveryState::Error,
    ]
    .into_iter()
    .map(|state| StateLine {
        state,
        message: state.message(),
    })
    .collect();

    let writer: Box<dyn std::io::Write> = match args.output {
        Some(path) => Box::new(BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };
    serde_json::to_writer_pretty(writer, &table)?;
    Ok(())
}
