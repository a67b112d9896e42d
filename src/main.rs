use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use rust_p4cp_common::p4info::{load_device_config, P4Info};
use rust_p4cp_controllers::{
    int::{KafkaPublisher, LogPublisher, ReportPublisher, StaticRuleSet, TcpReportStream},
    DefaultController, IntController, MacLearningCtrl,
};
use rust_p4cp_runtime::{ControlPlane, JsonStreamChannel};
use std::path::PathBuf;

mod settings;

use settings::Settings;

/// P4Runtime controller for a SCION switch with L2 learning and in-band
/// network telemetry.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Cli {
    /// Sets the level of verbosity
    #[clap(short, long)]
    verbose: bool,

    /// Settings file (TOML)
    #[clap(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// P4Info file (JSON)
    p4info: PathBuf,

    /// Device configuration file
    config: PathBuf,

    /// Address of the switch (ip:port)
    switch_address: String,

    device_id: u64,

    election_id: u64,

    /// ISD-AS this switch belongs to, e.g. 1-ff00:0:110
    as_address: String,

    node_id: u32,

    /// Static INT rule table
    int_table: PathBuf,

    /// Kafka bootstrap servers receiving the reports (empty to only log them)
    broker_address: String,

    /// Optional address of a TCP server receiving raw reports (ip:port)
    tcp_address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors are not failures of the agent.
            let _ = e.print();
            return Ok(());
        }
    };

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "debug" } else { "info" }
    )).init();

    let settings = Settings::load(cli.settings.as_deref())?;
    debug!("{:?}", settings);

    let p4info = P4Info::load(&cli.p4info).context("Failed to load P4 Info")?;
    let device_config =
        load_device_config(&cli.config).context("Failed to load device config")?;
    let int_table = StaticRuleSet::load(&cli.int_table)?;

    let con = JsonStreamChannel::connect(
        &cli.switch_address,
        cli.device_id,
        cli.election_id,
        settings.connect_timeout(),
    )
    .await?;

    let switch = settings.switch();
    let learning = MacLearningCtrl::new(&p4info, &switch)?;
    let tcp = TcpReportStream::connect(
        cli.tcp_address.as_deref().unwrap_or_default(),
        settings.connect_timeout(),
    )
    .await;
    let publisher: Box<dyn ReportPublisher> = if cli.broker_address.is_empty() {
        Box::new(LogPublisher::new("log"))
    } else {
        Box::new(KafkaPublisher::new(&cli.broker_address)?)
    };
    let int = IntController::new(
        &p4info,
        &cli.as_address,
        cli.node_id,
        int_table,
        &switch,
        publisher,
    )?
    .with_tcp_stream(tcp);

    // Controllers added later get the first chance to handle an event.
    let mut control_plane = ControlPlane::new(con, p4info, device_config);
    control_plane.add_controller(DefaultController::new());
    control_plane.add_controller(learning);
    control_plane.add_controller(int);

    info!(
        "Controlling device {} at {} as node {:x} of AS {}",
        cli.device_id, cli.switch_address, cli.node_id, cli.as_address
    );
    control_plane.run().await?;

    Ok(())
}
