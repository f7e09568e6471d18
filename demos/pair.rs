//! Pair device using simulated radio and controller and print events as json lines.
//!
//! ```text
//! cargo run --example pair -- check MT:Y.K9042C00KA0648G00
//! cargo run --example pair -- pair MT:Y.K9042C00KA0648G00 --channel 15 --pan-id 65535 \
//!     --xpan-id 1122334455667788 --master-key 00112233445566778899aabbccddeeff
//! ```

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use matpair::{
    credentials::HubInfo,
    events::ChannelSink,
    onboarding::{self, SetupPayloadParser},
    pairing::{Collaborators, PairingConfig, PairingManager},
    simulated,
};

#[derive(Parser, Debug)]
#[command()]
struct Cli {
    #[clap(long)]
    #[arg(global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check barcode and print decoded setup payload
    Check { barcode: String },
    /// Pair simulated device with thread credentials
    Pair {
        barcode: String,

        #[clap(long)]
        #[arg(default_value_t = 15)]
        channel: u16,

        #[clap(long)]
        #[arg(default_value_t = 0xffff)]
        pan_id: u16,

        #[clap(long)]
        xpan_id: Option<String>,

        #[clap(long)]
        master_key: Option<String>,

        #[clap(long)]
        #[arg(default_value_t = String::from("req-1"))]
        id: String,

        /// commissioning result reported by simulated controller
        #[clap(long)]
        #[arg(default_value_t = 0)]
        error_code: u32,
    },
}

async fn pair(
    barcode: &str,
    hub_info: HubInfo,
    id: &str,
    error_code: u32,
) -> Result<()> {
    // simulated device advertises whatever the barcode says, unknown barcodes get nothing
    let discriminator = onboarding::DefaultParser
        .parse(barcode)
        .map(|p| p.discriminator)
        .ok();
    let mut radio = simulated::SimulatedRadio::new().with_scan_delay(Duration::from_millis(200));
    if let Some(d) = discriminator {
        radio = radio.with_device(d, "DE:MO:00:00:00:01");
    }
    let controller = simulated::SimulatedController::new().with_behavior(
        "DE:MO:00:00:00:01",
        simulated::Behavior::complete(error_code, Duration::from_millis(500)),
    );
    let factory = simulated::SimulatedControllerFactory::new(Arc::new(controller));
    let (sink, mut events) = ChannelSink::new();
    let config = PairingConfig {
        scan_timeout_ms: 2000,
        ..Default::default()
    };
    let pm = PairingManager::new(
        config,
        Collaborators::new(Arc::new(radio), Arc::new(factory), sink),
    );

    pm.pair_device(barcode, hub_info, id);
    while let Some(e) = events.recv().await {
        println!("{}", e.to_json()?);
        if e.kind.is_terminal() {
            break;
        }
    }
    pm.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = {
        if cli.verbose {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Error
        }
    };
    env_logger::Builder::new()
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .filter_level(log_level)
        .format_line_number(true)
        .format_file(true)
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .init();

    match cli.command {
        Commands::Check { barcode } => match onboarding::DefaultParser.parse(&barcode) {
            Ok(payload) => println!("{:#?}", payload),
            Err(e) => println!("{}", e),
        },
        Commands::Pair {
            barcode,
            channel,
            pan_id,
            xpan_id,
            master_key,
            id,
            error_code,
        } => {
            let hub_info = HubInfo::Thread {
                channel,
                pan_id,
                xpan_id,
                master_key,
            };
            pair(&barcode, hub_info, &id, error_code).await?;
        }
    }
    Ok(())
}
