//! Button simulator.
//!
//! Loads a device description, attaches each button on a mock platform,
//! and drives edges and suspend/resume cycles through the real driver.
//!
//! Pipeline: load description → check compatibility → attach → bursts →
//!           suspend/resume cycles → detach → report snapshots.

mod cli;

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command, SimulateArgs};
use edgewake_core::{
    ButtonConfig, DeviceDescription, DeviceNode,
    constants::{COMPATIBLE, PROP_DEBOUNCE_INTERVAL, PROP_GPIOS, PROP_LABEL, PROP_WAKEUP_SOURCE},
};
use edgewake_driver::{ButtonDevice, DeviceSnapshot, EventHandler, LogHandler};
use edgewake_hardware::mock::{MockPlatform, MockPlatformHandle};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long to wait for the worker to catch up with delivered edges.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(1);
const SETTLE_POLL: Duration = Duration::from_millis(1);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let description = load_description(cli.description.as_deref())?;

    match cli.command {
        Command::Check => cmd_check(&description),
        Command::Simulate(ref args) => cmd_simulate(&description, args).await,
    }
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ===========================================================================
// Description loading
// ===========================================================================

/// Load a description from `path`, or build the default one.
fn load_description(path: Option<&Path>) -> Result<DeviceDescription> {
    let description = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            parse_description(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => default_description(),
    };

    if !description.is_compatible() {
        bail!(
            "description is for '{}', expected '{}'",
            description.compatible,
            COMPATIBLE
        );
    }
    if description.children.is_empty() {
        bail!("description has no buttons");
    }
    Ok(description)
}

fn parse_description(text: &str) -> Result<DeviceDescription> {
    Ok(serde_json::from_str(text)?)
}

/// One power button on gpio0:17 with a 50ms debounce that may wake the system.
fn default_description() -> DeviceDescription {
    DeviceDescription {
        compatible: COMPATIBLE.to_string(),
        children: vec![
            DeviceNode::new("button@0")
                .with_string(PROP_LABEL, "power")
                .with_u32_array(PROP_GPIOS, vec![0, 17, 0])
                .with_u32(PROP_DEBOUNCE_INTERVAL, 50)
                .with_flag(PROP_WAKEUP_SOURCE, true),
        ],
    }
}

// ===========================================================================
// Commands
// ===========================================================================

fn cmd_check(description: &DeviceDescription) -> Result<()> {
    let mut invalid = 0;

    for node in &description.children {
        match ButtonConfig::from_properties(node) {
            Ok(config) => println!(
                "{}: '{}' on {}{}, debounce {}ms, wake {}",
                node.name,
                config.label,
                config.pin,
                if config.pin.is_active_low() {
                    " (active low)"
                } else {
                    ""
                },
                config.debounce_ms,
                if config.wake_allowed { "allowed" } else { "disabled" }
            ),
            Err(e) => {
                invalid += 1;
                println!("{}: invalid: {}", node.name, e);
            }
        }
    }

    if invalid > 0 {
        bail!("{invalid} of {} buttons are invalid", description.children.len());
    }
    Ok(())
}

#[derive(Serialize)]
struct ButtonReport {
    name: String,
    #[serde(flatten)]
    snapshot: DeviceSnapshot,
}

async fn cmd_simulate(description: &DeviceDescription, args: &SimulateArgs) -> Result<()> {
    let (platform, pins) = MockPlatform::new();
    for &fault in &args.faults {
        warn!("Injecting {:?} failure", fault);
        pins.inject(fault.into());
    }

    info!("Simulating {} button(s)", description.children.len());

    let mut reports = Vec::with_capacity(description.children.len());
    let mut failed = 0;

    for node in &description.children {
        let device = ButtonDevice::new(platform.clone(), LogHandler);

        match device.attach(node).await {
            Ok(()) => {
                exercise(&device, &pins, args).await;
                if let Err(e) = device.detach().await {
                    error!(button = %node.name, "Detach failed: {}", e);
                }
            }
            Err(e) => {
                failed += 1;
                error!(button = %node.name, "Attach failed: {}", e);
            }
        }

        reports.push(ButtonReport {
            name: node.name.clone(),
            snapshot: device.snapshot(),
        });
    }

    print_reports(&reports, args.json)?;

    if failed > 0 {
        bail!("{failed} of {} buttons failed to attach", reports.len());
    }
    Ok(())
}

/// Drive bursts of edges and suspend/resume cycles on an attached button.
async fn exercise<H: EventHandler>(
    device: &ButtonDevice<MockPlatform, H>,
    pins: &MockPlatformHandle,
    args: &SimulateArgs,
) {
    let Some(line) = device.snapshot().line else {
        return;
    };
    let mut delivered = device.snapshot().events.edges;

    for _ in 0..args.bursts {
        for _ in 0..args.edges {
            pins.edge(line.pin);
        }
        delivered += u64::from(args.edges);
        settle(device, delivered).await;
    }

    for cycle in 1..=args.suspend_cycles {
        if let Err(e) = device.suspend().await {
            warn!("Suspend cycle {} refused: {}", cycle, e);
            continue;
        }

        // The edge that wakes the system.
        pins.edge(line.pin);
        delivered += 1;
        settle(device, delivered).await;

        if let Err(e) = device.resume().await {
            warn!("Resume cycle {} failed: {}", cycle, e);
        }
    }
}

/// Wait until the worker has processed `edges` edges in total.
async fn settle<H: EventHandler>(device: &ButtonDevice<MockPlatform, H>, edges: u64) {
    let caught_up = tokio::time::timeout(SETTLE_TIMEOUT, async {
        while device.snapshot().events.edges < edges {
            tokio::time::sleep(SETTLE_POLL).await;
        }
    })
    .await;

    if caught_up.is_err() {
        warn!(
            "Worker still behind after {:?} ({} of {} edges)",
            SETTLE_TIMEOUT,
            device.snapshot().events.edges,
            edges
        );
    }
}

fn print_reports(reports: &[ButtonReport], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reports)?);
        return Ok(());
    }

    for report in reports {
        println!("== {} ==", report.name);
        println!("{}", report.snapshot);
    }
    Ok(())
}
