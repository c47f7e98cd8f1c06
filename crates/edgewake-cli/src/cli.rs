//! Command-line interface definitions for the button simulator.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use edgewake_hardware::mock::Fault;

/// Simulate interrupt-driven GPIO buttons on a mock platform.
#[derive(Parser, Debug)]
#[command(name = "edgewake", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON device description. A single power button on gpio0:17 is used
    /// when omitted.
    #[arg(long, short = 'd', global = true)]
    pub description: Option<PathBuf>,

    /// Only log warnings and errors.
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log driver internals (worker runs, wake arming, teardown).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the description and print each button's configuration.
    Check,
    /// Attach every button, drive edges and power transitions, then detach.
    Simulate(SimulateArgs),
}

/// Arguments for the `simulate` subcommand.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Edges delivered per burst. A burst lands before the worker runs.
    #[arg(
        long,
        short = 'e',
        default_value_t = 3,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub edges: u32,

    /// Number of bursts per button.
    #[arg(long, short = 'b', default_value_t = 1)]
    pub bursts: u32,

    /// Suspend/resume cycles after the bursts. A wake edge is delivered
    /// while suspended.
    #[arg(long, short = 's', default_value_t = 1)]
    pub suspend_cycles: u32,

    /// Make a platform operation fail for the whole run.
    #[arg(long = "inject", value_enum)]
    pub faults: Vec<FaultArg>,

    /// Print the final snapshots as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Platform operations that `--inject` can break.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultArg {
    Claim,
    SetDirection,
    SetDebounce,
    NoDebounce,
    ToIrq,
    Release,
    RequestIrq,
    FreeIrq,
    EnableWake,
    DisableWake,
    Spawn,
}

impl From<FaultArg> for Fault {
    fn from(arg: FaultArg) -> Self {
        match arg {
            FaultArg::Claim => Fault::Claim,
            FaultArg::SetDirection => Fault::SetDirection,
            FaultArg::SetDebounce => Fault::SetDebounce,
            FaultArg::NoDebounce => Fault::DebounceUnsupported,
            FaultArg::ToIrq => Fault::ToIrq,
            FaultArg::Release => Fault::Release,
            FaultArg::RequestIrq => Fault::RequestIrq,
            FaultArg::FreeIrq => Fault::FreeIrq,
            FaultArg::EnableWake => Fault::EnableWake,
            FaultArg::DisableWake => Fault::DisableWake,
            FaultArg::Spawn => Fault::Spawn,
        }
    }
}
