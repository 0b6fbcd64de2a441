//! Command-line interface for mculog.
//!
//! This module provides the CLI structure for the `mculog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, EmitCommand, LevelArg, ModeArg, StatusCommand};

use crate::logging::Verbosity;

/// mculog - Drive the modular MCU logger from a host
///
/// Emits messages through the configured UART, SD card, and filter settings,
/// with the UART emulated on standard output.
#[derive(Debug, Parser)]
#[command(name = "mculog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase diagnostic verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all diagnostics except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log messages through the configured outputs
    Emit(EmitCommand),

    /// Show resolved logger settings and output availability
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the diagnostic verbosity based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
