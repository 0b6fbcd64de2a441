//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::config::Config;
use crate::level::LogLevel;
use crate::uart::TransmitMode;

/// Emit command arguments.
#[derive(Debug, Args)]
pub struct EmitCommand {
    /// Messages to log, one per line (reads standard input when omitted)
    pub messages: Vec<String>,

    /// Severity of the emitted messages
    #[arg(short, long, value_enum, default_value = "info")]
    pub level: LevelArg,

    /// Override the active logger level
    #[arg(long, value_enum)]
    pub threshold: Option<LevelArg>,

    /// Override the UART transmit mode
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Disable UART output
    #[arg(long)]
    pub no_uart: bool,

    /// Also append to this log file
    #[arg(long, value_name = "FILE")]
    pub sd: Option<PathBuf>,

    /// Prefix log file lines with timestamps
    #[arg(long)]
    pub timestamps: bool,

    /// Print UART statistics as JSON on stderr when done
    #[arg(long)]
    pub stats: bool,
}

impl EmitCommand {
    /// Apply command-line overrides on top of loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(threshold) = self.threshold {
            config.logger.level = threshold.into();
        }
        if let Some(mode) = self.mode {
            config.uart.mode = mode.into();
        }
        if self.no_uart {
            config.uart.enabled = false;
        }
        if let Some(path) = &self.sd {
            config.sd.enabled = true;
            config.sd.file_path = Some(path.clone());
        }
        if self.timestamps {
            config.sd.timestamps = true;
        }
    }
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Log level argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LevelArg {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Everything
    Debug,
}

impl From<LevelArg> for LogLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Error => Self::Error,
            LevelArg::Warn => Self::Warn,
            LevelArg::Info => Self::Info,
            LevelArg::Debug => Self::Debug,
        }
    }
}

/// UART transmit mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Synchronous transmit
    Blocking,
    /// One byte per transfer from the ring buffer
    Interrupt,
    /// Contiguous chunks from the ring buffer
    Dma,
}

impl From<ModeArg> for TransmitMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Blocking => Self::Blocking,
            ModeArg::Interrupt => Self::Interrupt,
            ModeArg::Dma => Self::Dma,
        }
    }
}
