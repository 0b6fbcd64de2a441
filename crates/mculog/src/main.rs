//! `mculog` - CLI for the mculog logger
//!
//! This binary drives the logger on a host: UART output is emulated on
//! standard output, SD card output goes to a regular file.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use mculog::cli::{Cli, Command, ConfigCommand, EmitCommand};
use mculog::{init_logging, Config, HostPort, LogLevel, Logger, PortId};

/// Port identifier of the emulated UART.
const HOST_PORT_ID: PortId = 1;

/// Upper bound on waiting for the UART ring buffer to empty.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Emit(emit_cmd) => handle_emit(config, &emit_cmd).await,
        Command::Status(status_cmd) => handle_status(&config, status_cmd.json),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

async fn handle_emit(
    mut config: Config,
    cmd: &EmitCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    cmd.apply(&mut config);

    let (port, driver) = HostPort::stdout(HOST_PORT_ID);
    let mut logger = Logger::from_config(&config, Some(Box::new(port)))?;
    logger.init()?;

    let driver_task = logger
        .uart()
        .filter(|channel| channel.mode().is_buffered())
        .map(|channel| tokio::spawn(driver.run(channel.clone(), tokio::io::stdout())));

    let level = LogLevel::from(cmd.level);
    if cmd.messages.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            emit_line(&mut logger, level, &line).await;
        }
    } else {
        for msg in &cmd.messages {
            emit_line(&mut logger, level, msg).await;
        }
    }

    logger.flush()?;

    if let Some(channel) = logger.uart() {
        if cmd.stats {
            eprintln!("{}", serde_json::to_string_pretty(&channel.stats())?);
        }
        let stats = channel.stats();
        if stats.dropped > 0 {
            tracing::warn!(dropped = stats.dropped, "UART ring buffer overflowed");
        }
    }

    if let Some(task) = driver_task {
        task.abort();
    }
    Ok(())
}

/// Log one line and wait for the emulated UART to catch up, so a long
/// input does not overflow the ring buffer.
async fn emit_line(logger: &mut Logger, level: LogLevel, line: &str) {
    if let Err(e) = logger.log(level, format_args!("{line}\n")) {
        tracing::warn!(error = %e, "Failed to emit message");
    }
    if let Some(channel) = logger.uart() {
        if tokio::time::timeout(DRAIN_TIMEOUT, channel.drained())
            .await
            .is_err()
        {
            tracing::warn!(pending = channel.stats().pending, "UART drain timed out");
        }
    }
}

fn handle_status(config: &Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_file = config.log_file_path();
    let file_available = config.log_file_available();

    if json {
        let status = serde_json::json!({
            "level": config.logger.level,
            "buffer_size": config.logger.buffer_size,
            "uart": {
                "enabled": config.uart.enabled,
                "mode": config.uart.mode,
                "ring_buffer_size": config.uart.ring_buffer_size,
            },
            "sd": {
                "enabled": config.sd.enabled,
                "file_path": log_file,
                "available": file_available,
            },
            "filters": config.filter.patterns.len(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("mculog status");
        println!("-------------");
        println!("Level:         {}", config.logger.level);
        println!("Buffer size:   {}", config.logger.buffer_size);
        if config.uart.enabled {
            println!(
                "UART:          {} (ring {} bytes)",
                config.uart.mode, config.uart.ring_buffer_size
            );
        } else {
            println!("UART:          disabled");
        }
        if config.sd.enabled {
            let state = if file_available { "ready" } else { "unavailable" };
            println!("SD card:       {} ({state})", log_file.display());
        } else {
            println!("SD card:       disabled");
        }
        println!("Filters:       {}", config.filter.patterns.len());
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Logger]");
                println!("  Level:              {}", config.logger.level);
                println!("  Buffer size:        {}", config.logger.buffer_size);
                println!();
                println!("[UART]");
                println!("  Enabled:            {}", config.uart.enabled);
                println!("  Mode:               {}", config.uart.mode);
                println!("  Ring buffer size:   {}", config.uart.ring_buffer_size);
                println!();
                println!("[SD]");
                println!("  Enabled:            {}", config.sd.enabled);
                println!("  File:               {}", config.log_file_path().display());
                println!("  Timestamps:         {}", config.sd.timestamps);
                println!();
                println!("[Filter]");
                for pattern in &config.filter.patterns {
                    println!("  {pattern}");
                }
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
