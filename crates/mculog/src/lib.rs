//! `mculog` - A modular logging system for microcontroller projects
//!
//! Messages are filtered by severity, formatted into a bounded buffer, and
//! routed to UART (blocking, interrupt-driven, or DMA through a ring buffer),
//! to an SD card log file, and to any custom output hook implementing
//! [`LogSink`].

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod file;
pub mod level;
pub mod logger;
pub mod logging;
pub mod ring;
pub mod sink;
pub mod uart;

pub use config::Config;
pub use error::{Error, Result};
pub use file::FileSink;
pub use level::LogLevel;
pub use logger::{install, with_global, Logger};
pub use logging::init_logging;
pub use ring::RingBuffer;
pub use sink::{FilterSink, FnSink, LogSink, TimestampSink, UartSink};
pub use uart::{HostPort, HostPortDriver, PortId, TransmitMode, UartChannel, UartPort, UartStats};
