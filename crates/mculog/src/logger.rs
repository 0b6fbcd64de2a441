//! The logger: level filtering, formatting, and fan-out to sinks.
//!
//! # Initialization and usage
//!
//! ```
//! use mculog::{FnSink, LogLevel, Logger};
//!
//! let mut logger = Logger::new();
//! logger.add_sink(FnSink::new("console", |msg: &str| {
//!     print!("{msg}");
//!     Ok(())
//! }));
//! logger.init().unwrap();
//! logger.set_level(LogLevel::Debug);
//! logger.log(LogLevel::Info, format_args!("adc={}\r\n", 512)).unwrap();
//! ```
//!
//! # Disabling and flushing
//!
//! [`Logger::disable`] silences every message until the next
//! [`Logger::init`] or [`Logger::enable`]. [`Logger::flush`] pushes buffered
//! file output to storage; call it before power-down or card removal.

use std::fmt::{self, Write as _};
use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::file::FileSink;
use crate::level::LogLevel;
use crate::sink::{FilterSink, LogSink, TimestampSink, UartSink};
use crate::uart::{UartChannel, UartPort};

/// Default formatting buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Leveled logger writing to a list of sinks.
pub struct Logger {
    level: LogLevel,
    enabled: bool,
    buffer_size: usize,
    sinks: Vec<Box<dyn LogSink>>,
    uart: Option<UartChannel>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sinks: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("enabled", &self.enabled)
            .field("buffer_size", &self.buffer_size)
            .field("sinks", &sinks)
            .field("uart", &self.uart)
            .finish()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Create an enabled logger at [`LogLevel::Info`] with no sinks.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a logger with a custom formatting buffer size.
    ///
    /// The size is clamped to at least 1.
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            level: LogLevel::default(),
            enabled: true,
            buffer_size: buffer_size.max(1),
            sinks: Vec::new(),
            uart: None,
        }
    }

    /// Build a logger from configuration.
    ///
    /// The UART sink is created only when UART output is enabled and a `port`
    /// is supplied. The log file sink is opened when SD output is enabled; an
    /// unavailable file leaves that sink inert rather than failing. Filter
    /// patterns apply to every sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &Config, port: Option<Box<dyn UartPort>>) -> Result<Self> {
        config.validate()?;

        let mut logger = Self::with_buffer_size(config.logger.buffer_size);
        logger.level = config.logger.level;

        if config.uart.enabled {
            if let Some(port) = port {
                let channel =
                    UartChannel::new(port, config.uart.mode, config.uart.ring_buffer_size);
                logger.uart = Some(channel.clone());
                logger.push_filtered(Box::new(UartSink::new(channel)), config)?;
            } else {
                debug!("UART output enabled but no port supplied");
            }
        }

        if config.sd.enabled {
            let file = FileSink::open(config.log_file_path());
            let sink: Box<dyn LogSink> = if config.sd.timestamps {
                Box::new(TimestampSink::new(file))
            } else {
                Box::new(file)
            };
            logger.push_filtered(sink, config)?;
        }

        debug!(
            level = %logger.level,
            sinks = logger.sinks.len(),
            "Logger configured"
        );
        Ok(logger)
    }

    fn push_filtered(&mut self, sink: Box<dyn LogSink>, config: &Config) -> Result<()> {
        if config.filter.patterns.is_empty() {
            self.sinks.push(sink);
        } else {
            self.sinks
                .push(Box::new(FilterSink::new(sink, config.filter.patterns.as_slice())?));
        }
        Ok(())
    }

    /// Register an output hook. Sinks receive messages in registration order.
    pub fn add_sink(&mut self, sink: impl LogSink + 'static) -> &mut Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Number of registered sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// The UART channel created by [`from_config`](Self::from_config), if any.
    #[must_use]
    pub fn uart(&self) -> Option<&UartChannel> {
        self.uart.as_ref()
    }

    /// Reset output state and enable logging.
    ///
    /// Empties UART ring buffers and retries opening log files that were
    /// unavailable. Logging is enabled even if a sink fails to reinitialize.
    ///
    /// # Errors
    ///
    /// Returns the first sink error encountered.
    pub fn init(&mut self) -> Result<()> {
        self.enabled = true;
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.on_init() {
                warn!(sink = sink.name(), error = %e, "Sink failed to initialize");
                first_err.get_or_insert(e);
            }
        }
        debug!(level = %self.level, "Logger initialized");
        first_err.map_or(Ok(()), Err)
    }

    /// Set the least severe level that is still emitted.
    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    /// The active level.
    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Drop every message until logging is enabled again.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Resume logging after [`disable`](Self::disable).
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Whether logging is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a message at `level` would be emitted.
    #[must_use]
    pub fn would_log(&self, level: LogLevel) -> bool {
        self.enabled && level.passes(self.level)
    }

    /// Format and emit a message.
    ///
    /// Messages are dropped when logging is disabled or `level` is less severe
    /// than the active level. Output longer than the buffer is truncated to
    /// `buffer_size - 1` bytes. A failing sink does not stop delivery to the
    /// remaining sinks.
    ///
    /// # Errors
    ///
    /// Returns the first sink error encountered.
    pub fn log(&mut self, level: LogLevel, args: fmt::Arguments<'_>) -> Result<()> {
        if !self.would_log(level) {
            return Ok(());
        }

        let mut buffer = String::with_capacity(self.buffer_size);
        buffer
            .write_fmt(args)
            .map_err(|_| Error::internal("message formatting failed"))?;
        truncate_at_boundary(&mut buffer, self.buffer_size - 1);

        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.write(&buffer) {
                warn!(sink = sink.name(), error = %e, "Sink write failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Emit at [`LogLevel::Error`].
    ///
    /// # Errors
    ///
    /// See [`log`](Self::log).
    pub fn error(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(LogLevel::Error, args)
    }

    /// Emit at [`LogLevel::Warn`].
    ///
    /// # Errors
    ///
    /// See [`log`](Self::log).
    pub fn warn(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(LogLevel::Warn, args)
    }

    /// Emit at [`LogLevel::Info`].
    ///
    /// # Errors
    ///
    /// See [`log`](Self::log).
    pub fn info(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(LogLevel::Info, args)
    }

    /// Emit at [`LogLevel::Debug`].
    ///
    /// # Errors
    ///
    /// See [`log`](Self::log).
    pub fn debug(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(LogLevel::Debug, args)
    }

    /// Flush every sink.
    ///
    /// # Errors
    ///
    /// Returns the first sink error encountered.
    pub fn flush(&mut self) -> Result<()> {
        let mut first_err = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.flush() {
                warn!(sink = sink.name(), error = %e, "Sink flush failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Shorten `s` to at most `max` bytes without splitting a character.
fn truncate_at_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

static GLOBAL: OnceLock<Mutex<Logger>> = OnceLock::new();

/// Install the process-wide logger used by the `log_*!` macros.
///
/// # Errors
///
/// Returns [`Error::AlreadyInstalled`] if a logger was installed before.
pub fn install(logger: Logger) -> Result<()> {
    GLOBAL
        .set(Mutex::new(logger))
        .map_err(|_| Error::AlreadyInstalled)
}

/// Run `f` with exclusive access to the global logger.
///
/// # Errors
///
/// Returns [`Error::NotInstalled`] if no logger has been installed.
pub fn with_global<R>(f: impl FnOnce(&mut Logger) -> R) -> Result<R> {
    let cell = GLOBAL.get().ok_or(Error::NotInstalled)?;
    let mut logger = cell.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(f(&mut logger))
}

/// Emit through the global logger, discarding failures.
///
/// Used by the `log_*!` macros. Messages logged before [`install`] are
/// dropped.
#[doc(hidden)]
pub fn log_global(level: LogLevel, args: fmt::Arguments<'_>) {
    match with_global(|logger| logger.log(level, args)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => trace!(error = %e, "Global log write failed"),
        Err(_) => trace!("Message dropped, no global logger installed"),
    }
}

/// Log through the global logger at an explicit level.
#[macro_export]
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        $crate::logger::log_global($level, ::std::format_args!($($arg)+))
    };
}

/// Log through the global logger at [`LogLevel::Error`](crate::LogLevel::Error).
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => {
        $crate::log_at!($crate::LogLevel::Error, $($arg)+)
    };
}

/// Log through the global logger at [`LogLevel::Warn`](crate::LogLevel::Warn).
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => {
        $crate::log_at!($crate::LogLevel::Warn, $($arg)+)
    };
}

/// Log through the global logger at [`LogLevel::Info`](crate::LogLevel::Info).
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => {
        $crate::log_at!($crate::LogLevel::Info, $($arg)+)
    };
}

/// Log through the global logger at [`LogLevel::Debug`](crate::LogLevel::Debug).
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => {
        $crate::log_at!($crate::LogLevel::Debug, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::sink::FnSink;
    use crate::uart::tests::RecordingPort;
    use crate::uart::TransmitMode;

    fn collecting_logger() -> (Logger, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let mut logger = Logger::new();
        logger.add_sink(FnSink::new("collect", move |msg: &str| {
            captured.lock().unwrap().push(msg.to_string());
            Ok(())
        }));
        (logger, lines)
    }

    #[test]
    fn test_defaults() {
        let logger = Logger::new();
        assert_eq!(logger.level(), LogLevel::Info);
        assert!(logger.is_enabled());
        assert_eq!(logger.sink_count(), 0);
        assert!(logger.uart().is_none());
    }

    #[test]
    fn test_level_filtering() {
        let (mut logger, lines) = collecting_logger();

        logger.error(format_args!("e")).unwrap();
        logger.warn(format_args!("w")).unwrap();
        logger.info(format_args!("i")).unwrap();
        logger.debug(format_args!("d")).unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["e", "w", "i"]);
    }

    #[test]
    fn test_set_level() {
        let (mut logger, lines) = collecting_logger();

        logger.set_level(LogLevel::Error);
        logger.warn(format_args!("hidden")).unwrap();
        logger.set_level(LogLevel::Debug);
        logger.debug(format_args!("shown")).unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["shown"]);
    }

    #[test]
    fn test_disable_and_init() {
        let (mut logger, lines) = collecting_logger();

        logger.disable();
        logger.error(format_args!("dropped")).unwrap();
        assert!(!logger.would_log(LogLevel::Error));

        logger.init().unwrap();
        logger.error(format_args!("kept")).unwrap();

        assert_eq!(*lines.lock().unwrap(), vec!["kept"]);
    }

    #[test]
    fn test_enable_after_disable() {
        let (mut logger, lines) = collecting_logger();
        logger.disable();
        logger.enable();
        logger.info(format_args!("back")).unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["back"]);
    }

    #[test]
    fn test_formatting() {
        let (mut logger, lines) = collecting_logger();
        logger
            .log(LogLevel::Info, format_args!("temp={:.1}C id={:04x}\r\n", 21.55, 42))
            .unwrap();
        assert_eq!(lines.lock().unwrap()[0], "temp=21.6C id=002a\r\n");
    }

    #[test]
    fn test_zero_buffer_size_is_clamped() {
        let logger = Logger::with_buffer_size(0);
        assert!(format!("{logger:?}").contains("buffer_size: 1"));
    }

    #[test]
    fn test_truncates_to_buffer_size() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let mut logger = Logger::with_buffer_size(8);
        logger.add_sink(FnSink::new("collect", move |msg: &str| {
            captured.lock().unwrap().push(msg.to_string());
            Ok(())
        }));

        logger.info(format_args!("0123456789")).unwrap();
        assert_eq!(lines.lock().unwrap()[0], "0123456");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let mut s = "aé".to_string(); // 'é' is two bytes
        truncate_at_boundary(&mut s, 2);
        assert_eq!(s, "a");

        let mut s = "short".to_string();
        truncate_at_boundary(&mut s, 10);
        assert_eq!(s, "short");
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let (mut logger, lines) = collecting_logger();
        logger.add_sink(FnSink::new("broken", |_: &str| {
            Err(Error::sink("broken", "offline"))
        }));
        let second = Arc::clone(&lines);
        logger.add_sink(FnSink::new("after", move |msg: &str| {
            second.lock().unwrap().push(format!("after:{msg}"));
            Ok(())
        }));

        let err = logger.info(format_args!("m")).unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert_eq!(*lines.lock().unwrap(), vec!["m", "after:m"]);
    }

    #[test]
    fn test_from_config_with_uart() {
        let port = RecordingPort::new(1);
        let mut config = Config::default();
        config.uart.mode = TransmitMode::Blocking;
        config.logger.level = LogLevel::Warn;

        let mut logger = Logger::from_config(&config, Some(Box::new(port.clone()))).unwrap();
        assert_eq!(logger.sink_count(), 1);
        assert_eq!(logger.level(), LogLevel::Warn);

        logger.warn(format_args!("low battery\n")).unwrap();
        logger.info(format_args!("ignored\n")).unwrap();
        assert_eq!(port.bytes(), b"low battery\n");
        assert_eq!(logger.uart().unwrap().stats().transmitted, 12);
    }

    #[test]
    fn test_from_config_without_port() {
        let logger = Logger::from_config(&Config::default(), None).unwrap();
        assert_eq!(logger.sink_count(), 0);
        assert!(logger.uart().is_none());
    }

    #[test]
    fn test_from_config_with_sd_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let mut config = Config::default();
        config.uart.enabled = false;
        config.sd.enabled = true;
        config.sd.file_path = Some(path.clone());
        config.filter.patterns = vec!["^tick".to_string()];

        let mut logger = Logger::from_config(&config, None).unwrap();
        logger.info(format_args!("tick 1\n")).unwrap();
        logger.info(format_args!("boot\n")).unwrap();
        logger.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "boot\n");
    }

    #[test]
    fn test_from_config_with_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let mut config = Config::default();
        config.sd.enabled = true;
        config.sd.file_path = Some(path.clone());
        config.sd.timestamps = true;

        let mut logger = Logger::from_config(&config, None).unwrap();
        logger.info(format_args!("boot\n")).unwrap();
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with('['));
        assert!(contents.ends_with("] boot\n"));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = Config::default();
        config.logger.buffer_size = 0;
        assert!(Logger::from_config(&config, None).is_err());
    }

    #[test]
    fn test_init_resets_uart_ring() {
        let port = RecordingPort::new(1);
        let mut logger =
            Logger::from_config(&Config::default(), Some(Box::new(port))).unwrap();

        logger.info(format_args!("queued")).unwrap();
        assert!(!logger.uart().unwrap().is_idle());

        logger.init().unwrap();
        let channel = logger.uart().unwrap();
        assert_eq!(channel.stats().pending, 0);

        // the byte already on the wire completes without releasing anything
        channel.on_tx_complete(1).unwrap();
        assert!(channel.is_idle());
        assert_eq!(channel.stats().transmitted, 0);
    }

    #[test]
    fn test_logger_debug() {
        let (logger, _) = collecting_logger();
        let debug_str = format!("{logger:?}");
        assert!(debug_str.contains("collect"));
    }

    #[test]
    fn test_global_logger() {
        // not installed yet in this test binary
        log_info!("dropped {}", 1);

        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let mut logger = Logger::new();
        logger.add_sink(FnSink::new("global", move |msg: &str| {
            captured.lock().unwrap().push(msg.to_string());
            Ok(())
        }));
        install(logger).unwrap();
        assert!(matches!(install(Logger::new()), Err(Error::AlreadyInstalled)));

        log_error!("e{}", 1);
        log_debug!("hidden");
        with_global(|l| l.set_level(LogLevel::Debug)).unwrap();
        log_debug!("d{}", 2);
        log_warn!("w");
        log_at!(LogLevel::Info, "i");

        assert_eq!(*lines.lock().unwrap(), vec!["e1", "d2", "w", "i"]);
    }
}
