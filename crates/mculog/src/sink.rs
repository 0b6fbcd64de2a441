//! Custom output hooks.
//!
//! Every destination the logger writes to is a [`LogSink`]. The built-in UART
//! and file outputs implement it, and applications register their own
//! implementations to reroute or reformat messages. [`TimestampSink`] and
//! [`FilterSink`] wrap another sink to add a time prefix or to drop unwanted
//! messages.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use tracing::trace;

use crate::error::Result;
use crate::uart::UartChannel;

/// A destination for formatted log messages.
pub trait LogSink: Send {
    /// Name of this sink, used in diagnostics.
    fn name(&self) -> &str;

    /// Write one formatted message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be delivered.
    fn write(&mut self, msg: &str) -> Result<()>;

    /// Push any buffered output to its destination.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when the logger is (re)initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be brought back to a usable state.
    fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write(&mut self, msg: &str) -> Result<()> {
        (**self).write(msg)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn on_init(&mut self) -> Result<()> {
        (**self).on_init()
    }
}

/// Sends messages through a [`UartChannel`].
#[derive(Debug, Clone)]
pub struct UartSink {
    channel: UartChannel,
}

impl UartSink {
    /// Wrap a UART channel.
    #[must_use]
    pub fn new(channel: UartChannel) -> Self {
        Self { channel }
    }

    /// The wrapped channel.
    #[must_use]
    pub fn channel(&self) -> &UartChannel {
        &self.channel
    }
}

impl LogSink for UartSink {
    fn name(&self) -> &str {
        "uart"
    }

    fn write(&mut self, msg: &str) -> Result<()> {
        self.channel.write(msg.as_bytes())
    }

    fn on_init(&mut self) -> Result<()> {
        self.channel.reset();
        Ok(())
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F> {
    name: String,
    f: F,
}

impl<F> FnSink<F>
where
    F: FnMut(&str) -> Result<()> + Send,
{
    /// Create a sink named `name` that calls `f` for every message.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> LogSink for FnSink<F>
where
    F: FnMut(&str) -> Result<()> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, msg: &str) -> Result<()> {
        (self.f)(msg)
    }
}

/// Prefixes each message with the current UTC time.
#[derive(Debug)]
pub struct TimestampSink<S> {
    inner: S,
}

impl<S: LogSink> TimestampSink<S> {
    /// Wrap `inner`.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Unwrap the inner sink.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: LogSink> LogSink for TimestampSink<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn write(&mut self, msg: &str) -> Result<()> {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.inner.write(&format!("[{stamp}] {msg}"))
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn on_init(&mut self) -> Result<()> {
        self.inner.on_init()
    }
}

/// Drops messages matching any of a set of patterns.
#[derive(Debug)]
pub struct FilterSink<S> {
    inner: S,
    patterns: Vec<Regex>,
    suppressed: u64,
}

impl<S: LogSink> FilterSink<S> {
    /// Wrap `inner`, suppressing messages that match any of `patterns`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is not a valid regular expression.
    pub fn new<P: AsRef<str>>(inner: S, patterns: &[P]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            inner,
            patterns,
            suppressed: 0,
        })
    }

    /// Number of messages dropped so far.
    #[must_use]
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

impl<S: LogSink> LogSink for FilterSink<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn write(&mut self, msg: &str) -> Result<()> {
        if let Some(i) = self.patterns.iter().position(|re| re.is_match(msg)) {
            trace!(sink = self.inner.name(), pattern_index = i, "Message suppressed");
            self.suppressed += 1;
            return Ok(());
        }
        self.inner.write(msg)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn on_init(&mut self) -> Result<()> {
        self.inner.on_init()
    }
}
