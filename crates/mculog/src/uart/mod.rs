//! UART output channel.
//!
//! A [`UartChannel`] sits between the logger and a [`UartPort`]. In blocking
//! mode every message is handed to the port synchronously. In interrupt and
//! DMA mode messages are queued in a [`RingBuffer`] and drained by
//! non-blocking transfers: the port starts a transfer, and whoever observes
//! its completion (an interrupt handler on a device, a driver task on a host)
//! calls [`UartChannel::on_tx_complete`] to release the bytes and start the
//! next one.

pub mod host;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::ring::RingBuffer;

pub use host::{HostPort, HostPortDriver};

/// Identifier used to match completion notifications to a port.
pub type PortId = u32;

/// How queued bytes are pushed to the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmitMode {
    /// Transmit each message synchronously; the ring buffer is unused.
    Blocking,
    /// Queue messages and transmit one byte per transfer.
    #[default]
    Interrupt,
    /// Queue messages and transmit the largest contiguous chunk per transfer.
    Dma,
}

impl TransmitMode {
    /// Whether this mode queues through the ring buffer.
    #[must_use]
    pub fn is_buffered(self) -> bool {
        !matches!(self, Self::Blocking)
    }
}

impl fmt::Display for TransmitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::Interrupt => write!(f, "interrupt"),
            Self::Dma => write!(f, "dma"),
        }
    }
}

/// Hardware abstraction for a serial transmitter.
///
/// Implementations must not call [`UartChannel::on_tx_complete`] from inside
/// [`start_transmit`](Self::start_transmit); completions are reported from
/// another context once the transfer has finished.
pub trait UartPort: Send {
    /// Identifier of this port.
    fn id(&self) -> PortId;

    /// Transmit `data` and return once it has been sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    fn transmit(&mut self, data: &[u8]) -> Result<()>;

    /// Begin transmitting `data` without waiting for it to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer cannot be started.
    fn start_transmit(&mut self, data: &[u8]) -> Result<()>;
}

/// Counters describing channel activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UartStats {
    /// Bytes accepted into the ring buffer.
    pub queued: u64,
    /// Bytes confirmed sent by the port.
    pub transmitted: u64,
    /// Bytes discarded because the ring buffer was full.
    pub dropped: u64,
    /// Transfers started.
    pub transfers: u64,
    /// Bytes waiting in the ring buffer, including any in flight.
    pub pending: usize,
}

#[derive(Debug)]
struct TxState {
    ring: RingBuffer,
    busy: bool,
    in_flight: usize,
    // set by reset() while a transfer is in flight; its completion releases
    // nothing
    discard_in_flight: bool,
    // last start_transmit failed and nothing is in flight
    stalled: bool,
    queued: u64,
    transmitted: u64,
    transfers: u64,
}

struct Shared {
    port_id: PortId,
    mode: TransmitMode,
    // Ring indices and the busy flag live under this lock; the port lock is
    // never taken while it is held.
    state: Mutex<TxState>,
    port: Mutex<Box<dyn UartPort>>,
    idle: Notify,
}

/// Cloneable handle to a UART output channel.
#[derive(Clone)]
pub struct UartChannel {
    shared: Arc<Shared>,
}

impl fmt::Debug for UartChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UartChannel")
            .field("port_id", &self.shared.port_id)
            .field("mode", &self.shared.mode)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl UartChannel {
    /// Create a channel over `port` with a ring buffer of `ring_capacity`
    /// bytes.
    #[must_use]
    pub fn new(port: Box<dyn UartPort>, mode: TransmitMode, ring_capacity: usize) -> Self {
        let port_id = port.id();
        debug!(port_id, %mode, ring_capacity, "Creating UART channel");
        Self {
            shared: Arc::new(Shared {
                port_id,
                mode,
                state: Mutex::new(TxState {
                    ring: RingBuffer::new(ring_capacity),
                    busy: false,
                    in_flight: 0,
                    discard_in_flight: false,
                    stalled: false,
                    queued: 0,
                    transmitted: 0,
                    transfers: 0,
                }),
                port: Mutex::new(port),
                idle: Notify::new(),
            }),
        }
    }

    /// Identifier of the underlying port.
    #[must_use]
    pub fn port_id(&self) -> PortId {
        self.shared.port_id
    }

    /// Transmit mode of this channel.
    #[must_use]
    pub fn mode(&self) -> TransmitMode {
        self.shared.mode
    }

    /// Send a message.
    ///
    /// In blocking mode this returns after the port has sent every byte. In
    /// buffered modes the message is queued (truncated if the ring buffer
    /// fills up) and a transfer is started if none is in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the port rejects the transfer.
    pub fn write(&self, msg: &[u8]) -> Result<()> {
        if !self.shared.mode.is_buffered() {
            lock(&self.shared.port).transmit(msg)?;
            let mut state = lock(&self.shared.state);
            state.transmitted += msg.len() as u64;
            state.transfers += 1;
            return Ok(());
        }

        {
            let mut state = lock(&self.shared.state);
            let accepted = state.ring.write(msg);
            state.queued += accepted as u64;
            if accepted < msg.len() {
                trace!(
                    accepted,
                    dropped = msg.len() - accepted,
                    "UART ring buffer full, message truncated"
                );
            }
        }
        self.send_next()
    }

    /// Start the next transfer if the port is idle and bytes are pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the port fails to start the transfer. The bytes
    /// stay queued and the channel is left idle.
    pub fn send_next(&self) -> Result<()> {
        if !self.shared.mode.is_buffered() {
            return Ok(());
        }

        let chunk = {
            let mut state = lock(&self.shared.state);
            if state.busy || state.ring.is_empty() {
                return Ok(());
            }
            let pending = state.ring.contiguous();
            let len = match self.shared.mode {
                TransmitMode::Dma => pending.len(),
                _ => 1,
            };
            let chunk = pending[..len].to_vec();
            state.busy = true;
            state.in_flight = len;
            state.transfers += 1;
            chunk
        };

        let result = lock(&self.shared.port).start_transmit(&chunk);
        let mut state = lock(&self.shared.state);
        match result {
            Ok(()) => {
                state.stalled = false;
                Ok(())
            }
            Err(e) => {
                warn!(port_id = self.shared.port_id, error = %e, "Failed to start UART transfer");
                state.busy = false;
                state.in_flight = 0;
                state.stalled = true;
                drop(state);
                self.shared.idle.notify_waiters();
                Err(e)
            }
        }
    }

    /// Report that the transfer in flight on `port_id` has completed.
    ///
    /// Notifications for other ports are ignored, so one completion handler
    /// can be shared by several channels.
    ///
    /// # Errors
    ///
    /// Returns an error if starting the follow-up transfer fails.
    pub fn on_tx_complete(&self, port_id: PortId) -> Result<()> {
        if port_id != self.shared.port_id {
            return Ok(());
        }

        let idle = {
            let mut state = lock(&self.shared.state);
            if !state.busy {
                trace!(port_id, "Spurious UART completion");
            } else if state.discard_in_flight {
                trace!(port_id, "Completion of transfer started before reset");
                state.discard_in_flight = false;
            } else {
                let sent = state.in_flight;
                state.ring.consume(sent);
                state.transmitted += sent as u64;
            }
            state.busy = false;
            state.in_flight = 0;
            state.ring.is_empty()
        };

        if idle {
            self.shared.idle.notify_waiters();
            return Ok(());
        }
        self.send_next()
    }

    /// Discard queued bytes.
    ///
    /// A transfer already in flight cannot be recalled: the channel stays busy
    /// until the port reports its completion, which then releases nothing and
    /// moves on to whatever was queued after the reset.
    pub fn reset(&self) {
        {
            let mut state = lock(&self.shared.state);
            state.ring.clear();
            state.stalled = false;
            if state.busy {
                state.discard_in_flight = true;
                state.in_flight = 0;
            }
        }
        self.shared.idle.notify_waiters();
    }

    /// Whether nothing is queued or in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = lock(&self.shared.state);
        !state.busy && state.ring.is_empty()
    }

    /// Current activity counters.
    #[must_use]
    pub fn stats(&self) -> UartStats {
        let state = lock(&self.shared.state);
        UartStats {
            queued: state.queued,
            transmitted: state.transmitted,
            dropped: state.ring.dropped(),
            transfers: state.transfers,
            pending: state.ring.len(),
        }
    }

    /// Whether the last transfer could not be started and bytes are left
    /// queued with nothing in flight.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        let state = lock(&self.shared.state);
        state.stalled && !state.busy
    }

    /// Wait until every queued byte has been transmitted, or until the port
    /// refuses to start the next transfer.
    pub async fn drained(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() || self.is_stalled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;

    /// Port that records every transfer and never completes on its own.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingPort {
        pub(crate) id: PortId,
        pub(crate) sent: Arc<Mutex<Vec<Vec<u8>>>>,
        pub(crate) fail: Arc<std::sync::atomic::AtomicBool>,
    }

    impl RecordingPort {
        pub(crate) fn new(id: PortId) -> Self {
            Self {
                id,
                ..Self::default()
            }
        }

        pub(crate) fn transfers(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn bytes(&self) -> Vec<u8> {
            self.transfers().concat()
        }
    }

    impl UartPort for RecordingPort {
        fn id(&self) -> PortId {
            self.id
        }

        fn transmit(&mut self, data: &[u8]) -> Result<()> {
            self.start_transmit(data)
        }

        fn start_transmit(&mut self, data: &[u8]) -> Result<()> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::uart_transmit(self.id, "line fault"));
            }
            self.sent.lock().unwrap().push(data.to_vec());
            Ok(())
        }
    }

    fn complete_all(channel: &UartChannel) {
        while !channel.is_idle() {
            channel.on_tx_complete(channel.port_id()).unwrap();
        }
    }

    #[test]
    fn test_transmit_mode_default() {
        assert_eq!(TransmitMode::default(), TransmitMode::Interrupt);
        assert!(TransmitMode::Dma.is_buffered());
        assert!(!TransmitMode::Blocking.is_buffered());
    }

    #[test]
    fn test_transmit_mode_display() {
        assert_eq!(TransmitMode::Blocking.to_string(), "blocking");
        assert_eq!(TransmitMode::Interrupt.to_string(), "interrupt");
        assert_eq!(TransmitMode::Dma.to_string(), "dma");
    }

    #[test]
    fn test_blocking_mode_transmits_whole_message() {
        let port = RecordingPort::new(1);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Blocking, 16);

        channel.write(b"hello").unwrap();

        assert_eq!(port.transfers(), vec![b"hello".to_vec()]);
        assert!(channel.is_idle());
        let stats = channel.stats();
        assert_eq!(stats.transmitted, 5);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn test_interrupt_mode_sends_one_byte_per_transfer() {
        let port = RecordingPort::new(1);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Interrupt, 16);

        channel.write(b"abc").unwrap();
        assert_eq!(port.transfers(), vec![b"a".to_vec()]);
        assert!(!channel.is_idle());

        complete_all(&channel);

        assert_eq!(
            port.transfers(),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
        let stats = channel.stats();
        assert_eq!(stats.transmitted, 3);
        assert_eq!(stats.transfers, 3);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_write_while_busy_only_queues() {
        let port = RecordingPort::new(1);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Interrupt, 16);

        channel.write(b"a").unwrap();
        channel.write(b"b").unwrap();
        assert_eq!(port.transfers().len(), 1);

        complete_all(&channel);
        assert_eq!(port.bytes(), b"ab");
    }

    #[test]
    fn test_dma_mode_sends_contiguous_chunks() {
        let port = RecordingPort::new(3);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Dma, 8);

        channel.write(b"abcde").unwrap();
        channel.on_tx_complete(3).unwrap();
        // tail now at 5; this write wraps around the end of storage
        channel.write(b"fghij").unwrap();
        complete_all(&channel);

        assert_eq!(
            port.transfers(),
            vec![b"abcde".to_vec(), b"fgh".to_vec(), b"ij".to_vec()]
        );
        assert_eq!(port.bytes(), b"abcdefghij");
    }

    #[test]
    fn test_overflow_truncates_and_counts() {
        let port = RecordingPort::new(1);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Interrupt, 4);

        channel.write(b"abcdef").unwrap();
        let stats = channel.stats();
        assert_eq!(stats.queued, 3);
        assert_eq!(stats.dropped, 3);

        complete_all(&channel);
        assert_eq!(port.bytes(), b"abc");
    }

    #[test]
    fn test_completion_for_other_port_is_ignored() {
        let port = RecordingPort::new(1);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Interrupt, 16);

        channel.write(b"ab").unwrap();
        channel.on_tx_complete(2).unwrap();

        assert_eq!(port.transfers().len(), 1);
        assert_eq!(channel.stats().transmitted, 0);
    }

    #[test]
    fn test_spurious_completion_is_ignored() {
        let port = RecordingPort::new(1);
        let channel = UartChannel::new(Box::new(port), TransmitMode::Interrupt, 16);

        channel.on_tx_complete(1).unwrap();
        assert!(channel.is_idle());
        assert_eq!(channel.stats(), UartStats::default());
    }

    #[test]
    fn test_failed_start_leaves_bytes_queued() {
        let port = RecordingPort::new(1);
        port.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Interrupt, 16);

        let err = channel.write(b"xy").unwrap_err();
        assert!(err.is_uart_error());
        assert_eq!(channel.stats().pending, 2);

        port.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        channel.send_next().unwrap();
        complete_all(&channel);
        assert_eq!(port.bytes(), b"xy");
    }

    #[test]
    fn test_reset_discards_pending() {
        let port = RecordingPort::new(1);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Interrupt, 16);

        channel.write(b"abc").unwrap();
        channel.reset();
        assert_eq!(channel.stats().pending, 0);
        // "a" is still on the wire
        assert!(!channel.is_idle());

        channel.on_tx_complete(1).unwrap();
        assert!(channel.is_idle());
        assert_eq!(channel.stats().transmitted, 0);

        channel.write(b"z").unwrap();
        assert_eq!(port.transfers().last().unwrap(), b"z");
    }

    #[test]
    fn test_write_after_reset_waits_for_old_transfer() {
        let port = RecordingPort::new(1);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Dma, 16);

        channel.write(b"abc").unwrap();
        channel.reset();
        channel.write(b"xyz").unwrap();
        // no second transfer while the first is still in flight
        assert_eq!(port.transfers(), vec![b"abc".to_vec()]);

        complete_all(&channel);

        assert_eq!(port.transfers(), vec![b"abc".to_vec(), b"xyz".to_vec()]);
        let stats = channel.stats();
        assert_eq!(stats.transmitted, 3);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_completion_restarts_stalled_queue() {
        let port = RecordingPort::new(1);
        port.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Interrupt, 16);

        assert!(channel.write(b"ok").is_err());
        assert!(channel.is_stalled());

        port.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        channel.on_tx_complete(1).unwrap();
        assert!(!channel.is_stalled());
        complete_all(&channel);
        assert_eq!(port.bytes(), b"ok");
    }

    #[tokio::test]
    async fn test_drained_resolves_after_completions() {
        let port = RecordingPort::new(1);
        let channel = UartChannel::new(Box::new(port.clone()), TransmitMode::Dma, 16);
        channel.write(b"abc").unwrap();

        let completer = channel.clone();
        let task = tokio::spawn(async move {
            while !completer.is_idle() {
                tokio::task::yield_now().await;
                completer.on_tx_complete(1).unwrap();
            }
        });

        tokio::time::timeout(std::time::Duration::from_secs(5), channel.drained())
            .await
            .unwrap();
        task.await.unwrap();
        assert_eq!(port.bytes(), b"abc");
    }

    #[tokio::test]
    async fn test_drained_returns_immediately_when_idle() {
        let channel = UartChannel::new(
            Box::new(RecordingPort::new(1)),
            TransmitMode::Interrupt,
            16,
        );
        channel.drained().await;
    }

    #[test]
    fn test_channel_debug() {
        let channel = UartChannel::new(Box::new(RecordingPort::new(7)), TransmitMode::Dma, 16);
        let debug_str = format!("{channel:?}");
        assert!(debug_str.contains("UartChannel"));
        assert!(debug_str.contains("port_id: 7"));
    }
}
