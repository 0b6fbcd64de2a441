//! Host-side UART emulation.
//!
//! [`HostPort`] stands in for a serial peripheral when the logger runs on a
//! desktop. Blocking transmits go straight to a writer; non-blocking
//! transfers are handed to a [`HostPortDriver`] task which writes them to an
//! async writer and reports each completion back to the channel, the way a
//! transmit-complete interrupt would.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{PortId, UartChannel, UartPort};
use crate::error::{Error, Result};

/// Emulated serial port backed by a writer and a driver task.
pub struct HostPort {
    id: PortId,
    direct: Box<dyn Write + Send>,
    queue: mpsc::UnboundedSender<Vec<u8>>,
    in_flight: Arc<AtomicBool>,
}

impl fmt::Debug for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostPort")
            .field("id", &self.id)
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Receives transfers started on a [`HostPort`] and completes them.
#[derive(Debug)]
pub struct HostPortDriver {
    id: PortId,
    queue: mpsc::UnboundedReceiver<Vec<u8>>,
    in_flight: Arc<AtomicBool>,
}

impl HostPort {
    /// Create a port whose blocking transmits go to `direct`.
    #[must_use]
    pub fn new(id: PortId, direct: Box<dyn Write + Send>) -> (Self, HostPortDriver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicBool::new(false));
        let port = Self {
            id,
            direct,
            queue: tx,
            in_flight: Arc::clone(&in_flight),
        };
        let driver = HostPortDriver {
            id,
            queue: rx,
            in_flight,
        };
        (port, driver)
    }

    /// Create a port writing blocking transmits to standard output.
    #[must_use]
    pub fn stdout(id: PortId) -> (Self, HostPortDriver) {
        Self::new(id, Box::new(std::io::stdout()))
    }
}

impl UartPort for HostPort {
    fn id(&self) -> PortId {
        self.id
    }

    fn transmit(&mut self, data: &[u8]) -> Result<()> {
        self.direct
            .write_all(data)
            .and_then(|()| self.direct.flush())
            .map_err(|e| Error::uart_transmit(self.id, e.to_string()))
    }

    fn start_transmit(&mut self, data: &[u8]) -> Result<()> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(Error::UartBusy { port: self.id });
        }
        if self.queue.send(data.to_vec()).is_err() {
            self.in_flight.store(false, Ordering::SeqCst);
            return Err(Error::UartClosed { port: self.id });
        }
        Ok(())
    }
}

impl HostPortDriver {
    /// Write every started transfer to `out` and notify `channel` when each
    /// one finishes.
    ///
    /// Runs until the port is dropped. Write failures end the driver; bytes
    /// of the failed transfer stay queued in the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `out` fails.
    pub async fn run<W>(mut self, channel: UartChannel, mut out: W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        debug!(port_id = self.id, "UART host driver started");
        while let Some(chunk) = self.queue.recv().await {
            out.write_all(&chunk).await?;
            out.flush().await?;
            self.in_flight.store(false, Ordering::SeqCst);
            if let Err(e) = channel.on_tx_complete(self.id) {
                warn!(port_id = self.id, error = %e, "UART follow-up transfer failed");
            }
        }
        debug!(port_id = self.id, "UART host driver stopped");
        Ok(())
    }
}
