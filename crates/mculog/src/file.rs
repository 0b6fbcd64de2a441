//! SD card log file output.
//!
//! [`FileSink`] appends messages to a single log file. A card that is missing
//! or unwritable must never stop the application, so a sink whose file could
//! not be opened stays uninitialized and silently discards writes until a
//! later [`LogSink::on_init`] manages to open it.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sink::LogSink;

/// Default log file name.
pub const DEFAULT_FILE_NAME: &str = "log.txt";

/// Appends log messages to a file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed.
    ///
    /// Never fails: if the file cannot be opened the sink is returned
    /// uninitialized and a warning is logged.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let writer = match open_append(&path) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                warn!(error = %e, "Log file unavailable, file output disabled");
                None
            }
        };
        Self { path, writer }
    }

    /// Open `path` for appending, reporting failure to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be created.
    pub fn try_open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Whether the file is open.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.writer.is_some()
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether `path` could be opened for appending, without creating it or
/// any of its parent directories.
#[must_use]
pub fn is_writable(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    if path.exists() {
        return OpenOptions::new().append(true).open(path).is_ok();
    }
    // the nearest existing ancestor must be a writable directory
    path.ancestors()
        .skip(1)
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .find(|p| p.exists())
        .and_then(|p| p.metadata().ok())
        .is_some_and(|meta| meta.is_dir() && !meta.permissions().readonly())
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| Error::FileOpen {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(path = %path.display(), "Log file opened");
    Ok(file)
}

impl LogSink for FileSink {
    fn name(&self) -> &str {
        "sd"
    }

    fn write(&mut self, msg: &str) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(msg.as_bytes())?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    fn on_init(&mut self) -> Result<()> {
        if self.writer.is_none() {
            match open_append(&self.path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(e) => warn!(error = %e, "Log file still unavailable"),
            }
        }
        Ok(())
    }
}
