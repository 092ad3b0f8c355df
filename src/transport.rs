//! Transport: the line-oriented link to the controller board.
//!
//! The board takes single-character commands and `r <params>` run lines,
//! each terminated by a newline, and may echo arbitrary lines back at any time.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

/// Errors that can occur while opening the device link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to configure {path}: {reason}")]
    Configure { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outgoing half of the device link.
pub trait Transport: Send {
    /// Writes `line` followed by a newline, and flushes.
    fn send_line(&mut self, line: &str) -> io::Result<()>;
}

/// A [`Transport`] over any writer.
#[derive(Debug)]
pub struct LineWriter<W> {
    inner: W,
}

impl<W> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> Transport for LineWriter<W> {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        debug!(line, "to device");
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        self.inner.flush()
    }
}

/// A serial device node, put into raw mode at the configured baud rate.
#[derive(Debug)]
pub struct SerialPort {
    file: File,
}

impl SerialPort {
    /// Configures the port with `stty` and opens it for reading and writing.
    pub fn open(path: &Path, baud: u32, stty: &str) -> Result<Self, TransportError> {
        configure(path, baud, stty)?;
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Splits the port into its outgoing transport and incoming line reader.
    pub fn split(self) -> io::Result<(LineWriter<File>, BufReader<File>)> {
        let reader = self.file.try_clone()?;
        Ok((LineWriter::new(self.file), BufReader::new(reader)))
    }
}

/// Run `stty` against the device: baud rate, raw mode, no local echo.
fn configure(path: &Path, baud: u32, stty: &str) -> Result<(), TransportError> {
    let configure_err = |reason: String| TransportError::Configure {
        path: path.to_path_buf(),
        reason,
    };

    let output = Command::new(stty)
        .arg("-F")
        .arg(path)
        .args([baud.to_string().as_str(), "raw", "-echo"])
        .output()
        .map_err(|e| configure_err(format!("failed to run {stty}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(configure_err(stderr.trim().to_string()));
    }

    Ok(())
}
