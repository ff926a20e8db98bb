use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// A connected link to the motor-control board. Implements Read + Write.
///
/// This is the fundamental I/O type returned by [`Connector::open`].
/// On a real rig it wraps a serial port; simulators and tests use a
/// Unix domain socket stream instead.
pub struct LinkStream {
    inner: LinkStreamInner,
    label: String,
}

enum LinkStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(feature = "serial")]
    Serial(Box<dyn serialport::SerialPort>),
}

/// Serial ports have no "block forever" timeout; reads wait this long instead.
#[cfg(feature = "serial")]
const SERIAL_BLOCKING_TIMEOUT: Duration = Duration::from_secs(3600);

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port.flush(),
        }
    }
}

impl LinkStream {
    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream, label: impl Into<String>) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
            label: label.into(),
        }
    }

    /// Wrap an opened serial port.
    #[cfg(feature = "serial")]
    pub fn from_serial(port: Box<dyn serialport::SerialPort>, label: impl Into<String>) -> Self {
        Self {
            inner: LinkStreamInner::Serial(port),
            label: label.into(),
        }
    }

    /// Port name or path this link was opened from.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Set read timeout on the underlying stream.
    ///
    /// Serial ports share one timeout for reads and writes; this one wins.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => port
                .set_timeout(timeout.unwrap_or(SERIAL_BLOCKING_TIMEOUT))
                .map_err(|err| std::io::Error::from(err).into()),
        }
    }

    /// Set write timeout on the underlying stream (no-op for serial ports).
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(_) => {
                tracing::debug!(?timeout, "serial links ignore the write timeout");
                Ok(())
            }
        }
    }

    /// Try to clone this stream so one half can read while the other writes.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => LinkStreamInner::Unix(stream.try_clone()?),
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(port) => LinkStreamInner::Serial(
                port.try_clone().map_err(std::io::Error::from)?,
            ),
        };
        Ok(Self {
            inner,
            label: self.label.clone(),
        })
    }

    /// Best-effort close of both directions, waking a blocked reader.
    pub fn shutdown(&self) {
        match &self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(_) => {}
        }
    }

    /// Transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix",
            #[cfg(feature = "serial")]
            LinkStreamInner::Serial(_) => "serial",
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("type", &self.kind())
            .field("label", &self.label)
            .finish()
    }
}

/// Opens links by port name.
///
/// The session only ever learns a port string (from `PORTSELECT`); the
/// connector decides what kind of link that string names.
pub trait Connector: Send + 'static {
    /// Open a fresh link to `port`.
    fn open(&self, port: &str) -> Result<LinkStream>;

    /// Connector name for diagnostics.
    fn name(&self) -> &'static str;
}

impl<F> Connector for F
where
    F: Fn(&str) -> Result<LinkStream> + Send + 'static,
{
    fn open(&self, port: &str) -> Result<LinkStream> {
        self(port)
    }

    fn name(&self) -> &'static str {
        "custom"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{ErrorKind, Read, Write};
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    use super::*;
    use crate::error::TransportError;

    #[test]
    fn clone_shares_the_same_link() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut link = LinkStream::from_unix(left, "pair");
        let mut reader = link.try_clone().unwrap();
        let mut peer = right;

        link.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
        assert_eq!(reader.label(), "pair");
        assert_eq!(reader.kind(), "unix");
    }

    #[test]
    fn read_timeout_surfaces_as_would_block() {
        let (left, _right) = UnixStream::pair().unwrap();
        let mut link = LinkStream::from_unix(left, "pair");
        link.set_read_timeout(Some(Duration::from_millis(10))).unwrap();

        let mut buf = [0u8; 8];
        let err = link.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));
    }

    #[test]
    fn shutdown_wakes_reader_with_eof() {
        let (left, _right) = UnixStream::pair().unwrap();
        let link = LinkStream::from_unix(left, "pair");
        let mut reader = link.try_clone().unwrap();

        link.shutdown();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn closure_connector_opens_links() {
        let connector = |port: &str| -> Result<LinkStream> {
            if port.is_empty() {
                return Err(TransportError::NoPort);
            }
            let (left, _right) = UnixStream::pair()?;
            Ok(LinkStream::from_unix(left, port))
        };

        assert!(matches!(connector.open(""), Err(TransportError::NoPort)));
        let link = connector.open("sim0").unwrap();
        assert_eq!(link.label(), "sim0");
        assert_eq!(connector.name(), "custom");
    }

    #[test]
    fn debug_output_names_kind_and_label() {
        let (left, _right) = UnixStream::pair().unwrap();
        let link = LinkStream::from_unix(left, "sim1");
        let dbg = format!("{link:?}");
        assert!(dbg.contains("unix"));
        assert!(dbg.contains("sim1"));
    }
}
