use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Connector, LinkStream};

/// Line settings for a serial link to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    /// Baud rate (default 115200).
    pub baud_rate: u32,
    /// Read timeout applied when the port is opened.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Opens serial ports by device name (`/dev/ttyUSB0`, `COM3`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Connector for SerialConnector {
    fn open(&self, port: &str) -> Result<LinkStream> {
        if port.is_empty() {
            return Err(TransportError::NoPort);
        }
        let handle = serialport::new(port, self.config.baud_rate)
            .timeout(self.config.timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: port.to_string(),
                source: e.into(),
            })?;
        debug!(port, baud = self.config.baud_rate, "serial port opened");
        Ok(LinkStream::from_serial(handle, port))
    }

    fn name(&self) -> &'static str {
        "serial"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_board_firmware() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(SerialConnector::default().config(), &config);
    }

    #[test]
    fn empty_port_is_rejected_before_opening() {
        let connector = SerialConnector::new(SerialConfig::default());
        assert!(matches!(connector.open(""), Err(TransportError::NoPort)));
    }

    #[test]
    fn missing_device_reports_port_name() {
        let connector = SerialConnector::default();
        let err = connector.open("/dev/hexlink-does-not-exist").unwrap_err();
        assert!(
            matches!(err, TransportError::Open { ref port, .. } if port == "/dev/hexlink-does-not-exist")
        );
    }
}
