use std::io;

/// Byte-level access to the local controller's serial line.
///
/// The serial bridge only ever polls: it asks how many bytes are buffered and
/// reads no more than that, so no call blocks waiting for the device.
pub trait SerialIo: Send {
    /// Write one complete outbound line and flush it.
    fn write_line(&mut self, line: &[u8]) -> io::Result<()>;

    /// Number of bytes already received and waiting to be read.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read buffered bytes into `buf`.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Drop anything received before the bridge started.
    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(feature = "serial")]
pub use device::{SerialConfig, SerialDevice};

#[cfg(feature = "serial")]
mod device {
    use std::io::{self, Read, Write};
    use std::time::Duration;

    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
    use tracing::{debug, info};

    use super::SerialIo;
    use crate::error::{Result, TransportError};

    /// Serial line settings.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SerialConfig {
        /// Device path, e.g. `/dev/serial0`.
        pub path: String,
        /// Line speed. The controller firmware runs at 115200.
        pub baud_rate: u32,
        /// Upper bound for a single read of already-buffered bytes.
        pub read_timeout: Duration,
    }

    impl Default for SerialConfig {
        fn default() -> Self {
            Self {
                path: "/dev/serial0".to_string(),
                baud_rate: 115_200,
                read_timeout: Duration::from_millis(100),
            }
        }
    }

    /// An open 8N1 serial device.
    pub struct SerialDevice {
        port: Box<dyn SerialPort>,
        path: String,
    }

    impl SerialDevice {
        /// Open the device described by `config`.
        pub fn open(config: &SerialConfig) -> Result<Self> {
            let port = serialport::new(&config.path, config.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(config.read_timeout)
                .open()
                .map_err(|source| TransportError::Serial {
                    path: config.path.clone(),
                    source,
                })?;

            info!(path = %config.path, baud = config.baud_rate, "opened serial device");
            Ok(Self {
                port,
                path: config.path.clone(),
            })
        }

        /// Device path this handle was opened from.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl SerialIo for SerialDevice {
        fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
            self.port.write_all(line)?;
            self.port.flush()
        }

        fn bytes_available(&mut self) -> io::Result<usize> {
            Ok(self.port.bytes_to_read().map_err(io::Error::from)? as usize)
        }

        fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.port.read(buf) {
                Ok(n) => Ok(n),
                Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
                Err(err) => Err(err),
            }
        }

        fn clear_input(&mut self) -> io::Result<()> {
            debug!(path = %self.path, "clearing serial input buffer");
            self.port
                .clear(ClearBuffer::Input)
                .map_err(io::Error::from)
        }
    }

    impl std::fmt::Debug for SerialDevice {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SerialDevice")
                .field("path", &self.path)
                .finish()
        }
    }

}
