//! UART transport.
//!
//! Writes framed packets to a serial port and runs a reader thread that
//! feeds received bytes through the shared [`FrameCodec`].

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serialport::SerialPort;
use smp_protocol::Message;
use smp_uart::{max_message_data_size, FrameCodec};
use tracing::{debug, error, info, trace, warn};

use crate::config::{DataBits, FlowControl, Parity, StopBits, UartConfig};
use crate::error::{Result, TransportError};
use crate::event::{EventSender, TransportEvent};
use crate::Transport;

/// How long a blocking read waits before checking for shutdown.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

const READ_BUFFER_SIZE: usize = 1024;

/// Reader thread and its stop flag.
struct Reader {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// SMP over a serial port.
pub struct UartTransport {
    config: Option<UartConfig>,
    events: EventSender,
    codec: Arc<Mutex<FrameCodec>>,
    port: Option<Box<dyn SerialPort>>,
    reader: Option<Reader>,
    /// Cleared by the reader thread when the port fails.
    alive: Arc<AtomicBool>,
}

impl UartTransport {
    /// Create an unconfigured UART transport publishing to `events`.
    pub fn new(events: EventSender) -> Self {
        UartTransport {
            config: None,
            events,
            codec: Arc::new(Mutex::new(FrameCodec::new())),
            port: None,
            reader: None,
            alive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the connection parameters. Not allowed while connected.
    pub fn set_config(&mut self, config: UartConfig) -> Result<()> {
        if self.port.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        self.config = Some(config);
        Ok(())
    }

    /// Current connection parameters.
    pub fn config(&self) -> Option<&UartConfig> {
        self.config.as_ref()
    }

    fn open(config: &UartConfig) -> Result<Box<dyn SerialPort>> {
        let data_bits = match config.data_bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        };
        let parity = match config.parity {
            Parity::None => serialport::Parity::None,
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
            other => {
                return Err(TransportError::InvalidConfiguration(format!(
                    "{} parity is not supported by this serial backend",
                    other
                )))
            }
        };
        let stop_bits = match config.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
            StopBits::OnePointFive => {
                return Err(TransportError::InvalidConfiguration(
                    "1.5 stop bits are not supported by this serial backend".to_string(),
                ))
            }
        };
        let flow_control = match config.flow_control {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
            FlowControl::Software => serialport::FlowControl::Software,
        };

        let mut port = serialport::new(config.port_name.as_str(), config.baud)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .timeout(READ_POLL_INTERVAL)
            .open()
            .map_err(|e| TransportError::OpenFailed(format!("{}: {}", config.port_name, e)))?;

        if config.flow_control != FlowControl::Hardware {
            port.write_request_to_send(true)
                .map_err(|e| TransportError::OpenFailed(format!("failed to assert RTS: {}", e)))?;
        }

        Ok(port)
    }

    fn spawn_reader(&self, mut port: Box<dyn SerialPort>) -> Result<Reader> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let alive = Arc::clone(&self.alive);
        let codec = Arc::clone(&self.codec);
        let events = self.events.clone();

        let handle = thread::Builder::new()
            .name("smp-uart-reader".to_string())
            .spawn(move || {
                let mut buf = [0u8; READ_BUFFER_SIZE];

                while !thread_stop.load(Ordering::Acquire) {
                    match port.read(&mut buf) {
                        Ok(0) => {}
                        Ok(n) => {
                            trace!("UART rx {} bytes", n);
                            let messages = codec.lock().feed(&buf[..n]);
                            for message in messages {
                                if events.send(TransportEvent::Message(message)).is_err() {
                                    debug!("Event receiver dropped, stopping UART reader");
                                    return;
                                }
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::TimedOut => {}
                        Err(e) if e.kind() == ErrorKind::Interrupted => {}
                        Err(e) => {
                            error!("UART read error: {}", e);
                            alive.store(false, Ordering::Release);
                            let _ = events.send(TransportEvent::Error(e.to_string()));
                            let _ = events.send(TransportEvent::Disconnected);
                            return;
                        }
                    }
                }
            })
            .map_err(|e| TransportError::OpenFailed(format!("failed to start reader: {}", e)))?;

        Ok(Reader { stop, handle })
    }

    /// Stop the reader, drop the port and forget any partial packet.
    fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop.store(true, Ordering::Release);
            if reader.handle.join().is_err() {
                warn!("UART reader thread panicked");
            }
        }

        self.port = None;
        self.alive.store(false, Ordering::Release);
        self.codec.lock().reset();
    }
}

impl Transport for UartTransport {
    fn name(&self) -> &'static str {
        "uart"
    }

    fn connect(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let config = self.config.as_ref().ok_or_else(|| {
            TransportError::InvalidConfiguration("UART configuration not set".to_string())
        })?;
        config.validate()?;

        let port = Self::open(config)?;
        let reader_port = port
            .try_clone()
            .map_err(|e| TransportError::OpenFailed(format!("failed to clone port: {}", e)))?;

        self.codec.lock().reset();
        self.alive.store(true, Ordering::Release);
        self.reader = Some(self.spawn_reader(reader_port)?);

        info!(
            "Opened {} at {} baud ({} data bits, {} parity, {} stop bits, {} flow control)",
            config.port_name,
            config.baud,
            config.data_bits,
            config.parity,
            config.stop_bits,
            config.flow_control
        );

        self.port = Some(port);
        Ok(())
    }

    fn disconnect(&mut self, force: bool) -> Result<()> {
        let open = self.port.is_some() || self.reader.is_some();
        if !open && !force {
            return Err(TransportError::NotConnected);
        }

        self.close();
        if open {
            debug!("UART disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some() && self.alive.load(Ordering::Acquire)
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(TransportError::NotConnected);
        }
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;

        let frames = FrameCodec::encode_message(message);
        trace!(
            "UART tx group {} command {} seq {} in {} frame(s)",
            message.group(),
            message.command(),
            message.sequence(),
            frames.len()
        );

        for frame in &frames {
            port.write_all(frame)?;
        }
        port.flush()?;
        Ok(())
    }

    fn max_message_data_size(&self, mtu: u16) -> u16 {
        max_message_data_size(mtu)
    }
}

impl Drop for UartTransport {
    fn drop(&mut self) {
        let _ = self.disconnect(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_channel;

    #[test]
    fn test_connect_without_config() {
        let (tx, _rx) = event_channel();
        let mut transport = UartTransport::new(tx);
        assert!(matches!(
            transport.connect(),
            Err(TransportError::InvalidConfiguration(_))
        ));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_connect_rejects_empty_port() {
        let (tx, _rx) = event_channel();
        let mut transport = UartTransport::new(tx);
        transport.set_config(UartConfig::new("")).unwrap();
        assert!(matches!(
            transport.connect(),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_unsupported_line_settings() {
        let mut config = UartConfig::new("/dev/does-not-exist");
        config.stop_bits = StopBits::OnePointFive;
        assert!(matches!(
            UartTransport::open(&config),
            Err(TransportError::InvalidConfiguration(_))
        ));

        config.stop_bits = StopBits::One;
        config.parity = Parity::Mark;
        assert!(matches!(
            UartTransport::open(&config),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_disconnect_when_closed() {
        let (tx, _rx) = event_channel();
        let mut transport = UartTransport::new(tx);
        assert_eq!(transport.disconnect(false), Err(TransportError::NotConnected));
        assert_eq!(transport.disconnect(true), Ok(()));
    }

    #[test]
    fn test_disconnect_resets_codec() {
        let (tx, _rx) = event_channel();
        let mut transport = UartTransport::new(tx);

        let frames = FrameCodec::encode(&[0x11; 200]);
        let mut codec = transport.codec.lock();
        assert!(codec.feed_packets(&frames[0]).is_empty());
        codec.feed_packets(&frames[1][..4]);
        assert!(codec.is_awaiting_continuation());
        drop(codec);

        assert_eq!(transport.disconnect(true), Ok(()));
        let codec = transport.codec.lock();
        assert!(!codec.is_awaiting_continuation());
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_send_when_closed() {
        let (tx, _rx) = event_channel();
        let mut transport = UartTransport::new(tx);
        let message = Message::new(
            smp_protocol::Op::Read,
            smp_protocol::Version::V2,
            smp_protocol::GROUP_OS,
            smp_protocol::OS_CMD_TASK_STATS,
            Vec::new(),
        );
        assert_eq!(transport.send(&message), Err(TransportError::NotConnected));
    }

    #[test]
    fn test_max_message_data_size_uses_framing() {
        let (tx, _rx) = event_channel();
        let transport = UartTransport::new(tx);
        assert_eq!(transport.max_message_data_size(256), 179);
    }
}
