//! UDP transport: one SMP packet per datagram.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use smp_protocol::Message;
use tracing::{debug, error, info, trace, warn};

use crate::config::UdpConfig;
use crate::error::{Result, TransportError};
use crate::event::{EventSender, TransportEvent};
use crate::Transport;

const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Largest datagram accepted from the device.
const MAX_DATAGRAM: usize = 65_535;

struct Reader {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// SMP over UDP.
pub struct UdpTransport {
    config: Option<UdpConfig>,
    events: EventSender,
    socket: Option<UdpSocket>,
    reader: Option<Reader>,
}

impl UdpTransport {
    pub fn new(events: EventSender) -> Self {
        UdpTransport {
            config: None,
            events,
            socket: None,
            reader: None,
        }
    }

    /// Set the connection parameters. Not allowed while connected.
    pub fn set_config(&mut self, config: UdpConfig) -> Result<()> {
        if self.socket.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        self.config = Some(config);
        Ok(())
    }

    fn resolve(config: &UdpConfig) -> Result<SocketAddr> {
        (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| TransportError::OpenFailed(format!("{}: {}", config.host, e)))?
            .next()
            .ok_or_else(|| {
                TransportError::OpenFailed(format!("{}: no address found", config.host))
            })
    }

    fn spawn_reader(&self, socket: UdpSocket) -> Result<Reader> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let events = self.events.clone();

        let handle = thread::Builder::new()
            .name("smp-udp-reader".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; MAX_DATAGRAM];

                while !thread_stop.load(Ordering::Acquire) {
                    match socket.recv(&mut buf) {
                        Ok(n) => match Message::from_bytes(&buf[..n]) {
                            Ok(message) => {
                                if events.send(TransportEvent::Message(message)).is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!("Dropping invalid SMP datagram: {}", e),
                        },
                        Err(e)
                            if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                        // ICMP port unreachable from a previous send; the device may come up later.
                        Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                            debug!("UDP peer refused datagram");
                        }
                        Err(e) => {
                            error!("UDP receive error: {}", e);
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
}

impl Transport for UdpTransport {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn connect(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let config = self.config.as_ref().ok_or_else(|| {
            TransportError::InvalidConfiguration("UDP configuration not set".to_string())
        })?;
        config.validate()?;

        let remote = Self::resolve(config)?;
        let local: SocketAddr = if remote.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let open_failed = |e: std::io::Error| TransportError::OpenFailed(e.to_string());
        let socket = UdpSocket::bind(local).map_err(open_failed)?;
        socket.connect(remote).map_err(open_failed)?;
        socket
            .set_read_timeout(Some(READ_POLL_INTERVAL))
            .map_err(open_failed)?;
        let reader_socket = socket.try_clone().map_err(open_failed)?;

        self.reader = Some(self.spawn_reader(reader_socket)?);
        info!("UDP connected to {}", remote);
        self.socket = Some(socket);
        Ok(())
    }

    fn disconnect(&mut self, force: bool) -> Result<()> {
        if self.socket.is_none() && self.reader.is_none() {
            return if force {
                Ok(())
            } else {
                Err(TransportError::NotConnected)
            };
        }

        if let Some(reader) = self.reader.take() {
            reader.stop.store(true, Ordering::Release);
            if reader.handle.join().is_err() {
                warn!("UDP reader thread panicked");
            }
        }
        self.socket = None;
        debug!("UDP disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
            && self
                .reader
                .as_ref()
                .is_some_and(|reader| !reader.handle.is_finished())
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(TransportError::NotConnected)?;
        trace!(
            "UDP tx group {} command {} seq {}",
            message.group(),
            message.command(),
            message.sequence()
        );
        socket.send(&message.to_bytes())?;
        Ok(())
    }

    fn max_message_data_size(&self, mtu: u16) -> u16 {
        mtu
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        let _ = self.disconnect(true);
    }
}
