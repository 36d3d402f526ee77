//! Transports whose configuration is accepted but which cannot connect.

use smp_protocol::Message;
use tracing::warn;

use crate::config::{BluetoothConfig, LoraWanConfig};
use crate::error::{Result, TransportError};
use crate::Transport;

/// A transport that validates its configuration and then refuses to connect.
///
/// Bluetooth LE and LoRaWAN are selectable on the command line so their
/// options are checked, but no GATT or MQTT client is available.
#[derive(Debug, Clone)]
pub struct UnsupportedTransport {
    name: &'static str,
    description: String,
    mtu_overhead: u16,
}

impl UnsupportedTransport {
    /// Bluetooth LE transport.
    pub fn bluetooth(config: &BluetoothConfig) -> Result<Self> {
        config.validate()?;
        let target = config
            .address
            .as_deref()
            .or(config.name.as_deref())
            .unwrap_or_default();
        Ok(UnsupportedTransport {
            name: "bluetooth",
            description: format!("Bluetooth LE device {}", target),
            // ATT write header
            mtu_overhead: 3,
        })
    }

    /// LoRaWAN transport through an MQTT network server.
    pub fn lorawan(config: &LoraWanConfig) -> Result<Self> {
        config.validate()?;
        Ok(UnsupportedTransport {
            name: "lorawan",
            description: format!(
                "LoRaWAN via {}:{} ({})",
                config.host,
                config.effective_port(),
                if config.tls { "TLS" } else { "plain" }
            ),
            mtu_overhead: 0,
        })
    }
}

impl Transport for UnsupportedTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    fn connect(&mut self) -> Result<()> {
        warn!("Cannot connect to {}", self.description);
        Err(TransportError::Unsupported(format!(
            "{} transport is not available",
            self.name
        )))
    }

    fn disconnect(&mut self, force: bool) -> Result<()> {
        if force {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn send(&mut self, _message: &Message) -> Result<()> {
        Err(TransportError::NotConnected)
    }

    fn max_message_data_size(&self, mtu: u16) -> u16 {
        mtu.saturating_sub(self.mtu_overhead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bluetooth_refuses_connect() {
        let config = BluetoothConfig {
            name: None,
            address: Some("C0:FF:EE:00:11:22".to_string()),
        };
        let mut transport = UnsupportedTransport::bluetooth(&config).unwrap();
        assert_eq!(transport.name(), "bluetooth");
        assert!(matches!(
            transport.connect(),
            Err(TransportError::Unsupported(_))
        ));
        assert!(!transport.is_connected());
        assert_eq!(transport.max_message_data_size(256), 253);
    }

    #[test]
    fn test_invalid_config_rejected_first() {
        assert!(matches!(
            UnsupportedTransport::bluetooth(&BluetoothConfig::default()),
            Err(TransportError::InvalidConfiguration(_))
        ));
    }
}
