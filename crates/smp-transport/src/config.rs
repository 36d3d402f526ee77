//! Transport configuration types.
//!
//! Enumerated serial settings parse from the same strings the command line
//! and the configuration file use (`"hardware"`, `"1.5"`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};

/// Default UART baud rate.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default UDP port of the SMP server on the device.
pub const DEFAULT_UDP_PORT: u16 = 1337;

/// Default MQTT port with TLS.
pub const DEFAULT_LORAWAN_TLS_PORT: u16 = 8883;

/// Default MQTT port without TLS.
pub const DEFAULT_LORAWAN_PLAIN_PORT: u16 = 1883;

/// Error returned when an enumerated setting does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSettingError {
    setting: &'static str,
    value: String,
}

impl fmt::Display for ParseSettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} value: {}", self.setting, self.value)
    }
}

impl std::error::Error for ParseSettingError {}

macro_rules! setting_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $setting:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl FromStr for $name {
            type Err = ParseSettingError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ParseSettingError {
                        setting: $setting,
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($name::$variant => f.write_str($text),)+
                }
            }
        }
    };
}

setting_enum! {
    /// UART flow control.
    FlowControl, "flow control" {
        #[default]
        None => "none",
        Hardware => "hardware",
        Software => "software",
    }
}

setting_enum! {
    /// UART parity.
    Parity, "parity" {
        #[default]
        None => "none",
        Even => "even",
        Odd => "odd",
        Space => "space",
        Mark => "mark",
    }
}

setting_enum! {
    /// UART data bits per character.
    DataBits, "data bits" {
        Seven => "7",
        #[default]
        Eight => "8",
    }
}

setting_enum! {
    /// UART stop bits.
    StopBits, "stop bits" {
        #[default]
        One => "1",
        OnePointFive => "1.5",
        Two => "2",
    }
}

/// UART connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UartConfig {
    /// Serial port name, e.g. `/dev/ttyACM0` or `COM3`.
    pub port_name: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default)]
    pub flow_control: FlowControl,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub data_bits: DataBits,
    #[serde(default)]
    pub stop_bits: StopBits,
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

impl UartConfig {
    /// Create a configuration with default line settings.
    pub fn new(port_name: impl Into<String>) -> Self {
        UartConfig {
            port_name: port_name.into(),
            baud: DEFAULT_BAUD,
            flow_control: FlowControl::default(),
            parity: Parity::default(),
            data_bits: DataBits::default(),
            stop_bits: StopBits::default(),
        }
    }

    /// Check the configuration before opening the port.
    pub fn validate(&self) -> Result<()> {
        if self.port_name.trim().is_empty() {
            return Err(TransportError::InvalidConfiguration(
                "no serial port given".to_string(),
            ));
        }
        if self.baud == 0 {
            return Err(TransportError::InvalidConfiguration(
                "baud rate must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// UDP connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Host name or address of the device.
    pub host: String,
    #[serde(default = "default_udp_port")]
    pub port: u16,
}

fn default_udp_port() -> u16 {
    DEFAULT_UDP_PORT
}

impl UdpConfig {
    /// Create a configuration for the default SMP port.
    pub fn new(host: impl Into<String>) -> Self {
        UdpConfig {
            host: host.into(),
            port: DEFAULT_UDP_PORT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidConfiguration(
                "no UDP host given".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(TransportError::InvalidConfiguration(
                "UDP port must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bluetooth LE device selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothConfig {
    /// Advertised device name.
    #[serde(default)]
    pub name: Option<String>,
    /// Device address.
    #[serde(default)]
    pub address: Option<String>,
}

impl BluetoothConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_none() && self.address.is_none() {
            return Err(TransportError::InvalidConfiguration(
                "a Bluetooth device name or address is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// LoRaWAN (via an MQTT network server) connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoraWanConfig {
    pub host: String,
    /// MQTT port; defaults to 8883 with TLS and 1883 without.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub topic: String,
    /// LoRaWAN application port used for SMP.
    #[serde(default = "default_frame_port")]
    pub frame_port: u8,
    #[serde(default = "default_tls")]
    pub tls: bool,
}

fn default_frame_port() -> u8 {
    2
}

fn default_tls() -> bool {
    true
}

impl LoraWanConfig {
    /// Port to connect to, falling back to the TLS or plain default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.tls {
            DEFAULT_LORAWAN_TLS_PORT
        } else {
            DEFAULT_LORAWAN_PLAIN_PORT
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidConfiguration(
                "no MQTT host given".to_string(),
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(TransportError::InvalidConfiguration(
                "no MQTT topic given".to_string(),
            ));
        }
        // Application ports above 223 are reserved by LoRaWAN.
        if self.frame_port == 0 || self.frame_port > 223 {
            return Err(TransportError::InvalidConfiguration(format!(
                "frame port {} outside 1-223",
                self.frame_port
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        assert_eq!("hardware".parse::<FlowControl>(), Ok(FlowControl::Hardware));
        assert_eq!("mark".parse::<Parity>(), Ok(Parity::Mark));
        assert_eq!("7".parse::<DataBits>(), Ok(DataBits::Seven));
        assert_eq!("1.5".parse::<StopBits>(), Ok(StopBits::OnePointFive));
        assert!("9".parse::<DataBits>().is_err());
        assert!("rts".parse::<FlowControl>().is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for stop in [StopBits::One, StopBits::OnePointFive, StopBits::Two] {
            assert_eq!(stop.to_string().parse::<StopBits>(), Ok(stop));
        }
    }

    #[test]
    fn test_uart_defaults() {
        let config = UartConfig::new("/dev/ttyACM0");
        assert_eq!(config.baud, 115_200);
        assert_eq!(config.flow_control, FlowControl::None);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_uart_validation() {
        assert!(matches!(
            UartConfig::new("").validate(),
            Err(TransportError::InvalidConfiguration(_))
        ));

        let mut config = UartConfig::new("COM3");
        config.baud = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lorawan_port_defaults() {
        let mut config = LoraWanConfig {
            host: "eu1.cloud.example".to_string(),
            port: None,
            username: None,
            password: None,
            topic: "v3/app/devices/dev/down/push".to_string(),
            frame_port: 2,
            tls: true,
        };
        assert_eq!(config.effective_port(), 8883);
        config.tls = false;
        assert_eq!(config.effective_port(), 1883);
        config.port = Some(1999);
        assert_eq!(config.effective_port(), 1999);
        assert!(config.validate().is_ok());

        config.frame_port = 224;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bluetooth_needs_name_or_address() {
        assert!(BluetoothConfig::default().validate().is_err());
        let config = BluetoothConfig {
            name: Some("Zephyr".to_string()),
            address: None,
        };
        assert!(config.validate().is_ok());
    }
}
