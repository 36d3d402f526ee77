//! Optional YAML configuration file.
//!
//! Supplies defaults for options not given on the command line:
//!
//! ```yaml
//! mtu: 512
//! smp_version: 2
//! timeout_ms: 5000
//! retries: 5
//! uart:
//!   port_name: /dev/ttyACM0
//!   baud: 1000000
//! udp:
//!   host: 192.0.2.1
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use smp_transport::{UartConfig, UdpConfig};
use tracing::debug;

use crate::error::{CliError, ExitCode, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub mtu: Option<u16>,
    /// 1 or 2.
    #[serde(default)]
    pub smp_version: Option<u8>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retries: Option<u8>,
    #[serde(default)]
    pub uart: Option<UartConfig>,
    #[serde(default)]
    pub udp: Option<UdpConfig>,
}

impl FileConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| {
            CliError::new(
                ExitCode::InvalidArgumentValue,
                format!("Error: invalid configuration file: {e}"),
            )
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            CliError::new(
                ExitCode::InvalidArgumentValue,
                format!("Error: cannot read {}: {e}", path.display()),
            )
        })?;
        FileConfig::from_yaml(&text)
    }
}
