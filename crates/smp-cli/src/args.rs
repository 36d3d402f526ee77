//! Command-line grammar.
//!
//! One flat set of options shared by the process command line and each
//! interactive line. Numbers and enumerated values are kept as text here and
//! checked when the invocation is built, so each problem gets its own exit
//! code.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{ArgAction, Parser};

use crate::error::{CliError, ExitCode, Result};

/// Simple Management Protocol client.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "smpmgmt", version, about)]
pub struct Args {
    /// Transport: uart, bluetooth, udp or lorawan.
    #[arg(long)]
    pub transport: Option<String>,
    /// Management group, e.g. img, os, fs.
    #[arg(long)]
    pub group: Option<String>,
    /// Command within the group.
    #[arg(long)]
    pub command: Option<String>,

    /// YAML file with default settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Read further invocations from standard input, one per line.
    #[arg(long)]
    pub interactive: bool,
    /// Leave interactive mode.
    #[arg(long)]
    pub quit: bool,
    /// More log output (-v, -vv).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// SMP MTU (96-16384).
    #[arg(long)]
    pub mtu: Option<String>,
    #[arg(long, conflicts_with = "smp_v2")]
    pub smp_v1: bool,
    #[arg(long)]
    pub smp_v2: bool,
    /// Response timeout in milliseconds; never lowers the transport default.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Retransmissions before a request times out.
    #[arg(long)]
    pub retries: Option<String>,

    /// Serial port name (uart) or port number (udp, lorawan).
    #[arg(long)]
    pub port: Option<String>,
    #[arg(long)]
    pub baud: Option<String>,
    /// none, hardware or software.
    #[arg(long)]
    pub flow_control: Option<String>,
    /// none, even or odd.
    #[arg(long)]
    pub parity: Option<String>,
    /// 7 or 8.
    #[arg(long)]
    pub data_bits: Option<String>,
    /// 1 or 2.
    #[arg(long)]
    pub stop_bits: Option<String>,

    /// Bluetooth device name, or statistics group name.
    #[arg(long)]
    pub name: Option<String>,
    /// Bluetooth device address.
    #[arg(long)]
    pub address: Option<String>,
    /// UDP or MQTT host.
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    /// MQTT topic of the device.
    #[arg(long)]
    pub topic: Option<String>,
    /// LoRaWAN application port.
    #[arg(long)]
    pub frame_port: Option<String>,
    #[arg(long)]
    pub no_tls: bool,

    /// Image file to upload.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Image number.
    #[arg(long)]
    pub image: Option<String>,
    #[arg(long)]
    pub upgrade: bool,
    /// Upload mode: normal, test or confirm.
    #[arg(long)]
    pub mode: Option<String>,
    /// Reset the device after the upload.
    #[arg(long)]
    pub reset: bool,
    /// Image hash (hex), or hash/checksum type for fs.
    #[arg(long, visible_alias = "checksum")]
    pub hash: Option<String>,
    #[arg(long)]
    pub confirm: bool,
    #[arg(long)]
    pub slot: Option<String>,

    /// Echo text.
    #[arg(long)]
    pub data: Option<String>,
    #[arg(long)]
    pub force: bool,
    /// Application info format characters.
    #[arg(long)]
    pub format: Option<String>,
    /// RFC 3339 or ISO 8601 date and time.
    #[arg(long)]
    pub datetime: Option<String>,
    /// Bootloader info query.
    #[arg(long)]
    pub query: Option<String>,

    #[arg(long)]
    pub local_file: Option<PathBuf>,
    #[arg(long)]
    pub remote_file: Option<String>,

    /// Group index (enum single).
    #[arg(long)]
    pub index: Option<String>,
    /// Comma separated group IDs (enum details).
    #[arg(long)]
    pub groups: Option<String>,

    /// Shell command line.
    #[arg(long)]
    pub cmd: Option<String>,

    #[arg(long)]
    pub key: Option<String>,
    /// Setting value (hex).
    #[arg(long)]
    pub value: Option<String>,
    #[arg(long)]
    pub max_length: Option<String>,
}

/// Parse a full argument vector, program name first.
pub fn parse_args<I, T>(words: I) -> Result<Args>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Args::try_parse_from(words).map_err(|err| match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            CliError::new(ExitCode::Success, err.to_string())
        }
        ErrorKind::UnknownArgument => {
            let argument = match err.get(ContextKind::InvalidArg) {
                Some(ContextValue::String(argument)) => argument.clone(),
                _ => err.to_string().trim().to_string(),
            };
            CliError::new(
                ExitCode::UnknownArguments,
                format!("Unknown arguments provided: {argument}"),
            )
        }
        _ => CliError::new(ExitCode::InvalidArgumentValue, err.to_string().trim().to_string()),
    })
}

/// Parse one interactive line with shell-style quoting.
pub fn parse_line(line: &str) -> Result<Args> {
    let words = shlex::split(line).ok_or_else(|| {
        CliError::new(ExitCode::InvalidArgumentValue, "Error: unbalanced quotes")
    })?;
    parse_args(std::iter::once("smpmgmt".to_string()).chain(words))
}
