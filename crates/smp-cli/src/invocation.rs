//! Turn parsed arguments into a transport, a command and session settings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime};
use smp_client::{ActiveGroup, Command, SessionConfig, UploadMode};
use smp_protocol::{Version, DEFAULT_SMP_MTU, MAX_SMP_MTU, MIN_SMP_MTU};
use smp_transport::{
    event_channel, BluetoothConfig, DataBits, EventReceiver, LoraWanConfig, StopBits, Transport,
    TransportError, UartConfig, UartTransport, UdpConfig, UdpTransport, UnsupportedTransport,
};

use crate::args::Args;
use crate::config::FileConfig;
use crate::error::{CliError, ExitCode, Result};

/// Which transport to open, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    Uart(UartConfig),
    Udp(UdpConfig),
    Bluetooth(BluetoothConfig),
    LoraWan(LoraWanConfig),
}

impl TransportSpec {
    /// Create the transport with its event channel. The transport is not
    /// connected yet.
    pub fn open(&self) -> std::result::Result<(Box<dyn Transport>, EventReceiver), TransportError> {
        let (tx, rx) = event_channel();
        let transport: Box<dyn Transport> = match self {
            TransportSpec::Uart(config) => {
                let mut transport = UartTransport::new(tx);
                transport.set_config(config.clone())?;
                Box::new(transport)
            }
            TransportSpec::Udp(config) => {
                let mut transport = UdpTransport::new(tx);
                transport.set_config(config.clone())?;
                Box::new(transport)
            }
            TransportSpec::Bluetooth(config) => Box::new(UnsupportedTransport::bluetooth(config)?),
            TransportSpec::LoraWan(config) => Box::new(UnsupportedTransport::lorawan(config)?),
        };
        Ok((transport, rx))
    }
}

/// Everything needed to run one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub transport: TransportSpec,
    pub command: Command,
    pub session: SessionConfig,
    /// Local file receiving the data of an fs download.
    pub download: Option<PathBuf>,
}

impl Invocation {
    /// Build an invocation. `previous` is the transport of the last
    /// interactive line and is reused when `--transport` is omitted.
    pub fn build(args: &Args, file: &FileConfig, previous: Option<&TransportSpec>) -> Result<Self> {
        need(&[
            ("transport", args.transport.is_some() || previous.is_some()),
            ("group", args.group.is_some()),
            ("command", args.command.is_some()),
        ])?;

        let session = session_config(args, file)?;
        let transport = match (args.transport.as_deref(), previous) {
            (Some(name), _) => transport_spec(name, args, file)?,
            (None, Some(previous)) => previous.clone(),
            (None, None) => return Err(CliError::missing("transport")),
        };

        let group_name = args.group.as_deref().unwrap_or_default();
        let group = group_by_name(group_name).ok_or_else(|| {
            CliError::new(ExitCode::InvalidGroup, "Error: invalid group specified")
        })?;
        let command_name = args.command.as_deref().unwrap_or_default();
        let command = build_command(group, command_name, args)?;
        let download = match command {
            Command::FsDownload { .. } => args.local_file.clone(),
            _ => None,
        };

        Ok(Invocation {
            transport,
            command,
            session,
            download,
        })
    }
}

/// Fail with every missing option listed, one per line.
fn need(options: &[(&str, bool)]) -> Result<()> {
    let missing: Vec<String> = options
        .iter()
        .filter(|(_, present)| !present)
        .map(|(option, _)| CliError::missing(option).message)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CliError::new(ExitCode::MissingRequiredArguments, missing.join("\n")))
    }
}

fn number<T: TryFrom<u64>>(option: &str, value: &str) -> Result<T> {
    let parsed: u64 = value
        .trim()
        .parse()
        .map_err(|_| CliError::not_numeric(option, value))?;
    T::try_from(parsed).map_err(|_| CliError::out_of_range(option, value))
}

fn optional_number<T: TryFrom<u64>>(option: &str, value: Option<&str>) -> Result<Option<T>> {
    value.map(|value| number(option, value)).transpose()
}

fn hex_bytes(option: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim()).map_err(|_| CliError::invalid_value(option, value))
}

fn read_file(path: &Path) -> Result<Arc<Vec<u8>>> {
    std::fs::read(path).map(Arc::new).map_err(|e| {
        CliError::new(
            ExitCode::InvalidArgumentValue,
            format!("Error: cannot read {}: {e}", path.display()),
        )
    })
}

fn session_config(args: &Args, file: &FileConfig) -> Result<SessionConfig> {
    let mtu = match args.mtu.as_deref() {
        Some(value) => number::<u16>("mtu", value)?,
        None => file.mtu.unwrap_or(DEFAULT_SMP_MTU),
    };
    if !(MIN_SMP_MTU..=MAX_SMP_MTU).contains(&mtu) {
        return Err(CliError::out_of_range("mtu", mtu));
    }

    let version = if args.smp_v1 {
        Version::V1
    } else if args.smp_v2 {
        Version::V2
    } else {
        match file.smp_version {
            None | Some(2) => Version::V2,
            Some(1) => Version::V1,
            Some(other) => return Err(CliError::out_of_range("smp-version", other)),
        }
    };

    let timeout = optional_number::<u64>("timeout", args.timeout.as_deref())?
        .or(file.timeout_ms)
        .map(Duration::from_millis);
    let retries = optional_number::<u8>("retries", args.retries.as_deref())?.or(file.retries);

    Ok(SessionConfig {
        version,
        mtu,
        retries,
        timeout,
    })
}

fn transport_spec(name: &str, args: &Args, file: &FileConfig) -> Result<TransportSpec> {
    match name {
        "uart" | "serial" => uart_spec(args, file).map(TransportSpec::Uart),
        "udp" => udp_spec(args, file).map(TransportSpec::Udp),
        "bluetooth" | "bt" => bluetooth_spec(args).map(TransportSpec::Bluetooth),
        "lorawan" => lorawan_spec(args).map(TransportSpec::LoraWan),
        _ => Err(CliError::new(
            ExitCode::InvalidTransport,
            "Error: invalid transport specified",
        )),
    }
}

fn uart_spec(args: &Args, file: &FileConfig) -> Result<UartConfig> {
    let mut config = match (args.port.as_deref(), file.uart.clone()) {
        (Some(port), Some(mut config)) => {
            config.port_name = port.to_string();
            config
        }
        (Some(port), None) => UartConfig::new(port),
        (None, Some(config)) => config,
        (None, None) => return Err(CliError::missing("port")),
    };

    if let Some(baud) = args.baud.as_deref() {
        config.baud = number("baud", baud)?;
        if config.baud == 0 {
            return Err(CliError::out_of_range("baud", baud));
        }
    }
    if let Some(value) = args.flow_control.as_deref() {
        config.flow_control = value
            .parse()
            .map_err(|_| CliError::invalid_value("flow-control", value))?;
    }
    if let Some(value) = args.parity.as_deref() {
        config.parity = value
            .parse()
            .map_err(|_| CliError::invalid_value("parity", value))?;
    }
    if let Some(value) = args.data_bits.as_deref() {
        let bits: u8 = number("data-bits", value)?;
        config.data_bits = match bits {
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            _ => return Err(CliError::out_of_range("data-bits", value)),
        };
    }
    if let Some(value) = args.stop_bits.as_deref() {
        config.stop_bits = value
            .parse::<StopBits>()
            .map_err(|_| CliError::out_of_range("stop-bits", value))?;
    }
    Ok(config)
}

fn udp_spec(args: &Args, file: &FileConfig) -> Result<UdpConfig> {
    let mut config = match (args.host.as_deref(), file.udp.clone()) {
        (Some(host), Some(mut config)) => {
            config.host = host.to_string();
            config
        }
        (Some(host), None) => UdpConfig::new(host),
        (None, Some(config)) => config,
        (None, None) => return Err(CliError::missing("host")),
    };
    if let Some(port) = args.port.as_deref() {
        config.port = number("port", port)?;
        if config.port == 0 {
            return Err(CliError::out_of_range("port", port));
        }
    }
    Ok(config)
}

fn bluetooth_spec(args: &Args) -> Result<BluetoothConfig> {
    if args.name.is_none() && args.address.is_none() {
        return Err(CliError::missing("name or --address"));
    }
    Ok(BluetoothConfig {
        name: args.name.clone(),
        address: args.address.clone(),
    })
}

fn lorawan_spec(args: &Args) -> Result<LoraWanConfig> {
    need(&[("host", args.host.is_some()), ("topic", args.topic.is_some())])?;
    let frame_port = match args.frame_port.as_deref() {
        Some(value) => {
            let port: u8 = number("frame-port", value)?;
            if port == 0 || port > 223 {
                return Err(CliError::out_of_range("frame-port", value));
            }
            port
        }
        None => 2,
    };
    Ok(LoraWanConfig {
        host: args.host.clone().unwrap_or_default(),
        port: optional_number("port", args.port.as_deref())?,
        username: args.username.clone(),
        password: args.password.clone(),
        topic: args.topic.clone().unwrap_or_default(),
        frame_port,
        tls: !args.no_tls,
    })
}

fn group_by_name(name: &str) -> Option<ActiveGroup> {
    Some(match name {
        "image" | "img" => ActiveGroup::Img,
        "os" => ActiveGroup::Os,
        "filesystem" | "fs" => ActiveGroup::Fs,
        "enumeration" | "enum" => ActiveGroup::Enum,
        "shell" => ActiveGroup::Shell,
        "statistics" | "stats" | "stat" => ActiveGroup::Stat,
        "settings" => ActiveGroup::Settings,
        "zephyr" => ActiveGroup::Zephyr,
        _ => return None,
    })
}

fn invalid_command() -> CliError {
    CliError::new(ExitCode::InvalidCommand, "Error: invalid command specified")
}

fn build_command(group: ActiveGroup, name: &str, args: &Args) -> Result<Command> {
    match group {
        ActiveGroup::Img => img_command(name, args),
        ActiveGroup::Os => os_command(name, args),
        ActiveGroup::Fs => fs_command(name, args),
        ActiveGroup::Enum => enum_command(name, args),
        ActiveGroup::Shell => match name {
            "execute" => {
                need(&[("cmd", args.cmd.is_some())])?;
                let line = args.cmd.as_deref().unwrap_or_default();
                let argv = shlex::split(line)
                    .filter(|argv| !argv.is_empty())
                    .ok_or_else(|| CliError::invalid_value("cmd", line))?;
                Ok(Command::ShellExecute { argv })
            }
            _ => Err(invalid_command()),
        },
        ActiveGroup::Stat => match name {
            "group-data" => {
                need(&[("name", args.name.is_some())])?;
                Ok(Command::StatGroupData {
                    name: args.name.clone().unwrap_or_default(),
                })
            }
            "list-groups" => Ok(Command::StatListGroups),
            _ => Err(invalid_command()),
        },
        ActiveGroup::Settings => settings_command(name, args),
        ActiveGroup::Zephyr => match name {
            "storage-erase" => Ok(Command::ZephyrStorageErase),
            _ => Err(invalid_command()),
        },
    }
}

fn img_command(name: &str, args: &Args) -> Result<Command> {
    match name {
        "get-state" => Ok(Command::ImageGetState),
        "set-state" => {
            need(&[("hash", args.hash.is_some())])?;
            Ok(Command::ImageSetState {
                hash: hex_bytes("hash", args.hash.as_deref().unwrap_or_default())?,
                confirm: args.confirm,
            })
        }
        "upload" => {
            need(&[("file", args.file.is_some())])?;
            let image = optional_number("image", args.image.as_deref())?.unwrap_or(0);
            let mode = match args.mode.as_deref() {
                None | Some("normal") => UploadMode::Normal,
                Some("test") => UploadMode::Test,
                Some("confirm") => UploadMode::Confirm,
                Some(other) => return Err(CliError::invalid_value("mode", other)),
            };
            let path = args.file.clone().unwrap_or_default();
            Ok(Command::ImageUpload {
                image,
                data: read_file(&path)?,
                upgrade: args.upgrade,
                mode,
                reset: args.reset,
            })
        }
        "erase" => Ok(Command::ImageErase {
            slot: optional_number("slot", args.slot.as_deref())?,
        }),
        "slot-info" => Ok(Command::ImageSlotInfo),
        _ => Err(invalid_command()),
    }
}

fn parse_date_time(value: &str) -> Result<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|datetime| datetime.naive_local())
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| CliError::invalid_value("datetime", value))
}

fn os_command(name: &str, args: &Args) -> Result<Command> {
    match name {
        "echo" => {
            need(&[("data", args.data.is_some())])?;
            Ok(Command::Echo {
                text: args.data.clone().unwrap_or_default(),
            })
        }
        "tasks" => Ok(Command::TaskStats),
        "memory" => Ok(Command::MemoryPool),
        "reset" => Ok(Command::Reset { force: args.force }),
        "mcumgr-parameters" => Ok(Command::McumgrParameters),
        "application-info" => Ok(Command::ApplicationInfo {
            format: args.format.clone(),
        }),
        "get-date-time" => Ok(Command::DateTimeGet),
        "set-date-time" => {
            let datetime = match args.datetime.as_deref() {
                Some(value) => parse_date_time(value)?,
                None => Local::now().naive_local(),
            };
            Ok(Command::DateTimeSet { datetime })
        }
        "bootloader-info" => Ok(Command::BootloaderInfo {
            query: args.query.clone(),
        }),
        _ => Err(invalid_command()),
    }
}

fn fs_command(name: &str, args: &Args) -> Result<Command> {
    let remote = || args.remote_file.clone().unwrap_or_default();
    match name {
        "upload" => {
            need(&[
                ("local-file", args.local_file.is_some()),
                ("remote-file", args.remote_file.is_some()),
            ])?;
            let path = args.local_file.clone().unwrap_or_default();
            Ok(Command::FsUpload {
                remote: remote(),
                data: read_file(&path)?,
            })
        }
        "download" => {
            need(&[
                ("local-file", args.local_file.is_some()),
                ("remote-file", args.remote_file.is_some()),
            ])?;
            Ok(Command::FsDownload { remote: remote() })
        }
        "status" => {
            need(&[("remote-file", args.remote_file.is_some())])?;
            Ok(Command::FsStatus { remote: remote() })
        }
        "hash" | "checksum" | "hash-checksum" => {
            need(&[("remote-file", args.remote_file.is_some())])?;
            Ok(Command::FsHashChecksum {
                remote: remote(),
                kind: args.hash.clone(),
            })
        }
        "supported-hashes" | "supported-checksums" | "supported-hashes-checksums" => {
            Ok(Command::FsSupportedHashes)
        }
        "close" => Ok(Command::FsClose),
        _ => Err(invalid_command()),
    }
}

fn enum_command(name: &str, args: &Args) -> Result<Command> {
    match name {
        "count" => Ok(Command::EnumCount),
        "list" => Ok(Command::EnumList),
        "single" => {
            need(&[("index", args.index.is_some())])?;
            Ok(Command::EnumSingle {
                index: number("index", args.index.as_deref().unwrap_or_default())?,
            })
        }
        "details" => {
            let groups = match args.groups.as_deref() {
                Some(list) => list
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(|id| number::<u16>("groups", id))
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };
            Ok(Command::EnumDetails { groups })
        }
        _ => Err(invalid_command()),
    }
}

fn settings_command(name: &str, args: &Args) -> Result<Command> {
    let key = || args.key.clone().unwrap_or_default();
    match name {
        "read" => {
            need(&[("key", args.key.is_some())])?;
            Ok(Command::SettingsRead {
                key: key(),
                max_size: optional_number("max-length", args.max_length.as_deref())?,
            })
        }
        "write" => {
            need(&[("key", args.key.is_some()), ("value", args.value.is_some())])?;
            Ok(Command::SettingsWrite {
                key: key(),
                value: hex_bytes("value", args.value.as_deref().unwrap_or_default())?,
            })
        }
        "delete" => {
            need(&[("key", args.key.is_some())])?;
            Ok(Command::SettingsDelete { key: key() })
        }
        "commit" => Ok(Command::SettingsCommit),
        "load" => Ok(Command::SettingsLoad),
        "save" => Ok(Command::SettingsSave),
        _ => Err(invalid_command()),
    }
}
