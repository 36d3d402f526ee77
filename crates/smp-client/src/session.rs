//! Session orchestration.
//!
//! A [`Session`] owns one transport, the request processor and an instance
//! of every management group. [`Session::run`] starts a [`Command`] on the
//! group that implements it, then drives transport events and response
//! deadlines until the command reaches a final status.
//!
//! An image upload may chain further stages on the same run:
//!
//! ```text
//!   upload ──▶ set-state (mode test/confirm) ──▶ OS reset (if requested)
//! ```
//!
//! Only the last stage's status is reported; earlier stages report progress.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use smp_protocol::{Version, DEFAULT_SMP_MTU};
use smp_transport::{EventReceiver, Transport, TransportEvent};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SessionError};
use crate::groups::{
    EnumGroup, FsGroup, Group, GroupUpdate, ImageUpload, ImgGroup, Link, OsGroup, SettingsGroup,
    ShellGroup, StatGroup, StatusKind, ZephyrGroup,
};
use crate::output::GroupOutput;
use crate::processor::{Processor, RequestOutcome, RequestParams};

/// What to do with an image once it is uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMode {
    /// Leave the image in the secondary slot.
    #[default]
    Normal,
    /// Mark the image for a single test boot.
    Test,
    /// Mark the image as permanent.
    Confirm,
}

/// A management command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ImageGetState,
    ImageSetState { hash: Vec<u8>, confirm: bool },
    ImageUpload {
        image: u32,
        data: Arc<Vec<u8>>,
        upgrade: bool,
        mode: UploadMode,
        reset: bool,
    },
    ImageErase { slot: Option<u32> },
    ImageSlotInfo,

    Echo { text: String },
    TaskStats,
    MemoryPool,
    Reset { force: bool },
    McumgrParameters,
    ApplicationInfo { format: Option<String> },
    DateTimeGet,
    DateTimeSet { datetime: NaiveDateTime },
    BootloaderInfo { query: Option<String> },

    FsUpload { remote: String, data: Arc<Vec<u8>> },
    FsDownload { remote: String },
    FsStatus { remote: String },
    FsHashChecksum { remote: String, kind: Option<String> },
    FsSupportedHashes,
    FsClose,

    EnumCount,
    EnumList,
    EnumSingle { index: u16 },
    EnumDetails { groups: Vec<u16> },

    ShellExecute { argv: Vec<String> },

    StatGroupData { name: String },
    StatListGroups,

    SettingsRead { key: String, max_size: Option<u32> },
    SettingsWrite { key: String, value: Vec<u8> },
    SettingsDelete { key: String },
    SettingsCommit,
    SettingsLoad,
    SettingsSave,

    ZephyrStorageErase,
}

/// Tag identifying the running operation in events and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ImageGetState,
    ImageSetState,
    ImageUpload,
    /// Set-state stage after an upload.
    UploadSetState,
    /// Reset stage after an upload.
    UploadReset,
    ImageErase,
    ImageSlotInfo,
    Echo,
    TaskStats,
    MemoryPool,
    Reset,
    McumgrParameters,
    ApplicationInfo,
    DateTimeGet,
    DateTimeSet,
    BootloaderInfo,
    FsUpload,
    FsDownload,
    FsStatus,
    FsHashChecksum,
    FsSupportedHashes,
    FsClose,
    EnumCount,
    EnumList,
    EnumSingle,
    EnumDetails,
    ShellExecute,
    StatGroupData,
    StatListGroups,
    SettingsRead,
    SettingsWrite,
    SettingsDelete,
    SettingsCommit,
    SettingsLoad,
    SettingsSave,
    ZephyrStorageErase,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Action::ImageGetState => "image get-state",
            Action::ImageSetState => "image set-state",
            Action::ImageUpload => "image upload",
            Action::UploadSetState => "image upload set-state",
            Action::UploadReset => "image upload reset",
            Action::ImageErase => "image erase",
            Action::ImageSlotInfo => "image slot-info",
            Action::Echo => "os echo",
            Action::TaskStats => "os tasks",
            Action::MemoryPool => "os memory",
            Action::Reset => "os reset",
            Action::McumgrParameters => "os mcumgr-parameters",
            Action::ApplicationInfo => "os application-info",
            Action::DateTimeGet => "os get-date-time",
            Action::DateTimeSet => "os set-date-time",
            Action::BootloaderInfo => "os bootloader-info",
            Action::FsUpload => "fs upload",
            Action::FsDownload => "fs download",
            Action::FsStatus => "fs status",
            Action::FsHashChecksum => "fs hash-checksum",
            Action::FsSupportedHashes => "fs supported-hashes",
            Action::FsClose => "fs close",
            Action::EnumCount => "enum count",
            Action::EnumList => "enum list",
            Action::EnumSingle => "enum single",
            Action::EnumDetails => "enum details",
            Action::ShellExecute => "shell execute",
            Action::StatGroupData => "stat group-data",
            Action::StatListGroups => "stat list-groups",
            Action::SettingsRead => "settings read",
            Action::SettingsWrite => "settings write",
            Action::SettingsDelete => "settings delete",
            Action::SettingsCommit => "settings commit",
            Action::SettingsLoad => "settings load",
            Action::SettingsSave => "settings save",
            Action::ZephyrStorageErase => "zephyr storage-erase",
        };
        f.write_str(text)
    }
}

/// The group a running operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActiveGroup {
    Img,
    Os,
    Fs,
    Enum,
    Shell,
    Stat,
    Settings,
    Zephyr,
}

impl Command {
    /// Tag reported for this command.
    pub fn action(&self) -> Action {
        match self {
            Command::ImageGetState => Action::ImageGetState,
            Command::ImageSetState { .. } => Action::ImageSetState,
            Command::ImageUpload { .. } => Action::ImageUpload,
            Command::ImageErase { .. } => Action::ImageErase,
            Command::ImageSlotInfo => Action::ImageSlotInfo,
            Command::Echo { .. } => Action::Echo,
            Command::TaskStats => Action::TaskStats,
            Command::MemoryPool => Action::MemoryPool,
            Command::Reset { .. } => Action::Reset,
            Command::McumgrParameters => Action::McumgrParameters,
            Command::ApplicationInfo { .. } => Action::ApplicationInfo,
            Command::DateTimeGet => Action::DateTimeGet,
            Command::DateTimeSet { .. } => Action::DateTimeSet,
            Command::BootloaderInfo { .. } => Action::BootloaderInfo,
            Command::FsUpload { .. } => Action::FsUpload,
            Command::FsDownload { .. } => Action::FsDownload,
            Command::FsStatus { .. } => Action::FsStatus,
            Command::FsHashChecksum { .. } => Action::FsHashChecksum,
            Command::FsSupportedHashes => Action::FsSupportedHashes,
            Command::FsClose => Action::FsClose,
            Command::EnumCount => Action::EnumCount,
            Command::EnumList => Action::EnumList,
            Command::EnumSingle { .. } => Action::EnumSingle,
            Command::EnumDetails { .. } => Action::EnumDetails,
            Command::ShellExecute { .. } => Action::ShellExecute,
            Command::StatGroupData { .. } => Action::StatGroupData,
            Command::StatListGroups => Action::StatListGroups,
            Command::SettingsRead { .. } => Action::SettingsRead,
            Command::SettingsWrite { .. } => Action::SettingsWrite,
            Command::SettingsDelete { .. } => Action::SettingsDelete,
            Command::SettingsCommit => Action::SettingsCommit,
            Command::SettingsLoad => Action::SettingsLoad,
            Command::SettingsSave => Action::SettingsSave,
            Command::ZephyrStorageErase => Action::ZephyrStorageErase,
        }
    }

    /// Group implementing this command.
    pub fn group(&self) -> ActiveGroup {
        match self.action() {
            Action::ImageGetState
            | Action::ImageSetState
            | Action::ImageUpload
            | Action::UploadSetState
            | Action::ImageErase
            | Action::ImageSlotInfo => ActiveGroup::Img,
            Action::Echo
            | Action::TaskStats
            | Action::MemoryPool
            | Action::Reset
            | Action::UploadReset
            | Action::McumgrParameters
            | Action::ApplicationInfo
            | Action::DateTimeGet
            | Action::DateTimeSet
            | Action::BootloaderInfo => ActiveGroup::Os,
            Action::FsUpload
            | Action::FsDownload
            | Action::FsStatus
            | Action::FsHashChecksum
            | Action::FsSupportedHashes
            | Action::FsClose => ActiveGroup::Fs,
            Action::EnumCount | Action::EnumList | Action::EnumSingle | Action::EnumDetails => {
                ActiveGroup::Enum
            }
            Action::ShellExecute => ActiveGroup::Shell,
            Action::StatGroupData | Action::StatListGroups => ActiveGroup::Stat,
            Action::SettingsRead
            | Action::SettingsWrite
            | Action::SettingsDelete
            | Action::SettingsCommit
            | Action::SettingsLoad
            | Action::SettingsSave => ActiveGroup::Settings,
            Action::ZephyrStorageErase => ActiveGroup::Zephyr,
        }
    }
}

/// Notification published while a command runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The command reached its final status.
    Status {
        action: Action,
        status: StatusKind,
        message: Option<String>,
        output: GroupOutput,
    },
    /// A multi-request operation progressed.
    Progress { action: Action, percent: u8 },
}

/// Protocol parameters applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub version: Version,
    pub mtu: u16,
    /// Overrides the transport's retry count.
    pub retries: Option<u8>,
    /// Raises the transport's response timeout; never lowers it.
    pub timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            version: Version::V2,
            mtu: DEFAULT_SMP_MTU,
            retries: None,
            timeout: None,
        }
    }
}

/// Final result of [`Session::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct OperationReport {
    pub action: Action,
    pub status: StatusKind,
    pub message: Option<String>,
    pub output: GroupOutput,
}

impl OperationReport {
    pub fn is_success(&self) -> bool {
        self.status == StatusKind::Complete
    }
}

#[derive(Debug, Default)]
struct Groups {
    img: ImgGroup,
    os: OsGroup,
    fs: FsGroup,
    enumeration: EnumGroup,
    shell: ShellGroup,
    stat: StatGroup,
    settings: SettingsGroup,
    zephyr: ZephyrGroup,
}

impl Groups {
    fn get(&mut self, group: ActiveGroup) -> &mut dyn Group {
        match group {
            ActiveGroup::Img => &mut self.img,
            ActiveGroup::Os => &mut self.os,
            ActiveGroup::Fs => &mut self.fs,
            ActiveGroup::Enum => &mut self.enumeration,
            ActiveGroup::Shell => &mut self.shell,
            ActiveGroup::Stat => &mut self.stat,
            ActiveGroup::Settings => &mut self.settings,
            ActiveGroup::Zephyr => &mut self.zephyr,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Active {
    group: ActiveGroup,
    action: Action,
}

/// Remaining stages of an image upload.
#[derive(Debug, Clone)]
struct UploadChain {
    mode: UploadMode,
    reset: bool,
    image_hash: Vec<u8>,
}

enum Wake {
    Event(Option<TransportEvent>),
    Deadline,
}

/// Runs commands against one device.
pub struct Session {
    transport: Box<dyn Transport>,
    events: EventReceiver,
    processor: Processor,
    groups: Groups,
    config: SessionConfig,
    observer: Option<mpsc::UnboundedSender<SessionEvent>>,
    active: Option<Active>,
    chain: Option<UploadChain>,
}

impl Session {
    /// Create a session over `transport`, whose events arrive on `events`.
    pub fn new(transport: Box<dyn Transport>, events: EventReceiver, config: SessionConfig) -> Self {
        Session {
            transport,
            events,
            processor: Processor::new(),
            groups: Groups::default(),
            config,
            observer: None,
            active: None,
            chain: None,
        }
    }

    /// Receive status and progress events of every following run.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace the protocol parameters. Only allowed between commands.
    pub fn set_config(&mut self, config: SessionConfig) -> Result<()> {
        if self.active.is_some() {
            return Err(SessionError::Busy);
        }
        self.config = config;
        Ok(())
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Open the transport.
    pub fn connect(&mut self) -> Result<()> {
        self.transport.connect()?;
        self.drain_events();
        info!("Connected over {}", self.transport.name());
        Ok(())
    }

    /// Close the transport, abandoning any running command without a
    /// completion.
    pub fn disconnect(&mut self) -> Result<()> {
        self.abandon();
        self.transport.disconnect(false)?;
        info!("Disconnected from {}", self.transport.name());
        Ok(())
    }

    /// Stop the running command, e.g. after its `run` future was dropped.
    /// Publishes a cancelled status. Returns whether a command was running.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active else {
            return false;
        };
        self.abandon();
        self.publish(SessionEvent::Status {
            action: active.action,
            status: StatusKind::Cancelled,
            message: None,
            output: GroupOutput::None,
        });
        true
    }

    fn abandon(&mut self) {
        if let Some(active) = self.active.take() {
            debug!("Abandoning {}", active.action);
            self.groups.get(active.group).cancel();
        }
        self.chain = None;
        self.processor.cancel();
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            trace!("Dropping stale transport event {:?}", event);
        }
    }

    fn publish(&self, event: SessionEvent) {
        if let Some(observer) = self.observer.as_ref() {
            let _ = observer.send(event);
        }
    }

    fn params(&self) -> RequestParams {
        let mut params =
            RequestParams::for_transport(self.transport.as_ref(), self.config.version, self.config.mtu);
        if let Some(retries) = self.config.retries {
            params.retries = retries;
        }
        if let Some(timeout) = self.config.timeout {
            params = params.with_timeout_at_least(timeout);
        }
        params
    }

    /// Run `command` to its final status.
    ///
    /// Device-side outcomes (errors, timeouts, unsupported commands) are
    /// reported in the returned [`OperationReport`]; `Err` means the command
    /// could not run or the transport went away.
    pub async fn run(&mut self, command: Command) -> Result<OperationReport> {
        if !self.transport.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if self.active.is_some() || self.processor.is_busy() {
            return Err(SessionError::Busy);
        }
        self.drain_events();

        let action = command.action();
        debug!("Running {}", action);
        if !self.start(command, Instant::now()) {
            self.chain = None;
            return Err(SessionError::StartFailed(action.to_string()));
        }

        loop {
            let deadline = self.processor.deadline();
            let wake = tokio::select! {
                event = self.events.recv() => Wake::Event(event),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    Wake::Deadline
                }
            };

            let now = Instant::now();
            let outcome = match wake {
                Wake::Deadline => self.processor.poll_timeout(self.transport.as_mut(), now),
                Wake::Event(Some(TransportEvent::Message(message))) => {
                    self.processor.message_received(message)
                }
                Wake::Event(Some(TransportEvent::Error(e))) => {
                    warn!("Transport error: {}", e);
                    None
                }
                Wake::Event(Some(TransportEvent::Disconnected)) | Wake::Event(None) => {
                    warn!("Transport {} disconnected", self.transport.name());
                    self.abandon();
                    let _ = self.transport.disconnect(true);
                    return Err(SessionError::Disconnected);
                }
            };

            if let Some(outcome) = outcome {
                if let Some(report) = self.dispatch(outcome, now) {
                    return Ok(report);
                }
            }
        }
    }

    /// Start `command` on its group and mark it active.
    fn start(&mut self, command: Command, now: Instant) -> bool {
        let action = command.action();
        let group = command.group();
        let params = self.params();
        let mut link = Link::new(&mut self.processor, self.transport.as_mut(), params, now);
        let groups = &mut self.groups;

        let started = match command {
            Command::ImageGetState => groups.img.start_image_get_state(&mut link),
            Command::ImageSetState { hash, confirm } => {
                groups.img.start_image_set_state(&mut link, &hash, confirm)
            }
            Command::ImageUpload {
                image,
                data,
                upgrade,
                mode,
                reset,
            } => {
                self.chain = Some(UploadChain {
                    mode,
                    reset,
                    image_hash: Vec::new(),
                });
                let upload = ImageUpload {
                    image,
                    data,
                    upgrade,
                };
                groups.img.start_image_upload(&mut link, upload)
            }
            Command::ImageErase { slot } => groups.img.start_image_erase(&mut link, slot),
            Command::ImageSlotInfo => groups.img.start_image_slot_info(&mut link),

            Command::Echo { text } => groups.os.start_echo(&mut link, &text),
            Command::TaskStats => groups.os.start_task_stats(&mut link),
            Command::MemoryPool => groups.os.start_memory_pool(&mut link),
            Command::Reset { force } => groups.os.start_reset(&mut link, force),
            Command::McumgrParameters => groups.os.start_mcumgr_parameters(&mut link),
            Command::ApplicationInfo { format } => {
                groups.os.start_application_info(&mut link, format.as_deref())
            }
            Command::DateTimeGet => groups.os.start_date_time_get(&mut link),
            Command::DateTimeSet { datetime } => groups.os.start_date_time_set(&mut link, datetime),
            Command::BootloaderInfo { query } => {
                groups.os.start_bootloader_info(&mut link, query.as_deref())
            }

            Command::FsUpload { remote, data } => groups.fs.start_upload(&mut link, &remote, data),
            Command::FsDownload { remote } => groups.fs.start_download(&mut link, &remote),
            Command::FsStatus { remote } => groups.fs.start_status(&mut link, &remote),
            Command::FsHashChecksum { remote, kind } => {
                groups.fs.start_hash_checksum(&mut link, &remote, kind.as_deref())
            }
            Command::FsSupportedHashes => groups.fs.start_supported_hashes(&mut link),
            Command::FsClose => groups.fs.start_close(&mut link),

            Command::EnumCount => groups.enumeration.start_count(&mut link),
            Command::EnumList => groups.enumeration.start_list(&mut link),
            Command::EnumSingle { index } => groups.enumeration.start_single(&mut link, index),
            Command::EnumDetails { groups: ids } => groups.enumeration.start_details(&mut link, &ids),

            Command::ShellExecute { argv } => groups.shell.start_execute(&mut link, &argv),

            Command::StatGroupData { name } => groups.stat.start_group_data(&mut link, &name),
            Command::StatListGroups => groups.stat.start_list_groups(&mut link),

            Command::SettingsRead { key, max_size } => {
                groups.settings.start_read(&mut link, &key, max_size)
            }
            Command::SettingsWrite { key, value } => {
                groups.settings.start_write(&mut link, &key, &value)
            }
            Command::SettingsDelete { key } => groups.settings.start_delete(&mut link, &key),
            Command::SettingsCommit => groups.settings.start_commit(&mut link),
            Command::SettingsLoad => groups.settings.start_load(&mut link),
            Command::SettingsSave => groups.settings.start_save(&mut link),

            Command::ZephyrStorageErase => groups.zephyr.start_storage_erase(&mut link),
        };

        if started {
            self.active = Some(Active { group, action });
        }
        started
    }

    /// Hand a request outcome to the active group. Returns the report once
    /// the command is finished.
    fn dispatch(&mut self, outcome: RequestOutcome, now: Instant) -> Option<OperationReport> {
        let Some(active) = self.active else {
            debug!("Dropping request outcome with no command running");
            return None;
        };

        let params = self.params();
        let update = {
            let mut link = Link::new(&mut self.processor, self.transport.as_mut(), params, now);
            self.groups.get(active.group).receive(&mut link, outcome)
        };

        match update {
            GroupUpdate::Progress(percent) => {
                trace!("{} at {}%", active.action, percent);
                self.publish(SessionEvent::Progress {
                    action: active.action,
                    percent,
                });
                None
            }
            GroupUpdate::Finished {
                status,
                message,
                output,
            } => {
                self.active = None;
                self.stage_finished(active.action, status, message, output, now)
            }
        }
    }

    /// Continue the upload chain after a finished stage, or report.
    fn stage_finished(
        &mut self,
        action: Action,
        status: StatusKind,
        message: Option<String>,
        output: GroupOutput,
        now: Instant,
    ) -> Option<OperationReport> {
        let Some(mut chain) = self.chain.take() else {
            return Some(self.report(action, status, message, output));
        };

        match (action, status) {
            (Action::ImageUpload, StatusKind::Complete) => {
                if let GroupOutput::ImageHash(hash) = &output {
                    chain.image_hash = hash.clone();
                }
                self.publish(SessionEvent::Progress {
                    action,
                    percent: 100,
                });

                if chain.mode != UploadMode::Normal {
                    let confirm = chain.mode == UploadMode::Confirm;
                    let hash = chain.image_hash.clone();
                    let started = {
                        let params = self.params();
                        let mut link =
                            Link::new(&mut self.processor, self.transport.as_mut(), params, now);
                        self.groups.img.start_image_set_state(&mut link, &hash, confirm)
                    };
                    return self.next_stage(chain, ActiveGroup::Img, Action::UploadSetState, started);
                }
                self.after_set_state(chain, action, None, now)
            }
            (Action::UploadSetState, StatusKind::Complete) => {
                self.after_set_state(chain, action, None, now)
            }
            (Action::UploadSetState, StatusKind::Unsupported) => {
                warn!("Device does not support setting the image state");
                let message = Some("image state change not supported by device".to_string());
                self.after_set_state(chain, action, message, now)
            }
            _ => {
                let output = match output {
                    GroupOutput::None if !chain.image_hash.is_empty() => {
                        GroupOutput::ImageHash(chain.image_hash)
                    }
                    output => output,
                };
                Some(self.report(action, status, message, output))
            }
        }
    }

    /// Reset if requested, else report `action` as the last stage.
    fn after_set_state(
        &mut self,
        chain: UploadChain,
        action: Action,
        message: Option<String>,
        now: Instant,
    ) -> Option<OperationReport> {
        if chain.reset {
            let started = {
                let params = self.params();
                let mut link = Link::new(&mut self.processor, self.transport.as_mut(), params, now);
                self.groups.os.start_reset(&mut link, false)
            };
            return self.next_stage(chain, ActiveGroup::Os, Action::UploadReset, started);
        }

        let output = GroupOutput::ImageHash(chain.image_hash);
        Some(self.report(action, StatusKind::Complete, message, output))
    }

    fn next_stage(
        &mut self,
        chain: UploadChain,
        group: ActiveGroup,
        action: Action,
        started: bool,
    ) -> Option<OperationReport> {
        if !started {
            let output = GroupOutput::ImageHash(chain.image_hash);
            let message = Some(format!("failed to start {}", action));
            return Some(self.report(action, StatusKind::Error, message, output));
        }
        debug!("Upload chain continues with {}", action);
        self.active = Some(Active { group, action });
        self.chain = Some(chain);
        None
    }

    fn report(
        &self,
        action: Action,
        status: StatusKind,
        message: Option<String>,
        output: GroupOutput,
    ) -> OperationReport {
        debug!("{} finished: {}", action, status);
        self.publish(SessionEvent::Status {
            action,
            status,
            message: message.clone(),
            output: output.clone(),
        });
        OperationReport {
            action,
            status,
            message,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{response_to, MockTransport};
    use smp_protocol::{Body, GROUP_IMG, GROUP_OS, IMG_CMD_STATE, OS_CMD_RESET};
    use smp_transport::event_channel;

    fn session(transport: &MockTransport, events: EventReceiver) -> Session {
        Session::new(Box::new(transport.clone()), events, SessionConfig::default())
    }

    #[test]
    fn test_command_groups() {
        assert_eq!(Command::EnumCount.group(), ActiveGroup::Enum);
        assert_eq!(Command::Reset { force: false }.group(), ActiveGroup::Os);
        assert_eq!(Command::ZephyrStorageErase.action(), Action::ZephyrStorageErase);
        assert_eq!(Action::UploadSetState.to_string(), "image upload set-state");
    }

    #[test]
    fn test_params_timeout_only_raised() {
        let (_tx, rx) = event_channel();
        let transport = MockTransport::new();
        let mut session = session(&transport, rx);

        let config = SessionConfig {
            timeout: Some(Duration::from_millis(10)),
            retries: Some(0),
            ..SessionConfig::default()
        };
        session.set_config(config).unwrap();
        let params = session.params();
        assert_eq!(params.timeout, smp_transport::DEFAULT_TIMEOUT);
        assert_eq!(params.retries, 0);

        let config = SessionConfig {
            timeout: Some(Duration::from_secs(10)),
            ..SessionConfig::default()
        };
        session.set_config(config).unwrap();
        assert_eq!(session.params().timeout, Duration::from_secs(10));
        assert_eq!(session.params().retries, smp_transport::DEFAULT_RETRIES);
    }

    #[tokio::test]
    async fn test_run_requires_connection() {
        let (_tx, rx) = event_channel();
        let transport = MockTransport::new();
        transport.clone().disconnect(false).unwrap();
        let mut session = session(&transport, rx);
        let result = session.run(Command::EnumCount).await;
        assert_eq!(result, Err(SessionError::NotConnected));
    }

    #[tokio::test]
    async fn test_start_failure() {
        let (_tx, rx) = event_channel();
        let transport = MockTransport::new();
        transport.set_fail_sends(true);
        let mut session = session(&transport, rx);
        let result = session.run(Command::EnumCount).await;
        assert!(matches!(result, Err(SessionError::StartFailed(_))));
        assert!(!session.processor.is_busy());
    }

    #[tokio::test]
    async fn test_upload_without_follow_up_reports_hash() {
        let (tx, rx) = event_channel();
        let transport = MockTransport::with_events(tx);
        let data = Arc::new(vec![0x5a; 100]);
        transport.set_responder(|request| {
            vec![response_to(request, Body::map().uint("off", 100))]
        });

        let mut session = session(&transport, rx);
        let report = session
            .run(Command::ImageUpload {
                image: 0,
                data: data.clone(),
                upgrade: false,
                mode: UploadMode::Normal,
                reset: false,
            })
            .await
            .unwrap();

        assert_eq!(report.action, Action::ImageUpload);
        assert_eq!(report.status, StatusKind::Complete);
        assert_eq!(report.output, GroupOutput::ImageHash(crate::image::sha256(&data)));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_test_mode_without_reset() {
        let (tx, rx) = event_channel();
        let transport = MockTransport::with_events(tx);
        transport.set_responder(|request| {
            let body = match (request.group(), request.command()) {
                (GROUP_IMG, IMG_CMD_STATE) => {
                    Body::map().value("images", ciborium::value::Value::Array(vec![]))
                }
                _ => Body::map().uint("off", 10),
            };
            vec![response_to(request, body)]
        });

        let mut session = session(&transport, rx);
        let report = session
            .run(Command::ImageUpload {
                image: 0,
                data: Arc::new(vec![1; 10]),
                upgrade: false,
                mode: UploadMode::Test,
                reset: false,
            })
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        let set_state = smp_protocol::ResponseBody::decode(sent[1].body()).unwrap();
        assert_eq!(set_state.bool("confirm").unwrap(), Some(false));
        assert_eq!(report.status, StatusKind::Complete);
        assert_eq!(report.action, Action::UploadSetState);
    }

    #[tokio::test]
    async fn test_upload_failure_stops_chain() {
        let (tx, rx) = event_channel();
        let transport = MockTransport::with_events(tx);
        transport.set_responder(|request| vec![response_to(request, Body::map().int("rc", 6))]);

        let mut session = session(&transport, rx);
        let report = session
            .run(Command::ImageUpload {
                image: 0,
                data: Arc::new(vec![1; 10]),
                upgrade: false,
                mode: UploadMode::Confirm,
                reset: true,
            })
            .await
            .unwrap();

        assert_eq!(report.status, StatusKind::Error);
        assert_eq!(report.action, Action::ImageUpload);
        assert_eq!(transport.sent().len(), 1);
        assert!(session.chain.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_reset_is_reported() {
        let (tx, rx) = event_channel();
        let transport = MockTransport::with_events(tx);
        transport.set_responder(|request| {
            let body = match (request.group(), request.command()) {
                (GROUP_OS, OS_CMD_RESET) => Body::map().int("rc", 8),
                _ => Body::map().uint("off", 4),
            };
            vec![response_to(request, body)]
        });

        let mut session = session(&transport, rx);
        let report = session
            .run(Command::ImageUpload {
                image: 0,
                data: Arc::new(vec![9; 4]),
                upgrade: false,
                mode: UploadMode::Normal,
                reset: true,
            })
            .await
            .unwrap();

        assert_eq!(report.action, Action::UploadReset);
        assert_eq!(report.status, StatusKind::Unsupported);
        assert_eq!(report.output, GroupOutput::ImageHash(crate::image::sha256(&[9; 4])));
    }

    #[tokio::test]
    async fn test_cancel_publishes_status() {
        let (tx, rx) = event_channel();
        let transport = MockTransport::with_events(tx);
        let mut session = session(&transport, rx);
        let mut observer = session.subscribe();

        assert!(session.start(Command::EnumList, Instant::now()));
        assert!(session.cancel());
        assert!(!session.processor.is_busy());
        assert_eq!(
            observer.try_recv().unwrap(),
            SessionEvent::Status {
                action: Action::EnumList,
                status: StatusKind::Cancelled,
                message: None,
                output: GroupOutput::None,
            }
        );
        assert!(!session.cancel());
    }
}
