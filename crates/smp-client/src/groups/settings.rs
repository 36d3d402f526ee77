//! Settings management group.

use smp_protocol::{
    Body, Op, ProtocolError, ResponseBody, GROUP_SETTINGS, SETTINGS_CMD_COMMIT,
    SETTINGS_CMD_DELETE, SETTINGS_CMD_LOAD_SAVE, SETTINGS_CMD_READ_WRITE,
};
use tracing::warn;

use super::{invalid, response_body, Group, GroupUpdate, Link};
use crate::output::GroupOutput;
use crate::processor::RequestOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsOperation {
    Read,
    Write,
    Delete,
    Commit,
    Load,
    Save,
}

/// Settings management: read and modify the device's persistent settings.
#[derive(Debug, Default)]
pub struct SettingsGroup {
    operation: Option<SettingsOperation>,
}

impl SettingsGroup {
    pub fn new() -> Self {
        SettingsGroup::default()
    }

    fn start(
        &mut self,
        link: &mut Link<'_>,
        operation: SettingsOperation,
        op: Op,
        command: u8,
        body: Body,
    ) -> bool {
        if !link.send_body(op, GROUP_SETTINGS, command, body) {
            return false;
        }
        self.operation = Some(operation);
        true
    }

    /// Read the value of `key`, optionally capped at `max_size` bytes.
    pub fn start_read(&mut self, link: &mut Link<'_>, key: &str, max_size: Option<u32>) -> bool {
        let mut body = Body::map().text("name", key);
        if let Some(max_size) = max_size {
            body = body.uint("max_size", max_size as u64);
        }
        self.start(link, SettingsOperation::Read, Op::Read, SETTINGS_CMD_READ_WRITE, body)
    }

    pub fn start_write(&mut self, link: &mut Link<'_>, key: &str, value: &[u8]) -> bool {
        let body = Body::map().text("name", key).bytes("val", value);
        self.start(link, SettingsOperation::Write, Op::Write, SETTINGS_CMD_READ_WRITE, body)
    }

    pub fn start_delete(&mut self, link: &mut Link<'_>, key: &str) -> bool {
        let body = Body::map().text("name", key);
        self.start(link, SettingsOperation::Delete, Op::Write, SETTINGS_CMD_DELETE, body)
    }

    /// Apply written values.
    pub fn start_commit(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, SettingsOperation::Commit, Op::Write, SETTINGS_CMD_COMMIT, Body::map())
    }

    /// Reload settings from persistent storage.
    pub fn start_load(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, SettingsOperation::Load, Op::Read, SETTINGS_CMD_LOAD_SAVE, Body::map())
    }

    /// Write settings to persistent storage.
    pub fn start_save(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, SettingsOperation::Save, Op::Write, SETTINGS_CMD_LOAD_SAVE, Body::map())
    }
}

fn parse(operation: SettingsOperation, body: &ResponseBody) -> Result<GroupOutput, ProtocolError> {
    Ok(match operation {
        SettingsOperation::Read => {
            GroupOutput::SettingValue(body.bytes("val")?.ok_or(ProtocolError::MissingField("val"))?)
        }
        _ => GroupOutput::None,
    })
}

impl Group for SettingsGroup {
    fn group_id(&self) -> u16 {
        GROUP_SETTINGS
    }

    fn receive(&mut self, _link: &mut Link<'_>, outcome: RequestOutcome) -> GroupUpdate {
        let Some(operation) = self.operation.take() else {
            warn!("Settings group received a response with no operation running");
            return GroupUpdate::error("no operation in progress");
        };

        match response_body(outcome).map(|body| parse(operation, &body)) {
            Ok(Ok(output)) => GroupUpdate::complete(output),
            Ok(Err(e)) => invalid(e),
            Err(update) => update,
        }
    }

    fn cancel(&mut self) {
        self.operation = None;
    }
}
