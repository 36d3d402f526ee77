//! Zephyr basic management group.

use smp_protocol::{Body, Op, GROUP_ZEPHYR, ZEPHYR_CMD_STORAGE_ERASE};
use tracing::warn;

use super::{response_body, Group, GroupUpdate, Link};
use crate::output::GroupOutput;
use crate::processor::RequestOutcome;

/// Zephyr basic management.
#[derive(Debug, Default)]
pub struct ZephyrGroup {
    running: bool,
}

impl ZephyrGroup {
    pub fn new() -> Self {
        ZephyrGroup::default()
    }

    /// Erase the device's storage partition.
    pub fn start_storage_erase(&mut self, link: &mut Link<'_>) -> bool {
        if !link.send_body(Op::Write, GROUP_ZEPHYR, ZEPHYR_CMD_STORAGE_ERASE, Body::map()) {
            return false;
        }
        self.running = true;
        true
    }
}

impl Group for ZephyrGroup {
    fn group_id(&self) -> u16 {
        GROUP_ZEPHYR
    }

    fn receive(&mut self, _link: &mut Link<'_>, outcome: RequestOutcome) -> GroupUpdate {
        if !std::mem::take(&mut self.running) {
            warn!("Zephyr group received a response with no operation running");
            return GroupUpdate::error("no operation in progress");
        }

        match response_body(outcome) {
            Ok(_) => GroupUpdate::complete(GroupOutput::None),
            Err(update) => update,
        }
    }

    fn cancel(&mut self) {
        self.running = false;
    }
}
