//! Shell management group.

use ciborium::value::Value;
use smp_protocol::{Body, Op, ProtocolError, ResponseBody, GROUP_SHELL, SHELL_CMD_EXECUTE};
use tracing::{debug, warn};

use super::{invalid, response_body, Group, GroupUpdate, Link};
use crate::output::GroupOutput;
use crate::processor::RequestOutcome;

/// Shell management: run a command line on the device shell.
#[derive(Debug, Default)]
pub struct ShellGroup {
    running: bool,
}

impl ShellGroup {
    pub fn new() -> Self {
        ShellGroup::default()
    }

    /// Execute `argv` on the device. The output is the captured shell output
    /// and the command's return code.
    pub fn start_execute(&mut self, link: &mut Link<'_>, argv: &[String]) -> bool {
        if argv.is_empty() {
            warn!("Refusing to execute an empty shell command");
            return false;
        }
        debug!("Executing shell command {:?}", argv);

        let argv = argv.iter().map(|arg| Value::Text(arg.clone())).collect();
        let body = Body::map().value("argv", Value::Array(argv));
        if !link.send_body(Op::Write, GROUP_SHELL, SHELL_CMD_EXECUTE, body) {
            return false;
        }
        self.running = true;
        true
    }
}

fn parse(body: &ResponseBody) -> Result<GroupOutput, ProtocolError> {
    Ok(GroupOutput::ShellOutput {
        output: body.text("o")?.unwrap_or_default(),
        ret: body.int("ret")?.unwrap_or(0),
    })
}

impl Group for ShellGroup {
    fn group_id(&self) -> u16 {
        GROUP_SHELL
    }

    fn receive(&mut self, _link: &mut Link<'_>, outcome: RequestOutcome) -> GroupUpdate {
        if !std::mem::take(&mut self.running) {
            warn!("Shell group received a response with no command running");
            return GroupUpdate::error("no operation in progress");
        }

        match response_body(outcome).map(|body| parse(&body)) {
            Ok(Ok(output)) => GroupUpdate::complete(output),
            Ok(Err(e)) => invalid(e),
            Err(update) => update,
        }
    }

    fn cancel(&mut self) {
        self.running = false;
    }
}
