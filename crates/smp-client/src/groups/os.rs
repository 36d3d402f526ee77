//! OS management group.

use chrono::{NaiveDateTime, Timelike};
use smp_protocol::{
    Body, Op, ProtocolError, ResponseBody, GROUP_OS, OS_CMD_APPLICATION_INFO,
    OS_CMD_BOOTLOADER_INFO, OS_CMD_DATE_TIME, OS_CMD_ECHO, OS_CMD_MCUMGR_PARAMETERS,
    OS_CMD_MEMORY_POOL, OS_CMD_RESET, OS_CMD_TASK_STATS,
};
use tracing::warn;

use super::{invalid, response_body, Group, GroupUpdate, Link};
use crate::output::{GroupOutput, MemoryPool, TaskInfo};
use crate::processor::RequestOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OsOperation {
    Echo,
    TaskStats,
    MemoryPool,
    Reset,
    McumgrParameters,
    ApplicationInfo,
    DateTimeGet,
    DateTimeSet,
    BootloaderInfo,
}

/// OS management: echo, statistics, reset, time and device information.
#[derive(Debug, Default)]
pub struct OsGroup {
    operation: Option<OsOperation>,
}

impl OsGroup {
    pub fn new() -> Self {
        OsGroup::default()
    }

    fn start(
        &mut self,
        link: &mut Link<'_>,
        operation: OsOperation,
        op: Op,
        command: u8,
        body: Body,
    ) -> bool {
        if !link.send_body(op, GROUP_OS, command, body) {
            return false;
        }
        self.operation = Some(operation);
        true
    }

    /// Ask the device to echo `text` back.
    pub fn start_echo(&mut self, link: &mut Link<'_>, text: &str) -> bool {
        let body = Body::map().text("d", text);
        self.start(link, OsOperation::Echo, Op::Write, OS_CMD_ECHO, body)
    }

    pub fn start_task_stats(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, OsOperation::TaskStats, Op::Read, OS_CMD_TASK_STATS, Body::map())
    }

    pub fn start_memory_pool(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, OsOperation::MemoryPool, Op::Read, OS_CMD_MEMORY_POOL, Body::map())
    }

    /// Reset the device. With `force` the device resets even if busy.
    pub fn start_reset(&mut self, link: &mut Link<'_>, force: bool) -> bool {
        let mut body = Body::map();
        if force {
            body = body.uint("force", 1);
        }
        self.start(link, OsOperation::Reset, Op::Write, OS_CMD_RESET, body)
    }

    pub fn start_mcumgr_parameters(&mut self, link: &mut Link<'_>) -> bool {
        self.start(
            link,
            OsOperation::McumgrParameters,
            Op::Read,
            OS_CMD_MCUMGR_PARAMETERS,
            Body::map(),
        )
    }

    /// Read application information; `format` selects fields as in `uname`.
    pub fn start_application_info(&mut self, link: &mut Link<'_>, format: Option<&str>) -> bool {
        let mut body = Body::map();
        if let Some(format) = format {
            body = body.text("format", format);
        }
        self.start(
            link,
            OsOperation::ApplicationInfo,
            Op::Read,
            OS_CMD_APPLICATION_INFO,
            body,
        )
    }

    pub fn start_date_time_get(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, OsOperation::DateTimeGet, Op::Read, OS_CMD_DATE_TIME, Body::map())
    }

    /// Set the device RTC. The device has no notion of time zones, so the
    /// local time is sent.
    pub fn start_date_time_set(&mut self, link: &mut Link<'_>, datetime: NaiveDateTime) -> bool {
        let body = Body::map().text("datetime", format_date_time(&datetime));
        self.start(link, OsOperation::DateTimeSet, Op::Write, OS_CMD_DATE_TIME, body)
    }

    pub fn start_bootloader_info(&mut self, link: &mut Link<'_>, query: Option<&str>) -> bool {
        let mut body = Body::map();
        if let Some(query) = query {
            body = body.text("query", query);
        }
        self.start(
            link,
            OsOperation::BootloaderInfo,
            Op::Read,
            OS_CMD_BOOTLOADER_INFO,
            body,
        )
    }
}

/// Format a date-time the way the device parses it.
fn format_date_time(datetime: &NaiveDateTime) -> String {
    if datetime.nanosecond() >= 1_000_000 {
        datetime.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    } else {
        datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

fn parse_tasks(body: &ResponseBody) -> Result<Vec<TaskInfo>, ProtocolError> {
    let tasks = match body.get("tasks") {
        Some(ciborium::value::Value::Map(entries)) => entries.clone(),
        Some(_) => return Err(ProtocolError::invalid_field("tasks", "expected map")),
        None => return Err(ProtocolError::MissingField("tasks")),
    };

    tasks
        .into_iter()
        .map(|(name, stats)| -> Result<TaskInfo, ProtocolError> {
            let name = name
                .as_text()
                .ok_or_else(|| ProtocolError::invalid_field("tasks", "expected task name"))?
                .to_string();
            let stats = ResponseBody::from_value(stats)?;
            Ok(TaskInfo {
                name,
                priority: stats.int("prio")?,
                task_id: stats.uint("tid")?,
                state: stats.uint("state")?,
                stack_use: stats.uint("stkuse")?,
                stack_size: stats.uint("stksiz")?,
                context_switches: stats.uint("cswcnt")?,
                runtime: stats.uint("runtime")?,
            })
        })
        .collect()
}

fn parse_memory_pools(body: ResponseBody) -> Result<Vec<MemoryPool>, ProtocolError> {
    body.entries()
        .iter()
        .filter(|(key, _)| key.as_text() != Some("rc"))
        .map(|(name, pool)| -> Result<MemoryPool, ProtocolError> {
            let name = name
                .as_text()
                .ok_or_else(|| ProtocolError::invalid_field("pool", "expected pool name"))?
                .to_string();
            let pool = ResponseBody::from_value(pool.clone())?;
            Ok(MemoryPool {
                name,
                block_size: pool.uint("blksiz")?,
                blocks: pool.uint("nblks")?,
                free: pool.uint("nfree")?,
                minimum: pool.uint("min")?,
            })
        })
        .collect()
}

fn parse(operation: OsOperation, body: ResponseBody) -> Result<GroupOutput, ProtocolError> {
    Ok(match operation {
        OsOperation::Echo => GroupOutput::Text(body.require_text("r")?),
        OsOperation::TaskStats => GroupOutput::Tasks(parse_tasks(&body)?),
        OsOperation::MemoryPool => GroupOutput::MemoryPools(parse_memory_pools(body)?),
        OsOperation::Reset | OsOperation::DateTimeSet => GroupOutput::None,
        OsOperation::McumgrParameters => GroupOutput::McumgrParameters {
            buffer_size: body.require_uint("buf_size")?,
            buffer_count: body.require_uint("buf_count")?,
        },
        OsOperation::ApplicationInfo => GroupOutput::Text(body.require_text("output")?),
        OsOperation::DateTimeGet => GroupOutput::Text(body.require_text("datetime")?),
        OsOperation::BootloaderInfo => GroupOutput::Map(body.into_value()),
    })
}

impl Group for OsGroup {
    fn group_id(&self) -> u16 {
        GROUP_OS
    }

    fn receive(&mut self, _link: &mut Link<'_>, outcome: RequestOutcome) -> GroupUpdate {
        let Some(operation) = self.operation.take() else {
            warn!("OS group received a response with no operation running");
            return GroupUpdate::error("no operation in progress");
        };

        let body = match response_body(outcome) {
            Ok(body) => body,
            Err(update) => return update,
        };

        match parse(operation, body) {
            Ok(output) => GroupUpdate::complete(output),
            Err(e) => invalid(e),
        }
    }

    fn cancel(&mut self) {
        self.operation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::test_support::Harness;
    use crate::groups::StatusKind;
    use ciborium::value::{Integer, Value};
    use chrono::NaiveDate;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn uint(n: u64) -> Value {
        Value::Integer(Integer::from(n))
    }

    #[test]
    fn test_echo() {
        let mut h = Harness::new();
        let mut group = OsGroup::new();
        assert!(group.start_echo(&mut h.link(), "hello"));

        let sent = h.last_sent();
        assert_eq!(sent.op(), Op::Write);
        assert_eq!(sent.command(), OS_CMD_ECHO);
        assert_eq!(h.last_body().require_text("d").unwrap(), "hello");

        let update = h.reply(&mut group, Body::map().text("r", "hello"));
        assert_eq!(update, GroupUpdate::complete(GroupOutput::Text("hello".into())));
    }

    #[test]
    fn test_task_stats() {
        let mut h = Harness::new();
        let mut group = OsGroup::new();
        assert!(group.start_task_stats(&mut h.link()));

        let idle = Value::Map(vec![
            (text("prio"), uint(15)),
            (text("tid"), uint(2)),
            (text("stkuse"), uint(64)),
            (text("stksiz"), uint(320)),
        ]);
        let update = h.reply(
            &mut group,
            Body::map().value("tasks", Value::Map(vec![(text("idle"), idle)])),
        );

        let GroupUpdate::Finished { status, output: GroupOutput::Tasks(tasks), .. } = update else {
            panic!("unexpected update");
        };
        assert_eq!(status, StatusKind::Complete);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "idle");
        assert_eq!(tasks[0].priority, Some(15));
        assert_eq!(tasks[0].stack_size, Some(320));
        assert_eq!(tasks[0].runtime, None);
    }

    #[test]
    fn test_memory_pools_skip_rc() {
        let mut h = Harness::new();
        let mut group = OsGroup::new();
        assert!(group.start_memory_pool(&mut h.link()));

        let pool = Value::Map(vec![(text("blksiz"), uint(16)), (text("nfree"), uint(3))]);
        let update = h.reply(&mut group, Body::map().value("heap", pool).int("rc", 0));
        let GroupUpdate::Finished { output: GroupOutput::MemoryPools(pools), .. } = update else {
            panic!("unexpected update");
        };
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].name, "heap");
        assert_eq!(pools[0].free, Some(3));
    }

    #[test]
    fn test_reset_force_flag() {
        let mut h = Harness::new();
        let mut group = OsGroup::new();
        assert!(group.start_reset(&mut h.link(), true));
        assert_eq!(h.last_body().uint("force").unwrap(), Some(1));
        assert_eq!(h.reply(&mut group, Body::map()), GroupUpdate::complete(GroupOutput::None));

        assert!(group.start_reset(&mut h.link(), false));
        assert_eq!(h.last_body().uint("force").unwrap(), None);
    }

    #[test]
    fn test_mcumgr_parameters() {
        let mut h = Harness::new();
        let mut group = OsGroup::new();
        assert!(group.start_mcumgr_parameters(&mut h.link()));
        let update = h.reply(&mut group, Body::map().uint("buf_size", 2475).uint("buf_count", 4));
        assert_eq!(
            update,
            GroupUpdate::complete(GroupOutput::McumgrParameters {
                buffer_size: 2475,
                buffer_count: 4
            })
        );
    }

    #[test]
    fn test_set_date_time_format() {
        let mut h = Harness::new();
        let mut group = OsGroup::new();
        let datetime = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(14, 5, 6, 250)
            .unwrap();
        assert!(group.start_date_time_set(&mut h.link(), datetime));
        assert_eq!(
            h.last_body().require_text("datetime").unwrap(),
            "2024-03-09T14:05:06.250"
        );
        assert_eq!(h.last_sent().op(), Op::Write);
    }

    #[test]
    fn test_not_supported_maps_to_unsupported() {
        let mut h = Harness::new();
        let mut group = OsGroup::new();
        assert!(group.start_bootloader_info(&mut h.link(), Some("mode")));
        let update = h.reply(&mut group, Body::map().int("rc", 8));
        assert!(matches!(
            update,
            GroupUpdate::Finished { status: StatusKind::Unsupported, .. }
        ));
    }

    #[test]
    fn test_missing_field_is_error() {
        let mut h = Harness::new();
        let mut group = OsGroup::new();
        assert!(group.start_echo(&mut h.link(), "x"));
        let update = h.reply(&mut group, Body::map());
        assert!(matches!(update, GroupUpdate::Finished { status: StatusKind::Error, .. }));
    }
}
