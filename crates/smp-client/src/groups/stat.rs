//! Statistics management group.

use ciborium::value::Value;
use smp_protocol::{
    value_to_i64, Body, Op, ProtocolError, ResponseBody, GROUP_STAT, STAT_CMD_GROUP_DATA,
    STAT_CMD_LIST_GROUPS,
};
use tracing::warn;

use super::{invalid, response_body, Group, GroupUpdate, Link};
use crate::output::GroupOutput;
use crate::processor::RequestOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatOperation {
    GroupData,
    ListGroups,
}

/// Statistics management: named counter groups.
#[derive(Debug, Default)]
pub struct StatGroup {
    operation: Option<StatOperation>,
}

impl StatGroup {
    pub fn new() -> Self {
        StatGroup::default()
    }

    /// Read the counters of the statistics group `name`.
    pub fn start_group_data(&mut self, link: &mut Link<'_>, name: &str) -> bool {
        let body = Body::map().text("name", name);
        if !link.send_body(Op::Read, GROUP_STAT, STAT_CMD_GROUP_DATA, body) {
            return false;
        }
        self.operation = Some(StatOperation::GroupData);
        true
    }

    pub fn start_list_groups(&mut self, link: &mut Link<'_>) -> bool {
        if !link.send_body(Op::Read, GROUP_STAT, STAT_CMD_LIST_GROUPS, Body::map()) {
            return false;
        }
        self.operation = Some(StatOperation::ListGroups);
        true
    }
}

fn parse_fields(body: &ResponseBody) -> Result<Vec<(String, u64)>, ProtocolError> {
    let Some(Value::Map(fields)) = body.get("fields") else {
        return Err(ProtocolError::MissingField("fields"));
    };

    fields
        .iter()
        .map(|(name, value)| -> Result<(String, u64), ProtocolError> {
            let name = name
                .as_text()
                .ok_or_else(|| ProtocolError::invalid_field("fields", "expected counter name"))?;
            let value = value_to_i64(value)
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| ProtocolError::invalid_field("fields", "expected counter value"))?;
            Ok((name.to_string(), value))
        })
        .collect()
}

fn parse(operation: StatOperation, body: &ResponseBody) -> Result<GroupOutput, ProtocolError> {
    Ok(match operation {
        StatOperation::GroupData => GroupOutput::Statistics {
            name: body.require_text("name")?,
            fields: parse_fields(body)?,
        },
        StatOperation::ListGroups => {
            let groups = body
                .array("stat_list")?
                .ok_or(ProtocolError::MissingField("stat_list"))?;
            let names = groups
                .iter()
                .map(|name| {
                    name.as_text()
                        .map(str::to_string)
                        .ok_or_else(|| ProtocolError::invalid_field("stat_list", "expected group name"))
                })
                .collect::<Result<_, _>>()?;
            GroupOutput::StatisticsGroups(names)
        }
    })
}

impl Group for StatGroup {
    fn group_id(&self) -> u16 {
        GROUP_STAT
    }

    fn receive(&mut self, _link: &mut Link<'_>, outcome: RequestOutcome) -> GroupUpdate {
        let Some(operation) = self.operation.take() else {
            warn!("Statistics group received a response with no operation running");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::test_support::Harness;
    use crate::groups::StatusKind;
    use ciborium::value::Integer;

    #[test]
    fn test_group_data() {
        let mut h = Harness::new();
        let mut group = StatGroup::new();
        assert!(group.start_group_data(&mut h.link(), "smp_svr_stats"));
        assert_eq!(h.last_body().require_text("name").unwrap(), "smp_svr_stats");

        let fields = Value::Map(vec![
            (Value::Text("ticks".into()), Value::Integer(Integer::from(120u32))),
            (Value::Text("errors".into()), Value::Integer(Integer::from(0u8))),
        ]);
        let update = h.reply(
            &mut group,
            Body::map().text("name", "smp_svr_stats").value("fields", fields),
        );
        assert_eq!(
            update,
            GroupUpdate::complete(GroupOutput::Statistics {
                name: "smp_svr_stats".into(),
                fields: vec![("ticks".into(), 120), ("errors".into(), 0)],
            })
        );
    }

    #[test]
    fn test_list_groups() {
        let mut h = Harness::new();
        let mut group = StatGroup::new();
        assert!(group.start_list_groups(&mut h.link()));
        let list = Value::Array(vec![Value::Text("smp_svr_stats".into())]);
        assert_eq!(
            h.reply(&mut group, Body::map().value("stat_list", list)),
            GroupUpdate::complete(GroupOutput::StatisticsGroups(vec!["smp_svr_stats".into()]))
        );
    }

    #[test]
    fn test_unknown_group() {
        let mut h = Harness::new();
        let mut group = StatGroup::new();
        assert!(group.start_group_data(&mut h.link(), "nope"));
        let update = h.reply(&mut group, Body::map().int("rc", 5));
        assert!(matches!(update, GroupUpdate::Finished { status: StatusKind::Error, .. }));
    }
}
