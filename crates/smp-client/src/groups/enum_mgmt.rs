//! Enumeration management group.

use ciborium::value::{Integer, Value};
use smp_protocol::{
    value_to_i64, Body, Op, ProtocolError, ResponseBody, ENUM_CMD_COUNT, ENUM_CMD_DETAILS,
    ENUM_CMD_LIST, ENUM_CMD_SINGLE, GROUP_ENUM,
};
use tracing::warn;

use super::{invalid, response_body, Group, GroupUpdate, Link};
use crate::output::{GroupDetails, GroupOutput};
use crate::processor::RequestOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumOperation {
    Count,
    List,
    Single,
    Details,
}

/// Enumeration management: which groups the device supports.
#[derive(Debug, Default)]
pub struct EnumGroup {
    operation: Option<EnumOperation>,
}

impl EnumGroup {
    pub fn new() -> Self {
        EnumGroup::default()
    }

    fn start(&mut self, link: &mut Link<'_>, operation: EnumOperation, command: u8, body: Body) -> bool {
        if !link.send_body(Op::Read, GROUP_ENUM, command, body) {
            return false;
        }
        self.operation = Some(operation);
        true
    }

    pub fn start_count(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, EnumOperation::Count, ENUM_CMD_COUNT, Body::map())
    }

    pub fn start_list(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, EnumOperation::List, ENUM_CMD_LIST, Body::map())
    }

    /// Group ID at position `index` of the device's group list.
    pub fn start_single(&mut self, link: &mut Link<'_>, index: u16) -> bool {
        let body = Body::map().uint("index", index as u64);
        self.start(link, EnumOperation::Single, ENUM_CMD_SINGLE, body)
    }

    /// Details of `groups`, or of every group if empty.
    pub fn start_details(&mut self, link: &mut Link<'_>, groups: &[u16]) -> bool {
        let mut body = Body::map();
        if !groups.is_empty() {
            let ids = groups
                .iter()
                .map(|&id| Value::Integer(Integer::from(id)))
                .collect();
            body = body.value("groups", Value::Array(ids));
        }
        self.start(link, EnumOperation::Details, ENUM_CMD_DETAILS, body)
    }
}

fn group_id(value: &Value) -> Result<u16, ProtocolError> {
    value_to_i64(value)
        .and_then(|id| u16::try_from(id).ok())
        .ok_or_else(|| ProtocolError::invalid_field("groups", "expected group ID"))
}

fn to_group_id(id: u64, field: &'static str) -> Result<u16, ProtocolError> {
    u16::try_from(id).map_err(|_| ProtocolError::invalid_field(field, format!("{} is not a group ID", id)))
}

fn parse_details(body: &ResponseBody) -> Result<Vec<GroupDetails>, ProtocolError> {
    let groups = body.array("groups")?.ok_or(ProtocolError::MissingField("groups"))?;

    groups
        .iter()
        .map(|entry| -> Result<GroupDetails, ProtocolError> {
            let entry = ResponseBody::from_value(entry.clone())?;
            Ok(GroupDetails {
                group: to_group_id(entry.require_uint("group")?, "group")?,
                name: entry.text("name")?,
                handlers: entry.uint("handlers")?,
            })
        })
        .collect()
}

fn parse(operation: EnumOperation, body: &ResponseBody) -> Result<GroupOutput, ProtocolError> {
    Ok(match operation {
        EnumOperation::Count => GroupOutput::GroupCount(body.require_uint("count")?),
        EnumOperation::List => {
            let groups = body.array("groups")?.ok_or(ProtocolError::MissingField("groups"))?;
            GroupOutput::GroupIds(groups.iter().map(group_id).collect::<Result<_, _>>()?)
        }
        EnumOperation::Single => GroupOutput::GroupSingle {
            group: to_group_id(body.require_uint("group")?, "group")?,
            end: body.bool("end")?.unwrap_or(false),
        },
        EnumOperation::Details => GroupOutput::GroupDetails(parse_details(body)?),
    })
}

impl Group for EnumGroup {
    fn group_id(&self) -> u16 {
        GROUP_ENUM
    }

    fn receive(&mut self, _link: &mut Link<'_>, outcome: RequestOutcome) -> GroupUpdate {
        let Some(operation) = self.operation.take() else {
            warn!("Enumeration group received a response with no operation running");
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

    fn ids(ids: &[u16]) -> Value {
        Value::Array(ids.iter().map(|&id| Value::Integer(Integer::from(id))).collect())
    }

    #[test]
    fn test_count_and_list() {
        let mut h = Harness::new();
        let mut group = EnumGroup::new();

        assert!(group.start_count(&mut h.link()));
        assert_eq!(
            h.reply(&mut group, Body::map().uint("count", 4)),
            GroupUpdate::complete(GroupOutput::GroupCount(4))
        );

        assert!(group.start_list(&mut h.link()));
        assert_eq!(
            h.reply(&mut group, Body::map().value("groups", ids(&[0, 1, 8, 63]))),
            GroupUpdate::complete(GroupOutput::GroupIds(vec![0, 1, 8, 63]))
        );
    }

    #[test]
    fn test_single_last_entry() {
        let mut h = Harness::new();
        let mut group = EnumGroup::new();
        assert!(group.start_single(&mut h.link(), 3));
        assert_eq!(h.last_body().require_uint("index").unwrap(), 3);
        assert_eq!(
            h.reply(&mut group, Body::map().uint("group", 63).bool("end", true)),
            GroupUpdate::complete(GroupOutput::GroupSingle { group: 63, end: true })
        );
    }

    #[test]
    fn test_details_filter() {
        let mut h = Harness::new();
        let mut group = EnumGroup::new();
        assert!(group.start_details(&mut h.link(), &[0, 1]));
        assert_eq!(h.last_body().get("groups"), Some(&ids(&[0, 1])));

        let entry = Value::Map(vec![
            (Value::Text("group".into()), Value::Integer(Integer::from(0u8))),
            (Value::Text("name".into()), Value::Text("os mgmt".into())),
            (Value::Text("handlers".into()), Value::Integer(Integer::from(7u8))),
        ]);
        let update = h.reply(&mut group, Body::map().value("groups", Value::Array(vec![entry])));
        let expected = GroupDetails {
            group: 0,
            name: Some("os mgmt".into()),
            handlers: Some(7),
        };
        assert_eq!(update, GroupUpdate::complete(GroupOutput::GroupDetails(vec![expected])));
    }

    #[test]
    fn test_details_all_groups_sends_empty_map() {
        let mut h = Harness::new();
        let mut group = EnumGroup::new();
        assert!(group.start_details(&mut h.link(), &[]));
        assert!(h.last_body().entries().is_empty());
    }

    #[test]
    fn test_bad_group_id() {
        let mut h = Harness::new();
        let mut group = EnumGroup::new();
        assert!(group.start_single(&mut h.link(), 0));
        let update = h.reply(&mut group, Body::map().uint("group", 70000));
        assert!(matches!(update, GroupUpdate::Finished { status: StatusKind::Error, .. }));
    }
}
