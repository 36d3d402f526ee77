//! Text shown for a finished operation.

use std::fmt::Write;

use ciborium::value::Value;
use smp_client::{GroupOutput, HashValue, OperationReport, StatusKind};

/// Render a report as the lines printed to standard output.
pub fn render(report: &OperationReport) -> String {
    let mut out = String::new();
    if report.status != StatusKind::Complete {
        let _ = write!(out, "Error ({}): {}", report.status, report.action);
        if let Some(message) = &report.message {
            let _ = write!(out, ": {message}");
        }
        return out;
    }

    let _ = writeln!(out, "Finished {}", report.action);
    render_output(&mut out, &report.output);
    out.truncate(out.trim_end().len());
    out
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn optional<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string)
}

fn render_output(out: &mut String, output: &GroupOutput) {
    match output {
        GroupOutput::None => {}
        GroupOutput::Text(text) => {
            let _ = writeln!(out, "{text}");
        }
        GroupOutput::ImageHash(hash) => {
            let _ = writeln!(out, "Image hash: {}", hex::encode(hash));
        }
        GroupOutput::ImageStates(images) => {
            for state in images {
                let _ = writeln!(
                    out,
                    "image {} slot {}: version {}, hash {}",
                    state.image,
                    state.slot,
                    state.version,
                    hex::encode(&state.hash)
                );
                let _ = writeln!(
                    out,
                    "  active {}, confirmed {}, pending {}, bootable {}, permanent {}",
                    yes_no(state.active),
                    yes_no(state.confirmed),
                    yes_no(state.pending),
                    yes_no(state.bootable),
                    yes_no(state.permanent)
                );
            }
        }
        GroupOutput::SlotInfo(images) => {
            for image in images {
                let _ = writeln!(
                    out,
                    "image {} (max image size {})",
                    image.image,
                    optional(&image.max_image_size)
                );
                for slot in &image.slots {
                    let _ = writeln!(
                        out,
                        "  slot {}: size {}, upload image id {}",
                        slot.slot,
                        optional(&slot.size),
                        optional(&slot.upload_image_id)
                    );
                }
            }
        }
        GroupOutput::Tasks(tasks) => {
            for task in tasks {
                let _ = writeln!(
                    out,
                    "{}: priority {}, id {}, state {}, stack {}/{}, switches {}, runtime {}",
                    task.name,
                    optional(&task.priority),
                    optional(&task.task_id),
                    optional(&task.state),
                    optional(&task.stack_use),
                    optional(&task.stack_size),
                    optional(&task.context_switches),
                    optional(&task.runtime)
                );
            }
        }
        GroupOutput::MemoryPools(pools) => {
            for pool in pools {
                let _ = writeln!(
                    out,
                    "{}: block size {}, blocks {}, free {}, minimum {}",
                    pool.name,
                    optional(&pool.block_size),
                    optional(&pool.blocks),
                    optional(&pool.free),
                    optional(&pool.minimum)
                );
            }
        }
        GroupOutput::McumgrParameters {
            buffer_size,
            buffer_count,
        } => {
            let _ = writeln!(out, "Buffer size: {buffer_size}");
            let _ = writeln!(out, "Buffer count: {buffer_count}");
        }
        GroupOutput::Map(value) => {
            let _ = writeln!(out, "{}", value_text(value));
        }
        GroupOutput::FileData(data) => {
            let _ = writeln!(out, "Received {} bytes", data.len());
        }
        GroupOutput::BytesSent(bytes) => {
            let _ = writeln!(out, "Sent {bytes} bytes");
        }
        GroupOutput::FileSize(size) => {
            let _ = writeln!(out, "Size: {size}");
        }
        GroupOutput::FileHash(hash) => {
            let value = match &hash.value {
                HashValue::Bytes(bytes) => hex::encode(bytes),
                HashValue::Integer(value) => format!("{value:#x}"),
            };
            let _ = writeln!(
                out,
                "{} over {} bytes at offset {}: {}",
                hash.kind, hash.length, hash.offset, value
            );
        }
        GroupOutput::HashKinds(kinds) => {
            for kind in kinds {
                let _ = writeln!(
                    out,
                    "{}: format {}, size {}",
                    kind.name,
                    optional(&kind.format),
                    optional(&kind.size)
                );
            }
        }
        GroupOutput::GroupCount(count) => {
            let _ = writeln!(out, "Groups: {count}");
        }
        GroupOutput::GroupIds(ids) => {
            let ids: Vec<String> = ids.iter().map(u16::to_string).collect();
            let _ = writeln!(out, "Groups: {}", ids.join(", "));
        }
        GroupOutput::GroupSingle { group, end } => {
            let _ = writeln!(out, "Group: {group}{}", if *end { " (last)" } else { "" });
        }
        GroupOutput::GroupDetails(details) => {
            for group in details {
                let _ = writeln!(
                    out,
                    "{}: {}, {} handlers",
                    group.group,
                    group.name.as_deref().unwrap_or("-"),
                    optional(&group.handlers)
                );
            }
        }
        GroupOutput::ShellOutput { output, ret } => {
            let _ = writeln!(out, "{}", output.trim_end());
            let _ = writeln!(out, "Return code: {ret}");
        }
        GroupOutput::Statistics { name, fields } => {
            let _ = writeln!(out, "{name}:");
            for (field, value) in fields {
                let _ = writeln!(out, "  {field}: {value}");
            }
        }
        GroupOutput::StatisticsGroups(names) => {
            for name in names {
                let _ = writeln!(out, "{name}");
            }
        }
        GroupOutput::SettingValue(value) => match std::str::from_utf8(value) {
            Ok(text) if text.chars().all(|c| !c.is_control()) => {
                let _ = writeln!(out, "{text} ({})", hex::encode(value));
            }
            _ => {
                let _ = writeln!(out, "{}", hex::encode(value));
            }
        },
    }
}

/// Compact text form of a CBOR value.
fn value_text(value: &Value) -> String {
    match value {
        Value::Integer(i) => i128::from(*i).to_string(),
        Value::Bytes(bytes) => hex::encode(bytes),
        Value::Float(f) => f.to_string(),
        Value::Text(text) => text.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Tag(tag, inner) => format!("{tag}({})", value_text(inner)),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(value_text).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", value_text(k), value_text(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        _ => format!("{value:?}"),
    }
}
