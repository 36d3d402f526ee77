//! Image management group.
//!
//! Upload sends the image in offset-addressed chunks. Every response carries
//! the offset the device expects next, which may differ from what was sent
//! (e.g. when resuming an earlier upload), and the next chunk starts there.

use std::sync::Arc;

use smp_protocol::{
    Body, Op, ProtocolError, ResponseBody, GROUP_IMG, IMG_CMD_ERASE, IMG_CMD_SLOT_INFO,
    IMG_CMD_STATE, IMG_CMD_UPLOAD, SMP_HEADER_SIZE,
};
use tracing::{debug, trace, warn};

use super::{invalid, percent, response_body, Group, GroupUpdate, Link};
use crate::image;
use crate::output::{GroupOutput, ImageSlotState, ImageSlots, SlotSize};
use crate::processor::RequestOutcome;

/// An image to upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Image number (0 for single-image devices).
    pub image: u32,
    pub data: Arc<Vec<u8>>,
    /// Only accept the image if it is newer than the running one.
    pub upgrade: bool,
}

#[derive(Debug)]
struct UploadState {
    upload: ImageUpload,
    /// SHA-256 of the whole file, sent with the first chunk.
    sha: Vec<u8>,
    /// Whether the first chunk carries `sha`. Cleared when the packet
    /// budget leaves no room for it and any data.
    send_sha: bool,
    /// Hash reported when the upload finishes.
    image_hash: Vec<u8>,
    /// Offset of the chunk in flight.
    offset: usize,
}

#[derive(Debug)]
enum ImgOperation {
    GetState,
    SetState,
    Upload(Box<UploadState>),
    Erase,
    SlotInfo,
}

/// Image management: state, upload, erase and slot information.
#[derive(Debug, Default)]
pub struct ImgGroup {
    operation: Option<ImgOperation>,
}

impl ImgGroup {
    pub fn new() -> Self {
        ImgGroup::default()
    }

    fn start(
        &mut self,
        link: &mut Link<'_>,
        operation: ImgOperation,
        op: Op,
        command: u8,
        body: Body,
    ) -> bool {
        if !link.send_body(op, GROUP_IMG, command, body) {
            return false;
        }
        self.operation = Some(operation);
        true
    }

    pub fn start_image_get_state(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, ImgOperation::GetState, Op::Read, IMG_CMD_STATE, Body::map())
    }

    /// Mark the image with `hash` for test (`confirm == false`) or as
    /// permanent (`confirm == true`).
    pub fn start_image_set_state(&mut self, link: &mut Link<'_>, hash: &[u8], confirm: bool) -> bool {
        debug!(
            "Setting image {} to {}",
            hex::encode(hash),
            if confirm { "confirmed" } else { "test" }
        );
        let body = Body::map().bytes("hash", hash).bool("confirm", confirm);
        self.start(link, ImgOperation::SetState, Op::Write, IMG_CMD_STATE, body)
    }

    /// Erase a slot; the device picks the inactive slot if `slot` is `None`.
    pub fn start_image_erase(&mut self, link: &mut Link<'_>, slot: Option<u32>) -> bool {
        let mut body = Body::map();
        if let Some(slot) = slot {
            body = body.uint("slot", slot as u64);
        }
        self.start(link, ImgOperation::Erase, Op::Write, IMG_CMD_ERASE, body)
    }

    pub fn start_image_slot_info(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, ImgOperation::SlotInfo, Op::Read, IMG_CMD_SLOT_INFO, Body::map())
    }

    /// Upload an image. Progress is reported as the device acknowledges
    /// chunks; on completion the output is the image hash.
    pub fn start_image_upload(&mut self, link: &mut Link<'_>, upload: ImageUpload) -> bool {
        if upload.data.is_empty() {
            warn!("Refusing to upload an empty image");
            return false;
        }

        let mut state = Box::new(UploadState {
            sha: image::sha256(&upload.data),
            send_sha: true,
            image_hash: image::image_hash(&upload.data),
            upload,
            offset: 0,
        });

        if !send_chunk(link, &mut state) {
            return false;
        }
        self.operation = Some(ImgOperation::Upload(state));
        true
    }

    fn upload_response(
        &mut self,
        link: &mut Link<'_>,
        mut state: Box<UploadState>,
        body: ResponseBody,
    ) -> GroupUpdate {
        let total = state.upload.data.len();
        let offset = match body.require_uint("off") {
            Ok(offset) => offset as usize,
            Err(e) => return invalid(e),
        };

        if offset > total {
            return GroupUpdate::error(format!(
                "device reported offset {} beyond image size {}",
                offset, total
            ));
        }

        if offset == total {
            if body.bool("match").ok().flatten() == Some(false) {
                return GroupUpdate::error("device reported image hash mismatch");
            }
            debug!("Image upload of {} bytes complete", total);
            return GroupUpdate::complete(GroupOutput::ImageHash(state.image_hash));
        }

        if offset != state.offset {
            trace!("Device expects offset {}", offset);
        }
        state.offset = offset;

        if !send_chunk(link, &mut state) {
            return GroupUpdate::error("failed to send image chunk");
        }

        let progress = percent(offset as u64, total as u64);
        self.operation = Some(ImgOperation::Upload(state));
        GroupUpdate::Progress(progress)
    }
}

/// Build the upload request for the chunk at `state.offset`.
fn chunk_body(state: &UploadState, len: usize) -> Body {
    let data = &state.upload.data[state.offset..state.offset + len];
    if state.offset == 0 {
        let mut body = Body::map()
            .uint("image", state.upload.image as u64)
            .uint("len", state.upload.data.len() as u64)
            .uint("off", 0);
        if state.send_sha {
            body = body.bytes("sha", state.sha.clone());
        }
        body.bytes("data", data).bool("upgrade", state.upload.upgrade)
    } else {
        Body::map()
            .uint("off", state.offset as u64)
            .bytes("data", data)
    }
}

/// Send the largest chunk at `state.offset` whose packet fits the transport.
fn send_chunk(link: &mut Link<'_>, state: &mut UploadState) -> bool {
    let max_packet = link.max_packet_size();
    let remaining = state.upload.data.len() - state.offset;
    let mut len = remaining.min(max_packet);

    loop {
        let encoded = match chunk_body(state, len).encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode image chunk: {}", e);
                return false;
            }
        };

        let packet = SMP_HEADER_SIZE + encoded.len();
        if packet <= max_packet {
            trace!("Image chunk at {} of {} bytes", state.offset, len);
            return link.send(Op::Write, GROUP_IMG, IMG_CMD_UPLOAD, encoded);
        }

        let excess = packet - max_packet;
        if excess >= len {
            if state.offset == 0 && state.send_sha {
                debug!("Leaving the image SHA out of the first chunk to fit {} bytes", max_packet);
                state.send_sha = false;
                len = remaining.min(max_packet);
                continue;
            }
            warn!("MTU too small to carry image data ({} bytes)", max_packet);
            return false;
        }
        len -= excess;
    }
}

fn parse_states(body: &ResponseBody) -> Result<Vec<ImageSlotState>, ProtocolError> {
    let images = body.array("images")?.ok_or(ProtocolError::MissingField("images"))?;

    images
        .iter()
        .map(|entry| -> Result<ImageSlotState, ProtocolError> {
            let entry = ResponseBody::from_value(entry.clone())?;
            Ok(ImageSlotState {
                image: entry.uint("image")?.unwrap_or(0),
                slot: entry.require_uint("slot")?,
                version: entry.text("version")?.unwrap_or_default(),
                hash: entry.bytes("hash")?.unwrap_or_default(),
                bootable: entry.bool("bootable")?.unwrap_or(false),
                pending: entry.bool("pending")?.unwrap_or(false),
                confirmed: entry.bool("confirmed")?.unwrap_or(false),
                active: entry.bool("active")?.unwrap_or(false),
                permanent: entry.bool("permanent")?.unwrap_or(false),
            })
        })
        .collect()
}

fn parse_slot_info(body: &ResponseBody) -> Result<Vec<ImageSlots>, ProtocolError> {
    let images = body.array("images")?.ok_or(ProtocolError::MissingField("images"))?;

    images
        .iter()
        .map(|entry| -> Result<ImageSlots, ProtocolError> {
            let entry = ResponseBody::from_value(entry.clone())?;
            let slots = entry
                .array("slots")?
                .unwrap_or_default()
                .iter()
                .map(|slot| -> Result<SlotSize, ProtocolError> {
                    let slot = ResponseBody::from_value(slot.clone())?;
                    Ok(SlotSize {
                        slot: slot.require_uint("slot")?,
                        size: slot.uint("size")?,
                        upload_image_id: slot.uint("upload_image_id")?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(ImageSlots {
                image: entry.require_uint("image")?,
                slots,
                max_image_size: entry.uint("max_image_size")?,
            })
        })
        .collect()
}

impl Group for ImgGroup {
    fn group_id(&self) -> u16 {
        GROUP_IMG
    }

    fn receive(&mut self, link: &mut Link<'_>, outcome: RequestOutcome) -> GroupUpdate {
        let Some(operation) = self.operation.take() else {
            warn!("Image group received a response with no operation running");
            return GroupUpdate::error("no operation in progress");
        };

        let body = match response_body(outcome) {
            Ok(body) => body,
            Err(update) => return update,
        };

        let parsed = match operation {
            ImgOperation::Upload(state) => return self.upload_response(link, state, body),
            ImgOperation::GetState | ImgOperation::SetState => {
                parse_states(&body).map(GroupOutput::ImageStates)
            }
            ImgOperation::Erase => Ok(GroupOutput::None),
            ImgOperation::SlotInfo => parse_slot_info(&body).map(GroupOutput::SlotInfo),
        };

        match parsed {
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

    fn upload(data: Vec<u8>) -> ImageUpload {
        ImageUpload {
            image: 0,
            data: Arc::new(data),
            upgrade: false,
        }
    }

    #[test]
    fn test_first_chunk_fields() {
        let mut h = Harness::new();
        let mut group = ImgGroup::new();
        let data: Vec<u8> = (0..1000).map(|i| i as u8).collect();
        assert!(group.start_image_upload(&mut h.link(), upload(data.clone())));

        let sent = h.last_sent();
        assert_eq!(sent.command(), IMG_CMD_UPLOAD);
        assert!(sent.size() <= 256);

        let body = h.last_body();
        assert_eq!(body.require_uint("off").unwrap(), 0);
        assert_eq!(body.require_uint("len").unwrap(), 1000);
        assert_eq!(body.require_uint("image").unwrap(), 0);
        assert_eq!(body.bool("upgrade").unwrap(), Some(false));
        assert_eq!(body.bytes("sha").unwrap(), Some(image::sha256(&data)));

        let chunk = body.bytes("data").unwrap().unwrap();
        assert_eq!(chunk[..], data[..chunk.len()]);
    }

    #[test]
    fn test_upload_to_completion() {
        let mut h = Harness::new();
        let mut group = ImgGroup::new();
        let data: Vec<u8> = (0..1000).map(|i| (i * 7) as u8).collect();
        assert!(group.start_image_upload(&mut h.link(), upload(data.clone())));

        let mut received = Vec::new();
        let mut last_progress = 0;
        loop {
            let body = h.last_body();
            let off = body.require_uint("off").unwrap() as usize;
            assert_eq!(off, received.len());
            received.extend(body.bytes("data").unwrap().unwrap());
            assert!(h.last_sent().size() <= 256);

            match h.reply(&mut group, Body::map().uint("off", received.len() as u64)) {
                GroupUpdate::Progress(p) => {
                    assert!(p >= last_progress);
                    last_progress = p;
                    // later chunks only carry offset and data
                    assert!(h.last_body().get("len").is_none());
                }
                GroupUpdate::Finished { status, output, .. } => {
                    assert_eq!(status, StatusKind::Complete);
                    assert_eq!(output, GroupOutput::ImageHash(image::sha256(&data)));
                    break;
                }
            }
        }
        assert_eq!(received, data);
    }

    #[test]
    fn test_upload_resumes_from_device_offset() {
        let mut h = Harness::new();
        let mut group = ImgGroup::new();
        assert!(group.start_image_upload(&mut h.link(), upload(vec![0x33; 2000])));

        // Device already holds the first 1500 bytes
        let update = h.reply(&mut group, Body::map().uint("off", 1500));
        assert_eq!(update, GroupUpdate::Progress(75));
        assert_eq!(h.last_body().require_uint("off").unwrap(), 1500);
    }

    #[test]
    fn test_upload_rejects_offset_past_end() {
        let mut h = Harness::new();
        let mut group = ImgGroup::new();
        assert!(group.start_image_upload(&mut h.link(), upload(vec![1; 10])));
        let update = h.reply(&mut group, Body::map().uint("off", 11));
        assert!(matches!(update, GroupUpdate::Finished { status: StatusKind::Error, .. }));
    }

    #[test]
    fn test_upload_device_error() {
        let mut h = Harness::new();
        let mut group = ImgGroup::new();
        assert!(group.start_image_upload(&mut h.link(), upload(vec![1; 10])));

        let err = Value::Map(vec![
            (Value::Text("group".into()), Value::Integer(Integer::from(1u8))),
            (Value::Text("rc".into()), Value::Integer(Integer::from(4u8))),
        ]);
        let update = h.reply(&mut group, Body::map().value("err", err));
        let GroupUpdate::Finished { status, message, .. } = update else {
            panic!("upload should end");
        };
        assert_eq!(status, StatusKind::Error);
        assert!(message.unwrap().contains("group 1"));
    }

    #[test]
    fn test_upload_mcuboot_hash_output() {
        let (image_data, hash) = crate::image::tests::build_image(&[0x42; 64], false);
        let mut h = Harness::new();
        let mut group = ImgGroup::new();
        let len = image_data.len() as u64;
        assert!(group.start_image_upload(&mut h.link(), upload(image_data)));
        let update = h.reply(&mut group, Body::map().uint("off", len));
        assert_eq!(update, GroupUpdate::complete(GroupOutput::ImageHash(hash)));
    }

    #[test]
    fn test_chunks_shrink_with_mtu() {
        let mut h = Harness::new();
        h.params.mtu = 96;
        let mut group = ImgGroup::new();
        assert!(group.start_image_upload(&mut h.link(), upload(vec![0xab; 500])));
        assert!(h.last_sent().size() <= 96);
        assert!(!h.last_body().bytes("data").unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_upload_at_minimum_uart_mtu() {
        let mut h = Harness::new();
        h.params.mtu = 96;
        h.transport
            .set_max_message_data_size(smp_uart::max_message_data_size);
        let budget = smp_uart::max_message_data_size(96) as usize;

        let mut group = ImgGroup::new();
        let data: Vec<u8> = (0..4096).map(|i| (i * 13) as u8).collect();
        assert!(group.start_image_upload(&mut h.link(), upload(data.clone())));

        // No room for the SHA next to any data
        let first = h.last_body();
        assert!(first.get("sha").is_none());
        assert_eq!(first.require_uint("len").unwrap(), 4096);

        let mut received = Vec::new();
        loop {
            assert!(h.last_sent().size() <= budget);
            let body = h.last_body();
            let chunk = body.bytes("data").unwrap().unwrap();
            assert!(!chunk.is_empty());
            received.extend(chunk);

            match h.reply(&mut group, Body::map().uint("off", received.len() as u64)) {
                GroupUpdate::Progress(_) => {}
                GroupUpdate::Finished { status, .. } => {
                    assert_eq!(status, StatusKind::Complete);
                    break;
                }
            }
        }
        assert_eq!(received, data);
    }

    #[test]
    fn test_empty_image_refused() {
        let mut h = Harness::new();
        let mut group = ImgGroup::new();
        assert!(!group.start_image_upload(&mut h.link(), upload(Vec::new())));
        assert!(h.transport.sent().is_empty());
    }

    #[test]
    fn test_set_state_and_get_state() {
        let mut h = Harness::new();
        let mut group = ImgGroup::new();
        let hash = vec![0xaa; 32];
        assert!(group.start_image_set_state(&mut h.link(), &hash, true));
        let body = h.last_body();
        assert_eq!(body.bytes("hash").unwrap(), Some(hash.clone()));
        assert_eq!(body.bool("confirm").unwrap(), Some(true));

        let slot = Value::Map(vec![
            (Value::Text("image".into()), Value::Integer(Integer::from(0u8))),
            (Value::Text("slot".into()), Value::Integer(Integer::from(1u8))),
            (Value::Text("version".into()), Value::Text("1.0.0".into())),
            (Value::Text("hash".into()), Value::Bytes(hash.clone())),
            (Value::Text("confirmed".into()), Value::Bool(true)),
        ]);
        let update = h.reply(&mut group, Body::map().value("images", Value::Array(vec![slot])));
        let GroupUpdate::Finished { output: GroupOutput::ImageStates(states), .. } = update else {
            panic!("expected image states");
        };
        assert_eq!(states[0].slot, 1);
        assert_eq!(states[0].version, "1.0.0");
        assert!(states[0].confirmed);
        assert!(!states[0].active);
    }

    #[test]
    fn test_slot_info() {
        let mut h = Harness::new();
        let mut group = ImgGroup::new();
        assert!(group.start_image_slot_info(&mut h.link()));

        let slot = |n: u8| {
            Value::Map(vec![
                (Value::Text("slot".into()), Value::Integer(Integer::from(n))),
                (Value::Text("size".into()), Value::Integer(Integer::from(0x60000u32))),
            ])
        };
        let image = Value::Map(vec![
            (Value::Text("image".into()), Value::Integer(Integer::from(0u8))),
            (Value::Text("slots".into()), Value::Array(vec![slot(0), slot(1)])),
        ]);
        let update = h.reply(&mut group, Body::map().value("images", Value::Array(vec![image])));
        let GroupUpdate::Finished { output: GroupOutput::SlotInfo(images), .. } = update else {
            panic!("expected slot info");
        };
        assert_eq!(images[0].slots.len(), 2);
        assert_eq!(images[0].slots[1].size, Some(0x60000));
        assert_eq!(images[0].max_image_size, None);
    }

    #[test]
    fn test_erase_slot() {
        let mut h = Harness::new();
        let mut group = ImgGroup::new();
        assert!(group.start_image_erase(&mut h.link(), Some(1)));
        assert_eq!(h.last_body().uint("slot").unwrap(), Some(1));
        assert_eq!(h.reply(&mut group, Body::map()), GroupUpdate::complete(GroupOutput::None));
    }
}
