//! File system management group.

use std::sync::Arc;

use ciborium::value::Value;
use smp_protocol::{
    value_to_i64, Body, Op, ProtocolError, ResponseBody, FS_CMD_CLOSE, FS_CMD_FILE,
    FS_CMD_HASH_CHECKSUM, FS_CMD_STATUS, FS_CMD_SUPPORTED_HASHES, GROUP_FS, SMP_HEADER_SIZE,
};
use tracing::{debug, trace, warn};

use super::{invalid, percent, response_body, Group, GroupUpdate, Link};
use crate::output::{FileHash, GroupOutput, HashKind, HashValue};
use crate::processor::RequestOutcome;

#[derive(Debug)]
struct Upload {
    name: String,
    data: Arc<Vec<u8>>,
    offset: usize,
}

#[derive(Debug)]
struct Download {
    name: String,
    data: Vec<u8>,
    /// Total size, known from the first response.
    length: Option<usize>,
}

#[derive(Debug)]
enum FsOperation {
    Upload(Upload),
    Download(Download),
    Status,
    HashChecksum,
    SupportedHashes,
    Close,
}

/// File system management: transfers, status and hashes of remote files.
#[derive(Debug, Default)]
pub struct FsGroup {
    operation: Option<FsOperation>,
}

impl FsGroup {
    pub fn new() -> Self {
        FsGroup::default()
    }

    fn start(
        &mut self,
        link: &mut Link<'_>,
        operation: FsOperation,
        op: Op,
        command: u8,
        body: Body,
    ) -> bool {
        if !link.send_body(op, GROUP_FS, command, body) {
            return false;
        }
        self.operation = Some(operation);
        true
    }

    /// Write `data` to the remote file `name`.
    pub fn start_upload(&mut self, link: &mut Link<'_>, name: &str, data: Arc<Vec<u8>>) -> bool {
        let upload = Upload {
            name: name.to_string(),
            data,
            offset: 0,
        };
        if !send_upload_chunk(link, &upload) {
            return false;
        }
        self.operation = Some(FsOperation::Upload(upload));
        true
    }

    /// Read the remote file `name`. The output is the file contents.
    pub fn start_download(&mut self, link: &mut Link<'_>, name: &str) -> bool {
        let body = Body::map().text("name", name).uint("off", 0);
        let download = Download {
            name: name.to_string(),
            data: Vec::new(),
            length: None,
        };
        self.start(link, FsOperation::Download(download), Op::Read, FS_CMD_FILE, body)
    }

    pub fn start_status(&mut self, link: &mut Link<'_>, name: &str) -> bool {
        let body = Body::map().text("name", name);
        self.start(link, FsOperation::Status, Op::Read, FS_CMD_STATUS, body)
    }

    /// Hash or checksum the remote file with `kind`, or the device default.
    pub fn start_hash_checksum(&mut self, link: &mut Link<'_>, name: &str, kind: Option<&str>) -> bool {
        let mut body = Body::map().text("name", name);
        if let Some(kind) = kind {
            body = body.text("type", kind);
        }
        self.start(link, FsOperation::HashChecksum, Op::Read, FS_CMD_HASH_CHECKSUM, body)
    }

    pub fn start_supported_hashes(&mut self, link: &mut Link<'_>) -> bool {
        self.start(
            link,
            FsOperation::SupportedHashes,
            Op::Read,
            FS_CMD_SUPPORTED_HASHES,
            Body::map(),
        )
    }

    /// Close any file the device holds open from an earlier transfer.
    pub fn start_close(&mut self, link: &mut Link<'_>) -> bool {
        self.start(link, FsOperation::Close, Op::Write, FS_CMD_CLOSE, Body::map())
    }

    fn upload_response(&mut self, link: &mut Link<'_>, mut upload: Upload, body: ResponseBody) -> GroupUpdate {
        let total = upload.data.len();
        let offset = match body.require_uint("off") {
            Ok(offset) => offset as usize,
            Err(e) => return invalid(e),
        };

        if offset > total {
            return GroupUpdate::error(format!(
                "device reported offset {} beyond file size {}",
                offset, total
            ));
        }
        if offset == total {
            debug!("Upload of {} complete ({} bytes)", upload.name, total);
            return GroupUpdate::complete(GroupOutput::BytesSent(total as u64));
        }

        upload.offset = offset;
        if !send_upload_chunk(link, &upload) {
            return GroupUpdate::error("failed to send file chunk");
        }

        let progress = percent(offset as u64, total as u64);
        self.operation = Some(FsOperation::Upload(upload));
        GroupUpdate::Progress(progress)
    }

    fn download_response(
        &mut self,
        link: &mut Link<'_>,
        mut download: Download,
        body: ResponseBody,
    ) -> GroupUpdate {
        let parsed = (|| -> Result<(usize, Vec<u8>, Option<u64>), ProtocolError> {
            Ok((
                body.require_uint("off")? as usize,
                body.bytes("data")?.ok_or(ProtocolError::MissingField("data"))?,
                body.uint("len")?,
            ))
        })();
        let (offset, data, length) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return invalid(e),
        };

        if offset != download.data.len() {
            return GroupUpdate::error(format!(
                "device returned offset {}, expected {}",
                offset,
                download.data.len()
            ));
        }

        if offset == 0 {
            match length {
                Some(length) => download.length = Some(length as usize),
                None => return invalid(ProtocolError::MissingField("len")),
            }
        }
        let total = download.length.unwrap_or(0);

        download.data.extend_from_slice(&data);
        let received = download.data.len();
        trace!("Downloaded {} of {} bytes", received, total);

        if received >= total {
            download.data.truncate(total);
            debug!("Download of {} complete ({} bytes)", download.name, total);
            return GroupUpdate::complete(GroupOutput::FileData(download.data));
        }
        if data.is_empty() {
            return GroupUpdate::error("device returned no data before end of file");
        }

        let request = Body::map()
            .text("name", download.name.as_str())
            .uint("off", received as u64);
        if !link.send_body(Op::Read, GROUP_FS, FS_CMD_FILE, request) {
            return GroupUpdate::error("failed to request file chunk");
        }

        let progress = percent(received as u64, total as u64);
        self.operation = Some(FsOperation::Download(download));
        GroupUpdate::Progress(progress)
    }
}

fn upload_body(upload: &Upload, len: usize) -> Body {
    let data = &upload.data[upload.offset..upload.offset + len];
    let body = Body::map()
        .text("name", upload.name.as_str())
        .uint("off", upload.offset as u64)
        .bytes("data", data);
    if upload.offset == 0 {
        body.uint("len", upload.data.len() as u64)
    } else {
        body
    }
}

/// Send the largest chunk at `upload.offset` whose packet fits.
fn send_upload_chunk(link: &mut Link<'_>, upload: &Upload) -> bool {
    let max_packet = link.max_packet_size();
    let mut len = (upload.data.len() - upload.offset).min(max_packet);

    loop {
        let encoded = match upload_body(upload, len).encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode file chunk: {}", e);
                return false;
            }
        };

        let packet = SMP_HEADER_SIZE + encoded.len();
        if packet <= max_packet {
            return link.send(Op::Write, GROUP_FS, FS_CMD_FILE, encoded);
        }

        let excess = packet - max_packet;
        if excess >= len {
            warn!("MTU too small to carry file data ({} bytes)", max_packet);
            return false;
        }
        len -= excess;
    }
}

fn parse_hash(body: &ResponseBody) -> Result<FileHash, ProtocolError> {
    let value = match body.get("output") {
        Some(Value::Bytes(bytes)) => HashValue::Bytes(bytes.clone()),
        Some(value) => match value_to_i64(value) {
            Some(n) if n >= 0 => HashValue::Integer(n as u64),
            _ => return Err(ProtocolError::invalid_field("output", "expected bytes or integer")),
        },
        None => return Err(ProtocolError::MissingField("output")),
    };

    Ok(FileHash {
        kind: body.text("type")?.unwrap_or_default(),
        offset: body.uint("off")?.unwrap_or(0),
        length: body.require_uint("len")?,
        value,
    })
}

fn parse_hash_kinds(body: &ResponseBody) -> Result<Vec<HashKind>, ProtocolError> {
    let Some(Value::Map(types)) = body.get("types") else {
        return Err(ProtocolError::MissingField("types"));
    };

    types
        .iter()
        .map(|(name, info)| -> Result<HashKind, ProtocolError> {
            let name = name
                .as_text()
                .ok_or_else(|| ProtocolError::invalid_field("types", "expected type name"))?
                .to_string();
            let info = ResponseBody::from_value(info.clone())?;
            Ok(HashKind {
                name,
                format: info.uint("format")?,
                size: info.uint("size")?,
            })
        })
        .collect()
}

impl Group for FsGroup {
    fn group_id(&self) -> u16 {
        GROUP_FS
    }

    fn receive(&mut self, link: &mut Link<'_>, outcome: RequestOutcome) -> GroupUpdate {
        let Some(operation) = self.operation.take() else {
            warn!("File system group received a response with no operation running");
            return GroupUpdate::error("no operation in progress");
        };

        let body = match response_body(outcome) {
            Ok(body) => body,
            Err(update) => return update,
        };

        let parsed = match operation {
            FsOperation::Upload(upload) => return self.upload_response(link, upload, body),
            FsOperation::Download(download) => return self.download_response(link, download, body),
            FsOperation::Status => body.require_uint("len").map(GroupOutput::FileSize),
            FsOperation::HashChecksum => parse_hash(&body).map(GroupOutput::FileHash),
            FsOperation::SupportedHashes => parse_hash_kinds(&body).map(GroupOutput::HashKinds),
            FsOperation::Close => Ok(GroupOutput::None),
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
