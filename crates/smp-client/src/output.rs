//! Results returned by finished operations.

use ciborium::value::Value;

/// One image slot as reported by the image state command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageSlotState {
    pub image: u64,
    pub slot: u64,
    pub version: String,
    pub hash: Vec<u8>,
    pub bootable: bool,
    pub pending: bool,
    pub confirmed: bool,
    pub active: bool,
    pub permanent: bool,
}

/// Size information of one image slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSize {
    pub slot: u64,
    pub size: Option<u64>,
    pub upload_image_id: Option<u64>,
}

/// Slots of one image, as reported by the slot info command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSlots {
    pub image: u64,
    pub slots: Vec<SlotSize>,
    pub max_image_size: Option<u64>,
}

/// One thread as reported by the task statistics command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInfo {
    pub name: String,
    pub priority: Option<i64>,
    pub task_id: Option<u64>,
    pub state: Option<u64>,
    pub stack_use: Option<u64>,
    pub stack_size: Option<u64>,
    pub context_switches: Option<u64>,
    pub runtime: Option<u64>,
}

/// One memory pool as reported by the memory pool command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryPool {
    pub name: String,
    pub block_size: Option<u64>,
    pub blocks: Option<u64>,
    pub free: Option<u64>,
    pub minimum: Option<u64>,
}

/// Hash or checksum of a remote file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHash {
    /// Algorithm name, e.g. `sha256` or `crc32`.
    pub kind: String,
    pub offset: u64,
    pub length: u64,
    pub value: HashValue,
}

/// Hashes are byte strings, checksums integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashValue {
    Bytes(Vec<u8>),
    Integer(u64),
}

/// A hash or checksum algorithm supported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashKind {
    pub name: String,
    pub format: Option<u64>,
    pub size: Option<u64>,
}

/// Details of one management group from the enumeration group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDetails {
    pub group: u16,
    pub name: Option<String>,
    pub handlers: Option<u64>,
}

/// What an operation produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum GroupOutput {
    /// Nothing beyond the status.
    #[default]
    None,
    /// Free text: echo reply, application info, device date-time.
    Text(String),
    /// Hash identifying an uploaded image.
    ImageHash(Vec<u8>),
    ImageStates(Vec<ImageSlotState>),
    SlotInfo(Vec<ImageSlots>),
    Tasks(Vec<TaskInfo>),
    MemoryPools(Vec<MemoryPool>),
    McumgrParameters { buffer_size: u64, buffer_count: u64 },
    /// A response map shown as-is (bootloader info).
    Map(Value),
    /// Downloaded file contents.
    FileData(Vec<u8>),
    /// Number of bytes sent to the device.
    BytesSent(u64),
    FileSize(u64),
    FileHash(FileHash),
    HashKinds(Vec<HashKind>),
    GroupCount(u64),
    GroupIds(Vec<u16>),
    GroupSingle { group: u16, end: bool },
    GroupDetails(Vec<GroupDetails>),
    ShellOutput { output: String, ret: i64 },
    Statistics { name: String, fields: Vec<(String, u64)> },
    StatisticsGroups(Vec<String>),
    SettingValue(Vec<u8>),
}
