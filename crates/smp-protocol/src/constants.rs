//! Protocol constants
//!
//! Management group identifiers, command identifiers within each group and
//! header layout values used by SMP.

// ============================================================================
// Header
// ============================================================================

/// Size of the SMP header in bytes.
pub const SMP_HEADER_SIZE: usize = 8;

/// Version field value for legacy SMP (v1).
pub const SMP_VERSION_1: u8 = 0;
/// Version field value for SMP v2.
pub const SMP_VERSION_2: u8 = 1;

/// Default SMP MTU.
pub const DEFAULT_SMP_MTU: u16 = 256;
/// Smallest MTU accepted by the client.
pub const MIN_SMP_MTU: u16 = 96;
/// Largest MTU accepted by the client.
pub const MAX_SMP_MTU: u16 = 16384;

// ============================================================================
// Group IDs
// ============================================================================

/// OS (default) management group.
pub const GROUP_OS: u16 = 0;
/// Application/software image management group.
pub const GROUP_IMG: u16 = 1;
/// Statistics management group.
pub const GROUP_STAT: u16 = 2;
/// Settings (config) management group.
pub const GROUP_SETTINGS: u16 = 3;
/// File system management group.
pub const GROUP_FS: u16 = 8;
/// Shell management group.
pub const GROUP_SHELL: u16 = 9;
/// Enumeration management group.
pub const GROUP_ENUM: u16 = 10;
/// Zephyr basic management group.
pub const GROUP_ZEPHYR: u16 = 63;

// ============================================================================
// OS group commands
// ============================================================================

/// Echo text back.
pub const OS_CMD_ECHO: u8 = 0;
/// Task/thread statistics.
pub const OS_CMD_TASK_STATS: u8 = 2;
/// Memory pool statistics.
pub const OS_CMD_MEMORY_POOL: u8 = 3;
/// Date-time get (read) and set (write).
pub const OS_CMD_DATE_TIME: u8 = 4;
/// System reset.
pub const OS_CMD_RESET: u8 = 5;
/// MCUmgr buffer parameters.
pub const OS_CMD_MCUMGR_PARAMETERS: u8 = 6;
/// OS/application information.
pub const OS_CMD_APPLICATION_INFO: u8 = 7;
/// Bootloader information.
pub const OS_CMD_BOOTLOADER_INFO: u8 = 8;

// ============================================================================
// Image group commands
// ============================================================================

/// Image state get (read) and set (write).
pub const IMG_CMD_STATE: u8 = 0;
/// Image upload.
pub const IMG_CMD_UPLOAD: u8 = 1;
/// Slot erase.
pub const IMG_CMD_ERASE: u8 = 5;
/// Slot information.
pub const IMG_CMD_SLOT_INFO: u8 = 6;

// ============================================================================
// Statistics group commands
// ============================================================================

/// Read the data of one statistics group.
pub const STAT_CMD_GROUP_DATA: u8 = 0;
/// List statistics groups.
pub const STAT_CMD_LIST_GROUPS: u8 = 1;

// ============================================================================
// Settings group commands
// ============================================================================

/// Read (read) or write (write) a setting.
pub const SETTINGS_CMD_READ_WRITE: u8 = 0;
/// Delete a setting.
pub const SETTINGS_CMD_DELETE: u8 = 1;
/// Commit settings.
pub const SETTINGS_CMD_COMMIT: u8 = 2;
/// Load (read) or save (write) settings.
pub const SETTINGS_CMD_LOAD_SAVE: u8 = 3;

// ============================================================================
// File system group commands
// ============================================================================

/// File download (read) and upload (write).
pub const FS_CMD_FILE: u8 = 0;
/// File status.
pub const FS_CMD_STATUS: u8 = 1;
/// File hash/checksum.
pub const FS_CMD_HASH_CHECKSUM: u8 = 2;
/// Supported hash/checksum types.
pub const FS_CMD_SUPPORTED_HASHES: u8 = 3;
/// Close opened file.
pub const FS_CMD_CLOSE: u8 = 4;

// ============================================================================
// Shell group commands
// ============================================================================

/// Execute a shell command line.
pub const SHELL_CMD_EXECUTE: u8 = 0;

// ============================================================================
// Enumeration group commands
// ============================================================================

/// Number of supported groups.
pub const ENUM_CMD_COUNT: u8 = 0;
/// List of supported group IDs.
pub const ENUM_CMD_LIST: u8 = 1;
/// Information on a single group by index.
pub const ENUM_CMD_SINGLE: u8 = 2;
/// Details of supported groups.
pub const ENUM_CMD_DETAILS: u8 = 3;

// ============================================================================
// Zephyr group commands
// ============================================================================

/// Erase the storage partition.
pub const ZEPHYR_CMD_STORAGE_ERASE: u8 = 0;

// ============================================================================
// Management return codes
// ============================================================================

/// Success.
pub const MGMT_ERR_OK: i64 = 0;
/// Unknown error.
pub const MGMT_ERR_UNKNOWN: i64 = 1;
/// Insufficient memory.
pub const MGMT_ERR_NO_MEMORY: i64 = 2;
/// Error in input value.
pub const MGMT_ERR_IN_VALUE: i64 = 3;
/// Operation timed out.
pub const MGMT_ERR_TIMEOUT: i64 = 4;
/// No such file/entry.
pub const MGMT_ERR_NO_ENTRY: i64 = 5;
/// Current state disallows command.
pub const MGMT_ERR_BAD_STATE: i64 = 6;
/// Response too large.
pub const MGMT_ERR_TOO_LARGE: i64 = 7;
/// Command not supported.
pub const MGMT_ERR_NOT_SUPPORTED: i64 = 8;
/// Corrupt data.
pub const MGMT_ERR_CORRUPT: i64 = 9;
/// Command blocked by processing of other command.
pub const MGMT_ERR_BUSY: i64 = 10;
/// Access to specific function, command or resource denied.
pub const MGMT_ERR_ACCESS_DENIED: i64 = 11;
/// Requested SMP protocol version is not supported (too old).
pub const MGMT_ERR_UNSUPPORTED_TOO_OLD: i64 = 12;
/// Requested SMP protocol version is not supported (too new).
pub const MGMT_ERR_UNSUPPORTED_TOO_NEW: i64 = 13;
