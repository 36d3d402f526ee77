//! MCUboot image inspection.
//!
//! An MCUboot image is a header, the firmware, then a TLV area:
//!
//! ```text
//! +--------+----------------+--------------------+----------------------+
//! | header | image data     | protected TLVs     | unprotected TLVs     |
//! | 32 B   | img_size bytes | 0x6908, tot, TLVs  | 0x6907, tot, TLVs    |
//! +--------+----------------+--------------------+----------------------+
//! ```
//!
//! The device identifies images by the SHA TLV in the unprotected area,
//! which is what image state commands expect.

use sha2::{Digest, Sha256};

/// MCUboot image header magic.
pub const IMAGE_MAGIC: u32 = 0x96f3_b83d;

/// Unprotected TLV area magic.
pub const TLV_INFO_MAGIC: u16 = 0x6907;

/// Protected TLV area magic.
pub const TLV_PROT_INFO_MAGIC: u16 = 0x6908;

/// SHA-256 of header and image.
pub const TLV_SHA256: u16 = 0x10;
pub const TLV_SHA384: u16 = 0x11;
pub const TLV_SHA512: u16 = 0x12;

const HEADER_SIZE: usize = 32;

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Image version from an MCUboot header, as `major.minor.revision+build`.
pub fn image_version(data: &[u8]) -> Option<String> {
    if data.len() < HEADER_SIZE || read_u32(data, 0)? != IMAGE_MAGIC {
        return None;
    }
    Some(format!(
        "{}.{}.{}+{}",
        data[20],
        data[21],
        read_u16(data, 22)?,
        read_u32(data, 24)?
    ))
}

/// Extract the SHA TLV of an MCUboot image.
///
/// Returns `None` if `data` is not an MCUboot image or carries no SHA TLV.
pub fn mcuboot_image_hash(data: &[u8]) -> Option<Vec<u8>> {
    if read_u32(data, 0)? != IMAGE_MAGIC {
        return None;
    }

    let header_size = read_u16(data, 8)? as usize;
    let protected_size = read_u16(data, 10)? as usize;
    let image_size = read_u32(data, 12)? as usize;

    let mut offset = header_size.checked_add(image_size)?;

    if protected_size > 0 {
        if read_u16(data, offset)? != TLV_PROT_INFO_MAGIC {
            return None;
        }
        offset = offset.checked_add(protected_size)?;
    }

    if read_u16(data, offset)? != TLV_INFO_MAGIC {
        return None;
    }
    let total = read_u16(data, offset + 2)? as usize;
    let end = offset.checked_add(total)?;
    let mut entry = offset + 4;

    while entry + 4 <= end {
        let kind = read_u16(data, entry)?;
        let len = read_u16(data, entry + 2)? as usize;
        let value = data.get(entry + 4..entry + 4 + len)?;

        if matches!(kind, TLV_SHA256 | TLV_SHA384 | TLV_SHA512) {
            return Some(value.to_vec());
        }
        entry += 4 + len;
    }

    None
}

/// SHA-256 of the whole file.
pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Hash identifying an image on the device: the MCUboot SHA TLV when
/// present, else the SHA-256 of the file.
pub fn image_hash(data: &[u8]) -> Vec<u8> {
    mcuboot_image_hash(data).unwrap_or_else(|| sha256(data))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a minimal MCUboot image with a SHA-256 TLV.
    pub(crate) fn build_image(payload: &[u8], with_protected: bool) -> (Vec<u8>, Vec<u8>) {
        let mut image = Vec::new();
        let protected: Vec<u8> = if with_protected {
            // one 4-byte TLV (type 0x50, len 0) preceded by the info header
            let mut p = Vec::new();
            p.extend_from_slice(&TLV_PROT_INFO_MAGIC.to_le_bytes());
            p.extend_from_slice(&8u16.to_le_bytes());
            p.extend_from_slice(&0x50u16.to_le_bytes());
            p.extend_from_slice(&0u16.to_le_bytes());
            p
        } else {
            Vec::new()
        };

        image.extend_from_slice(&IMAGE_MAGIC.to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes()); // load address
        image.extend_from_slice(&(HEADER_SIZE as u16).to_le_bytes());
        image.extend_from_slice(&(protected.len() as u16).to_le_bytes());
        image.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        image.extend_from_slice(&0u32.to_le_bytes()); // flags
        image.extend_from_slice(&[1, 2]); // major, minor
        image.extend_from_slice(&3u16.to_le_bytes()); // revision
        image.extend_from_slice(&4u32.to_le_bytes()); // build
        image.extend_from_slice(&0u32.to_le_bytes()); // pad
        assert_eq!(image.len(), HEADER_SIZE);

        image.extend_from_slice(payload);
        image.extend_from_slice(&protected);

        let hash = sha256(&image);
        image.extend_from_slice(&TLV_INFO_MAGIC.to_le_bytes());
        image.extend_from_slice(&(4u16 + 4 + 32).to_le_bytes());
        image.extend_from_slice(&TLV_SHA256.to_le_bytes());
        image.extend_from_slice(&32u16.to_le_bytes());
        image.extend_from_slice(&hash);

        (image, hash)
    }

    #[test]
    fn test_mcuboot_hash() {
        let (image, hash) = build_image(&[0xee; 100], false);
        assert_eq!(mcuboot_image_hash(&image), Some(hash.clone()));
        assert_eq!(image_hash(&image), hash);
        assert_eq!(image_version(&image).as_deref(), Some("1.2.3+4"));
    }

    #[test]
    fn test_mcuboot_hash_after_protected_area() {
        let (image, hash) = build_image(&[0x11; 40], true);
        assert_eq!(mcuboot_image_hash(&image), Some(hash));
    }

    #[test]
    fn test_plain_file_falls_back_to_sha256() {
        let data = b"not an image".to_vec();
        assert_eq!(mcuboot_image_hash(&data), None);
        assert_eq!(
            hex::encode(image_hash(&data)),
            hex::encode(Sha256::digest(&data))
        );
        assert_eq!(image_version(&data), None);
    }

    #[test]
    fn test_truncated_image() {
        let (image, _) = build_image(&[0x22; 64], false);
        assert_eq!(mcuboot_image_hash(&image[..image.len() - 10]), None);
    }
}
