//! CRC16 used by the SMP serial framing.

use crc::{Crc, CRC_16_XMODEM};

/// CRC-16 with polynomial 0x1021 and initial value 0, as verified by the
/// device-side SMP serial transport.
const SMP_CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Compute the framing CRC over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    SMP_CRC16.checksum(data)
}
