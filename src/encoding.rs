//! Binary encoding primitives for instruction immediates.
//!
//! All writers append to a caller-provided `&mut Vec<u8>`.

use byteorder::{ByteOrder, LittleEndian};

/// Expression terminator.
pub const OP_END: u8 = 0x0B;

/// Byte width of a padded u32 LEB128, the largest a u32 can take.
pub const PADDED_U32_WIDTH: usize = 5;

/// Appends the unsigned LEB128 encoding of `value`.
pub fn write_vu32(buf: &mut Vec<u8>, value: u32) {
    let mut value = value as u64;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Appends `value` as a fixed five-byte LEB128, so it can be rewritten in
/// place later without shifting the bytes after it.
pub fn write_padded_vu32(buf: &mut Vec<u8>, value: u32) {
    let at = buf.len();
    buf.resize(at + PADDED_U32_WIDTH, 0);
    patch_padded_vu32(&mut buf[at..at + PADDED_U32_WIDTH], value);
}

/// Overwrites a five-byte slot written by [`write_padded_vu32`].
pub fn patch_padded_vu32(slot: &mut [u8], value: u32) {
    let mut value = value;
    for (i, byte) in slot.iter_mut().enumerate().take(PADDED_U32_WIDTH) {
        *byte = (value & 0x7f) as u8;
        value >>= 7;
        if i < PADDED_U32_WIDTH - 1 {
            *byte |= 0x80;
        }
    }
}

fn write_vs(buf: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0) {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Appends the signed LEB128 encoding of an i32.
pub fn write_vs32(buf: &mut Vec<u8>, value: i32) {
    write_vs(buf, value as i64);
}

/// Appends the signed LEB128 encoding of an i64.
pub fn write_vs64(buf: &mut Vec<u8>, value: i64) {
    write_vs(buf, value);
}

/// Appends the little-endian IEEE 754 bits of an f32.
pub fn write_f32(buf: &mut Vec<u8>, value: f32) {
    let mut bytes = [0u8; 4];
    LittleEndian::write_f32(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

/// Appends the little-endian IEEE 754 bits of an f64.
pub fn write_f64(buf: &mut Vec<u8>, value: f64) {
    let mut bytes = [0u8; 8];
    LittleEndian::write_f64(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}
