//! Little-endian field readers for binary headers.
//!
//! All readers are bounds-checked and return `None` past the end of the
//! buffer, so header parsers can bail with a real error instead of panicking
//! on truncated input.

pub fn u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a NUL-terminated string starting at `offset`, bounded by the buffer.
pub fn cstr(buf: &[u8], offset: usize) -> Option<&str> {
    let tail = buf.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    std::str::from_utf8(&tail[..end]).ok()
}
