//! PARAM.SFO system file objects.
//!
//! A binary key/value table shipped inside every PBP package and disc. The
//! scheduler cares about three keys: `MEMSIZE` (remastered releases run with
//! doubled guest RAM), `TITLE` and `DISC_ID` (recent-files label and
//! symbol-map naming).

use tachyon_utils::bytes::{cstr, u16_le, u32_le};

use crate::error::LoadError;

pub const SFO_MAGIC: [u8; 4] = [0x00, b'P', b'S', b'F'];

const FMT_UTF8_SPECIAL: u16 = 0x0004;
const FMT_UTF8: u16 = 0x0204;
const FMT_U32: u16 = 0x0404;

const INDEX_TABLE_OFFSET: usize = 0x14;
const INDEX_ENTRY_SIZE: usize = 0x10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SfoValue {
    Text(String),
    Int(u32),
}

#[derive(Debug, Default)]
pub struct SfoFile {
    entries: Vec<(String, SfoValue)>,
}

fn truncated() -> LoadError {
    LoadError::InvalidFormat("truncated PARAM.SFO".into())
}

impl SfoFile {
    pub fn parse(data: &[u8]) -> Result<SfoFile, LoadError> {
        if data.get(..4) != Some(&SFO_MAGIC) {
            return Err(LoadError::InvalidFormat("bad PARAM.SFO magic".into()));
        }
        let key_table = u32_le(data, 0x08).ok_or_else(truncated)? as usize;
        let data_table = u32_le(data, 0x0c).ok_or_else(truncated)? as usize;
        let entry_count = u32_le(data, 0x10).ok_or_else(truncated)? as usize;

        let mut sfo = SfoFile::default();
        for index in 0..entry_count {
            let at = INDEX_TABLE_OFFSET + index * INDEX_ENTRY_SIZE;
            let key_offset = u16_le(data, at).ok_or_else(truncated)? as usize;
            let fmt = u16_le(data, at + 0x02).ok_or_else(truncated)?;
            let len = u32_le(data, at + 0x04).ok_or_else(truncated)? as usize;
            let value_offset = u32_le(data, at + 0x0c).ok_or_else(truncated)? as usize;

            let key = cstr(data, key_table + key_offset)
                .ok_or_else(truncated)?
                .to_owned();
            let raw = data
                .get(data_table + value_offset..data_table + value_offset + len)
                .ok_or_else(truncated)?;

            let value = match fmt {
                FMT_UTF8 | FMT_UTF8_SPECIAL => {
                    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                    let text = std::str::from_utf8(&raw[..end])
                        .map_err(|_| LoadError::InvalidFormat("non-UTF-8 SFO value".into()))?;
                    SfoValue::Text(text.to_owned())
                }
                FMT_U32 => {
                    if raw.len() < 4 {
                        return Err(truncated());
                    }
                    SfoValue::Int(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
                }
                other => {
                    return Err(LoadError::InvalidFormat(format!(
                        "unknown SFO value format {other:#06x}"
                    )));
                }
            };
            sfo.entries.push((key, value));
        }
        Ok(sfo)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.entries.iter().find_map(|(k, v)| match v {
            SfoValue::Text(s) if k == key => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn int(&self, key: &str) -> Option<u32> {
        self.entries.iter().find_map(|(k, v)| match v {
            SfoValue::Int(n) if k == key => Some(*n),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
