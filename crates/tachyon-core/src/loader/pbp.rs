//! PBP package container.
//!
//! A PBP is eight members behind a fixed offset table: PARAM.SFO, four
//! artwork images, a sound file, DATA.PSP (the executable) and DATA.PSAR.
//! Only the SFO and the executable matter here; artwork and sound are the
//! front end's business.

use tachyon_utils::bytes::u32_le;

use crate::error::LoadError;

pub const PBP_MAGIC: [u8; 4] = [0x00, b'P', b'B', b'P'];

const MEMBER_COUNT: usize = 8;
const OFFSET_TABLE: usize = 0x08;
const HEADER_SIZE: usize = OFFSET_TABLE + MEMBER_COUNT * 4;

const MEMBER_PARAM_SFO: usize = 0;
const MEMBER_DATA_PSP: usize = 6;

pub struct PbpFile<'a> {
    data: &'a [u8],
    offsets: [u32; MEMBER_COUNT],
}

impl<'a> PbpFile<'a> {
    pub fn parse(data: &'a [u8]) -> Result<PbpFile<'a>, LoadError> {
        if data.get(..4) != Some(&PBP_MAGIC) {
            return Err(LoadError::InvalidFormat("bad PBP magic".into()));
        }
        if data.len() < HEADER_SIZE {
            return Err(LoadError::InvalidFormat("truncated PBP header".into()));
        }

        let mut offsets = [0u32; MEMBER_COUNT];
        for (index, offset) in offsets.iter_mut().enumerate() {
            *offset = u32_le(data, OFFSET_TABLE + index * 4)
                .ok_or_else(|| LoadError::InvalidFormat("truncated PBP header".into()))?;
        }
        // Offsets must be ordered and inside the file; members are the gaps
        // between consecutive offsets.
        for window in offsets.windows(2) {
            if window[0] > window[1] {
                return Err(LoadError::InvalidFormat("PBP offsets out of order".into()));
            }
        }
        if offsets[MEMBER_COUNT - 1] as usize > data.len() {
            return Err(LoadError::InvalidFormat("PBP offsets past end of file".into()));
        }

        Ok(PbpFile { data, offsets })
    }

    fn member(&self, index: usize) -> Option<&'a [u8]> {
        let start = self.offsets[index] as usize;
        let end = match self.offsets.get(index + 1) {
            Some(&next) => next as usize,
            None => self.data.len(),
        };
        (start < end).then(|| &self.data[start..end])
    }

    /// The embedded PARAM.SFO, when the package carries one.
    pub fn param_sfo(&self) -> Option<&'a [u8]> {
        self.member(MEMBER_PARAM_SFO)
    }

    /// The executable member (DATA.PSP).
    pub fn executable(&self) -> Result<&'a [u8], LoadError> {
        self.member(MEMBER_DATA_PSP)
            .ok_or_else(|| LoadError::InvalidFormat("PBP has no executable member".into()))
    }
}
