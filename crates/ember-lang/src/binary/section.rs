use std::fmt::{self, Display, Formatter};

use super::DecodeError;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Manifest = 0x01,
    StringPool = 0x02,
    Types = 0x03,
    Members = 0x04,
    Code = 0x05,
    References = 0x06,
}

impl SectionKind {
    /// Sections in the order the writer lays them out.
    pub const ALL: [SectionKind; 6] = [
        SectionKind::Manifest,
        SectionKind::StringPool,
        SectionKind::Types,
        SectionKind::Members,
        SectionKind::Code,
        SectionKind::References,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(SectionKind::Manifest),
            0x02 => Some(SectionKind::StringPool),
            0x03 => Some(SectionKind::Types),
            0x04 => Some(SectionKind::Members),
            0x05 => Some(SectionKind::Code),
            0x06 => Some(SectionKind::References),
            _ => None,
        }
    }
}

impl Display for SectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionKind::Manifest => "manifest",
            SectionKind::StringPool => "string pool",
            SectionKind::Types => "types",
            SectionKind::Members => "members",
            SectionKind::Code => "code",
            SectionKind::References => "references",
        };
        f.write_str(s)
    }
}

/// Directory entry locating one section inside the module body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionEntry {
    pub kind: SectionKind,
    /// Offset from the start of the body.
    pub offset: u32,
    pub size: u32,
}

impl SectionEntry {
    pub const ENTRY_SIZE: usize = 9;

    pub fn new(kind: SectionKind, offset: u32, size: u32) -> Self {
        Self { kind, offset, size }
    }

    pub fn to_bytes(&self) -> [u8; Self::ENTRY_SIZE] {
        let mut bytes = [0u8; Self::ENTRY_SIZE];
        bytes[0] = self.kind as u8;
        bytes[1..5].copy_from_slice(&self.offset.to_le_bytes());
        bytes[5..9].copy_from_slice(&self.size.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < Self::ENTRY_SIZE {
            return Err(DecodeError::UnexpectedEnd);
        }

        let kind = SectionKind::from_u8(bytes[0]).ok_or(DecodeError::InvalidSectionKind(bytes[0]))?;
        let offset = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let size = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);

        Ok(Self { kind, offset, size })
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.size as usize
    }
}
