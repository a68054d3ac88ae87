//! Binary module image format.
//!
//! ```text
//! header   magic "EMBM" | version u16 | flags u16 | section count u16 | reserved u16
//!          | body length u32 | SHA-256 of the body (32 bytes)
//! body     section directory (9 bytes per entry) | section data
//! ```
//!
//! Sections: manifest, string pool, types, members, code (prefix-encoded
//! expression trees) and references. All integers are little-endian.

pub mod reader;
pub mod section;
pub mod writer;

use thiserror::Error;

use crate::ir::{Accessibility, MemberKind, TypeKind};
pub use reader::decode;
pub use section::{SectionEntry, SectionKind};
pub use writer::encode;

pub const MAGIC: [u8; 4] = *b"EMBM";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 48;
pub const DIGEST_SIZE: usize = 32;

/// Index value meaning "none".
pub(crate) const NO_INDEX: u32 = u32::MAX;
/// Deepest expression nesting accepted when decoding code.
pub(crate) const MAX_EXPR_DEPTH: usize = 1024;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum DecodeError {
    #[error("Module image is too short: expected at least {expected} bytes, found {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("Invalid magic number {0:02x?}")]
    InvalidMagic([u8; 4]),
    #[error("Unsupported module format version {0}")]
    UnsupportedVersion(u16),
    #[error("Module body length mismatch: header declares {declared} bytes, found {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("Module digest does not match its content")]
    DigestMismatch,
    #[error("Invalid section kind 0x{0:02x}")]
    InvalidSectionKind(u8),
    #[error("Section `{0}` lies outside the module body")]
    SectionOutOfBounds(SectionKind),
    #[error("Missing section `{0}`")]
    MissingSection(SectionKind),
    #[error("Unexpected end of section data")]
    UnexpectedEnd,
    #[error("Invalid string index {0}")]
    InvalidString(u32),
    #[error("String pool entry is not valid UTF-8")]
    InvalidUtf8,
    #[error("Invalid {what} tag 0x{tag:02x}")]
    InvalidTag { what: &'static str, tag: u8 },
    #[error("Expression nesting is too deep")]
    NestingTooDeep,
    #[error("Dangling {what} index {index}")]
    DanglingIndex { what: &'static str, index: u32 },
}

pub(crate) fn type_kind_tag(kind: TypeKind) -> u8 {
    match kind {
        TypeKind::Class => 0,
        TypeKind::Struct => 1,
        TypeKind::Interface => 2,
        TypeKind::Enum => 3,
    }
}

pub(crate) fn type_kind_from_tag(tag: u8) -> Result<TypeKind, DecodeError> {
    match tag {
        0 => Ok(TypeKind::Class),
        1 => Ok(TypeKind::Struct),
        2 => Ok(TypeKind::Interface),
        3 => Ok(TypeKind::Enum),
        _ => Err(DecodeError::InvalidTag { what: "type kind", tag }),
    }
}

pub(crate) fn accessibility_tag(accessibility: Accessibility) -> u8 {
    match accessibility {
        Accessibility::Public => 0,
        Accessibility::Internal => 1,
        Accessibility::Protected => 2,
        Accessibility::Private => 3,
    }
}

pub(crate) fn accessibility_from_tag(tag: u8) -> Result<Accessibility, DecodeError> {
    match tag {
        0 => Ok(Accessibility::Public),
        1 => Ok(Accessibility::Internal),
        2 => Ok(Accessibility::Protected),
        3 => Ok(Accessibility::Private),
        _ => Err(DecodeError::InvalidTag { what: "accessibility", tag }),
    }
}

pub(crate) fn member_kind_tag(kind: MemberKind) -> u8 {
    match kind {
        MemberKind::Field => 0,
        MemberKind::Property => 1,
        MemberKind::Constructor => 2,
        MemberKind::Method => 3,
        MemberKind::EnumMember => 4,
    }
}

pub(crate) fn member_kind_from_tag(tag: u8) -> Result<MemberKind, DecodeError> {
    match tag {
        0 => Ok(MemberKind::Field),
        1 => Ok(MemberKind::Property),
        2 => Ok(MemberKind::Constructor),
        3 => Ok(MemberKind::Method),
        4 => Ok(MemberKind::EnumMember),
        _ => Err(DecodeError::InvalidTag { what: "member kind", tag }),
    }
}

pub(crate) mod flags {
    pub const STATIC: u8 = 0x01;
    pub const SEALED: u8 = 0x02;
    pub const ABSTRACT: u8 = 0x04;
    pub const READONLY: u8 = 0x08;
}

pub(crate) mod value_tag {
    pub const VOID: u8 = 0;
    pub const NULL: u8 = 1;
    pub const BOOL: u8 = 2;
    pub const INT: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const STRING: u8 = 5;
    pub const NONE: u8 = 0xff;
}

pub(crate) mod opcode {
    pub const CONST: u8 = 0x01;
    pub const PARAM: u8 = 0x02;
    pub const UNARY: u8 = 0x03;
    pub const BINARY: u8 = 0x04;
    pub const TO_DOUBLE: u8 = 0x05;
    pub const CALL: u8 = 0x06;
    pub const LOAD_STATIC: u8 = 0x07;
    pub const DISCARD: u8 = 0x08;
}
