use sha2::{Digest, Sha256};

use super::{
    DIGEST_SIZE, DecodeError, FORMAT_VERSION, HEADER_SIZE, MAGIC, MAX_EXPR_DEPTH, NO_INDEX, SectionEntry,
    SectionKind, accessibility_from_tag, flags, member_kind_from_tag, opcode, type_kind_from_tag, value_tag,
};
use crate::ir::{BinaryOp, Expr, MemberDef, Module, ParamDef, TypeDef, UnaryOp};
use crate::value::Value;

#[derive(Debug)]
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::UnexpectedEnd)?;
        let bytes = self.data.get(self.pos..end).ok_or(DecodeError::UnexpectedEnd)?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(self.u64()? as i64)
    }
}

pub(crate) fn unary_op_from_tag(tag: u8) -> Result<UnaryOp, DecodeError> {
    match tag {
        0 => Ok(UnaryOp::Not),
        1 => Ok(UnaryOp::Negate),
        _ => Err(DecodeError::InvalidTag {
            what: "unary operator",
            tag,
        }),
    }
}

pub(crate) fn binary_op_from_tag(tag: u8) -> Result<BinaryOp, DecodeError> {
    let op = match tag {
        0 => BinaryOp::Add,
        1 => BinaryOp::Sub,
        2 => BinaryOp::Mul,
        3 => BinaryOp::Div,
        4 => BinaryOp::Rem,
        5 => BinaryOp::Concat,
        6 => BinaryOp::Eq,
        7 => BinaryOp::Ne,
        8 => BinaryOp::Lt,
        9 => BinaryOp::Lte,
        10 => BinaryOp::Gt,
        11 => BinaryOp::Gte,
        12 => BinaryOp::And,
        13 => BinaryOp::Or,
        _ => {
            return Err(DecodeError::InvalidTag {
                what: "binary operator",
                tag,
            });
        }
    };
    Ok(op)
}

/// Section data located by the directory.
struct Sections<'a> {
    body: &'a [u8],
    entries: Vec<SectionEntry>,
}

impl<'a> Sections<'a> {
    fn get(&self, kind: SectionKind) -> Result<&'a [u8], DecodeError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.kind == kind)
            .ok_or(DecodeError::MissingSection(kind))?;
        self.body
            .get(entry.range())
            .ok_or(DecodeError::SectionOutOfBounds(kind))
    }
}

fn read_header(image: &[u8]) -> Result<(u16, &[u8]), DecodeError> {
    if image.len() < HEADER_SIZE {
        return Err(DecodeError::TooShort {
            expected: HEADER_SIZE,
            actual: image.len(),
        });
    }

    let mut r = ByteReader::new(&image[..HEADER_SIZE]);
    let magic = r.take(4)?;
    if magic != MAGIC.as_slice() {
        return Err(DecodeError::InvalidMagic([magic[0], magic[1], magic[2], magic[3]]));
    }

    let version = r.u16()?;
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let _flags = r.u16()?;
    let section_count = r.u16()?;
    let _reserved = r.u16()?;
    let body_len = r.u32()? as usize;
    let digest = r.take(DIGEST_SIZE)?;

    let body = &image[HEADER_SIZE..];
    if body.len() != body_len {
        return Err(DecodeError::LengthMismatch {
            declared: body_len,
            actual: body.len(),
        });
    }

    if Sha256::digest(body).as_slice() != digest {
        return Err(DecodeError::DigestMismatch);
    }

    Ok((section_count, body))
}

fn read_directory(body: &[u8], section_count: u16) -> Result<Sections<'_>, DecodeError> {
    let mut r = ByteReader::new(body);
    let mut entries = Vec::with_capacity(section_count as usize);

    for _ in 0..section_count {
        let entry = SectionEntry::from_bytes(r.take(SectionEntry::ENTRY_SIZE)?)?;
        let range = entry.range();
        if range.start < r.pos || range.end > body.len() {
            return Err(DecodeError::SectionOutOfBounds(entry.kind));
        }
        entries.push(entry);
    }

    Ok(Sections { body, entries })
}

fn read_strings(data: &[u8]) -> Result<Vec<String>, DecodeError> {
    let mut r = ByteReader::new(data);
    let count = r.u32()? as usize;
    let mut strings = Vec::with_capacity(count.min(data.len()));

    for _ in 0..count {
        let len = r.u32()? as usize;
        let bytes = r.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
        strings.push(s.to_string());
    }

    Ok(strings)
}

struct ModuleReader<'a> {
    strings: Vec<String>,
    code: &'a [u8],
}

impl ModuleReader<'_> {
    fn string(&self, r: &mut ByteReader<'_>) -> Result<String, DecodeError> {
        let idx = r.u32()?;
        self.strings
            .get(idx as usize)
            .cloned()
            .ok_or(DecodeError::InvalidString(idx))
    }

    fn value(&self, r: &mut ByteReader<'_>, tag: u8) -> Result<Value, DecodeError> {
        let value = match tag {
            value_tag::VOID => Value::Void,
            value_tag::NULL => Value::Null,
            value_tag::BOOL => Value::Bool(r.u8()? != 0),
            value_tag::INT => Value::Int(r.i64()?),
            value_tag::DOUBLE => Value::Double(f64::from_bits(r.u64()?)),
            value_tag::STRING => Value::String(self.string(r)?),
            _ => return Err(DecodeError::InvalidTag { what: "value", tag }),
        };
        Ok(value)
    }

    fn expr(&self, r: &mut ByteReader<'_>, depth: usize) -> Result<Expr, DecodeError> {
        if depth > MAX_EXPR_DEPTH {
            return Err(DecodeError::NestingTooDeep);
        }

        let op = r.u8()?;
        let expr = match op {
            opcode::CONST => {
                let tag = r.u8()?;
                Expr::Const(self.value(r, tag)?)
            }
            opcode::PARAM => Expr::Param(r.u16()?),
            opcode::UNARY => {
                let op = unary_op_from_tag(r.u8()?)?;
                Expr::Unary(op, Box::new(self.expr(r, depth + 1)?))
            }
            opcode::BINARY => {
                let op = binary_op_from_tag(r.u8()?)?;
                let lhs = self.expr(r, depth + 1)?;
                let rhs = self.expr(r, depth + 1)?;
                Expr::Binary(op, Box::new(lhs), Box::new(rhs))
            }
            opcode::TO_DOUBLE => Expr::ToDouble(Box::new(self.expr(r, depth + 1)?)),
            opcode::CALL => {
                let type_index = r.u32()?;
                let member_index = r.u32()?;
                let argc = r.u16()?;
                let args = (0..argc)
                    .map(|_| self.expr(r, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Expr::Call {
                    type_index,
                    member_index,
                    args,
                }
            }
            opcode::LOAD_STATIC => Expr::LoadStatic {
                type_index: r.u32()?,
                member_index: r.u32()?,
            },
            opcode::DISCARD => Expr::Discard(Box::new(self.expr(r, depth + 1)?)),
            tag => return Err(DecodeError::InvalidTag { what: "opcode", tag }),
        };

        Ok(expr)
    }

    fn body(&self, offset: u32, len: u32) -> Result<Option<Expr>, DecodeError> {
        if len == 0 {
            return Ok(None);
        }

        let start = offset as usize;
        let end = start.checked_add(len as usize).ok_or(DecodeError::UnexpectedEnd)?;
        let code = self
            .code
            .get(start..end)
            .ok_or(DecodeError::SectionOutOfBounds(SectionKind::Code))?;
        let mut r = ByteReader::new(code);
        let expr = self.expr(&mut r, 0)?;
        if r.pos != code.len() {
            return Err(DecodeError::InvalidTag {
                what: "trailing code",
                tag: code[r.pos],
            });
        }

        Ok(Some(expr))
    }

    fn member(&self, r: &mut ByteReader<'_>) -> Result<MemberDef, DecodeError> {
        let name = self.string(r)?;
        let kind = member_kind_from_tag(r.u8()?)?;
        let accessibility = accessibility_from_tag(r.u8()?)?;
        let bits = r.u8()?;
        let ty = self.string(r)?;

        let param_count = r.u16()?;
        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            params.push(ParamDef {
                name: self.string(r)?,
                ty: self.string(r)?,
            });
        }

        let code_offset = r.u32()?;
        let code_len = r.u32()?;
        let body = self.body(code_offset, code_len)?;

        let constant = match r.u8()? {
            value_tag::NONE => None,
            tag => Some(self.value(r, tag)?),
        };

        Ok(MemberDef {
            name,
            kind,
            accessibility,
            is_static: bits & flags::STATIC != 0,
            is_abstract: bits & flags::ABSTRACT != 0,
            is_readonly: bits & flags::READONLY != 0,
            ty,
            params,
            body,
            constant,
        })
    }
}

/// Decodes and verifies a binary module image.
pub fn decode(image: &[u8]) -> Result<Module, DecodeError> {
    let (section_count, body) = read_header(image)?;
    let sections = read_directory(body, section_count)?;

    let reader = ModuleReader {
        strings: read_strings(sections.get(SectionKind::StringPool)?)?,
        code: sections.get(SectionKind::Code)?,
    };

    let mut manifest = ByteReader::new(sections.get(SectionKind::Manifest)?);
    let name = reader.string(&mut manifest)?;
    let type_count = manifest.u32()?;

    let mut members_reader = ByteReader::new(sections.get(SectionKind::Members)?);
    let member_total = members_reader.u32()? as usize;
    let mut members = Vec::with_capacity(member_total.min(members_reader.data.len()));
    for _ in 0..member_total {
        members.push(reader.member(&mut members_reader)?);
    }

    let mut types_reader = ByteReader::new(sections.get(SectionKind::Types)?);
    let count = types_reader.u32()?;
    if count != type_count {
        return Err(DecodeError::DanglingIndex {
            what: "type count",
            index: count,
        });
    }

    let mut spans = Vec::with_capacity(count as usize);
    let mut types = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let r = &mut types_reader;
        let full_name = reader.string(r)?;
        let kind = type_kind_from_tag(r.u8()?)?;
        let accessibility = accessibility_from_tag(r.u8()?)?;
        let bits = r.u8()?;
        let declaring = r.u32()?;
        let base_count = r.u16()?;
        let bases = (0..base_count)
            .map(|_| reader.string(r))
            .collect::<Result<Vec<_>, _>>()?;
        let member_start = r.u32()?;
        let member_count = r.u32()?;

        if declaring != NO_INDEX && declaring >= count {
            return Err(DecodeError::DanglingIndex {
                what: "declaring type",
                index: declaring,
            });
        }

        spans.push((member_start as usize, member_count as usize));
        types.push(TypeDef {
            full_name,
            kind,
            accessibility,
            is_static: bits & flags::STATIC != 0,
            is_sealed: bits & flags::SEALED != 0,
            is_abstract: bits & flags::ABSTRACT != 0,
            declaring_type: (declaring != NO_INDEX).then_some(declaring),
            bases,
            members: Vec::new(),
        });
    }

    let mut expected_start = 0;
    let mut members = members.into_iter();
    for (def, (start, len)) in types.iter_mut().zip(spans) {
        if start != expected_start || start + len > member_total {
            return Err(DecodeError::DanglingIndex {
                what: "member range",
                index: start as u32,
            });
        }
        def.members = members.by_ref().take(len).collect();
        expected_start = start + len;
    }

    let mut refs = ByteReader::new(sections.get(SectionKind::References)?);
    let ref_count = refs.u32()?;
    let references = (0..ref_count)
        .map(|_| reader.string(&mut refs))
        .collect::<Result<Vec<_>, _>>()?;

    let module = Module {
        name,
        types,
        references,
    };
    validate_code(&module)?;

    Ok(module)
}

/// Every call and static load must target a member of this module.
fn validate_code(module: &Module) -> Result<(), DecodeError> {
    fn check(module: &Module, expr: &Expr) -> Result<(), DecodeError> {
        match expr {
            Expr::Const(_) | Expr::Param(_) => Ok(()),
            Expr::Unary(_, e) | Expr::ToDouble(e) | Expr::Discard(e) => check(module, e),
            Expr::Binary(_, lhs, rhs) => {
                check(module, lhs)?;
                check(module, rhs)
            }
            Expr::Call {
                type_index,
                member_index,
                args,
            } => {
                check_target(module, *type_index, *member_index)?;
                args.iter().try_for_each(|arg| check(module, arg))
            }
            Expr::LoadStatic {
                type_index,
                member_index,
            } => check_target(module, *type_index, *member_index),
        }
    }

    module
        .types
        .iter()
        .flat_map(|t| t.members.iter())
        .filter_map(|m| m.body.as_ref())
        .try_for_each(|body| check(module, body))
}

fn check_target(module: &Module, type_index: u32, member_index: u32) -> Result<(), DecodeError> {
    let def = module
        .types
        .get(type_index as usize)
        .ok_or(DecodeError::DanglingIndex {
            what: "type",
            index: type_index,
        })?;
    if def.members.get(member_index as usize).is_none() {
        return Err(DecodeError::DanglingIndex {
            what: "member",
            index: member_index,
        });
    }
    Ok(())
}
