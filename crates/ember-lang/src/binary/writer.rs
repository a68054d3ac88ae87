use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

use super::{
    FORMAT_VERSION, HEADER_SIZE, MAGIC, NO_INDEX, SectionEntry, SectionKind, accessibility_tag, flags,
    member_kind_tag, opcode, type_kind_tag, value_tag,
};
use crate::ir::{BinaryOp, Expr, MemberDef, Module, TypeDef, UnaryOp};
use crate::value::Value;

#[derive(Debug, Default)]
pub(crate) struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Default)]
struct StringPool {
    strings: Vec<String>,
    index: FxHashMap<String, u32>,
}

impl StringPool {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(&idx) = self.index.get(s) {
            return idx;
        }

        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), idx);
        idx
    }

    fn write(&self, w: &mut ByteWriter) {
        w.u32(self.strings.len() as u32);
        for s in &self.strings {
            w.u32(s.len() as u32);
            w.bytes(s.as_bytes());
        }
    }
}

pub(crate) fn unary_op_tag(op: UnaryOp) -> u8 {
    match op {
        UnaryOp::Not => 0,
        UnaryOp::Negate => 1,
    }
}

pub(crate) fn binary_op_tag(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Add => 0,
        BinaryOp::Sub => 1,
        BinaryOp::Mul => 2,
        BinaryOp::Div => 3,
        BinaryOp::Rem => 4,
        BinaryOp::Concat => 5,
        BinaryOp::Eq => 6,
        BinaryOp::Ne => 7,
        BinaryOp::Lt => 8,
        BinaryOp::Lte => 9,
        BinaryOp::Gt => 10,
        BinaryOp::Gte => 11,
        BinaryOp::And => 12,
        BinaryOp::Or => 13,
    }
}

#[derive(Debug, Default)]
struct ModuleWriter {
    pool: StringPool,
    manifest: ByteWriter,
    types: ByteWriter,
    members: ByteWriter,
    code: ByteWriter,
    references: ByteWriter,
}

impl ModuleWriter {
    fn write_module(&mut self, module: &Module) {
        let name = self.pool.intern(&module.name);
        self.manifest.u32(name);
        self.manifest.u32(module.types.len() as u32);

        let member_total: usize = module.types.iter().map(|t| t.members.len()).sum();
        self.types.u32(module.types.len() as u32);
        self.members.u32(member_total as u32);

        let mut member_start = 0u32;
        for def in &module.types {
            self.write_type(def, member_start);
            member_start += def.members.len() as u32;
            for member in &def.members {
                self.write_member(member);
            }
        }

        self.references.u32(module.references.len() as u32);
        for reference in &module.references {
            let idx = self.pool.intern(reference);
            self.references.u32(idx);
        }
    }

    fn write_type(&mut self, def: &TypeDef, member_start: u32) {
        let name = self.pool.intern(&def.full_name);
        self.types.u32(name);
        self.types.u8(type_kind_tag(def.kind));
        self.types.u8(accessibility_tag(def.accessibility));

        let mut bits = 0u8;
        if def.is_static {
            bits |= flags::STATIC;
        }
        if def.is_sealed {
            bits |= flags::SEALED;
        }
        if def.is_abstract {
            bits |= flags::ABSTRACT;
        }
        self.types.u8(bits);
        self.types.u32(def.declaring_type.unwrap_or(NO_INDEX));

        self.types.u16(def.bases.len() as u16);
        for base in &def.bases {
            let idx = self.pool.intern(base);
            self.types.u32(idx);
        }

        self.types.u32(member_start);
        self.types.u32(def.members.len() as u32);
    }

    fn write_member(&mut self, member: &MemberDef) {
        let name = self.pool.intern(&member.name);
        self.members.u32(name);
        self.members.u8(member_kind_tag(member.kind));
        self.members.u8(accessibility_tag(member.accessibility));

        let mut bits = 0u8;
        if member.is_static {
            bits |= flags::STATIC;
        }
        if member.is_abstract {
            bits |= flags::ABSTRACT;
        }
        if member.is_readonly {
            bits |= flags::READONLY;
        }
        self.members.u8(bits);

        let ty = self.pool.intern(&member.ty);
        self.members.u32(ty);

        self.members.u16(member.params.len() as u16);
        for param in &member.params {
            let name = self.pool.intern(&param.name);
            let ty = self.pool.intern(&param.ty);
            self.members.u32(name);
            self.members.u32(ty);
        }

        match &member.body {
            Some(body) => {
                let offset = self.code.len();
                let mut code = std::mem::take(&mut self.code);
                self.write_expr(&mut code, body);
                let len = code.len() - offset;
                self.code = code;
                self.members.u32(offset as u32);
                self.members.u32(len as u32);
            }
            None => {
                self.members.u32(0);
                self.members.u32(0);
            }
        }

        match &member.constant {
            Some(value) => {
                let mut members = std::mem::take(&mut self.members);
                self.write_value(&mut members, value);
                self.members = members;
            }
            None => self.members.u8(value_tag::NONE),
        }
    }

    fn write_value(&mut self, w: &mut ByteWriter, value: &Value) {
        match value {
            Value::Void => w.u8(value_tag::VOID),
            Value::Null => w.u8(value_tag::NULL),
            Value::Bool(b) => {
                w.u8(value_tag::BOOL);
                w.u8(*b as u8);
            }
            Value::Int(n) => {
                w.u8(value_tag::INT);
                w.i64(*n);
            }
            Value::Double(d) => {
                w.u8(value_tag::DOUBLE);
                w.u64(d.to_bits());
            }
            Value::String(s) => {
                w.u8(value_tag::STRING);
                let idx = self.pool.intern(s);
                w.u32(idx);
            }
        }
    }

    fn write_expr(&mut self, w: &mut ByteWriter, expr: &Expr) {
        match expr {
            Expr::Const(value) => {
                w.u8(opcode::CONST);
                self.write_value(w, value);
            }
            Expr::Param(idx) => {
                w.u8(opcode::PARAM);
                w.u16(*idx);
            }
            Expr::Unary(op, operand) => {
                w.u8(opcode::UNARY);
                w.u8(unary_op_tag(*op));
                self.write_expr(w, operand);
            }
            Expr::Binary(op, lhs, rhs) => {
                w.u8(opcode::BINARY);
                w.u8(binary_op_tag(*op));
                self.write_expr(w, lhs);
                self.write_expr(w, rhs);
            }
            Expr::ToDouble(operand) => {
                w.u8(opcode::TO_DOUBLE);
                self.write_expr(w, operand);
            }
            Expr::Call {
                type_index,
                member_index,
                args,
            } => {
                w.u8(opcode::CALL);
                w.u32(*type_index);
                w.u32(*member_index);
                w.u16(args.len() as u16);
                for arg in args {
                    self.write_expr(w, arg);
                }
            }
            Expr::LoadStatic {
                type_index,
                member_index,
            } => {
                w.u8(opcode::LOAD_STATIC);
                w.u32(*type_index);
                w.u32(*member_index);
            }
            Expr::Discard(operand) => {
                w.u8(opcode::DISCARD);
                self.write_expr(w, operand);
            }
        }
    }

    fn finish(self) -> Vec<u8> {
        let mut pool = ByteWriter::default();
        self.pool.write(&mut pool);

        let sections: Vec<(SectionKind, Vec<u8>)> = vec![
            (SectionKind::Manifest, self.manifest.into_inner()),
            (SectionKind::StringPool, pool.into_inner()),
            (SectionKind::Types, self.types.into_inner()),
            (SectionKind::Members, self.members.into_inner()),
            (SectionKind::Code, self.code.into_inner()),
            (SectionKind::References, self.references.into_inner()),
        ];

        let mut offset = sections.len() * SectionEntry::ENTRY_SIZE;
        let mut body = ByteWriter::default();
        for (kind, data) in &sections {
            body.bytes(&SectionEntry::new(*kind, offset as u32, data.len() as u32).to_bytes());
            offset += data.len();
        }
        for (_, data) in &sections {
            body.bytes(data);
        }
        let body = body.into_inner();

        let mut image = ByteWriter::default();
        image.bytes(&MAGIC);
        image.u16(FORMAT_VERSION);
        image.u16(0);
        image.u16(sections.len() as u16);
        image.u16(0);
        image.u32(body.len() as u32);
        image.bytes(Sha256::digest(&body).as_slice());
        debug_assert_eq!(image.len(), HEADER_SIZE);
        image.bytes(&body);

        image.into_inner()
    }
}

/// Serializes a module into a self-describing binary image.
pub fn encode(module: &Module) -> Vec<u8> {
    let mut writer = ModuleWriter::default();
    writer.write_module(module);
    writer.finish()
}
