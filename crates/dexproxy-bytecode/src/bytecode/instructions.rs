//! Dalvik instructions used by synthesized proxies.
//!
//! Only the subset the delegation pattern needs is modeled. Each variant
//! knows its encoding format (`11x`, `22c`, `35c`, ...) and can be written to
//! and read from 16-bit code units. Register and index fields are resolved
//! values; narrow fields (4-bit registers in `11n`/`22c`/`35c`) must already
//! fit when an instruction is built.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

impl InvokeKind {
    const ALL: [Self; 5] = [
        Self::Virtual,
        Self::Super,
        Self::Direct,
        Self::Static,
        Self::Interface,
    ];

    fn offset(self) -> u8 {
        match self {
            Self::Virtual => 0,
            Self::Super => 1,
            Self::Direct => 2,
            Self::Static => 3,
            Self::Interface => 4,
        }
    }

    /// Opcode of the `35c` form.
    pub fn opcode(self) -> u8 {
        op::INVOKE_VIRTUAL + self.offset()
    }

    /// Opcode of the `3rc` form.
    pub fn range_opcode(self) -> u8 {
        op::INVOKE_VIRTUAL_RANGE + self.offset()
    }

    fn from_offset(offset: u8) -> Option<Self> {
        Self::ALL.get(offset as usize).copied()
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Virtual => "invoke-virtual",
            Self::Super => "invoke-super",
            Self::Direct => "invoke-direct",
            Self::Static => "invoke-static",
            Self::Interface => "invoke-interface",
        }
    }
}

/// Raw opcode values.
pub mod op {
    pub const MOVE_FROM16: u8 = 0x02;
    pub const MOVE_WIDE_FROM16: u8 = 0x05;
    pub const MOVE_OBJECT_FROM16: u8 = 0x08;
    pub const MOVE_RESULT: u8 = 0x0a;
    pub const MOVE_RESULT_WIDE: u8 = 0x0b;
    pub const MOVE_RESULT_OBJECT: u8 = 0x0c;
    pub const RETURN_VOID: u8 = 0x0e;
    pub const RETURN: u8 = 0x0f;
    pub const RETURN_WIDE: u8 = 0x10;
    pub const RETURN_OBJECT: u8 = 0x11;
    pub const CONST_4: u8 = 0x12;
    pub const CONST_16: u8 = 0x13;
    pub const CONST: u8 = 0x14;
    pub const CONST_STRING: u8 = 0x1a;
    pub const CONST_STRING_JUMBO: u8 = 0x1b;
    pub const CHECK_CAST: u8 = 0x1f;
    pub const NEW_ARRAY: u8 = 0x23;
    pub const AGET_OBJECT: u8 = 0x46;
    pub const APUT_OBJECT: u8 = 0x4d;
    pub const IGET_OBJECT: u8 = 0x54;
    pub const IPUT_OBJECT: u8 = 0x5b;
    pub const SGET_OBJECT: u8 = 0x62;
    pub const INVOKE_VIRTUAL: u8 = 0x6e;
    pub const INVOKE_INTERFACE: u8 = 0x72;
    pub const INVOKE_VIRTUAL_RANGE: u8 = 0x74;
    pub const INVOKE_INTERFACE_RANGE: u8 = 0x78;
}

/// Pool an instruction operand indexes into.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RefKind {
    String,
    Type,
    Field,
    Method,
}

impl RefKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Type => "type",
            Self::Field => "field",
            Self::Method => "method",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Reference {
    pub kind: RefKind,
    pub index: u32,
}

impl Reference {
    fn new(kind: RefKind, index: impl Into<u32>) -> Self {
        Self {
            kind,
            index: index.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Instruction {
    ReturnVoid,
    Return { reg: u8 },
    ReturnWide { reg: u8 },
    ReturnObject { reg: u8 },
    MoveResult { dst: u8 },
    MoveResultWide { dst: u8 },
    MoveResultObject { dst: u8 },
    MoveFrom16 { dst: u8, src: u16 },
    MoveWideFrom16 { dst: u8, src: u16 },
    MoveObjectFrom16 { dst: u8, src: u16 },
    /// `dst` is a 4-bit register; `value` is in `-8..=7`.
    Const4 { dst: u8, value: i8 },
    Const16 { dst: u8, value: i16 },
    Const { dst: u8, value: i32 },
    ConstString { dst: u8, string: u16 },
    ConstStringJumbo { dst: u8, string: u32 },
    CheckCast { reg: u8, ty: u16 },
    /// Both registers are 4-bit.
    NewArray { dst: u8, size: u8, ty: u16 },
    AgetObject { dst: u8, array: u8, index: u8 },
    AputObject { src: u8, array: u8, index: u8 },
    /// Both registers are 4-bit.
    IgetObject { dst: u8, object: u8, field: u16 },
    /// Both registers are 4-bit.
    IputObject { src: u8, object: u8, field: u16 },
    SgetObject { dst: u8, field: u16 },
    /// Up to five 4-bit argument registers.
    Invoke {
        kind: InvokeKind,
        method: u16,
        args: Vec<u8>,
    },
    /// Contiguous registers `first .. first + count`.
    InvokeRange {
        kind: InvokeKind,
        method: u16,
        first: u16,
        count: u8,
    },
}

#[inline]
fn unit(op: u8, hi: u8) -> u16 {
    op as u16 | (hi as u16) << 8
}

#[inline]
fn nibbles(a: u8, b: u8) -> u8 {
    debug_assert!(a < 16 && b < 16, "register does not fit in 4 bits");
    (a & 0xf) | (b & 0xf) << 4
}

impl Instruction {
    /// Size in 16-bit code units.
    pub fn code_units(&self) -> usize {
        match self {
            Self::ReturnVoid
            | Self::Return { .. }
            | Self::ReturnWide { .. }
            | Self::ReturnObject { .. }
            | Self::MoveResult { .. }
            | Self::MoveResultWide { .. }
            | Self::MoveResultObject { .. }
            | Self::Const4 { .. } => 1,
            Self::MoveFrom16 { .. }
            | Self::MoveWideFrom16 { .. }
            | Self::MoveObjectFrom16 { .. }
            | Self::Const16 { .. }
            | Self::ConstString { .. }
            | Self::CheckCast { .. }
            | Self::NewArray { .. }
            | Self::AgetObject { .. }
            | Self::AputObject { .. }
            | Self::IgetObject { .. }
            | Self::IputObject { .. }
            | Self::SgetObject { .. } => 2,
            Self::Const { .. }
            | Self::ConstStringJumbo { .. }
            | Self::Invoke { .. }
            | Self::InvokeRange { .. } => 3,
        }
    }

    /// Append the encoded code units to `out`.
    pub fn encode(&self, out: &mut Vec<u16>) {
        match *self {
            Self::ReturnVoid => out.push(op::RETURN_VOID as u16),
            Self::Return { reg } => out.push(unit(op::RETURN, reg)),
            Self::ReturnWide { reg } => out.push(unit(op::RETURN_WIDE, reg)),
            Self::ReturnObject { reg } => out.push(unit(op::RETURN_OBJECT, reg)),
            Self::MoveResult { dst } => out.push(unit(op::MOVE_RESULT, dst)),
            Self::MoveResultWide { dst } => out.push(unit(op::MOVE_RESULT_WIDE, dst)),
            Self::MoveResultObject { dst } => out.push(unit(op::MOVE_RESULT_OBJECT, dst)),
            Self::MoveFrom16 { dst, src } => out.extend([unit(op::MOVE_FROM16, dst), src]),
            Self::MoveWideFrom16 { dst, src } => {
                out.extend([unit(op::MOVE_WIDE_FROM16, dst), src])
            }
            Self::MoveObjectFrom16 { dst, src } => {
                out.extend([unit(op::MOVE_OBJECT_FROM16, dst), src])
            }
            Self::Const4 { dst, value } => {
                debug_assert!((-8..=7).contains(&value), "const/4 literal out of range");
                out.push(unit(op::CONST_4, nibbles(dst, value as u8 & 0xf)))
            }
            Self::Const16 { dst, value } => out.extend([unit(op::CONST_16, dst), value as u16]),
            Self::Const { dst, value } => {
                let bits = value as u32;
                out.extend([unit(op::CONST, dst), bits as u16, (bits >> 16) as u16])
            }
            Self::ConstString { dst, string } => {
                out.extend([unit(op::CONST_STRING, dst), string])
            }
            Self::ConstStringJumbo { dst, string } => out.extend([
                unit(op::CONST_STRING_JUMBO, dst),
                string as u16,
                (string >> 16) as u16,
            ]),
            Self::CheckCast { reg, ty } => out.extend([unit(op::CHECK_CAST, reg), ty]),
            Self::NewArray { dst, size, ty } => {
                out.extend([unit(op::NEW_ARRAY, nibbles(dst, size)), ty])
            }
            Self::AgetObject { dst, array, index } => out.extend([
                unit(op::AGET_OBJECT, dst),
                array as u16 | (index as u16) << 8,
            ]),
            Self::AputObject { src, array, index } => out.extend([
                unit(op::APUT_OBJECT, src),
                array as u16 | (index as u16) << 8,
            ]),
            Self::IgetObject { dst, object, field } => {
                out.extend([unit(op::IGET_OBJECT, nibbles(dst, object)), field])
            }
            Self::IputObject { src, object, field } => {
                out.extend([unit(op::IPUT_OBJECT, nibbles(src, object)), field])
            }
            Self::SgetObject { dst, field } => out.extend([unit(op::SGET_OBJECT, dst), field]),
            Self::Invoke {
                kind,
                method,
                ref args,
            } => {
                debug_assert!(args.len() <= 5, "35c takes at most five registers");
                let reg = |i: usize| args.get(i).copied().unwrap_or(0);
                let g = if args.len() == 5 { reg(4) } else { 0 };
                out.extend([
                    unit(kind.opcode(), nibbles(g, args.len() as u8)),
                    method,
                    nibbles(reg(0), reg(1)) as u16 | (nibbles(reg(2), reg(3)) as u16) << 8,
                ]);
            }
            Self::InvokeRange {
                kind,
                method,
                first,
                count,
            } => out.extend([unit(kind.range_opcode(), count), method, first]),
        }
    }

    /// Decode one instruction from the start of `units`.
    ///
    /// Returns `None` for opcodes outside the modeled subset or truncated
    /// input.
    pub fn decode(units: &[u16]) -> Option<Self> {
        let first = *units.first()?;
        let opcode = (first & 0xff) as u8;
        let aa = (first >> 8) as u8;
        let a = aa & 0xf;
        let b = aa >> 4;
        let word = |i: usize| units.get(i).copied();

        Some(match opcode {
            op::RETURN_VOID => Self::ReturnVoid,
            op::RETURN => Self::Return { reg: aa },
            op::RETURN_WIDE => Self::ReturnWide { reg: aa },
            op::RETURN_OBJECT => Self::ReturnObject { reg: aa },
            op::MOVE_RESULT => Self::MoveResult { dst: aa },
            op::MOVE_RESULT_WIDE => Self::MoveResultWide { dst: aa },
            op::MOVE_RESULT_OBJECT => Self::MoveResultObject { dst: aa },
            op::MOVE_FROM16 => Self::MoveFrom16 { dst: aa, src: word(1)? },
            op::MOVE_WIDE_FROM16 => Self::MoveWideFrom16 { dst: aa, src: word(1)? },
            op::MOVE_OBJECT_FROM16 => Self::MoveObjectFrom16 { dst: aa, src: word(1)? },
            op::CONST_4 => Self::Const4 {
                dst: a,
                value: (aa as i8) >> 4,
            },
            op::CONST_16 => Self::Const16 {
                dst: aa,
                value: word(1)? as i16,
            },
            op::CONST => Self::Const {
                dst: aa,
                value: (word(1)? as u32 | (word(2)? as u32) << 16) as i32,
            },
            op::CONST_STRING => Self::ConstString {
                dst: aa,
                string: word(1)?,
            },
            op::CONST_STRING_JUMBO => Self::ConstStringJumbo {
                dst: aa,
                string: word(1)? as u32 | (word(2)? as u32) << 16,
            },
            op::CHECK_CAST => Self::CheckCast {
                reg: aa,
                ty: word(1)?,
            },
            op::NEW_ARRAY => Self::NewArray {
                dst: a,
                size: b,
                ty: word(1)?,
            },
            op::AGET_OBJECT => {
                let w = word(1)?;
                Self::AgetObject {
                    dst: aa,
                    array: w as u8,
                    index: (w >> 8) as u8,
                }
            }
            op::APUT_OBJECT => {
                let w = word(1)?;
                Self::AputObject {
                    src: aa,
                    array: w as u8,
                    index: (w >> 8) as u8,
                }
            }
            op::IGET_OBJECT => Self::IgetObject {
                dst: a,
                object: b,
                field: word(1)?,
            },
            op::IPUT_OBJECT => Self::IputObject {
                src: a,
                object: b,
                field: word(1)?,
            },
            op::SGET_OBJECT => Self::SgetObject {
                dst: aa,
                field: word(1)?,
            },
            op::INVOKE_VIRTUAL..=op::INVOKE_INTERFACE => {
                let kind = InvokeKind::from_offset(opcode - op::INVOKE_VIRTUAL)?;
                let count = b as usize;
                if count > 5 {
                    return None;
                }
                let method = word(1)?;
                let regs = word(2)?;
                let all = [
                    (regs & 0xf) as u8,
                    ((regs >> 4) & 0xf) as u8,
                    ((regs >> 8) & 0xf) as u8,
                    (regs >> 12) as u8,
                    a,
                ];
                Self::Invoke {
                    kind,
                    method,
                    args: all[..count].to_vec(),
                }
            }
            op::INVOKE_VIRTUAL_RANGE..=op::INVOKE_INTERFACE_RANGE => Self::InvokeRange {
                kind: InvokeKind::from_offset(opcode - op::INVOKE_VIRTUAL_RANGE)?,
                method: word(1)?,
                first: word(2)?,
                count: aa,
            },
            _ => return None,
        })
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::ReturnVoid => "return-void",
            Self::Return { .. } => "return",
            Self::ReturnWide { .. } => "return-wide",
            Self::ReturnObject { .. } => "return-object",
            Self::MoveResult { .. } => "move-result",
            Self::MoveResultWide { .. } => "move-result-wide",
            Self::MoveResultObject { .. } => "move-result-object",
            Self::MoveFrom16 { .. } => "move/from16",
            Self::MoveWideFrom16 { .. } => "move-wide/from16",
            Self::MoveObjectFrom16 { .. } => "move-object/from16",
            Self::Const4 { .. } => "const/4",
            Self::Const16 { .. } => "const/16",
            Self::Const { .. } => "const",
            Self::ConstString { .. } => "const-string",
            Self::ConstStringJumbo { .. } => "const-string/jumbo",
            Self::CheckCast { .. } => "check-cast",
            Self::NewArray { .. } => "new-array",
            Self::AgetObject { .. } => "aget-object",
            Self::AputObject { .. } => "aput-object",
            Self::IgetObject { .. } => "iget-object",
            Self::IputObject { .. } => "iput-object",
            Self::SgetObject { .. } => "sget-object",
            Self::Invoke { kind, .. } => kind.mnemonic(),
            Self::InvokeRange { kind, .. } => match kind {
                InvokeKind::Virtual => "invoke-virtual/range",
                InvokeKind::Super => "invoke-super/range",
                InvokeKind::Direct => "invoke-direct/range",
                InvokeKind::Static => "invoke-static/range",
                InvokeKind::Interface => "invoke-interface/range",
            },
        }
    }

    /// The pool entry this instruction refers to, if any.
    pub fn reference(&self) -> Option<Reference> {
        match *self {
            Self::ConstString { string, .. } => Some(Reference::new(RefKind::String, string)),
            Self::ConstStringJumbo { string, .. } => {
                Some(Reference::new(RefKind::String, string))
            }
            Self::CheckCast { ty, .. } | Self::NewArray { ty, .. } => {
                Some(Reference::new(RefKind::Type, ty))
            }
            Self::IgetObject { field, .. }
            | Self::IputObject { field, .. }
            | Self::SgetObject { field, .. } => Some(Reference::new(RefKind::Field, field)),
            Self::Invoke { method, .. } | Self::InvokeRange { method, .. } => {
                Some(Reference::new(RefKind::Method, method))
            }
            _ => None,
        }
    }

    /// Every register the instruction reads or writes (wide pairs included).
    pub fn registers(&self) -> Vec<u16> {
        match self {
            Self::ReturnVoid => vec![],
            Self::Return { reg } | Self::ReturnObject { reg } | Self::CheckCast { reg, .. } => {
                vec![*reg as u16]
            }
            Self::ReturnWide { reg } => vec![*reg as u16, *reg as u16 + 1],
            Self::MoveResult { dst }
            | Self::MoveResultObject { dst }
            | Self::Const4 { dst, .. }
            | Self::Const16 { dst, .. }
            | Self::Const { dst, .. }
            | Self::ConstString { dst, .. }
            | Self::ConstStringJumbo { dst, .. }
            | Self::SgetObject { dst, .. } => vec![*dst as u16],
            Self::MoveResultWide { dst } => vec![*dst as u16, *dst as u16 + 1],
            Self::MoveFrom16 { dst, src } | Self::MoveObjectFrom16 { dst, src } => {
                vec![*dst as u16, *src]
            }
            Self::MoveWideFrom16 { dst, src } => {
                vec![*dst as u16, *dst as u16 + 1, *src, *src + 1]
            }
            Self::NewArray { dst, size, .. } => vec![*dst as u16, *size as u16],
            Self::AgetObject { dst, array, index } => {
                vec![*dst as u16, *array as u16, *index as u16]
            }
            Self::AputObject { src, array, index } => {
                vec![*src as u16, *array as u16, *index as u16]
            }
            Self::IgetObject { dst, object, .. } => vec![*dst as u16, *object as u16],
            Self::IputObject { src, object, .. } => vec![*src as u16, *object as u16],
            Self::Invoke { args, .. } => args.iter().map(|&r| r as u16).collect(),
            Self::InvokeRange { first, count, .. } => {
                (0..*count as u16).map(|i| first + i).collect()
            }
        }
    }

    /// Register/literal operands without the pool reference.
    pub fn operands(&self) -> String {
        match self {
            Self::ReturnVoid => String::new(),
            Self::Return { reg } | Self::ReturnWide { reg } | Self::ReturnObject { reg } => {
                format!("v{reg}")
            }
            Self::MoveResult { dst }
            | Self::MoveResultWide { dst }
            | Self::MoveResultObject { dst } => format!("v{dst}"),
            Self::MoveFrom16 { dst, src }
            | Self::MoveWideFrom16 { dst, src }
            | Self::MoveObjectFrom16 { dst, src } => format!("v{dst}, v{src}"),
            Self::Const4 { dst, value } => format!("v{dst}, #{value}"),
            Self::Const16 { dst, value } => format!("v{dst}, #{value}"),
            Self::Const { dst, value } => format!("v{dst}, #{value}"),
            Self::ConstString { dst, .. }
            | Self::ConstStringJumbo { dst, .. }
            | Self::SgetObject { dst, .. } => format!("v{dst}"),
            Self::CheckCast { reg, .. } => format!("v{reg}"),
            Self::NewArray { dst, size, .. } => format!("v{dst}, v{size}"),
            Self::AgetObject { dst, array, index } => format!("v{dst}, v{array}, v{index}"),
            Self::AputObject { src, array, index } => format!("v{src}, v{array}, v{index}"),
            Self::IgetObject { dst, object, .. } => format!("v{dst}, v{object}"),
            Self::IputObject { src, object, .. } => format!("v{src}, v{object}"),
            Self::Invoke { args, .. } => {
                let regs: Vec<String> = args.iter().map(|r| format!("v{r}")).collect();
                format!("{{{}}}", regs.join(", "))
            }
            Self::InvokeRange { first, count, .. } => match count {
                0 => "{}".to_string(),
                _ => format!("{{v{first} .. v{}}}", *first as u32 + *count as u32 - 1),
            },
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())?;
        let operands = self.operands();
        if !operands.is_empty() {
            write!(f, " {operands}")?;
        }
        if let Some(r) = self.reference() {
            write!(f, ", {}@{}", r.kind.label(), r.index)?;
        }
        Ok(())
    }
}
