//! PICA200 vertex-shader instruction set model.
//!
//! Pure data: instruction-word bitfield accessors, opcode classification,
//! swizzle patterns and register naming. No code generation happens here.

/// Number of 32-bit words in the shader code space.
pub const MAX_PROGRAM_CODE_LENGTH: usize = 512;
/// Number of 32-bit words in the operand-descriptor (swizzle) space.
pub const MAX_SWIZZLE_DATA_LENGTH: usize = 128;

/// Raw source selector value meaning "no swizzling" (X→X, Y→Y, Z→Z, W→W).
pub const NO_SRC_SWIZZLE: u8 = 0x1b;
/// Destination mask with every component enabled.
pub const FULL_DEST_MASK: u8 = 0xf;

fn bits(word: u32, lo: u32, count: u32) -> u32 {
    (word >> lo) & ((1 << count) - 1)
}

/// Effective opcode of an instruction word.
///
/// The raw 6-bit field is collapsed: `MADI` and `MAD` each span eight slots
/// (their low opcode bits belong to the operand fields), and `CMP` spans two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Add,
    Dp3,
    Dp4,
    Dph,
    Ex2,
    Lg2,
    Mul,
    Sge,
    Slt,
    Flr,
    Max,
    Min,
    Rcp,
    Rsq,
    Mova,
    Mov,
    Dphi,
    Sgei,
    Slti,
    Nop,
    End,
    BreakC,
    Call,
    CallC,
    CallU,
    IfU,
    IfC,
    Loop,
    Emit,
    SetEmit,
    JmpC,
    JmpU,
    Cmp,
    Madi,
    Mad,
    /// Reserved or unimplemented slot; carries the raw opcode value.
    Unknown(u8),
}

impl OpCode {
    pub fn from_raw(raw: u8) -> OpCode {
        match raw {
            0x00 => OpCode::Add,
            0x01 => OpCode::Dp3,
            0x02 => OpCode::Dp4,
            0x03 => OpCode::Dph,
            0x05 => OpCode::Ex2,
            0x06 => OpCode::Lg2,
            0x08 => OpCode::Mul,
            0x09 => OpCode::Sge,
            0x0a => OpCode::Slt,
            0x0b => OpCode::Flr,
            0x0c => OpCode::Max,
            0x0d => OpCode::Min,
            0x0e => OpCode::Rcp,
            0x0f => OpCode::Rsq,
            0x12 => OpCode::Mova,
            0x13 => OpCode::Mov,
            0x18 => OpCode::Dphi,
            0x1a => OpCode::Sgei,
            0x1b => OpCode::Slti,
            0x21 => OpCode::Nop,
            0x22 => OpCode::End,
            0x23 => OpCode::BreakC,
            0x24 => OpCode::Call,
            0x25 => OpCode::CallC,
            0x26 => OpCode::CallU,
            0x27 => OpCode::IfU,
            0x28 => OpCode::IfC,
            0x29 => OpCode::Loop,
            0x2a => OpCode::Emit,
            0x2b => OpCode::SetEmit,
            0x2c => OpCode::JmpC,
            0x2d => OpCode::JmpU,
            0x2e | 0x2f => OpCode::Cmp,
            0x30..=0x37 => OpCode::Madi,
            0x38..=0x3f => OpCode::Mad,
            other => OpCode::Unknown(other),
        }
    }

    /// True for the variants whose wide and narrow source operands swap
    /// roles (`DPHI`, `SGEI`, `SLTI`, `MADI`).
    pub fn is_inverted(self) -> bool {
        matches!(
            self,
            OpCode::Dphi | OpCode::Sgei | OpCode::Slti | OpCode::Madi
        )
    }

    pub fn is_mad_family(self) -> bool {
        matches!(self, OpCode::Mad | OpCode::Madi)
    }
}

/// Classification of a source register by its raw index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterType {
    Input,
    Temporary,
    FloatUniform,
}

/// A source register operand: `v0..v15`, `r0..r15` or `c0..c95`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRegister(u8);

impl SourceRegister {
    pub fn from_raw(raw: u8) -> SourceRegister {
        SourceRegister(raw & 0x7f)
    }

    pub fn register_type(self) -> RegisterType {
        match self.0 {
            0x00..=0x0f => RegisterType::Input,
            0x10..=0x1f => RegisterType::Temporary,
            _ => RegisterType::FloatUniform,
        }
    }

    /// Index within the register file selected by [`Self::register_type`].
    pub fn index(self) -> usize {
        match self.register_type() {
            RegisterType::Input => self.0 as usize,
            RegisterType::Temporary => self.0 as usize - 0x10,
            RegisterType::FloatUniform => self.0 as usize - 0x20,
        }
    }
}

/// A destination register operand: `o0..o15` or `r0..r15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestRegister(u8);

impl DestRegister {
    pub fn from_raw(raw: u8) -> DestRegister {
        DestRegister(raw & 0x1f)
    }

    pub fn is_output(self) -> bool {
        self.0 < 0x10
    }

    pub fn index(self) -> usize {
        if self.is_output() {
            self.0 as usize
        } else {
            self.0 as usize - 0x10
        }
    }
}

/// Comparison operator of a `CMP` instruction component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Raw values 6 and 7 are reserved and yield `None`.
    pub fn from_raw(raw: u32) -> Option<CompareOp> {
        match raw {
            0 => Some(CompareOp::Eq),
            1 => Some(CompareOp::Neq),
            2 => Some(CompareOp::Lt),
            3 => Some(CompareOp::Le),
            4 => Some(CompareOp::Gt),
            5 => Some(CompareOp::Ge),
            _ => None,
        }
    }
}

/// Condition combinator of a flow-control instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Or,
    And,
    JustX,
    JustY,
}

/// A 32-bit PICA200 shader instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    /// The raw 6-bit opcode field, before collapsing.
    pub fn raw_opcode(self) -> u8 {
        (self.0 >> 26) as u8
    }

    pub fn opcode(self) -> OpCode {
        OpCode::from_raw(self.raw_opcode())
    }

    pub fn common(self) -> Common {
        Common(self.0)
    }

    pub fn mad(self) -> Mad {
        Mad(self.0)
    }

    pub fn flow_control(self) -> FlowControl {
        FlowControl(self.0)
    }
}

/// Field view for the common (arithmetic and comparison) encoding family.
#[derive(Clone, Copy)]
pub struct Common(u32);

impl Common {
    pub fn operand_desc_id(self) -> usize {
        bits(self.0, 0, 7) as usize
    }

    /// Narrow (5-bit) second source of the regular encoding.
    pub fn src2(self) -> SourceRegister {
        SourceRegister::from_raw(bits(self.0, 7, 5) as u8)
    }

    /// Wide (7-bit) first source of the regular encoding.
    pub fn src1(self) -> SourceRegister {
        SourceRegister::from_raw(bits(self.0, 12, 7) as u8)
    }

    /// Wide (7-bit) second source of the inverted encoding.
    pub fn src2i(self) -> SourceRegister {
        SourceRegister::from_raw(bits(self.0, 7, 7) as u8)
    }

    /// Narrow (5-bit) first source of the inverted encoding.
    pub fn src1i(self) -> SourceRegister {
        SourceRegister::from_raw(bits(self.0, 14, 5) as u8)
    }

    pub fn address_register_index(self) -> u32 {
        bits(self.0, 19, 2)
    }

    pub fn dest(self) -> DestRegister {
        DestRegister::from_raw(bits(self.0, 21, 5) as u8)
    }

    pub fn compare_op_y(self) -> u32 {
        bits(self.0, 21, 3)
    }

    pub fn compare_op_x(self) -> u32 {
        bits(self.0, 24, 3)
    }
}

/// Field view for the `MAD`/`MADI` encoding family.
#[derive(Clone, Copy)]
pub struct Mad(u32);

impl Mad {
    pub fn operand_desc_id(self) -> usize {
        bits(self.0, 0, 5) as usize
    }

    pub fn src3(self) -> SourceRegister {
        SourceRegister::from_raw(bits(self.0, 5, 5) as u8)
    }

    pub fn src2(self) -> SourceRegister {
        SourceRegister::from_raw(bits(self.0, 10, 7) as u8)
    }

    pub fn src1(self) -> SourceRegister {
        SourceRegister::from_raw(bits(self.0, 17, 5) as u8)
    }

    pub fn src3i(self) -> SourceRegister {
        SourceRegister::from_raw(bits(self.0, 5, 7) as u8)
    }

    pub fn src2i(self) -> SourceRegister {
        SourceRegister::from_raw(bits(self.0, 12, 5) as u8)
    }

    pub fn address_register_index(self) -> u32 {
        bits(self.0, 22, 2)
    }

    pub fn dest(self) -> DestRegister {
        DestRegister::from_raw(bits(self.0, 24, 5) as u8)
    }
}

/// Field view for the flow-control encoding family.
#[derive(Clone, Copy)]
pub struct FlowControl(u32);

impl FlowControl {
    pub fn num_instructions(self) -> u32 {
        bits(self.0, 0, 8)
    }

    pub fn dest_offset(self) -> u32 {
        bits(self.0, 10, 12)
    }

    pub fn op(self) -> Condition {
        match bits(self.0, 22, 2) {
            0 => Condition::Or,
            1 => Condition::And,
            2 => Condition::JustX,
            _ => Condition::JustY,
        }
    }

    pub fn bool_uniform_id(self) -> usize {
        bits(self.0, 22, 4) as usize
    }

    pub fn int_uniform_id(self) -> usize {
        bits(self.0, 22, 4) as usize
    }

    pub fn refy(self) -> u32 {
        bits(self.0, 24, 1)
    }

    pub fn refx(self) -> u32 {
        bits(self.0, 25, 1)
    }
}

/// An operand-descriptor word: destination write mask, per-source lane
/// selectors and negate bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwizzlePattern(pub u32);

impl SwizzlePattern {
    /// Four write-enable bits; bit 3 is X, bit 0 is W.
    pub fn dest_mask(self) -> u8 {
        (self.0 & 0xf) as u8
    }

    /// Write enable for component `component` (0 = X .. 3 = W).
    pub fn dest_component_enabled(self, component: usize) -> bool {
        self.dest_mask() & (8 >> component) != 0
    }

    /// The 8-bit lane selector for source `src_num` (1-based). The X lane's
    /// source sits in the top two bits.
    pub fn raw_selector(self, src_num: u32) -> u8 {
        match src_num {
            1 => bits(self.0, 5, 8) as u8,
            2 => bits(self.0, 14, 8) as u8,
            3 => bits(self.0, 23, 8) as u8,
            _ => unreachable!("source operands are numbered 1 to 3"),
        }
    }

    pub fn negate(self, src_num: u32) -> bool {
        let bit = match src_num {
            1 => 4,
            2 => 13,
            3 => 22,
            _ => unreachable!("source operands are numbered 1 to 3"),
        };
        bits(self.0, bit, 1) != 0
    }
}
