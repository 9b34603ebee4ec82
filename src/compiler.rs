//! Instruction compiler: walks a PICA200 program and lowers each opcode to
//! SSE-based native code.
//!
//! One native function is produced per shader. Its entry saves the
//! callee-saved registers, loads the fixed role registers and jumps to the
//! native label of the requested entry offset; `END` restores and returns.
//! Subroutines are inlined structurally: a call site pushes its return
//! offset as a sentinel and the emitted stream checks for it at every
//! offset the pre-pass identified as a return point.

use dynasmrt::{DynasmApi, DynasmLabelApi, dynasm};

use crate::analysis::find_return_offsets;
use crate::arch::x64::{
    self, ADDROFFS_REG_0, ADDROFFS_REG_1, Assembler, AssemblyOffset, DynamicLabel,
    ExecutableBuffer, LOOPCOUNT_REG, SETUP, SRC1, SRC2, SRC3, STATE,
};
use crate::error::CompileError;
use crate::intrinsics;
use crate::isa::{
    CompareOp, Condition, FULL_DEST_MASK, Instruction, MAX_PROGRAM_CODE_LENGTH,
    MAX_SWIZZLE_DATA_LENGTH, NO_SRC_SWIZZLE, OpCode, RegisterType, SourceRegister, SwizzlePattern,
};
use crate::state::{ShaderSetup, UnitState};

/// Upper bound on the emitted code size, checked after compilation.
pub const MAX_SHADER_SIZE: usize = 2 * 1024 * 1024;

// SSE compare predicates.
const CMP_EQ: i8 = 0;
const CMP_LT: i8 = 1;
const CMP_LE: i8 = 2;
const CMP_UNORD: i8 = 3;
const CMP_NEQ: i8 = 4;
const CMP_ORD: i8 = 7;

#[repr(C, align(16))]
struct ConstVec4([f32; 4]);

/// Loaded into xmm14 at entry; used to set lanes to one.
static ONE_VEC: ConstVec4 = ConstVec4([1.0, 1.0, 1.0, 1.0]);
/// Loaded into xmm15 at entry; XORing with it negates a vector.
static NEG_ZERO_VEC: ConstVec4 = ConstVec4([-0.0, -0.0, -0.0, -0.0]);

type ShaderFn = unsafe extern "sysv64" fn(*const ShaderSetup, *mut UnitState, *const u8);

/// A compiled shader. Owns the executable buffer containing JIT'd code.
pub struct CompiledShader {
    buf: ExecutableBuffer,
    func: ShaderFn,
    instruction_offsets: Vec<AssemblyOffset>,
}

impl CompiledShader {
    /// Execute the shader starting at program offset `entry_point`.
    ///
    /// # Panics
    /// Panics if `entry_point` is outside the compiled program.
    ///
    /// # Safety
    /// Indexed addressing offsets come from `MOVA` results and loop
    /// parameters in shader-controlled data; a malicious program can form
    /// reads outside `setup`. The caller vouches that the program and its
    /// uniforms keep indexed accesses within the float-uniform range, the
    /// same contract the hardware register files impose.
    pub unsafe fn run(&self, setup: &ShaderSetup, state: &mut UnitState, entry_point: usize) {
        let entry = self.buf.ptr(self.instruction_offsets[entry_point]);
        unsafe { (self.func)(setup, state, entry) }
    }

    /// The raw executable code buffer.
    pub fn code(&self) -> &[u8] {
        &self.buf
    }

    /// Number of program offsets that can serve as an entry point.
    pub fn num_instructions(&self) -> usize {
        self.instruction_offsets.len()
    }
}

/// Compile a shader program against its operand-descriptor table.
///
/// Both slices are only read during compilation; the returned shader holds
/// no reference to them. Uniforms are read at run time through the setup
/// pointer passed to [`CompiledShader::run`].
pub fn compile(program: &[u32], swizzle_data: &[u32]) -> Result<CompiledShader, CompileError> {
    if program.len() > MAX_PROGRAM_CODE_LENGTH {
        return Err(CompileError::ProgramTooLong(program.len()));
    }
    if swizzle_data.len() > MAX_SWIZZLE_DATA_LENGTH {
        return Err(CompileError::SwizzleTableTooLong(swizzle_data.len()));
    }

    let mut compiler = ShaderCompiler::new(program, swizzle_data);
    compiler.compile_program()?;
    compiler.finish()
}

struct ShaderCompiler<'a> {
    ops: Assembler,
    program: &'a [u32],
    swizzle_data: &'a [u32],
    /// One label per program offset, bound as emission reaches it.
    instruction_labels: Vec<DynamicLabel>,
    /// Resolved buffer offset per program offset, recorded at bind time.
    instruction_offsets: Vec<AssemblyOffset>,
    /// Sorted return points collected by the pre-pass.
    return_offsets: Vec<u32>,
    program_counter: usize,
    looping: bool,
    sse4_1: bool,
}

impl<'a> ShaderCompiler<'a> {
    fn new(program: &'a [u32], swizzle_data: &'a [u32]) -> Self {
        let mut ops = Assembler::new().expect("failed to create assembler");
        let instruction_labels = (0..program.len()).map(|_| ops.new_dynamic_label()).collect();

        ShaderCompiler {
            ops,
            program,
            swizzle_data,
            instruction_labels,
            instruction_offsets: vec![AssemblyOffset(0); program.len()],
            return_offsets: find_return_offsets(program),
            program_counter: 0,
            looping: false,
            sse4_1: x64::sse4_1_supported(),
        }
    }

    fn compile_program(&mut self) -> Result<(), CompileError> {
        x64::emit_prologue(&mut self.ops);

        let one = (&raw const ONE_VEC) as i64;
        let neg = (&raw const NEG_ZERO_VEC) as i64;
        dynasm!(self.ops
            ; .arch x64
            ; mov r9, rdi
            ; mov r15, rsi
            // Zero the address offsets and the loop accumulator
            ; xor r10d, r10d
            ; xor r11d, r11d
            ; xor r12d, r12d
            ; mov rax, QWORD one
            ; movaps xmm14, [rax]
            ; mov rax, QWORD neg
            ; movaps xmm15, [rax]
            // Start executing at the requested entry offset
            ; jmp rdx
        );

        self.compile_block(self.program.len())?;
        self.compile_end_of_program_guard();
        Ok(())
    }

    fn finish(self) -> Result<CompiledShader, CompileError> {
        let size = self.ops.offset().0;
        if size > MAX_SHADER_SIZE {
            return Err(CompileError::ShaderTooLarge { size });
        }

        let mut ops = self.ops;
        ops.commit().expect("failed to commit assembly");
        let buf = ops.finalize().expect("failed to finalize assembly");
        log::debug!("compiled shader size={size}");

        let func: ShaderFn = unsafe { core::mem::transmute(buf.ptr(AssemblyOffset(0))) };
        Ok(CompiledShader {
            buf,
            func,
            instruction_offsets: self.instruction_offsets,
        })
    }

    fn compile_block(&mut self, end: usize) -> Result<(), CompileError> {
        while self.program_counter < end {
            self.compile_next_instr()?;
        }
        Ok(())
    }

    fn compile_next_instr(&mut self) -> Result<(), CompileError> {
        if self
            .return_offsets
            .binary_search(&(self.program_counter as u32))
            .is_ok()
        {
            self.compile_return_check();
        }

        let label = self.instruction_labels[self.program_counter];
        self.instruction_offsets[self.program_counter] = self.ops.offset();
        dynasm!(self.ops ; .arch x64 ; =>label);

        let instr = Instruction(self.program[self.program_counter]);
        self.program_counter += 1;

        match instr.opcode() {
            OpCode::Add => self.compile_add(instr)?,
            OpCode::Dp3 => self.compile_dp3(instr)?,
            OpCode::Dp4 => self.compile_dp4(instr)?,
            OpCode::Dph | OpCode::Dphi => self.compile_dph(instr)?,
            OpCode::Ex2 => self.compile_unary_call(instr, intrinsics::pica_exp2 as *const u8)?,
            OpCode::Lg2 => self.compile_unary_call(instr, intrinsics::pica_log2 as *const u8)?,
            OpCode::Mul => self.compile_mul(instr)?,
            OpCode::Sge | OpCode::Sgei => self.compile_sge(instr)?,
            OpCode::Slt | OpCode::Slti => self.compile_slt(instr)?,
            OpCode::Flr => self.compile_flr(instr)?,
            OpCode::Max => self.compile_max(instr)?,
            OpCode::Min => self.compile_min(instr)?,
            OpCode::Rcp => self.compile_rcp(instr)?,
            OpCode::Rsq => self.compile_rsq(instr)?,
            OpCode::Mova => self.compile_mova(instr)?,
            OpCode::Mov => self.compile_mov(instr)?,
            OpCode::Nop => {}
            OpCode::End => self.compile_end(),
            OpCode::Call => self.compile_call(instr)?,
            OpCode::CallC => self.compile_callc(instr)?,
            OpCode::CallU => self.compile_callu(instr)?,
            OpCode::IfU | OpCode::IfC => self.compile_if(instr)?,
            OpCode::Loop => self.compile_loop(instr)?,
            OpCode::JmpC | OpCode::JmpU => self.compile_jmp(instr)?,
            OpCode::Cmp => self.compile_cmp(instr)?,
            OpCode::Mad | OpCode::Madi => self.compile_mad(instr)?,
            opcode @ (OpCode::BreakC | OpCode::Emit | OpCode::SetEmit) => {
                log::error!("unhandled instruction: {opcode:?} (0x{:08x})", instr.0);
            }
            OpCode::Unknown(raw) => {
                log::error!("unknown instruction: 0x{raw:02x} (0x{:08x})", instr.0);
            }
        }
        Ok(())
    }

    /// Look up the swizzle pattern for an operand descriptor id.
    fn swizzle_pattern(&self, desc_id: usize) -> Result<SwizzlePattern, CompileError> {
        self.swizzle_data
            .get(desc_id)
            .map(|&word| SwizzlePattern(word))
            .ok_or(CompileError::InvalidOperandDescriptor {
                pc: self.program_counter - 1,
                id: desc_id,
            })
    }

    /// Load source operand `src_num` (1-based) into xmm register `dest`,
    /// applying indexed addressing, swizzle and negation.
    fn compile_swizzle_src(
        &mut self,
        instr: Instruction,
        src_num: u32,
        src_reg: SourceRegister,
        dest: u8,
    ) -> Result<(), CompileError> {
        let (src_ptr, src_offset) = if src_reg.register_type() == RegisterType::FloatUniform {
            (SETUP, ShaderSetup::float_uniform_offset(src_reg.index()))
        } else {
            (STATE, UnitState::input_offset(src_reg))
        };
        let disp = src_offset as i32;

        let opcode = instr.opcode();
        let is_inverted = opcode.is_inverted();
        let (operand_desc_id, offset_src, address_register_index) = if opcode.is_mad_family() {
            let mad = instr.mad();
            (
                mad.operand_desc_id(),
                if is_inverted { 3 } else { 2 },
                mad.address_register_index(),
            )
        } else {
            let common = instr.common();
            (
                common.operand_desc_id(),
                if is_inverted { 2 } else { 1 },
                common.address_register_index(),
            )
        };

        // Only the wide operand of the family can be indexed.
        if src_num == offset_src && address_register_index != 0 {
            let offset_reg = match address_register_index {
                1 => ADDROFFS_REG_0,
                2 => ADDROFFS_REG_1,
                3 => LOOPCOUNT_REG,
                _ => unreachable!("address register index is a two-bit field"),
            };
            dynasm!(self.ops
                ; .arch x64
                ; movaps Rx(dest), [Rq(src_ptr) + Rq(offset_reg) + disp]
            );
        } else {
            dynasm!(self.ops
                ; .arch x64
                ; movaps Rx(dest), [Rq(src_ptr) + disp]
            );
        }

        let swiz = self.swizzle_pattern(operand_desc_id)?;

        let sel = swiz.raw_selector(src_num);
        if sel != NO_SRC_SWIZZLE {
            // The selector's component order is reversed for SHUFPS
            let sel = ((sel & 0xc0) >> 6) | ((sel & 0x3) << 6) | ((sel & 0xc) << 2) | ((sel & 0x30) >> 2);
            dynasm!(self.ops
                ; .arch x64
                ; shufps Rx(dest), Rx(dest), sel as i8
            );
        }

        if swiz.negate(src_num) {
            dynasm!(self.ops
                ; .arch x64
                ; xorps Rx(dest), xmm15
            );
        }
        Ok(())
    }

    /// Store xmm register `src` to the instruction's destination, honoring
    /// the descriptor's per-component write mask.
    fn compile_dest_enable(&mut self, instr: Instruction, src: u8) -> Result<(), CompileError> {
        let (operand_desc_id, dest) = if instr.opcode().is_mad_family() {
            (instr.mad().operand_desc_id(), instr.mad().dest())
        } else {
            (instr.common().operand_desc_id(), instr.common().dest())
        };
        let swiz = self.swizzle_pattern(operand_desc_id)?;
        let disp = UnitState::output_offset(dest) as i32;

        if swiz.dest_mask() == FULL_DEST_MASK {
            dynasm!(self.ops
                ; .arch x64
                ; movaps [r15 + disp], Rx(src)
            );
            return Ok(());
        }

        // Partial mask: merge with the current destination value
        dynasm!(self.ops
            ; .arch x64
            ; movaps xmm0, [r15 + disp]
        );

        if self.sse4_1 {
            // BLENDPS numbers its mask bits in the opposite component order
            let mask = swiz.dest_mask();
            let blend =
                ((mask & 1) << 3) | ((mask & 8) >> 3) | ((mask & 2) << 1) | ((mask & 4) >> 1);
            dynasm!(self.ops
                ; .arch x64
                ; blendps xmm0, Rx(src), blend as i8
            );
        } else {
            // Interleave X/Y and Z/W of source and destination, then pick
            // each output component from the enabled side
            dynasm!(self.ops
                ; .arch x64
                ; movaps xmm4, Rx(src)
                ; unpckhps xmm4, xmm0
                ; unpcklps xmm0, Rx(src)
            );
            let sel: u8 = (if swiz.dest_component_enabled(0) { 1 } else { 0 })
                | ((if swiz.dest_component_enabled(1) { 3 } else { 2 }) << 2)
                | ((if swiz.dest_component_enabled(2) { 0 } else { 1 }) << 4)
                | ((if swiz.dest_component_enabled(3) { 2 } else { 3 }) << 6);
            dynasm!(self.ops
                ; .arch x64
                ; shufps xmm0, xmm4, sel as i8
            );
        }

        dynasm!(self.ops
            ; .arch x64
            ; movaps [r15 + disp], xmm0
        );
        Ok(())
    }

    /// Multiply xmm1 by xmm2 with PICA NaN semantics: lanes whose inputs
    /// were ordered but whose product is NaN (0 × ∞) flush to zero; lanes
    /// with a NaN input keep propagating it. Clobbers xmm0 and xmm2.
    fn compile_sanitized_mul(&mut self) {
        dynasm!(self.ops
            ; .arch x64
            ; movaps xmm0, xmm1
            ; cmpps xmm0, xmm2, CMP_ORD
            ; mulps xmm1, xmm2
            ; movaps xmm2, xmm1
            ; cmpps xmm2, xmm2, CMP_UNORD
            ; xorps xmm0, xmm2
            ; andps xmm1, xmm0
        );
    }

    /// Sum all four lanes of xmm1 and broadcast the result. Clobbers xmm2.
    fn compile_horizontal_sum(&mut self) {
        dynasm!(self.ops
            ; .arch x64
            ; movaps xmm2, xmm1
            ; shufps xmm1, xmm1, -79 // 0b10_11_00_01 as i8
            ; addps xmm1, xmm2
            ; movaps xmm2, xmm1
            ; shufps xmm1, xmm1, 0b00_01_10_11
            ; addps xmm1, xmm2
        );
    }

    /// Set the host zero flag from the X/Y comparison cache per the
    /// instruction's reference values and combinator. NXOR aligns "matches
    /// the expected value" to one.
    fn compile_evaluate_condition(&mut self, instr: Instruction) {
        let flow = instr.flow_control();
        let refx = (flow.refx() ^ 1) as i32;
        let refy = (flow.refy() ^ 1) as i32;
        match flow.op() {
            Condition::Or => dynasm!(self.ops
                ; .arch x64
                ; mov eax, r13d
                ; mov ebx, r14d
                ; xor eax, refx
                ; xor ebx, refy
                ; or eax, ebx
            ),
            Condition::And => dynasm!(self.ops
                ; .arch x64
                ; mov eax, r13d
                ; mov ebx, r14d
                ; xor eax, refx
                ; xor ebx, refy
                ; and eax, ebx
            ),
            Condition::JustX => dynasm!(self.ops
                ; .arch x64
                ; mov eax, r13d
                ; xor eax, refx
            ),
            Condition::JustY => dynasm!(self.ops
                ; .arch x64
                ; mov eax, r14d
                ; xor eax, refy
            ),
        }
    }

    /// Set the host zero flag from a boolean uniform.
    fn compile_uniform_condition(&mut self, instr: Instruction) {
        let disp = ShaderSetup::bool_uniform_offset(instr.flow_control().bool_uniform_id()) as i32;
        dynasm!(self.ops
            ; .arch x64
            ; cmp BYTE [r9 + disp], 0
        );
    }

    fn compile_add(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let common = instr.common();
        self.compile_swizzle_src(instr, 1, common.src1(), SRC1)?;
        self.compile_swizzle_src(instr, 2, common.src2(), SRC2)?;
        dynasm!(self.ops
            ; .arch x64
            ; addps xmm1, xmm2
        );
        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_dp3(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let common = instr.common();
        self.compile_swizzle_src(instr, 1, common.src1(), SRC1)?;
        self.compile_swizzle_src(instr, 2, common.src2(), SRC2)?;

        self.compile_sanitized_mul();

        // Broadcast-and-add the first three lanes
        dynasm!(self.ops
            ; .arch x64
            ; movaps xmm2, xmm1
            ; shufps xmm2, xmm2, 0b01_01_01_01
            ; movaps xmm3, xmm1
            ; shufps xmm3, xmm3, -86 // 0b10_10_10_10 as i8
            ; shufps xmm1, xmm1, 0b00_00_00_00
            ; addps xmm1, xmm2
            ; addps xmm1, xmm3
        );

        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_dp4(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let common = instr.common();
        self.compile_swizzle_src(instr, 1, common.src1(), SRC1)?;
        self.compile_swizzle_src(instr, 2, common.src2(), SRC2)?;

        self.compile_sanitized_mul();
        self.compile_horizontal_sum();

        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_dph(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let common = instr.common();
        if instr.opcode() == OpCode::Dphi {
            self.compile_swizzle_src(instr, 1, common.src1i(), SRC1)?;
            self.compile_swizzle_src(instr, 2, common.src2i(), SRC2)?;
        } else {
            self.compile_swizzle_src(instr, 1, common.src1(), SRC1)?;
            self.compile_swizzle_src(instr, 2, common.src2(), SRC2)?;
        }

        // Force src1's W component to 1.0 before the dot product
        if self.sse4_1 {
            dynasm!(self.ops
                ; .arch x64
                ; blendps xmm1, xmm14, 0b1000
            );
        } else {
            dynasm!(self.ops
                ; .arch x64
                ; movaps xmm0, xmm1
                ; unpckhps xmm0, xmm14 // XYZW, 1111 -> Z1W1
                ; unpcklpd xmm1, xmm0  // XYZW, Z1W1 -> XYZ1
            );
        }

        self.compile_sanitized_mul();
        self.compile_horizontal_sum();

        self.compile_dest_enable(instr, SRC1)
    }

    /// `EX2`/`LG2`: scalar foreign call on lane X, result broadcast.
    fn compile_unary_call(
        &mut self,
        instr: Instruction,
        target: *const u8,
    ) -> Result<(), CompileError> {
        self.compile_swizzle_src(instr, 1, instr.common().src1(), SRC1)?;
        dynasm!(self.ops
            ; .arch x64
            ; movss xmm0, xmm1
        );

        x64::emit_push_persistent_caller_saved(&mut self.ops);
        x64::emit_call_far(&mut self.ops, target);
        x64::emit_pop_persistent_caller_saved(&mut self.ops);

        dynasm!(self.ops
            ; .arch x64
            ; shufps xmm0, xmm0, 0b00_00_00_00
            ; movaps xmm1, xmm0
        );
        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_mul(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let common = instr.common();
        self.compile_swizzle_src(instr, 1, common.src1(), SRC1)?;
        self.compile_swizzle_src(instr, 2, common.src2(), SRC2)?;
        self.compile_sanitized_mul();
        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_sge(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let common = instr.common();
        if instr.opcode() == OpCode::Sgei {
            self.compile_swizzle_src(instr, 1, common.src1i(), SRC1)?;
            self.compile_swizzle_src(instr, 2, common.src2i(), SRC2)?;
        } else {
            self.compile_swizzle_src(instr, 1, common.src1(), SRC1)?;
            self.compile_swizzle_src(instr, 2, common.src2(), SRC2)?;
        }

        dynasm!(self.ops
            ; .arch x64
            ; cmpps xmm2, xmm1, CMP_LE
            ; andps xmm2, xmm14
        );
        self.compile_dest_enable(instr, SRC2)
    }

    fn compile_slt(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let common = instr.common();
        if instr.opcode() == OpCode::Slti {
            self.compile_swizzle_src(instr, 1, common.src1i(), SRC1)?;
            self.compile_swizzle_src(instr, 2, common.src2i(), SRC2)?;
        } else {
            self.compile_swizzle_src(instr, 1, common.src1(), SRC1)?;
            self.compile_swizzle_src(instr, 2, common.src2(), SRC2)?;
        }

        dynasm!(self.ops
            ; .arch x64
            ; cmpps xmm1, xmm2, CMP_LT
            ; andps xmm1, xmm14
        );
        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_flr(&mut self, instr: Instruction) -> Result<(), CompileError> {
        self.compile_swizzle_src(instr, 1, instr.common().src1(), SRC1)?;

        if self.sse4_1 {
            dynasm!(self.ops
                ; .arch x64
                ; roundps xmm1, xmm1, 1
            );
        } else {
            // Truncate-and-reconvert; rounds toward zero for negatives
            dynasm!(self.ops
                ; .arch x64
                ; cvttps2dq xmm1, xmm1
                ; cvtdq2ps xmm1, xmm1
            );
        }

        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_max(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let common = instr.common();
        self.compile_swizzle_src(instr, 1, common.src1(), SRC1)?;
        self.compile_swizzle_src(instr, 2, common.src2(), SRC2)?;
        // SSE matches the PICA200 convention: on NaN, the second operand wins
        dynasm!(self.ops
            ; .arch x64
            ; maxps xmm1, xmm2
        );
        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_min(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let common = instr.common();
        self.compile_swizzle_src(instr, 1, common.src1(), SRC1)?;
        self.compile_swizzle_src(instr, 2, common.src2(), SRC2)?;
        // SSE matches the PICA200 convention: on NaN, the second operand wins
        dynasm!(self.ops
            ; .arch x64
            ; minps xmm1, xmm2
        );
        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_rcp(&mut self, instr: Instruction) -> Result<(), CompileError> {
        self.compile_swizzle_src(instr, 1, instr.common().src1(), SRC1)?;

        // RCPSS is the hardware approximation; the PICA's own unit is no
        // more precise, but the exact error profile differs
        dynasm!(self.ops
            ; .arch x64
            ; rcpss xmm1, xmm1
            ; shufps xmm1, xmm1, 0b00_00_00_00
        );

        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_rsq(&mut self, instr: Instruction) -> Result<(), CompileError> {
        self.compile_swizzle_src(instr, 1, instr.common().src1(), SRC1)?;

        dynasm!(self.ops
            ; .arch x64
            ; rsqrtss xmm1, xmm1
            ; shufps xmm1, xmm1, 0b00_00_00_00
        );

        self.compile_dest_enable(instr, SRC1)
    }

    /// `MOVA`: truncate lanes X/Y to integers and load them into the
    /// address offset registers, pre-scaled by the 16-byte vector stride.
    fn compile_mova(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let swiz = self.swizzle_pattern(instr.common().operand_desc_id())?;

        if !swiz.dest_component_enabled(0) && !swiz.dest_component_enabled(1) {
            return Ok(());
        }

        self.compile_swizzle_src(instr, 1, instr.common().src1(), SRC1)?;

        dynasm!(self.ops
            ; .arch x64
            ; cvttps2dq xmm1, xmm1
            ; movq rax, xmm1
        );

        if swiz.dest_component_enabled(0) && swiz.dest_component_enabled(1) {
            dynasm!(self.ops
                ; .arch x64
                ; movsxd r10, eax
                ; shr rax, 32
                ; movsxd r11, eax
                ; shl r10, 4
                ; shl r11, 4
            );
        } else if swiz.dest_component_enabled(0) {
            dynasm!(self.ops
                ; .arch x64
                ; movsxd r10, eax
                ; shl r10, 4
            );
        } else {
            dynasm!(self.ops
                ; .arch x64
                ; shr rax, 32
                ; movsxd r11, eax
                ; shl r11, 4
            );
        }
        Ok(())
    }

    fn compile_mov(&mut self, instr: Instruction) -> Result<(), CompileError> {
        self.compile_swizzle_src(instr, 1, instr.common().src1(), SRC1)?;
        self.compile_dest_enable(instr, SRC1)
    }

    /// `CMP`: cache the X and Y comparison results in COND0/COND1.
    fn compile_cmp(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let common = instr.common();
        let pc = self.program_counter - 1;
        let op_x = CompareOp::from_raw(common.compare_op_x()).ok_or(
            CompileError::InvalidCompareOp {
                pc,
                raw: common.compare_op_x(),
            },
        )?;
        let op_y = CompareOp::from_raw(common.compare_op_y()).ok_or(
            CompileError::InvalidCompareOp {
                pc,
                raw: common.compare_op_y(),
            },
        )?;

        self.compile_swizzle_src(instr, 1, common.src1(), SRC1)?;
        self.compile_swizzle_src(instr, 2, common.src2(), SRC2)?;

        // SSE has no GT/GE predicate that behaves with NaN (NLT/NLE do
        // not match); swap the operands and use LT/LE instead
        fn predicate(op: CompareOp) -> i8 {
            match op {
                CompareOp::Eq => CMP_EQ,
                CompareOp::Neq => CMP_NEQ,
                CompareOp::Lt | CompareOp::Gt => CMP_LT,
                CompareOp::Le | CompareOp::Ge => CMP_LE,
            }
        }
        fn swaps_operands(op: CompareOp) -> bool {
            matches!(op, CompareOp::Gt | CompareOp::Ge)
        }

        let invert_x = swaps_operands(op_x);
        let (lhs_x, rhs_x) = if invert_x { (SRC2, SRC1) } else { (SRC1, SRC2) };
        let pred_x = predicate(op_x);

        if op_x == op_y {
            // One packed compare covers both components
            dynasm!(self.ops
                ; .arch x64
                ; cmpps Rx(lhs_x), Rx(rhs_x), pred_x
                ; movq r13, Rx(lhs_x)
                ; mov r14, r13
            );
        } else {
            let invert_y = swaps_operands(op_y);
            let (lhs_y, rhs_y) = if invert_y { (SRC2, SRC1) } else { (SRC1, SRC2) };
            let pred_y = predicate(op_y);

            dynasm!(self.ops
                ; .arch x64
                ; movaps xmm0, Rx(lhs_x)
                ; cmpss xmm0, Rx(rhs_x), pred_x
                ; cmpps Rx(lhs_y), Rx(rhs_y), pred_y
                ; movq r13, xmm0
                ; movq r14, Rx(lhs_y)
            );
        }

        dynasm!(self.ops
            ; .arch x64
            ; shr r13d, 31
            ; shr r14, 63
        );
        Ok(())
    }

    fn compile_mad(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let mad = instr.mad();
        self.compile_swizzle_src(instr, 1, mad.src1(), SRC1)?;

        if instr.opcode() == OpCode::Madi {
            self.compile_swizzle_src(instr, 2, mad.src2i(), SRC2)?;
            self.compile_swizzle_src(instr, 3, mad.src3i(), SRC3)?;
        } else {
            self.compile_swizzle_src(instr, 2, mad.src2(), SRC2)?;
            self.compile_swizzle_src(instr, 3, mad.src3(), SRC3)?;
        }

        self.compile_sanitized_mul();
        dynasm!(self.ops
            ; .arch x64
            ; addps xmm1, xmm3
        );

        self.compile_dest_enable(instr, SRC1)
    }

    fn compile_end(&mut self) {
        x64::emit_epilogue(&mut self.ops);
    }

    fn compile_call(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let flow = instr.flow_control();
        let dest = flow.dest_offset() as usize;
        if dest >= self.program.len() || dest + flow.num_instructions() as usize > self.program.len()
        {
            return Err(CompileError::BranchTargetOutOfRange {
                pc: self.program_counter - 1,
                dest,
            });
        }

        let return_offset = (flow.dest_offset() + flow.num_instructions()) as i32;
        let target = self.instruction_labels[dest];
        dynasm!(self.ops
            ; .arch x64
            // Sentinel consumed by the return checks inside the subroutine
            ; push DWORD return_offset
            ; call =>target
            // Drop the sentinel
            ; add rsp, 8
        );
        Ok(())
    }

    fn compile_callc(&mut self, instr: Instruction) -> Result<(), CompileError> {
        self.compile_evaluate_condition(instr);
        let skip = self.ops.new_dynamic_label();
        dynasm!(self.ops ; .arch x64 ; jz =>skip);
        self.compile_call(instr)?;
        dynasm!(self.ops ; .arch x64 ; =>skip);
        Ok(())
    }

    fn compile_callu(&mut self, instr: Instruction) -> Result<(), CompileError> {
        self.compile_uniform_condition(instr);
        let skip = self.ops.new_dynamic_label();
        dynasm!(self.ops ; .arch x64 ; jz =>skip);
        self.compile_call(instr)?;
        dynasm!(self.ops ; .arch x64 ; =>skip);
        Ok(())
    }

    fn compile_if(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let flow = instr.flow_control();
        let dest = flow.dest_offset() as usize;
        let num = flow.num_instructions() as usize;
        let pc = self.program_counter - 1;

        if dest < self.program_counter {
            return Err(CompileError::BackwardsIf { pc, dest });
        }
        if dest + num > self.program.len() {
            return Err(CompileError::BranchTargetOutOfRange { pc, dest: dest + num });
        }

        match instr.opcode() {
            OpCode::IfU => self.compile_uniform_condition(instr),
            OpCode::IfC => self.compile_evaluate_condition(instr),
            _ => unreachable!("compile_if only handles IFU/IFC"),
        }

        let l_else = self.ops.new_dynamic_label();
        dynasm!(self.ops ; .arch x64 ; jz =>l_else);

        // True branch: everything up to the else bound
        self.compile_block(dest)?;

        if num == 0 {
            // No ELSE region
            dynasm!(self.ops ; .arch x64 ; =>l_else);
            return Ok(());
        }

        let l_endif = self.ops.new_dynamic_label();
        dynasm!(self.ops
            ; .arch x64
            ; jmp =>l_endif
            ; =>l_else
        );

        // False branch
        self.compile_block(dest + num)?;

        dynasm!(self.ops ; .arch x64 ; =>l_endif);
        Ok(())
    }

    fn compile_loop(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let flow = instr.flow_control();
        let dest = flow.dest_offset() as usize;
        let pc = self.program_counter - 1;

        if dest < self.program_counter {
            return Err(CompileError::BackwardsLoop { pc, dest });
        }
        if self.looping {
            return Err(CompileError::NestedLoop { pc });
        }
        if dest >= self.program.len() {
            return Err(CompileError::BranchTargetOutOfRange { pc, dest });
        }

        self.looping = true;

        // Unpack the integer uniform: X is the iteration count minus one,
        // Y the start and Z the increment. Y and Z stay multiplied by 16
        // so they can serve directly as byte offsets into 16-byte vectors.
        let disp = ShaderSetup::int_uniform_offset(flow.int_uniform_id()) as i32;
        dynasm!(self.ops
            ; .arch x64
            ; mov esi, [r9 + disp]
            ; mov r12d, esi
            ; shr r12d, 4
            ; and r12d, 0xFF0
            ; mov edi, esi
            ; shr edi, 12
            ; and edi, 0xFF0
            ; movzx esi, sil
            ; add esi, 1
        );

        let l_loop_start = self.ops.new_dynamic_label();
        dynasm!(self.ops ; .arch x64 ; =>l_loop_start);

        // The body is inclusive of the instruction at dest
        self.compile_block(dest + 1)?;

        dynasm!(self.ops
            ; .arch x64
            ; add r12d, edi
            ; sub esi, 1
            ; jnz =>l_loop_start
        );

        self.looping = false;
        Ok(())
    }

    fn compile_jmp(&mut self, instr: Instruction) -> Result<(), CompileError> {
        let opcode = instr.opcode();
        match opcode {
            OpCode::JmpC => self.compile_evaluate_condition(instr),
            OpCode::JmpU => self.compile_uniform_condition(instr),
            _ => unreachable!("compile_jmp only handles JMPC/JMPU"),
        }

        let flow = instr.flow_control();
        let dest = flow.dest_offset() as usize;
        if dest >= self.program.len() {
            return Err(CompileError::BranchTargetOutOfRange {
                pc: self.program_counter - 1,
                dest,
            });
        }

        // JMPU selects its branch sense from bit 0 of num_instructions
        let inverted = opcode == OpCode::JmpU && flow.num_instructions() & 1 == 1;

        let target = self.instruction_labels[dest];
        if inverted {
            dynasm!(self.ops ; .arch x64 ; jz =>target);
        } else {
            dynasm!(self.ops ; .arch x64 ; jnz =>target);
        }
        Ok(())
    }

    /// Return check spliced at each return point: if the sentinel pushed by
    /// the active CALL equals the current offset, return to the call site.
    fn compile_return_check(&mut self) {
        let pc = self.program_counter as i32;
        let skip = self.ops.new_dynamic_label();
        dynasm!(self.ops
            ; .arch x64
            // The sentinel sits above the native return address
            ; mov rax, [rsp + 8]
            ; cmp eax, pc
            ; jnz =>skip
            ; ret
            ; =>skip
        );
    }

    /// Tail guard: reached only when a program path runs past the last
    /// instruction without END. Reports the fault and returns cleanly
    /// instead of executing whatever follows the buffer.
    fn compile_end_of_program_guard(&mut self) {
        let msg = c"shader program flowed past its last instruction without END"
            .as_ptr() as i64;
        dynasm!(self.ops
            ; .arch x64
            ; mov rdi, QWORD msg
        );
        x64::emit_call_far(&mut self.ops, intrinsics::pica_log_critical as *const u8);
        x64::emit_epilogue(&mut self.ops);
    }
}
