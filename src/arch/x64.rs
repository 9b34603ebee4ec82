use dynasmrt::{DynasmApi, dynasm};

pub type Assembler = dynasmrt::x64::Assembler;
pub use dynasmrt::{AssemblyOffset, DynamicLabel, ExecutableBuffer};

// Register assignments (System V AMD64 ABI). RAX/RBX and XMM0/XMM4 are
// scratch within a single lowering; everything else has a designated role
// that holds across the whole shader:
//
//   r9  = pointer to the shader setup block (uniforms)
//   r15 = pointer to the unit state block (inputs/temporaries/outputs)
//   r10 = address offset 0, set by MOVA.x (pre-scaled by 16)
//   r11 = address offset 1, set by MOVA.y (pre-scaled by 16)
//   r12d = loop offset accumulator (pre-scaled by 16)
//   esi = current loop iteration count
//   edi = loop offset increment (pre-scaled by 16)
//   r13 = COND0, X-component result of the last CMP
//   r14 = COND1, Y-component result of the last CMP
//
//   xmm0 = scratch
//   xmm1..xmm3 = swizzled source operands
//   xmm4 = second scratch
//   xmm14 = constant [1.0, 1.0, 1.0, 1.0]
//   xmm15 = constant [-0.0, -0.0, -0.0, -0.0]

/// Setup-block pointer (`r9`).
pub const SETUP: u8 = 9;
/// Unit-state pointer (`r15`).
pub const STATE: u8 = 15;
/// First MOVA address offset (`r10`).
pub const ADDROFFS_REG_0: u8 = 10;
/// Second MOVA address offset (`r11`).
pub const ADDROFFS_REG_1: u8 = 11;
/// Loop offset accumulator (`r12`).
pub const LOOPCOUNT_REG: u8 = 12;

/// Primary SIMD scratch (`xmm0`).
pub const SCRATCH: u8 = 0;
/// Swizzled source operands (`xmm1..xmm3`).
pub const SRC1: u8 = 1;
pub const SRC2: u8 = 2;
pub const SRC3: u8 = 3;
/// Secondary SIMD scratch (`xmm4`).
pub const SCRATCH2: u8 = 4;

/// Whether the emitter may use the SSE4.1 fast paths (`blendps`, `roundps`).
pub fn sse4_1_supported() -> bool {
    std::arch::is_x86_feature_detected!("sse4.1")
}

/// Emit the generated function's prologue.
///
/// Saves every callee-saved register and realigns the stack: rsp is
/// 8-mod-16 on entry, six pushes plus an 8-byte pad bring it back to a
/// 16-byte boundary. All emitted shader code runs at that alignment.
pub fn emit_prologue(ops: &mut Assembler) {
    dynasm!(ops
        ; .arch x64
        ; push rbx
        ; push rbp
        ; push r12
        ; push r13
        ; push r14
        ; push r15
        ; sub rsp, 8
    );
}

/// Emit the epilogue matching [`emit_prologue`]: restore and return.
pub fn emit_epilogue(ops: &mut Assembler) {
    dynasm!(ops
        ; .arch x64
        ; add rsp, 8
        ; pop r15
        ; pop r14
        ; pop r13
        ; pop r12
        ; pop rbp
        ; pop rbx
        ; ret
    );
}

/// Spill the role registers that a foreign callee is allowed to clobber.
///
/// Five GPR pushes plus a 40-byte frame (two XMM slots and an alignment
/// pad) keep rsp on a 16-byte boundary for the upcoming call. Must be
/// paired with [`emit_pop_persistent_caller_saved`].
pub fn emit_push_persistent_caller_saved(ops: &mut Assembler) {
    dynasm!(ops
        ; .arch x64
        ; push rsi
        ; push rdi
        ; push r9
        ; push r10
        ; push r11
        ; sub rsp, 40
        ; movaps [rsp], xmm14
        ; movaps [rsp + 16], xmm15
    );
}

pub fn emit_pop_persistent_caller_saved(ops: &mut Assembler) {
    dynasm!(ops
        ; .arch x64
        ; movaps xmm14, [rsp]
        ; movaps xmm15, [rsp + 16]
        ; add rsp, 40
        ; pop r11
        ; pop r10
        ; pop r9
        ; pop rdi
        ; pop rsi
    );
}

/// Emit an indirect call to an arbitrary host function.
///
/// The 64-bit address is materialised in rax; rax is clobbered.
pub fn emit_call_far(ops: &mut Assembler, target: *const u8) {
    let addr = target as i64;
    dynasm!(ops
        ; .arch x64
        ; mov rax, QWORD addr
        ; call rax
    );
}
