use crate::isa::{MAX_PROGRAM_CODE_LENGTH, MAX_SWIZZLE_DATA_LENGTH};

/// Errors detected while compiling a shader program.
///
/// All of these are compile-time conditions; emitted code itself never
/// faults. Callers can fall back to interpretation when compilation fails.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("program has {0} instructions, limit is {max}", max = MAX_PROGRAM_CODE_LENGTH)]
    ProgramTooLong(usize),

    #[error("swizzle table has {0} entries, limit is {max}", max = MAX_SWIZZLE_DATA_LENGTH)]
    SwizzleTableTooLong(usize),

    #[error("backwards if-statement at offset {pc} (target {dest})")]
    BackwardsIf { pc: usize, dest: usize },

    #[error("backwards loop at offset {pc} (target {dest})")]
    BackwardsLoop { pc: usize, dest: usize },

    #[error("nested loop at offset {pc}")]
    NestedLoop { pc: usize },

    #[error("branch target {dest} at offset {pc} lies outside the program")]
    BranchTargetOutOfRange { pc: usize, dest: usize },

    #[error("reserved compare operation {raw:#x} at offset {pc}")]
    InvalidCompareOp { pc: usize, raw: u32 },

    #[error("operand descriptor {id} at offset {pc} lies outside the swizzle table")]
    InvalidOperandDescriptor { pc: usize, id: usize },

    #[error("compiled shader is {size} bytes, exceeding the allocation limit")]
    ShaderTooLarge { size: usize },
}
