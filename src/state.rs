//! Register blocks shared between the host and emitted shader code.
//!
//! Layouts are `#[repr(C)]` so byte offsets are stable; the compiler bakes
//! them into generated addressing and the shader reads them at run time
//! through the setup and unit-state base pointers.

use core::mem::offset_of;

use crate::isa::{DestRegister, RegisterType, SourceRegister};

pub const NUM_FLOAT_UNIFORMS: usize = 96;
pub const NUM_BOOL_UNIFORMS: usize = 16;
pub const NUM_INT_UNIFORMS: usize = 4;
pub const NUM_INPUT_REGISTERS: usize = 16;
pub const NUM_TEMPORARY_REGISTERS: usize = 16;
pub const NUM_OUTPUT_REGISTERS: usize = 16;

/// Uniform storage referenced by a compiled shader.
///
/// Shared by every shader unit and read-only to emitted code. Integer
/// uniforms pack the `LOOP` parameters: byte 0 is the iteration count minus
/// one, byte 1 the starting offset, byte 2 the per-iteration increment.
#[repr(C, align(16))]
pub struct ShaderSetup {
    pub float_uniforms: [[f32; 4]; NUM_FLOAT_UNIFORMS],
    /// One byte per boolean uniform; zero is false, anything else true.
    pub bool_uniforms: [u8; NUM_BOOL_UNIFORMS],
    pub int_uniforms: [[u8; 4]; NUM_INT_UNIFORMS],
}

impl ShaderSetup {
    pub const fn float_uniform_offset(index: usize) -> usize {
        offset_of!(ShaderSetup, float_uniforms) + index * 16
    }

    pub const fn bool_uniform_offset(index: usize) -> usize {
        offset_of!(ShaderSetup, bool_uniforms) + index
    }

    pub const fn int_uniform_offset(index: usize) -> usize {
        offset_of!(ShaderSetup, int_uniforms) + index * 4
    }
}

impl Default for ShaderSetup {
    fn default() -> Self {
        ShaderSetup {
            float_uniforms: [[0.0; 4]; NUM_FLOAT_UNIFORMS],
            bool_uniforms: [0; NUM_BOOL_UNIFORMS],
            int_uniforms: [[0; 4]; NUM_INT_UNIFORMS],
        }
    }
}

/// Per-unit vertex state: attribute inputs, temporaries and outputs.
///
/// Exclusively owned by one shader invocation for its duration.
#[repr(C, align(16))]
pub struct UnitState {
    pub input: [[f32; 4]; NUM_INPUT_REGISTERS],
    pub temporary: [[f32; 4]; NUM_TEMPORARY_REGISTERS],
    pub output: [[f32; 4]; NUM_OUTPUT_REGISTERS],
}

impl UnitState {
    /// Byte offset of a readable register slot within the block.
    ///
    /// Float uniforms live in [`ShaderSetup`], not here.
    pub fn input_offset(reg: SourceRegister) -> usize {
        match reg.register_type() {
            RegisterType::Input => offset_of!(UnitState, input) + reg.index() * 16,
            RegisterType::Temporary => offset_of!(UnitState, temporary) + reg.index() * 16,
            RegisterType::FloatUniform => {
                unreachable!("float uniforms are addressed through the setup block")
            }
        }
    }

    /// Byte offset of a writable register slot within the block.
    pub fn output_offset(reg: DestRegister) -> usize {
        if reg.is_output() {
            offset_of!(UnitState, output) + reg.index() * 16
        } else {
            offset_of!(UnitState, temporary) + reg.index() * 16
        }
    }
}

impl Default for UnitState {
    fn default() -> Self {
        UnitState {
            input: [[0.0; 4]; NUM_INPUT_REGISTERS],
            temporary: [[0.0; 4]; NUM_TEMPORARY_REGISTERS],
            output: [[0.0; 4]; NUM_OUTPUT_REGISTERS],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{DestRegister, SourceRegister};

    #[test]
    fn setup_offsets() {
        assert_eq!(ShaderSetup::float_uniform_offset(0), 0);
        assert_eq!(ShaderSetup::float_uniform_offset(95), 95 * 16);
        assert_eq!(ShaderSetup::bool_uniform_offset(0), 96 * 16);
        assert_eq!(ShaderSetup::bool_uniform_offset(15), 96 * 16 + 15);
        assert_eq!(ShaderSetup::int_uniform_offset(0), 96 * 16 + 16);
        assert_eq!(ShaderSetup::int_uniform_offset(3), 96 * 16 + 16 + 12);
    }

    #[test]
    fn unit_state_offsets() {
        assert_eq!(UnitState::input_offset(SourceRegister::from_raw(0x00)), 0);
        assert_eq!(
            UnitState::input_offset(SourceRegister::from_raw(0x12)),
            16 * 16 + 2 * 16
        );
        assert_eq!(
            UnitState::output_offset(DestRegister::from_raw(0x01)),
            32 * 16 + 16
        );
        assert_eq!(
            UnitState::output_offset(DestRegister::from_raw(0x11)),
            16 * 16 + 16
        );
    }
}
