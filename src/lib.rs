//! Just-in-time translation of PICA200 vertex shaders to native x86-64 code.
//!
//! A shader program is compiled once into a single native function and then
//! invoked per vertex, replacing per-instruction interpretation. The
//! generated function takes the shader setup block (uniforms), the per-unit
//! vertex state (inputs, temporaries, outputs) and an entry address:
//!
//! ```no_run
//! # #[cfg(target_arch = "x86_64")] {
//! use picajit::{ShaderSetup, UnitState, compile};
//!
//! let program = [
//!     0x13u32 << 26, // MOV o0, v0
//!     0x22u32 << 26, // END
//! ];
//! let swizzle_data = [0xf | (0x1b << 5) | (0x1b << 14) | (0x1b << 23)];
//!
//! let shader = compile(&program, &swizzle_data).unwrap();
//! let setup = ShaderSetup::default();
//! let mut state = UnitState::default();
//! state.input[0] = [1.0, 2.0, 3.0, 4.0];
//! unsafe { shader.run(&setup, &mut state, 0) };
//! assert_eq!(state.output[0], [1.0, 2.0, 3.0, 4.0]);
//! # }
//! ```
//!
//! Compilation is synchronous and single-threaded; running a compiled
//! shader performs no allocation, takes no locks and never writes to the
//! setup block, so separate units can execute the same shader in parallel.

pub mod analysis;
#[cfg(target_arch = "x86_64")]
pub mod arch;
#[cfg(target_arch = "x86_64")]
pub mod compiler;
pub mod error;
pub mod intrinsics;
pub mod isa;
pub mod state;

#[cfg(target_arch = "x86_64")]
pub use compiler::{CompiledShader, MAX_SHADER_SIZE, compile};
pub use error::CompileError;
pub use state::{ShaderSetup, UnitState};

#[cfg(all(test, target_arch = "x86_64"))]
mod tests {
    use super::*;

    // ── instruction word builders ──────────────────────────────────────

    const MOV: u32 = 0x13;
    const ADD: u32 = 0x00;
    const DP4: u32 = 0x02;
    const DPH: u32 = 0x03;
    const EX2: u32 = 0x05;
    const LG2: u32 = 0x06;
    const MUL: u32 = 0x08;
    const SGE: u32 = 0x09;
    const SLT: u32 = 0x0a;
    const FLR: u32 = 0x0b;
    const MAX: u32 = 0x0c;
    const RCP: u32 = 0x0e;
    const RSQ: u32 = 0x0f;
    const MOVA: u32 = 0x12;
    const SGEI: u32 = 0x1a;
    const NOP: u32 = 0x21;
    const END: u32 = 0x22;
    const CALL: u32 = 0x24;
    const CALLU: u32 = 0x26;
    const IFU: u32 = 0x27;
    const LOOP: u32 = 0x29;
    const JMPC: u32 = 0x2c;
    const JMPU: u32 = 0x2d;

    // Register raws: inputs are 0x00.., temporaries 0x10.., uniforms 0x20..
    const R0: u32 = 0x10;
    const C0: u32 = 0x20;

    fn op(opcode: u32) -> u32 {
        opcode << 26
    }

    fn common(opcode: u32, dest: u32, src1: u32, src2: u32, desc: u32) -> u32 {
        (opcode << 26) | (dest << 21) | (src1 << 12) | (src2 << 7) | desc
    }

    fn common_indexed(opcode: u32, dest: u32, src1: u32, idx: u32, src2: u32, desc: u32) -> u32 {
        common(opcode, dest, src1, src2, desc) | (idx << 19)
    }

    fn common_inverted(opcode: u32, dest: u32, src1: u32, src2: u32, desc: u32) -> u32 {
        (opcode << 26) | (dest << 21) | (src1 << 14) | (src2 << 7) | desc
    }

    fn flow(opcode: u32, dest: u32, num: u32) -> u32 {
        (opcode << 26) | (dest << 10) | num
    }

    fn flow_uniform(opcode: u32, uniform_id: u32, dest: u32, num: u32) -> u32 {
        flow(opcode, dest, num) | (uniform_id << 22)
    }

    fn flow_cond(opcode: u32, condition: u32, refx: u32, refy: u32, dest: u32, num: u32) -> u32 {
        flow(opcode, dest, num) | (condition << 22) | (refy << 24) | (refx << 25)
    }

    fn cmp(src1: u32, src2: u32, op_x: u32, op_y: u32, desc: u32) -> u32 {
        (0x2e << 26) | (op_x << 24) | (op_y << 21) | (src1 << 12) | (src2 << 7) | desc
    }

    fn mad(dest: u32, src1: u32, src2: u32, src3: u32, desc: u32) -> u32 {
        (0b111 << 29) | (dest << 24) | (src1 << 17) | (src2 << 10) | (src3 << 5) | desc
    }

    /// Descriptor with identity selectors and the given write mask
    /// (bit 3 = X .. bit 0 = W).
    fn swizzle(mask: u32) -> u32 {
        mask | (0x1b << 5) | (0x1b << 14) | (0x1b << 23)
    }

    fn swizzle_sel1(mask: u32, sel1: u32) -> u32 {
        mask | (sel1 << 5) | (0x1b << 14) | (0x1b << 23)
    }

    fn exec(program: &[u32], swizzle_data: &[u32], setup: &ShaderSetup, state: &mut UnitState) {
        let shader = compile(program, swizzle_data).expect("compilation failed");
        unsafe { shader.run(setup, state, 0) };
    }

    // ── arithmetic and data movement ───────────────────────────────────

    #[test]
    fn mov_pass_through() {
        let program = [common(MOV, 0, 0, 0, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [1.0, 2.0, 3.0, 4.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn dp4_broadcasts_dot_product() {
        let program = [common(DP4, 0, 0, 1, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [1.0, 2.0, 3.0, 4.0];
        state.input[1] = [5.0, 6.0, 7.0, 8.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [70.0; 4]);
    }

    #[test]
    fn mul_sanitizes_nan() {
        let program = [common(MUL, 0, 0, 1, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [0.0, 2.0, f32::INFINITY, f32::NAN];
        state.input[1] = [f32::INFINITY, 3.0, 0.0, 1.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        let out = state.output[0];
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 6.0);
        assert_eq!(out[2], 0.0);
        assert!(out[3].is_nan());
    }

    #[test]
    fn dest_mask_preserves_unwritten_lanes() {
        // MOV o0.xz, v0
        let program = [common(MOV, 0, 0, 0, 0), op(END)];
        let swizzle_data = [swizzle(0b1010)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [1.0, 2.0, 3.0, 4.0];
        state.output[0] = [9.0; 4];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [1.0, 9.0, 3.0, 9.0]);
    }

    #[test]
    fn swizzle_reverses_and_negates() {
        // MOV o0, -v0.wzyx
        let program = [common(MOV, 0, 0, 0, 0), op(END)];
        let swizzle_data = [swizzle_sel1(0xf, 0xe4) | (1 << 4)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [1.0, 2.0, 3.0, 4.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [-4.0, -3.0, -2.0, -1.0]);
    }

    #[test]
    fn dph_forces_w_to_one() {
        let program = [common(DPH, 0, 0, 1, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [1.0, 2.0, 3.0, 999.0];
        state.input[1] = [1.0, 1.0, 1.0, 1.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [7.0; 4]);
    }

    #[test]
    fn sge_slt_per_lane() {
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();

        let program = [common(SGE, 0, 0, 1, 0), common(SLT, 1, 0, 1, 0), op(END)];
        let mut state = UnitState::default();
        state.input[0] = [1.0, 5.0, 3.0, 0.0];
        state.input[1] = [2.0, 5.0, 1.0, -1.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [0.0, 1.0, 1.0, 1.0]);
        assert_eq!(state.output[1], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn sgei_swaps_operand_fields() {
        // SGEI o0, v0, c1
        let program = [common_inverted(SGEI, 0, 0, 0x21, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let mut setup = ShaderSetup::default();
        setup.float_uniforms[1] = [2.0; 4];
        let mut state = UnitState::default();
        state.input[0] = [1.0, 2.0, 3.0, 4.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn flr_rounds_down_positive_values() {
        let program = [common(FLR, 0, 0, 0, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [2.7, 1.5, 0.0, 8.9];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [2.0, 1.0, 0.0, 8.0]);
    }

    #[test]
    fn max_nan_takes_second_operand() {
        let program = [common(MAX, 0, 0, 1, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [f32::NAN, 1.0, 4.0, 2.0];
        state.input[1] = [5.0, f32::NAN, 3.0, 6.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        let out = state.output[0];
        assert_eq!(out[0], 5.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 4.0);
        assert_eq!(out[3], 6.0);
    }

    #[test]
    fn rcp_rsq_approximate_lane_x() {
        let program = [common(RCP, 0, 0, 0, 0), common(RSQ, 1, 0, 0, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [4.0, 99.0, 99.0, 99.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        for lane in 0..4 {
            assert!((state.output[0][lane] - 0.25).abs() < 1e-3);
            assert!((state.output[1][lane] - 0.5).abs() < 1e-3);
        }
    }

    #[test]
    fn ex2_lg2_call_out_and_broadcast() {
        let program = [common(EX2, 0, 0, 0, 0), common(LG2, 1, 1, 0, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [3.0, 0.0, 0.0, 0.0];
        state.input[1] = [8.0, 0.0, 0.0, 0.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        for lane in 0..4 {
            assert!((state.output[0][lane] - 8.0).abs() < 1e-5);
            assert!((state.output[1][lane] - 3.0).abs() < 1e-5);
        }
    }

    #[test]
    fn mad_multiplies_and_accumulates() {
        let program = [mad(R0, 0, 1, 2, 0), common(MOV, 0, R0, 0, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [1.0, 2.0, 3.0, 4.0];
        state.input[1] = [5.0, 6.0, 7.0, 8.0];
        state.input[2] = [10.0; 4];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [15.0, 22.0, 31.0, 42.0]);
    }

    // ── indexed addressing ─────────────────────────────────────────────

    #[test]
    fn mova_indexes_float_uniforms() {
        let program = [
            common(MOVA, 0, 1, 0, 0),            // a0.x = (int)v1.x
            common_indexed(MOV, 0, C0, 1, 0, 1), // o0 = c[0 + a0.x]
            op(END),
        ];
        let swizzle_data = [swizzle(0b1000), swizzle(0xf)];
        let mut setup = ShaderSetup::default();
        setup.float_uniforms[5] = [7.0, 8.0, 9.0, 10.0];
        let mut state = UnitState::default();
        state.input[1] = [5.0, 0.0, 0.0, 0.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn mova_with_xy_disabled_changes_nothing() {
        // Mask only selects Z/W, which MOVA ignores entirely; the indexed
        // load afterwards must still see offset registers of zero.
        let program = [
            common(MOVA, 0, 1, 0, 0),
            common_indexed(MOV, 0, C0, 1, 0, 1),
            op(END),
        ];
        let swizzle_data = [swizzle(0b0011), swizzle(0xf)];
        let mut setup = ShaderSetup::default();
        setup.float_uniforms[0] = [1.0; 4];
        setup.float_uniforms[5] = [9.0; 4];
        let mut state = UnitState::default();
        state.input[1] = [5.0, 5.0, 5.0, 5.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [1.0; 4]);
    }

    // ── structured control flow ────────────────────────────────────────

    #[test]
    fn ifu_selects_branch() {
        let program = [
            flow_uniform(IFU, 0, 2, 1),
            common(MOV, 0, 0, 0, 0), // then: o0 = v0
            common(MOV, 0, 1, 0, 0), // else: o0 = v1
            op(END),
        ];
        let swizzle_data = [swizzle(0xf)];
        let mut state = UnitState::default();
        state.input[0] = [1.0, 0.0, 0.0, 0.0];
        state.input[1] = [2.0, 0.0, 0.0, 0.0];

        let mut setup = ShaderSetup::default();
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0][0], 2.0);

        setup.bool_uniforms[0] = 1;
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0][0], 1.0);
    }

    #[test]
    fn ifu_without_else_falls_through() {
        let program = [flow_uniform(IFU, 0, 2, 0), common(MOV, 0, 0, 0, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let mut state = UnitState::default();
        state.input[0] = [1.0; 4];

        let mut setup = ShaderSetup::default();
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [0.0; 4]);

        setup.bool_uniforms[0] = 1;
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [1.0; 4]);
    }

    #[test]
    fn loop_runs_count_plus_one_times() {
        let program = [
            flow_uniform(LOOP, 0, 1, 0),
            common(ADD, R0, C0, R0, 0), // r0 += c0
            common(MOV, 0, R0, 0, 0),
            op(END),
        ];
        let swizzle_data = [swizzle(0xf)];
        let mut setup = ShaderSetup::default();
        setup.float_uniforms[0] = [1.0; 4];
        setup.int_uniforms[0] = [2, 0, 0, 0];
        let mut state = UnitState::default();

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [3.0; 4]);
    }

    #[test]
    fn loop_count_byte_bounds() {
        let program = [
            flow_uniform(LOOP, 0, 1, 0),
            common(ADD, R0, C0, R0, 0),
            common(MOV, 0, R0, 0, 0),
            op(END),
        ];
        let swizzle_data = [swizzle(0xf)];
        let mut setup = ShaderSetup::default();
        setup.float_uniforms[0] = [1.0; 4];

        // Count byte 0x00 executes exactly once
        setup.int_uniforms[0] = [0, 0, 0, 0];
        let mut state = UnitState::default();
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [1.0; 4]);

        // Count byte 0xFF executes 256 times
        setup.int_uniforms[0] = [0xff, 0, 0, 0];
        let mut state = UnitState::default();
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [256.0; 4]);
    }

    #[test]
    fn loop_offset_walks_uniforms() {
        // Sum c[0], c[1], c[2] through the loop offset register
        let program = [
            flow_uniform(LOOP, 0, 1, 0),
            common_indexed(ADD, R0, C0, 3, R0, 0), // r0 += c[0 + aL]
            common(MOV, 0, R0, 0, 0),
            op(END),
        ];
        let swizzle_data = [swizzle(0xf)];
        let mut setup = ShaderSetup::default();
        setup.float_uniforms[0] = [1.0; 4];
        setup.float_uniforms[1] = [10.0; 4];
        setup.float_uniforms[2] = [100.0; 4];
        setup.int_uniforms[0] = [2, 0, 1, 0]; // three iterations, start 0, step 1
        let mut state = UnitState::default();

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [111.0; 4]);
    }

    // ── subroutines ────────────────────────────────────────────────────

    #[test]
    fn call_runs_subroutine_and_returns() {
        let program = [
            flow(CALL, 2, 2),
            op(END),
            common(MOV, 0, 0, 0, 0),
            op(NOP),
            op(END),
        ];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [1.0, 2.0, 3.0, 4.0];

        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn callu_respects_uniform() {
        let program = [
            flow_uniform(CALLU, 0, 2, 2),
            op(END),
            common(MOV, 0, 0, 0, 0),
            op(NOP),
            op(END),
        ];
        let swizzle_data = [swizzle(0xf)];
        let mut state = UnitState::default();
        state.input[0] = [1.0; 4];

        let mut setup = ShaderSetup::default();
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [0.0; 4]);

        setup.bool_uniforms[0] = 1;
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [1.0; 4]);
    }

    // ── comparisons and jumps ──────────────────────────────────────────

    #[test]
    fn cmp_jmpc_taken_and_not_taken() {
        // Jump over the MOV when v0.x == v1.x
        let program = [
            cmp(0, 1, 0, 0, 0),             // CMP v0 == v1
            flow_cond(JMPC, 2, 1, 0, 3, 0), // JMPC JustX, refx=1, dest=3
            common(MOV, 0, 1, 0, 0),
            op(END),
        ];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();

        let mut state = UnitState::default();
        state.input[0] = [1.0; 4];
        state.input[1] = [1.0, 9.0, 9.0, 9.0];
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [0.0; 4]);

        let mut state = UnitState::default();
        state.input[0] = [1.0; 4];
        state.input[1] = [2.0, 9.0, 9.0, 9.0];
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [2.0, 9.0, 9.0, 9.0]);
    }

    #[test]
    fn cmp_greater_than_swaps_operands() {
        // X uses Gt, Y uses Lt; And combinator requires both to match
        let program = [
            cmp(0, 1, 4, 2, 0),
            flow_cond(JMPC, 1, 1, 1, 3, 0), // And, refx=1, refy=1
            common(MOV, 0, 1, 0, 0),
            op(END),
        ];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();

        let mut state = UnitState::default();
        state.input[0] = [3.0, 1.0, 0.0, 0.0];
        state.input[1] = [2.0, 5.0, 0.0, 0.0];
        exec(&program, &swizzle_data, &setup, &mut state);
        // 3 > 2 and 1 < 5: jump taken, MOV skipped
        assert_eq!(state.output[0], [0.0; 4]);

        let mut state = UnitState::default();
        state.input[0] = [3.0, 6.0, 0.0, 0.0];
        state.input[1] = [2.0, 5.0, 0.0, 0.0];
        exec(&program, &swizzle_data, &setup, &mut state);
        // 6 < 5 fails: fall through
        assert_eq!(state.output[0], [2.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn jmpu_inverts_on_odd_num_instructions() {
        let swizzle_data = [swizzle(0xf)];

        // Even num_instructions: jump when the uniform is true
        let program = [flow_uniform(JMPU, 0, 2, 0), common(MOV, 0, 0, 0, 0), op(END)];
        let mut setup = ShaderSetup::default();
        setup.bool_uniforms[0] = 1;
        let mut state = UnitState::default();
        state.input[0] = [1.0; 4];
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [0.0; 4]);

        setup.bool_uniforms[0] = 0;
        let mut state = UnitState::default();
        state.input[0] = [1.0; 4];
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [1.0; 4]);

        // Odd num_instructions: the sense flips
        let program = [flow_uniform(JMPU, 0, 2, 1), common(MOV, 0, 0, 0, 0), op(END)];
        setup.bool_uniforms[0] = 0;
        let mut state = UnitState::default();
        state.input[0] = [1.0; 4];
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [0.0; 4]);

        setup.bool_uniforms[0] = 1;
        let mut state = UnitState::default();
        state.input[0] = [1.0; 4];
        exec(&program, &swizzle_data, &setup, &mut state);
        assert_eq!(state.output[0], [1.0; 4]);
    }

    // ── entry points ───────────────────────────────────────────────────

    #[test]
    fn entry_offset_skips_preceding_instructions() {
        let program = [common(MOV, 0, 0, 0, 0), common(MOV, 1, 1, 0, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        let setup = ShaderSetup::default();
        let mut state = UnitState::default();
        state.input[0] = [1.0; 4];
        state.input[1] = [2.0; 4];

        let shader = compile(&program, &swizzle_data).expect("compilation failed");
        unsafe { shader.run(&setup, &mut state, 1) };
        assert_eq!(state.output[0], [0.0; 4]);
        assert_eq!(state.output[1], [2.0; 4]);
    }

    // ── compile-time errors ────────────────────────────────────────────

    #[test]
    fn backwards_if_is_rejected() {
        let program = [op(NOP), flow_uniform(IFU, 0, 0, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        assert!(matches!(
            compile(&program, &swizzle_data),
            Err(CompileError::BackwardsIf { pc: 1, dest: 0 })
        ));
    }

    #[test]
    fn backwards_loop_is_rejected() {
        let program = [op(NOP), flow_uniform(LOOP, 0, 0, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        assert!(matches!(
            compile(&program, &swizzle_data),
            Err(CompileError::BackwardsLoop { pc: 1, dest: 0 })
        ));
    }

    #[test]
    fn nested_loop_is_rejected() {
        let program = [
            flow_uniform(LOOP, 0, 2, 0),
            flow_uniform(LOOP, 0, 2, 0),
            op(NOP),
            op(END),
        ];
        let swizzle_data = [swizzle(0xf)];
        assert!(matches!(
            compile(&program, &swizzle_data),
            Err(CompileError::NestedLoop { pc: 1 })
        ));
    }

    #[test]
    fn oversized_program_is_rejected() {
        let program = vec![op(NOP); isa::MAX_PROGRAM_CODE_LENGTH + 1];
        let swizzle_data = [swizzle(0xf)];
        assert!(matches!(
            compile(&program, &swizzle_data),
            Err(CompileError::ProgramTooLong(_))
        ));
    }

    #[test]
    fn out_of_range_call_is_rejected() {
        let program = [flow(CALL, 100, 0), op(END)];
        let swizzle_data = [swizzle(0xf)];
        assert!(matches!(
            compile(&program, &swizzle_data),
            Err(CompileError::BranchTargetOutOfRange { pc: 0, dest: 100 })
        ));
    }

    #[test]
    fn missing_operand_descriptor_is_rejected() {
        let program = [common(MOV, 0, 0, 0, 5), op(END)];
        let swizzle_data = [swizzle(0xf)];
        assert!(matches!(
            compile(&program, &swizzle_data),
            Err(CompileError::InvalidOperandDescriptor { pc: 0, id: 5 })
        ));
    }
}
