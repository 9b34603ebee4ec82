//! Control-flow pre-pass over a decoded program.

use crate::isa::{Instruction, OpCode};

/// Collect the return points induced by `CALL`/`CALLC`/`CALLU`: for each
/// call, the offset just past the last instruction of the called region.
///
/// The result is sorted and deduplicated so emission can test membership by
/// binary search. Subroutines are inlined structurally into the emitted
/// stream; a call site pushes its return offset as a sentinel, and emission
/// splices a return check at every offset returned here.
pub fn find_return_offsets(program: &[u32]) -> Vec<u32> {
    let mut offsets: Vec<u32> = program
        .iter()
        .map(|&word| Instruction(word))
        .filter(|instr| {
            matches!(
                instr.opcode(),
                OpCode::Call | OpCode::CallC | OpCode::CallU
            )
        })
        .map(|instr| {
            let flow = instr.flow_control();
            flow.dest_offset() + flow.num_instructions()
        })
        .collect();
    offsets.sort_unstable();
    offsets.dedup();
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(opcode: u32, dest: u32, num: u32) -> u32 {
        (opcode << 26) | (dest << 10) | num
    }

    #[test]
    fn collects_all_call_variants() {
        let program = [
            call(0x24, 10, 4), // CALL  -> 14
            call(0x25, 20, 1), // CALLC -> 21
            call(0x26, 4, 2),  // CALLU -> 6
            0x22 << 26,        // END
        ];
        assert_eq!(find_return_offsets(&program), vec![6, 14, 21]);
    }

    #[test]
    fn sorted_and_deduplicated() {
        let program = [
            call(0x24, 30, 2),
            call(0x24, 30, 2),
            call(0x26, 8, 0),
            call(0x25, 30, 2),
        ];
        assert_eq!(find_return_offsets(&program), vec![8, 32]);
    }

    #[test]
    fn ignores_other_flow_control() {
        let program = [
            call(0x27, 5, 3), // IFU
            call(0x2c, 9, 0), // JMPC
            call(0x29, 2, 0), // LOOP
            0x22 << 26,
        ];
        assert!(find_return_offsets(&program).is_empty());
    }

    #[test]
    fn empty_program() {
        assert!(find_return_offsets(&[]).is_empty());
    }
}
