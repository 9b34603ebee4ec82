//! Runtime helpers invoked from emitted shader code.
//!
//! All of these use the C calling convention so the compiler can materialise
//! their addresses and call them indirectly. The math trampolines exist
//! because `EX2`/`LG2` have no SSE equivalent; the logging shim gives emitted
//! code a way to report a fault condition through the host logger.

use core::ffi::{CStr, c_char};

#[unsafe(no_mangle)]
pub extern "C" fn pica_exp2(x: f32) -> f32 {
    x.exp2()
}

#[unsafe(no_mangle)]
pub extern "C" fn pica_log2(x: f32) -> f32 {
    x.log2()
}

/// Logging shim. `msg` must be a NUL-terminated string that outlives the
/// compiled shader; the compiler only passes `'static` literals.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pica_log_critical(msg: *const c_char) {
    let msg = unsafe { CStr::from_ptr(msg) };
    log::error!("{}", msg.to_string_lossy());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp2_log2_round_trip() {
        assert_eq!(pica_exp2(3.0), 8.0);
        assert_eq!(pica_log2(8.0), 3.0);
        assert_eq!(pica_log2(pica_exp2(0.5)), 0.5);
    }
}
