//! Exit code constants for the taskrun host tool.
//!
//! - 0: Success
//! - 1: Misuse (task re-run, direct launch of a pipe destination, bad args)
//! - 2: Captured output was not valid text
//! - 3: Process spawn or pipe I/O failure
//! - 4: Settings could not be loaded or validated
//!
//! A command failing under exit-on-failure terminates the host with the
//! child's own exit code instead (see [`failure_exit_code`]).

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Programmer misuse of a task or bad command-line arguments.
pub const MISUSE: i32 = 1;

/// Captured output could not be decoded as UTF-8.
pub const DECODE_FAILURE: i32 = 2;

/// The wrapper process could not be spawned, or pipe I/O failed.
pub const SPAWN_FAILURE: i32 = 3;

/// Settings file unreadable, unparsable, or invalid.
pub const CONFIG_FAILURE: i32 = 4;

/// Map a child's exit code onto a code the host can exit with.
///
/// Nonzero codes outside `1..=255` collapse to 1 so that a failure is never
/// reported as success after truncation to a byte.
pub fn failure_exit_code(code: i32) -> i32 {
    if (1..=255).contains(&code) { code } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, MISUSE, DECODE_FAILURE, SPAWN_FAILURE, CONFIG_FAILURE];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn failure_exit_code_keeps_byte_range_codes() {
        assert_eq!(failure_exit_code(2), 2);
        assert_eq!(failure_exit_code(255), 255);
    }

    #[test]
    fn failure_exit_code_never_reports_success() {
        assert_eq!(failure_exit_code(256), 1);
        assert_eq!(failure_exit_code(-1), 1);
        assert_eq!(failure_exit_code(0), 1);
    }
}
