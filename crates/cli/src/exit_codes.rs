//! CLI Exit Code Registry
//!
//! Single source of truth for all CLI exit codes. Exit codes are part of
//! the shell contract; close scripts rely on them.
//!
//! | Range | Domain    | Description                                  |
//! |-------|-----------|----------------------------------------------|
//! | 0     | Universal | Success                                      |
//! | 1     | Universal | General error (unspecified)                  |
//! | 2     | Universal | CLI usage error (bad args, missing file)     |
//! | 3-9   | run       | Reconciliation run outcomes                  |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Run completed but some input records were rejected.
pub const EXIT_RUN_REJECTS: u8 = 3;

/// Run completed cleanly but anomalies were flagged.
pub const EXIT_RUN_ANOMALIES: u8 = 4;

/// Config file failed to parse or validate.
pub const EXIT_CONFIG_INVALID: u8 = 5;

/// Durable state could not be read or committed; prior state is untouched.
pub const EXIT_STORE: u8 = 6;

/// Input files could not be scanned or read.
pub const EXIT_INGEST: u8 = 7;
