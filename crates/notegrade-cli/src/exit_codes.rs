//! Process exit codes. Part of the CLI contract; scripts branch on them.

pub const SUCCESS: i32 = 0;
pub const DEGRADED: i32 = 1; // Graded, but at least one component failed
pub const FAILED: i32 = 2; // Grading failed, or configuration/provider setup error
pub const VALIDATION_ERROR: i32 = 3; // Note or transcript rejected before dispatch
