pub const SUCCESS: i32 = 0;
/// Missing/unreadable input file, bad arguments or configuration
pub const INPUT_ERROR: i32 = 1;
/// The session does not match its task's trial grammar
pub const SEGMENTATION_ERROR: i32 = 2;
pub const EXECUTION_ERROR: i32 = 3;
/// Some subjects of a batch failed, others succeeded
pub const PARTIAL_FAILURE: i32 = 4;
