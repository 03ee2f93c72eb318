pub const DEMUX_DEFAULT_MATCH_SCORE: i32 = 4;
pub const DEMUX_DEFAULT_MISMATCH_PENALTY: i32 = 13;
pub const DEMUX_DEFAULT_DELETION_PENALTY: i32 = 7;
pub const DEMUX_DEFAULT_INSERTION_PENALTY: i32 = 7;
pub const DEMUX_DEFAULT_BRANCH_PENALTY: i32 = 4;
pub const DEMUX_DEFAULT_WINDOW_SIZE_MULT: f64 = 1.2;

//Penalty profile for high-accuracy consensus reads
pub const DEMUX_CCS_MATCH_SCORE: i32 = 4;
pub const DEMUX_CCS_MISMATCH_PENALTY: i32 = 1;
pub const DEMUX_CCS_DELETION_PENALTY: i32 = 3;
pub const DEMUX_CCS_INSERTION_PENALTY: i32 = 3;
pub const DEMUX_CCS_BRANCH_PENALTY: i32 = 3;
