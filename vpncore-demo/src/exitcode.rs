//! Subset of the BSD sysexits.h codes this binary's callers care about.

pub const OK: i32 = 0;
pub const ERR_USAGE: i32 = 64;
pub const ERR_IOERR: i32 = 74;
