// adsprobe - Native Rust ADS client for Beckhoff TwinCAT PLCs.
// Copyright 2025 - adsprobe contributors

//! Well-known ADS index groups.

/// PLC: Read/write PLC memory (%M fields).
pub const PLC_RW_M: u32 = 0x4020;
/// PLC: Read/write PLC memory as bits (%MX fields). Offset is byte*8 + bit.
pub const PLC_RW_MX: u32 = 0x4021;
/// PLC: Read byte length of %M area (only offset 0).
pub const PLC_SIZE_M: u32 = 0x4025;
/// PLC: Read/write retain data area.
pub const PLC_RW_RB: u32 = 0x4030;
/// PLC: Read/write data area.
pub const PLC_RW_DB: u32 = 0x4040;

/// Get a u32 handle for the symbol name in the write data (offset 0).
pub const GET_SYMHANDLE_BYNAME: u32 = 0xF003;
/// Read/write a symbol value by handle (handle as offset).
pub const RW_SYMVAL_BYHANDLE: u32 = 0xF005;
/// Release a symbol handle (offset 0).
pub const RELEASE_SYMHANDLE: u32 = 0xF006;

/// Process image of physical inputs (%I fields).
pub const IO_RW_I: u32 = 0xF020;
/// Process image of physical inputs as bits (%IX fields).
pub const IO_RW_IX: u32 = 0xF021;
/// Process image of physical outputs (%Q fields).
pub const IO_RW_Q: u32 = 0xF030;
/// Process image of physical outputs as bits (%QX fields).
pub const IO_RW_QX: u32 = 0xF031;

/// Combined index group/offset reads.
pub const SUMUP_READ: u32 = 0xF080;
/// Combined index group/offset writes.
pub const SUMUP_WRITE: u32 = 0xF081;
