//! Tag bytes and range boundaries of the Hessian 2.0 grammar, plus the
//! constants of the Dubbo frame header.
//!
//! All multi-byte quantities on the wire are big-endian. The compact forms
//! below store small values inside the tag byte itself; the `*_ZERO`
//! constants are the bias of each form.

// basic values
pub const TAG_NULL: u8 = 0x4e; // 'N'
pub const TAG_TRUE: u8 = 0x54; // 'T'
pub const TAG_FALSE: u8 = 0x46; // 'F'

// int: value -16..=47 packed in one byte
pub const INT_DIRECT_MIN: u8 = 0x80;
pub const INT_DIRECT_MAX: u8 = 0xbf;
pub const INT_DIRECT_ZERO: u8 = 0x90;
// int: -2048..=2047 in two bytes
pub const INT_BYTE_MIN: u8 = 0xc0;
pub const INT_BYTE_MAX: u8 = 0xcf;
pub const INT_BYTE_ZERO: u8 = 0xc8;
// int: -262144..=262143 in three bytes
pub const INT_SHORT_MIN: u8 = 0xd0;
pub const INT_SHORT_MAX: u8 = 0xd7;
pub const INT_SHORT_ZERO: u8 = 0xd4;
pub const TAG_INT: u8 = 0x49; // 'I' + 4 bytes

// long: value -8..=15 packed in one byte
pub const LONG_DIRECT_MIN: u8 = 0xd8;
pub const LONG_DIRECT_MAX: u8 = 0xef;
pub const LONG_DIRECT_ZERO: u8 = 0xe0;
// long: -2048..=2047 in two bytes
pub const LONG_BYTE_MIN: u8 = 0xf0;
pub const LONG_BYTE_MAX: u8 = 0xff;
pub const LONG_BYTE_ZERO: u8 = 0xf8;
// long: -262144..=262143 in three bytes
pub const LONG_SHORT_MIN: u8 = 0x38;
pub const LONG_SHORT_MAX: u8 = 0x3f;
pub const LONG_SHORT_ZERO: u8 = 0x3c;
pub const TAG_LONG_INT: u8 = 0x59; // long that fits an int32, + 4 bytes
pub const TAG_LONG: u8 = 0x4c; // 'L' + 8 bytes

// double
pub const TAG_DOUBLE_ZERO: u8 = 0x5b; // 0.0
pub const TAG_DOUBLE_ONE: u8 = 0x5c; // 1.0
pub const TAG_DOUBLE_BYTE: u8 = 0x5d; // + int8
pub const TAG_DOUBLE_SHORT: u8 = 0x5e; // + int16
pub const TAG_DOUBLE_MILL: u8 = 0x5f; // + int32, scaled by 0.001
pub const TAG_DOUBLE: u8 = 0x44; // 'D' + 8 bytes IEEE-754

// date
pub const TAG_DATE_MILLI: u8 = 0x4a; // + int64 milliseconds
pub const TAG_DATE_MINUTE: u8 = 0x4b; // + int32 minutes

// string, lengths count code points
pub const STRING_DIRECT_MAX: u8 = 0x1f; // tags 0x00..=0x1f, length 0..=31
pub const STRING_MEDIUM_MIN: u8 = 0x30; // length 0..=1023 in two bytes
pub const STRING_MEDIUM_MAX: u8 = 0x33;
pub const TAG_STRING_CHUNK: u8 = 0x52; // 'R' + u16 length, non-final chunk
pub const TAG_STRING_FINAL: u8 = 0x53; // 'S' + u16 length, final chunk

// binary, lengths count bytes
pub const BINARY_DIRECT_MIN: u8 = 0x20; // length 0..=15
pub const BINARY_DIRECT_MAX: u8 = 0x2f;
pub const BINARY_MEDIUM_MIN: u8 = 0x34; // length 0..=1023 in two bytes
pub const BINARY_MEDIUM_MAX: u8 = 0x37;
pub const TAG_BINARY_CHUNK: u8 = 0x41; // 'A' + u16 length, non-final chunk
pub const TAG_BINARY_FINAL: u8 = 0x42; // 'B' + u16 length, final chunk

// list
pub const LIST_TYPED_FIXED_MIN: u8 = 0x70; // length 0..=7 in the tag
pub const LIST_TYPED_FIXED_MAX: u8 = 0x77;
pub const LIST_UNTYPED_FIXED_MIN: u8 = 0x78;
pub const LIST_UNTYPED_FIXED_MAX: u8 = 0x7f;
pub const TAG_LIST_TYPED: u8 = 0x55; // type, values, 'Z'
// NOTE the length-prefixed forms below are accepted by the decoder for
// interoperability but never emitted by the encoder
pub const TAG_LIST_TYPED_LEN: u8 = 0x56; // type, int length, values
pub const TAG_LIST_UNTYPED: u8 = 0x57; // values, 'Z'
pub const TAG_LIST_UNTYPED_LEN: u8 = 0x58; // int length, values

// map
pub const TAG_MAP_TYPED: u8 = 0x4d; // 'M' type, pairs, 'Z'
pub const TAG_MAP_UNTYPED: u8 = 0x48; // 'H' pairs, 'Z'

pub const TAG_END: u8 = 0x5a; // 'Z'

// object
pub const TAG_CLASS_DEF: u8 = 0x43; // 'C' name, field count, field names
pub const OBJECT_DIRECT_MIN: u8 = 0x60; // class index 0..=15 in the tag
pub const OBJECT_DIRECT_MAX: u8 = 0x6f;
pub const TAG_OBJECT: u8 = 0x4f; // 'O' + int class index

pub const TAG_REF: u8 = 0x51; // 'Q' + int object index

/// Maximum chunk payload for strings (code points) and binary (bytes).
pub const CHUNK_MAX: usize = 0xffff;

/// Composite nesting cap, guards recursive decode of hostile input.
pub const MAX_DEPTH: usize = 256;
/// Cap on the per-session reference, class-definition and type-name tables.
pub const MAX_TABLE_ENTRIES: usize = 1 << 20;

// Dubbo frame header
pub const HEADER_LENGTH: usize = 16;
pub const MAGIC_HIGH: u8 = 0xda;
pub const MAGIC_LOW: u8 = 0xbb;
pub const FLAG_REQUEST: u8 = 0x80;
pub const FLAG_TWOWAY: u8 = 0x40;
pub const FLAG_EVENT: u8 = 0x20;
pub const SERIAL_MASK: u8 = 0x1f;
/// Serialization ID of hessian2 inside the frame flags.
pub const SERIAL_HESSIAN2: u8 = 2;
/// Protocol version carried as the first value of every request body.
pub const DUBBO_VERSION: &str = "2.0.2";

// response body markers, first value of a normal response body
pub const RESPONSE_WITH_EXCEPTION: i32 = 0;
pub const RESPONSE_VALUE: i32 = 1;
pub const RESPONSE_NULL_VALUE: i32 = 2;
pub const RESPONSE_WITH_EXCEPTION_WITH_ATTACHMENTS: i32 = 3;
pub const RESPONSE_VALUE_WITH_ATTACHMENTS: i32 = 4;
pub const RESPONSE_NULL_VALUE_WITH_ATTACHMENTS: i32 = 5;
