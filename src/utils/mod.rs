mod binxml_utils;
mod bytes;
mod escape;
mod time;

pub use self::binxml_utils::{
    decode_utf16le_bytes, read_len_prefixed_utf16_string, read_utf16_by_size,
};
pub use self::bytes::{read_u8_at, read_u16_at, read_u32_at, read_u64_at, slice_at};
pub use self::escape::escape_angle_brackets;
pub use self::time::{timestamp_from_filetime, timestamp_from_systemtime};
