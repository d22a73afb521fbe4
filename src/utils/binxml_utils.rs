use byteorder::{LittleEndian, ReadBytesExt};
use log::error;
use std::char::decode_utf16;
use std::io::{self, Error, ErrorKind, Read};

/// Reads a `u16` character-count prefixed UTF-16LE string from the stream.
/// Returns `None` for an empty (zero length) string.
pub fn read_len_prefixed_utf16_string<T: Read>(
    stream: &mut T,
    is_null_terminated: bool,
) -> io::Result<Option<String>> {
    let expected_number_of_characters = stream.read_u16::<LittleEndian>()?;
    let needed_bytes = u64::from(expected_number_of_characters) * 2;

    let s = read_utf16_by_size(stream, needed_bytes)?;

    if is_null_terminated {
        stream.read_u16::<LittleEndian>()?;
    };

    let found_characters = s.as_ref().map(|s| s.chars().count()).unwrap_or(0);

    if found_characters == expected_number_of_characters as usize {
        Ok(s)
    } else {
        error!(
            "Expected string of length {}, found string of length {} - {:?}",
            expected_number_of_characters, found_characters, s
        );

        Err(Error::from(ErrorKind::InvalidData))
    }
}

/// Reads a UTF-16LE string from the given stream.
/// `size` is the byte length of the raw representation, not a character count.
pub fn read_utf16_by_size<T: Read>(stream: &mut T, size: u64) -> io::Result<Option<String>> {
    match size {
        0 => Ok(None),
        _ => {
            let mut buffer = Vec::with_capacity(size as usize / 2);
            for _ in 0..(size / 2) {
                buffer.push(stream.read_u16::<LittleEndian>()?);
            }

            decode_units(&buffer).map(Some)
        }
    }
}

/// Decodes a raw UTF-16LE byte slice. The slice must have an even length,
/// and unpaired surrogates are rejected.
pub fn decode_utf16le_bytes(bytes: &[u8]) -> io::Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::from(ErrorKind::InvalidData));
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    decode_units(&units)
}

fn decode_units(units: &[u16]) -> io::Result<String> {
    decode_utf16(units.iter().copied())
        .map(|r| r.map_err(|_| Error::from(ErrorKind::InvalidData)))
        .collect()
}
