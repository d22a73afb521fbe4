use crate::err::ParseError;
use crate::utils::slice_at;

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt::{self, Debug, Display, Write};
use std::io::{self, Read};

#[derive(PartialOrd, PartialEq, Eq, Hash, Clone)]
pub struct Guid {
    data1: u32,
    data2: u16,
    data3: u16,
    data4: [u8; 8],
}

impl Guid {
    pub fn new(data1: u32, data2: u16, data3: u16, data4: &[u8]) -> Guid {
        let mut data4_owned = [0; 8];
        data4_owned.clone_from_slice(&data4[0..8]);

        Guid {
            data1,
            data2,
            data3,
            data4: data4_owned,
        }
    }

    pub fn from_stream<T: Read>(stream: &mut T) -> io::Result<Guid> {
        let data1 = stream.read_u32::<LittleEndian>()?;
        let data2 = stream.read_u16::<LittleEndian>()?;
        let data3 = stream.read_u16::<LittleEndian>()?;
        let mut data4 = [0; 8];
        stream.read_exact(&mut data4)?;

        Ok(Guid::new(data1, data2, data3, &data4))
    }

    /// Reads a GUID from 16 bytes at `offset` without a running stream.
    pub fn from_buffer_at(buf: &[u8], offset: u64) -> Result<Guid, ParseError> {
        let mut bytes = slice_at(buf, offset, 16)?;

        // A 16-byte read from an in-memory slice cannot fail.
        Ok(Guid::from_stream(&mut bytes).expect("slice is exactly 16 bytes"))
    }

    pub fn to_string(&self) -> String {
        // Using `format!` would extend the string multiple times,
        // but we know ahead of time how much space we need.
        let mut s = String::with_capacity(36);

        write!(
            &mut s,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
        .expect("writing to a preallocated buffer cannot fail");

        s
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

impl Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_mixed_endian_canonical_form() {
        let bytes: [u8; 16] = [
            0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];

        let guid = Guid::from_buffer_at(&bytes, 0).unwrap();
        assert_eq!(guid.to_string(), "00112233-4455-6677-8899-aabbccddeeff");
    }

    #[test]
    fn test_short_buffer_is_an_overrun() {
        assert!(Guid::from_buffer_at(&[0u8; 8], 0).is_err());
    }
}
