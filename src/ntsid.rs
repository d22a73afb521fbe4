use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::fmt::{self, Debug, Display, Write};
use std::io::{self, Read};

#[derive(PartialOrd, PartialEq, Eq, Clone)]
pub struct Sid {
    version: u8,
    id_high: u32,
    id_low: u16,
    elements: Vec<u32>,
}

impl Sid {
    pub fn from_stream<S: Read>(stream: &mut S) -> io::Result<Sid> {
        let version = stream.read_u8()?;
        let number_of_elements = stream.read_u8()?;
        // The identifier authority is kept in be order.
        let id_high = stream.read_u32::<BigEndian>()?;
        let id_low = stream.read_u16::<BigEndian>()?;

        let mut elements = Vec::with_capacity(number_of_elements as usize);

        for _ in 0..number_of_elements {
            elements.push(stream.read_u32::<LittleEndian>()?)
        }

        Ok(Sid {
            version,
            id_high,
            id_low,
            elements,
        })
    }

    pub fn to_string(&self) -> String {
        let mut repr = String::new();

        write!(
            repr,
            "S-{}-{}",
            self.version,
            (u64::from(self.id_high) << 16) ^ u64::from(self.id_low),
        )
        .expect("Writing to a String cannot fail");

        for element in self.elements.iter() {
            write!(repr, "-{}", element).expect("Writing to a String cannot fail");
        }

        repr
    }
}

impl Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

impl Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_renders_well_known_sid() {
        // S-1-5-18, the LocalSystem account.
        let bytes: &[u8] = &[
            0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x12, 0x00, 0x00, 0x00,
        ];

        let sid = Sid::from_stream(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(sid.to_string(), "S-1-5-18");
    }

    #[test]
    fn test_renders_each_sub_authority_in_decimal() {
        let bytes: &[u8] = &[
            0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x20, 0x00, 0x00, 0x00, 0x21, 0x02,
            0x00, 0x00,
        ];

        let sid = Sid::from_stream(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(sid.to_string(), "S-1-5-32-545");
    }
}
