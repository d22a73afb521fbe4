/// Tries to read X bytes from the cursor, mapping a short read to
/// `ParseError::BufferOverrun` at the current position.
macro_rules! try_read {
    ($cursor: ident, u8) => {
        $cursor
            .read_u8()
            .map_err(|_| $crate::err::ParseError::BufferOverrun {
                offset: $cursor.position(),
                size: 1,
            })?
    };

    ($cursor: ident, i8) => {
        $cursor
            .read_i8()
            .map_err(|_| $crate::err::ParseError::BufferOverrun {
                offset: $cursor.position(),
                size: 1,
            })?
    };

    ($cursor: ident, u16) => {
        $cursor
            .read_u16::<byteorder::LittleEndian>()
            .map_err(|_| $crate::err::ParseError::BufferOverrun {
                offset: $cursor.position(),
                size: 2,
            })?
    };

    ($cursor: ident, i16) => {
        $cursor
            .read_i16::<byteorder::LittleEndian>()
            .map_err(|_| $crate::err::ParseError::BufferOverrun {
                offset: $cursor.position(),
                size: 2,
            })?
    };

    ($cursor: ident, u32) => {
        $cursor
            .read_u32::<byteorder::LittleEndian>()
            .map_err(|_| $crate::err::ParseError::BufferOverrun {
                offset: $cursor.position(),
                size: 4,
            })?
    };

    ($cursor: ident, i32) => {
        $cursor
            .read_i32::<byteorder::LittleEndian>()
            .map_err(|_| $crate::err::ParseError::BufferOverrun {
                offset: $cursor.position(),
                size: 4,
            })?
    };

    ($cursor: ident, f32) => {
        $cursor
            .read_f32::<byteorder::LittleEndian>()
            .map_err(|_| $crate::err::ParseError::BufferOverrun {
                offset: $cursor.position(),
                size: 4,
            })?
    };

    ($cursor: ident, u64) => {
        $cursor
            .read_u64::<byteorder::LittleEndian>()
            .map_err(|_| $crate::err::ParseError::BufferOverrun {
                offset: $cursor.position(),
                size: 8,
            })?
    };

    ($cursor: ident, i64) => {
        $cursor
            .read_i64::<byteorder::LittleEndian>()
            .map_err(|_| $crate::err::ParseError::BufferOverrun {
                offset: $cursor.position(),
                size: 8,
            })?
    };

    ($cursor: ident, f64) => {
        $cursor
            .read_f64::<byteorder::LittleEndian>()
            .map_err(|_| $crate::err::ParseError::BufferOverrun {
                offset: $cursor.position(),
                size: 8,
            })?
    };
}
