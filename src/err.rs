use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

/// Failures local to a single root node, substitution array or binxml
/// fragment. These never abort an extraction; the emitter logs them and
/// advances to the next candidate offset.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Offset {offset:#x}: tried to read {size} bytes past the end of the buffer")]
    BufferOverrun { offset: u64, size: usize },

    #[error("Offset {offset:#x}: unexpected number of substitutions: {count}")]
    UnexpectedSubstitutionCount { count: u32, offset: u64 },

    #[error("Offset {offset:#x}: tried to read an invalid byte `{value:#x}` as a substitution type")]
    InvalidSubstitutionType { value: u8, offset: u64 },

    #[error("Offset {offset:#x}: unexpected size {size} for a SizeType value")]
    InvalidSizeTypeSize { size: u16, offset: u64 },

    #[error("Offset {offset:#x}: value does not map to a valid point in time")]
    InvalidTimestamp { offset: u64 },

    #[error("Offset {offset:#x}: wide string array of {size} bytes is not aligned to u16")]
    UnevenWStringArray { size: u16, offset: u64 },

    #[error("Offset {offset:#x}: tried to read an invalid byte `{value:#x}` as a binxml token")]
    UnknownNodeType { value: u8, offset: u64 },

    #[error("Offset {offset:#x}: binary xml is nested deeper than {limit} levels")]
    NestedTooDeeply { offset: u64, limit: u8 },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("An I/O error has occurred")]
    IO {
        #[from]
        source: std::io::Error,
    },

    #[error("Offset {offset:#x}: substitution values overran the record end at {max_offset:#x}")]
    MaxOffsetReached { offset: u64, max_offset: u64 },

    #[error("Offset {offset:#x}: not a valid EVTX record")]
    InvalidRecord { offset: u64 },

    #[error("Invalid EVTX record header magic, expected `2a2a0000`, found `{magic:02x?}`")]
    InvalidEvtxRecordHeaderMagic { magic: [u8; 4] },

    #[error("Invalid EVTX chunk header magic, expected `ElfChnk\\0`, found `{magic:02x?}`")]
    InvalidEvtxChunkMagic { magic: [u8; 8] },

    #[error("Chunk free space offset {free_space_offset:#x} is outside the chunk data area")]
    InvalidFreeSpaceOffset { free_space_offset: u32 },

    #[error("Offset {offset:#x}: failed to decode UTF-16 string")]
    FailedToDecodeUTF16String { offset: u64 },

    #[error("Offset {offset:#x}: failed to decode UTF-8 string")]
    FailedToDecodeUTF8String {
        source: std::string::FromUtf8Error,
        offset: u64,
    },

    #[error("Offset {offset:#x}: value variant `{name}` cannot appear outside a substitution array")]
    UnimplementedValueVariant { name: &'static str, offset: u64 },

    #[error("Record XML does not contain an /Event/System/EventID element")]
    EventIdNotFound,

    #[error("Failed to read record XML")]
    XmlError {
        #[from]
        source: quick_xml::Error,
    },

    /// Programmer error: the caller handed us an offset that does not hold
    /// what it claimed to hold.
    #[error("Offset {offset:#x}: asked to {action}, but the data there does not qualify")]
    InvalidArgument { action: &'static str, offset: u64 },
}
