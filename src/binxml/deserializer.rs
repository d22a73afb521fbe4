use crate::binxml::model::BinXmlToken;
use crate::binxml::tokens::*;
use crate::err::{ParseError, Result};
use crate::evtx_chunk::EvtxChunk;

use byteorder::ReadBytesExt;
use log::trace;
use std::io::Cursor;

/// Fragments observed in practice nest at most a handful of levels; anything
/// deeper is treated as garbage rather than recursed into.
pub const MAX_NESTING_DEPTH: u8 = 16;

/// Reads a stream of binxml tokens from the cursor, stopping after
/// `data_size` bytes (when given) or at an end-of-stream token.
///
/// The cursor must range over the whole chunk, since name and template
/// offsets embedded in the stream are chunk-relative.
pub fn read_binxml_fragment(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
    data_size: Option<u32>,
    depth: u8,
) -> Result<Vec<BinXmlToken>> {
    if depth > MAX_NESTING_DEPTH {
        return Err(ParseError::NestedTooDeeply {
            offset: cursor.position(),
            limit: MAX_NESTING_DEPTH,
        }
        .into());
    }

    let start_position = cursor.position();
    let mut tokens = Vec::new();

    loop {
        if let Some(size) = data_size {
            if cursor.position() - start_position >= u64::from(size) {
                break;
            }
        }

        let token = read_token(cursor, chunk, depth)?;

        if let BinXmlToken::EndOfStream = token {
            tokens.push(token);
            break;
        }

        tokens.push(token);
    }

    Ok(tokens)
}

fn read_token(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
    depth: u8,
) -> Result<BinXmlToken> {
    let offset = cursor.position();
    let token = try_read!(cursor, u8);

    trace!("Token {:#x} at {:#x}", token, offset);

    match token {
        0x00 => Ok(BinXmlToken::EndOfStream),
        // The high bit of the open element and value tokens flags a
        // following attribute list / more data.
        0x01 | 0x41 => Ok(BinXmlToken::OpenStartElement(read_open_start_element(
            cursor,
            token == 0x41,
        )?)),
        0x02 => Ok(BinXmlToken::CloseStartElement),
        0x03 => Ok(BinXmlToken::CloseEmptyElement),
        0x04 => Ok(BinXmlToken::CloseElement),
        0x05 | 0x45 => Ok(BinXmlToken::Value(read_value(cursor)?)),
        0x06 | 0x46 => Ok(BinXmlToken::Attribute(read_attribute(cursor)?)),
        0x07 | 0x47 => Ok(BinXmlToken::CDataSection(read_utf16_text(cursor)?)),
        0x08 | 0x48 => Ok(BinXmlToken::CharRef(try_read!(cursor, u16))),
        0x09 | 0x49 => Ok(BinXmlToken::EntityRef(read_entity_ref(cursor)?)),
        0x0a => Ok(BinXmlToken::PITarget(read_processing_instruction_target(
            cursor,
        )?)),
        0x0b => Ok(BinXmlToken::PIData(read_utf16_text(cursor)?)),
        0x0c => Ok(BinXmlToken::TemplateInstance(read_template_instance(
            cursor, chunk, depth,
        )?)),
        0x0d => Ok(BinXmlToken::Substitution(read_substitution_descriptor(
            cursor, false,
        )?)),
        0x0e => Ok(BinXmlToken::Substitution(read_substitution_descriptor(
            cursor, true,
        )?)),
        0x0f => Ok(BinXmlToken::FragmentHeader(read_fragment_header(cursor)?)),
        _ => Err(ParseError::UnknownNodeType {
            value: token,
            offset,
        }
        .into()),
    }
}
