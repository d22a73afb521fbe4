use crate::binxml::deserializer::read_binxml_fragment;
use crate::binxml::model::*;
use crate::binxml::name::BinXmlName;
use crate::binxml::value_variant::{BinXmlValue, Substitution, VALUE_TYPE_NULL};
use crate::err::{ExtractError, ParseError, Result};
use crate::evtx_chunk::EvtxChunk;
use crate::guid::Guid;
use crate::utils::read_len_prefixed_utf16_string;

use byteorder::ReadBytesExt;
use log::{debug, trace};
use std::io::{Cursor, Seek, SeekFrom};
use std::rc::Rc;

pub fn read_open_start_element(
    cursor: &mut Cursor<&[u8]>,
    has_attributes: bool,
) -> Result<BinXmlOpenStartElement> {
    // Dependency identifier.
    let _ = try_read!(cursor, u16);
    let data_size = try_read!(cursor, u32);
    let name = BinXmlName::from_binxml_stream(cursor)?;

    let _attribute_list_data_size = if has_attributes {
        try_read!(cursor, u32)
    } else {
        0
    };

    Ok(BinXmlOpenStartElement {
        data_size,
        name,
        has_attributes,
    })
}

pub fn read_attribute(cursor: &mut Cursor<&[u8]>) -> Result<BinXmlAttribute> {
    let name = BinXmlName::from_binxml_stream(cursor)?;

    Ok(BinXmlAttribute { name })
}

pub fn read_value(cursor: &mut Cursor<&[u8]>) -> Result<BinXmlValue> {
    let value_type = try_read!(cursor, u8);

    BinXmlValue::deserialize_unsized(value_type, cursor)
}

pub fn read_fragment_header(cursor: &mut Cursor<&[u8]>) -> Result<BinXmlFragmentHeader> {
    trace!("FragmentHeader at {}", cursor.position());

    let major_version = try_read!(cursor, u8);
    let minor_version = try_read!(cursor, u8);
    let flags = try_read!(cursor, u8);

    Ok(BinXmlFragmentHeader {
        major_version,
        minor_version,
        flags,
    })
}

pub fn read_substitution_descriptor(
    cursor: &mut Cursor<&[u8]>,
    optional: bool,
) -> Result<TemplateSubstitutionDescriptor> {
    let substitution_index = try_read!(cursor, u16);
    let value_type = try_read!(cursor, u8);

    if !crate::binxml::value_variant::is_valid_substitution_type(value_type) {
        return Err(ParseError::InvalidSubstitutionType {
            value: value_type,
            offset: cursor.position(),
        }
        .into());
    }

    Ok(TemplateSubstitutionDescriptor {
        substitution_index,
        value_type,
        optional,
    })
}

pub fn read_entity_ref(cursor: &mut Cursor<&[u8]>) -> Result<BinXmlName> {
    trace!("EntityReference at {}", cursor.position());

    BinXmlName::from_binxml_stream(cursor)
}

pub fn read_processing_instruction_target(cursor: &mut Cursor<&[u8]>) -> Result<BinXmlName> {
    BinXmlName::from_binxml_stream(cursor)
}

pub fn read_utf16_text(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let offset = cursor.position();

    Ok(read_len_prefixed_utf16_string(cursor, false)
        .map_err(|_| ExtractError::FailedToDecodeUTF16String { offset })?
        .unwrap_or_default())
}

pub fn read_template_instance(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
    depth: u8,
) -> Result<BinXmlTemplateInstance> {
    debug!("TemplateInstance at {}", cursor.position());

    let _ = try_read!(cursor, u8);
    let _template_id = try_read!(cursor, u32);
    let template_definition_offset = try_read!(cursor, u32);

    let definition = if u64::from(template_definition_offset) == cursor.position() {
        let definition = Rc::new(read_template_definition(cursor, chunk, depth)?);

        if let Some(chunk) = chunk {
            chunk.cache_template(template_definition_offset, Rc::clone(&definition));
        }

        definition
    } else {
        match chunk.and_then(|chunk| chunk.cached_template(template_definition_offset)) {
            Some(definition) => definition,
            None => {
                debug!(
                    "Need to seek to offset {} to read the template",
                    template_definition_offset
                );
                let position_before_seek = cursor.position();

                cursor.seek(SeekFrom::Start(u64::from(template_definition_offset)))?;
                let definition = Rc::new(read_template_definition(cursor, chunk, depth)?);
                cursor.seek(SeekFrom::Start(position_before_seek))?;

                if let Some(chunk) = chunk {
                    chunk.cache_template(template_definition_offset, Rc::clone(&definition));
                }

                definition
            }
        }
    };

    let number_of_substitutions = try_read!(cursor, u32);

    let mut value_descriptors = Vec::with_capacity(number_of_substitutions as usize);

    for _ in 0..number_of_substitutions {
        let size = try_read!(cursor, u16);
        let value_type = try_read!(cursor, u8);
        // Empty
        let _ = try_read!(cursor, u8);

        value_descriptors.push(TemplateValueDescriptor { size, value_type })
    }

    trace!("{:?}", value_descriptors);

    let mut substitutions = Vec::with_capacity(number_of_substitutions as usize);

    for descriptor in &value_descriptors {
        let position = cursor.position();
        trace!("Substitution: {:x} at {}", descriptor.value_type, position);

        let value = if descriptor.value_type == VALUE_TYPE_NULL {
            BinXmlValue::Null
        } else {
            BinXmlValue::deserialize_sized(
                descriptor.value_type,
                descriptor.size,
                cursor,
                chunk,
                depth,
            )?
        };

        // The descriptor owns the byte budget, whatever the decode consumed.
        cursor.seek(SeekFrom::Start(position + u64::from(descriptor.size)))?;

        substitutions.push(Substitution {
            value_type: descriptor.value_type,
            value,
        });
    }

    Ok(BinXmlTemplateInstance {
        definition,
        substitutions,
    })
}

pub fn read_template_definition(
    cursor: &mut Cursor<&[u8]>,
    chunk: Option<&EvtxChunk>,
    depth: u8,
) -> Result<BinXmlTemplateDefinition> {
    let next_template_offset = try_read!(cursor, u32);

    let template_guid = Guid::from_stream(cursor).map_err(|_| ParseError::BufferOverrun {
        offset: cursor.position(),
        size: 16,
    })?;

    let data_size = try_read!(cursor, u32);

    // Data size covers the fragment header, the element tree and the end of
    // stream token.
    let start_position = cursor.position();
    let tokens = read_binxml_fragment(cursor, chunk, Some(data_size), depth + 1)?;

    cursor.seek(SeekFrom::Start(start_position + u64::from(data_size)))?;

    Ok(BinXmlTemplateDefinition {
        next_template_offset,
        template_guid,
        data_size,
        tokens,
    })
}
