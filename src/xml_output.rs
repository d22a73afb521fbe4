use crate::err::{ExtractError, Result};
use crate::extractor::IncompleteRecord;

use quick_xml::events::Event;
use quick_xml::Reader;

/// Reads `/Event/System/EventID` out of rendered record XML.
///
/// Elements are matched by local name, so a namespace prefix on the event
/// schema does not matter.
pub fn extract_event_id(xml: &str) -> Result<u32> {
    let mut reader = Reader::from_str(xml);
    let mut path: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                path.push(element.local_name().as_ref().to_vec());
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(text) => {
                if path.len() == 3
                    && path[0] == b"Event"
                    && path[1] == b"System"
                    && path[2] == b"EventID"
                {
                    let raw = std::str::from_utf8(text.as_ref())
                        .map_err(|_| ExtractError::EventIdNotFound)?;

                    return raw
                        .trim()
                        .parse::<u32>()
                        .map_err(|_| ExtractError::EventIdNotFound);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(ExtractError::EventIdNotFound)
}

/// Renders an incomplete record as a `<Record>` block: the offset, the event
/// id, and every substitution with its type and stringified value.
pub fn format_incomplete_record(record: &IncompleteRecord) -> String {
    let mut lines = Vec::with_capacity(record.substitutions.len() * 5 + 7);

    lines.push("<Record>".to_owned());
    lines.push(format!("<Offset>{:#x}</Offset>", record.offset));
    lines.push(format!("<EventID>{}</EventID>", record.event_id));
    lines.push("<Substitutions>".to_owned());

    for (i, substitution) in record.substitutions.iter().enumerate() {
        lines.push(format!("  <Substitution index=\"{i}\">"));
        lines.push(format!("    <Type>{}</Type>", substitution.value_type));
        lines.push(format!(
            "    <Value>{}</Value>",
            substitution.value.as_xml_string()
        ));
        lines.push("  </Substitution>".to_owned());
    }

    lines.push("</Substitutions>".to_owned());
    lines.push("</Record>".to_owned());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binxml::value_variant::{BinXmlValue, Substitution};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extracts_event_id() {
        let xml = "<Event xmlns=\"http://schemas.microsoft.com/win/2004/08/events/event\">\
                   <System><Provider Name=\"p\"/><EventID Qualifiers=\"16384\"> 7036 </EventID>\
                   </System><EventData/></Event>";

        assert_eq!(extract_event_id(xml).unwrap(), 7036);
    }

    #[test]
    fn test_event_id_outside_system_is_not_used() {
        let xml = "<Event><EventData><EventID>1</EventID></EventData></Event>";

        assert!(matches!(
            extract_event_id(xml),
            Err(ExtractError::EventIdNotFound)
        ));
    }

    #[test]
    fn test_non_numeric_event_id_is_an_error() {
        let xml = "<Event><System><EventID>abc</EventID></System></Event>";

        assert!(matches!(
            extract_event_id(xml),
            Err(ExtractError::EventIdNotFound)
        ));
    }

    #[test]
    fn test_formats_incomplete_record() {
        let record = IncompleteRecord {
            offset: 0x317198,
            event_id: 4624,
            substitutions: vec![
                Substitution {
                    value_type: 0x06,
                    value: BinXmlValue::UInt16(2),
                },
                Substitution {
                    value_type: 0x00,
                    value: BinXmlValue::Null,
                },
            ],
        };

        let expected = "<Record>\n\
                        <Offset>0x317198</Offset>\n\
                        <EventID>4624</EventID>\n\
                        <Substitutions>\n  \
                        <Substitution index=\"0\">\n    \
                        <Type>6</Type>\n    \
                        <Value>2</Value>\n  \
                        </Substitution>\n  \
                        <Substitution index=\"1\">\n    \
                        <Type>0</Type>\n    \
                        <Value></Value>\n  \
                        </Substitution>\n\
                        </Substitutions>\n\
                        </Record>";

        assert_eq!(format_incomplete_record(&record), expected);
    }
}
