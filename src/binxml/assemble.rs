use crate::binxml::model::{BinXmlTemplateInstance, BinXmlToken};
use crate::binxml::value_variant::{BinXmlValue, Substitution};
use crate::err::Result;

use log::trace;
use regex::{NoExpand, Regex};
use std::fmt::Write;

/// Renders a record's token stream into its readable template form and the
/// record's flat substitution array.
///
/// The template is ordinary XML text where each substitution slot appears as
/// a `[(Normal|Conditional) Substitution(index=N, type=T)]` token. Nested
/// fragments carried by BXml substitutions are spliced into their parent
/// slot depth-first, and all placeholder indices are renumbered into the one
/// flat index space the substitution array uses.
pub fn record_to_template(tokens: &[BinXmlToken]) -> Result<(String, Vec<Substitution>)> {
    let xml = readable_template(tokens, 0)?;
    let substitutions = flatten_substitutions(tokens);

    Ok((xml, substitutions))
}

fn template_instance(tokens: &[BinXmlToken]) -> Option<&BinXmlTemplateInstance> {
    tokens.iter().find_map(|token| match token {
        BinXmlToken::TemplateInstance(instance) => Some(instance),
        _ => None,
    })
}

enum Replacement {
    Index(usize),
    SubTemplate(String),
}

fn readable_template(tokens: &[BinXmlToken], current_index: usize) -> Result<String> {
    let Some(instance) = template_instance(tokens) else {
        // A record without a template renders as-is.
        return render_fragment(tokens);
    };

    let mut template = render_fragment(&instance.definition.tokens)?;

    // Walk the substitution slots in order. A plain slot keeps its value and
    // only needs its index shifted; a BXml slot contributes a whole
    // sub-template, and every later slot shifts by the number of
    // placeholders that sub-template brought in.
    let mut replacements = Vec::with_capacity(instance.substitutions.len());
    let mut current = current_index;

    for (slot, substitution) in instance.substitutions.iter().enumerate() {
        if let BinXmlValue::BinXml(nested) = &substitution.value {
            let sub_template = readable_template(nested, current + slot)?;
            current += count_placeholders(&sub_template);
            replacements.push(Replacement::SubTemplate(sub_template));
        } else {
            replacements.push(Replacement::Index(current + slot));
        }
    }

    // Fix the indices up back to front, so renumbered slots never collide
    // with slots that are still waiting for their shift.
    for (slot, replacement) in replacements.iter().enumerate().rev() {
        match replacement {
            Replacement::Index(new_index) => {
                template = template.replace(
                    &format!("index={slot},"),
                    &format!("index={new_index},"),
                );
            }
            Replacement::SubTemplate(sub_template) => {
                trace!("Splicing sub-template into slot {}", slot);
                template = splice_sub_template(&template, slot, sub_template);
            }
        }
    }

    Ok(template)
}

/// The record's substitution values with BXml slots replaced in place by
/// their nested fragment's own substitutions.
pub fn flatten_substitutions(tokens: &[BinXmlToken]) -> Vec<Substitution> {
    let Some(instance) = template_instance(tokens) else {
        return Vec::new();
    };

    let mut flat = Vec::with_capacity(instance.substitutions.len());

    for substitution in &instance.substitutions {
        if let BinXmlValue::BinXml(nested) = &substitution.value {
            flat.extend(flatten_substitutions(nested));
        } else {
            flat.push(substitution.clone());
        }
    }

    flat
}

pub fn count_placeholders(template: &str) -> usize {
    template.matches("Substitution(index=").count()
}

fn splice_sub_template(template: &str, slot: usize, sub_template: &str) -> String {
    let pattern = Regex::new(&format!(
        r"\[(Normal|Conditional) Substitution\(index={slot}, type=\d+\)\]"
    ))
    .expect("a placeholder pattern always compiles");

    pattern
        .replace_all(template, NoExpand(sub_template))
        .into_owned()
}

fn render_fragment(tokens: &[BinXmlToken]) -> Result<String> {
    let mut out = String::new();
    let mut element_names: Vec<&str> = Vec::new();
    let mut attribute_open = false;

    for token in tokens {
        match token {
            BinXmlToken::FragmentHeader(_) | BinXmlToken::EndOfStream => {}
            BinXmlToken::OpenStartElement(element) => {
                out.push('<');
                out.push_str(element.name.as_str());
                element_names.push(element.name.as_str());
            }
            BinXmlToken::Attribute(attribute) => {
                if attribute_open {
                    out.push('"');
                }
                out.push(' ');
                out.push_str(attribute.name.as_str());
                out.push_str("=\"");
                attribute_open = true;
            }
            BinXmlToken::CloseStartElement => {
                if attribute_open {
                    out.push('"');
                    attribute_open = false;
                }
                out.push('>');
            }
            BinXmlToken::CloseEmptyElement => {
                if attribute_open {
                    out.push('"');
                    attribute_open = false;
                }
                out.push_str("/>");
                element_names.pop();
            }
            BinXmlToken::CloseElement => {
                out.push_str("</");
                out.push_str(element_names.pop().unwrap_or_default());
                out.push('>');
            }
            BinXmlToken::Value(value) => out.push_str(&value.as_xml_string()),
            BinXmlToken::Substitution(descriptor) => {
                write!(
                    out,
                    "[{} Substitution(index={}, type={})]",
                    if descriptor.optional {
                        "Conditional"
                    } else {
                        "Normal"
                    },
                    descriptor.substitution_index,
                    descriptor.value_type,
                )
                .expect("writing to a String cannot fail");
            }
            BinXmlToken::EntityRef(name) => {
                out.push('&');
                out.push_str(name.as_str());
                out.push(';');
            }
            BinXmlToken::CharRef(value) => {
                write!(out, "&#{value};").expect("writing to a String cannot fail");
            }
            BinXmlToken::CDataSection(text) => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            BinXmlToken::PITarget(name) => {
                out.push_str("<?");
                out.push_str(name.as_str());
                out.push(' ');
            }
            BinXmlToken::PIData(data) => {
                out.push_str(data);
                out.push_str("?>");
            }
            // Nested template instances surface as BXml substitution values,
            // never as bare tokens inside a definition.
            BinXmlToken::TemplateInstance(_) => {}
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binxml::model::*;
    use crate::binxml::name::BinXmlName;
    use crate::guid::Guid;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn name(s: &str) -> BinXmlName {
        // Inline name data: offset field pointing directly past itself.
        let mut data = 4u32.to_le_bytes().to_vec();
        data.extend_from_slice(&0u32.to_le_bytes()); // next string link
        data.extend_from_slice(&0u16.to_le_bytes()); // hash
        data.extend_from_slice(&(s.len() as u16).to_le_bytes());
        for unit in s.encode_utf16() {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        data.extend_from_slice(&[0, 0]);

        let mut cursor = std::io::Cursor::new(data.as_slice());
        BinXmlName::from_binxml_stream(&mut cursor).unwrap()
    }

    fn open(n: &str) -> BinXmlToken {
        BinXmlToken::OpenStartElement(BinXmlOpenStartElement {
            data_size: 0,
            name: name(n),
            has_attributes: false,
        })
    }

    fn substitution(index: u16, value_type: u8, optional: bool) -> BinXmlToken {
        BinXmlToken::Substitution(TemplateSubstitutionDescriptor {
            substitution_index: index,
            value_type,
            optional,
        })
    }

    fn definition(tokens: Vec<BinXmlToken>) -> Rc<BinXmlTemplateDefinition> {
        Rc::new(BinXmlTemplateDefinition {
            next_template_offset: 0,
            template_guid: Guid::new(0, 0, 0, &[0u8; 8]),
            data_size: 0,
            tokens,
        })
    }

    fn instance_token(
        definition_tokens: Vec<BinXmlToken>,
        substitutions: Vec<Substitution>,
    ) -> Vec<BinXmlToken> {
        vec![
            BinXmlToken::FragmentHeader(BinXmlFragmentHeader {
                major_version: 1,
                minor_version: 1,
                flags: 0,
            }),
            BinXmlToken::TemplateInstance(BinXmlTemplateInstance {
                definition: definition(definition_tokens),
                substitutions,
            }),
        ]
    }

    #[test]
    fn test_renders_elements_attributes_and_placeholders() {
        let tokens = instance_token(
            vec![
                open("Event"),
                BinXmlToken::Attribute(BinXmlAttribute { name: name("xmlns") }),
                BinXmlToken::Value(BinXmlValue::WString("ns".to_owned())),
                BinXmlToken::CloseStartElement,
                open("Data"),
                BinXmlToken::CloseStartElement,
                substitution(1, 0x01, false),
                BinXmlToken::CloseElement,
                BinXmlToken::CloseElement,
                BinXmlToken::EndOfStream,
            ],
            vec![
                Substitution {
                    value_type: 0x00,
                    value: BinXmlValue::Null,
                },
                Substitution {
                    value_type: 0x01,
                    value: BinXmlValue::WString("payload".to_owned()),
                },
            ],
        );

        let (xml, substitutions) = record_to_template(&tokens).unwrap();

        assert_eq!(
            xml,
            "<Event xmlns=\"ns\"><Data>[Normal Substitution(index=1, type=1)]</Data></Event>"
        );
        assert_eq!(substitutions.len(), 2);
    }

    #[test]
    fn test_splices_nested_template_depth_first_and_renumbers() {
        let nested = instance_token(
            vec![
                open("Inner"),
                BinXmlToken::CloseStartElement,
                substitution(0, 0x06, false),
                BinXmlToken::CloseElement,
                BinXmlToken::EndOfStream,
            ],
            vec![Substitution {
                value_type: 0x06,
                value: BinXmlValue::UInt16(7),
            }],
        );

        let tokens = instance_token(
            vec![
                open("Outer"),
                BinXmlToken::CloseStartElement,
                substitution(0, 0x21, false),
                substitution(1, 0x06, false),
                BinXmlToken::CloseElement,
                BinXmlToken::EndOfStream,
            ],
            vec![
                Substitution {
                    value_type: 0x21,
                    value: BinXmlValue::BinXml(nested),
                },
                Substitution {
                    value_type: 0x06,
                    value: BinXmlValue::UInt16(9),
                },
            ],
        );

        let (xml, substitutions) = record_to_template(&tokens).unwrap();

        assert_eq!(
            xml,
            "<Outer><Inner>[Normal Substitution(index=0, type=6)]</Inner>\
             [Normal Substitution(index=2, type=6)]</Outer>"
        );

        // The nested fragment's value takes the BXml slot's position.
        assert_eq!(
            substitutions,
            vec![
                Substitution {
                    value_type: 0x06,
                    value: BinXmlValue::UInt16(7),
                },
                Substitution {
                    value_type: 0x06,
                    value: BinXmlValue::UInt16(9),
                },
            ]
        );
    }

    #[test]
    fn test_record_without_template_renders_plain() {
        let tokens = vec![
            open("Standalone"),
            BinXmlToken::CloseEmptyElement,
            BinXmlToken::EndOfStream,
        ];

        let (xml, substitutions) = record_to_template(&tokens).unwrap();

        assert_eq!(xml, "<Standalone/>");
        assert!(substitutions.is_empty());
    }
}
