use crate::binxml::name::BinXmlName;
use crate::binxml::value_variant::{BinXmlValue, Substitution};
use crate::guid::Guid;

use std::rc::Rc;

#[derive(Debug, PartialEq, Clone)]
pub enum BinXmlToken {
    FragmentHeader(BinXmlFragmentHeader),
    TemplateInstance(BinXmlTemplateInstance),
    OpenStartElement(BinXmlOpenStartElement),
    CloseStartElement,
    CloseEmptyElement,
    CloseElement,
    Value(BinXmlValue),
    Attribute(BinXmlAttribute),
    CDataSection(String),
    CharRef(u16),
    EntityRef(BinXmlName),
    PITarget(BinXmlName),
    PIData(String),
    Substitution(TemplateSubstitutionDescriptor),
    EndOfStream,
}

#[derive(Debug, PartialEq, Clone)]
pub struct BinXmlOpenStartElement {
    pub data_size: u32,
    pub name: BinXmlName,
    pub has_attributes: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct BinXmlAttribute {
    pub name: BinXmlName,
}

#[repr(C)]
#[derive(Debug, PartialEq, Clone)]
pub struct BinXmlFragmentHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub flags: u8,
}

#[derive(Debug, PartialEq, Clone)]
pub struct BinXmlTemplateDefinition {
    pub next_template_offset: u32,
    pub template_guid: Guid,
    pub data_size: u32,
    pub tokens: Vec<BinXmlToken>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct BinXmlTemplateInstance {
    pub definition: Rc<BinXmlTemplateDefinition>,
    pub substitutions: Vec<Substitution>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TemplateSubstitutionDescriptor {
    // Zero-based (0 is the first slot).
    pub substitution_index: u16,
    pub value_type: u8,
    pub optional: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TemplateValueDescriptor {
    pub size: u16,
    pub value_type: u8,
}
