//! Templates harvested from intact chunks, and the matching logic that binds
//! an orphan record's substitution array back to one of them.

use crate::binxml::value_variant::Substitution;

use hashbrown::HashMap;
use log::debug;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(Conditional|Normal) Substitution\(index=(\d+), type=(\d+)\)\]")
        .expect("a placeholder pattern always compiles")
});

/// One substitution slot required by a template.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Placeholder {
    pub index: usize,
    pub value_type: u8,
    pub conditional: bool,
}

/// A binary-xml skeleton with typed placeholder slots, keyed by the event id
/// of the record it was harvested from.
#[derive(Debug, PartialEq, Clone)]
pub struct Template {
    pub event_id: u32,
    pub xml: String,
    placeholders: Vec<Placeholder>,
    signature: String,
}

impl Template {
    pub fn new(event_id: u32, xml: String) -> Template {
        let mut placeholders: Vec<Placeholder> = PLACEHOLDER_RE
            .captures_iter(&xml)
            .map(|captures| Placeholder {
                conditional: &captures[1] == "Conditional",
                index: captures[2].parse().expect("the pattern only matches digits"),
                value_type: captures[3].parse().unwrap_or(u8::MAX),
            })
            .collect();

        placeholders.sort_by_key(|placeholder| placeholder.index);

        let signature = build_signature(event_id, &placeholders);

        Template {
            event_id,
            xml,
            placeholders,
            signature,
        }
    }

    /// A stable fingerprint of the placeholder shape, e.g.
    /// `1100-[0|4|c]-[1|4|c]-[2|6|c]-[3|6|c]`.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Checks whether the provided substitutions satisfy the slots this
    /// template requires.
    ///
    /// This is only a best guess. A record may carry more substitutions than
    /// the template has slots, so only the slot constraints are checked.
    pub fn matches_substitutions(&self, substitutions: &[Substitution]) -> bool {
        if self.placeholders.len() > substitutions.len() {
            debug!(
                "Failing on lens: {} vs {}",
                self.placeholders.len(),
                substitutions.len()
            );
            return false;
        }

        if let Some(last) = self.placeholders.last() {
            if last.index > substitutions.len() {
                debug!(
                    "Failing on max index: {} vs {}",
                    last.index,
                    substitutions.len()
                );
                return false;
            }
        }

        for placeholder in &self.placeholders {
            let Some(substitution) = substitutions.get(placeholder.index) else {
                return false;
            };
            let provided = substitution.value_type;

            if placeholder.conditional && provided == 0 {
                continue;
            }

            if provided == placeholder.value_type {
                continue;
            }

            if type_override_allowed(placeholder.value_type, provided) {
                debug!(
                    "Overriding template type {} with substitution type {}",
                    placeholder.value_type, provided
                );
                continue;
            }

            debug!(
                "Failing on type comparison, index {}: {} vs {}",
                placeholder.index, provided, placeholder.value_type
            );
            return false;
        }

        true
    }

    /// Returns a copy of the template with the given substitutions inserted.
    /// Placeholder tokens whose index has no substitution are left verbatim.
    pub fn insert_substitutions(&self, substitutions: &[Substitution]) -> String {
        insert_substitutions(&self.xml, substitutions)
    }
}

/// Some templates request a different type than records subsequently put in
/// them: a Hex64 value may fill a SizeType slot (seen in 4624 logon events).
fn type_override_allowed(declared: u8, provided: u8) -> bool {
    matches!((declared, provided), (0x10, 0x15))
}

fn build_signature(event_id: u32, placeholders: &[Placeholder]) -> String {
    let mut parts = Vec::with_capacity(placeholders.len() + 1);
    parts.push(event_id.to_string());

    for placeholder in placeholders {
        parts.push(format!(
            "[{}|{}|{}]",
            placeholder.index,
            placeholder.value_type,
            if placeholder.conditional { "c" } else { "n" }
        ));
    }

    parts.join("-")
}

/// Replaces every placeholder token in `xml` with the stringified value at
/// its flat index. Replacement is literal, so values that happen to contain
/// placeholder-like or backreference-like text are never reinterpreted.
pub fn insert_substitutions(xml: &str, substitutions: &[Substitution]) -> String {
    PLACEHOLDER_RE
        .replace_all(xml, |captures: &Captures| {
            let index: usize = captures[2].parse().expect("the pattern only matches digits");

            match substitutions.get(index) {
                Some(substitution) => substitution.value.as_xml_string(),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

/// All harvested templates, bucketed by event id and keyed by signature.
///
/// Insertion is idempotent for an exact `(signature, xml)` pair; a template
/// with a known signature but different body is kept as a distinct copy, so
/// collisions stay visible to the matcher.
#[derive(Debug, Default)]
pub struct TemplateStore(HashMap<u32, HashMap<String, Vec<Template>>>);

impl TemplateStore {
    pub fn new() -> Self {
        TemplateStore(HashMap::new())
    }

    pub fn insert(&mut self, template: Template) {
        let bucket = self.0.entry(template.event_id).or_default();
        let entries = bucket.entry(template.signature().to_owned()).or_default();

        if entries.iter().any(|known| known.xml == template.xml) {
            return;
        }

        entries.push(template);
    }

    /// Every stored template for `event_id` that accepts the given
    /// substitutions.
    pub fn matching(&self, event_id: u32, substitutions: &[Substitution]) -> Vec<&Template> {
        match self.0.get(&event_id) {
            Some(bucket) => bucket
                .values()
                .flatten()
                .filter(|template| template.matches_substitutions(substitutions))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.0.values().flat_map(|bucket| bucket.values()).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn signatures(&self) -> Vec<&str> {
        let mut signatures: Vec<&str> = self
            .0
            .values()
            .flat_map(|bucket| bucket.keys())
            .map(String::as_str)
            .collect();
        signatures.sort_unstable();
        signatures
    }
}
