use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::disposition::{FlagKind, Flagged};
use crate::spec::SchemaError;
use crate::spec::field::FieldSpec;
use crate::spec::tree::{FieldAddress, FieldIndex, SectionKey};

/// A titled set of fields shown together as one navigation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub exclude: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub skip: bool,
}

impl Section {
    pub fn new(id: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            description: None,
            fields,
            exclude: false,
            skip: false,
        }
    }

    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.id == id)
    }
}

impl Flagged for Section {
    fn flags(&self) -> (bool, bool) {
        (self.exclude, self.skip)
    }

    fn flag_slots(&mut self) -> (&mut bool, &mut bool) {
        (&mut self.exclude, &mut self.skip)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "sets")]
    pub sections: Vec<Section>,
}

impl Page {
    pub fn new(id: impl Into<String>, sections: Vec<Section>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            description: None,
            sections,
        }
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Ordered pages of a questionnaire plus the id index over them.
///
/// The page/section/field structure is fixed once constructed; only the
/// `exclude`/`skip` flags on sections and fields change during a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Questionnaire {
    pages: Vec<Page>,
    index: FieldIndex,
}

impl Questionnaire {
    pub fn new(pages: Vec<Page>) -> Result<Self, SchemaError> {
        if pages.is_empty() {
            return Err(SchemaError::Empty);
        }
        for page in &pages {
            if page.sections.is_empty() {
                return Err(SchemaError::EmptyPage {
                    page_id: page.id.clone(),
                });
            }
            for section in &page.sections {
                check_patterns(&section.fields)?;
            }
        }
        let index = FieldIndex::build(&pages);
        Ok(Self { pages, index })
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let pages: Vec<Page> = serde_json::from_str(json)?;
        Self::new(pages)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn section_count(&self, page: usize) -> usize {
        self.pages.get(page).map_or(0, |page| page.sections.len())
    }

    pub fn section(&self, key: SectionKey) -> Option<&Section> {
        self.pages.get(key.page)?.sections.get(key.section)
    }

    /// Mutable access for flag updates. Callers must not change the structure.
    pub fn section_mut(&mut self, key: SectionKey) -> Option<&mut Section> {
        self.pages.get_mut(key.page)?.sections.get_mut(key.section)
    }

    pub fn sections(&self) -> impl Iterator<Item = (SectionKey, &Section)> {
        self.pages.iter().enumerate().flat_map(|(page_idx, page)| {
            page.sections
                .iter()
                .enumerate()
                .map(move |(section_idx, section)| (SectionKey::new(page_idx, section_idx), section))
        })
    }

    pub fn sections_mut(&mut self) -> impl Iterator<Item = (SectionKey, &mut Section)> {
        self.pages
            .iter_mut()
            .enumerate()
            .flat_map(|(page_idx, page)| {
                page.sections
                    .iter_mut()
                    .enumerate()
                    .map(move |(section_idx, section)| {
                        (SectionKey::new(page_idx, section_idx), section)
                    })
            })
    }

    pub fn last_key(&self) -> SectionKey {
        let page = self.pages.len().saturating_sub(1);
        SectionKey::new(page, self.section_count(page).saturating_sub(1))
    }

    /// Finds `id` anywhere in the field tree of one section.
    pub fn locate(&self, section: SectionKey, id: &str) -> Option<FieldAddress> {
        self.index.locate(section, id)
    }

    /// Finds the first top-level field with `id`, scanning sections in order.
    pub fn locate_top_level(&self, id: &str) -> Option<FieldAddress> {
        self.sections().find_map(|(key, section)| {
            section
                .fields
                .iter()
                .position(|field| field.id == id)
                .map(|idx| FieldAddress {
                    section: key,
                    chain: vec![idx],
                })
        })
    }

    pub fn field(&self, address: &FieldAddress) -> Option<&FieldSpec> {
        let section = self.section(address.section)?;
        let (first, rest) = address.chain.split_first()?;
        let mut field = section.fields.get(*first)?;
        for idx in rest {
            field = field.sub_fields.get(*idx)?;
        }
        Some(field)
    }

    pub fn field_mut(&mut self, address: &FieldAddress) -> Option<&mut FieldSpec> {
        let section = self.section_mut(address.section)?;
        let (first, rest) = address.chain.split_first()?;
        let mut field = section.fields.get_mut(*first)?;
        for idx in rest {
            field = field.sub_fields.get_mut(*idx)?;
        }
        Some(field)
    }

    /// Ids from the top-level field down to the addressed node.
    pub fn id_chain(&self, address: &FieldAddress) -> Option<Vec<String>> {
        let section = self.section(address.section)?;
        let (first, rest) = address.chain.split_first()?;
        let mut field = section.fields.get(*first)?;
        let mut ids = vec![field.id.clone()];
        for idx in rest {
            field = field.sub_fields.get(*idx)?;
            ids.push(field.id.clone());
        }
        Some(ids)
    }

    /// Addresses of every field node, top-level and nested.
    pub fn field_addresses(&self) -> Vec<FieldAddress> {
        self.index.addresses()
    }

    /// Top-level fields with the key of their section, in questionnaire order.
    pub fn top_level_fields(&self) -> impl Iterator<Item = (SectionKey, &FieldSpec)> {
        self.sections()
            .flat_map(|(key, section)| section.fields.iter().map(move |field| (key, field)))
    }

    /// Resets every section and field flag to included.
    pub fn clear_flags(&mut self) {
        for (_, section) in self.sections_mut() {
            section.exclude = false;
            section.skip = false;
            for field in &mut section.fields {
                field.cascade_flag(FlagKind::Exclude, false);
            }
        }
    }
}

impl Serialize for Questionnaire {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.pages.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Questionnaire {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pages = Vec::<Page>::deserialize(deserializer)?;
        Questionnaire::new(pages).map_err(serde::de::Error::custom)
    }
}

fn check_patterns(fields: &[FieldSpec]) -> Result<(), SchemaError> {
    for field in fields {
        for pattern in field.patterns() {
            Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
                field_id: field.id.clone(),
                source,
            })?;
        }
        check_patterns(&field.sub_fields)?;
    }
    Ok(())
}
