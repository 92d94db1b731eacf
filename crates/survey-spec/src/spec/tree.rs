use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::spec::field::FieldSpec;
use crate::spec::questionnaire::Page;

/// Position of a section: page index plus section index within that page.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct SectionKey {
    pub page: usize,
    pub section: usize,
}

impl SectionKey {
    pub const fn new(page: usize, section: usize) -> Self {
        Self { page, section }
    }

    /// `"{page}-{section}"`, the key used by the persisted section flag maps.
    pub fn composite_id(&self) -> String {
        format!("{}-{}", self.page, self.section)
    }

    pub fn parse_composite(raw: &str) -> Option<Self> {
        let (page, section) = raw.split_once('-')?;
        Some(Self::new(page.parse().ok()?, section.parse().ok()?))
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.page, self.section)
    }
}

/// Index path to one field node: the section plus the positions walked from the
/// section's field list down through `sub_fields`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldAddress {
    pub section: SectionKey,
    pub chain: Vec<usize>,
}

impl FieldAddress {
    pub fn is_top_level(&self) -> bool {
        self.chain.len() == 1
    }

    /// Address of the enclosing group field, if any.
    pub fn parent(&self) -> Option<FieldAddress> {
        if self.chain.len() < 2 {
            return None;
        }
        Some(FieldAddress {
            section: self.section,
            chain: self.chain[..self.chain.len() - 1].to_vec(),
        })
    }

    /// Enclosing group addresses, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = FieldAddress> + '_ {
        (1..self.chain.len()).rev().map(|depth| FieldAddress {
            section: self.section,
            chain: self.chain[..depth].to_vec(),
        })
    }
}

/// Per-section id lookup built once at load time.
///
/// Ids are resolved in depth-first order, so when an id repeats inside one
/// section the first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldIndex {
    sections: BTreeMap<SectionKey, HashMap<String, Vec<usize>>>,
}

impl FieldIndex {
    pub fn build(pages: &[Page]) -> Self {
        let mut sections = BTreeMap::new();
        for (page_idx, page) in pages.iter().enumerate() {
            for (section_idx, section) in page.sections.iter().enumerate() {
                let mut ids = HashMap::new();
                let mut chain = Vec::new();
                index_fields(&section.fields, &mut chain, &mut ids);
                sections.insert(SectionKey::new(page_idx, section_idx), ids);
            }
        }
        Self { sections }
    }

    pub fn locate(&self, section: SectionKey, id: &str) -> Option<FieldAddress> {
        let chain = self.sections.get(&section)?.get(id)?;
        Some(FieldAddress {
            section,
            chain: chain.clone(),
        })
    }

    /// Every indexed address, in section order and depth-first within a section.
    pub fn addresses(&self) -> Vec<FieldAddress> {
        let mut out = Vec::new();
        for (key, ids) in &self.sections {
            let mut chains: Vec<&Vec<usize>> = ids.values().collect();
            chains.sort();
            out.extend(chains.into_iter().map(|chain| FieldAddress {
                section: *key,
                chain: chain.clone(),
            }));
        }
        out
    }
}

fn index_fields(
    fields: &[FieldSpec],
    chain: &mut Vec<usize>,
    ids: &mut HashMap<String, Vec<usize>>,
) {
    for (idx, field) in fields.iter().enumerate() {
        chain.push(idx);
        ids.entry(field.id.clone()).or_insert_with(|| chain.clone());
        if !field.sub_fields.is_empty() {
            index_fields(&field.sub_fields, chain, ids);
        }
        chain.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_id_round_trips() {
        let key = SectionKey::new(2, 5);
        assert_eq!(key.composite_id(), "2-5");
        assert_eq!(SectionKey::parse_composite("2-5"), Some(key));
        assert_eq!(SectionKey::parse_composite("2"), None);
        assert_eq!(SectionKey::parse_composite("a-1"), None);
    }

    #[test]
    fn ancestors_are_innermost_first() {
        let address = FieldAddress {
            section: SectionKey::new(0, 0),
            chain: vec![3, 1, 0],
        };
        let chains: Vec<Vec<usize>> = address.ancestors().map(|a| a.chain).collect();
        assert_eq!(chains, vec![vec![3, 1], vec![3]]);
        assert_eq!(address.parent().map(|p| p.chain), Some(vec![3, 1]));
    }
}
