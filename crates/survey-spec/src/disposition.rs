use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::spec::field::FieldSpec;
use crate::spec::questionnaire::Questionnaire;

/// Whether a field or section is in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Included,
    /// Permanently out of scope.
    Excluded,
    /// Deferred for now.
    Skipped,
}

impl Disposition {
    pub fn is_bypassed(&self) -> bool {
        !matches!(self, Disposition::Included)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Included => "included",
            Disposition::Excluded => "excluded",
            Disposition::Skipped => "skipped",
        }
    }
}

/// The two runtime flags a node can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    Exclude,
    Skip,
}

impl FlagKind {
    pub fn other(&self) -> FlagKind {
        match self {
            FlagKind::Exclude => FlagKind::Skip,
            FlagKind::Skip => FlagKind::Exclude,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::Exclude => "exclude",
            FlagKind::Skip => "skip",
        }
    }
}

/// Nodes carrying an exclude/skip pair.
///
/// `set_flag` keeps the pair mutually exclusive: raising one flag lowers the
/// other, and lowering either one clears both so the node is fully included.
pub trait Flagged {
    /// `(exclude, skip)`
    fn flags(&self) -> (bool, bool);

    fn flag_slots(&mut self) -> (&mut bool, &mut bool);

    fn disposition(&self) -> Disposition {
        match self.flags() {
            (true, _) => Disposition::Excluded,
            (false, true) => Disposition::Skipped,
            (false, false) => Disposition::Included,
        }
    }

    fn is_bypassed(&self) -> bool {
        self.disposition().is_bypassed()
    }

    fn flag(&self, kind: FlagKind) -> bool {
        let (exclude, skip) = self.flags();
        match kind {
            FlagKind::Exclude => exclude,
            FlagKind::Skip => skip,
        }
    }

    fn set_flag(&mut self, kind: FlagKind, on: bool) {
        let (exclude, skip) = self.flag_slots();
        match (kind, on) {
            (_, false) => {
                *exclude = false;
                *skip = false;
            }
            (FlagKind::Exclude, true) => {
                *exclude = true;
                *skip = false;
            }
            (FlagKind::Skip, true) => {
                *exclude = false;
                *skip = true;
            }
        }
    }
}

pub type DispositionMap = BTreeMap<String, Disposition>;

/// Collects the disposition of every field node by id, nested sub-fields included.
///
/// Repeated ids keep the disposition of their first node in page, section and
/// depth-first order.
pub fn resolve_dispositions(questionnaire: &Questionnaire) -> DispositionMap {
    let mut map = DispositionMap::new();
    for (_, field) in questionnaire.top_level_fields() {
        collect(field, &mut map);
    }
    map
}

fn collect(field: &FieldSpec, map: &mut DispositionMap) {
    map.entry(field.id.clone()).or_insert(field.disposition());
    for sub in &field.sub_fields {
        collect(sub, map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{FieldType, Page, Section};

    #[test]
    fn raising_one_flag_lowers_the_other() {
        let mut field = FieldSpec::new("a", FieldType::Text);
        field.set_flag(FlagKind::Skip, true);
        assert_eq!(field.disposition(), Disposition::Skipped);
        field.set_flag(FlagKind::Exclude, true);
        assert_eq!(field.flags(), (true, false));
        field.set_flag(FlagKind::Skip, false);
        assert_eq!(field.flags(), (false, false));
    }

    #[test]
    fn resolves_nested_dispositions() {
        let mut group = FieldSpec::new("group", FieldType::Group)
            .with_sub_fields(vec![FieldSpec::new("inner", FieldType::Text)]);
        group.sub_fields[0].skip = true;
        let questionnaire = Questionnaire::new(vec![Page::new(
            "p",
            vec![Section::new("s", vec![group, FieldSpec::new("plain", FieldType::Text)])],
        )])
        .expect("questionnaire");

        let map = resolve_dispositions(&questionnaire);
        assert_eq!(map.get("group"), Some(&Disposition::Included));
        assert_eq!(map.get("inner"), Some(&Disposition::Skipped));
        assert_eq!(map.get("plain"), Some(&Disposition::Included));
    }

    #[test]
    fn repeated_ids_keep_the_first_node() {
        let mut first = FieldSpec::new("notes", FieldType::Text);
        first.exclude = true;
        let second = FieldSpec::new("notes", FieldType::Text);
        let questionnaire = Questionnaire::new(vec![Page::new(
            "p",
            vec![
                Section::new("a", vec![first]),
                Section::new("b", vec![second]),
            ],
        )])
        .expect("questionnaire");

        let map = resolve_dispositions(&questionnaire);
        assert_eq!(map.get("notes"), Some(&Disposition::Excluded));
    }
}
