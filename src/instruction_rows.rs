//! Tabular row records the tier views operate on. An instruction with
//! region tuples expands into one or more of these slots depending on
//! the view kind; the slots are the "underlying slot" side of every
//! row mapping.

use crate::{
    error::EngineError,
    instruction::{InstructionCore, NodeType, Sign, SignalKind, normalize_name},
    region_catalog::RegionCatalog,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Region columns of a row. Multi-choice kinds (Simple, Medium, Signal,
/// Lone-Node) expose a checkbox set of intra-region restrictions; the
/// Complex kind exposes single-choice source/target region columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionChoice {
    MultiChoice(BTreeSet<String>),
    Pair {
        source: Option<String>,
        target: Option<String>,
    },
}

impl RegionChoice {
    pub fn empty_multi() -> Self {
        Self::MultiChoice(BTreeSet::new())
    }

    pub fn empty_pair() -> Self {
        Self::Pair {
            source: None,
            target: None,
        }
    }

    /// The SelectedOnly predicate: a multi-choice row needs at least one
    /// checked region, a pair row at least one non-default column.
    pub fn has_selection(&self) -> bool {
        match self {
            Self::MultiChoice(set) => !set.is_empty(),
            Self::Pair { source, target } => source.is_some() || target.is_some(),
        }
    }

    /// Drop every selection whose tag is no longer in the catalog.
    /// Matching is by normalized tag key, so renames that keep the tag
    /// survive and removals are dropped. Idempotent.
    pub fn remap(&mut self, catalog: &RegionCatalog) {
        match self {
            Self::MultiChoice(set) => {
                set.retain(|tag| catalog.contains_tag(tag));
            }
            Self::Pair { source, target } => {
                for column in [source, target] {
                    if column.as_deref().is_some_and(|tag| !catalog.contains_tag(tag)) {
                        *column = None;
                    }
                }
            }
        }
    }
}

/// Typed form of a cell edit. Which variants apply depends on the row's
/// core: addressing a column the core does not have is a caller error.
#[derive(Debug, Clone, PartialEq)]
pub enum CellEdit {
    SourceName(String),
    SourceType(NodeType),
    Sign(Sign),
    TargetName(String),
    TargetType(NodeType),
    FactorName(String),
    FactorType(NodeType),
    SignalKind(SignalKind),
    /// Check/uncheck one region in a multi-choice row.
    ToggleRegion(String),
    SourceRegion(Option<String>),
    TargetRegion(Option<String>),
}

impl CellEdit {
    pub fn is_type_edit(&self) -> bool {
        matches!(
            self,
            Self::SourceType(_) | Self::TargetType(_) | Self::FactorType(_)
        )
    }
}

/// One editable table row: core fields, persistence id, region columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSlot {
    pub id: String,
    pub core: InstructionCore,
    pub regions: RegionChoice,
}

impl RowSlot {
    pub fn new(id: impl Into<String>, core: InstructionCore, regions: RegionChoice) -> Self {
        Self {
            id: id.into(),
            core,
            regions,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.trim().is_empty()
    }

    /// A fully blank row: no names and no id. Such rows are placeholders
    /// and exempt from validation.
    pub fn is_blank(&self) -> bool {
        self.is_new() && self.core.is_blank()
    }

    /// For a name edit, the (new name, type the row would declare for
    /// it) pair the type tracker must be consulted with.
    pub fn name_edit_claim(&self, edit: &CellEdit) -> Option<(String, NodeType)> {
        let claim = match (&self.core, edit) {
            (InstructionCore::GeneSign { .. }, CellEdit::SourceName(name))
            | (InstructionCore::GeneSign { .. }, CellEdit::TargetName(name)) => {
                (name.clone(), NodeType::Gene)
            }
            (InstructionCore::GeneralSign { source_type, .. }, CellEdit::SourceName(name)) => {
                (name.clone(), *source_type)
            }
            (InstructionCore::GeneralSign { target_type, .. }, CellEdit::TargetName(name)) => {
                (name.clone(), *target_type)
            }
            (InstructionCore::Signal { source_type, .. }, CellEdit::SourceName(name)) => {
                (name.clone(), *source_type)
            }
            (InstructionCore::Signal { factor_type, .. }, CellEdit::FactorName(name)) => {
                (name.clone(), *factor_type)
            }
            (InstructionCore::Signal { target_type, .. }, CellEdit::TargetName(name)) => {
                (name.clone(), *target_type)
            }
            (InstructionCore::LoneNode { node_type, .. }, CellEdit::SourceName(name)) => {
                (name.clone(), *node_type)
            }
            _ => return None,
        };
        if claim.0.trim().is_empty() {
            return None;
        }
        Some(claim)
    }

    /// For a type edit, the (current name in that column, old type,
    /// new type) triple, or `None` when the column is unnamed.
    pub fn type_edit_target(&self, edit: &CellEdit) -> Option<(String, NodeType, NodeType)> {
        let (name, old, new) = match (&self.core, edit) {
            (
                InstructionCore::GeneralSign {
                    source_type, source, ..
                },
                CellEdit::SourceType(new),
            ) => (source, *source_type, *new),
            (
                InstructionCore::GeneralSign {
                    target_type, target, ..
                },
                CellEdit::TargetType(new),
            ) => (target, *target_type, *new),
            (
                InstructionCore::Signal {
                    source_type, source, ..
                },
                CellEdit::SourceType(new),
            ) => (source, *source_type, *new),
            (
                InstructionCore::Signal {
                    factor_type, factor, ..
                },
                CellEdit::FactorType(new),
            ) => (factor, *factor_type, *new),
            (
                InstructionCore::Signal {
                    target_type, target, ..
                },
                CellEdit::TargetType(new),
            ) => (target, *target_type, *new),
            (InstructionCore::LoneNode { node_type, name }, CellEdit::SourceType(new)) => {
                (name, *node_type, *new)
            }
            _ => return None,
        };
        if name.trim().is_empty() {
            return None;
        }
        Some((name.clone(), old, new))
    }

    /// Apply a typed edit to this row. Type-consistency and pinned-type
    /// policy are the owning view's business and must run before this.
    pub fn apply(&mut self, edit: CellEdit) -> Result<(), EngineError> {
        match (&mut self.core, edit) {
            (InstructionCore::GeneSign { source, .. }, CellEdit::SourceName(name)) => {
                *source = name;
            }
            (InstructionCore::GeneSign { target, .. }, CellEdit::TargetName(name)) => {
                *target = name;
            }
            (InstructionCore::GeneSign { sign, .. }, CellEdit::Sign(new)) => {
                *sign = new.polar().ok_or_else(|| {
                    EngineError::validation("a gene-to-gene link cannot carry a neutral sign")
                })?;
            }
            (InstructionCore::GeneralSign { source, .. }, CellEdit::SourceName(name)) => {
                *source = name;
            }
            (InstructionCore::GeneralSign { source_type, .. }, CellEdit::SourceType(new)) => {
                *source_type = new;
            }
            (InstructionCore::GeneralSign { sign, .. }, CellEdit::Sign(new)) => {
                *sign = new;
            }
            (InstructionCore::GeneralSign { target, .. }, CellEdit::TargetName(name)) => {
                *target = name;
            }
            (InstructionCore::GeneralSign { target_type, .. }, CellEdit::TargetType(new)) => {
                *target_type = new;
            }
            (InstructionCore::Signal { source, .. }, CellEdit::SourceName(name)) => {
                *source = name;
            }
            (InstructionCore::Signal { source_type, .. }, CellEdit::SourceType(new)) => {
                *source_type = new;
            }
            (InstructionCore::Signal { factor, .. }, CellEdit::FactorName(name)) => {
                *factor = name;
            }
            (InstructionCore::Signal { factor_type, .. }, CellEdit::FactorType(new)) => {
                *factor_type = new;
            }
            (InstructionCore::Signal { target, .. }, CellEdit::TargetName(name)) => {
                *target = name;
            }
            (InstructionCore::Signal { target_type, .. }, CellEdit::TargetType(new)) => {
                *target_type = new;
            }
            (InstructionCore::Signal { kind, .. }, CellEdit::SignalKind(new)) => {
                *kind = new;
            }
            (InstructionCore::LoneNode { name, .. }, CellEdit::SourceName(new)) => {
                *name = new;
            }
            (InstructionCore::LoneNode { node_type, .. }, CellEdit::SourceType(new)) => {
                *node_type = new;
            }
            (_, CellEdit::ToggleRegion(tag)) => match &mut self.regions {
                RegionChoice::MultiChoice(set) => {
                    let key = tag.clone();
                    if !set.remove(&key) {
                        set.insert(key);
                    }
                }
                RegionChoice::Pair { .. } => {
                    return Err(EngineError::integrity(
                        "region toggle on a row with single-choice region columns",
                    ));
                }
            },
            (_, CellEdit::SourceRegion(tag)) => match &mut self.regions {
                RegionChoice::Pair { source, .. } => {
                    *source = tag;
                }
                RegionChoice::MultiChoice(_) => {
                    return Err(EngineError::integrity(
                        "source-region column on a multi-choice row",
                    ));
                }
            },
            (_, CellEdit::TargetRegion(tag)) => match &mut self.regions {
                RegionChoice::Pair { target, .. } => {
                    *target = tag;
                }
                RegionChoice::MultiChoice(_) => {
                    return Err(EngineError::integrity(
                        "target-region column on a multi-choice row",
                    ));
                }
            },
            (core, edit) => {
                return Err(EngineError::integrity(format!(
                    "edit {edit:?} does not address a column of {core:?}"
                )));
            }
        }
        Ok(())
    }

    /// How often the normalized name appears among this row's endpoints.
    pub fn count_name(&self, normalized: &str) -> usize {
        self.core
            .named_nodes()
            .iter()
            .filter(|(name, _)| normalize_name(name) == normalized)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::PolarSign;

    fn gene_row() -> RowSlot {
        RowSlot::new(
            "7",
            InstructionCore::GeneSign {
                source: "otx".into(),
                sign: PolarSign::Positive,
                target: "gcm".into(),
            },
            RegionChoice::empty_multi(),
        )
    }

    #[test]
    fn test_neutral_sign_rejected_on_gene_link() {
        let mut row = gene_row();
        let err = row.apply(CellEdit::Sign(Sign::Neutral)).unwrap_err();
        assert!(!err.is_fatal());
        assert!(row.apply(CellEdit::Sign(Sign::Negative)).is_ok());
    }

    #[test]
    fn test_column_mismatch_is_integrity() {
        let mut row = gene_row();
        let err = row
            .apply(CellEdit::SourceType(NodeType::Protein))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_toggle_region() {
        let mut row = gene_row();
        row.apply(CellEdit::ToggleRegion("Endo".into())).unwrap();
        assert!(row.regions.has_selection());
        row.apply(CellEdit::ToggleRegion("Endo".into())).unwrap();
        assert!(!row.regions.has_selection());
    }

    #[test]
    fn test_pair_remap_drops_missing_regions() {
        let catalog = RegionCatalog::from_tags(["Endo"]);
        let mut regions = RegionChoice::Pair {
            source: Some("Endo".into()),
            target: Some("Ecto".into()),
        };
        regions.remap(&catalog);
        assert_eq!(
            regions,
            RegionChoice::Pair {
                source: Some("Endo".into()),
                target: None,
            }
        );
        // Idempotent.
        let before = regions.clone();
        regions.remap(&catalog);
        assert_eq!(regions, before);
    }

    #[test]
    fn test_name_edit_claim_uses_column_type() {
        let row = RowSlot::new(
            "",
            InstructionCore::GeneralSign {
                source_type: NodeType::Protein,
                source: "pmar1".into(),
                sign: Sign::Neutral,
                target_type: NodeType::Gene,
                target: "hesc".into(),
            },
            RegionChoice::empty_multi(),
        );
        assert_eq!(
            row.name_edit_claim(&CellEdit::SourceName("Pmar1".into())),
            Some(("Pmar1".into(), NodeType::Protein))
        );
        assert_eq!(row.name_edit_claim(&CellEdit::SourceName("  ".into())), None);
    }
}
