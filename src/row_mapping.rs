//! Visible-row to underlying-slot index translation. The mapping is
//! never patched incrementally: every mutation recomputes it from
//! scratch through `compute_mapping`, so a stale mapping cannot exist
//! outside a mutating call.

use crate::{
    error::EngineError,
    instruction::Instruction,
    instruction_rows::RowSlot,
    region_catalog::RegionCatalog,
};
use serde::{Deserialize, Serialize};

/// Per-view row-visibility filter, independent of the complexity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShowLevel {
    All,
    SelectedOnly,
    NewOnly,
    InheritedFromParent,
}

/// External state the filter predicates need: the optional parent
/// instruction list and the current region catalog.
#[derive(Debug, Clone, Default)]
pub struct FilterContext {
    pub parent: Option<Vec<Instruction>>,
    pub catalog: RegionCatalog,
}

/// A parent instruction can be inherited when at least one of its
/// region tuples has both tags present in the child's catalog.
pub fn is_inheritable(parent: &Instruction, catalog: &RegionCatalog) -> bool {
    parent
        .regions
        .iter()
        .any(|tuple| catalog.contains_tag(&tuple.source) && catalog.contains_tag(&tuple.target))
}

/// Build the dense visible-row → slot-index list for one view.
pub fn compute_mapping(
    slots: &[RowSlot],
    level: ShowLevel,
    ctx: &FilterContext,
) -> Result<Vec<usize>, EngineError> {
    match level {
        ShowLevel::All => Ok((0..slots.len()).collect()),
        ShowLevel::NewOnly => Ok(indices_where(slots, |slot| slot.is_new())),
        ShowLevel::SelectedOnly => Ok(indices_where(slots, |slot| slot.regions.has_selection())),
        ShowLevel::InheritedFromParent => {
            let parent = ctx.parent.as_deref().ok_or_else(|| {
                EngineError::validation(
                    "cannot filter by inheritance: no parent instruction list available",
                )
            })?;
            Ok(indices_where(slots, |slot| {
                !slot.is_new()
                    && parent.iter().any(|instruction| {
                        instruction.id.trim() == slot.id.trim()
                            && is_inheritable(instruction, &ctx.catalog)
                    })
            }))
        }
    }
}

fn indices_where(slots: &[RowSlot], predicate: impl Fn(&RowSlot) -> bool) -> Vec<usize> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| predicate(slot))
        .map(|(index, _)| index)
        .collect()
}
