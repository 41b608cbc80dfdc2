//! Detection of divergent edits to rows sharing a saved instruction id.
//! Editing touches only the rows of the current tier; rows in other
//! tables that reference the same saved id are not re-derived, so their
//! core fields can drift apart. The detector surfaces each drifted id
//! as a partition of core variants; resolution is always chosen by the
//! external caller, never here.

use crate::{
    instruction::{Instruction, InstructionCore},
    instruction_rows::RowSlot,
    tier::ViewKind,
};
use serde::{Deserialize, Serialize};

/// Global row identity across the live views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
    pub view: ViewKind,
    pub slot: usize,
}

/// One distinct set of core fields within a mismatch group, tagged with
/// the rows that share it and whether it still agrees with the
/// originally persisted core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreVariant {
    pub core: InstructionCore,
    pub rows: Vec<RowRef>,
    pub matches_original: bool,
}

/// All rows of one saved id whose core fields have diverged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MismatchGroup {
    pub id: String,
    pub variants: Vec<CoreVariant>,
}

/// The two caller-supplied ways out of a mismatch group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchResolution {
    /// Blank the id of every row outside the matches-original variant,
    /// turning them into new, independent instructions on next save.
    Split,
    /// Rewrite every row in the group to the indexed variant's core
    /// fields, keeping each row's own id and region columns.
    Propagate(usize),
}

/// Group every non-blank id across the live views and report those
/// whose rows disagree on core fields. `baseline` is the instruction
/// list as last persisted; it decides `matches_original`.
pub fn detect(
    views: &[(ViewKind, &[RowSlot])],
    baseline: &[Instruction],
) -> Vec<MismatchGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: std::collections::HashMap<String, Vec<(RowRef, InstructionCore)>> =
        std::collections::HashMap::new();
    for (kind, slots) in views {
        for (index, slot) in slots.iter().enumerate() {
            let id = slot.id.trim();
            if id.is_empty() {
                continue;
            }
            let entry = grouped.entry(id.to_string()).or_insert_with(|| {
                order.push(id.to_string());
                Vec::new()
            });
            entry.push((
                RowRef {
                    view: *kind,
                    slot: index,
                },
                slot.core.clone(),
            ));
        }
    }

    let mut groups = Vec::new();
    for id in order {
        let rows = &grouped[&id];
        let mut variants: Vec<CoreVariant> = Vec::new();
        for (row, core) in rows {
            match variants.iter_mut().find(|variant| variant.core == *core) {
                Some(variant) => variant.rows.push(*row),
                None => {
                    let matches_original = baseline
                        .iter()
                        .any(|instruction| instruction.id.trim() == id && instruction.core == *core);
                    variants.push(CoreVariant {
                        core: core.clone(),
                        rows: vec![*row],
                        matches_original,
                    });
                }
            }
        }
        if variants.len() > 1 {
            groups.push(MismatchGroup { id, variants });
        }
    }
    groups
}

impl MismatchGroup {
    /// Rows whose id must be blanked under a split: everything outside
    /// the matches-original variant. When no variant matches the
    /// baseline, the first variant keeps the id and the rest split off.
    pub fn split_targets(&self) -> Vec<RowRef> {
        let keeper = self
            .variants
            .iter()
            .position(|variant| variant.matches_original)
            .unwrap_or(0);
        self.variants
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != keeper)
            .flat_map(|(_, variant)| variant.rows.iter().copied())
            .collect()
    }

    /// Every row of the group, for a propagate rewrite.
    pub fn all_rows(&self) -> Vec<RowRef> {
        self.variants
            .iter()
            .flat_map(|variant| variant.rows.iter().copied())
            .collect()
    }
}
