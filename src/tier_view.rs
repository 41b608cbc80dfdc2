//! One complexity-tier table: its row slots, its show-level filter and
//! the row mapping derived from both. All five view kinds (the three
//! primary tiers plus the orthogonal Signal and Lone-Node tables) share
//! this logic; only the row expansion and the column set differ.

use crate::{
    error::EngineError,
    instruction::{Instruction, InstructionCore, NodeType, PolarSign, RegionTuple, Sign, SignalKind},
    instruction_rows::{CellEdit, RegionChoice, RowSlot},
    region_catalog::RegionCatalog,
    row_mapping::{FilterContext, ShowLevel, compute_mapping},
    tier::{ViewKind, core_for_view},
    type_tracker::TypeTracker,
};
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct TierView {
    kind: ViewKind,
    slots: Vec<RowSlot>,
    mapping: Vec<usize>,
    show_level: ShowLevel,
    pending: Option<(usize, CellEdit)>,
    /// Views that only ever display gene nodes refuse any other type.
    pin_gene: bool,
    tracker: Arc<RwLock<TypeTracker>>,
}

impl TierView {
    pub fn new(kind: ViewKind, tracker: Arc<RwLock<TypeTracker>>) -> Self {
        let pin_gene = matches!(kind, ViewKind::Simple | ViewKind::Signal);
        Self {
            kind,
            slots: Vec::new(),
            mapping: Vec::new(),
            show_level: ShowLevel::All,
            pending: None,
            pin_gene,
            tracker,
        }
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn show_level(&self) -> ShowLevel {
        self.show_level
    }

    pub fn pin_gene(&self) -> bool {
        self.pin_gene
    }

    /// The Lone-Node table pins its names to genes exactly while the
    /// Simple tier is active; the engine flips this on tier changes.
    pub fn set_pin_gene(&mut self, pin: bool) {
        self.pin_gene = pin;
    }

    pub fn slots(&self) -> &[RowSlot] {
        &self.slots
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Result<&mut RowSlot, EngineError> {
        let len = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or_else(|| EngineError::integrity(format!("slot {index} out of range ({len} slots)")))
    }

    pub fn mapping(&self) -> &[usize] {
        &self.mapping
    }

    pub fn visible_row_count(&self) -> usize {
        self.mapping.len()
    }

    pub fn row(&self, visible: usize) -> Result<&RowSlot, EngineError> {
        let slot = self.slot_for_row(visible)?;
        Ok(&self.slots[slot])
    }

    fn slot_for_row(&self, visible: usize) -> Result<usize, EngineError> {
        self.mapping.get(visible).copied().ok_or_else(|| {
            EngineError::integrity(format!(
                "visible row {visible} out of range ({} rows shown)",
                self.mapping.len()
            ))
        })
    }

    fn tracker_write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, TypeTracker>, EngineError> {
        self.tracker
            .write()
            .map_err(|_| EngineError::integrity("node type map lock poisoned"))
    }

    /// Recompute the row mapping for a (possibly new) show level. On
    /// failure the previous level stays in force.
    pub fn set_show_level(
        &mut self,
        level: ShowLevel,
        ctx: &FilterContext,
    ) -> Result<(), EngineError> {
        let mapping = compute_mapping(&self.slots, level, ctx)?;
        self.show_level = level;
        self.mapping = mapping;
        Ok(())
    }

    pub fn recompute_mapping(&mut self, ctx: &FilterContext) -> Result<(), EngineError> {
        self.mapping = compute_mapping(&self.slots, self.show_level, ctx)?;
        Ok(())
    }

    fn blank_core(kind: ViewKind) -> InstructionCore {
        match kind {
            ViewKind::Simple => InstructionCore::GeneSign {
                source: String::new(),
                sign: PolarSign::Positive,
                target: String::new(),
            },
            ViewKind::Medium | ViewKind::Complex => InstructionCore::GeneralSign {
                source_type: NodeType::Gene,
                source: String::new(),
                sign: Sign::Positive,
                target_type: NodeType::Gene,
                target: String::new(),
            },
            ViewKind::Signal => InstructionCore::Signal {
                source_type: NodeType::Gene,
                source: String::new(),
                factor_type: NodeType::Gene,
                factor: String::new(),
                target_type: NodeType::Gene,
                target: String::new(),
                kind: SignalKind::Promote,
            },
            ViewKind::LoneNode => InstructionCore::LoneNode {
                node_type: NodeType::Gene,
                name: String::new(),
            },
        }
    }

    fn blank_regions(kind: ViewKind) -> RegionChoice {
        if kind.uses_region_pairs() {
            RegionChoice::empty_pair()
        } else {
            RegionChoice::empty_multi()
        }
    }

    /// Rebuild the rows from an instruction list. Multi-choice kinds get
    /// one row per instruction; the Complex kind gets one row per region
    /// tuple (all sharing the instruction's id), or a single unrestricted
    /// row when there are no tuples.
    ///
    /// A multi-choice table can only show intra-region restrictions; an
    /// instruction carrying a cross-region tuple is rejected before any
    /// row is touched, so it cannot be silently flattened.
    pub fn populate(
        &mut self,
        instructions: &[Instruction],
        ctx: &FilterContext,
    ) -> Result<(), EngineError> {
        if !self.kind.uses_region_pairs() {
            for instruction in instructions {
                if !self.kind.accepts(&instruction.core) {
                    continue;
                }
                if let Some(tuple) = instruction.regions.iter().find(|tuple| !tuple.is_intra()) {
                    return Err(EngineError::validation(format!(
                        "a {} to {} restriction cannot be shown in a single-region table",
                        tuple.source, tuple.target
                    )));
                }
            }
        }
        self.pending = None;
        self.slots.clear();
        for instruction in instructions {
            if !self.kind.accepts(&instruction.core) {
                continue;
            }
            let core = core_for_view(&instruction.core, self.kind);
            if self.kind.uses_region_pairs() {
                if instruction.regions.is_empty() {
                    self.slots.push(RowSlot::new(
                        instruction.id.clone(),
                        core,
                        RegionChoice::empty_pair(),
                    ));
                } else {
                    for tuple in &instruction.regions {
                        self.slots.push(RowSlot::new(
                            instruction.id.clone(),
                            core.clone(),
                            RegionChoice::Pair {
                                source: Some(tuple.source.clone()),
                                target: Some(tuple.target.clone()),
                            },
                        ));
                    }
                }
            } else {
                let selected = instruction
                    .regions
                    .iter()
                    .map(|tuple| tuple.source.clone())
                    .collect();
                self.slots.push(RowSlot::new(
                    instruction.id.clone(),
                    core,
                    RegionChoice::MultiChoice(selected),
                ));
            }
        }
        self.recompute_mapping(ctx)
    }

    /// Flatten the rows back into an instruction list, dropping fully
    /// blank placeholder rows. Complex rows sharing a saved id and an
    /// identical core merge their region tuples back into one
    /// instruction; divergent cores stay separate rows for the mismatch
    /// detector to report.
    pub fn extract(&self) -> Vec<Instruction> {
        let mut out: Vec<Instruction> = Vec::new();
        let mut merge_target: HashMap<String, usize> = HashMap::new();
        for slot in &self.slots {
            if slot.is_blank() {
                continue;
            }
            let tuples: Vec<RegionTuple> = match &slot.regions {
                RegionChoice::MultiChoice(set) => {
                    set.iter().map(|tag| RegionTuple::intra(tag.clone())).collect()
                }
                RegionChoice::Pair {
                    source: Some(source),
                    target: Some(target),
                } => vec![RegionTuple::new(source.clone(), target.clone())],
                RegionChoice::Pair { .. } => Vec::new(),
            };
            let id = slot.id.trim().to_string();
            if !id.is_empty() {
                if let Some(&index) = merge_target.get(&id) {
                    if out[index].core == slot.core {
                        out[index].regions.extend(tuples);
                        continue;
                    }
                }
            }
            if !id.is_empty() {
                merge_target.entry(id.clone()).or_insert(out.len());
            }
            out.push(Instruction {
                id,
                core: slot.core.clone(),
                regions: tuples,
            });
        }
        for instruction in &mut out {
            instruction.regions = instruction.regions.drain(..).unique().collect();
        }
        out
    }

    /// Reject rows a tier change or commit could not carry over: a named
    /// endpoint with a blank counterpart, a half-selected region pair,
    /// or a node typed differently from the shared type map. Entirely
    /// blank rows are legal placeholders.
    pub fn check_values(&self) -> Result<(), EngineError> {
        let mut tracker = self.tracker_write()?;
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.is_blank() {
                continue;
            }
            let row = index + 1;
            let incomplete = match &slot.core {
                InstructionCore::GeneSign { source, target, .. }
                | InstructionCore::GeneralSign { source, target, .. } => {
                    source.trim().is_empty() || target.trim().is_empty()
                }
                InstructionCore::Signal {
                    source,
                    factor,
                    target,
                    ..
                } => {
                    source.trim().is_empty()
                        || factor.trim().is_empty()
                        || target.trim().is_empty()
                }
                InstructionCore::LoneNode { name, .. } => name.trim().is_empty(),
            };
            if incomplete {
                return Err(EngineError::validation(format!(
                    "row {row}: a named endpoint is missing its counterpart"
                )));
            }
            if let RegionChoice::Pair { source, target } = &slot.regions {
                if source.is_some() != target.is_some() {
                    return Err(EngineError::validation(format!(
                        "row {row}: select both a source and a target region, or neither"
                    )));
                }
            }
            for (name, node_type) in slot.core.named_nodes() {
                if let Some(conflict) = tracker.check_mismatch(name, node_type) {
                    return Err(EngineError::validation(format!(
                        "row {row}: node '{}' is typed {} here but {} elsewhere",
                        conflict.name,
                        conflict.claimed.label(),
                        conflict.known.label()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn add_row(&mut self, ctx: &FilterContext) -> Result<(), EngineError> {
        self.slots.push(RowSlot::new(
            "",
            Self::blank_core(self.kind),
            Self::blank_regions(self.kind),
        ));
        self.recompute_mapping(ctx)
    }

    /// Delete a set of visible rows. The slot indices are resolved
    /// against the current mapping up front, so cascading shifts from
    /// multiple simultaneous deletions cannot skew later removals.
    pub fn delete_rows(&mut self, rows: &[usize], ctx: &FilterContext) -> Result<(), EngineError> {
        let mut targets = Vec::with_capacity(rows.len());
        for &row in rows {
            targets.push(self.slot_for_row(row)?);
        }
        targets.sort_unstable();
        targets.dedup();
        for &slot in targets.iter().rev() {
            self.slots.remove(slot);
        }
        self.recompute_mapping(ctx)
    }

    /// Swap the slots behind two adjacent *visible* rows; with a filter
    /// active these need not be adjacent slots.
    pub fn bump_row(
        &mut self,
        row: usize,
        direction: Direction,
        ctx: &FilterContext,
    ) -> Result<(), EngineError> {
        let neighbor = match direction {
            Direction::Up => row.checked_sub(1),
            Direction::Down => {
                let down = row + 1;
                (down < self.mapping.len()).then_some(down)
            }
        }
        .ok_or_else(|| EngineError::integrity(format!("cannot move row {row} further")))?;
        let a = self.slot_for_row(row)?;
        let b = self.slot_for_row(neighbor)?;
        self.slots.swap(a, b);
        self.recompute_mapping(ctx)
    }

    /// Row moves require exactly one selected row with a neighbor in
    /// the move direction.
    pub fn can_bump(&self, selection: &[usize], direction: Direction) -> bool {
        match selection {
            [row] => match direction {
                Direction::Up => *row > 0 && *row < self.mapping.len(),
                Direction::Down => row + 1 < self.mapping.len(),
            },
            _ => false,
        }
    }

    pub fn can_delete(&self, selection: &[usize]) -> bool {
        !selection.is_empty() && selection.iter().all(|row| *row < self.mapping.len())
    }

    /// Remember an in-progress cell edit; a tier change or commit will
    /// flush it through `flush_pending` first.
    pub fn stage_edit(&mut self, row: usize, edit: CellEdit) {
        self.pending = Some((row, edit));
    }

    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    pub fn flush_pending(&mut self, ctx: &FilterContext) -> Result<(), EngineError> {
        if let Some((row, edit)) = self.pending.take() {
            self.apply_edit(row, edit, ctx)?;
        }
        Ok(())
    }

    /// Apply a typed cell edit to a visible row. Name edits are checked
    /// against the shared type map first; a conflict blocks the edit.
    /// Type edits that need the cross-tier change protocol are routed by
    /// the engine and never reach this directly.
    pub fn apply_edit(
        &mut self,
        row: usize,
        edit: CellEdit,
        ctx: &FilterContext,
    ) -> Result<(), EngineError> {
        let slot = self.slot_for_row(row)?;
        if self.pin_gene {
            let pinned_violation = match &edit {
                CellEdit::SourceType(new) | CellEdit::TargetType(new) | CellEdit::FactorType(new) => {
                    *new != NodeType::Gene
                }
                _ => false,
            };
            if pinned_violation {
                return Err(EngineError::validation(
                    "this table only holds gene nodes; change the type in a higher tier",
                ));
            }
        }
        if let Some((name, claimed)) = self.slots[slot].name_edit_claim(&edit) {
            let mut tracker = self.tracker_write()?;
            if let Some(conflict) = tracker.check_mismatch(&name, claimed) {
                return Err(EngineError::validation(format!(
                    "node '{}' is already typed {}; this column declares {}",
                    conflict.name,
                    conflict.known.label(),
                    conflict.claimed.label()
                )));
            }
        }
        self.slots[slot].apply(edit)?;
        self.recompute_mapping(ctx)
    }

    /// Rewrite the declared type of every row endpoint matching the
    /// normalized name. Returns how many rows changed.
    pub fn broadcast_type(
        &mut self,
        normalized: &str,
        new_type: NodeType,
        ctx: &FilterContext,
    ) -> Result<usize, EngineError> {
        let mut changed = 0;
        for slot in &mut self.slots {
            if slot.core.retype(normalized, new_type) {
                changed += 1;
            }
        }
        self.recompute_mapping(ctx)?;
        Ok(changed)
    }

    /// Whether this view would tolerate the node taking the given type.
    /// Gene-pinned views refuse any other type for names they display.
    pub fn can_change_type(&self, normalized: &str, new_type: NodeType) -> bool {
        !self.pin_gene || new_type == NodeType::Gene || !self.contains_name(normalized)
    }

    pub fn contains_name(&self, normalized: &str) -> bool {
        self.slots.iter().any(|slot| slot.core.mentions(normalized))
    }

    /// Occurrences of the name over every endpoint column of this view.
    pub fn count_name(&self, normalized: &str) -> usize {
        self.slots
            .iter()
            .map(|slot| slot.count_name(normalized))
            .sum()
    }

    /// Region-lifecycle sync: drop selections whose region left the
    /// catalog, keep the rest (matched by tag key), then refilter.
    pub fn remap_regions(
        &mut self,
        catalog: &RegionCatalog,
        ctx: &FilterContext,
    ) -> Result<(), EngineError> {
        for slot in &mut self.slots {
            slot.regions.remap(catalog);
        }
        self.recompute_mapping(ctx)
    }
}
