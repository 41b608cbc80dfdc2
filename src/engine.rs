//! The instruction engine: one shared type map, one region catalog,
//! the active primary tier view plus the always-on Signal and Lone-Node
//! views, and the merge/validate/reconcile pipeline that keeps every
//! projection of the instruction set consistent.
//!
//! Everything is synchronous and single-threaded: a mutation runs to
//! completion before the next event is accepted, so a type-change
//! broadcast or a mismatch resolution is never observable half-applied.

use crate::{
    error::EngineError,
    instruction::{Instruction, NodeType, normalize_name},
    instruction_rows::{CellEdit, RowSlot},
    mismatch::{self, MismatchGroup, MismatchResolution, RowRef},
    region_catalog::RegionCatalog,
    row_mapping::{FilterContext, ShowLevel},
    tier::{self, Tier, ViewKind, core_for_view},
    tier_view::{Direction, TierView},
    type_tracker::TypeTracker,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// External yes/no prompt for a cross-tier node type change. Injected
/// so the engine stays free of any display dependency.
pub trait ConfirmTypeChange {
    fn confirm_type_change(&mut self, name: &str, old: NodeType, new: NodeType) -> bool;
}

/// External choice between the two mismatch resolutions. `None` means
/// the user cancelled; the enclosing commit aborts.
pub trait MismatchResolver {
    fn choose_resolution(&mut self, group: &MismatchGroup) -> Option<MismatchResolution>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// The external confirmation declined a type change; nothing was
    /// modified.
    Declined,
}

/// What `commit` hands to the external apply pipeline. The layout flag
/// is owned by the caller and passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub instructions: Vec<Instruction>,
    pub preserve_layout: bool,
}

#[derive(Debug, Clone)]
pub struct InstructionEngine {
    catalog: RegionCatalog,
    tracker: Arc<RwLock<TypeTracker>>,
    active_tier: Tier,
    // Primary views are built on first use and retained across tier
    // changes; their backing rows are refreshed from the merged list on
    // every activation, never trusted stale.
    simple: Option<TierView>,
    medium: Option<TierView>,
    complex: Option<TierView>,
    signal: TierView,
    lone: TierView,
    /// Instruction list as last persisted by the apply pipeline; the
    /// mismatch detector uses it to tell original cores from drifted
    /// ones.
    baseline: Vec<Instruction>,
    parent: Option<Vec<Instruction>>,
}

impl InstructionEngine {
    pub fn new(
        instructions: Vec<Instruction>,
        catalog: RegionCatalog,
    ) -> Result<Self, EngineError> {
        let mut tracker = TypeTracker::new();
        tracker.init_type_map(
            instructions
                .iter()
                .flat_map(|instruction| instruction.core.named_nodes()),
        )?;
        let tracker = Arc::new(RwLock::new(tracker));
        let active_tier = tier::required_complexity(&instructions);
        let mut engine = Self {
            catalog,
            tracker: tracker.clone(),
            active_tier,
            simple: None,
            medium: None,
            complex: None,
            signal: TierView::new(ViewKind::Signal, tracker.clone()),
            lone: TierView::new(ViewKind::LoneNode, tracker),
            baseline: instructions.clone(),
            parent: None,
        };
        engine.ensure_primary(active_tier);
        let ctx = engine.filter_context();
        engine
            .primary_view_mut(active_tier)?
            .populate(&instructions, &ctx)?;
        engine.signal.populate(&instructions, &ctx)?;
        engine.lone.populate(&instructions, &ctx)?;
        engine.lone.set_pin_gene(active_tier == Tier::Simple);
        Ok(engine)
    }

    pub fn active_tier(&self) -> Tier {
        self.active_tier
    }

    pub fn region_catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    pub fn baseline(&self) -> &[Instruction] {
        &self.baseline
    }

    /// Read access to a constructed view, for rendering.
    pub fn view(&self, kind: ViewKind) -> Result<&TierView, EngineError> {
        match kind {
            ViewKind::Signal => Ok(&self.signal),
            ViewKind::LoneNode => Ok(&self.lone),
            ViewKind::Simple | ViewKind::Medium | ViewKind::Complex => self.primary_view_for(kind),
        }
    }

    fn filter_context(&self) -> FilterContext {
        FilterContext {
            parent: self.parent.clone(),
            catalog: self.catalog.clone(),
        }
    }

    fn tracker_read(&self) -> Result<RwLockReadGuard<'_, TypeTracker>, EngineError> {
        self.tracker
            .read()
            .map_err(|_| EngineError::integrity("node type map lock poisoned"))
    }

    fn tracker_write(&self) -> Result<RwLockWriteGuard<'_, TypeTracker>, EngineError> {
        self.tracker
            .write()
            .map_err(|_| EngineError::integrity("node type map lock poisoned"))
    }

    fn ensure_primary(&mut self, tier: Tier) {
        let tracker = self.tracker.clone();
        let slot = match tier {
            Tier::Simple => &mut self.simple,
            Tier::Medium => &mut self.medium,
            Tier::Complex => &mut self.complex,
        };
        if slot.is_none() {
            *slot = Some(TierView::new(ViewKind::primary(tier), tracker));
        }
    }

    fn primary_view_for(&self, kind: ViewKind) -> Result<&TierView, EngineError> {
        let slot = match kind {
            ViewKind::Simple => &self.simple,
            ViewKind::Medium => &self.medium,
            ViewKind::Complex => &self.complex,
            _ => return Err(EngineError::integrity(format!("{kind:?} is not a primary view"))),
        };
        slot.as_ref()
            .ok_or_else(|| EngineError::integrity(format!("{kind:?} view has not been constructed")))
    }

    fn primary_view(&self, tier: Tier) -> Result<&TierView, EngineError> {
        self.primary_view_for(ViewKind::primary(tier))
    }

    fn primary_view_mut(&mut self, tier: Tier) -> Result<&mut TierView, EngineError> {
        let slot = match tier {
            Tier::Simple => &mut self.simple,
            Tier::Medium => &mut self.medium,
            Tier::Complex => &mut self.complex,
        };
        slot.as_mut().ok_or_else(|| {
            EngineError::integrity(format!(
                "{:?} view has not been constructed",
                ViewKind::primary(tier)
            ))
        })
    }

    /// Mutations only ever address the live views: the active primary
    /// tier plus the two orthogonal tables. A retained inactive view is
    /// stale by definition and must not be edited.
    fn assert_live(&self, kind: ViewKind) -> Result<(), EngineError> {
        if kind.is_primary() && kind != ViewKind::primary(self.active_tier) {
            return Err(EngineError::integrity(format!(
                "{kind:?} is not the active complexity view"
            )));
        }
        Ok(())
    }

    fn view_mut(&mut self, kind: ViewKind) -> Result<&mut TierView, EngineError> {
        self.assert_live(kind)?;
        match kind {
            ViewKind::Signal => Ok(&mut self.signal),
            ViewKind::LoneNode => Ok(&mut self.lone),
            ViewKind::Simple | ViewKind::Medium | ViewKind::Complex => {
                self.primary_view_mut(self.active_tier)
            }
        }
    }

    fn live_view_kinds(&self) -> [ViewKind; 3] {
        [
            ViewKind::primary(self.active_tier),
            ViewKind::Signal,
            ViewKind::LoneNode,
        ]
    }

    fn live_views(&self) -> Result<[&TierView; 3], EngineError> {
        Ok([
            self.primary_view(self.active_tier)?,
            &self.signal,
            &self.lone,
        ])
    }

    fn count_name_live(&self, normalized: &str) -> Result<usize, EngineError> {
        Ok(self
            .live_views()?
            .iter()
            .map(|view| view.count_name(normalized))
            .sum())
    }

    pub fn set_show_level(&mut self, kind: ViewKind, level: ShowLevel) -> Result<(), EngineError> {
        let ctx = self.filter_context();
        self.view_mut(kind)?.set_show_level(level, &ctx)
    }

    pub fn add_row(&mut self, kind: ViewKind) -> Result<(), EngineError> {
        let ctx = self.filter_context();
        self.view_mut(kind)?.add_row(&ctx)
    }

    pub fn delete_rows(&mut self, kind: ViewKind, rows: &[usize]) -> Result<(), EngineError> {
        let ctx = self.filter_context();
        self.view_mut(kind)?.delete_rows(rows, &ctx)
    }

    pub fn bump_row(
        &mut self,
        kind: ViewKind,
        row: usize,
        direction: Direction,
    ) -> Result<(), EngineError> {
        let ctx = self.filter_context();
        self.view_mut(kind)?.bump_row(row, direction, &ctx)
    }

    pub fn stage_edit(&mut self, kind: ViewKind, row: usize, edit: CellEdit) -> Result<(), EngineError> {
        self.view_mut(kind)?.stage_edit(row, edit);
        Ok(())
    }

    /// Apply one cell edit. Type-column edits on a name used elsewhere
    /// run the full cross-tier change protocol: every live table must
    /// permit the new type, the external prompt must confirm it, and
    /// the change is then broadcast to every matching row in one step.
    pub fn edit_cell(
        &mut self,
        kind: ViewKind,
        row: usize,
        edit: CellEdit,
        confirm: &mut dyn ConfirmTypeChange,
    ) -> Result<EditOutcome, EngineError> {
        self.assert_live(kind)?;
        let ctx = self.filter_context();
        if edit.is_type_edit() {
            let target = self.view(kind)?.row(row)?.type_edit_target(&edit);
            if let Some((name, declared, new_type)) = target {
                let normalized = normalize_name(&name);
                let occurrences = self.count_name_live(&normalized)?;
                if occurrences >= 2 {
                    for view in self.live_views()? {
                        if !view.can_change_type(&normalized, new_type) {
                            return Err(EngineError::validation(format!(
                                "node '{name}' also appears in a table that only holds genes"
                            )));
                        }
                    }
                    let old = self.tracker_read()?.lookup(&name).unwrap_or(declared);
                    if old == new_type {
                        // No broadcast needed, but the addressed row must
                        // still catch up in case its column had drifted
                        // from the recorded type.
                        self.view_mut(kind)?.apply_edit(row, edit, &ctx)?;
                        return Ok(EditOutcome::Applied);
                    }
                    if !confirm.confirm_type_change(&name, old, new_type) {
                        debug!(node = %name, "type change declined");
                        return Ok(EditOutcome::Declined);
                    }
                    let mut rewritten = 0;
                    for live in self.live_view_kinds() {
                        rewritten += self
                            .view_mut(live)?
                            .broadcast_type(&normalized, new_type, &ctx)?;
                    }
                    self.tracker_write()?.set_type(&name, new_type);
                    info!(node = %name, rows = rewritten, "type change broadcast");
                    return Ok(EditOutcome::Applied);
                }
                // A name used only here carries no ambiguity.
                self.view_mut(kind)?.apply_edit(row, edit, &ctx)?;
                self.tracker_write()?.set_type(&name, new_type);
                return Ok(EditOutcome::Applied);
            }
        }
        self.view_mut(kind)?.apply_edit(row, edit, &ctx)?;
        Ok(EditOutcome::Applied)
    }

    /// The merged instruction list over all live views, as the apply
    /// pipeline would receive it.
    pub fn merged_instructions(&self) -> Result<Vec<Instruction>, EngineError> {
        let mut merged = self.primary_view(self.active_tier)?.extract();
        merged.extend(self.signal.extract());
        merged.extend(self.lone.extract());
        Ok(merged)
    }

    fn detect_mismatches(&self) -> Result<Vec<MismatchGroup>, EngineError> {
        let primary = self.primary_view(self.active_tier)?;
        let views: [(ViewKind, &[RowSlot]); 3] = [
            (primary.kind(), primary.slots()),
            (ViewKind::Signal, self.signal.slots()),
            (ViewKind::LoneNode, self.lone.slots()),
        ];
        Ok(mismatch::detect(&views, &self.baseline))
    }

    /// Switch the active primary tier. Every step is a local validation
    /// gate; any failure blocks the change and nothing is modified.
    pub fn attempt_tier_change(&mut self, desired: Tier) -> Result<(), EngineError> {
        if desired == self.active_tier {
            return Ok(());
        }
        let ctx = self.filter_context();
        for kind in self.live_view_kinds() {
            self.view_mut(kind)?.flush_pending(&ctx)?;
        }
        for view in self.live_views()? {
            view.check_values()?;
        }
        let merged = self.merged_instructions()?;
        let groups = self.detect_mismatches()?;
        if !groups.is_empty() {
            warn!(groups = groups.len(), "tier change blocked by diverged rows");
            return Err(EngineError::mismatch_unresolved(format!(
                "{} instruction id(s) have diverging rows; resolve them before changing tiers",
                groups.len()
            )));
        }
        let required = tier::required_complexity(&merged);
        if desired < required {
            return Err(EngineError::tier_downgrade(format!(
                "these instructions need the {} tier; {} cannot represent them",
                required.label(),
                desired.label()
            )));
        }
        self.ensure_primary(desired);
        self.primary_view_mut(desired)?.populate(&merged, &ctx)?;
        self.active_tier = desired;
        self.lone.set_pin_gene(desired == Tier::Simple);
        info!(tier = desired.label(), "tier change");
        Ok(())
    }

    /// Region-lifecycle sync: adopt the new catalog, drop selections
    /// whose region is gone, keep the rest matched by tag key, refilter.
    /// Idempotent for an unchanged catalog.
    pub fn regions_changed(&mut self, catalog: RegionCatalog) -> Result<(), EngineError> {
        self.catalog = catalog;
        let ctx = self.filter_context();
        let catalog = self.catalog.clone();
        for kind in self.live_view_kinds() {
            self.view_mut(kind)?.remap_regions(&catalog, &ctx)?;
        }
        debug!(regions = self.catalog.len(), "region catalog remapped");
        Ok(())
    }

    /// Supply or clear the parent instruction list backing the
    /// inherited-rows filter. A view left on that filter without a
    /// parent list falls back to showing all rows.
    pub fn set_parent_instructions(
        &mut self,
        parent: Option<Vec<Instruction>>,
    ) -> Result<(), EngineError> {
        self.parent = parent;
        let ctx = self.filter_context();
        for kind in self.live_view_kinds() {
            let view = self.view_mut(kind)?;
            if view.recompute_mapping(&ctx).is_err() {
                view.set_show_level(ShowLevel::All, &ctx)?;
            }
        }
        Ok(())
    }

    /// Merge every live view, resolve all mismatch groups through the
    /// external resolver, and return the finalized list for the apply
    /// pipeline. Resolutions are gathered for every group before any is
    /// applied, so a cancel leaves the rows untouched.
    pub fn commit(
        &mut self,
        resolver: &mut dyn MismatchResolver,
        preserve_layout: bool,
    ) -> Result<CommitOutcome, EngineError> {
        let ctx = self.filter_context();
        for kind in self.live_view_kinds() {
            self.view_mut(kind)?.flush_pending(&ctx)?;
        }
        for view in self.live_views()? {
            view.check_values()?;
        }
        let groups = self.detect_mismatches()?;
        let mut chosen = Vec::with_capacity(groups.len());
        for group in &groups {
            match resolver.choose_resolution(group) {
                None => {
                    return Err(EngineError::mismatch_unresolved(format!(
                        "no resolution chosen for instruction id '{}'",
                        group.id
                    )));
                }
                Some(MismatchResolution::Propagate(index)) if index >= group.variants.len() => {
                    return Err(EngineError::integrity(format!(
                        "variant index {index} out of range for id '{}'",
                        group.id
                    )));
                }
                Some(resolution) => chosen.push(resolution),
            }
        }
        for (group, resolution) in groups.iter().zip(chosen) {
            self.apply_resolution(group, resolution)?;
        }
        for kind in self.live_view_kinds() {
            self.view_mut(kind)?.recompute_mapping(&ctx)?;
        }
        let instructions = self.merged_instructions()?;
        info!(
            count = instructions.len(),
            resolved = groups.len(),
            "commit"
        );
        Ok(CommitOutcome {
            instructions,
            preserve_layout,
        })
    }

    fn apply_resolution(
        &mut self,
        group: &MismatchGroup,
        resolution: MismatchResolution,
    ) -> Result<(), EngineError> {
        match resolution {
            MismatchResolution::Split => {
                for row in group.split_targets() {
                    self.slot_mut(row)?.id.clear();
                }
            }
            MismatchResolution::Propagate(index) => {
                let core = group
                    .variants
                    .get(index)
                    .ok_or_else(|| {
                        EngineError::integrity(format!(
                            "variant index {index} out of range for id '{}'",
                            group.id
                        ))
                    })?
                    .core
                    .clone();
                for row in group.all_rows() {
                    let converted = core_for_view(&core, row.view);
                    self.slot_mut(row)?.core = converted;
                }
            }
        }
        Ok(())
    }

    fn slot_mut(&mut self, row: RowRef) -> Result<&mut RowSlot, EngineError> {
        self.assert_live(row.view)?;
        match row.view {
            ViewKind::Signal => self.signal.slot_mut(row.slot),
            ViewKind::LoneNode => self.lone.slot_mut(row.slot),
            ViewKind::Simple | ViewKind::Medium | ViewKind::Complex => {
                self.primary_view_mut(self.active_tier)?.slot_mut(row.slot)
            }
        }
    }

    /// The apply pipeline reports back the persisted list, ids now
    /// assigned. Refreshes the baseline and repopulates the live views.
    pub fn mark_applied(&mut self, applied: Vec<Instruction>) -> Result<(), EngineError> {
        {
            let mut tracker = self.tracker_write()?;
            for instruction in &applied {
                for (name, node_type) in instruction.core.named_nodes() {
                    if let Some(conflict) = tracker.check_mismatch(name, node_type) {
                        return Err(EngineError::integrity(format!(
                            "applied list re-types node '{}' from {} to {}",
                            conflict.name,
                            conflict.known.label(),
                            conflict.claimed.label()
                        )));
                    }
                }
            }
        }
        self.baseline = applied;
        let ctx = self.filter_context();
        let baseline = self.baseline.clone();
        self.primary_view_mut(self.active_tier)?
            .populate(&baseline, &ctx)?;
        self.signal.populate(&baseline, &ctx)?;
        self.lone.populate(&baseline, &ctx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{InstructionCore, PolarSign, RegionTuple, Sign};

    struct Confirm {
        reply: bool,
        calls: usize,
    }

    impl Confirm {
        fn yes() -> Self {
            Self {
                reply: true,
                calls: 0,
            }
        }

        fn no() -> Self {
            Self {
                reply: false,
                calls: 0,
            }
        }
    }

    impl ConfirmTypeChange for Confirm {
        fn confirm_type_change(&mut self, _name: &str, _old: NodeType, _new: NodeType) -> bool {
            self.calls += 1;
            self.reply
        }
    }

    struct Choose(Option<MismatchResolution>);

    impl MismatchResolver for Choose {
        fn choose_resolution(&mut self, _group: &MismatchGroup) -> Option<MismatchResolution> {
            self.0
        }
    }

    fn gene(id: &str, source: &str, sign: PolarSign, target: &str) -> Instruction {
        Instruction::with_id(
            id,
            InstructionCore::GeneSign {
                source: source.into(),
                sign,
                target: target.into(),
            },
        )
    }

    fn general(id: &str, source_type: NodeType, source: &str, sign: Sign, target: &str) -> Instruction {
        Instruction::with_id(
            id,
            InstructionCore::GeneralSign {
                source_type,
                source: source.into(),
                sign,
                target_type: NodeType::Gene,
                target: target.into(),
            },
        )
    }

    fn catalog() -> RegionCatalog {
        RegionCatalog::from_tags(["Endo", "Ecto", "Meso"])
    }

    #[test]
    fn test_simple_set_upgrades_to_medium_without_loss() {
        // Scenario: [("A", "+", "B", id = "1")] classified Simple.
        let instructions = vec![gene("1", "A", PolarSign::Positive, "B")];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        assert_eq!(engine.active_tier(), Tier::Simple);
        engine.attempt_tier_change(Tier::Medium).unwrap();
        let view = engine.view(ViewKind::Medium).unwrap();
        assert_eq!(view.slots().len(), 1);
        match &view.slots()[0].core {
            InstructionCore::GeneralSign {
                source_type,
                sign,
                target_type,
                ..
            } => {
                assert_eq!(*source_type, NodeType::Gene);
                assert_eq!(*sign, Sign::Positive);
                assert_eq!(*target_type, NodeType::Gene);
            }
            other => panic!("expected a typed link, got {other:?}"),
        }
    }

    #[test]
    fn test_round_trip_simple_medium_simple() {
        let original = vec![
            gene("1", "otx", PolarSign::Positive, "gcm")
                .with_regions(vec![RegionTuple::intra("Endo")]),
            gene("2", "gcm", PolarSign::Negative, "hesc"),
        ];
        let mut engine = InstructionEngine::new(original.clone(), catalog()).unwrap();
        engine.attempt_tier_change(Tier::Medium).unwrap();
        engine.attempt_tier_change(Tier::Simple).unwrap();
        assert_eq!(engine.merged_instructions().unwrap(), original);
    }

    #[test]
    fn test_downgrade_from_complex_is_refused() {
        // Scenario: one inter-region tuple forces the Complex tier.
        let instructions = vec![
            general("1", NodeType::Gene, "a", Sign::Positive, "b")
                .with_regions(vec![RegionTuple::new("Endo", "Ecto")]),
        ];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        assert_eq!(engine.active_tier(), Tier::Complex);
        for desired in [Tier::Simple, Tier::Medium] {
            let err = engine.attempt_tier_change(desired).unwrap_err();
            assert_eq!(err.code, crate::error::ErrorCode::TierDowngrade);
            assert_eq!(engine.active_tier(), Tier::Complex);
        }
    }

    #[test]
    fn test_type_broadcast_across_tiers() {
        // "wnt8" occurs in three rows over two live tables; the change
        // must land in all of them atomically.
        let instructions = vec![
            general("1", NodeType::Gene, "wnt8", Sign::Neutral, "blimp1"),
            general("2", NodeType::Gene, "otx", Sign::Positive, "wnt8"),
            Instruction::with_id(
                "3",
                InstructionCore::LoneNode {
                    node_type: NodeType::Gene,
                    name: "wnt8".into(),
                },
            ),
        ];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        assert_eq!(engine.active_tier(), Tier::Medium);
        let mut confirm = Confirm::yes();
        let outcome = engine
            .edit_cell(
                ViewKind::Medium,
                0,
                CellEdit::SourceType(NodeType::Intercell),
                &mut confirm,
            )
            .unwrap();
        assert_eq!(outcome, EditOutcome::Applied);
        assert_eq!(confirm.calls, 1);
        let medium = engine.view(ViewKind::Medium).unwrap();
        match &medium.slots()[0].core {
            InstructionCore::GeneralSign { source_type, .. } => {
                assert_eq!(*source_type, NodeType::Intercell)
            }
            _ => unreachable!(),
        }
        match &medium.slots()[1].core {
            InstructionCore::GeneralSign { target_type, .. } => {
                assert_eq!(*target_type, NodeType::Intercell)
            }
            _ => unreachable!(),
        }
        match &engine.view(ViewKind::LoneNode).unwrap().slots()[0].core {
            InstructionCore::LoneNode { node_type, .. } => {
                assert_eq!(*node_type, NodeType::Intercell)
            }
            _ => unreachable!(),
        }

        // Re-applying the same change is a no-op and asks no questions.
        let before = engine.merged_instructions().unwrap();
        let outcome = engine
            .edit_cell(
                ViewKind::Medium,
                0,
                CellEdit::SourceType(NodeType::Intercell),
                &mut confirm,
            )
            .unwrap();
        assert_eq!(outcome, EditOutcome::Applied);
        assert_eq!(confirm.calls, 1);
        assert_eq!(engine.merged_instructions().unwrap(), before);
    }

    #[test]
    fn test_declined_type_change_leaves_state_untouched() {
        let instructions = vec![
            general("1", NodeType::Gene, "wnt8", Sign::Neutral, "blimp1"),
            general("2", NodeType::Gene, "wnt8", Sign::Positive, "gcm"),
        ];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        let before = engine.merged_instructions().unwrap();
        let mut confirm = Confirm::no();
        let outcome = engine
            .edit_cell(
                ViewKind::Medium,
                0,
                CellEdit::SourceType(NodeType::Protein),
                &mut confirm,
            )
            .unwrap();
        assert_eq!(outcome, EditOutcome::Declined);
        assert_eq!(confirm.calls, 1);
        assert_eq!(engine.merged_instructions().unwrap(), before);
    }

    #[test]
    fn test_pinned_table_blocks_shared_type_change() {
        // "delta" also sits in the signal table, which holds genes only.
        let instructions = vec![
            general("1", NodeType::Gene, "delta", Sign::Neutral, "gcm"),
            Instruction::with_id(
                "2",
                InstructionCore::Signal {
                    source_type: NodeType::Gene,
                    source: "delta".into(),
                    factor_type: NodeType::Gene,
                    factor: "su(h)".into(),
                    target_type: NodeType::Gene,
                    target: "gcm".into(),
                    kind: crate::instruction::SignalKind::Promote,
                },
            ),
        ];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        let mut confirm = Confirm::yes();
        let err = engine
            .edit_cell(
                ViewKind::Medium,
                0,
                CellEdit::SourceType(NodeType::Intercell),
                &mut confirm,
            )
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Validation);
        assert_eq!(confirm.calls, 0);
    }

    #[test]
    fn test_signal_with_cross_region_restriction_is_rejected() {
        // A signal directive only renders in the single-region table, so
        // a cross-region restriction on it has no representation and must
        // be refused instead of silently dropped.
        let instructions = vec![Instruction::with_id(
            "1",
            InstructionCore::Signal {
                source_type: NodeType::Gene,
                source: "wnt8".into(),
                factor_type: NodeType::Gene,
                factor: "su(h)".into(),
                target_type: NodeType::Gene,
                target: "gcm".into(),
                kind: crate::instruction::SignalKind::Promote,
            },
        )
        .with_regions(vec![RegionTuple::new("Endo", "Ecto")])];
        let err = InstructionEngine::new(instructions, catalog()).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Validation);
    }

    #[test]
    fn test_type_edit_realigns_drifted_row() {
        let instructions = vec![
            general("1", NodeType::Gene, "wnt8", Sign::Neutral, "blimp1"),
            general("2", NodeType::Gene, "otx", Sign::Positive, "wnt8"),
        ];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        // Force the recorded type ahead of the rows' columns.
        engine
            .tracker
            .write()
            .unwrap()
            .set_type("wnt8", NodeType::Intercell);
        let mut confirm = Confirm::yes();
        let outcome = engine
            .edit_cell(
                ViewKind::Medium,
                0,
                CellEdit::SourceType(NodeType::Intercell),
                &mut confirm,
            )
            .unwrap();
        assert_eq!(outcome, EditOutcome::Applied);
        // The recorded type already matched, so no prompt; the addressed
        // row still picks up the change.
        assert_eq!(confirm.calls, 0);
        match &engine.view(ViewKind::Medium).unwrap().slots()[0].core {
            InstructionCore::GeneralSign { source_type, .. } => {
                assert_eq!(*source_type, NodeType::Intercell)
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_commit_cancel_blocks() {
        let instructions = vec![
            gene("1", "otx", PolarSign::Positive, "gcm"),
            gene("1", "otx", PolarSign::Negative, "gcm"),
        ];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        let err = engine.commit(&mut Choose(None), false).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::MismatchUnresolved);
    }

    #[test]
    fn test_commit_split_blanks_diverged_ids() {
        let baseline_core = gene("1", "otx", PolarSign::Positive, "gcm");
        let instructions = vec![
            baseline_core.clone(),
            gene("1", "otx", PolarSign::Negative, "gcm"),
        ];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        let outcome = engine
            .commit(&mut Choose(Some(MismatchResolution::Split)), true)
            .unwrap();
        assert!(outcome.preserve_layout);
        assert_eq!(outcome.instructions.len(), 2);
        // The row matching the baseline keeps its id; the diverged one
        // becomes new. Field values are untouched by a split.
        let ids: Vec<&str> = outcome
            .instructions
            .iter()
            .map(|instruction| instruction.id.as_str())
            .collect();
        assert!(ids.contains(&"1"));
        assert!(ids.contains(&""));
    }

    #[test]
    fn test_commit_propagate_rewrites_and_merges() {
        let instructions = vec![
            gene("1", "otx", PolarSign::Positive, "gcm")
                .with_regions(vec![RegionTuple::intra("Endo")]),
            gene("1", "otx", PolarSign::Negative, "gcm")
                .with_regions(vec![RegionTuple::intra("Meso")]),
        ];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        let outcome = engine
            .commit(&mut Choose(Some(MismatchResolution::Propagate(1))), false)
            .unwrap();
        // Both rows now share the '-' core, so they merge back into one
        // instruction carrying both region restrictions.
        assert_eq!(outcome.instructions.len(), 1);
        let merged = &outcome.instructions[0];
        assert_eq!(merged.id, "1");
        match &merged.core {
            InstructionCore::GeneSign { sign, .. } => assert_eq!(*sign, PolarSign::Negative),
            _ => unreachable!(),
        }
        assert_eq!(
            merged.regions,
            vec![RegionTuple::intra("Endo"), RegionTuple::intra("Meso")]
        );
    }

    #[test]
    fn test_tier_change_blocked_by_diverged_rows() {
        let instructions = vec![
            gene("1", "otx", PolarSign::Positive, "gcm"),
            gene("1", "otx", PolarSign::Negative, "gcm"),
        ];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        let err = engine.attempt_tier_change(Tier::Medium).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::MismatchUnresolved);
        assert_eq!(engine.active_tier(), Tier::Simple);
    }

    #[test]
    fn test_new_only_filter() {
        let mut engine = InstructionEngine::new(
            vec![
                gene("1", "a", PolarSign::Positive, "b"),
                gene("2", "c", PolarSign::Positive, "d"),
            ],
            catalog(),
        )
        .unwrap();
        engine.add_row(ViewKind::Simple).unwrap();
        engine
            .set_show_level(ViewKind::Simple, ShowLevel::NewOnly)
            .unwrap();
        let view = engine.view(ViewKind::Simple).unwrap();
        assert_eq!(view.mapping(), &[2]);
    }

    #[test]
    fn test_inherited_filter_needs_parent() {
        let mut engine =
            InstructionEngine::new(vec![gene("1", "a", PolarSign::Positive, "b")], catalog())
                .unwrap();
        let err = engine
            .set_show_level(ViewKind::Simple, ShowLevel::InheritedFromParent)
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Validation);

        let parent = vec![gene("1", "a", PolarSign::Positive, "b")
            .with_regions(vec![RegionTuple::intra("Endo")])];
        engine.set_parent_instructions(Some(parent)).unwrap();
        engine
            .set_show_level(ViewKind::Simple, ShowLevel::InheritedFromParent)
            .unwrap();
        assert_eq!(engine.view(ViewKind::Simple).unwrap().mapping(), &[0]);
    }

    #[test]
    fn test_region_remap_is_idempotent() {
        let instructions = vec![
            gene("1", "a", PolarSign::Positive, "b")
                .with_regions(vec![RegionTuple::intra("Endo"), RegionTuple::intra("Meso")]),
        ];
        let mut engine = InstructionEngine::new(instructions, catalog()).unwrap();
        let shrunk = RegionCatalog::from_tags(["Endo"]);
        engine.regions_changed(shrunk.clone()).unwrap();
        let once = engine.merged_instructions().unwrap();
        engine.regions_changed(shrunk).unwrap();
        assert_eq!(engine.merged_instructions().unwrap(), once);
        assert_eq!(once[0].regions, vec![RegionTuple::intra("Endo")]);
    }

    #[test]
    fn test_editing_inactive_view_is_fatal() {
        let mut engine =
            InstructionEngine::new(vec![gene("1", "a", PolarSign::Positive, "b")], catalog())
                .unwrap();
        engine.attempt_tier_change(Tier::Medium).unwrap();
        // The Simple view is retained but stale; edits must not land in it.
        let err = engine.add_row(ViewKind::Simple).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_mark_applied_refreshes_baseline() {
        let mut engine = InstructionEngine::new(Vec::new(), catalog()).unwrap();
        engine.add_row(ViewKind::Simple).unwrap();
        let mut confirm = Confirm::yes();
        engine
            .edit_cell(
                ViewKind::Simple,
                0,
                CellEdit::SourceName("otx".into()),
                &mut confirm,
            )
            .unwrap();
        engine
            .edit_cell(
                ViewKind::Simple,
                0,
                CellEdit::TargetName("gcm".into()),
                &mut confirm,
            )
            .unwrap();
        let outcome = engine.commit(&mut Choose(None), false).unwrap();
        assert_eq!(outcome.instructions.len(), 1);
        assert!(outcome.instructions[0].is_new());

        // The pipeline assigns an id and reports back.
        let mut applied = outcome.instructions;
        applied[0].id = "42".into();
        engine.mark_applied(applied.clone()).unwrap();
        assert_eq!(engine.baseline(), &applied[..]);
        assert_eq!(engine.merged_instructions().unwrap(), applied);
    }
}
