//! Complexity tiers, the classifier that computes the minimum tier an
//! instruction requires, and the core conversions used when a tier view
//! is populated.

use crate::instruction::{Instruction, InstructionCore, NodeType, Sign};
use serde::{Deserialize, Serialize};

/// Primary complexity levels, ordered by representational power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Simple,
    Medium,
    Complex,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

/// The five table views. `Signal` and `LoneNode` are orthogonal and
/// always live alongside whichever primary tier is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewKind {
    Simple,
    Medium,
    Complex,
    Signal,
    LoneNode,
}

impl ViewKind {
    pub fn primary(tier: Tier) -> Self {
        match tier {
            Tier::Simple => Self::Simple,
            Tier::Medium => Self::Medium,
            Tier::Complex => Self::Complex,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Simple | Self::Medium | Self::Complex)
    }

    /// Complex rows carry single-choice source/target region columns;
    /// every other kind uses a multi-choice intra-region set.
    pub fn uses_region_pairs(&self) -> bool {
        matches!(self, Self::Complex)
    }

    /// Which instruction cores this view displays.
    pub fn accepts(&self, core: &InstructionCore) -> bool {
        match self {
            Self::Simple | Self::Medium | Self::Complex => matches!(
                core,
                InstructionCore::GeneSign { .. } | InstructionCore::GeneralSign { .. }
            ),
            Self::Signal => matches!(core, InstructionCore::Signal { .. }),
            Self::LoneNode => matches!(core, InstructionCore::LoneNode { .. }),
        }
    }
}

/// Minimum tier able to represent one instruction. Signal and lone-node
/// directives live in their own orthogonal views and never block a
/// primary-tier transition.
pub fn classify(instruction: &Instruction) -> Tier {
    let all_intra = instruction.regions.iter().all(|tuple| tuple.is_intra());
    match &instruction.core {
        InstructionCore::Signal { .. } | InstructionCore::LoneNode { .. } => Tier::Simple,
        InstructionCore::GeneSign { .. } => {
            // Inter-region tuples on a gene link violate its tier
            // invariant; classify them honestly rather than hide them.
            if all_intra { Tier::Simple } else { Tier::Complex }
        }
        InstructionCore::GeneralSign {
            source_type,
            sign,
            target_type,
            ..
        } => {
            if !all_intra {
                Tier::Complex
            } else if *source_type == NodeType::Gene
                && *target_type == NodeType::Gene
                && *sign != Sign::Neutral
            {
                Tier::Simple
            } else {
                Tier::Medium
            }
        }
    }
}

/// Maximum classification over a set; `Simple` when empty.
pub fn required_complexity(set: &[Instruction]) -> Tier {
    set.iter().map(classify).max().unwrap_or(Tier::Simple)
}

/// Convert a core to the representation a view kind displays. Gene
/// links widen to typed links for the Medium and Complex views; a
/// Simple-representable typed link narrows back to a gene link for the
/// Simple view. Anything else passes through unchanged.
pub fn core_for_view(core: &InstructionCore, kind: ViewKind) -> InstructionCore {
    match (kind, core) {
        (
            ViewKind::Simple,
            InstructionCore::GeneralSign {
                source_type: NodeType::Gene,
                source,
                sign,
                target_type: NodeType::Gene,
                target,
            },
        ) => match sign.polar() {
            Some(polar) => InstructionCore::GeneSign {
                source: source.clone(),
                sign: polar,
                target: target.clone(),
            },
            None => core.clone(),
        },
        (
            ViewKind::Medium | ViewKind::Complex,
            InstructionCore::GeneSign {
                source,
                sign,
                target,
            },
        ) => InstructionCore::GeneralSign {
            source_type: NodeType::Gene,
            source: source.clone(),
            sign: (*sign).into(),
            target_type: NodeType::Gene,
            target: target.clone(),
        },
        _ => core.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{PolarSign, RegionTuple, SignalKind};

    fn general(
        source_type: NodeType,
        sign: Sign,
        target_type: NodeType,
        regions: Vec<RegionTuple>,
    ) -> Instruction {
        Instruction::new(InstructionCore::GeneralSign {
            source_type,
            source: "a".into(),
            sign,
            target_type,
            target: "b".into(),
        })
        .with_regions(regions)
    }

    #[test]
    fn test_gene_gene_polar_intra_is_simple() {
        let instruction = general(
            NodeType::Gene,
            Sign::Positive,
            NodeType::Gene,
            vec![RegionTuple::intra("Endo")],
        );
        assert_eq!(classify(&instruction), Tier::Simple);
    }

    #[test]
    fn test_neutral_or_typed_is_medium() {
        let neutral = general(NodeType::Gene, Sign::Neutral, NodeType::Gene, vec![]);
        assert_eq!(classify(&neutral), Tier::Medium);
        let typed = general(NodeType::Protein, Sign::Positive, NodeType::Gene, vec![]);
        assert_eq!(classify(&typed), Tier::Medium);
    }

    #[test]
    fn test_inter_region_is_complex() {
        // Scenario: one (RegionX, RegionY) tuple with RegionX != RegionY.
        let instruction = general(
            NodeType::Gene,
            Sign::Positive,
            NodeType::Gene,
            vec![RegionTuple::new("RegionX", "RegionY")],
        );
        assert_eq!(classify(&instruction), Tier::Complex);
    }

    #[test]
    fn test_orthogonal_kinds_never_block() {
        let signal = Instruction::new(InstructionCore::Signal {
            source_type: NodeType::Gene,
            source: "wnt8".into(),
            factor_type: NodeType::Intercell,
            factor: "delta".into(),
            target_type: NodeType::Gene,
            target: "gcm".into(),
            kind: SignalKind::Switch,
        })
        .with_regions(vec![RegionTuple::new("RegionX", "RegionY")]);
        assert_eq!(classify(&signal), Tier::Simple);
    }

    #[test]
    fn test_required_complexity_defaults_simple() {
        assert_eq!(required_complexity(&[]), Tier::Simple);
        let set = vec![
            general(NodeType::Gene, Sign::Positive, NodeType::Gene, vec![]),
            general(NodeType::Protein, Sign::Neutral, NodeType::Gene, vec![]),
        ];
        assert_eq!(required_complexity(&set), Tier::Medium);
    }

    #[test]
    fn test_core_conversion_round_trip() {
        let gene = InstructionCore::GeneSign {
            source: "otx".into(),
            sign: PolarSign::Negative,
            target: "gcm".into(),
        };
        let widened = core_for_view(&gene, ViewKind::Medium);
        assert!(matches!(
            widened,
            InstructionCore::GeneralSign {
                source_type: NodeType::Gene,
                sign: Sign::Negative,
                target_type: NodeType::Gene,
                ..
            }
        ));
        assert_eq!(core_for_view(&widened, ViewKind::Simple), gene);
    }

    #[test]
    fn test_neutral_does_not_narrow() {
        let neutral = InstructionCore::GeneralSign {
            source_type: NodeType::Gene,
            source: "a".into(),
            sign: Sign::Neutral,
            target_type: NodeType::Gene,
            target: "b".into(),
        };
        assert_eq!(core_for_view(&neutral, ViewKind::Simple), neutral);
    }
}
