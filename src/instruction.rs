//! Build-instruction variants and the region associations that restrict
//! where each directive applies.

use serde::{Deserialize, Serialize};

/// The node kinds a directive endpoint may declare.
///
/// The Simple complexity view, the signal table and (while Simple is the
/// active tier) the lone-node table pin every name to `Gene`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Gene,
    Protein,
    Intercell,
    SmallMolecule,
}

impl NodeType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Gene => "gene",
            Self::Protein => "protein",
            Self::Intercell => "intercellular signal",
            Self::SmallMolecule => "small molecule",
        }
    }
}

/// Link sign as exposed by the Medium and Complex views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    Positive,
    Negative,
    Neutral,
}

impl Sign {
    /// The gene-link-legal subset, or `None` for `Neutral`.
    pub fn polar(self) -> Option<PolarSign> {
        match self {
            Self::Positive => Some(PolarSign::Positive),
            Self::Negative => Some(PolarSign::Negative),
            Self::Neutral => None,
        }
    }
}

/// Sign restricted to the values a gene-to-gene directive may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolarSign {
    Positive,
    Negative,
}

impl From<PolarSign> for Sign {
    fn from(sign: PolarSign) -> Self {
        match sign {
            PolarSign::Positive => Self::Positive,
            PolarSign::Negative => Self::Negative,
        }
    }
}

/// How a mediating factor relays a signal directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    Promote,
    Repress,
    Switch,
}

/// One (source region, target region) restriction. Tags are region
/// abbreviation keys, matched after normalization, never by position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionTuple {
    pub source: String,
    pub target: String,
}

impl RegionTuple {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// A tuple restricting the directive to a single region.
    pub fn intra(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self {
            source: tag.clone(),
            target: tag,
        }
    }

    pub fn is_intra(&self) -> bool {
        normalize_name(&self.source) == normalize_name(&self.target)
    }
}

/// Canonical key for node names and region tags: trimmed, inner
/// whitespace collapsed, lowercased. Every comparison in the engine
/// goes through this.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Identity-defining fields of a directive, excluding id and region
/// association. Two rows sharing a saved id must agree on this; the
/// mismatch detector partitions on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstructionCore {
    /// Gene-to-gene link; both endpoints are implicitly `Gene`.
    GeneSign {
        source: String,
        sign: PolarSign,
        target: String,
    },
    /// Typed link between any two nodes, neutral sign allowed.
    GeneralSign {
        source_type: NodeType,
        source: String,
        sign: Sign,
        target_type: NodeType,
        target: String,
    },
    /// Three-node directive: source acts on target through a mediating
    /// factor.
    Signal {
        source_type: NodeType,
        source: String,
        factor_type: NodeType,
        factor: String,
        target_type: NodeType,
        target: String,
        kind: SignalKind,
    },
    /// Standalone node declaration with no link.
    LoneNode { node_type: NodeType, name: String },
}

impl InstructionCore {
    /// True when every name field is empty. Blank rows are legal
    /// placeholders and are dropped on extraction.
    pub fn is_blank(&self) -> bool {
        self.named_nodes().is_empty()
    }

    /// Every non-empty (name, declared type) endpoint of this core.
    /// Gene-sign endpoints report the implicit `Gene` type.
    pub fn named_nodes(&self) -> Vec<(&str, NodeType)> {
        let mut nodes = Vec::new();
        match self {
            Self::GeneSign { source, target, .. } => {
                for name in [source, target] {
                    if !name.trim().is_empty() {
                        nodes.push((name.as_str(), NodeType::Gene));
                    }
                }
            }
            Self::GeneralSign {
                source_type,
                source,
                target_type,
                target,
                ..
            } => {
                for (name, node_type) in [(source, source_type), (target, target_type)] {
                    if !name.trim().is_empty() {
                        nodes.push((name.as_str(), *node_type));
                    }
                }
            }
            Self::Signal {
                source_type,
                source,
                factor_type,
                factor,
                target_type,
                target,
                ..
            } => {
                for (name, node_type) in [
                    (source, source_type),
                    (factor, factor_type),
                    (target, target_type),
                ] {
                    if !name.trim().is_empty() {
                        nodes.push((name.as_str(), *node_type));
                    }
                }
            }
            Self::LoneNode { node_type, name } => {
                if !name.trim().is_empty() {
                    nodes.push((name.as_str(), *node_type));
                }
            }
        }
        nodes
    }

    /// Whether any endpoint of this core carries the given normalized
    /// name.
    pub fn mentions(&self, normalized: &str) -> bool {
        self.named_nodes()
            .iter()
            .any(|(name, _)| normalize_name(name) == normalized)
    }

    /// Rewrite the declared type of every endpoint whose normalized name
    /// matches. Returns whether anything changed. Gene-sign endpoints
    /// are implicitly typed; retyping them to `Gene` is a no-op and any
    /// other type never reaches them (the owning view refuses it).
    pub fn retype(&mut self, normalized: &str, new_type: NodeType) -> bool {
        let mut changed = false;
        match self {
            Self::GeneSign { .. } => {}
            Self::GeneralSign {
                source_type,
                source,
                target_type,
                target,
                ..
            } => {
                for (name, node_type) in [(&*source, source_type), (&*target, target_type)] {
                    if normalize_name(name) == normalized && *node_type != new_type {
                        *node_type = new_type;
                        changed = true;
                    }
                }
            }
            Self::Signal {
                source_type,
                source,
                factor_type,
                factor,
                target_type,
                target,
                ..
            } => {
                for (name, node_type) in [
                    (&*source, source_type),
                    (&*factor, factor_type),
                    (&*target, target_type),
                ] {
                    if normalize_name(name) == normalized && *node_type != new_type {
                        *node_type = new_type;
                        changed = true;
                    }
                }
            }
            Self::LoneNode { node_type, name } => {
                if normalize_name(name) == normalized && *node_type != new_type {
                    *node_type = new_type;
                    changed = true;
                }
            }
        }
        changed
    }
}

/// A build directive: core fields, persistence id and region
/// association. An empty id marks a row that has never been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub id: String,
    pub core: InstructionCore,
    pub regions: Vec<RegionTuple>,
}

impl Instruction {
    pub fn new(core: InstructionCore) -> Self {
        Self {
            id: String::new(),
            core,
            regions: Vec::new(),
        }
    }

    pub fn with_id(id: impl Into<String>, core: InstructionCore) -> Self {
        Self {
            id: id.into(),
            core,
            regions: Vec::new(),
        }
    }

    pub fn with_regions(mut self, regions: Vec<RegionTuple>) -> Self {
        self.regions = regions;
        self
    }

    pub fn is_new(&self) -> bool {
        self.id.trim().is_empty()
    }
}
