//! Single source of truth for node types during an editing session.
//! Every tier view consults this map before accepting a name or type
//! change; entries live for the whole session and are never implicitly
//! deleted, even when the last row naming a node goes away.

use crate::{
    error::EngineError,
    instruction::{NodeType, normalize_name},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A detected disagreement between the recorded type of a node and a
/// newly claimed one. Detection never mutates the map; the caller
/// decides whether to block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeConflict {
    pub name: String,
    pub known: NodeType,
    pub claimed: NodeType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeTracker {
    types: HashMap<String, NodeType>,
}

impl TypeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the map from a batch of (name, type) declarations. Two
    /// different types for the same normalized name within one batch is
    /// a data-integrity error, not user input, and is fatal.
    pub fn init_type_map<'a, I>(&mut self, batch: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = (&'a str, NodeType)>,
    {
        let mut fresh: HashMap<String, NodeType> = HashMap::new();
        for (name, node_type) in batch {
            let key = normalize_name(name);
            if key.is_empty() {
                continue;
            }
            match fresh.get(&key) {
                Some(known) if *known != node_type => {
                    return Err(EngineError::integrity(format!(
                        "conflicting type declarations for node '{}': {} vs {}",
                        name,
                        known.label(),
                        node_type.label()
                    )));
                }
                _ => {
                    fresh.insert(key, node_type);
                }
            }
        }
        self.types = fresh;
        Ok(())
    }

    /// Record an unseen name, or report a disagreement without mutating.
    pub fn check_mismatch(&mut self, name: &str, claimed: NodeType) -> Option<TypeConflict> {
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }
        match self.types.get(&key) {
            Some(known) if *known != claimed => Some(TypeConflict {
                name: name.trim().to_string(),
                known: *known,
                claimed,
            }),
            Some(_) => None,
            None => {
                self.types.insert(key, claimed);
                None
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<NodeType> {
        self.types.get(&normalize_name(name)).copied()
    }

    /// Overwrite the recorded type; used by the all-tiers type-change
    /// broadcast after the change has been confirmed.
    pub fn set_type(&mut self, name: &str, node_type: NodeType) {
        let key = normalize_name(name);
        if !key.is_empty() {
            self.types.insert(key, node_type);
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
