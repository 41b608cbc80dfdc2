//! Consistency engine for tabular editing of gene and signaling network
//! build directives. Five table views project one instruction set at
//! three complexity tiers; this crate keeps the projections, the shared
//! node type map and the region catalog in agreement while the
//! embedding application owns rendering and persistence.

pub mod engine;
pub mod error;
pub mod instruction;
pub mod instruction_rows;
pub mod mismatch;
pub mod region_catalog;
pub mod row_mapping;
pub mod tier;
pub mod tier_view;
pub mod type_tracker;
