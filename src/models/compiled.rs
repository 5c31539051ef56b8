//! Intermediate and compiled condition structures

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{AlertConfig, Group, GroupId, Relation, RuleId, Trigger};

// ============================================================================
// Compilation intermediates
// ============================================================================

/// Item carried by a flattened tree node
#[derive(Debug, Clone, PartialEq)]
pub enum FlatItem {
    Group(Group),
    Trigger(Trigger),
}

/// One node of the pre-order, level-annotated tree walk
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedNode {
    pub item: FlatItem,
    /// Depth below the root (root is level 0)
    pub level: usize,
}

impl FlattenedNode {
    pub fn is_group(&self) -> bool {
        matches!(self.item, FlatItem::Group(_))
    }
}

/// Node of the nested condition tree
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionNode {
    /// Relation joining this node to its siblings (the owning group's relation)
    pub joined_by: Relation,
    pub item: ConditionItem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionItem {
    Trigger(Trigger),
    Group {
        id: GroupId,
        /// Relation joining this group's children
        relation: Relation,
        children: Vec<ConditionNode>,
    },
}

// ============================================================================
// Compiled form
// ============================================================================

/// Member of a chunk: a leaf or a nested chunk sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMember {
    Trigger(Trigger),
    Group(Vec<Chunk>),
}

/// OR-set of members; a chunk sequence is the AND of its chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChunk")]
pub struct Chunk {
    members: Vec<ChunkMember>,
}

#[derive(Deserialize)]
struct RawChunk {
    members: Vec<ChunkMember>,
}

impl TryFrom<RawChunk> for Chunk {
    type Error = String;

    fn try_from(raw: RawChunk) -> Result<Self, Self::Error> {
        if raw.members.is_empty() {
            return Err("chunk must have at least one member".to_string());
        }
        Ok(Self {
            members: raw.members,
        })
    }
}

impl Chunk {
    /// Open a chunk with its first member
    pub fn new(first: ChunkMember) -> Self {
        Self {
            members: vec![first],
        }
    }

    pub fn push(&mut self, member: ChunkMember) {
        self.members.push(member);
    }

    pub fn members(&self) -> &[ChunkMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false; a chunk is created with one member and only grows
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A rule ready for evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledRule {
    pub id: RuleId,
    pub chunks: Vec<Chunk>,
    pub alerts: Vec<AlertConfig>,
}

/// All active compiled rules, keyed by rule id
pub type CompiledRuleMap = BTreeMap<RuleId, CompiledRule>;
