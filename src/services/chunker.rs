//! Chunking of condition trees into AND-of-OR form
//!
//! Siblings joined by `and` each start a new chunk; siblings joined by `or` are
//! appended to the chunk that is currently open. Nested groups are chunked the
//! same way, so a chunk member is either a trigger or another chunk sequence.

use crate::models::{Chunk, ChunkMember, ConditionItem, ConditionNode, Relation};

/// Turn an ordered list of siblings into a chunk sequence
///
/// The first sibling always opens the first chunk, whatever its relation.
pub fn generate_group_chunks(children: Vec<ConditionNode>) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();

    for node in children {
        let member = match node.item {
            ConditionItem::Trigger(trigger) => ChunkMember::Trigger(trigger),
            ConditionItem::Group { children, .. } => {
                ChunkMember::Group(generate_group_chunks(children))
            }
        };

        match (node.joined_by, chunks.last_mut()) {
            (Relation::Or, Some(open)) => open.push(member),
            _ => chunks.push(Chunk::new(member)),
        }
    }

    chunks
}
