//! Condition tree construction
//!
//! Storage keeps a rule's conditions flat: triggers point at their owning group
//! and groups point at their parent. Building the nested tree happens in two
//! passes. [`generate_flattened_tree`] walks the triggers once and emits a
//! pre-order sequence of groups and triggers annotated with their depth, opening
//! and closing groups as it goes. [`generate_tree`] then folds that sequence back
//! into nested [`ConditionNode`]s.

use std::collections::{HashMap, HashSet};

use crate::models::{
    ConditionItem, ConditionNode, FlatItem, FlattenedNode, Group, GroupId, Relation, Trigger,
    ROOT_GROUP,
};
use crate::utils::CompileError;

/// Groups of one rule indexed by id
pub type GroupIndex = HashMap<GroupId, Group>;

/// Index a rule's groups by id, seeding the root group when it is missing
pub fn index_groups(groups: &[Group]) -> GroupIndex {
    let mut index: GroupIndex = groups.iter().map(|g| (g.id, g.clone())).collect();
    index.entry(ROOT_GROUP).or_insert_with(Group::root);
    index
}

/// Ancestor chain from the root down to `group_id`, both inclusive
///
/// A non-root group without a parent is treated as a direct child of the root.
pub fn generate_group_chain(
    groups: &GroupIndex,
    group_id: GroupId,
) -> Result<Vec<GroupId>, CompileError> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = group_id;

    loop {
        let group = groups
            .get(&current)
            .ok_or(CompileError::UnknownGroup { group: current })?;

        if !seen.insert(current) {
            return Err(CompileError::GroupCycle { group: group_id });
        }
        chain.push(current);

        if current == ROOT_GROUP {
            break;
        }
        current = group.parent.unwrap_or(ROOT_GROUP);
    }

    chain.reverse();
    Ok(chain)
}

/// Pre-order, level-annotated walk over the whole condition tree
///
/// Triggers are first reordered so that the triggers of any group subtree are
/// contiguous (see [`order_triggers`]); after that the walk keeps the chain of
/// currently open groups and, for each trigger whose group is not the one on
/// top, pops back to the deepest common ancestor and opens the missing groups.
pub fn generate_flattened_tree(
    triggers: &[Trigger],
    groups: &GroupIndex,
) -> Result<Vec<FlattenedNode>, CompileError> {
    let mut chains = HashMap::new();
    for trigger in triggers {
        if !chains.contains_key(&trigger.group) {
            chains.insert(trigger.group, generate_group_chain(groups, trigger.group)?);
        }
    }

    let ordered = order_triggers(triggers, &chains);

    let mut flattened = Vec::with_capacity(ordered.len() * 2);
    let mut open: Vec<GroupId> = vec![ROOT_GROUP];
    let mut level = 1;

    for trigger in ordered {
        if open.last() != Some(&trigger.group) {
            let chain = &chains[&trigger.group];

            let common = open
                .iter()
                .zip(chain.iter())
                .take_while(|(a, b)| a == b)
                .count();

            for _ in common..level {
                open.pop();
                level -= 1;
            }

            for group_id in &chain[common..] {
                // Chains only contain ids resolved from the index
                let group = groups[group_id].clone();
                flattened.push(FlattenedNode {
                    item: FlatItem::Group(group),
                    level,
                });
                open.push(*group_id);
                level += 1;
            }
        }

        flattened.push(FlattenedNode {
            item: FlatItem::Trigger(trigger.clone()),
            level,
        });
    }

    Ok(flattened)
}

/// Stable reorder that keeps every group subtree contiguous
///
/// Each group is placed where its first trigger (direct or nested) appears in
/// the input, and triggers keep their input order within a group. Input that is
/// already contiguous comes back unchanged.
fn order_triggers<'a>(
    triggers: &'a [Trigger],
    chains: &HashMap<GroupId, Vec<GroupId>>,
) -> Vec<&'a Trigger> {
    let mut first_seen: HashMap<GroupId, usize> = HashMap::new();
    for (position, trigger) in triggers.iter().enumerate() {
        for group_id in &chains[&trigger.group] {
            first_seen.entry(*group_id).or_insert(position);
        }
    }

    let mut keyed: Vec<(Vec<usize>, &Trigger)> = triggers
        .iter()
        .enumerate()
        .map(|(position, trigger)| {
            // Skip the root: every chain starts with it
            let mut key: Vec<usize> = chains[&trigger.group][1..]
                .iter()
                .map(|g| first_seen[g])
                .collect();
            key.push(position);
            (key, trigger)
        })
        .collect();

    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, trigger)| trigger).collect()
}

/// Rebuild the nested tree from a flattened walk
///
/// Returns the root group's children, each joined by the root's `and`.
pub fn generate_tree(flattened: &[FlattenedNode]) -> Vec<ConditionNode> {
    build_level(flattened, 0, 1, Relation::And).0
}

/// Collect the siblings at `level` starting at `index`
///
/// Returns the siblings and the index of the first node that belongs to an
/// outer level (or the end of the walk).
fn build_level(
    flattened: &[FlattenedNode],
    mut index: usize,
    level: usize,
    joined_by: Relation,
) -> (Vec<ConditionNode>, usize) {
    let mut siblings = Vec::new();

    while let Some(node) = flattened.get(index) {
        if node.level < level {
            break;
        }

        match &node.item {
            FlatItem::Trigger(trigger) => {
                siblings.push(ConditionNode {
                    joined_by,
                    item: ConditionItem::Trigger(trigger.clone()),
                });
                index += 1;
            }
            FlatItem::Group(group) => {
                let (children, next) = build_level(flattened, index + 1, level + 1, group.relation);
                siblings.push(ConditionNode {
                    joined_by,
                    item: ConditionItem::Group {
                        id: group.id,
                        relation: group.relation,
                        children,
                    },
                });
                index = next;
            }
        }
    }

    (siblings, index)
}
