//! Topological ordering of the tag forest
//!
//! Tags form a forest keyed by `parent_tag_local_id` (§9 "Cyclic graphs").
//! The sender must upload parents before children so that a child's
//! `parent_tag_local_id` resolves to a server guid already known this cycle.
//! A cycle can only arise from a programmer/store bug, never from normal
//! use, so it is surfaced as [`SyncError::CyclicTagGraph`] rather than
//! silently broken.

use std::collections::{HashMap, HashSet, VecDeque};

use evercore_core::domain::{LocalId, Tag};

use crate::error::{SyncError, SyncResult};

/// Returns `tags` reordered so that every tag appears after its parent
/// (Kahn's algorithm). Tags with no parent, or whose parent is not part of
/// this set, are treated as roots.
pub fn topological_sort(tags: Vec<Tag>) -> SyncResult<Vec<Tag>> {
    let mut by_id: HashMap<LocalId, Tag> = tags.into_iter().map(|t| (t.local_id, t)).collect();
    let ids: HashSet<LocalId> = by_id.keys().copied().collect();

    let mut children: HashMap<LocalId, Vec<LocalId>> = HashMap::new();
    let mut in_degree: HashMap<LocalId, u32> = ids.iter().map(|id| (*id, 0)).collect();

    for tag in by_id.values() {
        if let Some(parent) = tag.parent_tag_local_id {
            if ids.contains(&parent) {
                children.entry(parent).or_default().push(tag.local_id);
                *in_degree.get_mut(&tag.local_id).unwrap() += 1;
            }
        }
    }

    let mut queue: VecDeque<LocalId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut ordered_ids = Vec::with_capacity(ids.len());
    while let Some(id) = queue.pop_front() {
        ordered_ids.push(id);
        if let Some(kids) = children.get(&id) {
            for child in kids {
                let degree = in_degree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*child);
                }
            }
        }
    }

    if ordered_ids.len() != ids.len() {
        return Err(SyncError::CyclicTagGraph(format!(
            "{} of {} tags are part of a cycle",
            ids.len() - ordered_ids.len(),
            ids.len()
        )));
    }

    Ok(ordered_ids.into_iter().map(|id| by_id.remove(&id).unwrap()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evercore_core::domain::Guid;

    fn tag(name: &str, parent: Option<LocalId>) -> Tag {
        let mut t = Tag::new(name);
        t.parent_tag_local_id = parent;
        t
    }

    #[test]
    fn orders_parents_before_children() {
        let t1 = tag("T1", None);
        let t2 = tag("T2", Some(t1.local_id));
        let t3 = tag("T3", Some(t2.local_id));

        let input = vec![t3.clone(), t1.clone(), t2.clone()];
        let sorted = topological_sort(input).unwrap();

        let positions: HashMap<LocalId, usize> =
            sorted.iter().enumerate().map(|(i, t)| (t.local_id, i)).collect();
        assert!(positions[&t1.local_id] < positions[&t2.local_id]);
        assert!(positions[&t2.local_id] < positions[&t3.local_id]);
    }

    #[test]
    fn unrelated_roots_all_included() {
        let a = tag("A", None);
        let b = tag("B", None);
        let sorted = topological_sort(vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(sorted.len(), 2);
    }

    #[test]
    fn detects_cycle() {
        let mut t1 = tag("T1", None);
        let mut t2 = tag("T2", Some(t1.local_id));
        t1.parent_tag_local_id = Some(t2.local_id);
        t2.guid = Some(Guid::new("g2").unwrap());

        let err = topological_sort(vec![t1, t2]).unwrap_err();
        assert!(matches!(err, SyncError::CyclicTagGraph(_)));
    }

    #[test]
    fn parent_outside_set_is_treated_as_root() {
        let orphan = tag("orphan", Some(LocalId::new()));
        let sorted = topological_sort(vec![orphan.clone()]).unwrap();
        assert_eq!(sorted.len(), 1);
        assert_eq!(sorted[0].local_id, orphan.local_id);
    }
}
