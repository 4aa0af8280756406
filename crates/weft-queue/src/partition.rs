//! Room-to-node partition assignment.
//!
//! A pure function of the node identity and the sorted fleet list. Each
//! room has exactly one owner under any given configuration; when the
//! fleet changes, ownership reshuffles without coordination. Transient
//! double-ownership during a reconfiguration is benign: the queue is
//! at-least-once and the store is idempotent on message id.

use tracing::warn;
use weft_core::{NodeId, RoomId};

/// Compute the rooms this node consumes.
///
/// Room `r` belongs to the node at position `(r - 1) % nodes` in the
/// sorted node list. An empty list disables partitioning (every node
/// consumes every room, duplicate work accepted). A node missing from its
/// own configured list logs and falls back to all rooms.
#[must_use]
pub fn assigned_rooms(node_id: &NodeId, node_list: &[String], rooms: u32) -> Vec<RoomId> {
    let all = || (1..=rooms).map(RoomId).collect::<Vec<_>>();

    if node_list.is_empty() {
        return all();
    }

    let Some(index) = node_list.iter().position(|n| n == node_id.as_str()) else {
        warn!(
            node_id = %node_id,
            "node is not in the configured node list; consuming all rooms"
        );
        return all();
    };

    let count = node_list.len() as u32;
    (1..=rooms)
        .filter(|room| (room - 1) % count == index as u32)
        .map(RoomId)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn nodes(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_reference_assignment() {
        // nodeId="B" in ["A","B","C","D"] over 20 rooms.
        let rooms = assigned_rooms(&NodeId::new("B"), &nodes(&["A", "B", "C", "D"]), 20);
        let expected: Vec<RoomId> = [2, 6, 10, 14, 18].into_iter().map(RoomId).collect();
        assert_eq!(rooms, expected);
    }

    #[test]
    fn test_single_node_owns_everything() {
        let rooms = assigned_rooms(&NodeId::new("A"), &nodes(&["A"]), 20);
        assert_eq!(rooms.len(), 20);
    }

    #[test]
    fn test_empty_list_disables_partitioning() {
        let rooms = assigned_rooms(&NodeId::new("A"), &[], 20);
        assert_eq!(rooms.len(), 20);
    }

    #[test]
    fn test_unknown_node_falls_back_to_all() {
        let rooms = assigned_rooms(&NodeId::new("Z"), &nodes(&["A", "B"]), 20);
        assert_eq!(rooms.len(), 20);
    }

    #[test]
    fn test_assignments_partition_the_room_set() {
        // Union over nodes covers all rooms; pairwise intersections empty.
        let fleet = nodes(&["A", "B", "C"]);
        let mut seen: HashSet<RoomId> = HashSet::new();
        for node in &fleet {
            for room in assigned_rooms(&NodeId::new(node.clone()), &fleet, 20) {
                assert!(seen.insert(room), "room {room} owned twice");
            }
        }
        assert_eq!(seen.len(), 20);
    }

    #[test]
    fn test_balanced_split() {
        // With N nodes each gets floor or ceil of rooms/N.
        let fleet = nodes(&["A", "B", "C"]);
        for node in &fleet {
            let owned = assigned_rooms(&NodeId::new(node.clone()), &fleet, 20).len();
            assert!(owned == 6 || owned == 7, "unbalanced: {owned}");
        }
    }
}
