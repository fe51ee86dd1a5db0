//! Pure predicates over actor snapshots and storage contents

use crate::types::{ActorStatus, Item};

/// Online, alive and not asleep
pub fn is_valid(actor: Option<&ActorStatus>) -> bool {
    actor.map_or(false, |a| a.online && a.alive && !a.sleeping)
}

pub fn are_valid(a: Option<&ActorStatus>, b: Option<&ActorStatus>) -> bool {
    is_valid(a) && is_valid(b)
}

/// Distance between two actors; infinite when either is unknown or they are
/// in different worlds
pub fn distance(a: Option<&ActorStatus>, b: Option<&ActorStatus>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => a.location.distance(&b.location),
        _ => f64::INFINITY,
    }
}

/// Whether `storage` can absorb every item in `incoming`.
///
/// Simulates the insertion without touching the storage: each incoming stack
/// first tops up stacks it can merge with (`Item::stacks_with`, including
/// stacks placed earlier in the same simulation); whatever does not fit needs
/// a free slot.
pub fn has_capacity_for(storage: &[Option<Item>], incoming: &[Item]) -> bool {
    let mut free_slots = storage
        .iter()
        .filter(|slot| slot.as_ref().map_or(true, Item::is_empty))
        .count();
    let mut stacks: Vec<Item> = storage
        .iter()
        .flatten()
        .filter(|item| !item.is_empty())
        .cloned()
        .collect();

    for item in incoming.iter().filter(|item| !item.is_empty()) {
        let mut remaining = item.count;

        for stack in stacks.iter_mut().filter(|stack| stack.stacks_with(item)) {
            let absorbed = stack.room().min(remaining);
            stack.count += absorbed;
            remaining -= absorbed;
            if remaining == 0 {
                break;
            }
        }

        while remaining > 0 {
            if free_slots == 0 {
                return false;
            }
            free_slots -= 1;
            let mut stack = item.clone();
            stack.count = item.max_stack.max(1).min(remaining);
            remaining -= stack.count;
            stacks.push(stack);
        }
    }

    true
}

/// Drop empty entries
pub fn filter_empty(items: &[Item]) -> Vec<Item> {
    items.iter().filter(|item| !item.is_empty()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Location;

    fn status(world: &str, x: f64) -> ActorStatus {
        ActorStatus {
            name: "alex".to_string(),
            online: true,
            alive: true,
            sleeping: false,
            location: Location::new(world, x, 64.0, 0.0),
        }
    }

    #[test]
    fn test_validity() {
        let ok = status("world", 0.0);
        assert!(is_valid(Some(&ok)));
        assert!(!is_valid(None));

        let mut asleep = ok.clone();
        asleep.sleeping = true;
        assert!(!is_valid(Some(&asleep)));

        let mut dead = ok.clone();
        dead.alive = false;
        assert!(!are_valid(Some(&ok), Some(&dead)));

        let mut offline = ok.clone();
        offline.online = false;
        assert!(!is_valid(Some(&offline)));
    }

    #[test]
    fn test_distance() {
        let a = status("world", 0.0);
        let b = status("world", 5.0);
        assert_eq!(distance(Some(&a), Some(&b)), 5.0);
        assert!(distance(Some(&a), None).is_infinite());
        assert!(distance(Some(&a), Some(&status("nether", 0.0))).is_infinite());
    }

    #[test]
    fn test_capacity_empty_incoming() {
        assert!(has_capacity_for(&[], &[]));
        assert!(has_capacity_for(&[None], &[Item::new(0, 0, 1)]));
    }

    #[test]
    fn test_capacity_free_slots() {
        let storage = vec![None, Some(Item::new(1, 0, 64))];
        assert!(has_capacity_for(&storage, &[Item::new(3, 0, 10)]));
        assert!(!has_capacity_for(
            &storage,
            &[Item::new(3, 0, 10), Item::new(4, 0, 10)]
        ));
    }

    #[test]
    fn test_capacity_absorbs_into_partial_stack() {
        let storage = vec![Some(Item::new(264, 0, 60))];
        assert!(has_capacity_for(&storage, &[Item::new(264, 0, 4)]));
        assert!(!has_capacity_for(&storage, &[Item::new(264, 0, 5)]));
        // Different variant cannot share the stack
        assert!(!has_capacity_for(&storage, &[Item::new(264, 1, 1)]));
    }

    #[test]
    fn test_capacity_does_not_double_count_room() {
        let storage = vec![Some(Item::new(264, 0, 60)), None];
        // Both fit the 4 units of room only once; the second needs the free slot
        assert!(has_capacity_for(
            &storage,
            &[Item::new(264, 0, 4), Item::new(264, 0, 4)]
        ));
        assert!(!has_capacity_for(
            &storage,
            &[Item::new(264, 0, 4), Item::new(264, 0, 4), Item::new(1, 0, 1)]
        ));
    }

    #[test]
    fn test_capacity_new_stack_room_is_reused() {
        let storage = vec![None];
        assert!(has_capacity_for(
            &storage,
            &[Item::new(3, 0, 10), Item::new(3, 0, 20)]
        ));
    }

    #[test]
    fn test_capacity_named_item_needs_its_own_slot() {
        let mut storage: Vec<Option<Item>> = (0..35).map(|_| Some(Item::new(1, 0, 64))).collect();
        storage.push(Some(Item::new(264, 0, 1)));

        assert!(has_capacity_for(&storage, &[Item::new(264, 0, 1)]));
        assert!(!has_capacity_for(&storage, &[Item::new(264, 0, 1).named("Gem")]));

        storage[0] = None;
        assert!(has_capacity_for(&storage, &[Item::new(264, 0, 1).named("Gem")]));
    }

    #[test]
    fn test_capacity_zero_free_slots() {
        let full: Vec<Option<Item>> = (0..36).map(|_| Some(Item::new(1, 0, 64))).collect();
        assert!(!has_capacity_for(&full, &[Item::new(264, 0, 1)]));
    }

    #[test]
    fn test_filter_empty() {
        let items = vec![Item::new(0, 0, 1), Item::new(1, 0, 1), Item::new(2, 0, 0)];
        assert_eq!(filter_empty(&items), vec![Item::new(1, 0, 1)]);
    }
}
