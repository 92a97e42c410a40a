//! Item container transfers.
//!
//! An item lives in exactly one container at a time: a location's item
//! list or an agent's inventory. All transfers go through this module so
//! the invariant cannot be broken by ad-hoc pushes.

use std::collections::BTreeMap;

use emosim_types::{ItemId, Location, LocationId};

use crate::error::WorldError;

/// Move an item from a location's visible items into an inventory.
///
/// # Errors
///
/// Returns [`WorldError::ItemNotInContainer`] if the item is not lying at
/// the location (hidden items do not count until revealed by `search`).
pub fn take_item(
    location_id: &LocationId,
    location: &mut Location,
    inventory: &mut Vec<ItemId>,
    item: &ItemId,
) -> Result<(), WorldError> {
    let Some(pos) = location.items.iter().position(|i| i == item) else {
        return Err(WorldError::ItemNotInContainer {
            item: item.clone(),
            container: format!("location '{location_id}'"),
        });
    };
    location.items.remove(pos);
    inventory.push(item.clone());
    Ok(())
}

/// Move an item from an inventory onto a location's item list.
///
/// # Errors
///
/// Returns [`WorldError::ItemNotInContainer`] if the agent is not carrying
/// the item.
pub fn drop_item(
    location: &mut Location,
    inventory: &mut Vec<ItemId>,
    item: &ItemId,
) -> Result<(), WorldError> {
    let Some(pos) = inventory.iter().position(|i| i == item) else {
        return Err(WorldError::ItemNotInContainer {
            item: item.clone(),
            container: String::from("inventory"),
        });
    };
    inventory.remove(pos);
    location.items.push(item.clone());
    Ok(())
}

/// Remove an item from an inventory entirely (consumed by `use`).
///
/// # Errors
///
/// Returns [`WorldError::ItemNotInContainer`] if the agent is not carrying
/// the item.
pub fn consume_item(inventory: &mut Vec<ItemId>, item: &ItemId) -> Result<(), WorldError> {
    let Some(pos) = inventory.iter().position(|i| i == item) else {
        return Err(WorldError::ItemNotInContainer {
            item: item.clone(),
            container: String::from("inventory"),
        });
    };
    inventory.remove(pos);
    Ok(())
}

/// Reveal all hidden items at a location, moving them to the visible list.
/// Returns the revealed item ids (possibly empty; an empty reveal is a
/// successful no-op).
pub fn reveal_hidden(location: &mut Location) -> Vec<ItemId> {
    let revealed: Vec<ItemId> = location.hidden_items.drain(..).collect();
    location.items.extend(revealed.iter().cloned());
    revealed
}

/// Check the single-container invariant over all locations and
/// inventories. Returns the first item found in two containers.
pub fn find_container_violation<'a>(
    locations: impl Iterator<Item = &'a Location>,
    inventories: impl Iterator<Item = &'a Vec<ItemId>>,
) -> Option<ItemId> {
    let mut seen: BTreeMap<&ItemId, u32> = BTreeMap::new();
    for location in locations {
        for item in location.items.iter().chain(&location.hidden_items) {
            *seen.entry(item).or_insert(0) += 1;
        }
    }
    for inventory in inventories {
        for item in inventory {
            *seen.entry(item).or_insert(0) += 1;
        }
    }
    seen.into_iter()
        .find(|(_, count)| *count > 1)
        .map(|(item, _)| item.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use emosim_types::LocationEffects;

    fn location_with(items: &[&str], hidden: &[&str]) -> Location {
        Location {
            description: String::from("test"),
            nearby: Vec::new(),
            distance: 1,
            items: items.iter().map(|i| ItemId::from(*i)).collect(),
            hidden_items: hidden.iter().map(|i| ItemId::from(*i)).collect(),
            hazard_affected: false,
            effects: LocationEffects::default(),
        }
    }

    #[test]
    fn take_moves_item_into_inventory() {
        let mut location = location_with(&["rope"], &[]);
        let mut inventory = Vec::new();
        take_item(&"room1".into(), &mut location, &mut inventory, &"rope".into()).expect("take");
        assert!(location.items.is_empty());
        assert_eq!(inventory, vec![ItemId::from("rope")]);
    }

    #[test]
    fn take_absent_item_fails_and_leaves_state_unchanged() {
        let mut location = location_with(&[], &[]);
        let mut inventory = vec![ItemId::from("rope")];
        let result = take_item(&"room1".into(), &mut location, &mut inventory, &"rope".into());
        assert!(result.is_err());
        // Already-carried item stays put (boundary B4).
        assert_eq!(inventory, vec![ItemId::from("rope")]);
        assert!(location.items.is_empty());
    }

    #[test]
    fn take_does_not_see_hidden_items() {
        let mut location = location_with(&[], &["cache"]);
        let mut inventory = Vec::new();
        assert!(take_item(&"room1".into(), &mut location, &mut inventory, &"cache".into()).is_err());
    }

    #[test]
    fn drop_moves_item_back() {
        let mut location = location_with(&[], &[]);
        let mut inventory = vec![ItemId::from("rope")];
        drop_item(&mut location, &mut inventory, &"rope".into()).expect("drop");
        assert!(inventory.is_empty());
        assert_eq!(location.items, vec![ItemId::from("rope")]);
    }

    #[test]
    fn reveal_moves_all_hidden_items() {
        let mut location = location_with(&["rope"], &["cache", "map"]);
        let revealed = reveal_hidden(&mut location);
        assert_eq!(revealed.len(), 2);
        assert!(location.hidden_items.is_empty());
        assert_eq!(location.items.len(), 3);
    }

    #[test]
    fn reveal_on_nothing_is_empty() {
        let mut location = location_with(&[], &[]);
        assert!(reveal_hidden(&mut location).is_empty());
    }

    #[test]
    fn container_violation_detected() {
        let a = location_with(&["rope"], &[]);
        let b = location_with(&["rope"], &[]);
        let violation = find_container_violation([&a, &b].into_iter(), [].into_iter());
        assert_eq!(violation, Some(ItemId::from("rope")));
    }

    #[test]
    fn no_violation_when_containers_are_disjoint() {
        let a = location_with(&["rope"], &[]);
        let inventory = vec![ItemId::from("map")];
        let violation = find_container_violation([&a].into_iter(), [&inventory].into_iter());
        assert!(violation.is_none());
    }
}
