//! Group membership and effective ordering helpers.

use larder_types::{EntityId, OrderedEntity};

/// Members of one group in render order (sort key, id tiebreak).
pub fn group_members(entities: &[OrderedEntity], parent: Option<EntityId>) -> Vec<&OrderedEntity> {
    let mut members: Vec<_> = entities.iter().filter(|e| e.parent_id == parent).collect();
    members.sort_by(|a, b| a.render_cmp(b));
    members
}

/// Members of one group in render order, leaving out `exclude`.
///
/// Used when computing a destination index for an entity that may already
/// belong to the destination group.
pub fn group_members_excluding(
    entities: &[OrderedEntity],
    parent: Option<EntityId>,
    exclude: EntityId,
) -> Vec<&OrderedEntity> {
    let mut members = group_members(entities, parent);
    members.retain(|e| e.id != exclude);
    members
}

/// Index of `id` within its group's render order.
pub fn index_in_group(entities: &[OrderedEntity], id: EntityId) -> Option<usize> {
    let entity = entities.iter().find(|e| e.id == id)?;
    group_members(entities, entity.parent_id)
        .iter()
        .position(|e| e.id == id)
}

/// The whole collection in render order, grouped by parent.
///
/// Groups appear in the order given by `group_order`; the ungrouped bucket
/// (`None`) comes last unless listed explicitly. Groups that are not listed
/// are appended in parent-id order.
pub fn render_order(entities: &[OrderedEntity], group_order: &[Option<EntityId>]) -> Vec<EntityId> {
    let mut parents: Vec<Option<EntityId>> = group_order.to_vec();
    let mut rest: Vec<Option<EntityId>> = entities
        .iter()
        .map(|e| e.parent_id)
        .filter(|p| !parents.contains(p))
        .collect();
    rest.sort();
    rest.dedup();
    // Ungrouped sorts first as `None`; move it to the end.
    if rest.first() == Some(&None) {
        rest.remove(0);
        rest.push(None);
    }
    parents.extend(rest);

    parents
        .into_iter()
        .flat_map(|parent| group_members(entities, parent).into_iter().map(|e| e.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_types::EntityKind;

    fn item(id: i64, parent: Option<i64>, key: i64) -> OrderedEntity {
        OrderedEntity::new(EntityId::new(id), EntityKind::Item, format!("item {id}"))
            .with_parent(parent.map(EntityId::new))
            .with_sort_key(key)
    }

    fn ids(members: &[&OrderedEntity]) -> Vec<i64> {
        members.iter().map(|e| e.id.get()).collect()
    }

    #[test]
    fn test_group_members_sorted_with_tiebreak() {
        let entities = vec![
            item(3, Some(1), 100),
            item(2, Some(1), 100),
            item(1, Some(1), 50),
            item(9, Some(2), 0),
            item(8, None, 0),
        ];
        assert_eq!(ids(&group_members(&entities, Some(EntityId::new(1)))), vec![1, 2, 3]);
        assert_eq!(ids(&group_members(&entities, None)), vec![8]);
        assert!(group_members(&entities, Some(EntityId::new(77))).is_empty());
    }

    #[test]
    fn test_excluding_and_index() {
        let entities = vec![item(1, None, 0), item(2, None, 1000), item(3, None, 2000)];
        assert_eq!(
            ids(&group_members_excluding(&entities, None, EntityId::new(2))),
            vec![1, 3]
        );
        assert_eq!(index_in_group(&entities, EntityId::new(3)), Some(2));
        assert_eq!(index_in_group(&entities, EntityId::new(42)), None);
    }

    #[test]
    fn test_render_order_puts_ungrouped_last() {
        let entities = vec![
            item(1, None, 0),
            item(2, Some(20), 0),
            item(3, Some(10), 0),
            item(4, Some(10), -1000),
        ];
        let order: Vec<i64> = render_order(&entities, &[]).into_iter().map(|id| id.get()).collect();
        assert_eq!(order, vec![4, 3, 2, 1]);

        let order: Vec<i64> = render_order(&entities, &[Some(EntityId::new(20)), None])
            .into_iter()
            .map(|id| id.get())
            .collect();
        assert_eq!(order, vec![2, 1, 4, 3]);
    }
}
