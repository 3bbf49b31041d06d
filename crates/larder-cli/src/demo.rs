//! Scripted walkthrough of the optimistic flow against an in-memory store.

use std::sync::Arc;

use anyhow::{Context, Result};
use larder_client::{
    Coordinator, LarderConfig, MemoryStore, Persistence, QueryCache, SyncListener,
    UserPreferenceStore, ViewPreferences, ViewStore, spawn_refetch_worker,
};
use larder_order::{DragMachine, DropTarget, SelectionSet, render_order};
use larder_types::{
    CollectionKey, EntityId, EntityKind, EntityPatch, OrderedEntity, UserId, ViewId,
};
use tracing::info;

const LIST: EntityId = EntityId::new(1);
const PRODUCE: EntityId = EntityId::new(10);
const DAIRY: EntityId = EntityId::new(11);
const BAKERY: EntityId = EntityId::new(12);

pub async fn run(config: &LarderConfig) -> Result<()> {
    let items = CollectionKey::items(LIST);
    let categories = CollectionKey::categories(LIST);

    let store = Arc::new(MemoryStore::new());
    seed(&store);

    let view = Arc::new(ViewStore::new());
    let refetch = spawn_refetch_worker(store.clone(), view.clone());
    let cache: Arc<dyn QueryCache> = Arc::new(refetch.clone());
    let coordinator = Coordinator::new(
        view.clone(),
        store.clone(),
        cache.clone(),
        config.coordinator.clone(),
    );
    let listener = SyncListener::new(cache);

    let preferences = UserPreferenceStore::new();
    let prefs = preferences.get_or_init(UserId::new(1), &ViewId::new(format!("list:{LIST}")));

    listener.invalidate_list(LIST);
    refetch.flush().await;
    show("loaded", &view, &prefs);

    // Drag "apples" onto the Dairy header.
    let visible = view.visible(&items);
    let apples = named(&visible, "apples")?.clone();
    let mut drag = DragMachine::new();
    drag.start(apples);
    drag.hover(Some(DropTarget::GroupHandle(DAIRY)));
    match drag.end(&visible) {
        Some(intent) => coordinator.move_entity(items, intent).await?,
        None => info!("drag produced no move"),
    }
    refetch.flush().await;
    show("after drag", &view, &prefs);

    let milk = named(&view.visible(&items), "milk")?.id;
    coordinator.set_checked(items, milk, true).await?;
    refetch.flush().await;
    show("after check", &view, &prefs);

    let mut selection = SelectionSet::new();
    selection.toggle_group(Some(DAIRY), &view.visible(&items));
    info!(selected = selection.len(), "selected the whole Dairy group");
    coordinator.bulk_delete(items, &mut selection).await?;
    refetch.flush().await;
    show("after bulk delete", &view, &prefs);

    // Another client checks an item; the server pushes the change.
    let bananas = named(&view.visible(&items), "bananas")?.id;
    store.update_entity(bananas, EntityPatch::checked(true)).await?;
    let frame = format!(r#"{{"type":"item_checked","list_id":{LIST}}}"#);
    let outcome = listener.handle_frame(&frame);
    info!(?outcome, "sync frame handled");
    refetch.flush().await;
    show("after sync push", &view, &prefs);

    info!(categories = view.visible(&categories).len(), "demo finished");
    Ok(())
}

fn seed(store: &MemoryStore) {
    let category = |id: EntityId, name: &str, key: i64| {
        OrderedEntity::new(id, EntityKind::Category, name).with_sort_key(key)
    };
    store.seed(
        CollectionKey::categories(LIST),
        vec![
            category(PRODUCE, "Produce", 0),
            category(DAIRY, "Dairy", 1000),
            category(BAKERY, "Bakery", 2000),
        ],
    );

    let item = |id: i64, parent: EntityId, name: &str, key: i64| {
        OrderedEntity::new(EntityId::new(id), EntityKind::Item, name)
            .with_parent(Some(parent))
            .with_sort_key(key)
    };
    store.seed(
        CollectionKey::items(LIST),
        vec![
            item(100, PRODUCE, "apples", 0),
            item(101, PRODUCE, "bananas", 1000),
            item(102, DAIRY, "milk", 0),
            item(103, DAIRY, "cheese", 1000),
            item(104, BAKERY, "bread", 0),
            OrderedEntity::new(EntityId::new(105), EntityKind::Item, "batteries"),
        ],
    );
}

fn named<'a>(entities: &'a [OrderedEntity], name: &str) -> Result<&'a OrderedEntity> {
    entities
        .iter()
        .find(|e| e.name == name)
        .with_context(|| format!("no entity named {name:?}"))
}

/// Log the visible list, one line per category.
fn show(stage: &str, view: &ViewStore, prefs: &ViewPreferences) {
    let mut categories = view.visible(&CollectionKey::categories(LIST));
    categories.sort_by(|a, b| a.render_cmp(b));
    let items = prefs.arrange(&view.visible(&CollectionKey::items(LIST)));

    let groups = categories
        .iter()
        .map(|c| (Some(c.id), c.name.as_str()))
        .chain(std::iter::once((None, "(uncategorised)")));
    for (parent, label) in groups {
        let names: Vec<String> = items
            .iter()
            .filter(|e| e.parent_id == parent)
            .map(|e| if e.checked { format!("[x] {}", e.name) } else { e.name.clone() })
            .collect();
        info!(stage, category = label, items = %names.join(", "));
    }

    let group_order: Vec<Option<EntityId>> = categories.iter().map(|c| Some(c.id)).collect();
    let order = render_order(&view.visible(&CollectionKey::items(LIST)), &group_order);
    info!(stage, ?order, "render order");
}
