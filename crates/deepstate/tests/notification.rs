use std::cell::{Cell, RefCell};
use std::rc::Rc;

use deepstate::{create_store, Consumer, ListenerError, Notification, Store, StoreOptions};
use serde_json::json;

fn store() -> Store {
    create_store(
        "test",
        json!({"items": [{"count": 1}, {"count": 2}], "title": "t"}),
        StoreOptions::default(),
    )
    .unwrap()
}

fn counting(store: &Store, name: &str) -> (Consumer, Rc<RefCell<Vec<String>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let consumer = store.attach(Some(name), move |n: &Notification| {
        sink.borrow_mut().push(n.path.clone());
        Ok(())
    });
    (consumer, seen)
}

#[test]
fn prefix_scope_sees_deeper_changes() {
    let store = store();
    let (consumer, seen) = counting(&store, "list");
    consumer.watch(["items"]).unwrap();

    store.set("items[0].count", 5).unwrap();

    assert!(seen.borrow().iter().any(|p| p == "items[0].count"));
}

#[test]
fn sibling_scope_is_not_notified() {
    let store = store();
    let (consumer, seen) = counting(&store, "first");
    consumer.watch(["items[0].count"]).unwrap();

    store.set("items[1].count", 5).unwrap();

    assert!(seen.borrow().is_empty());
}

#[test]
fn wildcard_scope_sees_everything() {
    let store = store();
    let (consumer, seen) = counting(&store, "all");
    consumer.watch(["*"]).unwrap();

    store.set("title", "new").unwrap();
    store.push("items", [json!({"count": 3})]).unwrap();

    assert_eq!(*seen.borrow(), vec!["title".to_string(), "items".to_string()]);
}

#[test]
fn unscoped_consumer_hears_nothing() {
    let store = store();
    let (consumer, seen) = counting(&store, "idle");
    store.set("title", "new").unwrap();
    assert!(consumer.scope().is_unscoped());
    assert!(seen.borrow().is_empty());
}

#[test]
fn watch_replaces_scope() {
    let store = store();
    let (consumer, seen) = counting(&store, "c");
    consumer.watch(["title"]).unwrap();
    consumer.watch(["items"]).unwrap();

    store.set("title", "new").unwrap();

    assert!(seen.borrow().is_empty());
    assert_eq!(consumer.scope().paths(), vec!["items"]);
}

#[test]
fn related_entries_notify_at_least_once() {
    let store = store();
    let (consumer, seen) = counting(&store, "c");
    consumer.watch(["items", "items[0]"]).unwrap();

    store.set("items[0].count", 9).unwrap();

    assert!(!seen.borrow().is_empty());
    assert!(seen.borrow().iter().all(|p| p == "items[0].count"));
}

#[test]
fn structural_change_reports_top_level_path() {
    let store = store();
    let (consumer, seen) = counting(&store, "c");
    consumer.watch(["items[1].count"]).unwrap();

    store.pop("items").unwrap();

    assert_eq!(*seen.borrow(), vec!["items".to_string()]);
}

#[test]
fn sequence_numbers_increase() {
    let store = store();
    let seqs = Rc::new(RefCell::new(Vec::new()));
    let sink = seqs.clone();
    let consumer = store.attach(None, move |n: &Notification| {
        sink.borrow_mut().push(n.seq);
        Ok(())
    });
    consumer.watch(["title"]).unwrap();
    store.set("title", "a").unwrap();
    store.set("title", "b").unwrap();
    let seqs = seqs.borrow();
    assert_eq!(seqs.len(), 2);
    assert!(seqs[0] < seqs[1]);
}

#[test]
fn failing_trigger_does_not_block_others() {
    let store = store();
    let failing = store.attach(Some("failing"), |_: &Notification| {
        Err(ListenerError::new("cannot render"))
    });
    let panicking = store.attach(Some("panicking"), |_: &Notification| -> Result<(), ListenerError> {
        panic!("render blew up")
    });
    let (healthy, seen) = counting(&store, "healthy");
    for consumer in [&failing, &panicking, &healthy] {
        consumer.watch(["title"]).unwrap();
    }

    store.set("title", "new").unwrap();

    assert_eq!(*seen.borrow(), vec!["title".to_string()]);
}

#[test]
fn consumer_detached_mid_delivery_is_skipped() {
    let store = store();
    let victim_hits = Rc::new(Cell::new(0));
    let slot: Rc<RefCell<Option<Consumer>>> = Rc::new(RefCell::new(None));

    let to_drop = slot.clone();
    let first = store.attach(Some("first"), move |_: &Notification| {
        to_drop.borrow_mut().take();
        Ok(())
    });
    let hits = victim_hits.clone();
    let victim = store.attach(Some("victim"), move |_: &Notification| {
        hits.set(hits.get() + 1);
        Ok(())
    });
    first.watch(["title"]).unwrap();
    victim.watch(["title"]).unwrap();
    *slot.borrow_mut() = Some(victim);

    store.set("title", "new").unwrap();

    assert_eq!(victim_hits.get(), 0);
    assert_eq!(store.consumer_count(), 1);
}

#[test]
fn dropping_consumer_detaches_it() {
    let store = store();
    let (consumer, seen) = counting(&store, "c");
    consumer.watch(["*"]).unwrap();
    assert_eq!(store.consumer_count(), 1);
    consumer.detach();
    assert_eq!(store.consumer_count(), 0);
    store.set("title", "new").unwrap();
    assert!(seen.borrow().is_empty());
}

#[test]
fn triggers_may_write_back() {
    let store = store();
    let writer = store.clone();
    let consumer = store.attach(Some("echo"), move |n: &Notification| {
        if n.path == "title" {
            writer.set("items[0].count", 100).map_err(|e| ListenerError::new(e.to_string()))?;
        }
        Ok(())
    });
    consumer.watch(["title"]).unwrap();

    store.set("title", "new").unwrap();

    assert_eq!(store.peek("items[0].count").unwrap(), Some(100.into()));
}

#[test]
fn counts_are_current_when_notified() {
    let store = store();
    let observed = Rc::new(RefCell::new(Vec::new()));
    let sink = observed.clone();
    let reader = store.clone();
    let consumer = store.attach(None, move |_: &Notification| {
        sink.borrow_mut().push((reader.undo_count(), reader.redo_count()));
        Ok(())
    });
    consumer.watch(["title"]).unwrap();

    store.set("title", "a").unwrap();
    store.undo().unwrap();

    assert_eq!(*observed.borrow(), vec![(1, 0), (0, 1)]);
}
