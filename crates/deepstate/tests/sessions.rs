use std::cell::Cell;
use std::rc::Rc;

use deepstate::{create_store, Notification, StoreOptions};
use serde_json::json;

#[test]
fn reads_during_session_widen_scope() {
    let store = create_store("s", json!({"a": 1, "b": 2, "c": 3}), StoreOptions::default()).unwrap();
    let consumer = store.attach(Some("view"), |_: &Notification| Ok(()));
    {
        let session = consumer.begin();
        session.read("a").unwrap();
        session.read("b").unwrap();
    }
    let scope = consumer.scope();
    assert!(scope.contains("a"));
    assert!(scope.contains("b"));
    assert!(!scope.contains("c"));
}

#[test]
fn inferred_scope_drives_notifications() {
    let store = create_store("s", json!({"a": 1, "b": 2}), StoreOptions::default()).unwrap();
    let hits = Rc::new(Cell::new(0));
    let seen = hits.clone();
    let consumer = store.attach(Some("view"), move |_: &Notification| {
        seen.set(seen.get() + 1);
        Ok(())
    });
    {
        let _session = consumer.begin();
        store.read("a").unwrap();
    }
    store.set("b", 20).unwrap();
    assert_eq!(hits.get(), 0);
    store.set("a", 10).unwrap();
    assert_eq!(hits.get(), 1);
}

#[test]
fn reads_outside_sessions_are_not_attributed() {
    let store = create_store("s", json!({"a": 1}), StoreOptions::default()).unwrap();
    let consumer = store.attach(None, |_: &Notification| Ok(()));
    store.read("a").unwrap();
    assert!(consumer.scope().is_unscoped());
}

#[test]
fn peek_does_not_widen_scope() {
    let store = create_store("s", json!({"a": 1}), StoreOptions::default()).unwrap();
    let consumer = store.attach(None, |_: &Notification| Ok(()));
    let session = consumer.begin();
    session.peek("a").unwrap();
    drop(session);
    assert!(consumer.scope().is_unscoped());
}

#[test]
fn nested_sessions_attribute_to_innermost() {
    let store = create_store("s", json!({"outer": 1, "inner": 2}), StoreOptions::default()).unwrap();
    let parent = store.attach(Some("parent"), |_: &Notification| Ok(()));
    let child = store.attach(Some("child"), |_: &Notification| Ok(()));
    {
        let outer = parent.begin();
        outer.read("outer").unwrap();
        {
            let inner = child.begin();
            inner.read("inner").unwrap();
        }
        store.read("outer").unwrap();
    }
    assert_eq!(parent.scope().paths(), vec!["outer"]);
    assert_eq!(child.scope().paths(), vec!["inner"]);
}

#[test]
fn deep_read_records_each_step() {
    let store = create_store("s", json!({"items": [{"count": 1}]}), StoreOptions::default()).unwrap();
    let consumer = store.attach(None, |_: &Notification| Ok(()));
    {
        let session = consumer.begin();
        assert_eq!(session.read("items[0].count").unwrap(), Some(1.into()));
    }
    assert_eq!(
        consumer.scope().paths(),
        vec!["items", "items[0]", "items[0].count"]
    );
}

#[test]
fn out_of_order_session_end_is_tolerated() {
    let store = create_store("s", json!({"a": 1, "b": 2}), StoreOptions::default()).unwrap();
    let first = store.attach(Some("first"), |_: &Notification| Ok(()));
    let second = store.attach(Some("second"), |_: &Notification| Ok(()));
    let outer = first.begin();
    let inner = second.begin();
    drop(outer);
    store.read("a").unwrap();
    drop(inner);
    store.read("b").unwrap();
    assert_eq!(second.scope().paths(), vec!["a"]);
    assert!(first.scope().is_unscoped());
}

#[test]
fn consumer_names_and_ids() {
    let store = create_store("s", json!({}), StoreOptions::default()).unwrap();
    let a = store.attach(Some("a"), |_: &Notification| Ok(()));
    let b = store.attach(None, |_: &Notification| Ok(()));
    assert_ne!(a.id(), b.id());
    assert_eq!(a.name().as_deref(), Some("a"));
    assert_eq!(b.name(), None);
    assert_eq!(a.store().name(), "s");
}
