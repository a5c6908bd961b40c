use std::rc::Rc;
use std::time::Duration;

use deepstate::{create_store, ManualScheduler, Notification, StoreOptions};
use serde_json::json;

#[test]
fn rapid_edits_coalesce_into_one_step() {
    let store = create_store("s", json!({"title": ""}), StoreOptions::default()).unwrap();
    let clock = Rc::new(ManualScheduler::new());
    store.set_scheduler(clock.clone());
    let consumer = store.attach(Some("editor"), |_: &Notification| Ok(()));
    let throttled = consumer.throttled_batch(["title"]);

    throttled.trigger();
    store.set("title", "a").unwrap();
    clock.advance(Duration::from_millis(500));
    throttled.trigger();
    store.set("title", "ab").unwrap();
    clock.advance(Duration::from_millis(500));
    assert_eq!(consumer.undo_count(), 0);
    assert!(throttled.is_armed());

    clock.advance(Duration::from_millis(600));
    assert!(!throttled.is_armed());
    assert_eq!(consumer.undo_count(), 1);
    consumer.undo().unwrap();
    assert_eq!(store.to_value().unwrap(), json!({"title": ""}));
}

#[test]
fn delay_follows_options() {
    let options = StoreOptions::from_json_str(r#"{"throttle_ms": 50}"#).unwrap();
    let store = create_store("s", json!({"title": ""}), options).unwrap();
    let clock = Rc::new(ManualScheduler::new());
    store.set_scheduler(clock.clone());
    let consumer = store.attach(None, |_: &Notification| Ok(()));
    let throttled = consumer.throttled_batch(["title"]);

    throttled.trigger();
    store.set("title", "x").unwrap();
    clock.advance(Duration::from_millis(50));

    assert_eq!(consumer.undo_count(), 1);
}

#[test]
fn cancel_leaves_batch_open() {
    let store = create_store("s", json!({"title": ""}), StoreOptions::default()).unwrap();
    let clock = Rc::new(ManualScheduler::new());
    store.set_scheduler(clock.clone());
    let consumer = store.attach(None, |_: &Notification| Ok(()));
    let throttled = consumer.throttled_batch(["title"]);

    throttled.trigger();
    store.set("title", "x").unwrap();
    assert!(throttled.cancel());
    clock.advance(Duration::from_secs(5));
    assert_eq!(consumer.undo_count(), 0);

    consumer.batch_end(["title"]);
    assert_eq!(consumer.undo_count(), 1);
}

#[test]
fn timer_after_teardown_is_harmless() {
    let clock = Rc::new(ManualScheduler::new());
    {
        let store = create_store("s", json!({"title": ""}), StoreOptions::default()).unwrap();
        store.set_scheduler(clock.clone());
        let consumer = store.attach(None, |_: &Notification| Ok(()));
        let throttled = consumer.throttled_batch(["title"]);
        throttled.trigger();
    }
    assert_eq!(clock.pending(), 1);
    clock.advance(Duration::from_secs(2));
    assert_eq!(clock.pending(), 0);
}

#[test]
fn default_store_fires_on_its_own_clock() {
    let store = create_store("s", json!({"title": ""}), StoreOptions::default()).unwrap();
    let consumer = store.attach(Some("editor"), |_: &Notification| Ok(()));
    let throttled = consumer.throttled_batch(["title"]);

    throttled.trigger();
    store.set("title", "a").unwrap();
    assert_eq!(store.manual_clock().pending(), 1);
    store.manual_clock().advance(Duration::from_millis(1500));

    assert!(!throttled.is_armed());
    assert_eq!(consumer.undo_count(), 1);
    store.set("title", "b").unwrap();
    assert_eq!(consumer.undo_count(), 2);
}

#[test]
fn swapping_scheduler_keeps_one_debounce() {
    let store = create_store("s", json!({"title": ""}), StoreOptions::default()).unwrap();
    let first = Rc::new(ManualScheduler::new());
    let second = Rc::new(ManualScheduler::new());
    store.set_scheduler(first.clone());
    let consumer = store.attach(None, |_: &Notification| Ok(()));
    let throttled = consumer.throttled_batch(["title"]);

    throttled.trigger();
    store.set("title", "a").unwrap();
    store.set_scheduler(second.clone());
    throttled.trigger();
    store.set("title", "ab").unwrap();

    assert_eq!(first.pending(), 0);
    first.advance(Duration::from_millis(1000));
    assert!(throttled.is_armed());
    assert_eq!(consumer.undo_count(), 0);

    store.set("title", "abc").unwrap();
    second.advance(Duration::from_millis(1000));
    assert!(!throttled.is_armed());
    assert_eq!(consumer.undo_count(), 1);
    consumer.undo().unwrap();
    assert_eq!(store.to_value().unwrap(), json!({"title": ""}));
}

#[test]
fn cancel_after_scheduler_swap_reaches_the_armed_scheduler() {
    let store = create_store("s", json!({"title": ""}), StoreOptions::default()).unwrap();
    let consumer = store.attach(None, |_: &Notification| Ok(()));
    let throttled = consumer.throttled_batch(["title"]);

    throttled.trigger();
    store.set_scheduler(Rc::new(ManualScheduler::new()));
    assert!(throttled.cancel());
    assert_eq!(store.manual_clock().pending(), 0);
    assert!(!throttled.is_armed());
}
