use dispatch_sync::{Cache, InvalidatePattern};
use dispatch_types::{FieldMap, Record};
use pretty_assertions::assert_eq;
use regex_lite::Regex;
use serde_json::json;
use std::time::Duration;

fn record(reference: &str) -> Record {
    let mut fields = FieldMap::new();
    fields.insert("reference".into(), json!(reference));
    Record::new(fields).with_id(reference)
}

#[test]
fn get_returns_what_was_set() {
    let mut cache = Cache::new(Duration::from_secs(60));
    cache.set("deliveries|a".into(), vec![record("DR-001")], None);

    let hit = cache.get("deliveries|a").unwrap();
    assert_eq!(hit.len(), 1);
    assert_eq!(hit[0].field_str("reference"), Some("DR-001"));
}

#[test]
fn miss_on_unknown_key() {
    let mut cache = Cache::new(Duration::from_secs(60));
    assert!(cache.get("deliveries|nope").is_none());
}

#[test]
fn expired_entry_is_a_miss_and_gets_evicted() {
    let mut cache = Cache::new(Duration::from_millis(10));
    cache.set("deliveries|a".into(), vec![record("DR-001")], None);
    std::thread::sleep(Duration::from_millis(25));

    assert!(cache.get("deliveries|a").is_none());
    assert!(cache.is_empty());
}

#[test]
fn per_entry_ttl_overrides_default() {
    let mut cache = Cache::new(Duration::from_millis(10));
    cache.set(
        "deliveries|a".into(),
        vec![record("DR-001")],
        Some(Duration::from_secs(60)),
    );
    std::thread::sleep(Duration::from_millis(25));
    assert!(cache.get("deliveries|a").is_some());
}

#[test]
fn get_stale_returns_expired_without_evicting() {
    let mut cache = Cache::new(Duration::from_millis(10));
    cache.set("deliveries|a".into(), vec![record("DR-001")], None);
    std::thread::sleep(Duration::from_millis(25));

    assert!(cache.get_stale("deliveries|a").is_some());
    assert_eq!(cache.len(), 1);
}

#[test]
fn invalidate_prefix_removes_only_that_table() {
    let mut cache = Cache::new(Duration::from_secs(60));
    cache.set("deliveries|a".into(), vec![record("DR-001")], None);
    cache.set("deliveries|b".into(), vec![record("DR-002")], None);
    cache.set("customers|a".into(), vec![record("C-001")], None);

    let removed = cache.invalidate(&InvalidatePattern::Prefix("deliveries|".into()));
    assert_eq!(removed, 2);
    assert!(cache.get("deliveries|a").is_none());
    assert!(cache.get("customers|a").is_some());
}

#[test]
fn invalidate_regex() {
    let mut cache = Cache::new(Duration::from_secs(60));
    cache.set("deliveries|{\"eq\":{\"status\":\"active\"}}".into(), vec![], None);
    cache.set("deliveries|{\"eq\":{}}".into(), vec![], None);

    let pattern = InvalidatePattern::Regex(Regex::new("status").unwrap());
    assert_eq!(cache.invalidate(&pattern), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn clear_expired_sweeps_only_expired() {
    let mut cache = Cache::new(Duration::from_millis(10));
    cache.set("a".into(), vec![], None);
    cache.set("b".into(), vec![], Some(Duration::from_secs(60)));
    std::thread::sleep(Duration::from_millis(25));

    assert_eq!(cache.clear_expired(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn stats_track_hits_misses_sets() {
    let mut cache = Cache::new(Duration::from_secs(60));
    cache.set("a".into(), vec![], None);
    cache.get("a");
    cache.get("a");
    cache.get("missing");

    let stats = cache.stats();
    assert_eq!(stats.sets, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn empty_cache_hit_rate_is_zero() {
    let cache = Cache::new(Duration::from_secs(60));
    assert_eq!(cache.stats().hit_rate(), 0.0);
}
