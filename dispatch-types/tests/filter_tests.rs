use dispatch_types::{FieldMap, QueryFilter, Record, RecordStatus};
use pretty_assertions::assert_eq;
use serde_json::json;

fn delivery(id: &str, reference: &str, status: RecordStatus, amount: f64) -> Record {
    let mut fields = FieldMap::new();
    fields.insert("reference".into(), json!(reference));
    fields.insert("amount".into(), json!(amount));
    Record::new(fields).with_id(id).with_status(status)
}

#[test]
fn cache_key_is_order_independent() {
    let a = QueryFilter::table("deliveries")
        .eq("status", "active")
        .eq("customer_id", "C1")
        .limit(10);
    let b = QueryFilter::table("deliveries")
        .eq("customer_id", "C1")
        .eq("status", "active")
        .limit(10);
    assert_eq!(a.cache_key(), b.cache_key());
}

#[test]
fn cache_key_distinguishes_predicates_and_pagination() {
    let base = QueryFilter::table("deliveries").eq("status", "active");
    assert_ne!(base.cache_key(), base.clone().limit(5).cache_key());
    assert_ne!(base.cache_key(), base.clone().cursor(20).cache_key());
    assert_ne!(
        base.cache_key(),
        QueryFilter::table("deliveries").eq("status", "completed").cache_key()
    );
}

#[test]
fn cache_key_starts_with_table_prefix() {
    let filter = QueryFilter::table("customers").eq("name", "Acme");
    assert!(filter.cache_key().starts_with(&QueryFilter::key_prefix("customers")));
}

#[test]
fn eq_normalizes_field_names() {
    let filter = QueryFilter::table("deliveries").eq("customerId", "C1");
    assert_eq!(filter.eq_predicates().get("customer_id"), Some(&json!("C1")));
}

#[test]
fn matches_on_id_status_and_fields() {
    let record = delivery("d-1", "DR-001", RecordStatus::Active, 120.0);

    assert!(QueryFilter::table("deliveries").eq("id", "d-1").matches(&record));
    assert!(QueryFilter::table("deliveries").eq("status", "active").matches(&record));
    assert!(QueryFilter::table("deliveries").eq("reference", "DR-001").matches(&record));
    assert!(!QueryFilter::table("deliveries").eq("status", "completed").matches(&record));
    assert!(!QueryFilter::table("deliveries").eq("reference", "DR-999").matches(&record));
}

#[test]
fn matches_range_predicates() {
    let record = delivery("d-1", "DR-001", RecordStatus::Active, 120.0);

    assert!(QueryFilter::table("deliveries").min("amount", 100).matches(&record));
    assert!(QueryFilter::table("deliveries").max("amount", 120).matches(&record));
    assert!(!QueryFilter::table("deliveries").min("amount", 121).matches(&record));
    // Missing field never matches a range predicate.
    assert!(!QueryFilter::table("deliveries").min("weight", 1).matches(&record));
}
