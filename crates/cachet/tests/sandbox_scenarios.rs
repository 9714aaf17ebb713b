//! End-to-end behaviour of the sandbox through the public `Cache` API.

use cachet::error::{ErrorKind, ROOT_MUST_EXIST};
use cachet::sandbox::matching::{MatchClause, Pattern};
use cachet::{
    Cache, CacheRegistry, Config, JsonPath, PathSegment, SandboxAdapter, SetStatus, ThreadNamespaces,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn sandbox(name: &str) -> Cache {
    Cache::new(name, Arc::new(SandboxAdapter::new(name)), None)
}

fn path(segments: &[&str]) -> JsonPath {
    JsonPath::new(segments.iter().copied())
}

fn sorted(mut values: Vec<Value>) -> Vec<Value> {
    values.sort_by_key(|v| v.to_string());
    values
}

// ============================================================================
// Concrete scenarios
// ============================================================================

#[test]
fn test_put_then_get() {
    let cache = sandbox("scenarios");
    cache.put("user:1", json!({"name": "a"})).unwrap();
    assert_eq!(cache.get("user:1").unwrap(), Some(json!({"name": "a"})));
}

#[test]
fn test_insert_raw_then_match_object() {
    let cache = sandbox("scenarios");
    cache.insert_raw(vec![json!("k1"), json!("v")]).unwrap();
    cache.insert_raw(vec![json!("k2"), json!("v")]).unwrap();

    let found = cache
        .match_object(&Pattern::from_json(&json!(["_", "v"])), None)
        .unwrap();
    assert_eq!(sorted(found), vec![json!(["k1", "v"]), json!(["k2", "v"])]);
}

#[test]
fn test_json_set_nested_then_get() {
    let cache = sandbox("scenarios");
    cache
        .json_set("doc", &JsonPath::root(), json!({"a": {"b": 1}}))
        .unwrap();
    cache.json_set("doc", &path(&["a", "b"]), json!(5)).unwrap();
    assert_eq!(cache.json_get("doc", &path(&["a", "b"])).unwrap(), Some(json!(5)));
}

#[test]
fn test_json_get_missing_path_message() {
    let cache = sandbox("scenarios");
    cache.json_set("doc", &JsonPath::root(), json!({"a": 1})).unwrap();

    let err = cache.json_get("doc", &path(&["missing"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "ERR Path '$.missing' does not exist");
}

#[test]
fn test_hash_set_many_reports_new_fields() {
    let cache = sandbox("scenarios");
    let groups = vec![(
        "h".to_string(),
        vec![("f1".to_string(), json!("v")), ("f2".to_string(), json!("v"))],
    )];

    let first = cache.hash_set_many(&groups, None).unwrap();
    assert_eq!(first[0].new_fields, 2);
    let second = cache.hash_set_many(&groups, None).unwrap();
    assert_eq!(second[0].new_fields, 0);
}

#[test]
fn test_json_array_append() {
    let cache = sandbox("scenarios");
    cache.json_set("doc", &JsonPath::root(), json!({"items": []})).unwrap();

    let len = cache
        .json_array_append("doc", &path(&["items"]), vec![json!(1), json!(2)])
        .unwrap();
    assert_eq!(len, 2);
    assert_eq!(
        cache.json_get("doc", &path(&["items"])).unwrap(),
        Some(json!([1, 2]))
    );
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_root_existence_invariant() {
    let cache = sandbox("invariants");

    let err = cache
        .json_set("missing-key", &path(&["a", "b"]), json!(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.to_string(), ROOT_MUST_EXIST);
    assert_eq!(cache.get("missing-key").unwrap(), None);

    let status = cache.json_set("missing-key", &JsonPath::root(), json!(1)).unwrap();
    assert_eq!(status, SetStatus::Written);
    assert_eq!(cache.json_get("missing-key", &JsonPath::root()).unwrap(), Some(json!(1)));
}

#[test]
fn test_intermediate_containers_report_parent_missing() {
    let cache = sandbox("invariants");
    cache.json_set("doc", &JsonPath::root(), json!({})).unwrap();

    let status = cache.json_set("doc", &path(&["a", "b"]), json!(1)).unwrap();
    assert_eq!(status, SetStatus::ParentMissing);
    assert_eq!(cache.get("doc").unwrap(), Some(json!({"a": {"b": 1}})));
}

#[test]
fn test_idempotent_deletes() {
    let cache = sandbox("invariants");

    cache.delete("absent").unwrap();
    cache.delete("absent").unwrap();

    assert_eq!(cache.hash_delete("h", "f").unwrap(), 0);
    assert_eq!(cache.hash_delete("h", "f").unwrap(), 0);

    cache.json_set("doc", &JsonPath::root(), json!({"a": 1})).unwrap();
    assert_eq!(cache.json_delete("doc", &path(&["zzz"])).unwrap(), 0);
    assert_eq!(cache.json_delete("doc", &path(&["zzz"])).unwrap(), 0);
    assert_eq!(cache.json_delete("nodoc", &JsonPath::root()).unwrap(), 0);
    assert_eq!(cache.json_delete("nodoc", &JsonPath::root()).unwrap(), 0);
}

#[test]
fn test_hash_ttl_is_acknowledged_but_not_enforced() {
    let cache = sandbox("invariants");
    let write = cache
        .hash_set("h", "f", json!(1), Some(Duration::from_millis(1)))
        .unwrap();
    assert!(write.ttl_acknowledged);
    assert_eq!(write.new_fields, 1);

    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(cache.hash_get("h", "f").unwrap(), Some(json!(1)));
}

#[test]
fn test_select_delete_and_replace() {
    let cache = sandbox("table");
    for (key, n) in [("a", 1), ("b", 2), ("c", 3)] {
        cache.insert_raw(vec![json!(key), json!(n)]).unwrap();
    }

    // Delete where the value is 2.
    let delete_twos = MatchClause::parse_spec(&json!([[["_", 2], [], [true]]])).unwrap();
    assert_eq!(cache.select_delete(&delete_twos).unwrap(), 1);
    assert!(!cache.member("b").unwrap());

    // Literal results are not templates: the key becomes "$1" and the whole
    // call is rejected.
    let rekey = MatchClause::parse_spec(&json!([[["$1", "_"], [], [["$1", 0]]]])).unwrap();
    assert!(cache.select_replace(&rekey).is_err());
    assert_eq!(cache.get("a").unwrap(), Some(json!(1)));

    let keep = MatchClause::parse_spec(&json!([[["_", "_"], [], ["$_"]]])).unwrap();
    assert_eq!(cache.select_replace(&keep).unwrap(), 2);
    assert_eq!(cache.info().unwrap().size, 2);
}

#[test]
fn test_replace_keeps_hash_shape() {
    let cache = sandbox("table");
    cache.hash_set("h", "f", json!(1), None).unwrap();

    let keep = MatchClause::parse_spec(&json!([["_", [], ["$_"]]])).unwrap();
    assert_eq!(cache.select_replace(&keep).unwrap(), 1);
    assert_eq!(cache.hash_get("h", "f").unwrap(), Some(json!(1)));
}

#[test]
fn test_json_set_past_list_end_is_not_found() {
    let cache = sandbox("invariants");
    cache.json_set("doc", &JsonPath::root(), json!({"l": []})).unwrap();

    let far = JsonPath::new([PathSegment::from("l"), PathSegment::from(usize::MAX / 2)]);
    let err = cache.json_set("doc", &far, json!(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(cache.get("doc").unwrap(), Some(json!({"l": []})));
}

#[test]
fn test_select_projects_bindings() {
    let cache = sandbox("table");
    cache.insert_raw(vec![json!("u1"), json!("ada"), json!(36)]).unwrap();
    cache.insert_raw(vec![json!("u2"), json!("bob"), json!(41)]).unwrap();

    let names = MatchClause::parse_spec(&json!([[["_", "$1", "$2"], [], ["$$"]]])).unwrap();
    let rows = cache.select(&names, None).unwrap();
    assert_eq!(rows, vec![json!(["ada", 36]), json!(["bob", 41])]);

    let limited = cache.select(&names, Some(1)).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn test_update_counter_on_row() {
    let cache = sandbox("table");
    cache
        .insert_raw(vec![json!("hits"), json!("/home"), json!(10)])
        .unwrap();
    assert_eq!(cache.update_counter("hits", 3, 5).unwrap(), 15);
    assert_eq!(cache.update_counter("hits", 3, -20).unwrap(), -5);
    assert_eq!(cache.get("hits").unwrap(), Some(json!(["/home", -5])));
}

// ============================================================================
// Isolation
// ============================================================================

#[test]
fn test_isolated_threads_share_store_but_not_keys() {
    let namespaces = Arc::new(ThreadNamespaces::new());
    let cache = Arc::new(Cache::new(
        "iso",
        Arc::new(SandboxAdapter::isolated("iso", namespaces.clone())),
        None,
    ));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let namespaces = Arc::clone(&namespaces);
            std::thread::spawn(move || {
                namespaces.register("iso");
                cache.put("shared-name", json!(i)).unwrap();
                cache.insert_raw(vec![json!("row"), json!(i)]).unwrap();
                let seen = cache.match_object(&Pattern::any(), None).unwrap();
                (i, cache.get("shared-name").unwrap(), seen.len())
            })
        })
        .collect();

    for handle in handles {
        let (i, value, visible) = handle.join().unwrap();
        assert_eq!(value, Some(json!(i)));
        assert_eq!(visible, 2);
    }
}

#[test]
fn test_helper_thread_joins_namespace() {
    let namespaces = Arc::new(ThreadNamespaces::new());
    let cache = Cache::new(
        "iso",
        Arc::new(SandboxAdapter::isolated("iso", namespaces.clone())),
        None,
    );
    let ns = namespaces.register("iso");
    cache.put("k", json!("from main")).unwrap();

    let seen = std::thread::scope(|s| {
        s.spawn(|| {
            namespaces.register_as("iso", ns.clone()).unwrap();
            cache.get("k").unwrap()
        })
        .join()
        .unwrap()
    });
    assert_eq!(seen, Some(json!("from main")));
}

#[test]
fn test_registry_with_namespaces() {
    let config: Config = serde_yaml::from_str(
        "sandbox: true\ncaches:\n  - name: sessions\n    backend: redis\n    redis:\n      url: redis://nowhere:1\n",
    )
    .unwrap();
    let namespaces = Arc::new(ThreadNamespaces::new());
    let registry = CacheRegistry::from_config(&config, Some(namespaces.clone())).unwrap();
    let sessions = registry.get("sessions").unwrap();

    let err = sessions.get("k").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    namespaces.register("sessions");
    sessions.put("k", json!(1)).unwrap();
    assert_eq!(sessions.get("k").unwrap(), Some(json!(1)));
    assert!(sessions.info().unwrap().isolated);
}
