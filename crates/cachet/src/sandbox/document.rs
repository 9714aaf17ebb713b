//! Partial reads and writes inside nested JSON documents.
//!
//! These functions reproduce the remote JSON backend's rules:
//! - a non-root write never creates the document itself;
//! - writes below an existing document create missing containers on the way,
//!   choosing a list when the next segment looks like an index;
//! - reads, increments and appends on a missing path fail with the backend's
//!   exact `ERR Path '$.<path>' does not exist` message.
//!
//! Every written value goes through a serialize/parse round trip first so a
//! later read compares equal to what the backend would hand back.

use crate::adapter::SetStatus;
use crate::error::{CacheError, CacheResult};
use crate::path::{JsonPath, PathSegment};
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Round-trip a value through its serialized form.
pub fn normalize<T: Serialize + ?Sized>(value: &T) -> CacheResult<Value> {
    let encoded = serde_json::to_vec(value)?;
    Ok(serde_json::from_slice(&encoded)?)
}

fn describe(path: &JsonPath) -> String {
    if path.is_root() {
        "$".to_string()
    } else {
        format!("$.{}", path.to_wire())
    }
}

fn not_found(path: &JsonPath) -> CacheError {
    CacheError::path_not_found(&path.to_wire())
}

fn child<'a>(value: &'a Value, segment: &PathSegment) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(&segment.as_key()),
        Value::Array(items) => items.get(segment.as_index()?),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(&segment.as_key()),
        Value::Array(items) => items.get_mut(segment.as_index()?),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Value, path: &JsonPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(doc, |current, segment| child(current, segment))
}

fn resolve_mut<'a>(doc: &'a mut Value, path: &JsonPath) -> Option<&'a mut Value> {
    path.segments()
        .iter()
        .try_fold(doc, |current, segment| child_mut(current, segment))
}

/// Empty container suited to hold `next`.
fn container_for(next: &PathSegment) -> Value {
    if next.looks_like_index() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

/// Write `value` into `container` under `segment`. A list index may
/// overwrite an element or append exactly one past the end.
fn place(container: &mut Value, segment: &PathSegment, value: Value) -> Option<()> {
    match container {
        Value::Object(map) => {
            map.insert(segment.as_key(), value);
        }
        Value::Array(items) => {
            let index = segment.as_index()?;
            match index.cmp(&items.len()) {
                std::cmp::Ordering::Less => items[index] = value,
                std::cmp::Ordering::Equal => items.push(value),
                std::cmp::Ordering::Greater => return None,
            }
        }
        _ => return None,
    }
    Some(())
}

/// Descend into `segment`, creating a container for `next` when the slot is
/// missing or null. Sets `created` when anything had to be made.
fn descend_or_create<'a>(
    current: &'a mut Value,
    segment: &PathSegment,
    next: &PathSegment,
    created: &mut bool,
) -> Option<&'a mut Value> {
    let present = matches!(child(current, segment), Some(v) if !v.is_null());
    if !present {
        place(current, segment, container_for(next))?;
        *created = true;
    }
    child_mut(current, segment)
}

/// Read the value at `path`.
pub fn get(doc: &Value, path: &JsonPath) -> CacheResult<Value> {
    resolve(doc, path).cloned().ok_or_else(|| not_found(path))
}

/// Build a new document for a key that does not exist yet. Only a root
/// write may create a document.
pub fn create(path: &JsonPath, value: &Value) -> CacheResult<Value> {
    if !path.is_root() {
        return Err(CacheError::root_must_exist());
    }
    normalize(value)
}

/// Write `value` at `path` inside an existing document.
///
/// Returns [`SetStatus::ParentMissing`] when the parent of the target had to
/// be created (or was null) before the write.
pub fn set(doc: &mut Value, path: &JsonPath, value: &Value) -> CacheResult<SetStatus> {
    let value = normalize(value)?;
    let Some((parent_path, last)) = path.split_last() else {
        *doc = value;
        return Ok(SetStatus::Written);
    };

    // Work on a copy so a write that fails halfway leaves the document as it was.
    let mut staged = doc.clone();
    let mut created = false;
    if staged.is_null() {
        let first = parent_path.segments().first().unwrap_or(last);
        staged = container_for(first);
        created = true;
    }

    let segments = parent_path.segments();
    let mut current = &mut staged;
    for (i, segment) in segments.iter().enumerate() {
        let next = segments.get(i + 1).unwrap_or(last);
        current = descend_or_create(current, segment, next, &mut created)
            .ok_or_else(|| not_found(path))?;
    }

    if current.is_null() {
        *current = container_for(last);
        created = true;
    }
    place(current, last, value).ok_or_else(|| not_found(path))?;
    *doc = staged;

    Ok(if created {
        SetStatus::ParentMissing
    } else {
        SetStatus::Written
    })
}

fn add_numbers(current: &Number, delta: &Number) -> Option<Number> {
    match (current.as_i64(), delta.as_i64()) {
        (Some(a), Some(b)) => a.checked_add(b).map(Number::from),
        _ => Number::from_f64(current.as_f64()? + delta.as_f64()?),
    }
}

/// Add `delta` to the number at `path`, returning the new value.
pub fn increment(doc: &mut Value, path: &JsonPath, delta: &Value) -> CacheResult<Value> {
    let Value::Number(delta) = delta else {
        return Err(CacheError::BadRequest(format!(
            "ERR increment value must be a number, got {delta}"
        )));
    };
    let target = resolve_mut(doc, path).ok_or_else(|| not_found(path))?;
    let Value::Number(current) = &*target else {
        return Err(CacheError::BadRequest(format!(
            "ERR Path '{}' does not contain a number",
            describe(path)
        )));
    };
    let sum = add_numbers(current, delta).ok_or_else(|| {
        CacheError::BadRequest(format!(
            "ERR increment at '{}' overflows",
            describe(path)
        ))
    })?;
    *target = Value::Number(sum.clone());
    Ok(Value::Number(sum))
}

fn empty_like(value: &Value) -> Value {
    match value {
        Value::Number(_) => Value::from(0),
        Value::Array(_) => Value::Array(Vec::new()),
        Value::Object(_) => Value::Object(Map::new()),
        _ => Value::Null,
    }
}

/// Reset the value at `path`, returning 1 if a value was there. Never
/// creates the path.
pub fn clear(doc: &mut Value, path: &JsonPath) -> usize {
    match resolve_mut(doc, path) {
        Some(target) => {
            *target = empty_like(target);
            1
        }
        None => 0,
    }
}

/// Remove the node at `path`, returning the number of nodes removed. At the
/// root the document becomes null; callers drop the key.
pub fn delete(doc: &mut Value, path: &JsonPath) -> usize {
    let Some((parent_path, last)) = path.split_last() else {
        *doc = Value::Null;
        return 1;
    };
    match resolve_mut(doc, &parent_path) {
        Some(Value::Object(map)) => usize::from(map.remove(&last.as_key()).is_some()),
        Some(Value::Array(items)) => match last.as_index() {
            Some(index) if index < items.len() => {
                items.remove(index);
                1
            }
            _ => 0,
        },
        _ => 0,
    }
}

/// Append `values` to the list at `path`, returning its new length.
pub fn append(doc: &mut Value, path: &JsonPath, values: &[Value]) -> CacheResult<usize> {
    let normalized = values
        .iter()
        .map(normalize)
        .collect::<CacheResult<Vec<_>>>()?;
    match resolve_mut(doc, path) {
        Some(Value::Array(items)) => {
            items.extend(normalized);
            Ok(items.len())
        }
        Some(_) => Err(CacheError::BadRequest(format!(
            "ERR Path '{}' is not an array",
            describe(path)
        ))),
        None => Err(not_found(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(segments: &[&str]) -> JsonPath {
        JsonPath::new(segments.iter().copied())
    }

    #[test]
    fn test_get_nested() {
        let doc = json!({"a": {"b": [10, {"c": true}]}});
        assert_eq!(get(&doc, &p(&["a", "b"])).unwrap(), json!([10, {"c": true}]));
        let path = JsonPath::new([
            PathSegment::from("a"),
            PathSegment::from("b"),
            PathSegment::from(1usize),
            PathSegment::from("c"),
        ]);
        assert_eq!(get(&doc, &path).unwrap(), json!(true));
        assert_eq!(get(&doc, &JsonPath::root()).unwrap(), doc);
    }

    #[test]
    fn test_get_missing_path_message() {
        let doc = json!({"a": 1});
        let err = get(&doc, &p(&["missing"])).unwrap_err();
        assert_eq!(err.to_string(), "ERR Path '$.missing' does not exist");

        let err = get(&doc, &p(&["a", "deeper"])).unwrap_err();
        assert_eq!(err.to_string(), "ERR Path '$.a.deeper' does not exist");
    }

    #[test]
    fn test_create_requires_root() {
        assert_eq!(create(&JsonPath::root(), &json!(1)).unwrap(), json!(1));
        let err = create(&p(&["a", "b"]), &json!(1)).unwrap_err();
        assert_eq!(err.to_string(), "ERR new objects must be created at the root");
    }

    #[test]
    fn test_set_existing_path() {
        let mut doc = json!({"a": {"b": 1}});
        let status = set(&mut doc, &p(&["a", "b"]), &json!(5)).unwrap();
        assert_eq!(status, SetStatus::Written);
        assert_eq!(doc, json!({"a": {"b": 5}}));
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let mut doc = json!({});
        let status = set(&mut doc, &p(&["x", "y", "z"]), &json!("deep")).unwrap();
        assert_eq!(status, SetStatus::ParentMissing);
        assert_eq!(doc, json!({"x": {"y": {"z": "deep"}}}));
    }

    #[test]
    fn test_set_numeric_segment_creates_list() {
        let mut doc = json!({});
        set(&mut doc, &p(&["items", "0", "name"]), &json!("first")).unwrap();
        assert_eq!(doc, json!({"items": [{"name": "first"}]}));
    }

    #[test]
    fn test_set_list_index_overwrites_or_appends() {
        let mut doc = json!({"l": [1]});
        let at = |i: usize| JsonPath::new([PathSegment::from("l"), PathSegment::from(i)]);
        assert_eq!(set(&mut doc, &at(0), &json!(9)).unwrap(), SetStatus::Written);
        assert_eq!(set(&mut doc, &at(1), &json!(2)).unwrap(), SetStatus::Written);
        assert_eq!(doc, json!({"l": [9, 2]}));
    }

    #[test]
    fn test_set_list_index_out_of_range() {
        let mut doc = json!({"l": []});
        let path = JsonPath::new([PathSegment::from("l"), PathSegment::from(usize::MAX / 2)]);
        let err = set(&mut doc, &path, &json!(1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
        assert_eq!(doc, json!({"l": []}));

        let gap = JsonPath::new([PathSegment::from("l"), PathSegment::from(3usize)]);
        assert!(set(&mut doc, &gap, &json!(1)).is_err());
        assert_eq!(doc, json!({"l": []}));
    }

    #[test]
    fn test_failed_set_leaves_document_untouched() {
        let mut doc = json!({});
        let err = set(&mut doc, &p(&["x", "5", "y"]), &json!(1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn test_set_under_null_parent() {
        let mut doc = json!({"a": null});
        let status = set(&mut doc, &p(&["a", "b"]), &json!(1)).unwrap();
        assert_eq!(status, SetStatus::ParentMissing);
        assert_eq!(doc, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut doc = json!({"a": 5});
        let err = set(&mut doc, &p(&["a", "b"]), &json!(1)).unwrap_err();
        assert_eq!(err.to_string(), "ERR Path '$.a.b' does not exist");
        assert_eq!(doc, json!({"a": 5}));
    }

    #[test]
    fn test_set_root_replaces() {
        let mut doc = json!({"a": 1});
        set(&mut doc, &JsonPath::root(), &json!([1, 2])).unwrap();
        assert_eq!(doc, json!([1, 2]));
    }

    #[test]
    fn test_increment() {
        let mut doc = json!({"n": 1, "f": 1.5, "s": "x"});
        assert_eq!(increment(&mut doc, &p(&["n"]), &json!(2)).unwrap(), json!(3));
        assert_eq!(increment(&mut doc, &p(&["f"]), &json!(1)).unwrap(), json!(2.5));
        assert_eq!(doc["n"], json!(3));

        let err = increment(&mut doc, &p(&["missing"]), &json!(1)).unwrap_err();
        assert_eq!(err.to_string(), "ERR Path '$.missing' does not exist");

        let err = increment(&mut doc, &p(&["s"]), &json!(1)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadRequest);
    }

    #[test]
    fn test_increment_overflow() {
        let mut doc = json!({"n": i64::MAX});
        assert!(increment(&mut doc, &p(&["n"]), &json!(1)).is_err());
        assert_eq!(doc["n"], json!(i64::MAX));
    }

    #[test]
    fn test_clear() {
        let mut doc = json!({"n": 7, "l": [1], "m": {"k": 1}, "s": "text"});
        assert_eq!(clear(&mut doc, &p(&["n"])), 1);
        assert_eq!(clear(&mut doc, &p(&["l"])), 1);
        assert_eq!(clear(&mut doc, &p(&["m"])), 1);
        assert_eq!(clear(&mut doc, &p(&["s"])), 1);
        assert_eq!(clear(&mut doc, &p(&["absent"])), 0);
        assert_eq!(doc, json!({"n": 0, "l": [], "m": {}, "s": null}));
    }

    #[test]
    fn test_delete() {
        let mut doc = json!({"a": {"b": 1}, "l": [1, 2, 3]});
        assert_eq!(delete(&mut doc, &p(&["a", "b"])), 1);
        assert_eq!(delete(&mut doc, &p(&["a", "b"])), 0);
        let idx = JsonPath::new([PathSegment::from("l"), PathSegment::from(1usize)]);
        assert_eq!(delete(&mut doc, &idx), 1);
        assert_eq!(doc, json!({"a": {}, "l": [1, 3]}));
        assert_eq!(delete(&mut doc, &JsonPath::root()), 1);
        assert!(doc.is_null());
    }

    #[test]
    fn test_append() {
        let mut doc = json!({"items": [], "n": 1});
        assert_eq!(append(&mut doc, &p(&["items"]), &[json!(1), json!(2)]).unwrap(), 2);
        assert_eq!(append(&mut doc, &p(&["items"]), &[json!(3)]).unwrap(), 3);
        assert_eq!(doc["items"], json!([1, 2, 3]));

        let err = append(&mut doc, &p(&["nope"]), &[json!(1)]).unwrap_err();
        assert_eq!(err.to_string(), "ERR Path '$.nope' does not exist");
        assert!(append(&mut doc, &p(&["n"]), &[json!(1)]).is_err());
    }

    #[test]
    fn test_normalize_typed_value() {
        #[derive(Serialize)]
        enum Status {
            Active,
        }
        #[derive(Serialize)]
        struct User {
            name: &'static str,
            status: Status,
        }
        let value = normalize(&User {
            name: "a",
            status: Status::Active,
        })
        .unwrap();
        assert_eq!(value, json!({"name": "a", "status": "Active"}));
    }
}
