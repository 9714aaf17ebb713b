//! Single-owner record map behind one cache.
//!
//! Every operation takes the store lock once and finishes its whole
//! read-modify-write sequence before releasing it, so pattern and path
//! mutations never observe a half-written map.
//!
//! Single-key methods take fully scoped keys. Bulk table methods take a
//! [`KeyScope`] and only see the records inside it, presented with the scope
//! prefix removed.

use super::document;
use super::matching::{self, MatchClause, Pattern};
use super::namespace::KeyScope;
use crate::adapter::{SetStatus, TableInfo};
use crate::error::{CacheError, CacheResult};
use crate::path::JsonPath;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// The unit stored under a key. A key holds exactly one shape at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Scalar(Value),
    /// Tuple elements after the key, for tuples wider than `[key, value]`.
    Row(Vec<Value>),
    Fields(BTreeMap<String, Value>),
    Document(Value),
}

impl Record {
    /// Record for the elements following the key. `like` keeps a document a
    /// document, and a field-map a field-map, when it is replaced in place.
    fn from_tail(mut tail: Vec<Value>, like: Option<&Record>) -> Self {
        if tail.len() == 1 {
            let value = tail.remove(0);
            match (like, value) {
                (Some(Record::Document(_)), value) => Record::Document(value),
                (Some(Record::Fields(_)), Value::Object(fields)) => {
                    Record::Fields(fields.into_iter().collect())
                }
                (_, value) => Record::Scalar(value),
            }
        } else {
            Record::Row(tail)
        }
    }

    /// Tuple view: `[key, ...]`.
    fn to_tuple(&self, key: &str) -> Value {
        let mut tuple = vec![Value::String(key.to_string())];
        match self {
            Record::Scalar(v) | Record::Document(v) => tuple.push(v.clone()),
            Record::Row(tail) => tuple.extend(tail.iter().cloned()),
            Record::Fields(fields) => tuple.push(Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>(),
            )),
        }
        Value::Array(tuple)
    }
}

/// Split a tuple into its key and the remaining elements.
fn split_tuple(tuple: Vec<Value>) -> CacheResult<(String, Vec<Value>)> {
    if tuple.len() < 2 {
        return Err(CacheError::BadRequest(format!(
            "a record needs a key and at least one value, got {} element(s)",
            tuple.len()
        )));
    }
    let mut elements = tuple.into_iter();
    match elements.next() {
        Some(Value::String(key)) => Ok((key, elements.collect())),
        other => Err(CacheError::BadRequest(format!(
            "record keys must be strings, got {}",
            other.unwrap_or(Value::Null)
        ))),
    }
}

pub struct RecordStore {
    name: String,
    records: Mutex<BTreeMap<String, Record>>,
}

impl RecordStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of records across all scopes.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Scoped records as `(stored_key, tuple)` pairs, in key order.
    fn scoped_tuples(records: &BTreeMap<String, Record>, scope: &KeyScope) -> Vec<(String, Value)> {
        let start = scope.range_start();
        records
            .range(start..)
            .map_while(|(stored, record)| {
                scope
                    .strip(stored)
                    .map(|raw| (stored.clone(), record.to_tuple(raw)))
            })
            .collect()
    }

    /// Scoped records that can match `pattern`. A pattern pinning the key is
    /// answered with a single lookup.
    fn candidates(records: &BTreeMap<String, Record>, scope: &KeyScope, pattern: &Pattern) -> Vec<(String, Value)> {
        match pattern.key_literal() {
            Some(Value::String(raw)) => {
                let stored = scope.key_for(raw);
                records
                    .get(&stored)
                    .map(|record| (stored.clone(), record.to_tuple(raw)))
                    .into_iter()
                    .collect()
            }
            _ => Self::scoped_tuples(records, scope),
        }
    }

    // ---------------------------------------------------------------------
    // Scalars
    // ---------------------------------------------------------------------

    pub fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        match self.records.lock().get(key) {
            None => Ok(None),
            Some(Record::Scalar(v)) | Some(Record::Document(v)) => Ok(Some(v.clone())),
            Some(Record::Row(tail)) => Ok(Some(Value::Array(tail.clone()))),
            Some(Record::Fields(_)) => Err(CacheError::wrong_type()),
        }
    }

    /// Store a scalar. `Value::Null` removes the key instead.
    pub fn put(&self, key: &str, value: Value) {
        let mut records = self.records.lock();
        if value.is_null() {
            records.remove(key);
        } else {
            records.insert(key.to_string(), Record::Scalar(value));
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.records.lock().remove(key).is_some()
    }

    pub fn member(&self, key: &str) -> bool {
        self.records.lock().contains_key(key)
    }

    // ---------------------------------------------------------------------
    // Field maps
    // ---------------------------------------------------------------------

    fn fields<'a>(records: &'a BTreeMap<String, Record>, key: &str) -> CacheResult<Option<&'a BTreeMap<String, Value>>> {
        match records.get(key) {
            None => Ok(None),
            Some(Record::Fields(fields)) => Ok(Some(fields)),
            Some(_) => Err(CacheError::wrong_type()),
        }
    }

    fn fields_mut<'a>(
        records: &'a mut BTreeMap<String, Record>,
        key: &str,
    ) -> CacheResult<&'a mut BTreeMap<String, Value>> {
        match records
            .entry(key.to_string())
            .or_insert_with(|| Record::Fields(BTreeMap::new()))
        {
            Record::Fields(fields) => Ok(fields),
            _ => Err(CacheError::wrong_type()),
        }
    }

    pub fn hash_get(&self, key: &str, field: &str) -> CacheResult<Option<Value>> {
        let records = self.records.lock();
        Ok(Self::fields(&records, key)?.and_then(|fields| fields.get(field).cloned()))
    }

    pub fn hash_get_all(&self, key: &str) -> CacheResult<BTreeMap<String, Value>> {
        let records = self.records.lock();
        Ok(Self::fields(&records, key)?.cloned().unwrap_or_default())
    }

    pub fn hash_get_many(&self, requests: &[(String, Vec<String>)]) -> CacheResult<Vec<Vec<Option<Value>>>> {
        let records = self.records.lock();
        requests
            .iter()
            .map(|(key, wanted)| {
                let fields = Self::fields(&records, key)?;
                Ok(wanted
                    .iter()
                    .map(|field| fields.and_then(|f| f.get(field).cloned()))
                    .collect())
            })
            .collect()
    }

    /// Set one field, returning 1 if it was new.
    pub fn hash_set(&self, key: &str, field: &str, value: Value) -> CacheResult<usize> {
        let mut records = self.records.lock();
        let fields = Self::fields_mut(&mut records, key)?;
        Ok(usize::from(fields.insert(field.to_string(), value).is_none()))
    }

    /// Set many fields across many keys, returning the number of new fields
    /// per group. Shapes are checked for every group before anything is written.
    pub fn hash_set_many(&self, groups: &[(String, Vec<(String, Value)>)]) -> CacheResult<Vec<usize>> {
        let mut records = self.records.lock();
        for (key, _) in groups {
            Self::fields(&records, key)?;
        }
        let mut added = Vec::with_capacity(groups.len());
        for (key, pairs) in groups {
            if pairs.is_empty() {
                added.push(0);
                continue;
            }
            let fields = Self::fields_mut(&mut records, key)?;
            let mut new_fields = 0;
            for (field, value) in pairs {
                if fields.insert(field.clone(), value.clone()).is_none() {
                    new_fields += 1;
                }
            }
            added.push(new_fields);
        }
        Ok(added)
    }

    /// Remove a field. Removing the last field removes the key.
    pub fn hash_delete(&self, key: &str, field: &str) -> CacheResult<usize> {
        let mut records = self.records.lock();
        let Some(Record::Fields(fields)) = records.get_mut(key) else {
            return match records.get(key) {
                None => Ok(0),
                Some(_) => Err(CacheError::wrong_type()),
            };
        };
        let removed = fields.remove(field).is_some();
        if fields.is_empty() {
            records.remove(key);
        }
        Ok(usize::from(removed))
    }

    pub fn hash_values(&self, key: &str) -> CacheResult<Vec<Value>> {
        let records = self.records.lock();
        Ok(Self::fields(&records, key)?
            .map(|fields| fields.values().cloned().collect())
            .unwrap_or_default())
    }

    // ---------------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------------

    fn document<'a>(records: &'a BTreeMap<String, Record>, key: &str) -> CacheResult<Option<&'a Value>> {
        match records.get(key) {
            None => Ok(None),
            Some(Record::Document(doc)) => Ok(Some(doc)),
            Some(_) => Err(CacheError::wrong_type()),
        }
    }

    fn document_mut<'a>(records: &'a mut BTreeMap<String, Record>, key: &str) -> CacheResult<Option<&'a mut Value>> {
        match records.get_mut(key) {
            None => Ok(None),
            Some(Record::Document(doc)) => Ok(Some(doc)),
            Some(_) => Err(CacheError::wrong_type()),
        }
    }

    /// `Ok(None)` when the key is absent; a missing path on an existing key
    /// is a not-found error.
    pub fn json_get(&self, key: &str, path: &JsonPath) -> CacheResult<Option<Value>> {
        let records = self.records.lock();
        match Self::document(&records, key)? {
            None => Ok(None),
            Some(doc) => document::get(doc, path).map(Some),
        }
    }

    pub fn json_set(&self, key: &str, path: &JsonPath, value: &Value) -> CacheResult<SetStatus> {
        let mut records = self.records.lock();
        match Self::document_mut(&mut records, key)? {
            Some(doc) => document::set(doc, path, value),
            None => {
                let doc = document::create(path, value)?;
                records.insert(key.to_string(), Record::Document(doc));
                Ok(SetStatus::Written)
            }
        }
    }

    pub fn json_delete(&self, key: &str, path: &JsonPath) -> CacheResult<usize> {
        let mut records = self.records.lock();
        let Some(doc) = Self::document_mut(&mut records, key)? else {
            return Ok(0);
        };
        let removed = document::delete(doc, path);
        if path.is_root() {
            records.remove(key);
        }
        Ok(removed)
    }

    pub fn json_incr(&self, key: &str, path: &JsonPath, delta: &Value) -> CacheResult<Value> {
        let mut records = self.records.lock();
        match Self::document_mut(&mut records, key)? {
            Some(doc) => document::increment(doc, path, delta),
            None => Err(CacheError::path_not_found(&path.to_wire())),
        }
    }

    pub fn json_clear(&self, key: &str, path: &JsonPath) -> CacheResult<usize> {
        let mut records = self.records.lock();
        Ok(Self::document_mut(&mut records, key)?
            .map(|doc| document::clear(doc, path))
            .unwrap_or(0))
    }

    pub fn json_append(&self, key: &str, path: &JsonPath, values: &[Value]) -> CacheResult<usize> {
        let mut records = self.records.lock();
        match Self::document_mut(&mut records, key)? {
            Some(doc) => document::append(doc, path, values),
            None => Err(CacheError::path_not_found(&path.to_wire())),
        }
    }

    // ---------------------------------------------------------------------
    // Table operations
    // ---------------------------------------------------------------------

    /// Store a full tuple under `scope`, replacing any record with that key.
    pub fn insert_raw(&self, scope: &KeyScope, tuple: Vec<Value>) -> CacheResult<()> {
        let (key, tail) = split_tuple(tuple)?;
        self.records
            .lock()
            .insert(scope.key_for(&key), Record::from_tail(tail, None));
        Ok(())
    }

    pub fn match_object(&self, scope: &KeyScope, pattern: &Pattern, limit: Option<usize>) -> Vec<Value> {
        let records = self.records.lock();
        let matched = Self::candidates(&records, scope, pattern)
            .into_iter()
            .map(|(_, tuple)| tuple)
            .filter(|tuple| matching::matches(tuple, pattern));
        match limit {
            Some(limit) => matched.take(limit).collect(),
            None => matched.collect(),
        }
    }

    pub fn select(&self, scope: &KeyScope, clauses: &[MatchClause], limit: Option<usize>) -> Vec<Value> {
        let records = self.records.lock();
        let tuples = Self::scoped_tuples(&records, scope);
        matching::select(tuples.iter().map(|(_, tuple)| tuple), clauses, limit)
    }

    pub fn select_delete(&self, scope: &KeyScope, clauses: &[MatchClause]) -> usize {
        let mut records = self.records.lock();
        let doomed: Vec<String> = Self::scoped_tuples(&records, scope)
            .into_iter()
            .filter(|(_, tuple)| {
                matching::evaluate(tuple, clauses).is_some_and(|result| matching::is_truthy(&result))
            })
            .map(|(stored, _)| stored)
            .collect();
        for stored in &doomed {
            records.remove(stored);
        }
        debug!(store = %self.name, removed = doomed.len(), "select_delete");
        doomed.len()
    }

    /// Replace records whose projection is a tuple with the same key. A
    /// projection that changes the key rejects the whole call.
    pub fn select_replace(&self, scope: &KeyScope, clauses: &[MatchClause]) -> CacheResult<usize> {
        let mut records = self.records.lock();
        let mut replacements = Vec::new();
        for (stored, tuple) in Self::scoped_tuples(&records, scope) {
            let Some(Value::Array(projected)) = matching::evaluate(&tuple, clauses) else {
                continue;
            };
            if projected.first() != tuple.get(0) {
                return Err(CacheError::BadRequest(format!(
                    "select_replace may not change the key of {tuple}"
                )));
            }
            let (_, tail) = split_tuple(projected)?;
            replacements.push((stored, tail));
        }

        let replaced = replacements.len();
        for (stored, tail) in replacements {
            match Record::from_tail(tail, records.get(&stored)) {
                Record::Fields(fields) if fields.is_empty() => {
                    records.remove(&stored);
                }
                record => {
                    records.insert(stored, record);
                }
            }
        }
        debug!(store = %self.name, replaced, "select_replace");
        Ok(replaced)
    }

    pub fn match_delete(&self, scope: &KeyScope, pattern: &Pattern) -> usize {
        let mut records = self.records.lock();
        let doomed: Vec<String> = Self::candidates(&records, scope, pattern)
            .into_iter()
            .filter(|(_, tuple)| matching::matches(tuple, pattern))
            .map(|(stored, _)| stored)
            .collect();
        for stored in &doomed {
            records.remove(stored);
        }
        debug!(store = %self.name, removed = doomed.len(), "match_delete");
        doomed.len()
    }

    /// Add `delta` to the integer at 1-based tuple `position`. An absent key
    /// starts from 0 at position 2.
    pub fn update_counter(&self, key: &str, position: usize, delta: i64) -> CacheResult<i64> {
        if position < 2 {
            return Err(CacheError::BadRequest(format!(
                "counter position must be 2 or greater, got {position}"
            )));
        }
        let mut records = self.records.lock();
        if position == 2 && !records.contains_key(key) {
            records.insert(key.to_string(), Record::Scalar(Value::from(delta)));
            return Ok(delta);
        }
        let slot = match records.get_mut(key) {
            None => {
                return Err(CacheError::BadRequest(format!(
                    "no record for '{key}' to update at position {position}"
                )))
            }
            Some(Record::Scalar(value)) if position == 2 => value,
            Some(Record::Row(tail)) if position - 2 < tail.len() => &mut tail[position - 2],
            Some(Record::Fields(_)) | Some(Record::Document(_)) => return Err(CacheError::wrong_type()),
            Some(_) => {
                return Err(CacheError::BadRequest(format!(
                    "position {position} is outside the record for '{key}'"
                )))
            }
        };
        let current = slot.as_i64().ok_or_else(|| {
            CacheError::BadRequest(format!("position {position} of '{key}' is not an integer"))
        })?;
        let updated = current
            .checked_add(delta)
            .ok_or_else(|| CacheError::BadRequest(format!("counter '{key}' overflows")))?;
        *slot = Value::from(updated);
        Ok(updated)
    }

    pub fn info(&self, scope: &KeyScope) -> TableInfo {
        let records = self.records.lock();
        let size = match scope {
            KeyScope::Shared => records.len(),
            _ => Self::scoped_tuples(&records, scope).len(),
        };
        TableInfo {
            name: self.name.clone(),
            size,
            kind: "set",
            named_table: true,
            keypos: 1,
            isolated: scope.is_isolated(),
        }
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("name", &self.name)
            .field("record_count", &self.len())
            .finish()
    }
}
