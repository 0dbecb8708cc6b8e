//! In-process [`DocumentStore`] with MongoDB-like semantics for the subset the
//! leaderboard uses: equality filters, multi-key sorts, `$set` and `$inc`.

use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
        Mutex,
    },
};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use mongodb::bson::{oid::ObjectId, Bson, Document};

use super::store::{Deadline, DocumentStore, DocumentStream, Patch, StoreError, UpdateOutcome};

#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    calls: AtomicUsize,
    /// Number of further `update_one` calls allowed to succeed.
    update_budget: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of store operations issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Lets the next `n` updates succeed and fails every one after that.
    pub fn fail_updates_after(&self, n: usize) {
        *self.lock_budget() = Some(n);
    }

    /// Copy of a collection in insertion order.
    pub fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.lock_collections()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn lock_collections(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Document>>> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_budget(&self) -> std::sync::MutexGuard<'_, Option<usize>> {
        self.update_budget
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, deadline: Deadline) -> Result<(), StoreError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        if deadline.has_expired() {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }

    fn take_update_budget(&self) -> Result<(), StoreError> {
        let mut budget = self.lock_budget();
        match budget.as_mut() {
            Some(0) => Err(StoreError::Backend("injected update failure".into())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
        deadline: Deadline,
    ) -> Result<Bson, StoreError> {
        self.begin(deadline)?;

        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                document.insert("_id", id.clone());
                id
            }
        };

        self.lock_collections()
            .entry(collection.to_string())
            .or_default()
            .push(document);

        Ok(id)
    }

    async fn find_all(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        deadline: Deadline,
    ) -> Result<DocumentStream, StoreError> {
        self.begin(deadline)?;

        let mut found = Vec::new();
        if let Some(documents) = self.lock_collections().get(collection) {
            for document in documents {
                if matches_filter(document, &filter)? {
                    found.push(document.clone());
                }
            }
        }

        if let Some(sort) = sort {
            found.sort_by(|a, b| compare_by_sort(a, b, &sort));
        }

        Ok(stream::iter(found.into_iter().map(Ok)).boxed())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        patch: Patch,
        deadline: Deadline,
    ) -> Result<UpdateOutcome, StoreError> {
        self.begin(deadline)?;
        self.take_update_budget()?;

        let mut collections = self.lock_collections();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(UpdateOutcome::default());
        };

        for document in documents.iter_mut() {
            if matches_filter(document, &filter)? {
                let modified = apply_patch(document, &patch)?;
                return Ok(UpdateOutcome {
                    matched: 1,
                    modified: u64::from(modified),
                });
            }
        }

        Ok(UpdateOutcome::default())
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: Document,
        deadline: Deadline,
    ) -> Result<u64, StoreError> {
        self.begin(deadline)?;

        let mut collections = self.lock_collections();
        let Some(documents) = collections.get_mut(collection) else {
            return Ok(0);
        };

        for index in 0..documents.len() {
            if matches_filter(&documents[index], &filter)? {
                documents.remove(index);
                return Ok(1);
            }
        }

        Ok(0)
    }
}

fn matches_filter(document: &Document, filter: &Document) -> Result<bool, StoreError> {
    for (key, expected) in filter {
        if key.starts_with('$') {
            return Err(StoreError::Backend(format!("unsupported query operator {key}")));
        }
        match document.get(key) {
            Some(actual) if values_equal(actual, expected) => {}
            None if matches!(expected, Bson::Null) => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => compare_numbers(x, y) == Ordering::Equal,
        _ => a == b,
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

fn as_number(value: &Bson) -> Option<Number> {
    match value {
        Bson::Int32(n) => Some(Number::Int(i64::from(*n))),
        Bson::Int64(n) => Some(Number::Int(*n)),
        Bson::Double(n) => Some(Number::Float(*n)),
        _ => None,
    }
}

fn compare_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.cmp(&y),
        (x, y) => to_f64(x).total_cmp(&to_f64(y)),
    }
}

fn to_f64(n: Number) -> f64 {
    match n {
        Number::Int(i) => i as f64,
        Number::Float(f) => f,
    }
}

/// Cross-type order: missing/null, numbers, strings, documents, arrays,
/// object ids, booleans, dates, everything else.
fn type_order(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) => 0,
        Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => 1,
        Some(Bson::String(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::ObjectId(_)) => 5,
        Some(Bson::Boolean(_)) => 6,
        Some(Bson::DateTime(_)) => 7,
        Some(_) => 8,
    }
}

fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let by_type = type_order(a).cmp(&type_order(b));
    if by_type != Ordering::Equal {
        return by_type;
    }

    match (a, b) {
        (Some(x), Some(y)) => match (as_number(x), as_number(y)) {
            (Some(m), Some(n)) => compare_numbers(m, n),
            _ => match (x, y) {
                (Bson::String(s), Bson::String(t)) => s.cmp(t),
                (Bson::ObjectId(s), Bson::ObjectId(t)) => s.bytes().cmp(&t.bytes()),
                (Bson::Boolean(s), Bson::Boolean(t)) => s.cmp(t),
                (Bson::DateTime(s), Bson::DateTime(t)) => s.cmp(t),
                _ => Ordering::Equal,
            },
        },
        _ => Ordering::Equal,
    }
}

fn compare_by_sort(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (key, direction) in sort {
        let descending = as_number(direction).is_some_and(|n| to_f64(n) < 0.0);
        let ordering = compare_values(a.get(key), b.get(key));
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn apply_patch(document: &mut Document, patch: &Patch) -> Result<bool, StoreError> {
    let mut modified = false;

    match patch {
        Patch::Set(fields) => {
            for (key, value) in fields {
                if document.get(key) != Some(value) {
                    document.insert(key.clone(), value.clone());
                    modified = true;
                }
            }
        }
        Patch::Increment(fields) => {
            for (key, delta) in fields {
                let delta = as_number(delta).ok_or_else(|| {
                    StoreError::Backend(format!("cannot increment {key} by a non-numeric value"))
                })?;
                let current = match document.get(key) {
                    None => Number::Int(0),
                    Some(value) => as_number(value).ok_or_else(|| {
                        StoreError::Backend(format!("cannot apply $inc to non-numeric field {key}"))
                    })?,
                };
                let next = match (current, delta) {
                    (Number::Int(x), Number::Int(y)) => Bson::Int64(x.checked_add(y).ok_or_else(
                        || StoreError::Backend(format!("integer overflow incrementing {key}")),
                    )?),
                    (x, y) => Bson::Double(to_f64(x) + to_f64(y)),
                };
                document.insert(key.clone(), next);
                modified = true;
            }
        }
    }

    Ok(modified)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::TryStreamExt;
    use mongodb::bson::doc;

    use super::*;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn insert_assigns_object_ids() {
        let store = MemoryStore::new();
        let id = store
            .insert_one("players", doc! { "name": "alice" }, deadline())
            .await
            .unwrap();

        assert!(matches!(id, Bson::ObjectId(_)));
        let stored = store.snapshot("players");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get("_id"), Some(&id));
    }

    #[tokio::test]
    async fn find_all_filters_and_sorts() {
        let store = MemoryStore::new();
        for (name, score) in [("a", 3), ("b", 9), ("c", 5)] {
            store
                .insert_one("players", doc! { "name": name, "score": score, "team": "red" }, deadline())
                .await
                .unwrap();
        }
        store
            .insert_one("players", doc! { "name": "d", "score": 100, "team": "blue" }, deadline())
            .await
            .unwrap();

        let names: Vec<String> = store
            .find_all("players", doc! { "team": "red" }, Some(doc! { "score": -1 }), deadline())
            .await
            .unwrap()
            .map_ok(|d| d.get_str("name").unwrap().to_string())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(names, ["b", "c", "a"]);
    }

    #[tokio::test]
    async fn missing_sort_fields_come_first() {
        let store = MemoryStore::new();
        store.insert_one("p", doc! { "name": "ranked", "rank": 1 }, deadline()).await.unwrap();
        store.insert_one("p", doc! { "name": "unranked" }, deadline()).await.unwrap();

        let first = store
            .find_first("p", doc! {}, Some(doc! { "rank": 1 }), deadline())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.get_str("name").unwrap(), "unranked");
    }

    #[tokio::test]
    async fn numeric_filters_match_across_integer_widths() {
        let store = MemoryStore::new();
        store.insert_one("p", doc! { "score": 7_i32 }, deadline()).await.unwrap();

        let found = store
            .find_first("p", doc! { "score": 7_i64 }, None, deadline())
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn increment_adds_on_the_store_side() {
        let store = MemoryStore::new();
        store.insert_one("p", doc! { "name": "alice", "score": 0_i32 }, deadline()).await.unwrap();

        let outcome = store
            .update_one(
                "p",
                doc! { "name": "alice" },
                Patch::Increment(doc! { "score": 1, "cost": 1 }),
                deadline(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });
        let stored = &store.snapshot("p")[0];
        assert_eq!(stored.get("score"), Some(&Bson::Int64(1)));
        assert_eq!(stored.get("cost"), Some(&Bson::Int64(1)));
    }

    #[tokio::test]
    async fn increment_rejects_non_numeric_fields() {
        let store = MemoryStore::new();
        store.insert_one("p", doc! { "score": "high" }, deadline()).await.unwrap();

        let result = store
            .update_one("p", doc! {}, Patch::Increment(doc! { "score": 1 }), deadline())
            .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn unchanged_set_reports_not_modified() {
        let store = MemoryStore::new();
        store.insert_one("p", doc! { "name": "bob", "rank": 2 }, deadline()).await.unwrap();

        let outcome = store
            .update_one("p", doc! { "name": "bob" }, Patch::Set(doc! { "rank": 2 }), deadline())
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 0 });

        let missed = store
            .update_one("p", doc! { "name": "carol" }, Patch::Set(doc! { "rank": 1 }), deadline())
            .await
            .unwrap();
        assert_eq!(missed, UpdateOutcome::default());
    }

    #[tokio::test]
    async fn delete_removes_one_match() {
        let store = MemoryStore::new();
        store.insert_one("p", doc! { "name": "x" }, deadline()).await.unwrap();
        store.insert_one("p", doc! { "name": "x" }, deadline()).await.unwrap();

        let deleted = store.delete_one("p", doc! { "name": "x" }, deadline()).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.snapshot("p").len(), 1);

        let none = store.delete_one("p", doc! { "name": "y" }, deadline()).await.unwrap();
        assert_eq!(none, 0);
    }

    #[tokio::test]
    async fn expired_deadline_times_out() {
        let store = MemoryStore::new();
        let expired = Deadline::after(Duration::ZERO);

        let result = store.insert_one("p", doc! { "name": "late" }, expired).await;
        assert!(matches!(result, Err(StoreError::Timeout)));
        assert!(store.snapshot("p").is_empty());
    }

    #[tokio::test]
    async fn injected_update_failures() {
        let store = MemoryStore::new();
        store.insert_one("p", doc! { "n": 1 }, deadline()).await.unwrap();
        store.fail_updates_after(1);

        let patch = || Patch::Set(doc! { "n": 2 });
        assert!(store.update_one("p", doc! {}, patch(), deadline()).await.is_ok());
        assert!(store.update_one("p", doc! {}, patch(), deadline()).await.is_err());
    }
}
