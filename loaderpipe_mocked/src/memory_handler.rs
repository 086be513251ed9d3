/// In-memory pipe handler storing JSON documents.
///
/// - `with_documents` seeds the store.
/// - `fail_next` queues an error for the next handler call, whatever it is.
/// - `hold` makes handler calls block until `release`.
/// - `calls` counts handler calls; `wait_for_calls` waits until a count is hit.
///
/// `on_read(filter)`:
/// - applies the where-clause (string equality on top-level fields),
///   then `offset`, then `limit`.
///
/// `on_save(body)`:
/// - assigns the next numeric `id` when the document has none,
///   replaces a document with the same `id`, otherwise appends.
///
/// `on_remove(id)`:
/// - returns `PipeError::NotFound(id)` if no document has that `id`.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use loaderpipe::{Outcome, PipeError, PipeHandler, ReadFilter};
use parking_lot::{Condvar, Mutex};
use serde_json::Value;

const ID_FIELD: &str = "id";

pub struct MemoryPipeHandler {
    documents: Mutex<Vec<Value>>,
    failures: Mutex<VecDeque<PipeError>>,
    held: Mutex<bool>,
    gate: Condvar,
    next_id: AtomicU64,
    calls: AtomicUsize,
    calls_changed: Condvar,
    calls_lock: Mutex<()>,
}

impl Default for MemoryPipeHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a JSON field the way a where-clause compares it
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl MemoryPipeHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            held: Mutex::new(false),
            gate: Condvar::new(),
            next_id: AtomicU64::new(1),
            calls: AtomicUsize::new(0),
            calls_changed: Condvar::new(),
            calls_lock: Mutex::new(()),
        }
    }

    /// Seed the store; numeric ids continue after the largest seeded one
    #[must_use]
    pub fn with_documents(documents: Vec<Value>) -> Self {
        let handler = Self::new();
        let max_id = documents
            .iter()
            .filter_map(|doc| doc.get(ID_FIELD).and_then(Value::as_u64))
            .max()
            .unwrap_or(0);
        handler.next_id.store(max_id + 1, Ordering::SeqCst);
        *handler.documents.lock() = documents;
        handler
    }

    /// Make the next handler call fail with `error`
    pub fn fail_next(&self, error: PipeError) {
        self.failures.lock().push_back(error);
    }

    /// Block handler calls until `release`
    pub fn hold(&self) {
        *self.held.lock() = true;
    }

    pub fn release(&self) {
        *self.held.lock() = false;
        self.gate.notify_all();
    }

    /// Handler calls made so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` calls have started
    ///
    /// Returns `false` on timeout.
    pub fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.calls_lock.lock();
        while self.calls() < count {
            if self.calls_changed.wait_until(&mut guard, deadline).timed_out() {
                return self.calls() >= count;
            }
        }
        true
    }

    /// Snapshot of the stored documents
    #[must_use]
    pub fn documents(&self) -> Vec<Value> {
        self.documents.lock().clone()
    }

    /// Count the call, wait at the gate, then pop an injected failure
    fn enter(&self) -> Outcome<()> {
        {
            let _guard = self.calls_lock.lock();
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.calls_changed.notify_all();
        }

        let mut held = self.held.lock();
        while *held {
            self.gate.wait(&mut held);
        }
        drop(held);

        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn matches(doc: &Value, filter: &ReadFilter) -> bool {
        filter.get_where().iter().all(|(key, expected)| {
            doc.get(key)
                .is_some_and(|actual| field_text(actual) == *expected)
        })
    }
}

impl PipeHandler for MemoryPipeHandler {
    fn on_read(&self, filter: Option<&ReadFilter>) -> Outcome<Vec<u8>> {
        self.enter()?;
        let documents = self.documents.lock();
        let selected: Vec<&Value> = match filter {
            None => documents.iter().collect(),
            Some(filter) => {
                let offset = filter.get_offset().unwrap_or(0) as usize;
                let limit = filter.get_limit().map_or(usize::MAX, |l| l as usize);
                documents
                    .iter()
                    .filter(|doc| Self::matches(doc, filter))
                    .skip(offset)
                    .take(limit)
                    .collect()
            }
        };
        Ok(serde_json::to_vec(&selected)?)
    }

    fn on_save(&self, body: &[u8]) -> Outcome<Vec<u8>> {
        self.enter()?;
        let mut doc: Value = serde_json::from_slice(body)?;
        let Some(object) = doc.as_object_mut() else {
            return Err(PipeError::Status {
                code: 400,
                message: "document must be a JSON object".to_string(),
            });
        };
        if object.get(ID_FIELD).map_or(true, Value::is_null) {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            object.insert(ID_FIELD.to_string(), Value::from(id));
        }

        let id = doc.get(ID_FIELD).map(field_text);
        let mut documents = self.documents.lock();
        match documents
            .iter_mut()
            .find(|existing| existing.get(ID_FIELD).map(field_text) == id)
        {
            Some(existing) => *existing = doc.clone(),
            None => documents.push(doc.clone()),
        }
        Ok(serde_json::to_vec(&doc)?)
    }

    fn on_remove(&self, id: &str) -> Outcome<()> {
        self.enter()?;
        let mut documents = self.documents.lock();
        let before = documents.len();
        documents.retain(|doc| doc.get(ID_FIELD).map(field_text).as_deref() != Some(id));
        if documents.len() == before {
            return Err(PipeError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn read_applies_where_offset_and_limit() {
        let handler = MemoryPipeHandler::with_documents(vec![
            json!({"id": 1, "color": "red"}),
            json!({"id": 2, "color": "blue"}),
            json!({"id": 3, "color": "red"}),
            json!({"id": 4, "color": "red"}),
        ]);
        let filter = ReadFilter::new().where_eq("color", "red").offset(1).limit(1);

        let body = handler.on_read(Some(&filter)).unwrap();
        let docs: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(docs, vec![json!({"id": 3, "color": "red"})]);
    }

    #[test]
    fn save_assigns_ids_after_seeded_ones() {
        let handler = MemoryPipeHandler::with_documents(vec![json!({"id": 7})]);
        let stored = handler.on_save(br#"{"name":"new"}"#).unwrap();
        let stored: Value = serde_json::from_slice(&stored).unwrap();
        assert_eq!(stored, json!({"id": 8, "name": "new"}));
        assert_eq!(handler.documents().len(), 2);
    }

    #[test]
    fn save_replaces_document_with_same_id() {
        let handler = MemoryPipeHandler::with_documents(vec![json!({"id": 1, "name": "old"})]);
        handler.on_save(br#"{"id":1,"name":"new"}"#).unwrap();
        assert_eq!(handler.documents(), vec![json!({"id": 1, "name": "new"})]);
    }

    #[test]
    fn remove_unknown_id_is_not_found() {
        let handler = MemoryPipeHandler::new();
        assert_eq!(
            handler.on_remove("42"),
            Err(PipeError::NotFound("42".to_string()))
        );
    }

    #[test]
    fn injected_failure_is_used_once() {
        let handler = MemoryPipeHandler::new();
        handler.fail_next(PipeError::Backend("down".into()));
        assert!(handler.on_read(None).is_err());
        assert!(handler.on_read(None).is_ok());
        assert_eq!(handler.calls(), 2);
    }

    #[test]
    fn held_calls_wait_for_release() {
        let handler = std::sync::Arc::new(MemoryPipeHandler::new());
        handler.hold();
        let worker = {
            let handler = std::sync::Arc::clone(&handler);
            std::thread::spawn(move || handler.on_read(None))
        };
        assert!(handler.wait_for_calls(1, Duration::from_secs(5)));
        assert!(!worker.is_finished());
        handler.release();
        assert!(worker.join().unwrap().is_ok());
    }
}
