//! # Demo Services
//!
//! Two small services exercising the conventions end to end: an
//! `inventory` service with an `items` controller and a `billing`
//! service with an `invoices` controller. Records live in memory and
//! every controller implements the five conventional REST actions, so
//!
//! ```text
//! GET  /api/inventory/items        ->  inventory  items.getAllAction
//! GET  /api/inventory/items/42     ->  inventory  items.getByIdAction
//! POST /api/billing/invoices       ->  billing    invoices.postAction
//! ```
//!
//! works against a freshly started node.

use crate::runtime::SwitchboardRuntime;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use switchboard_dispatch::{handler_fn, ActionArgs, HandlerRegistry};
use switchboard_wire::{actions, ActionError, ErrorKind};

/// In-memory record set keyed by a numeric `id` field.
pub struct RecordStore {
    records: RwLock<BTreeMap<u64, Value>>,
    next_id: AtomicU64,
}

impl RecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start from fixed records. Each must carry a numeric `id`; inserts
    /// continue above the highest seeded one.
    #[must_use]
    pub fn seeded(records: &[Value]) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write();
            let mut high = 0;
            for record in records {
                if let Some(id) = record.get("id").and_then(Value::as_u64) {
                    high = high.max(id);
                    map.insert(id, record.clone());
                }
            }
            store.next_id.store(high + 1, Ordering::Relaxed);
        }
        store
    }

    fn list(&self, query: &Map<String, Value>) -> Vec<Value> {
        self.records
            .read()
            .values()
            .filter(|record| matches_query(record, query))
            .cloned()
            .collect()
    }

    fn get(&self, id: u64) -> Option<Value> {
        self.records.read().get(&id).cloned()
    }

    fn insert(&self, mut body: Map<String, Value>) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        body.insert("id".to_owned(), json!(id));
        let record = Value::Object(body);
        self.records.write().insert(id, record.clone());
        record
    }

    fn update(&self, id: u64, body: Map<String, Value>) -> Option<Value> {
        let mut records = self.records.write();
        let record = records.get_mut(&id)?;
        if let Value::Object(fields) = record {
            for (key, value) in body {
                // The key never changes.
                if key != "id" {
                    fields.insert(key, value);
                }
            }
        }
        Some(record.clone())
    }

    fn remove(&self, id: u64) -> Option<Value> {
        self.records.write().remove(&id)
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Every query pair must match the record. Query values arrive from the
/// gateway as strings, so numeric and boolean fields compare through
/// their text form.
fn matches_query(record: &Value, query: &Map<String, Value>) -> bool {
    query.iter().all(|(key, want)| {
        record
            .get(key)
            .is_some_and(|have| loose_eq(have, want))
    })
}

fn loose_eq(have: &Value, want: &Value) -> bool {
    if have == want {
        return true;
    }
    match (have, want.as_str()) {
        (Value::Number(number), Some(text)) => number.to_string() == text,
        (Value::Bool(flag), Some(text)) => flag.to_string() == text,
        _ => false,
    }
}

/// Ids arrive as JSON numbers from direct callers and as path strings
/// from the HTTP gateway.
fn parse_id(value: &Value) -> Result<u64, ActionError> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .ok_or_else(|| ActionError::invalid_argument(format!("id out of range: {number}"))),
        Value::String(text) => text
            .trim()
            .parse()
            .map_err(|_| ActionError::invalid_argument(format!("id is not numeric: {text:?}"))),
        other => Err(ActionError::invalid_argument(format!(
            "id must be a number or a numeric string, got {other}"
        ))),
    }
}

fn missing_record(id: u64) -> ActionError {
    ActionError::new(ErrorKind::NotFound, format!("no record with id {id}"))
}

/// Wire the five conventional actions for one controller over a shared
/// store.
#[must_use]
pub fn crud_registry(controller: &str, store: Arc<RecordStore>) -> HandlerRegistry {
    let list_store = Arc::clone(&store);
    let get_store = Arc::clone(&store);
    let post_store = Arc::clone(&store);
    let put_store = Arc::clone(&store);
    let delete_store = store;

    HandlerRegistry::new()
        .with(
            controller,
            actions::GET_ALL,
            handler_fn(actions::GET_ALL, move |args: ActionArgs| {
                let store = Arc::clone(&list_store);
                async move {
                    let query: Option<Map<String, Value>> = args.opt_arg(0)?;
                    Ok(Value::Array(store.list(&query.unwrap_or_default())))
                }
            }),
        )
        .with(
            controller,
            actions::GET_BY_ID,
            handler_fn(actions::GET_BY_ID, move |args: ActionArgs| {
                let store = Arc::clone(&get_store);
                async move {
                    let id = parse_id(&args.arg::<Value>(0)?)?;
                    store.get(id).ok_or_else(|| missing_record(id))
                }
            }),
        )
        .with(
            controller,
            actions::POST,
            handler_fn(actions::POST, move |args: ActionArgs| {
                let store = Arc::clone(&post_store);
                async move {
                    let body: Option<Map<String, Value>> = args.opt_arg(0)?;
                    Ok(store.insert(body.unwrap_or_default()))
                }
            }),
        )
        .with(
            controller,
            actions::PUT,
            handler_fn(actions::PUT, move |args: ActionArgs| {
                let store = Arc::clone(&put_store);
                async move {
                    let id = parse_id(&args.arg::<Value>(0)?)?;
                    let body: Option<Map<String, Value>> = args.opt_arg(1)?;
                    store
                        .update(id, body.unwrap_or_default())
                        .ok_or_else(|| missing_record(id))
                }
            }),
        )
        .with(
            controller,
            actions::DELETE,
            handler_fn(actions::DELETE, move |args: ActionArgs| {
                let store = Arc::clone(&delete_store);
                async move {
                    let id = parse_id(&args.arg::<Value>(0)?)?;
                    store.remove(id).ok_or_else(|| missing_record(id))
                }
            }),
        )
}

/// The `inventory` service: an `items` controller seeded with one
/// widget.
#[must_use]
pub fn inventory_registry() -> HandlerRegistry {
    let store = Arc::new(RecordStore::seeded(&[json!({ "id": 42, "name": "Widget" })]));
    crud_registry("items", store)
}

/// The `billing` service: an `invoices` controller with two seeded
/// invoices.
#[must_use]
pub fn billing_registry() -> HandlerRegistry {
    let store = Arc::new(RecordStore::seeded(&[
        json!({ "id": 1, "total": 249.5, "status": "open" }),
        json!({ "id": 2, "total": 120.0, "status": "paid" }),
    ]));
    crud_registry("invoices", store)
}

/// Register both demo services on a runtime.
pub fn install_demo_services(runtime: &mut SwitchboardRuntime) {
    runtime.add_service("inventory", inventory_registry());
    runtime.add_service("billing", billing_registry());
}
