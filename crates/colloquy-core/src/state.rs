//! StateStore - keyed JSON state tree with change notification.
//!
//! Paths are dotted (`chat.messages`); numeric segments index into arrays.
//! Writes emit [`Event::StateChanged`] after the write has been committed and
//! the lock released, so handlers may read the store.

use crate::error::{Error, Result};
use crate::event_bus::{Event, EventBus};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

struct Inner {
    tree: RwLock<Value>,
    dirty: AtomicBool,
    bus: EventBus,
}

/// Centralized mutable state. Cloning yields another handle to the same tree.
///
/// There is no per-path writer locking: the last write wins.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Inner>,
}

impl StateStore {
    /// Create an empty store that notifies through `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                tree: RwLock::new(Value::Object(Map::new())),
                dirty: AtomicBool::new(false),
                bus,
            }),
        }
    }

    /// Read the value at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        let tree = self.inner.tree.read().unwrap_or_else(|e| e.into_inner());
        let mut node = &*tree;
        for segment in segments(path).ok()? {
            node = match node {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(node.clone())
    }

    /// Read and deserialize the value at `path`.
    ///
    /// Returns `None` when the path is missing or holds a different shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.get(path).and_then(|v| serde_json::from_value(v).ok())
    }

    /// Write `value` at `path`, creating intermediate objects as needed.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        {
            let mut tree = self.inner.tree.write().unwrap_or_else(|e| e.into_inner());
            *slot_mut(&mut tree, path)? = value.clone();
        }
        self.inner.bus.emit(Event::StateChanged {
            path: path.to_string(),
            value,
        });
        Ok(())
    }

    /// Append `item` to the list at `list_path`, creating the list if missing.
    ///
    /// A non-list value at `list_path` is replaced by a one-element list.
    /// Returns the index of the new element.
    pub fn append(&self, list_path: &str, item: impl Into<Value>) -> Result<usize> {
        let item = item.into();
        let index = {
            let mut tree = self.inner.tree.write().unwrap_or_else(|e| e.into_inner());
            let slot = slot_mut(&mut tree, list_path)?;
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            match slot {
                Value::Array(items) => {
                    items.push(item.clone());
                    items.len() - 1
                }
                _ => unreachable!("slot was just made an array"),
            }
        };
        self.inner.bus.emit(Event::StateChanged {
            path: format!("{list_path}.{index}"),
            value: item,
        });
        Ok(index)
    }

    /// Remove the value at `path`. Returns the removed value.
    pub fn remove(&self, path: &str) -> Result<Option<Value>> {
        let segs = segments(path)?;
        let (last, parents) = segs.split_last().ok_or_else(|| Error::InvalidPath(path.into()))?;
        let removed = {
            let mut tree = self.inner.tree.write().unwrap_or_else(|e| e.into_inner());
            let mut node = &mut *tree;
            for segment in parents {
                node = match node.get_mut(*segment) {
                    Some(next) => next,
                    None => return Ok(None),
                };
            }
            match node {
                Value::Object(map) => map.remove(*last),
                _ => None,
            }
        };
        if removed.is_some() {
            self.inner.bus.emit(Event::StateChanged {
                path: path.to_string(),
                value: Value::Null,
            });
        }
        Ok(removed)
    }

    /// Copy of the whole tree.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.inner
            .tree
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Flag that there is data not yet completed or saved.
    pub fn mark_dirty(&self) {
        self.inner.dirty.store(true, Ordering::SeqCst);
    }

    /// Clear the unsaved-data flag.
    pub fn mark_clean(&self) {
        self.inner.dirty.store(false, Ordering::SeqCst);
    }

    /// Whether some domain write is still pending completion or save.
    #[must_use]
    pub fn has_unsaved_data(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }
}

fn segments(path: &str) -> Result<Vec<&str>> {
    let segs: Vec<&str> = path.split('.').collect();
    if path.is_empty() || segs.iter().any(|s| s.is_empty()) {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(segs)
}

/// Walk to `path`, creating objects for missing or scalar intermediates.
fn slot_mut<'a>(root: &'a mut Value, path: &str) -> Result<&'a mut Value> {
    let mut node = root;
    for segment in segments(path)? {
        let current = node;
        node = match current {
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get_mut(idx))
                .ok_or_else(|| Error::InvalidPath(path.to_string()))?,
            other => {
                if !other.is_object() {
                    *other = Value::Object(Map::new());
                }
                match other {
                    Value::Object(map) => map.entry(segment).or_insert(Value::Null),
                    _ => unreachable!("node was just made an object"),
                }
            }
        };
    }
    Ok(node)
}
