// SPDX-License-Identifier: BSD-3-Clause

//! The embedding map is an external collaborator: a bidirectional registry
//! between integer object identifiers used on the wire and host-side
//! objects. The core only ever holds a capability reference to one; it
//! never owns the registry itself. This module defines that capability and
//! a simple arena-backed implementation suitable for tests.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// An opaque, cheaply-clonable handle to a host-side object. The core never
/// inspects the contents; it only needs identity (for dedup) and a stable
/// `i32` id.
#[derive(Clone)]
pub struct EmbeddedObject(Arc<dyn Any + Send + Sync>);

impl EmbeddedObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    fn identity(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

/// `store_object` is idempotent for equal identities and hands out
/// monotonically increasing ids; `retrieve_object` fails for unknown ids.
pub trait EmbeddingMap {
    fn store_object(&mut self, obj: EmbeddedObject) -> i32;
    fn retrieve_object(&self, id: i32) -> Option<EmbeddedObject>;
}

/// An arena holding owned objects plus a dedup table from identity to
/// handle, per the design note in `spec.md` §9. Not meant for production
/// use (the host application owns the real registry); this is the
/// reference implementation used by this crate's own tests.
#[derive(Default)]
pub struct TestEmbeddingMap {
    arena: Vec<EmbeddedObject>,
    by_identity: HashMap<usize, i32>,
}

impl TestEmbeddingMap {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmbeddingMap for TestEmbeddingMap {
    fn store_object(&mut self, obj: EmbeddedObject) -> i32 {
        let key = obj.identity() as usize;
        if let Some(&id) = self.by_identity.get(&key) {
            return id;
        }

        self.arena.push(obj);
        let id = self.arena.len() as i32;
        self.by_identity.insert(key, id);
        id
    }

    fn retrieve_object(&self, id: i32) -> Option<EmbeddedObject> {
        if id <= 0 {
            return None;
        }
        self.arena.get((id - 1) as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_is_idempotent_for_equal_identity() {
        let mut map = TestEmbeddingMap::new();
        let obj = EmbeddedObject::new(42u32);
        let id1 = map.store_object(obj.clone());
        let id2 = map.store_object(obj);
        assert_eq!(id1, id2);
    }

    #[test]
    fn distinct_objects_get_distinct_monotonic_ids() {
        let mut map = TestEmbeddingMap::new();
        let id1 = map.store_object(EmbeddedObject::new(1u32));
        let id2 = map.store_object(EmbeddedObject::new(2u32));
        assert!(id2 > id1);
    }

    #[test]
    fn retrieve_unknown_id_fails() {
        let map = TestEmbeddingMap::new();
        assert!(map.retrieve_object(99).is_none());
    }

    #[test]
    fn retrieve_roundtrips_stored_object() {
        let mut map = TestEmbeddingMap::new();
        let id = map.store_object(EmbeddedObject::new(7u32));
        let got = map.retrieve_object(id).unwrap();
        assert_eq!(*got.downcast_ref::<u32>().unwrap(), 7);
    }
}
