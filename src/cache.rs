//! Process-wide memo of compiled schemas.
//!
//! Each key owns a [OnceLock]. The map lock is only held to fetch the cell,
//! so the first caller compiles while concurrent callers of the same key
//! block on the cell and receive the same result. Layout errors are cached
//! like successes: a broken layout is rejected once.

use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use log::trace;
use parking_lot::Mutex;

use crate::{errors::LayoutError, layout::TypeLayout, schema::Schema, typed::BinaryLayout};

type Slot = Arc<OnceLock<Result<Arc<Schema>, LayoutError>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Type(TypeId),
    Name(String),
}

/// Cache of compiled schemas, keyed by Rust type or by layout name.
#[derive(Debug, Default)]
pub struct PlanCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
}

static GLOBAL: OnceLock<PlanCache> = OnceLock::new();

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache used by the typed API.
    pub fn global() -> &'static PlanCache {
        GLOBAL.get_or_init(PlanCache::new)
    }

    /// Schema of `T`, compiled on first use.
    pub fn get<T: BinaryLayout>(&self) -> Result<Arc<Schema>, LayoutError> {
        self.resolve(CacheKey::Type(TypeId::of::<T>()), || Schema::compile(&T::layout()))
    }

    /// Schema of a layout, keyed by its type name. Later layouts with a name
    /// already cached get the cached schema.
    pub fn get_named(&self, layout: &TypeLayout) -> Result<Arc<Schema>, LayoutError> {
        self.resolve(CacheKey::Name(layout.name.clone()), || Schema::compile(layout))
    }

    /// Number of keys seen, including ones whose layout was rejected.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resolve<F>(&self, key: CacheKey, compile: F) -> Result<Arc<Schema>, LayoutError>
    where
        F: FnOnce() -> Result<Schema, LayoutError>,
    {
        let slot = Arc::clone(self.slots.lock().entry(key).or_default());

        let mut compiled = false;
        let result = slot.get_or_init(|| {
            compiled = true;
            compile().map(Arc::new)
        });

        if !compiled {
            trace!("plan cache hit");
        }

        result.clone()
    }
}
