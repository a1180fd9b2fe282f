use super::{Resolve, resolver_id};
use dashmap::DashMap;
use std::sync::Arc;

/// Resolver override registry, primarily for testing.
///
/// Keyed by the identity of the original resolver; a registered replacement
/// is used everywhere the original appears, at any nesting depth. The
/// replacement's value is still cached under the original's cache key.
#[derive(Default)]
pub struct ResolverOverrides {
    inner: DashMap<usize, Arc<dyn Resolve>>,
}

impl ResolverOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, original: &Arc<dyn Resolve>, replacement: Arc<dyn Resolve>) {
        self.inner.insert(resolver_id(original), replacement);
    }

    pub fn remove(&self, original: &Arc<dyn Resolve>) {
        self.inner.remove(&resolver_id(original));
    }

    pub fn lookup(&self, original: &Arc<dyn Resolve>) -> Option<Arc<dyn Resolve>> {
        self.inner
            .get(&resolver_id(original))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for ResolverOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverOverrides")
            .field("size", &self.len())
            .finish()
    }
}
