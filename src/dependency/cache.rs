use super::CacheKey;
use crate::request::ArgValue;
use std::collections::HashMap;

/// Request-scoped dependency cache.
///
/// Owned exclusively by one request's resolution pass; created fresh per
/// request and discarded with it. Two descriptors sharing a cache key see
/// one resolved value.
#[derive(Default)]
pub struct DependencyCache {
    inner: HashMap<CacheKey, ArgValue>,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<ArgValue> {
        self.inner.get(key).cloned()
    }

    pub fn insert(&mut self, key: CacheKey, value: ArgValue) {
        self.inner.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for DependencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyCache")
            .field("size", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{Resolved, ResolverSpec, resolver_fn};
    use crate::param::ParamMap;
    use serde_json::json;

    #[test]
    fn insert_and_get() {
        let resolver = resolver_fn("r", vec![], |_| async { Ok(Resolved::json(json!(1))) });
        let spec = ResolverSpec {
            resolver,
            params: ParamMap::default(),
            flat_params: ParamMap::default(),
            use_cache: true,
            scopes: vec![],
        };
        let mut cache = DependencyCache::new();
        assert!(cache.get(&spec.cache_key()).is_none());

        cache.insert(spec.cache_key(), ArgValue::Json(json!(1)));
        assert!(cache.get(&spec.cache_key()).is_some());
        assert_eq!(cache.len(), 1);
    }
}
