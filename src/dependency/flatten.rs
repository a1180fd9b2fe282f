//! The dependency flattener.
//!
//! Collapses a dependency graph of arbitrary depth into one flat
//! per-source-kind map so request-time resolution never walks the tree.
//! Conflicts are caught at every level; cycles fail fast at registration.

use super::{Resolve, ResolverSpec, resolver_id};
use crate::error::{ParametraError, Result};
use crate::param::classify::classify_with_stack;
use crate::param::{ParamKind, ParamMap, ParamSpec};
use indexmap::IndexMap;
use std::sync::Arc;

/// Merge `incoming` into `acc`.
///
/// A name absent from the accumulator is added; a name present with an equal
/// descriptor is a no-op; a name present with a different descriptor is a
/// registration-time conflict, regardless of argument order.
pub fn safe_merge(acc: &mut ParamMap, incoming: &ParamMap) -> Result<()> {
    merge_kind(ParamKind::Path, &mut acc.path, &incoming.path)?;
    merge_kind(ParamKind::Query, &mut acc.query, &incoming.query)?;
    merge_kind(ParamKind::Header, &mut acc.header, &incoming.header)?;
    merge_kind(ParamKind::Cookie, &mut acc.cookie, &incoming.cookie)?;
    merge_kind(ParamKind::Body, &mut acc.body, &incoming.body)?;
    merge_kind(ParamKind::Form, &mut acc.form, &incoming.form)?;
    merge_kind(ParamKind::NoParam, &mut acc.ambient, &incoming.ambient)?;
    merge_kind(
        ParamKind::Dependency,
        &mut acc.dependencies,
        &incoming.dependencies,
    )?;
    merge_kind(ParamKind::Security, &mut acc.security, &incoming.security)?;
    Ok(())
}

fn merge_kind(
    kind: ParamKind,
    acc: &mut IndexMap<String, ParamSpec>,
    incoming: &IndexMap<String, ParamSpec>,
) -> Result<()> {
    for (name, spec) in incoming {
        match acc.get(name) {
            None => {
                acc.insert(name.clone(), spec.clone());
            }
            Some(existing) if existing == spec => {}
            Some(existing) => {
                return Err(ParametraError::ConflictingParams {
                    name: name.clone(),
                    kind: kind.to_string(),
                    first: describe_spec(existing),
                    second: describe_spec(spec),
                });
            }
        }
    }
    Ok(())
}

fn describe_spec(spec: &ParamSpec) -> String {
    if let Some(rs) = &spec.resolver {
        return format!("{} resolver `{}`", spec.kind, rs.resolver.name());
    }
    match &spec.field {
        Some(field) => format!("{} {}", spec.kind, field.ty.describe()),
        None => spec.kind.to_string(),
    }
}

/// Flatten one level: copy the root map, then merge in every dependency's
/// already-flattened parameter map. Because [`build_resolver_spec`] flattens
/// bottom-up at registration, this collapses graphs of arbitrary depth.
pub fn flatten(root: &ParamMap) -> Result<ParamMap> {
    let mut flat = root.clone();
    for spec in root.dependencies.values() {
        if let Some(rs) = &spec.resolver {
            safe_merge(&mut flat, &rs.flat_params)?;
        }
    }
    Ok(flat)
}

/// Classify a resolver's own declaration (recursively, against the same
/// path template) and flatten it into a [`ResolverSpec`].
///
/// The `stack` tracks the resolver chain currently being classified; seeing
/// the same resolver again means the graph is cyclic, which is a hard
/// registration error naming the full cycle.
pub(crate) fn build_resolver_spec(
    resolver: &Arc<dyn Resolve>,
    mut scopes: Vec<String>,
    use_cache: bool,
    path: &str,
    stack: &mut Vec<(usize, String)>,
) -> Result<Arc<ResolverSpec>> {
    let id = resolver_id(resolver);
    if let Some(pos) = stack.iter().position(|(sid, _)| *sid == id) {
        let mut cycle: Vec<String> = stack[pos..].iter().map(|(_, name)| name.clone()).collect();
        cycle.push(resolver.name().to_string());
        return Err(ParametraError::CircularDependency {
            cycle: cycle.join(" -> "),
        });
    }

    stack.push((id, resolver.name().to_string()));
    let declared = classify_with_stack(&resolver.params(), path, stack);
    stack.pop();
    let declared = declared?;
    let flat_params = flatten(&declared)?;

    scopes.sort();
    Ok(Arc::new(ResolverSpec {
        resolver: Arc::clone(resolver),
        params: declared,
        flat_params,
        use_cache,
        scopes,
    }))
}
