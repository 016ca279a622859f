//! Dependency resolver (§4.1).
//!
//! A topological sort (Kahn's algorithm over a `BinaryHeap`), tie-broken
//! purely lexicographically by plugin id rather than by a priority field:
//! this domain's resolver has no priority concept, only declared
//! dependency order.

use crate::error::{KernelError, ResolverError};
use crate::plugin::PluginDescriptor;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// A resolved plugin order plus any non-fatal warnings collected along the
/// way (optional-dependency mismatches, broken cycles).
#[derive(Debug)]
pub struct Resolution {
    pub order: Vec<String>,
    pub warnings: Vec<String>,
}

/// Resolves registration order for `descriptors`.
///
/// `strict_versioning`: if false, a version mismatch on an *optional*
/// dependency degrades to a warning instead of failing resolution.
/// `circular_dependencies`: if true, a detected cycle is broken
/// deterministically (dropping the edge into the lexicographically lowest
/// id in the cycle) and reported as a warning rather than a failure.
pub fn resolve(
    descriptors: &[PluginDescriptor],
    strict_versioning: bool,
    circular_dependencies: bool,
) -> Result<Resolution, KernelError> {
    let by_id: HashMap<&str, &PluginDescriptor> =
        descriptors.iter().map(|d| (d.id.as_str(), d)).collect();
    let mut warnings = Vec::new();

    // edges[a] = { b, .. } meaning "a depends on b"; in_degree counts
    // outstanding dependencies still to be satisfied before a node is free.
    let mut edges: HashMap<String, HashSet<String>> =
        descriptors.iter().map(|d| (d.id.clone(), HashSet::new())).collect();
    let mut in_degree: HashMap<String, usize> =
        descriptors.iter().map(|d| (d.id.clone(), 0)).collect();

    for descriptor in descriptors {
        for dep in &descriptor.dependencies {
            let Some(target) = by_id.get(dep.plugin_id.as_str()) else {
                if dep.optional {
                    warnings.push(format!(
                        "optional dependency '{}' of '{}' is not registered",
                        dep.plugin_id, descriptor.id
                    ));
                    continue;
                }
                return Err(KernelError::from(ResolverError::MissingDependency {
                    plugin_id: descriptor.id.clone(),
                    dependency: dep.plugin_id.clone(),
                })
                .with_plugin(descriptor.id.clone()));
            };

            if !dep.version_range.includes(&target.version) {
                let message = format!(
                    "{} (required {}, found {}, required by {})",
                    dep.plugin_id, dep.version_range, target.version, descriptor.id
                );
                // strictVersioning only relaxes optional-dependency mismatches
                // to a warning; a required dependency's mismatch always fails
                // resolution regardless of the flag.
                if dep.optional && !strict_versioning {
                    warnings.push(message);
                    continue;
                }
                return Err(KernelError::from(ResolverError::VersionConflict {
                    plugin_id: descriptor.id.clone(),
                    dependency: dep.plugin_id.clone(),
                    required: dep.version_range.constraint_str().to_string(),
                    found: target.version.to_string(),
                })
                .with_plugin(descriptor.id.clone())
                .with_context(message));
            }

            if edges.get_mut(&descriptor.id).unwrap().insert(dep.plugin_id.clone()) {
                *in_degree.get_mut(&descriptor.id).unwrap() += 1;
            }
        }
    }

    let order = kahn_order(&edges, &mut in_degree);

    if order.len() == descriptors.len() {
        return Ok(Resolution { order, warnings });
    }

    // Remaining in-graph nodes form at least one cycle.
    let remaining: HashSet<String> = descriptors
        .iter()
        .map(|d| d.id.clone())
        .filter(|id| !order.contains(id))
        .collect();

    if !circular_dependencies {
        let cycle = reconstruct_cycle(&edges, &remaining);
        return Err(KernelError::from(ResolverError::CircularDependency { cycle }));
    }

    // Break the cycle deterministically: drop each remaining node's edge to
    // its lexicographically lowest remaining dependency, then retry.
    let cycle = reconstruct_cycle(&edges, &remaining);
    warnings.push(format!("circular dependency broken: {}", cycle.join(" -> ")));
    let mut broken_edges = edges.clone();
    for id in &remaining {
        if let Some(deps) = broken_edges.get_mut(id) {
            if let Some(lowest) = deps.iter().filter(|d| remaining.contains(*d)).min().cloned() {
                deps.remove(&lowest);
            }
        }
    }
    let mut in_degree: HashMap<String, usize> =
        broken_edges.iter().map(|(k, v)| (k.clone(), v.len())).collect();
    let order = kahn_order(&broken_edges, &mut in_degree);
    if order.len() != descriptors.len() {
        let cycle = reconstruct_cycle(&broken_edges, &remaining);
        return Err(KernelError::from(ResolverError::CircularDependency { cycle }));
    }
    Ok(Resolution { order, warnings })
}

/// Kahn's algorithm; ties among simultaneously-ready nodes are broken by
/// lexicographic id via a min-heap of `Reverse(id)`.
fn kahn_order(edges: &HashMap<String, HashSet<String>>, in_degree: &mut HashMap<String, usize>) -> Vec<String> {
    // dependents[b] = { a, .. } meaning "a depends on b"; once b is placed,
    // decrement in_degree of every a.
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (a, deps) in edges {
        for b in deps {
            dependents.entry(b.as_str()).or_default().push(a.as_str());
        }
    }

    let mut ready: BinaryHeap<Reverse<String>> = in_degree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(id, _)| Reverse(id.clone()))
        .collect();
    let mut remaining_in_degree = in_degree.clone();
    let mut order = Vec::new();
    let mut placed: HashSet<String> = HashSet::new();

    while let Some(Reverse(id)) = ready.pop() {
        if !placed.insert(id.clone()) {
            continue;
        }
        order.push(id.clone());
        if let Some(deps) = dependents.get(id.as_str()) {
            let mut next_ready: Vec<String> = Vec::new();
            for dependent in deps {
                if let Some(deg) = remaining_in_degree.get_mut(*dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        next_ready.push((*dependent).to_string());
                    }
                }
            }
            next_ready.sort();
            for n in next_ready {
                ready.push(Reverse(n));
            }
        }
    }
    order
}

fn reconstruct_cycle(edges: &HashMap<String, HashSet<String>>, remaining: &HashSet<String>) -> Vec<String> {
    let Some(start) = remaining.iter().min().cloned() else {
        return Vec::new();
    };
    let mut visited = HashSet::new();
    let mut path = vec![start.clone()];
    let mut current = start;
    loop {
        if !visited.insert(current.clone()) {
            if let Some(pos) = path.iter().position(|n| *n == current) {
                path.truncate(pos + 1);
            }
            path.push(current);
            return path;
        }
        let Some(deps) = edges.get(&current) else {
            return path;
        };
        let Some(next) = deps.iter().filter(|d| remaining.contains(*d)).min().cloned() else {
            return path;
        };
        path.push(next.clone());
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::plugin;

    fn desc(name: &str, version: &str, deps: &[(&str, &str, bool)]) -> PluginDescriptor {
        let mut b = plugin(name, version).unwrap();
        for (target, range, optional) in deps {
            b = if *optional {
                b.depends_optional(*target, range).unwrap()
            } else {
                b.depends(*target, range).unwrap()
            };
        }
        b.setup(|_ctx| async { Ok(crate::plugin::PluginApi::new()) }).build().unwrap()
    }

    #[test]
    fn linear_order_places_dependencies_first() {
        let descriptors = vec![
            desc("a", "1.0.0", &[]),
            desc("b", "1.0.0", &[("a", "^1.0.0", false)]),
            desc("c", "1.0.0", &[("b", "^1.0.0", false)]),
        ];
        let resolution = resolve(&descriptors, true, false).unwrap();
        assert_eq!(resolution.order, vec!["a", "b", "c"]);
    }

    #[test]
    fn version_conflict_is_reported() {
        let descriptors = vec![desc("a", "1.2.0", &[]), desc("b", "1.0.0", &[("a", "^2.0.0", false)])];
        let err = resolve(&descriptors, true, false).unwrap_err();
        assert_eq!(err.code, "VERSION_CONFLICT");
        assert!(err.to_string().contains("required by b"), "{}", err);
    }

    #[test]
    fn required_version_conflict_fails_even_with_lax_versioning() {
        let descriptors = vec![desc("a", "1.2.0", &[]), desc("b", "1.0.0", &[("a", "^2.0.0", false)])];
        let err = resolve(&descriptors, false, false).unwrap_err();
        assert_eq!(err.code, "VERSION_CONFLICT");
    }

    #[test]
    fn optional_version_conflict_degrades_to_warning_with_lax_versioning() {
        let descriptors = vec![desc("a", "1.2.0", &[]), desc("b", "1.0.0", &[("a", "^2.0.0", true)])];
        let resolution = resolve(&descriptors, false, false).unwrap();
        assert_eq!(resolution.order, vec!["a", "b"]);
        assert_eq!(resolution.warnings.len(), 1);
    }

    #[test]
    fn missing_optional_dependency_degrades_to_warning() {
        let descriptors = vec![desc("a", "1.0.0", &[("ghost", "^1.0.0", true)])];
        let resolution = resolve(&descriptors, true, false).unwrap();
        assert_eq!(resolution.order, vec!["a"]);
        assert_eq!(resolution.warnings.len(), 1);
    }

    #[test]
    fn cycle_without_flag_fails() {
        let descriptors = vec![
            desc("a", "1.0.0", &[("b", "^1.0.0", false)]),
            desc("b", "1.0.0", &[("a", "^1.0.0", false)]),
        ];
        let err = resolve(&descriptors, true, false).unwrap_err();
        assert_eq!(err.code, "CIRCULAR_DEPENDENCY");
    }

    #[test]
    fn cycle_with_flag_breaks_deterministically() {
        let descriptors = vec![
            desc("a", "1.0.0", &[("b", "^1.0.0", false)]),
            desc("b", "1.0.0", &[("a", "^1.0.0", false)]),
        ];
        let resolution = resolve(&descriptors, true, true).unwrap();
        assert_eq!(resolution.order.len(), 2);
        assert!(!resolution.warnings.is_empty());
    }

    #[test]
    fn ties_are_broken_lexicographically() {
        let descriptors = vec![
            desc("z", "1.0.0", &[]),
            desc("a", "1.0.0", &[]),
            desc("m", "1.0.0", &[]),
        ];
        let resolution = resolve(&descriptors, true, false).unwrap();
        assert_eq!(resolution.order, vec!["a", "m", "z"]);
    }
}
