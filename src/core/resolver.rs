//! SG-003: Dependency DAG construction and ordering.
//!
//! Edges come from explicit `DependsOn` entries and from every resource a
//! property reads (`Ref`, `Fn::GetAtt`, `Fn::Sub`). Topological order uses
//! Kahn's algorithm with declaration-index tie-breaking for determinism.

use super::error::{RefKind, Site, TemplateError};
use super::types::{Reference, Resource, Template};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Resources `resource` must follow, explicit edges first, without
/// duplicates.
pub fn dependencies(resource: &Resource) -> Vec<&str> {
    let mut deps: Vec<&str> = resource.depends_on.iter().map(String::as_str).collect();
    for value in resource.properties.values() {
        for reference in value.references() {
            if let Reference::Resource(id) = reference {
                if !deps.contains(&id) {
                    deps.push(id);
                }
            }
        }
    }
    deps
}

/// Build a topological order of the template's resources.
pub fn build_order(template: &Template) -> Result<Vec<String>, TemplateError> {
    let ids: Vec<&str> = template.resources.keys().map(String::as_str).collect();
    let index: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut in_degree = vec![0usize; ids.len()];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];

    for (i, resource) in template.resources.values().enumerate() {
        for dep in dependencies(resource) {
            let Some(&d) = index.get(dep) else {
                return Err(TemplateError::UnknownReference {
                    kind: RefKind::Resource,
                    name: dep.to_string(),
                    site: Site::Resource(ids[i].to_string()),
                });
            };
            adjacency[d].push(i);
            in_degree[i] += 1;
        }
    }

    // Kahn's algorithm, always releasing the earliest-declared ready node
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(ids.len());
    while let Some(Reverse(current)) = ready.pop() {
        order.push(ids[current].to_string());
        for &next in &adjacency[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != ids.len() {
        let members: Vec<String> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d > 0)
            .map(|(i, _)| ids[i].to_string())
            .collect();
        return Err(TemplateError::CyclicDependency(members));
    }

    Ok(order)
}
