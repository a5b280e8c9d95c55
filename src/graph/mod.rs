//! Dependency-ordered presentation of sections.
//!
//! The resolver computes a deterministic topological order over the section
//! graph: every surviving dependency precedes its dependent, and ties are
//! broken by descending priority, then ascending first page, then lexical
//! id. Cycles are never fatal; each repair pass removes one recorded cycle
//! edge (the one whose dependent has the lowest priority) and retries, so
//! the pass count is bounded by the edge count.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::models::Section;

/// A dependency edge removed during cycle repair.
///
/// `dependent` declared a dependency on `dependency`; the declaration was
/// part of a cycle and has been dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedEdge {
    /// Section whose dependency declaration was removed
    pub dependent: String,
    /// The dependency it pointed at
    pub dependency: String,
}

impl std::fmt::Display for DroppedEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.dependent, self.dependency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Compute a deterministic dependency order over all section ids.
///
/// Every id appears exactly once. Dependencies pointing at unknown ids are
/// ignored here (the aggregator prunes them with a diagnostic before this
/// point). Returns the order and any edges dropped by cycle repair.
#[must_use]
pub fn resolve_order(sections: &[Section]) -> (Vec<String>, Vec<DroppedEdge>) {
    let by_id: HashMap<&str, &Section> = sections
        .iter()
        .map(|s| (s.section_id.as_str(), s))
        .collect();

    // Mutable adjacency copy so repair passes can drop edges.
    let mut deps: HashMap<String, Vec<String>> = sections
        .iter()
        .map(|s| {
            let mut d: Vec<String> = s
                .dependencies
                .iter()
                .filter(|dep| by_id.contains_key(dep.as_str()))
                .cloned()
                .collect();
            sort_ids(&mut d, &by_id);
            (s.section_id.clone(), d)
        })
        .collect();

    let mut roots: Vec<String> = sections.iter().map(|s| s.section_id.clone()).collect();
    sort_ids(&mut roots, &by_id);

    let mut dropped = Vec::new();

    loop {
        let mut marks: HashMap<&str, Mark> = deps
            .keys()
            .map(|id| (id.as_str(), Mark::Unvisited))
            .collect();
        let mut order = Vec::with_capacity(roots.len());
        let mut back_edges: Vec<DroppedEdge> = Vec::new();

        for root in &roots {
            visit(root, &deps, &mut marks, &mut order, &mut back_edges);
        }

        if back_edges.is_empty() {
            return (order, dropped);
        }

        // Drop the cycle edge whose dependent carries the least priority;
        // lexical order settles ties so repair is deterministic.
        back_edges.sort_by(|a, b| {
            let pa = by_id.get(a.dependent.as_str()).map_or(0, |s| s.priority);
            let pb = by_id.get(b.dependent.as_str()).map_or(0, |s| s.priority);
            pa.cmp(&pb)
                .then_with(|| a.dependent.cmp(&b.dependent))
                .then_with(|| a.dependency.cmp(&b.dependency))
        });
        let victim = back_edges.remove(0);
        warn!(edge = %victim, "dependency cycle detected, dropping edge");
        if let Some(d) = deps.get_mut(&victim.dependent) {
            d.retain(|dep| dep != &victim.dependency);
        }
        dropped.push(victim);
    }
}

fn visit<'a>(
    id: &'a str,
    deps: &'a HashMap<String, Vec<String>>,
    marks: &mut HashMap<&'a str, Mark>,
    order: &mut Vec<String>,
    back_edges: &mut Vec<DroppedEdge>,
) {
    match marks.get(id) {
        Some(Mark::Done) => return,
        Some(Mark::InProgress) | None => return,
        Some(Mark::Unvisited) => {}
    }
    marks.insert(id, Mark::InProgress);

    if let Some(dependencies) = deps.get(id) {
        for dep in dependencies {
            match marks.get(dep.as_str()) {
                Some(Mark::InProgress) => {
                    debug!(dependent = id, dependency = %dep, "back-edge found");
                    back_edges.push(DroppedEdge {
                        dependent: id.to_string(),
                        dependency: dep.clone(),
                    });
                }
                Some(Mark::Unvisited) => {
                    visit(dep, deps, marks, order, back_edges);
                }
                _ => {}
            }
        }
    }

    marks.insert(id, Mark::Done);
    order.push(id.to_string());
}

/// Sort ids by descending priority, then ascending first page, then
/// lexically. Applied to both root iteration and dependency visit order so
/// the whole traversal is deterministic.
fn sort_ids(ids: &mut [String], by_id: &HashMap<&str, &Section>) {
    ids.sort_by(|a, b| {
        let sa = by_id.get(a.as_str());
        let sb = by_id.get(b.as_str());
        let pa = sa.map_or(0, |s| s.priority);
        let pb = sb.map_or(0, |s| s.priority);
        pb.cmp(&pa)
            .then_with(|| {
                let fa = sa.map_or(u32::MAX, |s| s.first_page());
                let fb = sb.map_or(u32::MAX, |s| s.first_page());
                fa.cmp(&fb)
            })
            .then_with(|| a.cmp(b))
    });
}

/// Select sections meeting the priority threshold, in resolver order.
///
/// With `code_only` set, sections without runnable code are dropped too.
/// Dropped sections vanish entirely, snippets and equations included.
#[must_use]
pub fn filter_sections(
    order: &[String],
    sections: &[Section],
    min_priority: u8,
    code_only: bool,
) -> Vec<Section> {
    let by_id: HashMap<&str, &Section> = sections
        .iter()
        .map(|s| (s.section_id.as_str(), s))
        .collect();

    order
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).copied())
        .filter(|s| s.priority >= min_priority && (!code_only || s.has_code))
        .cloned()
        .collect()
}
