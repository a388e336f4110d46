//! Circular dependency detection over calls/imports/extends/implements edges

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::QueryEngine;
use crate::Result;
use crate::entity::Entity;
use crate::graph::DependencyGraph;
use crate::relationship::RelationshipType;

pub const DEFAULT_MAX_CYCLES: usize = 100;

#[derive(Debug, Clone)]
pub struct CycleOptions {
    /// Only search from entities with this name
    pub entity_name: Option<String>,
    /// Stop after this many cycles, 0 = unlimited
    pub max_cycles: usize,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            entity_name: None,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }
}

/// A dependency cycle. `links[i]` connects `entities[i]` to `entities[i + 1]`, the last
/// link closes the cycle back to `entities[0]`.
#[derive(Debug, Clone, Serialize)]
pub struct Cycle {
    pub entities: Vec<Entity>,
    pub links: Vec<RelationshipType>,
}

impl Cycle {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// `a -calls-> b -imports-> a`
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (entity, link) in self.entities.iter().zip(&self.links) {
            out.push_str(&entity.name);
            out.push_str(&format!(" -{}-> ", link));
        }
        if let Some(first) = self.entities.first() {
            out.push_str(&first.name);
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub total_cycles: usize,
    pub unique_entities: usize,
    pub shortest: usize,
    pub longest: usize,
    /// The cycle cap stopped the search early
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycles: Vec<Cycle>,
    pub summary: CycleSummary,
}

/// DFS frame: node plus the index of its next outgoing link to visit
struct Frame {
    node: String,
    next: usize,
}

/// Search state shared across DFS roots
struct CycleSearch<'g> {
    graph: &'g DependencyGraph,
    max_cycles: usize,
    done: HashSet<String>,
    seen: HashSet<Vec<String>>,
    found: Vec<(Vec<String>, Vec<RelationshipType>)>,
}

impl<'g> CycleSearch<'g> {
    fn new(graph: &'g DependencyGraph, max_cycles: usize) -> Self {
        Self {
            graph,
            max_cycles,
            done: HashSet::new(),
            seen: HashSet::new(),
            found: Vec::new(),
        }
    }

    fn capped(&self) -> bool {
        self.max_cycles > 0 && self.found.len() >= self.max_cycles
    }

    /// Iterative DFS from `start`. Returns false once the cap is reached.
    fn run_from(&mut self, start: &str) -> bool {
        if self.done.contains(start) {
            return true;
        }

        let graph = self.graph;
        let mut frames = vec![Frame {
            node: start.to_string(),
            next: 0,
        }];
        let mut path: Vec<String> = vec![start.to_string()];
        let mut path_links: Vec<RelationshipType> = Vec::new();
        let mut on_stack: HashMap<String, usize> = HashMap::from([(start.to_string(), 0)]);

        while let Some(top) = frames.last_mut() {
            let links = graph.dependencies(&top.node);
            if top.next >= links.len() {
                let node = top.node.clone();
                frames.pop();
                path.pop();
                path_links.pop();
                on_stack.remove(&node);
                self.done.insert(node);
                continue;
            }

            let link = &links[top.next];
            top.next += 1;

            if link.entity_id == top.node {
                continue;
            }

            if let Some(&pos) = on_stack.get(&link.entity_id) {
                let mut cycle_links = path_links[pos..].to_vec();
                cycle_links.push(link.rel_type);
                self.record(path[pos..].to_vec(), cycle_links);
                if self.capped() {
                    return false;
                }
            } else if !self.done.contains(&link.entity_id) {
                on_stack.insert(link.entity_id.clone(), path.len());
                path.push(link.entity_id.clone());
                path_links.push(link.rel_type);
                frames.push(Frame {
                    node: link.entity_id.clone(),
                    next: 0,
                });
            }
        }

        true
    }

    fn record(&mut self, ids: Vec<String>, links: Vec<RelationshipType>) {
        if self.seen.insert(signature(&ids)) {
            self.found.push((ids, links));
        }
    }
}

/// Rotation-independent identity of a cycle
fn signature(ids: &[String]) -> Vec<String> {
    let start = ids
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    ids[start..].iter().chain(&ids[..start]).cloned().collect()
}

impl QueryEngine<'_> {
    /// Find dependency cycles by depth-first search over the dependency edges.
    ///
    /// With `entity_name` set only cycles reachable from entities of that name are
    /// searched. Self-loops are not reported. Nodes finished by one DFS root are not
    /// re-entered from later roots, so cycles closing only through them are not listed.
    pub fn find_cycles(&self, options: &CycleOptions) -> Result<CycleReport> {
        self.db.snapshot(|| {
            let graph = DependencyGraph::load(self.db)?;
            let entities = self.entities();

            let starts: Vec<String> = match &options.entity_name {
                Some(name) => entities
                    .find_by_name(name)?
                    .into_iter()
                    .map(|e| e.id)
                    .collect(),
                None => graph.nodes().to_vec(),
            };

            let mut search = CycleSearch::new(&graph, options.max_cycles);
            let mut truncated = false;
            for start in &starts {
                if !search.run_from(start) {
                    truncated = true;
                    break;
                }
            }

            let mut resolved: HashMap<String, Entity> = HashMap::new();
            let mut cycles = Vec::with_capacity(search.found.len());
            'cycles: for (ids, links) in search.found {
                let mut members = Vec::with_capacity(ids.len());
                for id in &ids {
                    let entity = match resolved.get(id) {
                        Some(entity) => entity.clone(),
                        None => match entities.find_by_id(id)? {
                            Some(entity) => {
                                resolved.insert(id.clone(), entity.clone());
                                entity
                            }
                            None => continue 'cycles,
                        },
                    };
                    members.push(entity);
                }
                cycles.push(Cycle {
                    entities: members,
                    links,
                });
            }

            let unique: HashSet<&str> = cycles
                .iter()
                .flat_map(|c| c.entities.iter().map(|e| e.id.as_str()))
                .collect();
            let summary = CycleSummary {
                total_cycles: cycles.len(),
                unique_entities: unique.len(),
                shortest: cycles.iter().map(Cycle::len).min().unwrap_or(0),
                longest: cycles.iter().map(Cycle::len).max().unwrap_or(0),
                truncated,
            };

            tracing::debug!(
                "Cycle search over {} nodes / {} edges found {} cycles",
                graph.node_count(),
                graph.edge_count(),
                summary.total_cycles
            );

            Ok(CycleReport { cycles, summary })
        })
    }
}
