//! Interference graph with degree bookkeeping for simplify/select.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};

use super::liveness::Liveness;
use crate::core::error::{CompileError, CompileResult};
use crate::core::instr::Var;
use crate::core::register_file::{AsmReg, RegBitSet, RegClass};

/// Interference graph of one register class.
#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    names: Vec<Var>,
    index: HashMap<Var, usize>,
    adjacency: Vec<Vec<usize>>,
}

impl InterferenceGraph {
    /// Every pair of values live out of the same instruction interferes, and so does every
    /// value defined there with them, so a dead definition never lands on a live register.
    pub fn build(liveness: &Liveness, class: RegClass) -> Self {
        let mut graph = Self::default();
        let mut edges: Vec<HashSet<usize>> = Vec::new();
        for (i, live) in liveness.live_out.iter().enumerate() {
            for name in liveness.uses[i].of(class) {
                let id = graph.node(name);
                if edges.len() <= id {
                    edges.resize_with(id + 1, HashSet::new);
                }
            }
            let mut members: Vec<&Var> = live
                .of(class)
                .iter()
                .chain(liveness.defs[i].of(class).iter())
                .collect();
            members.sort();
            members.dedup();
            let ids: Vec<usize> = members
                .into_iter()
                .map(|name| {
                    let id = graph.node(name);
                    if edges.len() <= id {
                        edges.resize_with(id + 1, HashSet::new);
                    }
                    id
                })
                .collect();
            for (i, &a) in ids.iter().enumerate() {
                for &b in &ids[i + 1..] {
                    edges[a].insert(b);
                    edges[b].insert(a);
                }
            }
        }
        graph.adjacency = edges
            .into_iter()
            .map(|set| {
                let mut v: Vec<_> = set.into_iter().collect();
                v.sort_unstable();
                v
            })
            .collect();
        graph
    }

    fn node(&mut self, name: &Var) -> usize {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.clone());
        self.index.insert(name.clone(), id);
        id
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn interferes(&self, a: &str, b: &str) -> bool {
        match (self.index.get(a), self.index.get(b)) {
            (Some(&a), Some(&b)) => self.adjacency[a].binary_search(&b).is_ok(),
            _ => false,
        }
    }

    pub fn degree(&self, name: &str) -> usize {
        self.index
            .get(name)
            .map_or(0, |&id| self.adjacency[id].len())
    }
}

/// Outcome of one colouring attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Coloring {
    Colored(HashMap<Var, AsmReg>),
    /// A spill candidate found no colour and must be spilled before retrying.
    Spill(Var),
}

/// Removal state of the simplify phase.
struct Simplifier<'g> {
    graph: &'g InterferenceGraph,
    k: usize,
    degree: Vec<usize>,
    removed: Vec<bool>,
    worklist: VecDeque<usize>,
    stack: Vec<(usize, bool)>,
}

impl<'g> Simplifier<'g> {
    fn new(graph: &'g InterferenceGraph, k: usize) -> Self {
        let degree: Vec<usize> = graph.adjacency.iter().map(Vec::len).collect();
        let worklist = (0..graph.len()).filter(|&id| degree[id] < k).collect();
        Self {
            graph,
            k,
            degree,
            removed: vec![false; graph.len()],
            worklist,
            stack: Vec::with_capacity(graph.len()),
        }
    }

    fn remove(&mut self, id: usize, candidate: bool) {
        self.removed[id] = true;
        self.stack.push((id, candidate));
        for &m in &self.graph.adjacency[id] {
            if !self.removed[m] {
                self.degree[m] -= 1;
                if self.degree[m] + 1 == self.k {
                    self.worklist.push_back(m);
                }
            }
        }
    }

    /// Highest-degree remaining node outside `no_spill`.
    fn spill_candidate(&self, no_spill: &HashSet<Var>) -> Option<usize> {
        (0..self.graph.len())
            .filter(|&id| !self.removed[id] && !no_spill.contains(&self.graph.names[id]))
            .max_by(|&a, &b| self.degree[a].cmp(&self.degree[b]).then(b.cmp(&a)))
    }

    /// Highest-degree remaining node, barred or not.
    fn highest_remaining(&self) -> Option<usize> {
        (0..self.graph.len())
            .filter(|&id| !self.removed[id])
            .max_by(|&a, &b| self.degree[a].cmp(&self.degree[b]).then(b.cmp(&a)))
    }
}

/// Simplify, spill-select and colour `graph` with the registers of `order`.
///
/// Nodes in `no_spill` (already spilled variables and their reload temporaries) are never
/// chosen as spill candidates. When only such nodes remain they are still pushed
/// optimistically, and one that finds no colour is an `UncolorableNode` error.
pub fn color(
    graph: &InterferenceGraph,
    order: &[AsmReg],
    no_spill: &HashSet<Var>,
) -> CompileResult<Coloring> {
    let mut simplify = Simplifier::new(graph, order.len());
    let mut remaining = graph.len();

    while remaining > 0 {
        while let Some(id) = simplify.worklist.pop_front() {
            if !simplify.removed[id] {
                simplify.remove(id, false);
                remaining -= 1;
            }
        }
        if remaining == 0 {
            break;
        }
        // Every remaining node has degree >= k.
        if let Some(id) = simplify.spill_candidate(no_spill) {
            log::trace!(
                "potential spill {} (degree {})",
                graph.names[id],
                simplify.degree[id]
            );
            simplify.remove(id, true);
        } else if let Some(id) = simplify.highest_remaining() {
            log::trace!("only spilled values left, pushing {}", graph.names[id]);
            simplify.remove(id, false);
        } else {
            break;
        }
        remaining -= 1;
    }

    let mut colors: Vec<Option<AsmReg>> = vec![None; graph.len()];
    while let Some((id, candidate)) = simplify.stack.pop() {
        let taken = RegBitSet::from_regs(graph.adjacency[id].iter().filter_map(|&m| colors[m]));
        match order.iter().find(|r| !taken.contains(**r)) {
            Some(&reg) => colors[id] = Some(reg),
            None if candidate => return Ok(Coloring::Spill(graph.names[id].clone())),
            None => {
                return Err(CompileError::UncolorableNode {
                    var: graph.names[id].to_string(),
                })
            }
        }
    }

    Ok(Coloring::Colored(
        graph
            .names
            .iter()
            .zip(colors)
            .filter_map(|(name, color)| color.map(|c| (name.clone(), c)))
            .collect(),
    ))
}
