pub mod heap;

use log::debug;
use std::collections::HashSet;

use crate::blocks::BlockRegistry;
use crate::graph::{Edge, EdgeId, Graph, NodeId};
use crate::input::network::TrainId;

use self::heap::ScoreHeap;

/// Sentinel score for nodes the search cannot reach.
pub const UNREACHABLE: f64 = ::std::f64::INFINITY;

/// Scoring configuration. The reduction factor is deliberately a plain
/// parameter; it trades search-space size against retry frequency and
/// is not optimal for every network shape.
#[derive(Debug, Clone)]
pub struct ScoreWeights {
    pub curve_penalty: f64,
    pub platform_penalty: f64,
    pub occupied_block_penalty: f64,
    pub require_electrified: bool,
    pub reduce_factor: f64,
}

impl Default for ScoreWeights {
    fn default() -> ScoreWeights {
        ScoreWeights {
            curve_penalty: 0.5,
            platform_penalty: 100.0,
            occupied_block_penalty: 10.0,
            require_electrified: false,
            reduce_factor: 2.0,
        }
    }
}

/// Edge scoring, optionally with the dynamic penalty for resource blocks
/// currently held by other trains.
pub struct Scorer<'a> {
    pub weights: &'a ScoreWeights,
    pub occupancy: Option<(&'a BlockRegistry, TrainId)>,
}

impl<'a> Scorer<'a> {
    pub fn statics(weights: &'a ScoreWeights) -> Scorer<'a> {
        Scorer { weights, occupancy: None }
    }

    pub fn edge_score(&self, edge: &Edge) -> f64 {
        if self.weights.require_electrified && !edge.data.electrified {
            return UNREACHABLE;
        }
        let mut s = edge.data.length + self.weights.curve_penalty * edge.data.curved_length;
        if edge.data.platform {
            s += self.weights.platform_penalty;
        }
        if let Some((registry, train)) = self.occupancy {
            for (&b, &len) in edge.data.block_lengths.iter() {
                if registry.is_held_by_other(b, train) {
                    s += self.weights.occupied_block_penalty * len;
                }
            }
        }
        s
    }
}

#[derive(Debug, Default, Clone)]
pub struct SearchStats {
    pub searches: usize,
    pub nodes_scanned: usize,
    pub edges_relaxed: usize,
    pub reduced_retries: usize,
    pub full_fallbacks: usize,
    pub last_search_ms: f64,
}

/// Per-node best score and predecessor edge, plus the first target
/// reached when one was asked for.
#[derive(Debug)]
pub struct SearchResult {
    pub found: Option<NodeId>,
    pub score: Vec<f64>,
    pub prev: Vec<Option<EdgeId>>,
}

impl SearchResult {
    fn empty(g: &Graph) -> SearchResult {
        SearchResult {
            found: None,
            score: vec![UNREACHABLE; g.nodes.len()],
            prev: vec![None; g.nodes.len()],
        }
    }

    /// Walk predecessor edges back from `to`, returning the edge list in
    /// travel order.
    pub fn edges_to(&self, g: &Graph, to: NodeId) -> Vec<EdgeId> {
        let mut edges = Vec::new();
        let mut cur = to;
        while let Some(e) = self.prev[cur] {
            edges.push(e);
            cur = g.edges[e].from;
        }
        edges.reverse();
        edges
    }
}

/// Fill best scores for every node reachable from `start`. Used to
/// precompute the reachable-node score cache that later reduces search
/// spaces.
pub fn find_all(g: &Graph, start: NodeId, scorer: &Scorer, stats: &mut SearchStats) -> Vec<f64> {
    stats.searches += 1;
    run(g, start, None, None, None, scorer, stats).score
}

/// Best-first search from `start` to the first (cheapest) of `targets`.
///
/// With `reduce`, the candidate set is first restricted to nodes whose
/// cached score stays within `reduce_factor` times the worst target
/// score. A hit whose true cost exceeds the bound means the cache was
/// stale: the cache entry is overwritten and the bound raised to the
/// true cost. A miss within the restricted set falls back to the full
/// candidate set, so the final answer always matches an unrestricted
/// search.
pub fn find_one(
    g: &Graph,
    start: NodeId,
    targets: &HashSet<NodeId>,
    heuristic: &mut Vec<f64>,
    scorer: &Scorer,
    reduce: bool,
    stats: &mut SearchStats,
) -> SearchResult {
    stats.searches += 1;
    if reduce {
        let mut max_h: f64 = 0.0;
        for &t in targets.iter() {
            let h = heuristic.get(t).cloned().unwrap_or(UNREACHABLE);
            if h == UNREACHABLE {
                debug!("target {} has no cached score; giving up early", t);
                return SearchResult::empty(g);
            }
            if h > max_h {
                max_h = h;
            }
        }
        let mut bound = scorer.weights.reduce_factor * max_h;
        loop {
            let r = run(g, start, Some(targets), Some(bound), Some(&*heuristic), scorer, stats);
            match r.found {
                Some(t) => {
                    if r.score[t] > bound {
                        debug!("stale cached score for node {}; raising bound to {}", t, r.score[t]);
                        heuristic[t] = r.score[t];
                        bound = r.score[t];
                        stats.reduced_retries += 1;
                        continue;
                    }
                    return r;
                }
                None => break,
            }
        }
        stats.full_fallbacks += 1;
    }
    run(g, start, Some(targets), None, None, scorer, stats)
}

fn run(
    g: &Graph,
    start: NodeId,
    targets: Option<&HashSet<NodeId>>,
    bound: Option<f64>,
    heuristic: Option<&Vec<f64>>,
    scorer: &Scorer,
    stats: &mut SearchStats,
) -> SearchResult {
    let n = g.nodes.len();
    let mut result = SearchResult::empty(g);
    let mut heap = ScoreHeap::with_capacity(n);

    for i in 0..n {
        let candidate = match (bound, heuristic) {
            (Some(b), Some(h)) => h.get(i).cloned().unwrap_or(UNREACHABLE) <= b,
            _ => true,
        };
        if i == start {
            heap.insert(i, 0.0);
        } else if candidate {
            heap.insert(i, UNREACHABLE);
        }
    }
    result.score[start] = 0.0;

    while let Some((u, su)) = heap.pop_min() {
        if su == UNREACHABLE {
            // Everything left is provably unreachable.
            break;
        }
        stats.nodes_scanned += 1;
        if let Some(t) = targets {
            if t.contains(&u) {
                result.found = Some(u);
                return result;
            }
        }
        for &e in g.nodes[u].edges.iter() {
            let edge = &g.edges[e];
            let v = edge.to;
            if !heap.contains(v) {
                continue;
            }
            let w = scorer.edge_score(edge);
            if w == UNREACHABLE {
                continue;
            }
            stats.edges_relaxed += 1;
            let s = su + w;
            if s < result.score[v] {
                result.score[v] = s;
                result.prev[v] = Some(e);
                heap.decrease(v, s);
            }
        }
    }
    result
}
