use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::graph::{Dir, Graph, NodeId};
use crate::input::network::{Destination, TrackNetwork};

/// Order-independent structural key over a destination's stop
/// connections. Collisions are accepted as key reuse; there is no
/// verifying equality check behind the cache.
pub fn destination_key(dest: &Destination) -> u64 {
    dest.stops.iter().fold(0u64, |acc, c| {
        let mut h = DefaultHasher::new();
        c.hash(&mut h);
        acc.wrapping_add(h.finish())
    })
}

/// Memoized mapping from destinations to graph node sets. Node identity
/// is per-build, so the whole cache is dropped on every graph rebuild.
#[derive(Debug, Default)]
pub struct DestinationResolver {
    cache: HashMap<u64, Rc<HashSet<NodeId>>>,
}

impl DestinationResolver {
    pub fn new() -> DestinationResolver {
        Default::default()
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn resolve(
        &mut self,
        net: &TrackNetwork,
        graph: &Graph,
        dest: &Destination,
    ) -> Rc<HashSet<NodeId>> {
        let key = destination_key(dest);
        if let Some(nodes) = self.cache.get(&key) {
            return nodes.clone();
        }
        let mut nodes = HashSet::new();
        for &stop in dest.stops.iter() {
            if let Some(&n) = graph.node_of_outbound.get(&stop) {
                nodes.insert(n);
                continue;
            }
            // Mid-section stop: fall back to the section back-links.
            let track = net.connections[stop].track;
            if let Some(Some(sid)) = graph.section_of.get(track) {
                for &dir in &[Dir::Forward, Dir::Backward] {
                    if let Some(n) = graph.sections[*sid].next_node[dir.idx()] {
                        nodes.insert(n);
                    }
                }
            }
        }
        let nodes = Rc::new(nodes);
        self.cache.insert(key, nodes.clone());
        nodes
    }
}
