use log::{error, warn};

use std::collections::HashMap;
use std::mem;
use std::time::Instant;

use crate::blocks::{BlockRegistry, SignalAspect, TrainPath};
use crate::dest::DestinationResolver;
use crate::graph::{builder, Graph, NodeId};
use crate::input::network::{
    ConnectionId, Destination, NetworkEvent, SignalId, TrackNetwork, TrainId,
};
use crate::search::{self, ScoreWeights, Scorer};

pub use crate::search::SearchStats;

pub type ObserverId = usize;

/// One instance of the pathfinding and reservation core. Owns the
/// compacted graph, the block registry and every cache; constructed once
/// per simulation and handed to all operations, so independent instances
/// never share state. All operations run to completion on the calling
/// thread and assume exclusive access.
pub struct PathingContext {
    pub weights: ScoreWeights,
    graph: Graph,
    dirty: bool,
    registry: BlockRegistry,
    destinations: DestinationResolver,
    heuristics: HashMap<NodeId, Vec<f64>>,
    stats: SearchStats,
    pending: Vec<NetworkEvent>,
    observers: Vec<(ObserverId, Box<dyn Fn(&[SignalId])>)>,
    next_observer: ObserverId,
}

impl PathingContext {
    pub fn new(net: &TrackNetwork, weights: ScoreWeights) -> PathingContext {
        PathingContext {
            weights,
            graph: Graph::default(),
            dirty: true,
            registry: BlockRegistry::new(net),
            destinations: DestinationResolver::new(),
            heuristics: HashMap::new(),
            stats: SearchStats::default(),
            pending: Vec::new(),
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    /// Queue a change notification. Nothing is recomputed here; events
    /// drain on the next tick or path request, batching a burst of
    /// changes into one rebuild.
    pub fn notify(&mut self, event: NetworkEvent) {
        self.pending.push(event);
    }

    pub fn tick(&mut self, net: &TrackNetwork) {
        self.process_pending(net);
        self.flush_signal_changes();
    }

    fn process_pending(&mut self, net: &TrackNetwork) {
        let pending = mem::replace(&mut self.pending, Vec::new());
        for ev in pending {
            match ev {
                NetworkEvent::TracksChanged | NetworkEvent::SignalsChanged => {
                    self.dirty = true;
                    self.registry.sync(net);
                }
                NetworkEvent::BlockFreeChanged { block, free } => {
                    self.registry.on_block_free_changed(block, free);
                }
                NetworkEvent::RailVacated { rail, train } => {
                    self.registry.on_rail_vacated(net, rail, train);
                }
            }
        }
    }

    fn flush_signal_changes(&mut self) {
        let changed = self.registry.take_changed_signals();
        if changed.is_empty() {
            return;
        }
        for (_, obs) in self.observers.iter() {
            obs(&changed);
        }
    }

    /// Rebuild the graph if a change notification arrived since the last
    /// build. A failed rebuild keeps the previous graph; the next change
    /// notification re-arms the dirty flag.
    fn ensure_graph(&mut self, net: &TrackNetwork) {
        if !self.dirty {
            return;
        }
        match builder::build(net) {
            Ok(g) => {
                self.graph = g;
                self.heuristics.clear();
                self.destinations.invalidate();
            }
            Err(e) => {
                error!("graph rebuild failed, keeping previous graph: {}", e);
            }
        }
        self.dirty = false;
    }

    /// Compute a route for `train` from its current front connection to
    /// the nearest stop of `dest`, returning whether one was found and
    /// the ordered connection sequence to follow.
    pub fn find_immediately(
        &mut self,
        net: &TrackNetwork,
        train: TrainId,
        origin: ConnectionId,
        dest: &Destination,
    ) -> (bool, TrainPath) {
        self.process_pending(net);
        self.ensure_graph(net);
        let t0 = Instant::now();

        let targets = self.destinations.resolve(net, &self.graph, dest);
        let (start, prefix, _dist) = match self.graph.extend_to_node(net, origin) {
            Some(x) => x,
            None => {
                self.stats.last_search_ms = elapsed_ms(t0);
                return (false, TrainPath::default());
            }
        };
        if targets.is_empty() {
            self.stats.last_search_ms = elapsed_ms(t0);
            return (false, TrainPath::default());
        }

        let mut heuristic = match self.heuristics.remove(&start) {
            Some(h) => h,
            None => {
                let scorer = Scorer::statics(&self.weights);
                search::find_all(&self.graph, start, &scorer, &mut self.stats)
            }
        };

        let outcome = {
            let scorer = Scorer {
                weights: &self.weights,
                occupancy: Some((&self.registry, train)),
            };
            search::find_one(
                &self.graph,
                start,
                &*targets,
                &mut heuristic,
                &scorer,
                true,
                &mut self.stats,
            )
        };
        self.heuristics.insert(start, heuristic);

        let result = match outcome.found {
            Some(goal) => {
                let mut path = TrainPath { connections: prefix };
                for e in outcome.edges_to(&self.graph, goal) {
                    for &(sid, dir) in self.graph.edges[e].sections.iter() {
                        path.connections
                            .extend(self.graph.sections[sid].ordered(dir).iter().cloned());
                    }
                }
                (true, path)
            }
            None => (false, TrainPath::default()),
        };
        self.stats.last_search_ms = elapsed_ms(t0);
        result
    }

    /// Invoked when a train's obstacle check reaches `signal`; runs the
    /// reservation protocol as a side effect and reports whether the
    /// signal opens for this train.
    pub fn is_signal_open_for(
        &mut self,
        net: &TrackNetwork,
        signal: SignalId,
        train: TrainId,
        path: &TrainPath,
    ) -> bool {
        self.process_pending(net);
        let conn = net.signals[signal].connection;
        let idx = match path.connections.iter().position(|&c| c == conn) {
            Some(i) => i,
            None => {
                warn!("signal {} is not on the supplied path", signal);
                return false;
            }
        };
        self.registry.try_reserve_path(net, train, path, idx)
    }

    pub fn signal_state(&self, signal: SignalId) -> SignalAspect {
        self.registry.signal_aspect(signal)
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut BlockRegistry {
        &mut self.registry
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    pub fn subscribe_signal_changes(&mut self, f: Box<dyn Fn(&[SignalId])>) -> ObserverId {
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.push((id, f));
        id
    }

    pub fn unsubscribe_signal_changes(&mut self, id: ObserverId) {
        self.observers.retain(|(i, _)| *i != id);
    }
}

fn elapsed_ms(t0: Instant) -> f64 {
    let d = t0.elapsed();
    d.as_secs() as f64 * 1000.0 + f64::from(d.subsec_nanos()) / 1e6
}
