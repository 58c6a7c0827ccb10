pub mod reserve;

use smallvec::SmallVec;

use std::collections::{HashMap, HashSet};
use std::mem;

use crate::input::network::{
    BlockId, BlockKind, ConnectionId, RailId, SignalId, TrackNetwork, TrainId,
};

/// Observable signal indication, derived from the reservation holder.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SignalAspect {
    Open,
    Closed,
}

/// An ordered connection sequence as produced by the pathfinder.
#[derive(Debug, Clone, Default)]
pub struct TrainPath {
    pub connections: Vec<ConnectionId>,
}

/// The rails a train has reserved within one block. Linked rails are
/// recorded individually, so releasing is exact. The beyond set holds
/// speculative reservations past the train's known path.
#[derive(Debug, Clone)]
pub struct TrainHold {
    pub path_rails: Vec<RailId>,
    pub beyond_rails: Vec<RailId>,
    pub last_path_rail: Option<RailId>,
}

impl TrainHold {
    fn is_empty(&self) -> bool {
        self.path_rails.is_empty() && self.beyond_rails.is_empty()
    }

    fn count_of(&self, rail: RailId) -> u32 {
        self.path_rails
            .iter()
            .chain(self.beyond_rails.iter())
            .filter(|&&r| r == rail)
            .count() as u32
    }
}

/// Reservation strategy, fixed at block classification time.
#[derive(Debug)]
pub enum BlockState {
    Simple { reserved_for: Option<TrainId> },
    Path { holds: HashMap<TrainId, TrainHold> },
}

impl BlockState {
    fn for_kind(kind: BlockKind) -> BlockState {
        match kind {
            BlockKind::Simple => BlockState::Simple { reserved_for: None },
            BlockKind::Path => BlockState::Path { holds: HashMap::new() },
        }
    }
}

#[derive(Debug)]
pub struct BlockEntry {
    pub state: BlockState,
    /// External occupancy override: while set, no fine-grained
    /// reservation is granted at all.
    pub fully_blocked: bool,
    pub gates: SmallVec<[SignalId; 2]>,
}

/// Per-block reservation state and per-signal holders. All state here is
/// cooperative bookkeeping; physical occupancy stays with the network.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    pub entries: Vec<BlockEntry>,
    pub signal_holders: Vec<Option<TrainId>>,
    pub rail_counts: Vec<u32>,
    pub changed_signals: HashSet<SignalId>,
}

impl BlockRegistry {
    pub fn new(net: &TrackNetwork) -> BlockRegistry {
        let mut r = BlockRegistry::default();
        r.sync(net);
        r
    }

    /// Re-derive gates and resize per-signal and per-rail state after
    /// the network's signal or track population changed. Reservation
    /// counts and holds survive.
    pub fn sync(&mut self, net: &TrackNetwork) {
        while self.entries.len() < net.blocks.len() {
            self.entries.push(BlockEntry {
                state: BlockState::for_kind(net.blocks[self.entries.len()].kind),
                fully_blocked: false,
                gates: SmallVec::new(),
            });
        }
        self.signal_holders.resize(net.signals.len(), None);
        self.rail_counts.resize(net.rails.len(), 0);
        for e in self.entries.iter_mut() {
            e.gates.clear();
        }
        for (i, s) in net.signals.iter().enumerate() {
            if let Some(b) = s.guards {
                self.entries[b].gates.push(i);
            }
        }
    }

    pub fn signal_holder(&self, sig: SignalId) -> Option<TrainId> {
        self.signal_holders[sig]
    }

    pub fn signal_aspect(&self, sig: SignalId) -> SignalAspect {
        if self.signal_holders[sig].is_some() {
            SignalAspect::Open
        } else {
            SignalAspect::Closed
        }
    }

    fn set_holder(&mut self, sig: SignalId, holder: Option<TrainId>) {
        if self.signal_holders[sig] != holder {
            self.signal_holders[sig] = holder;
            self.changed_signals.insert(sig);
        }
    }

    /// Drain the change-tracking set. Observers use this to invalidate
    /// whatever they derived from signal state.
    pub fn take_changed_signals(&mut self) -> Vec<SignalId> {
        let mut v: Vec<SignalId> = self.changed_signals.drain().collect();
        v.sort();
        v
    }

    pub fn is_reserved(&self, block: BlockId) -> bool {
        match self.entries[block].state {
            BlockState::Simple { reserved_for } => reserved_for.is_some(),
            BlockState::Path { ref holds } => !holds.is_empty(),
        }
    }

    /// Whether another train holds any reservation in this block. Feeds
    /// the dynamic occupancy penalty during scoring.
    pub fn is_held_by_other(&self, block: BlockId, train: TrainId) -> bool {
        let e = &self.entries[block];
        match e.state {
            BlockState::Simple { reserved_for } => {
                reserved_for.map_or(e.fully_blocked, |t| t != train)
            }
            BlockState::Path { ref holds } => {
                holds.keys().any(|&t| t != train) || (e.fully_blocked && !holds.contains_key(&train))
            }
        }
    }

    /// External free-condition change. While a block reports occupied,
    /// it is fully blocked; a simple block's holder is released once the
    /// block reports entirely free again.
    pub fn on_block_free_changed(&mut self, block: BlockId, free: bool) {
        self.entries[block].fully_blocked = !free;
        if free {
            let released = match self.entries[block].state {
                BlockState::Simple { ref mut reserved_for } => reserved_for.take(),
                _ => None,
            };
            if let Some(t) = released {
                let gates = self.entries[block].gates.clone();
                for sig in gates {
                    if self.signal_holders[sig] == Some(t) {
                        self.set_holder(sig, None);
                    }
                }
            }
        }
    }

    /// A train's tail cleared a rail segment: give back that segment and
    /// its linked rails, and drop the holder of any gate signal sitting
    /// on the vacated rail that this train has now passed.
    pub fn on_rail_vacated(&mut self, net: &TrackNetwork, rail: RailId, train: TrainId) {
        let block = net.rails[rail].block;

        let gates = self.entries[block].gates.clone();
        for sig in gates {
            if self.signal_holders[sig] == Some(train)
                && net.rail_of(net.signals[sig].connection) == Some(rail)
            {
                self.set_holder(sig, None);
            }
        }

        let rail_counts = &mut self.rail_counts;
        if let BlockState::Path { ref mut holds } = self.entries[block].state {
            let empty = if let Some(hold) = holds.get_mut(&train) {
                let mut give_back = vec![rail];
                give_back.extend(net.rails[rail].linked.iter().cloned());
                for r in give_back {
                    let removed = remove_one(&mut hold.path_rails, r)
                        || remove_one(&mut hold.beyond_rails, r);
                    if removed {
                        if rail_counts[r] == 0 {
                            panic!("reservation count for rail {} already zero", r);
                        }
                        rail_counts[r] -= 1;
                    }
                }
                hold.is_empty()
            } else {
                false
            };
            if empty {
                holds.remove(&train);
            }
        }
    }

    /// Explicit migration between reservation strategies. This is the
    /// only way a block changes variant at runtime.
    pub fn reclassify(&mut self, net: &TrackNetwork, block: BlockId, kind: BlockKind) {
        let old = mem::replace(&mut self.entries[block].state, BlockState::for_kind(kind));
        match (old, kind) {
            (BlockState::Simple { reserved_for }, BlockKind::Path) => {
                let mut holds = HashMap::new();
                if let Some(t) = reserved_for {
                    // Whole-block exclusivity becomes a hold over every
                    // rail of the block.
                    let mut hold = TrainHold {
                        path_rails: Vec::new(),
                        beyond_rails: Vec::new(),
                        last_path_rail: None,
                    };
                    for (r, def) in net.rails.iter().enumerate() {
                        if def.block == block {
                            self.rail_counts[r] += 1;
                            hold.path_rails.push(r);
                        }
                    }
                    holds.insert(t, hold);
                }
                self.entries[block].state = BlockState::Path { holds };
            }
            (BlockState::Path { holds }, BlockKind::Simple) => {
                for hold in holds.values() {
                    for &r in hold.path_rails.iter().chain(hold.beyond_rails.iter()) {
                        self.rail_counts[r] -= 1;
                    }
                }
                let reserved_for = if holds.len() == 1 {
                    holds.keys().next().cloned()
                } else {
                    None
                };
                self.entries[block].state = BlockState::Simple { reserved_for };
            }
            (old, _) => {
                // Same kind; nothing to migrate.
                self.entries[block].state = old;
            }
        }
    }
}

fn remove_one(v: &mut Vec<RailId>, rail: RailId) -> bool {
    match v.iter().position(|&r| r == rail) {
        Some(i) => {
            v.remove(i);
            true
        }
        None => false,
    }
}
