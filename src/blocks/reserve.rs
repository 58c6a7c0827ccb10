use log::debug;

use crate::input::network::{
    BlockId, ConnectionId, RailId, SignalId, TrackNetwork, TrainId,
};

use super::{BlockRegistry, BlockState, TrainHold, TrainPath};

/// Result of the own-path rail scan for one block: the rails implicated
/// between the gating signal and the next signal, the index that signal
/// sits at (if the known path reaches one), and the speculative rails
/// gathered by looking ahead past the known path.
struct Scan {
    rails: Vec<RailId>,
    next_signal_index: Option<usize>,
    beyond: Vec<RailId>,
    last_path_rail: Option<RailId>,
}

impl BlockRegistry {
    /// Attempt to reserve forward progress for `train` through the block
    /// gated by the signal at `path[start_index]`.
    ///
    /// Either every implicated rail in this block and every chained
    /// downstream block is granted, or nothing is: validation runs over
    /// the whole cascade before any rail count changes, so a refusal at
    /// any depth rolls back to the untouched state. Re-reserving for a
    /// train that already holds rails here replaces its previous hold.
    pub fn try_reserve_path(
        &mut self,
        net: &TrackNetwork,
        train: TrainId,
        path: &TrainPath,
        start_index: usize,
    ) -> bool {
        let conn = path.connections[start_index];
        let sig = match net.signal_at(conn) {
            Some(s) => s,
            None => panic!("reservation requested at connection {} which has no signal", conn),
        };
        let block = match net.signals[sig].guards {
            Some(b) => b,
            None => panic!("signal {} does not gate any block", sig),
        };
        if !self.entries[block].gates.contains(&sig) {
            panic!("signal {} is not an inbound gate of block {}", sig, block);
        }

        let simple = match self.entries[block].state {
            BlockState::Simple { .. } => true,
            BlockState::Path { .. } => false,
        };
        if simple {
            self.reserve_simple(block, sig, train)
        } else {
            self.reserve_path_block(net, train, path, start_index, block, sig)
        }
    }

    fn reserve_simple(&mut self, block: BlockId, sig: SignalId, train: TrainId) -> bool {
        let grant = match self.entries[block].state {
            BlockState::Simple { reserved_for } => match reserved_for {
                Some(t) if t == train => true,
                Some(_) => false,
                None => !self.entries[block].fully_blocked,
            },
            _ => unreachable!(),
        };
        if grant {
            if let BlockState::Simple { ref mut reserved_for } = self.entries[block].state {
                *reserved_for = Some(train);
            }
            self.set_holder(sig, Some(train));
        } else {
            debug!("simple block {} refused for train {}", block, train);
        }
        grant
    }

    fn reserve_path_block(
        &mut self,
        net: &TrackNetwork,
        train: TrainId,
        path: &TrainPath,
        start_index: usize,
        block: BlockId,
        sig: SignalId,
    ) -> bool {
        if self.entries[block].fully_blocked {
            debug!("block {} fully blocked; refusing train {}", block, train);
            return false;
        }

        let scan = scan_own_path(net, block, path, start_index);
        for &r in scan.rails.iter().chain(scan.beyond.iter()) {
            if !self.rail_free_for(net, block, r, train) {
                debug!("rail {} in block {} not free; refusing train {}", r, block, train);
                return false;
            }
        }

        // A chain signal only commits once the next block grants too.
        if net.signals[sig].chain {
            if let Some(j) = scan.next_signal_index {
                if !self.try_reserve_path(net, train, path, j) {
                    return false;
                }
            }
        }

        self.commit(net, block, sig, train, scan);
        true
    }

    fn count_excluding(&self, block: BlockId, rail: RailId, train: TrainId) -> u32 {
        let own = match self.entries[block].state {
            BlockState::Path { ref holds } => {
                holds.get(&train).map(|h| h.count_of(rail)).unwrap_or(0)
            }
            _ => 0,
        };
        self.rail_counts[rail] - own
    }

    /// A rail may be granted only while its count, and every linked
    /// rail's count, is zero apart from this train's own current hold.
    fn rail_free_for(&self, net: &TrackNetwork, block: BlockId, rail: RailId, train: TrainId) -> bool {
        if self.count_excluding(block, rail, train) > 0 {
            return false;
        }
        net.rails[rail]
            .linked
            .iter()
            .all(|&l| self.count_excluding(block, l, train) == 0)
    }

    fn commit(
        &mut self,
        net: &TrackNetwork,
        block: BlockId,
        sig: SignalId,
        train: TrainId,
        scan: Scan,
    ) {
        let rail_counts = &mut self.rail_counts;
        if let BlockState::Path { ref mut holds } = self.entries[block].state {
            if let Some(old) = holds.remove(&train) {
                for r in old.path_rails.into_iter().chain(old.beyond_rails.into_iter()) {
                    rail_counts[r] -= 1;
                }
            }
            let mut hold = TrainHold {
                path_rails: Vec::new(),
                beyond_rails: Vec::new(),
                last_path_rail: scan.last_path_rail,
            };
            for &r in scan.rails.iter() {
                rail_counts[r] += 1;
                hold.path_rails.push(r);
                for &l in net.rails[r].linked.iter() {
                    rail_counts[l] += 1;
                    hold.path_rails.push(l);
                }
            }
            for &r in scan.beyond.iter() {
                rail_counts[r] += 1;
                hold.beyond_rails.push(r);
                for &l in net.rails[r].linked.iter() {
                    rail_counts[l] += 1;
                    hold.beyond_rails.push(l);
                }
            }
            holds.insert(train, hold);
        }
        self.set_holder(sig, Some(train));
    }
}

fn push_unique(v: &mut Vec<RailId>, r: RailId) {
    if !v.contains(&r) {
        v.push(r);
    }
}

/// Collect the rails between the gating signal and the next signal on
/// the known path. If the path ends first, look ahead provisionally
/// along every continuation inside the block until each branch meets a
/// signal, leaves the block, or dead-ends.
fn scan_own_path(
    net: &TrackNetwork,
    block: BlockId,
    path: &TrainPath,
    start_index: usize,
) -> Scan {
    let mut rails = Vec::new();
    let mut next_signal_index = None;
    let mut last_path_rail = None;

    let start_conn = path.connections[start_index];
    if net.block_of(start_conn) == Some(block) {
        if let Some(r) = net.rail_of(start_conn) {
            push_unique(&mut rails, r);
            last_path_rail = Some(r);
        }
    }
    for i in start_index + 1..path.connections.len() {
        let c = path.connections[i];
        if net.signal_at(c).is_some() {
            next_signal_index = Some(i);
            break;
        }
        if net.block_of(c) == Some(block) {
            if let Some(r) = net.rail_of(c) {
                push_unique(&mut rails, r);
                last_path_rail = Some(r);
            }
        }
    }

    let mut beyond = Vec::new();
    if next_signal_index.is_none() {
        let last = *path.connections.last().unwrap();
        let mut stack: Vec<ConnectionId> = net.connections[last].outer.to_vec();
        let mut visited: Vec<ConnectionId> = Vec::new();
        while let Some(entry) = stack.pop() {
            if visited.contains(&entry) {
                continue;
            }
            visited.push(entry);
            if net.signal_at(entry).is_some() {
                // The next block starts here.
                continue;
            }
            if net.block_of(entry) != Some(block) {
                continue;
            }
            if let Some(r) = net.rail_of(entry) {
                if !rails.contains(&r) {
                    push_unique(&mut beyond, r);
                }
            }
            let inner = net.connections[entry].inner;
            if net.signal_at(inner).is_some() {
                continue;
            }
            stack.extend(net.connections[inner].outer.iter().cloned());
        }
    }

    Scan {
        rails,
        next_signal_index,
        beyond,
        last_path_rail,
    }
}
