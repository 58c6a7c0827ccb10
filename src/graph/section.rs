use std::collections::HashMap;

use crate::input::network::{BlockId, ConnectionId, Dist, SignalId, TrackClass, TrackNetwork};

use super::{Dir, EdgeId, NodeId, SectionId};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AllowedDir {
    Both,
    Forward,
    Backward,
    Neither,
}

impl AllowedDir {
    pub fn allows(self, dir: Dir) -> bool {
        match self {
            AllowedDir::Both => true,
            AllowedDir::Forward => dir == Dir::Forward,
            AllowedDir::Backward => dir == Dir::Backward,
            AllowedDir::Neither => false,
        }
    }

    fn restrict(self, dir: Dir) -> AllowedDir {
        match (self, dir) {
            (AllowedDir::Both, Dir::Forward) => AllowedDir::Forward,
            (AllowedDir::Both, Dir::Backward) => AllowedDir::Backward,
            (AllowedDir::Forward, Dir::Forward) => AllowedDir::Forward,
            (AllowedDir::Backward, Dir::Backward) => AllowedDir::Backward,
            _ => AllowedDir::Neither,
        }
    }
}

/// Physical data aggregated over a section's tracks, and over an edge's
/// sections.
#[derive(Debug, Clone)]
pub struct SectionData {
    pub length: Dist,
    pub curved_length: Dist,
    pub platform: bool,
    pub electrified: bool,
    pub allowed: AllowedDir,
    pub last_signal: [Option<SignalId>; 2],
    /// Portion of this data's length attributable to each resource block.
    pub block_lengths: HashMap<BlockId, Dist>,
}

impl SectionData {
    pub fn empty() -> SectionData {
        SectionData {
            length: 0.0,
            curved_length: 0.0,
            platform: false,
            electrified: true,
            allowed: AllowedDir::Both,
            last_signal: [None, None],
            block_lengths: HashMap::new(),
        }
    }

    /// Merge a traversed section into an edge aggregate.
    pub fn merge(&mut self, s: &SectionData) {
        self.length += s.length;
        self.curved_length += s.curved_length;
        self.platform |= s.platform;
        self.electrified &= s.electrified;
        for (&b, &l) in s.block_lengths.iter() {
            *self.block_lengths.entry(b).or_insert(0.0) += l;
        }
    }
}

/// Maximal straight-through run of track between structurally significant
/// points, in one canonical direction. Connections alternate entry/inner
/// endpoints of the tracks crossed, so a track's two endpoints sit at an
/// even and the following odd index.
#[derive(Debug)]
pub struct Section {
    pub connections: Vec<ConnectionId>,
    pub reversed: Vec<ConnectionId>,
    pub data: SectionData,
    pub next_node: [Option<NodeId>; 2],
    pub next_section: [Option<(SectionId, Dir)>; 2],
    pub owner_edge: [Option<EdgeId>; 2],
}

impl Section {
    pub fn new() -> Section {
        Section {
            connections: Vec::new(),
            reversed: Vec::new(),
            data: SectionData::empty(),
            next_node: [None, None],
            next_section: [None, None],
            owner_edge: [None, None],
        }
    }

    /// Append the track entered through `entry`, aggregating its data.
    pub fn push_track(&mut self, net: &TrackNetwork, entry: ConnectionId) {
        let track = &net.tracks[net.connections[entry].track];
        self.connections.push(entry);
        self.connections.push(net.connections[entry].inner);

        self.data.length += track.length;
        if track.class == TrackClass::Curved {
            self.data.curved_length += track.length;
        }
        self.data.platform |= track.platform;
        self.data.electrified &= track.electrified;
        if let Some(b) = track.block {
            *self.data.block_lengths.entry(b).or_insert(0.0) += track.length;
        }
        if track.one_way {
            let canonical = if entry == track.ends[0] { Dir::Forward } else { Dir::Backward };
            self.data.allowed = self.data.allowed.restrict(canonical);
        }
    }

    /// Fix the reverse order list and per-direction signal data once the
    /// walk has finished.
    pub fn finish(&mut self, net: &TrackNetwork) {
        self.reversed = self.connections.iter().rev().cloned().collect();
        for &c in self.connections.iter() {
            if let Some(sig) = net.connections[c].signal {
                self.data.last_signal[Dir::Forward.idx()] = Some(sig);
            }
        }
        for &c in self.reversed.iter() {
            if let Some(sig) = net.connections[c].signal {
                self.data.last_signal[Dir::Backward.idx()] = Some(sig);
            }
        }
    }

    pub fn ordered(&self, dir: Dir) -> &[ConnectionId] {
        match dir {
            Dir::Forward => &self.connections,
            Dir::Backward => &self.reversed,
        }
    }

    pub fn entry_conn(&self, dir: Dir) -> ConnectionId {
        match dir {
            Dir::Forward => self.connections[0],
            Dir::Backward => *self.connections.last().unwrap(),
        }
    }

    pub fn exit_conn(&self, dir: Dir) -> ConnectionId {
        self.entry_conn(dir.opposite())
    }

    /// The direction in which a vehicle leaves the section when it exits
    /// its current track through `conn`. Entry endpoints sit at even
    /// indices, inner endpoints at odd ones.
    pub fn exit_dir_of(&self, conn: ConnectionId) -> Option<Dir> {
        let i = self.connections.iter().position(|&c| c == conn)?;
        if i % 2 == 1 {
            Some(Dir::Forward)
        } else {
            Some(Dir::Backward)
        }
    }

    /// Remaining distance from a vehicle whose front is at `conn` to the
    /// section exit in `dir`.
    pub fn distance_to_exit(&self, net: &TrackNetwork, conn: ConnectionId, dir: Dir) -> Option<Dist> {
        let i = self.connections.iter().position(|&c| c == conn)?;
        let track = i / 2;
        let lengths: Vec<Dist> = self
            .connections
            .iter()
            .step_by(2)
            .map(|&c| net.connections[c].length)
            .collect();
        Some(match dir {
            Dir::Forward => lengths[track + 1..].iter().sum(),
            Dir::Backward => lengths[..track].iter().sum(),
        })
    }
}
