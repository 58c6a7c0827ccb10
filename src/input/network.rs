use smallvec::SmallVec;

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

pub type Dist = f64;

pub type TrackId = usize;
pub type ConnectionId = usize;
pub type SignalId = usize;
pub type BlockId = usize;
pub type RailId = usize;
pub type TrainId = usize;

pub type NameMap<Ref> = HashMap<Ref, usize>;

/// The physical track network, owned by the host. The core indexes into
/// these arenas but never creates or destroys their contents.
#[derive(Debug, Default)]
pub struct TrackNetwork {
    pub tracks: Vec<Track>,
    pub connections: Vec<Connection>,
    pub signals: Vec<SignalDef>,
    pub blocks: Vec<BlockDef>,
    pub rails: Vec<Rail>,
}

#[derive(Debug)]
pub struct NetNames<Ref: Hash + Eq + Debug> {
    pub track_names: NameMap<Ref>,
    pub signal_names: NameMap<Ref>,
    pub block_names: NameMap<Ref>,
    pub rail_names: NameMap<Ref>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrackState {
    Built,
    Removed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrackClass {
    Straight,
    Curved,
}

#[derive(Debug)]
pub struct Track {
    pub ends: [ConnectionId; 2],
    pub length: Dist,
    pub state: TrackState,
    pub class: TrackClass,
    pub electrified: bool,
    pub platform: bool,
    /// Traversable only from ends[0] towards ends[1] when set.
    pub one_way: bool,
    pub block: Option<BlockId>,
    pub rail: Option<RailId>,
}

/// Directional endpoint of a track segment. The outer set is empty at a
/// dead end, a single neighbor on plain continuations, and larger at a
/// switch or junction.
#[derive(Debug)]
pub struct Connection {
    pub track: TrackId,
    pub inner: ConnectionId,
    pub outer: SmallVec<[ConnectionId; 2]>,
    pub signal: Option<SignalId>,
    pub length: Dist,
    pub stop_boundary: bool,
}

#[derive(Debug)]
pub struct SignalDef {
    pub connection: ConnectionId,
    /// Resource block this signal gates entry into, if any.
    pub guards: Option<BlockId>,
    pub chain: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Simple,
    Path,
}

#[derive(Debug)]
pub struct BlockDef {
    pub kind: BlockKind,
}

#[derive(Debug)]
pub struct Rail {
    pub block: BlockId,
    /// Parallel rails which must be co-blocked to exclude conflicting
    /// movements across this one.
    pub linked: SmallVec<[RailId; 2]>,
}

/// Batched change notifications from the host, consumed by the context
/// once per tick.
#[derive(Debug, Copy, Clone)]
pub enum NetworkEvent {
    TracksChanged,
    SignalsChanged,
    BlockFreeChanged { block: BlockId, free: bool },
    RailVacated { rail: RailId, train: TrainId },
}

/// A vehicle's logical destination: the stop connections of the target
/// station, as enumerated by the station collaborator.
#[derive(Debug, Clone)]
pub struct Destination {
    pub stops: Vec<ConnectionId>,
}

impl TrackNetwork {
    pub fn conn(&self, c: ConnectionId) -> &Connection {
        &self.connections[c]
    }

    pub fn track_of(&self, c: ConnectionId) -> &Track {
        &self.tracks[self.connections[c].track]
    }

    pub fn rail_of(&self, c: ConnectionId) -> Option<RailId> {
        self.track_of(c).rail
    }

    pub fn block_of(&self, c: ConnectionId) -> Option<BlockId> {
        self.track_of(c).block
    }

    pub fn signal_at(&self, c: ConnectionId) -> Option<SignalId> {
        self.connections[c].signal
    }
}
