pub mod section;
pub mod builder;

pub use self::section::{AllowedDir, Section, SectionData};

use smallvec::SmallVec;
use std::collections::HashMap;

use crate::input::network::{ConnectionId, Dist, SignalId, TrackNetwork};

pub type SectionId = usize;
pub type NodeId = usize;
pub type EdgeId = usize;

/// Traversal direction of a section relative to its canonical connection
/// order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Dir {
    Forward,
    Backward,
}

impl Dir {
    pub fn opposite(self) -> Dir {
        match self {
            Dir::Forward => Dir::Backward,
            Dir::Backward => Dir::Forward,
        }
    }

    pub fn idx(self) -> usize {
        match self {
            Dir::Forward => 0,
            Dir::Backward => 1,
        }
    }
}

/// Graph vertex at a junction, dead end or platform boundary. Inbound
/// connections all share the same outer target set, which is exactly the
/// outbound set, so arrival and departure are directional and a vertex
/// never permits reversing onto the arriving track.
#[derive(Debug, Default)]
pub struct Node {
    pub inbound: SmallVec<[ConnectionId; 2]>,
    pub outbound: SmallVec<[ConnectionId; 2]>,
    pub edges: SmallVec<[EdgeId; 2]>,
    pub passable_inbound: u32,
    pub reachable: bool,
    pub reachable_electric: bool,
}

/// Directed arc between two nodes via one or more sections.
#[derive(Debug)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub start: ConnectionId,
    pub sections: SmallVec<[(SectionId, Dir); 4]>,
    pub data: SectionData,
    pub last_signal: Option<SignalId>,
    pub diversion_checkpoint: bool,
}

/// The compacted graph over the raw connection network. Rebuilt wholesale
/// on every network change; all cross-references are arena indices and no
/// identity survives a rebuild.
#[derive(Debug, Default)]
pub struct Graph {
    pub sections: Vec<Section>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub section_of: Vec<Option<SectionId>>,
    pub node_of_inbound: HashMap<ConnectionId, NodeId>,
    pub node_of_outbound: HashMap<ConnectionId, NodeId>,
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Extend an arbitrary mid-section position to the next node ahead,
    /// using the section back-links recorded during edge construction.
    /// Returns the node, the connections crossed on the way (including
    /// the origin itself), and the distance to the node.
    pub fn extend_to_node(
        &self,
        net: &TrackNetwork,
        origin: ConnectionId,
    ) -> Option<(NodeId, Vec<ConnectionId>, Dist)> {
        let track = net.connections[origin].track;
        let mut sid = (*self.section_of.get(track)?)?;
        let mut dir = self.sections[sid].exit_dir_of(origin)?;

        let mut conns: Vec<ConnectionId> = self.sections[sid]
            .ordered(dir)
            .iter()
            .cloned()
            .skip_while(|&c| c != origin)
            .collect();
        let mut dist = self.sections[sid].distance_to_exit(net, origin, dir)?;
        let node = self.sections[sid].next_node[dir.idx()]?;

        while let Some((next, next_dir)) = self.sections[sid].next_section[dir.idx()] {
            sid = next;
            dir = next_dir;
            conns.extend(self.sections[sid].ordered(dir).iter().cloned());
            dist += self.sections[sid].data.length;
        }

        Some((node, conns, dist))
    }
}
