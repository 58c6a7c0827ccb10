use failure::Fail;
use log::debug;
use smallvec::SmallVec;

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::input::network::{ConnectionId, TrackId, TrackNetwork, TrackState};

use super::section::Section;
use super::{Dir, Edge, Graph, Node, NodeId, SectionData};

#[derive(Debug, Fail)]
pub enum BuildError {
    #[fail(display = "unbuilt track {} encountered mid-walk", _0)]
    UnbuiltTrack(TrackId),
    #[fail(display = "connection {} is not a section boundary", _0)]
    NotABoundary(ConnectionId),
    #[fail(display = "edge walk from connection {} did not terminate at a node", _0)]
    UnterminatedEdge(ConnectionId),
    #[fail(display = "section traversal claimed by two edges at connection {}", _0)]
    EdgeClaimedTwice(ConnectionId),
}

/// Compact the raw connection network into sections, nodes and edges.
/// The result is a fresh arena; nothing from a previous build survives.
pub fn build(net: &TrackNetwork) -> Result<Graph, BuildError> {
    let mut g = Graph {
        section_of: vec![None; net.tracks.len()],
        ..Default::default()
    };
    let mut boundary: BTreeSet<ConnectionId> = BTreeSet::new();
    let mut queue: VecDeque<ConnectionId> = VecDeque::new();

    // Dead ends are the natural section starting points, and each is a
    // node boundary in its own right.
    for (i, c) in net.connections.iter().enumerate() {
        if c.outer.is_empty() && net.tracks[c.track].state == TrackState::Built {
            queue.push_back(i);
            boundary.insert(i);
        }
    }
    drain_sections(net, &mut g, &mut queue, &mut boundary)?;

    // Networks without dead ends: seed just past every switch.
    if unassigned(net, &g).is_some() {
        for c in net.connections.iter() {
            if c.outer.len() > 1 {
                queue.extend(c.outer.iter().cloned());
            }
        }
        drain_sections(net, &mut g, &mut queue, &mut boundary)?;
    }

    // Then from platform stop boundaries, covering both sides of the
    // boundary point.
    if unassigned(net, &g).is_some() {
        for (i, c) in net.connections.iter().enumerate() {
            if c.stop_boundary {
                queue.push_back(i);
                queue.extend(c.outer.iter().cloned());
            }
        }
        drain_sections(net, &mut g, &mut queue, &mut boundary)?;
    }

    // Isolated loops have no structural seed at all; pick arbitrarily
    // until every built track is covered.
    while let Some(track) = unassigned(net, &g) {
        queue.push_back(net.tracks[track].ends[0]);
        drain_sections(net, &mut g, &mut queue, &mut boundary)?;
    }

    build_nodes(net, &mut g, &boundary);
    build_edges(net, &mut g)?;
    compute_reachability(net, &mut g);

    debug!(
        "graph built: {} sections, {} nodes, {} edges",
        g.sections.len(),
        g.nodes.len(),
        g.edges.len()
    );
    Ok(g)
}

fn unassigned(net: &TrackNetwork, g: &Graph) -> Option<TrackId> {
    (0..net.tracks.len())
        .find(|&t| net.tracks[t].state == TrackState::Built && g.section_of[t].is_none())
}

fn drain_sections(
    net: &TrackNetwork,
    g: &mut Graph,
    queue: &mut VecDeque<ConnectionId>,
    boundary: &mut BTreeSet<ConnectionId>,
) -> Result<(), BuildError> {
    while let Some(seed) = queue.pop_front() {
        fill_section(net, g, seed, queue, boundary)?;
    }
    Ok(())
}

/// Walk inner-to-outer from `seed`, claiming one track at a time, until a
/// junction, a dead end, a platform stop boundary or an already claimed
/// track stops the section. Stops of the first three kinds flag node
/// boundary connections; the last kind is a plain section break that edge
/// construction later chains through.
fn fill_section(
    net: &TrackNetwork,
    g: &mut Graph,
    seed: ConnectionId,
    queue: &mut VecDeque<ConnectionId>,
    boundary: &mut BTreeSet<ConnectionId>,
) -> Result<(), BuildError> {
    if g.section_of[net.connections[seed].track].is_some() {
        return Ok(());
    }
    if net.tracks[net.connections[seed].track].state != TrackState::Built {
        return Ok(());
    }

    let sid = g.sections.len();
    let mut sec = Section::new();
    let mut cur = seed;

    loop {
        let track = net.connections[cur].track;
        if g.section_of[track].is_some() {
            // Ran into a previously built section; break without a node.
            break;
        }
        g.section_of[track] = Some(sid);
        sec.push_track(net, cur);

        let head = net.connections[cur].inner;
        let outer = &net.connections[head].outer;
        if outer.len() != 1 {
            // Dead end or facing junction. Every connection meeting at
            // the junction point is a boundary, whichever side a walk
            // happens to arrive from.
            boundary.insert(head);
            for &o in outer.iter() {
                if net.tracks[net.connections[o].track].state == TrackState::Built {
                    boundary.insert(o);
                }
            }
            queue.extend(outer.iter().cloned());
            break;
        }
        let next = outer[0];
        if net.connections[next].outer.len() > 1 {
            // Trailing join at a switch stem; flag the whole point here
            // as well.
            boundary.insert(head);
            boundary.insert(next);
            for &o in net.connections[next].outer.iter() {
                if net.tracks[net.connections[o].track].state == TrackState::Built {
                    boundary.insert(o);
                }
            }
            queue.push_back(next);
            queue.extend(net.connections[next].outer.iter().cloned());
            break;
        }
        if net.connections[next].stop_boundary {
            // Platform boundary: a node in both travel directions.
            boundary.insert(head);
            boundary.insert(next);
            queue.push_back(next);
            break;
        }
        if net.tracks[net.connections[next].track].state != TrackState::Built {
            return Err(BuildError::UnbuiltTrack(net.connections[next].track));
        }
        cur = next;
    }

    if !sec.connections.is_empty() {
        sec.finish(net);
        g.sections.push(sec);
    }
    Ok(())
}

/// Group flagged boundary connections by their outer target set: each
/// distinct target set is one node (the group arrives, the targets
/// depart). A dead end yields a start/end node pair over the same
/// physical connection.
fn build_nodes(net: &TrackNetwork, g: &mut Graph, boundary: &BTreeSet<ConnectionId>) {
    let mut groups: BTreeMap<Vec<ConnectionId>, Vec<ConnectionId>> = BTreeMap::new();

    for &c in boundary.iter() {
        let mut targets: Vec<ConnectionId> = net.connections[c].outer.to_vec();
        if targets.is_empty() {
            let end = g.nodes.len();
            g.nodes.push(Node {
                inbound: SmallVec::from_slice(&[c]),
                ..Default::default()
            });
            g.node_of_inbound.insert(c, end);
            let start = g.nodes.len();
            g.nodes.push(Node {
                outbound: SmallVec::from_slice(&[c]),
                ..Default::default()
            });
            g.node_of_outbound.insert(c, start);
            continue;
        }
        targets.sort();
        groups.entry(targets).or_insert_with(Vec::new).push(c);
    }

    for (targets, members) in groups {
        let id = g.nodes.len();
        for &c in members.iter() {
            g.node_of_inbound.insert(c, id);
        }
        for &c in targets.iter() {
            g.node_of_outbound.insert(c, id);
        }
        g.nodes.push(Node {
            inbound: members.into_iter().collect(),
            outbound: targets.into_iter().collect(),
            ..Default::default()
        });
    }
}

/// Follow every outbound connection through chained sections until a
/// node's inbound connection is reached, materializing an edge and the
/// section back-links that let a mid-section position extend to the next
/// node without re-walking.
fn build_edges(net: &TrackNetwork, g: &mut Graph) -> Result<(), BuildError> {
    for node_id in 0..g.nodes.len() {
        let outbound = g.nodes[node_id].outbound.clone();
        'outbound: for &start in outbound.iter() {
            let mut walked: SmallVec<[(usize, Dir); 4]> = SmallVec::new();
            let mut seen: HashSet<(usize, Dir)> = HashSet::new();
            let mut data = SectionData::empty();
            let mut last_signal = None;
            let mut cur = start;

            let to = loop {
                let track = net.connections[cur].track;
                let sid = match g.section_of.get(track).and_then(|s| *s) {
                    Some(s) => s,
                    None => return Err(BuildError::NotABoundary(cur)),
                };
                let dir = if g.sections[sid].entry_conn(Dir::Forward) == cur {
                    Dir::Forward
                } else if g.sections[sid].entry_conn(Dir::Backward) == cur {
                    Dir::Backward
                } else {
                    return Err(BuildError::NotABoundary(cur));
                };
                if !seen.insert((sid, dir)) {
                    return Err(BuildError::UnterminatedEdge(start));
                }
                if !g.sections[sid].data.allowed.allows(dir) {
                    // One-way tracks forbid this traversal entirely.
                    continue 'outbound;
                }
                data.merge(&g.sections[sid].data);
                if let Some(sig) = g.sections[sid].data.last_signal[dir.idx()] {
                    last_signal = Some(sig);
                }
                walked.push((sid, dir));

                let exit = g.sections[sid].exit_conn(dir);
                if let Some(&to) = g.node_of_inbound.get(&exit) {
                    break to;
                }
                // A section break left by seeding; chain through it.
                let outer = &net.connections[exit].outer;
                if outer.len() != 1 {
                    return Err(BuildError::UnterminatedEdge(start));
                }
                cur = outer[0];
            };

            let edge_id = g.edges.len();
            for (i, &(sid, dir)) in walked.iter().enumerate() {
                if g.sections[sid].owner_edge[dir.idx()].is_some() {
                    return Err(BuildError::EdgeClaimedTwice(
                        g.sections[sid].entry_conn(dir),
                    ));
                }
                g.sections[sid].owner_edge[dir.idx()] = Some(edge_id);
                g.sections[sid].next_node[dir.idx()] = Some(to);
                g.sections[sid].next_section[dir.idx()] = walked.get(i + 1).cloned();
            }
            g.edges.push(Edge {
                from: node_id,
                to,
                start,
                sections: walked,
                data,
                last_signal,
                diversion_checkpoint: false,
            });
            g.nodes[node_id].edges.push(edge_id);
        }
    }
    Ok(())
}

/// Forward closure from plausible journey starts (dead-end start nodes
/// and platform boundaries), unrestricted and power-constrained, plus the
/// passable-inbound counts and diversion checkpoint flags derived from
/// them.
fn compute_reachability(net: &TrackNetwork, g: &mut Graph) {
    let seed = |n: &Node| {
        n.inbound.is_empty()
            || n.inbound.iter().chain(n.outbound.iter()).any(|&c| net.connections[c].stop_boundary)
    };

    let mut queue: VecDeque<NodeId> = VecDeque::new();
    for (i, n) in g.nodes.iter_mut().enumerate() {
        if seed(n) {
            n.reachable = true;
            queue.push_back(i);
        }
    }
    while let Some(n) = queue.pop_front() {
        for &e in g.nodes[n].edges.clone().iter() {
            let to = g.edges[e].to;
            if !g.nodes[to].reachable {
                g.nodes[to].reachable = true;
                queue.push_back(to);
            }
        }
    }

    for (i, n) in g.nodes.iter_mut().enumerate() {
        if seed(n) {
            n.reachable_electric = true;
            queue.push_back(i);
        }
    }
    while let Some(n) = queue.pop_front() {
        for &e in g.nodes[n].edges.clone().iter() {
            if !g.edges[e].data.electrified {
                continue;
            }
            let to = g.edges[e].to;
            if !g.nodes[to].reachable_electric {
                g.nodes[to].reachable_electric = true;
                queue.push_back(to);
            }
        }
    }

    for e in 0..g.edges.len() {
        if g.nodes[g.edges[e].from].reachable {
            g.nodes[g.edges[e].to].passable_inbound += 1;
        }
    }
    for e in 0..g.edges.len() {
        let to = g.edges[e].to;
        let passable_out = g.nodes[to]
            .edges
            .iter()
            .filter(|&&o| g.nodes[to].reachable && g.nodes[g.edges[o].to].reachable)
            .count();
        g.edges[e].diversion_checkpoint = g.edges[e].last_signal.is_some() && passable_out > 1;
    }
}
