use signalbox::*;

use std::collections::HashMap;
use std::path::PathBuf;
use structopt::StructOpt;

use signalbox::blocks::SignalAspect;
use signalbox::input::network::{Destination, NetNames, TrackNetwork};
use signalbox::input::query_parser::{EndName, Query};

/// Signalbox -- track graph pathfinding and block reservation
#[derive(StructOpt, Debug)]
#[structopt(name = "signalbox")]
struct Opt {
    /// Verbose mode (-v, -vv)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Track layout file in the Signalbox layout format
    #[structopt(parse(from_os_str))]
    layout: PathBuf,

    /// Query script to run against the layout
    #[structopt(short = "q", long = "query", parse(from_os_str))]
    query: Option<PathBuf>,

    /// Require electrified routes
    #[structopt(short = "e", long = "electric")]
    electric: bool,

    /// Print search statistics after the run
    #[structopt(short = "s", long = "stats")]
    stats: bool,
}

fn end_connection(
    net: &TrackNetwork,
    names: &NetNames<String>,
    e: &EndName,
) -> AppResult<usize> {
    let track = names
        .track_names
        .get(&e.track)
        .cloned()
        .ok_or_else(|| failure::format_err!("unknown track \"{}\"", e.track))?;
    Ok(net.tracks[track].ends[if e.end_b { 1 } else { 0 }])
}

fn lookup(names: &HashMap<String, usize>, name: &str, kind: &str) -> AppResult<usize> {
    names
        .get(name)
        .cloned()
        .ok_or_else(|| failure::format_err!("unknown {} \"{}\"", kind, name))
}

fn run(opt: &Opt) -> AppResult<()> {
    let (net, names) = get_network(&opt.layout)?;
    if opt.verbose >= 2 {
        println!("Network:");
        println!("  Tracks:");
        for x in &net.tracks {
            println!("    * {:?}", x);
        }
        println!("  Connections:");
        for x in &net.connections {
            println!("    * {:?}", x);
        }
        println!("  Signals:");
        for x in &net.signals {
            println!("    * {:?}", x);
        }
    }

    let mut weights = ScoreWeights::default();
    weights.require_electrified = opt.electric;
    let mut ctx = PathingContext::new(&net, weights);

    if let Some(ref query) = opt.query {
        let queries = get_queries(query)?;
        if opt.verbose >= 1 {
            println!("Queries:");
            for q in &queries {
                println!("  - {:?}", q);
            }
            println!();
        }

        let mut trains: HashMap<String, usize> = HashMap::new();
        let mut paths: HashMap<usize, TrainPath> = HashMap::new();
        for q in &queries {
            match q {
                Query::Find(train, from, stops) => {
                    let next = trains.len();
                    let train = *trains.entry(train.clone()).or_insert(next);
                    let origin = end_connection(&net, &names, from)?;
                    let mut dest = Destination { stops: Vec::new() };
                    for s in stops {
                        dest.stops.push(end_connection(&net, &names, s)?);
                    }
                    let (found, path) = ctx.find_immediately(&net, train, origin, &dest);
                    if found {
                        println!("> path {:?}", path.connections);
                        paths.insert(train, path);
                    } else {
                        println!("> no path");
                    }
                }
                Query::Reserve(train, signal) => {
                    let next = trains.len();
                    let train = *trains.entry(train.clone()).or_insert(next);
                    let signal = lookup(&names.signal_names, signal, "signal")?;
                    let path = paths
                        .get(&train)
                        .cloned()
                        .ok_or_else(|| failure::format_err!("no path found for train yet"))?;
                    let open = ctx.is_signal_open_for(&net, signal, train, &path);
                    println!("> reserve {}", if open { "granted" } else { "refused" });
                }
                Query::Vacate(train, rail) => {
                    let next = trains.len();
                    let train = *trains.entry(train.clone()).or_insert(next);
                    let rail = lookup(&names.rail_names, rail, "rail")?;
                    ctx.notify(input::network::NetworkEvent::RailVacated { rail, train });
                    ctx.tick(&net);
                    println!("> vacated");
                }
                Query::BlockFree(block, free) => {
                    let block = lookup(&names.block_names, block, "block")?;
                    ctx.notify(input::network::NetworkEvent::BlockFreeChanged {
                        block,
                        free: *free,
                    });
                    ctx.tick(&net);
                    println!("> block free condition set");
                }
                Query::State(signal) => {
                    let signal = lookup(&names.signal_names, signal, "signal")?;
                    let aspect = match ctx.signal_state(signal) {
                        SignalAspect::Open => "open",
                        SignalAspect::Closed => "closed",
                    };
                    println!("> signal {}", aspect);
                }
            }
        }
    }

    if opt.stats {
        println!("# {:?}", ctx.stats());
    }

    Ok(())
}

pub fn main() {
    env_logger::init();
    let opt = Opt::from_args();
    match run(&opt) {
        Ok(()) => {}
        Err(e) => {
            println!("Error:\n{}", e.as_fail());
            std::process::exit(1);
        }
    }
}
