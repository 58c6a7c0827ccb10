pub mod input;
pub mod graph;
pub mod search;
pub mod blocks;
pub mod dest;
pub mod context;

#[cfg(test)]
mod tests;

pub use crate::blocks::{BlockRegistry, SignalAspect, TrainPath};
pub use crate::context::{PathingContext, SearchStats};
pub use crate::search::ScoreWeights;

use std::path::Path;
pub type AppResult<T> = Result<T, failure::Error>;

pub fn read_file(f: &Path) -> AppResult<String> {
    use std::fs::File;
    use std::io::prelude::*;
    use std::io::BufReader;

    let file = File::open(f)?;
    let mut file = BufReader::new(&file);
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Read and parse a track layout file, producing the network model
/// and the name maps used for printing and query lookup.
pub fn get_network(f: &Path) -> AppResult<(input::network::TrackNetwork, input::network::NetNames<String>)> {
    let contents = read_file(f)?;
    get_network_string(&contents)
}

pub fn get_network_string(s: &str) -> AppResult<(input::network::TrackNetwork, input::network::NetNames<String>)> {
    use crate::input::layout_parser::{lexer, parse, network_from_ast};
    let lex = lexer(&mut s.chars())?;
    let stmts = parse(&lex)?;
    let model = network_from_ast(&stmts)?;
    Ok(model)
}

pub fn get_queries(f: &Path) -> AppResult<Vec<input::query_parser::Query>> {
    let contents = read_file(f)?;
    let q = input::query_parser::parse_queries(&contents)?;
    Ok(q)
}
