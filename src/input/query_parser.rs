use failure::Fail;
use regex::Regex;

type Name = String;

/// An end of a named track, e.g. `t3.b`.
#[derive(Debug, Clone)]
pub struct EndName {
    pub track: Name,
    pub end_b: bool,
}

#[derive(Debug)]
pub enum Query {
    /// Find a path for a train from a track end to any of a set of stops.
    Find(Name, EndName, Vec<EndName>),
    /// Run the reservation protocol for a train's last found path at a signal.
    Reserve(Name, Name),
    /// Report a train's vacation of a rail segment.
    Vacate(Name, Name),
    /// Set a block's external free condition.
    BlockFree(Name, bool),
    /// Print a signal's aspect.
    State(Name),
}

#[derive(Debug, Fail)]
pub enum QueryError {
    #[fail(display = "error in regular expression: {}", _0)]
    RegexError(String),
    #[fail(display = "unrecognized query: {}", _0)]
    Unrecognized(String),
}

fn end_name(track: &str, end: &str) -> EndName {
    EndName {
        track: track.to_string(),
        end_b: end == "b",
    }
}

/// Parses the query script format
///
/// * find t1 from tr1.a to tr9.b, tr12.a
/// * reserve t1 at s3
/// * vacate t1 r2
/// * blockfree b1 false
/// * state s3
///
pub fn parse_queries(input: &str) -> Result<Vec<Query>, QueryError> {
    let mut queries = Vec::new();
    let find_re = Regex::new(
        r"(?x) ^ \s* find \s+ (?P<train>\w+) \s+
            from \s+ (?P<ft>\w+) \. (?P<fe>[ab]) \s+
            to \s+ (?P<stops>.+?) \s* $",
    )
    .map_err(|e| QueryError::RegexError(format!("{:?}", e)))?;
    let stop_re = Regex::new(r"^\s*(?P<t>\w+)\.(?P<e>[ab])\s*$")
        .map_err(|e| QueryError::RegexError(format!("{:?}", e)))?;
    let reserve_re = Regex::new(r"^\s*reserve\s+(?P<train>\w+)\s+at\s+(?P<signal>\w+)\s*$")
        .map_err(|e| QueryError::RegexError(format!("{:?}", e)))?;
    let vacate_re = Regex::new(r"^\s*vacate\s+(?P<train>\w+)\s+(?P<rail>\w+)\s*$")
        .map_err(|e| QueryError::RegexError(format!("{:?}", e)))?;
    let blockfree_re = Regex::new(r"^\s*blockfree\s+(?P<block>\w+)\s+(?P<free>true|false)\s*$")
        .map_err(|e| QueryError::RegexError(format!("{:?}", e)))?;
    let state_re = Regex::new(r"^\s*state\s+(?P<signal>\w+)\s*$")
        .map_err(|e| QueryError::RegexError(format!("{:?}", e)))?;

    for line in input.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        if let Some(groups) = find_re.captures(line) {
            let mut stops = Vec::new();
            for part in groups["stops"].split(',') {
                match stop_re.captures(part) {
                    Some(s) => stops.push(end_name(&s["t"], &s["e"])),
                    None => return Err(QueryError::Unrecognized(line.to_string())),
                }
            }
            queries.push(Query::Find(
                groups["train"].to_string(),
                end_name(&groups["ft"], &groups["fe"]),
                stops,
            ));
            continue;
        }
        if let Some(groups) = reserve_re.captures(line) {
            queries.push(Query::Reserve(
                groups["train"].to_string(),
                groups["signal"].to_string(),
            ));
            continue;
        }
        if let Some(groups) = vacate_re.captures(line) {
            queries.push(Query::Vacate(
                groups["train"].to_string(),
                groups["rail"].to_string(),
            ));
            continue;
        }
        if let Some(groups) = blockfree_re.captures(line) {
            queries.push(Query::BlockFree(
                groups["block"].to_string(),
                &groups["free"] == "true",
            ));
            continue;
        }
        if let Some(groups) = state_re.captures(line) {
            queries.push(Query::State(groups["signal"].to_string()));
            continue;
        }
        return Err(QueryError::Unrecognized(line.to_string()));
    }

    Ok(queries)
}
