use smallvec::SmallVec;

use super::network::*;
use super::parser_utils::*;

use std::collections::HashMap;

// AST
//
//

#[derive(Debug)]
pub enum End {
    A,
    B,
}

#[derive(Debug)]
pub struct EndRef {
    pub track: String,
    pub end: End,
}

#[derive(Debug)]
pub enum Statement {
    Track {
        name: String,
        length: f64,
        curved: bool,
        electrified: bool,
        platform: bool,
        one_way: bool,
        block: Option<String>,
        rail: Option<String>,
    },
    Couple(EndRef, EndRef),
    Stop(EndRef),
    Signal {
        name: String,
        at: EndRef,
        guards: Option<String>,
        chain: bool,
    },
    Block(String, BlockKind),
    Rail {
        name: String,
        block: String,
        linked: Vec<String>,
    },
}

// LEXER
//
//

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Track,
    Couple,
    Stop,
    Signal,
    Block,
    Rail,
    Length,
    Curved,
    Electrified,
    Platform,
    Oneway,
    At,
    On,
    Guards,
    Chain,
    Simple,
    Path,
    In,
    Linked,
    Dot,
    ListOpen,
    ListClose,
    ListSep,
    Number(f64),
    Identifier(String),
    EOF,
}

pub fn lexer(x: &mut dyn Iterator<Item = char>) -> Result<Vec<Token>, LexerError> {
    let mut tokens = Vec::new();
    let mut input = x.peekable();
    let mut line = 0;
    while let Some(&ch) = input.peek() {
        match ch {
            x if x.is_numeric() => {
                let num: String = consume_while(&mut input, |a| {
                    a.is_numeric() || a == '-' || a == 'e' || a == 'E' || a == '.'
                })
                .into_iter()
                .collect();
                let num = num
                    .parse::<f64>()
                    .map_err(|_| LexerError::UnexpectedChar { i: line, c: num.clone() })?;
                tokens.push(Token::Number(num));
            }
            x if x.is_alphabetic() => {
                let s: String = consume_while(&mut input, |a| a == '_' || a.is_alphanumeric())
                    .into_iter()
                    .collect();
                tokens.push(match s.as_ref() {
                    "track" => Token::Track,
                    "couple" => Token::Couple,
                    "stop" => Token::Stop,
                    "signal" => Token::Signal,
                    "block" => Token::Block,
                    "rail" => Token::Rail,
                    "length" => Token::Length,
                    "curved" => Token::Curved,
                    "electrified" => Token::Electrified,
                    "platform" => Token::Platform,
                    "oneway" => Token::Oneway,
                    "at" => Token::At,
                    "on" => Token::On,
                    "guards" => Token::Guards,
                    "chain" => Token::Chain,
                    "simple" => Token::Simple,
                    "path" => Token::Path,
                    "in" => Token::In,
                    "linked" => Token::Linked,
                    _ => Token::Identifier(s),
                });
            }
            '.' => {
                input.next().unwrap();
                tokens.push(Token::Dot);
            }
            '[' => {
                input.next().unwrap();
                tokens.push(Token::ListOpen);
            }
            ']' => {
                input.next().unwrap();
                tokens.push(Token::ListClose);
            }
            ',' => {
                input.next().unwrap();
                tokens.push(Token::ListSep);
            }
            '#' => {
                consume_while(&mut input, |a| a != '\n');
            }
            ' ' | '\r' | '\t' => {
                input.next().unwrap();
            }
            '\n' => {
                input.next().unwrap();
                line += 1;
            }
            c => {
                return Err(LexerError::UnexpectedChar {
                    i: line,
                    c: c.to_string(),
                });
            }
        }
    }
    tokens.push(Token::EOF);
    Ok(tokens)
}

// PARSER
//
//

pub fn parse(t: &[Token]) -> Result<Vec<Statement>, ParseError> {
    let mut i = 0;
    let mut statements = Vec::new();
    while t[i] != Token::EOF {
        statements.push(parse_statement(&mut i, t)?);
    }
    Ok(statements)
}

pub fn identifier(i: &mut usize, tokens: &[Token]) -> Result<String, ParseError> {
    let r = match tokens[*i] {
        Token::Identifier(ref s) => s.clone(),
        ref x => return Err(ParseError::UnexpectedToken(*i, format!("{:?}", x.clone()))),
    };
    *i += 1;
    Ok(r)
}

pub fn number(i: &mut usize, tokens: &[Token]) -> Result<f64, ParseError> {
    let r = match tokens[*i] {
        Token::Number(x) => x,
        ref x => return Err(ParseError::UnexpectedToken(*i, format!("{:?}", x))),
    };
    *i += 1;
    Ok(r)
}

fn end_ref(i: &mut usize, t: &[Token]) -> Result<EndRef, ParseError> {
    let track = identifier(i, t)?;
    must_match(i, t, Token::Dot)?;
    let end = match identifier(i, t)?.as_ref() {
        "a" => End::A,
        "b" => End::B,
        x => return Err(ParseError::UnexpectedToken(*i, format!("{:?}", x))),
    };
    Ok(EndRef { track, end })
}

fn name_list(i: &mut usize, t: &[Token]) -> Result<Vec<String>, ParseError> {
    must_match(i, t, Token::ListOpen)?;
    let mut v = Vec::new();
    if matches(i, t, Token::ListClose) {
        return Ok(v);
    }
    loop {
        v.push(identifier(i, t)?);
        if !matches(i, t, Token::ListSep) {
            break;
        }
    }
    must_match(i, t, Token::ListClose)?;
    Ok(v)
}

pub fn parse_statement(i: &mut usize, t: &[Token]) -> Result<Statement, ParseError> {
    alt(
        i,
        t,
        &[
            &|i, t| {
                must_match(i, t, Token::Track)?;
                let name = identifier(i, t)?;
                must_match(i, t, Token::Length)?;
                let length = number(i, t)?;
                let mut curved = false;
                let mut electrified = false;
                let mut platform = false;
                let mut one_way = false;
                let mut block = None;
                let mut rail = None;
                loop {
                    if matches(i, t, Token::Curved) {
                        curved = true;
                    } else if matches(i, t, Token::Electrified) {
                        electrified = true;
                    } else if matches(i, t, Token::Platform) {
                        platform = true;
                    } else if matches(i, t, Token::Oneway) {
                        one_way = true;
                    } else if matches(i, t, Token::Block) {
                        block = Some(identifier(i, t)?);
                    } else if matches(i, t, Token::On) {
                        rail = Some(identifier(i, t)?);
                    } else {
                        break;
                    }
                }
                Ok(Statement::Track {
                    name,
                    length,
                    curved,
                    electrified,
                    platform,
                    one_way,
                    block,
                    rail,
                })
            },
            &|i, t| {
                must_match(i, t, Token::Couple)?;
                let a = end_ref(i, t)?;
                let b = end_ref(i, t)?;
                Ok(Statement::Couple(a, b))
            },
            &|i, t| {
                must_match(i, t, Token::Stop)?;
                Ok(Statement::Stop(end_ref(i, t)?))
            },
            &|i, t| {
                must_match(i, t, Token::Signal)?;
                let name = identifier(i, t)?;
                must_match(i, t, Token::At)?;
                let at = end_ref(i, t)?;
                let mut guards = None;
                let mut chain = false;
                loop {
                    if matches(i, t, Token::Guards) {
                        guards = Some(identifier(i, t)?);
                    } else if matches(i, t, Token::Chain) {
                        chain = true;
                    } else {
                        break;
                    }
                }
                Ok(Statement::Signal { name, at, guards, chain })
            },
            &|i, t| {
                must_match(i, t, Token::Block)?;
                let name = identifier(i, t)?;
                let kind = if matches(i, t, Token::Simple) {
                    BlockKind::Simple
                } else if matches(i, t, Token::Path) {
                    BlockKind::Path
                } else {
                    return Err(ParseError::UnexpectedToken(*i, format!("{:?}", t[*i])));
                };
                Ok(Statement::Block(name, kind))
            },
            &|i, t| {
                must_match(i, t, Token::Rail)?;
                let name = identifier(i, t)?;
                must_match(i, t, Token::In)?;
                let block = identifier(i, t)?;
                let mut linked = Vec::new();
                if matches(i, t, Token::Linked) {
                    linked = name_list(i, t)?;
                }
                Ok(Statement::Rail { name, block, linked })
            },
        ],
    )
}

// CONVERT AST TO MODEL
//
//

fn lookup(names: &NameMap<String>, name: &str, kind: &str) -> Result<usize, ParseError> {
    names
        .get(name)
        .cloned()
        .ok_or_else(|| ParseError::UnknownName(name.to_string(), kind.to_string()))
}

fn resolve_end(
    net: &TrackNetwork,
    names: &NetNames<String>,
    r: &EndRef,
) -> Result<ConnectionId, ParseError> {
    let track = lookup(&names.track_names, &r.track, "track")?;
    Ok(match r.end {
        End::A => net.tracks[track].ends[0],
        End::B => net.tracks[track].ends[1],
    })
}

pub fn network_from_ast(
    stmts: &[Statement],
) -> Result<(TrackNetwork, NetNames<String>), ParseError> {
    let mut net = TrackNetwork::default();
    let mut names = NetNames {
        track_names: HashMap::new(),
        signal_names: HashMap::new(),
        block_names: HashMap::new(),
        rail_names: HashMap::new(),
    };

    // Blocks and rails first, so tracks and signals can refer to them.
    for s in stmts {
        if let Statement::Block(ref name, kind) = *s {
            names.block_names.insert(name.clone(), net.blocks.len());
            net.blocks.push(BlockDef { kind });
        }
    }
    for s in stmts {
        if let Statement::Rail { ref name, ref block, .. } = *s {
            let block = lookup(&names.block_names, block, "block")?;
            names.rail_names.insert(name.clone(), net.rails.len());
            net.rails.push(Rail { block, linked: SmallVec::new() });
        }
    }
    for s in stmts {
        if let Statement::Rail { ref name, ref linked, .. } = *s {
            let rail = names.rail_names[name];
            for l in linked {
                let l = lookup(&names.rail_names, l, "rail")?;
                net.rails[rail].linked.push(l);
            }
        }
    }

    for s in stmts {
        if let Statement::Track {
            ref name,
            length,
            curved,
            electrified,
            platform,
            one_way,
            ref block,
            ref rail,
        } = *s
        {
            let track_id = net.tracks.len();
            let a = net.connections.len();
            let b = a + 1;
            let block = match block {
                Some(b) => Some(lookup(&names.block_names, b, "block")?),
                None => None,
            };
            let rail = match rail {
                Some(r) => Some(lookup(&names.rail_names, r, "rail")?),
                None => None,
            };
            net.tracks.push(Track {
                ends: [a, b],
                length,
                state: TrackState::Built,
                class: if curved { TrackClass::Curved } else { TrackClass::Straight },
                electrified,
                platform,
                one_way,
                block,
                rail,
            });
            for &other in &[b, a] {
                net.connections.push(Connection {
                    track: track_id,
                    inner: other,
                    outer: SmallVec::new(),
                    signal: None,
                    length,
                    stop_boundary: false,
                });
            }
            names.track_names.insert(name.clone(), track_id);
        }
    }

    for s in stmts {
        match *s {
            Statement::Couple(ref x, ref y) => {
                let cx = resolve_end(&net, &names, x)?;
                let cy = resolve_end(&net, &names, y)?;
                net.connections[cx].outer.push(cy);
                net.connections[cy].outer.push(cx);
            }
            Statement::Stop(ref x) => {
                let c = resolve_end(&net, &names, x)?;
                net.connections[c].stop_boundary = true;
            }
            Statement::Signal { ref name, ref at, ref guards, chain } => {
                let c = resolve_end(&net, &names, at)?;
                let guards = match guards {
                    Some(b) => Some(lookup(&names.block_names, b, "block")?),
                    None => None,
                };
                let id = net.signals.len();
                net.signals.push(SignalDef { connection: c, guards, chain });
                net.connections[c].signal = Some(id);
                names.signal_names.insert(name.clone(), id);
            }
            _ => {}
        }
    }

    Ok((net, names))
}
