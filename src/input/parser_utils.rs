use failure::Fail;
use std::iter::Peekable;

#[derive(Debug, Clone, Fail)]
pub enum LexerError {
    #[fail(display = "unexpected character {:?} on line {}", c, i)]
    UnexpectedChar { i: usize, c: String },
    #[fail(display = "unexpected end of input")]
    UnexpectedEOF,
}

#[derive(Debug, Clone, Fail)]
pub enum ParseError {
    #[fail(display = "unexpected token at position {}: {}", _0, _1)]
    UnexpectedToken(usize, String),
    #[fail(display = "unexpected end of input")]
    UnexpectedEOF,
    #[fail(display = "unknown {} name: {}", _1, _0)]
    UnknownName(String, String),
    #[fail(display = "no matching alternative")]
    Many(Vec<ParseError>),
}

pub fn alt<T, Token: PartialEq + Clone>(
    i: &mut usize,
    tokens: &[Token],
    alts: &[&dyn Fn(&mut usize, &[Token]) -> Result<T, ParseError>],
) -> Result<T, ParseError> {
    let start = *i;
    let mut errs = Vec::new();
    for alt in alts {
        *i = start;
        match alt(i, tokens) {
            Ok(x) => return Ok(x),
            Err(y) => errs.push(y),
        }
    }
    Err(ParseError::Many(errs))
}

pub fn must_match<Token: PartialEq + Clone + ::std::fmt::Debug>(
    i: &mut usize,
    tokens: &[Token],
    tok: Token,
) -> Result<(), ParseError> {
    if matches(i, tokens, tok) {
        Ok(())
    } else {
        Err(ParseError::UnexpectedToken(*i, format!("{:?}", tokens[*i].clone())))
    }
}

pub fn matches<Token: PartialEq + Clone>(i: &mut usize, tokens: &[Token], tok: Token) -> bool {
    let r = tokens[*i] == tok;
    if r {
        *i += 1;
    }
    r
}

pub fn consume_while<F>(it: &mut Peekable<&mut dyn Iterator<Item = char>>, x: F) -> Vec<char>
where
    F: Fn(char) -> bool,
{
    let mut v: Vec<char> = vec![];

    while let Some(&ch) = it.peek() {
        if x(ch) {
            it.next().unwrap();
            v.push(ch);
        } else {
            break;
        }
    }

    v
}
