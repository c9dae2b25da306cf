//! Token-file records.
//!
//! A token file holds one block per line:
//!
//! ```text
//! parent_id,block_id,total,unique[,extra...]@#@tok@@::@@freq,tok@@::@@freq,...
//! ```
//!
//! Extra header fields (hashes, experimental metrics) are accepted and ignored.

use std::io::BufRead;

use crate::bag::TokenBag;
use crate::error::TokenError;

const HEADER_SEPARATOR: &str = "@#@";
const PAIR_SEPARATOR: &str = "@@::@@";

/// One code block read from a token file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    /// Enclosing unit (project or file) the block came from.
    pub parent_id: String,
    /// Identifier of the block, unique across the corpus.
    pub block_id: String,
    pub bag: TokenBag,
}

impl BlockRecord {
    pub fn new(parent_id: impl Into<String>, block_id: impl Into<String>, bag: TokenBag) -> Self {
        Self {
            parent_id: parent_id.into(),
            block_id: block_id.into(),
            bag,
        }
    }

    /// Renders the record in token-file form. Tokens are written sorted so the
    /// output is stable.
    pub fn to_line(&self) -> String {
        let mut pairs: Vec<(&str, u32)> = self.bag.iter().collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        let body = pairs
            .iter()
            .map(|(token, freq)| format!("{token}{PAIR_SEPARATOR}{freq}"))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{},{},{},{}{HEADER_SEPARATOR}{body}",
            self.parent_id,
            self.block_id,
            self.bag.size(),
            self.bag.unique()
        )
    }
}

/// Parses one token-file line.
pub fn parse_block_line(line: &str) -> Result<BlockRecord, TokenError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (header, body) = line
        .split_once(HEADER_SEPARATOR)
        .ok_or_else(|| TokenError::malformed("missing `@#@` header separator"))?;

    let mut fields = header.split(',');
    let parent_id = non_empty(fields.next(), "parent id")?;
    let block_id = non_empty(fields.next(), "block id")?;
    let declared: u64 = non_empty(fields.next(), "token total")?
        .trim()
        .parse()
        .map_err(|_| TokenError::malformed("token total is not an integer"))?;
    non_empty(fields.next(), "unique token count")?
        .trim()
        .parse::<u64>()
        .map_err(|_| TokenError::malformed("unique token count is not an integer"))?;

    let mut bag = TokenBag::new();
    for pair in body.split(',').filter(|p| !p.is_empty()) {
        let (token, freq) = pair
            .split_once(PAIR_SEPARATOR)
            .ok_or_else(|| TokenError::malformed(format!("token pair `{pair}` lacks `@@::@@`")))?;
        let freq: u32 = freq
            .parse()
            .map_err(|_| TokenError::malformed(format!("token pair `{pair}` has a bad frequency")))?;
        if token.chars().any(char::is_whitespace) {
            return Err(TokenError::malformed(format!(
                "token `{token}` contains whitespace"
            )));
        }
        bag.insert_n(token, freq);
    }

    if bag.size() != declared {
        return Err(TokenError::CountMismatch {
            block_id: block_id.to_string(),
            declared,
            actual: bag.size(),
        });
    }

    Ok(BlockRecord::new(parent_id, block_id, bag))
}

/// Reads every non-blank line of a token file.
///
/// I/O failures surface as [`TokenError::MalformedLine`] carrying the line
/// number; parse failures are returned per line so callers can skip them.
pub fn read_block_records<R: BufRead>(
    reader: R,
) -> impl Iterator<Item = Result<BlockRecord, TokenError>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(parse_block_line(&line)),
            Err(err) => Some(Err(TokenError::malformed(format!(
                "line {}: {err}",
                idx + 1
            )))),
        })
}

fn non_empty<'a>(field: Option<&'a str>, what: &str) -> Result<&'a str, TokenError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value.trim()),
        _ => Err(TokenError::malformed(format!("missing {what}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_tokens() {
        let rec = parse_block_line("7,10001,6,3,0,abc@#@a@@::@@3,b@@::@@2,c@@::@@1").unwrap();
        assert_eq!(rec.parent_id, "7");
        assert_eq!(rec.block_id, "10001");
        assert_eq!(rec.bag.size(), 6);
        assert_eq!(rec.bag.frequency("b"), 2);
    }

    #[test]
    fn empty_body_is_an_empty_block() {
        let rec = parse_block_line("1,2,0,0@#@").unwrap();
        assert!(rec.bag.is_empty());
    }

    #[test]
    fn line_roundtrip_is_stable() {
        let bag = TokenBag::from_tokens(["b", "a", "b"]);
        let rec = BlockRecord::new("p", "blk", bag);
        let line = rec.to_line();
        assert_eq!(line, "p,blk,3,2@#@a@@::@@1,b@@::@@2");
        assert_eq!(parse_block_line(&line).unwrap(), rec);
    }

    #[test]
    fn declared_total_must_match() {
        let err = parse_block_line("1,2,9,1@#@a@@::@@3").unwrap_err();
        assert_eq!(
            err,
            TokenError::CountMismatch {
                block_id: "2".into(),
                declared: 9,
                actual: 3
            }
        );
    }

    #[test]
    fn malformed_lines_are_rejected() {
        for line in [
            "no separator here",
            "1@#@a@@::@@1",
            "1,2,x,1@#@a@@::@@1",
            "1,2,1,1@#@a:1",
            "1,2,1,1@#@a@@::@@one",
            "1,2,1,1@#@has space@@::@@1",
            "1,2,1,1@#@tab\tbed@@::@@1",
        ] {
            assert!(
                matches!(parse_block_line(line), Err(TokenError::MalformedLine { .. })),
                "{line}"
            );
        }
    }

    #[test]
    fn reader_skips_blank_lines() {
        let input = "1,a,1,1@#@x@@::@@1\n\n1,b,2,1@#@y@@::@@2\n";
        let records: Vec<_> = read_block_records(input.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].block_id, "b");
    }
}
