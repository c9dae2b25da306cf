//! Query compilation.
//!
//! Turning a token or a block id into something the index can look up is a
//! pure function. There is no parser object to share, so retrievers on
//! different threads never contend here.

use thiserror::Error;

use crate::document::keys;

const RESERVED: [char; 4] = ['\'', '"', '\\', ':'];

/// Why a token or id could not be compiled into a lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("empty query term")]
    EmptyTerm,
    #[error("query term `{term}` contains reserved character {found:?}")]
    ReservedCharacter { term: String, found: char },
    #[error("empty block id")]
    EmptyId,
}

/// Compiled exact-match lookup for one token's postings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermQuery {
    term: String,
    key: String,
}

impl TermQuery {
    pub fn term(&self) -> &str {
        &self.term
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }
}

/// Compiled exact-match lookup for one forward document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdQuery {
    id: String,
    key: String,
}

impl IdQuery {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }
}

/// Compiles a token into a postings lookup.
///
/// Tokens stored in the index never contain quotes, backslashes, colons or
/// whitespace, so a term carrying one of them can only be malformed.
pub fn compile_term(token: &str) -> Result<TermQuery, QueryError> {
    if token.is_empty() {
        return Err(QueryError::EmptyTerm);
    }
    if let Some(found) = token
        .chars()
        .find(|c| RESERVED.contains(c) || c.is_whitespace())
    {
        return Err(QueryError::ReservedCharacter {
            term: token.to_string(),
            found,
        });
    }
    Ok(TermQuery {
        term: token.to_string(),
        key: keys::postings(token),
    })
}

/// Compiles a block id into a forward-document lookup.
pub fn compile_id(id: &str) -> Result<IdQuery, QueryError> {
    if id.trim().is_empty() {
        return Err(QueryError::EmptyId);
    }
    Ok(IdQuery {
        id: id.to_string(),
        key: keys::doc(id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_plain_tokens() {
        let q = compile_term("getValue").unwrap();
        assert_eq!(q.term(), "getValue");
        assert_eq!(q.key(), "post/getValue");
    }

    #[test]
    fn rejects_empty_and_reserved_terms() {
        assert_eq!(compile_term(""), Err(QueryError::EmptyTerm));
        assert_eq!(
            compile_term("a:b"),
            Err(QueryError::ReservedCharacter {
                term: "a:b".into(),
                found: ':'
            })
        );
        assert!(compile_term("two words").is_err());
        assert!(compile_term("\"quoted\"").is_err());
    }

    #[test]
    fn compiles_ids() {
        assert_eq!(compile_id("10001").unwrap().key(), "doc/10001");
        assert_eq!(compile_id("  "), Err(QueryError::EmptyId));
    }

    #[test]
    fn compilation_is_deterministic_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| compile_term("shared").unwrap()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), compile_term("shared").unwrap());
        }
    }
}
