use fxhash::FxHashMap;

use crate::frame::strip_token;

/// Multiset of tokens of one code block.
///
/// Tokens are stripped with [`strip_token`] on insertion and empty results
/// are ignored, so a bag never holds a token the wire format cannot carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenBag {
    counts: FxHashMap<String, u32>,
    size: u64,
}

impl TokenBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bag from a token sequence.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bag = Self::new();
        for token in tokens {
            bag.insert(token.as_ref());
        }
        bag
    }

    /// Adds one occurrence of `token`.
    pub fn insert(&mut self, token: &str) {
        self.insert_n(token, 1);
    }

    /// Adds `count` occurrences of `token`.
    ///
    /// Reserved quote characters are stripped. Whitespace is kept, and the
    /// index refuses such tokens.
    pub fn insert_n(&mut self, token: &str, count: u32) {
        if count == 0 {
            return;
        }
        let token = strip_token(token);
        if token.is_empty() {
            return;
        }
        match self.counts.get_mut(token.as_ref()) {
            Some(existing) => *existing = existing.saturating_add(count),
            None => {
                self.counts.insert(token.into_owned(), count);
            }
        }
        self.size += u64::from(count);
    }

    /// Total number of tokens (sum of in-block frequencies).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of distinct tokens.
    pub fn unique(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// In-block frequency of `token`, 0 when absent.
    pub fn frequency(&self, token: &str) -> u32 {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Iterates `(token, frequency)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.counts.iter().map(|(t, f)| (t.as_str(), *f))
    }

    /// Distinct tokens in unspecified order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.counts.keys().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for TokenBag {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_tokens(iter)
    }
}
