use std::cmp::Ordering;

use hashbrown::HashMap;
use tokens::TokenBag;

/// Global document frequency of every indexed token.
///
/// The table fixes the canonical token order: ascending document frequency,
/// ties broken by token text. Query blocks and stored candidates are both
/// sorted with it, which is what lets the prefix and position filters prune
/// safely. Tokens the table has never seen have frequency 0 and sort first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenFrequencyTable {
    counts: HashMap<String, u64>,
}

/// A token of one block placed in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedToken {
    pub token: String,
    /// In-block frequency.
    pub frequency: u32,
    /// Number of indexed blocks containing the token.
    pub global_frequency: u64,
}

impl TokenFrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every distinct token of `bag` once.
    pub fn record_block(&mut self, bag: &TokenBag) {
        for token in bag.tokens() {
            match self.counts.get_mut(token) {
                Some(count) => *count += 1,
                None => {
                    self.counts.insert(token.to_string(), 1);
                }
            }
        }
    }

    pub(crate) fn insert(&mut self, token: String, frequency: u64) {
        self.counts.insert(token, frequency);
    }

    /// Document frequency of `token`, 0 when unknown.
    pub fn frequency(&self, token: &str) -> u64 {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.counts.iter().map(|(t, f)| (t.as_str(), *f))
    }

    /// Canonical comparison of two tokens.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.frequency(a)
            .cmp(&self.frequency(b))
            .then_with(|| a.cmp(b))
    }

    /// Returns the tokens of `bag` in canonical order.
    pub fn order(&self, bag: &TokenBag) -> Vec<RankedToken> {
        let mut ranked: Vec<RankedToken> = bag
            .iter()
            .map(|(token, frequency)| RankedToken {
                token: token.to_string(),
                frequency,
                global_frequency: self.frequency(token),
            })
            .collect();
        ranked.sort_unstable_by(|a, b| self.compare(&a.token, &b.token));
        ranked
    }
}

impl FromIterator<(String, u64)> for TokenFrequencyTable {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            counts: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TokenFrequencyTable {
        let mut table = TokenFrequencyTable::new();
        table.record_block(&TokenBag::from_tokens(["common", "rare", "common"]));
        table.record_block(&TokenBag::from_tokens(["common", "mid"]));
        table.record_block(&TokenBag::from_tokens(["common", "mid", "other"]));
        table
    }

    #[test]
    fn counts_blocks_not_occurrences() {
        let table = table();
        assert_eq!(table.frequency("common"), 3);
        assert_eq!(table.frequency("mid"), 2);
        assert_eq!(table.frequency("rare"), 1);
        assert_eq!(table.frequency("never"), 0);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn order_is_rarest_first_then_lexicographic() {
        let table = table();
        let bag = TokenBag::from_tokens(["common", "mid", "rare", "other", "zzz", "aaa"]);
        let order: Vec<_> = table.order(&bag).into_iter().map(|r| r.token).collect();
        assert_eq!(order, vec!["aaa", "zzz", "other", "rare", "mid", "common"]);
    }

    #[test]
    fn order_keeps_in_block_frequency() {
        let table = table();
        let ranked = table.order(&TokenBag::from_tokens(["common", "common", "rare"]));
        assert_eq!(ranked[0].token, "rare");
        assert_eq!(ranked[1].frequency, 2);
        assert_eq!(ranked[1].global_frequency, 3);
    }

    #[test]
    fn compare_matches_order() {
        let table = table();
        assert_eq!(table.compare("rare", "common"), Ordering::Less);
        assert_eq!(table.compare("other", "rare"), Ordering::Less);
        assert_eq!(table.compare("mid", "mid"), Ordering::Equal);

        let bag = TokenBag::from_tokens(["zzz", "common", "mid", "aaa", "rare", "other"]);
        let ranked = table.order(&bag);
        for pair in ranked.windows(2) {
            assert_eq!(table.compare(&pair[0].token, &pair[1].token), Ordering::Less);
        }
    }
}
