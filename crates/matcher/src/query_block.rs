use hashbrown::HashMap;
use index::TokenFrequencyTable;
use tokens::TokenBag;

use crate::types::{MatchError, OrderedToken, ThresholdPolicy, TokenInfo};

/// A code block prepared for searching.
///
/// Tokens are held in canonical order (rarest first) with cumulative
/// positions. The shortest run of rarest tokens whose cumulative count
/// reaches `size - computed_threshold + 1` forms the prefix; any block
/// sharing at least `computed_threshold` tokens with this one must share a
/// prefix token. Everything after the prefix is the suffix.
///
/// Read-only once built; shared between the retriever and all validators.
#[derive(Debug, Clone)]
pub struct QueryBlock {
    id: String,
    size: u64,
    computed_threshold: u64,
    ordered: Vec<OrderedToken>,
    prefix_len: usize,
    prefix_map_size: u64,
    prefix_map: HashMap<String, TokenInfo>,
    suffix_map: HashMap<String, TokenInfo>,
}

impl QueryBlock {
    /// Builds a query block with a precomputed minimum overlap.
    pub fn build(
        id: impl Into<String>,
        bag: &TokenBag,
        table: &TokenFrequencyTable,
        computed_threshold: u64,
    ) -> Result<Self, MatchError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(MatchError::EmptyQueryId);
        }
        if bag.is_empty() {
            return Err(MatchError::EmptyQuery(id));
        }
        let size = bag.size();
        if computed_threshold == 0 || computed_threshold > size {
            return Err(MatchError::ThresholdOutOfRange {
                id,
                threshold: computed_threshold,
                size,
            });
        }

        let prefix_size = size - computed_threshold + 1;
        let mut ordered = Vec::with_capacity(bag.unique());
        let mut prefix_map = HashMap::new();
        let mut suffix_map = HashMap::new();
        let mut position = 0u64;
        let mut prefix_len = 0;
        let mut prefix_map_size = 0;

        for ranked in table.order(bag) {
            let before = position;
            position += u64::from(ranked.frequency);
            let token = OrderedToken {
                token: ranked.token,
                frequency: ranked.frequency,
                position,
                global_frequency: ranked.global_frequency,
            };
            if before < prefix_size {
                prefix_map.insert(token.token.clone(), token.info());
                prefix_len += 1;
                prefix_map_size = position;
            } else {
                suffix_map.insert(token.token.clone(), token.info());
            }
            ordered.push(token);
        }

        Ok(Self {
            id,
            size,
            computed_threshold,
            ordered,
            prefix_len,
            prefix_map_size,
            prefix_map,
            suffix_map,
        })
    }

    /// Builds a query block, deriving the minimum overlap from `policy`.
    pub fn with_policy(
        id: impl Into<String>,
        bag: &TokenBag,
        table: &TokenFrequencyTable,
        policy: &ThresholdPolicy,
    ) -> Result<Self, MatchError> {
        Self::build(id, bag, table, policy.computed_threshold(bag.size()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Total token count.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn computed_threshold(&self) -> u64 {
        self.computed_threshold
    }

    /// All tokens in canonical order.
    pub fn ordered_tokens(&self) -> &[OrderedToken] {
        &self.ordered
    }

    /// The prefix tokens in canonical order.
    pub fn prefix_tokens(&self) -> &[OrderedToken] {
        &self.ordered[..self.prefix_len]
    }

    /// Cumulative position at the end of the prefix.
    pub fn prefix_map_size(&self) -> u64 {
        self.prefix_map_size
    }

    pub fn prefix_map(&self) -> &HashMap<String, TokenInfo> {
        &self.prefix_map
    }

    pub fn suffix_map(&self) -> &HashMap<String, TokenInfo> {
        &self.suffix_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TokenFrequencyTable {
        let mut table = TokenFrequencyTable::new();
        table.record_block(&TokenBag::from_tokens(["a", "b", "c"]));
        table.record_block(&TokenBag::from_tokens(["a", "b", "d"]));
        table
    }

    fn query_bag() -> TokenBag {
        TokenBag::from_tokens(["a", "a", "a", "b", "b", "c"])
    }

    #[test]
    fn orders_tokens_and_accumulates_positions() {
        let q = QueryBlock::build("q", &query_bag(), &table(), 3).unwrap();
        let order: Vec<_> = q
            .ordered_tokens()
            .iter()
            .map(|t| (t.token.as_str(), t.frequency, t.position))
            .collect();
        assert_eq!(order, vec![("c", 1, 1), ("a", 3, 4), ("b", 2, 6)]);
        assert_eq!(q.size(), 6);
    }

    #[test]
    fn prefix_covers_size_minus_threshold_plus_one() {
        // prefix size 6 - 3 + 1 = 4: c (0 before) and a (1 before) qualify.
        let q = QueryBlock::build("q", &query_bag(), &table(), 3).unwrap();
        assert_eq!(q.prefix_tokens().len(), 2);
        assert_eq!(q.prefix_map_size(), 4);
        assert!(q.prefix_map().contains_key("a"));
        assert!(q.suffix_map().contains_key("b"));

        // Threshold equal to size: prefix size 1, only the rarest token.
        let q = QueryBlock::build("q", &query_bag(), &table(), 6).unwrap();
        assert_eq!(q.prefix_tokens().len(), 1);
        assert_eq!(q.prefix_map_size(), 1);

        // Threshold 1: every token is in the prefix.
        let q = QueryBlock::build("q", &query_bag(), &table(), 1).unwrap();
        assert_eq!(q.prefix_tokens().len(), 3);
        assert!(q.suffix_map().is_empty());
    }

    #[test]
    fn maps_partition_the_tokens() {
        for threshold in 1..=6 {
            let q = QueryBlock::build("q", &query_bag(), &table(), threshold).unwrap();
            assert_eq!(
                q.prefix_map().len() + q.suffix_map().len(),
                q.ordered_tokens().len()
            );
            for token in q.ordered_tokens() {
                let in_prefix = q.prefix_map().contains_key(&token.token);
                let in_suffix = q.suffix_map().contains_key(&token.token);
                assert!(in_prefix ^ in_suffix, "{} at threshold {threshold}", token.token);
            }
        }
    }

    #[test]
    fn rejects_bad_input() {
        let table = table();
        assert!(matches!(
            QueryBlock::build(" ", &query_bag(), &table, 1),
            Err(MatchError::EmptyQueryId)
        ));
        assert!(matches!(
            QueryBlock::build("q", &TokenBag::new(), &table, 1),
            Err(MatchError::EmptyQuery(_))
        ));
        assert!(matches!(
            QueryBlock::build("q", &query_bag(), &table, 0),
            Err(MatchError::ThresholdOutOfRange { .. })
        ));
        assert!(matches!(
            QueryBlock::build("q", &query_bag(), &table, 7),
            Err(MatchError::ThresholdOutOfRange { threshold: 7, size: 6, .. })
        ));
    }

    #[test]
    fn policy_derives_threshold() {
        let q = QueryBlock::with_policy(
            "q",
            &query_bag(),
            &table(),
            &ThresholdPolicy::Fraction(0.5),
        )
        .unwrap();
        assert_eq!(q.computed_threshold(), 3);
    }
}
