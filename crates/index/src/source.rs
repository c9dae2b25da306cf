use crate::{
    compile_id, BlockDocument, IdQuery, IndexError, Posting, TermQuery, TokenFrequencyTable,
};

/// Read side of a block index, as consumed by candidate retrieval and
/// similarity validation.
///
/// Implementations are shared across worker threads and must serialize any
/// internal state themselves.
pub trait BlockSource: Send + Sync {
    /// Postings of one token. An unknown token has no postings.
    fn lookup_postings(&self, query: &TermQuery) -> Result<Vec<Posting>, IndexError>;

    /// Every forward document stored under the id. A consistent index returns
    /// zero or one; callers treat anything else as a data problem.
    fn query_by_exact_id(&self, query: &IdQuery) -> Result<Vec<BlockDocument>, IndexError>;

    /// Number of blocks containing `token`.
    fn document_frequency(&self, token: &str) -> u64 {
        self.frequency_table().frequency(token)
    }

    /// The table defining canonical token order for this index.
    fn frequency_table(&self) -> &TokenFrequencyTable;

    /// The forward document of `id` when exactly one is stored.
    fn lookup_document(&self, id: &str) -> Result<Option<BlockDocument>, IndexError> {
        let mut docs = self.query_by_exact_id(&compile_id(id)?)?;
        if docs.len() == 1 {
            Ok(docs.pop())
        } else {
            Ok(None)
        }
    }
}
