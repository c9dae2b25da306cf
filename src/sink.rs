//! Destinations for confirmed clone pairs.

use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

use matcher::ClonePair;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("sink state poisoned")]
    Poisoned,
}

/// Receives clone pairs from the pipeline's reporting stage.
///
/// A failed `report` is logged and counted by the pipeline; later pairs are
/// still offered.
pub trait CloneSink {
    fn report(&mut self, pair: &ClonePair) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<K: CloneSink + ?Sized> CloneSink for Box<K> {
    fn report(&mut self, pair: &ClonePair) -> Result<(), SinkError> {
        (**self).report(pair)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Collects pairs in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    pairs: Arc<Mutex<Vec<ClonePair>>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pairs.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot in arrival order.
    pub fn pairs(&self) -> Vec<ClonePair> {
        self.pairs.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Snapshot sorted by query id, then candidate id.
    pub fn sorted(&self) -> Vec<ClonePair> {
        let mut pairs = self.pairs();
        pairs.sort();
        pairs
    }
}

impl CloneSink for VecSink {
    fn report(&mut self, pair: &ClonePair) -> Result<(), SinkError> {
        self.pairs
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(pair.clone());
        Ok(())
    }
}

/// Writes one `query_id,candidate_id` line per pair.
pub struct WriterSink<W: Write> {
    writer: BufWriter<W>,
    written: u64,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))
    }
}

impl<W: Write> CloneSink for WriterSink<W> {
    fn report(&mut self, pair: &ClonePair) -> Result<(), SinkError> {
        writeln!(self.writer, "{},{}", pair.query_id, pair.candidate_id)?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_clones_share_storage() {
        let sink = VecSink::new();
        let mut writer = sink.clone();
        writer.report(&ClonePair::new("b", "a")).unwrap();
        writer.report(&ClonePair::new("a", "b")).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.sorted(),
            vec![ClonePair::new("a", "b"), ClonePair::new("b", "a")]
        );
    }

    #[test]
    fn writer_sink_emits_csv_lines() {
        let mut sink = WriterSink::new(Vec::new());
        sink.report(&ClonePair::new("10", "11")).unwrap();
        sink.report(&ClonePair::new("11", "10")).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.written(), 2);
        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "10,11\n11,10\n");
    }

    struct Failing;

    impl CloneSink for Failing {
        fn report(&mut self, _pair: &ClonePair) -> Result<(), SinkError> {
            Err(SinkError::Io(io::Error::other("disk full")))
        }
    }

    #[test]
    fn boxed_sink_forwards() {
        let mut boxed: Box<dyn CloneSink + Send> = Box::new(Failing);
        assert!(boxed.report(&ClonePair::new("a", "b")).is_err());
        assert!(boxed.flush().is_ok());
    }
}
