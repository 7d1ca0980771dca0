//! Lazy chunking of an ordered candidate stream.

use crate::error::{BatchError, BatchResult};
use crate::models::{CandidatePosition, EntityId, PartitionKey};
use std::iter::Peekable;

/// One unit of worker-job work: entity ids sharing a single partition key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub partition_key: Option<PartitionKey>,
    pub entity_ids: Vec<EntityId>,
    /// Position of the last entity in this chunk, used to advance the seed cursor
    pub last_position: CandidatePosition,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.entity_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty()
    }
}

/// Splits candidates into chunks of at most `chunk_size` ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkPartitioner {
    chunk_size: usize,
}

impl WorkPartitioner {
    pub fn new(chunk_size: usize) -> BatchResult<Self> {
        if chunk_size == 0 {
            return Err(BatchError::validation("chunk size must be greater than zero"));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunk `candidates` in the order given
    ///
    /// Nothing is consumed until the returned iterator is advanced.
    pub fn partition<I>(&self, candidates: I) -> Chunks<I::IntoIter>
    where
        I: IntoIterator<Item = CandidatePosition>,
    {
        Chunks {
            candidates: candidates.into_iter().peekable(),
            chunk_size: self.chunk_size,
        }
    }
}

/// Iterator returned by [`WorkPartitioner::partition`]
#[derive(Debug)]
pub struct Chunks<I: Iterator<Item = CandidatePosition>> {
    candidates: Peekable<I>,
    chunk_size: usize,
}

impl<I: Iterator<Item = CandidatePosition>> Iterator for Chunks<I> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let first = self.candidates.next()?;
        let mut chunk = Chunk {
            partition_key: first.partition_key.clone(),
            entity_ids: vec![first.entity_id.clone()],
            last_position: first,
        };

        while chunk.entity_ids.len() < self.chunk_size {
            let Some(next) = self
                .candidates
                .next_if(|candidate| candidate.partition_key == chunk.partition_key)
            else {
                break;
            };
            chunk.entity_ids.push(next.entity_id.clone());
            chunk.last_position = next;
        }

        Some(chunk)
    }
}
