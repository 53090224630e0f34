//! # Poll Tally
//!
//! Votes are stored as a raw append-only log of option indices. Counts are
//! never persisted; they are recomputed from the full log on every read.
//!
//! Indices outside the poll's option range are skipped, so the total always
//! equals the sum of the per-option counts.
use serde::Serialize;

use crate::models::{Poll, Vote};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub vote_counts: Vec<u64>,
    pub total_votes: u64,
}

impl Tally {
    /// Share of the total for `option`, from 0.0 to 100.0. Zero when nobody
    /// has voted yet.
    pub fn percentage(&self, option: usize) -> f64 {
        match self.vote_counts.get(option) {
            Some(&count) if self.total_votes > 0 => {
                count as f64 * 100.0 / self.total_votes as f64
            }
            _ => 0.0,
        }
    }
}

pub fn tally(option_count: usize, votes: &[Vote]) -> Tally {
    let mut vote_counts = vec![0u64; option_count];

    for vote in votes {
        let count = usize::try_from(vote.option_index)
            .ok()
            .and_then(|index| vote_counts.get_mut(index));

        if let Some(count) = count {
            *count += 1;
        }
    }

    let total_votes = vote_counts.iter().sum();

    Tally {
        vote_counts,
        total_votes,
    }
}

impl Poll {
    pub fn tally(&self, votes: &[Vote]) -> Tally {
        tally(self.options.len(), votes)
    }
}
