use std::collections::HashSet;

use crate::record::CleanRecord;

/// Drops records equal in every column to one already emitted during this run.
/// The first occurrence wins.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<CleanRecord>,
    suppressed: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record if it is the first of its kind, `None` if it is a
    /// duplicate.
    pub fn admit(&mut self, record: CleanRecord) -> Option<CleanRecord> {
        if self.seen.contains(&record) {
            self.suppressed += 1;
            return None;
        }
        self.seen.insert(record.clone());
        Some(record)
    }

    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}
