use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{Result, SessionError};
use crate::message::CommandKind;

/// A sent command awaiting ACK/NAK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub sequence: u32,
    pub kind: CommandKind,
    pub sent_at: Instant,
    pub deadline: Instant,
}

impl PendingRequest {
    pub fn new(sequence: u32, kind: CommandKind, timeout: Duration) -> Self {
        let sent_at = Instant::now();
        Self {
            sequence,
            kind,
            sent_at,
            deadline: sent_at + timeout,
        }
    }

    /// How long the request was allowed to wait.
    pub fn timeout(&self) -> Duration {
        self.deadline.saturating_duration_since(self.sent_at)
    }
}

/// Outstanding requests keyed by sequence number, at most one per sequence.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<u32, PendingRequest>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, request: PendingRequest) -> Result<()> {
        if self.entries.contains_key(&request.sequence) {
            return Err(SessionError::DuplicateSequence(request.sequence));
        }
        self.entries.insert(request.sequence, request);
        Ok(())
    }

    pub fn contains(&self, sequence: u32) -> bool {
        self.entries.contains_key(&sequence)
    }

    /// Remove and return the entry for `sequence`. A second call returns `None`.
    pub fn resolve(&mut self, sequence: u32) -> Option<PendingRequest> {
        self.entries.remove(&sequence)
    }

    /// Remove every entry whose deadline is at or before `now`, oldest first.
    pub fn take_expired(&mut self, now: Instant) -> Vec<PendingRequest> {
        let expired: Vec<u32> = self
            .entries
            .values()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| entry.sequence)
            .collect();
        let mut out: Vec<PendingRequest> = expired
            .into_iter()
            .filter_map(|sequence| self.entries.remove(&sequence))
            .collect();
        out.sort_by_key(|entry| entry.deadline);
        out
    }

    /// Remove everything, oldest first.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        let mut out: Vec<PendingRequest> = self.entries.drain().map(|(_, entry)| entry).collect();
        out.sort_by_key(|entry| entry.sent_at);
        out
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|entry| entry.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_exactly_once() {
        let mut table = PendingTable::new();
        table
            .insert(PendingRequest::new(5, CommandKind::Play, Duration::from_secs(1)))
            .expect("first insert should succeed");

        let entry = table.resolve(5).expect("entry should be pending");
        assert_eq!(entry.kind, CommandKind::Play);
        assert!(table.resolve(5).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_sequence_is_rejected() {
        let mut table = PendingTable::new();
        table
            .insert(PendingRequest::new(1, CommandKind::Enable, Duration::from_secs(1)))
            .expect("first insert should succeed");
        let err = table
            .insert(PendingRequest::new(1, CommandKind::Stop, Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, SessionError::DuplicateSequence(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn expiry_takes_only_overdue_entries() {
        let mut table = PendingTable::new();
        table
            .insert(PendingRequest::new(1, CommandKind::Upload, Duration::ZERO))
            .expect("insert should succeed");
        table
            .insert(PendingRequest::new(2, CommandKind::Play, Duration::from_secs(60)))
            .expect("insert should succeed");

        let expired = table.take_expired(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].sequence, 1);
        assert_eq!(expired[0].timeout(), Duration::ZERO);
        assert!(table.contains(2));
        assert!(table.next_deadline().is_some());
    }

    #[test]
    fn drain_empties_the_table() {
        let mut table = PendingTable::new();
        for seq in 0..4 {
            table
                .insert(PendingRequest::new(seq, CommandKind::Heartbeat, Duration::from_secs(1)))
                .expect("insert should succeed");
        }
        assert_eq!(table.drain().len(), 4);
        assert!(table.is_empty());
        assert!(table.next_deadline().is_none());
    }
}
