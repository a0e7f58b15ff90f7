//! Bounded record of adaptive routing decisions

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::types::ExpertKind;

/// One sub-strategy's contribution to a decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyVote {
    pub strategy: String,
    pub expert: ExpertKind,
    pub confidence: f64,
}

/// A routing decision as remembered for later feedback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub selected_expert: ExpertKind,
    pub confidence: f64,
    pub strategy_used: String,
    /// Empty for exploration decisions
    pub votes: Vec<StrategyVote>,
}

impl DecisionRecord {
    /// The vote a given strategy cast, if any
    pub fn vote_for(&self, strategy: &str) -> Option<&StrategyVote> {
        self.votes.iter().find(|v| v.strategy == strategy)
    }
}

/// Ring buffer of decisions; the oldest record is dropped when full
#[derive(Debug)]
pub struct DecisionHistory {
    records: VecDeque<DecisionRecord>,
    capacity: usize,
    evicted_total: u64,
}

impl DecisionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            evicted_total: 0,
        }
    }

    /// Append a record, returning how many old records were dropped
    pub fn push(&mut self, record: DecisionRecord) -> usize {
        let mut evicted = 0;
        while self.records.len() >= self.capacity {
            self.records.pop_front();
            evicted += 1;
        }
        self.evicted_total += evicted as u64;
        self.records.push_back(record);
        evicted
    }

    pub fn latest(&self) -> Option<&DecisionRecord> {
        self.records.back()
    }

    /// Find a record by id, searching newest first
    pub fn find(&self, id: Uuid) -> Option<&DecisionRecord> {
        self.records.iter().rev().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.records.iter()
    }

    pub fn evicted_total(&self) -> u64 {
        self.evicted_total
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(prompt: &str) -> DecisionRecord {
        DecisionRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            prompt: prompt.to_string(),
            selected_expert: ExpertKind::Risk,
            confidence: 0.5,
            strategy_used: "adaptive".to_string(),
            votes: vec![StrategyVote {
                strategy: "vector".to_string(),
                expert: ExpertKind::Risk,
                confidence: 0.5,
            }],
        }
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let mut history = DecisionHistory::new(2);
        history.push(record("a"));
        assert_eq!(history.push(record("b")), 0);
        assert_eq!(history.push(record("c")), 1);

        assert_eq!(history.len(), 2);
        assert_eq!(history.evicted_total(), 1);
        let prompts: Vec<_> = history.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["b", "c"]);
        assert_eq!(history.latest().unwrap().prompt, "c");
    }

    #[test]
    fn test_find_by_id() {
        let mut history = DecisionHistory::new(10);
        let first = record("first");
        let id = first.id;
        history.push(first);
        history.push(record("second"));

        assert_eq!(history.find(id).unwrap().prompt, "first");
        assert!(history.find(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_vote_for() {
        let r = record("x");
        assert!(r.vote_for("vector").is_some());
        assert!(r.vote_for("performance").is_none());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut history = DecisionHistory::new(0);
        history.push(record("a"));
        history.push(record("b"));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.len(), 1);
    }
}
