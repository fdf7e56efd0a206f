use log::debug;

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

pub use crate::config::*;

pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Append-only log of trust events, with the derived score of each agent.
///
/// The score of an agent is the sum of the magnitudes of its events recorded
/// since its last reset. A submission, identification or problem report is
/// charged at most once per agent, whatever the number of calls.
#[derive(Debug, Default)]
pub struct TrustLedger {
    events: Vec<TrustEvent>,
    // Cache, always equal to `recompute_score`.
    scores: HashMap<AgentId, i64>,
    // First sequence number counted in the score of the agent.
    resets: HashMap<AgentId, u64>,
    seen: HashSet<(AgentId, EventRef)>,
    next_seq: u64,
}

impl TrustLedger {
    pub fn new() -> TrustLedger {
        TrustLedger::default()
    }

    /// Appends an event.
    ///
    /// Returns `None` (and records nothing) when the reference was already
    /// charged to this agent. Manual events are never deduplicated.
    pub fn record(
        &mut self,
        agent: AgentId,
        magnitude: i64,
        reason: TrustReason,
        reference: EventRef,
        timestamp: Timestamp,
    ) -> Option<&TrustEvent> {
        if reference != EventRef::Manual && !self.seen.insert((agent, reference)) {
            debug!(
                "record: {:?} already charged to agent {:?}, skipping {:?}",
                reference, agent, reason
            );
            return None;
        }
        let event = TrustEvent {
            seq: self.next_seq,
            agent,
            magnitude,
            reason,
            reference,
            timestamp,
        };
        self.next_seq += 1;
        let score = self.scores.entry(agent).or_insert(0);
        *score = score.saturating_add(magnitude);
        debug!("record: {:?}", event);
        self.events.push(event);
        self.events.last()
    }

    pub fn has_event(&self, agent: AgentId, reference: EventRef) -> bool {
        self.seen.contains(&(agent, reference))
    }

    pub fn score(&self, agent: AgentId) -> i64 {
        self.scores.get(&agent).cloned().unwrap_or(0)
    }

    /// The score, recomputed from the log.
    pub fn recompute_score(&self, agent: AgentId) -> i64 {
        let since = self.resets.get(&agent).cloned().unwrap_or(0);
        self.events_for(agent)
            .filter(|e| e.seq >= since)
            .map(|e| e.magnitude)
            .fold(0, i64::saturating_add)
    }

    /// Starts counting the score of the agent from zero again. The log is kept.
    pub fn reset(&mut self, agent: AgentId) {
        self.resets.insert(agent, self.next_seq);
        self.scores.insert(agent, 0);
    }

    pub fn events(&self) -> &[TrustEvent] {
        &self.events
    }

    pub fn events_for(&self, agent: AgentId) -> impl Iterator<Item = &TrustEvent> + '_ {
        self.events.iter().filter(move |e| e.agent == agent)
    }

    /// The score of every agent with at least one event, sorted by agent.
    pub fn scores(&self) -> Vec<(AgentId, i64)> {
        let mut res: Vec<(AgentId, i64)> = self.scores.iter().map(|(a, s)| (*a, *s)).collect();
        res.sort();
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_the_sum_of_events() {
        let mut ledger = TrustLedger::new();
        let a = AgentId(1);
        ledger.record(a, 5, TrustReason::DisagreementWithWitness, EventRef::Submission(SubmissionId(1)), 0);
        ledger.record(a, -2, TrustReason::AgreementWithWitness, EventRef::Submission(SubmissionId(2)), 0);
        ledger.record(AgentId(2), 7, TrustReason::DiscardedProblemReport, EventRef::Problem(ProblemId(1)), 0);
        assert_eq!(ledger.score(a), 3);
        assert_eq!(ledger.recompute_score(a), 3);
        assert_eq!(ledger.scores(), vec![(a, 3), (AgentId(2), 7)]);
    }

    #[test]
    fn same_reference_is_charged_once() {
        let mut ledger = TrustLedger::new();
        let a = AgentId(1);
        let r = EventRef::Submission(SubmissionId(4));
        assert!(ledger.record(a, 5, TrustReason::DisagreementWithWitness, r, 0).is_some());
        assert!(ledger.record(a, 5, TrustReason::DisagreementWithWitness, r, 0).is_none());
        assert!(ledger.has_event(a, r));
        assert_eq!(ledger.events().len(), 1);
        assert_eq!(ledger.score(a), 5);
    }

    #[test]
    fn manual_events_are_not_deduplicated() {
        let mut ledger = TrustLedger::new();
        let a = AgentId(1);
        ledger.record(a, 5, TrustReason::ManualOverride, EventRef::Manual, 0);
        ledger.record(a, 5, TrustReason::ManualOverride, EventRef::Manual, 0);
        assert_eq!(ledger.score(a), 10);
    }

    #[test]
    fn reset_keeps_the_log() {
        let mut ledger = TrustLedger::new();
        let a = AgentId(1);
        ledger.record(a, 50, TrustReason::DisagreementWithWitness, EventRef::Submission(SubmissionId(1)), 0);
        ledger.reset(a);
        assert_eq!(ledger.score(a), 0);
        ledger.record(a, 3, TrustReason::DisagreementWithWitness, EventRef::Submission(SubmissionId(2)), 0);
        assert_eq!(ledger.score(a), 3);
        assert_eq!(ledger.recompute_score(a), 3);
        assert_eq!(ledger.events_for(a).count(), 2);
    }
}
