//! Effects of the consolidation on the trust scores.
//!
//! Every entry point can be called again safely: the ledger refuses to
//! charge the same submission, identification or problem twice, and
//! invalidating an invalidated record does nothing.

use log::{debug, info, warn};

pub use crate::config::*;
use crate::ledger::{now, TrustLedger};
use crate::store::SubmissionStore;
use crate::{reconcile, Outcome, ReconcileContext, Reconciliation, Verdict};

/// What an entry point did to the ledger and the store.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct EffectStats {
    /// Events increasing the distrust.
    pub charged: usize,
    /// Events decreasing the distrust.
    pub discounted: usize,
    /// Agents flagged because they crossed the threshold.
    pub flagged: usize,
}

impl EffectStats {
    pub fn scored(&self) -> usize {
        self.charged + self.discounted
    }
}

pub struct TrustDispatcher<S: SubmissionStore> {
    store: S,
    ledger: TrustLedger,
    scoring: ScoringConfig,
}

impl<S: SubmissionStore> TrustDispatcher<S> {
    pub fn new(store: S, scoring: ScoringConfig) -> TrustDispatcher<S> {
        TrustDispatcher {
            store,
            ledger: TrustLedger::new(),
            scoring,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &TrustLedger {
        &self.ledger
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Scores the identifications of an attachment once its table is confirmed.
    pub fn on_identification_resolved(
        &mut self,
        attachment: AttachmentId,
        confirmed_table: TableId,
    ) -> ConsolidationResult<EffectStats> {
        let mut stats = EffectStats::default();
        for ident in self.store.identifications_for_attachment(attachment)? {
            // Flagged while going through the list: its records are gone.
            if self.store.is_flagged(ident.agent)? {
                debug!(
                    "on_identification_resolved: skipping identification {:?} of flagged agent {:?}",
                    ident.id, ident.agent
                );
                continue;
            }
            let reference = EventRef::Identification(ident.id);
            match ident.status {
                IdentificationStatus::Identified(table) if table == confirmed_table => {
                    self.discount(ident.agent, reference, &mut stats);
                }
                IdentificationStatus::Identified(_)
                | IdentificationStatus::Pending
                | IdentificationStatus::Problem => {
                    self.charge(
                        ident.agent,
                        self.scoring.identification_mismatch,
                        TrustReason::DisagreementWithWitness,
                        reference,
                        &mut stats,
                    )?;
                }
            }
        }
        debug!(
            "on_identification_resolved: attachment {:?} -> table {:?}: {:?}",
            attachment, confirmed_table, stats
        );
        Ok(stats)
    }

    /// Scores the submissions of a pair against its witness.
    ///
    /// When a charge flags the author of the witness, the witness goes away
    /// with the agent's records: the pair is reconciled again and the
    /// remaining submissions are scored against the new witness, if any.
    pub fn on_carga_confirmed(&mut self, pair: Pair) -> ConsolidationResult<EffectStats> {
        let mut stats = EffectStats::default();
        loop {
            let mut ctx = ReconcileContext::new();
            let outcome = reconcile(&self.store, pair, &mut ctx)?;
            let reconciliation = match outcome {
                Outcome::Confirmed(r) | Outcome::Conflict(r) => r,
                Outcome::ProblemReported(problems) => {
                    debug!(
                        "on_carga_confirmed: {}: no witness, {} problem reports",
                        pair,
                        problems.len()
                    );
                    break;
                }
                Outcome::NoData => {
                    debug!("on_carga_confirmed: {}: no witness yet", pair);
                    break;
                }
            };
            if !self.score_verdicts(&reconciliation, &mut stats)? {
                break;
            }
            info!(
                "on_carga_confirmed: {}: witness {:?} invalidated while scoring, reconciling again",
                pair, reconciliation.witness.id
            );
        }
        debug!("on_carga_confirmed: {}: {:?}", pair, stats);
        Ok(stats)
    }

    // Returns true when the witness stopped being the witness of the pair
    // part way through. The remaining verdicts are left unscored then.
    fn score_verdicts(
        &mut self,
        reconciliation: &Reconciliation,
        stats: &mut EffectStats,
    ) -> ConsolidationResult<bool> {
        let pair = reconciliation.pair;
        for verdict in reconciliation.verdicts.iter() {
            let submission = match verdict {
                Verdict::Agreeing(s) => *s,
                Verdict::Disagreeing { submission, .. } => *submission,
                Verdict::ProblemOnConfirmed(s) => *s,
            };
            if self.store.is_flagged(submission.agent)? {
                debug!(
                    "on_carga_confirmed: skipping submission {:?} of flagged agent {:?}",
                    submission.id, submission.agent
                );
                continue;
            }
            let reference = EventRef::Submission(submission.id);
            let flagged_before = stats.flagged;
            match verdict {
                Verdict::Agreeing(_) => {
                    self.discount(submission.agent, reference, stats);
                }
                Verdict::Disagreeing { difference: 0, .. } => {
                    debug!(
                        "on_carga_confirmed: {}: submission {:?} differs from the witness by 0",
                        pair, submission.id
                    );
                }
                Verdict::Disagreeing { difference, .. } => {
                    self.charge(
                        submission.agent,
                        *difference,
                        TrustReason::DisagreementWithWitness,
                        reference,
                        stats,
                    )?;
                }
                Verdict::ProblemOnConfirmed(_) => {
                    self.charge(
                        submission.agent,
                        self.scoring.problem_on_confirmed,
                        TrustReason::ProblemOnConfirmedPair,
                        reference,
                        stats,
                    )?;
                }
            }
            if stats.flagged > flagged_before
                && self.store.witness(pair, reconciliation.kind)?
                    != Some(reconciliation.witness.id)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A reviewer discarded a problem reported by the agent.
    pub fn on_problem_discarded(
        &mut self,
        agent: AgentId,
        problem: ProblemId,
    ) -> ConsolidationResult<EffectStats> {
        let mut stats = EffectStats::default();
        self.charge(
            agent,
            self.scoring.discarded_problem,
            TrustReason::DiscardedProblemReport,
            EventRef::Problem(problem),
            &mut stats,
        )?;
        Ok(stats)
    }

    /// Flags the agent and invalidates all of its submissions and identifications.
    pub fn on_agent_flagged_untrustworthy(
        &mut self,
        agent: AgentId,
    ) -> ConsolidationResult<InvalidationStats> {
        self.store.set_flagged(agent, true)?;
        let stats = self.store.invalidate_agent(agent)?;
        if stats.is_empty() {
            debug!(
                "on_agent_flagged_untrustworthy: {:?}: nothing left to invalidate",
                agent
            );
        } else {
            warn!(
                "on_agent_flagged_untrustworthy: {:?}: invalidated {} submissions and {} identifications",
                agent, stats.submissions, stats.identifications
            );
        }
        Ok(stats)
    }

    /// Lifts the flag and starts the score from zero again. The invalidated
    /// records stay invalidated.
    pub fn clear_untrustworthy(&mut self, agent: AgentId) -> ConsolidationResult<()> {
        self.store.set_flagged(agent, false)?;
        self.ledger.reset(agent);
        info!("clear_untrustworthy: {:?}", agent);
        Ok(())
    }

    /// Brings the score of the agent to `score` with a manual event.
    ///
    /// Manual overrides never flag the agent on their own.
    pub fn override_score(&mut self, agent: AgentId, score: i64) {
        let delta = score.saturating_sub(self.ledger.score(agent));
        if delta == 0 {
            return;
        }
        info!("override_score: {:?}: {:+}", agent, delta);
        self.ledger.record(
            agent,
            delta,
            TrustReason::ManualOverride,
            EventRef::Manual,
            now(),
        );
    }

    fn discount(&mut self, agent: AgentId, reference: EventRef, stats: &mut EffectStats) {
        let magnitude = i64::try_from(self.scoring.correct_action_discount)
            .map(|d| -d)
            .unwrap_or(-i64::MAX);
        if self
            .ledger
            .record(agent, magnitude, TrustReason::AgreementWithWitness, reference, now())
            .is_some()
        {
            stats.discounted += 1;
        }
    }

    fn charge(
        &mut self,
        agent: AgentId,
        magnitude: u64,
        reason: TrustReason,
        reference: EventRef,
        stats: &mut EffectStats,
    ) -> ConsolidationResult<()> {
        if self
            .ledger
            .record(
                agent,
                i64::try_from(magnitude).unwrap_or(i64::MAX),
                reason,
                reference,
                now(),
            )
            .is_none()
        {
            return Ok(());
        }
        stats.charged += 1;
        if let Some(threshold) = self.scoring.untrustworthy_threshold {
            let score = self.ledger.score(agent);
            if score >= threshold && !self.store.is_flagged(agent)? {
                warn!(
                    "charge: agent {:?} reached score {} (threshold {}), flagging it",
                    agent, score, threshold
                );
                self.on_agent_flagged_untrustworthy(agent)?;
                stats.flagged += 1;
            }
        }
        Ok(())
    }
}
