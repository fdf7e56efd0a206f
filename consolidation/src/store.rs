//! Access to the submitted data.
//!
//! The engine only talks to the [`SubmissionStore`] trait. [`MemoryStore`] is
//! an in-process implementation, which also carries the part of the workflow
//! that belongs to the store itself: promoting witnesses and confirming
//! attachments once enough agents agree.

use log::{debug, info};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::builder::SubmissionBuilder;
pub use crate::config::*;

pub trait SubmissionStore {
    /// The non-invalidated submissions of a pair, ordered by id.
    fn submissions_for_pair(&self, pair: Pair) -> ConsolidationResult<Vec<Submission>>;

    fn witness(&self, pair: Pair, kind: TallyKind) -> ConsolidationResult<Option<SubmissionId>>;

    /// The non-invalidated identifications of an attachment, ordered by id.
    fn identifications_for_attachment(
        &self,
        attachment: AttachmentId,
    ) -> ConsolidationResult<Vec<Identification>>;

    /// Invalidates every submission and identification of the agent.
    ///
    /// Must be atomic: readers either see none or all of the records invalidated.
    fn invalidate_agent(&self, agent: AgentId) -> ConsolidationResult<InvalidationStats>;

    fn is_flagged(&self, agent: AgentId) -> ConsolidationResult<bool>;

    fn set_flagged(&self, agent: AgentId, flagged: bool) -> ConsolidationResult<()>;

    /// Pairs with a witness and submissions that were not scored yet, with
    /// the generation at which they became pending.
    fn pending_pairs(&self, limit: usize) -> ConsolidationResult<Vec<(Pair, Generation)>>;

    /// Clears the pending mark, unless the pair became pending again after
    /// `generation`.
    fn mark_pair_processed(&self, pair: Pair, generation: Generation) -> ConsolidationResult<()>;

    /// Attachments whose table got confirmed, with identifications not scored yet.
    fn pending_attachments(
        &self,
        limit: usize,
    ) -> ConsolidationResult<Vec<(AttachmentId, TableId, Generation)>>;

    /// Same rule as [`SubmissionStore::mark_pair_processed`].
    fn mark_attachment_processed(
        &self,
        attachment: AttachmentId,
        generation: Generation,
    ) -> ConsolidationResult<()>;

    /// Pairs with an identified tally sheet but no total witness yet, with their priority.
    fn pairs_awaiting_result(&self) -> ConsolidationResult<Vec<(Pair, u32)>>;
}

impl<S: SubmissionStore + ?Sized> SubmissionStore for std::sync::Arc<S> {
    fn submissions_for_pair(&self, pair: Pair) -> ConsolidationResult<Vec<Submission>> {
        (**self).submissions_for_pair(pair)
    }
    fn witness(&self, pair: Pair, kind: TallyKind) -> ConsolidationResult<Option<SubmissionId>> {
        (**self).witness(pair, kind)
    }
    fn identifications_for_attachment(
        &self,
        attachment: AttachmentId,
    ) -> ConsolidationResult<Vec<Identification>> {
        (**self).identifications_for_attachment(attachment)
    }
    fn invalidate_agent(&self, agent: AgentId) -> ConsolidationResult<InvalidationStats> {
        (**self).invalidate_agent(agent)
    }
    fn is_flagged(&self, agent: AgentId) -> ConsolidationResult<bool> {
        (**self).is_flagged(agent)
    }
    fn set_flagged(&self, agent: AgentId, flagged: bool) -> ConsolidationResult<()> {
        (**self).set_flagged(agent, flagged)
    }
    fn pending_pairs(&self, limit: usize) -> ConsolidationResult<Vec<(Pair, Generation)>> {
        (**self).pending_pairs(limit)
    }
    fn mark_pair_processed(&self, pair: Pair, generation: Generation) -> ConsolidationResult<()> {
        (**self).mark_pair_processed(pair, generation)
    }
    fn pending_attachments(
        &self,
        limit: usize,
    ) -> ConsolidationResult<Vec<(AttachmentId, TableId, Generation)>> {
        (**self).pending_attachments(limit)
    }
    fn mark_attachment_processed(
        &self,
        attachment: AttachmentId,
        generation: Generation,
    ) -> ConsolidationResult<()> {
        (**self).mark_attachment_processed(attachment, generation)
    }
    fn pairs_awaiting_result(&self) -> ConsolidationResult<Vec<(Pair, u32)>> {
        (**self).pairs_awaiting_result()
    }
}

#[derive(Debug, Default)]
struct Inner {
    submissions: BTreeMap<SubmissionId, Submission>,
    identifications: BTreeMap<IdentificationId, Identification>,
    witnesses: HashMap<(Pair, TallyKind), SubmissionId>,
    // Attachment -> confirmed table.
    attachments: HashMap<AttachmentId, TableId>,
    // Table -> (category, priority).
    tables: BTreeMap<TableId, Vec<(CategoryId, u32)>>,
    flagged: HashSet<AgentId>,
    trusted: HashSet<AgentId>,
    pending_pairs: BTreeMap<Pair, Generation>,
    pending_attachments: BTreeMap<AttachmentId, Generation>,
    generation: Generation,
    next_submission: u64,
    next_identification: u64,
    unavailable: bool,
}

impl Inner {
    fn mark_pair_pending(&mut self, pair: Pair) {
        self.generation += 1;
        self.pending_pairs.insert(pair, self.generation);
    }

    fn mark_attachment_pending(&mut self, attachment: AttachmentId) {
        self.generation += 1;
        self.pending_attachments.insert(attachment, self.generation);
    }
}

/// A store living in memory, guarded by a single lock.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    min_coincidences: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl MemoryStore {
    pub const DEFAULT_MIN_COINCIDENCES: usize = 2;

    pub fn new() -> MemoryStore {
        MemoryStore::with_min_coincidences(MemoryStore::DEFAULT_MIN_COINCIDENCES)
    }

    /// `min_coincidences` is the number of matching submissions (or
    /// identifications) needed to confirm a result.
    pub fn with_min_coincidences(min_coincidences: usize) -> MemoryStore {
        MemoryStore {
            inner: Mutex::new(Inner::default()),
            min_coincidences: min_coincidences.max(1),
        }
    }

    fn lock(&self) -> ConsolidationResult<MutexGuard<'_, Inner>> {
        let guard = self
            .inner
            .lock()
            .map_err(|e| ConsolidationError::StoreUnavailable(format!("poisoned lock: {}", e)))?;
        if guard.unavailable {
            return Err(ConsolidationError::StoreUnavailable(
                "store is offline".to_string(),
            ));
        }
        Ok(guard)
    }

    /// Simulates an outage: every call fails until the store is back online.
    pub fn set_unavailable(&self, unavailable: bool) {
        match self.inner.lock() {
            Ok(mut g) => g.unavailable = unavailable,
            Err(poisoned) => poisoned.into_inner().unavailable = unavailable,
        }
    }

    /// Declares the categories voted at a table. Lower priorities are processed first.
    pub fn register_table(
        &self,
        table: TableId,
        categories: &[(CategoryId, u32)],
    ) -> ConsolidationResult<()> {
        let mut g = self.lock()?;
        g.tables.insert(table, categories.to_vec());
        Ok(())
    }

    /// CSV imports from trusted agents confirm their pair right away.
    pub fn trust_agent(&self, agent: AgentId) -> ConsolidationResult<()> {
        let mut g = self.lock()?;
        g.trusted.insert(agent);
        Ok(())
    }

    /// Records a new submission.
    ///
    /// Submissions of flagged agents are stored already invalidated. A CSV
    /// submission supersedes the previous CSV submissions of the same agent
    /// for the same pair and kind.
    pub fn ingest(&self, builder: SubmissionBuilder) -> ConsolidationResult<SubmissionId> {
        let mut g = self.lock()?;
        g.next_submission += 1;
        let id = SubmissionId(g.next_submission);
        let mut submission = builder.build(id);
        if g.flagged.contains(&submission.agent) {
            debug!(
                "ingest: submission {:?} from flagged agent {:?}, storing it invalidated",
                id, submission.agent
            );
            submission.invalidated = true;
        }
        if submission.origin == Origin::Csv {
            let superseded: Vec<SubmissionId> = g
                .submissions
                .values()
                .filter(|s| {
                    !s.invalidated
                        && s.origin == Origin::Csv
                        && s.pair == submission.pair
                        && s.agent == submission.agent
                        && s.kind == submission.kind
                })
                .map(|s| s.id)
                .collect();
            for sid in superseded {
                info!("ingest: CSV submission {:?} supersedes {:?}", id, sid);
                if let Some(s) = g.submissions.get_mut(&sid) {
                    s.invalidated = true;
                }
            }
        }
        let pair = submission.pair;
        g.submissions.insert(id, submission);
        self.refresh_pair(&mut g, pair);
        Ok(id)
    }

    /// Records a new identification of an attachment.
    pub fn ingest_identification(
        &self,
        attachment: AttachmentId,
        agent: AgentId,
        status: IdentificationStatus,
        timestamp: Timestamp,
    ) -> ConsolidationResult<IdentificationId> {
        let mut g = self.lock()?;
        g.next_identification += 1;
        let id = IdentificationId(g.next_identification);
        let invalidated = g.flagged.contains(&agent);
        g.identifications.insert(
            id,
            Identification {
                id,
                attachment,
                agent,
                status,
                invalidated,
                timestamp,
            },
        );
        self.refresh_attachment(&mut g, attachment);
        Ok(id)
    }

    /// Sets the witness of a pair, bypassing the coincidence rule.
    pub fn confirm_witness(
        &self,
        pair: Pair,
        kind: TallyKind,
        submission: SubmissionId,
    ) -> ConsolidationResult<()> {
        let mut g = self.lock()?;
        match g.submissions.get(&submission) {
            Some(s) if s.pair == pair && s.kind == SubmissionKind::Tally(kind) => {}
            _ => return Err(ConsolidationError::UnknownPair(pair)),
        }
        g.witnesses.insert((pair, kind), submission);
        g.mark_pair_pending(pair);
        Ok(())
    }

    /// Sets the table of an attachment, bypassing the coincidence rule.
    pub fn confirm_attachment(
        &self,
        attachment: AttachmentId,
        table: TableId,
    ) -> ConsolidationResult<()> {
        let mut g = self.lock()?;
        g.attachments.insert(attachment, table);
        g.mark_attachment_pending(attachment);
        Ok(())
    }

    pub fn submission(&self, id: SubmissionId) -> ConsolidationResult<Option<Submission>> {
        Ok(self.lock()?.submissions.get(&id).cloned())
    }

    /// Every submission, including the invalidated ones.
    pub fn all_submissions(&self) -> ConsolidationResult<Vec<Submission>> {
        Ok(self.lock()?.submissions.values().cloned().collect())
    }

    pub fn all_identifications(&self) -> ConsolidationResult<Vec<Identification>> {
        Ok(self.lock()?.identifications.values().cloned().collect())
    }

    /// The current witnesses, sorted by pair and kind.
    pub fn witnesses(&self) -> ConsolidationResult<Vec<(Pair, TallyKind, SubmissionId)>> {
        let g = self.lock()?;
        let mut res: Vec<(Pair, TallyKind, SubmissionId)> = g
            .witnesses
            .iter()
            .map(|((pair, kind), sid)| (*pair, *kind, *sid))
            .collect();
        res.sort();
        Ok(res)
    }

    pub fn confirmed_table(&self, attachment: AttachmentId) -> ConsolidationResult<Option<TableId>> {
        Ok(self.lock()?.attachments.get(&attachment).cloned())
    }

    // Drops stale witnesses, promotes new ones and marks the pair for scoring.
    fn refresh_pair(&self, g: &mut Inner, pair: Pair) {
        for kind in [TallyKind::Total, TallyKind::Partial] {
            let stale = match g.witnesses.get(&(pair, kind)) {
                Some(sid) => g.submissions.get(sid).map(|s| s.invalidated).unwrap_or(true),
                None => false,
            };
            if stale {
                info!("refresh_pair: {}: dropping invalidated {:?} witness", pair, kind);
                g.witnesses.remove(&(pair, kind));
            }
            if !g.witnesses.contains_key(&(pair, kind)) {
                if let Some(sid) = self.promote_witness(g, pair, kind) {
                    info!("refresh_pair: {}: submission {:?} is the {:?} witness", pair, sid, kind);
                    g.witnesses.insert((pair, kind), sid);
                }
            }
        }
        let has_witness = [TallyKind::Total, TallyKind::Partial]
            .iter()
            .any(|kind| g.witnesses.contains_key(&(pair, *kind)));
        if has_witness {
            g.mark_pair_pending(pair);
        }
    }

    // A trusted CSV import wins. Otherwise the largest group of matching
    // submissions reaching `min_coincidences`, the earliest group on ties; its
    // earliest submission becomes the witness.
    fn promote_witness(&self, g: &Inner, pair: Pair, kind: TallyKind) -> Option<SubmissionId> {
        let candidates: Vec<&Submission> = g
            .submissions
            .values()
            .filter(|s| !s.invalidated && s.pair == pair && s.kind == SubmissionKind::Tally(kind))
            .collect();

        let trusted_csv = candidates
            .iter()
            .filter(|s| s.origin == Origin::Csv && g.trusted.contains(&s.agent))
            .max_by_key(|s| (s.timestamp, s.id));
        if let Some(s) = trusted_csv {
            return Some(s.id);
        }

        let mut groups: BTreeMap<&Fingerprint, Vec<&Submission>> = BTreeMap::new();
        for s in candidates.iter() {
            groups.entry(&s.fingerprint).or_default().push(*s);
        }
        groups
            .values()
            .filter(|group| group.len() >= self.min_coincidences)
            .filter_map(|group| {
                group
                    .iter()
                    .min_by_key(|s| (s.timestamp, s.id))
                    .map(|first| (group.len(), first.timestamp, first.id))
            })
            .max_by(|a, b| {
                a.0.cmp(&b.0)
                    .then_with(|| b.1.cmp(&a.1))
                    .then_with(|| b.2.cmp(&a.2))
            })
            .map(|(_, _, sid)| sid)
    }

    fn refresh_attachment(&self, g: &mut Inner, attachment: AttachmentId) {
        if g.attachments.contains_key(&attachment) {
            g.mark_attachment_pending(attachment);
            return;
        }
        let mut counts: BTreeMap<TableId, (usize, Timestamp)> = BTreeMap::new();
        for ident in g
            .identifications
            .values()
            .filter(|i| !i.invalidated && i.attachment == attachment)
        {
            if let IdentificationStatus::Identified(table) = ident.status {
                let e = counts.entry(table).or_insert((0, ident.timestamp));
                e.0 += 1;
                e.1 = e.1.min(ident.timestamp);
            }
        }
        let confirmed = counts
            .iter()
            .filter(|(_, (n, _))| *n >= self.min_coincidences)
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then_with(|| b.1 .1.cmp(&a.1 .1)))
            .map(|(table, _)| *table);
        if let Some(table) = confirmed {
            info!(
                "refresh_attachment: attachment {:?} confirmed as table {:?}",
                attachment, table
            );
            g.attachments.insert(attachment, table);
            g.mark_attachment_pending(attachment);
        }
    }
}

impl SubmissionStore for MemoryStore {
    fn submissions_for_pair(&self, pair: Pair) -> ConsolidationResult<Vec<Submission>> {
        let g = self.lock()?;
        Ok(g.submissions
            .values()
            .filter(|s| s.pair == pair && !s.invalidated)
            .cloned()
            .collect())
    }

    fn witness(&self, pair: Pair, kind: TallyKind) -> ConsolidationResult<Option<SubmissionId>> {
        Ok(self.lock()?.witnesses.get(&(pair, kind)).cloned())
    }

    fn identifications_for_attachment(
        &self,
        attachment: AttachmentId,
    ) -> ConsolidationResult<Vec<Identification>> {
        let g = self.lock()?;
        Ok(g.identifications
            .values()
            .filter(|i| i.attachment == attachment && !i.invalidated)
            .cloned()
            .collect())
    }

    fn invalidate_agent(&self, agent: AgentId) -> ConsolidationResult<InvalidationStats> {
        let mut g = self.lock()?;
        let mut stats = InvalidationStats::default();
        let mut touched_pairs: BTreeSet<Pair> = BTreeSet::new();
        for s in g.submissions.values_mut() {
            if s.agent == agent && !s.invalidated {
                s.invalidated = true;
                stats.submissions += 1;
                touched_pairs.insert(s.pair);
            }
        }
        for i in g.identifications.values_mut() {
            if i.agent == agent && !i.invalidated {
                i.invalidated = true;
                stats.identifications += 1;
            }
        }
        for pair in touched_pairs {
            self.refresh_pair(&mut g, pair);
        }
        debug!("invalidate_agent: {:?}: {:?}", agent, stats);
        Ok(stats)
    }

    fn is_flagged(&self, agent: AgentId) -> ConsolidationResult<bool> {
        Ok(self.lock()?.flagged.contains(&agent))
    }

    fn set_flagged(&self, agent: AgentId, flagged: bool) -> ConsolidationResult<()> {
        let mut g = self.lock()?;
        if flagged {
            g.flagged.insert(agent);
        } else {
            g.flagged.remove(&agent);
        }
        Ok(())
    }

    fn pending_pairs(&self, limit: usize) -> ConsolidationResult<Vec<(Pair, Generation)>> {
        Ok(self
            .lock()?
            .pending_pairs
            .iter()
            .take(limit)
            .map(|(pair, gen)| (*pair, *gen))
            .collect())
    }

    fn mark_pair_processed(&self, pair: Pair, generation: Generation) -> ConsolidationResult<()> {
        let mut g = self.lock()?;
        if g.pending_pairs.get(&pair) == Some(&generation) {
            g.pending_pairs.remove(&pair);
        } else {
            debug!("mark_pair_processed: {} is pending again, keeping it", pair);
        }
        Ok(())
    }

    fn pending_attachments(
        &self,
        limit: usize,
    ) -> ConsolidationResult<Vec<(AttachmentId, TableId, Generation)>> {
        let g = self.lock()?;
        Ok(g.pending_attachments
            .iter()
            .filter_map(|(a, gen)| g.attachments.get(a).map(|t| (*a, *t, *gen)))
            .take(limit)
            .collect())
    }

    fn mark_attachment_processed(
        &self,
        attachment: AttachmentId,
        generation: Generation,
    ) -> ConsolidationResult<()> {
        let mut g = self.lock()?;
        if g.pending_attachments.get(&attachment) == Some(&generation) {
            g.pending_attachments.remove(&attachment);
        } else {
            debug!(
                "mark_attachment_processed: {:?} is pending again, keeping it",
                attachment
            );
        }
        Ok(())
    }

    fn pairs_awaiting_result(&self) -> ConsolidationResult<Vec<(Pair, u32)>> {
        let g = self.lock()?;
        let identified: BTreeSet<TableId> = g.attachments.values().cloned().collect();
        let mut res: Vec<(Pair, u32)> = Vec::new();
        for table in identified {
            let categories = match g.tables.get(&table) {
                Some(c) => c,
                None => {
                    debug!("pairs_awaiting_result: table {:?} has no categories", table);
                    continue;
                }
            };
            for (category, priority) in categories.iter() {
                let pair = Pair {
                    table,
                    category: *category,
                };
                if !g.witnesses.contains_key(&(pair, TallyKind::Total)) {
                    res.push((pair, *priority));
                }
            }
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(agent: u32, votes: &[(u32, u64)], ts: u64) -> SubmissionBuilder {
        SubmissionBuilder::new(Pair::new(1, 1), AgentId(agent))
            .votes(votes)
            .timestamp(ts)
    }

    #[test]
    fn witness_needs_coincidences() {
        let store = MemoryStore::new();
        let pair = Pair::new(1, 1);
        store.ingest(total(1, &[(1, 10)], 1)).unwrap();
        assert_eq!(store.witness(pair, TallyKind::Total).unwrap(), None);
        assert!(store.pending_pairs(10).unwrap().is_empty());
        store.ingest(total(2, &[(1, 11)], 2)).unwrap();
        assert_eq!(store.witness(pair, TallyKind::Total).unwrap(), None);
        let third = store.ingest(total(3, &[(1, 11)], 3)).unwrap();
        let second = SubmissionId(2);
        assert_ne!(third, second);
        assert_eq!(store.witness(pair, TallyKind::Total).unwrap(), Some(second));
        assert_eq!(store.pending_pairs(10).unwrap().len(), 1);
        assert_eq!(store.pending_pairs(10).unwrap()[0].0, pair);
    }

    #[test]
    fn trusted_csv_confirms_immediately() {
        let store = MemoryStore::new();
        let pair = Pair::new(1, 1);
        store.trust_agent(AgentId(9)).unwrap();
        let sid = store
            .ingest(total(9, &[(1, 10)], 1).origin(Origin::Csv))
            .unwrap();
        assert_eq!(store.witness(pair, TallyKind::Total).unwrap(), Some(sid));
    }

    #[test]
    fn csv_reimport_supersedes_and_moves_witness() {
        let store = MemoryStore::new();
        let pair = Pair::new(1, 1);
        store.trust_agent(AgentId(9)).unwrap();
        let first = store
            .ingest(total(9, &[(1, 10)], 1).origin(Origin::Csv))
            .unwrap();
        let second = store
            .ingest(total(9, &[(1, 12)], 2).origin(Origin::Csv))
            .unwrap();
        assert!(store.submission(first).unwrap().unwrap().invalidated);
        assert_eq!(store.witness(pair, TallyKind::Total).unwrap(), Some(second));
        assert_eq!(store.submissions_for_pair(pair).unwrap().len(), 1);
    }

    #[test]
    fn attachment_confirmed_by_coincidence() {
        let store = MemoryStore::new();
        let a = AttachmentId(5);
        store
            .ingest_identification(a, AgentId(1), IdentificationStatus::Identified(TableId(3)), 1)
            .unwrap();
        store
            .ingest_identification(a, AgentId(2), IdentificationStatus::Identified(TableId(4)), 2)
            .unwrap();
        assert_eq!(store.confirmed_table(a).unwrap(), None);
        store
            .ingest_identification(a, AgentId(3), IdentificationStatus::Identified(TableId(4)), 3)
            .unwrap();
        assert_eq!(store.confirmed_table(a).unwrap(), Some(TableId(4)));
        let pending = store.pending_attachments(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!((pending[0].0, pending[0].1), (a, TableId(4)));

        // A late identification makes it pending again: the older mark no longer clears it.
        let (_, _, gen) = pending[0];
        store
            .ingest_identification(a, AgentId(4), IdentificationStatus::Identified(TableId(4)), 4)
            .unwrap();
        store.mark_attachment_processed(a, gen).unwrap();
        let pending = store.pending_attachments(10).unwrap();
        assert_eq!(pending.len(), 1);
        store.mark_attachment_processed(a, pending[0].2).unwrap();
        assert!(store.pending_attachments(10).unwrap().is_empty());
    }

    #[test]
    fn ingest_after_scoring_keeps_the_pair_pending() {
        let store = MemoryStore::new();
        let pair = Pair::new(1, 1);
        store.ingest(total(1, &[(1, 10)], 1)).unwrap();
        store.ingest(total(2, &[(1, 10)], 2)).unwrap();
        let (_, gen) = store.pending_pairs(10).unwrap()[0];
        store.ingest(total(3, &[(1, 17)], 3)).unwrap();
        store.mark_pair_processed(pair, gen).unwrap();
        let pending = store.pending_pairs(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].1 > gen);
        store.mark_pair_processed(pair, pending[0].1).unwrap();
        assert!(store.pending_pairs(10).unwrap().is_empty());
    }

    #[test]
    fn awaiting_pairs_follow_identified_tables() {
        let store = MemoryStore::new();
        store
            .register_table(TableId(3), &[(CategoryId(1), 1), (CategoryId(2), 5)])
            .unwrap();
        assert!(store.pairs_awaiting_result().unwrap().is_empty());
        store.confirm_attachment(AttachmentId(1), TableId(3)).unwrap();
        assert_eq!(
            store.pairs_awaiting_result().unwrap(),
            vec![(Pair::new(3, 1), 1), (Pair::new(3, 2), 5)]
        );
    }

    #[test]
    fn offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.pending_pairs(1),
            Err(ConsolidationError::StoreUnavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.pending_pairs(1).is_ok());
    }
}
