//! The control loop that keeps the consolidation going.
//!
//! Each cycle consolidates a bounded batch of pending work, refreshes the
//! work queue (from scratch every `rounds_before_rebuild` cycles) and then
//! sleeps. A failing cycle is logged, reported and followed by the next one.

use log::{debug, error, info};

use std::collections::{BTreeSet, HashMap};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};

pub use crate::config::*;
use crate::effects::TrustDispatcher;
use crate::store::SubmissionStore;

/// Receives the description of every failed cycle (error tracking).
pub trait ErrorReporter {
    fn report(&self, description: &str);
}

impl<F: Fn(&str)> ErrorReporter for F {
    fn report(&self, description: &str) {
        self(description)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SchedulerState {
    Idle,
    RunningConsolidation,
    RunningEnqueue,
    Sleeping,
}

/// Counts the cycles between two rebuilds of the work queue.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RebuildCounter {
    round: u32,
    threshold: u32,
}

impl RebuildCounter {
    pub fn new(threshold: u32) -> RebuildCounter {
        RebuildCounter {
            round: 0,
            threshold: threshold.max(1),
        }
    }

    /// Advances one cycle. Returns true when the queue must be rebuilt this cycle.
    pub fn tick(&mut self) -> bool {
        self.round += 1;
        if self.round >= self.threshold {
            self.round = 0;
            true
        } else {
            false
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct WorkItem {
    pub pair: Pair,
    pub priority: u32,
}

/// Pairs waiting for their tally, lowest priority value first.
#[derive(Debug, Default)]
pub struct WorkQueue {
    ordered: BTreeSet<(u32, Pair)>,
    priorities: HashMap<Pair, u32>,
}

impl WorkQueue {
    pub fn new() -> WorkQueue {
        WorkQueue::default()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn contains(&self, pair: Pair) -> bool {
        self.priorities.contains_key(&pair)
    }

    /// Returns false if the pair was already queued.
    pub fn push(&mut self, pair: Pair, priority: u32) -> bool {
        if self.priorities.contains_key(&pair) {
            return false;
        }
        self.priorities.insert(pair, priority);
        self.ordered.insert((priority, pair));
        true
    }

    pub fn remove(&mut self, pair: Pair) -> bool {
        match self.priorities.remove(&pair) {
            Some(priority) => self.ordered.remove(&(priority, pair)),
            None => false,
        }
    }

    /// Hands out the most urgent pair.
    pub fn next(&mut self) -> Option<WorkItem> {
        let first = self.ordered.iter().next().cloned();
        first.map(|(priority, pair)| {
            self.ordered.remove(&(priority, pair));
            self.priorities.remove(&pair);
            WorkItem { pair, priority }
        })
    }

    pub fn items(&self) -> Vec<WorkItem> {
        self.ordered
            .iter()
            .map(|(priority, pair)| WorkItem {
                pair: *pair,
                priority: *priority,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.ordered.clear();
        self.priorities.clear();
    }

    /// Discards the content of the queue and fills it again.
    pub fn rebuild(&mut self, awaiting: &[(Pair, u32)]) -> usize {
        self.clear();
        for (pair, priority) in awaiting.iter() {
            self.push(*pair, *priority);
        }
        self.len()
    }
}

pub struct Scheduler<S: SubmissionStore, R: ErrorReporter> {
    dispatcher: TrustDispatcher<S>,
    config: SchedulerConfig,
    reporter: R,
    queue: WorkQueue,
    counter: RebuildCounter,
    state: SchedulerState,
    cycles: u64,
    failures: u64,
}

impl<S: SubmissionStore, R: ErrorReporter> Scheduler<S, R> {
    pub fn new(
        dispatcher: TrustDispatcher<S>,
        config: SchedulerConfig,
        reporter: R,
    ) -> ConsolidationResult<Scheduler<S, R>> {
        config.validate()?;
        let counter = RebuildCounter::new(config.rounds_before_rebuild);
        Ok(Scheduler {
            dispatcher,
            config,
            reporter,
            queue: WorkQueue::new(),
            counter,
            state: SchedulerState::Idle,
            cycles: 0,
            failures: 0,
        })
    }

    pub fn dispatcher(&self) -> &TrustDispatcher<S> {
        &self.dispatcher
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut WorkQueue {
        &mut self.queue
    }

    pub fn counter(&self) -> &RebuildCounter {
        &self.counter
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Runs cycles until a message arrives on `shutdown` or its sender is dropped.
    ///
    /// Cancellation is only looked at between cycles. Returns the number of
    /// cycles run.
    pub fn run(&mut self, shutdown: &Receiver<()>) -> u64 {
        info!(
            "Starting scheduler: batch size {}, rebuild every {} rounds, pause {:?}",
            self.config.batch_size, self.config.rounds_before_rebuild, self.config.pause
        );
        let start = self.cycles;
        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }
            // Failures are already reported.
            let _ = self.run_cycle();
            self.state = SchedulerState::Sleeping;
            match shutdown.recv_timeout(self.config.pause) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        self.state = SchedulerState::Idle;
        info!(
            "Scheduler stopped after {} cycles ({} failed)",
            self.cycles - start,
            self.failures
        );
        self.cycles - start
    }

    /// Runs one cycle without sleeping.
    ///
    /// An error is logged and passed to the reporter before being returned.
    pub fn run_cycle(&mut self) -> ConsolidationResult<CycleReport> {
        self.cycles += 1;
        let rebuild = self.counter.tick();
        let res = self.cycle_body(rebuild);
        self.state = SchedulerState::Idle;
        match res {
            Ok(report) => {
                debug!(
                    "Cycle {}: tasks {} submissions {} identifications {} rebuilt {}",
                    self.cycles,
                    report.tasks_enqueued,
                    report.submissions_processed,
                    report.identifications_processed,
                    report.rebuilt
                );
                Ok(report)
            }
            Err(e) => {
                self.failures += 1;
                error!("Cycle {} failed: {}", self.cycles, e);
                self.reporter
                    .report(&format!("Error {} in scheduler cycle {}", e, self.cycles));
                Err(e)
            }
        }
    }

    fn cycle_body(&mut self, rebuild: bool) -> ConsolidationResult<CycleReport> {
        let mut report = CycleReport {
            rebuilt: rebuild,
            ..CycleReport::default()
        };
        if self.config.run_consolidation {
            self.state = SchedulerState::RunningConsolidation;
            let (identifications, submissions) = self.consolidate()?;
            report.identifications_processed = identifications;
            report.submissions_processed = submissions;
        }
        self.state = SchedulerState::RunningEnqueue;
        report.tasks_enqueued = self.enqueue(rebuild)?;
        Ok(report)
    }

    // Scores a bounded batch of attachments and pairs. Each item is marked
    // processed only once scored, so an interrupted batch resumes next cycle.
    // The mark carries the generation read before scoring: anything ingested
    // meanwhile leaves the item pending.
    fn consolidate(&mut self) -> ConsolidationResult<(usize, usize)> {
        let batch = self.config.batch_size;
        let mut identifications = 0;
        for (attachment, table, gen) in self.dispatcher.store().pending_attachments(batch)? {
            let stats = self
                .dispatcher
                .on_identification_resolved(attachment, table)?;
            identifications += stats.scored();
            self.dispatcher
                .store()
                .mark_attachment_processed(attachment, gen)?;
        }
        let mut submissions = 0;
        for (pair, gen) in self.dispatcher.store().pending_pairs(batch)? {
            let stats = self.dispatcher.on_carga_confirmed(pair)?;
            submissions += stats.scored();
            self.dispatcher.store().mark_pair_processed(pair, gen)?;
        }
        Ok((identifications, submissions))
    }

    fn enqueue(&mut self, rebuild: bool) -> ConsolidationResult<usize> {
        let awaiting = self.dispatcher.store().pairs_awaiting_result()?;
        if rebuild {
            let n = self.queue.rebuild(&awaiting);
            info!("Work queue rebuilt with {} pairs", n);
            return Ok(n);
        }
        // Incremental pass: only resolved pairs leave the queue.
        let queued: Vec<Pair> = self.queue.items().iter().map(|item| item.pair).collect();
        for pair in queued {
            if self
                .dispatcher
                .store()
                .witness(pair, TallyKind::Total)?
                .is_some()
            {
                debug!("enqueue: {} is resolved", pair);
                self.queue.remove(pair);
            }
        }
        let mut added = 0;
        for (pair, priority) in awaiting {
            if self.queue.push(pair, priority) {
                added += 1;
            }
        }
        Ok(added)
    }
}
