// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;
use std::time::Duration;

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct TableId(pub u32);

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct CategoryId(pub u32);

/// A choice on the ballot of a category (a party list, blank votes, null votes, ...).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct OptionId(pub u32);

/// The person (data entry user, party observer, CSV uploader) behind a submission.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct AgentId(pub u32);

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct SubmissionId(pub u64);

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct IdentificationId(pub u64);

/// A photographed or scanned tally sheet.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct AttachmentId(pub u64);

/// A problem report filed by an agent, as tracked by the reviewers.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct ProblemId(pub u64);

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Stamp of a pending work item. A new stamp is taken every time the item
/// becomes pending again.
pub type Generation = u64;

/// The unit of tallying: one category's results at one polling table.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct Pair {
    pub table: TableId,
    pub category: CategoryId,
}

impl Pair {
    pub fn new(table: u32, category: u32) -> Pair {
        Pair {
            table: TableId(table),
            category: CategoryId(category),
        }
    }
}

impl Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "table {} / category {}", self.table.0, self.category.0)
    }
}

/// The two flavours of tally that can become a witness.
///
/// A partial tally only covers the main options (the ones needed for the
/// early results), a total tally covers every option of the category.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum TallyKind {
    Total,
    Partial,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum SubmissionKind {
    Tally(TallyKind),
    /// The agent could not load the tally and reported a problem instead.
    Problem,
}

impl SubmissionKind {
    pub fn tally_kind(&self) -> Option<TallyKind> {
        match self {
            SubmissionKind::Tally(k) => Some(*k),
            SubmissionKind::Problem => None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Origin {
    Manual,
    Csv,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct OptionVote {
    pub option: OptionId,
    pub votes: u64,
}

/// Digest of the reported values of a submission.
///
/// Two submissions have the same fingerprint if and only if they report the
/// same number of votes for the same options.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct Fingerprint(pub String);

/// A reported tally ("carga").
///
/// Only the `invalidated` flag may change after creation.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Submission {
    pub id: SubmissionId,
    pub pair: Pair,
    pub agent: AgentId,
    pub kind: SubmissionKind,
    pub origin: Origin,
    pub votes: Vec<OptionVote>,
    pub fingerprint: Fingerprint,
    pub invalidated: bool,
    pub timestamp: Timestamp,
}

/// Lightweight handle on a submission, as carried by the verdicts.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct SubmissionRef {
    pub id: SubmissionId,
    pub agent: AgentId,
}

impl From<&Submission> for SubmissionRef {
    fn from(s: &Submission) -> SubmissionRef {
        SubmissionRef {
            id: s.id,
            agent: s.agent,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum IdentificationStatus {
    Identified(TableId),
    Pending,
    Problem,
}

/// A claim by an agent that an attachment is the tally sheet of a table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Identification {
    pub id: IdentificationId,
    pub attachment: AttachmentId,
    pub agent: AgentId,
    pub status: IdentificationStatus,
    pub invalidated: bool,
    pub timestamp: Timestamp,
}

// ******** Trust ledger structures *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum TrustReason {
    DisagreementWithWitness,
    AgreementWithWitness,
    ProblemOnConfirmedPair,
    DiscardedProblemReport,
    ManualOverride,
}

/// What triggered a trust event.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum EventRef {
    Submission(SubmissionId),
    Identification(IdentificationId),
    Problem(ProblemId),
    Manual,
}

/// One scoring adjustment. Positive magnitudes increase distrust.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TrustEvent {
    pub seq: u64,
    pub agent: AgentId,
    pub magnitude: i64,
    pub reason: TrustReason,
    pub reference: EventRef,
    pub timestamp: Timestamp,
}

// ******** Output data structures *********

/// Counters returned by a bulk invalidation.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct InvalidationStats {
    pub submissions: usize,
    pub identifications: usize,
}

impl InvalidationStats {
    pub fn is_empty(&self) -> bool {
        self.submissions == 0 && self.identifications == 0
    }
}

/// What a scheduler cycle did, for observability.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct CycleReport {
    pub tasks_enqueued: usize,
    pub submissions_processed: usize,
    pub identifications_processed: usize,
    pub rebuilt: bool,
}

/// Errors surfaced by the store or by an invalid configuration.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ConsolidationError {
    StoreUnavailable(String),
    UnknownPair(Pair),
    UnknownAttachment(AttachmentId),
    InvalidConfig(String),
}

impl Error for ConsolidationError {}

impl Display for ConsolidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsolidationError::StoreUnavailable(msg) => write!(f, "store unavailable: {}", msg),
            ConsolidationError::UnknownPair(pair) => write!(f, "unknown pair: {}", pair),
            ConsolidationError::UnknownAttachment(a) => write!(f, "unknown attachment: {}", a.0),
            ConsolidationError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

pub type ConsolidationResult<T> = Result<T, ConsolidationError>;

// ********* Configuration **********

/// Magnitudes of the trust adjustments.
///
/// Disagreements with a witness tally are charged with the computed
/// difference between both tallies, so they have no entry here.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ScoringConfig {
    /// Charged when an identification points to another table than the confirmed one.
    pub identification_mismatch: u64,
    /// Credited for a tally or identification that matches the confirmed one.
    pub correct_action_discount: u64,
    /// Charged for a problem report on a pair that already has a witness.
    pub problem_on_confirmed: u64,
    /// Charged when a reviewer discards a problem report.
    pub discarded_problem: u64,
    /// Score from which an agent is flagged automatically. `None` disables it.
    pub untrustworthy_threshold: Option<i64>,
}

impl ScoringConfig {
    pub const DEFAULT_SCORING: ScoringConfig = ScoringConfig {
        identification_mismatch: 200,
        correct_action_discount: 10,
        problem_on_confirmed: 200,
        discarded_problem: 200,
        untrustworthy_threshold: Some(500),
    };
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of pairs (and of attachments) consolidated per cycle.
    pub batch_size: usize,
    /// The work queue is rebuilt from scratch every that many cycles.
    pub rounds_before_rebuild: u32,
    pub pause: Duration,
    pub run_consolidation: bool,
}

impl SchedulerConfig {
    pub const DEFAULT_SCHEDULER: SchedulerConfig = SchedulerConfig {
        batch_size: 500,
        rounds_before_rebuild: 100,
        pause: Duration::from_secs(5),
        run_consolidation: true,
    };

    pub fn validate(&self) -> ConsolidationResult<()> {
        if self.batch_size == 0 {
            return Err(ConsolidationError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.rounds_before_rebuild == 0 {
            return Err(ConsolidationError::InvalidConfig(
                "rounds_before_rebuild must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
