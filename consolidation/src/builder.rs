pub use crate::config::*;

use log::debug;

/// A builder for submissions.
///
/// It takes care of computing the fingerprint, which is otherwise easy to get
/// out of sync with the reported values.
///
/// ```
/// use consolidation::builder::SubmissionBuilder;
/// use consolidation::*;
///
/// let first = SubmissionBuilder::new(Pair::new(1, 1), AgentId(7))
///     .votes(&[(1, 120), (2, 80)])
///     .build(SubmissionId(1));
/// let second = SubmissionBuilder::new(Pair::new(1, 1), AgentId(8))
///     .votes(&[(2, 80), (1, 120)])
///     .build(SubmissionId(2));
///
/// assert_eq!(first.fingerprint, second.fingerprint);
/// ```
pub struct SubmissionBuilder {
    pub(crate) _pair: Pair,
    pub(crate) _agent: AgentId,
    pub(crate) _kind: SubmissionKind,
    pub(crate) _origin: Origin,
    pub(crate) _timestamp: Timestamp,
    pub(crate) _votes: Vec<OptionVote>,
}

impl SubmissionBuilder {
    /// A manual total tally, with no votes yet.
    pub fn new(pair: Pair, agent: AgentId) -> SubmissionBuilder {
        SubmissionBuilder {
            _pair: pair,
            _agent: agent,
            _kind: SubmissionKind::Tally(TallyKind::Total),
            _origin: Origin::Manual,
            _timestamp: 0,
            _votes: Vec::new(),
        }
    }

    pub fn kind(self, kind: SubmissionKind) -> SubmissionBuilder {
        SubmissionBuilder {
            _kind: kind,
            ..self
        }
    }

    pub fn partial(self) -> SubmissionBuilder {
        self.kind(SubmissionKind::Tally(TallyKind::Partial))
    }

    pub fn problem(self) -> SubmissionBuilder {
        self.kind(SubmissionKind::Problem)
    }

    pub fn origin(self, origin: Origin) -> SubmissionBuilder {
        SubmissionBuilder {
            _origin: origin,
            ..self
        }
    }

    pub fn timestamp(self, timestamp: Timestamp) -> SubmissionBuilder {
        SubmissionBuilder {
            _timestamp: timestamp,
            ..self
        }
    }

    /// Replaces the votes with the given `(option, votes)` pairs.
    pub fn votes(self, votes: &[(u32, u64)]) -> SubmissionBuilder {
        SubmissionBuilder {
            _votes: votes
                .iter()
                .map(|(option, votes)| OptionVote {
                    option: OptionId(*option),
                    votes: *votes,
                })
                .collect(),
            ..self
        }
    }

    pub fn add_vote(&mut self, option: OptionId, votes: u64) {
        self._votes.push(OptionVote { option, votes });
    }

    pub fn build(self, id: SubmissionId) -> Submission {
        let votes = match self._kind {
            SubmissionKind::Tally(_) => self._votes,
            SubmissionKind::Problem => {
                if !self._votes.is_empty() {
                    debug!(
                        "build: submission {:?}: dropping {} votes from a problem report",
                        id,
                        self._votes.len()
                    );
                }
                Vec::new()
            }
        };
        let fingerprint = crate::fingerprint(&votes);
        Submission {
            id,
            pair: self._pair,
            agent: self._agent,
            kind: self._kind,
            origin: self._origin,
            votes,
            fingerprint,
            invalidated: false,
            timestamp: self._timestamp,
        }
    }
}
