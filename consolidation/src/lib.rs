mod config;
pub mod builder;
pub mod effects;
pub mod ledger;
pub mod manual;
pub mod scheduler;
pub mod store;

use log::{debug, warn};

use std::collections::{BTreeMap, BTreeSet, HashMap};

pub use crate::config::*;
use crate::store::SubmissionStore;

// **** Fingerprints and differences ****

/// Computes the fingerprint of a list of reported values.
///
/// The order in which the options are listed does not matter.
pub fn fingerprint(votes: &[OptionVote]) -> Fingerprint {
    let mut sorted: Vec<(OptionId, u64)> = votes.iter().map(|v| (v.option, v.votes)).collect();
    sorted.sort();
    let canonical: String = sorted
        .iter()
        .map(|(option, count)| format!("{}:{}|", option.0, count))
        .collect();
    Fingerprint(sha256::digest(canonical))
}

/// The numeric distance between two tallies.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Difference {
    Magnitude(u64),
    /// The tallies cannot be compared (different kinds or option sets).
    Incomparable(String),
}

impl Difference {
    pub fn magnitude_or_zero(&self) -> u64 {
        match self {
            Difference::Magnitude(m) => *m,
            Difference::Incomparable(_) => 0,
        }
    }
}

/// Cache of the per-option values of the submissions seen during one
/// reconciliation. Not meant to outlive it.
#[derive(Debug, Default)]
pub struct ReconcileContext {
    options: HashMap<SubmissionId, BTreeMap<OptionId, u64>>,
}

impl ReconcileContext {
    pub fn new() -> ReconcileContext {
        ReconcileContext::default()
    }

    fn load(&mut self, s: &Submission) {
        self.options.entry(s.id).or_insert_with(|| {
            let mut m: BTreeMap<OptionId, u64> = BTreeMap::new();
            for v in s.votes.iter() {
                *m.entry(v.option).or_insert(0) += v.votes;
            }
            m
        });
    }

    pub fn cached_submissions(&self) -> usize {
        self.options.len()
    }
}

/// Sum of the absolute per-option deltas between two tallies of the same kind.
pub fn difference(a: &Submission, b: &Submission) -> Difference {
    difference_with(&mut ReconcileContext::new(), a, b)
}

pub fn difference_with(ctx: &mut ReconcileContext, a: &Submission, b: &Submission) -> Difference {
    match (a.kind.tally_kind(), b.kind.tally_kind()) {
        (Some(ka), Some(kb)) if ka == kb => {}
        _ => {
            return Difference::Incomparable(format!(
                "submissions {} and {} have kinds {:?} and {:?}",
                a.id.0, b.id.0, a.kind, b.kind
            ));
        }
    }
    ctx.load(a);
    ctx.load(b);
    let (ma, mb) = match (ctx.options.get(&a.id), ctx.options.get(&b.id)) {
        (Some(ma), Some(mb)) => (ma, mb),
        _ => {
            return Difference::Incomparable("missing cached options".to_string());
        }
    };
    let keys_a: BTreeSet<&OptionId> = ma.keys().collect();
    let keys_b: BTreeSet<&OptionId> = mb.keys().collect();
    if keys_a != keys_b {
        let only_a: Vec<u32> = keys_a.difference(&keys_b).map(|o| o.0).collect();
        let only_b: Vec<u32> = keys_b.difference(&keys_a).map(|o| o.0).collect();
        return Difference::Incomparable(format!(
            "options only in {}: {:?}, only in {}: {:?}",
            a.id.0, only_a, b.id.0, only_b
        ));
    }
    let total: u64 = ma
        .iter()
        .map(|(option, va)| va.abs_diff(*mb.get(option).unwrap_or(&0)))
        .fold(0, u64::saturating_add);
    Difference::Magnitude(total)
}

// **** Reconciliation ****

/// How a submission relates to the witness of its pair.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Verdict {
    Agreeing(SubmissionRef),
    /// `difference` is zero when the tallies could not be compared.
    Disagreeing {
        submission: SubmissionRef,
        difference: u64,
    },
    ProblemOnConfirmed(SubmissionRef),
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Reconciliation {
    pub pair: Pair,
    pub kind: TallyKind,
    pub witness: SubmissionRef,
    pub verdicts: Vec<Verdict>,
}

impl Reconciliation {
    pub fn agreeing(&self) -> usize {
        self.verdicts
            .iter()
            .filter(|v| matches!(v, Verdict::Agreeing(_)))
            .count()
    }

    pub fn disagreeing(&self) -> usize {
        self.verdicts
            .iter()
            .filter(|v| matches!(v, Verdict::Disagreeing { .. }))
            .count()
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Outcome {
    /// All the submissions of the witness kind match the witness.
    Confirmed(Reconciliation),
    /// At least one submission of the witness kind diverges from it.
    Conflict(Reconciliation),
    /// No witness yet, but some agents reported a problem.
    ProblemReported(Vec<SubmissionRef>),
    NoData,
}

impl Outcome {
    pub fn reconciliation(&self) -> Option<&Reconciliation> {
        match self {
            Outcome::Confirmed(r) | Outcome::Conflict(r) => Some(r),
            Outcome::ProblemReported(_) | Outcome::NoData => None,
        }
    }
}

/// Reconciles the submissions of a pair against its witness, as recorded in the store.
///
/// The total witness takes precedence over the partial one. The store is only read.
pub fn reconcile<S: SubmissionStore + ?Sized>(
    store: &S,
    pair: Pair,
    ctx: &mut ReconcileContext,
) -> ConsolidationResult<Outcome> {
    let submissions = store.submissions_for_pair(pair)?;
    let mut witness: Option<(TallyKind, SubmissionId)> = None;
    for kind in [TallyKind::Total, TallyKind::Partial] {
        if let Some(wid) = store.witness(pair, kind)? {
            witness = Some((kind, wid));
            break;
        }
    }
    Ok(reconcile_submissions(pair, &submissions, witness, ctx))
}

/// Classifies the given submissions against a witness.
///
/// Invalidated submissions are skipped. A witness that is not among the valid
/// submissions is treated as absent.
pub fn reconcile_submissions(
    pair: Pair,
    submissions: &[Submission],
    witness: Option<(TallyKind, SubmissionId)>,
    ctx: &mut ReconcileContext,
) -> Outcome {
    let valid: Vec<&Submission> = submissions
        .iter()
        .filter(|s| !s.invalidated && s.pair == pair)
        .collect();
    debug!(
        "reconcile: {}: {} valid submissions, witness {:?}",
        pair,
        valid.len(),
        witness
    );

    let witness_sub: Option<(TallyKind, &Submission)> = witness.and_then(|(kind, wid)| {
        let found = valid
            .iter()
            .find(|s| s.id == wid && s.kind == SubmissionKind::Tally(kind))
            .copied();
        if found.is_none() {
            debug!(
                "reconcile: {}: witness {:?} is not a valid {:?} submission, ignoring it",
                pair, wid, kind
            );
        }
        found.map(|s| (kind, s))
    });

    let (kind, w) = match witness_sub {
        Some(x) => x,
        None => {
            let problems: Vec<SubmissionRef> = valid
                .iter()
                .filter(|s| s.kind == SubmissionKind::Problem)
                .map(|s| SubmissionRef::from(*s))
                .collect();
            return if problems.is_empty() {
                Outcome::NoData
            } else {
                Outcome::ProblemReported(problems)
            };
        }
    };

    let mut verdicts: Vec<Verdict> = Vec::new();
    for s in valid.iter().filter(|s| s.id != w.id) {
        match s.kind {
            SubmissionKind::Tally(k) if k == kind => {
                if s.fingerprint == w.fingerprint {
                    verdicts.push(Verdict::Agreeing(SubmissionRef::from(*s)));
                } else {
                    let difference = match difference_with(ctx, w, s) {
                        Difference::Magnitude(m) => m,
                        Difference::Incomparable(reason) => {
                            warn!(
                                "reconcile: {}: cannot compute the difference with the witness, using 0: {}",
                                pair, reason
                            );
                            0
                        }
                    };
                    verdicts.push(Verdict::Disagreeing {
                        submission: SubmissionRef::from(*s),
                        difference,
                    });
                }
            }
            // The other tally kind has a witness of its own.
            SubmissionKind::Tally(_) => {}
            SubmissionKind::Problem => {
                verdicts.push(Verdict::ProblemOnConfirmed(SubmissionRef::from(*s)));
            }
        }
    }

    let reconciliation = Reconciliation {
        pair,
        kind,
        witness: SubmissionRef::from(w),
        verdicts,
    };
    if reconciliation.disagreeing() > 0 {
        Outcome::Conflict(reconciliation)
    } else {
        Outcome::Confirmed(reconciliation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SubmissionBuilder;

    fn pair() -> Pair {
        Pair::new(10, 1)
    }

    fn total(id: u64, agent: u32, votes: &[(u32, u64)]) -> Submission {
        SubmissionBuilder::new(pair(), AgentId(agent))
            .votes(votes)
            .build(SubmissionId(id))
    }

    #[test]
    fn fingerprint_ignores_option_order() {
        let a = total(1, 1, &[(1, 10), (2, 20), (3, 0)]);
        let b = total(2, 2, &[(3, 0), (1, 10), (2, 20)]);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint, fingerprint(&a.votes));
    }

    #[test]
    fn fingerprint_detects_any_change() {
        let a = total(1, 1, &[(1, 10), (2, 20)]);
        let b = total(2, 1, &[(1, 10), (2, 21)]);
        let c = total(3, 1, &[(1, 20), (2, 10)]);
        let d = total(4, 1, &[(1, 10), (2, 20), (3, 0)]);
        assert_ne!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_ne!(a.fingerprint, d.fingerprint);
    }

    #[test]
    fn difference_is_symmetric() {
        let a = total(1, 1, &[(1, 10), (2, 20), (3, 5)]);
        let b = total(2, 2, &[(1, 12), (2, 17), (3, 5)]);
        assert_eq!(difference(&a, &b), Difference::Magnitude(5));
        assert_eq!(difference(&a, &b), difference(&b, &a));
        assert_eq!(difference(&a, &a), Difference::Magnitude(0));
    }

    #[test]
    fn difference_saturates() {
        let a = total(1, 1, &[(1, 0), (2, 0)]);
        let b = total(2, 2, &[(1, u64::MAX), (2, u64::MAX)]);
        assert_eq!(difference(&a, &b), Difference::Magnitude(u64::MAX));
    }

    #[test]
    fn difference_of_incompatible_options_is_zero() {
        let a = total(1, 1, &[(1, 10), (2, 20)]);
        let b = total(2, 2, &[(1, 10), (3, 20)]);
        let d = difference(&a, &b);
        assert!(matches!(d, Difference::Incomparable(_)));
        assert_eq!(d.magnitude_or_zero(), 0);

        let p = SubmissionBuilder::new(pair(), AgentId(3))
            .partial()
            .votes(&[(1, 10), (2, 20)])
            .build(SubmissionId(3));
        assert_eq!(difference(&a, &p).magnitude_or_zero(), 0);
    }

    #[test]
    fn context_caches_each_submission_once() {
        let a = total(1, 1, &[(1, 10)]);
        let b = total(2, 2, &[(1, 11)]);
        let c = total(3, 3, &[(1, 13)]);
        let mut ctx = ReconcileContext::new();
        difference_with(&mut ctx, &a, &b);
        difference_with(&mut ctx, &a, &c);
        assert_eq!(ctx.cached_submissions(), 3);
    }

    #[test]
    fn classify_agreeing_and_disagreeing() {
        let subs = vec![
            total(1, 1, &[(1, 100), (2, 50)]),
            total(2, 2, &[(1, 100), (2, 50)]),
            total(3, 3, &[(1, 100), (2, 50)]),
            total(4, 4, &[(1, 98), (2, 50)]),
            total(5, 5, &[(1, 100), (2, 57)]),
        ];
        let outcome = reconcile_submissions(
            pair(),
            &subs,
            Some((TallyKind::Total, SubmissionId(1))),
            &mut ReconcileContext::new(),
        );
        let r = match outcome {
            Outcome::Conflict(r) => r,
            x => panic!("unexpected outcome {:?}", x),
        };
        assert_eq!(r.witness.id, SubmissionId(1));
        assert_eq!(r.agreeing(), 2);
        assert_eq!(r.disagreeing(), 2);
        let diffs: Vec<(SubmissionId, u64)> = r
            .verdicts
            .iter()
            .filter_map(|v| match v {
                Verdict::Disagreeing {
                    submission,
                    difference,
                } => Some((submission.id, *difference)),
                _ => None,
            })
            .collect();
        assert_eq!(diffs, vec![(SubmissionId(4), 2), (SubmissionId(5), 7)]);
    }

    #[test]
    fn problem_on_confirmed_pair() {
        let subs = vec![
            total(1, 1, &[(1, 100)]),
            SubmissionBuilder::new(pair(), AgentId(2))
                .problem()
                .build(SubmissionId(2)),
        ];
        let outcome = reconcile_submissions(
            pair(),
            &subs,
            Some((TallyKind::Total, SubmissionId(1))),
            &mut ReconcileContext::new(),
        );
        match outcome {
            Outcome::Confirmed(r) => {
                assert_eq!(
                    r.verdicts,
                    vec![Verdict::ProblemOnConfirmed(SubmissionRef {
                        id: SubmissionId(2),
                        agent: AgentId(2)
                    })]
                );
            }
            x => panic!("unexpected outcome {:?}", x),
        }
    }

    #[test]
    fn other_kind_is_ignored() {
        let subs = vec![
            total(1, 1, &[(1, 100), (2, 3)]),
            SubmissionBuilder::new(pair(), AgentId(2))
                .partial()
                .votes(&[(1, 100)])
                .build(SubmissionId(2)),
        ];
        let outcome = reconcile_submissions(
            pair(),
            &subs,
            Some((TallyKind::Total, SubmissionId(1))),
            &mut ReconcileContext::new(),
        );
        match outcome {
            Outcome::Confirmed(r) => assert!(r.verdicts.is_empty()),
            x => panic!("unexpected outcome {:?}", x),
        }
    }

    #[test]
    fn no_witness_never_invents_one() {
        let mut subs = vec![total(1, 1, &[(1, 100)]), total(2, 2, &[(1, 100)])];
        let mut ctx = ReconcileContext::new();
        assert_eq!(
            reconcile_submissions(pair(), &subs, None, &mut ctx),
            Outcome::NoData
        );
        subs.push(
            SubmissionBuilder::new(pair(), AgentId(3))
                .problem()
                .build(SubmissionId(3)),
        );
        match reconcile_submissions(pair(), &subs, None, &mut ctx) {
            Outcome::ProblemReported(p) => assert_eq!(p.len(), 1),
            x => panic!("unexpected outcome {:?}", x),
        }
    }

    #[test]
    fn invalidated_witness_is_absent() {
        let mut w = total(1, 1, &[(1, 100)]);
        w.invalidated = true;
        let subs = vec![w, total(2, 2, &[(1, 90)])];
        let outcome = reconcile_submissions(
            pair(),
            &subs,
            Some((TallyKind::Total, SubmissionId(1))),
            &mut ReconcileContext::new(),
        );
        assert_eq!(outcome, Outcome::NoData);
    }
}
