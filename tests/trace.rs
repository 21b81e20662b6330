#![deny(warnings, rust_2018_idioms)]

use weft::{
    fork, new_empty_cvar, put_cvar, read_cvar, run, take_cvar, Decision, LeastId, Lookahead,
    Program, Random, Scheduler, ThreadAction, ThreadId, TraceEntry,
};

fn ping() -> Program<u32> {
    new_empty_cvar::<u32>().and_then(|var| fork(put_cvar(var, 42)).and_then(move |_| take_cvar(var)))
}

fn contended() -> Program<u32> {
    new_empty_cvar::<u32>().and_then(|var| {
        new_empty_cvar::<u32>().and_then(move |done| {
            fork(take_cvar(var).map(|_| ()))
                .then(fork(take_cvar(var).map(|_| ())))
                .then(fork(read_cvar(var).map(|_| ())))
                .then(fork(put_cvar(var, 9).then(put_cvar(done, 1))))
                .then(take_cvar(done))
        })
    })
}

#[test]
fn identical_runs_produce_identical_traces() {
    let (first_result, _, first_trace) = run(LeastId::default(), contended());
    let (second_result, _, second_trace) = run(LeastId::default(), contended());

    assert_eq!(first_result, second_result);
    assert_eq!(first_trace, second_trace);

    for seed in [0u64, 7, 42] {
        let (first_result, _, first_trace) = run(Random::seeded(seed), contended());
        let (second_result, _, second_trace) = run(Random::seeded(seed), contended());

        assert_eq!(first_result, second_result, "seed {}", seed);
        assert_eq!(first_trace, second_trace, "seed {}", seed);
    }
}

#[test]
fn ping_records_every_decision_and_alternative() {
    let (result, _, trace) = run(LeastId::default(), ping());

    assert_eq!(result, Ok(42));

    let main = match trace[0].decision {
        Decision::Start(main) => main,
        other => panic!("expected Start, got {:?}", other),
    };
    let var = match trace[0].action {
        ThreadAction::New(var) => var,
        ref other => panic!("expected New, got {:?}", other),
    };
    let child = match trace[1].action {
        ThreadAction::Fork(child) => child,
        ref other => panic!("expected Fork, got {:?}", other),
    };

    let expected = vec![
        TraceEntry {
            decision: Decision::Start(main),
            alternatives: vec![],
            action: ThreadAction::New(var),
        },
        TraceEntry {
            decision: Decision::Continue,
            alternatives: vec![],
            action: ThreadAction::Fork(child),
        },
        TraceEntry {
            decision: Decision::Continue,
            alternatives: vec![(Decision::SwitchTo(child), vec![Lookahead::WillPut(var)])],
            action: ThreadAction::BlockedTake(var),
        },
        TraceEntry {
            decision: Decision::Start(child),
            alternatives: vec![],
            action: ThreadAction::Put(var, vec![main]),
        },
        TraceEntry {
            decision: Decision::SwitchTo(main),
            alternatives: vec![(Decision::Continue, vec![Lookahead::WillStop])],
            action: ThreadAction::Take(var, vec![]),
        },
        TraceEntry {
            decision: Decision::Continue,
            alternatives: vec![(Decision::SwitchTo(child), vec![Lookahead::WillStop])],
            action: ThreadAction::Stop,
        },
    ];

    assert_eq!(trace, expected);
}

/// Remembers the lookahead of every thread it schedules, so each trace
/// entry can be checked against what the scheduler was promised.
#[derive(Default)]
struct Recording {
    inner: LeastId,
    seen: Vec<Vec<Lookahead>>,
}

impl Scheduler for Recording {
    fn schedule(
        &mut self,
        last: Option<&(ThreadId, ThreadAction)>,
        runnable: &[(ThreadId, Vec<Lookahead>)],
    ) -> ThreadId {
        let chosen = self.inner.schedule(last, runnable);
        let lookahead = runnable
            .iter()
            .find(|(id, _)| *id == chosen)
            .expect("chose an unknown thread")
            .1
            .clone();
        self.seen.push(lookahead);
        chosen
    }
}

fn consistent(lookahead: &Lookahead, action: &ThreadAction) -> bool {
    match (lookahead, action) {
        (Lookahead::WillFork, ThreadAction::Fork(..)) => true,
        (Lookahead::WillMyThreadId, ThreadAction::MyThreadId) => true,
        (Lookahead::WillNew, ThreadAction::New(..)) => true,
        (Lookahead::WillPut(v), ThreadAction::Put(w, _))
        | (Lookahead::WillPut(v), ThreadAction::BlockedPut(w)) => v == w,
        (Lookahead::WillTryPut(v), ThreadAction::TryPut(w, ..)) => v == w,
        (Lookahead::WillRead(v), ThreadAction::Read(w))
        | (Lookahead::WillRead(v), ThreadAction::BlockedRead(w)) => v == w,
        (Lookahead::WillTake(v), ThreadAction::Take(w, _))
        | (Lookahead::WillTake(v), ThreadAction::BlockedTake(w)) => v == w,
        (Lookahead::WillTryTake(v), ThreadAction::TryTake(w, ..)) => v == w,
        (Lookahead::WillNewRef, ThreadAction::NewRef(..)) => true,
        (Lookahead::WillReadRef(r), ThreadAction::ReadRef(s)) => r == s,
        (Lookahead::WillModRef(r), ThreadAction::ModRef(s)) => r == s,
        (Lookahead::WillLift, ThreadAction::Lift) => true,
        (Lookahead::WillStm, ThreadAction::Stm(..))
        | (Lookahead::WillStm, ThreadAction::BlockedStm) => true,
        (Lookahead::WillThrow, ThreadAction::Throw)
        | (Lookahead::WillThrow, ThreadAction::Killed) => true,
        (Lookahead::WillThrowTo(t), ThreadAction::ThrowTo(u))
        | (Lookahead::WillThrowTo(t), ThreadAction::BlockedThrowTo(u)) => t == u,
        (Lookahead::WillCatching, ThreadAction::Catching) => true,
        (Lookahead::WillPopCatching, ThreadAction::PopCatching) => true,
        (Lookahead::WillSetMasking(m), ThreadAction::SetMasking(n)) => m == n,
        (Lookahead::WillResetMasking(m), ThreadAction::ResetMasking(n)) => m == n,
        (Lookahead::WillNoTest, ThreadAction::NoTest) => true,
        (Lookahead::WillKnowsAbout, ThreadAction::KnowsAbout) => true,
        (Lookahead::WillForgets, ThreadAction::Forgets) => true,
        (Lookahead::WillAllKnown, ThreadAction::AllKnown) => true,
        (Lookahead::WillStop, ThreadAction::Stop) => true,
        _ => false,
    }
}

#[test]
fn lookahead_predicts_every_action() {
    let (result, scheduler, trace) = run(Recording::default(), contended());

    assert_eq!(result, Ok(1));
    assert_eq!(scheduler.seen.len(), trace.len());

    for (lookahead, entry) in scheduler.seen.iter().zip(&trace) {
        // Exactly the head of the lookahead chain executes in one step.
        assert!(
            consistent(&lookahead[0], &entry.action),
            "lookahead {:?} does not cover action {:?}",
            lookahead,
            entry.action
        );
    }
}

#[test]
fn filling_wakes_every_taker_and_reader() {
    let (result, _, trace) = run(LeastId::default(), contended());

    assert_eq!(result, Ok(1));

    let forked: Vec<ThreadId> = trace
        .iter()
        .filter_map(|entry| match entry.action {
            ThreadAction::Fork(id) => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(forked.len(), 4);

    // The fill that ends the wait wakes both takers and the reader, in
    // blocking order, and nobody else.
    let woken = trace
        .iter()
        .find_map(|entry| match &entry.action {
            ThreadAction::Put(_, woken) if !woken.is_empty() => Some(woken.clone()),
            _ => None,
        })
        .expect("no fill woke anybody");
    assert_eq!(woken, vec![forked[0], forked[1], forked[2]]);

    // The losers of the wakeup race block again.
    let reblocked = trace
        .iter()
        .filter(|entry| {
            matches!(
                entry.action,
                ThreadAction::BlockedTake(..) | ThreadAction::BlockedRead(..)
            )
        })
        .count();
    assert!(reblocked >= 4);
}

/// Keeps demanding the first thread it ever saw, even once that thread has
/// blocked.
#[derive(Default)]
struct Stale {
    first: Option<ThreadId>,
}

impl Scheduler for Stale {
    fn schedule(
        &mut self,
        _last: Option<&(ThreadId, ThreadAction)>,
        runnable: &[(ThreadId, Vec<Lookahead>)],
    ) -> ThreadId {
        let min = runnable[0].0;
        *self.first.get_or_insert(min)
    }
}

#[test]
fn invalid_scheduler_choice_is_an_internal_error() {
    let (result, _, trace) = run(Stale::default(), ping());

    assert_eq!(result, Err(weft::Failure::InternalError));

    // The trace ends with the last valid step: the main thread blocking,
    // which is what forced the scheduler to pick somebody else.
    assert!(matches!(
        trace.last().unwrap().action,
        ThreadAction::BlockedTake(..)
    ));
}
