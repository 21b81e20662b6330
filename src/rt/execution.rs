//! The world of a run and the driver loop that advances it.

use std::collections::HashMap;
use std::mem;

use tracing::trace;

use crate::program::Exception;
use crate::rt::action::{Action, Kont, Value};
use crate::rt::cvar::CVar;
use crate::rt::ident::{CVarId, IdSource, ThreadId, TxVarId};
use crate::rt::thread::{self, Blocking, Cause, Frame, State, Thread};
use crate::sched::{LeastId, Scheduler};
use crate::stm::{self, Commit};
use crate::substrate::Substrate;
use crate::trace::{Decision, Failure, Lookahead, Mask, ThreadAction, Trace, TraceEntry};

/// The interpreter's entire mutable state. Created by the driver, mutated
/// only by the driver, dropped at termination.
pub(crate) struct Execution {
    pub(crate) ids: IdSource,

    pub(crate) threads: thread::Set,

    pub(crate) cvars: HashMap<CVarId, CVar>,

    pub(crate) txvars: stm::Store,

    /// One entry per scheduler invocation.
    pub(crate) trace: Trace,

    /// The previous step's decision, as shown to the scheduler.
    pub(crate) last: Option<(ThreadId, ThreadAction)>,

    pub(crate) step_no: usize,

    /// The main thread's result, stashed when it executes `Stop`.
    pub(crate) result: Option<Value>,
}

impl Execution {
    /// A fresh world whose main thread runs `main`.
    pub(crate) fn new(main: Action) -> Execution {
        Execution::with_ids(main, IdSource::new())
    }

    /// A nested world (for opaque sub-computations). Identifier counters
    /// continue from the outer world so ids stay globally fresh; the caller
    /// syncs them back afterwards.
    fn with_ids(main: Action, ids: IdSource) -> Execution {
        Execution {
            ids,
            threads: thread::Set::new(main),
            cvars: HashMap::new(),
            txvars: stm::Store::new(),
            trace: Trace::new(),
            last: None,
            step_no: 0,
            result: None,
        }
    }

    /// Drive the world to termination, one action per step.
    pub(crate) fn run<S, H>(&mut self, sched: &mut S, host: &mut H) -> Result<Value, Failure>
    where
        S: Scheduler,
        H: Substrate,
    {
        loop {
            // The run ends the moment the main thread does; surviving
            // threads are abandoned like daemon threads.
            match &self.threads.main().state {
                State::Terminated(Cause::Stopped) => {
                    return Ok(self.result.take().expect("main thread stopped twice"));
                }
                State::Terminated(Cause::Killed) => {
                    return Err(Failure::UncaughtException);
                }
                _ => {}
            }

            let runnable = self.runnable();
            if runnable.is_empty() {
                return Err(self.diagnose_blocked());
            }

            let chosen = sched.schedule(self.last.as_ref(), &runnable);
            if !runnable.iter().any(|(id, _)| *id == chosen) {
                trace!(thread = %chosen, "scheduler chose a non-runnable thread");
                return Err(Failure::InternalError);
            }

            let decision = self.decide(chosen);
            let alternatives = runnable
                .iter()
                .filter(|(id, _)| *id != chosen)
                .map(|(id, lookahead)| (self.decide(*id), lookahead.clone()))
                .collect();

            let action = self.step(host, chosen)?;

            trace!(step = self.step_no, thread = %chosen, ?decision, ?action, "step");

            self.trace.push(TraceEntry {
                decision,
                alternatives,
                action: action.clone(),
            });
            self.last = Some((chosen, action));
            self.step_no += 1;

            self.wake_throwers();
        }
    }

    /// The runnable threads in id order, each with its lookahead. Peeks at
    /// continuations only; never mutates the world.
    fn runnable(&self) -> Vec<(ThreadId, Vec<Lookahead>)> {
        self.threads
            .iter()
            .filter(|th| th.is_runnable())
            .map(|th| {
                let lookahead = if deliverable(th) {
                    vec![Lookahead::WillThrow]
                } else {
                    th.cont
                        .as_ref()
                        .expect("runnable thread without continuation")
                        .lookahead()
                };
                (th.id, lookahead)
            })
            .collect()
    }

    /// Classify scheduling `id` now, relative to the previous decision.
    fn decide(&self, id: ThreadId) -> Decision {
        match &self.last {
            None => Decision::Start(id),
            Some((prev, _)) if *prev == id => Decision::Continue,
            Some((prev, _)) if self.threads[*prev].is_runnable() => Decision::SwitchTo(id),
            Some(_) => Decision::Start(id),
        }
    }

    /// No thread is runnable: every live thread is blocked. STM-only
    /// blocking gets its own diagnosis.
    fn diagnose_blocked(&self) -> Failure {
        let cvar_blocked = self.threads.iter().any(|th| match &th.state {
            State::Blocked(Blocking::Stm(..)) => false,
            State::Blocked(..) => true,
            _ => false,
        });

        if cvar_blocked {
            Failure::Deadlock
        } else {
            Failure::StmDeadlock
        }
    }

    /// Execute exactly one action of thread `tid`.
    fn step<H: Substrate>(&mut self, host: &mut H, tid: ThreadId) -> Result<ThreadAction, Failure> {
        // A deliverable pending exception replaces the step: the suspended
        // action is abandoned and the handler stack unwinds instead.
        if deliverable(&self.threads[tid]) {
            let exc = self.threads[tid].pending.take().unwrap();
            self.threads[tid].cont = None;
            return Ok(self.raise(tid, exc));
        }

        let action = self.threads[tid]
            .cont
            .take()
            .expect("runnable thread without continuation");

        match action {
            Action::Fork { child, k } => {
                let mask = self.threads[tid].mask;
                let id = self.ids.fresh_thread();
                let cont = child(crate::program::restore(mask, mask));
                self.threads.add(Thread::new(id, cont, mask));
                self.resume(tid, k(id));
                Ok(ThreadAction::Fork(id))
            }

            Action::MyThreadId { k } => {
                self.resume(tid, k(tid));
                Ok(ThreadAction::MyThreadId)
            }

            Action::New { k } => {
                let id = self.ids.fresh_cvar();
                self.cvars.insert(id, CVar::new());
                self.resume(tid, k(id));
                Ok(ThreadAction::New(id))
            }

            Action::Put { cvar, value, k } => {
                let var = self.cvars.get_mut(&cvar).expect("unknown cvar");
                match var.put(value) {
                    Ok(raw) => {
                        let woken = self.wake_consumers(cvar, raw);
                        self.resume(tid, *k);
                        Ok(ThreadAction::Put(cvar, woken))
                    }
                    Err(value) => {
                        var.block_putter(tid);
                        self.block(tid, Blocking::Put(cvar), Action::Put { cvar, value, k });
                        Ok(ThreadAction::BlockedPut(cvar))
                    }
                }
            }

            Action::TryPut { cvar, value, k } => {
                let var = self.cvars.get_mut(&cvar).expect("unknown cvar");
                match var.put(value) {
                    Ok(raw) => {
                        let woken = self.wake_consumers(cvar, raw);
                        self.resume(tid, k(true));
                        Ok(ThreadAction::TryPut(cvar, true, woken))
                    }
                    Err(_) => {
                        self.resume(tid, k(false));
                        Ok(ThreadAction::TryPut(cvar, false, Vec::new()))
                    }
                }
            }

            Action::Read { cvar, k } => {
                let var = self.cvars.get_mut(&cvar).expect("unknown cvar");
                match var.read() {
                    Some(value) => {
                        self.resume(tid, k(value));
                        Ok(ThreadAction::Read(cvar))
                    }
                    None => {
                        var.block_reader(tid);
                        self.block(tid, Blocking::Read(cvar), Action::Read { cvar, k });
                        Ok(ThreadAction::BlockedRead(cvar))
                    }
                }
            }

            Action::Take { cvar, k } => {
                let var = self.cvars.get_mut(&cvar).expect("unknown cvar");
                match var.take() {
                    Some((value, raw)) => {
                        let woken = self.wake_producers(cvar, raw);
                        self.resume(tid, k(value));
                        Ok(ThreadAction::Take(cvar, woken))
                    }
                    None => {
                        var.block_taker(tid);
                        self.block(tid, Blocking::Take(cvar), Action::Take { cvar, k });
                        Ok(ThreadAction::BlockedTake(cvar))
                    }
                }
            }

            Action::TryTake { cvar, k } => {
                let var = self.cvars.get_mut(&cvar).expect("unknown cvar");
                match var.take() {
                    Some((value, raw)) => {
                        let woken = self.wake_producers(cvar, raw);
                        self.resume(tid, k(Some(value)));
                        Ok(ThreadAction::TryTake(cvar, true, woken))
                    }
                    None => {
                        self.resume(tid, k(None));
                        Ok(ThreadAction::TryTake(cvar, false, Vec::new()))
                    }
                }
            }

            Action::NewRef { value, k } => {
                let id = self.ids.fresh_cref();
                host.host().alloc_ref(id, value);
                self.resume(tid, k(id));
                Ok(ThreadAction::NewRef(id))
            }

            Action::ReadRef { cref, k } => {
                let value = host.host().read_ref(cref);
                self.resume(tid, k(value));
                Ok(ThreadAction::ReadRef(cref))
            }

            Action::ModRef { cref, f, k } => {
                let (stored, returned) = f(host.host().read_ref(cref));
                host.host().write_ref(cref, stored);
                self.resume(tid, k(returned));
                Ok(ThreadAction::ModRef(cref))
            }

            Action::Lift { eff } => {
                let next = host.host().lift(eff);
                self.resume(tid, next);
                Ok(ThreadAction::Lift)
            }

            Action::Atom { mut tx, k } => {
                match stm::attempt(&mut tx, &mut self.txvars, &mut self.ids) {
                    Commit::Done { value, written } => {
                        let woken = self.wake_stm(&written);
                        self.resume(tid, k(value));
                        Ok(ThreadAction::Stm(woken))
                    }
                    Commit::Retry { watch } => {
                        self.block(tid, Blocking::Stm(watch), Action::Atom { tx, k });
                        Ok(ThreadAction::BlockedStm)
                    }
                }
            }

            Action::Throw { exc } => Ok(self.raise(tid, exc)),

            Action::ThrowTo { target, exc, k } => {
                let ready = {
                    let th = &self.threads[target];
                    th.is_terminated() || (th.pending.is_none() && th.interruptible())
                };

                if ready {
                    let th = &mut self.threads[target];
                    if !th.is_terminated() {
                        th.pending = Some(exc);
                        th.set_runnable();
                    }
                    self.resume(tid, *k);
                    Ok(ThreadAction::ThrowTo(target))
                } else {
                    self.block(
                        tid,
                        Blocking::ThrowTo(target),
                        Action::ThrowTo { target, exc, k },
                    );
                    Ok(ThreadAction::BlockedThrowTo(target))
                }
            }

            Action::Catching { handler, body, k } => {
                let mask = self.threads[tid].mask;
                self.threads[tid].frames.push(Frame { handler, k, mask });
                self.resume(tid, *body);
                Ok(ThreadAction::Catching)
            }

            Action::PopCatching { result } => {
                let frame = self.threads[tid]
                    .frames
                    .pop()
                    .expect("left a handler scope that was never entered");
                self.resume(tid, (frame.k)(result));
                Ok(ThreadAction::PopCatching)
            }

            Action::Masking { mask, body, k } => {
                let outer = self.threads[tid].mask;
                self.threads[tid].mask = mask;

                let reset: Kont = Box::new(move |v| Action::ResetMask {
                    restore: false,
                    mask: outer,
                    k: Box::new(k(v)),
                });
                self.resume(tid, body(crate::program::restore(outer, mask), reset));
                Ok(ThreadAction::SetMasking(mask))
            }

            Action::ResetMask { restore, mask, k } => {
                self.threads[tid].mask = mask;
                self.resume(tid, *k);
                Ok(if restore {
                    ThreadAction::SetMasking(mask)
                } else {
                    ThreadAction::ResetMasking(mask)
                })
            }

            Action::NoTest { body, k } => {
                let ids = mem::take(&mut self.ids);
                let mut nested = Execution::with_ids(*body, ids);
                let result = nested.run(&mut LeastId::default(), host);
                self.ids = nested.ids;

                match result {
                    Ok(value) => {
                        self.resume(tid, k(value));
                        Ok(ThreadAction::NoTest)
                    }
                    Err(_) => Err(Failure::FailureInNoTest),
                }
            }

            Action::KnowsAbout { what, k } => {
                self.threads[tid].acquainted.insert(what);
                self.resume(tid, *k);
                Ok(ThreadAction::KnowsAbout)
            }

            Action::Forgets { what, k } => {
                self.threads[tid].acquainted.remove(&what);
                self.resume(tid, *k);
                Ok(ThreadAction::Forgets)
            }

            Action::AllKnown { k } => {
                self.resume(tid, *k);
                Ok(ThreadAction::AllKnown)
            }

            Action::Stop { result } => {
                if tid == self.threads.main().id {
                    self.result = Some(result);
                }
                self.threads[tid].set_terminated(Cause::Stopped);
                Ok(ThreadAction::Stop)
            }
        }
    }

    /// Unwind `tid`'s handler stack with `exc`. Frames that do not match
    /// are discarded along with their saved continuations; an empty stack
    /// kills the thread.
    fn raise(&mut self, tid: ThreadId, exc: Exception) -> ThreadAction {
        let th = &mut self.threads[tid];
        let mut exc = exc;

        loop {
            match th.frames.pop() {
                None => {
                    trace!(thread = %tid, "uncaught exception");
                    th.set_terminated(Cause::Killed);
                    return ThreadAction::Killed;
                }
                Some(Frame { handler, k, mask }) => match handler(exc) {
                    Ok(body) => {
                        th.mask = mask;
                        th.cont = Some(body(k));
                        th.set_runnable();
                        return ThreadAction::Throw;
                    }
                    Err(unmatched) => exc = unmatched,
                },
            }
        }
    }

    fn resume(&mut self, tid: ThreadId, next: Action) {
        self.threads[tid].cont = Some(next);
    }

    /// Stash the un-executed action back on the thread and block it. The
    /// thread retries the same action when next scheduled.
    fn block(&mut self, tid: ThreadId, on: Blocking, action: Action) {
        let th = &mut self.threads[tid];
        th.cont = Some(action);
        th.set_blocked(on);
    }

    /// Wake the drained taker/reader queue of `cvar`. Entries whose thread
    /// is no longer blocked on this variable are stale (an asynchronous
    /// exception got there first) and are dropped.
    fn wake_consumers(&mut self, cvar: CVarId, raw: Vec<ThreadId>) -> Vec<ThreadId> {
        self.wake_waiters(raw, |on| {
            matches!(on, Blocking::Take(v) | Blocking::Read(v) if *v == cvar)
        })
    }

    /// Wake the drained putter queue of `cvar`, dropping stale entries.
    fn wake_producers(&mut self, cvar: CVarId, raw: Vec<ThreadId>) -> Vec<ThreadId> {
        self.wake_waiters(raw, |on| matches!(on, Blocking::Put(v) if *v == cvar))
    }

    fn wake_waiters<F>(&mut self, raw: Vec<ThreadId>, still_waiting: F) -> Vec<ThreadId>
    where
        F: Fn(&Blocking) -> bool,
    {
        let mut woken = Vec::new();

        for id in raw {
            let waiting = match &self.threads[id].state {
                State::Blocked(on) => still_waiting(on),
                _ => false,
            };

            if waiting && !woken.contains(&id) {
                self.threads[id].set_runnable();
                woken.push(id);
            }
        }

        woken
    }

    /// Wake every thread whose transaction watch set intersects `written`.
    fn wake_stm(&mut self, written: &[TxVarId]) -> Vec<ThreadId> {
        let mut woken = Vec::new();

        for th in self.threads.iter_mut() {
            let hit = match &th.state {
                State::Blocked(Blocking::Stm(watch)) => {
                    watch.iter().any(|var| written.contains(var))
                }
                _ => false,
            };

            if hit {
                th.set_runnable();
                woken.push(th.id);
            }
        }

        woken
    }

    /// Wake blocked `ThrowTo` senders whose target has become deliverable
    /// (or has terminated); they retry the delivery when next scheduled.
    fn wake_throwers(&mut self) {
        let senders: Vec<(ThreadId, ThreadId)> = self
            .threads
            .iter()
            .filter_map(|th| match &th.state {
                State::Blocked(Blocking::ThrowTo(target)) => Some((th.id, *target)),
                _ => None,
            })
            .collect();

        for (sender, target) in senders {
            let ready = {
                let th = &self.threads[target];
                th.is_terminated() || (th.pending.is_none() && th.interruptible())
            };

            if ready {
                self.threads[sender].set_runnable();
            }
        }
    }
}

/// Whether `th`'s pending exception would be consumed if it were scheduled
/// now: before any action when unmasked, at potentially-blocking actions
/// when interruptibly masked, never when uninterruptible. A thread is never
/// interrupted mid-action.
fn deliverable(th: &Thread) -> bool {
    if th.pending.is_none() {
        return false;
    }

    match th.mask {
        Mask::Unmasked => true,
        Mask::Interruptible => th.cont.as_ref().map_or(false, |action| action.may_block()),
        Mask::Uninterruptible => false,
    }
}
