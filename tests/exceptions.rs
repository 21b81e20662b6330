#![deny(warnings, rust_2018_idioms)]

use weft::{
    catch, fork, mask, new_empty_cvar, put_cvar, run, run_basic, take_cvar, throw, throw_to,
    LeastId, Mask, Program, ThreadAction,
};

#[derive(Debug)]
struct Boom;

#[derive(Debug)]
struct Hiss;

#[test]
fn catch_handles_a_matching_throw() {
    let program = catch(throw::<u32, _>(Boom), |_: Boom| Program::pure(7));

    assert_eq!(run_basic(LeastId::default(), program), Some(7));
}

#[test]
fn unmatched_exceptions_keep_unwinding() {
    let inner = catch(throw::<u32, _>(Boom), |_: Hiss| Program::pure(1));
    let program = catch(inner, |_: Boom| Program::pure(2));

    assert_eq!(run_basic(LeastId::default(), program), Some(2));
}

#[test]
fn the_handler_scope_ends_with_the_body() {
    // The handler is long gone by the time the second throw happens.
    let caught = catch(Program::pure(0u32), |_: Boom| Program::pure(1));
    let program = caught.and_then(|_| throw::<u32, _>(Boom));

    let (result, _, trace) = run(LeastId::default(), program);

    assert_eq!(result, Err(weft::Failure::UncaughtException));
    assert!(matches!(
        trace.last().unwrap().action,
        ThreadAction::Killed
    ));
}

#[test]
fn uncaught_exception_on_main_fails_the_run() {
    let (result, _, trace) = run(LeastId::default(), throw::<u32, _>(Boom));

    assert_eq!(result, Err(weft::Failure::UncaughtException));

    let actions: Vec<_> = trace.iter().map(|entry| entry.action.clone()).collect();
    assert_eq!(actions, vec![ThreadAction::Killed]);
}

#[test]
fn interruptible_mask_defers_delivery_to_a_blocking_point() {
    let program = new_empty_cvar::<()>().and_then(|ready| {
        new_empty_cvar::<u32>().and_then(move |done| {
            new_empty_cvar::<u32>().and_then(move |gate| {
                let child = mask(move |_| {
                    catch(
                        put_cvar(ready, ()).then(take_cvar(gate)),
                        move |_: Boom| put_cvar(done, 1).map(|_| 0),
                    )
                })
                .map(|_| ());

                fork(child).and_then(move |child| {
                    take_cvar(ready)
                        .then(throw_to(child, Boom))
                        .then(take_cvar(done))
                })
            })
        })
    });

    let (result, _, trace) = run(LeastId::default(), program);

    // The handler ran: the exception arrived once the child blocked.
    assert_eq!(result, Ok(1));

    let actions: Vec<_> = trace.iter().map(|entry| entry.action.clone()).collect();

    // While the child was running (masked, not blocked) the delivery had to
    // wait...
    assert!(actions
        .iter()
        .any(|action| matches!(action, ThreadAction::BlockedThrowTo(..))));
    // ...then went through, and was consumed at the child's blocking point.
    assert!(actions
        .iter()
        .any(|action| matches!(action, ThreadAction::ThrowTo(..))));
    assert!(actions.contains(&ThreadAction::Throw));
    assert!(!actions.contains(&ThreadAction::Killed));
}

#[test]
fn delivery_to_an_unmasked_blocked_thread_kills_it() {
    let program = new_empty_cvar::<u32>().and_then(|gate| {
        fork(take_cvar(gate).map(|_| ()))
            .and_then(move |child| throw_to(child, Boom).then(take_cvar(gate)))
    });

    let (result, _, trace) = run(LeastId::default(), program);

    // Nobody is left to fill the gate once the child dies.
    assert_eq!(result, Err(weft::Failure::Deadlock));

    let actions: Vec<_> = trace.iter().map(|entry| entry.action.clone()).collect();
    assert!(actions.contains(&ThreadAction::Killed));
}

#[test]
fn restore_reopens_the_outer_mask() {
    let program = mask(|restore| restore.apply(Program::pure(1u32)));

    let (result, _, trace) = run(LeastId::default(), program);

    assert_eq!(result, Ok(1));

    let actions: Vec<_> = trace.iter().map(|entry| entry.action.clone()).collect();
    assert_eq!(
        actions,
        vec![
            ThreadAction::SetMasking(Mask::Interruptible),
            ThreadAction::SetMasking(Mask::Unmasked),
            ThreadAction::ResetMasking(Mask::Interruptible),
            ThreadAction::ResetMasking(Mask::Unmasked),
            ThreadAction::Stop,
        ]
    );
}

#[test]
fn handlers_catch_across_blocking_operations() {
    let program = new_empty_cvar::<u32>().and_then(|var| {
        fork(put_cvar(var, 3)).and_then(move |_| {
            catch(
                take_cvar(var).and_then(|n| throw::<u32, _>(Boom).map(move |_: u32| n)),
                |_: Boom| Program::pure(99),
            )
        })
    });

    assert_eq!(run_basic(LeastId::default(), program), Some(99));
}
