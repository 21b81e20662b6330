#![deny(warnings, rust_2018_idioms)]

use weft::{atomically, fork, run, run_basic, LeastId, ThreadAction, Tx, TxCtx};

#[test]
fn transactions_commit_atomically() {
    let program = atomically(|ctx: &mut TxCtx<'_>| {
        let var = ctx.new_var(5u32);
        let n = ctx.read(var);
        Tx::Done(n)
    });

    let (result, _, trace) = run(LeastId::default(), program);

    assert_eq!(result, Ok(5));

    let actions: Vec<_> = trace.iter().map(|entry| entry.action.clone()).collect();
    assert_eq!(actions, vec![ThreadAction::Stm(vec![]), ThreadAction::Stop]);
}

#[test]
fn variables_survive_between_transactions() {
    let program = atomically(|ctx: &mut TxCtx<'_>| Tx::Done(ctx.new_var(1u32))).and_then(|var| {
        atomically(move |ctx: &mut TxCtx<'_>| {
            let n = ctx.read(var);
            ctx.write(var, n + 1);
            Tx::Done(())
        })
        .then(atomically(move |ctx: &mut TxCtx<'_>| Tx::Done(ctx.read(var))))
    });

    assert_eq!(run_basic(LeastId::default(), program), Some(2));
}

#[test]
fn retry_blocks_until_a_watched_variable_changes() {
    let program = atomically(|ctx: &mut TxCtx<'_>| Tx::Done(ctx.new_var(0u32))).and_then(|var| {
        fork(atomically(move |ctx: &mut TxCtx<'_>| {
            ctx.write(var, 1);
            Tx::Done(())
        }))
        .and_then(move |_| {
            atomically(move |ctx: &mut TxCtx<'_>| {
                let n = ctx.read(var);
                if n == 0 {
                    Tx::Retry
                } else {
                    Tx::Done(n)
                }
            })
        })
    });

    let (result, _, trace) = run(LeastId::default(), program);

    assert_eq!(result, Ok(1));

    let main = match trace[0].decision {
        weft::Decision::Start(main) => main,
        other => panic!("expected Start, got {:?}", other),
    };

    let actions: Vec<_> = trace.iter().map(|entry| entry.action.clone()).collect();

    // The reader retried, blocked, and was woken by exactly the commit that
    // wrote its watched variable.
    assert!(actions.contains(&ThreadAction::BlockedStm));
    assert!(actions.contains(&ThreadAction::Stm(vec![main])));
}

#[test]
fn retrying_forever_is_an_stm_deadlock() {
    let program = atomically(|_ctx: &mut TxCtx<'_>| Tx::<u32>::Retry);

    let (result, _, trace) = run(LeastId::default(), program);

    assert_eq!(result, Err(weft::Failure::StmDeadlock));
    assert!(matches!(
        trace.last().unwrap().action,
        ThreadAction::BlockedStm
    ));
}

#[test]
fn aborted_writes_are_invisible() {
    let program = atomically(|ctx: &mut TxCtx<'_>| Tx::Done(ctx.new_var(0u32))).and_then(|var| {
        fork(atomically(move |ctx: &mut TxCtx<'_>| {
            ctx.write(var, 7);
            Tx::Done(())
        }))
        .and_then(move |_| {
            // First attempt writes 3, then retries: the write must not land.
            atomically(move |ctx: &mut TxCtx<'_>| {
                let n = ctx.read(var);
                if n == 0 {
                    ctx.write(var, 3);
                    Tx::Retry
                } else {
                    Tx::Done(n)
                }
            })
        })
    });

    assert_eq!(run_basic(LeastId::default(), program), Some(7));
}
