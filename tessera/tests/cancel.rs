mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tessera::time::MockClock;
use tessera::{
    CancelScope, Error, RuntimeBuilder, checkpoint, checkpoint_if_cancelled, current_time,
    open_nursery, sleep, sleep_forever,
};

#[tessera::test]
async fn test_scope_catches_its_own_cancel() -> tessera::Result<()> {
    common::init_tracing();

    let scope = CancelScope::new();
    scope.cancel();

    let outcome = scope.run(sleep_forever()).await?;

    assert!(outcome.is_none());
    assert!(scope.cancel_called());
    assert!(scope.cancelled_caught());

    Ok(())
}

#[tessera::test]
async fn test_uncancelled_scope_returns_the_value() -> tessera::Result<()> {
    common::init_tracing();

    let scope = CancelScope::new();
    let outcome = scope
        .run(async {
            checkpoint().await?;
            Ok(7)
        })
        .await?;

    assert_eq!(outcome, Some(7));
    assert!(!scope.cancel_called());
    assert!(!scope.cancelled_caught());

    Ok(())
}

#[tessera::test]
async fn test_inner_scope_does_not_swallow_outer_cancel() -> tessera::Result<()> {
    common::init_tracing();

    let outer = CancelScope::new();
    let inner = CancelScope::new();

    let outcome = outer
        .run({
            let outer = outer.clone();
            let inner = inner.clone();
            async move {
                inner
                    .run(async move {
                        outer.cancel();
                        checkpoint().await
                    })
                    .await
            }
        })
        .await?;

    assert!(outcome.is_none());
    assert!(outer.cancelled_caught());
    assert!(!inner.cancelled_caught(), "inner scope must not catch an outer cancel");

    Ok(())
}

#[tessera::test]
async fn test_cancel_is_tagged_with_outermost_scope() -> tessera::Result<()> {
    common::init_tracing();

    let outer = CancelScope::new();
    let inner = CancelScope::new();

    let outcome = outer
        .run({
            let outer = outer.clone();
            let inner = inner.clone();
            async move {
                let inner_handle = inner.clone();
                inner
                    .run(async move {
                        inner_handle.cancel();
                        outer.cancel();
                        checkpoint().await
                    })
                    .await
            }
        })
        .await?;

    assert!(outcome.is_none());
    assert!(inner.cancel_called());
    assert!(!inner.cancelled_caught(), "unwinding goes straight to the outer scope");
    assert!(outer.cancelled_caught());

    Ok(())
}

#[tessera::test(autojump)]
async fn test_shield_hides_outer_cancel() -> tessera::Result<()> {
    common::init_tracing();

    let outer = CancelScope::new();
    let shielded_result = Rc::new(Cell::new(None));

    let outcome = outer
        .run({
            let outer = outer.clone();
            let shielded_result = shielded_result.clone();
            async move {
                outer.cancel();

                let shielded = CancelScope::new().shielded();
                let value = shielded
                    .run(async {
                        sleep(Duration::from_millis(10)).await?;
                        Ok(5)
                    })
                    .await?;
                shielded_result.set(value);

                checkpoint().await
            }
        })
        .await?;

    assert_eq!(shielded_result.get(), Some(5));
    assert!(outcome.is_none());
    assert!(outer.cancelled_caught());

    Ok(())
}

#[tessera::test]
async fn test_shielded_scope_still_honours_its_own_cancel() -> tessera::Result<()> {
    common::init_tracing();

    let shielded = CancelScope::new().shielded();
    assert!(shielded.shield());

    let outcome = shielded
        .run({
            let shielded = shielded.clone();
            async move {
                shielded.cancel();
                checkpoint().await
            }
        })
        .await?;

    assert!(outcome.is_none());
    assert!(shielded.cancelled_caught());

    Ok(())
}

#[tessera::test(autojump)]
async fn test_dropping_the_shield_exposes_outer_cancel() -> tessera::Result<()> {
    common::init_tracing();

    let outer = CancelScope::new();
    let reached_sleep = Rc::new(Cell::new(false));

    let outcome = outer
        .run({
            let outer = outer.clone();
            let reached_sleep = reached_sleep.clone();
            async move {
                let shielded = CancelScope::new().shielded();
                shielded
                    .run({
                        let shielded = shielded.clone();
                        async move {
                            outer.cancel();
                            checkpoint().await?;
                            reached_sleep.set(true);
                            shielded.set_shield(false);
                            sleep(Duration::from_secs(1)).await
                        }
                    })
                    .await
            }
        })
        .await?;

    assert!(reached_sleep.get());
    assert!(outcome.is_none());
    assert!(outer.cancelled_caught());

    Ok(())
}

#[tessera::test(autojump)]
async fn test_deadline_cancels_the_scope() -> tessera::Result<()> {
    common::init_tracing();

    let start = current_time()?;
    let scope = CancelScope::with_deadline(start + Duration::from_millis(50));
    assert_eq!(scope.deadline(), Some(start + Duration::from_millis(50)));

    let outcome = scope.run(sleep(Duration::from_secs(1))).await?;

    let elapsed = current_time()? - start;
    assert!(outcome.is_none());
    assert!(scope.cancelled_caught());
    assert!(elapsed >= Duration::from_millis(50) && elapsed < Duration::from_secs(1));

    Ok(())
}

#[tessera::test(autojump)]
async fn test_set_deadline_moves_the_deadline() -> tessera::Result<()> {
    common::init_tracing();

    let start = current_time()?;
    let scope = CancelScope::new();

    let outcome = scope
        .run({
            let scope = scope.clone();
            async move {
                scope.set_deadline(Some(current_time()? + Duration::from_millis(20)));
                sleep(Duration::from_secs(60)).await
            }
        })
        .await?;

    assert!(outcome.is_none());
    assert!(current_time()? - start < Duration::from_secs(60));

    Ok(())
}

#[tessera::test(autojump)]
async fn test_removed_deadline_does_not_fire() -> tessera::Result<()> {
    common::init_tracing();

    let start = current_time()?;
    let scope = CancelScope::with_deadline(start + Duration::from_millis(10));

    let outcome = scope
        .run({
            let scope = scope.clone();
            async move {
                scope.set_deadline(None);
                sleep(Duration::from_millis(50)).await?;
                Ok("slept")
            }
        })
        .await?;

    assert_eq!(outcome, Some("slept"));
    assert!(!scope.cancel_called());

    Ok(())
}

#[test]
fn test_deadline_waits_for_the_next_checkpoint() -> tessera::Result<()> {
    common::init_tracing();

    let clock = MockClock::new();
    let runtime = RuntimeBuilder::new().clock(clock.clone()).build()?;

    runtime.run(async move {
        let computed = Rc::new(Cell::new(false));
        let scope = CancelScope::with_deadline(current_time()? + Duration::from_millis(10));

        let outcome = scope
            .run({
                let computed = computed.clone();
                async move {
                    // Computation that runs past the deadline without a checkpoint.
                    clock.jump(Duration::from_millis(20));
                    checkpoint_if_cancelled()?;
                    computed.set(true);
                    checkpoint().await
                }
            })
            .await?;

        assert!(computed.get(), "a deadline never interrupts a step");
        assert!(outcome.is_none());
        Ok(())
    })
}

#[tessera::test]
async fn test_scope_cannot_be_entered_twice() -> tessera::Result<()> {
    common::init_tracing();

    let scope = CancelScope::new();
    scope.run(async { Ok(()) }).await?;

    let err = scope.run(async { Ok(()) }).await.unwrap_err();
    assert!(
        matches!(err, Error::ScopeReentered(id) if id == scope.id()),
        "got {err:?}"
    );

    Ok(())
}

#[tessera::test]
async fn test_cancel_reaches_children_spawned_later() -> tessera::Result<()> {
    common::init_tracing();

    let scope = CancelScope::new();
    let child_cancelled = Rc::new(Cell::new(false));

    let outcome = scope
        .run({
            let scope = scope.clone();
            let child_cancelled = child_cancelled.clone();
            async move {
                open_nursery(|nursery| async move {
                    scope.cancel();
                    nursery.spawn(async move {
                        let result = checkpoint().await;
                        child_cancelled.set(matches!(result, Err(Error::Cancelled(_))));
                        result
                    })?;
                    Ok(())
                })
                .await
            }
        })
        .await?;

    assert!(outcome.is_none());
    assert!(child_cancelled.get());

    Ok(())
}

#[tessera::test(autojump)]
async fn test_sibling_scopes_are_independent() -> tessera::Result<()> {
    common::init_tracing();

    let first = CancelScope::new();
    let second = CancelScope::new();
    let second_done = Rc::new(Cell::new(false));

    open_nursery(|nursery| {
        let first = first.clone();
        let second = second.clone();
        let second_done = second_done.clone();
        async move {
            let target = first.clone();
            nursery.spawn(async move {
                first.run(sleep_forever()).await?;
                Ok(())
            })?;
            nursery.spawn(async move {
                let done = second.run(sleep(Duration::from_millis(10))).await?;
                second_done.set(done.is_some());
                Ok(())
            })?;

            target.cancel();
            Ok(())
        }
    })
    .await?;

    assert!(first.cancelled_caught());
    assert!(!second.cancel_called());
    assert!(second_done.get());

    Ok(())
}
