mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tessera::time::MockClock;
use tessera::{
    Error, RuntimeBuilder, checkpoint, checkpoint_if_cancelled, current_time, lowlevel,
    open_nursery, sleep,
};

#[test]
fn test_block_on_returns_the_output() -> tessera::Result<()> {
    common::init_tracing();

    let runtime = RuntimeBuilder::new().build()?;
    let value = runtime.block_on(async { 6 * 7 })?;

    assert_eq!(value, 42);

    Ok(())
}

#[test]
fn test_run_returns_main_task_failure() -> tessera::Result<()> {
    common::init_tracing();

    let runtime = RuntimeBuilder::new().build()?;
    let err = runtime
        .run(async {
            checkpoint().await?;
            Err::<(), _>(Error::failed("main failed"))
        })
        .unwrap_err();

    assert_eq!(err.to_string(), "main failed");
    assert_eq!(err.as_label(), "task_failed");

    Ok(())
}

#[test]
fn test_runtime_can_run_twice() -> tessera::Result<()> {
    common::init_tracing();

    let runtime = RuntimeBuilder::new().autojump_clock().build()?;

    for expected in 1..=2 {
        let value = runtime.run(async move {
            sleep(Duration::from_secs(1)).await?;
            Ok(expected)
        })?;
        assert_eq!(value, expected);
    }

    Ok(())
}

#[test]
fn test_nested_run_is_rejected() -> tessera::Result<()> {
    common::init_tracing();

    let runtime = Rc::new(RuntimeBuilder::new().build()?);
    let inner = runtime.clone();

    let nested = runtime.run(async move { Ok(inner.block_on(async {})) })?;

    assert!(matches!(nested, Err(Error::NestedRun)), "got {nested:?}");

    Ok(())
}

#[test]
fn test_operations_outside_runtime_fail() {
    common::init_tracing();

    assert!(matches!(checkpoint_if_cancelled(), Err(Error::NoRuntime)));
    assert!(matches!(current_time(), Err(Error::NoRuntime)));
    assert!(matches!(lowlevel::current_task(), Err(Error::NoRuntime)));
    assert!(matches!(lowlevel::current_statistics(), Err(Error::NoRuntime)));
}

#[tessera::test(autojump)]
async fn test_statistics_reflect_the_scheduler() -> tessera::Result<()> {
    common::init_tracing();

    let stats = lowlevel::current_statistics()?;
    assert_eq!(stats.tasks_living, 1);
    assert!(stats.seconds_to_next_deadline.is_infinite());
    assert_eq!(stats.finalization_defects, 0);

    open_nursery(|nursery| async move {
        nursery.spawn(async { sleep(Duration::from_secs(5)).await })?;
        nursery.spawn(async { sleep(Duration::from_secs(2)).await })?;

        lowlevel::wait_all_tasks_blocked().await?;

        let stats = lowlevel::current_statistics()?;
        assert_eq!(stats.tasks_living, 3);
        assert_eq!(stats.tasks_runnable, 0);
        assert_eq!(stats.seconds_to_next_deadline, 2.0);
        Ok(())
    })
    .await?;

    Ok(())
}

#[tessera::test(autojump)]
async fn test_wait_all_tasks_blocked_lets_children_park() -> tessera::Result<()> {
    common::init_tracing();

    let progress = Rc::new(Cell::new(0));

    open_nursery(|nursery| {
        let progress = progress.clone();
        async move {
            let child_progress = progress.clone();
            nursery.spawn(async move {
                for _ in 0..5 {
                    child_progress.set(child_progress.get() + 1);
                    checkpoint().await?;
                }
                sleep(Duration::from_secs(1)).await
            })?;

            lowlevel::wait_all_tasks_blocked().await?;
            assert_eq!(progress.get(), 5, "the child ran until it blocked on its sleep");
            Ok(())
        }
    })
    .await?;

    Ok(())
}

#[test]
fn test_frozen_clock_only_moves_when_jumped() -> tessera::Result<()> {
    common::init_tracing();

    let clock = MockClock::new();
    let runtime = RuntimeBuilder::new().clock(clock.clone()).build()?;

    runtime.run(async move {
        let start = current_time()?;

        open_nursery(|nursery| async move {
            nursery.spawn(async move {
                lowlevel::wait_all_tasks_blocked().await?;
                clock.jump(Duration::from_secs(30));
                Ok(())
            })?;

            sleep(Duration::from_secs(30)).await
        })
        .await?;

        assert_eq!(current_time()? - start, Duration::from_secs(30));
        Ok(())
    })
}
