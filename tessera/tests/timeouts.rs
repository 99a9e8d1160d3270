mod common;

use std::time::Duration;

use tessera::{
    Error, current_time, fail_after, fail_at, move_on_after, move_on_at, sleep, sleep_until,
};

#[tessera::test(autojump)]
async fn test_move_on_after_returns_value_in_time() -> tessera::Result<()> {
    common::init_tracing();

    let value = move_on_after(Duration::from_millis(50), async {
        sleep(Duration::from_millis(10)).await?;
        Ok(123)
    })
    .await?;

    assert_eq!(value, Some(123));

    Ok(())
}

#[tessera::test(autojump)]
async fn test_move_on_after_gives_up_when_too_slow() -> tessera::Result<()> {
    common::init_tracing();

    let start = current_time()?;
    let value = move_on_after(Duration::from_millis(20), async {
        sleep(Duration::from_millis(100)).await?;
        Ok(456)
    })
    .await?;

    assert_eq!(value, None);
    assert_eq!(current_time()? - start, Duration::from_millis(20));

    Ok(())
}

#[tessera::test(autojump)]
async fn test_fail_after_reports_too_slow() -> tessera::Result<()> {
    common::init_tracing();

    let err = fail_after(Duration::from_millis(20), sleep(Duration::from_secs(1)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TooSlow), "got {err:?}");
    assert_eq!(err.as_label(), "too_slow");

    Ok(())
}

#[tessera::test(autojump)]
async fn test_fail_after_passes_the_value_through() -> tessera::Result<()> {
    common::init_tracing();

    let value = fail_after(Duration::from_secs(1), async { Ok("fast") }).await?;
    assert_eq!(value, "fast");

    Ok(())
}

#[tessera::test(autojump)]
async fn test_past_deadline_cancels_at_first_checkpoint() -> tessera::Result<()> {
    common::init_tracing();

    sleep(Duration::from_millis(10)).await?;
    let past = current_time()? - Duration::from_millis(5);

    let value = move_on_at(past, async {
        sleep(Duration::from_secs(1)).await?;
        Ok(())
    })
    .await?;
    assert_eq!(value, None);

    let err = fail_at(past, sleep(Duration::from_secs(1))).await.unwrap_err();
    assert!(matches!(err, Error::TooSlow));

    Ok(())
}

#[tessera::test(autojump)]
async fn test_nested_timeouts_unwind_to_the_shorter_one() -> tessera::Result<()> {
    common::init_tracing();

    let start = current_time()?;
    let outer = move_on_after(Duration::from_millis(10), async {
        move_on_after(Duration::from_secs(1), sleep(Duration::from_secs(2))).await
    })
    .await?;

    assert_eq!(outer, None, "the outer deadline fires first and is caught there");
    assert_eq!(current_time()? - start, Duration::from_millis(10));

    Ok(())
}

#[tessera::test(autojump)]
async fn test_sleep_until_reaches_the_deadline() -> tessera::Result<()> {
    common::init_tracing();

    let deadline = current_time()? + Duration::from_secs(3600);
    sleep_until(deadline).await?;

    assert!(current_time()? >= deadline);

    Ok(())
}

#[tessera::test]
async fn test_zero_sleep_is_still_a_checkpoint() -> tessera::Result<()> {
    common::init_tracing();

    let scope = tessera::CancelScope::new();
    scope.cancel();

    let outcome = scope.run(sleep(Duration::ZERO)).await?;
    assert!(outcome.is_none());

    Ok(())
}

#[tessera::test(autojump)]
async fn test_unbounded_sleep_waits_for_cancel() -> tessera::Result<()> {
    common::init_tracing();

    let start = current_time()?;
    let outcome = move_on_after(Duration::from_millis(1), sleep(Duration::MAX)).await?;

    assert!(outcome.is_none());
    assert_eq!(current_time()? - start, Duration::from_millis(1));

    Ok(())
}

#[tessera::test(autojump)]
async fn test_unbounded_timeout_never_fires() -> tessera::Result<()> {
    common::init_tracing();

    let value = move_on_after(Duration::MAX, async {
        sleep(Duration::from_secs(1)).await?;
        Ok(5)
    })
    .await?;
    assert_eq!(value, Some(5));

    let value = fail_after(Duration::MAX, async { Ok(7) }).await?;
    assert_eq!(value, 7);

    Ok(())
}
