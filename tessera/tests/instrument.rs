mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tessera::instrument::{Hook, HookSet, Instrument, LogInstrument, Outcome, TaskInfo};
use tessera::{Error, RuntimeBuilder, lowlevel, open_nursery, sleep};

#[derive(Default)]
struct SpawnCounter {
    spawned: Cell<usize>,
}

#[tessera::instrument]
impl Instrument for SpawnCounter {
    fn task_spawned(&self, _task: &TaskInfo) {
        self.spawned.set(self.spawned.get() + 1);
    }
}

/// Records task lifecycle events as readable strings.
#[derive(Default)]
struct Recorder {
    events: RefCell<Vec<String>>,
}

#[tessera::instrument]
impl Instrument for Recorder {
    fn before_run(&self) {
        self.events.borrow_mut().push("run started".into());
    }

    fn after_run(&self) {
        self.events.borrow_mut().push("run finished".into());
    }

    fn task_spawned(&self, task: &TaskInfo) {
        self.events.borrow_mut().push(format!("spawned {}", task.name()));
    }

    fn task_exited(&self, task: &TaskInfo, outcome: Outcome<'_>) {
        self.events
            .borrow_mut()
            .push(format!("exited {} {}", task.name(), outcome.as_label()));
    }
}

/// An instrument without the attribute: subscribes to every hook.
struct Everything;

impl Instrument for Everything {}

struct Panicky;

#[tessera::instrument]
impl Instrument for Panicky {
    fn task_spawned(&self, _task: &TaskInfo) {
        panic!("instrument bug");
    }
}

#[test]
fn test_generated_hooks_match_overridden_methods() {
    assert_eq!(
        SpawnCounter::default().hooks(),
        HookSet::EMPTY.with(Hook::TaskSpawned)
    );

    let recorder = Recorder::default().hooks();
    assert_eq!(
        recorder.iter().collect::<Vec<_>>(),
        [Hook::BeforeRun, Hook::AfterRun, Hook::TaskSpawned, Hook::TaskExited]
    );

    assert_eq!(Everything.hooks(), HookSet::ALL);
    assert_eq!(LogInstrument::new().hooks(), HookSet::ALL);
}

#[test]
fn test_instrument_sees_only_its_hook() -> tessera::Result<()> {
    common::init_tracing();

    let counter = Rc::new(SpawnCounter::default());
    let runtime = RuntimeBuilder::new()
        .autojump_clock()
        .instrument(counter.clone())
        .build()?;

    runtime.run(async {
        open_nursery(|nursery| async move {
            for _ in 0..3 {
                nursery.spawn(async { sleep(Duration::from_millis(5)).await })?;
            }
            Ok(())
        })
        .await?;
        Ok(())
    })?;

    assert_eq!(counter.spawned.get(), 4, "main task plus three children");

    Ok(())
}

#[test]
fn test_events_follow_scheduler_order() -> tessera::Result<()> {
    common::init_tracing();

    let recorder = Rc::new(Recorder::default());
    let runtime = RuntimeBuilder::new().instrument(recorder.clone()).build()?;

    runtime.run(async {
        let result = open_nursery(|nursery| async move {
            nursery.spawn_named("ok", async { Ok(()) })?;
            nursery.spawn_named("bad", async { Err(Error::failed("bad")) })?;
            Ok(())
        })
        .await;
        assert!(result.is_err());
        Ok(())
    })?;

    assert_eq!(
        *recorder.events.borrow(),
        [
            "run started",
            "spawned <main>",
            "spawned ok",
            "spawned bad",
            "exited ok completed",
            "exited bad failed",
            "exited <main> completed",
            "run finished",
        ]
    );

    Ok(())
}

#[tessera::test]
async fn test_panicking_instrument_is_removed() -> tessera::Result<()> {
    common::init_tracing();

    let before = lowlevel::current_statistics()?.instruments;

    let counter = Rc::new(SpawnCounter::default());
    lowlevel::add_instrument(Rc::new(Panicky))?;
    lowlevel::add_instrument(counter.clone())?;
    assert_eq!(lowlevel::current_statistics()?.instruments, before + 2);

    open_nursery(|nursery| async move {
        nursery.spawn(async { Ok(()) })?;
        nursery.spawn(async { Ok(()) })?;
        Ok(())
    })
    .await?;

    assert_eq!(counter.spawned.get(), 2, "delivery continues past the panic");
    assert_eq!(lowlevel::current_statistics()?.instruments, before + 1);

    Ok(())
}

#[tessera::test]
async fn test_remove_instrument() -> tessera::Result<()> {
    common::init_tracing();

    let counter = Rc::new(SpawnCounter::default());
    let handle: Rc<dyn Instrument> = counter.clone();

    lowlevel::add_instrument(handle.clone())?;
    open_nursery(|nursery| async move {
        nursery.spawn(async { Ok(()) })?;
        Ok(())
    })
    .await?;
    assert_eq!(counter.spawned.get(), 1);

    lowlevel::remove_instrument(&handle)?;
    open_nursery(|nursery| async move {
        nursery.spawn(async { Ok(()) })?;
        Ok(())
    })
    .await?;
    assert_eq!(counter.spawned.get(), 1, "removed instruments are not called");

    let err = lowlevel::remove_instrument(&handle).unwrap_err();
    assert!(matches!(err, Error::UnknownInstrument), "got {err:?}");

    Ok(())
}

#[test]
fn test_log_instrument_runs() -> tessera::Result<()> {
    common::init_tracing();

    let runtime = RuntimeBuilder::new()
        .autojump_clock()
        .instrument(Rc::new(LogInstrument::new()))
        .build()?;

    let value = runtime.run(async {
        sleep(Duration::from_millis(1)).await?;
        Ok(42)
    })?;

    assert_eq!(value, 42);

    Ok(())
}
