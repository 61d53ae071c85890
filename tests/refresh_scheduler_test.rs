use grid_panels::{
    CooperativeScheduler, HostServices, LocalEventBus, Panel, PanelEntry, RecordingSurfaceHost,
    RefreshSettings, RenderAdapter, SessionConfig, SessionRegistry, TaskCallback, TaskHandle,
    TaskSubstrate, TextRenderAdapter, TokioTaskSubstrate, UserId, VisualItem,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

/// 1s refresh on 50ms host ticks: one refresh every 20 ticks.
const TICKS_PER_REFRESH: u64 = 20;

struct Harness {
    registry: SessionRegistry,
    tasks: Arc<CooperativeScheduler>,
    display: Arc<RecordingSurfaceHost>,
}

fn harness() -> Harness {
    let config = SessionConfig::default();
    let tasks = Arc::new(CooperativeScheduler::default());
    let display = Arc::new(RecordingSurfaceHost::new());
    let host = HostServices::new(
        Arc::new(TextRenderAdapter::new(config.render.clone())),
        display.clone(),
        Arc::new(LocalEventBus::new()),
        tasks.clone(),
    );
    Harness {
        registry: SessionRegistry::new(host, config),
        tasks,
        display,
    }
}

fn ticking_entry(slot: usize, calls: &Arc<AtomicUsize>) -> PanelEntry {
    let calls = calls.clone();
    PanelEntry::new("CLOCK", slot).on_tick(move |ctx| {
        calls.fetch_add(1, Ordering::SeqCst);
        let display = ctx.display_mut();
        display.quantity = display.quantity % 64 + 1;
        Ok(())
    })
}

#[test]
fn test_every_entry_ticks_once_per_period() {
    let h = harness();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let panel = Panel::new(18, "Clocks")
        .unwrap()
        .with_entry(ticking_entry(0, &first))
        .unwrap()
        .with_entry(ticking_entry(17, &second))
        .unwrap()
        .with_entry(PanelEntry::new("STONE", 9))
        .unwrap();
    let user = UserId::new("U1");
    h.registry.open(user.clone(), panel).unwrap();

    h.tasks.advance(TICKS_PER_REFRESH - 1);
    assert_eq!(first.load(Ordering::SeqCst), 0);

    h.tasks.advance(1 + TICKS_PER_REFRESH * 3);
    assert_eq!(first.load(Ordering::SeqCst), 4);
    assert_eq!(second.load(Ordering::SeqCst), 4);
    assert_eq!(h.registry.tick_count(&user), Some(4));

    // Tick edits are pushed to the visible surface.
    let view = h.display.view(&user).unwrap();
    assert_eq!(view.slot(0).unwrap().amount, 5);
    assert_eq!(view.slot(17).unwrap().amount, 5);
    assert_eq!(view.slot(9).unwrap().amount, 1);
}

#[test]
fn test_close_cancels_future_ticks() {
    let h = harness();
    let calls = Arc::new(AtomicUsize::new(0));
    let panel = Panel::new(9, "Clock")
        .unwrap()
        .with_entry(ticking_entry(0, &calls))
        .unwrap();
    let user = UserId::new("U2");
    h.registry.open(user.clone(), panel).unwrap();

    h.tasks.advance(TICKS_PER_REFRESH * 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    h.registry.close(&user);
    h.tasks.advance(TICKS_PER_REFRESH * 5);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.tasks.pending_tasks(), 0);
}

#[test]
fn test_render_error_skips_slot_without_cancelling() {
    let h = harness();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    // Second tick leaves the entry unrenderable; third tick repairs it.
    let flaky = PanelEntry::new("CLOCK", 0).quantity(10).on_tick(move |ctx| {
        let quantity = match counter.fetch_add(1, Ordering::SeqCst) {
            1 => 0,
            _ => 20,
        };
        ctx.display_mut().quantity = quantity;
        Ok(())
    });
    let calls = Arc::new(AtomicUsize::new(0));
    let panel = Panel::new(9, "Flaky")
        .unwrap()
        .with_entry(flaky)
        .unwrap()
        .with_entry(ticking_entry(1, &calls))
        .unwrap();
    let user = UserId::new("U3");
    h.registry.open(user.clone(), panel).unwrap();

    h.tasks.advance(TICKS_PER_REFRESH);
    assert_eq!(h.display.view(&user).unwrap().slot(0).unwrap().amount, 20);

    h.tasks.advance(TICKS_PER_REFRESH);
    let view = h.display.view(&user).unwrap();
    assert_eq!(view.slot(0).unwrap().amount, 20);
    assert_eq!(view.slot(1).unwrap().amount, 3);

    h.tasks.advance(TICKS_PER_REFRESH);
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.registry.tick_count(&user), Some(3));
    assert!(h.registry.is_open(&user));
    assert_eq!(h.tasks.pending_tasks(), 1);
}

#[test]
fn test_failing_tick_handler_does_not_stop_refresh() {
    let h = harness();
    let calls = Arc::new(AtomicUsize::new(0));
    let panel = Panel::new(9, "Mixed")
        .unwrap()
        .with_entry(PanelEntry::new("LAVA", 0).on_tick(|_| anyhow::bail!("sensor offline")))
        .unwrap()
        .with_entry(PanelEntry::new("FIRE", 1).on_tick(|_| panic!("tick bug")))
        .unwrap()
        .with_entry(ticking_entry(2, &calls))
        .unwrap();
    let user = UserId::new("U4");
    h.registry.open(user.clone(), panel).unwrap();

    h.tasks.advance(TICKS_PER_REFRESH * 3);

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.registry.tick_count(&user), Some(3));
}

#[test]
fn test_close_from_another_thread_stops_refresh() {
    let h = harness();
    let registry = h.registry.clone();
    let user = UserId::new("U5");
    let target = user.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let panel = Panel::new(9, "Countdown")
        .unwrap()
        .with_entry(PanelEntry::new("CLOCK", 0).on_tick(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
        .unwrap();
    h.registry.open(user.clone(), panel).unwrap();

    h.tasks.advance(TICKS_PER_REFRESH);
    // Closing between ticks from another owner of the registry.
    std::thread::spawn(move || registry.close(&target))
        .join()
        .unwrap();
    h.tasks.advance(TICKS_PER_REFRESH * 3);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(h.registry.lookup(&user).is_none());
}

#[tokio::test]
async fn test_tokio_substrate_drives_refresh_and_stops_on_close() {
    let config = SessionConfig {
        refresh: RefreshSettings::every(Duration::from_millis(20)),
        ..SessionConfig::default()
    };
    let display = Arc::new(RecordingSurfaceHost::new());
    let tasks = Arc::new(TokioTaskSubstrate::current().unwrap());
    let host = HostServices::new(
        Arc::new(TextRenderAdapter::new(config.render.clone())),
        display.clone(),
        Arc::new(LocalEventBus::new()),
        tasks.clone(),
    );
    let registry = SessionRegistry::new(host, config);

    let calls = Arc::new(AtomicUsize::new(0));
    let panel = Panel::new(9, "Live")
        .unwrap()
        .with_entry(ticking_entry(0, &calls))
        .unwrap();
    let user = UserId::new("U6");
    registry.open(user.clone(), panel).unwrap();
    assert_eq!(tasks.active_tasks(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let seen = calls.load(Ordering::SeqCst);
    assert!(seen >= 2, "expected at least two refreshes, saw {}", seen);

    assert!(registry.close(&user));
    assert_eq!(tasks.active_tasks(), 0);
    let after_close = calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), after_close);
}

#[test]
fn test_tick_handler_can_close_its_own_panel() {
    let h = harness();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let panel = Panel::new(9, "Timer")
        .unwrap()
        .with_entry(PanelEntry::new("CLOCK", 0).on_tick(move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            if ctx.tick() == 2 {
                ctx.close_panel();
            }
            Ok(())
        }))
        .unwrap();
    let user = UserId::new("U7");
    h.registry.open(user.clone(), panel).unwrap();

    h.tasks.advance(TICKS_PER_REFRESH * 5);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(h.registry.lookup(&user).is_none());
    assert!(h.display.view(&user).is_none());
    assert_eq!(h.display.dismissed_count(), 1);
    assert_eq!(h.tasks.pending_tasks(), 0);
}

#[test]
fn test_tick_handler_calling_registry_close_does_not_deadlock() {
    let h = harness();
    let registry = h.registry.clone();
    let user = UserId::new("U8");
    let target = user.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(AtomicUsize::new(0));
    let (counter, close_counter) = (calls.clone(), closes.clone());
    let panel = Panel::new(9, "Self-closing")
        .unwrap()
        .with_entry(PanelEntry::new("CLOCK", 0).on_tick(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Scheduled for after the tick, so it reports success.
            assert!(registry.close(&target));
            assert!(registry.surface(&target).is_none());
            assert_eq!(registry.tick_count(&target), Some(0));
            Ok(())
        }))
        .unwrap()
        .on_close(move |_| {
            close_counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    h.registry.open(user.clone(), panel).unwrap();

    let tasks = h.tasks.clone();
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        tasks.advance(TICKS_PER_REFRESH * 3);
        let _ = done_tx.send(());
    });
    done_rx
        .recv_timeout(Duration::from_secs(3))
        .expect("tick deadlocked on registry.close");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(h.registry.lookup(&user).is_none());
    assert_eq!(h.tasks.pending_tasks(), 0);
    assert!(!h.registry.close(&user));
}

/// Task substrate that only runs the callback when the test fires it, from
/// whatever thread calls `fire`.
#[derive(Default)]
struct ManualTasks {
    callback: Mutex<Option<TaskCallback>>,
}

impl ManualTasks {
    fn fire(&self) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl TaskSubstrate for ManualTasks {
    fn schedule_periodic(
        &self,
        callback: TaskCallback,
        _initial_delay: Duration,
        _period: Duration,
    ) -> TaskHandle {
        *self.callback.lock().unwrap() = Some(callback);
        TaskHandle(1)
    }

    fn cancel(&self, _handle: TaskHandle) -> bool {
        self.callback.lock().unwrap().take().is_some()
    }
}

#[test]
fn test_overlapping_tick_is_skipped() {
    let config = SessionConfig::default();
    let tasks = Arc::new(ManualTasks::default());
    let host = HostServices::new(
        Arc::new(TextRenderAdapter::new(config.render.clone())),
        Arc::new(RecordingSurfaceHost::new()),
        Arc::new(LocalEventBus::new()),
        tasks.clone(),
    );
    let registry = SessionRegistry::new(host, config);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let panel = Panel::new(9, "Slow")
        .unwrap()
        .with_entry(PanelEntry::new("CLOCK", 0).on_tick(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = entered_tx.send(());
            let _ = release_rx.lock().unwrap().recv_timeout(Duration::from_secs(3));
            Ok(())
        }))
        .unwrap();
    let user = UserId::new("U9");
    registry.open(user.clone(), panel).unwrap();

    let first = {
        let tasks = tasks.clone();
        thread::spawn(move || tasks.fire())
    };
    entered_rx
        .recv_timeout(Duration::from_secs(3))
        .expect("first tick never started");

    // The first tick still holds the slot, so this one returns at once.
    tasks.fire();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    release_tx.send(()).unwrap();
    first.join().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.tick_count(&user), Some(1));
}

/// Renders through `TextRenderAdapter` but panics while `broken` is set.
struct PanickingRender {
    inner: TextRenderAdapter,
    broken: Arc<AtomicBool>,
}

impl RenderAdapter for PanickingRender {
    fn render(&self, entry: &PanelEntry) -> grid_panels::Result<VisualItem> {
        if self.broken.load(Ordering::SeqCst) {
            panic!("render adapter bug");
        }
        self.inner.render(entry)
    }
}

#[test]
fn test_ticks_resume_after_a_panicking_tick() {
    let config = SessionConfig::default();
    let broken = Arc::new(AtomicBool::new(false));
    let tasks = Arc::new(CooperativeScheduler::default());
    let host = HostServices::new(
        Arc::new(PanickingRender {
            inner: TextRenderAdapter::new(config.render.clone()),
            broken: broken.clone(),
        }),
        Arc::new(RecordingSurfaceHost::new()),
        Arc::new(LocalEventBus::new()),
        tasks.clone(),
    );
    let registry = SessionRegistry::new(host, config);
    let calls = Arc::new(AtomicUsize::new(0));
    let panel = Panel::new(9, "Fragile")
        .unwrap()
        .with_entry(ticking_entry(0, &calls))
        .unwrap();
    let user = UserId::new("U10");
    registry.open(user.clone(), panel).unwrap();

    tasks.advance(TICKS_PER_REFRESH);
    assert_eq!(registry.tick_count(&user), Some(1));

    broken.store(true, Ordering::SeqCst);
    let unwound = catch_unwind(AssertUnwindSafe(|| tasks.advance(TICKS_PER_REFRESH)));
    assert!(unwound.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    broken.store(false, Ordering::SeqCst);
    tasks.advance(TICKS_PER_REFRESH * 2);

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(registry.tick_count(&user), Some(3));
    assert!(registry.is_open(&user));
}
