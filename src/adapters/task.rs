use crate::domain::ports::{TaskCallback, TaskHandle, TaskSubstrate};
use crate::utils::error::{PanelError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Wall-clock task substrate backed by the tokio runtime.
///
/// Each task is a spawned interval loop. A cancel request is observed before
/// the next tick starts; a callback that is already running finishes.
pub struct TokioTaskSubstrate {
    runtime: Handle,
    next_id: AtomicU64,
    stops: Mutex<HashMap<TaskHandle, watch::Sender<bool>>>,
}

impl TokioTaskSubstrate {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(0),
            stops: Mutex::new(HashMap::new()),
        }
    }

    /// Binds to the runtime of the calling context.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| PanelError::HostError {
            message: format!("no tokio runtime available: {}", e),
        })?;
        Ok(Self::new(runtime))
    }

    pub fn active_tasks(&self) -> usize {
        self.stops.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl TaskSubstrate for TokioTaskSubstrate {
    fn schedule_periodic(
        &self,
        callback: TaskCallback,
        initial_delay: Duration,
        period: Duration,
    ) -> TaskHandle {
        let handle = TaskHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        self.stops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, stop_tx);

        self.runtime.spawn(async move {
            tokio::select! {
                _ = stop_rx.changed() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }

            let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                        callback();
                    }
                }
            }
        });
        handle
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        let stop = self
            .stops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        match stop {
            Some(stop) => {
                let _ = stop.send(true);
                true
            }
            None => false,
        }
    }
}

/// Length of one host tick for the cooperative scheduler (20 per second).
pub const DEFAULT_TICK_LENGTH: Duration = Duration::from_millis(50);

struct CooperativeTask {
    callback: TaskCallback,
    next_run: u64,
    period: u64,
}

#[derive(Default)]
struct CooperativeState {
    current_tick: u64,
    next_id: u64,
    tasks: BTreeMap<TaskHandle, CooperativeTask>,
}

/// Host-driven task substrate: nothing runs until the host calls
/// [`CooperativeScheduler::advance`], the way a game loop pumps its scheduler.
/// Durations are rounded up to whole ticks; periods are at least one tick.
pub struct CooperativeScheduler {
    tick_length: Duration,
    state: Mutex<CooperativeState>,
}

impl CooperativeScheduler {
    pub fn new(tick_length: Duration) -> Self {
        Self {
            tick_length: tick_length.max(Duration::from_millis(1)),
            state: Mutex::new(CooperativeState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CooperativeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ticks_for(&self, duration: Duration) -> u64 {
        let tick = self.tick_length.as_nanos();
        let ticks = duration.as_nanos().div_ceil(tick);
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    pub fn current_tick(&self) -> u64 {
        self.lock().current_tick
    }

    pub fn pending_tasks(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.lock().tasks.contains_key(&handle)
    }

    /// Runs `ticks` host ticks, invoking every task that comes due.
    pub fn advance(&self, ticks: u64) {
        for _ in 0..ticks {
            self.run_tick();
        }
    }

    pub fn advance_by(&self, elapsed: Duration) {
        self.advance(self.ticks_for(elapsed));
    }

    fn run_tick(&self) {
        let due: Vec<(TaskHandle, TaskCallback)> = {
            let mut state = self.lock();
            state.current_tick += 1;
            let now = state.current_tick;
            state
                .tasks
                .iter_mut()
                .filter(|(_, task)| task.next_run <= now)
                .map(|(handle, task)| {
                    task.next_run = now + task.period;
                    (*handle, task.callback.clone())
                })
                .collect()
        };

        for (handle, callback) in due {
            // An earlier callback in this tick may have cancelled it.
            if self.is_scheduled(handle) {
                callback();
            }
        }
    }
}

impl Default for CooperativeScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_LENGTH)
    }
}

impl TaskSubstrate for CooperativeScheduler {
    fn schedule_periodic(
        &self,
        callback: TaskCallback,
        initial_delay: Duration,
        period: Duration,
    ) -> TaskHandle {
        let delay = self.ticks_for(initial_delay);
        let period = self.ticks_for(period).max(1);
        let mut state = self.lock();
        state.next_id += 1;
        let handle = TaskHandle(state.next_id);
        let next_run = state.current_tick + delay.max(1);
        state.tasks.insert(
            handle,
            CooperativeTask {
                callback,
                next_run,
                period,
            },
        );
        handle
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        self.lock().tasks.remove(&handle).is_some()
    }
}
