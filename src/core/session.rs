use crate::config::RefreshSettings;
use crate::core::registry::RegistryShared;
use crate::domain::model::{Panel, UserId};
use crate::domain::ports::{HostServices, SubscriptionId, TaskHandle};
use crate::domain::surface::{RenderedSurface, SurfaceId};
use crate::utils::error::{PanelError, Result};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

thread_local! {
    /// Addresses of the sessions whose lock this thread currently holds.
    static HELD_SESSIONS: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Public view of an open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub user_id: UserId,
    pub surface_id: SurfaceId,
    pub opened_at: DateTime<Utc>,
    pub refresh: RefreshSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Active,
    Closed,
}

impl SessionState {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TeardownCause {
    /// The host already closed the surface.
    HostClosed,
    /// The core is closing it (explicit close, handler request, failed open).
    Forced,
}

pub(crate) struct SessionInner {
    pub(crate) state: SessionState,
    pub(crate) panel: Panel,
    pub(crate) surface: Option<RenderedSurface>,
    pub(crate) task: Option<TaskHandle>,
    pub(crate) subscription: Option<SubscriptionId>,
    /// Set once the host accepted the surface; `on_close` only runs after that.
    pub(crate) presented: bool,
    pub(crate) opened: bool,
}

impl SessionInner {
    /// Re-renders one slot and pushes it to the host. Empty slots are left alone.
    pub(crate) fn refresh_slot(
        &mut self,
        host: &HostServices,
        user: &UserId,
        slot: usize,
    ) -> Result<()> {
        let Some(entry) = self.panel.entry_at(slot) else {
            return Ok(());
        };
        let Some(surface) = self.surface.as_mut() else {
            return Ok(());
        };
        let item = host.render.render(entry)?;
        host.render.update_slot(surface, slot, item)?;
        host.display.sync_slot(user, surface, slot);
        Ok(())
    }
}

/// Exclusive access to a session's state. While it lives, the owning thread
/// is recorded so callbacks that call back into their own session are
/// detected instead of blocking on the mutex.
pub(crate) struct SessionGuard<'a> {
    inner: MutexGuard<'a, SessionInner>,
    key: usize,
}

impl Deref for SessionGuard<'_> {
    type Target = SessionInner;

    fn deref(&self) -> &SessionInner {
        &self.inner
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut SessionInner {
        &mut self.inner
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        HELD_SESSIONS.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|key| *key == self.key) {
                held.remove(pos);
            }
        });
    }
}

/// Claim on the session's single tick slot, released on drop even if the
/// tick unwinds.
pub(crate) struct TickGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// One open panel for one user. All mutable state sits behind a single
/// per-session mutex, so events, ticks and teardown never interleave.
pub(crate) struct Session {
    handle: SessionHandle,
    registry: Weak<RegistryShared>,
    closed: AtomicBool,
    tick_running: AtomicBool,
    ticks: AtomicU64,
    /// Close requested from inside one of this session's own callbacks.
    pending_close: Mutex<Option<TeardownCause>>,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub(crate) fn new(
        handle: SessionHandle,
        registry: Weak<RegistryShared>,
        panel: Panel,
        surface: RenderedSurface,
    ) -> Self {
        Self {
            handle,
            registry,
            closed: AtomicBool::new(false),
            tick_running: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            pending_close: Mutex::new(None),
            inner: Mutex::new(SessionInner {
                state: SessionState::Active,
                panel,
                surface: Some(surface),
                task: None,
                subscription: None,
                presented: false,
                opened: false,
            }),
        }
    }

    pub(crate) fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub(crate) fn user_id(&self) -> &UserId {
        &self.handle.user_id
    }

    pub(crate) fn surface_id(&self) -> SurfaceId {
        self.handle.surface_id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::AcqRel);
    }

    fn key(&self) -> usize {
        self as *const Session as usize
    }

    /// True while this thread holds the session lock, i.e. inside one of the
    /// session's own callbacks. Locking again from here would never return.
    pub(crate) fn held_by_current_thread(&self) -> bool {
        let key = self.key();
        HELD_SESSIONS.with(|held| held.borrow().contains(&key))
    }

    pub(crate) fn lock(&self) -> SessionGuard<'_> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let key = self.key();
        HELD_SESSIONS.with(|held| held.borrow_mut().push(key));
        SessionGuard { inner, key }
    }

    /// Claims the tick slot; `None` while another tick of this session runs.
    pub(crate) fn begin_tick(&self) -> Option<TickGuard<'_>> {
        self.tick_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard {
                running: &self.tick_running,
            })
    }

    /// Fires `on_open` once. An error here is returned to the caller, which
    /// tears the session down.
    pub(crate) fn fire_open_locked(&self, inner: &mut SessionInner) -> Result<()> {
        if inner.opened || inner.state.is_closed() {
            return Ok(());
        }
        inner.opened = true;
        let user = self.user_id();
        run_guarded("on_open", || inner.panel.fire_open(user))
    }

    /// Closes the session: teardown first, then the registry entry.
    ///
    /// Called from inside one of the session's own callbacks, the close is
    /// recorded and carried out by [`Session::finish_deferred_close`] once the
    /// callback's caller has released the lock. Returns whether this call
    /// closed (or scheduled the close of) a live session.
    pub(crate) fn close(self: &Arc<Self>, host: &HostServices, cause: TeardownCause) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.held_by_current_thread() {
            let mut pending = self
                .pending_close
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            tracing::debug!("Deferring close of {} until its callback returns", self.surface_id());
            pending.get_or_insert(cause);
            return true;
        }
        match self.registry.upgrade() {
            Some(registry) => registry.close_session(self, cause),
            None => self.teardown(host, cause),
        }
    }

    /// Runs a close that a callback requested while the lock was held. Must be
    /// called after the guard is dropped.
    pub(crate) fn finish_deferred_close(self: &Arc<Self>, host: &HostServices) {
        let pending = self
            .pending_close
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cause) = pending {
            self.close(host, cause);
        }
    }

    pub(crate) fn teardown(&self, host: &HostServices, cause: TeardownCause) -> bool {
        let mut inner = self.lock();
        self.teardown_locked(&mut inner, host, cause)
    }

    /// ACTIVE -> CLOSED. Cancels the refresh task and the event subscription
    /// before `on_close` runs; returns false if the session was already closed.
    pub(crate) fn teardown_locked(
        &self,
        inner: &mut SessionInner,
        host: &HostServices,
        cause: TeardownCause,
    ) -> bool {
        if inner.state.is_closed() {
            return false;
        }
        inner.state = SessionState::Closed;
        self.closed.store(true, Ordering::Release);

        if let Some(task) = inner.task.take() {
            if !host.tasks.cancel(task) {
                tracing::debug!("Refresh {} for {} was already cancelled", task, self.user_id());
            }
        }
        if let Some(subscription) = inner.subscription.take() {
            if !host.events.unsubscribe(subscription) {
                tracing::debug!("Subscription {} for {} was already gone", subscription, self.user_id());
            }
        }

        let user = self.user_id();
        if inner.presented {
            if let Err(e) = run_guarded("on_close", || inner.panel.fire_close(user)) {
                tracing::warn!("⚠️ {} (session for {} still released)", e, user);
            }
        }

        if cause == TeardownCause::Forced && inner.presented {
            host.display.dismiss(user, self.surface_id());
        }
        inner.surface = None;

        tracing::info!(
            "🔒 Closed panel '{}' for {} after {} ticks ({:?})",
            inner.panel.title(),
            user,
            self.ticks(),
            cause
        );
        true
    }
}

/// Runs a user callback, turning both errors and panics into `CallbackError`.
pub(crate) fn run_guarded<T, F>(hook: &str, callback: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PanelError::CallbackError {
            hook: hook.to_string(),
            message: format!("{:#}", e),
        }),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(PanelError::CallbackError {
                hook: hook.to_string(),
                message: format!("panicked: {}", message),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let id = SurfaceId::from_raw(9);
        let handle = SessionHandle {
            user_id: UserId::new("u1"),
            surface_id: id,
            opened_at: Utc::now(),
            refresh: RefreshSettings::default(),
        };
        let panel = Panel::new(9, "t").unwrap();
        Session::new(handle, Weak::new(), panel, RenderedSurface::new(id, "t", 9))
    }

    #[test]
    fn test_lock_marks_owning_thread_only() {
        let session = session();
        assert!(!session.held_by_current_thread());
        {
            let _guard = session.lock();
            assert!(session.held_by_current_thread());
            std::thread::scope(|scope| {
                scope
                    .spawn(|| assert!(!session.held_by_current_thread()))
                    .join()
                    .unwrap();
            });
        }
        assert!(!session.held_by_current_thread());
    }

    #[test]
    fn test_tick_slot_is_exclusive_and_released_on_unwind() {
        let session = session();
        {
            let _tick = session.begin_tick().unwrap();
            assert!(session.begin_tick().is_none());
        }

        let unwound = catch_unwind(AssertUnwindSafe(|| {
            let _tick = session.begin_tick().unwrap();
            let _guard = session.lock();
            panic!("render blew up");
        }));
        assert!(unwound.is_err());
        assert!(session.begin_tick().is_some());
        assert!(!session.held_by_current_thread());
    }

    #[test]
    fn test_run_guarded_passes_values_through() {
        let value = run_guarded("on_tick", || Ok(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_run_guarded_wraps_errors() {
        let err = run_guarded::<(), _>("on_interact", || anyhow::bail!("boom")).unwrap_err();
        match err {
            PanelError::CallbackError { hook, message } => {
                assert_eq!(hook, "on_interact");
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_run_guarded_catches_panics() {
        let err = run_guarded::<(), _>("on_close", || panic!("handler exploded")).unwrap_err();
        assert!(err.to_string().contains("handler exploded"));
    }
}
