use crate::config::RefreshSettings;
use crate::core::session::{run_guarded, Session, TeardownCause};
use crate::domain::ports::{HostServices, TaskCallback, TaskHandle};
use std::sync::{Arc, Weak};

/// Periodic refresh for one session: every tick runs each entry's `on_tick`
/// and redraws its slot.
pub struct RefreshScheduler;

impl RefreshScheduler {
    /// Registers the refresh task with the host. The task holds only a weak
    /// reference, so a dropped session turns remaining ticks into no-ops.
    pub(crate) fn start(
        host: &HostServices,
        session: &Arc<Session>,
        settings: RefreshSettings,
    ) -> TaskHandle {
        let weak: Weak<Session> = Arc::downgrade(session);
        let tick_host = host.clone();
        let callback: TaskCallback = Arc::new(move || {
            if let Some(session) = weak.upgrade() {
                Self::tick(&tick_host, &session);
            }
        });

        let handle = host
            .tasks
            .schedule_periodic(callback, settings.initial_delay, settings.period);
        tracing::debug!(
            "⏱️ Scheduled {} for {} (delay {:?}, period {:?})",
            handle,
            session.user_id(),
            settings.initial_delay,
            settings.period
        );
        handle
    }

    /// One refresh pass. Skipped, not queued, when the previous tick of the
    /// same session is still running; a no-op once the session is closed.
    pub(crate) fn tick(host: &HostServices, session: &Arc<Session>) {
        if session.is_closed() {
            return;
        }
        if session.held_by_current_thread() {
            tracing::debug!("Skipping tick raised from a callback of {}", session.user_id());
            return;
        }
        let Some(tick_slot) = session.begin_tick() else {
            tracing::debug!("Skipping overlapping tick for {}", session.user_id());
            return;
        };

        let close_requested = {
            let mut inner = session.lock();
            if inner.state.is_closed() {
                return;
            }
            let user = session.user_id();
            let tick = session.ticks() + 1;
            let mut close_requested = false;
            for slot in inner.panel.slots() {
                if let Some(entry) = inner.panel.entry_at_mut(slot) {
                    match run_guarded("on_tick", || entry.tick(user, tick)) {
                        Ok(requested) => close_requested |= requested,
                        Err(e) => tracing::warn!("⚠️ {} (slot {}, user {})", e, slot, user),
                    }
                }
                if let Err(e) = inner.refresh_slot(host, user, slot) {
                    tracing::warn!("⚠️ Skipped redraw of slot {} this tick: {}", slot, e);
                }
            }
            session.record_tick();
            close_requested
        };
        drop(tick_slot);

        session.finish_deferred_close(host);
        if close_requested {
            tracing::debug!("Tick handler of {} requested close", session.user_id());
            session.close(host, TeardownCause::Forced);
        }
    }
}
