use crate::config::OpenHookMode;
use crate::core::session::{run_guarded, Session, TeardownCause};
use crate::domain::event::{EventKind, HostEvent, InteractionEvent};
use crate::domain::ports::{EventListener, HostServices};
use std::sync::Arc;

/// Per-session event listener. Routes clicks to entries, fires the open hook
/// and tears the session down on the matching close event.
pub struct EventRouter {
    session: Arc<Session>,
    host: HostServices,
}

impl EventRouter {
    pub(crate) fn new(session: Arc<Session>, host: HostServices) -> Self {
        Self { session, host }
    }

    /// The kinds a session subscribes to; close unsubscribes exactly these.
    pub fn subscribed_kinds(mode: OpenHookMode) -> &'static [EventKind] {
        match mode {
            OpenHookMode::Immediate => &[EventKind::Interaction, EventKind::Close],
            OpenHookMode::OnOpenEvent => &[EventKind::Interaction, EventKind::Close, EventKind::Open],
        }
    }

    fn route_interaction(&self, click: &mut InteractionEvent) {
        let user = self.session.user_id();
        let close_requested = {
            let mut inner = self.session.lock();
            if inner.state.is_closed() {
                return;
            }
            click.consume();

            let Some(entry) = inner.panel.entry_at_mut(click.slot) else {
                tracing::debug!("Click on empty slot {} of {}", click.slot, click.target_surface);
                return;
            };

            tracing::debug!("👆 {} clicked slot {} ({:?})", user, click.slot, click.click);
            let event: &InteractionEvent = click;
            let close_requested = match run_guarded("on_interact", || entry.interact(event)) {
                Ok(close_requested) => close_requested,
                Err(e) => {
                    tracing::warn!("⚠️ {} (slot {}, user {})", e, click.slot, user);
                    false
                }
            };

            if let Err(e) = inner.refresh_slot(&self.host, user, click.slot) {
                tracing::warn!("⚠️ Skipped redraw after click: {}", e);
            }
            close_requested
        };

        self.session.finish_deferred_close(&self.host);
        if close_requested {
            tracing::debug!("Click handler on slot {} requested close", click.slot);
            self.close(TeardownCause::Forced);
        }
    }

    fn route_open(&self) {
        let failed = {
            let mut inner = self.session.lock();
            match self.session.fire_open_locked(&mut inner) {
                Ok(()) => false,
                Err(e) => {
                    tracing::error!("❌ {}; closing panel for {}", e, self.session.user_id());
                    true
                }
            }
        };
        self.session.finish_deferred_close(&self.host);
        if failed {
            self.close(TeardownCause::Forced);
        }
    }

    fn close(&self, cause: TeardownCause) {
        self.session.close(&self.host, cause);
    }
}

impl EventListener for EventRouter {
    fn handle(&self, event: &mut HostEvent) {
        if self.session.is_closed() || event.target_surface() != self.session.surface_id() {
            return;
        }

        let kind = event.kind();
        match event {
            // Deferred by the session itself when raised from one of its callbacks.
            HostEvent::Close(_) => self.close(TeardownCause::HostClosed),
            _ if self.session.held_by_current_thread() => {
                tracing::debug!(
                    "Ignoring {:?} raised from a callback of {}",
                    kind,
                    self.session.surface_id()
                );
            }
            HostEvent::Interaction(click) => self.route_interaction(click),
            HostEvent::Open(_) => self.route_open(),
        }
    }
}
