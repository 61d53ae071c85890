use crate::config::{OpenHookMode, RefreshSettings, SessionConfig};
use crate::core::router::EventRouter;
use crate::core::scheduler::RefreshScheduler;
use crate::core::session::{Session, SessionHandle, TeardownCause};
use crate::domain::model::{Panel, UserId};
use crate::domain::ports::{HostServices, RenderAdapter};
use crate::domain::surface::{RenderedSurface, SurfaceId};
use crate::utils::error::{PanelError, Result};
use crate::utils::validation::Validate;
use chrono::Utc;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) struct RegistryShared {
    host: HostServices,
    config: SessionConfig,
    sessions: RwLock<HashMap<UserId, Arc<Session>>>,
}

impl RegistryShared {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<UserId, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<UserId, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, user_id: &UserId) -> Option<Arc<Session>> {
        self.read().get(user_id).cloned()
    }

    /// Tears the session down, then drops its registry entry. The entry is only
    /// removed after the task and subscription are released. Callers go through
    /// [`Session::close`], which never gets here while the lock is held.
    pub(crate) fn close_session(&self, session: &Arc<Session>, cause: TeardownCause) -> bool {
        let closed = session.teardown(&self.host, cause);
        self.release(session);
        closed
    }

    fn release(&self, session: &Arc<Session>) {
        let mut sessions = self.write();
        let is_current = sessions
            .get(session.user_id())
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if is_current {
            sessions.remove(session.user_id());
        }
    }
}

/// Process-wide map of open panel sessions, one per user.
///
/// The map lock only guards the key space; each session has its own lock, so
/// work on one user's panel never blocks another's.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<RegistryShared>,
}

impl SessionRegistry {
    pub fn new(host: HostServices, config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                host,
                config,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn with_defaults(host: HostServices) -> Self {
        Self::new(host, SessionConfig::default())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Opens `panel` for `user_id` with the configured refresh settings.
    pub fn open(&self, user_id: impl Into<UserId>, panel: Panel) -> Result<SessionHandle> {
        let refresh = self.shared.config.refresh;
        self.open_with(user_id, panel, refresh)
    }

    /// Opens `panel` for `user_id`.
    ///
    /// Rendering happens before anything becomes host-visible, so a render
    /// failure leaves no trace. A second open for a user with a live session
    /// fails with `AlreadyOpenError` and leaves the first session untouched.
    pub fn open_with(
        &self,
        user_id: impl Into<UserId>,
        panel: Panel,
        refresh: RefreshSettings,
    ) -> Result<SessionHandle> {
        let user_id = user_id.into();
        refresh.validate()?;
        if self.shared.read().contains_key(&user_id) {
            return Err(PanelError::AlreadyOpenError {
                user: user_id.to_string(),
            });
        }

        let surface_id = SurfaceId::next();
        let surface = render_surface(self.shared.host.render.as_ref(), surface_id, &panel)?;
        let handle = SessionHandle {
            user_id: user_id.clone(),
            surface_id,
            opened_at: Utc::now(),
            refresh,
        };
        let title = panel.title().to_string();
        let session = Arc::new(Session::new(
            handle.clone(),
            Arc::downgrade(&self.shared),
            panel,
            surface,
        ));

        match self.shared.write().entry(user_id.clone()) {
            Entry::Occupied(_) => {
                return Err(PanelError::AlreadyOpenError {
                    user: user_id.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&session));
            }
        }

        if let Err(e) = self.activate(&session, refresh) {
            tracing::error!("❌ Failed to open panel '{}' for {}: {}", title, user_id, e);
            session.close(&self.shared.host, TeardownCause::Forced);
            return Err(e);
        }

        tracing::info!("📋 Opened panel '{}' for {} on {}", title, user_id, surface_id);
        // `on_open` may already have closed it.
        session.finish_deferred_close(&self.shared.host);
        Ok(handle)
    }

    /// Present, subscribe, schedule, and (in immediate mode) fire `on_open`,
    /// all under the session lock so no event or tick sees a partial session.
    fn activate(&self, session: &Arc<Session>, refresh: RefreshSettings) -> Result<()> {
        let host = &self.shared.host;
        let mut inner = session.lock();

        let surface = inner.surface.as_ref().ok_or_else(|| PanelError::HostError {
            message: format!("surface for {} was already discarded", session.user_id()),
        })?;
        host.display.present(session.user_id(), surface)?;
        inner.presented = true;

        let router = Arc::new(EventRouter::new(Arc::clone(session), host.clone()));
        let kinds = EventRouter::subscribed_kinds(self.shared.config.open_hook);
        inner.subscription = Some(host.events.subscribe(kinds, router));
        inner.task = Some(RefreshScheduler::start(host, session, refresh));

        if self.shared.config.open_hook == OpenHookMode::Immediate {
            session.fire_open_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Closes the user's session. Safe to call repeatedly; returns whether this
    /// call performed the teardown.
    ///
    /// From inside one of the session's own callbacks the teardown runs as
    /// soon as that callback returns.
    pub fn close(&self, user_id: &UserId) -> bool {
        match self.shared.get(user_id) {
            Some(session) => session.close(&self.shared.host, TeardownCause::Forced),
            None => false,
        }
    }

    pub fn close_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = self.shared.read().values().cloned().collect();
        sessions
            .iter()
            .filter(|session| session.close(&self.shared.host, TeardownCause::Forced))
            .count()
    }

    pub fn lookup(&self, user_id: &UserId) -> Option<SessionHandle> {
        self.shared
            .get(user_id)
            .filter(|session| !session.is_closed())
            .map(|session| session.handle().clone())
    }

    pub fn is_open(&self, user_id: &UserId) -> bool {
        self.lookup(user_id).is_some()
    }

    pub fn list(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .shared
            .read()
            .values()
            .filter(|session| !session.is_closed())
            .map(|session| session.user_id().clone())
            .collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the user's current surface. `None` when called from one
    /// of that session's own callbacks, where the surface is mid-update.
    pub fn surface(&self, user_id: &UserId) -> Option<RenderedSurface> {
        let session = self.shared.get(user_id)?;
        if session.held_by_current_thread() {
            tracing::debug!("Surface of {} requested from its own callback", user_id);
            return None;
        }
        let inner = session.lock();
        inner.surface.clone()
    }

    /// Number of refresh ticks the user's session has completed.
    pub fn tick_count(&self, user_id: &UserId) -> Option<u64> {
        let session = self.shared.get(user_id)?;
        (!session.is_closed()).then(|| session.ticks())
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("open_sessions", &self.list())
            .field("config", &self.shared.config)
            .finish()
    }
}

fn render_surface(
    render: &dyn RenderAdapter,
    id: SurfaceId,
    panel: &Panel,
) -> Result<RenderedSurface> {
    let mut surface = RenderedSurface::new(id, render.render_title(panel.title()), panel.size());
    for entry in panel.entries() {
        let item = render.render(entry)?;
        render.update_slot(&mut surface, entry.slot(), item)?;
    }
    Ok(surface)
}
