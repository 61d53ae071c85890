use crate::domain::event::{EventKind, HostEvent};
use crate::domain::model::{PanelEntry, UserId};
use crate::domain::surface::{RenderedSurface, SurfaceId, VisualItem};
use crate::utils::error::{PanelError, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Turns entries into host visuals. Must be deterministic for a given entry
/// snapshot.
pub trait RenderAdapter: Send + Sync {
    fn render(&self, entry: &PanelEntry) -> Result<VisualItem>;

    fn render_title(&self, title: &str) -> String {
        title.to_string()
    }

    fn update_slot(
        &self,
        surface: &mut RenderedSurface,
        slot: usize,
        item: VisualItem,
    ) -> Result<()> {
        if surface.set_slot(slot, Some(item)) {
            Ok(())
        } else {
            Err(PanelError::RenderError {
                slot,
                message: format!("slot outside surface of size {}", surface.size()),
            })
        }
    }
}

/// The host's presentation layer: where a rendered surface becomes visible.
pub trait SurfaceHost: Send + Sync {
    fn present(&self, user: &UserId, surface: &RenderedSurface) -> Result<()>;

    /// Called after a slot of an already presented surface changed.
    fn sync_slot(&self, _user: &UserId, _surface: &RenderedSurface, _slot: usize) {}

    /// Called when the core closes a surface the host did not close itself.
    fn dismiss(&self, _user: &UserId, _surface: SurfaceId) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

pub trait EventListener: Send + Sync {
    fn handle(&self, event: &mut HostEvent);
}

/// Host event delivery. Listeners only receive the kinds they subscribed to.
pub trait EventSubstrate: Send + Sync {
    fn subscribe(&self, kinds: &[EventKind], listener: Arc<dyn EventListener>) -> SubscriptionId;

    /// Returns false when the subscription was already gone.
    fn unsubscribe(&self, subscription: SubscriptionId) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

pub type TaskCallback = Arc<dyn Fn() + Send + Sync>;

/// Host periodic task scheduling.
pub trait TaskSubstrate: Send + Sync {
    fn schedule_periodic(
        &self,
        callback: TaskCallback,
        initial_delay: Duration,
        period: Duration,
    ) -> TaskHandle;

    /// Returns false when the task was already cancelled.
    fn cancel(&self, handle: TaskHandle) -> bool;
}

/// The full set of host capabilities a session registry runs against.
#[derive(Clone)]
pub struct HostServices {
    pub render: Arc<dyn RenderAdapter>,
    pub display: Arc<dyn SurfaceHost>,
    pub events: Arc<dyn EventSubstrate>,
    pub tasks: Arc<dyn TaskSubstrate>,
}

impl HostServices {
    pub fn new(
        render: Arc<dyn RenderAdapter>,
        display: Arc<dyn SurfaceHost>,
        events: Arc<dyn EventSubstrate>,
        tasks: Arc<dyn TaskSubstrate>,
    ) -> Self {
        Self {
            render,
            display,
            events,
            tasks,
        }
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}
