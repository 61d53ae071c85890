use crate::domain::model::UserId;
use crate::domain::ports::SurfaceHost;
use crate::domain::surface::{RenderedSurface, SurfaceId};
use crate::utils::error::{PanelError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// In-memory presentation layer: keeps the surface each user currently sees.
#[derive(Default)]
pub struct RecordingSurfaceHost {
    views: Mutex<HashMap<UserId, RenderedSurface>>,
    presented: AtomicUsize,
    dismissed: AtomicUsize,
    reject: AtomicBool,
}

impl RecordingSurfaceHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `present` calls fail, as a host refusing to show a view.
    pub fn reject_presentations(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn view(&self, user: &UserId) -> Option<RenderedSurface> {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .cloned()
    }

    pub fn presented_count(&self) -> usize {
        self.presented.load(Ordering::SeqCst)
    }

    pub fn dismissed_count(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }

    /// Host-side close, e.g. the user closed the window. The caller is expected
    /// to dispatch the matching close event.
    pub fn close_view(&self, user: &UserId) -> Option<SurfaceId> {
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user)
            .map(|surface| surface.id())
    }
}

impl SurfaceHost for RecordingSurfaceHost {
    fn present(&self, user: &UserId, surface: &RenderedSurface) -> Result<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(PanelError::HostError {
                message: format!("host refused to present {} to {}", surface.id(), user),
            });
        }
        self.views
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.clone(), surface.clone());
        self.presented.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn sync_slot(&self, user: &UserId, surface: &RenderedSurface, slot: usize) {
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(view) = views.get_mut(user).filter(|view| view.id() == surface.id()) {
            view.set_slot(slot, surface.slot(slot).cloned());
        }
    }

    fn dismiss(&self, user: &UserId, surface: SurfaceId) {
        let mut views = self.views.lock().unwrap_or_else(PoisonError::into_inner);
        if views.get(user).is_some_and(|view| view.id() == surface) {
            views.remove(user);
        }
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}
