use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one rendered surface. Every session open allocates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Host-ready visual for one slot, as produced by a render adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualItem {
    pub kind: String,
    pub amount: u8,
    pub display_name: String,
    pub lore: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_data: Option<u16>,
}

/// The rendered, host-visible form of a panel. Owned by exactly one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedSurface {
    id: SurfaceId,
    title: String,
    slots: Vec<Option<VisualItem>>,
}

impl RenderedSurface {
    pub fn new(id: SurfaceId, title: impl Into<String>, size: usize) -> Self {
        Self {
            id,
            title: title.into(),
            slots: vec![None; size],
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, slot: usize) -> Option<&VisualItem> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Returns false when the slot lies outside the grid.
    pub fn set_slot(&mut self, slot: usize, item: Option<VisualItem>) -> bool {
        match self.slots.get_mut(slot) {
            Some(cell) => {
                *cell = item;
                true
            }
            None => false,
        }
    }

    pub fn occupied_slots(&self) -> impl Iterator<Item = (usize, &VisualItem)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, item)| item.as_ref().map(|item| (slot, item)))
    }
}
