use crate::domain::model::UserId;
use crate::domain::surface::SurfaceId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Interaction,
    Close,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClickKind {
    #[default]
    Left,
    Right,
    ShiftLeft,
    ShiftRight,
    Middle,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionEvent {
    pub target_surface: SurfaceId,
    pub slot: usize,
    pub user_id: UserId,
    pub click: ClickKind,
    consumed: bool,
}

impl InteractionEvent {
    pub fn new(target_surface: SurfaceId, slot: usize, user_id: impl Into<UserId>) -> Self {
        Self {
            target_surface,
            slot,
            user_id: user_id.into(),
            click: ClickKind::default(),
            consumed: false,
        }
    }

    pub fn with_click(mut self, click: ClickKind) -> Self {
        self.click = click;
        self
    }

    /// Marks the event as handled so the host skips its default behaviour.
    pub fn consume(&mut self) {
        self.consumed = true;
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub target_surface: SurfaceId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEvent {
    pub target_surface: SurfaceId,
    pub user_id: UserId,
}

/// Everything the host's event substrate can deliver to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Interaction(InteractionEvent),
    Close(CloseEvent),
    Open(OpenEvent),
}

impl HostEvent {
    pub fn click(target_surface: SurfaceId, slot: usize, user_id: impl Into<UserId>) -> Self {
        Self::Interaction(InteractionEvent::new(target_surface, slot, user_id))
    }

    pub fn close(target_surface: SurfaceId, user_id: impl Into<UserId>) -> Self {
        Self::Close(CloseEvent {
            target_surface,
            user_id: user_id.into(),
        })
    }

    pub fn open(target_surface: SurfaceId, user_id: impl Into<UserId>) -> Self {
        Self::Open(OpenEvent {
            target_surface,
            user_id: user_id.into(),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Interaction(_) => EventKind::Interaction,
            Self::Close(_) => EventKind::Close,
            Self::Open(_) => EventKind::Open,
        }
    }

    pub fn target_surface(&self) -> SurfaceId {
        match self {
            Self::Interaction(event) => event.target_surface,
            Self::Close(event) => event.target_surface,
            Self::Open(event) => event.target_surface,
        }
    }

    pub fn user_id(&self) -> &UserId {
        match self {
            Self::Interaction(event) => &event.user_id,
            Self::Close(event) => &event.user_id,
            Self::Open(event) => &event.user_id,
        }
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Interaction(event) if event.is_consumed())
    }
}
