pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{
    CooperativeScheduler, LocalEventBus, RecordingSurfaceHost, TextRenderAdapter,
    TokioTaskSubstrate,
};
pub use config::{OpenHookMode, RefreshSettings, RenderSettings, SessionConfig};
pub use crate::core::{EventRouter, RefreshScheduler, SessionHandle, SessionRegistry, SessionState};
pub use domain::event::{ClickKind, CloseEvent, EventKind, HostEvent, InteractionEvent, OpenEvent};
pub use domain::model::{
    EntryDisplay, InteractionContext, Material, Panel, PanelEntry, TickContext, UserId,
};
pub use domain::ports::{
    EventListener, EventSubstrate, HostServices, RenderAdapter, SubscriptionId, SurfaceHost,
    TaskCallback, TaskHandle, TaskSubstrate,
};
pub use domain::surface::{RenderedSurface, SurfaceId, VisualItem};
pub use utils::error::{PanelError, Result};
