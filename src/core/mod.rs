pub mod registry;
pub mod router;
pub mod scheduler;
pub mod session;

pub use crate::domain::model::{EntryDisplay, Panel, PanelEntry, UserId};
pub use crate::domain::ports::{EventSubstrate, HostServices, RenderAdapter, SurfaceHost, TaskSubstrate};
pub use crate::utils::error::Result;
pub use registry::SessionRegistry;
pub use router::EventRouter;
pub use scheduler::RefreshScheduler;
pub use session::{SessionHandle, SessionState};
