// Adapters layer: in-process implementations of the host ports. Real hosts
// plug in their own; these back the CLI and the tests.

pub mod display;
pub mod event_bus;
pub mod render;
pub mod task;

pub use display::RecordingSurfaceHost;
pub use event_bus::LocalEventBus;
pub use render::TextRenderAdapter;
pub use task::{CooperativeScheduler, TokioTaskSubstrate};
