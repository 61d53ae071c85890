// Domain layer: panel models, host events, rendered surfaces and the ports the
// host must provide. Nothing in here touches a live session.

pub mod event;
pub mod model;
pub mod ports;
pub mod surface;
