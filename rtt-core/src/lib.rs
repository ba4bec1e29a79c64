//! Wi-Fi Aware discovery and periodic RTT ranging orchestrator.
//! Host-driven: the platform is injected as capability traits; replies come back as events.

pub mod error;
pub mod event;
pub mod orchestrator;
pub mod permission;
pub mod ranging;
pub mod session;
pub mod status;
pub mod timer;

#[cfg(test)]
mod testing;

pub use error::FlowError;
pub use event::{
    AttachCallback, DiscoveryCallback, Event, EventReceiver, EventSender, PermissionCallback,
    RangingCallback,
};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, OrchestratorHandle, Phase, Platform, RANGING_INTERVAL,
};
pub use permission::{Permission, PermissionGate, REQUIRED_PERMISSIONS};
pub use ranging::{
    first_success, MacAddress, Measurement, RangingRequest, RangingResult, RangingService,
    RangingStatus,
};
pub use session::{
    AwareSession, DiscoverySession, PeerHandle, ProximityDiscoveryService, PublishConfig, Role,
    SessionTag, SubscribeConfig, DEFAULT_MAX_DISTANCE_MM, DEFAULT_SERVICE_NAME,
};
pub use status::{StatusLine, StatusSink};
pub use timer::RepeatingTask;
