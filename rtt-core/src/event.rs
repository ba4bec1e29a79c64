//! Event queue and the callback objects handed to platform capabilities.
//!
//! Capabilities never call into the orchestrator directly. Each callback posts a tagged
//! [`Event`] onto the orchestrator's queue, so every handler runs on the one task that
//! drains it.

use tokio::sync::mpsc;

use crate::ranging::RangingResult;
use crate::session::{AwareSession, DiscoverySession, PeerHandle, Role, SessionTag};

/// Everything the orchestrator reacts to.
pub enum Event {
    AvailabilityChanged(bool),
    StartFlow(Role),
    PermissionsResult {
        tag: SessionTag,
        granted: bool,
    },
    Attached {
        tag: SessionTag,
        session: Box<dyn AwareSession>,
    },
    AttachFailed {
        tag: SessionTag,
    },
    AwareTerminated {
        tag: SessionTag,
    },
    /// Publish or subscribe started; which one is decided by the tag.
    DiscoveryStarted {
        tag: SessionTag,
        session: Box<dyn DiscoverySession>,
    },
    ServiceDiscovered {
        tag: SessionTag,
        peer: PeerHandle,
        distance_mm: Option<i32>,
    },
    DiscoveryTerminated {
        tag: SessionTag,
    },
    RangingTick {
        generation: u64,
    },
    RangingResults {
        generation: u64,
        results: Vec<RangingResult>,
    },
    RangingFailed {
        generation: u64,
        code: i32,
    },
    Shutdown,
}

impl Event {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::AvailabilityChanged(_) => "availability_changed",
            Event::StartFlow(_) => "start_flow",
            Event::PermissionsResult { .. } => "permissions_result",
            Event::Attached { .. } => "attached",
            Event::AttachFailed { .. } => "attach_failed",
            Event::AwareTerminated { .. } => "aware_terminated",
            Event::DiscoveryStarted { .. } => "discovery_started",
            Event::ServiceDiscovered { .. } => "service_discovered",
            Event::DiscoveryTerminated { .. } => "discovery_terminated",
            Event::RangingTick { .. } => "ranging_tick",
            Event::RangingResults { .. } => "ranging_results",
            Event::RangingFailed { .. } => "ranging_failed",
            Event::Shutdown => "shutdown",
        }
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Sending side of the orchestrator queue.
#[derive(Clone)]
pub struct EventSender(mpsc::UnboundedSender<Event>);

impl EventSender {
    /// Returns false once the orchestrator has stopped.
    pub fn send(&self, event: Event) -> bool {
        self.0.send(event).is_ok()
    }
}

pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), rx)
}

/// Outcome of one attach request.
#[derive(Clone)]
pub struct AttachCallback {
    tag: SessionTag,
    events: EventSender,
}

impl AttachCallback {
    pub(crate) fn new(tag: SessionTag, events: EventSender) -> Self {
        Self { tag, events }
    }

    pub fn tag(&self) -> SessionTag {
        self.tag
    }

    pub fn on_attached(&self, session: Box<dyn AwareSession>) {
        if let Err(mpsc::error::SendError(Event::Attached { session, .. })) =
            self.events.0.send(Event::Attached {
                tag: self.tag,
                session,
            })
        {
            // Nobody left to own it.
            session.close();
        }
    }

    pub fn on_attach_failed(&self) {
        self.events.send(Event::AttachFailed { tag: self.tag });
    }

    pub fn on_aware_session_terminated(&self) {
        self.events.send(Event::AwareTerminated { tag: self.tag });
    }
}

/// Outcome and discoveries of one publish or subscribe request.
#[derive(Clone)]
pub struct DiscoveryCallback {
    tag: SessionTag,
    events: EventSender,
}

impl DiscoveryCallback {
    pub(crate) fn new(tag: SessionTag, events: EventSender) -> Self {
        Self { tag, events }
    }

    pub fn tag(&self) -> SessionTag {
        self.tag
    }

    pub fn on_session_started(&self, session: Box<dyn DiscoverySession>) {
        if let Err(mpsc::error::SendError(Event::DiscoveryStarted { session, .. })) =
            self.events.0.send(Event::DiscoveryStarted {
                tag: self.tag,
                session,
            })
        {
            session.close();
        }
    }

    pub fn on_service_discovered(&self, peer: PeerHandle) {
        self.events.send(Event::ServiceDiscovered {
            tag: self.tag,
            peer,
            distance_mm: None,
        });
    }

    pub fn on_service_discovered_within_range(&self, peer: PeerHandle, distance_mm: i32) {
        self.events.send(Event::ServiceDiscovered {
            tag: self.tag,
            peer,
            distance_mm: Some(distance_mm),
        });
    }

    pub fn on_session_terminated(&self) {
        self.events.send(Event::DiscoveryTerminated { tag: self.tag });
    }
}

/// Outcome of one ranging request.
#[derive(Clone)]
pub struct RangingCallback {
    generation: u64,
    events: EventSender,
}

impl RangingCallback {
    pub(crate) fn new(generation: u64, events: EventSender) -> Self {
        Self { generation, events }
    }

    pub fn on_ranging_results(&self, results: Vec<RangingResult>) {
        self.events.send(Event::RangingResults {
            generation: self.generation,
            results,
        });
    }

    /// Whole-request failure, as opposed to a failed per-peer entry.
    pub fn on_ranging_failure(&self, code: i32) {
        self.events.send(Event::RangingFailed {
            generation: self.generation,
            code,
        });
    }
}

/// Answer to one permission prompt.
pub struct PermissionCallback {
    tag: SessionTag,
    events: EventSender,
}

impl PermissionCallback {
    pub(crate) fn new(tag: SessionTag, events: EventSender) -> Self {
        Self { tag, events }
    }

    pub fn tag(&self) -> SessionTag {
        self.tag
    }

    /// One entry per requested permission. An empty list means the request was interrupted.
    pub fn on_permissions_result(&self, grants: &[bool]) {
        let granted = !grants.is_empty() && grants.iter().all(|g| *g);
        self.events.send(Event::PermissionsResult {
            tag: self.tag,
            granted,
        });
    }
}
