//! Session orchestrator: availability → attach → publish or subscribe → discover → periodic range.
//!
//! Host-driven: platform capabilities are injected through [`Platform`], their replies come
//! back as [`Event`]s, and [`Orchestrator::handle`] applies them one at a time.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::FlowError;
use crate::event::{
    self, AttachCallback, DiscoveryCallback, Event, EventReceiver, EventSender, PermissionCallback,
    RangingCallback,
};
use crate::permission::{Permission, PermissionGate, REQUIRED_PERMISSIONS};
use crate::ranging::{first_success, Measurement, RangingRequest, RangingResult, RangingService};
use crate::session::{
    AwareSession, DiscoverySession, PeerHandle, ProximityDiscoveryService, PublishConfig, Role,
    SessionTag, SubscribeConfig, DEFAULT_MAX_DISTANCE_MM, DEFAULT_SERVICE_NAME,
};
use crate::status::{StatusLine, StatusSink};
use crate::timer::RepeatingTask;

/// Default delay between ranging attempts.
pub const RANGING_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub service_name: String,
    pub ranging_interval: Duration,
    pub min_distance_mm: u32,
    pub max_distance_mm: u32,
    pub publish_ranging_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            ranging_interval: RANGING_INTERVAL,
            min_distance_mm: 0,
            max_distance_mm: DEFAULT_MAX_DISTANCE_MM,
            publish_ranging_enabled: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn publish_config(&self) -> PublishConfig {
        PublishConfig {
            service_name: self.service_name.clone(),
            ranging_enabled: self.publish_ranging_enabled,
        }
    }

    pub fn subscribe_config(&self) -> SubscribeConfig {
        SubscribeConfig {
            service_name: self.service_name.clone(),
            min_distance_mm: Some(self.min_distance_mm),
            max_distance_mm: Some(self.max_distance_mm),
        }
    }
}

/// Platform capabilities the orchestrator drives.
#[derive(Clone)]
pub struct Platform {
    pub discovery: Arc<dyn ProximityDiscoveryService>,
    pub ranging: Arc<dyn RangingService>,
    pub permissions: Arc<dyn PermissionGate>,
    pub status: Arc<dyn StatusSink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingPermission,
    Attaching,
    Attached,
    Publishing,
    Published,
    Subscribing,
    Discovering,
    Ranging,
}

/// A session reference: nothing, a request in flight, or a live session. All three carry
/// the tag of the request that produced them.
enum Slot<T> {
    Empty,
    Pending(SessionTag),
    Live { tag: SessionTag, session: T },
}

impl<T> Slot<T> {
    fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    fn is_live(&self) -> bool {
        matches!(self, Slot::Live { .. })
    }

    fn is_pending(&self, tag: SessionTag) -> bool {
        matches!(self, Slot::Pending(t) if *t == tag)
    }

    fn is_live_with(&self, tag: SessionTag) -> bool {
        matches!(self, Slot::Live { tag: t, .. } if *t == tag)
    }

    fn is_current(&self, tag: SessionTag) -> bool {
        self.is_pending(tag) || self.is_live_with(tag)
    }

    fn session(&self) -> Option<&T> {
        match self {
            Slot::Live { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Reset to empty, handing back a live session so the caller can close it.
    fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, Slot::Empty) {
            Slot::Live { session, .. } => Some(session),
            _ => None,
        }
    }
}

struct ActiveRanging {
    peer: PeerHandle,
    generation: u64,
    task: Option<RepeatingTask>,
}

/// Owns the aware session, the discovery sessions, the current peer and the ranging timer.
///
/// Teardown order is always timer → discovery sessions → aware session.
pub struct Orchestrator {
    platform: Platform,
    config: OrchestratorConfig,
    events: EventSender,
    role: Role,
    phase: Phase,
    aware: Slot<Box<dyn AwareSession>>,
    publish: Slot<Box<dyn DiscoverySession>>,
    subscribe: Slot<Box<dyn DiscoverySession>>,
    ranging: Option<ActiveRanging>,
    /// Tag of the permission prompt still awaiting an answer.
    permission_request: Option<SessionTag>,
    next_tag: u64,
    ranging_generation: u64,
    last_measurement: Option<Measurement>,
    last_error: Option<FlowError>,
}

impl Orchestrator {
    /// `events` must feed the queue this orchestrator is driven from.
    ///
    /// Must be driven from inside a Tokio runtime: starting periodic ranging spawns the
    /// timer task with `tokio::spawn`.
    pub fn new(platform: Platform, config: OrchestratorConfig, events: EventSender) -> Self {
        Self {
            platform,
            config,
            events,
            role: Role::None,
            phase: Phase::Idle,
            aware: Slot::Empty,
            publish: Slot::Empty,
            subscribe: Slot::Empty,
            ranging: None,
            permission_request: None,
            next_tag: 0,
            ranging_generation: 0,
            last_measurement: None,
            last_error: None,
        }
    }

    /// Spawn the orchestrator on its own task. Returns the handle hosts use to feed it.
    ///
    /// The task stops and tears down once [`OrchestratorHandle::shutdown`] is called or the
    /// last handle clone is dropped.
    pub fn spawn(
        platform: Platform,
        config: OrchestratorConfig,
    ) -> (OrchestratorHandle, JoinHandle<()>) {
        let (tx, rx) = event::channel();
        let orchestrator = Orchestrator::new(platform, config, tx.clone());
        let join = tokio::spawn(orchestrator.run(rx));
        let handle = OrchestratorHandle {
            events: tx.clone(),
            _guard: Arc::new(ShutdownOnDrop(tx)),
        };
        (handle, join)
    }

    /// Drain the queue until shutdown. Everything is torn down on exit.
    ///
    /// The orchestrator holds a sender to its own queue, so the loop ends on
    /// `Event::Shutdown` rather than on the channel closing.
    pub async fn run(mut self, mut rx: EventReceiver) {
        self.start();
        while let Some(event) = rx.recv().await {
            if self.handle(event).is_break() {
                return;
            }
        }
        self.stop();
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn has_aware_session(&self) -> bool {
        self.aware.is_live()
    }

    pub fn is_publishing(&self) -> bool {
        self.publish.is_live()
    }

    pub fn is_subscribing(&self) -> bool {
        self.subscribe.is_live()
    }

    /// Peer currently being ranged.
    pub fn ranging_peer(&self) -> Option<PeerHandle> {
        self.ranging.as_ref().map(|r| r.peer)
    }

    pub fn is_ranging(&self) -> bool {
        self.ranging.as_ref().is_some_and(|r| r.task.is_some())
    }

    pub fn last_measurement(&self) -> Option<&Measurement> {
        self.last_measurement.as_ref()
    }

    pub fn last_error(&self) -> Option<&FlowError> {
        self.last_error.as_ref()
    }

    /// Report initial availability. Does not attach.
    pub fn start(&mut self) {
        let available = self.platform.discovery.is_available();
        info!(available, "orchestrator started");
        self.on_availability_changed(available);
    }

    /// Tear everything down.
    pub fn stop(&mut self) {
        self.teardown();
        info!("orchestrator stopped");
    }

    /// Apply one event. Breaks after `Event::Shutdown`.
    ///
    /// Panics outside a Tokio runtime when the event starts periodic ranging.
    pub fn handle(&mut self, event: Event) -> ControlFlow<()> {
        debug!(event = event.kind(), phase = ?self.phase, "handling event");
        let result = match event {
            Event::AvailabilityChanged(available) => {
                self.on_availability_changed(available);
                Ok(())
            }
            Event::StartFlow(role) => self.start_flow(role),
            Event::PermissionsResult { tag, granted } => self.on_permissions_result(tag, granted),
            Event::Attached { tag, session } => self.on_attached(tag, session),
            Event::AttachFailed { tag } => self.on_attach_failed(tag),
            Event::AwareTerminated { tag } => self.on_aware_terminated(tag),
            Event::DiscoveryStarted { tag, session } => {
                self.on_discovery_started(tag, session);
                Ok(())
            }
            Event::ServiceDiscovered {
                tag,
                peer,
                distance_mm,
            } => self.on_service_discovered(tag, peer, distance_mm),
            Event::DiscoveryTerminated { tag } => self.on_discovery_terminated(tag),
            Event::RangingTick { generation } => self.on_ranging_tick(generation),
            Event::RangingResults {
                generation,
                results,
            } => {
                self.on_ranging_results(generation, &results);
                Ok(())
            }
            Event::RangingFailed { generation, code } => self.on_ranging_failure(generation, code),
            Event::Shutdown => {
                self.stop();
                return ControlFlow::Break(());
            }
        };
        if let Err(e) = result {
            self.fail(e);
        }
        ControlFlow::Continue(())
    }

    fn on_availability_changed(&mut self, available: bool) {
        if available {
            self.status("Wi-Fi Aware is available. Select role and start.");
            return;
        }
        info!("Wi-Fi Aware is not available");
        self.status("Wi-Fi Aware is not available");
        self.teardown();
    }

    fn start_flow(&mut self, role: Role) -> Result<(), FlowError> {
        self.stop_periodic_ranging();
        self.close_discovery_sessions();
        self.permission_request = None;
        self.last_measurement = None;
        self.report(StatusLine::RangingResult, "");
        self.report(StatusLine::PeerInfo, "");

        if role == Role::None {
            self.status("Please select a role (Publisher or Subscriber)");
            return Ok(());
        }
        self.role = role;
        info!(%role, "starting flow");
        self.status(&format!("Role: {}. Initializing Wi-Fi Aware...", role));

        if !self.platform.permissions.has_required_permissions() {
            let tag = self.next_tag();
            self.permission_request = Some(tag);
            self.phase = Phase::AwaitingPermission;
            self.platform.permissions.request_permissions(
                &REQUIRED_PERMISSIONS,
                PermissionCallback::new(tag, self.events.clone()),
            );
            return Ok(());
        }
        self.attach()
    }

    fn on_permissions_result(&mut self, tag: SessionTag, granted: bool) -> Result<(), FlowError> {
        if self.permission_request != Some(tag) {
            debug!(%tag, granted, "ignoring answer to a superseded permission prompt");
            return Ok(());
        }
        self.permission_request = None;
        if !granted {
            self.settle_phase();
            return Err(FlowError::PermissionDenied);
        }
        self.attach()
    }

    fn attach(&mut self) -> Result<(), FlowError> {
        if !self.platform.discovery.is_available() {
            self.settle_phase();
            return Err(FlowError::ServiceUnavailable);
        }
        match self.aware {
            Slot::Live { .. } => {
                debug!("already attached, performing selected role");
                return self.dispatch_role();
            }
            Slot::Pending(tag) => {
                debug!(%tag, "attach already in progress");
                return Ok(());
            }
            Slot::Empty => {}
        }
        let tag = self.next_tag();
        self.aware = Slot::Pending(tag);
        self.phase = Phase::Attaching;
        self.status("Attaching to Wi-Fi Aware...");
        self.platform
            .discovery
            .attach(AttachCallback::new(tag, self.events.clone()));
        Ok(())
    }

    fn on_attached(
        &mut self,
        tag: SessionTag,
        session: Box<dyn AwareSession>,
    ) -> Result<(), FlowError> {
        if !self.aware.is_pending(tag) {
            debug!(%tag, "closing aware session from a superseded attach");
            session.close();
            return Ok(());
        }
        info!(%tag, "Wi-Fi Aware session attached");
        self.aware = Slot::Live { tag, session };
        self.phase = Phase::Attached;
        self.status("Wi-Fi Aware session attached.");
        self.dispatch_role()
    }

    fn on_attach_failed(&mut self, tag: SessionTag) -> Result<(), FlowError> {
        if !self.aware.is_pending(tag) {
            debug!(%tag, "ignoring attach failure for a superseded attach");
            return Ok(());
        }
        self.aware = Slot::Empty;
        self.settle_phase();
        Err(FlowError::AttachFailed)
    }

    fn on_aware_terminated(&mut self, tag: SessionTag) -> Result<(), FlowError> {
        if !self.aware.is_current(tag) {
            debug!(%tag, "ignoring termination of a superseded aware session");
            return Ok(());
        }
        self.teardown();
        Err(FlowError::SessionTerminated)
    }

    fn dispatch_role(&mut self) -> Result<(), FlowError> {
        match self.role {
            Role::Publisher => self.publish(),
            Role::Subscriber => self.subscribe(),
            Role::None => Ok(()),
        }
    }

    fn publish(&mut self) -> Result<(), FlowError> {
        if !self.aware.is_live() {
            return Err(FlowError::NoSession);
        }
        if !self.publish.is_empty() {
            debug!("already publishing");
            self.status("Publisher: Already publishing.");
            return Ok(());
        }
        if !self.platform.permissions.has_required_permissions() {
            return Err(FlowError::PermissionDenied);
        }
        let config = self.config.publish_config();
        let tag = self.next_tag();
        self.publish = Slot::Pending(tag);
        self.phase = Phase::Publishing;
        self.status("Publisher: Publishing service...");
        if let Some(aware) = self.aware.session() {
            aware.publish(&config, DiscoveryCallback::new(tag, self.events.clone()));
        }
        Ok(())
    }

    fn subscribe(&mut self) -> Result<(), FlowError> {
        if !self.aware.is_live() {
            return Err(FlowError::NoSession);
        }
        if !self.subscribe.is_empty() {
            debug!("already subscribing");
            self.status("Subscriber: Already subscribing.");
            return Ok(());
        }
        if !self.platform.permissions.has_required_permissions() {
            return Err(FlowError::PermissionDenied);
        }
        let config = self.config.subscribe_config();
        let tag = self.next_tag();
        self.subscribe = Slot::Pending(tag);
        self.phase = Phase::Subscribing;
        self.status("Subscriber: Subscribing to service...");
        if let Some(aware) = self.aware.session() {
            aware.subscribe(&config, DiscoveryCallback::new(tag, self.events.clone()));
        }
        Ok(())
    }

    fn on_discovery_started(&mut self, tag: SessionTag, session: Box<dyn DiscoverySession>) {
        if self.publish.is_pending(tag) {
            info!(%tag, "publish started");
            self.publish = Slot::Live { tag, session };
            self.phase = Phase::Published;
            self.status("Publisher: Service published.");
        } else if self.subscribe.is_pending(tag) {
            info!(%tag, "subscribe started");
            self.subscribe = Slot::Live { tag, session };
            self.phase = Phase::Discovering;
            self.status("Subscriber: Service subscription started. Discovering peers...");
        } else {
            debug!(%tag, "closing discovery session from a superseded request");
            session.close();
        }
    }

    fn on_service_discovered(
        &mut self,
        tag: SessionTag,
        peer: PeerHandle,
        distance_mm: Option<i32>,
    ) -> Result<(), FlowError> {
        if !self.subscribe.is_live_with(tag) {
            debug!(%tag, %peer, "ignoring discovery from an inactive subscribe session");
            return Ok(());
        }
        match distance_mm {
            Some(d) => {
                info!(%peer, distance_mm = d, "service discovered within range");
                self.status(
                    "Subscriber: Service discovered within range. Starting periodic ranging...",
                );
            }
            None => {
                info!(%peer, "service discovered");
                self.status("Subscriber: Service discovered. Starting periodic ranging...");
            }
        }
        self.start_periodic_ranging(peer)
    }

    fn on_discovery_terminated(&mut self, tag: SessionTag) -> Result<(), FlowError> {
        if self.publish.is_current(tag) {
            info!(%tag, "publish session terminated");
            self.publish = Slot::Empty;
        } else if self.subscribe.is_current(tag) {
            info!(%tag, "subscribe session terminated");
            self.stop_periodic_ranging();
            self.subscribe = Slot::Empty;
        } else {
            debug!(%tag, "ignoring termination of a superseded discovery session");
            return Ok(());
        }
        self.settle_phase();
        Err(FlowError::SessionTerminated)
    }

    /// Range `peer` now and then every interval. Restarting cancels the previous timer first.
    fn start_periodic_ranging(&mut self, peer: PeerHandle) -> Result<(), FlowError> {
        if !self.ranging_allowed() {
            debug!(%peer, "not starting periodic ranging: not subscribing");
            return Ok(());
        }
        self.stop_periodic_ranging();
        self.ranging_generation += 1;
        let generation = self.ranging_generation;
        self.ranging = Some(ActiveRanging {
            peer,
            generation,
            task: None,
        });
        self.phase = Phase::Ranging;
        self.range_once()?;

        let events = self.events.clone();
        let task = RepeatingTask::spawn(self.config.ranging_interval, move || {
            events.send(Event::RangingTick { generation })
        });
        if let Some(active) = self.ranging.as_mut() {
            active.task = Some(task);
        }
        self.status("Subscriber: Periodic ranging started.");
        Ok(())
    }

    fn stop_periodic_ranging(&mut self) {
        let Some(mut active) = self.ranging.take() else {
            return;
        };
        if let Some(task) = active.task.take() {
            task.cancel();
        }
        debug!(peer = %active.peer, generation = active.generation, "periodic ranging stopped");
        if self.phase == Phase::Ranging {
            self.settle_phase();
        }
    }

    fn on_ranging_tick(&mut self, generation: u64) -> Result<(), FlowError> {
        if !self.is_current_ranging(generation) {
            debug!(generation, "ignoring tick from a cancelled ranging loop");
            return Ok(());
        }
        if !self.ranging_allowed() {
            self.stop_periodic_ranging();
            return Ok(());
        }
        self.range_once()
    }

    fn range_once(&mut self) -> Result<(), FlowError> {
        if !self.platform.ranging.is_available() {
            return Err(FlowError::RangingUnavailable);
        }
        if !self.platform.permissions.is_granted(Permission::FineLocation) {
            return Err(FlowError::PermissionDenied);
        }
        let Some((peer, generation)) = self.ranging.as_ref().map(|r| (r.peer, r.generation))
        else {
            return Err(FlowError::NoPeer);
        };
        debug!(%peer, generation, "ranging");
        let request = RangingRequest::new().with_aware_peer(peer);
        self.platform
            .ranging
            .start_ranging(request, RangingCallback::new(generation, self.events.clone()));
        Ok(())
    }

    fn on_ranging_results(&mut self, generation: u64, results: &[RangingResult]) {
        if !self.is_current_ranging(generation) {
            debug!(generation, "ignoring results from a cancelled ranging loop");
            return;
        }
        let Some(last) = results.last() else {
            debug!("no RTT results");
            return;
        };
        match first_success(results) {
            Some(result) => {
                let m = Measurement::from(result);
                info!(distance_mm = m.distance_mm, rssi = m.rssi, "RTT success");
                self.report(StatusLine::RangingResult, &m.to_string());
                self.report(StatusLine::PeerInfo, &m.peer_info());
                self.last_measurement = Some(m);
            }
            None => {
                // Keep the last good measurement on screen.
                warn!(last_status = last.status.code(), "RTT failed: no successful result");
            }
        }
    }

    fn on_ranging_failure(&mut self, generation: u64, code: i32) -> Result<(), FlowError> {
        if !self.is_current_ranging(generation) {
            debug!(generation, code, "ignoring failure from a cancelled ranging loop");
            return Ok(());
        }
        Err(FlowError::RangingRequestFailed(code))
    }

    fn fail(&mut self, err: FlowError) {
        warn!(error = %err, role = %self.role, phase = ?self.phase, "flow error");
        if err.stops_ranging() {
            self.stop_periodic_ranging();
        }
        if err.is_ranging() {
            self.report(StatusLine::RangingResult, &err.to_string());
        } else if self.role == Role::None {
            self.status(&err.to_string());
        } else {
            self.status(&format!("{}: {}", self.role, err));
        }
        self.last_error = Some(err);
    }

    fn teardown(&mut self) {
        self.permission_request = None;
        self.stop_periodic_ranging();
        self.close_discovery_sessions();
        if let Some(aware) = self.aware.take() {
            aware.close();
        }
        self.phase = Phase::Idle;
    }

    fn close_discovery_sessions(&mut self) {
        if let Some(session) = self.publish.take() {
            session.close();
        }
        if let Some(session) = self.subscribe.take() {
            session.close();
        }
        self.settle_phase();
    }

    fn ranging_allowed(&self) -> bool {
        self.role == Role::Subscriber && self.aware.is_live() && self.subscribe.is_live()
    }

    fn is_current_ranging(&self, generation: u64) -> bool {
        self.ranging
            .as_ref()
            .is_some_and(|r| r.generation == generation)
    }

    /// Derive the phase from what is still held.
    fn settle_phase(&mut self) {
        self.phase = if self.ranging.is_some() {
            Phase::Ranging
        } else if self.subscribe.is_live() {
            Phase::Discovering
        } else if !self.subscribe.is_empty() {
            Phase::Subscribing
        } else if self.publish.is_live() {
            Phase::Published
        } else if !self.publish.is_empty() {
            Phase::Publishing
        } else if self.aware.is_live() {
            Phase::Attached
        } else if !self.aware.is_empty() {
            Phase::Attaching
        } else {
            Phase::Idle
        };
    }

    fn next_tag(&mut self) -> SessionTag {
        self.next_tag += 1;
        SessionTag(self.next_tag)
    }

    fn status(&self, text: &str) {
        self.report(StatusLine::Status, text);
    }

    fn report(&self, line: StatusLine, text: &str) {
        self.platform.status.report(line, text);
    }
}

/// Cloneable handle for feeding a spawned orchestrator. Dropping the last clone shuts it down.
#[derive(Clone)]
pub struct OrchestratorHandle {
    events: EventSender,
    _guard: Arc<ShutdownOnDrop>,
}

struct ShutdownOnDrop(EventSender);

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        if self.0.send(Event::Shutdown) {
            debug!("last orchestrator handle dropped, shutting down");
        }
    }
}

impl OrchestratorHandle {
    pub fn start_flow(&self, role: Role) -> bool {
        self.events.send(Event::StartFlow(role))
    }

    pub fn set_availability(&self, available: bool) -> bool {
        self.events.send(Event::AvailabilityChanged(available))
    }

    pub fn shutdown(&self) -> bool {
        self.events.send(Event::Shutdown)
    }
}
