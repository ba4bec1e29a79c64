//! Recording fakes of every platform capability, for orchestrator tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::event::{
    self, AttachCallback, DiscoveryCallback, Event, EventReceiver, PermissionCallback,
    RangingCallback,
};
use crate::orchestrator::{Orchestrator, OrchestratorConfig, Platform};
use crate::permission::{Permission, PermissionGate};
use crate::ranging::{RangingRequest, RangingService};
use crate::session::{
    AwareSession, DiscoverySession, ProximityDiscoveryService, PublishConfig, Role,
    SubscribeConfig,
};
use crate::status::{StatusLine, StatusSink};

#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(StatusLine, String)>>,
}

impl RecordingSink {
    pub fn last(&self, line: StatusLine) -> Option<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(l, _)| *l == line)
            .map(|(_, t)| t.clone())
    }

    pub fn contains(&self, line: StatusLine, text: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(l, t)| *l == line && t == text)
    }
}

impl StatusSink for RecordingSink {
    fn report(&self, line: StatusLine, text: &str) {
        self.lines.lock().unwrap().push((line, text.to_string()));
    }
}

/// Shared view of a fake aware session handed to the orchestrator.
#[derive(Default)]
pub struct AwareState {
    pub closed: AtomicBool,
    pub publishes: Mutex<Vec<(PublishConfig, DiscoveryCallback)>>,
    pub subscribes: Mutex<Vec<(SubscribeConfig, DiscoveryCallback)>>,
}

impl AwareState {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.lock().unwrap().len()
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.lock().unwrap().len()
    }

    pub fn last_publish(&self) -> DiscoveryCallback {
        self.publishes.lock().unwrap().last().unwrap().1.clone()
    }

    pub fn last_subscribe(&self) -> DiscoveryCallback {
        self.subscribes.lock().unwrap().last().unwrap().1.clone()
    }
}

pub struct FakeAwareSession(pub Arc<AwareState>);

impl AwareSession for FakeAwareSession {
    fn publish(&self, config: &PublishConfig, callback: DiscoveryCallback) {
        self.0.publishes.lock().unwrap().push((config.clone(), callback));
    }

    fn subscribe(&self, config: &SubscribeConfig, callback: DiscoveryCallback) {
        self.0.subscribes.lock().unwrap().push((config.clone(), callback));
    }

    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeDiscoverySession(Arc<AtomicBool>);

impl FakeDiscoverySession {
    /// A boxed session plus its closed flag.
    pub fn create() -> (Box<dyn DiscoverySession>, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        (Box::new(FakeDiscoverySession(closed.clone())), closed)
    }
}

impl DiscoverySession for FakeDiscoverySession {
    fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct FakeDiscovery {
    pub available: AtomicBool,
    attaches: Mutex<Vec<AttachCallback>>,
}

impl Default for FakeDiscovery {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            attaches: Mutex::new(Vec::new()),
        }
    }
}

impl FakeDiscovery {
    pub fn attach_count(&self) -> usize {
        self.attaches.lock().unwrap().len()
    }

    pub fn last_attach(&self) -> AttachCallback {
        self.attaches.lock().unwrap().last().unwrap().clone()
    }
}

impl ProximityDiscoveryService for FakeDiscovery {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn attach(&self, callback: AttachCallback) {
        self.attaches.lock().unwrap().push(callback);
    }
}

pub struct FakeRanging {
    pub available: AtomicBool,
    requests: Mutex<Vec<(RangingRequest, RangingCallback)>>,
}

impl Default for FakeRanging {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRanging {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> (RangingRequest, RangingCallback) {
        self.requests.lock().unwrap().last().unwrap().clone()
    }
}

impl RangingService for FakeRanging {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn start_ranging(&self, request: RangingRequest, callback: RangingCallback) {
        self.requests.lock().unwrap().push((request, callback));
    }
}

pub struct FakePermissions {
    pub location: AtomicBool,
    pub nearby: AtomicBool,
    requests: Mutex<Vec<PermissionCallback>>,
}

impl Default for FakePermissions {
    fn default() -> Self {
        Self {
            location: AtomicBool::new(true),
            nearby: AtomicBool::new(true),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakePermissions {
    pub fn deny_all(&self) {
        self.location.store(false, Ordering::SeqCst);
        self.nearby.store(false, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Answer the most recent prompt.
    pub fn answer(&self, grants: &[bool]) {
        let cb = self.requests.lock().unwrap().pop().unwrap();
        cb.on_permissions_result(grants);
    }

    /// Answer the oldest prompt still open.
    pub fn answer_oldest(&self, grants: &[bool]) {
        let cb = self.requests.lock().unwrap().remove(0);
        cb.on_permissions_result(grants);
    }
}

impl PermissionGate for FakePermissions {
    fn is_granted(&self, permission: Permission) -> bool {
        match permission {
            Permission::FineLocation => self.location.load(Ordering::SeqCst),
            Permission::NearbyWifiDevices => self.nearby.load(Ordering::SeqCst),
        }
    }

    fn request_permissions(&self, _permissions: &[Permission], callback: PermissionCallback) {
        self.requests.lock().unwrap().push(callback);
    }
}

pub struct Harness {
    pub orch: Orchestrator,
    pub rx: EventReceiver,
    pub discovery: Arc<FakeDiscovery>,
    pub ranging: Arc<FakeRanging>,
    pub permissions: Arc<FakePermissions>,
    pub sink: Arc<RecordingSink>,
}

/// An attached subscriber with a live subscribe session.
pub struct Subscribed {
    pub attach: AttachCallback,
    pub aware: Arc<AwareState>,
    pub sub: DiscoveryCallback,
    pub sub_closed: Arc<AtomicBool>,
}

impl Harness {
    pub fn new() -> Self {
        let discovery = Arc::new(FakeDiscovery::default());
        let ranging = Arc::new(FakeRanging::default());
        let permissions = Arc::new(FakePermissions::default());
        let sink = Arc::new(RecordingSink::default());
        let platform = Harness::platform(&discovery, &ranging, &permissions, &sink);
        let (tx, rx) = event::channel();
        let orch = Orchestrator::new(platform, OrchestratorConfig::default(), tx);
        Self {
            orch,
            rx,
            discovery,
            ranging,
            permissions,
            sink,
        }
    }

    pub fn platform(
        discovery: &Arc<FakeDiscovery>,
        ranging: &Arc<FakeRanging>,
        permissions: &Arc<FakePermissions>,
        sink: &Arc<RecordingSink>,
    ) -> Platform {
        Platform {
            discovery: discovery.clone(),
            ranging: ranging.clone(),
            permissions: permissions.clone(),
            status: sink.clone(),
        }
    }

    /// Apply everything queued so far.
    pub fn pump(&mut self) {
        while let Ok(ev) = self.rx.try_recv() {
            let _ = self.orch.handle(ev);
        }
    }

    pub fn send(&mut self, ev: Event) {
        let _ = self.orch.handle(ev);
        self.pump();
    }

    /// Wait for the next queued event (in paused time, the next timer tick) and apply it.
    pub async fn next_event(&mut self) {
        let ev = self.rx.recv().await.expect("queue open");
        let _ = self.orch.handle(ev);
    }

    pub fn attached(&mut self, role: Role) -> (AttachCallback, Arc<AwareState>) {
        self.send(Event::StartFlow(role));
        let attach = self.discovery.last_attach();
        let aware = Arc::new(AwareState::default());
        attach.on_attached(Box::new(FakeAwareSession(aware.clone())));
        self.pump();
        (attach, aware)
    }

    pub fn subscribed(&mut self) -> Subscribed {
        let (attach, aware) = self.attached(Role::Subscriber);
        let sub = aware.last_subscribe();
        let (session, sub_closed) = FakeDiscoverySession::create();
        sub.on_session_started(session);
        self.pump();
        Subscribed {
            attach,
            aware,
            sub,
            sub_closed,
        }
    }
}
