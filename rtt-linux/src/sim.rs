//! Simulated Wi-Fi Aware and RTT platform: one publisher peer at a configured distance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rtt_core::{
    AttachCallback, AwareSession, DiscoveryCallback, DiscoverySession, MacAddress,
    OrchestratorHandle, PeerHandle, Permission, PermissionCallback, PermissionGate,
    ProximityDiscoveryService, PublishConfig, RangingCallback, RangingRequest, RangingResult,
    RangingService, RangingStatus, Role, SubscribeConfig,
};
use tracing::{debug, info};

use crate::config::SimConfig;

/// Request-level failure code reported when the whole simulated request fails.
const RANGING_FAILURE_CODE: i32 = 1;

const SIM_PEER: PeerHandle = PeerHandle::new(1);

const SESSION_START_DELAY: Duration = Duration::from_millis(50);

pub struct SimAware {
    cfg: SimConfig,
    available: Arc<AtomicBool>,
}

impl SimAware {
    pub fn new(cfg: SimConfig) -> Self {
        let available = Arc::new(AtomicBool::new(cfg.aware_available));
        Self { cfg, available }
    }

    /// Shared availability flag, flipped by [`flap_availability`].
    pub fn availability(&self) -> Arc<AtomicBool> {
        self.available.clone()
    }
}

impl ProximityDiscoveryService for SimAware {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn attach(&self, callback: AttachCallback) {
        debug!(tag = %callback.tag(), "sim: attach");
        callback.on_attached(Box::new(SimAwareSession {
            cfg: self.cfg.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }));
    }
}

struct SimAwareSession {
    cfg: SimConfig,
    closed: Arc<AtomicBool>,
}

impl AwareSession for SimAwareSession {
    fn publish(&self, config: &PublishConfig, callback: DiscoveryCallback) {
        debug!(service = %config.service_name, tag = %callback.tag(), "sim: publish");
        let aware_closed = self.closed.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SESSION_START_DELAY).await;
            if !aware_closed.load(Ordering::SeqCst) {
                callback.on_session_started(Box::new(SimDiscoverySession::default()));
            }
        });
    }

    fn subscribe(&self, config: &SubscribeConfig, callback: DiscoveryCallback) {
        debug!(service = %config.service_name, tag = %callback.tag(), "sim: subscribe");
        let aware_closed = self.closed.clone();
        let distance = self.cfg.peer_distance_mm;
        let within = config
            .max_distance_mm
            .map_or(true, |max| distance >= 0 && distance as u32 <= max);
        let delay = Duration::from_millis(self.cfg.discovery_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(SESSION_START_DELAY).await;
            if aware_closed.load(Ordering::SeqCst) {
                return;
            }
            let session = SimDiscoverySession::default();
            let session_closed = session.closed.clone();
            callback.on_session_started(Box::new(session));
            tokio::time::sleep(delay).await;
            if aware_closed.load(Ordering::SeqCst) || session_closed.load(Ordering::SeqCst) {
                return;
            }
            if within {
                callback.on_service_discovered_within_range(SIM_PEER, distance);
            } else {
                debug!(distance, "sim: peer outside the subscribe window");
            }
        });
    }

    fn close(&self) {
        debug!("sim: aware session closed");
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct SimDiscoverySession {
    closed: Arc<AtomicBool>,
}

impl DiscoverySession for SimDiscoverySession {
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Flip Aware availability every `period` and report each change to the orchestrator.
/// When Aware comes back, restart the flow with `role`.
pub async fn flap_availability(
    available: Arc<AtomicBool>,
    period: Duration,
    handle: OrchestratorHandle,
    role: Role,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let now = !available.fetch_xor(true, Ordering::SeqCst);
        info!(available = now, "sim: Wi-Fi Aware availability changed");
        if !handle.set_availability(now) {
            return;
        }
        if now && role != Role::None {
            handle.start_flow(role);
        }
    }
}

pub struct SimRtt {
    cfg: SimConfig,
}

impl SimRtt {
    pub fn new(cfg: SimConfig) -> Self {
        Self { cfg }
    }

    /// Draw one outcome for `peers`: per-peer results, or a request-level failure code.
    fn sample(&self, peers: &[PeerHandle]) -> Result<Vec<RangingResult>, i32> {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.cfg.request_failure_rate) {
            return Err(RANGING_FAILURE_CODE);
        }
        let jitter = self.cfg.jitter_mm;
        Ok(peers
            .iter()
            .map(|&peer| {
                if rng.gen_bool(self.cfg.peer_failure_rate) {
                    return RangingResult::failed(peer, RangingStatus::Fail);
                }
                let distance = (self.cfg.peer_distance_mm + rng.gen_range(-jitter..=jitter)).max(0);
                let rssi = self.cfg.peer_rssi + rng.gen_range(-2..=2);
                RangingResult::success(peer, distance, rssi).with_mac_address(sim_mac(peer))
            })
            .collect())
    }
}

fn sim_mac(peer: PeerHandle) -> MacAddress {
    let id = peer.id().to_be_bytes();
    MacAddress::new([0x02, 0x00, id[0], id[1], id[2], id[3]])
}

impl RangingService for SimRtt {
    fn is_available(&self) -> bool {
        self.cfg.rtt_available
    }

    fn start_ranging(&self, request: RangingRequest, callback: RangingCallback) {
        let outcome = self.sample(request.peers());
        let delay = Duration::from_millis(self.cfg.result_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match outcome {
                Ok(results) => callback.on_ranging_results(results),
                Err(code) => callback.on_ranging_failure(code),
            }
        });
    }
}

pub struct SimPermissions {
    granted: bool,
}

impl SimPermissions {
    pub fn new(granted: bool) -> Self {
        Self { granted }
    }
}

impl PermissionGate for SimPermissions {
    fn is_granted(&self, _permission: Permission) -> bool {
        self.granted
    }

    fn request_permissions(&self, permissions: &[Permission], callback: PermissionCallback) {
        debug!(count = permissions.len(), granted = self.granted, "sim: permission prompt");
        callback.on_permissions_result(&vec![self.granted; permissions.len()]);
    }
}
