//! RTT ranging capability, request/result types and result selection.

use std::fmt;

use crate::event::RangingCallback;
use crate::session::PeerHandle;

/// Most peers a single ranging request may carry.
pub const MAX_PEERS: usize = 10;

/// Platform RTT service. `start_ranging` returns immediately; results arrive through the callback.
pub trait RangingService: Send + Sync {
    fn is_available(&self) -> bool;
    fn start_ranging(&self, request: RangingRequest, callback: RangingCallback);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangingRequest {
    peers: Vec<PeerHandle>,
}

impl RangingRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a discovered peer. Ignored once the request already holds `MAX_PEERS`.
    pub fn with_aware_peer(mut self, peer: PeerHandle) -> Self {
        if self.peers.len() < MAX_PEERS && !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
        self
    }

    pub fn peers(&self) -> &[PeerHandle] {
        &self.peers
    }
}

/// Per-peer outcome of a ranging attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangingStatus {
    Success,
    Fail,
    ResponderDoesNotSupportIeee80211mc,
}

impl RangingStatus {
    /// Numeric code as reported by the platform.
    pub fn code(&self) -> i32 {
        match self {
            RangingStatus::Success => 0,
            RangingStatus::Fail => 1,
            RangingStatus::ResponderDoesNotSupportIeee80211mc => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangingResult {
    pub status: RangingStatus,
    pub peer: Option<PeerHandle>,
    pub mac_address: Option<MacAddress>,
    pub distance_mm: i32,
    pub distance_std_dev_mm: i32,
    /// Signal strength in dBm.
    pub rssi: i32,
}

impl RangingResult {
    pub fn success(peer: PeerHandle, distance_mm: i32, rssi: i32) -> Self {
        Self {
            status: RangingStatus::Success,
            peer: Some(peer),
            mac_address: None,
            distance_mm,
            distance_std_dev_mm: 0,
            rssi,
        }
    }

    /// A non-success entry; distance and signal fields are meaningless and left zero.
    pub fn failed(peer: PeerHandle, status: RangingStatus) -> Self {
        Self {
            status,
            peer: Some(peer),
            mac_address: None,
            distance_mm: 0,
            distance_std_dev_mm: 0,
            rssi: 0,
        }
    }

    pub fn with_mac_address(mut self, mac: MacAddress) -> Self {
        self.mac_address = Some(mac);
        self
    }
}

/// First entry with a success status. Entries before it and any later successes are ignored.
pub fn first_success(results: &[RangingResult]) -> Option<&RangingResult> {
    results.iter().find(|r| r.status == RangingStatus::Success)
}

/// Last-known-good measurement shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub distance_mm: i32,
    pub rssi: i32,
    pub mac_address: Option<MacAddress>,
}

impl Measurement {
    pub fn peer_info(&self) -> String {
        match self.mac_address {
            Some(mac) => format!("Peer MAC: {}", mac),
            None => "Peer MAC: NULL".to_string(),
        }
    }
}

impl From<&RangingResult> for Measurement {
    fn from(r: &RangingResult) -> Self {
        Self {
            distance_mm: r.distance_mm,
            rssi: r.rssi,
            mac_address: r.mac_address,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance: {}mm, RSSI: {}dBm", self.distance_mm, self.rssi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_success_skips_failures_and_later_successes() {
        let peer = PeerHandle::new(1);
        let results = vec![
            RangingResult::failed(peer, RangingStatus::Fail),
            RangingResult::success(peer, 1500, -40),
            RangingResult::success(peer, 1600, -45),
        ];
        let picked = first_success(&results).unwrap();
        assert_eq!(picked.distance_mm, 1500);
        assert_eq!(picked.rssi, -40);
    }

    #[test]
    fn first_success_none_when_all_fail() {
        let peer = PeerHandle::new(1);
        let results = vec![
            RangingResult::failed(peer, RangingStatus::Fail),
            RangingResult::failed(peer, RangingStatus::ResponderDoesNotSupportIeee80211mc),
        ];
        assert!(first_success(&results).is_none());
        assert!(first_success(&[]).is_none());
    }

    #[test]
    fn request_caps_peers() {
        let mut req = RangingRequest::new();
        for i in 0..(MAX_PEERS as u32 + 3) {
            req = req.with_aware_peer(PeerHandle::new(i));
        }
        assert_eq!(req.peers().len(), MAX_PEERS);
        let dup = RangingRequest::new()
            .with_aware_peer(PeerHandle::new(1))
            .with_aware_peer(PeerHandle::new(1));
        assert_eq!(dup.peers().len(), 1);
    }

    #[test]
    fn measurement_text() {
        let r = RangingResult::success(PeerHandle::new(1), 1500, -40)
            .with_mac_address(MacAddress::new([0x02, 0xab, 0, 0x10, 0xff, 0x01]));
        let m = Measurement::from(&r);
        assert_eq!(m.to_string(), "Distance: 1500mm, RSSI: -40dBm");
        assert_eq!(m.peer_info(), "Peer MAC: 02:ab:00:10:ff:01");
        let no_mac = Measurement::from(&RangingResult::success(PeerHandle::new(1), 1, -1));
        assert_eq!(no_mac.peer_info(), "Peer MAC: NULL");
    }
}
