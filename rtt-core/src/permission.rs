//! Runtime permission gate.

use crate::event::PermissionCallback;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    FineLocation,
    NearbyWifiDevices,
}

/// Permissions needed before attaching, publishing or subscribing.
pub const REQUIRED_PERMISSIONS: [Permission; 2] =
    [Permission::FineLocation, Permission::NearbyWifiDevices];

pub trait PermissionGate: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;

    fn has_required_permissions(&self) -> bool {
        REQUIRED_PERMISSIONS.iter().all(|p| self.is_granted(*p))
    }

    /// Ask the user; the grant results come back through the callback.
    fn request_permissions(&self, permissions: &[Permission], callback: PermissionCallback);
}
