// Belvedere Input Layer - Device Matching
// Matches enumerated devices against configured profiles

use super::device::DeviceDescriptor;
use crate::config::{Config, DeviceProfile};

/// Check if an enumerated device has the profile's (vendor, product) identity.
pub fn matches_profile(descriptor: &DeviceDescriptor, profile: &DeviceProfile) -> bool {
    profile.matches(descriptor.vendor_id, descriptor.product_id)
}

/// Find the first attached device for a profile, in enumeration order.
///
/// Devices exposing several HID interfaces enumerate once per interface;
/// only the first one is used.
pub fn find_first_match<'a>(
    attached: &'a [DeviceDescriptor],
    profile: &DeviceProfile,
) -> Option<&'a DeviceDescriptor> {
    attached.iter().find(|d| matches_profile(d, profile))
}

/// Find the profile that would claim an attached device
///
/// Profiles are consulted in configuration order, so the first of several
/// duplicate profiles wins.
pub fn profile_for<'a>(config: &'a Config, descriptor: &DeviceDescriptor) -> Option<&'a DeviceProfile> {
    config.devices.iter().find(|p| matches_profile(descriptor, p))
}
