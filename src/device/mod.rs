/// Device binding over the device-control client's narrow surface.
#[cfg(feature = "gui")]
pub mod connector;

/// Identity snapshot of one connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
}

/// Capability handle for the bound device. Commands are fire-and-forget:
/// anything aimed at a device that has since vanished is dropped.
pub trait HapticOutput {
    fn vibrate(&self, strength: f64);
    fn stop(&self);
}

/// Resolves a raw index (persisted string or UI input) against the current
/// device list. Input that does not parse as an integer, or that matches no
/// connected device, yields None and the caller treats the call as a no-op.
pub fn select_device<'a>(raw: &str, devices: &'a [DeviceInfo]) -> Option<&'a DeviceInfo> {
    let index: u32 = raw.trim().parse().ok()?;
    devices.iter().find(|device| device.index == index)
}
