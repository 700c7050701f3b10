//! Generation of fresh telemetry and machine identifiers.
//!
//! All functions are pure apart from drawing from the thread-local CSPRNG.
use std::fmt::Write as _;

use rand::RngCore as _;
use serde::Serialize;

/// ASCII prefix hex-encoded at the front of `telemetry.machineId`.
const MACHINE_ID_PREFIX: &[u8] = b"auth0|user_";

/// Config-store key of each identifier.
pub const KEY_MACHINE_ID: &str = "telemetry.machineId";
/// Config-store key of the hardware-bound identifier.
pub const KEY_MAC_MACHINE_ID: &str = "telemetry.macMachineId";
/// Config-store key of the device identifier.
pub const KEY_DEV_DEVICE_ID: &str = "telemetry.devDeviceId";
/// Config-store key of the software-quality-metrics identifier.
pub const KEY_SQM_ID: &str = "telemetry.sqmId";

/// Format of the generated `macMachineId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacIdStyle {
    /// 64 lowercase hex characters.
    Hex64,
    /// `xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx` with `y` in `8..=b`.
    GuidTemplate,
}

/// The four telemetry identifiers, always regenerated together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryIdentitySet {
    /// Hex-encoded `auth0|user_` prefix plus 64 hex characters.
    #[serde(rename = "telemetry.machineId")]
    pub machine_id: String,
    /// Hardware-bound identifier, see [`MacIdStyle`].
    #[serde(rename = "telemetry.macMachineId")]
    pub mac_machine_id: String,
    /// Lowercase UUID v4.
    #[serde(rename = "telemetry.devDeviceId")]
    pub dev_device_id: String,
    /// Uppercase UUID v4 in braces.
    #[serde(rename = "telemetry.sqmId")]
    pub sqm_id: String,
}

impl TelemetryIdentitySet {
    /// Generate a complete new set.
    #[must_use]
    pub fn generate(style: MacIdStyle) -> Self {
        Self {
            machine_id: new_machine_id(),
            mac_machine_id: new_mac_machine_id(style),
            dev_device_id: new_dev_device_id(),
            sqm_id: new_sqm_id(),
        }
    }

    /// `(key, value)` pairs in config-store order.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            (KEY_MACHINE_ID, &self.machine_id),
            (KEY_MAC_MACHINE_ID, &self.mac_machine_id),
            (KEY_DEV_DEVICE_ID, &self.dev_device_id),
            (KEY_SQM_ID, &self.sqm_id),
        ]
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// `hex("auth0|user_")` followed by 64 random hex characters.
#[must_use]
pub fn new_machine_id() -> String {
    let mut id = hex_encode(MACHINE_ID_PREFIX);
    id.push_str(&hex_encode(&random_bytes::<32>()));
    id
}

/// Hardware-bound identifier in the requested style.
#[must_use]
pub fn new_mac_machine_id(style: MacIdStyle) -> String {
    match style {
        MacIdStyle::Hex64 => hex_encode(&random_bytes::<32>()),
        MacIdStyle::GuidTemplate => guid_template(),
    }
}

/// Fill `xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx` from random nibbles.
fn guid_template() -> String {
    const TEMPLATE: &str = "xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx";
    let nibbles = random_bytes::<32>();
    let mut next = nibbles.iter().map(|b| u32::from(b & 0x0f));
    let hex = |n: u32| char::from_digit(n, 16).unwrap_or('0');
    TEMPLATE
        .chars()
        .map(|c| match c {
            'x' => hex(next.next().unwrap_or(0)),
            'y' => hex((next.next().unwrap_or(0) & 0x3) | 0x8),
            other => other,
        })
        .collect()
}

/// Lowercase hyphenated UUID v4.
#[must_use]
pub fn new_dev_device_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Uppercase UUID v4 wrapped in braces.
#[must_use]
pub fn new_sqm_id() -> String {
    format!("{{{}}}", uuid::Uuid::new_v4().to_string().to_uppercase())
}

/// Fresh GUID for the Windows `MachineGuid` registry value.
#[must_use]
pub fn new_machine_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 32 lowercase hex characters for `/etc/machine-id`.
#[must_use]
pub fn new_linux_machine_id() -> String {
    hex_encode(&random_bytes::<16>())
}
