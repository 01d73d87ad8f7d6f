//! Hardware-bound device identity.
//!
//! The device private key is provisioned encrypted under a passphrase that
//! only this physical machine can reproduce, derived from its MAC address
//! and CPU serial. Moving the key file (or the ballots encrypted for it) to
//! another machine makes the passphrase derivation come out different and
//! the key unusable.

use std::fs;
use std::path::Path;

use data_encoding::HEXLOWER;
use log::warn;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Source of the deterministic per-device secret used to unlock the
/// device private key.
pub trait HardwareIdentity: Send {
    /// Derive the passphrase. Must return the same bytes on every call on
    /// the same physical device.
    fn derive_passphrase(&self) -> Result<Vec<u8>>;
}

/// Production identity: MAC address plus the CPU serial from
/// `/proc/cpuinfo`, hashed into a fixed-length passphrase.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceIdentity;

impl DeviceIdentity {
    /// First non-loopback interface MAC, uppercased `AA:BB:...` form.
    fn mac_address() -> String {
        match Self::read_first_mac("/sys/class/net") {
            Some(mac) => mac,
            None => {
                warn!("Could not determine MAC address, using placeholder");
                "UNKNOWN_MAC".to_string()
            }
        }
    }

    fn read_first_mac(net_dir: impl AsRef<Path>) -> Option<String> {
        let mut interfaces: Vec<_> = fs::read_dir(net_dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name() != "lo")
            .collect();
        // Stable choice across reboots.
        interfaces.sort_by_key(|entry| entry.file_name());
        for interface in interfaces {
            if let Ok(address) = fs::read_to_string(interface.path().join("address")) {
                let address = address.trim();
                if !address.is_empty() && address != "00:00:00:00:00:00" {
                    return Some(address.to_uppercase());
                }
            }
        }
        None
    }

    /// The unique hardware serial from `/proc/cpuinfo`. Off Linux (local
    /// development) a fixed mock serial is used instead.
    fn cpu_serial() -> String {
        if !cfg!(target_os = "linux") {
            return "DEV_MACHINE_SERIAL_001".to_string();
        }
        match fs::read_to_string("/proc/cpuinfo") {
            Ok(cpuinfo) => Self::serial_from_cpuinfo(&cpuinfo),
            Err(err) => {
                warn!("Failed to read /proc/cpuinfo: {err}");
                "ERROR_READING_SERIAL".to_string()
            }
        }
    }

    fn serial_from_cpuinfo(cpuinfo: &str) -> String {
        cpuinfo
            .lines()
            .filter(|line| line.starts_with("Serial"))
            .find_map(|line| line.split_once(':'))
            .map(|(_, serial)| serial.trim().to_string())
            .unwrap_or_else(|| "NO_SERIAL_FOUND".to_string())
    }
}

impl HardwareIdentity for DeviceIdentity {
    fn derive_passphrase(&self) -> Result<Vec<u8>> {
        let mac = Self::mac_address();
        let serial = Self::cpu_serial();
        let raw_identity = format!("EVM_SECURE_{mac}_{serial}");
        // Hash to a consistent, strong passphrase of fixed length.
        let digest = Sha256::digest(raw_identity.as_bytes());
        Ok(HEXLOWER.encode(&digest).into_bytes())
    }
}
