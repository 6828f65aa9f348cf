use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: i32,
    pub name: String,
    pub compute_units: usize,
    pub memory_bytes: u64,
}

impl DeviceInfo {
    pub fn fits(&self, total_bytes: u64) -> bool {
        total_bytes <= self.memory_bytes
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Device {}: {} ({} compute units, {} bytes memory)",
            self.index, self.name, self.compute_units, self.memory_bytes
        )
    }
}

/// Outcome of a completed calculation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalcReport {
    /// Time spent in the kernel phase only, excluding data setup.
    pub kernel_time: Duration,
    pub checksum: f64,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no compute device with index {requested} ({available} available)")]
    NoSuchDevice { requested: i32, available: usize },
    #[error("device {device} cannot hold {requested} bytes ({available} bytes available)")]
    InsufficientMemory {
        device: i32,
        requested: u64,
        available: u64,
    },
    #[error("invalid tiling: block size {block_size}, step size {step_size}")]
    InvalidTiling { block_size: u64, step_size: u64 },
}

/// Device enumeration and kernel execution, as consumed by the driver.
///
/// Both calls run to completion before returning. Implementations own any
/// device-side concurrency.
pub trait ComputeBackend {
    /// Report the available devices and whether `total_data_bytes` fits on each.
    fn device_info(&mut self, total_data_bytes: u64) -> Result<(), DispatchError>;

    fn run_calculation(
        &mut self,
        num_points: u64,
        block_size: u64,
        step_size: u64,
        device_num: i32,
    ) -> Result<CalcReport, DispatchError>;
}

/// Look up `device_num` among `devices`.
pub fn select(devices: &[DeviceInfo], device_num: i32) -> Result<&DeviceInfo, DispatchError> {
    devices
        .iter()
        .find(|d| d.index == device_num)
        .ok_or(DispatchError::NoSuchDevice {
            requested: device_num,
            available: devices.len(),
        })
}
