use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Uniform;
use std::hint::black_box;
use std::time::Instant;
use tracing::debug;

use crate::device::{self, CalcReport, ComputeBackend, DeviceInfo, DispatchError};

#[derive(Debug, Clone, Copy)]
pub struct HostSettings {
    pub seed: u64,
    pub memory_limit: u64,
}

/// CPU implementation of [`ComputeBackend`] exposing a single `host` device.
pub struct HostBackend {
    devices: Vec<DeviceInfo>,
    rng: StdRng,
    quiet: bool,
}

impl HostBackend {
    pub fn new(settings: HostSettings) -> Self {
        let compute_units = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            devices: vec![DeviceInfo {
                index: 0,
                name: "host".to_string(),
                compute_units,
                memory_bytes: settings.memory_limit,
            }],
            rng: StdRng::seed_from_u64(settings.seed),
            quiet: false,
        }
    }

    /// Suppress stdout reporting; results are still returned.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

/// Sum every `step_size`-th element inside each block of `block_size` consecutive points.
pub fn strided_block_sum(data: &[f64], block_size: usize, step_size: usize) -> f64 {
    data.chunks(block_size)
        .map(|block| block.iter().step_by(step_size).sum::<f64>())
        .sum()
}

impl ComputeBackend for HostBackend {
    fn device_info(&mut self, total_data_bytes: u64) -> Result<(), DispatchError> {
        if self.quiet {
            return Ok(());
        }
        println!("Found {} compute device(s)", self.devices.len());
        for d in &self.devices {
            let verdict = if d.fits(total_data_bytes) {
                "fits"
            } else {
                "does not fit"
            };
            println!("  {}", d);
            println!("    {} bytes requested: {}", total_data_bytes, verdict);
        }
        Ok(())
    }

    fn run_calculation(
        &mut self,
        num_points: u64,
        block_size: u64,
        step_size: u64,
        device_num: i32,
    ) -> Result<CalcReport, DispatchError> {
        let device = device::select(&self.devices, device_num)?;

        if block_size == 0 || step_size == 0 {
            return Err(DispatchError::InvalidTiling {
                block_size,
                step_size,
            });
        }

        let requested = num_points.saturating_mul(std::mem::size_of::<f64>() as u64);
        let insufficient = DispatchError::InsufficientMemory {
            device: device.index,
            requested,
            available: device.memory_bytes,
        };
        if !device.fits(requested) {
            return Err(insufficient);
        }
        let n = usize::try_from(num_points).map_err(|_| insufficient)?;

        // tiling wider than the address space degenerates to one block / one element
        let block = usize::try_from(block_size).unwrap_or(usize::MAX);
        let step = usize::try_from(step_size).unwrap_or(usize::MAX);

        let dist = Uniform::new(0.0f64, 1.0);
        let data: Vec<f64> = (0..n).map(|_| self.rng.sample(&dist)).collect();
        debug!(points = n, block, step, "host data ready");

        let start = Instant::now();
        let checksum = black_box(strided_block_sum(black_box(&data), block, step));
        let kernel_time = start.elapsed();

        if !self.quiet {
            println!("  Checksum: {:.6}", checksum);
            println!("  Kernel time {} ns", kernel_time.as_nanos());
        }

        Ok(CalcReport {
            kernel_time,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(memory_limit: u64) -> HostBackend {
        HostBackend::new(HostSettings {
            seed: 42,
            memory_limit,
        })
        .quiet(true)
    }

    #[test]
    fn strided_sum_matches_reference() {
        let data: Vec<f64> = (0..10).map(f64::from).collect();

        // blocks [0..4) [4..8) [8..10), every 2nd element: 0+2, 4+6, 8
        assert_eq!(strided_block_sum(&data, 4, 2), 20.0);
        assert_eq!(strided_block_sum(&data, 32, 1), 45.0);
        assert_eq!(strided_block_sum(&data, 1, 1), 45.0);
        // blocks of 3, step 5 only take the first of each block: 0+3+6+9
        assert_eq!(strided_block_sum(&data, 3, 5), 18.0);
        assert_eq!(strided_block_sum(&[], 4, 1), 0.0);
    }

    #[test]
    fn exposes_single_host_device() {
        let b = backend(1 << 20);
        let devices = &b.devices;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].index, 0);
        assert_eq!(devices[0].name, "host");
        assert!(devices[0].compute_units >= 1);
        assert_eq!(devices[0].memory_bytes, 1 << 20);
    }

    #[test]
    fn rejects_unknown_device() {
        let mut b = backend(1 << 20);
        assert!(matches!(
            b.run_calculation(16, 4, 1, 1),
            Err(DispatchError::NoSuchDevice { requested: 1, .. })
        ));
    }

    #[test]
    fn rejects_oversized_footprint() {
        let mut b = backend(1024);
        assert!(b.run_calculation(128, 32, 1, 0).is_ok());
        assert!(matches!(
            b.run_calculation(129, 32, 1, 0),
            Err(DispatchError::InsufficientMemory {
                requested: 1032,
                available: 1024,
                ..
            })
        ));
    }

    #[test]
    fn rejects_zero_tiling() {
        let mut b = backend(1 << 20);
        assert!(matches!(
            b.run_calculation(16, 0, 1, 0),
            Err(DispatchError::InvalidTiling { .. })
        ));
    }

    #[test]
    fn same_seed_same_checksum() {
        let a = backend(1 << 20).run_calculation(1000, 32, 3, 0).unwrap();
        let b = backend(1 << 20).run_calculation(1000, 32, 3, 0).unwrap();
        assert_eq!(a.checksum, b.checksum);
        assert!(a.checksum > 0.0);
    }

    #[test]
    fn checksum_bounded_by_points_touched() {
        // step 1 touches every point, each sample lies in [0, 1)
        let report = backend(1 << 20).run_calculation(256, 16, 1, 0).unwrap();
        assert!(report.checksum < 256.0);
    }
}
