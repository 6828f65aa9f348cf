use tracing::{debug, info};

use crate::config::RunConfig;
use crate::device::{CalcReport, ComputeBackend, DispatchError};

/// Run summary printed between the device report and the calculation.
pub fn summary(run: &RunConfig) -> String {
    format!(
        "\nRunning calculations on device {}\n  Points:     {}\n  Block size: {}\n  Step size:  {}",
        run.device_index, run.point_count, run.block_size, run.step_size
    )
}

/// Report devices for the run's footprint, print the summary, then run the calculation.
///
/// Backend errors are returned as-is; nothing is retried.
pub fn dispatch<B: ComputeBackend>(
    run: &RunConfig,
    backend: &mut B,
) -> Result<CalcReport, DispatchError> {
    let total_bytes = run.total_bytes();
    info!(total_bytes, "querying devices");
    backend.device_info(total_bytes)?;

    println!("{}", summary(run));

    info!(device = run.device_index, "running calculations");
    let report = backend.run_calculation(
        run.point_count,
        run.block_size,
        run.step_size,
        run.device_index,
    )?;
    debug!(
        kernel_ns = report.kernel_time.as_nanos() as u64,
        checksum = report.checksum,
        "calculation finished"
    );

    Ok(report)
}


#[cfg(test)]
mod tests {
    use super::testing::{Call, RecordingBackend};
    use super::*;
    use crate::config::resolve;

    #[test]
    fn dispatches_device_info_then_calculation() {
        let run = resolve(&["1024", "32", "1", "0"]).unwrap();
        let mut backend = RecordingBackend::default();

        dispatch(&run, &mut backend).unwrap();

        assert_eq!(
            backend.calls,
            vec![Call::DeviceInfo(8192), Call::RunCalculation(1024, 32, 1, 0)]
        );
    }

    #[test]
    fn passes_fields_through_unmodified() {
        let run = resolve(&["3m", "256", "7", "2"]).unwrap();
        let mut backend = RecordingBackend::default();

        dispatch(&run, &mut backend).unwrap();

        assert_eq!(
            backend.calls,
            vec![
                Call::DeviceInfo(3 * 1024 * 1024 * 8),
                Call::RunCalculation(3 * 1024 * 1024, 256, 7, 2),
            ]
        );
    }

    #[test]
    fn backend_failure_propagates() {
        let run = resolve(&["16"]).unwrap();
        let mut backend = RecordingBackend {
            fail_run: true,
            ..RecordingBackend::default()
        };

        assert!(matches!(
            dispatch(&run, &mut backend),
            Err(DispatchError::NoSuchDevice { requested: 0, .. })
        ));
        assert_eq!(backend.calls.len(), 2);
    }

    #[test]
    fn summary_lists_resolved_values() {
        let run = resolve(&["4k", "64", "2", "1"]).unwrap();
        assert_eq!(
            summary(&run),
            "\nRunning calculations on device 1\n  Points:     4096\n  Block size: 64\n  Step size:  2"
        );
    }
}
