use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use mim_core::ImageAllocator;
use mim_model::DeviceId;

use crate::workload::Workload;

/// Simulated durations of the device-side work.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub flash: Duration,
    pub run: Duration,
}

/// What one device did over the whole session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceReport {
    pub device: String,
    /// Labels flashed, in order.
    pub images: Vec<String>,
    pub runs: usize,
}

/// Drive one device until the allocator has nothing left for it.
///
/// Each round asks for a label, flashes it and drains that label's runs from
/// the shared workload. Flashing and running happen outside the allocator.
#[instrument(level = "info", skip_all, fields(device = %allocator.device(device)))]
pub async fn run_device(
    allocator: Arc<ImageAllocator>,
    workload: Arc<Workload>,
    device: DeviceId,
    timing: Timing,
    cancel: CancellationToken,
) -> DeviceReport {
    let mut report = DeviceReport {
        device: allocator.device(device).name().to_string(),
        ..Default::default()
    };

    'session: while !cancel.is_cancelled() {
        let Some(label) = allocator.allocate_with(device, workload.as_ref()) else {
            debug!("no more images for device");
            break;
        };
        let name = allocator.label(label).name();

        info!(label = name, "flashing image");
        if !pause(timing.flash, &cancel).await {
            break;
        }
        report.images.push(name.to_string());

        while workload.take_run(label) {
            trace!(label = name, remaining = workload.remaining(label), "benchmark run");
            if !pause(timing.run, &cancel).await {
                break 'session;
            }
            report.runs += 1;
        }
    }
    report
}

/// Sleep for `d`; returns `false` if cancelled first.
async fn pause(d: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}
