use std::sync::{atomic::Ordering, Arc};

use crate::{
    clock::{
        performance_counter, spin_until_performance_count, wait_for_performance_count,
        PERFORMANCE_FREQUENCY,
    },
    composite::{composite_frame, CompositeResources},
    pacing::{FrameKind, PacingData},
    queue::PresentFlags,
    resource::Resource,
};

use super::{PresentInfo, SwapchainError};

/// Presenter loop.
///
/// Presents every window handed over by the scheduler.
/// Failures are logged, the loop keeps running.
pub(super) fn run(info: Arc<PresentInfo>) {
    debug!("Presenter started");

    loop {
        info.present_event.wait();
        if info.is_shutting_down() {
            break;
        }

        let window = match info.scheduled_presents.take() {
            Some(window) => window,
            None => continue,
        };

        if window.num_frames_to_present == 0 {
            continue;
        }

        if let Err(err) = present_window(&info, &window) {
            warn!("Failed to present {:?}: {}", window, err);
        }
    }

    debug!("Presenter stopped");
}

/// Composites and presents all frames of the window in order.
///
/// Every sequence fence reaches the window's last index even if some frame fails.
pub(super) fn present_window(info: &PresentInfo, window: &PacingData) -> Result<(), SwapchainError> {
    let queue = &*info.present_queue;
    let base = window.num_frames_sent_for_presentation_base;

    // Windows overwritten before reaching the presenter are never presented.
    // Move sequence fences past them so nobody waits for their indices.
    queue.signal(&info.present_fence, base)?;
    queue.signal(&info.composition_fence, base)?;
    queue.signal(&info.replacement_buffer_fence, base)?;

    let interpolation_value = FrameKind::ALL
        .iter()
        .map(|&kind| window.frame(kind).interpolation_completed_fence_value)
        .max()
        .unwrap_or(0);
    queue.wait(&info.interpolation_fence, interpolation_value)?;

    let resources = info.composite.lock().clone();

    let mut result = Ok(());
    for kind in FrameKind::ALL {
        let frame = window.frame(kind);
        let resource = match &frame.resource {
            Some(resource) if frame.do_present => resource,
            _ => continue,
        };

        if let Err(err) = present_frame(info, &resources, window, kind, resource) {
            warn!("Failed to present {:?} frame {}: {}", kind, frame.present_index, err);
            if result.is_ok() {
                result = Err(err);
            }
        }
    }
    result
}

fn present_frame(
    info: &PresentInfo,
    resources: &CompositeResources,
    window: &PacingData,
    kind: FrameKind,
    resource: &Resource,
) -> Result<(), SwapchainError> {
    let queue = &*info.present_queue;
    let frame = window.frame(kind);
    let index = frame.present_index;

    let composited = {
        let target = {
            let native = info.native.lock();
            native.buffer(native.current_back_buffer_index())
        };

        target.and_then(|target| {
            composite_frame(&*info.device, queue, resources, &target, resource, window, kind)
        })
    };

    // Signalled on failure too, waiters must not stall on a skipped frame.
    queue.signal(&info.composition_fence, index)?;
    if !info.wait_fence(&*info.composition_fence, index, false) {
        return Ok(());
    }

    if index == window.replacement_buffer_fence_signal {
        queue.signal(&info.replacement_buffer_fence, index)?;
        info.latency.release();
    }

    queue.wait(&info.composition_fence, index)?;

    let presented = match composited {
        Ok(()) => {
            let target_qpc = info.previous_present_qpc.load(Ordering::Acquire) + frame.present_qpc_delta;
            if window.tuning.allow_hybrid_spin {
                wait_for_performance_count(
                    target_qpc,
                    PERFORMANCE_FREQUENCY,
                    info.timer_resolution,
                    window.tuning.hybrid_spin_time,
                );
            } else {
                spin_until_performance_count(target_qpc);
            }
            info.previous_present_qpc.store(performance_counter(), Ordering::Release);

            let sync_interval = if window.vsync { 1 } else { 0 };
            let flags = if window.tearing_supported && !window.vsync {
                PresentFlags::ALLOW_TEARING
            } else {
                PresentFlags::empty()
            };

            let presented = info.native.lock().present(sync_interval, flags);
            if presented.is_ok() {
                info.frames_presented.fetch_add(1, Ordering::AcqRel);
            }
            presented.map_err(SwapchainError::from)
        }
        Err(err) => Err(err.into()),
    };

    queue.signal(&info.present_fence, index)?;
    presented
}
