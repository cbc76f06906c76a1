#![cfg(feature = "headless")]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use framepace::{
    backend::headless::{HeadlessCommandList, HeadlessDevice, HeadlessResource},
    frame_interpolation_swapchain, ticks_to_duration, ColorSpace, Device, DirectSwapchain, Format,
    FrameGenerationCallback, FrameGenerationConfig, FrameGenerationError, FrameInterpolationSwapchain,
    HdrMetadata, PresentFlags, Queue, QueueKind, Resource, ResourceDesc, ResourceUsage, SurfaceInfo,
    SwapEffect, Swapchain, SwapchainDesc, SwapchainError, SwapchainFlags, TransferFunction,
    UiCompositionFlags, PERFORMANCE_FREQUENCY,
};
use parking_lot::Mutex;
use raw_window_handle::{RawWindowHandle, WebWindowHandle};

struct Harness {
    device: HeadlessDevice,
    game_queue: Arc<dyn Queue>,
}

impl Harness {
    fn new() -> Self {
        let device = HeadlessDevice::new();
        let game_queue = device.create_queue(QueueKind::Graphics).unwrap();
        Harness { device, game_queue }
    }

    fn surface() -> SurfaceInfo {
        SurfaceInfo {
            window: RawWindowHandle::Web(WebWindowHandle::empty()),
        }
    }

    fn desc(buffer_count: u32, flags: SwapchainFlags) -> SwapchainDesc {
        SwapchainDesc {
            width: 8,
            height: 8,
            format: Format::RGBA8Unorm,
            buffer_count,
            usage: ResourceUsage::COLOR_ATTACHMENT,
            swap_effect: SwapEffect::FlipSequential,
            flags,
        }
    }

    fn swapchain(&self, buffer_count: u32) -> FrameInterpolationSwapchain {
        self.swapchain_with_flags(buffer_count, SwapchainFlags::empty())
    }

    fn swapchain_with_flags(&self, buffer_count: u32, flags: SwapchainFlags) -> FrameInterpolationSwapchain {
        FrameInterpolationSwapchain::new(
            Arc::new(self.device.clone()),
            &self.device,
            &Self::surface(),
            &Self::desc(buffer_count, flags),
            self.game_queue.clone(),
        )
        .unwrap()
    }

    /// Simulates game rendering by writing `marker` into `target` on the game queue.
    fn render(&self, target: &Resource, marker: u64) {
        let mut list = self.game_queue.create_command_list().unwrap();
        headless(&mut *list).write_marker(target, marker);
        list.close().unwrap();
        self.game_queue.execute(list).unwrap();
    }

    fn presented(&self) -> Vec<u64> {
        self.device.presents().iter().map(|record| record.contents).collect()
    }
}

fn headless(list: &mut dyn framepace::CommandList) -> &mut HeadlessCommandList {
    list.as_any_mut().downcast_mut().unwrap()
}

fn contents(resource: &Resource) -> u64 {
    resource.raw::<HeadlessResource>().unwrap().contents()
}

/// Callback writing `1000 + frame_id` into the interpolation output.
fn marking_callback() -> FrameGenerationCallback {
    FrameGenerationCallback::new(|dispatch| {
        let marker = 1000 + dispatch.frame_id;
        headless(dispatch.command_list).write_marker(dispatch.output, marker);
        Ok(())
    })
}

fn interpolating(callback: &FrameGenerationCallback, frame_id: u64) -> FrameGenerationConfig {
    FrameGenerationConfig {
        frame_generation_enabled: true,
        frame_generation_callback: Some(callback.clone()),
        frame_id,
        ..FrameGenerationConfig::default()
    }
}

#[test]
fn passthrough_presents_synchronously() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(2);

    for frame in 1..=3u64 {
        let index = swapchain.current_back_buffer_index();
        assert_eq!(index, [0, 1, 0][frame as usize - 1]);

        let buffer = swapchain.buffer(index).unwrap();
        harness.render(&buffer, frame);
        swapchain.present(1, PresentFlags::empty()).unwrap();

        // Physical present happened on the calling thread.
        assert_eq!(harness.device.presents().len(), frame as usize);
        assert_eq!(swapchain.frames_sent_for_presentation(), frame);
    }

    assert_eq!(harness.presented(), [1, 2, 3]);
    assert!(harness.device.presents().iter().all(|record| record.sync_interval == 1));

    swapchain.wait_for_presents().unwrap();
    assert_eq!(swapchain.completed_present_index(), 3);
}

#[test]
fn interpolated_frame_precedes_real_one() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(1);
    let callback = marking_callback();

    for frame in 1..=3u64 {
        swapchain.set_frame_generation_config(interpolating(&callback, frame));
        let buffer = swapchain.buffer(swapchain.current_back_buffer_index()).unwrap();
        harness.render(&buffer, frame);
        swapchain.present(0, PresentFlags::empty()).unwrap();
    }
    swapchain.wait_for_presents().unwrap();

    assert_eq!(harness.presented(), [1001, 1, 1002, 2, 1003, 3]);
    assert_eq!(swapchain.frames_sent_for_presentation(), 6);
    assert_eq!(swapchain.frames_presented(), 6);
    assert_eq!(swapchain.completed_interpolation_index(), 3);
    assert_eq!(swapchain.completed_present_index(), 6);
}

#[test]
fn every_window_is_accounted_for() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(2);
    let callback = marking_callback();

    for frame in 1..=20u64 {
        swapchain.set_frame_generation_config(interpolating(&callback, frame));
        swapchain.present(0, PresentFlags::empty()).unwrap();
    }
    swapchain.wait_for_presents().unwrap();

    // Windows may be dropped by the presenter, sequence fence still catches up.
    assert_eq!(swapchain.frames_sent_for_presentation(), 40);
    assert_eq!(swapchain.completed_present_index(), 40);
    assert!(swapchain.frames_presented() <= 40);
    assert_eq!(swapchain.frames_presented() as usize, harness.device.presents().len());
}

#[test]
fn async_interpolation_queue() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(1);
    let callback = marking_callback();

    for frame in 1..=2u64 {
        swapchain.set_frame_generation_config(FrameGenerationConfig {
            allow_async_workloads: true,
            ..interpolating(&callback, frame)
        });
        let buffer = swapchain.buffer(0).unwrap();
        harness.render(&buffer, frame);
        swapchain.present(0, PresentFlags::empty()).unwrap();
    }
    swapchain.wait_for_presents().unwrap();

    assert_eq!(harness.presented(), [1001, 1, 1002, 2]);
}

#[test]
fn failed_interpolation_degrades_to_real_frames() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(1);
    let callback = FrameGenerationCallback::new(|_| {
        Err(FrameGenerationError::Skipped {
            reason: "no motion vectors".to_owned(),
        })
    });

    for frame in 1..=3u64 {
        swapchain.set_frame_generation_config(interpolating(&callback, frame));
        let buffer = swapchain.buffer(0).unwrap();
        harness.render(&buffer, frame);
        swapchain.present(0, PresentFlags::empty()).unwrap();
    }
    swapchain.wait_for_presents().unwrap();

    assert_eq!(harness.presented(), [1, 2, 3]);
    assert_eq!(swapchain.frames_sent_for_presentation(), 3);
    assert_eq!(swapchain.completed_interpolation_index(), 0);
}

#[test]
fn reset_survives_failed_interpolation() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(1);

    let resets = Arc::new(Mutex::new(Vec::new()));
    let callback = {
        let resets = resets.clone();
        FrameGenerationCallback::new(move |dispatch| {
            resets.lock().push(dispatch.reset);
            if dispatch.frame_id == 3 {
                return Err(FrameGenerationError::Skipped {
                    reason: "camera cut".to_owned(),
                });
            }
            headless(dispatch.command_list).write_marker(dispatch.output, 1000 + dispatch.frame_id);
            Ok(())
        })
    };

    for frame in 0..3u64 {
        swapchain.set_frame_generation_config(interpolating(&callback, frame));
        swapchain.present(0, PresentFlags::empty()).unwrap();
    }

    swapchain.resize_buffers(0, 0, 0, None, SwapchainFlags::empty()).unwrap();

    for frame in 3..5u64 {
        swapchain.set_frame_generation_config(interpolating(&callback, frame));
        swapchain.present(0, PresentFlags::empty()).unwrap();
    }
    swapchain.wait_for_presents().unwrap();

    // Failed dispatch of frame 3 did not consume the reset requested by resize.
    assert_eq!(*resets.lock(), [true, false, false, true, true]);
}

#[test]
fn previous_frame_is_passed_to_interpolation() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(2);

    let inputs = Arc::new(Mutex::new(Vec::new()));
    let callback = {
        let inputs = inputs.clone();
        FrameGenerationCallback::new(move |dispatch| {
            inputs
                .lock()
                .push((dispatch.present_color.clone(), dispatch.previous_present_color.cloned()));
            Ok(())
        })
    };

    for frame in [1, 2, 3, 7] {
        swapchain.set_frame_generation_config(interpolating(&callback, frame));
        swapchain.present(0, PresentFlags::empty()).unwrap();
    }
    swapchain.wait_for_presents().unwrap();

    let first = swapchain.buffer(0).unwrap();
    let second = swapchain.buffer(1).unwrap();
    let inputs = inputs.lock();
    assert_eq!(inputs[0], (first.clone(), None));
    assert_eq!(inputs[1], (second.clone(), Some(first.clone())));
    assert_eq!(inputs[2], (first.clone(), Some(second.clone())));

    // Frame id jumped, history is not offered.
    assert_eq!(inputs[3], (second, None));
}

#[test]
fn hdr_settings_reach_interpolation() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(1);

    swapchain.set_color_space(ColorSpace::Hdr10St2084).unwrap();
    swapchain
        .set_hdr_metadata(HdrMetadata {
            min_luminance: 0.5,
            max_luminance: 600.0,
        })
        .unwrap();

    let seen = Arc::new(Mutex::new(None));
    let callback = {
        let seen = seen.clone();
        FrameGenerationCallback::new(move |dispatch| {
            *seen.lock() = Some((dispatch.transfer_function, dispatch.min_max_luminance));
            Ok(())
        })
    };

    swapchain.set_frame_generation_config(interpolating(&callback, 1));
    swapchain.present(0, PresentFlags::empty()).unwrap();
    swapchain.wait_for_presents().unwrap();

    assert_eq!(*seen.lock(), Some((TransferFunction::Pq, [0.5, 600.0])));
}

/// Time between the interpolated and the real present of `frame`.
fn pair_interval(harness: &Harness, frame: u64) -> Duration {
    let presents = harness.device.presents();
    let qpc = |marker: u64| {
        presents
            .iter()
            .find(|record| record.contents == marker)
            .unwrap()
            .qpc
    };
    ticks_to_duration(qpc(frame) - qpc(1000 + frame), PERFORMANCE_FREQUENCY)
}

#[test]
fn interpolated_frame_is_paced_between_real_ones() {
    const FRAME_TIME: Duration = Duration::from_millis(16);

    let harness = Harness::new();
    let swapchain = harness.swapchain(1);
    let callback = marking_callback();

    let present = |frame: u64| {
        swapchain.set_frame_generation_config(interpolating(&callback, frame));
        let buffer = swapchain.buffer(0).unwrap();
        harness.render(&buffer, frame);
        swapchain.present(0, PresentFlags::empty()).unwrap();
    };

    let mut next_frame = Instant::now();
    for frame in 1..=16u64 {
        next_frame += FRAME_TIME;
        std::thread::sleep(next_frame.saturating_duration_since(Instant::now()));
        present(frame);
    }

    // Stall long enough to discard frame time history.
    std::thread::sleep(Duration::from_millis(150));
    present(17);
    swapchain.wait_for_presents().unwrap();

    // Half of the frame time, minus deviation and safety margin.
    let steady = pair_interval(&harness, 16);
    assert!(
        steady >= Duration::from_millis(6) && steady <= Duration::from_millis(12),
        "steady pair interval {:?}",
        steady
    );

    let after_stall = pair_interval(&harness, 17);
    assert!(after_stall < Duration::from_millis(4), "pair interval after stall {:?}", after_stall);
}

#[test]
fn only_interpolated_frames() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(1);
    let callback = marking_callback();

    for frame in 1..=3u64 {
        swapchain.set_frame_generation_config(FrameGenerationConfig {
            only_present_interpolated: true,
            ..interpolating(&callback, frame)
        });
        swapchain.present(0, PresentFlags::empty()).unwrap();
    }
    swapchain.wait_for_presents().unwrap();

    assert_eq!(harness.presented(), [1001, 1002, 1003]);
    assert_eq!(swapchain.frames_sent_for_presentation(), 3);
}

#[test]
fn registered_command_list_replaces_callback() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(1);

    swapchain.set_frame_generation_config(FrameGenerationConfig {
        frame_generation_enabled: true,
        ..FrameGenerationConfig::default()
    });

    // Without callback or registered list nothing is interpolated.
    swapchain.present(0, PresentFlags::empty()).unwrap();
    assert_eq!(swapchain.frames_sent_for_presentation(), 1);

    let output = swapchain.interpolation_output().unwrap();
    let mut list = swapchain.interpolation_command_list().unwrap();
    headless(&mut *list).write_marker(&output, 77);
    swapchain.register_interpolation_command_list(list);

    let buffer = swapchain.buffer(0).unwrap();
    harness.render(&buffer, 7);
    swapchain.present(0, PresentFlags::empty()).unwrap();
    swapchain.wait_for_presents().unwrap();

    assert_eq!(harness.presented()[1..], [77, 7]);
    assert_eq!(swapchain.completed_interpolation_index(), 1);
}

#[test]
fn ui_is_composited_over_frames() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(1);

    let ui = harness
        .device
        .create_resource(
            &ResourceDesc {
                width: 8,
                height: 8,
                format: Format::RGBA8Unorm,
                usage: ResourceUsage::SAMPLED | ResourceUsage::TRANSFER_SRC,
            },
            "ui",
        )
        .unwrap();
    ui.raw::<HeadlessResource>().unwrap().write(5);

    let buffer = swapchain.buffer(0).unwrap();

    swapchain.register_ui_resource(Some(ui.clone()), UiCompositionFlags::USE_PREMUL_ALPHA);
    harness.render(&buffer, 100);
    swapchain.present(0, PresentFlags::empty()).unwrap();

    swapchain.register_ui_resource(
        Some(ui.clone()),
        UiCompositionFlags::ENABLE_INTERNAL_UI_DOUBLE_BUFFERING,
    );
    harness.render(&buffer, 200);
    swapchain.present(0, PresentFlags::empty()).unwrap();

    swapchain.register_ui_resource(None, UiCompositionFlags::empty());
    harness.render(&buffer, 300);
    swapchain.present(0, PresentFlags::empty()).unwrap();

    assert_eq!(harness.presented(), [105, 205, 300]);
    assert_eq!(contents(&ui), 5);
}

#[test]
fn test_present_is_not_recorded() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(2);

    swapchain.present(0, PresentFlags::TEST).unwrap();

    assert!(harness.device.presents().is_empty());
    assert_eq!(swapchain.frames_sent_for_presentation(), 0);
    assert_eq!(swapchain.current_back_buffer_index(), 0);
}

#[test]
fn description_reports_requested_values() {
    let harness = Harness::new();
    let flags = SwapchainFlags::FRAME_LATENCY_WAITABLE_OBJECT;
    let swapchain = harness.swapchain_with_flags(2, flags);

    assert_eq!(swapchain.desc(), Harness::desc(2, flags));
    assert!(swapchain.frame_latency_waitable().is_some());

    swapchain.present(0, PresentFlags::empty()).unwrap();
    swapchain
        .resize_buffers(0, 16, 0, Some(Format::BGRA8Unorm), flags)
        .unwrap();

    let desc = swapchain.desc();
    assert_eq!(desc.buffer_count, 2);
    assert_eq!(desc.width, 16);
    assert_eq!(desc.height, 8);
    assert_eq!(desc.format, Format::BGRA8Unorm);
    assert_eq!(desc.swap_effect, SwapEffect::FlipSequential);
    assert_eq!(swapchain.current_back_buffer_index(), 0);
    assert_eq!(swapchain.buffer(1).unwrap().desc().width, 16);
    assert!(swapchain.buffer(2).is_err());

    assert!(matches!(
        swapchain.resize_buffers(17, 0, 0, None, flags),
        Err(SwapchainError::InvalidArgument { .. })
    ));

    let swapchain = harness.swapchain(3);
    assert!(swapchain.frame_latency_waitable().is_none());
}

#[test]
fn invalid_buffer_count_is_rejected() {
    let harness = Harness::new();
    let result = FrameInterpolationSwapchain::new(
        Arc::new(harness.device.clone()),
        &harness.device,
        &Harness::surface(),
        &Harness::desc(0, SwapchainFlags::empty()),
        harness.game_queue.clone(),
    );
    assert!(matches!(result, Err(SwapchainError::InvalidArgument { .. })));
}

#[test]
fn frame_latency_controls() {
    let harness = Harness::new();
    let swapchain = harness.swapchain_with_flags(2, SwapchainFlags::FRAME_LATENCY_WAITABLE_OBJECT);

    assert_eq!(swapchain.maximum_frame_latency(), 1);
    swapchain.set_maximum_frame_latency(3).unwrap();
    assert_eq!(swapchain.maximum_frame_latency(), 3);
    assert!(swapchain.set_maximum_frame_latency(0).is_err());

    let waitable = swapchain.frame_latency_waitable().unwrap();
    for _ in 0..3 {
        assert!(waitable.wait(Some(Duration::from_secs(1))));
    }
    assert!(!waitable.wait(Some(Duration::from_millis(1))));

    let callback = marking_callback();
    swapchain.set_frame_generation_config(interpolating(&callback, 1));
    swapchain.present(0, PresentFlags::empty()).unwrap();
    swapchain.wait_for_presents().unwrap();

    // Released once the window's replacement buffer was handed back.
    assert!(waitable.wait(Some(Duration::from_secs(1))));
}

#[test]
fn memory_usage_covers_owned_resources() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(2);
    assert_eq!(swapchain.gpu_memory_usage().unwrap().total_usage_in_bytes, 0);

    swapchain.buffer(0).unwrap();
    swapchain.buffer(1).unwrap();
    let usage = swapchain.gpu_memory_usage().unwrap();
    assert_eq!(usage.total_usage_in_bytes, 2 * 8 * 8 * 4);
    assert_eq!(usage.aliasable_usage_in_bytes, 0);

    let callback = marking_callback();
    swapchain.set_frame_generation_config(interpolating(&callback, 1));
    swapchain.present(0, PresentFlags::empty()).unwrap();
    assert_eq!(
        swapchain.gpu_memory_usage().unwrap().total_usage_in_bytes,
        3 * 8 * 8 * 4
    );

    swapchain.resize_buffers(0, 0, 0, None, SwapchainFlags::empty()).unwrap();
    assert_eq!(swapchain.gpu_memory_usage().unwrap().total_usage_in_bytes, 0);
}

#[test]
fn resources_are_released_on_drop() {
    let harness = Harness::new();
    let baseline = harness.device.live_resources();

    let swapchain = harness.swapchain(2);
    let callback = marking_callback();
    for frame in 1..=4 {
        swapchain.set_frame_generation_config(interpolating(&callback, frame));
        swapchain.present(0, PresentFlags::empty()).unwrap();
    }
    drop(swapchain);

    assert_eq!(harness.device.live_resources(), baseline);
}

#[test]
fn shutdown_while_idle() {
    let harness = Harness::new();
    for _ in 0..5 {
        drop(harness.swapchain(2));
    }
}

#[test]
fn shutdown_while_busy() {
    let harness = Harness::new();
    let swapchain = harness.swapchain(3);
    let callback = marking_callback();

    for frame in 1..=5 {
        swapchain.set_frame_generation_config(interpolating(&callback, frame));
        swapchain.present(0, PresentFlags::empty()).unwrap();
    }
    // Windows are still in flight on the worker threads.
    drop(swapchain);
}

#[test]
fn capability_lookup() {
    let harness = Harness::new();
    let desc = Harness::desc(2, SwapchainFlags::empty());

    let direct = DirectSwapchain::new(&harness.device, &Harness::surface(), &desc, &harness.game_queue).unwrap();
    assert_eq!(direct.desc(), desc);
    assert!(matches!(
        frame_interpolation_swapchain(&direct),
        Err(SwapchainError::InvalidArgument { .. })
    ));

    direct.present(0, PresentFlags::empty()).unwrap();
    assert_eq!(direct.current_back_buffer_index(), 1);

    let proxy: Box<dyn Swapchain> = Box::new(harness.swapchain(2));
    let resolved = frame_interpolation_swapchain(&*proxy).unwrap();
    assert_eq!(resolved.desc(), desc);
}
