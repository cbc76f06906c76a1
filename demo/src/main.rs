use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use framepace::{
    backend::headless::{HeadlessCommandList, HeadlessDevice},
    ticks_to_duration, Device, Format, FrameGenerationCallback, FrameGenerationConfig,
    FrameInterpolationSwapchain, FramePacingTuning, PresentFlags, Queue, QueueKind, ResourceUsage,
    SurfaceInfo, SwapEffect, SwapchainDesc, SwapchainFlags, PERFORMANCE_FREQUENCY,
};
use raw_window_handle::{RawWindowHandle, WebWindowHandle};
use tracing_subscriber::prelude::*;

const FRAMES: u64 = 240;
const GAME_FRAME_TIME: Duration = Duration::from_micros(16_667);

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_error::ErrorLayer::default())
        .init();

    let device = HeadlessDevice::with_tearing(true);
    let game_queue = device.create_queue(QueueKind::Graphics)?;

    let swapchain = FrameInterpolationSwapchain::new(
        Arc::new(device.clone()),
        &device,
        &SurfaceInfo {
            window: RawWindowHandle::Web(WebWindowHandle::empty()),
        },
        &SwapchainDesc {
            width: 1920,
            height: 1080,
            format: Format::BGRA8Srgb,
            buffer_count: 2,
            usage: ResourceUsage::COLOR_ATTACHMENT,
            swap_effect: SwapEffect::FlipDiscard,
            flags: SwapchainFlags::FRAME_LATENCY_WAITABLE_OBJECT,
        },
        game_queue.clone(),
    )?;

    let callback = FrameGenerationCallback::new(|dispatch| {
        if let Some(list) = dispatch
            .command_list
            .as_any_mut()
            .downcast_mut::<HeadlessCommandList>()
        {
            list.write_marker(dispatch.output, dispatch.frame_id | 1 << 63);
        }
        Ok(())
    });

    let latency = swapchain
        .frame_latency_waitable()
        .ok_or_else(|| eyre::eyre!("Swapchain has no frame latency waitable"))?;

    let start = Instant::now();
    for frame_id in 0..FRAMES {
        latency.wait(Some(GAME_FRAME_TIME * 2));
        let frame_start = Instant::now();

        swapchain.set_frame_generation_config(FrameGenerationConfig {
            frame_generation_enabled: true,
            frame_generation_callback: Some(callback.clone()),
            frame_id,
            tuning: FramePacingTuning {
                allow_hybrid_spin: true,
                ..FramePacingTuning::default()
            },
            ..FrameGenerationConfig::default()
        });

        let buffer = swapchain.buffer(swapchain.current_back_buffer_index())?;
        let mut list = game_queue.create_command_list()?;
        if let Some(list) = list.as_any_mut().downcast_mut::<HeadlessCommandList>() {
            list.write_marker(&buffer, frame_id);
        }
        list.close()?;
        game_queue.execute(list)?;

        // Simulated CPU and GPU frame cost.
        if let Some(rest) = GAME_FRAME_TIME.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }

        swapchain.present(0, PresentFlags::empty())?;
    }
    swapchain.wait_for_presents()?;

    let elapsed = start.elapsed();
    let presents = device.presents();
    let intervals: Vec<Duration> = presents
        .windows(2)
        .map(|pair| ticks_to_duration(pair[1].qpc.saturating_sub(pair[0].qpc), PERFORMANCE_FREQUENCY))
        .collect();

    let interpolated = presents.iter().filter(|p| p.contents >> 63 == 1).count();
    tracing::info!(
        "{} frames rendered in {:?}, {} presented ({} interpolated)",
        FRAMES,
        elapsed,
        presents.len(),
        interpolated,
    );

    if let (Some(min), Some(max)) = (intervals.iter().min(), intervals.iter().max()) {
        let sum: Duration = intervals.iter().sum();
        println!(
            "present interval: min {:?}, avg {:?}, max {:?}",
            min,
            sum / intervals.len() as u32,
            max
        );
    }

    let usage = swapchain.gpu_memory_usage()?;
    println!("gpu memory: {} bytes", usage.total_usage_in_bytes);

    Ok(())
}
