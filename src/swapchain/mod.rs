//!
//! Frame interpolation proxy swapchain.
//!
//! Application renders into replacement buffers owned by the proxy and calls
//! [`FrameInterpolationSwapchain::present`] as with any swapchain.
//! Present dispatches interpolation and publishes a pacing window.
//! Two worker threads take it from there:
//! the scheduler waits for interpolation and computes present delays,
//! the presenter composites frames into native back buffers and presents them on time.
//!

mod desc;
mod direct;
mod dispatch;
mod presenter;
mod scheduler;

pub use self::{
    desc::{SwapEffect, SwapchainDesc, SwapchainFlags, INTERNAL_BUFFER_COUNT, MAX_BUFFER_COUNT},
    direct::{frame_interpolation_swapchain, DirectSwapchain, Swapchain},
};

use std::{
    any::Any,
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use arrayvec::ArrayVec;
use parking_lot::Mutex;
use smallvec::{smallvec, SmallVec};

use crate::{
    backend::{BackendError, CommandList, Device, Factory, Fence, NativeSwapchain, Queue},
    clock::DEFAULT_TIMER_RESOLUTION,
    composite::CompositeResources,
    config::{FrameGenerationConfig, UiCompositionFlags},
    event::{Event, FrameLatencyWaitable},
    fence::{wait_for_fence_value, WaitCallback},
    pacing::{FrameInfo, FrameKind, Mailbox, PacingData},
    queue::{PresentError, PresentFlags, QueueKind},
    resource::{Format, Resource, ResourceDesc, ResourceUsage},
    surface::{ColorSpace, HdrMetadata, SurfaceInfo},
};

/// Bound on draining presentation when the proxy is dropped.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Slice in which worker threads wait on fences between shutdown checks.
const WORKER_WAIT_SLICE: Duration = Duration::from_millis(100);

const DEFAULT_MAX_FRAME_LATENCY: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SwapchainError {
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: &'static str },

    #[error(transparent)]
    Backend {
        #[from]
        source: BackendError,
    },

    #[error(transparent)]
    Present {
        #[from]
        source: PresentError,
    },

    #[error("Timed out waiting for fence `{fence}` to reach {value}")]
    Timeout { fence: String, value: u64 },

    #[error("Failed to spawn worker thread")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
}

/// GPU memory allocated by the proxy swapchain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuMemoryUsage {
    pub total_usage_in_bytes: u64,
    pub aliasable_usage_in_bytes: u64,
}

/// State shared with worker threads.
#[derive(Debug)]
pub(crate) struct PresentInfo {
    device: Arc<dyn Device>,
    game_queue: Arc<dyn Queue>,
    async_queue: Arc<dyn Queue>,
    present_queue: Arc<dyn Queue>,
    native: Mutex<Box<dyn NativeSwapchain>>,

    /// Signalled by game queue before interpolation and passthrough presents.
    game_fence: Arc<dyn Fence>,

    /// Signalled by interpolation queue after each dispatch.
    interpolation_fence: Arc<dyn Fence>,

    /// Reaches present index after the frame is handed to the native swapchain.
    present_fence: Arc<dyn Fence>,

    /// Reaches window's release index once its replacement buffer may be reused.
    replacement_buffer_fence: Arc<dyn Fence>,

    /// Reaches present index once the frame is composited into native back buffer.
    composition_fence: Arc<dyn Fence>,

    scheduled_interpolations: Mailbox<PacingData>,
    scheduled_presents: Mailbox<PacingData>,

    /// Wakes scheduler.
    interpolation_event: Event,

    /// Wakes presenter.
    present_event: Event,

    /// Set once previous interpolation completed.
    pacer_event: Event,

    shutdown: AtomicBool,
    previous_present_qpc: AtomicU64,
    frames_presented: AtomicU64,

    wait_callback: Mutex<Option<WaitCallback>>,
    composite: Mutex<Arc<CompositeResources>>,
    latency: FrameLatencyWaitable,
    timer_resolution: Duration,
}

impl PresentInfo {
    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn wait_callback(&self) -> Option<WaitCallback> {
        self.wait_callback.lock().clone()
    }

    /// Waits on fence from a worker thread.
    /// Returns `false` if shutdown was requested before the value was reached.
    fn wait_fence(&self, fence: &dyn Fence, value: u64, blocking: bool) -> bool {
        let callback = self.wait_callback();
        loop {
            if wait_for_fence_value(fence, value, Some(WORKER_WAIT_SLICE), callback.as_ref(), blocking) {
                return true;
            }
            if self.is_shutting_down() {
                warn!("Shutdown while waiting for {} to reach {}", fence.label(), value);
                return false;
            }
        }
    }
}

#[derive(Debug, Default)]
struct ReplacementBuffer {
    resource: Option<Resource>,

    /// Replacement buffer fence value after which the buffer may be written again.
    availability: u64,
}

#[derive(Debug)]
pub(crate) struct SwapchainState {
    /// Description as requested by the application.
    desc: SwapchainDesc,

    config: FrameGenerationConfig,
    interpolation_queue: Arc<dyn Queue>,

    replacement: ArrayVec<ReplacementBuffer, { MAX_BUFFER_COUNT as usize }>,
    registered_lists: ArrayVec<Option<Box<dyn CommandList>>, { MAX_BUFFER_COUNT as usize }>,

    interpolation_outputs: [Option<Resource>; 2],
    output_index: usize,

    ui_resource: Option<Resource>,
    ui_flags: UiCompositionFlags,
    ui_duplicates: [Option<Resource>; 2],
    ui_duplicate_index: usize,

    current_back_buffer_index: u32,
    previous_frame_id: Option<u64>,

    /// Interpolation history must be discarded by the next successful dispatch.
    reset_pending: bool,

    /// Replacement buffer of the previous present.
    previous_present_color: Option<Resource>,

    previous_frame_interpolated: bool,

    frames_sent: u64,
    last_window_base: u64,
    game_value: u64,
    interpolation_value: u64,

    hdr_metadata: HdrMetadata,
    color_space: ColorSpace,
    tearing_supported: bool,
}

impl SwapchainState {
    fn resize_tables(&mut self, buffer_count: u32) {
        self.replacement.clear();
        self.registered_lists.clear();
        for _ in 0..buffer_count {
            self.replacement.push(ReplacementBuffer::default());
            self.registered_lists.push(None);
        }
        self.current_back_buffer_index = 0;
    }

    fn resources(&self) -> impl Iterator<Item = &Resource> + '_ {
        self.replacement
            .iter()
            .filter_map(|buffer| buffer.resource.as_ref())
            .chain(self.interpolation_outputs.iter().flatten())
            .chain(self.ui_duplicates.iter().flatten())
    }
}

/// Swapchain that interpolates a frame between every two presented ones
/// and paces presentation on worker threads.
///
/// Looks like an ordinary swapchain to the application:
/// description and buffers reported are those the application requested.
pub struct FrameInterpolationSwapchain {
    info: Arc<PresentInfo>,
    state: Mutex<SwapchainState>,
    pending_config: Mutex<Option<FrameGenerationConfig>>,
    workers: Option<(JoinHandle<()>, JoinHandle<()>)>,
}

impl Debug for FrameInterpolationSwapchain {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if fmt.alternate() {
            fmt.debug_struct("FrameInterpolationSwapchain")
                .field("info", &self.info)
                .field("state", &self.state)
                .field("pending_config", &self.pending_config)
                .finish()
        } else {
            let state = self.state.lock();
            write!(
                fmt,
                "FrameInterpolationSwapchain({}x{}, {} buffers)",
                state.desc.width, state.desc.height, state.desc.buffer_count
            )
        }
    }
}

fn validate_buffer_count(buffer_count: u32) -> Result<(), SwapchainError> {
    if buffer_count == 0 || buffer_count > MAX_BUFFER_COUNT {
        return Err(SwapchainError::InvalidArgument {
            reason: "buffer count must be between 1 and MAX_BUFFER_COUNT",
        });
    }
    Ok(())
}

fn spawn_worker(
    name: &str,
    info: &Arc<PresentInfo>,
    f: fn(Arc<PresentInfo>),
) -> Result<JoinHandle<()>, SwapchainError> {
    let info = info.clone();
    std::thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || f(info))
        .map_err(|source| SwapchainError::Spawn { source })
}

/// Waits until all submitted game, interpolation and presentation work completes.
fn drain(
    info: &PresentInfo,
    state: &mut SwapchainState,
    timeout: Option<Duration>,
) -> Result<(), SwapchainError> {
    state.game_value += 1;
    info.game_queue.signal(&info.game_fence, state.game_value)?;

    let waits: SmallVec<[(&Arc<dyn Fence>, u64); 5]> = smallvec![
        (&info.game_fence, state.game_value),
        (&info.interpolation_fence, state.interpolation_value),
        (&info.composition_fence, state.frames_sent),
        (&info.replacement_buffer_fence, state.frames_sent),
        (&info.present_fence, state.frames_sent),
    ];

    let callback = info.wait_callback();
    for (fence, value) in waits {
        if !wait_for_fence_value(&**fence, value, timeout, callback.as_ref(), true) {
            return Err(SwapchainError::Timeout {
                fence: fence.label().to_owned(),
                value,
            });
        }
    }
    Ok(())
}

impl FrameInterpolationSwapchain {
    /// Creates proxy swapchain presenting to `surface`.
    ///
    /// Native swapchain is created with flip-discard model and fixed buffer count.
    /// `game_queue` is the queue the application submits rendering to.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn new(
        device: Arc<dyn Device>,
        factory: &dyn Factory,
        surface: &SurfaceInfo,
        desc: &SwapchainDesc,
        game_queue: Arc<dyn Queue>,
    ) -> Result<Self, SwapchainError> {
        validate_buffer_count(desc.buffer_count)?;

        let tearing_supported = factory.supports_tearing();
        let present_queue = device.create_queue(QueueKind::Graphics)?;
        let async_queue = device.create_queue(QueueKind::Compute)?;
        let native = factory.create_swapchain(surface, &desc.to_native(tearing_supported), &present_queue)?;

        let info = Arc::new(PresentInfo {
            game_fence: device.create_fence("game", 0)?,
            interpolation_fence: device.create_fence("interpolation", 0)?,
            present_fence: device.create_fence("present", 0)?,
            replacement_buffer_fence: device.create_fence("replacement-buffer", 0)?,
            composition_fence: device.create_fence("composition", 0)?,
            device,
            game_queue: game_queue.clone(),
            async_queue,
            present_queue,
            native: Mutex::new(native),
            scheduled_interpolations: Mailbox::new(),
            scheduled_presents: Mailbox::new(),
            interpolation_event: Event::new(false),
            present_event: Event::new(false),
            pacer_event: Event::new(true),
            shutdown: AtomicBool::new(false),
            previous_present_qpc: AtomicU64::new(0),
            frames_presented: AtomicU64::new(0),
            wait_callback: Mutex::new(None),
            composite: Mutex::new(Arc::new(CompositeResources::new(desc.format))),
            latency: FrameLatencyWaitable::new(DEFAULT_MAX_FRAME_LATENCY),
            timer_resolution: DEFAULT_TIMER_RESOLUTION,
        });

        let scheduler = spawn_worker("framepace-scheduler", &info, scheduler::run)?;
        let presenter = match spawn_worker("framepace-presenter", &info, presenter::run) {
            Ok(presenter) => presenter,
            Err(err) => {
                info.shutdown.store(true, Ordering::Release);
                info.interpolation_event.set();
                let _ = scheduler.join();
                return Err(err);
            }
        };

        let mut state = SwapchainState {
            desc: *desc,
            config: FrameGenerationConfig::default(),
            interpolation_queue: game_queue,
            replacement: ArrayVec::new(),
            registered_lists: ArrayVec::new(),
            interpolation_outputs: [None, None],
            output_index: 0,
            ui_resource: None,
            ui_flags: UiCompositionFlags::empty(),
            ui_duplicates: [None, None],
            ui_duplicate_index: 0,
            current_back_buffer_index: 0,
            previous_frame_id: None,
            reset_pending: true,
            previous_present_color: None,
            previous_frame_interpolated: false,
            frames_sent: 0,
            last_window_base: 0,
            game_value: 0,
            interpolation_value: 0,
            hdr_metadata: HdrMetadata::default(),
            color_space: ColorSpace::default(),
            tearing_supported,
        };
        state.resize_tables(desc.buffer_count);

        info!(
            "Frame interpolation swapchain created: {}x{} {:?}, {} buffers, tearing {}",
            desc.width, desc.height, desc.format, desc.buffer_count, tearing_supported
        );

        Ok(FrameInterpolationSwapchain {
            info,
            state: Mutex::new(state),
            pending_config: Mutex::new(None),
            workers: Some((scheduler, presenter)),
        })
    }

    /// Presents the current back buffer.
    ///
    /// With interpolation running the physical present happens later on the presenter thread.
    /// Returns once the next back buffer may be rendered to.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn present(&self, sync_interval: u32, flags: PresentFlags) -> Result<(), SwapchainError> {
        if flags.contains(PresentFlags::TEST) {
            self.info.native.lock().present(sync_interval, flags)?;
            return Ok(());
        }

        let mut state = self.state.lock();
        self.apply_pending_config(&mut state)?;

        let index = state.current_back_buffer_index;
        let run_interpolation = state.config.frame_generation_enabled
            && (state.config.frame_generation_callback.is_some()
                || matches!(state.registered_lists.get(index as usize), Some(Some(_))));

        // Keep at most one window ahead of composition.
        let callback = self.info.wait_callback();
        wait_for_fence_value(
            &*self.info.composition_fence,
            state.last_window_base,
            None,
            callback.as_ref(),
            true,
        );
        self.info
            .game_queue
            .wait(&self.info.composition_fence, state.last_window_base)?;

        let ui = self.ui_for_present(&mut state)?;

        let frame_id = state.config.frame_id;
        let reset = state.reset_pending
            || match state.previous_frame_id {
                Some(previous) => frame_id != previous && frame_id != previous.wrapping_add(1),
                None => true,
            };
        // Kept until an interpolation consumes it.
        state.reset_pending = reset;
        state.previous_frame_id = Some(frame_id);

        let real = self.replacement_buffer(&mut state, index)?;
        let vsync = sync_interval > 0;
        let sent_before = state.frames_sent;

        if run_interpolation {
            self.present_interpolated(&mut state, real.clone(), ui, reset, vsync)?;
        } else {
            self.present_passthrough(&mut state, real.clone(), ui, reset, vsync)?;
        }
        state.previous_present_color = Some(real);

        if let Some(list) = state.registered_lists.get_mut(index as usize) {
            if list.take().is_some() {
                debug!("Dropping unexecuted interpolation command list of buffer {}", index);
            }
        }

        let next = (index + 1) % state.desc.buffer_count;
        state.current_back_buffer_index = next;

        // No more than maximum frame latency windows may hold replacement buffers.
        let window_size = state.frames_sent - sent_before;
        let latency_bound = state
            .frames_sent
            .saturating_sub(u64::from(self.info.latency.maximum()) * window_size);
        let availability = state.replacement[next as usize].availability.max(latency_bound);
        drop(state);

        wait_for_fence_value(
            &*self.info.replacement_buffer_fence,
            availability,
            None,
            callback.as_ref(),
            true,
        );
        Ok(())
    }

    fn present_interpolated(
        &self,
        state: &mut SwapchainState,
        real: Resource,
        ui: Option<Resource>,
        reset: bool,
        vsync: bool,
    ) -> Result<(), SwapchainError> {
        // At most one interpolation in flight.
        self.info.pacer_event.wait();

        let window = match self.build_interpolated_window(state, real, ui, reset, vsync) {
            Ok(window) => window,
            Err(err) => {
                // Nothing was published, scheduler will not set it.
                self.info.pacer_event.set();
                return Err(err);
            }
        };

        let index = state.current_back_buffer_index as usize;
        state.replacement[index].availability = window.replacement_buffer_fence_signal;
        state.frames_sent = window.last_present_index();
        state.last_window_base = window.num_frames_sent_for_presentation_base;
        state.previous_frame_interpolated = true;

        trace!("Publishing {:?}", window);
        if let Some(dropped) = self.info.scheduled_interpolations.publish(window) {
            warn!("Pacing window {:?} replaced before interpolation", dropped);
        }
        self.info.interpolation_event.set();
        Ok(())
    }

    fn build_interpolated_window(
        &self,
        state: &mut SwapchainState,
        real: Resource,
        ui: Option<Resource>,
        reset: bool,
        vsync: bool,
    ) -> Result<PacingData, SwapchainError> {
        let output = self.interpolation_output_locked(state)?;
        let previous = if reset {
            None
        } else {
            state.previous_present_color.clone()
        };

        let dispatched = match dispatch::dispatch(
            &self.info,
            state,
            &real,
            previous.as_ref(),
            &output,
            reset,
        ) {
            Ok(dispatched) => dispatched,
            Err(err) => {
                error!("Interpolation dispatch failed: {}", err);
                false
            }
        };

        if dispatched {
            state.output_index ^= 1;
            state.reset_pending = false;
        } else {
            // Real frame goes out alone, nothing orders it after game work.
            state.game_value += 1;
            self.info.game_queue.signal(&self.info.game_fence, state.game_value)?;
            self.info
                .present_queue
                .wait(&self.info.game_fence, state.game_value)?;
        }

        let base = state.frames_sent;
        let mut window = self.window_template(state, ui, reset, vsync);

        let mut count = 0;
        if dispatched {
            count += 1;
            *window.frame_mut(FrameKind::Interpolated) = FrameInfo {
                do_present: true,
                resource: Some(output),
                interpolation_completed_fence_value: state.interpolation_value,
                present_index: base + count,
                present_qpc_delta: 0,
            };
        }

        if !dispatched || !state.config.only_present_interpolated {
            count += 1;
            *window.frame_mut(FrameKind::Real) = FrameInfo {
                do_present: true,
                resource: Some(real),
                interpolation_completed_fence_value: state.interpolation_value,
                present_index: base + count,
                present_qpc_delta: 0,
            };
        }

        window.num_frames_to_present = count as u32;
        window.replacement_buffer_fence_signal = base + count;
        Ok(window)
    }

    fn present_passthrough(
        &self,
        state: &mut SwapchainState,
        real: Resource,
        ui: Option<Resource>,
        reset: bool,
        vsync: bool,
    ) -> Result<(), SwapchainError> {
        if state.previous_frame_interpolated {
            // Outstanding interpolated windows must be presented first.
            drain(&self.info, state, None)?;
            state.previous_frame_interpolated = false;
        }

        state.game_value += 1;
        self.info.game_queue.signal(&self.info.game_fence, state.game_value)?;
        self.info
            .present_queue
            .wait(&self.info.game_fence, state.game_value)?;

        let base = state.frames_sent;
        let mut window = self.window_template(state, ui, reset, vsync);
        *window.frame_mut(FrameKind::Real) = FrameInfo {
            do_present: true,
            resource: Some(real),
            interpolation_completed_fence_value: state.interpolation_value,
            present_index: base + 1,
            present_qpc_delta: 0,
        };
        window.num_frames_to_present = 1;
        window.replacement_buffer_fence_signal = base + 1;

        let index = state.current_back_buffer_index as usize;
        state.replacement[index].availability = base + 1;
        state.frames_sent = base + 1;
        state.last_window_base = base + 1;

        presenter::present_window(&self.info, &window)
    }

    fn window_template(
        &self,
        state: &SwapchainState,
        ui: Option<Resource>,
        reset: bool,
        vsync: bool,
    ) -> PacingData {
        PacingData {
            tuning: state.config.tuning,
            vsync,
            tearing_supported: state.tearing_supported,
            draw_debug_pacing_lines: state.config.draw_debug_pacing_lines,
            usage_flags: state.ui_flags,
            num_frames_sent_for_presentation_base: state.frames_sent,
            ui_surface: ui,
            present_callback: state.config.present_callback.clone(),
            frame_id: state.config.frame_id,
            reset,
            ..PacingData::default()
        }
    }

    fn apply_pending_config(&self, state: &mut SwapchainState) -> Result<(), SwapchainError> {
        let next = match self.pending_config.lock().take() {
            Some(next) => next,
            None => return Ok(()),
        };

        if state.config.requires_drain(&next) {
            debug!("Frame generation config change requires draining presentation");
            drain(&self.info, state, None)?;

            for list in &mut state.registered_lists {
                *list = None;
            }
            state.reset_pending = true;

            state.interpolation_queue = if next.allow_async_workloads {
                self.info.async_queue.clone()
            } else {
                self.info.game_queue.clone()
            };
        }

        state.config = next;
        Ok(())
    }

    fn replacement_buffer(&self, state: &mut SwapchainState, index: u32) -> Result<Resource, SwapchainError> {
        let desc = state.desc;
        let buffer = state
            .replacement
            .get_mut(index as usize)
            .ok_or(SwapchainError::InvalidArgument {
                reason: "buffer index out of range",
            })?;

        if let Some(resource) = &buffer.resource {
            return Ok(resource.clone());
        }

        let resource = self.info.device.create_resource(
            &ResourceDesc {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                usage: desc.usage | ResourceUsage::TRANSFER_SRC | ResourceUsage::SAMPLED,
            },
            &format!("replacement-back-buffer-{}", index),
        )?;
        buffer.resource = Some(resource.clone());
        Ok(resource)
    }

    fn interpolation_output_locked(&self, state: &mut SwapchainState) -> Result<Resource, SwapchainError> {
        let desc = state.desc;
        let index = state.output_index;
        let slot = &mut state.interpolation_outputs[index];

        if let Some(resource) = slot {
            return Ok(resource.clone());
        }

        let resource = self.info.device.create_resource(
            &ResourceDesc {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                usage: ResourceUsage::STORAGE
                    | ResourceUsage::SAMPLED
                    | ResourceUsage::TRANSFER_SRC
                    | ResourceUsage::COLOR_ATTACHMENT,
            },
            &format!("interpolation-output-{}", index),
        )?;
        *slot = Some(resource.clone());
        Ok(resource)
    }

    /// Returns UI surface presented with this frame.
    /// With double buffering it is a copy taken on the game queue.
    fn ui_for_present(&self, state: &mut SwapchainState) -> Result<Option<Resource>, SwapchainError> {
        let ui = match &state.ui_resource {
            Some(ui) => ui.clone(),
            None => {
                state.ui_duplicates = [None, None];
                return Ok(None);
            }
        };

        if !state
            .ui_flags
            .contains(UiCompositionFlags::ENABLE_INTERNAL_UI_DOUBLE_BUFFERING)
        {
            return Ok(Some(ui));
        }

        // Alternate copies so the one the last window composites is not overwritten.
        state.ui_duplicate_index ^= 1;
        let index = state.ui_duplicate_index;
        let slot = &mut state.ui_duplicates[index];

        let duplicate = match slot {
            Some(duplicate)
                if duplicate.desc().width == ui.desc().width
                    && duplicate.desc().height == ui.desc().height
                    && duplicate.desc().format == ui.desc().format =>
            {
                duplicate.clone()
            }
            _ => {
                let duplicate = self.info.device.create_resource(
                    &ResourceDesc {
                        usage: ui.desc().usage | ResourceUsage::TRANSFER_DST | ResourceUsage::SAMPLED,
                        ..*ui.desc()
                    },
                    &format!("ui-duplicate-{}", index),
                )?;
                *slot = Some(duplicate.clone());
                duplicate
            }
        };

        let mut list = self.info.game_queue.create_command_list()?;
        list.copy_resource(&ui, &duplicate);
        list.close()?;
        self.info.game_queue.execute(list)?;

        Ok(Some(duplicate))
    }

    /// Changes buffer count, size, format or flags.
    ///
    /// Zero count, width or height keeps the current value.
    /// Waits for all presentation to complete and releases every buffer.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn resize_buffers(
        &self,
        buffer_count: u32,
        width: u32,
        height: u32,
        format: Option<Format>,
        flags: SwapchainFlags,
    ) -> Result<(), SwapchainError> {
        let mut state = self.state.lock();

        let buffer_count = if buffer_count == 0 {
            state.desc.buffer_count
        } else {
            buffer_count
        };
        validate_buffer_count(buffer_count)?;

        drain(&self.info, &mut state, None)?;

        let desc = SwapchainDesc {
            width: if width == 0 { state.desc.width } else { width },
            height: if height == 0 { state.desc.height } else { height },
            format: format.unwrap_or(state.desc.format),
            buffer_count,
            flags,
            ..state.desc
        };

        state.resize_tables(buffer_count);
        state.interpolation_outputs = [None, None];
        state.ui_duplicates = [None, None];
        state.reset_pending = true;
        state.previous_present_color = None;

        self.info
            .native
            .lock()
            .resize(&desc.to_native(state.tearing_supported))?;

        if desc.format != state.desc.format {
            *self.info.composite.lock() = Arc::new(CompositeResources::new(desc.format));
        }

        debug!("Swapchain resized to {:?}", desc);
        state.desc = desc;
        Ok(())
    }

    /// Returns replacement buffer the application renders into.
    pub fn buffer(&self, index: u32) -> Result<Resource, SwapchainError> {
        let mut state = self.state.lock();
        self.replacement_buffer(&mut state, index)
    }

    /// Description as requested by the application.
    pub fn desc(&self) -> SwapchainDesc {
        self.state.lock().desc
    }

    pub fn current_back_buffer_index(&self) -> u32 {
        self.state.lock().current_back_buffer_index
    }

    /// Stages configuration applied at the start of the next present.
    pub fn set_frame_generation_config(&self, config: FrameGenerationConfig) {
        *self.pending_config.lock() = Some(config);
    }

    /// Configuration currently in effect, ignoring staged one.
    pub fn frame_generation_config(&self) -> FrameGenerationConfig {
        self.state.lock().config.clone()
    }

    /// Sets UI surface composited over presented frames.
    ///
    /// Clearing the surface also disables internal double buffering.
    pub fn register_ui_resource(&self, ui: Option<Resource>, mut flags: UiCompositionFlags) {
        let mut state = self.state.lock();
        if ui.is_none() {
            flags.remove(UiCompositionFlags::ENABLE_INTERNAL_UI_DOUBLE_BUFFERING);
        }
        state.ui_resource = ui;
        state.ui_flags = flags;
    }

    /// Resource the next interpolation writes.
    pub fn interpolation_output(&self) -> Result<Resource, SwapchainError> {
        let mut state = self.state.lock();
        self.interpolation_output_locked(&mut state)
    }

    /// Creates command list for the interpolation queue.
    pub fn interpolation_command_list(&self) -> Result<Box<dyn CommandList>, SwapchainError> {
        let state = self.state.lock();
        Ok(state.interpolation_queue.create_command_list()?)
    }

    /// Registers interpolation commands for the current back buffer.
    ///
    /// Executed by the next present instead of invoking the frame generation callback.
    /// Dropped unexecuted if that present does not interpolate.
    pub fn register_interpolation_command_list(&self, list: Box<dyn CommandList>) {
        let mut state = self.state.lock();
        let index = state.current_back_buffer_index as usize;
        state.registered_lists[index] = Some(list);
    }

    /// Waits until all presentation work submitted so far is complete.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn wait_for_presents(&self) -> Result<(), SwapchainError> {
        let mut state = self.state.lock();
        drain(&self.info, &mut state, None)
    }

    pub fn set_hdr_metadata(&self, metadata: HdrMetadata) -> Result<(), SwapchainError> {
        let mut state = self.state.lock();
        self.info.native.lock().set_hdr_metadata(metadata)?;
        state.hdr_metadata = metadata;
        Ok(())
    }

    pub fn set_color_space(&self, color_space: ColorSpace) -> Result<(), SwapchainError> {
        let mut state = self.state.lock();
        self.info.native.lock().set_color_space(color_space)?;
        state.color_space = color_space;
        Ok(())
    }

    /// Returns waitable object if swapchain was created with
    /// [`SwapchainFlags::FRAME_LATENCY_WAITABLE_OBJECT`].
    pub fn frame_latency_waitable(&self) -> Option<FrameLatencyWaitable> {
        let state = self.state.lock();
        if state
            .desc
            .flags
            .contains(SwapchainFlags::FRAME_LATENCY_WAITABLE_OBJECT)
        {
            Some(self.info.latency.clone())
        } else {
            None
        }
    }

    pub fn set_maximum_frame_latency(&self, maximum: u32) -> Result<(), SwapchainError> {
        if maximum == 0 || maximum > MAX_BUFFER_COUNT {
            return Err(SwapchainError::InvalidArgument {
                reason: "maximum frame latency must be between 1 and MAX_BUFFER_COUNT",
            });
        }
        self.info.latency.set_maximum(maximum);
        Ok(())
    }

    pub fn maximum_frame_latency(&self) -> u32 {
        self.info.latency.maximum()
    }

    /// Sets hook called periodically while any thread waits on a fence.
    pub fn set_wait_callback(&self, callback: Option<WaitCallback>) {
        *self.info.wait_callback.lock() = callback;
    }

    /// Memory allocated for replacement buffers, interpolation outputs and UI copies.
    pub fn gpu_memory_usage(&self) -> Result<GpuMemoryUsage, SwapchainError> {
        let state = self.state.lock();
        Ok(GpuMemoryUsage {
            total_usage_in_bytes: state.resources().map(Resource::size_in_bytes).sum(),
            aliasable_usage_in_bytes: 0,
        })
    }

    /// Number of frames handed to presentation, interpolated ones included.
    pub fn frames_sent_for_presentation(&self) -> u64 {
        self.state.lock().frames_sent
    }

    /// Number of successful native presents.
    pub fn frames_presented(&self) -> u64 {
        self.info.frames_presented.load(Ordering::Acquire)
    }

    /// Value present fence has reached.
    pub fn completed_present_index(&self) -> u64 {
        self.info.present_fence.completed_value()
    }

    /// Value interpolation fence has reached.
    pub fn completed_interpolation_index(&self) -> u64 {
        self.info.interpolation_fence.completed_value()
    }
}

impl Drop for FrameInterpolationSwapchain {
    fn drop(&mut self) {
        let info = self.info.clone();
        let state = self.state.get_mut();

        if let Err(err) = drain(&info, state, Some(SHUTDOWN_TIMEOUT)) {
            warn!("Presentation did not drain before shutdown: {}", err);
        }

        info.shutdown.store(true, Ordering::Release);
        info.interpolation_event.set();
        info.present_event.set();
        info.pacer_event.set();

        if let Some((scheduler, presenter)) = self.workers.take() {
            if scheduler.join().is_err() {
                error!("Interpolation scheduler panicked");
            }
            if presenter.join().is_err() {
                error!("Presenter panicked");
            }
        }

        // Nothing may be left waiting on these fences.
        let finals = [
            (&info.game_fence, state.game_value),
            (&info.interpolation_fence, state.interpolation_value),
            (&info.composition_fence, state.frames_sent),
            (&info.replacement_buffer_fence, state.frames_sent),
            (&info.present_fence, state.frames_sent),
        ];
        for (fence, value) in finals {
            if let Err(err) = fence.signal(value) {
                error!("Failed to signal {} on shutdown: {}", fence.label(), err);
            }
        }

        for queue in [&info.present_queue, &info.async_queue, &info.game_queue] {
            if let Err(err) = queue.wait_idle() {
                error!("Failed to wait for {:?} queue: {}", queue.kind(), err);
            }
        }

        state.replacement.clear();
        state.registered_lists.clear();
        state.interpolation_outputs = [None, None];
        state.ui_duplicates = [None, None];
        state.ui_resource = None;
        state.previous_present_color = None;

        debug!("Frame interpolation swapchain destroyed");
    }
}

impl Swapchain for FrameInterpolationSwapchain {
    fn present(&self, sync_interval: u32, flags: PresentFlags) -> Result<(), SwapchainError> {
        FrameInterpolationSwapchain::present(self, sync_interval, flags)
    }

    fn resize_buffers(
        &self,
        buffer_count: u32,
        width: u32,
        height: u32,
        format: Option<Format>,
        flags: SwapchainFlags,
    ) -> Result<(), SwapchainError> {
        FrameInterpolationSwapchain::resize_buffers(self, buffer_count, width, height, format, flags)
    }

    fn buffer(&self, index: u32) -> Result<Resource, SwapchainError> {
        FrameInterpolationSwapchain::buffer(self, index)
    }

    fn desc(&self) -> SwapchainDesc {
        FrameInterpolationSwapchain::desc(self)
    }

    fn current_back_buffer_index(&self) -> u32 {
        FrameInterpolationSwapchain::current_back_buffer_index(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
