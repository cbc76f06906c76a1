use crate::{
    config::FrameGenerationDispatch,
    resource::{Rect, Resource},
    surface::TransferFunction,
};

use super::{PresentInfo, SwapchainError, SwapchainState};

/// Submits interpolation of the current back buffer into `output`.
///
/// Interpolation queue waits for all game work submitted so far.
/// Then either the command list registered for the back buffer is executed,
/// or a new one is recorded by the frame generation callback.
///
/// Returns `true` if interpolation work was submitted and the interpolation
/// fence will reach `state.interpolation_value`.
/// Callback failure is not an error, no interpolated frame is produced then.
pub(super) fn dispatch(
    info: &PresentInfo,
    state: &mut SwapchainState,
    present_color: &Resource,
    previous_present_color: Option<&Resource>,
    output: &Resource,
    reset: bool,
) -> Result<bool, SwapchainError> {
    let queue = state.interpolation_queue.clone();

    state.game_value += 1;
    info.game_queue.signal(&info.game_fence, state.game_value)?;
    queue.wait(&info.game_fence, state.game_value)?;

    let index = state.current_back_buffer_index as usize;
    let registered = state.registered_lists.get_mut(index).and_then(Option::take);

    let list = match registered {
        Some(list) => {
            trace!("Executing registered interpolation command list for buffer {}", index);
            Some(list)
        }
        None => match state.config.frame_generation_callback.clone() {
            None => None,
            Some(callback) => {
                let mut list = queue.create_command_list()?;

                let interpolation_rect = if state.config.interpolation_rect.is_empty() {
                    Rect {
                        left: 0,
                        top: 0,
                        width: state.desc.width,
                        height: state.desc.height,
                    }
                } else {
                    state.config.interpolation_rect
                };

                let mut dispatch = FrameGenerationDispatch {
                    command_list: &mut *list,
                    output,
                    present_color,
                    previous_present_color,
                    reset,
                    num_generated_frames: 1,
                    transfer_function: TransferFunction::from(state.color_space),
                    min_max_luminance: [
                        state.hdr_metadata.min_luminance,
                        state.hdr_metadata.max_luminance,
                    ],
                    interpolation_rect,
                    flags: state.config.flags,
                    frame_id: state.config.frame_id,
                };

                match callback.call(&mut dispatch) {
                    Ok(()) => Some(list),
                    Err(err) => {
                        warn!("Frame generation failed for frame {}: {}", state.config.frame_id, err);
                        None
                    }
                }
            }
        },
    };

    let mut list = match list {
        Some(list) => list,
        None => return Ok(false),
    };

    list.close()?;
    queue.execute(list)?;

    state.interpolation_value += 1;
    queue.signal(&info.interpolation_fence, state.interpolation_value)?;
    Ok(true)
}
