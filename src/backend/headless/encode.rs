use std::any::Any;

use crate::{
    backend::{BackendError, CommandList},
    queue::QueueKind,
    resource::{Pipeline, Resource},
};

use super::device::HeadlessResource;

/// Command recorded by [`HeadlessCommandList`].
#[derive(Clone, Debug)]
pub enum Command {
    Copy {
        src: Resource,
        dst: Resource,
    },

    /// Writes sum of frame and UI markers into target.
    CompositeUi {
        frame: Resource,
        ui: Resource,
        target: Resource,
        premultiplied_alpha: bool,
    },

    /// Leaves target contents intact.
    PacingLines {
        target: Resource,
        present_index: u64,
    },

    /// Writes `value` into target.
    Marker {
        target: Resource,
        value: u64,
    },
}

impl Command {
    fn run(&self) {
        match self {
            Command::Copy { src, dst } => write(dst, read(src)),
            Command::CompositeUi {
                frame, ui, target, ..
            } => write(target, read(frame).wrapping_add(read(ui))),
            Command::PacingLines { .. } => {}
            Command::Marker { target, value } => write(target, *value),
        }
    }
}

fn read(resource: &Resource) -> u64 {
    resource
        .raw::<HeadlessResource>()
        .map_or(0, HeadlessResource::contents)
}

fn write(resource: &Resource, value: u64) {
    match resource.raw::<HeadlessResource>() {
        Some(raw) => raw.write(value),
        None => warn!("Resource {:?} was not created by headless device", resource),
    }
}

#[derive(Debug)]
pub struct HeadlessCommandList {
    queue: QueueKind,
    commands: Vec<Command>,
    closed: bool,
}

impl HeadlessCommandList {
    pub(super) fn new(queue: QueueKind) -> Self {
        HeadlessCommandList {
            queue,
            commands: Vec::new(),
            closed: false,
        }
    }

    /// Kind of the queue this list was created for.
    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Records write of arbitrary marker into `target`.
    /// Stands in for any rendering work.
    pub fn write_marker(&mut self, target: &Resource, value: u64) {
        self.push(Command::Marker {
            target: target.clone(),
            value,
        });
    }

    fn push(&mut self, command: Command) {
        debug_assert!(!self.closed, "Recording into closed command list");
        self.commands.push(command);
    }

    pub(super) fn run(self) {
        for command in &self.commands {
            command.run();
        }
    }
}

impl CommandList for HeadlessCommandList {
    fn copy_resource(&mut self, src: &Resource, dst: &Resource) {
        self.push(Command::Copy {
            src: src.clone(),
            dst: dst.clone(),
        });
    }

    fn composite_ui(
        &mut self,
        _pipeline: &Pipeline,
        frame: &Resource,
        ui: &Resource,
        target: &Resource,
        premultiplied_alpha: bool,
    ) {
        self.push(Command::CompositeUi {
            frame: frame.clone(),
            ui: ui.clone(),
            target: target.clone(),
            premultiplied_alpha,
        });
    }

    fn draw_pacing_lines(&mut self, _pipeline: &Pipeline, target: &Resource, present_index: u64) {
        self.push(Command::PacingLines {
            target: target.clone(),
            present_index,
        });
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.closed = true;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}
