use std::{
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};

use crate::{
    backend::{BackendError, CommandList, Fence, Queue},
    queue::QueueKind,
    DeviceLost,
};

use super::encode::HeadlessCommandList;

/// Granularity at which a blocked worker checks for shutdown.
const WAIT_SLICE: Duration = Duration::from_millis(5);

enum Op {
    Execute(HeadlessCommandList),
    Signal(Arc<dyn Fence>, u64),
    Wait(Arc<dyn Fence>, u64),
    Flush(Sender<()>),
}

/// Queue executing commands on a dedicated worker thread.
pub struct HeadlessQueue {
    kind: QueueKind,
    sender: Option<Sender<Op>>,
    worker: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Debug for HeadlessQueue {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if fmt.alternate() {
            fmt.debug_struct("HeadlessQueue")
                .field("kind", &self.kind)
                .field("pending", &self.sender.as_ref().map_or(0, Sender::len))
                .finish()
        } else {
            write!(fmt, "HeadlessQueue({:?})", self.kind)
        }
    }
}

impl HeadlessQueue {
    pub fn new(kind: QueueKind) -> Result<Self, BackendError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = std::thread::Builder::new()
            .name(format!("headless-{:?}-queue", kind).to_lowercase())
            .spawn({
                let shutdown = shutdown.clone();
                move || run(receiver, shutdown)
            })
            .map_err(|_| BackendError::Unsupported)?;

        Ok(HeadlessQueue {
            kind,
            sender: Some(sender),
            worker: Some(worker),
            shutdown,
        })
    }

    fn submit(&self, op: Op) -> Result<(), BackendError> {
        match &self.sender {
            Some(sender) => sender.send(op).map_err(|_| BackendError::from(DeviceLost)),
            None => Err(DeviceLost.into()),
        }
    }
}

fn run(receiver: Receiver<Op>, shutdown: Arc<AtomicBool>) {
    for op in receiver {
        match op {
            Op::Execute(list) => list.run(),
            Op::Signal(fence, value) => {
                if let Err(err) = fence.signal(value) {
                    error!("Failed to signal {:?}: {}", fence, err);
                }
            }
            Op::Wait(fence, value) => {
                while !fence.wait_blocking(value, WAIT_SLICE) {
                    if shutdown.load(Ordering::Acquire) {
                        warn!("Queue shut down while waiting for {:?} to reach {}", fence, value);
                        break;
                    }
                }
            }
            Op::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

impl Queue for HeadlessQueue {
    fn kind(&self) -> QueueKind {
        self.kind
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>, BackendError> {
        Ok(Box::new(HeadlessCommandList::new(self.kind)))
    }

    fn execute(&self, list: Box<dyn CommandList>) -> Result<(), BackendError> {
        let list = list
            .into_any()
            .downcast::<HeadlessCommandList>()
            .map_err(|_| BackendError::Unsupported)?;

        debug_assert!(list.is_closed(), "Executing command list that was not closed");
        self.submit(Op::Execute(*list))
    }

    fn signal(&self, fence: &Arc<dyn Fence>, value: u64) -> Result<(), BackendError> {
        self.submit(Op::Signal(fence.clone(), value))
    }

    fn wait(&self, fence: &Arc<dyn Fence>, value: u64) -> Result<(), BackendError> {
        self.submit(Op::Wait(fence.clone(), value))
    }

    fn wait_idle(&self) -> Result<(), BackendError> {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        self.submit(Op::Flush(sender))?;
        receiver.recv().map_err(|_| BackendError::from(DeviceLost))
    }
}

impl Drop for HeadlessQueue {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Headless {:?} queue worker panicked", self.kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessFence;

    #[test]
    fn executes_in_submission_order() {
        let queue = HeadlessQueue::new(QueueKind::Graphics).unwrap();
        let gate: Arc<dyn Fence> = Arc::new(HeadlessFence::new("gate", 0));
        let done: Arc<dyn Fence> = Arc::new(HeadlessFence::new("done", 0));

        queue.wait(&gate, 1).unwrap();
        queue.signal(&done, 1).unwrap();

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(done.completed_value(), 0);

        gate.signal(1).unwrap();
        queue.wait_idle().unwrap();
        assert_eq!(done.completed_value(), 1);
    }

    #[test]
    fn drop_unblocks_pending_wait() {
        let queue = HeadlessQueue::new(QueueKind::Compute).unwrap();
        let never: Arc<dyn Fence> = Arc::new(HeadlessFence::new("never", 0));
        queue.wait(&never, 1).unwrap();
        drop(queue);
    }
}
