//! # Deferred Command Queue
//!
//! Graph mutations requested off the driving thread (async handlers, worker
//! threads) are queued here and applied by the world at fixed points: the
//! start of a tick and between the update and late update passes.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};

use crate::ecs::{InstanceId, World};
use crate::error::EntityResult;

/// A queued graph mutation.
pub type Command = Box<dyn FnOnce(&mut World) -> EntityResult<()> + Send>;

/// The receiving side, owned by the world.
pub(crate) struct CommandQueue {
    sender: Sender<Command>,
    receiver: Receiver<Command>,
}

impl CommandQueue {
    /// Creates a queue, bounded when `capacity` is given.
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        let (sender, receiver) = match capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        Self { sender, receiver }
    }

    /// Creates a sender handle.
    pub(crate) fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    /// Takes every command queued so far. Commands queued while the batch
    /// runs wait for the next fixed point.
    pub(crate) fn drain(&self) -> Vec<Command> {
        let mut commands = Vec::with_capacity(self.receiver.len());
        while let Ok(command) = self.receiver.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Number of queued commands.
    pub(crate) fn pending(&self) -> usize {
        self.receiver.len()
    }
}

/// Handle for queueing commands. Cheap to clone, `Send`.
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
}

impl CommandSender {
    /// Queues a closure to run against the world at the next fixed point.
    ///
    /// Returns `false` if the queue is full or the world is gone; the
    /// command is dropped in that case.
    pub fn push<F>(&self, command: F) -> bool
    where
        F: FnOnce(&mut World) -> EntityResult<()> + Send + 'static,
    {
        match self.sender.try_send(Box::new(command)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("command queue full, dropping command");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Queues disposal of a node.
    pub fn dispose(&self, node: InstanceId) -> bool {
        self.push(move |world| {
            world.dispose(node);
            Ok(())
        })
    }

    /// Queues a synchronous publish in the domain of `scene`.
    pub fn publish<E>(&self, scene: InstanceId, event: E) -> bool
    where
        E: Send + Sync + 'static,
    {
        self.push(move |world| world.publish(scene, event).map(|_| ()))
    }
}
