// ManagerChannel: message plumbing between a controller and one manager
//
// The controller endpoint writes envelopes, the worker endpoint reads them.
// Replies to blocking instructions travel back on a oneshot slot carried by
// the instruction itself, so concurrent callers can never receive each
// other's replies.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::DispatchError;

/// Reply slot for a blocking instruction.
pub type Reply<T> = oneshot::Sender<T>;

/// Implemented by every typed instruction set.
pub trait InstructionKind {
    /// Handler name of this instruction, e.g. `_pause_playback`.
    fn name(&self) -> &'static str;
}

/// Dynamically named instruction: a handler name plus positional arguments.
///
/// Managers resolve the names they know into their typed instruction set;
/// anything else is a [`DispatchError`] for that manager only.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub name: String,
    pub args: Vec<Value>,
}

impl Instruction {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Fail unless exactly `count` positional arguments were supplied.
    pub fn expect_args(&self, manager: &'static str, count: usize) -> Result<(), DispatchError> {
        if self.args.len() == count {
            return Ok(());
        }
        Err(DispatchError::InvalidArguments {
            manager,
            name: self.name.clone(),
            reason: format!("expected {} argument(s), got {}", count, self.args.len()),
        })
    }

    /// Deserialize the positional argument at `index`.
    pub fn arg<T: DeserializeOwned>(
        &self,
        manager: &'static str,
        index: usize,
    ) -> Result<T, DispatchError> {
        let value = self
            .args
            .get(index)
            .ok_or_else(|| DispatchError::InvalidArguments {
                manager,
                name: self.name.clone(),
                reason: format!("missing argument #{}", index),
            })?;

        serde_json::from_value(value.clone()).map_err(|err| DispatchError::InvalidArguments {
            manager,
            name: self.name.clone(),
            reason: format!("argument #{}: {}", index, err),
        })
    }

    /// Error for a name the manager has no handler for.
    pub fn unknown(&self, manager: &'static str) -> DispatchError {
        DispatchError::UnknownInstruction {
            manager,
            name: self.name.clone(),
        }
    }
}

/// Everything that can travel from the controller to a worker.
#[derive(Debug)]
pub(crate) enum Envelope<I> {
    Typed(I),
    Named(Instruction),
    /// Reserved `_stop_process` instruction.
    Stop,
}

/// Controller-side endpoint.
pub(crate) type ControllerEndpoint<I> = mpsc::UnboundedSender<Envelope<I>>;

/// Worker-side endpoint.
pub(crate) type WorkerEndpoint<I> = mpsc::UnboundedReceiver<Envelope<I>>;

/// A fresh, connected endpoint pair.
pub(crate) struct ManagerChannel<I> {
    pub controller: ControllerEndpoint<I>,
    pub worker: WorkerEndpoint<I>,
}

impl<I> ManagerChannel<I> {
    pub fn new() -> Self {
        let (controller, worker) = mpsc::unbounded_channel();
        Self { controller, worker }
    }
}

/// Send a reply, noting when the caller already gave up waiting.
pub(crate) fn respond<T>(reply: Reply<T>, value: T, manager: &'static str, instruction: &str) {
    if reply.send(value).is_err() {
        log::debug!(
            "[{}] caller of '{}' stopped waiting before the reply was ready",
            manager,
            instruction
        );
    }
}
