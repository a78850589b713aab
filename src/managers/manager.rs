// Manager: isolated worker with a strictly ordered instruction stream
//
// A manager's private state moves into its own Tokio task on `start()`.
// From then on the controller reaches it only through the channel: typed
// instructions, dynamically named instructions, and the reserved stop
// instruction. Instructions sent to one manager run one at a time, in the
// order they were sent.

use std::any::Any;
use std::future::Future;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::{log_dispatch_error, DispatchError, ManagerError};

use super::channel::{
    ControllerEndpoint, Envelope, Instruction, InstructionKind, ManagerChannel, Reply,
    WorkerEndpoint,
};

/// Worker-side behaviour of a manager.
///
/// Implementors own their state outright; the dispatch loop hands them one
/// instruction at a time.
pub trait Manager: Send + 'static {
    /// Typed instruction set accepted by this manager.
    type Instruction: InstructionKind + Send + 'static;

    /// Name used in logs and errors.
    const NAME: &'static str;

    /// Execute one instruction. Errors are logged by the dispatch loop.
    fn handle(
        &mut self,
        instruction: Self::Instruction,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Map a dynamically named instruction onto the typed set.
    ///
    /// Only fire-and-forget instructions can be named; blocking ones need a
    /// reply slot and go through the typed wrappers.
    fn resolve(&self, instruction: &Instruction) -> Result<Self::Instruction, DispatchError> {
        Err(instruction.unknown(Self::NAME))
    }

    /// Runs once after the stop instruction is honored.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Controller-side endpoint of a manager.
///
/// Cheap to clone; every clone feeds the same ordered channel. Concrete
/// managers add their wrapper operations as inherent methods on
/// `ManagerClient<TheirManager>`.
pub struct ManagerClient<M: Manager> {
    outbox: ControllerEndpoint<M::Instruction>,
    reply_timeout: Duration,
}

impl<M: Manager> Clone for ManagerClient<M> {
    fn clone(&self) -> Self {
        Self {
            outbox: self.outbox.clone(),
            reply_timeout: self.reply_timeout,
        }
    }
}

impl<M: Manager> ManagerClient<M> {
    /// Name of the manager this client talks to.
    pub fn manager_name(&self) -> &'static str {
        M::NAME
    }

    /// Enqueue a non-blocking instruction and return immediately.
    pub fn send(&self, instruction: M::Instruction) -> Result<(), ManagerError> {
        self.post(Envelope::Typed(instruction))
    }

    /// Enqueue a blocking instruction and wait for its single reply.
    ///
    /// `build` receives the reply slot and returns the instruction carrying
    /// it. Waits at most the configured reply timeout.
    pub async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> M::Instruction,
    ) -> Result<T, ManagerError> {
        let (reply, response) = oneshot::channel();
        let instruction = build(reply);
        let name = instruction.name();
        self.post(Envelope::Typed(instruction))?;

        match tokio::time::timeout(self.reply_timeout, response).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ManagerError::ReplyDropped {
                manager: M::NAME,
                instruction: name,
            }),
            Err(_) => Err(ManagerError::ReplyTimeout {
                manager: M::NAME,
                instruction: name,
                timeout_ms: self.reply_timeout.as_millis() as u64,
            }),
        }
    }

    /// Enqueue a dynamically named, non-blocking instruction.
    pub fn send_named(&self, instruction: Instruction) -> Result<(), ManagerError> {
        self.post(Envelope::Named(instruction))
    }

    /// Send the reserved stop instruction.
    ///
    /// Instructions queued before it still run. Does not wait for the
    /// worker to exit; use [`ManagerHandle::join`] for that.
    pub fn stop(&self) -> Result<(), ManagerError> {
        self.post(Envelope::Stop)
    }

    fn post(&self, envelope: Envelope<M::Instruction>) -> Result<(), ManagerError> {
        self.outbox
            .send(envelope)
            .map_err(|_| ManagerError::Disconnected { manager: M::NAME })
    }
}

/// Execution state of the worker side.
enum Lifecycle<M: Manager> {
    /// Constructed, dispatch loop not launched yet.
    Idle {
        manager: M,
        inbox: WorkerEndpoint<M::Instruction>,
    },
    Running(JoinHandle<()>),
    /// Dispatch task joined.
    Joined,
}

/// Owning handle of a manager: its controller endpoint plus the execution
/// handle of its dispatch loop.
///
/// Dereferences to [`ManagerClient`] so wrapper operations can be called on
/// the handle directly.
///
/// # Example
/// ```ignore
/// let playback = ManagerHandle::new(Playback::new(&config.playback), timeout);
/// playback.start()?;
/// playback.resume_playback()?;
/// playback.stop()?;
/// playback.join().await?;
/// ```
pub struct ManagerHandle<M: Manager> {
    client: ManagerClient<M>,
    lifecycle: Mutex<Lifecycle<M>>,
}

impl<M: Manager> ManagerHandle<M> {
    /// Wrap `manager` with a fresh channel. The dispatch loop is not running
    /// yet; instructions sent before `start()` are queued.
    pub fn new(manager: M, reply_timeout: Duration) -> Self {
        let ManagerChannel { controller, worker } = ManagerChannel::new();
        Self {
            client: ManagerClient {
                outbox: controller,
                reply_timeout,
            },
            lifecycle: Mutex::new(Lifecycle::Idle {
                manager,
                inbox: worker,
            }),
        }
    }

    /// Launch the dispatch loop as its own task on the current Tokio runtime.
    ///
    /// # Errors
    /// - `AlreadyStarted` if called more than once
    /// - `NoRuntime` if called outside a Tokio runtime
    pub fn start(&self) -> Result<(), ManagerError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ManagerError::NoRuntime { manager: M::NAME })?;
        let mut lifecycle = self.lock()?;

        match std::mem::replace(&mut *lifecycle, Lifecycle::Joined) {
            Lifecycle::Idle { manager, inbox } => {
                let span = tracing::info_span!("manager", name = M::NAME);
                let task = runtime.spawn(dispatch_loop(manager, inbox).instrument(span));
                *lifecycle = Lifecycle::Running(task);
                info!("[{}] Started", M::NAME);
                Ok(())
            }
            other => {
                *lifecycle = other;
                Err(ManagerError::AlreadyStarted { manager: M::NAME })
            }
        }
    }

    /// Wait for the dispatch loop to exit.
    ///
    /// Returns immediately if it was already joined.
    pub async fn join(&self) -> Result<(), ManagerError> {
        let task = {
            let mut lifecycle = self.lock()?;
            match std::mem::replace(&mut *lifecycle, Lifecycle::Joined) {
                Lifecycle::Running(task) => task,
                Lifecycle::Joined => return Ok(()),
                idle @ Lifecycle::Idle { .. } => {
                    *lifecycle = idle;
                    return Err(ManagerError::NotStarted { manager: M::NAME });
                }
            }
        };

        task.await.map_err(|err| ManagerError::JoinFailed {
            manager: M::NAME,
            reason: err.to_string(),
        })
    }

    /// Whether the dispatch loop has been launched and has not exited.
    pub fn is_running(&self) -> bool {
        match self.lifecycle.lock() {
            Ok(lifecycle) => matches!(&*lifecycle, Lifecycle::Running(task) if !task.is_finished()),
            Err(_) => false,
        }
    }

    /// A clonable controller endpoint for this manager.
    pub fn client(&self) -> ManagerClient<M> {
        self.client.clone()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Lifecycle<M>>, ManagerError> {
        self.lifecycle
            .lock()
            .map_err(|_| ManagerError::LockPoisoned { manager: M::NAME })
    }
}

impl<M: Manager> Deref for ManagerHandle<M> {
    type Target = ManagerClient<M>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Receive-resolve-execute cycle of one manager.
///
/// The stop flag is checked before each receive, so everything queued ahead
/// of the stop instruction is executed first.
async fn dispatch_loop<M: Manager>(mut manager: M, mut inbox: WorkerEndpoint<M::Instruction>) {
    debug!("[{}] Dispatch loop running", M::NAME);
    let mut stop_requested = false;

    while !stop_requested {
        let Some(envelope) = inbox.recv().await else {
            warn!("[{}] All controller endpoints dropped", M::NAME);
            break;
        };

        match envelope {
            Envelope::Stop => {
                debug!("[{}] Stop requested", M::NAME);
                stop_requested = true;
            }
            Envelope::Typed(instruction) => execute(&mut manager, instruction).await,
            Envelope::Named(named) => match manager.resolve(&named) {
                Ok(instruction) => execute(&mut manager, instruction).await,
                Err(err) => log_dispatch_error(&err, M::NAME),
            },
        }
    }

    manager.shutdown().await;
    info!("[{}] Dispatch loop stopped", M::NAME);
}

/// Run one handler, containing both its errors and its panics.
async fn execute<M: Manager>(manager: &mut M, instruction: M::Instruction) {
    let name = instruction.name();
    debug!("[{}] Dispatching '{}'", M::NAME, name);

    match AssertUnwindSafe(manager.handle(instruction))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!("[{}] Handler '{}' failed: {:#}", M::NAME, name, err),
        Err(panic) => log_dispatch_error(
            &DispatchError::HandlerPanicked {
                manager: M::NAME,
                name: name.to_string(),
                reason: panic_reason(panic.as_ref()),
            },
            M::NAME,
        ),
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::managers::channel::respond;
    use serde_json::json;

    /// Minimal manager recording the values it was sent.
    #[derive(Default)]
    struct Recorder {
        values: Vec<u32>,
        stalled: Vec<Reply<Vec<u32>>>,
    }

    enum RecorderInstruction {
        Push(u32),
        Snapshot(Reply<Vec<u32>>),
        Stall(Reply<Vec<u32>>),
        Fail,
        Panic,
    }

    impl InstructionKind for RecorderInstruction {
        fn name(&self) -> &'static str {
            match self {
                RecorderInstruction::Push(_) => "_push",
                RecorderInstruction::Snapshot(_) => "_snapshot",
                RecorderInstruction::Stall(_) => "_stall",
                RecorderInstruction::Fail => "_fail",
                RecorderInstruction::Panic => "_panic",
            }
        }
    }

    impl Manager for Recorder {
        type Instruction = RecorderInstruction;
        const NAME: &'static str = "recorder";

        async fn handle(&mut self, instruction: RecorderInstruction) -> anyhow::Result<()> {
            match instruction {
                RecorderInstruction::Push(value) => {
                    tokio::time::sleep(Duration::from_millis(u64::from(10 - value % 10))).await;
                    self.values.push(value);
                }
                RecorderInstruction::Snapshot(reply) => {
                    respond(reply, self.values.clone(), Self::NAME, "_snapshot");
                }
                RecorderInstruction::Stall(reply) => self.stalled.push(reply),
                RecorderInstruction::Fail => anyhow::bail!("requested failure"),
                RecorderInstruction::Panic => panic!("requested panic"),
            }
            Ok(())
        }

        fn resolve(&self, instruction: &Instruction) -> Result<RecorderInstruction, DispatchError> {
            match instruction.name.as_str() {
                "_push" => {
                    instruction.expect_args(Self::NAME, 1)?;
                    Ok(RecorderInstruction::Push(instruction.arg(Self::NAME, 0)?))
                }
                _ => Err(instruction.unknown(Self::NAME)),
            }
        }
    }

    fn recorder() -> ManagerHandle<Recorder> {
        ManagerHandle::new(Recorder::default(), Duration::from_secs(5))
    }

    async fn snapshot(handle: &ManagerHandle<Recorder>) -> Vec<u32> {
        handle
            .request(RecorderInstruction::Snapshot)
            .await
            .expect("snapshot reply")
    }

    #[tokio::test(start_paused = true)]
    async fn test_instructions_execute_in_send_order() {
        let handle = recorder();
        handle.start().unwrap();

        // Later values sleep less, so any reordering would show up.
        for value in [1, 2, 3, 4, 5] {
            handle.send(RecorderInstruction::Push(value)).unwrap();
        }

        assert_eq!(snapshot(&handle).await, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_instructions_sent_before_start_are_queued() {
        let handle = recorder();
        handle.send(RecorderInstruction::Push(7)).unwrap();
        handle.start().unwrap();

        assert_eq!(snapshot(&handle).await, vec![7]);
    }

    #[tokio::test]
    async fn test_unknown_named_instruction_keeps_loop_alive() {
        let handle = recorder();
        handle.start().unwrap();

        handle
            .send_named(Instruction::new("_does_not_exist", vec![]))
            .unwrap();
        handle
            .send_named(Instruction::new("_push", vec![json!("not a number")]))
            .unwrap();
        handle
            .send_named(Instruction::new("_push", vec![json!(4)]))
            .unwrap();

        assert_eq!(snapshot(&handle).await, vec![4]);
        assert!(handle.is_running());
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_do_not_stop_the_loop() {
        let handle = recorder();
        handle.start().unwrap();

        handle.send(RecorderInstruction::Fail).unwrap();
        handle.send(RecorderInstruction::Panic).unwrap();
        handle.send(RecorderInstruction::Push(9)).unwrap();

        assert_eq!(snapshot(&handle).await, vec![9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drains_queued_instructions_then_exits() {
        let handle = recorder();
        handle.start().unwrap();

        let (reply, response) = oneshot::channel();
        handle.send(RecorderInstruction::Push(1)).unwrap();
        handle.send(RecorderInstruction::Push(2)).unwrap();
        handle.send(RecorderInstruction::Snapshot(reply)).unwrap();
        handle.stop().unwrap();

        handle.join().await.unwrap();
        // The snapshot was queued ahead of the stop, so it was still answered.
        assert_eq!(response.await.unwrap(), vec![1, 2]);
        assert!(!handle.is_running());

        let err = handle.send(RecorderInstruction::Push(3)).unwrap_err();
        assert_eq!(err, ManagerError::Disconnected { manager: "recorder" });
    }

    #[tokio::test]
    async fn test_instructions_after_stop_are_not_executed() {
        let handle = recorder();
        handle.start().unwrap();

        let (reply, response) = oneshot::channel();
        handle.stop().unwrap();
        handle.send(RecorderInstruction::Snapshot(reply)).unwrap();
        handle.join().await.unwrap();

        // Reply slot dropped together with the worker endpoint.
        assert!(response.await.is_err());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let handle = recorder();
        handle.start().unwrap();

        let err = handle.start().unwrap_err();
        assert_eq!(err, ManagerError::AlreadyStarted { manager: "recorder" });
    }

    #[tokio::test]
    async fn test_join_before_start_is_rejected() {
        let handle = recorder();
        let err = handle.join().await.unwrap_err();
        assert_eq!(err, ManagerError::NotStarted { manager: "recorder" });

        // Still startable afterwards.
        assert!(handle.start().is_ok());
    }

    #[test]
    fn test_start_outside_runtime_is_rejected() {
        let handle = recorder();
        let err = handle.start().unwrap_err();
        assert_eq!(err, ManagerError::NoRuntime { manager: "recorder" });
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_request_times_out_when_never_answered() {
        let handle = ManagerHandle::new(Recorder::default(), Duration::from_millis(250));
        handle.start().unwrap();

        let err = handle
            .request(RecorderInstruction::Stall)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ManagerError::ReplyTimeout {
                manager: "recorder",
                instruction: "_stall",
                timeout_ms: 250,
            }
        );
        assert_eq!(err.code(), 1006);
    }

    #[tokio::test]
    async fn test_cloned_clients_share_one_ordered_channel() {
        let handle = recorder();
        let client = handle.client();
        handle.start().unwrap();

        client.send(RecorderInstruction::Push(1)).unwrap();
        handle.send(RecorderInstruction::Push(2)).unwrap();
        client.send(RecorderInstruction::Push(3)).unwrap();

        assert_eq!(client.manager_name(), "recorder");
        assert_eq!(snapshot(&handle).await, vec![1, 2, 3]);
    }
}
