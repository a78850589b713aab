// MotionManager: mocked motion sensor monitoring
//
// Single Responsibility: lifecycle of the sensor monitor task
// The monitor alternates between "motion present" and "motion absent"
// phases of random length and notifies registered observers at the start
// of each phase. At most one monitor task is alive at any time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MotionConfig;
use crate::error::{DispatchError, ManagerError};

use super::channel::{respond, Instruction, InstructionKind, Reply};
use super::manager::{Manager, ManagerClient, ManagerHandle};

/// Controller-side handle of the motion manager.
pub type MotionManager = ManagerHandle<MotionMonitor>;

/// Receives motion sensor transitions.
///
/// Called from the monitor task; implementations must not block.
pub trait MotionObserver: Send + Sync {
    fn motion_started(&self);
    fn motion_stopped(&self);
}

/// Instructions understood by the motion manager.
#[derive(Debug)]
pub enum MotionInstruction {
    EnableMotionMonitor,
    DisableMotionMonitor,
    IsEnabled { reply: Reply<bool> },
}

impl InstructionKind for MotionInstruction {
    fn name(&self) -> &'static str {
        match self {
            MotionInstruction::EnableMotionMonitor => "_enable_motion_monitor",
            MotionInstruction::DisableMotionMonitor => "_disable_motion_monitor",
            MotionInstruction::IsEnabled { .. } => "_is_enabled",
        }
    }
}

/// A running sensor task and the token that stops it.
struct MonitorTask {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Worker-side motion monitoring state.
pub struct MotionMonitor {
    config: MotionConfig,
    observers: Vec<Arc<dyn MotionObserver>>,
    monitor: Option<MonitorTask>,
}

impl MotionMonitor {
    pub fn new(config: &MotionConfig) -> Self {
        Self {
            config: config.clone(),
            observers: Vec::new(),
            monitor: None,
        }
    }

    /// Register an observer; only possible before the manager is started.
    pub fn register_observer(&mut self, observer: Arc<dyn MotionObserver>) {
        self.observers.push(observer);
    }

    /// Start monitoring, restarting the monitor if it is already running.
    async fn enable(&mut self) -> anyhow::Result<()> {
        if self.monitor.is_some() {
            info!("[Motion] Monitor already running; restarting it");
            // A crashed monitor must not block the restart.
            if let Err(err) = self.disable().await {
                error!("[Motion] Previous monitor ended abnormally: {:#}", err);
            }
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sensor(
            self.config.clone(),
            self.observers.clone(),
            cancel.clone(),
        ));
        self.monitor = Some(MonitorTask { cancel, task });
        info!("[Motion] Monitor enabled");
        Ok(())
    }

    /// Stop monitoring and wait until the monitor task has exited.
    async fn disable(&mut self) -> anyhow::Result<()> {
        let Some(MonitorTask { cancel, task }) = self.monitor.take() else {
            debug!("[Motion] Monitor not running; nothing to disable");
            return Ok(());
        };

        cancel.cancel();
        task.await
            .context("motion monitor task terminated abnormally")?;
        info!("[Motion] Monitor disabled");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.monitor
            .as_ref()
            .is_some_and(|monitor| !monitor.task.is_finished())
    }
}

impl Manager for MotionMonitor {
    type Instruction = MotionInstruction;
    const NAME: &'static str = "motion";

    async fn handle(&mut self, instruction: MotionInstruction) -> anyhow::Result<()> {
        match instruction {
            MotionInstruction::EnableMotionMonitor => self.enable().await,
            MotionInstruction::DisableMotionMonitor => self.disable().await,
            MotionInstruction::IsEnabled { reply } => {
                respond(reply, self.is_enabled(), Self::NAME, "_is_enabled");
                Ok(())
            }
        }
    }

    fn resolve(&self, instruction: &Instruction) -> Result<MotionInstruction, DispatchError> {
        let resolved = match instruction.name.as_str() {
            "_enable_motion_monitor" => MotionInstruction::EnableMotionMonitor,
            "_disable_motion_monitor" => MotionInstruction::DisableMotionMonitor,
            _ => return Err(instruction.unknown(Self::NAME)),
        };
        instruction.expect_args(Self::NAME, 0)?;
        Ok(resolved)
    }

    async fn shutdown(&mut self) {
        if let Err(err) = self.disable().await {
            error!("[Motion] Failed to stop monitor during shutdown: {:#}", err);
        }
    }
}

/// Mock sensor loop. Exits as soon as `cancel` fires, dropping any pending
/// phase timer.
async fn run_sensor(
    config: MotionConfig,
    observers: Vec<Arc<dyn MotionObserver>>,
    cancel: CancellationToken,
) {
    let mut rng = StdRng::from_entropy();

    while !cancel.is_cancelled() {
        let present = phase_duration(&mut rng, config.present_min_ms, config.present_max_ms);
        debug!("[Motion] Motion present for {}ms", present.as_millis());
        for observer in &observers {
            observer.motion_started();
        }
        if !wait_phase(present, &cancel).await {
            break;
        }

        let absent = phase_duration(&mut rng, config.absent_min_ms, config.absent_max_ms);
        debug!("[Motion] Motion absent for {}ms", absent.as_millis());
        for observer in &observers {
            observer.motion_stopped();
        }
        if !wait_phase(absent, &cancel).await {
            break;
        }
    }

    debug!("[Motion] Sensor loop exited");
}

fn phase_duration(rng: &mut StdRng, min_ms: u64, max_ms: u64) -> Duration {
    let (low, high) = if min_ms <= max_ms {
        (min_ms, max_ms)
    } else {
        (max_ms, min_ms)
    };
    Duration::from_millis(rng.gen_range(low..=high))
}

/// Sleep for one phase; `false` if cancelled first.
async fn wait_phase(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

impl ManagerClient<MotionMonitor> {
    /// Enable motion monitoring. Restarts the monitor if already enabled.
    ///
    /// Nonblocking: returns once the instruction is queued.
    pub fn enable_motion_monitor(&self) -> Result<(), ManagerError> {
        self.send(MotionInstruction::EnableMotionMonitor)
    }

    /// Disable motion monitoring. No effect if already disabled.
    ///
    /// Nonblocking for the caller; the manager itself waits for the monitor
    /// task to exit before handling its next instruction.
    pub fn disable_motion_monitor(&self) -> Result<(), ManagerError> {
        self.send(MotionInstruction::DisableMotionMonitor)
    }

    /// Whether a monitor task is currently alive.
    ///
    /// Blocking: waits for the reply from the manager.
    pub async fn is_enabled(&self) -> Result<bool, ManagerError> {
        self.request(|reply| MotionInstruction::IsEnabled { reply })
            .await
    }
}
