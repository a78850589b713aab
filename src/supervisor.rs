//! Supervisor: owns one instance of each manager and wires them together.
//!
//! The supervisor is the only component the control surface talks to. It
//! forwards every call into a manager wrapper operation, and connects the
//! motion manager's observers to the playback manager.

use std::sync::Arc;

use anyhow::Context;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::{log_manager_error, ManagerError};
use crate::http;
use crate::managers::{
    ExternalApi, ExternalApiManager, Manager, ManagerClient, ManagerHandle, MotionManager,
    MotionMonitor, MotionObserver, Playback, PlaybackEvent, PlaybackManager,
};

/// Payload of `GET /get_current_playlist`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentPlaylist {
    pub playlist_name: Option<String>,
    pub playlist_index: Option<usize>,
}

/// Resumes playback when motion starts and pauses it when motion stops.
struct PlaybackFollowsMotion {
    playback: ManagerClient<Playback>,
}

impl MotionObserver for PlaybackFollowsMotion {
    fn motion_started(&self) {
        info!("[Supervisor] Motion started");
        if let Err(err) = self.playback.resume_playback() {
            log_manager_error(&err, "motion_started");
        }
    }

    fn motion_stopped(&self) {
        info!("[Supervisor] Motion stopped");
        if let Err(err) = self.playback.pause_playback() {
            log_manager_error(&err, "motion_stopped");
        }
    }
}

/// Owner of the playback, external API and motion managers.
pub struct Supervisor {
    playback: PlaybackManager,
    external_api: ExternalApiManager,
    motion: MotionManager,
    playback_events: broadcast::Sender<PlaybackEvent>,
    enable_motion_on_start: bool,
}

impl Supervisor {
    /// Construct the three managers and register the cross-manager
    /// observers. Nothing runs until [`Supervisor::start`].
    pub fn new(config: &AppConfig) -> Self {
        let reply_timeout = config.manager.reply_timeout();

        let playback = Playback::new(&config.playback);
        let playback_events = playback.events();
        let playback = ManagerHandle::new(playback, reply_timeout);

        let external_api =
            ManagerHandle::new(ExternalApi::new(&config.external_api), reply_timeout);

        let mut motion = MotionMonitor::new(&config.motion);
        motion.register_observer(Arc::new(PlaybackFollowsMotion {
            playback: playback.client(),
        }));
        let motion = ManagerHandle::new(motion, reply_timeout);

        Self {
            playback,
            external_api,
            motion,
            playback_events,
            enable_motion_on_start: config.motion.enable_on_start,
        }
    }

    /// Launch every manager's dispatch loop.
    pub fn start(&self) -> Result<(), ManagerError> {
        self.playback.start()?;
        self.external_api.start()?;
        self.motion.start()?;

        if self.enable_motion_on_start {
            self.motion.enable_motion_monitor()?;
        }
        info!("[Supervisor] All managers started");
        Ok(())
    }

    /// Stop each manager and wait for it to exit before stopping the next.
    ///
    /// Order is motion, playback, external API. Motion has fully exited
    /// before playback is told to stop, so no motion callback can reach a
    /// playback manager that is already gone. Every manager is attempted
    /// even if an earlier one fails; the first error is returned.
    pub async fn stop(&self) -> Result<(), ManagerError> {
        info!("[Supervisor] Stopping managers");
        let results = [
            stop_and_join(&self.motion).await,
            stop_and_join(&self.playback).await,
            stop_and_join(&self.external_api).await,
        ];

        match results.into_iter().find_map(Result::err) {
            Some(err) => Err(err),
            None => {
                info!("[Supervisor] All managers stopped");
                Ok(())
            }
        }
    }

    // ========================================================================
    // CONTROLLER OPERATIONS
    // ========================================================================

    /// Current playlist index and, when set, its name from the music service.
    pub async fn get_current_playlist(&self) -> Result<CurrentPlaylist, ManagerError> {
        let status = self.playback.status().await?;
        let Some(index) = status.current_playlist_index else {
            return Ok(CurrentPlaylist {
                playlist_name: None,
                playlist_index: None,
            });
        };

        let playlists = self.external_api.get_playlists_list().await?;
        Ok(CurrentPlaylist {
            playlist_name: playlists.get(index).cloned(),
            playlist_index: Some(index),
        })
    }

    pub fn set_playback_enabled(&self, enabled: bool) -> Result<(), ManagerError> {
        if enabled {
            self.playback.resume_playback()
        } else {
            self.playback.pause_playback()
        }
    }

    pub fn resume_playback(&self) -> Result<(), ManagerError> {
        self.playback.resume_playback()
    }

    pub fn pause_playback(&self) -> Result<(), ManagerError> {
        self.playback.pause_playback()
    }

    pub fn set_current_playlist(&self, index: usize) -> Result<(), ManagerError> {
        self.playback.set_current_playlist(index)
    }

    /// Accepted but not acted on: the mocked player has no track queue.
    pub fn next_track(&self) -> Result<(), ManagerError> {
        info!("[Supervisor] next_track requested; track skipping is not supported");
        Ok(())
    }

    pub fn set_motion_control_enabled(&self, enabled: bool) -> Result<(), ManagerError> {
        if enabled {
            self.motion.enable_motion_monitor()
        } else {
            self.motion.disable_motion_monitor()
        }
    }

    pub async fn motion_control_enabled(&self) -> Result<bool, ManagerError> {
        self.motion.is_enabled().await
    }

    pub async fn get_playlists(&self) -> Result<Vec<String>, ManagerError> {
        self.external_api.get_playlists_list().await
    }

    /// Subscribe to playback state transitions.
    pub fn subscribe_playback_events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.playback_events.subscribe()
    }

    pub fn playback(&self) -> &PlaybackManager {
        &self.playback
    }

    pub fn external_api(&self) -> &ExternalApiManager {
        &self.external_api
    }

    pub fn motion(&self) -> &MotionManager {
        &self.motion
    }
}

async fn stop_and_join<M: Manager>(manager: &ManagerHandle<M>) -> Result<(), ManagerError> {
    let stopped = manager
        .stop()
        .inspect_err(|err| warn!("[Supervisor] {}", err));
    let joined = manager
        .join()
        .await
        .inspect_err(|err| log_manager_error(err, "stop"));
    stopped.and(joined)
}

/// Start the managers, serve the control surface until `shutdown` fires,
/// then stop the managers.
pub async fn run(config: AppConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let supervisor = Arc::new(Supervisor::new(&config));
    supervisor.start().context("starting managers")?;

    let served = http::run_http_server(Arc::clone(&supervisor), config.server.addr, shutdown).await;
    if let Err(err) = &served {
        warn!("[Supervisor] Control surface stopped with error: {:#}", err);
    }

    info!("[Supervisor] Safely stopping");
    supervisor.stop().await.context("stopping managers")?;
    served
}
