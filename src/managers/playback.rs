// PlaybackManager: mocked audio playback control
//
// Single Responsibility: play/pause state and the current playlist
// No sound is produced; state transitions are logged and published as
// PlaybackEvents so callers can observe them.

use std::time::Duration;

use log::info;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::PlaybackConfig;
use crate::error::{DispatchError, ManagerError};

use super::channel::{respond, Instruction, InstructionKind, Reply};
use super::manager::{Manager, ManagerClient, ManagerHandle};

/// Controller-side handle of the playback manager.
pub type PlaybackManager = ManagerHandle<Playback>;

/// Snapshot of the playback state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub current_playlist_index: Option<usize>,
}

/// State transitions published by the playback manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackEvent {
    Paused,
    Resumed,
    PlaylistChanged { index: usize },
}

/// Instructions understood by the playback manager.
#[derive(Debug)]
pub enum PlaybackInstruction {
    PausePlayback,
    ResumePlayback,
    SetCurrentPlaylist { index: usize },
    Status { reply: Reply<PlaybackStatus> },
}

impl InstructionKind for PlaybackInstruction {
    fn name(&self) -> &'static str {
        match self {
            PlaybackInstruction::PausePlayback => "_pause_playback",
            PlaybackInstruction::ResumePlayback => "_resume_playback",
            PlaybackInstruction::SetCurrentPlaylist { .. } => "_set_current_playlist",
            PlaybackInstruction::Status { .. } => "_status",
        }
    }
}

/// Worker-side playback state.
///
/// `current_playlist_index` stays `None` until a playlist has been set.
pub struct Playback {
    is_playing: bool,
    current_playlist_index: Option<usize>,
    switch_latency: Duration,
    events: broadcast::Sender<PlaybackEvent>,
}

impl Playback {
    pub fn new(config: &PlaybackConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            is_playing: false,
            current_playlist_index: None,
            switch_latency: config.playlist_switch_latency(),
            events,
        }
    }

    /// Sender side of the event channel; call before the manager is started.
    pub fn events(&self) -> broadcast::Sender<PlaybackEvent> {
        self.events.clone()
    }

    fn pause(&mut self) {
        if !self.is_playing {
            info!("[Playback] Already paused; nothing to do");
            return;
        }
        info!("[Playback] Pausing playback");
        self.is_playing = false;
        self.publish(PlaybackEvent::Paused);
    }

    fn resume(&mut self) {
        if self.is_playing {
            info!("[Playback] Already playing; nothing to do");
            return;
        }
        info!(
            "[Playback] Starting playback of playlist {:?}",
            self.current_playlist_index
        );
        self.is_playing = true;
        self.publish(PlaybackEvent::Resumed);
    }

    /// Switch playlists, restarting playback if it was active.
    ///
    /// The pause/resume pair runs inside this single handler invocation.
    async fn set_current_playlist(&mut self, index: usize) {
        info!(
            "[Playback] Switching to playlist {} ({}ms load)",
            index,
            self.switch_latency.as_millis()
        );
        tokio::time::sleep(self.switch_latency).await;
        self.current_playlist_index = Some(index);
        self.publish(PlaybackEvent::PlaylistChanged { index });

        if self.is_playing {
            self.pause();
            self.resume();
        }
    }

    fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            is_playing: self.is_playing,
            current_playlist_index: self.current_playlist_index,
        }
    }

    fn publish(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Manager for Playback {
    type Instruction = PlaybackInstruction;
    const NAME: &'static str = "playback";

    async fn handle(&mut self, instruction: PlaybackInstruction) -> anyhow::Result<()> {
        match instruction {
            PlaybackInstruction::PausePlayback => self.pause(),
            PlaybackInstruction::ResumePlayback => self.resume(),
            PlaybackInstruction::SetCurrentPlaylist { index } => {
                self.set_current_playlist(index).await
            }
            PlaybackInstruction::Status { reply } => {
                respond(reply, self.status(), Self::NAME, "_status")
            }
        }
        Ok(())
    }

    fn resolve(&self, instruction: &Instruction) -> Result<PlaybackInstruction, DispatchError> {
        match instruction.name.as_str() {
            "_pause_playback" => {
                instruction.expect_args(Self::NAME, 0)?;
                Ok(PlaybackInstruction::PausePlayback)
            }
            "_resume_playback" => {
                instruction.expect_args(Self::NAME, 0)?;
                Ok(PlaybackInstruction::ResumePlayback)
            }
            "_set_current_playlist" => {
                instruction.expect_args(Self::NAME, 1)?;
                let index = instruction.arg(Self::NAME, 0)?;
                Ok(PlaybackInstruction::SetCurrentPlaylist { index })
            }
            _ => Err(instruction.unknown(Self::NAME)),
        }
    }
}

impl ManagerClient<Playback> {
    /// Pause music playback. No change if playback was already paused.
    ///
    /// Nonblocking: returns once the instruction is queued.
    pub fn pause_playback(&self) -> Result<(), ManagerError> {
        self.send(PlaybackInstruction::PausePlayback)
    }

    /// Start or resume playback. No change if already playing.
    ///
    /// Nonblocking: returns once the instruction is queued.
    pub fn resume_playback(&self) -> Result<(), ManagerError> {
        self.send(PlaybackInstruction::ResumePlayback)
    }

    /// Change the current playlist, restarting playback if it is active.
    ///
    /// Nonblocking: returns once the instruction is queued.
    pub fn set_current_playlist(&self, index: usize) -> Result<(), ManagerError> {
        self.send(PlaybackInstruction::SetCurrentPlaylist { index })
    }

    /// Current playback state.
    ///
    /// Blocking: waits for every previously queued instruction to finish.
    pub async fn status(&self) -> Result<PlaybackStatus, ManagerError> {
        self.request(|reply| PlaybackInstruction::Status { reply })
            .await
    }
}
