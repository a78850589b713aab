// ExternalApiManager: mocked remote music-service client
//
// Single Responsibility: requests against the music service
// Stateless between calls; every request sleeps for the configured
// round-trip latency and answers with the configured playlist list.

use std::time::Duration;

use log::info;

use crate::config::ExternalApiConfig;
use crate::error::ManagerError;

use super::channel::{respond, InstructionKind, Reply};
use super::manager::{Manager, ManagerClient, ManagerHandle};

/// Controller-side handle of the external API manager.
pub type ExternalApiManager = ManagerHandle<ExternalApi>;

/// Instructions understood by the external API manager.
#[derive(Debug)]
pub enum ExternalApiInstruction {
    GetPlaylistsList { reply: Reply<Vec<String>> },
}

impl InstructionKind for ExternalApiInstruction {
    fn name(&self) -> &'static str {
        match self {
            ExternalApiInstruction::GetPlaylistsList { .. } => "_get_playlists_list",
        }
    }
}

/// Worker-side API client.
pub struct ExternalApi {
    latency: Duration,
    playlists: Vec<String>,
}

impl ExternalApi {
    pub fn new(config: &ExternalApiConfig) -> Self {
        Self {
            latency: config.latency(),
            playlists: config.playlists.clone(),
        }
    }
}

impl Manager for ExternalApi {
    type Instruction = ExternalApiInstruction;
    const NAME: &'static str = "external_api";

    async fn handle(&mut self, instruction: ExternalApiInstruction) -> anyhow::Result<()> {
        match instruction {
            ExternalApiInstruction::GetPlaylistsList { reply } => {
                info!(
                    "[ExternalApi] Fetching playlists ({}ms round trip)",
                    self.latency.as_millis()
                );
                tokio::time::sleep(self.latency).await;
                respond(
                    reply,
                    self.playlists.clone(),
                    Self::NAME,
                    "_get_playlists_list",
                );
            }
        }
        Ok(())
    }
}

impl ManagerClient<ExternalApi> {
    /// The user's playlists, in service order.
    ///
    /// Blocking: waits until the manager has completed the request.
    pub async fn get_playlists_list(&self) -> Result<Vec<String>, ManagerError> {
        self.request(|reply| ExternalApiInstruction::GetPlaylistsList { reply })
            .await
    }
}
