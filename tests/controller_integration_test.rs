//! Integration tests for the supervisor and its control surface
//!
//! These tests exercise the managers together rather than one at a time:
//! - Motion transitions driving playback through the registered observer
//! - Ordered shutdown leaving no callbacks behind
//! - The HTTP control surface served over a real socket until cancelled

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use symfopi::config::AppConfig;
use symfopi::error::ManagerError;
use symfopi::managers::PlaybackEvent;
use symfopi::Supervisor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Short, fixed phases: present 1000ms, absent 500ms.
fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.external_api.latency_ms = 20;
    config.playback.playlist_switch_latency_ms = 10;
    config.motion.present_min_ms = 1_000;
    config.motion.present_max_ms = 1_000;
    config.motion.absent_min_ms = 500;
    config.motion.absent_max_ms = 500;
    config
}

fn drain(events: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn test_motion_drives_playback() {
    let supervisor = Supervisor::new(&fast_config());
    let mut events = supervisor.subscribe_playback_events();
    supervisor.start().unwrap();

    supervisor.set_motion_control_enabled(true).unwrap();
    assert!(supervisor.motion_control_enabled().await.unwrap());

    tokio::time::sleep(Duration::from_millis(2_200)).await;
    // Flush anything the observer queued on the playback manager.
    let status = supervisor.playback().status().await.unwrap();

    assert!(status.is_playing);
    assert_eq!(
        drain(&mut events),
        vec![
            PlaybackEvent::Resumed,
            PlaybackEvent::Paused,
            PlaybackEvent::Resumed
        ]
    );

    supervisor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_playlist_switch_while_motion_controls_playback() {
    let supervisor = Supervisor::new(&fast_config());
    let mut events = supervisor.subscribe_playback_events();
    supervisor.start().unwrap();

    supervisor.set_motion_control_enabled(true).unwrap();
    assert!(supervisor.motion_control_enabled().await.unwrap());
    supervisor.set_current_playlist(0).unwrap();

    let current = supervisor.get_current_playlist().await.unwrap();
    assert_eq!(current.playlist_index, Some(0));
    assert_eq!(current.playlist_name.as_deref(), Some("playlist1"));

    // The motion observer and the playlist switch race; both must land.
    let seen = drain(&mut events);
    assert!(seen.contains(&PlaybackEvent::Resumed), "{seen:?}");
    assert!(seen.contains(&PlaybackEvent::PlaylistChanged { index: 0 }));
    assert!(supervisor.playback().status().await.unwrap().is_playing);

    supervisor.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_silences_motion_callbacks() {
    let supervisor = Supervisor::new(&fast_config());
    let mut events = supervisor.subscribe_playback_events();
    supervisor.start().unwrap();
    supervisor.set_motion_control_enabled(true).unwrap();
    assert!(supervisor.motion_control_enabled().await.unwrap());

    supervisor.stop().await.unwrap();
    drain(&mut events);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(drain(&mut events).is_empty());

    assert_eq!(
        supervisor.set_motion_control_enabled(true),
        Err(ManagerError::Disconnected { manager: "motion" })
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_rejected() {
    let supervisor = Supervisor::new(&fast_config());
    supervisor.start().unwrap();

    assert_eq!(
        supervisor.start(),
        Err(ManagerError::AlreadyStarted {
            manager: "playback"
        })
    );
    supervisor.stop().await.unwrap();
}

fn free_local_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe socket");
    listener.local_addr().expect("probe socket address")
}

/// Minimal HTTP/1.1 exchange; returns the status line and the body.
async fn http_call(addr: SocketAddr, method: &str, target: &str) -> (String, String) {
    let mut stream = None;
    for _ in 0..50 {
        match TcpStream::connect(addr).await {
            Ok(connected) => {
                stream = Some(connected);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    let mut stream = stream.expect("control surface accepts connections");

    let request = format!(
        "{method} {target} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();

    let status_line = raw.lines().next().unwrap_or_default().to_string();
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status_line, body)
}

#[tokio::test]
async fn test_control_surface_over_socket() {
    let mut config = fast_config();
    config.server.addr = free_local_addr();
    let addr = config.server.addr;

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(symfopi::run(config, shutdown.clone()));

    let (status, _) = http_call(addr, "PUT", "/set_current_playlist?index=1").await;
    assert!(status.contains("200"), "{status}");

    let (status, body) = http_call(addr, "GET", "/get_current_playlist").await;
    assert!(status.contains("200"), "{status}");
    assert!(body.contains("playlist2"), "{body}");

    let (status, body) = http_call(addr, "PUT", "/set_playback_enabled").await;
    assert!(status.contains("400"), "{status}");
    assert!(body.contains("flag"), "{body}");

    let (status, _) = http_call(addr, "GET", "/no_such_operation").await;
    assert!(status.contains("404"), "{status}");

    shutdown.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("server exits after cancellation")
        .expect("server task joins");
    assert!(outcome.is_ok(), "{outcome:?}");
}

#[tokio::test]
async fn test_supervisor_shared_across_tasks() {
    let supervisor = Arc::new(Supervisor::new(&fast_config()));
    supervisor.start().unwrap();

    let mut tasks = Vec::new();
    for index in 0..3 {
        let supervisor = Arc::clone(&supervisor);
        tasks.push(tokio::spawn(async move {
            supervisor.set_current_playlist(index).unwrap();
            supervisor.get_playlists().await.unwrap()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().len(), 3);
    }

    let status = supervisor.playback().status().await.unwrap();
    assert!(status.current_playlist_index.is_some());
    supervisor.stop().await.unwrap();
}
