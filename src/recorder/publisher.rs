//! Session publisher
//!
//! Owns the recording session behind a narrow read/command surface:
//! commands and asynchronous notifications (screen-share termination,
//! duration ticks) are consumed by one driver task in arrival order, and
//! consumers read immutable snapshots instead of mutating shared state.

use crate::artifact::Artifact;
use crate::compositor::CompositorConfig;
use crate::error::SourceKind;
use crate::recorder::session::RecordingSession;
use crate::recorder::state::{RecordingEvent, RecordingStatus, SessionConfig, SessionSnapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Commands accepted by the driver task
#[derive(Debug)]
pub enum SessionCommand {
    ConnectScreen,
    ConnectCamera,
    ConnectMicrophone,
    Disconnect(SourceKind),
    SetConfig(SessionConfig),
    SetCompositorConfig(CompositorConfig),
    Start,
    Pause,
    Resume,
    Stop,
    Dismiss,
}

/// Interval between published duration updates
const SNAPSHOT_TICK: Duration = Duration::from_millis(250);

/// Handle over a running session driver
pub struct SessionPublisher {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<RecordingEvent>,
    artifact: Arc<Mutex<Option<Arc<Artifact>>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SessionPublisher {
    /// Spawn the driver task that owns `session`
    pub fn spawn(mut session: RecordingSession) -> Self {
        let (commands, mut command_rx) = mpsc::channel::<SessionCommand>(32);
        let (snapshot_tx, snapshots) = watch::channel(session.snapshot());
        let events = session.event_sender();
        let artifact: Arc<Mutex<Option<Arc<Artifact>>>> = Arc::new(Mutex::new(None));

        let driver = {
            let events = events.clone();
            let artifact = Arc::clone(&artifact);
            tokio::spawn(async move {
                let mut screen_ended: Option<watch::Receiver<bool>> = None;
                let mut ticker = tokio::time::interval(SNAPSHOT_TICK);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        command = command_rx.recv() => match command {
                            Some(command) => {
                                let was_start = matches!(command, SessionCommand::Start);
                                apply(&mut session, command, &events).await;
                                if was_start && session.status() == RecordingStatus::Recording {
                                    screen_ended = session.screen_ended_watch();
                                }
                            }
                            None => break,
                        },
                        ended = ended_signal(&mut screen_ended) => {
                            screen_ended = None;
                            if ended
                                && matches!(
                                    session.status(),
                                    RecordingStatus::Recording | RecordingStatus::Paused
                                )
                            {
                                tracing::info!(
                                    "Screen share terminated by platform, auto-stopping"
                                );
                                let _ = session.stop().await;
                            }
                        },
                        _ = ticker.tick() => {
                            if session.status() == RecordingStatus::Recording {
                                let _ = events
                                    .send(RecordingEvent::Progress(session.duration_ms()));
                            }
                        }
                    }
                    *artifact.lock() = session.artifact();
                    let _ = snapshot_tx.send(session.snapshot());
                }

                session.teardown();
                let _ = snapshot_tx.send(session.snapshot());
            })
        };

        Self {
            commands,
            snapshots,
            events,
            artifact,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Current session snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch snapshot changes
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.events.subscribe()
    }

    /// Body of the completed artifact, when one exists
    pub fn artifact(&self) -> Option<Arc<Artifact>> {
        self.artifact.lock().clone()
    }

    /// Enqueue a command. Returns false once the driver has shut down.
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub async fn connect_screen(&self) -> bool {
        self.send(SessionCommand::ConnectScreen).await
    }

    pub async fn connect_camera(&self) -> bool {
        self.send(SessionCommand::ConnectCamera).await
    }

    pub async fn connect_microphone(&self) -> bool {
        self.send(SessionCommand::ConnectMicrophone).await
    }

    pub async fn start(&self) -> bool {
        self.send(SessionCommand::Start).await
    }

    pub async fn pause(&self) -> bool {
        self.send(SessionCommand::Pause).await
    }

    pub async fn resume(&self) -> bool {
        self.send(SessionCommand::Resume).await
    }

    pub async fn stop(&self) -> bool {
        self.send(SessionCommand::Stop).await
    }

    pub async fn dismiss(&self) -> bool {
        self.send(SessionCommand::Dismiss).await
    }

    /// Shut the driver down, tearing the session down with it
    pub async fn close(self) {
        drop(self.commands);
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            let _ = driver.await;
        }
    }
}

async fn apply(
    session: &mut RecordingSession,
    command: SessionCommand,
    events: &broadcast::Sender<RecordingEvent>,
) {
    let result = match command {
        SessionCommand::ConnectScreen => session.connect_screen().await,
        SessionCommand::ConnectCamera => session.connect_camera().await,
        SessionCommand::ConnectMicrophone => session.connect_microphone().await,
        SessionCommand::Disconnect(kind) => {
            session.disconnect_source(kind);
            Ok(())
        }
        SessionCommand::SetConfig(config) => {
            session.set_config(config);
            Ok(())
        }
        SessionCommand::SetCompositorConfig(config) => {
            session.set_compositor_config(config);
            Ok(())
        }
        SessionCommand::Start => session.start().await,
        SessionCommand::Pause => session.pause().await,
        SessionCommand::Resume => session.resume().await,
        SessionCommand::Stop => session.stop().await,
        SessionCommand::Dismiss => {
            session.dismiss();
            Ok(())
        }
    };

    // The session records fatal errors in its own state; command-level
    // failures only need an event so toolbars can react.
    if let Err(e) = result {
        let _ = events.send(RecordingEvent::Error(e.to_string()));
    }
}

/// Resolve once the screen track ends (true) or its channel closes
/// without ending (false). Pends forever while no watch is armed.
async fn ended_signal(watch: &mut Option<watch::Receiver<bool>>) -> bool {
    match watch {
        Some(rx) => loop {
            if *rx.borrow() {
                return true;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        },
        None => std::future::pending().await,
    }
}
