use crate::ipc::{Command, Event};
use crate::session::PlaybackSession;
use crate::transport::TransportPhase;
use keyline_ports::instrument::InstrumentFactory;
use keyline_ports::source::SourcePort;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverExit {
    /// Every command sender was dropped.
    CommandsClosed,
    /// Playback reached the end with `exit_on_finish` set.
    Finished,
    /// A load failed with `exit_on_finish` set.
    Failed,
}

/// Delivers frame callbacks to a session at a fixed interval and feeds it
/// commands in between. Frames only tick while the session has a pending
/// request.
#[derive(Clone, Copy, Debug)]
pub struct FrameDriver {
    interval: Duration,
    exit_on_finish: bool,
}

impl FrameDriver {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            exit_on_finish: false,
        }
    }

    pub fn exit_on_finish(mut self, exit: bool) -> Self {
        self.exit_on_finish = exit;
        self
    }

    pub async fn run<S, F>(
        &self,
        session: &mut PlaybackSession<S, F>,
        mut commands: mpsc::Receiver<Command>,
        events: Option<mpsc::UnboundedSender<Event>>,
    ) -> DriverExit
    where
        S: SourcePort,
        F: InstrumentFactory,
    {
        let origin = Instant::now();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let exit = loop {
            let frame_pending = session.pending_frame().is_some();
            tokio::select! {
                // Commands win over a due frame.
                biased;
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        debug!(?cmd, "command");
                        if let Err(err) = session.handle_command(cmd).await {
                            warn!("command failed: {err}");
                        }
                    }
                    None => break DriverExit::CommandsClosed,
                },
                _ = ticker.tick(), if frame_pending => {
                    if let Some(token) = session.pending_frame() {
                        let timestamp_ms = origin.elapsed().as_secs_f64() * 1000.0;
                        session.on_frame(token, timestamp_ms);
                    }
                }
            }

            forward(session, events.as_ref());

            if self.exit_on_finish {
                match session.phase() {
                    TransportPhase::Finished => break DriverExit::Finished,
                    TransportPhase::Error => break DriverExit::Failed,
                    _ => {}
                }
            }
        };

        forward(session, events.as_ref());
        exit
    }
}

impl Default for FrameDriver {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

fn forward<S, F>(session: &mut PlaybackSession<S, F>, events: Option<&mpsc::UnboundedSender<Event>>)
where
    S: SourcePort,
    F: InstrumentFactory,
{
    let drained = session.drain_events();
    let Some(tx) = events else {
        return;
    };
    for event in drained {
        // Receiver gone means nobody is listening any more.
        let _ = tx.send(event);
    }
}
