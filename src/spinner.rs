//! Progress line shown on stderr while the CLI blocks on a task.

use std::io::Write;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const TICK: Duration = Duration::from_millis(120);

/// Clears the current terminal line and returns the cursor to column 0.
const CLEAR_LINE: &str = "\x1b[2K\r";

/// One rendered frame, e.g. `⠙ waiting for task t1 (3s)`.
fn frame_line(tick: usize, message: &str, elapsed: Duration) -> String {
    let frame = FRAMES[tick % FRAMES.len()];
    format!("{CLEAR_LINE}{frame} {message} ({}s)", elapsed.as_secs())
}

/// Animated progress line with an elapsed-seconds counter. Writes to stderr
/// so stdout stays clean for the task result.
pub struct Spinner {
    handle: JoinHandle<()>,
    done: oneshot::Sender<()>,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let (done, mut stopped) = oneshot::channel();
        let message = message.to_string();

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticks = tokio::time::interval(TICK);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut stderr = std::io::stderr();

            for tick in 0.. {
                tokio::select! {
                    _ = ticks.tick() => {
                        let _ = write!(stderr, "{}", frame_line(tick, &message, started.elapsed()));
                        let _ = stderr.flush();
                    }
                    _ = &mut stopped => break,
                }
            }
            let _ = write!(stderr, "{CLEAR_LINE}");
            let _ = stderr.flush();
        });

        Self { handle, done }
    }

    /// Stop animating and erase the line.
    pub async fn stop(self) {
        let _ = self.done.send(());
        let _ = self.handle.await;
    }
}
