use anyhow::Result;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::stream::{DisplaySink, StreamEvent, StreamProgress, StreamReport, StreamStatus};

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Progress display for a stream. A bar when the length is known, a
    /// spinner with the live rate otherwise.
    pub fn stream(&self, total: Option<u64>) -> StreamBar {
        if !self.use_pretty() {
            return StreamBar {
                bar: None,
                last_plain_at: None,
            };
        }
        let (bar, template) = match total {
            Some(total) => (
                ProgressBar::new(total),
                "{bar:40.cyan/blue} frame {pos}/{len} {msg}",
            ),
            None => (ProgressBar::new_spinner(), "{spinner} frame {pos} {msg}"),
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        StreamBar {
            bar: Some(bar),
            last_plain_at: None,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Terminal progress for a running stream. Recording changes and sink
/// failures are printed above the bar.
pub struct StreamBar {
    bar: Option<ProgressBar>,
    last_plain_at: Option<Instant>,
}

impl StreamBar {
    fn notify(&self, message: &str) {
        match &self.bar {
            Some(bar) => bar.println(message),
            None => eprintln!("{message}"),
        }
    }
}

impl DisplaySink for StreamBar {
    fn show(&mut self, _frame: &Frame, progress: &StreamProgress) -> Result<()> {
        match &self.bar {
            Some(bar) => {
                bar.set_position(progress.current);
                if let Some(fps) = progress.fps {
                    bar.set_message(format!("FPS: {:.1}", fps));
                }
            }
            None => {
                // Plain output: about one line per second.
                let due = self
                    .last_plain_at
                    .map_or(true, |at| at.elapsed() >= Duration::from_secs(1));
                if due {
                    eprintln!("{}", progress);
                    self.last_plain_at = Some(Instant::now());
                }
            }
        }
        Ok(())
    }

    fn event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::RecordingStarted { destination } => {
                self.notify(&format!("● Recording started: {}", destination))
            }
            StreamEvent::RecordingStopped(summary) => self.notify(&format!(
                "■ Recording saved: {} ({} frames)",
                summary.destination, summary.frames_written
            )),
            StreamEvent::SinkWriteFailed { frame, error } => {
                self.notify(&format!("! frame {}: {}", frame, error))
            }
            // Logged by the driver; too frequent to print.
            StreamEvent::FrameSkipped { .. } => {}
        }
    }

    fn finish(&mut self, report: &StreamReport) {
        let message = match &report.status {
            StreamStatus::Completed => format!("done, {} frames", report.frames_processed),
            StreamStatus::Cancelled => format!("stopped, {} frames", report.frames_processed),
            StreamStatus::Failed(err) => format!("failed: {}", err),
        };
        match &self.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{} | {}", report.progress, message),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn plain_stream_bar_accepts_frames() {
        let ui = Ui::new(UiMode::Plain, false, false);
        let mut bar = ui.stream(Some(2));
        let mut progress = StreamProgress::new(Some(2));
        progress.record_frame();
        assert!(bar.show(&Frame::filled(2, 2, [0, 0, 0]), &progress).is_ok());
    }
}
