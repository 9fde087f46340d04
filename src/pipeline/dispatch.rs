//! Tool dispatch
//!
//! Maps a [`RoutineKind`] to its routine, and runs the cosmetic progress
//! simulation that precedes the notice for deferred tools.

use crate::catalog::{DeferredKind, RoutineKind};
use crate::error::Result;
use crate::intake::InputFile;
use crate::notify::{Popup, Severity};
use crate::pdf::{ArchiveWriter, PageComposer, PageEditor, PageRasterizer};
use crate::pipeline::routines::{Payload, Toolkit};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Publishes the current loading message. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct Progress {
    tx: Arc<watch::Sender<String>>,
}

impl Progress {
    pub fn channel(initial: impl Into<String>) -> (Self, watch::Receiver<String>) {
        let (tx, rx) = watch::channel(initial.into());
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// A progress sink nobody listens to
    pub fn detached() -> Self {
        Self::channel(String::new()).0
    }

    pub fn report(&self, message: impl Into<String>) {
        self.tx.send_replace(message.into());
    }
}

/// Runs a routine by kind. Implemented by [`Toolkit`]; tests substitute fakes.
pub trait Routines: Send + Sync + 'static {
    fn run(&self, kind: RoutineKind, files: &[InputFile], progress: &Progress) -> Result<Payload>;
}

impl<E, C, R, A> Routines for Toolkit<E, C, R, A>
where
    E: PageEditor + 'static,
    C: PageComposer + 'static,
    R: PageRasterizer + 'static,
    A: ArchiveWriter + 'static,
{
    fn run(&self, kind: RoutineKind, files: &[InputFile], progress: &Progress) -> Result<Payload> {
        match kind {
            RoutineKind::Merge => self.merge(files, progress),
            RoutineKind::Split => self.split(files, progress),
            RoutineKind::ImagesToPdf => self.images_to_pdf(files, progress),
            RoutineKind::PdfToImages => self.pdf_to_images(files, progress),
            RoutineKind::Rotate => self.rotate(files, progress),
            RoutineKind::Watermark => self.watermark(files, progress),
            RoutineKind::Compress => self.compress(files, progress),
        }
    }
}

/// Message shown while a routine starts
pub fn loading_message(kind: RoutineKind) -> &'static str {
    match kind {
        RoutineKind::Merge => "Merging files...",
        RoutineKind::Split => "Splitting PDF...",
        RoutineKind::ImagesToPdf => "Converting images...",
        RoutineKind::PdfToImages => "Extracting images...",
        RoutineKind::Rotate => "Rotating pages...",
        RoutineKind::Watermark => "Applying watermark...",
        RoutineKind::Compress => "Compressing file...",
    }
}

/// Fake analysis progress: `step` percent every `tick` until 100%
pub async fn simulate_analysis(progress: &Progress, tick: Duration, step: u32) {
    let step = step.clamp(1, 100);
    let mut percent = 0;
    while percent < 100 {
        tokio::time::sleep(tick).await;
        percent = (percent + step).min(100);
        progress.report(format!("Analyzing document... {}%", percent));
    }
}

/// Informational notice for a tool that cannot run here
pub fn deferred_popup(kind: DeferredKind) -> Popup {
    let message = match kind {
        DeferredKind::Interactive => {
            "This feature requires our interactive document editor which is currently being updated."
        }
        DeferredKind::Conversion => {
            "High-fidelity document conversion requires server-side processing which is disabled in this deployment."
        }
    };
    Popup {
        title: "Advanced Feature".to_string(),
        message: message.to_string(),
        severity: Severity::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{find_tool, Operation, ToolKind};

    #[tokio::test(start_paused = true)]
    async fn test_simulation_reaches_100_in_ten_ticks() {
        let (progress, rx) = Progress::channel("Initializing...");
        let started = tokio::time::Instant::now();
        simulate_analysis(&progress, Duration::from_millis(200), 10).await;
        assert_eq!(*rx.borrow(), "Analyzing document... 100%");
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2000));
        assert!(elapsed < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_clamps_overshoot() {
        let (progress, rx) = Progress::channel("");
        simulate_analysis(&progress, Duration::from_millis(1), 30).await;
        assert_eq!(*rx.borrow(), "Analyzing document... 100%");
    }

    #[test]
    fn test_deferred_popups() {
        let sign = find_tool("sign-pdf").unwrap();
        assert_eq!(
            sign.kind.operation(),
            Operation::Deferred(DeferredKind::Interactive)
        );
        let popup = deferred_popup(DeferredKind::Interactive);
        assert_eq!(popup.title, "Advanced Feature");
        assert_eq!(popup.severity, Severity::Info);
        assert!(popup.message.contains("interactive document editor"));

        let word = find_tool("pdf-to-word").unwrap();
        assert_eq!(word.kind, ToolKind::PdfToWord);
        let popup = deferred_popup(DeferredKind::Conversion);
        assert!(popup.message.starts_with("High-fidelity document conversion"));
    }

    #[test]
    fn test_progress_report_without_listener() {
        let progress = Progress::detached();
        progress.report("still fine");
    }

    #[test]
    fn test_loading_messages() {
        assert_eq!(loading_message(RoutineKind::Merge), "Merging files...");
        assert_eq!(loading_message(RoutineKind::Compress), "Compressing file...");
    }
}
