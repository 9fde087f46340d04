//! Tool page session
//!
//! One [`ToolPage`] exists per visit to a tool. It owns the selection, the
//! single live result handle and the notification slots, and guards the
//! action trigger so at most one routine runs at a time.

use crate::catalog::{Operation, ToolDescriptor};
use crate::error::{Error, PROCESSING_FAILED_MESSAGE};
use crate::intake::{DropZone, InputFile, Selection};
use crate::notify::{Notification, Popup, PopupSlot, Severity, ToastPhase, ToastSlot};
use crate::pipeline::dispatch::{
    deferred_popup, loading_message, simulate_analysis, Progress, Routines,
};
use crate::pipeline::publish::{suggest_filename, PublishedResult, ResultHandle, ResultStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

pub const SUCCESS_MESSAGE: &str = "Success! Your file is ready.";

/// Timing of the page's notifications and simulated progress
#[derive(Debug, Clone)]
pub struct PageSettings {
    pub toast_hold: Duration,
    pub toast_exit: Duration,
    pub analysis_tick: Duration,
    /// Percent added per tick
    pub analysis_step: u32,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            toast_hold: Duration::from_millis(4000),
            toast_exit: Duration::from_millis(300),
            analysis_tick: Duration::from_millis(200),
            analysis_step: 10,
        }
    }
}

/// What a trigger attempt did
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// Nothing selected; no-op
    NoSelection,
    /// A routine is already in flight; the attempt was dropped
    Ignored,
    Published(PublishedResult),
    /// The tool cannot run here; a notice popup was raised
    Deferred(Popup),
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToastView {
    pub message: String,
    pub severity: Severity,
    pub phase: ToastPhase,
}

/// Snapshot of everything the page shows
#[derive(Debug, Clone, Serialize)]
pub struct PageStatus {
    pub tool: &'static str,
    pub title: &'static str,
    pub files: Vec<FileSummary>,
    /// Combined size of the selected files
    pub total_bytes: usize,
    pub dragging: bool,
    pub busy: bool,
    pub loading_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PublishedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toast: Option<ToastView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popup: Option<Popup>,
}

struct PageState {
    selection: Selection,
    drop_zone: DropZone,
    current: Option<ResultHandle>,
    toast: ToastSlot,
    popup: PopupSlot,
}

/// Clears the busy flag when dropped, whatever path the action takes
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ToolPage {
    tool: &'static ToolDescriptor,
    routines: Arc<dyn Routines>,
    store: Arc<ResultStore>,
    settings: PageSettings,
    state: Mutex<PageState>,
    busy: AtomicBool,
    progress: Progress,
    progress_rx: watch::Receiver<String>,
}

impl ToolPage {
    pub fn new(
        tool: &'static ToolDescriptor,
        routines: Arc<dyn Routines>,
        store: Arc<ResultStore>,
        settings: PageSettings,
    ) -> Self {
        let (progress, progress_rx) = Progress::channel("Processing...");
        Self {
            tool,
            routines,
            store,
            state: Mutex::new(PageState {
                selection: Selection::new(),
                drop_zone: DropZone::default(),
                current: None,
                toast: ToastSlot::new(settings.toast_hold, settings.toast_exit),
                popup: PopupSlot::default(),
            }),
            settings,
            busy: AtomicBool::new(false),
            progress,
            progress_rx,
        }
    }

    pub fn tool(&self) -> &'static ToolDescriptor {
        self.tool
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn loading_message(&self) -> String {
        self.progress_rx.borrow().clone()
    }

    /// Follow loading messages as they change
    pub fn subscribe_progress(&self) -> watch::Receiver<String> {
        self.progress_rx.clone()
    }

    /// Picker selection; appends and hides the previous result
    pub fn pick_files(&self, files: Vec<InputFile>) -> usize {
        let mut state = self.state.lock();
        self.release_current(&mut state);
        state.selection.append(files)
    }

    pub fn drag_enter(&self) {
        self.state.lock().drop_zone.enter();
    }

    pub fn drag_leave(&self) {
        self.state.lock().drop_zone.leave();
    }

    pub fn drop_files(&self, files: Vec<InputFile>) -> usize {
        let mut state = self.state.lock();
        self.release_current(&mut state);
        let PageState {
            selection,
            drop_zone,
            ..
        } = &mut *state;
        drop_zone.drop_into(selection, files)
    }

    /// Empty the selection; a shown result stays available
    pub fn clear_files(&self) {
        self.state.lock().selection.clear();
    }

    /// Empty the selection and release the result
    pub fn start_over(&self) {
        let mut state = self.state.lock();
        self.release_current(&mut state);
        state.selection.clear();
    }

    pub fn selection_len(&self) -> usize {
        self.state.lock().selection.len()
    }

    pub fn current_result(&self) -> Option<PublishedResult> {
        let handle = self.state.lock().current?;
        self.store.fetch(&handle).ok()
    }

    pub fn toast(&self) -> Option<ToastView> {
        let mut state = self.state.lock();
        state.toast.current(Instant::now()).map(|(toast, phase)| ToastView {
            message: toast.notification.message.clone(),
            severity: toast.notification.severity,
            phase,
        })
    }

    pub fn dismiss_toast(&self) {
        self.state.lock().toast.dismiss();
    }

    pub fn popup(&self) -> Option<Popup> {
        self.state.lock().popup.current().cloned()
    }

    pub fn dismiss_popup(&self) -> Option<Popup> {
        self.state.lock().popup.dismiss()
    }

    pub fn status(&self) -> PageStatus {
        let toast = self.toast();
        let result = self.current_result();
        let state = self.state.lock();
        PageStatus {
            tool: self.tool.id,
            title: self.tool.title,
            files: state
                .selection
                .files()
                .iter()
                .map(|f| FileSummary {
                    name: f.name.clone(),
                    size: f.size(),
                })
                .collect(),
            total_bytes: state.selection.total_bytes(),
            dragging: state.drop_zone.is_dragging(),
            busy: self.is_busy(),
            loading_message: self.loading_message(),
            result,
            toast,
            popup: state.popup.current().cloned(),
        }
    }

    /// Run the tool's action over a snapshot of the current selection
    pub async fn trigger(&self) -> ActionOutcome {
        let Some(_busy) = BusyGuard::claim(&self.busy) else {
            tracing::debug!(tool = self.tool.id, "action already running, ignoring trigger");
            return ActionOutcome::Ignored;
        };

        let (files, filename) = {
            let mut state = self.state.lock();
            if state.selection.is_empty() {
                return ActionOutcome::NoSelection;
            }
            self.release_current(&mut state);
            let files = state.selection.snapshot();
            let filename = suggest_filename(self.tool, &files);
            (files, filename)
        };
        self.progress.report("Initializing...");

        let kind = match self.tool.kind.operation() {
            Operation::Routine(kind) => kind,
            Operation::Deferred(kind) => {
                simulate_analysis(
                    &self.progress,
                    self.settings.analysis_tick,
                    self.settings.analysis_step,
                )
                .await;
                let popup = deferred_popup(kind);
                self.state.lock().popup.show(popup.clone());
                tracing::info!(tool = self.tool.id, ?kind, "tool deferred");
                return ActionOutcome::Deferred(popup);
            }
        };

        self.progress.report(loading_message(kind));
        tracing::info!(tool = self.tool.id, inputs = files.len(), "running routine");

        let routines = Arc::clone(&self.routines);
        let progress = self.progress.clone();
        let outcome = tokio::task::spawn_blocking(move || routines.run(kind, &files, &progress))
            .await
            .map_err(|e| Error::Task {
                reason: e.to_string(),
            })
            .and_then(|result| result);

        match outcome {
            Ok(payload) => {
                let published = self.store.publish(payload, filename);
                tracing::info!(
                    tool = self.tool.id,
                    handle = %published.handle,
                    size = published.size,
                    "result published"
                );
                let mut state = self.state.lock();
                state.current = Some(published.handle);
                state
                    .toast
                    .show(Notification::new(SUCCESS_MESSAGE, Severity::Success), Instant::now());
                ActionOutcome::Published(published)
            }
            Err(e) => {
                let message = if e.is_validation() {
                    tracing::warn!(tool = self.tool.id, error = %e, "action rejected");
                    e.client_message()
                } else {
                    tracing::error!(tool = self.tool.id, error = %e, "routine failed");
                    PROCESSING_FAILED_MESSAGE.to_string()
                };
                self.state
                    .lock()
                    .toast
                    .show(Notification::new(message.clone(), Severity::Error), Instant::now());
                ActionOutcome::Failed { message }
            }
        }
    }

    fn release_current(&self, state: &mut PageState) {
        if let Some(handle) = state.current.take() {
            self.store.revoke(&handle);
            tracing::debug!(tool = self.tool.id, %handle, "released result");
        }
    }
}

impl Drop for ToolPage {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(handle) = state.current.take() {
            self.store.revoke(&handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{find_tool, RoutineKind};
    use crate::error::Result;
    use crate::pipeline::routines::{Payload, Toolkit};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    /// Returns a fixed payload or error and counts calls
    struct FakeRoutines {
        fail: bool,
        calls: AtomicUsize,
        gate: Option<std::sync::Mutex<mpsc::Receiver<()>>>,
    }

    impl FakeRoutines {
        fn ok() -> Self {
            Self {
                fail: false,
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::ok()
            }
        }

        fn gated() -> (Self, mpsc::Sender<()>) {
            let (tx, rx) = mpsc::channel();
            let fake = Self {
                gate: Some(std::sync::Mutex::new(rx)),
                ..Self::ok()
            };
            (fake, tx)
        }
    }

    impl Routines for FakeRoutines {
        fn run(&self, kind: RoutineKind, files: &[InputFile], progress: &Progress) -> Result<Payload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let _ = gate.lock().unwrap().recv();
            }
            progress.report(format!("fake {:?}", kind));
            if self.fail {
                return Err(Error::InvalidPdf {
                    reason: "broken".to_string(),
                });
            }
            Ok(Payload::Document(vec![files.len() as u8; 8]))
        }
    }

    fn page(tool: &str, routines: Arc<dyn Routines>) -> (ToolPage, Arc<ResultStore>) {
        let store = Arc::new(ResultStore::new(16, 1024 * 1024));
        let page = ToolPage::new(
            find_tool(tool).unwrap(),
            routines,
            Arc::clone(&store),
            PageSettings::default(),
        );
        (page, store)
    }

    fn pdf(name: &str) -> InputFile {
        InputFile::new(name, Some("application/pdf".to_string()), b"%PDF-1.7".to_vec())
    }

    #[tokio::test]
    async fn test_empty_selection_is_noop() {
        let fake = Arc::new(FakeRoutines::ok());
        let (page, store) = page("rotate-pdf", fake.clone());
        assert!(matches!(page.trigger().await, ActionOutcome::NoSelection));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
        assert!(!page.is_busy());
    }

    #[tokio::test]
    async fn test_success_publishes_and_toasts() {
        let (page, store) = page("rotate-pdf", Arc::new(FakeRoutines::ok()));
        page.pick_files(vec![pdf("scan.pdf")]);

        let ActionOutcome::Published(result) = page.trigger().await else {
            panic!("expected a published result");
        };
        assert_eq!(result.filename, "scan_rotated.pdf");
        assert!(store.contains(&result.handle));
        assert_eq!(page.current_result().unwrap().handle, result.handle);

        let toast = page.toast().unwrap();
        assert_eq!(toast.message, SUCCESS_MESSAGE);
        assert_eq!(toast.severity, Severity::Success);
        assert!(!page.is_busy());
    }

    #[tokio::test]
    async fn test_failure_publishes_nothing() {
        let (page, store) = page("watermark", Arc::new(FakeRoutines::failing()));
        page.pick_files(vec![pdf("bad.pdf")]);

        let ActionOutcome::Failed { message } = page.trigger().await else {
            panic!("expected failure");
        };
        assert_eq!(message, PROCESSING_FAILED_MESSAGE);
        assert!(store.is_empty());
        assert!(page.current_result().is_none());
        assert_eq!(page.toast().unwrap().severity, Severity::Error);
        assert!(!page.is_busy());
    }

    #[tokio::test]
    async fn test_merge_needs_two_files() {
        let (page, store) = page("merge-pdf", Arc::new(Toolkit::standard()));
        page.pick_files(vec![pdf("only.pdf")]);

        let ActionOutcome::Failed { message } = page.trigger().await else {
            panic!("expected validation failure");
        };
        assert_eq!(message, "Please select at least 2 PDF files to merge.");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_new_result_revokes_previous() {
        let (page, store) = page("compress-pdf", Arc::new(FakeRoutines::ok()));
        page.pick_files(vec![pdf("a.pdf")]);

        let ActionOutcome::Published(first) = page.trigger().await else {
            panic!("expected a published result");
        };
        let ActionOutcome::Published(second) = page.trigger().await else {
            panic!("expected a published result");
        };
        assert_ne!(first.handle, second.handle);
        assert!(store.fetch(&first.handle).is_err());
        assert!(store.fetch(&second.handle).is_ok());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_adding_files_releases_result() {
        let (page, store) = page("compress-pdf", Arc::new(FakeRoutines::ok()));
        page.pick_files(vec![pdf("a.pdf")]);
        let ActionOutcome::Published(result) = page.trigger().await else {
            panic!("expected a published result");
        };

        page.clear_files();
        assert!(store.contains(&result.handle));

        page.drop_files(vec![pdf("b.pdf")]);
        assert!(!store.contains(&result.handle));
        assert_eq!(page.selection_len(), 1);
    }

    #[tokio::test]
    async fn test_start_over_and_drop_release_result() {
        let (page, store) = page("compress-pdf", Arc::new(FakeRoutines::ok()));
        page.pick_files(vec![pdf("a.pdf")]);
        page.trigger().await;
        page.start_over();
        assert!(store.is_empty());
        assert_eq!(page.selection_len(), 0);

        page.pick_files(vec![pdf("a.pdf")]);
        page.trigger().await;
        assert_eq!(store.len(), 1);
        drop(page);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_drag_state_is_presentational() {
        let (page, _store) = page("merge-pdf", Arc::new(FakeRoutines::ok()));
        page.drag_enter();
        assert!(page.status().dragging);
        page.drag_leave();
        assert!(!page.status().dragging);
        assert_eq!(page.selection_len(), 0);

        page.drag_enter();
        page.drop_files(vec![pdf("a.pdf"), pdf("b.pdf")]);
        let status = page.status();
        assert!(!status.dragging);
        assert_eq!(status.files.len(), 2);
        assert_eq!(status.files[0].name, "a.pdf");
        assert_eq!(status.total_bytes, 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_trigger_while_busy_is_ignored() {
        let (fake, release) = FakeRoutines::gated();
        let fake = Arc::new(fake);
        let (page, store) = page("rotate-pdf", fake.clone());
        let page = Arc::new(page);
        page.pick_files(vec![pdf("a.pdf")]);

        let running = tokio::spawn({
            let page = Arc::clone(&page);
            async move { page.trigger().await }
        });
        while fake.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(page.is_busy());

        // files added mid-flight do not join the running action
        page.pick_files(vec![pdf("late.pdf")]);
        assert!(matches!(page.trigger().await, ActionOutcome::Ignored));

        release.send(()).unwrap();
        let ActionOutcome::Published(result) = running.await.unwrap() else {
            panic!("expected a published result");
        };
        assert_eq!(result.data(), &[1u8; 8]);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
        assert!(!page.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_tool_simulates_then_notifies() {
        let fake = Arc::new(FakeRoutines::ok());
        let (page, store) = page("sign-pdf", fake.clone());
        page.pick_files(vec![pdf("contract.pdf")]);

        let started = Instant::now();
        let ActionOutcome::Deferred(popup) = page.trigger().await else {
            panic!("expected a deferred notice");
        };
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2000));
        assert!(elapsed < Duration::from_millis(2100));
        assert_eq!(popup.title, "Advanced Feature");
        assert_eq!(page.loading_message(), "Analyzing document... 100%");
        assert_eq!(page.popup(), Some(popup));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());

        assert!(page.dismiss_popup().is_some());
        assert!(page.popup().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_toast_expires() {
        let (page, _store) = page("rotate-pdf", Arc::new(FakeRoutines::ok()));
        page.pick_files(vec![pdf("a.pdf")]);
        page.trigger().await;
        assert_eq!(page.toast().unwrap().phase, ToastPhase::Visible);

        tokio::time::advance(Duration::from_millis(4100)).await;
        assert_eq!(page.toast().unwrap().phase, ToastPhase::Leaving);
        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(page.toast().is_none());
    }
}
