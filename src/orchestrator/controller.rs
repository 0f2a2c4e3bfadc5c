//! Calculation session lifecycle controller.
//!
//! Owns the single-active-job guard, the background worker and cancellation,
//! and runs the command loop behind the TUI.

use crate::engine::{CompoundOptimizer, LibraryOptimizer};
use crate::model::{InputBatch, ResultRecord, RunConfig};
use crate::progress::ProgressCell;
use crate::runner::{self, CancelToken};
use anyhow::Result;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

#[derive(Debug, Error)]
pub enum StartError {
    #[error("a calculation is already running")]
    JobActive,
}

/// Commands emitted by UI layers to control the session.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Run,
    Cancel,
    Quit,
}

/// Events emitted back to presentation layers.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Status(String),
    RunFinished(Option<Vec<ResultRecord>>),
}

type WorkerHandle = tokio::task::JoinHandle<Option<Vec<ResultRecord>>>;

/// One interactive session: at most one calculation job at a time.
///
/// The progress cell is the only state shared with observers; everything
/// else is owned here.
#[derive(Default)]
pub struct JobSession {
    progress: ProgressCell,
    cancel: CancelToken,
    handle: Option<WorkerHandle>,
}

impl JobSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for observers to poll.
    pub fn progress(&self) -> ProgressCell {
        self.progress.clone()
    }

    pub fn is_running(&self) -> bool {
        self.progress.snapshot().running
    }

    /// Start a calculation on the background worker.
    ///
    /// Rejected while a job is active or a finished job has not been
    /// collected yet; requests are never queued.
    pub fn start(
        &mut self,
        cfg: RunConfig,
        batch: InputBatch,
        mut optimizer: Box<dyn CompoundOptimizer>,
    ) -> Result<(), StartError> {
        if self.handle.is_some() || self.progress.snapshot().running {
            return Err(StartError::JobActive);
        }
        // Enter the running state before the worker is scheduled, so a
        // second start can never slip through while the spawn is in flight.
        self.progress.reset();
        let cancel = CancelToken::new();
        self.cancel = cancel.clone();
        let progress = self.progress.clone();
        self.handle = Some(tokio::task::spawn_blocking(move || {
            runner::run(&cfg, &batch, optimizer.as_mut(), &progress, &cancel)
        }));
        Ok(())
    }

    /// Request cancellation; the worker honors it between compounds.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the active job and take its results.
    pub async fn wait(&mut self) -> Option<Vec<ResultRecord>> {
        let handle = self.handle.take()?;
        match handle.await {
            Ok(results) => results,
            Err(e) => {
                self.progress
                    .finish_failure(format!("worker task failed: {e}"));
                None
            }
        }
    }

    fn handle_mut(&mut self) -> Option<&mut WorkerHandle> {
        self.handle.as_mut()
    }

    fn take_join(
        &mut self,
        join_res: Result<Option<Vec<ResultRecord>>, tokio::task::JoinError>,
    ) -> Option<Vec<ResultRecord>> {
        self.handle.take();
        match join_res {
            Ok(results) => results,
            Err(e) => {
                self.progress
                    .finish_failure(format!("worker task failed: {e}"));
                None
            }
        }
    }
}

/// Parameters for the TUI-facing session control loop.
pub(crate) struct ControllerParams {
    pub session: JobSession,
    pub cfg: RunConfig,
    pub batch: InputBatch,
    pub library: PathBuf,
    pub run_on_launch: bool,
    pub event_tx: UnboundedSender<SessionEvent>,
    pub cmd_rx: UnboundedReceiver<UiCommand>,
}

fn try_start(
    session: &mut JobSession,
    cfg: &RunConfig,
    batch: &InputBatch,
    library: &std::path::Path,
    event_tx: &UnboundedSender<SessionEvent>,
) {
    let optimizer = Box::new(LibraryOptimizer::new(cfg, library));
    match session.start(cfg.clone(), batch.clone(), optimizer) {
        Ok(()) => {
            let _ = event_tx.send(SessionEvent::Status("Calculation started".into()));
        }
        Err(e) => {
            let _ = event_tx.send(SessionEvent::Status(e.to_string()));
        }
    }
}

/// Drive the session from UI commands and report completions back.
pub(crate) async fn run_controller(params: ControllerParams) -> Result<()> {
    let ControllerParams {
        mut session,
        cfg,
        batch,
        library,
        run_on_launch,
        event_tx,
        mut cmd_rx,
    } = params;

    if run_on_launch {
        try_start(&mut session, &cfg, &batch, &library, &event_tx);
    }
    let mut quit_pending = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Run) => {
                        try_start(&mut session, &cfg, &batch, &library, &event_tx);
                    }
                    Some(UiCommand::Cancel) => {
                        if session.is_running() {
                            session.cancel();
                            let _ = event_tx.send(SessionEvent::Status("Cancelling…".into()));
                        } else {
                            let _ = event_tx.send(SessionEvent::Status(
                                "No active calculation to cancel".into(),
                            ));
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        quit_pending = true;
                        if session.handle_mut().is_none() {
                            break Ok(());
                        }
                        // Let the active run wind down before exiting.
                        session.cancel();
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it
            // can be dropped if another select branch is chosen, and we'll
            // never observe completion.
            maybe_done = async {
                if let Some(h) = session.handle_mut() {
                    return Some(h.await);
                }
                std::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    let results = session.take_join(join_res);
                    let _ = event_tx.send(SessionEvent::RunFinished(results));
                    if quit_pending {
                        break Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OptimizerError;
    use crate::model::{FailurePolicy, ResultRecord, RunMode, MAX_COMPOUNDS};
    use crate::runner::CANCELLED_MESSAGE;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Optimizer that blocks inside `process_compound` until released,
    /// letting tests hold a job in the running state.
    struct GatedOptimizer {
        identifiers: Vec<String>,
        release: Arc<AtomicBool>,
    }

    impl GatedOptimizer {
        fn new(identifiers: &[&str], release: Arc<AtomicBool>) -> Self {
            Self {
                identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
                release,
            }
        }
    }

    impl CompoundOptimizer for GatedOptimizer {
        fn load_all_data(&mut self) -> Result<(), OptimizerError> {
            Ok(())
        }

        fn resolvable_identifiers(&self) -> &[String] {
            &self.identifiers
        }

        fn process_compound(
            &self,
            inchikey: &str,
        ) -> Result<Option<ResultRecord>, OptimizerError> {
            while !self.release.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(Some(ResultRecord::new(vec![(
                "InChIKey".into(),
                inchikey.to_string(),
            )])))
        }
    }

    fn config() -> RunConfig {
        RunConfig {
            run_id: "test".into(),
            mz_tolerance: 0.7,
            rt_tolerance: 2.0,
            rt_offset: 0.0,
            specificity_weight: 0.2,
            max_compounds: MAX_COMPOUNDS,
            output_path: "out.csv".into(),
            mode: RunMode::Batch,
            failure_policy: FailurePolicy::Abort,
        }
    }

    fn batch(identifiers: &[&str]) -> InputBatch {
        InputBatch::Table {
            identifiers: identifiers.iter().map(|s| s.to_string()).collect(),
            source_name: "input.txt".into(),
            record_count: identifiers.len(),
        }
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_a_job_is_active() {
        let release = Arc::new(AtomicBool::new(false));
        let mut session = JobSession::new();

        session
            .start(
                config(),
                batch(&["A"]),
                Box::new(GatedOptimizer::new(&["A"], release.clone())),
            )
            .unwrap();
        assert!(session.is_running());

        let rejected = session.start(
            config(),
            batch(&["A"]),
            Box::new(GatedOptimizer::new(&["A"], release.clone())),
        );
        assert!(matches!(rejected, Err(StartError::JobActive)));

        release.store(true, Ordering::Relaxed);
        let results = session.wait().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(session.progress().snapshot().complete);

        // Once the job is collected the session accepts a new one.
        session
            .start(
                config(),
                batch(&["A"]),
                Box::new(GatedOptimizer::new(&["A"], release)),
            )
            .unwrap();
        session.wait().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_aborts_the_run_between_compounds() {
        let release = Arc::new(AtomicBool::new(false));
        let mut session = JobSession::new();
        session
            .start(
                config(),
                batch(&["A", "B", "C"]),
                Box::new(GatedOptimizer::new(&["A", "B", "C"], release.clone())),
            )
            .unwrap();

        // The worker is blocked inside the first compound; cancellation is
        // picked up before the second one.
        session.cancel();
        release.store(true, Ordering::Relaxed);

        assert!(session.wait().await.is_none());
        let snap = session.progress().snapshot();
        assert!(!snap.complete);
        assert_eq!(snap.error.as_deref(), Some(CANCELLED_MESSAGE));
    }

    #[tokio::test]
    async fn wait_without_a_job_returns_nothing() {
        let mut session = JobSession::new();
        assert!(session.wait().await.is_none());
        assert!(!session.is_running());
    }
}
