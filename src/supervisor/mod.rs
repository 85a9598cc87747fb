pub mod events;
pub mod merge;
pub mod poll;
pub mod relay;
pub mod session;

use crate::capture::CaptureEngine;
use crate::config::MergedConfig;
use crate::domain::agent::{Agent, AgentKind};
use crate::domain::worktree::{StatusCounts, Worktree, WorktreeStatus};
use crate::error::SidecarError;
use crate::infra::watcher::SessionFileWatcher;
use crate::infra::{clipboard, gh, git, task, tmux::TmuxController};
use crate::status;
use events::{
    CaptureOutcome, LoadedWorktree, NotifyLevel, StartOutcome, SupervisorEvent, UiMsg, UserAction,
};
use merge::{MergeStep, MergeWorkflow, StepStatus, MERGE_POLL_INTERVAL};
use poll::{PollContext, PollScheduler};
use relay::{Delivery, InteractiveState, KeyOutcome, DOUBLE_ESCAPE_WINDOW};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// Running supervisor: the event sender the host feeds, the UI message
/// stream it drains, and the loop's join handle.
pub struct SupervisorHandle {
    pub events: UnboundedSender<SupervisorEvent>,
    pub ui: UnboundedReceiver<UiMsg>,
    pub join: tokio::task::JoinHandle<()>,
}

/// Construct the supervisor's process-wide objects (capture engine, pane
/// cache, session-file watcher) and start the event loop. Torn down by
/// sending `SupervisorEvent::Shutdown`.
pub fn init_supervisor(config: MergedConfig, repo_root: PathBuf) -> SupervisorHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let supervisor = Supervisor::new(config, repo_root, tx.clone(), ui_tx);
    let join = tokio::spawn(supervisor.run(rx));

    SupervisorHandle {
        events: tx,
        ui: ui_rx,
        join,
    }
}

/// The control plane. All state mutation happens inside `run`'s handlers;
/// background tasks only ever send events back.
struct Supervisor {
    config: MergedConfig,
    repo_root: PathBuf,
    worktrees: BTreeMap<String, Worktree>,
    /// Sessions this supervisor created or adopted. Sessions outside this
    /// set are never killed.
    managed_sessions: HashSet<String>,
    scheduler: PollScheduler,
    interactive: Option<InteractiveState>,
    merge: Option<MergeWorkflow>,
    /// Worktree whose merge entry is blocked on a commit message.
    pending_commit: Option<String>,
    engine: Arc<CaptureEngine>,
    watcher: Option<SessionFileWatcher>,
    /// Worktree currently full-screen attached; its polls are suppressed.
    attached: Option<String>,
    focused: bool,
    output_visible: bool,
    tx: UnboundedSender<SupervisorEvent>,
    ui: UnboundedSender<UiMsg>,
}

impl Supervisor {
    fn new(
        config: MergedConfig,
        repo_root: PathBuf,
        tx: UnboundedSender<SupervisorEvent>,
        ui: UnboundedSender<UiMsg>,
    ) -> Self {
        let engine = Arc::new(CaptureEngine::new(config.session_prefix().to_string()));

        // Bridge session-file change notifications onto the event channel.
        let watcher = {
            let (watch_tx, mut watch_rx) =
                mpsc::unbounded_channel::<crate::infra::watcher::SessionFileChanged>();
            let event_tx = tx.clone();
            tokio::spawn(async move {
                while let Some(changed) = watch_rx.recv().await {
                    let _ = event_tx.send(SupervisorEvent::SessionFileChanged {
                        worktree: changed.worktree_name,
                    });
                }
            });
            match SessionFileWatcher::start(watch_tx) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!(error = %e, "session-file watcher unavailable");
                    None
                }
            }
        };

        Self {
            config,
            repo_root,
            worktrees: BTreeMap::new(),
            managed_sessions: HashSet::new(),
            scheduler: PollScheduler::new(),
            interactive: None,
            merge: None,
            pending_commit: None,
            engine,
            watcher,
            attached: None,
            focused: true,
            output_visible: true,
            tx,
            ui,
        }
    }

    async fn run(mut self, mut rx: UnboundedReceiver<SupervisorEvent>) {
        info!(root = %self.repo_root.display(), "supervisor started");
        self.send(SupervisorEvent::RefreshWorktrees);

        while let Some(event) = rx.recv().await {
            if matches!(event, SupervisorEvent::Shutdown) {
                break;
            }
            self.handle(event);
        }
        info!("supervisor stopped");
    }

    fn handle(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::PollTick {
                worktree,
                generation,
            } => self.on_poll_tick(worktree, generation),
            SupervisorEvent::CaptureResult {
                worktree,
                generation,
                outcome,
            } => self.on_capture_result(worktree, generation, outcome),
            SupervisorEvent::SessionFileChanged { worktree } => {
                // Immediate re-poll; the file is the fast path for the
                // Waiting upgrade.
                self.reschedule(&worktree, PollContext::Debounce);
            }

            SupervisorEvent::StartAgent {
                worktree,
                kind,
                prompt,
                skip_permissions,
            } => self.on_start_agent(worktree, kind, prompt, skip_permissions),
            SupervisorEvent::AgentStartFinished { worktree, result } => {
                self.on_agent_start_finished(worktree, result)
            }
            SupervisorEvent::StopAgent { worktree } => self.on_stop_agent(worktree),
            SupervisorEvent::AgentStopFinished { worktree } => {
                self.drop_agent(&worktree);
                self.ui(UiMsg::AgentStopped { worktree });
            }

            SupervisorEvent::Approve { worktree } => {
                self.relay_action(worktree, UserAction::Approve)
            }
            SupervisorEvent::Reject { worktree } => {
                self.relay_action(worktree, UserAction::Reject)
            }
            SupervisorEvent::SendText { worktree, text } => self.relay_send_text(worktree, text),
            SupervisorEvent::ActionFinished {
                worktree,
                action,
                result,
            } => {
                let msg = match action {
                    UserAction::Approve => UiMsg::ApproveResult { worktree, result },
                    UserAction::Reject => UiMsg::RejectResult { worktree, result },
                    UserAction::SendText => UiMsg::SendTextResult { worktree, result },
                };
                self.ui(msg);
            }

            SupervisorEvent::Attach { worktree } => self.on_attach(worktree),
            SupervisorEvent::AttachFinished { worktree } => self.on_attach_finished(worktree),

            SupervisorEvent::EnterInteractive { worktree } => self.enter_interactive(worktree),
            SupervisorEvent::ExitInteractive => self.exit_interactive(),
            SupervisorEvent::InteractiveKey { key } => self.on_interactive_key(key),
            SupervisorEvent::InteractiveRunes { runes } => self.on_interactive_runes(runes),
            SupervisorEvent::EscapeTimerFired { worktree } => self.on_escape_timer(worktree),
            SupervisorEvent::PasteClipboard => self.on_paste_clipboard(),
            SupervisorEvent::PreviewResized { width, height } => {
                self.on_preview_resized(width, height)
            }
            SupervisorEvent::CursorInfoResult { worktree, info } => {
                if let Some(state) = self.interactive.as_mut() {
                    if state.worktree == worktree {
                        if let Some(info) = info {
                            state.pane_size = Some((info.pane_width, info.pane_height));
                        }
                        state.cursor = info;
                    }
                }
            }

            SupervisorEvent::MergeOpen { worktree } => self.on_merge_open(worktree),
            SupervisorEvent::MergePrecheck {
                worktree,
                counts,
                diff_summary,
            } => self.on_merge_precheck(worktree, counts, diff_summary),
            SupervisorEvent::MergeCommitMessage { message } => {
                self.on_merge_commit_message(message)
            }
            SupervisorEvent::MergeConfirmReview => {
                if let Some(wf) = self.merge.as_mut() {
                    wf.confirm_review();
                }
            }
            SupervisorEvent::MergeSelectMethod { method, direct } => {
                let start_push = match self.merge.as_mut() {
                    Some(wf) => {
                        wf.select_method(method, !direct);
                        wf.step == MergeStep::Push
                    }
                    None => false,
                };
                if start_push {
                    self.run_merge_step(MergeStep::Push);
                }
            }
            SupervisorEvent::MergeStepResult {
                worktree,
                step,
                result,
            } => self.on_merge_step_result(worktree, step, result),
            SupervisorEvent::MergeCheckNow => self.spawn_merge_check(),
            SupervisorEvent::MergeCheckResult { worktree, merged } => {
                self.on_merge_check_result(worktree, merged)
            }
            SupervisorEvent::MergeCleanupCursor { down } => {
                if let Some(wf) = self.merge.as_mut() {
                    wf.move_cleanup_cursor(down);
                }
            }
            SupervisorEvent::MergeToggleCleanup => {
                if let Some(wf) = self.merge.as_mut() {
                    wf.toggle_focused_cleanup();
                }
            }
            SupervisorEvent::MergeSkipAllCleanup => {
                if let Some(wf) = self.merge.as_mut() {
                    wf.cleanup.skip_all();
                }
            }
            SupervisorEvent::MergeConfirmCleanup => {
                let start_cleanup = self
                    .merge
                    .as_mut()
                    .is_some_and(|wf| wf.confirm_post_merge() == Some(MergeStep::Cleanup));
                if start_cleanup {
                    self.run_merge_step(MergeStep::Cleanup);
                }
            }
            SupervisorEvent::MergeOpenPrInBrowser => {
                let path = self
                    .merge
                    .as_ref()
                    .and_then(|wf| self.worktrees.get(&wf.worktree))
                    .map(|wt| wt.path.clone());
                if let Some(path) = path {
                    tokio::spawn(async move {
                        let _ = gh::open_pr_in_browser(&path).await;
                    });
                }
            }
            SupervisorEvent::MergeCancel => {
                // Any in-flight step or check result no longer matches a
                // workflow and lands inert.
                self.merge = None;
                self.pending_commit = None;
            }

            SupervisorEvent::RefreshWorktrees => self.spawn_refresh(),
            SupervisorEvent::WorktreesLoaded { result } => self.on_worktrees_loaded(result),
            SupervisorEvent::ConflictScanResult { conflicts } => {
                if !conflicts.is_empty() {
                    self.ui(UiMsg::ConflictsDetected { conflicts });
                }
            }
            SupervisorEvent::ReconnectAgents => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = TmuxController::list_sessions().await;
                    let _ = tx.send(SupervisorEvent::SessionsListed { result });
                });
            }
            SupervisorEvent::SessionsListed { result } => self.on_sessions_listed(result),
            SupervisorEvent::CleanupOrphans => self.on_cleanup_orphans(),

            SupervisorEvent::FocusChanged {
                focused,
                output_visible,
            } => {
                self.focused = focused;
                self.output_visible = output_visible;
            }

            SupervisorEvent::Shutdown => {}
        }
    }

    // ─── Polling ─────────────────────────────────────────────────────────

    fn on_poll_tick(&mut self, worktree: String, generation: u64) {
        if !self.scheduler.is_current(&worktree, generation) {
            return;
        }
        // Full-screen attach renders the pane already; a subprocess capture
        // would compete for it. Keep the chain alive, skip the work.
        if self.attached.as_deref() == Some(worktree.as_str()) {
            self.reschedule_without_bump(&worktree, PollContext::Idle(WorktreeStatus::Active));
            return;
        }
        let Some(wt) = self.worktrees.get(&worktree) else {
            return;
        };
        let Some(agent) = wt.agent.as_ref() else {
            return;
        };

        let session = agent.tmux_session.clone();
        let session_file = agent.kind.session_file(&wt.path);
        let engine = self.engine.clone();
        let tx = self.tx.clone();
        let interactive_here = self
            .interactive
            .as_ref()
            .is_some_and(|s| s.worktree == worktree);

        tokio::spawn(async move {
            let outcome = match engine.capture(&session).await {
                Ok(output) => {
                    let session_file_idle = session_file
                        .as_deref()
                        .is_some_and(session::session_file_says_idle);
                    Ok(CaptureOutcome {
                        output,
                        session_file_idle,
                    })
                }
                Err(e) => Err(e),
            };

            // The cursor cache is refreshed from the poll path so the
            // render path never spawns subprocesses.
            if interactive_here {
                let info = TmuxController::cursor_info(&session).await.ok();
                let _ = tx.send(SupervisorEvent::CursorInfoResult {
                    worktree: worktree.clone(),
                    info,
                });
            }

            let _ = tx.send(SupervisorEvent::CaptureResult {
                worktree,
                generation,
                outcome,
            });
        });
    }

    fn on_capture_result(
        &mut self,
        worktree: String,
        generation: u64,
        outcome: Result<CaptureOutcome, SidecarError>,
    ) {
        if !self.scheduler.is_current(&worktree, generation) {
            return;
        }

        match outcome {
            Err(SidecarError::SessionGone(_)) => {
                info!(worktree = %worktree, "session disappeared, dropping agent");
                if self
                    .interactive
                    .as_ref()
                    .is_some_and(|s| s.worktree == worktree)
                {
                    self.interactive = None;
                    self.ui(UiMsg::InteractiveSessionDead {
                        worktree: worktree.clone(),
                    });
                }
                self.drop_agent(&worktree);
                self.ui(UiMsg::AgentStopped { worktree });
            }
            Err(SidecarError::CaptureTimeout) => {
                // Nothing persistent; the next tick retries.
                self.reschedule_without_bump(&worktree, PollContext::Idle(WorktreeStatus::Active));
            }
            Err(e) => {
                debug!(worktree = %worktree, error = %e, "poll capture failed, retrying");
                self.reschedule_without_bump(&worktree, PollContext::Idle(WorktreeStatus::Active));
            }
            Ok(capture) => self.apply_capture(worktree, capture),
        }
    }

    fn apply_capture(&mut self, worktree: String, capture: CaptureOutcome) {
        let mut cursor = None;
        if let Some(state) = self.interactive.as_mut() {
            if state.worktree == worktree {
                state.update_modes_from_capture(&capture.output);
                cursor = state.cursor;
            }
        }

        enum Applied {
            Changed {
                status: WorktreeStatus,
                old_status: WorktreeStatus,
                waiting_for: Option<String>,
                lines: Vec<String>,
            },
            Unchanged {
                status: WorktreeStatus,
            },
        }

        let applied = {
            let Some(wt) = self.worktrees.get_mut(&worktree) else {
                return;
            };
            let Some(agent) = wt.agent.as_mut() else {
                return;
            };

            if agent.buffer.update(&capture.output) {
                let mut new_status = status::classify(&capture.output);
                // The session file is authoritative for "idle at prompt"
                // but slower; it only ever upgrades an Active verdict.
                if new_status == WorktreeStatus::Active && capture.session_file_idle {
                    new_status = WorktreeStatus::Waiting;
                }
                agent.waiting_for = if new_status == WorktreeStatus::Waiting {
                    status::extract_prompt(&capture.output)
                } else {
                    None
                };
                agent.last_output_at = chrono::Utc::now();

                let old_status = wt.status;
                let waiting_for = agent.waiting_for.clone();
                wt.status = new_status;
                wt.updated_at = chrono::Utc::now();
                Applied::Changed {
                    status: new_status,
                    old_status,
                    waiting_for,
                    // Emit the buffer's view: scrubbed and capped.
                    lines: agent.buffer.lines().iter().cloned().collect(),
                }
            } else {
                Applied::Unchanged { status: wt.status }
            }
        };

        let (changed, status) = match applied {
            Applied::Changed {
                status,
                old_status,
                waiting_for,
                mut lines,
            } => {
                // In interactive mode the emitted output carries the cursor
                // cell pre-rendered from the cached position.
                if let Some(cursor) = cursor {
                    relay::overlay::apply(&mut lines, &cursor);
                }
                self.ui(UiMsg::AgentOutput {
                    worktree: worktree.clone(),
                    output: lines.join("\n"),
                    status,
                    waiting_for,
                });
                if status != old_status {
                    self.notify_attention(&worktree, status);
                }
                (true, status)
            }
            Applied::Unchanged { status } => {
                self.ui(UiMsg::AgentPollUnchanged {
                    worktree: worktree.clone(),
                    status,
                });
                (false, status)
            }
        };

        let ctx = self.poll_context_for(&worktree, changed, status);
        self.reschedule_without_bump(&worktree, ctx);
    }

    fn poll_context_for(
        &self,
        worktree: &str,
        changed: bool,
        status: WorktreeStatus,
    ) -> PollContext {
        if let Some(state) = self.interactive.as_ref() {
            if state.worktree == worktree {
                return PollContext::Interactive {
                    since_last_key: state.since_last_key(),
                };
            }
            // Another pane holds the preview.
            return PollContext::Hidden;
        }
        if !self.focused {
            return PollContext::Unfocused;
        }
        if !self.output_visible {
            return PollContext::Hidden;
        }
        if changed {
            PollContext::OutputChanged
        } else {
            PollContext::Idle(status)
        }
    }

    /// Schedule the next tick on the current generation (the normal
    /// poll-chain continuation).
    fn reschedule_without_bump(&mut self, worktree: &str, ctx: PollContext) {
        let Some(session) = self.session_of(worktree) else {
            return;
        };
        let generation = self.scheduler.generation(worktree);
        self.spawn_tick(worktree.to_string(), session, generation, ctx);
    }

    /// Cancel any outstanding chain for the worktree and start a fresh one.
    fn reschedule(&mut self, worktree: &str, ctx: PollContext) {
        let Some(session) = self.session_of(worktree) else {
            return;
        };
        let generation = self.scheduler.bump(worktree);
        self.spawn_tick(worktree.to_string(), session, generation, ctx);
    }

    fn spawn_tick(&self, worktree: String, session: String, generation: u64, ctx: PollContext) {
        let delay = poll::delay_for(&session, ctx);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SupervisorEvent::PollTick {
                worktree,
                generation,
            });
        });
    }

    fn session_of(&self, worktree: &str) -> Option<String> {
        self.worktrees
            .get(worktree)?
            .agent
            .as_ref()
            .map(|a| a.tmux_session.clone())
    }

    // ─── Agent lifecycle ─────────────────────────────────────────────────

    fn on_start_agent(
        &mut self,
        worktree: String,
        kind: Option<AgentKind>,
        prompt: Option<String>,
        skip_permissions: bool,
    ) {
        let Some(wt) = self.worktrees.get_mut(&worktree) else {
            self.notify(NotifyLevel::Error, format!("No worktree '{worktree}'"));
            return;
        };
        let kind = kind.unwrap_or(wt.agent_kind);
        wt.agent_kind = kind;

        let prefix = self.config.session_prefix().to_string();
        let path = wt.path.clone();
        let task_id = wt.task_id.clone();
        let history_limit = self.config.global.history_limit;
        let tx = self.tx.clone();
        let name = worktree;

        tokio::spawn(async move {
            let result = session::start_agent(
                &prefix,
                &name,
                &path,
                kind,
                session::StartOptions {
                    prompt,
                    skip_permissions,
                    launch_agent: true,
                    task_id,
                    history_limit,
                },
            )
            .await;
            let _ = tx.send(SupervisorEvent::AgentStartFinished {
                worktree: name,
                result,
            });
        });
    }

    fn on_agent_start_finished(
        &mut self,
        worktree: String,
        result: Result<StartOutcome, SidecarError>,
    ) {
        match result {
            Ok(outcome) => {
                let session_file = {
                    let Some(wt) = self.worktrees.get_mut(&worktree) else {
                        return;
                    };
                    wt.agent = Some(Agent::new(
                        wt.agent_kind,
                        worktree.clone(),
                        outcome.session_name.clone(),
                    ));
                    wt.status = WorktreeStatus::Active;
                    wt.agent_kind.session_file(&wt.path)
                };

                self.managed_sessions.insert(outcome.session_name);
                if let (Some(watcher), Some(path)) = (self.watcher.as_mut(), session_file) {
                    watcher.watch(&worktree, path);
                }

                self.ui(UiMsg::AgentStarted {
                    worktree: worktree.clone(),
                    reconnected: outcome.reconnected,
                });
                self.reschedule(&worktree, PollContext::Initial);
            }
            Err(e) => {
                if let Some(wt) = self.worktrees.get_mut(&worktree) {
                    wt.status = WorktreeStatus::Paused;
                }
                self.notify(
                    NotifyLevel::Error,
                    format!("Failed to start agent in '{worktree}': {e}"),
                );
            }
        }
    }

    fn on_stop_agent(&mut self, worktree: String) {
        let Some(session) = self.session_of(&worktree) else {
            return;
        };
        if !self.managed_sessions.contains(&session) {
            warn!(session = %session, "refusing to stop unmanaged session");
            return;
        }
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if let Err(e) = session::stop_agent(&session).await {
                warn!(session = %session, error = %e, "stop escalation failed");
            }
            let _ = tx.send(SupervisorEvent::AgentStopFinished { worktree });
        });
    }

    /// Remove the agent record and everything keyed on it.
    fn drop_agent(&mut self, worktree: &str) {
        if let Some(wt) = self.worktrees.get_mut(worktree) {
            if let Some(agent) = wt.agent.take() {
                self.managed_sessions.remove(&agent.tmux_session);
                self.engine.invalidate(&agent.tmux_session);
            }
            wt.status = WorktreeStatus::Paused;
        }
        self.scheduler.forget(worktree);
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.unwatch(worktree);
        }
    }

    fn relay_action(&mut self, worktree: String, action: UserAction) {
        let Some(session) = self.session_of(&worktree) else {
            return;
        };
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = match action {
                UserAction::Approve => session::approve(&session).await,
                UserAction::Reject => session::reject(&session).await,
                UserAction::SendText => return,
            };
            let _ = tx.send(SupervisorEvent::ActionFinished {
                worktree,
                action,
                result: result.map_err(|e| e.to_string()),
            });
        });
    }

    fn relay_send_text(&mut self, worktree: String, text: String) {
        let Some(session) = self.session_of(&worktree) else {
            return;
        };
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = session::send_text(&session, &text).await;
            let _ = tx.send(SupervisorEvent::ActionFinished {
                worktree,
                action: UserAction::SendText,
                result: result.map_err(|e| e.to_string()),
            });
        });
    }

    // ─── Attach ──────────────────────────────────────────────────────────

    fn on_attach(&mut self, worktree: String) {
        let Some(session) = self.session_of(&worktree) else {
            return;
        };
        self.attached = Some(worktree.clone());
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = TmuxController::attach_blocking(&session) {
                warn!(session = %session, error = %e, "attach failed");
            }
            let _ = tx.send(SupervisorEvent::AttachFinished { worktree });
        });
    }

    fn on_attach_finished(&mut self, worktree: String) {
        self.attached = None;
        self.ui(UiMsg::TmuxAttachFinished {
            worktree: worktree.clone(),
        });
        // Whatever happened inside the attach, re-learn it immediately.
        self.reschedule(&worktree, PollContext::Debounce);
        self.send(SupervisorEvent::RefreshWorktrees);
    }

    // ─── Interactive relay ───────────────────────────────────────────────

    fn enter_interactive(&mut self, worktree: String) {
        let Some(session) = self.session_of(&worktree) else {
            self.notify(NotifyLevel::Error, format!("No agent in '{worktree}'"));
            return;
        };
        self.interactive = Some(InteractiveState::new(worktree.clone(), session));
        // A fresh generation puts the session on the fast interactive lane.
        self.reschedule(&worktree, PollContext::Debounce);
    }

    fn exit_interactive(&mut self) {
        if let Some(state) = self.interactive.take() {
            let worktree = state.worktree;
            self.reschedule(&worktree, PollContext::Idle(WorktreeStatus::Active));
            self.ui(UiMsg::InteractiveExited { worktree });
        }
    }

    fn on_interactive_key(&mut self, key: crossterm::event::KeyEvent) {
        let exit_key = self.config.global.exit_key;
        let attach_key = self.config.global.attach_key;
        let Some(state) = self.interactive.as_mut() else {
            return;
        };
        let worktree = state.worktree.clone();
        let outcome = state.handle_key(&key, exit_key, attach_key);
        match outcome {
            KeyOutcome::Forward(deliveries) => self.forward_deliveries(deliveries),
            KeyOutcome::StartEscapeTimer => {
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(DOUBLE_ESCAPE_WINDOW).await;
                    let _ = tx.send(SupervisorEvent::EscapeTimerFired { worktree });
                });
            }
            KeyOutcome::Exit => self.exit_interactive(),
            KeyOutcome::ExitToAttach => {
                self.exit_interactive();
                self.send(SupervisorEvent::Attach { worktree });
            }
            KeyOutcome::Ignored => {}
        }
    }

    fn on_interactive_runes(&mut self, runes: String) {
        let Some(state) = self.interactive.as_mut() else {
            return;
        };
        if let KeyOutcome::Forward(deliveries) = state.handle_runes(&runes) {
            self.forward_deliveries(deliveries);
        }
    }

    fn on_escape_timer(&mut self, worktree: String) {
        let Some(state) = self.interactive.as_mut() else {
            return;
        };
        if state.worktree != worktree {
            return;
        }
        if let KeyOutcome::Forward(deliveries) = state.handle_escape_timeout() {
            self.forward_deliveries(deliveries);
        }
    }

    fn on_paste_clipboard(&mut self) {
        if self.interactive.is_none() {
            return;
        }
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || match clipboard::read_text() {
            Ok(text) if !text.is_empty() => {
                let _ = tx.send(SupervisorEvent::InteractiveRunes { runes: text });
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "clipboard read failed"),
        });
    }

    fn forward_deliveries(&mut self, deliveries: Vec<Delivery>) {
        let Some(state) = self.interactive.as_ref() else {
            return;
        };
        let session = state.session.clone();
        let worktree = state.worktree.clone();
        tokio::spawn(async move {
            for delivery in deliveries {
                let result = match &delivery {
                    Delivery::Key(name) => TmuxController::send_key(&session, name).await,
                    Delivery::Literal(text) => TmuxController::send_literal(&session, text).await,
                    Delivery::Buffer(text) => TmuxController::paste_text(&session, text).await,
                };
                if let Err(e) = result {
                    debug!(session = %session, error = %e, "interactive delivery failed");
                    break;
                }
            }
        });
        // Debounce: re-capture right after the keystrokes land.
        self.reschedule(&worktree, PollContext::Debounce);
    }

    fn on_preview_resized(&mut self, width: u16, height: u16) {
        let Some(state) = self.interactive.as_mut() else {
            return;
        };
        if !state.should_resize(width, height) {
            return;
        }
        let session = state.session.clone();
        tokio::spawn(async move {
            // The cached size can be stale; skip the resize when tmux
            // already reports a match.
            if let Ok(size) = TmuxController::pane_size(&session).await {
                if size == (width, height) {
                    return;
                }
            }
            if let Err(e) = TmuxController::resize(&session, width, height).await {
                debug!(session = %session, error = %e, "resize failed");
            }
        });
    }

    // ─── Merge workflow ──────────────────────────────────────────────────

    fn on_merge_open(&mut self, worktree: String) {
        let Some(wt) = self.worktrees.get(&worktree) else {
            return;
        };
        let path = wt.path.clone();
        let repo_root = self.repo_root.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let base = git::default_branch(&repo_root).unwrap_or_else(|_| "main".into());
            let counts = git::status_counts(&path).await.unwrap_or_default();
            let stats = git::diff_stats(&path, &base).await.unwrap_or_default();
            let diff = git::diff_text(&path, &base).await.unwrap_or_default();
            let diff_summary = format!(
                "{} files changed, +{} -{}\n\n{}",
                stats.files_changed,
                stats.insertions,
                stats.deletions,
                diff.trim_end()
            );
            let _ = tx.send(SupervisorEvent::MergePrecheck {
                worktree,
                counts,
                diff_summary,
            });
        });
    }

    fn on_merge_precheck(&mut self, worktree: String, counts: StatusCounts, diff_summary: String) {
        if !counts.is_clean() {
            // The host shows the commit-for-merge modal and answers with
            // MergeCommitMessage.
            self.pending_commit = Some(worktree.clone());
            self.notify(
                NotifyLevel::Info,
                format!(
                    "'{worktree}' has uncommitted changes ({} staged, {} modified, {} untracked) — commit before merging",
                    counts.staged, counts.modified, counts.untracked
                ),
            );
            return;
        }
        self.pending_commit = None;
        self.merge = Some(MergeWorkflow::new(
            worktree,
            diff_summary,
            self.config.global.merge_method,
            &self.config.global.cleanup,
        ));
    }

    fn on_merge_commit_message(&mut self, message: String) {
        let Some(worktree) = self.pending_commit.clone() else {
            return;
        };
        if message.trim().is_empty() {
            self.notify(NotifyLevel::Error, "Commit message cannot be empty".into());
            return;
        }
        let Some(wt) = self.worktrees.get(&worktree) else {
            return;
        };
        let path = wt.path.clone();
        let tx = self.tx.clone();
        let message = message.trim().to_string();
        tokio::spawn(async move {
            match git::add_all_and_commit(&path, &message).await {
                // Re-run the precheck; it comes back clean and the
                // workflow opens.
                Ok(()) => {
                    let _ = tx.send(SupervisorEvent::MergeOpen { worktree });
                }
                Err(e) => {
                    let _ = tx.send(SupervisorEvent::MergeStepResult {
                        worktree,
                        step: MergeStep::ReviewDiff,
                        result: Err(format!("commit failed: {e}")),
                    });
                }
            }
        });
    }

    fn run_merge_step(&mut self, step: MergeStep) {
        let Some(wf) = self.merge.as_ref() else {
            return;
        };
        let worktree = wf.worktree.clone();
        let Some(wt) = self.worktrees.get(&worktree) else {
            return;
        };
        let path = wt.path.clone();
        let branch = wt.branch.clone();
        let method = wf.method;
        let cleanup = wf.cleanup;
        let repo_root = self.repo_root.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result: Result<Option<String>, String> = match step {
                MergeStep::Push => git::push_branch(&path, &branch)
                    .await
                    .map(|_| None)
                    .map_err(|e| e.to_string()),
                MergeStep::CreatePr => match gh::create_pr(&path, &branch, "").await {
                    Ok(url) => {
                        // Best-effort convenience; the URL also lands in
                        // the workflow state.
                        let _ = clipboard::copy_text(&url);
                        Ok(Some(url))
                    }
                    Err(e) => Err(e.to_string()),
                },
                MergeStep::DirectMerge => {
                    let created = match gh::create_pr(&path, &branch, "").await {
                        Ok(_) => Ok(()),
                        Err(e) if e.to_string().contains("already exists") => Ok(()),
                        Err(e) => Err(e.to_string()),
                    };
                    match created {
                        Ok(()) => gh::merge_pr(&path, method)
                            .await
                            .map(|_| None)
                            .map_err(|e| e.to_string()),
                        Err(e) => Err(e),
                    }
                }
                MergeStep::Cleanup => {
                    let warnings = run_cleanup(&repo_root, &path, &branch, cleanup).await;
                    Ok((!warnings.is_empty()).then(|| warnings.join("\n")))
                }
                _ => Ok(None),
            };

            let _ = tx.send(SupervisorEvent::MergeStepResult {
                worktree,
                step,
                result,
            });
        });
    }

    fn on_merge_step_result(
        &mut self,
        worktree: String,
        step: MergeStep,
        result: Result<Option<String>, String>,
    ) {
        let Some(wf) = self.merge.as_mut() else {
            // A step result with no workflow left: surface failures, drop
            // successes.
            if let Err(message) = result {
                self.notify(NotifyLevel::Error, message);
            }
            return;
        };
        if wf.worktree != worktree {
            return;
        }

        if step == MergeStep::Cleanup {
            if let Ok(Some(warnings)) = &result {
                for w in warnings.lines() {
                    wf.add_warning(w.to_string());
                }
            }
        }

        let next = wf.on_step_result(step, result);
        let step_status = wf.status(step);
        let entered_waiting = wf.step == MergeStep::WaitingMerge && step == MergeStep::CreatePr;
        let cleanup_done = step == MergeStep::Cleanup && step_status == StepStatus::Done;

        self.ui(UiMsg::MergeStepCompleted {
            worktree: worktree.clone(),
            step,
            status: step_status,
        });

        if let Some(next_step) = next {
            self.run_merge_step(next_step);
        } else if entered_waiting {
            self.spawn_merge_check();
        }

        if cleanup_done {
            // Merged and cleaned up: the worktree may be gone now.
            self.send(SupervisorEvent::RefreshWorktrees);
            self.send(SupervisorEvent::CleanupOrphans);
            self.notify(NotifyLevel::Success, format!("'{worktree}' merged"));
        }
    }

    fn spawn_merge_check(&mut self) {
        let Some(wf) = self.merge.as_ref() else {
            return;
        };
        if wf.step != MergeStep::WaitingMerge {
            return;
        }
        let worktree = wf.worktree.clone();
        let Some(wt) = self.worktrees.get(&worktree) else {
            return;
        };
        let path = wt.path.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let merged = match gh::pr_status(&path).await {
                Ok(status) => Some(status.is_merged()),
                Err(_) => None,
            };
            let _ = tx.send(SupervisorEvent::MergeCheckResult { worktree, merged });
        });
    }

    fn on_merge_check_result(&mut self, worktree: String, merged: Option<bool>) {
        let advanced = match self.merge.as_mut() {
            Some(wf) if wf.worktree == worktree => wf.on_merge_check(merged),
            _ => return,
        };
        if advanced {
            self.ui(UiMsg::MergeStepCompleted {
                worktree,
                step: MergeStep::WaitingMerge,
                status: StepStatus::Done,
            });
            return;
        }
        // Not merged yet (or the check errored): requeue silently.
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(MERGE_POLL_INTERVAL).await;
            let _ = tx.send(SupervisorEvent::MergeCheckNow);
        });
    }

    // ─── Worktree repository ─────────────────────────────────────────────

    fn spawn_refresh(&mut self) {
        let repo_root = self.repo_root.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let base = git::default_branch(&repo_root).unwrap_or_else(|_| "main".into());
            let result = load_worktrees(&repo_root, &base).await;

            if let Ok(loaded) = &result {
                let mut per_worktree = Vec::new();
                for wt in loaded {
                    if let Ok(paths) = git::dirty_paths(&wt.path).await {
                        per_worktree.push((wt.name.clone(), paths));
                    }
                }
                let conflicts = git::conflicting_paths(&per_worktree);
                let _ = tx.send(SupervisorEvent::ConflictScanResult { conflicts });
            }

            let _ = tx.send(SupervisorEvent::WorktreesLoaded { result });
        });
    }

    fn on_worktrees_loaded(&mut self, result: Result<Vec<LoadedWorktree>, SidecarError>) {
        let loaded = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(error = %e, "worktree refresh failed");
                return;
            }
        };

        let default_agent = self.config.default_agent();
        let mut seen = HashSet::new();
        for item in loaded {
            seen.insert(item.name.clone());
            match self.worktrees.get_mut(&item.name) {
                Some(wt) => {
                    wt.branch = item.branch;
                    wt.diff = item.diff;
                    wt.task_id = item.task_id;
                    if wt.agent.is_none() {
                        if let Some(kind) = item.agent_kind {
                            wt.agent_kind = kind;
                        }
                    }
                }
                None => {
                    let mut wt = Worktree::new(
                        item.name.clone(),
                        item.path,
                        item.branch,
                        item.agent_kind.unwrap_or(default_agent),
                    );
                    wt.task_id = item.task_id;
                    wt.diff = item.diff;
                    self.worktrees.insert(item.name, wt);
                }
            }
        }

        // Deleted worktrees vanish from the board; their sessions are dealt
        // with by the orphan sweep.
        let gone: Vec<String> = self
            .worktrees
            .keys()
            .filter(|name| !seen.contains(*name))
            .cloned()
            .collect();
        for name in gone {
            self.drop_agent(&name);
            self.worktrees.remove(&name);
        }

        self.ui(UiMsg::WorktreesRefreshed);
        self.send(SupervisorEvent::ReconnectAgents);
    }

    fn on_sessions_listed(&mut self, result: Result<Vec<String>, SidecarError>) {
        let sessions = match result {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "list-sessions failed");
                return;
            }
        };
        let prefix = self.config.session_prefix().to_string();
        let names: Vec<String> = self.worktrees.keys().cloned().collect();

        for sess in sessions {
            if !sess.starts_with(&prefix) {
                continue;
            }
            let Some(worktree) =
                session::worktree_for_session(&sess, &prefix, names.iter().map(String::as_str))
            else {
                continue;
            };
            let session_file = {
                let wt = self.worktrees.get_mut(&worktree).expect("name from keys");
                if wt.agent.is_some() {
                    continue;
                }
                info!(session = %sess, worktree = %worktree, "adopting existing session");
                wt.agent = Some(Agent::new(wt.agent_kind, worktree.clone(), sess.clone()));
                wt.status = WorktreeStatus::Active;
                wt.agent_kind.session_file(&wt.path)
            };

            self.managed_sessions.insert(sess);
            if let (Some(watcher), Some(path)) = (self.watcher.as_mut(), session_file) {
                watcher.watch(&worktree, path);
            }
            self.ui(UiMsg::AgentStarted {
                worktree: worktree.clone(),
                reconnected: true,
            });
            self.reschedule(&worktree, PollContext::Initial);
        }
    }

    fn on_cleanup_orphans(&mut self) {
        let prefix = self.config.session_prefix().to_string();
        let names: Vec<String> = self.worktrees.keys().cloned().collect();

        let orphans: Vec<String> = self
            .managed_sessions
            .iter()
            .filter(|sess| {
                session::worktree_for_session(sess, &prefix, names.iter().map(String::as_str))
                    .is_none()
            })
            .cloned()
            .collect();

        for sess in orphans {
            // Only ever sessions from the managed set; everything else on
            // the server is out of bounds.
            self.managed_sessions.remove(&sess);
            self.engine.invalidate(&sess);
            info!(session = %sess, "killing orphaned session");
            tokio::spawn(async move {
                let _ = TmuxController::kill_session(&sess).await;
            });
        }
    }

    // ─── Plumbing ────────────────────────────────────────────────────────

    fn notify_attention(&self, worktree: &str, status: WorktreeStatus) {
        if self.focused || !self.config.global.notify_on_attention {
            return;
        }
        if !status.needs_attention() {
            return;
        }
        let body = match status {
            WorktreeStatus::Waiting => format!("{worktree} is waiting for input"),
            WorktreeStatus::Done => format!("{worktree} finished"),
            WorktreeStatus::Error => format!("{worktree} hit an error"),
            _ => return,
        };
        tokio::task::spawn_blocking(move || {
            let _ = notify_rust::Notification::new()
                .summary("sidecar")
                .body(&body)
                .show();
        });
    }

    fn notify(&self, level: NotifyLevel, message: String) {
        self.ui(UiMsg::Notify { level, message });
    }

    fn ui(&self, msg: UiMsg) {
        let _ = self.ui.send(msg);
    }

    fn send(&self, event: SupervisorEvent) {
        let _ = self.tx.send(event);
    }
}

/// Load the worktree list and its per-worktree artifacts off the loop.
async fn load_worktrees(
    repo_root: &std::path::Path,
    base: &str,
) -> Result<Vec<LoadedWorktree>, SidecarError> {
    let entries = git::list_worktrees(repo_root).await?;
    let mut loaded = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| entry.branch.clone());
        let task_id = task::read_task_link(&entry.path).await;
        let agent_kind = task::read_agent_link(&entry.path).await;
        let diff = git::diff_stats(&entry.path, base).await.unwrap_or_default();
        loaded.push(LoadedWorktree {
            name,
            path: entry.path,
            branch: entry.branch,
            task_id,
            agent_kind,
            diff,
        });
    }
    Ok(loaded)
}

/// Execute the selected cleanup actions. Every failure becomes a warning;
/// the worktree counts as merged no matter what.
async fn run_cleanup(
    repo_root: &std::path::Path,
    worktree_path: &std::path::Path,
    branch: &str,
    toggles: merge::CleanupToggles,
) -> Vec<String> {
    let mut warnings = Vec::new();

    if toggles.delete_remote_branch {
        if let Err(e) = git::delete_remote_branch(repo_root, branch).await {
            warnings.push(format!("delete remote branch: {e}"));
        }
    }
    if toggles.delete_worktree {
        if let Err(e) = git::remove_worktree(repo_root, worktree_path).await {
            warnings.push(format!("remove worktree: {e}"));
        } else if let Err(e) = git::prune_worktrees(repo_root).await {
            warnings.push(format!("prune worktrees: {e}"));
        }
    }
    if toggles.delete_local_branch {
        if let Err(e) = git::delete_local_branch(repo_root, branch).await {
            warnings.push(format!("delete local branch: {e}"));
        }
    }
    if toggles.pull_after_merge {
        if let Err(e) = git::pull(repo_root).await {
            warnings.push(format!("pull after merge: {e}"));
        }
    }

    warnings
}
