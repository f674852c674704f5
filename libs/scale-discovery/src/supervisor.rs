use crate::baseline::BaselineOutcome;
use crate::types::{clamp_pct, step_snapshot, InteractiveOutcome};
use crate::{baseline, capture, interactive, matching, synthesis};
use chrono::Utc;
use dashmap::DashMap;
use scale_errors::DiscoveryError;
use scale_model::{
    DiscoveryPhase, DiscoverySession, DiscoveryStep, Frame, SessionConfig, StabilityReport, StepStatus,
};
use scale_stability::StabilityMonitor;
use scale_templates::TemplateStore;
use scale_transport::Transport;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{DiscoveryResult, InteractiveGuidance, ProgressEvent, SessionStatus};

const IDLE_SWEEP_AGE: StdDuration = StdDuration::from_secs(3600);
const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(300);

struct SessionHandle {
    session: Mutex<DiscoverySession>,
    transport: Arc<dyn Transport>,
    stability: Arc<StabilityMonitor>,
    cancel: CancellationToken,
    /// Lines and raw bytes accumulated across interactive steps, kept
    /// separate from `DiscoverySession` since they aren't part of its
    /// serializable snapshot.
    interactive_lines: Mutex<Vec<String>>,
    interactive_stable_lines: Mutex<Vec<String>>,
    interactive_raw: Mutex<Vec<u8>>,
}

/// Orchestrates discovery sessions: baseline capture, template matching,
/// interactive ground-truth scoring, synthesis, and their three event
/// streams (progress, results, forwarded stability reports).
pub struct Supervisor {
    sessions: DashMap<String, Arc<SessionHandle>>,
    templates: Arc<TemplateStore>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    results_tx: broadcast::Sender<DiscoveryResult>,
    stability_tx: broadcast::Sender<(String, StabilityReport)>,
}

impl Supervisor {
    pub fn new(templates: Arc<TemplateStore>) -> Arc<Self> {
        let (progress_tx, _) = broadcast::channel(256);
        let (results_tx, _) = broadcast::channel(64);
        let (stability_tx, _) = broadcast::channel(256);
        let supervisor = Arc::new(Self {
            sessions: DashMap::new(),
            templates,
            progress_tx,
            results_tx,
            stability_tx,
        });
        supervisor.clone().spawn_sweeper();
        supervisor
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    pub fn subscribe_results(&self) -> broadcast::Receiver<DiscoveryResult> {
        self.results_tx.subscribe()
    }

    pub fn subscribe_stability(&self) -> broadcast::Receiver<(String, StabilityReport)> {
        self.stability_tx.subscribe()
    }

    /// Ids of every session currently tracked, terminal or not. Used by
    /// callers that need to cancel everything on shutdown.
    pub fn active_session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Starts a new discovery session against `transport`: spawns baseline
    /// capture and Phase A template matching in the background, returning
    /// the session id immediately.
    pub async fn start(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Result<String, DiscoveryError> {
        let session_id = new_session_id();
        let cancel = CancellationToken::new();
        let stability = StabilityMonitor::new(Default::default());

        let session = DiscoverySession {
            session_id: session_id.clone(),
            phase: DiscoveryPhase::Initializing,
            started_at: Utc::now(),
            transport_ref: session_id.clone(),
            config,
            captured_frames: Vec::new(),
            template_results: Vec::new(),
            steps: Vec::new(),
            best_template: None,
            best_confidence: 0.0,
            cancelled: false,
        };

        let handle = Arc::new(SessionHandle {
            session: Mutex::new(session),
            transport: transport.clone(),
            stability: stability.clone(),
            cancel: cancel.clone(),
            interactive_lines: Mutex::new(Vec::new()),
            interactive_stable_lines: Mutex::new(Vec::new()),
            interactive_raw: Mutex::new(Vec::new()),
        });
        self.sessions.insert(session_id.clone(), handle.clone());

        transport.clone().start(cancel.clone()).await;
        stability.clone().spawn_periodic(cancel.clone());
        self.clone().spawn_stability_forwarder(session_id.clone(), handle.clone());
        self.clone().spawn_capture_and_match(session_id.clone(), handle);

        Ok(session_id)
    }

    fn spawn_stability_forwarder(self: Arc<Self>, session_id: String, handle: Arc<SessionHandle>) {
        let mut rx = handle.stability.subscribe();
        let cancel = handle.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let report = rx.borrow_and_update().clone();
                        let _ = self.stability_tx.send((session_id.clone(), report));
                    }
                }
            }
        });
    }

    fn spawn_capture_and_match(self: Arc<Self>, session_id: String, handle: Arc<SessionHandle>) {
        tokio::spawn(async move {
            self.set_phase(&handle, DiscoveryPhase::CapturingData).await;
            self.emit_progress(&session_id, DiscoveryPhase::CapturingData, 10, "capturing baseline").await;

            let config = handle.session.lock().await.config.clone();
            let outcome = baseline::capture_baseline(
                handle.transport.as_ref(),
                &handle.stability,
                &config,
                &handle.cancel,
            )
            .await;

            let frames = match outcome {
                BaselineOutcome::Disconnected => {
                    {
                        let mut session = handle.session.lock().await;
                        session.captured_frames.clear();
                    }
                    self.set_phase(&handle, DiscoveryPhase::InteractiveDiscovery).await;
                    self.emit_progress(
                        &session_id,
                        DiscoveryPhase::InteractiveDiscovery,
                        60,
                        "link disconnected during baseline capture, awaiting operator guidance",
                    )
                    .await;
                    return;
                }
                BaselineOutcome::Captured(frames) if frames.is_empty() => {
                    self.set_phase(&handle, DiscoveryPhase::Failed).await;
                    self.emit_progress(&session_id, DiscoveryPhase::Failed, 100, "no frames captured during baseline window").await;
                    self.emit_result(&session_id, &handle, false, None, 0.0, 0).await;
                    return;
                }
                BaselineOutcome::Captured(frames) => frames,
            };

            let captured_frames = frames.len();
            {
                let mut session = handle.session.lock().await;
                session.captured_frames = frames.clone();
            }

            self.set_phase(&handle, DiscoveryPhase::TestingTemplates).await;
            self.emit_progress(&session_id, DiscoveryPhase::TestingTemplates, 40, "testing built-in templates").await;

            let candidates = self.templates.list();
            let tested_templates = candidates.len();
            let mut results = Vec::with_capacity(candidates.len());
            let mut best: Option<(scale_model::Template, f64)> = None;
            for template in &candidates {
                let result = matching::test_template(template, &frames);
                if best.as_ref().map(|(_, c)| result.confidence > *c).unwrap_or(true) {
                    best = Some((template.clone(), result.confidence));
                }
                results.push(result);
            }

            let confidence_threshold = handle.session.lock().await.config.confidence_threshold;
            {
                let mut session = handle.session.lock().await;
                session.template_results = results;
                if let Some((ref template, confidence)) = best {
                    session.best_template = Some(template.clone());
                    session.best_confidence = confidence;
                }
            }

            match &best {
                Some((template, confidence)) if *confidence >= confidence_threshold => {
                    self.templates.bump_usage(&template.template_name, true).ok();
                    self.set_phase(&handle, DiscoveryPhase::Completed).await;
                    self.emit_progress(&session_id, DiscoveryPhase::Completed, 100, "matched a built-in template").await;
                    self.emit_result(&session_id, &handle, true, Some(template.clone()), *confidence, captured_frames).await;
                }
                _ => {
                    self.set_phase(&handle, DiscoveryPhase::InteractiveDiscovery).await;
                    self.emit_progress(
                        &session_id,
                        DiscoveryPhase::InteractiveDiscovery,
                        60,
                        "no built-in template matched confidently, awaiting operator guidance",
                    )
                    .await;
                    let _ = tested_templates;
                }
            }
        });
    }

    /// Runs one batch of operator-guided steps, scoring each against the
    /// expected weight and accumulating lines for eventual synthesis.
    pub async fn continue_interactive(
        self: &Arc<Self>,
        session_id: &str,
        guidance: InteractiveGuidance,
    ) -> Result<InteractiveOutcome, DiscoveryError> {
        let handle = self.get_handle(session_id)?;
        {
            let session = handle.session.lock().await;
            if session.phase != DiscoveryPhase::InteractiveDiscovery {
                return Err(DiscoveryError::InvalidPhase(format!("{:?}", session.phase)));
            }
        }

        let mut step_scores = Vec::with_capacity(guidance.steps.len());
        for guide in &guidance.steps {
            let (lines, raw) =
                capture::capture_step(handle.transport.as_ref(), guide.capture_time_ms, &handle.cancel).await;
            let score = interactive::score_step(&lines, guide.expected_weight, guidance.minimum_steps);

            {
                let mut all = handle.interactive_lines.lock().await;
                all.extend(lines.iter().cloned());
            }
            if score.completed {
                let mut stable = handle.interactive_stable_lines.lock().await;
                stable.extend(lines.iter().cloned());
            }
            {
                let mut raw_buf = handle.interactive_raw.lock().await;
                raw_buf.extend_from_slice(&raw);
            }

            let step_number = {
                let mut session = handle.session.lock().await;
                let step_number = session.steps.len() as u32 + 1;
                let step = DiscoveryStep {
                    step_number,
                    action: guide.action.clone(),
                    expected_value: guide.expected_weight,
                    instructions: guide.instructions.clone(),
                    captured_data: lines,
                    analysis: score.clone().into_analysis(),
                    status: if score.completed { StepStatus::Completed } else { StepStatus::Failed },
                };
                debug!(step = step_snapshot(&step), "interactive step scored");
                session.steps.push(step);
                step_number
            };
            self.emit_progress(
                session_id,
                DiscoveryPhase::InteractiveDiscovery,
                clamp_pct(60 + (step_number as u8).min(30)),
                &format!("step {step_number} scored {:.1}", score.score),
            )
            .await;
            step_scores.push(score.score);
        }

        let steps_so_far = handle.session.lock().await.steps.len();
        let minimum_steps = handle.session.lock().await.config.minimum_steps;
        if steps_so_far < minimum_steps {
            return Ok(InteractiveOutcome::NeedsMoreSteps(self.status_snapshot(&handle).await));
        }

        let overall_correlation = {
            let session = handle.session.lock().await;
            let scores: Vec<f64> = session.steps.iter().map(|s| s.analysis.confidence).collect();
            mean(&scores)
        };
        let action = interactive::recommended_action(overall_correlation);

        if action == "Collect more data" || action == "Review setup" {
            return Ok(InteractiveOutcome::NeedsMoreSteps(self.status_snapshot(&handle).await));
        }

        self.set_phase(&handle, DiscoveryPhase::GeneratingTemplate).await;
        self.emit_progress(session_id, DiscoveryPhase::GeneratingTemplate, 90, "synthesizing template from ground truth").await;

        let all_lines = handle.interactive_lines.lock().await.clone();
        let stable_lines = handle.interactive_stable_lines.lock().await.clone();
        let raw = handle.interactive_raw.lock().await.clone();

        let candidate = match synthesis::synthesize_template(&all_lines, &stable_lines, &raw, overall_correlation) {
            Ok(template) => template,
            Err(err) => {
                warn!(%err, "template synthesis failed after interactive discovery");
                self.set_phase(&handle, DiscoveryPhase::Failed).await;
                self.emit_progress(session_id, DiscoveryPhase::Failed, 100, "template synthesis failed").await;
                return Err(err);
            }
        };

        // Re-test the synthesized candidate to confirm it actually explains
        // the captured ground truth before accepting it.
        if !synthesis::is_representative(&all_lines) {
            let err = DiscoveryError::TemplateSynthesisFailed(
                "captured lines are too inconsistent to be representative".to_string(),
            );
            warn!(%err, "synthesized template rejected");
            self.set_phase(&handle, DiscoveryPhase::Failed).await;
            self.emit_progress(session_id, DiscoveryPhase::Failed, 100, "template synthesis failed").await;
            return Err(err);
        }

        let confirmation_frames: Vec<Frame> = all_lines
            .iter()
            .map(|line| Frame::new(line.as_bytes().to_vec(), true))
            .collect();
        let confirmation = matching::test_template(&candidate, &confirmation_frames);
        if confirmation.confidence < candidate.confidence_threshold {
            let err = DiscoveryError::TemplateSynthesisFailed(format!(
                "synthesized template failed re-test: confidence {:.1} below threshold {:.1}",
                confirmation.confidence, candidate.confidence_threshold
            ));
            warn!(%err, "synthesized template failed confirmation pass");
            self.set_phase(&handle, DiscoveryPhase::Failed).await;
            self.emit_progress(session_id, DiscoveryPhase::Failed, 100, "template synthesis failed").await;
            return Err(err);
        }

        let interactive_steps = { handle.session.lock().await.steps.len() };
        {
            let mut session = handle.session.lock().await;
            session.best_template = Some(candidate.clone());
            session.best_confidence = overall_correlation;
        }
        self.set_phase(&handle, DiscoveryPhase::Completed).await;
        self.emit_progress(session_id, DiscoveryPhase::Completed, 100, "template synthesized and confirmed").await;
        let captured_frames = handle.session.lock().await.captured_frames.len();
        let result = self
            .build_result(&handle, true, Some(candidate), overall_correlation, captured_frames, interactive_steps)
            .await;
        let _ = self.results_tx.send(result.clone());
        Ok(InteractiveOutcome::Ready(result))
    }

    /// Finalizes a session early, optionally persisting its current best
    /// template into the template store.
    pub async fn complete(
        self: &Arc<Self>,
        session_id: &str,
        save_template: bool,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        let handle = self.get_handle(session_id)?;
        let (best_template, best_confidence, captured_frames, interactive_steps) = {
            let session = handle.session.lock().await;
            if session.phase.is_terminal() {
                return Err(DiscoveryError::AlreadyCompleted);
            }
            (
                session.best_template.clone(),
                session.best_confidence,
                session.captured_frames.len(),
                session.steps.len(),
            )
        };

        if save_template {
            if let Some(template) = &best_template {
                if let Err(err) = self.templates.save(template.clone()) {
                    warn!(%err, "failed to persist synthesized template");
                }
            }
        }

        self.set_phase(&handle, DiscoveryPhase::Completed).await;
        handle.cancel.cancel();
        let result = self
            .build_result(&handle, best_template.is_some(), best_template, best_confidence, captured_frames, interactive_steps)
            .await;
        let _ = self.results_tx.send(result.clone());
        self.emit_progress(session_id, DiscoveryPhase::Completed, 100, "session completed by operator").await;
        Ok(result)
    }

    pub async fn cancel(self: &Arc<Self>, session_id: &str) -> Result<(), DiscoveryError> {
        let handle = self.get_handle(session_id)?;
        {
            let mut session = handle.session.lock().await;
            if session.phase.is_terminal() {
                return Ok(());
            }
            session.cancelled = true;
            session.phase = DiscoveryPhase::Cancelled;
        }
        handle.cancel.cancel();
        self.emit_progress(session_id, DiscoveryPhase::Cancelled, 100, "session cancelled").await;
        info!(session_id, "discovery session cancelled");
        Ok(())
    }

    pub async fn get_status(&self, session_id: &str) -> Result<SessionStatus, DiscoveryError> {
        let handle = self.get_handle(session_id)?;
        Ok(self.status_snapshot(&handle).await)
    }

    async fn status_snapshot(&self, handle: &Arc<SessionHandle>) -> SessionStatus {
        let session = handle.session.lock().await;
        SessionStatus {
            phase: session.phase,
            active: !session.phase.is_terminal(),
            duration: (Utc::now() - session.started_at)
                .to_std()
                .unwrap_or_default(),
            captured_frames: session.captured_frames.len(),
            best_confidence: session.best_confidence,
            current_step: session.steps.len(),
            tested_templates: session.template_results.len(),
        }
    }

    async fn build_result(
        &self,
        handle: &Arc<SessionHandle>,
        success: bool,
        best_template: Option<scale_model::Template>,
        confidence: f64,
        captured_frames: usize,
        interactive_steps: usize,
    ) -> DiscoveryResult {
        let session = handle.session.lock().await;
        DiscoveryResult {
            session_id: session.session_id.clone(),
            success,
            best_template,
            confidence,
            duration: (Utc::now() - session.started_at).to_std().unwrap_or_default(),
            captured_frames,
            tested_templates: session.template_results.len(),
            interactive_steps,
        }
    }

    async fn emit_result(
        &self,
        session_id: &str,
        handle: &Arc<SessionHandle>,
        success: bool,
        best_template: Option<scale_model::Template>,
        confidence: f64,
        captured_frames: usize,
    ) {
        let interactive_steps = handle.session.lock().await.steps.len();
        let result = self
            .build_result(handle, success, best_template, confidence, captured_frames, interactive_steps)
            .await;
        let _ = self.results_tx.send(result);
        let _ = session_id;
    }

    async fn set_phase(&self, handle: &Arc<SessionHandle>, phase: DiscoveryPhase) {
        let mut session = handle.session.lock().await;
        if session.phase.can_transition_to(phase) || phase == session.phase {
            session.phase = phase;
        } else {
            warn!(from = ?session.phase, to = ?phase, "rejected invalid discovery phase transition");
        }
    }

    async fn emit_progress(&self, session_id: &str, phase: DiscoveryPhase, pct: u8, message: &str) {
        let event = ProgressEvent {
            session_id: session_id.to_string(),
            phase,
            progress_pct: clamp_pct(pct),
            message: message.to_string(),
            ts: Utc::now(),
        };
        let _ = self.progress_tx.send(event);
    }

    fn get_handle(&self, session_id: &str) -> Result<Arc<SessionHandle>, DiscoveryError> {
        self.sessions
            .get(session_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| DiscoveryError::NotFound(session_id.to_string()))
    }

    fn spawn_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let mut stale = Vec::new();
                for entry in self.sessions.iter() {
                    let session = entry.value().session.lock().await;
                    let age = (Utc::now() - session.started_at).to_std().unwrap_or_default();
                    if age >= IDLE_SWEEP_AGE || (session.phase.is_terminal() && age >= SWEEP_INTERVAL) {
                        stale.push(entry.key().clone());
                    }
                }
                for session_id in stale {
                    if let Some((_, handle)) = self.sessions.remove(&session_id) {
                        handle.cancel.cancel();
                        debug!(session_id, "swept idle discovery session");
                    }
                }
            }
        });
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn new_session_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
