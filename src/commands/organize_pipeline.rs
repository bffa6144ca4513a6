use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

use crate::commands::janitor::Janitor;
use crate::config::OrganizerConfig;
use crate::error::AppError;
use crate::models::plan::{ActionKind, OrganizationPlan, RequestContext};
use crate::services::audit_log::AuditLog;
use crate::services::file_service;
use crate::services::oracle_service::{OracleGateway, OracleReply};
use crate::services::plan_executor::{self, ExecutionReport};
use crate::services::plan_parser::PlanParser;
use crate::services::prompt_service;
use crate::shell::safety;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub moved: usize,
    pub renamed: usize,
    pub created: usize,
    pub removed_dirs: usize,
    pub skipped: usize,
    pub failed_actions: usize,
    pub failed_files: usize,
    pub safety_breaks: usize,
    pub oracle_requests: usize,
    pub janitor_passes: usize,
}

impl RunSummary {
    pub fn absorb(&mut self, report: &ExecutionReport) {
        self.moved += report.moved;
        self.renamed += report.renamed;
        self.created += report.created;
        self.skipped += report.skipped;
        self.failed_actions += report.failed;
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.moved += other.moved;
        self.renamed += other.renamed;
        self.created += other.created;
        self.removed_dirs += other.removed_dirs;
        self.skipped += other.skipped;
        self.failed_actions += other.failed_actions;
        self.failed_files += other.failed_files;
        self.safety_breaks += other.safety_breaks;
        self.oracle_requests += other.oracle_requests;
        self.janitor_passes += other.janitor_passes;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunSummary),
    AlreadyRunning,
    Refused(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    Evaluate,
    Refine,
}

type BoxedStep<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

fn display_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string())
}

// ---------------------------------------------------------------------------
// Convergence controller
// ---------------------------------------------------------------------------

/// Drives one directory tree toward convergence. Cloning is cheap; the
/// janitor holds its own clone.
#[derive(Clone)]
pub struct Organizer {
    gateway: Arc<OracleGateway>,
    audit: Arc<AuditLog>,
    config: Arc<OrganizerConfig>,
}

impl Organizer {
    pub fn new(
        gateway: Arc<OracleGateway>,
        audit: Arc<AuditLog>,
        config: Arc<OrganizerConfig>,
    ) -> Self {
        Self {
            gateway,
            audit,
            config,
        }
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn config(&self) -> &OrganizerConfig {
        &self.config
    }

    /// Post-order: children first, then loose files, sibling evaluation and
    /// empty-folder collection. The child list is captured once on entry.
    pub fn organize<'a>(&'a self, dir: &'a Path, summary: &'a mut RunSummary) -> BoxedStep<'a> {
        Box::pin(async move {
            let children = match file_service::subdirectories(dir, self.config.include_hidden) {
                Ok(children) => children,
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "cannot list directory");
                    self.audit
                        .append(format!("Skipped {}: {err}", dir.display()));
                    return;
                }
            };

            for child in &children {
                self.organize(Path::new(&child.path), summary).await;
            }

            self.drain_loose_files(dir, summary).await;
            self.evaluate_siblings(dir, SweepMode::Evaluate, summary)
                .await;
            self.collect_empty_dirs(dir, summary);
        })
    }

    /// Second tree-wide sweep of the sibling evaluation step, post-order.
    pub fn refine_tree<'a>(&'a self, dir: &'a Path, summary: &'a mut RunSummary) -> BoxedStep<'a> {
        Box::pin(async move {
            let children = match file_service::subdirectories(dir, self.config.include_hidden) {
                Ok(children) => children,
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "cannot list directory");
                    return;
                }
            };
            for child in &children {
                self.refine_tree(Path::new(&child.path), summary).await;
            }
            self.evaluate_siblings(dir, SweepMode::Refine, summary).await;
        })
    }

    // -----------------------------------------------------------------------
    // Loose files
    // -----------------------------------------------------------------------

    async fn drain_loose_files(&self, dir: &Path, summary: &mut RunSummary) {
        let max_passes = self.config.max_loose_file_passes;
        let mut attempts: HashMap<String, usize> = HashMap::new();
        let mut abandoned: Vec<String> = Vec::new();
        let mut passes = 0usize;

        loop {
            let loose = match file_service::loose_files(dir, self.config.include_hidden) {
                Ok(loose) => loose,
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "cannot list loose files");
                    break;
                }
            };

            // Least-tried first, so one stubborn file cannot starve the rest.
            let Some(next) = loose
                .into_iter()
                .filter(|entry| !abandoned.contains(&entry.name))
                .min_by_key(|entry| attempts.get(&entry.name).copied().unwrap_or(0))
            else {
                break;
            };

            if passes >= max_passes {
                summary.safety_breaks += 1;
                tracing::warn!(dir = %dir.display(), passes, "loose-file pass cap reached");
                self.audit.append(format!(
                    "Safety break in {}: loose files remain after {passes} passes",
                    display_name(dir)
                ));
                break;
            }

            if passes > 0 && self.config.pacing_delay_ms > 0 {
                tokio::time::sleep(self.config.pacing_delay()).await;
            }
            passes += 1;
            *attempts.entry(next.name.clone()).or_insert(0) += 1;
            tracing::debug!(
                dir = %dir.display(),
                file = %next.name,
                size = ?next.size_bytes,
                extension = ?next.extension,
                pass = passes,
                "requesting single-file plan"
            );

            if !self.process_file(dir, &next.name, summary).await {
                summary.failed_files += 1;
                abandoned.push(next.name);
            }
        }
    }

    /// Request, parse and execute for one file, retried with a fixed delay.
    /// Returns `false` once every attempt failed.
    async fn process_file(&self, dir: &Path, name: &str, summary: &mut RunSummary) -> bool {
        let attempts = self.config.retry_attempts + 1;

        for attempt in 1..=attempts {
            match self.attempt_file(dir, name, summary).await {
                Ok(report) => {
                    summary.absorb(&report);
                    return true;
                }
                Err(err) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        file = name,
                        attempt,
                        error = %err,
                        "single-file request failed"
                    );
                    if attempt < attempts {
                        self.audit.append(format!(
                            "Attempt {attempt}/{attempts} for {name} failed: {err}; retrying"
                        ));
                        tokio::time::sleep(self.config.retry_delay()).await;
                    } else {
                        self.audit.append(format!(
                            "Giving up on {name} after {attempts} attempts: {err}"
                        ));
                    }
                }
            }
        }
        false
    }

    async fn attempt_file(
        &self,
        dir: &Path,
        name: &str,
        summary: &mut RunSummary,
    ) -> Result<ExecutionReport, AppError> {
        let folders: Vec<String> = file_service::subdirectories(dir, self.config.include_hidden)?
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        let prompt = prompt_service::build_file_prompt(name, &display_name(dir), &folders);

        summary.oracle_requests += 1;
        let plan = self.request_file_plan(&prompt, name).await?;
        if !plan.rationale.is_empty() {
            tracing::debug!(file = name, rationale = %plan.rationale, "plan rationale");
        }

        Ok(plan_executor::execute_plan(
            &plan,
            dir,
            &RequestContext::ForFile(name.to_string()),
            &self.audit,
        ))
    }

    /// Strict decode first; prose answers fall back to the free-text extractor
    /// for this one file. When neither yields a plan the strict error stands.
    async fn request_file_plan(
        &self,
        prompt: &str,
        name: &str,
    ) -> Result<OrganizationPlan, AppError> {
        let text = match self.gateway.respond_plan(prompt).await? {
            OracleReply::Plan(plan) => return Ok(plan),
            OracleReply::Text(text) => text,
        };

        match PlanParser::Strict.parse(&text) {
            Ok(plan) => Ok(plan),
            Err(strict_err) => {
                let fallback = PlanParser::FreeText {
                    candidates: vec![name.to_string()],
                }
                .parse(&text)?;
                if fallback.is_empty() {
                    return Err(strict_err.into());
                }
                tracing::info!(file = name, error = %strict_err, "using free-text plan extraction");
                Ok(fallback)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Sibling evaluation and garbage collection
    // -----------------------------------------------------------------------

    async fn evaluate_siblings(&self, dir: &Path, mode: SweepMode, summary: &mut RunSummary) {
        let folders: Vec<String> =
            match file_service::subdirectories(dir, self.config.include_hidden) {
                Ok(entries) => entries.into_iter().map(|entry| entry.name).collect(),
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), error = %err, "cannot list folders");
                    return;
                }
            };
        if folders.len() <= 1 {
            return;
        }

        let dir_name = display_name(dir);
        let prompt = match mode {
            SweepMode::Evaluate => prompt_service::build_evaluation_prompt(&dir_name, &folders),
            SweepMode::Refine => prompt_service::build_refinement_prompt(&dir_name, &folders),
        };

        summary.oracle_requests += 1;
        let mut plan = match self.gateway.respond_plan(&prompt).await {
            Ok(OracleReply::Plan(plan)) => plan,
            Ok(OracleReply::Text(text)) => match PlanParser::Strict.parse(&text) {
                Ok(plan) => plan,
                Err(err) => {
                    self.audit.append(format!(
                        "Could not read folder review for {dir_name}: {err}"
                    ));
                    return;
                }
            },
            Err(err) => {
                self.audit
                    .append(format!("Folder review for {dir_name} failed: {err}"));
                return;
            }
        };

        let dropped = plan.retain_kind(ActionKind::RenameFolder);
        if dropped > 0 {
            self.audit.append(format!(
                "Ignored {dropped} non-rename action(s) in folder review of {dir_name}"
            ));
        }

        let report =
            plan_executor::execute_plan(&plan, dir, &RequestContext::ForDirectory, &self.audit);
        summary.absorb(&report);
    }

    fn collect_empty_dirs(&self, dir: &Path, summary: &mut RunSummary) {
        // Hidden folders are left alone unless the run organizes them.
        let Ok(children) = file_service::subdirectories(dir, self.config.include_hidden) else {
            return;
        };
        for child in children {
            match file_service::remove_empty_dir(Path::new(&child.path)) {
                Ok(true) => {
                    summary.removed_dirs += 1;
                    self.audit
                        .append(format!("Removed empty folder {}", child.name));
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::debug!(dir = %child.path, error = %err, "could not remove folder");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Organizes `root` to convergence, then runs the refinement sweep. The
/// janitor runs alongside and is shut down before this returns.
pub async fn start_organization(
    state: &AppState,
    gateway: Arc<OracleGateway>,
    root: &str,
) -> RunOutcome {
    let root = root.trim();
    if root.is_empty() {
        state.audit.append("No folder selected");
        return RunOutcome::Refused("no folder selected".to_string());
    }
    if let Err(err) = safety::validate_not_protected(root) {
        state.audit.append(format!("Refused: {err}"));
        return RunOutcome::Refused(err.to_string());
    }
    let root_path = PathBuf::from(root);
    if !root_path.is_dir() {
        let reason = format!("{root} is not a directory");
        state.audit.append(format!("Refused: {reason}"));
        return RunOutcome::Refused(reason);
    }

    let Some(_run) = state.try_begin_run() else {
        state.audit.append("Organization already in progress");
        return RunOutcome::AlreadyRunning;
    };

    let organizer = Organizer::new(gateway, state.audit.clone(), state.config.clone());
    state
        .audit
        .append(format!("Starting organization of {}", root_path.display()));
    tracing::info!(root = %root_path.display(), "organization started");

    let janitor = Janitor::spawn(
        organizer.clone(),
        root_path.clone(),
        state.config.janitor_interval(),
    );

    let mut summary = RunSummary::default();
    organizer.organize(&root_path, &mut summary).await;

    if state.config.refinement_pass {
        state.audit.append("Refining folder names");
        organizer.refine_tree(&root_path, &mut summary).await;
    }

    let janitor_summary = janitor.shutdown().await;
    summary.merge(&janitor_summary);

    state.audit.append(format!(
        "Organization complete: {} moved, {} renamed, {} empty folders removed",
        summary.moved, summary.renamed, summary.removed_dirs
    ));
    tracing::info!(?summary, "organization finished");
    RunOutcome::Completed(summary)
}
