use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::AppError;
use crate::models::plan::{ActionKind, OrganizationPlan, PlanAction, RequestContext};
use crate::scope_path;
use crate::services::audit_log::AuditLog;
use crate::services::file_service;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied(String),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub moved: usize,
    pub renamed: usize,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExecutionReport {
    pub fn applied(&self) -> usize {
        self.moved + self.renamed + self.created
    }

    fn record(&mut self, kind: ActionKind, outcome: &ActionOutcome) {
        match (outcome, kind) {
            (ActionOutcome::Applied(_), ActionKind::MoveFile) => self.moved += 1,
            (ActionOutcome::Applied(_), ActionKind::RenameFolder) => self.renamed += 1,
            (ActionOutcome::Applied(_), ActionKind::CreateFolder) => self.created += 1,
            (ActionOutcome::Skipped(_), _) => self.skipped += 1,
            (ActionOutcome::Failed(_), _) => self.failed += 1,
        }
    }
}

/// Applies `plan` to `directory` in order. Every outcome is written to the
/// audit log and a failed action never stops the ones after it.
pub fn execute_plan(
    plan: &OrganizationPlan,
    directory: &Path,
    context: &RequestContext,
    audit: &AuditLog,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    for action in &plan.actions {
        let outcome = execute_action(action, directory, context);
        match &outcome {
            ActionOutcome::Applied(message) | ActionOutcome::Skipped(message) => {
                tracing::debug!(dir = %directory.display(), action = %action.describe(), "{message}");
            }
            ActionOutcome::Failed(message) => {
                tracing::warn!(dir = %directory.display(), action = %action.describe(), "{message}");
            }
        }
        let message = match &outcome {
            ActionOutcome::Applied(m) | ActionOutcome::Skipped(m) | ActionOutcome::Failed(m) => m,
        };
        audit.append(message.clone());
        report.record(action.kind, &outcome);
    }
    report
}

pub fn execute_action(
    action: &PlanAction,
    directory: &Path,
    context: &RequestContext,
) -> ActionOutcome {
    if let Some(target) = context.target_file() {
        if !action.references(target) {
            return ActionOutcome::Skipped(format!(
                "Rejected {}: request was for '{target}'",
                action.describe()
            ));
        }
    }

    if let Err(err) = action.validate() {
        return ActionOutcome::Skipped(format!("Rejected {}: {err}", action.describe()));
    }

    let Some(source) = scope_path::resolve_within(directory, &action.source) else {
        return ActionOutcome::Skipped(format!(
            "Rejected {}: path leaves {}",
            action.describe(),
            directory.display()
        ));
    };

    let result = match action.kind {
        ActionKind::CreateFolder => create_folder(action, &source),
        ActionKind::MoveFile => move_file(action, directory, &source),
        ActionKind::RenameFolder => rename_folder(action, directory, &source),
    };
    match result {
        Ok(outcome) => outcome,
        Err(err) => ActionOutcome::Failed(format!("Failed to {}: {err}", action.describe())),
    }
}

fn create_folder(action: &PlanAction, path: &Path) -> Result<ActionOutcome, AppError> {
    if path.is_dir() {
        return Ok(ActionOutcome::Skipped(format!(
            "Folder {} already exists",
            action.source
        )));
    }
    file_service::create_dir(path)?;
    Ok(ActionOutcome::Applied(format!("Created folder {}", action.source)))
}

fn missing_source(action: &PlanAction) -> ActionOutcome {
    ActionOutcome::Skipped(format!(
        "Skipped {}: {} no longer exists",
        action.describe(),
        action.source
    ))
}

fn move_file(
    action: &PlanAction,
    directory: &Path,
    source: &Path,
) -> Result<ActionOutcome, AppError> {
    if !file_service::exists(source) {
        return Ok(missing_source(action));
    }

    let destination_rel = action.destination.as_deref().unwrap_or_default();
    let Some(destination) = scope_path::resolve_within(directory, destination_rel) else {
        return Ok(ActionOutcome::Skipped(format!(
            "Rejected {}: destination leaves {}",
            action.describe(),
            directory.display()
        )));
    };

    let final_path = if destination.is_dir() {
        let file_name = source
            .file_name()
            .ok_or_else(|| AppError::execution("move_file", "source has no file name"))?;
        destination.join(file_name)
    } else {
        destination
    };

    if final_path == source {
        return Ok(ActionOutcome::Skipped(format!(
            "Skipped {}: already in place",
            action.describe()
        )));
    }

    file_service::move_entry(source, &final_path)?;
    Ok(ActionOutcome::Applied(format!(
        "Moved {} -> {}",
        action.source,
        relative_display(directory, &final_path)
    )))
}

fn rename_folder(
    action: &PlanAction,
    directory: &Path,
    source: &Path,
) -> Result<ActionOutcome, AppError> {
    if !file_service::exists(source) {
        return Ok(missing_source(action));
    }
    if !source.is_dir() {
        return Ok(ActionOutcome::Skipped(format!(
            "Skipped {}: {} is not a folder",
            action.describe(),
            action.source
        )));
    }

    let new_name = scope_path::normalize_relative(action.new_name.as_deref().unwrap_or_default());
    if scope_path::base_name(&new_name) != new_name {
        return Ok(ActionOutcome::Skipped(format!(
            "Rejected {}: new name must be a single folder name",
            action.describe()
        )));
    }
    let parent_rel = Path::new(&action.source)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let target_rel = if parent_rel.is_empty() {
        new_name
    } else {
        format!("{parent_rel}/{new_name}")
    };
    let Some(target) = scope_path::resolve_within(directory, &target_rel) else {
        return Ok(ActionOutcome::Skipped(format!(
            "Rejected {}: new name leaves {}",
            action.describe(),
            directory.display()
        )));
    };

    if target == source {
        return Ok(ActionOutcome::Skipped(format!(
            "Skipped {}: name unchanged",
            action.describe()
        )));
    }

    file_service::move_entry(source, &target)?;
    Ok(ActionOutcome::Applied(format!(
        "Renamed {} -> {}",
        action.source,
        relative_display(directory, &target)
    )))
}

fn relative_display(directory: &Path, path: &Path) -> String {
    path.strip_prefix(directory)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}
