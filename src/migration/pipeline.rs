use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use super::{MigrationResult, MigrationService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    SecurityAnalysis,
    Backup,
    UserIsolation,
    StorageIsolation,
    Validation,
}

impl StepId {
    pub const ALL: [StepId; 5] = [
        StepId::SecurityAnalysis,
        StepId::Backup,
        StepId::UserIsolation,
        StepId::StorageIsolation,
        StepId::Validation,
    ];

    pub fn title(self) -> &'static str {
        match self {
            StepId::SecurityAnalysis => "Security analysis",
            StepId::Backup => "Backup",
            StepId::UserIsolation => "User isolation",
            StepId::StorageIsolation => "Storage isolation",
            StepId::Validation => "Validation",
        }
    }

    /// A failed critical step ends the run.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            StepId::SecurityAnalysis | StepId::UserIsolation | StepId::Validation
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub id: StepId,
    pub title: &'static str,
    pub critical: bool,
    pub status: StepStatus,
    pub details: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub items: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
}

impl PipelineReport {
    pub fn step(&self, id: StepId) -> Option<&StepReport> {
        self.steps.iter().find(|step| step.id == id)
    }
}

impl MigrationService {
    /// Run every step in order. Nothing is rolled back: a failed critical
    /// step only marks the steps after it as skipped.
    pub async fn run_pipeline(&self, backup_dir: &Path) -> PipelineReport {
        let started_at = Utc::now();
        let mut steps = Vec::with_capacity(StepId::ALL.len());
        let mut halted_by: Option<StepId> = None;

        for id in StepId::ALL {
            if let Some(failed) = halted_by {
                steps.push(StepReport {
                    id,
                    title: id.title(),
                    critical: id.is_critical(),
                    status: StepStatus::Skipped,
                    details: format!("Skipped because {} failed", failed.title()),
                    errors: Vec::new(),
                    warnings: Vec::new(),
                    items: 0,
                });
                continue;
            }

            tracing::info!("Migration step: {}", id.title());
            let result = self.run_step(id, backup_dir).await;
            let status = if result.success {
                StepStatus::Completed
            } else {
                StepStatus::Failed
            };

            if status == StepStatus::Failed {
                if id.is_critical() {
                    tracing::error!("Critical step {} failed: {}", id.title(), result.summary());
                    halted_by = Some(id);
                } else {
                    tracing::warn!("Step {} failed: {}", id.title(), result.summary());
                }
            }

            steps.push(StepReport {
                id,
                title: id.title(),
                critical: id.is_critical(),
                status,
                details: result.details,
                errors: result.errors,
                warnings: result.warnings,
                items: result.migrated_items,
            });
        }

        let success = halted_by.is_none()
            && steps.iter().all(|step| step.status == StepStatus::Completed);
        PipelineReport {
            success,
            started_at,
            finished_at: Utc::now(),
            steps,
        }
    }

    async fn run_step(&self, id: StepId, backup_dir: &Path) -> MigrationResult {
        match id {
            StepId::SecurityAnalysis => match self.analyze_security_issues().await {
                Ok(analysis) => MigrationResult {
                    success: true,
                    migrated_items: analysis.unsecured_data,
                    details: format!(
                        "Found {} unsecured collections with {} items",
                        analysis.global_collections.len(),
                        analysis.unsecured_data
                    ),
                    ..Default::default()
                },
                Err(e) => failed("Security analysis failed", e),
            },
            StepId::Backup => match self.snapshot_global_collections(backup_dir).await {
                Ok(summary) => MigrationResult {
                    success: true,
                    migrated_items: summary.documents,
                    details: format!(
                        "Backed up {} documents to {}",
                        summary.documents,
                        summary.path.display()
                    ),
                    ..Default::default()
                },
                Err(e) => failed("Backup failed", e),
            },
            StepId::UserIsolation => self.migrate_all_collections().await,
            StepId::StorageIsolation => self.migrate_storage().await,
            StepId::Validation => match self.validate_data_isolation().await {
                Ok(report) => MigrationResult {
                    success: report.success,
                    migrated_items: report.isolated_total,
                    errors: report.issues,
                    details: report.details,
                    ..Default::default()
                },
                Err(e) => failed("Validation failed", e),
            },
        }
    }
}

fn failed(details: &str, error: impl std::fmt::Display) -> MigrationResult {
    MigrationResult {
        success: false,
        errors: vec![error.to_string()],
        details: details.to_string(),
        ..Default::default()
    }
}
