//! Automated remediation driven by configured strategies.

use std::sync::Arc;

use async_trait::async_trait;
use parityguard_core::{DriftAnalysis, DriftSeverity, ValidationIssue};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{AutoRemediationConfig, RemediationAction, RemediationStrategy};
use crate::errors::{MonitorError, Result};

/// Trigger matched by strategies that respond to drift.
pub const DRIFT_TRIGGER: &str = "drift";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    Skipped(String),
}

/// Runs one remediation action.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &RemediationAction, cancel: &CancellationToken) -> Result<ActionOutcome>;
}

/// Runs the action's `command` as a child process under its timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor;

#[async_trait]
impl ActionExecutor for CommandExecutor {
    async fn execute(&self, action: &RemediationAction, cancel: &CancellationToken) -> Result<ActionOutcome> {
        let Some((program, args)) = action.command.as_deref().and_then(|command| command.split_first()) else {
            tracing::info!(event = "remediation_action_skipped", action = action.kind.as_str());
            return Ok(ActionOutcome::Skipped(format!(
                "{} has no command configured",
                action.kind.as_str()
            )));
        };

        let params = serde_json::to_string(&action.params)?;
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .env("PARITYGUARD_ACTION", action.kind.as_str())
            .env("PARITYGUARD_ACTION_PARAMS", params)
            .kill_on_drop(true)
            .spawn()?;

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MonitorError::Core(parityguard_core::Error::Cancelled)),
            waited = tokio::time::timeout(action.timeout(), child.wait()) => match waited {
                Ok(status) => status?,
                Err(_) => {
                    return Err(MonitorError::Remediation(format!(
                        "{} timed out after {}s",
                        action.kind.as_str(),
                        action.timeout().as_secs()
                    )));
                }
            },
        };

        if status.success() {
            Ok(ActionOutcome::Completed)
        } else {
            Err(MonitorError::Remediation(format!(
                "{} exited with {status}",
                action.kind.as_str()
            )))
        }
    }
}

/// Outcome of running one strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemediationReport {
    pub strategy: String,
    pub attempts: u32,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct AutoRemediator {
    config: AutoRemediationConfig,
    executor: Arc<dyn ActionExecutor>,
}

impl AutoRemediator {
    pub fn new(config: AutoRemediationConfig) -> Self {
        Self::with_executor(config, Arc::new(CommandExecutor))
    }

    pub fn with_executor(config: AutoRemediationConfig, executor: Arc<dyn ActionExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// `min(max_attempts, max_retries + 1)`, at least one.
    pub fn attempt_limit(&self, strategy: &RemediationStrategy) -> u32 {
        strategy
            .max_attempts
            .max(1)
            .min(self.config.max_retries.saturating_add(1))
    }

    /// Run every strategy matching at least one issue, once each.
    pub async fn remediate_issues(
        &self,
        cancel: &CancellationToken,
        issues: &[ValidationIssue],
    ) -> Vec<RemediationReport> {
        let strategies: Vec<&RemediationStrategy> = self
            .config
            .strategies
            .iter()
            .filter(|strategy| issues.iter().any(|issue| matches_trigger(issue, &strategy.trigger)))
            .collect();
        self.run_all(cancel, strategies).await
    }

    /// Run the `drift` strategies when the analysis found any drift.
    pub async fn remediate_drift(&self, cancel: &CancellationToken, drift: &DriftAnalysis) -> Vec<RemediationReport> {
        if drift.severity == DriftSeverity::None {
            return Vec::new();
        }
        let strategies: Vec<&RemediationStrategy> = self
            .config
            .strategies
            .iter()
            .filter(|strategy| normalize_trigger(&strategy.trigger) == DRIFT_TRIGGER)
            .collect();
        self.run_all(cancel, strategies).await
    }

    async fn run_all(&self, cancel: &CancellationToken, strategies: Vec<&RemediationStrategy>) -> Vec<RemediationReport> {
        let mut reports = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            let report = self.execute(cancel, strategy).await;
            if !report.succeeded {
                tracing::warn!(
                    event = "remediation_failed",
                    strategy = %report.strategy,
                    attempts = report.attempts,
                    error = report.error.as_deref().unwrap_or("")
                );
            }
            reports.push(report);
        }
        reports
    }

    /// Run a strategy's actions in order, retrying the whole sequence.
    pub async fn execute(&self, cancel: &CancellationToken, strategy: &RemediationStrategy) -> RemediationReport {
        let limit = self.attempt_limit(strategy);
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < limit {
            if cancel.is_cancelled() {
                last_error = Some(parityguard_core::Error::Cancelled.to_string());
                break;
            }
            attempts += 1;

            match self.run_actions(cancel, strategy).await {
                Ok(()) => {
                    tracing::info!(event = "remediation_succeeded", strategy = %strategy.name, attempts);
                    return RemediationReport {
                        strategy: strategy.name.clone(),
                        attempts,
                        succeeded: true,
                        error: None,
                    };
                }
                Err(err) => {
                    tracing::warn!(
                        event = "remediation_attempt_failed",
                        strategy = %strategy.name,
                        attempt = attempts,
                        error = %err
                    );
                    last_error = Some(err.to_string());
                }
            }

            if attempts < limit {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.retry_interval()) => {}
                }
            }
        }

        RemediationReport {
            strategy: strategy.name.clone(),
            attempts,
            succeeded: false,
            error: last_error,
        }
    }

    async fn run_actions(&self, cancel: &CancellationToken, strategy: &RemediationStrategy) -> Result<()> {
        for action in &strategy.actions {
            match self.executor.execute(action, cancel).await? {
                ActionOutcome::Completed => {
                    tracing::info!(
                        event = "remediation_action_completed",
                        strategy = %strategy.name,
                        action = action.kind.as_str()
                    );
                }
                ActionOutcome::Skipped(reason) => {
                    tracing::info!(
                        event = "remediation_action_skipped",
                        strategy = %strategy.name,
                        reason = %reason
                    );
                }
            }
        }
        Ok(())
    }
}

/// Case-insensitive match of a trigger against an issue's type or severity.
pub fn matches_trigger(issue: &ValidationIssue, trigger: &str) -> bool {
    let trigger = normalize_trigger(trigger);
    trigger == normalize_trigger(issue.issue_type.as_str()) || trigger == normalize_trigger(issue.severity.as_str())
}

fn normalize_trigger(trigger: &str) -> String {
    trigger
        .trim()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_lowercase() })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use parityguard_core::{IssueSeverity, IssueType, Trend};

    use super::*;
    use crate::config::ActionKind;

    struct CountingExecutor {
        calls: AtomicU32,
        succeed_on: Option<u32>,
    }

    #[async_trait]
    impl ActionExecutor for CountingExecutor {
        async fn execute(&self, _action: &RemediationAction, _cancel: &CancellationToken) -> Result<ActionOutcome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.succeed_on {
                Some(n) if call >= n => Ok(ActionOutcome::Completed),
                _ => Err(MonitorError::Remediation(format!("attempt {call} failed"))),
            }
        }
    }

    fn strategy(trigger: &str, max_attempts: u32) -> RemediationStrategy {
        RemediationStrategy {
            name: format!("{trigger}-fix"),
            trigger: trigger.to_string(),
            actions: vec![RemediationAction {
                kind: ActionKind::RestartCollector,
                params: Default::default(),
                command: None,
                timeout_secs: 5,
            }],
            max_attempts,
        }
    }

    fn remediator(max_retries: u32, strategies: Vec<RemediationStrategy>, executor: Arc<CountingExecutor>) -> AutoRemediator {
        AutoRemediator::with_executor(
            AutoRemediationConfig {
                enabled: true,
                max_retries,
                retry_interval_secs: 0,
                strategies,
            },
            executor,
        )
    }

    fn counting(succeed_on: Option<u32>) -> Arc<CountingExecutor> {
        Arc::new(CountingExecutor {
            calls: AtomicU32::new(0),
            succeed_on,
        })
    }

    #[test]
    fn triggers_match_type_or_severity_in_any_case() {
        let issue = ValidationIssue::new(IssueType::MissingData, IssueSeverity::Critical, "gone");
        assert!(matches_trigger(&issue, "MISSING_DATA"));
        assert!(matches_trigger(&issue, "missing_data"));
        assert!(matches_trigger(&issue, "missing-data"));
        assert!(matches_trigger(&issue, "Critical"));
        assert!(!matches_trigger(&issue, "value_mismatch"));
    }

    #[tokio::test]
    async fn attempts_are_bounded_by_retries() {
        let executor = counting(None);
        let remediator = remediator(2, vec![strategy("missing_data", 10)], executor.clone());
        let report = remediator
            .execute(&CancellationToken::new(), &remediator.config.strategies[0])
            .await;
        assert!(!report.succeeded);
        assert_eq!(report.attempts, 3);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.error.as_deref(), Some("remediation failed: attempt 3 failed"));
    }

    #[tokio::test]
    async fn attempts_are_bounded_by_max_attempts() {
        let executor = counting(None);
        let remediator = remediator(5, vec![strategy("missing_data", 2)], executor.clone());
        let report = remediator
            .execute(&CancellationToken::new(), &remediator.config.strategies[0])
            .await;
        assert_eq!(report.attempts, 2);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stops_retrying_after_success() {
        let executor = counting(Some(2));
        let remediator = remediator(5, vec![strategy("critical", 5)], executor.clone());
        let issues = vec![ValidationIssue::new(IssueType::MissingData, IssueSeverity::Critical, "gone")];
        let reports = remediator.remediate_issues(&CancellationToken::new(), &issues).await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].succeeded);
        assert_eq!(reports[0].attempts, 2);
    }

    #[tokio::test]
    async fn cancelled_token_prevents_attempts() {
        let executor = counting(Some(1));
        let remediator = remediator(3, vec![strategy("missing_data", 3)], executor.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = remediator.execute(&cancel, &remediator.config.strategies[0]).await;
        assert_eq!(report.attempts, 0);
        assert!(!report.succeeded);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn drift_strategies_run_only_on_drift() {
        let executor = counting(Some(1));
        let remediator = remediator(
            1,
            vec![strategy("drift", 1), strategy("missing_data", 1)],
            executor.clone(),
        );
        let mut analysis = DriftAnalysis {
            timestamp: Utc::now(),
            severity: DriftSeverity::None,
            affected_metrics: Vec::new(),
            recommendations: Vec::new(),
            trend_direction: Trend::Stable,
        };
        assert!(remediator.remediate_drift(&CancellationToken::new(), &analysis).await.is_empty());

        analysis.severity = DriftSeverity::Critical;
        let reports = remediator.remediate_drift(&CancellationToken::new(), &analysis).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].strategy, "drift-fix");
    }

    #[tokio::test]
    async fn command_executor_skips_actions_without_command() {
        let action = RemediationAction {
            kind: ActionKind::ClearCache,
            params: Default::default(),
            command: None,
            timeout_secs: 1,
        };
        let outcome = CommandExecutor
            .execute(&action, &CancellationToken::new())
            .await
            .expect("outcome");
        assert!(matches!(outcome, ActionOutcome::Skipped(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_executor_reports_exit_status() {
        let ok = RemediationAction {
            kind: ActionKind::ClearCache,
            params: Default::default(),
            command: Some(vec!["true".to_string()]),
            timeout_secs: 5,
        };
        let failing = RemediationAction {
            command: Some(vec!["false".to_string()]),
            ..ok.clone()
        };
        let cancel = CancellationToken::new();
        assert_eq!(CommandExecutor.execute(&ok, &cancel).await.expect("ok"), ActionOutcome::Completed);
        assert!(matches!(
            CommandExecutor.execute(&failing, &cancel).await,
            Err(MonitorError::Remediation(_))
        ));
    }
}
