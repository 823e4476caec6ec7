use std::process::Command;

use crate::cli::{BuildCommandArgs, BuildPolicy};
use crate::reconcile::RunSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    Failed { reason: String },
    Skipped,
}

impl BuildOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

pub trait BuildTrigger {
    /// Runs the site build. Failures are reported in the outcome, never raised.
    fn trigger(&self) -> BuildOutcome;
}

/// Runs a fixed external command in the current directory.
#[derive(Debug, Clone)]
pub struct CommandBuildTrigger {
    bin: String,
    args: Vec<String>,
}

impl CommandBuildTrigger {
    pub fn new(bin: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            bin: bin.into(),
            args,
        }
    }

    pub fn from_args(args: &BuildCommandArgs) -> Self {
        Self::new(args.build_bin.clone(), args.build_args.clone())
    }
}

impl BuildTrigger for CommandBuildTrigger {
    fn trigger(&self) -> BuildOutcome {
        tracing::info!(bin = %self.bin, args = ?self.args, "site build started");

        let output = match Command::new(&self.bin).args(&self.args).output() {
            Ok(output) => output,
            Err(err) => {
                tracing::error!(bin = %self.bin, %err, "spawn site build failed");
                return BuildOutcome::Failed {
                    reason: format!("spawn {}: {err}", self.bin),
                };
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            tracing::debug!(stdout = %stdout.trim_end(), "site build output");
        }

        if output.status.success() {
            if !stderr.trim().is_empty() {
                tracing::debug!(stderr = %stderr.trim_end(), "site build log");
            }
            tracing::info!("site build succeeded");
            BuildOutcome::Succeeded
        } else {
            tracing::error!(status = %output.status, stderr = %stderr.trim_end(), "site build failed");
            BuildOutcome::Failed {
                reason: format!("{} exited with {}", self.bin, output.status),
            }
        }
    }
}

pub fn should_build(policy: BuildPolicy, summary: &RunSummary) -> bool {
    match policy {
        BuildPolicy::Always => true,
        BuildPolicy::Never => false,
        BuildPolicy::OnChange => summary.changed(),
    }
}

/// Applies `policy` and runs `trigger` at most once.
pub fn run_for_summary(
    policy: BuildPolicy,
    summary: &RunSummary,
    trigger: &dyn BuildTrigger,
) -> BuildOutcome {
    if !should_build(policy, summary) {
        tracing::info!(?policy, "site build skipped");
        return BuildOutcome::Skipped;
    }
    trigger.trigger()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::reconcile::AddedArticle;

    struct CountingTrigger {
        calls: Cell<usize>,
    }

    impl BuildTrigger for CountingTrigger {
        fn trigger(&self) -> BuildOutcome {
            self.calls.set(self.calls.get() + 1);
            BuildOutcome::Succeeded
        }
    }

    fn changed_summary() -> RunSummary {
        RunSummary {
            added: vec![AddedArticle {
                url: "https://a.example/1".to_owned(),
                filename: "001.md".to_owned(),
                title: "One".to_owned(),
            }],
            ..RunSummary::default()
        }
    }

    #[test]
    fn policy_decides_whether_to_build() {
        let unchanged = RunSummary::default();
        let changed = changed_summary();

        assert!(!should_build(BuildPolicy::OnChange, &unchanged));
        assert!(should_build(BuildPolicy::OnChange, &changed));
        assert!(should_build(BuildPolicy::Always, &unchanged));
        assert!(!should_build(BuildPolicy::Never, &changed));
    }

    #[test]
    fn run_for_summary_triggers_once_or_not_at_all() {
        let trigger = CountingTrigger {
            calls: Cell::new(0),
        };

        let outcome = run_for_summary(BuildPolicy::OnChange, &RunSummary::default(), &trigger);
        assert_eq!(outcome, BuildOutcome::Skipped);
        assert_eq!(trigger.calls.get(), 0);

        let outcome = run_for_summary(BuildPolicy::OnChange, &changed_summary(), &trigger);
        assert_eq!(outcome, BuildOutcome::Succeeded);
        assert_eq!(trigger.calls.get(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn command_trigger_reports_exit_status() {
        let ok = CommandBuildTrigger::new("sh", vec!["-c".to_owned(), "echo built".to_owned()]);
        assert_eq!(ok.trigger(), BuildOutcome::Succeeded);

        let failing = CommandBuildTrigger::new("sh", vec!["-c".to_owned(), "exit 3".to_owned()]);
        assert!(failing.trigger().is_failure());

        let missing = CommandBuildTrigger::new("articlesync-no-such-binary", Vec::new());
        assert!(missing.trigger().is_failure());
    }
}
