//! Sequential step execution against a [`Shell`]
//!
//! The runner walks a [`Manifest`] in order. A step whose check already
//! holds is skipped; a failing step stops the run unless it is marked
//! best-effort, in which case the failure is logged and recorded.

use tracing::{debug, info, warn};

use crate::error::RunError;
use crate::manifest::Manifest;
use crate::shell::Shell;
use crate::steps::StepResult;

/// Receives step lifecycle events, e.g. to drive a spinner
pub trait Progress {
    /// A step is about to be checked and applied
    fn start(&mut self, index: usize, total: usize, description: &str);

    /// A step finished with `result`
    fn finish(&mut self, index: usize, total: usize, description: &str, result: &StepResult);
}

/// Progress sink that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&mut self, _index: usize, _total: usize, _description: &str) {}

    fn finish(&mut self, _index: usize, _total: usize, _description: &str, _result: &StepResult) {
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// 1-based position in the manifest
    pub index: usize,
    pub description: String,
    pub result: StepResult,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    /// Steps that changed the host
    pub fn applied(&self) -> usize {
        self.count(|r| *r == StepResult::Applied)
    }

    /// Steps whose check already held
    pub fn skipped(&self) -> usize {
        self.count(|r| *r == StepResult::Skipped)
    }

    /// Best-effort steps that failed
    pub fn warnings(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps
            .iter()
            .filter(|s| matches!(s.result, StepResult::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&StepResult) -> bool) -> usize {
        self.steps.iter().filter(|s| pred(&s.result)).count()
    }
}

/// Applies manifests through a shell
pub struct Runner<S: Shell> {
    shell: S,
}

impl<S: Shell> Runner<S> {
    pub fn new(shell: S) -> Self {
        Self { shell }
    }

    /// Give back the shell, e.g. to inspect a recording
    pub fn into_shell(self) -> S {
        self.shell
    }

    /// Run every step in order, halting at the first fatal failure
    pub fn run(
        &mut self,
        manifest: &Manifest,
        progress: &mut dyn Progress,
    ) -> Result<RunReport, RunError> {
        let total = manifest.steps.len();
        let mut report = RunReport::default();

        for (i, step) in manifest.steps.iter().enumerate() {
            let index = i + 1;
            let description = step.description();
            progress.start(index, total, description);
            debug!(step = index, total, "{description}");

            let satisfied = match step.check_command() {
                Some(check) => self.shell.succeeds(&check).map_err(|source| RunError {
                    index,
                    step: description.to_string(),
                    source,
                })?,
                None => false,
            };

            let result = if satisfied {
                debug!(step = index, "Already satisfied, skipping");
                StepResult::Skipped
            } else {
                match step.run(&mut self.shell) {
                    Ok(()) => StepResult::Applied,
                    Err(err) if step.best_effort() => {
                        warn!(step = index, "{description} failed, continuing: {err}");
                        StepResult::Failed(err.to_string())
                    }
                    Err(source) => {
                        progress.finish(
                            index,
                            total,
                            description,
                            &StepResult::Failed(source.to_string()),
                        );
                        return Err(RunError {
                            index,
                            step: description.to_string(),
                            source,
                        });
                    }
                }
            };

            progress.finish(index, total, description, &result);
            report.steps.push(StepRecord {
                index,
                description: description.to_string(),
                result,
            });
        }

        info!(
            applied = report.applied(),
            skipped = report.skipped(),
            "Run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::fake::RecordingShell;
    use crate::steps::RunCommand;

    fn manifest() -> Manifest {
        Manifest::new()
            .with_step(RunCommand::new("First", "echo one").unless("check-one"))
            .with_step(RunCommand::new("Optional", "try-selinux").best_effort())
            .with_step(RunCommand::new("Third", "echo three"))
    }

    #[derive(Default)]
    struct Events(Vec<String>);

    impl Progress for Events {
        fn start(&mut self, index: usize, total: usize, description: &str) {
            self.0.push(format!("start {index}/{total} {description}"));
        }

        fn finish(&mut self, index: usize, _total: usize, _description: &str, result: &StepResult) {
            self.0.push(format!("finish {index} {result:?}"));
        }
    }

    #[test]
    fn satisfied_checks_skip_steps() {
        let shell = RecordingShell::default().satisfied("check-one");
        let mut runner = Runner::new(shell);

        let report = runner.run(&manifest(), &mut NoProgress).unwrap();

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.applied(), 2);
        let shell = runner.into_shell();
        assert_eq!(shell.checks, vec!["check-one"]);
        assert_eq!(shell.commands, vec!["try-selinux", "echo three"]);
    }

    #[test]
    fn best_effort_failure_continues() {
        let shell = RecordingShell::default().failing("try-selinux");
        let mut runner = Runner::new(shell);
        let mut events = Events::default();

        let report = runner.run(&manifest(), &mut events).unwrap();

        assert_eq!(report.steps.len(), 3);
        let warnings: Vec<_> = report.warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].index, 2);
        assert_eq!(events.0[0], "start 1/3 First");
        assert!(events.0[3].starts_with("finish 2 Failed("));
        assert_eq!(runner.into_shell().commands.last().unwrap(), "echo three");
    }

    #[test]
    fn fatal_failure_reports_step() {
        let shell = RecordingShell::default().failing("echo one");
        let mut runner = Runner::new(shell);

        let err = runner.run(&manifest(), &mut NoProgress).unwrap_err();

        assert_eq!(err.index, 1);
        assert_eq!(err.step, "First");
        assert!(err.to_string().starts_with("Step 1 'First' failed"));
        assert_eq!(
            runner.into_shell().commands,
            vec!["check-one || { echo one; }"]
        );
    }
}
