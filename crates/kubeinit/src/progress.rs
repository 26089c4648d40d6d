//! Terminal progress display for step runs

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kubeinit_provision::{Progress, StepResult};

/// One spinner per running step, replaced by a status line when it ends
#[derive(Default)]
pub struct SpinnerProgress {
    current: Option<ProgressBar>,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(&mut self) {
        if let Some(spinner) = self.current.take() {
            spinner.finish_and_clear();
        }
    }
}

impl Progress for SpinnerProgress {
    fn start(&mut self, index: usize, total: usize, description: &str) {
        self.clear();

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template(&format!("{{spinner:.cyan}} [{index}/{total}] {{msg}}"))
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(description.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.current = Some(spinner);
    }

    fn finish(&mut self, index: usize, total: usize, description: &str, result: &StepResult) {
        self.clear();

        match result {
            StepResult::Applied => {
                println!("[{index}/{total}] {} {description}", style("v").green());
            }
            StepResult::Skipped => {
                println!(
                    "[{index}/{total}] {} {description} {}",
                    style("o").yellow(),
                    style("(skipped)").dim()
                );
            }
            StepResult::Failed(reason) => {
                println!("[{index}/{total}] {} {description}", style("x").red());
                if let Some(line) = reason.lines().last() {
                    println!("        {}", style(line.trim()).dim());
                }
            }
        }
    }
}

impl Drop for SpinnerProgress {
    fn drop(&mut self) {
        self.clear();
    }
}
