use crate::ui::Icons;
use crate::ui::theme;
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Progress bar for a batch import, hidden when stdout is not a terminal
pub struct ImportProgress {
    bar: ProgressBar,
}

impl ImportProgress {
    pub fn new(total: usize) -> Self {
        let bar = if console::Term::stdout().is_term() {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {wide_msg}") {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    pub fn set_message(&self, msg: &str) {
        self.bar.set_message(msg.to_string());
    }

    pub fn inc(&self) {
        self.bar.inc(1);
    }

    /// Print a line above the bar without tearing it
    pub fn println(&self, line: &str) {
        if self.bar.is_hidden() {
            println!("{}", line);
        } else {
            self.bar.println(line);
        }
    }

    pub fn finish_with_summary(&self, duration: Duration, saved: usize, failed: usize) {
        self.bar.finish_and_clear();
        println!();
        println!(
            "{} {}",
            Icons::CHECK.style(theme().success.clone()),
            format!("Imported in {}", HumanDuration(duration)).style(theme().success.clone())
        );
        println!(
            "  {} {} saved  {} {} failed",
            Icons::PACKAGE.style(theme().info.clone()),
            saved,
            Icons::CROSS.style(theme().info.clone()),
            failed
        );
    }
}

pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_message(message.to_string());
        if console::Term::stdout().is_term() {
            pb.enable_steady_tick(Duration::from_millis(100));
        }
        Self { pb }
    }

    pub fn set_message(&self, msg: &str) {
        self.pb.set_message(msg.to_string());
    }

    pub fn finish_with_message(&self, msg: &str) {
        self.pb.finish_with_message(msg.to_string());
    }

    pub fn finish_and_clear(&self) {
        self.pb.finish_and_clear();
    }
}
