//! Indicatif-based progress display for the CLI.
//!
//! One bar per model, advanced on every engine response. Draws to stderr so
//! stdout stays clean for the rendered result.

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use serde_json::Value;
use skillbench_core::reporter::{EventType, ProgressEvent, ProgressReporter};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

struct ModelState {
    bar: ProgressBar,
    graders_passed: u64,
    graders_failed: u64,
    errors: u64,
    cached: u64,
}

impl ModelState {
    fn update_message(&self, start_time: Instant) {
        let elapsed = start_time.elapsed().as_secs();
        let elapsed_str = if elapsed >= 60 {
            format!("{}m{}s", elapsed / 60, elapsed % 60)
        } else {
            format!("{}s", elapsed)
        };

        let msg = format!(
            "{} {} {} {} {} {} {} {}",
            style("✓").green(),
            style(self.graders_passed).green().bold(),
            style("✗").red(),
            style(self.graders_failed).red().bold(),
            style("⚠").yellow(),
            style(self.errors).yellow(),
            style(format!("{} cached", self.cached)).cyan(),
            style(elapsed_str).dim(),
        );
        self.bar.set_message(msg);
    }
}

/// Progress display using indicatif for rich terminal output.
pub struct ProgressDisplay {
    multi: MultiProgress,
    trials_per_model: u64,
    prefix_width: usize,
    models: Mutex<BTreeMap<String, ModelState>>,
    start_time: Instant,
}

impl ProgressDisplay {
    pub fn new(models: &[String], trials_per_model: u64) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::stderr()),
            trials_per_model,
            prefix_width: models.iter().map(String::len).max().unwrap_or(10),
            models: Mutex::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    fn new_bar(&self, model: &str) -> ProgressBar {
        let bar_style = ProgressStyle::with_template(&format!(
            "{{spinner:.green}} {{prefix:<{}}} [{{bar:30.cyan/blue}}] {{pos}}/{{len}} {{msg}}",
            self.prefix_width
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ");

        let bar = self.multi.add(ProgressBar::new(self.trials_per_model));
        bar.set_style(bar_style);
        bar.set_prefix(model.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    /// Clear every bar; call once the run has returned.
    pub fn finish(&self) {
        for state in self.models.lock().values() {
            state.bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for ProgressDisplay {
    fn report(&self, event: &ProgressEvent) {
        let Some(model) = event.detail_str("model") else {
            return;
        };
        let mut models = self.models.lock();
        let state = models
            .entry(model.to_string())
            .or_insert_with(|| ModelState {
                bar: self.new_bar(model),
                graders_passed: 0,
                graders_failed: 0,
                errors: 0,
                cached: 0,
            });

        match event.event_type {
            EventType::AgentPrompt => {}
            EventType::AgentResponse => {
                if event.details.contains_key("error") {
                    state.errors += 1;
                }
                if event.details.get("cached").and_then(Value::as_bool) == Some(true) {
                    state.cached += 1;
                }
                state.bar.inc(1);
            }
            EventType::GraderResult => {
                if event.details.get("passed").and_then(Value::as_bool) == Some(true) {
                    state.graders_passed += 1;
                } else {
                    state.graders_failed += 1;
                }
            }
        }
        state.update_message(self.start_time);
    }
}
