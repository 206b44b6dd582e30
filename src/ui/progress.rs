use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct ProgressManager {
    multi_progress: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            enabled,
        }
    }

    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new_spinner());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        pb.set_message(message.to_string());
        pb
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Last console line from SWMM, shortened to fit beside the spinner.
pub fn update_model_progress(pb: &ProgressBar, line: &str) {
    const MAX_CHARS: usize = 60;
    let line = line.trim();
    let message = if line.chars().count() > MAX_CHARS {
        let truncated: String = line.chars().take(MAX_CHARS - 3).collect();
        format!("{}...", truncated)
    } else {
        line.to_string()
    };
    pb.set_message(format!("Running SWMM: {}", message));
}

pub fn finish_progress_with_summary(pb: &ProgressBar, message: &str, duration: Duration) {
    let final_message = format!(
        "{} (completed in {})",
        message,
        crate::ui::output::format_duration(duration)
    );
    pb.finish_with_message(final_message);
}
