use std::collections::BTreeMap;
use std::time::Instant;

/// Side channel for pipeline orchestration events.
///
/// Use cases report stage transitions, timings and metrics here, leaving the
/// choice of output (stdout, log file, nothing) to the caller.
pub trait PipelineLogger: Send {
    /// Report that `stage` started as step `current` of `total`.
    fn stage(&mut self, current: usize, total: usize, stage: &str);

    /// Record how long a named stage took.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. segments edited, duration delta).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn stage(&mut self, _current: usize, _total: usize, _stage: &str) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI logger: forwards events to `log`, tagged with the request id, and
/// keeps per-stage timings and metrics for a closing summary.
pub struct StdoutPipelineLogger {
    tag: String,
    stages: Vec<(String, f64)>,
    metrics: BTreeMap<String, f64>,
    start_time: Instant,
    messages: Vec<String>,
}

impl StdoutPipelineLogger {
    pub fn new(request_id: &str) -> Self {
        Self {
            tag: request_id.to_string(),
            stages: Vec::new(),
            metrics: BTreeMap::new(),
            start_time: Instant::now(),
            messages: Vec::new(),
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.stages.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Apply summary [{}] ({} stages, {:.1}s total):",
            self.tag,
            self.stages.len(),
            elapsed_ms / 1000.0
        )];

        for (stage, ms) in &self.stages {
            let pct = if elapsed_ms > 0.0 {
                ms / elapsed_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!("  {stage:12}: {ms:8.1}ms  ({pct:4.1}%)"));
        }

        for (name, value) in &self.metrics {
            lines.push(format!("  {name}: {value:.3}"));
        }

        Some(lines.join("\n"))
    }

    pub fn timing_for(&self, stage: &str) -> Option<f64> {
        self.stages
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, ms)| *ms)
    }

    pub fn metric_for(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn stage(&mut self, current: usize, total: usize, stage: &str) {
        log::info!("[{}] ({current}/{total}) {stage}", self.tag);
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        match self.stages.iter_mut().find(|(name, _)| name == stage) {
            Some((_, total)) => *total += duration_ms,
            None => self.stages.push((stage.to_string(), duration_ms)),
        }
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.insert(name.to_string(), value);
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("[{}] {message}", self.tag);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
