use berth_schema::PullProgress;
use std::collections::HashMap;

/// Braille spinner cycled while a step's engine call is in flight.
pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
pub const SUCCESS_MARK: &str = "✓";

/// Ordered, human-readable record of one update attempt.
///
/// Pull messages own one line per layer, rewritten as the layer's status
/// changes. Each later step owns a single line that is animated while the step
/// runs and frozen once it completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressLog {
    lines: Vec<String>,
    layers: HashMap<String, usize>,
    active: Option<usize>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Insert or rewrite the line for the message's layer. Messages without a
    /// layer id get a fresh synthetic key, so each one keeps its own line.
    pub fn record_pull(&mut self, message: &PullProgress) {
        let key = match &message.layer_id {
            Some(id) => id.clone(),
            None => format!("general-{}", self.layers.len()),
        };
        let line = message.line();
        match self.layers.get(&key) {
            Some(&index) => self.lines[index] = line,
            None => {
                self.layers.insert(key, self.lines.len());
                self.lines.push(line);
            }
        }
    }

    /// Start a step line showing `frame`.
    pub fn begin(&mut self, frame: &str, label: &str) {
        self.active = Some(self.lines.len());
        self.lines.push(format!("{frame} {label}"));
    }

    /// Redraw the active step line with the next frame.
    pub fn animate(&mut self, frame: &str, label: &str) {
        if let Some(index) = self.active {
            self.lines[index] = format!("{frame} {label}");
        }
    }

    /// Freeze the active step line with the success mark.
    pub fn complete(&mut self, label: &str) {
        if let Some(index) = self.active.take() {
            self.lines[index] = format!("{SUCCESS_MARK} {label}");
        }
    }

    /// Replace the active step line with `message`, or append it when no step
    /// is running.
    pub fn fail(&mut self, message: String) {
        match self.active.take() {
            Some(index) => self.lines[index] = message,
            None => self.lines.push(message),
        }
    }

    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }
}
