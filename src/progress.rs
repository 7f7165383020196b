//! Defines structures and types for progress reporting.

/// Represents a snapshot of the progress during a load.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// A description of the current stage (e.g., "Loading questions").
    pub stage_description: String,
    /// Number of rows processed in the current stage.
    pub current_item: u64,
    /// Total number of rows expected in the current stage (if known).
    pub total_items: Option<u64>,
    /// An optional message providing more context (e.g., the question text).
    pub message: Option<String>,
}

/// Type alias for the progress callback function.
///
/// `FnMut` allows the callback to modify its captured state (e.g., update a progress bar).
pub type ProgressCallback = Box<dyn FnMut(ProgressUpdate)>;

impl ProgressUpdate {
    /// Creates a new progress update for the start of a stage.
    pub fn new_stage(description: String, total_items: Option<u64>) -> Self {
        ProgressUpdate {
            stage_description: description,
            current_item: 0,
            total_items,
            message: None,
        }
    }
}
