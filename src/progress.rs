// src/progress.rs

//! Session progress tracking
//!
//! A session's externally visible progress combines the client-reported
//! value with a fixed phase weighting: the client band covers `[0, 0.8]`,
//! and the remaining `[0.8, 1.0]` is reserved for installer-backend phases
//! after the handoff.
//!
//! Publication is throttled so rapid client updates do not turn into a
//! notification storm; a change only goes out when it moves the published
//! value by more than [`PUBLISH_THRESHOLD`]. The commit pipeline publishes
//! one final milestone, so the last value is always eventually visible.

/// Share of the progress range owned by client-reported writing
pub const CLIENT_WEIGHT: f32 = 0.8;

/// Minimum change in computed progress before a new value is broadcast
pub const PUBLISH_THRESHOLD: f32 = 0.01;

/// Client progress, the derived weighted value, and the publication
/// watermark. Mutated only under the session lock, so the recomputation is
/// always visible before any outward notification.
#[derive(Debug, Clone)]
pub struct ProgressState {
    client: f32,
    computed: f32,
    published: f32,
}

impl Default for ProgressState {
    fn default() -> Self {
        // The watermark starts below any reachable value so the first
        // meaningful change always publishes.
        Self {
            client: 0.0,
            computed: 0.0,
            published: -1.0,
        }
    }
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the client-reported progress and recompute.
    pub fn set_client(&mut self, progress: f32) {
        self.client = progress;
        self.recompute();
    }

    /// Add to the client-reported progress and recompute.
    pub fn add_client(&mut self, progress: f32) {
        self.client += progress;
        self.recompute();
    }

    /// The current weighted progress, always within `[0, 0.8]`.
    pub fn computed(&self) -> f32 {
        self.computed
    }

    /// Return the computed value if it moved far enough from the last
    /// published value to be worth broadcasting, advancing the watermark.
    pub fn take_publishable(&mut self) -> Option<f32> {
        if (self.computed - self.published).abs() > PUBLISH_THRESHOLD {
            self.published = self.computed;
            Some(self.computed)
        } else {
            None
        }
    }

    fn recompute(&mut self) {
        self.computed = (self.client * CLIENT_WEIGHT).clamp(0.0, CLIENT_WEIGHT);
    }
}
