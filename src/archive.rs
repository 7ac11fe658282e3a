//! Read-through view of saved runs, newest first.

use crate::model::RunSummary;

#[derive(Debug, Default)]
pub struct RunArchive {
    runs: Vec<RunSummary>,
    loaded: bool,
}

impl RunArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Install the server list. Runs confirmed locally before the list arrived stay on top.
    pub fn seed(&mut self, runs: Vec<RunSummary>) {
        let local = std::mem::replace(&mut self.runs, runs);
        for run in local.into_iter().rev() {
            if !self.runs.iter().any(|existing| existing.id == run.id) {
                self.runs.insert(0, run);
            }
        }
        self.loaded = true;
    }

    pub fn prepend(&mut self, run: RunSummary) {
        self.runs.retain(|existing| existing.id != run.id);
        self.runs.insert(0, run);
    }

    pub fn runs(&self) -> &[RunSummary] {
        &self.runs
    }
}
