//! Checkpoint store and detail-view selection

use serde::Serialize;

use prototrace_common::Checkpoint;

/// What the findings panel should show
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CheckpointView<'a> {
    /// No findings yet
    Empty,
    /// All findings, in evaluator order
    List(&'a [Checkpoint]),
    /// One finding under inspection
    Detail(&'a Checkpoint),
}

/// Findings from the latest audit plus the one selected for inspection
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckpointStore {
    checkpoints: Vec<Checkpoint>,
    selected: Option<usize>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the findings; any selection is dropped
    pub fn replace(&mut self, checkpoints: Vec<Checkpoint>) {
        self.checkpoints = checkpoints;
        self.selected = None;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Inspect the finding at `index`. Out-of-range indices leave the
    /// current selection alone and return false.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.checkpoints.len() {
            return false;
        }
        self.selected = Some(index);
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&Checkpoint> {
        self.selected.and_then(|i| self.checkpoints.get(i))
    }

    pub fn view(&self) -> CheckpointView<'_> {
        match self.selected() {
            Some(checkpoint) => CheckpointView::Detail(checkpoint),
            None if self.checkpoints.is_empty() => CheckpointView::Empty,
            None => CheckpointView::List(&self.checkpoints),
        }
    }

    pub fn passed_count(&self) -> usize {
        self.checkpoints.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter().filter(|c| !c.passed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// `[category] label: status` for every failed finding
    pub fn failed_summaries(&self) -> Vec<String> {
        self.failed().map(Checkpoint::summary).collect()
    }

    /// Passed over total; `None` when there are no findings
    pub fn compliance_ratio(&self) -> Option<f64> {
        if self.checkpoints.is_empty() {
            return None;
        }
        Some(self.passed_count() as f64 / self.checkpoints.len() as f64)
    }

    /// Compliance rounded to a whole percentage
    pub fn compliance_percent(&self) -> Option<u8> {
        self.compliance_ratio().map(|r| (r * 100.0).round() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prototrace_common::CheckpointCategory;

    fn checkpoint(label: &str, passed: bool) -> Checkpoint {
        Checkpoint {
            category: CheckpointCategory::Functional,
            label: label.to_string(),
            status: if passed { "ok" } else { "broken" }.to_string(),
            passed,
            details: None,
        }
    }

    #[test]
    fn test_empty_store_hides_compliance() {
        let store = CheckpointStore::new();
        assert_eq!(store.compliance_ratio(), None);
        assert_eq!(store.compliance_percent(), None);
        assert_eq!(store.view(), CheckpointView::Empty);
    }

    #[test]
    fn test_compliance_rounding() {
        let mut store = CheckpointStore::new();
        store.replace(vec![
            checkpoint("a", true),
            checkpoint("b", true),
            checkpoint("c", false),
        ]);
        assert_eq!(store.compliance_percent(), Some(67));
        assert!(store.has_failures());
        assert_eq!(store.failed_summaries(), vec!["[Functional] c: broken".to_string()]);
    }

    #[test]
    fn test_selection_drives_view() {
        let mut store = CheckpointStore::new();
        store.replace(vec![checkpoint("a", true), checkpoint("b", false)]);
        assert!(matches!(store.view(), CheckpointView::List(list) if list.len() == 2));

        assert!(store.select(1));
        assert!(matches!(store.view(), CheckpointView::Detail(c) if c.label == "b"));

        assert!(!store.select(7));
        assert_eq!(store.selected().map(|c| c.label.as_str()), Some("b"));

        store.clear_selection();
        assert!(matches!(store.view(), CheckpointView::List(_)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_replace_drops_selection() {
        let mut store = CheckpointStore::new();
        store.replace(vec![checkpoint("a", false)]);
        store.select(0);
        store.replace(vec![checkpoint("z", true)]);
        assert!(store.selected().is_none());
    }
}
