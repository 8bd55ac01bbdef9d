//! Per-project review configuration: the label vocabulary and the submit
//! strategy.

use serde::{Deserialize, Serialize};

/// One configured review label and its vote range.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelType {
    /// Label name, e.g. `Code-Review`.
    pub name: String,
    /// Lowest allowed vote, inclusive.
    pub min: i16,
    /// Highest allowed vote, inclusive.
    pub max: i16,
}

impl LabelType {
    /// A label spanning `min..=max`.
    #[must_use]
    pub fn new(name: &str, min: i16, max: i16) -> Self {
        Self {
            name: name.to_owned(),
            min,
            max,
        }
    }

    /// Whether `value` falls inside the configured range.
    #[must_use]
    pub const fn valid_value(&self, value: i16) -> bool {
        self.min <= value && value <= self.max
    }
}

/// How submitted changes reach their destination branch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmitType {
    /// The branch tip must already be the change's parent; the branch simply
    /// advances to the patch set commit.
    FastForwardOnly,
    /// Fast-forward when possible, otherwise create a merge commit.
    #[default]
    MergeIfNecessary,
    /// Always create a merge commit, even when a fast-forward would do.
    MergeAlways,
    /// Replay the change on top of the branch tip as a new commit, recorded
    /// as a fresh patch set.
    CherryPick,
}

/// Review configuration of one project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project (repository) name.
    pub name: String,
    /// Integration strategy for submit.
    #[serde(default)]
    pub submit_type: SubmitType,
    /// Labels votes may be cast on.
    #[serde(default = "default_labels")]
    pub labels: Vec<LabelType>,
}

fn default_labels() -> Vec<LabelType> {
    vec![LabelType::new("Code-Review", -2, 2)]
}

impl ProjectConfig {
    /// A project with the stock `Code-Review` label and merge-if-necessary
    /// submits.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            submit_type: SubmitType::default(),
            labels: default_labels(),
        }
    }

    /// Replace the submit strategy.
    #[must_use]
    pub fn with_submit_type(mut self, submit_type: SubmitType) -> Self {
        self.submit_type = submit_type;
        self
    }

    /// Add a label to the vocabulary.
    #[must_use]
    pub fn with_label(mut self, label: LabelType) -> Self {
        self.labels.push(label);
        self
    }

    /// Look up a label by exact name.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&LabelType> {
        self.labels.iter().find(|l| l.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_project_has_code_review() {
        let p = ProjectConfig::new("demo");
        let cr = p.label("Code-Review").unwrap();
        assert_eq!((cr.min, cr.max), (-2, 2));
        assert!(cr.valid_value(-2) && cr.valid_value(2));
        assert!(!cr.valid_value(-3) && !cr.valid_value(3));
        assert_eq!(p.submit_type, SubmitType::MergeIfNecessary);
        assert!(p.label("Verified").is_none());
    }

    #[test]
    fn builders_extend_the_vocabulary() {
        let p = ProjectConfig::new("demo")
            .with_submit_type(SubmitType::CherryPick)
            .with_label(LabelType::new("Verified", -1, 1));
        assert_eq!(p.submit_type, SubmitType::CherryPick);
        assert!(p.label("Verified").unwrap().valid_value(1));
        assert!(p.label("Code-Review").is_some(), "stock label survives");
    }
}
