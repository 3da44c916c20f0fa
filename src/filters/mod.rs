//! Search filter selection and application.
//!
//! A [`FilterSelection`] names up to five filter dimensions, each drawing
//! its value from a fixed option set rendered by the search page. Values
//! are validated against their sets before any pointer event is issued,
//! so a bad selection fails without touching the page.
//!
//! Application is the [`engine`] module's job; the page-side lookup
//! scripts live in [`scripts`].

pub mod engine;
pub mod scripts;

pub use engine::{FilterEngine, Rect, StrategyOutcome, UiConfig};

use crate::error::{Error, Result};

// ============================================================================
// Option Sets
// ============================================================================

/// Sort order options.
pub const SORT_BY_OPTIONS: [&str; 5] = ["综合", "最新", "最多点赞", "最多评论", "最多收藏"];

/// Note type options.
pub const NOTE_TYPE_OPTIONS: [&str; 3] = ["不限", "视频", "图文"];

/// Publish time options.
pub const PUBLISH_TIME_OPTIONS: [&str; 4] = ["不限", "一天内", "一周内", "半年内"];

/// Search scope options.
pub const SEARCH_SCOPE_OPTIONS: [&str; 4] = ["不限", "已看过", "未看过", "已关注"];

/// Location options.
pub const LOCATION_OPTIONS: [&str; 3] = ["不限", "同城", "附近"];

/// Dimensions in the order their options appear in the panel.
const DIMENSIONS: [(&str, &[&str]); 5] = [
    ("sort_by", &SORT_BY_OPTIONS),
    ("note_type", &NOTE_TYPE_OPTIONS),
    ("publish_time", &PUBLISH_TIME_OPTIONS),
    ("search_scope", &SEARCH_SCOPE_OPTIONS),
    ("location", &LOCATION_OPTIONS),
];

/// Every distinct option value across all dimensions, panel order, deduped.
///
/// Used as the vocabulary that identifies a candidate node as the filter
/// panel rather than some other popup.
#[must_use]
pub fn all_option_values() -> Vec<&'static str> {
    let mut values = Vec::new();
    for (_, options) in DIMENSIONS {
        for option in options {
            if !values.contains(option) {
                values.push(*option);
            }
        }
    }
    values
}

// ============================================================================
// FilterSelection
// ============================================================================

/// One value per filter dimension, each optional.
///
/// An unset dimension is not applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    /// Sort order, one of [`SORT_BY_OPTIONS`].
    pub sort_by: Option<String>,
    /// Note type, one of [`NOTE_TYPE_OPTIONS`].
    pub note_type: Option<String>,
    /// Publish time window, one of [`PUBLISH_TIME_OPTIONS`].
    pub publish_time: Option<String>,
    /// Search scope, one of [`SEARCH_SCOPE_OPTIONS`].
    pub search_scope: Option<String>,
    /// Location constraint, one of [`LOCATION_OPTIONS`].
    pub location: Option<String>,
}

impl FilterSelection {
    /// Creates an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sort order.
    #[must_use]
    pub fn sort_by(mut self, value: impl Into<String>) -> Self {
        self.sort_by = Some(value.into());
        self
    }

    /// Sets the note type.
    #[must_use]
    pub fn note_type(mut self, value: impl Into<String>) -> Self {
        self.note_type = Some(value.into());
        self
    }

    /// Sets the publish time window.
    #[must_use]
    pub fn publish_time(mut self, value: impl Into<String>) -> Self {
        self.publish_time = Some(value.into());
        self
    }

    /// Sets the search scope.
    #[must_use]
    pub fn search_scope(mut self, value: impl Into<String>) -> Self {
        self.search_scope = Some(value.into());
        self
    }

    /// Sets the location constraint.
    #[must_use]
    pub fn location(mut self, value: impl Into<String>) -> Self {
        self.location = Some(value.into());
        self
    }

    fn dimension_value(&self, name: &str) -> Option<&str> {
        match name {
            "sort_by" => self.sort_by.as_deref(),
            "note_type" => self.note_type.as_deref(),
            "publish_time" => self.publish_time.as_deref(),
            "search_scope" => self.search_scope.as_deref(),
            "location" => self.location.as_deref(),
            _ => None,
        }
    }

    /// Returns set `(dimension, value)` pairs in panel order.
    #[must_use]
    pub fn selected_items(&self) -> Vec<(&'static str, &str)> {
        DIMENSIONS
            .iter()
            .filter_map(|(name, _)| self.dimension_value(name).map(|v| (*name, v)))
            .collect()
    }

    /// Returns set values in panel order.
    #[must_use]
    pub fn ordered_values(&self) -> Vec<String> {
        self.selected_items()
            .into_iter()
            .map(|(_, v)| v.to_string())
            .collect()
    }

    /// Returns `true` when no dimension is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected_items().is_empty()
    }

    /// Validates every set value against its dimension's option set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the offending dimension and
    /// listing its valid options.
    pub fn validate(&self) -> Result<()> {
        for (name, options) in DIMENSIONS {
            if let Some(value) = self.dimension_value(name) {
                if !options.contains(&value) {
                    return Err(Error::validation(name, value, options));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_selection_passes() {
        let selection = FilterSelection::new().sort_by("最新").note_type("视频");
        selection.validate().expect("valid");
    }

    #[test]
    fn test_empty_selection_is_valid() {
        assert!(FilterSelection::new().is_empty());
        FilterSelection::new().validate().expect("empty is valid");
    }

    #[test]
    fn test_out_of_set_value_is_rejected() {
        let selection = FilterSelection::new().sort_by("乱序");
        let err = selection.validate().expect_err("not in set");
        match err {
            Error::Validation {
                dimension, value, ..
            } => {
                assert_eq!(dimension, "sort_by");
                assert_eq!(value, "乱序");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_each_dimension_validates_independently() {
        // "视频" is valid for note_type but not for location.
        FilterSelection::new()
            .note_type("视频")
            .validate()
            .expect("valid for its own dimension");
        FilterSelection::new()
            .location("视频")
            .validate()
            .expect_err("invalid for another dimension");
    }

    #[test]
    fn test_ordered_values_follow_panel_order() {
        let selection = FilterSelection::new()
            .location("同城")
            .sort_by("最新")
            .publish_time("一周内");
        assert_eq!(selection.ordered_values(), vec!["最新", "一周内", "同城"]);
    }

    #[test]
    fn test_vocabulary_is_deduped() {
        let values = all_option_values();
        // "不限" appears in four dimensions but once in the vocabulary.
        assert_eq!(values.iter().filter(|v| **v == "不限").count(), 1);
        assert!(values.contains(&"最新"));
        assert!(values.contains(&"附近"));
    }
}
