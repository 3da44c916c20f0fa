//! Hover-panel filter application engine.
//!
//! The panel is hover-revealed via styling, not click-toggled, so one
//! synthetic hover event is not reliably enough to open it. The engine
//! runs an ordered list of named strategies:
//!
//! 1. Pointer hover session: probe the panel open with real pointer
//!    moves, locate each option by exact text, click it with a real
//!    press+release pair, and park the cursor inside the panel so it
//!    stays open for the remaining options.
//! 2. Synthetic fallback: script-dispatched hover events plus a script
//!    click, for layout variants that accept synthetic DOM events, and
//!    for drivers without pointer simulation.
//!
//! Every strategy returns a tagged [`StrategyOutcome`] so callers can
//! tell a site redesign from a flaky timing issue.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::page::PageDriver;

use super::{FilterSelection, all_option_values, scripts};

// ============================================================================
// Constants
// ============================================================================

/// Bound on pointer moves while probing the panel open.
const PANEL_PROBE_ATTEMPTS: usize = 20;

/// Bound on locate attempts per option value.
const OPTION_ATTEMPTS: usize = 8;

/// Offset of the alternate hover point from the trigger center.
const HOVER_OFFSET: f64 = 18.0;

/// Inset from the panel's right edge where the cursor is parked.
const PANEL_PARK_INSET: f64 = 18.0;

// ============================================================================
// UiConfig
// ============================================================================

/// Versioned selector set and option vocabulary.
///
/// Injected into the engine rather than read from ambient state, so a
/// site restyle means shipping a new config version, not an engine edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Config revision, for logs.
    pub version: u32,
    /// Selector for the filter trigger element.
    pub trigger_selector: String,
    /// Panel selectors scoped under the trigger's root.
    pub panel_selectors: Vec<String>,
    /// Broader document-wide panel selectors for the synthetic fallback.
    pub fallback_panel_selectors: Vec<String>,
    /// Option texts that identify a node as the filter panel.
    pub vocabulary: Vec<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            version: 1,
            trigger_selector: "div.filter, [class*='filter']".to_string(),
            panel_selectors: vec![
                ".filter-panel".to_string(),
                "[class*='filter-panel']".to_string(),
                "[class*='filter-pop']".to_string(),
            ],
            fallback_panel_selectors: vec![
                ".filter-panel".to_string(),
                "[class*='filter-panel']".to_string(),
                "[class*='filter-pop']".to_string(),
                "[class*='popover']".to_string(),
                "[class*='popup']".to_string(),
                "[role='menu']".to_string(),
                "[role='listbox']".to_string(),
            ],
            vocabulary: all_option_values()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

// ============================================================================
// Rect
// ============================================================================

/// Visible bounding box of a UI element at a snapshot in time.
///
/// Only trusted immediately before dispatching pointer coordinates; the
/// page can reflow between read and use.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Rect {
    /// Left edge, viewport coordinates.
    pub x: f64,
    /// Top edge, viewport coordinates.
    pub y: f64,
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

impl Rect {
    /// Center point.
    #[inline]
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Interior point near the top-right corner where the cursor parks
    /// without covering options.
    #[must_use]
    pub fn park_point(&self) -> (f64, f64) {
        (
            self.x + self.width - PANEL_PARK_INSET,
            self.y + f64::min(28.0, self.height - 10.0),
        )
    }
}

// ============================================================================
// StrategyOutcome
// ============================================================================

/// Tagged result of one application strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// Every requested option was clicked.
    Applied,
    /// The trigger element is absent or hidden.
    TriggerNotFound,
    /// The panel never became visible within the probe budget.
    PanelNotFound,
    /// The panel opened but the named value was never located.
    OptionNotFound {
        /// The value being applied when the scan gave up.
        value: String,
    },
    /// The driver cannot dispatch pointer events.
    PointerUnavailable,
}

impl StrategyOutcome {
    /// `true` for [`StrategyOutcome::Applied`].
    #[inline]
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Stable machine-readable failure reason.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Applied => "ok",
            Self::TriggerNotFound => "trigger_not_found",
            Self::PanelNotFound => "panel_not_found",
            Self::OptionNotFound { .. } => "option_not_found",
            Self::PointerUnavailable => "pointer_unavailable",
        }
    }

    /// Converts a non-applied outcome into an error for callers that
    /// need filters applied before proceeding.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Applied => Ok(()),
            Self::OptionNotFound { ref value } => Err(Error::element_not_found(format!(
                "filter option '{value}' ({})",
                self.reason()
            ))),
            other => Err(Error::element_not_found(format!(
                "filter panel ({})",
                other.reason()
            ))),
        }
    }
}

// ============================================================================
// FilterEngine
// ============================================================================

/// Applies a validated [`FilterSelection`] against one page.
pub struct FilterEngine<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    config: UiConfig,
}

impl<'a, D: PageDriver + ?Sized> FilterEngine<'a, D> {
    /// Creates an engine over a driver with the given selector config.
    #[must_use]
    pub fn new(driver: &'a D, config: UiConfig) -> Self {
        Self { driver, config }
    }

    /// Applies every set dimension of the selection.
    ///
    /// Strategies run in order; the first [`StrategyOutcome::Applied`]
    /// wins. When all strategies fail, the most specific outcome is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] before any pointer event when a
    /// value is outside its option set; transport and evaluation
    /// failures propagate as-is.
    pub async fn apply(&self, selection: &FilterSelection) -> Result<StrategyOutcome> {
        selection.validate()?;
        let values = selection.ordered_values();
        if values.is_empty() {
            return Ok(StrategyOutcome::Applied);
        }

        debug!(
            config_version = self.config.version,
            values = ?values,
            "Applying filters"
        );

        let hover = if self.driver.pointer_available() {
            let outcome = self.hover_session(&values).await?;
            if outcome.is_applied() {
                return Ok(outcome);
            }
            warn!(reason = outcome.reason(), "Hover strategy failed; trying synthetic fallback");
            outcome
        } else {
            StrategyOutcome::PointerUnavailable
        };

        // Synthetic fallback applies values one at a time.
        for value in &values {
            let outcome = self.synthetic_apply(value).await?;
            if !outcome.is_applied() {
                // Prefer the hover diagnosis when the fallback's is vaguer.
                if matches!(outcome, StrategyOutcome::PanelNotFound)
                    && !matches!(hover, StrategyOutcome::PointerUnavailable)
                {
                    return Ok(hover);
                }
                return Ok(outcome);
            }
        }
        Ok(StrategyOutcome::Applied)
    }

    /// Evaluates a rect-returning script, mapping `null` to `None`.
    async fn rect_of(&self, script: &str) -> Result<Option<Rect>> {
        let value = self.driver.evaluate(script).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(serde_json::from_value(value).ok())
    }

    async fn trigger_rect(&self) -> Result<Option<Rect>> {
        self.rect_of(&scripts::trigger_rect(&self.config)).await
    }

    async fn panel_rect(&self) -> Result<Option<Rect>> {
        self.rect_of(&scripts::panel_rect(&self.config)).await
    }

    async fn option_rect(&self, value: &str) -> Result<Option<Rect>> {
        self.rect_of(&scripts::option_rect(&self.config, value))
            .await
    }

    /// Parks the cursor inside the panel so hover styling keeps it open.
    async fn park_in_panel(&self, panel: &Rect) -> Result<()> {
        let (px, py) = panel.park_point();
        self.driver.move_mouse(px, py).await?;
        self.driver
            .pause(Duration::from_millis(60), Duration::from_millis(20))
            .await;
        Ok(())
    }

    /// Probes the panel open with real pointer moves.
    ///
    /// Alternates between the trigger center and a point just inside and
    /// below it; hover styling sometimes needs pointer motion, not mere
    /// presence, to fire.
    async fn open_panel(&self) -> Result<StrategyOutcome> {
        let Some(trigger) = self.trigger_rect().await? else {
            return Ok(StrategyOutcome::TriggerNotFound);
        };

        let (bx, by) = trigger.center();
        let near = (bx - HOVER_OFFSET, by + HOVER_OFFSET);

        for attempt in 0..PANEL_PROBE_ATTEMPTS {
            let (mx, my) = if attempt % 2 == 0 && attempt != 0 {
                near
            } else {
                (bx, by)
            };
            self.driver.move_mouse(mx, my).await?;
            self.driver
                .pause(Duration::from_millis(80), Duration::from_millis(30))
                .await;

            if let Some(panel) = self.panel_rect().await? {
                self.park_in_panel(&panel).await?;
                // Confirm the park did not close it.
                if self.panel_rect().await?.is_some() {
                    return Ok(StrategyOutcome::Applied);
                }
            }
        }

        Ok(StrategyOutcome::PanelNotFound)
    }

    /// Applies all values within one open-hover session.
    ///
    /// Reopening the panel per value re-triggers hover reveal and resets
    /// scroll state, so a single session is preferred; a value that
    /// cannot be located falls back to reopening for the remainder of
    /// its attempt budget.
    async fn hover_session(&self, values: &[String]) -> Result<StrategyOutcome> {
        let opened = self.open_panel().await?;
        if !opened.is_applied() {
            return Ok(opened);
        }

        for value in values {
            if !self.click_option(value).await? {
                return Ok(StrategyOutcome::OptionNotFound {
                    value: value.clone(),
                });
            }
        }
        Ok(StrategyOutcome::Applied)
    }

    /// Locates and clicks one option, retrying with panel reopens.
    async fn click_option(&self, value: &str) -> Result<bool> {
        for _ in 0..OPTION_ATTEMPTS {
            let mut option = self.option_rect(value).await?;
            if option.is_none() {
                // Panel may have closed between options.
                if self.open_panel().await?.is_applied() {
                    option = self.option_rect(value).await?;
                }
            }
            let Some(option) = option else {
                self.driver
                    .pause(Duration::from_millis(70), Duration::from_millis(30))
                    .await;
                continue;
            };

            let (ox, oy) = option.center();
            self.driver.move_mouse(ox, oy).await?;
            self.driver
                .pause(Duration::from_millis(50), Duration::from_millis(20))
                .await;
            self.driver.click_mouse(ox, oy).await?;
            self.driver
                .pause(Duration::from_millis(160), Duration::from_millis(60))
                .await;

            // Keep the panel open for the remaining options.
            if let Some(panel) = self.panel_rect().await? {
                self.park_in_panel(&panel).await?;
            }

            debug!(value = %value, "Filter option clicked");
            return Ok(true);
        }
        Ok(false)
    }

    /// Runs the synthetic-event fallback for one value.
    async fn synthetic_apply(&self, value: &str) -> Result<StrategyOutcome> {
        let result = self
            .driver
            .evaluate(&scripts::synthetic_apply(&self.config, value))
            .await?;

        if result.get("ok").and_then(Value::as_bool) == Some(true) {
            debug!(value = %value, "Filter option clicked via synthetic events");
            return Ok(StrategyOutcome::Applied);
        }

        let outcome = match result.get("reason").and_then(Value::as_str) {
            Some("trigger_not_found") => StrategyOutcome::TriggerNotFound,
            Some("option_not_found") => StrategyOutcome::OptionNotFound {
                value: value.to_string(),
            },
            _ => StrategyOutcome::PanelNotFound,
        };
        Ok(outcome)
    }
}

// ============================================================================
// Tests
// ============================================================================
