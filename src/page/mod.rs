//! Page command facade and readiness waiter.
//!
//! [`Page`] wraps a [`Connection`] with the typed helpers everything else
//! builds on: page-context evaluation, navigate-and-settle, and synthetic
//! pointer dispatch. The [`PageDriver`] trait is the seam that lets the
//! filter engine and readiness waiter run against a fake page in tests.
//!
//! All timed waits in the crate go through [`wait_until`]; there are no
//! bespoke poll loops elsewhere.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{Command, InputCommand, PageCommand, RuntimeCommand};
use crate::transport::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Settle delay after navigation.
const PAGE_LOAD_WAIT: Duration = Duration::from_secs(3);

/// Delay between the press and release halves of a click.
///
/// Zero-duration synthetic clicks are ignored by some frameworks.
const CLICK_HOLD: Duration = Duration::from_millis(50);

/// Upper bound on the timing jitter ratio.
const MAX_TIMING_JITTER_RATIO: f64 = 0.7;

// ============================================================================
// Jitter
// ============================================================================

/// Randomized sleep helper.
///
/// Spreads fixed delays by ±`ratio` to avoid rigid timing patterns,
/// never going below the supplied floor.
#[derive(Debug, Clone, Copy)]
pub struct Jitter {
    ratio: f64,
}

impl Default for Jitter {
    fn default() -> Self {
        Self { ratio: 0.25 }
    }
}

impl Jitter {
    /// Creates a jitter helper, clamping the ratio to `[0, 0.7]`.
    #[must_use]
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio: ratio.clamp(0.0, MAX_TIMING_JITTER_RATIO),
        }
    }

    /// Returns the effective ratio.
    #[inline]
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Sleeps for roughly `base`, jittered, but at least `minimum`.
    pub async fn sleep(&self, base: Duration, minimum: Duration) {
        let base_s = base.as_secs_f64().max(minimum.as_secs_f64());
        let duration = if self.ratio <= 0.0 {
            base_s
        } else {
            let delta = base_s * self.ratio;
            let low = (base_s - delta).max(minimum.as_secs_f64());
            let high = (base_s + delta).max(low);
            rand::rng().random_range(low..=high)
        };
        tokio::time::sleep(Duration::from_secs_f64(duration)).await;
    }
}

// ============================================================================
// PageDriver
// ============================================================================

/// Abstraction over one automatable page.
///
/// Implemented by [`Page`] over a live connection, and by fakes in tests.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Evaluates an expression in the page realm and returns its value
    /// by value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] when the expression throws,
    /// carrying the page-side error description.
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// Moves the pointer to viewport coordinates.
    async fn move_mouse(&self, x: f64, y: f64) -> Result<()>;

    /// Dispatches a real press+release pair at viewport coordinates.
    async fn click_mouse(&self, x: f64, y: f64) -> Result<()>;

    /// Returns `true` when pointer simulation is available.
    fn pointer_available(&self) -> bool {
        true
    }

    /// Pauses for roughly `base`, but at least `minimum`.
    async fn pause(&self, base: Duration, minimum: Duration);
}

// ============================================================================
// Readiness Waiter
// ============================================================================

/// Polls a boolean page-state condition until it is truthy.
///
/// Per-iteration evaluation exceptions count as "not ready yet": the page
/// may be in a transient state where the queried structure doesn't exist.
///
/// # Errors
///
/// Returns [`Error::Timeout`] naming the condition when the deadline
/// elapses without a truthy result.
pub async fn wait_until<D>(
    driver: &D,
    condition_js: &str,
    what: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<()>
where
    D: PageDriver + ?Sized,
{
    let started = Instant::now();

    loop {
        match driver.evaluate(condition_js).await {
            Ok(value) if is_truthy(&value) => return Ok(()),
            Ok(_) => {}
            // Transient DOM errors are not fatal while polling.
            Err(Error::Evaluation { .. }) => {}
            Err(other) => return Err(other),
        }

        if started.elapsed() >= timeout {
            return Err(Error::timeout(
                format!("waiting for {what}"),
                timeout.as_millis() as u64,
            ));
        }

        let floor = poll.min(Duration::from_millis(200));
        driver.pause(poll, floor).await;
    }
}

/// Truthiness of a page-realm value crossing the boundary by value.
#[must_use]
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ============================================================================
// Page
// ============================================================================

/// A handle to one automated page.
///
/// Cheap to clone; all clones share the underlying connection.
#[derive(Clone)]
pub struct Page {
    conn: Arc<Connection>,
    jitter: Jitter,
}

impl Page {
    /// Creates a page facade over a connection.
    #[must_use]
    pub fn new(conn: Arc<Connection>) -> Self {
        Self {
            conn,
            jitter: Jitter::default(),
        }
    }

    /// Overrides the timing jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Navigates and pauses for a fixed settle interval.
    ///
    /// The settle wait accepts staleness: callers needing precision must
    /// additionally poll page state through [`wait_until`].
    pub async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url = %url, "Navigating");
        self.conn.send(Command::Page(PageCommand::Enable)).await?;
        self.conn
            .send(Command::Page(PageCommand::Navigate {
                url: url.to_string(),
            }))
            .await?;
        self.jitter
            .sleep(PAGE_LOAD_WAIT, Duration::from_secs(1))
            .await;
        Ok(())
    }

    /// Polls a readiness condition; see [`wait_until`].
    pub async fn wait_until(
        &self,
        condition_js: &str,
        what: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<()> {
        wait_until(self, condition_js, what, timeout, poll).await
    }
}

#[async_trait]
impl PageDriver for Page {
    async fn evaluate(&self, expression: &str) -> Result<Value> {
        debug!(expression_len = expression.len(), "Evaluating expression");

        let result = self
            .conn
            .send(Command::Runtime(RuntimeCommand::evaluate(expression)))
            .await?;

        let remote = result.get("result").cloned().unwrap_or(Value::Null);
        if remote.get("subtype").and_then(Value::as_str) == Some("error") {
            let description = remote
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| remote.to_string());
            return Err(Error::evaluation(description));
        }

        Ok(remote.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn move_mouse(&self, x: f64, y: f64) -> Result<()> {
        self.conn
            .send(Command::Input(InputCommand::mouse_moved(x, y)))
            .await?;
        Ok(())
    }

    async fn click_mouse(&self, x: f64, y: f64) -> Result<()> {
        self.conn
            .send(Command::Input(InputCommand::mouse_pressed(x, y)))
            .await?;
        tokio::time::sleep(CLICK_HOLD).await;
        self.conn
            .send(Command::Input(InputCommand::mouse_released(x, y)))
            .await?;
        Ok(())
    }

    async fn pause(&self, base: Duration, minimum: Duration) {
        self.jitter.sleep(base, minimum).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    /// Fake page that replays scripted evaluation results.
    pub(crate) struct FakePage {
        results: Mutex<Vec<Result<Value>>>,
        pub(crate) evaluations: AtomicUsize,
        pub(crate) pointer_events: AtomicUsize,
        pub(crate) pointer: bool,
    }

    impl FakePage {
        pub(crate) fn new(results: Vec<Result<Value>>) -> Self {
            Self {
                results: Mutex::new(results),
                evaluations: AtomicUsize::new(0),
                pointer_events: AtomicUsize::new(0),
                pointer: true,
            }
        }
    }

    #[async_trait]
    impl PageDriver for FakePage {
        async fn evaluate(&self, _expression: &str) -> Result<Value> {
            self.evaluations.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock();
            if results.is_empty() {
                Ok(Value::Null)
            } else {
                results.remove(0)
            }
        }

        async fn move_mouse(&self, _x: f64, _y: f64) -> Result<()> {
            self.pointer_events.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn click_mouse(&self, _x: f64, _y: f64) -> Result<()> {
            self.pointer_events.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn pointer_available(&self) -> bool {
            self.pointer
        }

        async fn pause(&self, _base: Duration, _minimum: Duration) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[test]
    fn test_jitter_ratio_is_clamped() {
        assert_eq!(Jitter::new(2.0).ratio(), MAX_TIMING_JITTER_RATIO);
        assert_eq!(Jitter::new(-1.0).ratio(), 0.0);
        assert_eq!(Jitter::new(0.3).ratio(), 0.3);
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(&Value::Bool(true)));
        assert!(is_truthy(&serde_json::json!(1)));
        assert!(is_truthy(&serde_json::json!("x")));
        assert!(is_truthy(&serde_json::json!({})));
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&Value::Bool(false)));
        assert!(!is_truthy(&serde_json::json!(0)));
        assert!(!is_truthy(&serde_json::json!("")));
    }

    #[tokio::test]
    async fn test_wait_until_true_on_first_poll() {
        let page = FakePage::new(vec![Ok(Value::Bool(true))]);
        let started = Instant::now();

        wait_until(
            &page,
            "true",
            "immediate condition",
            Duration::from_secs(10),
            Duration::from_millis(500),
        )
        .await
        .expect("ready");

        // First poll succeeds without consuming the timeout budget.
        assert_eq!(page.evaluations.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_wait_until_treats_evaluation_error_as_not_ready() {
        let page = FakePage::new(vec![
            Err(Error::evaluation("ReferenceError: state is not defined")),
            Ok(Value::Bool(false)),
            Ok(Value::Bool(true)),
        ]);

        wait_until(
            &page,
            "cond",
            "state root",
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .await
        .expect("eventually ready");

        assert_eq!(page.evaluations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_timeout_names_operation() {
        let page = FakePage::new(vec![]);

        let err = wait_until(
            &page,
            "false",
            "filter panel",
            Duration::from_millis(20),
            Duration::from_millis(1),
        )
        .await
        .expect_err("must time out");

        assert!(err.is_timeout());
        assert!(err.to_string().contains("filter panel"));
    }

    #[tokio::test]
    async fn test_wait_until_propagates_non_evaluation_errors() {
        let page = FakePage::new(vec![Err(Error::ConnectionClosed)]);

        let err = wait_until(
            &page,
            "cond",
            "anything",
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
        .await
        .expect_err("fatal");
        assert!(matches!(err, Error::ConnectionClosed));
    }
}
