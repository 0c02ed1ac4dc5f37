//! Pointer gesture sequencing.
//!
//! Gestures are built as a [`PointerSequence`] of [`GestureStep`]s and handed
//! to the transport in a single [`perform_actions`] call, so a gesture is
//! never left half-submitted. Submission errors are returned unchanged.
//!
//! [`perform_actions`]: crate::transport::SessionTransport::perform_actions
//!
//! # Gestures
//!
//! | Gesture | Steps |
//! |---|---|
//! | tap | move (0ms), down, pause (100ms), up |
//! | swipe | move to start (0ms), down, move to end (duration), up |
//! | scroll down | swipe from 80% height upward by `distance`, 500ms |
//! | scroll up | swipe from 20% height downward by `distance`, 500ms |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::element::Viewport;
use crate::error::Result;
use crate::retry::{retry_action, RetryPolicy};
use crate::session::SessionHandle;

/// How long a tap holds the pointer down.
pub const TAP_HOLD: Duration = Duration::from_millis(100);

/// Transit time for [`Gestures::scroll_down`] and [`Gestures::scroll_up`].
pub const SCROLL_TRANSIT: Duration = Duration::from_millis(500);

/// One primitive pointer action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GestureStep {
    /// Move to viewport coordinates over `duration`.
    MoveTo { x: i32, y: i32, duration: Duration },
    PointerDown,
    Pause { duration: Duration },
    PointerUp,
}

/// A non-empty, ordered list of steps for one touch pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerSequence {
    pointer_id: String,
    steps: Vec<GestureStep>,
}

impl PointerSequence {
    /// Returns `None` if `steps` is empty.
    pub fn new(steps: Vec<GestureStep>) -> Option<Self> {
        if steps.is_empty() {
            return None;
        }
        Some(Self {
            pointer_id: "finger".to_string(),
            steps,
        })
    }

    /// Tap at `(x, y)`.
    pub fn tap(x: i32, y: i32) -> Self {
        Self {
            pointer_id: "finger".to_string(),
            steps: vec![
                GestureStep::MoveTo { x, y, duration: Duration::ZERO },
                GestureStep::PointerDown,
                GestureStep::Pause { duration: TAP_HOLD },
                GestureStep::PointerUp,
            ],
        }
    }

    /// Press at the start point, drag to the end point over `duration`, lift.
    pub fn swipe(start_x: i32, start_y: i32, end_x: i32, end_y: i32, duration: Duration) -> Self {
        Self {
            pointer_id: "finger".to_string(),
            steps: vec![
                GestureStep::MoveTo { x: start_x, y: start_y, duration: Duration::ZERO },
                GestureStep::PointerDown,
                GestureStep::MoveTo { x: end_x, y: end_y, duration },
                GestureStep::PointerUp,
            ],
        }
    }

    pub fn pointer_id(&self) -> &str {
        &self.pointer_id
    }

    pub fn steps(&self) -> &[GestureStep] {
        &self.steps
    }

    /// W3C Actions payload (`{"actions": [...]}`) for this sequence.
    pub fn to_w3c_actions(&self) -> Value {
        let actions: Vec<Value> = self
            .steps
            .iter()
            .map(|step| match *step {
                GestureStep::MoveTo { x, y, duration } => json!({
                    "type": "pointerMove",
                    "duration": duration.as_millis() as u64,
                    "origin": "viewport",
                    "x": x,
                    "y": y,
                }),
                GestureStep::PointerDown => json!({ "type": "pointerDown", "button": 0 }),
                GestureStep::Pause { duration } => json!({
                    "type": "pause",
                    "duration": duration.as_millis() as u64,
                }),
                GestureStep::PointerUp => json!({ "type": "pointerUp", "button": 0 }),
            })
            .collect();

        json!({
            "actions": [{
                "type": "pointer",
                "id": self.pointer_id,
                "parameters": { "pointerType": "touch" },
                "actions": actions,
            }]
        })
    }
}

/// Start and end points for a vertical scroll of `distance` pixels.
///
/// Scrolling down starts at 80% of the height and moves up; scrolling up
/// starts at 20% and moves down.
pub fn scroll_points(viewport: Viewport, distance: i32, down: bool) -> ((i32, i32), (i32, i32)) {
    let x = viewport.width / 2;
    if down {
        let start_y = viewport.y_at(0.8);
        ((x, start_y), (x, start_y.saturating_sub(distance)))
    } else {
        let start_y = viewport.y_at(0.2);
        ((x, start_y), (x, start_y.saturating_add(distance)))
    }
}

/// Gesture operations against one session's viewport.
#[derive(Debug, Clone)]
pub struct Gestures {
    session: SessionHandle,
}

impl Gestures {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Submit `sequence` as one input action.
    pub async fn perform(&self, sequence: &PointerSequence) -> Result<()> {
        debug!(steps = sequence.steps().len(), "submitting pointer sequence");
        self.session.transport().perform_actions(sequence).await?;
        Ok(())
    }

    pub async fn tap(&self, x: i32, y: i32) -> Result<()> {
        self.perform(&PointerSequence::tap(x, y)).await?;
        info!(x, y, "tapped");
        Ok(())
    }

    /// Tap the centre of the current viewport.
    pub async fn tap_center(&self) -> Result<()> {
        let viewport = self.session.transport().window_size().await?;
        self.tap_center_of(viewport).await
    }

    /// Tap the centre of a known viewport size.
    pub async fn tap_center_of(&self, viewport: Viewport) -> Result<()> {
        let (x, y) = viewport.center();
        self.tap(x, y).await
    }

    pub async fn swipe(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration: Duration,
    ) -> Result<()> {
        self.perform(&PointerSequence::swipe(start_x, start_y, end_x, end_y, duration))
            .await?;
        info!(start_x, start_y, end_x, end_y, duration_ms = duration.as_millis() as u64, "swiped");
        Ok(())
    }

    /// Scroll content down by dragging upward `distance` pixels.
    pub async fn scroll_down(&self, distance: i32) -> Result<()> {
        self.scroll(distance, true).await
    }

    /// Scroll content up by dragging downward `distance` pixels.
    pub async fn scroll_up(&self, distance: i32) -> Result<()> {
        self.scroll(distance, false).await
    }

    async fn scroll(&self, distance: i32, down: bool) -> Result<()> {
        let viewport = self.session.transport().window_size().await?;
        let ((sx, sy), (ex, ey)) = scroll_points(viewport, distance, down);
        self.swipe(sx, sy, ex, ey, SCROLL_TRANSIT).await
    }

    /// Tap `(x, y)`, and tap once more if the first submission fails.
    ///
    /// For overlays that intermittently swallow the first touch. The error of
    /// the second attempt is returned if both fail.
    pub async fn dismiss_with_retry(&self, x: i32, y: i32) -> Result<()> {
        let policy = RetryPolicy::immediate(2);
        retry_action("dismiss overlay", &policy, |_| self.tap(x, y)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_sequence_shape() {
        let seq = PointerSequence::tap(10, 20);
        assert_eq!(
            seq.steps(),
            &[
                GestureStep::MoveTo { x: 10, y: 20, duration: Duration::ZERO },
                GestureStep::PointerDown,
                GestureStep::Pause { duration: Duration::from_millis(100) },
                GestureStep::PointerUp,
            ]
        );
    }

    #[test]
    fn swipe_sequence_shape() {
        let seq = PointerSequence::swipe(100, 800, 100, 300, Duration::from_millis(500));
        assert_eq!(
            seq.steps(),
            &[
                GestureStep::MoveTo { x: 100, y: 800, duration: Duration::ZERO },
                GestureStep::PointerDown,
                GestureStep::MoveTo { x: 100, y: 300, duration: Duration::from_millis(500) },
                GestureStep::PointerUp,
            ]
        );
    }

    #[test]
    fn empty_sequence_rejected() {
        assert!(PointerSequence::new(vec![]).is_none());
        assert!(PointerSequence::new(vec![GestureStep::PointerDown]).is_some());
    }

    #[test]
    fn scroll_points_from_viewport() {
        let vp = Viewport::new(1080, 2400);
        assert_eq!(scroll_points(vp, 600, true), ((540, 1920), (540, 1320)));
        assert_eq!(scroll_points(vp, 600, false), ((540, 480), (540, 1080)));
    }

    #[test]
    fn scroll_points_saturate_on_extreme_distances() {
        let vp = Viewport::new(1080, 2400);
        assert_eq!(scroll_points(vp, i32::MAX, false).1, (540, i32::MAX));
        assert_eq!(scroll_points(vp, i32::MIN, true).1, (540, i32::MAX));
        assert_eq!(scroll_points(vp, i32::MAX, true).1, (540, 1920 - i32::MAX));
    }

    #[test]
    fn w3c_payload() {
        let payload = PointerSequence::tap(5, 7).to_w3c_actions();
        let pointer = &payload["actions"][0];
        assert_eq!(pointer["type"], "pointer");
        assert_eq!(pointer["parameters"]["pointerType"], "touch");
        let steps = pointer["actions"].as_array().unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0]["type"], "pointerMove");
        assert_eq!(steps[0]["duration"], 0);
        assert_eq!(steps[0]["x"], 5);
        assert_eq!(steps[2]["type"], "pause");
        assert_eq!(steps[2]["duration"], 100);
        assert_eq!(steps[3]["type"], "pointerUp");
    }
}
