//! Gesture submission against a recording transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{session_over, MockTransport};
use tapline_core::element::Viewport;
use tapline_core::gesture::{GestureStep, Gestures, PointerSequence};
use tapline_core::transport::TransportError;
use tapline_core::Error;

fn gestures(viewport: Viewport) -> (Arc<MockTransport>, Gestures) {
    let transport = Arc::new(MockTransport::with_viewport(viewport));
    let gestures = Gestures::new(session_over(Arc::clone(&transport)));
    (transport, gestures)
}

#[tokio::test]
async fn swipe_submits_one_four_step_sequence() {
    let (transport, g) = gestures(Viewport::new(1080, 2400));
    g.swipe(100, 800, 100, 300, Duration::from_millis(500))
        .await
        .unwrap();

    let performed = transport.performed();
    assert_eq!(performed.len(), 1);
    assert_eq!(
        performed[0].steps(),
        &[
            GestureStep::MoveTo { x: 100, y: 800, duration: Duration::ZERO },
            GestureStep::PointerDown,
            GestureStep::MoveTo { x: 100, y: 300, duration: Duration::from_millis(500) },
            GestureStep::PointerUp,
        ]
    );
}

#[tokio::test]
async fn tap_center_uses_current_viewport() {
    let (transport, g) = gestures(Viewport::new(1081, 2401));
    g.tap_center().await.unwrap();
    assert_eq!(transport.performed(), vec![PointerSequence::tap(540, 1200)]);
}

#[tokio::test]
async fn scrolls_start_from_fixed_fractions() {
    let (transport, g) = gestures(Viewport::new(1080, 2400));
    g.scroll_down(600).await.unwrap();
    g.scroll_up(600).await.unwrap();

    let performed = transport.performed();
    assert_eq!(
        performed[0],
        PointerSequence::swipe(540, 1920, 540, 1320, Duration::from_millis(500))
    );
    assert_eq!(
        performed[1],
        PointerSequence::swipe(540, 480, 540, 1080, Duration::from_millis(500))
    );
}

#[tokio::test]
async fn submission_failure_propagates_unchanged() {
    let (transport, g) = gestures(Viewport::new(720, 1280));
    transport.fail_next_performs(1);

    let err = g.tap(10, 10).await.unwrap_err();
    match err {
        Error::Transport(TransportError::CommandFailed(msg)) => assert_eq!(msg, "actions rejected"),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(transport.performed().is_empty());
}

#[tokio::test]
async fn dismiss_taps_again_after_a_failure() {
    let (transport, g) = gestures(Viewport::new(1080, 2400));
    transport.fail_next_performs(1);

    g.dismiss_with_retry(540, 200).await.unwrap();
    assert_eq!(transport.perform_attempts(), 2);
    assert_eq!(transport.performed(), vec![PointerSequence::tap(540, 200)]);
}

#[tokio::test]
async fn dismiss_gives_up_after_second_failure() {
    let (transport, g) = gestures(Viewport::new(1080, 2400));
    transport.fail_next_performs(5);

    let err = g.dismiss_with_retry(540, 200).await.unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::CommandFailed(_))));
    assert_eq!(transport.perform_attempts(), 2);
}
