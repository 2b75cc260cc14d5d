//! Tests for `src/delivery/submitter.rs` — candidate fallback and the
//! confirm-keystroke escape hatch.

use std::time::Duration;

use otpgate::delivery::submitter::{MessageSubmitter, SubmitterTiming};
use otpgate::driver::locators::{COMPOSER_CANDIDATES, SEND_CANDIDATES};

use crate::support::{element, fast_wait, MockElement, MockUi};

fn submitter() -> MessageSubmitter {
    MessageSubmitter::new(SubmitterTiming {
        input_wait: fast_wait(),
        send_wait: fast_wait(),
        send_retries: 2,
        post_send_settle: Duration::from_millis(1),
    })
}

#[tokio::test]
async fn types_payload_and_clicks_send() {
    let ui = MockUi::new();
    ui.set_elements(COMPOSER_CANDIDATES[0].clone(), vec![element("")]);
    ui.set_elements(SEND_CANDIDATES[0].clone(), vec![element("")]);

    submitter()
        .submit(ui.as_ref(), "Your OTP is 123456", false)
        .await
        .expect("no driver error")
        .expect("should submit");

    let typed = ui.typed();
    assert_eq!(typed.len(), 1);
    assert_eq!(typed[0].1, "Your OTP is 123456");
    assert_eq!(ui.clicks(), vec![(SEND_CANDIDATES[0].clone(), 0)]);
}

#[tokio::test]
async fn uses_second_composer_candidate() {
    let ui = MockUi::new();
    ui.set_elements(COMPOSER_CANDIDATES[1].clone(), vec![element("")]);
    ui.set_elements(SEND_CANDIDATES[0].clone(), vec![element("")]);

    submitter()
        .submit(ui.as_ref(), "hello", false)
        .await
        .expect("no driver error")
        .expect("should submit");

    assert_eq!(ui.typed()[0].0, COMPOSER_CANDIDATES[1].clone());
}

#[tokio::test]
async fn missing_composer_is_input_not_found() {
    let ui = MockUi::new();
    ui.set_elements(SEND_CANDIDATES[0].clone(), vec![element("")]);

    let result = submitter()
        .submit(ui.as_ref(), "hello", false)
        .await
        .expect("no driver error");

    assert!(result.is_err(), "expected InputNotFound");
    assert!(ui.typed().is_empty());
}

#[tokio::test]
async fn non_interactable_composer_is_skipped() {
    let ui = MockUi::new();
    ui.set_elements(
        COMPOSER_CANDIDATES[0].clone(),
        vec![MockElement {
            text: String::new(),
            interactable: false,
        }],
    );
    ui.set_elements(COMPOSER_CANDIDATES[1].clone(), vec![element("")]);
    ui.set_elements(SEND_CANDIDATES[0].clone(), vec![element("")]);

    submitter()
        .submit(ui.as_ref(), "hello", false)
        .await
        .expect("no driver error")
        .expect("should submit");

    assert_eq!(ui.typed()[0].0, COMPOSER_CANDIDATES[1].clone());
}

#[tokio::test]
async fn prefilled_payload_skips_typing() {
    let ui = MockUi::new();
    ui.set_elements(SEND_CANDIDATES[0].clone(), vec![element("")]);

    submitter()
        .submit(ui.as_ref(), "hello", true)
        .await
        .expect("no driver error")
        .expect("should submit");

    assert!(ui.typed().is_empty());
}

#[tokio::test]
async fn falls_back_to_confirm_keystroke() {
    let ui = MockUi::new();
    ui.set_elements(COMPOSER_CANDIDATES[0].clone(), vec![element("")]);
    // No send control anywhere.

    submitter()
        .submit(ui.as_ref(), "hello", false)
        .await
        .expect("no driver error")
        .expect("should submit via keystroke");

    assert_eq!(ui.confirms(), 1);
    assert!(ui.clicks().is_empty());
}

#[tokio::test]
async fn send_control_not_found_when_fallback_fails() {
    let ui = MockUi::new();
    ui.set_elements(COMPOSER_CANDIDATES[0].clone(), vec![element("")]);
    ui.set_confirm_fails(true);

    let result = submitter()
        .submit(ui.as_ref(), "hello", false)
        .await
        .expect("no driver error");

    assert!(result.is_err(), "expected SendControlNotFound");
}
