//! Tests for `src/driver/wait.rs` — budget, polling, and error passthrough.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use otpgate::driver::locators::AUTH_READY;
use otpgate::driver::wait::BoundedWait;
use otpgate::driver::DriverError;

use crate::support::{element, fast_wait, MockUi};

#[tokio::test]
async fn until_returns_the_first_value() {
    let calls = AtomicUsize::new(0);
    let result = fast_wait()
        .until(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(if n >= 3 { Some(n) } else { None })
        })
        .await
        .expect("no driver error");

    assert_eq!(result, Some(3));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn until_gives_up_after_the_budget() {
    let result: Option<()> = fast_wait()
        .until(|| async { Ok(None) })
        .await
        .expect("no driver error");
    assert_eq!(result, None);
}

#[tokio::test]
async fn until_probes_at_least_once_even_with_a_zero_budget() {
    let wait = BoundedWait {
        timeout: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
    };
    let result = wait
        .until(|| async { Ok(Some(42_u32)) })
        .await
        .expect("no driver error");
    assert_eq!(result, Some(42));
}

#[tokio::test]
async fn probe_errors_abort_the_wait() {
    let calls = AtomicUsize::new(0);
    let result: Result<Option<()>, _> = fast_wait()
        .until(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DriverError::SessionClosed)
        })
        .await;

    assert!(matches!(result, Err(DriverError::SessionClosed)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn for_element_sees_late_arrivals() {
    let ui = MockUi::new();
    let placer = {
        let ui = std::sync::Arc::clone(&ui);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            ui.set_elements(AUTH_READY, vec![element("")]);
        })
    };

    let found = fast_wait()
        .for_element(ui.as_ref(), &AUTH_READY)
        .await
        .expect("no driver error");
    placer.await.expect("placer task");
    assert!(found);
}

#[tokio::test]
async fn for_element_reports_absence() {
    let ui = MockUi::new();
    let found = fast_wait()
        .for_element(ui.as_ref(), &AUTH_READY)
        .await
        .expect("no driver error");
    assert!(!found);
}
