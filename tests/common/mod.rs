pub mod logging;
pub mod test_listener;

use std::time::Duration;

/// Poll `condition` until it holds or `limit` passes. Returns whether it
/// held.
pub async fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
