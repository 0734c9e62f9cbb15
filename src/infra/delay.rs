use crate::app::ports::DelayPort;
use async_trait::async_trait;
use std::time::Duration;

/// Real wall-clock waits on the tokio timer.
pub struct TokioDelay;

#[async_trait]
impl DelayPort for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}
