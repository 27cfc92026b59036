//! Timeout enforcement.
//!
//! Every transport call carries a deadline. A timeout is reported as
//! `FetchError::Timeout` and is accounted like any other transient failure.

use std::future::Future;
use std::time::Duration;

use tokio::time;

use crate::transport::{FetchError, FetchResult};

/// Run `fut` with a deadline.
pub async fn with_timeout<T, Fut>(duration: Duration, fut: Fut) -> FetchResult<T>
where
    Fut: Future<Output = FetchResult<T>>,
{
    match time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_fetch_error() {
        let result: FetchResult<u8> = with_timeout(Duration::from_secs(1), async {
            time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
        assert_eq!(result, Err(FetchError::Timeout(Duration::from_secs(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inner_result_passes_through() {
        let ok: FetchResult<u8> = with_timeout(Duration::from_secs(1), async { Ok(3) }).await;
        assert_eq!(ok, Ok(3));

        let err: FetchResult<u8> =
            with_timeout(Duration::from_secs(1), async { Err(FetchError::Status(500)) }).await;
        assert_eq!(err, Err(FetchError::Status(500)));
    }
}
