//! Idle timeout for streams.

use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::error::{AgentError, Result};

/// Await the next item, failing if none arrives within `idle`.
///
/// `None` for `idle` waits forever.
pub async fn next_within<S>(stream: &mut S, idle: Option<Duration>) -> Result<Option<S::Item>>
where
    S: Stream + Unpin,
{
    match idle {
        Some(duration) => tokio::time::timeout(duration, stream.next())
            .await
            .map_err(|_| AgentError::Timeout(duration.as_millis() as u64)),
        None => Ok(stream.next().await),
    }
}
