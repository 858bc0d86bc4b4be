//! Best-effort progress streaming alongside a blocking wait.
//!
//! A [`ProgressStreamer`] repeatedly pulls the latest output from a
//! [`ProgressSource`] and hands each line to an emitter until it is stopped.
//! Fetch failures are swallowed; the stream never fails the wait it
//! accompanies.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::error::NgcError;

/// Pause between two fetches.
pub const DEFAULT_FETCH_PAUSE: Duration = Duration::from_secs(2);

/// Something that can be polled for new progress lines.
#[async_trait]
pub trait ProgressSource: Send {
    /// Lines produced since the previous fetch.
    async fn fetch(&mut self) -> Result<Vec<String>, NgcError>;
}

/// Handle to a running background progress stream.
///
/// Dropping the handle cancels the stream; [`ProgressStreamer::stop`] also
/// waits for the task to finish.
pub struct ProgressStreamer {
    token: CancellationToken,
    handle: JoinHandle<u64>,
    _guard: DropGuard,
}

impl ProgressStreamer {
    pub fn spawn<S, F>(source: S, pause: Duration, emit: F) -> Self
    where
        S: ProgressSource + 'static,
        F: FnMut(&str) + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(stream(source, pause, emit, token.clone()));
        Self {
            _guard: token.clone().drop_guard(),
            token,
            handle,
        }
    }

    /// Cancel the stream and wait for it. Returns the number of fetches made.
    pub async fn stop(self) -> u64 {
        self.token.cancel();
        match self.handle.await {
            Ok(fetches) => fetches,
            Err(e) => {
                debug!("Progress stream task ended abnormally: {}", e);
                0
            }
        }
    }
}

async fn stream<S, F>(mut source: S, pause: Duration, mut emit: F, token: CancellationToken) -> u64
where
    S: ProgressSource,
    F: FnMut(&str),
{
    let mut fetches = 0;

    loop {
        // An in-flight fetch is abandoned on cancellation.
        let fetched = tokio::select! {
            biased;
            () = token.cancelled() => break,
            fetched = source.fetch() => fetched,
        };
        fetches += 1;

        match fetched {
            Ok(lines) => lines.iter().for_each(|line| emit(line.as_str())),
            Err(e) => debug!("Progress fetch failed: {}", e),
        }

        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = tokio::time::sleep(pause) => {}
        }
    }

    debug!("Progress stream stopped after {} fetches", fetches);
    fetches
}
