//! Chunked transfer engine.
//!
//! Both directions share one shape: the schedule fixes the byte ranges, a
//! small pool of workers moves chunks over HTTP while transforming them with
//! AES-CTR under the file's single content key, and every chunk leaves
//! behind its CBC MAC block. The coordinator dispatches chunk indices over a
//! job channel and collects per-chunk results over a completion channel,
//! keeping at most one chunk in flight per worker. On the first failure it
//! stops dispatching, drains what is still in flight, and surfaces the
//! error. Chunk MACs are folded strictly in ascending start-offset order
//! after the pool settles, so out-of-order completion never changes the
//! authenticator.

use crate::libs::error::{Error, Result};
use std::time::Duration;

pub mod download;
pub mod schedule;
pub mod upload;

/// Pause between retries of one chunk exchange.
pub(crate) const RETRY_PAUSE: Duration = Duration::from_millis(200);

/// Runs the dispatch side of a worker pool.
///
/// Sends chunk indices `0..total` over `jobs`, never keeping more than
/// `workers` outstanding, and consumes one completion per dispatched index.
/// The job sender is dropped on return, which is the cancellation signal:
/// exactly the workers spawned for this transfer see their channel close.
pub(crate) async fn coordinate(
    jobs: flume::Sender<usize>,
    done: flume::Receiver<Result<()>>,
    total: usize,
    workers: usize,
) -> Result<()> {
    let mut next = 0usize;
    let mut outstanding = 0usize;
    let mut failure: Option<Error> = None;

    while next < total && outstanding < workers {
        if jobs.send_async(next).await.is_err() {
            break;
        }
        next += 1;
        outstanding += 1;
    }

    while outstanding > 0 {
        match done.recv_async().await {
            Ok(Ok(())) => {
                outstanding -= 1;
                if failure.is_none() && next < total && jobs.send_async(next).await.is_ok() {
                    next += 1;
                    outstanding += 1;
                }
            }
            Ok(Err(err)) => {
                outstanding -= 1;
                if failure.is_none() {
                    failure = Some(err);
                }
            }
            Err(_) => {
                if failure.is_none() {
                    failure = Some(Error::BadResp("transfer pool stopped unexpectedly".into()));
                }
                break;
            }
        }
    }
    drop(jobs);

    match failure {
        Some(err) => Err(err),
        None if next < total => Err(Error::BadResp("transfer pool stopped unexpectedly".into())),
        None => Ok(()),
    }
}
