//! Waiting for layout after a viewport override
//!
//! Either sleep for a fixed time, or poll the layout metrics until the
//! reported content size stops changing, bounded by a timeout.

use std::time::Duration;

use log::{debug, warn};
use tokio::time::{sleep, Instant};

use crate::inspector::InspectorSession;
use crate::Result;

/// Layout-settle budget: the fixed delay, and the default poll timeout.
pub const SETTLE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum SettleStrategy {
    /// Sleep for a fixed time
    FixedDelay { delay_ms: u64 },
    /// Read layout metrics every `interval_ms` until `stable_reads`
    /// consecutive reads agree or `timeout_ms` elapses
    PollStable {
        interval_ms: u64,
        timeout_ms: u64,
        stable_reads: u32,
    },
}

impl Default for SettleStrategy {
    fn default() -> Self {
        SettleStrategy::PollStable {
            interval_ms: 50,
            timeout_ms: SETTLE_DELAY_MS,
            stable_reads: 2,
        }
    }
}

impl SettleStrategy {
    pub fn fixed() -> Self {
        SettleStrategy::FixedDelay {
            delay_ms: SETTLE_DELAY_MS,
        }
    }

    /// No waiting at all; useful for backends that apply overrides synchronously.
    pub fn immediate() -> Self {
        SettleStrategy::FixedDelay { delay_ms: 0 }
    }
}

/// Wait until the overridden viewport has been applied.
///
/// Hitting the poll timeout is logged, not an error: the capture proceeds
/// with whatever layout is current.
pub(crate) async fn wait_for_layout(session: &mut InspectorSession, strategy: &SettleStrategy) -> Result<()> {
    match *strategy {
        SettleStrategy::FixedDelay { delay_ms } => {
            if delay_ms > 0 {
                sleep(Duration::from_millis(delay_ms)).await;
            }
            Ok(())
        }
        SettleStrategy::PollStable {
            interval_ms,
            timeout_ms,
            stable_reads,
        } => {
            let deadline = Instant::now() + Duration::from_millis(timeout_ms);
            let mut last = session.layout_metrics().await?;
            let mut agreeing = 1u32;
            while agreeing < stable_reads {
                if Instant::now() >= deadline {
                    warn!(
                        "[{}] layout still changing after {}ms, capturing anyway",
                        session.target(),
                        timeout_ms
                    );
                    return Ok(());
                }
                sleep(Duration::from_millis(interval_ms)).await;
                let current = session.layout_metrics().await?;
                if current == last {
                    agreeing += 1;
                } else {
                    agreeing = 1;
                    last = current;
                }
            }
            debug!("[{}] layout settled at {}x{}", session.target(), last.width, last.height);
            Ok(())
        }
    }
}
