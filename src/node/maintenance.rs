//! Background tasks that keep a node's routing state converging.
//!
//! Stabilize, fix-fingers and the liveness checks each run as their own tokio task on a jittered
//! period. The ring operations themselves block on remote calls, so every tick runs on the
//! blocking pool. A failed tick is logged and the task keeps going; only cancellation of the
//! context stops it.

use crate::core::IrrevocableContext;
use crate::error::ChordError;
use crate::node::ChordNode;
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_STABILIZE_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_FIX_FINGERS_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_JITTER: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaintenanceConfig {
    pub stabilize_interval: Duration,
    pub fix_fingers_interval: Duration,
    pub liveness_interval: Duration,
    /// Each period is shifted by a uniform offset in `[-jitter, +jitter]`.
    pub jitter: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        MaintenanceConfig {
            stabilize_interval: DEFAULT_STABILIZE_INTERVAL,
            fix_fingers_interval: DEFAULT_FIX_FINGERS_INTERVAL,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            jitter: DEFAULT_JITTER,
        }
    }
}

type RingTask = fn(&ChordNode) -> Result<(), ChordError>;

/// Spawns the stabilize, fix-fingers and liveness tasks of `node`. They stop once `ctx` is
/// cancelled; the returned handles complete at that point.
pub fn spawn_maintenance(
    ctx: &IrrevocableContext,
    node: &ChordNode,
    config: MaintenanceConfig,
) -> Vec<JoinHandle<()>> {
    let _enter = node.span.enter();
    tracing::debug!("starting maintenance tasks with {:?}", config);

    vec![
        spawn_task(
            ctx.child("stabilize"),
            node.clone(),
            "stabilize",
            config.stabilize_interval,
            config.jitter,
            |n| n.stabilize(),
        ),
        spawn_task(
            ctx.child("fix_fingers"),
            node.clone(),
            "fix_fingers",
            config.fix_fingers_interval,
            config.jitter,
            |n| n.fix_fingers(),
        ),
        spawn_task(
            ctx.child("liveness"),
            node.clone(),
            "liveness",
            config.liveness_interval,
            config.jitter,
            |n| {
                n.check_predecessor()?;
                n.check_successor()
            },
        ),
    ]
}

fn spawn_task(
    ctx: IrrevocableContext,
    node: ChordNode,
    name: &'static str,
    interval: Duration,
    jitter: Duration,
    task: RingTask,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let delay = jittered(interval, jitter);
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let worker = node.clone();
            let outcome = tokio::task::spawn_blocking(move || task(&worker)).await;

            report(&node, name, outcome);
        }

        let _enter = node.span.enter();
        tracing::debug!("{} task stopped", name);
    })
}

fn report(
    node: &ChordNode,
    name: &'static str,
    outcome: Result<Result<(), ChordError>, tokio::task::JoinError>,
) {
    let _enter = node.span.enter();
    match outcome {
        Ok(Ok(())) => tracing::trace!("{} tick completed", name),
        Ok(Err(e @ ChordError::RingIsolated(_))) => {
            tracing::error!("{} tick isolated the node: {}", name, e)
        }
        Ok(Err(e)) => tracing::warn!("{} tick failed: {}", name, e),
        Err(e) => tracing::error!("{} tick panicked: {}", name, e),
    }
}

/// `interval` shifted by a uniform offset in `[-jitter, +jitter]`, never below one millisecond.
fn jittered(interval: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return interval.max(Duration::from_millis(1));
    }
    let offset = rand::rng().random_range(0..=2 * jitter_ms);
    (interval + Duration::from_millis(offset))
        .saturating_sub(jitter)
        .max(Duration::from_millis(1))
}
