use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub ticks: Arc<AtomicU64>,
    pub ticks_aborted: Arc<AtomicU64>,

    pub orders_created: Arc<AtomicU64>,
    pub orders_assigned: Arc<AtomicU64>,
    pub orders_delivered: Arc<AtomicU64>,
    pub orders_cancelled: Arc<AtomicU64>,

    pub throttle_denied_wall: Arc<AtomicU64>,
}
