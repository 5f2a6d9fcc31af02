//! Session with a virtualization management endpoint
//!
//! The poller only sees the narrow [`EndpointSession`] trait. Results that
//! come back from the endpoint are tagged unions with an explicit
//! unrecognized branch so unknown wire variants are skipped, not fatal.

mod vijson;

pub use vijson::ViJsonSession;

use crate::error::EndpointError;
use crate::models::{CounterInfo, ManagedObjectRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Interval id of the endpoint's real-time statistics (20 second samples)
pub const REALTIME_INTERVAL_ID: i32 = 20;

/// A session idle for longer than this is considered expired
pub const SESSION_IDLE_LIMIT: Duration = Duration::from_secs(30 * 60);

/// A managed object and its inventory name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedObject {
    pub reference: ManagedObjectRef,
    pub name: String,
}

/// Timestamp and interval of one sample slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    pub timestamp: DateTime<Utc>,
    pub interval_secs: i32,
}

/// One series of values for a counter instance
#[derive(Debug, Clone, PartialEq)]
pub enum RawSeries {
    /// Integer samples, one per `SampleInfo` slot
    Int {
        counter_id: i32,
        instance: String,
        values: Vec<i64>,
    },
    /// A series type this collector does not understand
    Unrecognized(String),
}

/// Samples returned for one entity
#[derive(Debug, Clone, PartialEq)]
pub enum EntityMetric {
    Sampled {
        entity: ManagedObjectRef,
        samples: Vec<SampleInfo>,
        series: Vec<RawSeries>,
    },
    /// An entity result type this collector does not understand
    Unrecognized(String),
}

/// Operations the poller needs from an endpoint
#[async_trait]
pub trait EndpointSession: Send + Sync {
    /// Open a new authenticated session, replacing any existing one
    async fn connect(&self) -> Result<(), EndpointError>;

    /// True if a session is open and has not been idle past `SESSION_IDLE_LIMIT`
    async fn is_session_valid(&self) -> bool;

    /// Close the session. Best effort; never fails.
    async fn disconnect(&self);

    /// Current time according to the endpoint
    async fn server_time(&self) -> Result<DateTime<Utc>, EndpointError>;

    /// Every managed object of the given type in the inventory
    async fn enumerate_managed_objects(
        &self,
        object_type: &str,
    ) -> Result<Vec<ManagedObject>, EndpointError>;

    /// The endpoint's full performance counter table
    async fn list_all_counters(&self) -> Result<Vec<CounterInfo>, EndpointError>;

    /// Samples for `counter_ids` on one object over `[start, end)`
    async fn query_samples(
        &self,
        object: &ManagedObjectRef,
        counter_ids: &[i32],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval_id: i32,
    ) -> Result<Vec<EntityMetric>, EndpointError>;
}
