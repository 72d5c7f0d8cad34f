//! Per-replica bookkeeping.
//!
//! Modeled as a tagged variant rather than one struct with optional fields:
//! leader-only operations (HW read/write) only exist on `Local`, so calling
//! them on a `Remote` replica is caught by the type system at the call site
//! inside `Partition` rather than by a runtime check buried in one struct.

use std::sync::Arc;
use std::time::Instant;

use replicator_storage::PartitionLogHandle;

use crate::error::ErrorCode;
use crate::types::BrokerId;

/// A single assigned replica of a partition, as tracked by this broker.
pub enum Replica {
    /// The replica hosted on this broker. Bound to an open log handle and,
    /// when this broker leads the partition, the authoritative HW.
    Local {
        broker_id: BrokerId,
        log: Arc<dyn PartitionLogHandle>,
        high_watermark: i64,
        leo: i64,
        leo_update_time: Instant,
    },
    /// A replica hosted elsewhere. `leo` is `None` until the remote broker's
    /// position has been reported at least once since the last reset.
    Remote {
        broker_id: BrokerId,
        leo: Option<i64>,
        leo_update_time: Instant,
    },
}

impl Replica {
    pub fn new_local(broker_id: BrokerId, log: Arc<dyn PartitionLogHandle>, high_watermark: i64, leo: i64) -> Self {
        Replica::Local {
            broker_id,
            log,
            high_watermark,
            leo,
            leo_update_time: Instant::now(),
        }
    }

    pub fn new_remote(broker_id: BrokerId) -> Self {
        Replica::Remote {
            broker_id,
            leo: None,
            leo_update_time: Instant::now(),
        }
    }

    pub fn broker_id(&self) -> BrokerId {
        match self {
            Replica::Local { broker_id, .. } => *broker_id,
            Replica::Remote { broker_id, .. } => *broker_id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Replica::Local { .. })
    }

    /// This replica's log end offset, if known.
    pub fn leo(&self) -> Option<i64> {
        match self {
            Replica::Local { leo, .. } => Some(*leo),
            Replica::Remote { leo, .. } => *leo,
        }
    }

    pub fn leo_update_time(&self) -> Instant {
        match self {
            Replica::Local { leo_update_time, .. } => *leo_update_time,
            Replica::Remote { leo_update_time, .. } => *leo_update_time,
        }
    }

    /// Record a freshly reported (or locally appended) LEO.
    pub fn set_leo(&mut self, offset: i64, now: Instant) {
        match self {
            Replica::Local { leo, leo_update_time, .. } => {
                *leo = offset;
                *leo_update_time = now;
            }
            Replica::Remote { leo, leo_update_time, .. } => {
                *leo = Some(offset);
                *leo_update_time = now;
            }
        }
    }

    /// Invalidate a remote replica's prior LEO; used on leadership changes
    /// where the previous epoch's reported position is no longer
    /// authoritative. A no-op on `Local`: the local log's LEO is always
    /// authoritative regardless of epoch.
    pub fn reset_leo_to_unknown(&mut self) {
        if let Replica::Remote { leo, leo_update_time, .. } = self {
            *leo = None;
            *leo_update_time = Instant::now();
        }
    }

    pub fn high_watermark(&self) -> Result<i64, ErrorCode> {
        match self {
            Replica::Local { high_watermark, .. } => Ok(*high_watermark),
            Replica::Remote { .. } => Err(ErrorCode::NotLeaderForPartition),
        }
    }

    pub fn set_high_watermark(&mut self, hw: i64) -> Result<(), ErrorCode> {
        match self {
            Replica::Local { high_watermark, .. } => {
                *high_watermark = hw;
                Ok(())
            }
            Replica::Remote { .. } => Err(ErrorCode::NotLeaderForPartition),
        }
    }

    pub fn log(&self) -> Result<&Arc<dyn PartitionLogHandle>, ErrorCode> {
        match self {
            Replica::Local { log, .. } => Ok(log),
            Replica::Remote { .. } => Err(ErrorCode::NotLeaderForPartition),
        }
    }
}
