//! Lane set: the three transport queues
//!
//! Inbound, outbound, and priority lanes over the same MPMC ring. The
//! egress drain is strict priority: the priority lane is taken first, up to
//! the batch budget, before the outbound lane is touched. A sustained
//! priority flood therefore starves outbound traffic - that is documented
//! behavior, not a bug.

use std::fmt;

use super::buffer::PacketBuffer;
use super::queue::{LaneQueue, QueueError};

/// One logical channel of the lane set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Inbound,
    Outbound,
    Priority,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
            Self::Priority => write!(f, "priority"),
        }
    }
}

/// Snapshot of per-lane occupancy
#[derive(Debug, Clone, Copy, Default)]
pub struct LaneDepths {
    pub inbound: usize,
    pub outbound: usize,
    pub priority: usize,
}

/// The three transport lanes
pub struct LaneSet {
    inbound: LaneQueue<PacketBuffer>,
    outbound: LaneQueue<PacketBuffer>,
    priority: LaneQueue<PacketBuffer>,
}

impl LaneSet {
    /// Create three lanes of `depth` slots each
    pub fn new(depth: usize) -> Result<Self, QueueError> {
        Ok(Self {
            inbound: LaneQueue::with_capacity(depth)?,
            outbound: LaneQueue::with_capacity(depth)?,
            priority: LaneQueue::with_capacity(depth)?,
        })
    }

    #[inline(always)]
    fn lane(&self, lane: Lane) -> &LaneQueue<PacketBuffer> {
        match lane {
            Lane::Inbound => &self.inbound,
            Lane::Outbound => &self.outbound,
            Lane::Priority => &self.priority,
        }
    }

    /// Enqueue on a lane; hands the buffer back if the lane is full
    #[inline(always)]
    pub fn enqueue(&self, lane: Lane, buf: PacketBuffer) -> Result<(), PacketBuffer> {
        self.lane(lane).enqueue(buf)
    }

    /// Dequeue the oldest buffer from a lane
    #[inline(always)]
    pub fn dequeue(&self, lane: Lane) -> Option<PacketBuffer> {
        self.lane(lane).dequeue()
    }

    /// One egress drain cycle: up to `batch` buffers from the priority
    /// lane, then up to `batch` from the outbound lane. Appends to `out`
    /// and returns how many were taken.
    pub fn drain_egress(&self, batch: usize, out: &mut Vec<PacketBuffer>) -> usize {
        let before = out.len();
        for _ in 0..batch {
            match self.priority.dequeue() {
                Some(buf) => out.push(buf),
                None => break,
            }
        }
        for _ in 0..batch {
            match self.outbound.dequeue() {
                Some(buf) => out.push(buf),
                None => break,
            }
        }
        out.len() - before
    }

    /// Approximate occupancy of all three lanes
    pub fn depths(&self) -> LaneDepths {
        LaneDepths {
            inbound: self.inbound.len(),
            outbound: self.outbound.len(),
            priority: self.priority.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConnectionId;

    fn tagged(conn: u64) -> PacketBuffer {
        let mut buf = PacketBuffer::new(16, 0);
        buf.set_conn(ConnectionId(conn));
        buf
    }

    #[test]
    fn test_lanes_are_independent() {
        let lanes = LaneSet::new(2).unwrap();
        lanes.enqueue(Lane::Inbound, tagged(1)).unwrap();
        lanes.enqueue(Lane::Inbound, tagged(2)).unwrap();
        // Inbound is now full but the other lanes are untouched
        assert!(lanes.enqueue(Lane::Inbound, tagged(3)).is_err());
        assert!(lanes.enqueue(Lane::Outbound, tagged(4)).is_ok());
        assert!(lanes.enqueue(Lane::Priority, tagged(5)).is_ok());
    }

    #[test]
    fn test_strict_priority_drain() {
        // With N priority and M outbound queued, a cycle with batch >= N + M
        // yields every priority buffer before any outbound buffer.
        let lanes = LaneSet::new(16).unwrap();
        for i in 0..3 {
            lanes.enqueue(Lane::Outbound, tagged(100 + i)).unwrap();
        }
        for i in 0..4 {
            lanes.enqueue(Lane::Priority, tagged(200 + i)).unwrap();
        }

        let mut drained = Vec::new();
        let taken = lanes.drain_egress(16, &mut drained);
        assert_eq!(taken, 7);

        let order: Vec<u64> = drained.iter().map(|b| b.conn().0).collect();
        assert_eq!(order, vec![200, 201, 202, 203, 100, 101, 102]);
    }

    #[test]
    fn test_drain_respects_batch_budget() {
        let lanes = LaneSet::new(16).unwrap();
        for i in 0..5 {
            lanes.enqueue(Lane::Priority, tagged(i)).unwrap();
        }
        for i in 0..5 {
            lanes.enqueue(Lane::Outbound, tagged(10 + i)).unwrap();
        }

        let mut drained = Vec::new();
        let taken = lanes.drain_egress(2, &mut drained);
        // Two from priority, two from outbound
        assert_eq!(taken, 4);
        let order: Vec<u64> = drained.iter().map(|b| b.conn().0).collect();
        assert_eq!(order, vec![0, 1, 10, 11]);
    }

    #[test]
    fn test_drain_empty_lanes() {
        let lanes = LaneSet::new(4).unwrap();
        let mut drained = Vec::new();
        assert_eq!(lanes.drain_egress(8, &mut drained), 0);
        assert!(drained.is_empty());
    }

    #[test]
    fn test_depths() {
        let lanes = LaneSet::new(8).unwrap();
        lanes.enqueue(Lane::Inbound, tagged(1)).unwrap();
        lanes.enqueue(Lane::Priority, tagged(2)).unwrap();
        lanes.enqueue(Lane::Priority, tagged(3)).unwrap();

        let depths = lanes.depths();
        assert_eq!(depths.inbound, 1);
        assert_eq!(depths.outbound, 0);
        assert_eq!(depths.priority, 2);
    }
}
