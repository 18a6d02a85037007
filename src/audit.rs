//! Audit trail for share, revoke and delete decisions
//!
//! A bounded in-memory ring: once full, the oldest event is dropped. The
//! total number of events ever written is kept separately so callers can
//! tell how many were lost.

use crate::model::PrincipalId;
use chrono::{DateTime, Utc};
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Share,
    Revoke,
    ClusterShare,
    ClusterUnshare,
    DeleteBackup,
    DeleteRestore,
    TransferOwnership,
    UpdateOwnership,
    Authorize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Denied(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: PrincipalId,
    pub action: AuditAction,
    /// e.g. `backup [nightly]`
    pub target: String,
    pub outcome: AuditOutcome,
}

pub struct AuditLog {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
    written: CachePadded<AtomicU64>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        AuditLog {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            written: CachePadded::new(AtomicU64::new(0)),
        }
    }

    pub fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn log(
        &self,
        timestamp: DateTime<Utc>,
        actor: PrincipalId,
        action: AuditAction,
        target: impl Into<String>,
        outcome: AuditOutcome,
    ) {
        self.record(AuditEvent {
            timestamp,
            actor,
            action,
            target: target.into(),
            outcome,
        });
    }

    /// Up to `n` most recent events, oldest first
    pub fn recent(&self, n: usize) -> Vec<AuditEvent> {
        let events = self.events.lock();
        let skip = events.len().saturating_sub(n);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn denials(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e.outcome, AuditOutcome::Denied(_)))
            .cloned()
            .collect()
    }

    /// (events ever written, events retained)
    pub fn stats(&self) -> (u64, usize) {
        (self.written.load(Ordering::Relaxed), self.events.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: usize) -> AuditEvent {
        AuditEvent {
            timestamp: Utc::now(),
            actor: PrincipalId::admin(),
            action: AuditAction::Share,
            target: format!("backup [b{}]", n),
            outcome: AuditOutcome::Allowed,
        }
    }

    #[test]
    fn test_ring_drops_oldest() {
        let log = AuditLog::new(3);
        for n in 0..5 {
            log.record(event(n));
        }
        let recent = log.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].target, "backup [b2]");
        assert_eq!(recent[2].target, "backup [b4]");
        assert_eq!(log.stats(), (5, 3));
    }

    #[test]
    fn test_recent_returns_tail() {
        let log = AuditLog::new(10);
        for n in 0..4 {
            log.record(event(n));
        }
        let recent = log.recent(2);
        assert_eq!(recent[0].target, "backup [b2]");
        assert_eq!(recent[1].target, "backup [b3]");
    }

    #[test]
    fn test_denials_filter() {
        let log = AuditLog::new(10);
        log.record(event(0));
        log.log(
            Utc::now(),
            PrincipalId::new("u1"),
            AuditAction::DeleteBackup,
            "backup [b0]",
            AuditOutcome::Denied("insufficient access".into()),
        );
        assert_eq!(log.denials().len(), 1);
    }
}
