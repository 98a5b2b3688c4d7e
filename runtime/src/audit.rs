//! Consistency audit: finds and repairs drift between the two membership lists.
//!
//! Drift can only appear after a `PartialFailure`, a crash between the two
//! writes, or an out-of-band edit. The event's participant list is treated
//! as the source of truth when repairing.

use crate::metrics::AuditMetrics;
use campus_events_core::entity_store::{EntityStore, EntityStoreError, EventFilter};
use campus_events_core::types::{EventId, UserId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// One (event, user) pair named by a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    /// Event side
    pub event_id: EventId,
    /// User side
    pub user_id: UserId,
    /// Whether the document on the other side does not exist at all
    pub counterpart_missing: bool,
}

/// Findings of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    /// Event lists the user, user does not list the event
    pub orphaned_participants: Vec<Membership>,
    /// User lists the event, event does not list the user
    pub dangling_registrations: Vec<Membership>,
    /// User appears more than once in an event's participants
    pub duplicate_participants: Vec<Membership>,
    /// Event appears more than once in a user's registrations
    pub duplicate_registrations: Vec<Membership>,
    /// Events examined
    pub events_scanned: usize,
    /// Users examined
    pub users_scanned: usize,
}

impl DriftReport {
    /// Whether the scan found nothing.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.drift_count() == 0
    }

    /// Total number of findings.
    #[must_use]
    pub fn drift_count(&self) -> usize {
        self.orphaned_participants.len()
            + self.dangling_registrations.len()
            + self.duplicate_participants.len()
            + self.duplicate_registrations.len()
    }
}

/// What a repair pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairSummary {
    /// Missing `registered_events` entries added
    pub back_references_added: usize,
    /// Participants pulled because their user no longer exists
    pub participants_pulled: usize,
    /// Registrations pulled because the event does not list the user
    pub registrations_pulled: usize,
    /// Duplicate entries collapsed to one
    pub duplicates_collapsed: usize,
    /// Findings left unrepaired because the store failed
    pub failures: usize,
}

/// Scans and repairs drift.
#[derive(Clone)]
pub struct ConsistencyAuditor {
    store: Arc<dyn EntityStore>,
}

impl ConsistencyAuditor {
    /// Create an auditor over the store.
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Walk every event and user and report drift.
    ///
    /// # Errors
    ///
    /// Returns the store error if either listing fails.
    #[tracing::instrument(skip(self))]
    pub async fn scan(&self) -> Result<DriftReport, EntityStoreError> {
        let events = self.store.list_events(EventFilter::default()).await?;
        let users = self.store.list_users().await?;

        let participants: HashMap<EventId, HashSet<UserId>> = events
            .iter()
            .map(|event| (event.id, event.participants.iter().copied().collect()))
            .collect();
        let registrations: HashMap<UserId, HashSet<EventId>> = users
            .iter()
            .map(|user| (user.id, user.registered_events.iter().copied().collect()))
            .collect();

        let mut report = DriftReport {
            events_scanned: events.len(),
            users_scanned: users.len(),
            ..DriftReport::default()
        };

        for event in &events {
            for (user_id, count) in occurrences(&event.participants) {
                let membership = |counterpart_missing| Membership {
                    event_id: event.id,
                    user_id,
                    counterpart_missing,
                };
                if count > 1 {
                    report.duplicate_participants.push(membership(false));
                }
                match registrations.get(&user_id) {
                    None => report.orphaned_participants.push(membership(true)),
                    Some(registered) if !registered.contains(&event.id) => {
                        report.orphaned_participants.push(membership(false));
                    }
                    Some(_) => {}
                }
            }
        }

        for user in &users {
            for (event_id, count) in occurrences(&user.registered_events) {
                let membership = |counterpart_missing| Membership {
                    event_id,
                    user_id: user.id,
                    counterpart_missing,
                };
                if count > 1 {
                    report.duplicate_registrations.push(membership(false));
                }
                match participants.get(&event_id) {
                    None => report.dangling_registrations.push(membership(true)),
                    Some(listed) if !listed.contains(&user.id) => {
                        report.dangling_registrations.push(membership(false));
                    }
                    Some(_) => {}
                }
            }
        }

        AuditMetrics::record_drift("orphaned_participant", report.orphaned_participants.len());
        AuditMetrics::record_drift("dangling_registration", report.dangling_registrations.len());
        AuditMetrics::record_drift("duplicate_participant", report.duplicate_participants.len());
        AuditMetrics::record_drift("duplicate_registration", report.duplicate_registrations.len());

        if report.is_clean() {
            tracing::info!(
                events = report.events_scanned,
                users = report.users_scanned,
                "Consistency scan clean"
            );
        } else {
            tracing::warn!(drift = report.drift_count(), "Consistency scan found drift");
        }
        Ok(report)
    }

    /// Apply fixes for a report. Safe to re-run; every step is an idempotent
    /// set operation, and a failed step is counted and skipped. Each finding is
    /// re-checked against the current documents, so a stale report writes
    /// nothing and only writes that changed a document are counted.
    #[tracing::instrument(skip(self, report), fields(drift = report.drift_count()))]
    pub async fn repair(&self, report: &DriftReport) -> RepairSummary {
        let mut summary = RepairSummary::default();

        for finding in &report.duplicate_participants {
            let collapsed = self
                .store
                .collapse_participant_duplicates(finding.event_id, finding.user_id)
                .await
                .map(|mutation| mutation.is_applied());
            tally(&mut summary.duplicates_collapsed, &mut summary.failures, collapsed, finding);
        }

        for finding in &report.duplicate_registrations {
            let collapsed = self
                .store
                .collapse_registration_duplicates(finding.user_id, finding.event_id)
                .await
                .map(|mutation| mutation.is_applied());
            tally(&mut summary.duplicates_collapsed, &mut summary.failures, collapsed, finding);
        }

        for finding in &report.orphaned_participants {
            if finding.counterpart_missing {
                let pulled = self.pull_orphan(finding).await;
                tally(&mut summary.participants_pulled, &mut summary.failures, pulled, finding);
            } else {
                let added = self.add_back_reference(finding).await;
                tally(&mut summary.back_references_added, &mut summary.failures, added, finding);
            }
        }

        for finding in &report.dangling_registrations {
            let pulled = self.pull_dangling(finding).await;
            tally(&mut summary.registrations_pulled, &mut summary.failures, pulled, finding);
        }

        AuditMetrics::record_repaired("back_reference_added", summary.back_references_added);
        AuditMetrics::record_repaired("participant_pulled", summary.participants_pulled);
        AuditMetrics::record_repaired("registration_pulled", summary.registrations_pulled);
        AuditMetrics::record_repaired("duplicate_collapsed", summary.duplicates_collapsed);

        tracing::info!(?summary, "Consistency repair finished");
        summary
    }

    /// Scan, then repair whatever the scan found.
    ///
    /// # Errors
    ///
    /// Returns the store error if the scan fails.
    pub async fn scan_and_repair(&self) -> Result<(DriftReport, RepairSummary), EntityStoreError> {
        let report = self.scan().await?;
        let summary = self.repair(&report).await;
        Ok((report, summary))
    }

    /// Pull a participant whose user document is gone, unless it came back.
    async fn pull_orphan(&self, finding: &Membership) -> Result<bool, EntityStoreError> {
        if self.store.find_user(finding.user_id).await?.is_some() {
            return Ok(false);
        }
        Ok(self
            .store
            .remove_participant(finding.event_id, finding.user_id)
            .await?
            .is_applied())
    }

    /// Add the missing back-reference only while the event still lists the user.
    async fn add_back_reference(&self, finding: &Membership) -> Result<bool, EntityStoreError> {
        match self.store.find_event(finding.event_id).await? {
            Some(event) if event.has_participant(finding.user_id) => {}
            _ => return Ok(false),
        }
        Ok(self
            .store
            .add_registered_event(finding.user_id, finding.event_id)
            .await?
            .is_applied())
    }

    /// Pull a registration unless the event gained the participant since the scan.
    async fn pull_dangling(&self, finding: &Membership) -> Result<bool, EntityStoreError> {
        if let Some(event) = self.store.find_event(finding.event_id).await? {
            if event.has_participant(finding.user_id) {
                return Ok(false);
            }
        }
        Ok(self
            .store
            .remove_registered_event(finding.user_id, finding.event_id)
            .await?
            .is_applied())
    }
}

/// Distinct ids in first-seen order with their occurrence counts.
fn occurrences<T: Ord + Copy>(ids: &[T]) -> Vec<(T, usize)> {
    let mut counts: BTreeMap<T, usize> = BTreeMap::new();
    let mut order = Vec::new();
    for id in ids {
        let count = counts.entry(*id).or_insert(0);
        if *count == 0 {
            order.push(*id);
        }
        *count += 1;
    }
    order.into_iter().map(|id| (id, counts[&id])).collect()
}

fn tally(
    fixed: &mut usize,
    failures: &mut usize,
    result: Result<bool, EntityStoreError>,
    finding: &Membership,
) {
    match result {
        Ok(true) => *fixed += 1,
        Ok(false) => tracing::debug!(
            event_id = %finding.event_id,
            user_id = %finding.user_id,
            "Drift already resolved"
        ),
        Err(error) => {
            *failures += 1;
            tracing::warn!(
                event_id = %finding.event_id,
                user_id = %finding.user_id,
                %error,
                "Could not repair drift"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurrences_keep_first_seen_order() {
        let a = UserId::new();
        let b = UserId::new();
        assert_eq!(occurrences(&[b, a, b, b]), vec![(b, 3), (a, 1)]);
    }

    #[test]
    fn empty_report_is_clean() {
        assert!(DriftReport::default().is_clean());
    }
}
