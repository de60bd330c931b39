use chrono::{DateTime, Duration, NaiveDate, Utc};

use eapproval_core::approvals::{apply_decision, ApproverAssignment, Decision};
use eapproval_core::domain::approval::{ApprovalStatus, UserId};
use eapproval_core::domain::request::{
    LeavePeriod, NewRequest, PurchaseItem, Request, RequestId, RequestType,
};
use eapproval_core::flows::MaintenanceState;
use eapproval_core::session::{Role, Session};

use crate::repositories::{RepositoryError, RequestRepository};

/// Demo requests covering every request type and every overall status.
const SEED_REQUESTS: &[SeedRequestContract] = &[
    SeedRequestContract {
        id: "REQ-DEMO-LEAVE",
        request_type: RequestType::Leave,
        requester: ("staff-aisyah", "Nur Aisyah"),
        approvers: &[("hod-farid", "Farid Hassan"), ("hr-mei", "Mei Ling")],
        decisions: &[(Decision::Approved, None)],
        technician: None,
        maintenance: None,
        expected_status: ApprovalStatus::Pending,
        description: "Leave waiting on HR at level 2",
    },
    SeedRequestContract {
        id: "REQ-DEMO-PURCHASE",
        request_type: RequestType::Purchase,
        requester: ("staff-ravi", "Ravi Kumar"),
        approvers: &[
            ("hod-farid", "Farid Hassan"),
            ("fin-lim", "Lim Wei"),
            ("dir-tan", "Tan Sri Ahmad"),
        ],
        decisions: &[
            (Decision::Approved, None),
            (Decision::Rejected, Some("Budget is frozen until next quarter")),
        ],
        technician: None,
        maintenance: None,
        expected_status: ApprovalStatus::Rejected,
        description: "Purchase rejected by finance at level 2",
    },
    SeedRequestContract {
        id: "REQ-DEMO-IT",
        request_type: RequestType::ItSupport,
        requester: ("staff-aisyah", "Nur Aisyah"),
        approvers: &[("it-hod", "Daniel Wong")],
        decisions: &[(Decision::Approved, None)],
        technician: None,
        maintenance: None,
        expected_status: ApprovalStatus::Approved,
        description: "IT support fully approved",
    },
    SeedRequestContract {
        id: "REQ-DEMO-MAINT",
        request_type: RequestType::Maintenance,
        requester: ("staff-ravi", "Ravi Kumar"),
        approvers: &[("hod-farid", "Farid Hassan"), ("facility-omar", "Omar Yusof")],
        decisions: &[(Decision::Approved, None), (Decision::Approved, None)],
        technician: Some(("tech-siva", 48)),
        maintenance: Some(MaintenanceState::InProgress),
        expected_status: ApprovalStatus::Approved,
        description: "Approved maintenance work in progress",
    },
];

pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub fn request_ids() -> impl Iterator<Item = &'static str> {
        SEED_REQUESTS.iter().map(|contract| contract.id)
    }

    /// Saves the demo requests, replacing earlier copies with the same ids.
    pub async fn load(repo: &dyn RequestRepository) -> Result<SeedResult, RepositoryError> {
        let base = seed_epoch()?;
        let mut seeded = Vec::with_capacity(SEED_REQUESTS.len());

        for (index, contract) in SEED_REQUESTS.iter().enumerate() {
            let created_at = base + Duration::days(index as i64);
            repo.save(contract.build(created_at)?).await?;
            seeded.push(RequestSeedInfo { id: contract.id, description: contract.description });
        }

        Ok(SeedResult { requests_seeded: seeded })
    }

    pub async fn verify(
        repo: &dyn RequestRepository,
    ) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_REQUESTS.len());

        for contract in SEED_REQUESTS {
            let stored = repo.find_by_id(&RequestId(contract.id.to_string())).await?;
            let matches = stored.is_some_and(|request| {
                request.request_type == contract.request_type
                    && request.approvals.len() == contract.approvers.len()
                    && request.overall_status() == contract.expected_status
                    && request.maintenance_status == contract.maintenance
            });
            checks.push((contract.id, matches));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(repo: &dyn RequestRepository) -> Result<usize, RepositoryError> {
        let mut removed = 0;
        for id in Self::request_ids() {
            if repo.delete(&RequestId(id.to_string())).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn seed_epoch() -> Result<DateTime<Utc>, RepositoryError> {
    NaiveDate::from_ymd_opt(2026, 1, 5)
        .and_then(|date| date.and_hms_opt(9, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| RepositoryError::Decode("invalid seed epoch".to_string()))
}

#[derive(Debug, Clone, Copy)]
struct SeedRequestContract {
    id: &'static str,
    request_type: RequestType,
    requester: (&'static str, &'static str),
    approvers: &'static [(&'static str, &'static str)],
    decisions: &'static [(Decision, Option<&'static str>)],
    technician: Option<(&'static str, u32)>,
    maintenance: Option<MaintenanceState>,
    expected_status: ApprovalStatus,
    description: &'static str,
}

impl SeedRequestContract {
    fn build(&self, created_at: DateTime<Utc>) -> Result<Request, RepositoryError> {
        let invalid = |error: eapproval_core::DomainError| {
            RepositoryError::Decode(format!("seed request `{}` is invalid: {error}", self.id))
        };

        let (requester_id, requester_name) = self.requester;
        let session = Session::new(requester_id, requester_name, Role::Staff);
        let submission = NewRequest {
            staff_name: None,
            staff_department: Some("Operations".to_string()),
            request_type: self.request_type,
            details: self.description.to_string(),
            leave: (self.request_type == RequestType::Leave).then(|| LeavePeriod {
                start: created_at.date_naive() + Duration::days(7),
                end: created_at.date_naive() + Duration::days(9),
            }),
            items: match self.request_type {
                RequestType::Purchase => vec![PurchaseItem {
                    description: "Ergonomic office chair".to_string(),
                    quantity: 4,
                    remarks: None,
                }],
                _ => Vec::new(),
            },
            attachments: Vec::new(),
            staff_signature: Some(format!("signature:{requester_id}")),
            approvers: self
                .approvers
                .iter()
                .map(|(id, name)| ApproverAssignment {
                    approver_id: UserId::from(*id),
                    approver_name: Some((*name).to_string()),
                })
                .collect(),
        };

        let mut request = submission
            .into_request(RequestId(self.id.to_string()), &session, created_at)
            .map_err(invalid)?;

        if let Some((technician, sla_hours)) = self.technician {
            request.assigned_technician = Some(UserId::from(technician));
            request.assigned_at = Some(created_at + Duration::hours(1));
            request.sla_hours = Some(sla_hours);
            request.maintenance_status = Some(MaintenanceState::Submitted);
        }

        for (index, (decision, reason)) in self.decisions.iter().enumerate() {
            let level = index as u32 + 1;
            let decided_at = created_at + Duration::hours(2 + index as i64);
            request.approvals = apply_decision(&request.approvals, level, *decision, *reason)
                .map_err(|error| invalid(error.into()))?;
            if let Some(record) = request.approvals.iter_mut().find(|r| r.level == level) {
                record.signature = record.approver_id.as_ref().map(|id| format!("signature:{id}"));
                record.decided_at = Some(decided_at);
            }
            request.updated_at = decided_at;
        }

        if let Some(state) = self.maintenance {
            request.maintenance_status = Some(state);
        }

        Ok(request)
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub requests_seeded: Vec<RequestSeedInfo>,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use eapproval_core::domain::approval::ApprovalStatus;
    use eapproval_core::domain::request::RequestId;

    use super::DemoSeedDataset;
    use crate::repositories::{InMemoryRequestRepository, RequestRepository};

    #[tokio::test]
    async fn seed_loads_verifies_and_cleans() {
        let repo = InMemoryRequestRepository::default();

        let result = DemoSeedDataset::load(&repo).await.expect("load seed");
        assert_eq!(result.requests_seeded.len(), 4);

        let verification = DemoSeedDataset::verify(&repo).await.expect("verify");
        assert!(verification.all_present, "checks: {:?}", verification.checks);

        let purchase = repo
            .find_by_id(&RequestId("REQ-DEMO-PURCHASE".to_string()))
            .await
            .expect("find")
            .expect("seeded");
        assert_eq!(purchase.approvals[1].status, ApprovalStatus::Rejected);
        assert_eq!(purchase.approvals[2].status, ApprovalStatus::Pending);
        assert!(purchase.approvals[0].decided_at.is_some());

        assert_eq!(DemoSeedDataset::clean(&repo).await.expect("clean"), 4);
        let verification = DemoSeedDataset::verify(&repo).await.expect("verify after clean");
        assert!(!verification.all_present);
    }
}
