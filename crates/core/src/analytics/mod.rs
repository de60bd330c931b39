//! Dashboard figures derived from a set of requests.
//!
//! Status counts go through [`crate::approvals::overall_status`], so they can
//! never disagree with what the listing endpoints report.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalStatus;
use crate::domain::request::Request;
use crate::errors::DomainError;
use crate::flows::MaintenanceState;

pub const UNASSIGNED_TECHNICIAN: &str = "Unassigned";

/// Calendar month filter in `YYYY-MM` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReportMonth {
    pub year: i32,
    pub month: u32,
}

impl ReportMonth {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant.year() == self.year && instant.month() == self.month
    }
}

impl std::str::FromStr for ReportMonth {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid =
            || DomainError::Validation(format!("month `{value}` must be formatted as YYYY-MM"));
        let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }
}

impl fmt::Display for ReportMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceKpis {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub overdue: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    pub status: StatusCounts,
    pub by_type: BTreeMap<String, usize>,
    pub by_technician: BTreeMap<String, usize>,
    pub maintenance: MaintenanceKpis,
}

/// Assigned, still open, and older than its SLA. Requests without an SLA are never overdue.
pub fn is_overdue(request: &Request, now: DateTime<Utc>) -> bool {
    let (Some(assigned_at), Some(sla_hours)) = (request.assigned_at, request.sla_hours) else {
        return false;
    };
    if request.maintenance_status == Some(MaintenanceState::Completed) {
        return false;
    }
    now - assigned_at > Duration::hours(i64::from(sla_hours))
}

pub fn summarize<'a, I>(
    requests: I,
    month: Option<ReportMonth>,
    now: DateTime<Utc>,
) -> AnalyticsSummary
where
    I: IntoIterator<Item = &'a Request>,
{
    let mut summary =
        AnalyticsSummary { month: month.map(|month| month.to_string()), ..Default::default() };

    let in_scope = requests
        .into_iter()
        .filter(|request| month.map_or(true, |month| month.contains(request.created_at)));

    for request in in_scope {
        summary.status.total += 1;
        match request.overall_status() {
            ApprovalStatus::Approved => summary.status.approved += 1,
            ApprovalStatus::Rejected => summary.status.rejected += 1,
            ApprovalStatus::Pending => summary.status.pending += 1,
        }

        *summary.by_type.entry(request.request_type.label().to_string()).or_default() += 1;

        let technician = request
            .assigned_technician
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| UNASSIGNED_TECHNICIAN.to_string());
        *summary.by_technician.entry(technician).or_default() += 1;

        if request.is_maintenance() {
            summary.maintenance.total += 1;
            match request.maintenance_status {
                Some(MaintenanceState::Completed) => summary.maintenance.completed += 1,
                Some(MaintenanceState::InProgress) => summary.maintenance.in_progress += 1,
                _ => {}
            }
            if is_overdue(request, now) {
                summary.maintenance.overdue += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{is_overdue, summarize, ReportMonth, UNASSIGNED_TECHNICIAN};
    use crate::domain::approval::{ApprovalRecord, ApprovalStatus, UserId};
    use crate::domain::request::{Request, RequestId, RequestType};
    use crate::flows::MaintenanceState;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 9, 0, 0).single().expect("valid timestamp")
    }

    fn request(id: &str, request_type: RequestType, statuses: &[ApprovalStatus]) -> Request {
        let approvals = statuses
            .iter()
            .enumerate()
            .map(|(index, status)| {
                let level = index as u32 + 1;
                ApprovalRecord::pending(level, format!("approver-{level}"))
                    .with_status(*status)
            })
            .collect();

        Request {
            id: RequestId(id.to_string()),
            requester_id: UserId::from("staff-1"),
            staff_name: "Staff".to_string(),
            staff_department: None,
            request_type,
            details: "details".to_string(),
            leave: None,
            items: Vec::new(),
            attachments: Vec::new(),
            staff_signature: None,
            approvals,
            assigned_technician: None,
            assigned_at: None,
            sla_hours: None,
            maintenance_status: None,
            created_at: at(2026, 3, 10),
            updated_at: at(2026, 3, 10),
        }
    }

    fn assigned(mut request: Request, technician: &str, assigned_at: DateTime<Utc>) -> Request {
        request.assigned_technician = Some(UserId::from(technician));
        request.assigned_at = Some(assigned_at);
        request.sla_hours = Some(24);
        request.maintenance_status = Some(MaintenanceState::Submitted);
        request
    }

    #[test]
    fn month_parsing_requires_year_and_two_digit_month() {
        assert_eq!(
            "2026-03".parse::<ReportMonth>().ok(),
            Some(ReportMonth { year: 2026, month: 3 })
        );
        assert!("2026-3".parse::<ReportMonth>().is_err());
        assert!("2026-13".parse::<ReportMonth>().is_err());
        assert!("March".parse::<ReportMonth>().is_err());
        assert_eq!(ReportMonth { year: 2026, month: 3 }.to_string(), "2026-03");
    }

    #[test]
    fn overdue_needs_assignment_sla_and_open_work() {
        let now = at(2026, 3, 12);
        let open = assigned(
            request("REQ-1", RequestType::Maintenance, &[ApprovalStatus::Approved]),
            "tech-1",
            now - Duration::hours(25),
        );
        assert!(is_overdue(&open, now));

        let mut done = open.clone();
        done.maintenance_status = Some(MaintenanceState::Completed);
        assert!(!is_overdue(&done, now));

        let fresh = assigned(open.clone(), "tech-1", now - Duration::hours(24));
        assert!(!is_overdue(&fresh, now), "exactly on the SLA is not overdue");

        let unassigned = request("REQ-2", RequestType::Maintenance, &[ApprovalStatus::Pending]);
        assert!(!is_overdue(&unassigned, now));
    }

    #[test]
    fn summary_counts_agree_with_overall_status() {
        use ApprovalStatus::{Approved, Pending, Rejected};

        let now = at(2026, 3, 20);
        let requests = vec![
            request("REQ-1", RequestType::Leave, &[Approved, Approved]),
            request("REQ-2", RequestType::Purchase, &[Approved, Rejected]),
            request("REQ-3", RequestType::ItSupport, &[Approved, Pending]),
            {
                let mut started = assigned(
                    request("REQ-4", RequestType::Maintenance, &[ApprovalStatus::Approved]),
                    "tech-1",
                    now - Duration::hours(48),
                );
                started.maintenance_status = Some(MaintenanceState::InProgress);
                started
            },
            {
                let mut done = assigned(
                    request("REQ-5", RequestType::Maintenance, &[ApprovalStatus::Approved]),
                    "tech-2",
                    now - Duration::hours(2),
                );
                done.maintenance_status = Some(MaintenanceState::Completed);
                done
            },
        ];

        let summary = summarize(&requests, None, now);

        assert_eq!(summary.status.total, 5);
        assert_eq!(summary.status.approved, 3);
        assert_eq!(summary.status.rejected, 1);
        assert_eq!(summary.status.pending, 1);
        assert_eq!(summary.by_type.get("IT Support"), Some(&1));
        assert_eq!(summary.by_type.get("Maintenance"), Some(&2));
        assert_eq!(summary.by_technician.get(UNASSIGNED_TECHNICIAN), Some(&3));
        assert_eq!(summary.by_technician.get("tech-1"), Some(&1));
        assert_eq!(summary.maintenance.total, 2);
        assert_eq!(summary.maintenance.completed, 1);
        assert_eq!(summary.maintenance.in_progress, 1);
        assert_eq!(summary.maintenance.overdue, 1);
    }

    #[test]
    fn month_filter_uses_creation_time() {
        let mut april = request("REQ-2", RequestType::Leave, &[ApprovalStatus::Pending]);
        april.created_at = at(2026, 4, 1);
        let march = request("REQ-1", RequestType::Leave, &[ApprovalStatus::Pending]);
        let requests = vec![march, april];

        let summary = summarize(&requests, "2026-04".parse().ok(), at(2026, 4, 2));

        assert_eq!(summary.month.as_deref(), Some("2026-04"));
        assert_eq!(summary.status.total, 1);
        assert_eq!(summary.status.pending, 1);
    }
}
