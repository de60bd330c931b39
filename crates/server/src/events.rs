//! Change feed pushed to dashboards as server-sent events.
//!
//! Every successful mutation publishes one [`RequestChange`] on a bounded
//! broadcast channel. Subscribers identify themselves like any other `/api`
//! caller and only receive changes to requests they are allowed to read. A
//! subscriber that falls behind skips what it missed and keeps streaming; its
//! stream ends when the client goes away.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::{DateTime, Utc};
use eapproval_core::domain::request::{Request, RequestId};
use eapproval_core::session::Session;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::session::CallerSession;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    #[serde(rename = "request.submitted")]
    Submitted,
    #[serde(rename = "request.decided")]
    Decided,
    #[serde(rename = "request.technician_assigned")]
    TechnicianAssigned,
    #[serde(rename = "request.maintenance_advanced")]
    MaintenanceAdvanced,
    #[serde(rename = "request.deleted")]
    Deleted,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "request.submitted",
            Self::Decided => "request.decided",
            Self::TechnicianAssigned => "request.technician_assigned",
            Self::MaintenanceAdvanced => "request.maintenance_advanced",
            Self::Deleted => "request.deleted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestChange {
    pub kind: ChangeKind,
    pub request_id: RequestId,
    pub actor: String,
    pub correlation_id: String,
    pub occurred_at: DateTime<Utc>,
    /// The request as it stood after the change; decides who may receive it.
    #[serde(skip)]
    subject: Arc<Request>,
}

impl RequestChange {
    pub fn new(
        kind: ChangeKind,
        request: &Request,
        actor: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            request_id: request.id.clone(),
            actor: actor.into(),
            correlation_id: correlation_id.into(),
            occurred_at: Utc::now(),
            subject: Arc::new(request.clone()),
        }
    }

    pub fn is_visible_to(&self, session: &Session) -> bool {
        self.subject.is_visible_to(session)
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<RequestChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Fire and forget. Having nobody listening is normal.
    pub fn publish(&self, change: RequestChange) {
        let kind = change.kind.as_str();
        match self.sender.send(change) {
            Ok(receivers) => {
                debug!(event_name = "feed.published", kind, receivers, "change published");
            }
            Err(_) => debug!(event_name = "feed.no_subscribers", kind, "change dropped"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RequestChange> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stream(&self) -> impl Stream<Item = RequestChange> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|item| match item {
            Ok(change) => Some(change),
            Err(lagged) => {
                warn!(
                    event_name = "feed.subscriber_lagged",
                    error = %lagged,
                    "subscriber skipped changes"
                );
                None
            }
        })
    }

    /// Changes `session` may read, in publish order.
    pub fn stream_for(
        &self,
        session: Session,
    ) -> impl Stream<Item = RequestChange> + Send + 'static {
        self.stream().filter(move |change| change.is_visible_to(&session))
    }
}

pub async fn stream_changes(
    State(feed): State<ChangeFeed>,
    caller: CallerSession,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        event_name = "feed.subscribed",
        correlation_id = %caller.correlation_id,
        user_id = caller.session.user_id.as_str(),
        role = caller.session.role.as_str(),
        "change feed subscriber connected"
    );

    let events = feed.stream_for(caller.session).map(|change| {
        let event = Event::default().event(change.kind.as_str()).id(change.correlation_id.clone());
        let event = match serde_json::to_string(&change) {
            Ok(data) => event.data(data),
            Err(_) => event.data(change.request_id.to_string()),
        };
        Ok::<_, Infallible>(event)
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use eapproval_core::{
        ApproverAssignment, NewRequest, Request, RequestId, RequestType, Role, Session, UserId,
    };
    use tokio_stream::StreamExt;

    use super::{ChangeFeed, ChangeKind, RequestChange};

    fn request(id: &str, requester: &str) -> Request {
        NewRequest {
            staff_name: None,
            staff_department: None,
            request_type: RequestType::ItSupport,
            details: "Laptop will not boot".to_string(),
            leave: None,
            items: Vec::new(),
            attachments: Vec::new(),
            staff_signature: None,
            approvers: vec![ApproverAssignment {
                approver_id: UserId::from("hod-1"),
                approver_name: None,
            }],
        }
        .into_request(
            RequestId(id.to_string()),
            &Session::new(requester, "Requester", Role::Staff),
            Utc::now(),
        )
        .expect("valid submission")
    }

    fn change(kind: ChangeKind, id: &str) -> RequestChange {
        RequestChange::new(kind, &request(id, "staff-1"), "staff:staff-1", "corr")
    }

    #[tokio::test]
    async fn subscribers_receive_changes_in_publish_order() {
        let feed = ChangeFeed::new(8);
        let mut stream = Box::pin(feed.stream());

        feed.publish(change(ChangeKind::Submitted, "REQ-1"));
        feed.publish(change(ChangeKind::Decided, "REQ-1"));

        let first = stream.next().await.expect("first change");
        let second = stream.next().await.expect("second change");
        assert_eq!(first.kind, ChangeKind::Submitted);
        assert_eq!(second.kind, ChangeKind::Decided);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_missed_changes_and_keeps_streaming() {
        let feed = ChangeFeed::new(2);
        let mut stream = Box::pin(feed.stream());

        for index in 0..5 {
            feed.publish(change(ChangeKind::Submitted, &format!("REQ-{index}")));
        }

        let next = stream.next().await.expect("stream continues after lag");
        assert_eq!(next.request_id, RequestId("REQ-3".to_string()));
    }

    #[tokio::test]
    async fn callers_only_receive_changes_to_requests_they_can_read() {
        let feed = ChangeFeed::new(8);
        let caller = Session::new("staff-2", "Daniel", Role::Staff);
        let mut own = Box::pin(feed.stream_for(caller));
        let mut approver = Box::pin(feed.stream_for(Session::new("hod-1", "", Role::Approver)));
        let mut admin = Box::pin(feed.stream_for(Session::new("admin-1", "", Role::Admin)));

        feed.publish(RequestChange::new(
            ChangeKind::Submitted,
            &request("REQ-OTHER", "staff-1"),
            "staff:staff-1",
            "corr-1",
        ));
        feed.publish(RequestChange::new(
            ChangeKind::Submitted,
            &request("REQ-MINE", "staff-2"),
            "staff:staff-2",
            "corr-2",
        ));

        let first = own.next().await.expect("own change");
        assert_eq!(first.request_id, RequestId("REQ-MINE".to_string()));

        for stream in [&mut approver, &mut admin] {
            let first = stream.next().await.expect("first change");
            let second = stream.next().await.expect("second change");
            assert_eq!(first.request_id, RequestId("REQ-OTHER".to_string()));
            assert_eq!(second.request_id, RequestId("REQ-MINE".to_string()));
        }
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let feed = ChangeFeed::new(4);
        feed.publish(change(ChangeKind::Deleted, "REQ-1"));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn change_kinds_serialize_as_event_names() {
        let json = serde_json::to_value(change(ChangeKind::TechnicianAssigned, "REQ-2"))
            .expect("serialize");
        assert_eq!(json["kind"], "request.technician_assigned");
        assert_eq!(json["requestId"], "REQ-2");
        assert!(json.get("subject").is_none());
    }
}
