use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::GrievanceStatus;
use crate::push::PushEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Defaulter,
    Warning,
    Info,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl NotificationEvent {
    pub fn new(
        id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            created_at,
            read: false,
        }
    }
}

/// Stable identity for a notification synthesized from a push event: the
/// source event type plus the id of the entity it concerns.
pub fn notification_key(event: &PushEvent) -> String {
    match event {
        PushEvent::DefaulterAlert(alert) => {
            let mut subjects: Vec<&str> = alert
                .subjects
                .iter()
                .map(|stat| stat.subject.id.as_str())
                .collect();
            subjects.sort_unstable();
            format!("defaulter-alert:{}", subjects.join(","))
        }
        PushEvent::GrievanceStatus(update) => format!("grievance-status:{}", update.grievance_id),
        PushEvent::GrievanceSubmitted(submitted) => {
            format!("grievance-submitted:{}", submitted.grievance_id)
        }
        PushEvent::AttendanceMarkedLive(marked) => format!(
            "attendance-marked-live:{}:{}",
            marked.subject_id, marked.student_id
        ),
        PushEvent::AttendanceUpdated(updated) => {
            format!("attendance-updated:{}", updated.subject_id)
        }
    }
}

/// Turns a push event into a notification for `student_id`, if it concerns
/// that student. Attendance and submission events stay silent.
pub fn synthesize(
    event: &PushEvent,
    student_id: &str,
    now: DateTime<Utc>,
) -> Option<NotificationEvent> {
    match event {
        PushEvent::DefaulterAlert(alert) => Some(NotificationEvent::new(
            notification_key(event),
            NotificationKind::Defaulter,
            "Attendance Alert!",
            format!(
                "Your attendance has fallen below the required threshold in {} subject(s).",
                alert.subjects.len()
            ),
            now,
        )),
        PushEvent::GrievanceStatus(update) if update.student_id == student_id => {
            let kind = if update.status == GrievanceStatus::Resolved {
                NotificationKind::Success
            } else {
                NotificationKind::Info
            };
            Some(NotificationEvent::new(
                notification_key(event),
                kind,
                "Grievance Update",
                format!(
                    "Your grievance status has been updated to: {}",
                    update.status
                ),
                now,
            ))
        }
        _ => None,
    }
}

/// Sample notifications shown before any live event arrives.
pub fn seed(now: DateTime<Utc>) -> Vec<NotificationEvent> {
    let mut read_info = NotificationEvent::new(
        "seed-2",
        NotificationKind::Info,
        "New Assignment",
        "A new assignment has been posted for Physics Lab.",
        now - Duration::days(1),
    );
    read_info.read = true;
    let mut resolved = NotificationEvent::new(
        "seed-3",
        NotificationKind::Success,
        "Grievance Resolved",
        "Your attendance grievance for Chemistry has been resolved.",
        now - Duration::days(3),
    );
    resolved.read = true;

    vec![
        NotificationEvent::new(
            "seed-1",
            NotificationKind::Warning,
            "Attendance Warning",
            "Your attendance in Mathematics is at 68%. Please maintain regular attendance.",
            now - Duration::hours(2),
        ),
        read_info,
        resolved,
    ]
}

/// In-memory notification list, most recent first.
///
/// Each notification is Unseen until marked read, and removal is final: a
/// removed id is remembered and later events with that id are ignored.
///
/// Tombstones are kept for the life of the relay and never pruned, which is
/// bounded by the number of distinct ids seen in one session.
#[derive(Debug, Default)]
pub struct NotificationRelay {
    items: Vec<NotificationEvent>,
    removed: HashSet<String>,
}

impl NotificationRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `event` at the front. An existing notification with the same id
    /// is replaced rather than duplicated, taking the new content and
    /// timestamp but keeping its read state: a read item never becomes unseen
    /// again. Returns false if the id was removed.
    pub fn append(&mut self, mut event: NotificationEvent) -> bool {
        if self.removed.contains(&event.id) {
            debug!(id = %event.id, "ignoring notification for removed id");
            return false;
        }
        if let Some(position) = self.items.iter().position(|n| n.id == event.id) {
            let existing = self.items.remove(position);
            event.read |= existing.read;
        }
        self.items.insert(0, event);
        true
    }

    /// Loads seed notifications behind anything already present.
    pub fn extend_seed(&mut self, seed: Vec<NotificationEvent>) {
        for event in seed {
            if self.removed.contains(&event.id) || self.get(&event.id).is_some() {
                continue;
            }
            self.items.push(event);
        }
    }

    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(notification) if !notification.read => {
                notification.read = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) -> usize {
        let mut marked = 0;
        for notification in self.items.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            marked += 1;
        }
        marked
    }

    pub fn remove(&mut self, id: &str) -> Option<NotificationEvent> {
        let position = self.items.iter().position(|n| n.id == id)?;
        self.removed.insert(id.to_string());
        Some(self.items.remove(position))
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    pub fn get(&self, id: &str) -> Option<&NotificationEvent> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NotificationEvent> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
