use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

pub const NATURE_FIELD: &str = "nature";
pub const ALERT_STATUS_FIELD: &str = "alert_status";
pub const ALERT_HEADER_FIELD: &str = "alert_header";

/// Event actions shown in a case history when the caller has no preference.
pub const DEFAULT_EVENT_FILTER: &[&str] =
    &["Edited", "Resolved", "Reactivated", "Closed", "Reopened"];

const CORRESPONDENT_CHANGE: &str = "Correspondent changed from";

/// An id/name pair such as a project, category or priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Named {
    pub id: u64,
    pub name: String,
}

/// One entry of a case history, in server order.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseEvent {
    /// `None` when the server sent no readable timestamp.
    pub date: Option<DateTime<Utc>>,
    pub action: String,
    pub summary: String,
    pub changes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertClass {
    Success,
    Warning,
    Danger,
}

impl AlertClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertClass::Success => "success",
            AlertClass::Warning => "warning",
            AlertClass::Danger => "danger",
        }
    }

    pub fn from_status(status: Option<&str>) -> Self {
        match status {
            Some("Warning") => AlertClass::Warning,
            Some("Fail") => AlertClass::Danger,
            _ => AlertClass::Success,
        }
    }
}

/// A FogBugz case. Built once from a `<case>` fragment and read-only after.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub(in crate::domain) id: u64,
    pub(in crate::domain) title: String,
    pub(in crate::domain) open: bool,
    pub(in crate::domain) mailbox_id: Option<u64>,
    pub(in crate::domain) priority: Option<Named>,
    pub(in crate::domain) category: Option<Named>,
    pub(in crate::domain) project: Option<Named>,
    pub(in crate::domain) customer_email: String,
    pub(in crate::domain) events: Vec<CaseEvent>,
    pub(in crate::domain) tags: Vec<String>,
    pub(in crate::domain) opened: DateTime<Utc>,
    pub(in crate::domain) closed: Option<DateTime<Utc>>,
    pub(in crate::domain) status: String,
    pub(in crate::domain) custom_fields: BTreeMap<String, String>,
}

impl Case {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn mailbox_id(&self) -> Option<u64> {
        self.mailbox_id
    }

    pub fn priority(&self) -> Option<&Named> {
        self.priority.as_ref()
    }

    pub fn category(&self) -> Option<&Named> {
        self.category.as_ref()
    }

    pub fn project(&self) -> Option<&Named> {
        self.project.as_ref()
    }

    /// Requester address; also the default recipient of a forwarded message.
    pub fn customer_email(&self) -> &str {
        &self.customer_email
    }

    pub fn events(&self) -> &[CaseEvent] {
        &self.events
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn opened(&self) -> DateTime<Utc> {
        self.opened
    }

    pub fn closed(&self) -> Option<DateTime<Utc>> {
        self.closed
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn custom_fields(&self) -> &BTreeMap<String, String> {
        &self.custom_fields
    }

    pub fn custom_field(&self, name: &str) -> Option<&str> {
        self.custom_fields.get(name).map(String::as_str)
    }

    /// Body of the first non-empty `Opened` event.
    pub fn summary(&self) -> Option<&str> {
        self.events
            .iter()
            .find(|event| event.action == "Opened" && !event.summary.is_empty())
            .map(|event| event.summary.as_str())
    }

    /// Events whose action is in `filter` (or [`DEFAULT_EVENT_FILTER`]),
    /// minus the noisy correspondent-change entries.
    pub fn filtered_events(&self, filter: Option<&[&str]>) -> Vec<&CaseEvent> {
        let filter = filter.unwrap_or(DEFAULT_EVENT_FILTER);
        self.events
            .iter()
            .filter(|event| filter.contains(&event.action.as_str()))
            .filter(|event| !event.changes.contains(CORRESPONDENT_CHANGE))
            .collect()
    }

    pub fn alert_class(&self) -> AlertClass {
        AlertClass::from_status(self.custom_field(ALERT_STATUS_FIELD))
    }
}
