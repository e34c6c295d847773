use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::domain::case::{
    ALERT_HEADER_FIELD, ALERT_STATUS_FIELD, Case, CaseEvent, NATURE_FIELD, Named,
};

pub const NATURE_COLUMN: &str = "plugin_customfields_at_fogcreek_com_natureg119";
pub const ALERT_STATUS_COLUMN: &str = "plugin_customfields_at_fogcreek_com_alertxstatusw51d";
pub const ALERT_HEADER_COLUMN: &str = "plugin_customfields_at_fogcreek_com_alertxheaderv51b";

/// Columns requested when the caller does not choose any; enough to fill
/// every [`Case`] field. `ixBug` always comes back as an attribute.
pub const DEFAULT_COLUMNS: &str = "sTitle,fOpen,dtOpened,dtClosed,sStatus,ixProject,sProject,\
ixCategory,sCategory,ixPriority,sPriority,ixMailbox,sCustomerEmail,events,tags,\
plugin_customfields_at_fogcreek_com_natureg119,\
plugin_customfields_at_fogcreek_com_alertxstatusw51d,\
plugin_customfields_at_fogcreek_com_alertxheaderv51b";

const CASE_ELEMENT: &[u8] = b"case";

#[derive(Debug, Error, PartialEq)]
pub enum CaseDecodeError {
    #[error("malformed case XML: {0}")]
    Malformed(String),
    #[error("case {case} is missing {field}")]
    MissingField { case: u64, field: &'static str },
    #[error("{field} is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("{field} is not a valid date: {value:?}")]
    InvalidDate { field: &'static str, value: String },
}

/// The `<case>` element as FogBugz sends it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CaseXml {
    #[serde(rename = "@ixBug")]
    ix_bug: Option<String>,
    #[serde(rename = "sTitle")]
    title: Option<String>,
    #[serde(rename = "fOpen")]
    open: Option<String>,
    #[serde(rename = "ixMailbox")]
    mailbox_id: Option<String>,
    #[serde(rename = "ixPriority")]
    priority_id: Option<String>,
    #[serde(rename = "sPriority")]
    priority: Option<String>,
    #[serde(rename = "ixCategory")]
    category_id: Option<String>,
    #[serde(rename = "sCategory")]
    category: Option<String>,
    #[serde(rename = "ixProject")]
    project_id: Option<String>,
    #[serde(rename = "sProject")]
    project: Option<String>,
    #[serde(rename = "sCustomerEmail")]
    customer_email: Option<String>,
    #[serde(rename = "dtOpened")]
    opened: Option<String>,
    #[serde(rename = "dtClosed")]
    closed: Option<String>,
    #[serde(rename = "sStatus")]
    status: Option<String>,
    events: Option<EventsXml>,
    tags: Option<TagsXml>,
    #[serde(rename = "plugin_customfields_at_fogcreek_com_natureg119")]
    nature: Option<String>,
    #[serde(rename = "plugin_customfields_at_fogcreek_com_alertxstatusw51d")]
    alert_status: Option<String>,
    #[serde(rename = "plugin_customfields_at_fogcreek_com_alertxheaderv51b")]
    alert_header: Option<String>,
    /// Set from a raw scan of the fragment; serde only sees known columns.
    #[serde(skip)]
    child_elements: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventsXml {
    #[serde(rename = "event")]
    items: Vec<EventXml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventXml {
    dt: Option<String>,
    #[serde(rename = "sVerb")]
    verb: Option<String>,
    #[serde(rename = "sHtml")]
    html: Option<String>,
    #[serde(rename = "sChanges")]
    changes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TagsXml {
    #[serde(rename = "tag")]
    items: Vec<String>,
}

impl CaseXml {
    /// Records whether the raw `<case>` element had any child element,
    /// including columns this type does not map.
    pub fn with_child_elements(mut self, present: bool) -> Self {
        self.child_elements = Some(present);
        self
    }

    fn has_children(&self) -> bool {
        if let Some(present) = self.child_elements {
            return present;
        }
        [
            &self.title,
            &self.open,
            &self.mailbox_id,
            &self.priority_id,
            &self.priority,
            &self.category_id,
            &self.category,
            &self.project_id,
            &self.project,
            &self.customer_email,
            &self.opened,
            &self.closed,
            &self.status,
            &self.nature,
            &self.alert_status,
            &self.alert_header,
        ]
        .iter()
        .any(|value| value.is_some())
            || self.events.is_some()
            || self.tags.is_some()
    }
}

/// For every outermost `<case>` element in `xml`, in document order, whether
/// it contains at least one child element.
pub fn case_child_elements(xml: &str) -> Result<Vec<bool>, CaseDecodeError> {
    let mut reader = Reader::from_str(xml);
    let mut found = Vec::new();
    let mut depth = 0usize;
    // Depth of the `<case>` currently open, if any.
    let mut case_depth: Option<usize> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                match case_depth {
                    Some(open) if depth == open + 1 => {
                        if let Some(last) = found.last_mut() {
                            *last = true;
                        }
                    }
                    None if e.local_name().as_ref() == CASE_ELEMENT => {
                        case_depth = Some(depth);
                        found.push(false);
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => match case_depth {
                Some(open) if depth == open => {
                    if let Some(last) = found.last_mut() {
                        *last = true;
                    }
                }
                None if e.local_name().as_ref() == CASE_ELEMENT => found.push(false),
                _ => {}
            },
            Ok(Event::End(_)) => {
                if case_depth == Some(depth) {
                    case_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(CaseDecodeError::Malformed(err.to_string())),
            _ => {}
        }
    }
    Ok(found)
}

impl Case {
    /// Decodes a standalone `<case>` fragment.
    ///
    /// `Ok(None)` means there is no such case: the fragment has no child
    /// elements or carries no usable `ixBug`.
    pub fn from_xml(fragment: &str) -> Result<Option<Case>, CaseDecodeError> {
        let has_children = case_child_elements(fragment)?
            .first()
            .copied()
            .unwrap_or(false);
        let wire: CaseXml = quick_xml::de::from_str(fragment)
            .map_err(|err| CaseDecodeError::Malformed(err.to_string()))?;
        Case::decode(wire.with_child_elements(has_children))
    }

    /// Only `ixBug` and `dtOpened` are required. Unreadable optional values
    /// are logged and left empty.
    pub fn decode(wire: CaseXml) -> Result<Option<Case>, CaseDecodeError> {
        if !wire.has_children() {
            return Ok(None);
        }
        let Some(id) = parse_id("ixBug", wire.ix_bug)? else {
            return Ok(None);
        };

        let opened = present(wire.opened)
            .ok_or(CaseDecodeError::MissingField {
                case: id,
                field: "dtOpened",
            })
            .and_then(|value| parse_date("dtOpened", &value))?;
        let closed = optional_date(id, "dtClosed", wire.closed);

        let priority = named(id, "ixPriority", wire.priority_id, wire.priority);
        let category = named(id, "ixCategory", wire.category_id, wire.category);
        let project = named(id, "ixProject", wire.project_id, wire.project);
        let mailbox_id = optional_id(id, "ixMailbox", wire.mailbox_id);

        let custom_fields = BTreeMap::from([
            (NATURE_FIELD.to_string(), wire.nature.unwrap_or_default()),
            (
                ALERT_STATUS_FIELD.to_string(),
                wire.alert_status.unwrap_or_default(),
            ),
            (
                ALERT_HEADER_FIELD.to_string(),
                wire.alert_header.unwrap_or_default(),
            ),
        ]);

        let events = wire
            .events
            .map(|events| events.items)
            .unwrap_or_default()
            .into_iter()
            .map(|event| CaseEvent {
                date: optional_date(id, "dt", event.dt),
                action: event.verb.unwrap_or_default(),
                summary: event.html.unwrap_or_default(),
                changes: event.changes.unwrap_or_default(),
            })
            .collect();

        let tags = wire.tags.map(|tags| tags.items).unwrap_or_default();

        Ok(Some(Case {
            id,
            title: wire.title.unwrap_or_default(),
            open: wire.open.as_deref().map(str::trim) == Some("true"),
            mailbox_id,
            priority,
            category,
            project,
            customer_email: wire.customer_email.unwrap_or_default(),
            events,
            tags,
            opened,
            closed,
            status: wire.status.unwrap_or_default(),
            custom_fields,
        }))
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// Empty and zero ids both mean "not set".
fn parse_id(field: &'static str, value: Option<String>) -> Result<Option<u64>, CaseDecodeError> {
    let Some(value) = present(value) else {
        return Ok(None);
    };
    let id = value
        .parse::<u64>()
        .map_err(|_| CaseDecodeError::InvalidNumber { field, value })?;
    Ok((id != 0).then_some(id))
}

fn optional_id(case: u64, field: &'static str, value: Option<String>) -> Option<u64> {
    parse_id(field, value).unwrap_or_else(|err| {
        warn!(case, error = %err, "ignoring unreadable case field");
        None
    })
}

fn named(
    case: u64,
    field: &'static str,
    id: Option<String>,
    name: Option<String>,
) -> Option<Named> {
    optional_id(case, field, id).map(|id| Named {
        id,
        name: name.unwrap_or_default(),
    })
}

fn optional_date(case: u64, field: &'static str, value: Option<String>) -> Option<DateTime<Utc>> {
    let value = present(value)?;
    parse_date(field, &value)
        .inspect_err(|err| warn!(case, error = %err, "ignoring unreadable case field"))
        .ok()
}

fn parse_date(field: &'static str, value: &str) -> Result<DateTime<Utc>, CaseDecodeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| CaseDecodeError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::case::AlertClass;

    const FULL_CASE: &str = r#"<case ixBug="1234" operations="edit,assign,resolve,email,remind">
<sTitle><![CDATA[Catalogue search unavailable]]></sTitle>
<fOpen>true</fOpen>
<dtOpened>2024-02-10T14:03:00Z</dtOpened>
<dtClosed></dtClosed>
<sStatus><![CDATA[Active]]></sStatus>
<ixProject>4</ixProject>
<sProject><![CDATA[Library Systems]]></sProject>
<ixCategory>2</ixCategory>
<sCategory><![CDATA[Feature]]></sCategory>
<ixPriority>3</ixPriority>
<sPriority><![CDATA[Must Fix]]></sPriority>
<ixMailbox>9</ixMailbox>
<sCustomerEmail><![CDATA[reader@example.com]]></sCustomerEmail>
<plugin_customfields_at_fogcreek_com_natureg119><![CDATA[Outage]]></plugin_customfields_at_fogcreek_com_natureg119>
<plugin_customfields_at_fogcreek_com_alertxstatusw51d><![CDATA[Fail]]></plugin_customfields_at_fogcreek_com_alertxstatusw51d>
<plugin_customfields_at_fogcreek_com_alertxheaderv51b><![CDATA[Search is down]]></plugin_customfields_at_fogcreek_com_alertxheaderv51b>
<events>
<event ixBugEvent="1" ixBug="1234"><dt>2024-02-10T14:03:00Z</dt><sVerb><![CDATA[Opened]]></sVerb><sHtml><![CDATA[<p>Nothing loads</p>]]></sHtml><sChanges></sChanges></event>
<event ixBugEvent="2" ixBug="1234"><dt>2024-02-10T15:00:00Z</dt><sVerb><![CDATA[Edited]]></sVerb><sHtml></sHtml><sChanges><![CDATA[Priority changed from '6' to '3'.]]></sChanges></event>
</events>
<tags><tag><![CDATA[catalogue]]></tag><tag><![CDATA[outage]]></tag></tags>
</case>"#;

    #[test]
    fn decodes_every_field() {
        let case = Case::from_xml(FULL_CASE).unwrap().unwrap();

        assert_eq!(case.id(), 1234);
        assert_eq!(case.title(), "Catalogue search unavailable");
        assert!(case.is_open());
        assert_eq!(
            case.opened(),
            Utc.with_ymd_and_hms(2024, 2, 10, 14, 3, 0).unwrap()
        );
        assert_eq!(case.closed(), None);
        assert_eq!(case.status(), "Active");
        assert_eq!(
            case.project(),
            Some(&Named {
                id: 4,
                name: "Library Systems".to_string()
            })
        );
        assert_eq!(case.category().map(|c| c.id), Some(2));
        assert_eq!(case.priority().map(|p| p.name.as_str()), Some("Must Fix"));
        assert_eq!(case.mailbox_id(), Some(9));
        assert_eq!(case.customer_email(), "reader@example.com");
        assert_eq!(case.custom_field(NATURE_FIELD), Some("Outage"));
        assert_eq!(case.custom_field(ALERT_HEADER_FIELD), Some("Search is down"));
        assert_eq!(case.alert_class(), AlertClass::Danger);
        assert_eq!(case.tags(), ["catalogue", "outage"]);

        let events = case.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "Opened");
        assert_eq!(events[0].summary, "<p>Nothing loads</p>");
        assert_eq!(events[1].changes, "Priority changed from '6' to '3'.");
        assert_eq!(case.summary(), Some("<p>Nothing loads</p>"));
    }

    #[test]
    fn empty_fragment_is_no_case() {
        assert_eq!(Case::from_xml(r#"<case ixBug="77"></case>"#), Ok(None));
        assert_eq!(Case::from_xml(r#"<case ixBug="77"/>"#), Ok(None));
    }

    #[test]
    fn missing_identifier_is_no_case() {
        let fragment = "<case><sTitle>Orphan</sTitle><dtOpened>2024-01-01T00:00:00Z</dtOpened></case>";
        assert_eq!(Case::from_xml(fragment), Ok(None));
    }

    #[test]
    fn minimal_fragment_leaves_optional_groups_absent() {
        let fragment = r#"<case ixBug="5"><sTitle>Lights</sTitle><fOpen>false</fOpen><sCustomerEmail>a@example.com</sCustomerEmail><dtOpened>2023-11-01T08:00:00Z</dtOpened><sStatus>Closed (Fixed)</sStatus></case>"#;
        let case = Case::from_xml(fragment).unwrap().unwrap();

        assert_eq!(case.id(), 5);
        assert!(!case.is_open());
        assert_eq!(case.status(), "Closed (Fixed)");
        assert_eq!(case.project(), None);
        assert_eq!(case.category(), None);
        assert_eq!(case.priority(), None);
        assert_eq!(case.mailbox_id(), None);
        assert_eq!(case.closed(), None);
        assert!(case.events().is_empty());
        assert!(case.tags().is_empty());
        assert_eq!(case.custom_field(ALERT_STATUS_FIELD), Some(""));
        assert_eq!(case.custom_fields().len(), 3);
        assert_eq!(case.alert_class(), AlertClass::Success);
    }

    #[test]
    fn zero_group_id_counts_as_absent() {
        let fragment = r#"<case ixBug="5"><dtOpened>2023-11-01T08:00:00Z</dtOpened><ixProject>0</ixProject><sProject>Inbox</sProject></case>"#;
        let case = Case::from_xml(fragment).unwrap().unwrap();
        assert_eq!(case.project(), None);
    }

    #[test]
    fn missing_opened_date_is_an_error() {
        let fragment = r#"<case ixBug="8"><sTitle>No date</sTitle></case>"#;
        assert_eq!(
            Case::from_xml(fragment),
            Err(CaseDecodeError::MissingField {
                case: 8,
                field: "dtOpened"
            })
        );
    }

    #[test]
    fn invalid_values_are_reported() {
        let bad_date = r#"<case ixBug="8"><dtOpened>yesterday</dtOpened></case>"#;
        assert!(matches!(
            Case::from_xml(bad_date),
            Err(CaseDecodeError::InvalidDate {
                field: "dtOpened",
                ..
            })
        ));

        let bad_id = r#"<case ixBug="eight"><dtOpened>2023-11-01T08:00:00Z</dtOpened></case>"#;
        assert!(matches!(
            Case::from_xml(bad_id),
            Err(CaseDecodeError::InvalidNumber { field: "ixBug", .. })
        ));
    }

    #[test]
    fn closed_date_is_read_when_present() {
        let fragment = r#"<case ixBug="9"><fOpen>false</fOpen><dtOpened>2023-11-01T08:00:00Z</dtOpened><dtClosed>2023-11-03T10:30:00Z</dtClosed></case>"#;
        let case = Case::from_xml(fragment).unwrap().unwrap();
        assert_eq!(
            case.closed(),
            Some(Utc.with_ymd_and_hms(2023, 11, 3, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn event_without_timestamp_is_kept() {
        let fragment = r#"<case ixBug="5"><sTitle>T</sTitle><dtOpened>2024-01-01T00:00:00Z</dtOpened><events><event><sVerb>Opened</sVerb><sHtml>hi</sHtml></event><event><dt>soon</dt><sVerb>Edited</sVerb></event></events></case>"#;
        let case = Case::from_xml(fragment).unwrap().unwrap();

        let events = case.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].date, None);
        assert_eq!(events[1].date, None);
        assert_eq!(case.summary(), Some("hi"));
    }

    #[test]
    fn unreadable_optional_values_are_left_empty() {
        let fragment = r#"<case ixBug="5"><dtOpened>2024-01-01T00:00:00Z</dtOpened><dtClosed>n/a</dtClosed><ixMailbox>inbox</ixMailbox><ixProject>four</ixProject><sProject>Web</sProject></case>"#;
        let case = Case::from_xml(fragment).unwrap().unwrap();

        assert_eq!(case.id(), 5);
        assert_eq!(case.closed(), None);
        assert_eq!(case.mailbox_id(), None);
        assert_eq!(case.project(), None);
    }

    #[test]
    fn unmapped_children_still_count_as_content() {
        let fragment = r#"<case ixBug="5"><ixPersonAssignedTo>3</ixPersonAssignedTo></case>"#;
        assert_eq!(
            Case::from_xml(fragment),
            Err(CaseDecodeError::MissingField {
                case: 5,
                field: "dtOpened"
            })
        );

        let fragment = r#"<case ixBug="5"><ixPersonAssignedTo>3</ixPersonAssignedTo><dtOpened>2024-01-01T00:00:00Z</dtOpened></case>"#;
        assert_eq!(Case::from_xml(fragment).unwrap().map(|case| case.id()), Some(5));
    }

    #[test]
    fn scans_child_elements_per_case() {
        let body = r#"<response><cases count="4"><case ixBug="1"/><case ixBug="2"><sTitle>A</sTitle></case><case ixBug="3"><events><event><dt/></event></events></case><case ixBug="4"></case></cases></response>"#;
        assert_eq!(
            case_child_elements(body).unwrap(),
            vec![false, true, true, false]
        );
        assert!(case_child_elements("<case><sTitle>open</case>").is_err());
    }
}
