//! Resume tokens marking how far a form has been synchronized.
//!
//! A cursor is opaque to callers: it is produced by a server (or by a
//! "resume from date" request), stored alongside the form metadata and handed
//! back on the next pull. Cursors serialize to a `(type, value)` pair so that
//! any persistence adapter can store them as two strings.
//!
//! Ordering is only defined within a variant. An empty cursor is older than
//! anything else; two cursors of different non-empty variants are
//! incomparable and `compare_recency` returns `None` for them.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const CURSOR_NAMESPACE: &str = "http://www.opendatakit.org/cursor";
const LAST_UPDATE_ATTRIBUTE: &str = "_LAST_UPDATE_DATE";

/// A resume token for one form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "SerializedCursor", try_from = "SerializedCursor")]
pub enum Cursor {
    /// Nothing has been synchronized yet.
    #[default]
    Empty,
    /// A structured cursor document returned by an Aggregate server.
    Aggregate(AggregateCursor),
    /// A server token this crate cannot interpret.
    Opaque(String),
    /// A user-supplied "resume from this day" marker.
    Date(NaiveDate),
}

/// The persisted discriminant of a [`Cursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorType {
    Empty,
    Aggregate,
    Opaque,
    Date,
}

impl CursorType {
    /// Returns the persisted name of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CursorType::Empty => "empty",
            CursorType::Aggregate => "aggregate",
            CursorType::Opaque => "opaque",
            CursorType::Date => "date",
        }
    }
}

impl fmt::Display for CursorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CursorType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "empty" => Ok(CursorType::Empty),
            "aggregate" => Ok(CursorType::Aggregate),
            "opaque" => Ok(CursorType::Opaque),
            "date" => Ok(CursorType::Date),
            other => Err(crate::Error::UnknownCursorType(other.to_string())),
        }
    }
}

impl Cursor {
    /// Builds a cursor that resumes from the start of the given day.
    #[must_use]
    pub fn of_date(date: NaiveDate) -> Self {
        Cursor::Date(date)
    }

    /// Interprets a token returned by a server.
    ///
    /// Blank tokens become [`Cursor::Empty`]; well-formed Aggregate cursor
    /// documents become [`Cursor::Aggregate`]; anything else is kept verbatim.
    #[must_use]
    pub fn from_server(value: &str) -> Self {
        if value.trim().is_empty() {
            return Cursor::Empty;
        }
        match AggregateCursor::parse(value) {
            Ok(cursor) => Cursor::Aggregate(cursor),
            Err(_) => Cursor::Opaque(value.to_string()),
        }
    }

    /// Returns true for the empty cursor.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Cursor::Empty)
    }

    /// Returns the variant of this cursor.
    #[must_use]
    pub fn cursor_type(&self) -> CursorType {
        match self {
            Cursor::Empty => CursorType::Empty,
            Cursor::Aggregate(_) => CursorType::Aggregate,
            Cursor::Opaque(_) => CursorType::Opaque,
            Cursor::Date(_) => CursorType::Date,
        }
    }

    /// Serializes into a `(type, value)` pair.
    #[must_use]
    pub fn serialize(&self) -> (CursorType, String) {
        let value = match self {
            Cursor::Empty => String::new(),
            Cursor::Aggregate(cursor) => cursor.raw.clone(),
            Cursor::Opaque(value) => value.clone(),
            Cursor::Date(date) => date.format("%Y-%m-%d").to_string(),
        };
        (self.cursor_type(), value)
    }

    /// Rebuilds a cursor from a `(type, value)` pair produced by [`Cursor::serialize`].
    pub fn deserialize(cursor_type: &str, value: &str) -> crate::Result<Self> {
        match cursor_type.parse::<CursorType>()? {
            CursorType::Empty => Ok(Cursor::Empty),
            CursorType::Aggregate => AggregateCursor::parse(value).map(Cursor::Aggregate),
            CursorType::Opaque => Ok(Cursor::Opaque(value.to_string())),
            CursorType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(Cursor::Date)
                .map_err(|e| crate::Error::InvalidCursor {
                    kind: "date",
                    reason: e.to_string(),
                }),
        }
    }

    /// Returns the token to send to a server, or `None` to start from scratch.
    #[must_use]
    pub fn value_for_server(&self) -> Option<String> {
        match self {
            Cursor::Empty => None,
            Cursor::Aggregate(cursor) => Some(cursor.raw.clone()),
            Cursor::Opaque(value) => Some(value.clone()),
            Cursor::Date(date) => Some(AggregateCursor::from_date(*date).raw),
        }
    }

    /// Compares how far two cursors have progressed.
    ///
    /// Returns `None` when the cursors are of different non-empty variants.
    #[must_use]
    pub fn compare_recency(&self, other: &Cursor) -> Option<Ordering> {
        match (self, other) {
            (Cursor::Empty, Cursor::Empty) => Some(Ordering::Equal),
            (Cursor::Empty, _) => Some(Ordering::Less),
            (_, Cursor::Empty) => Some(Ordering::Greater),
            (Cursor::Aggregate(a), Cursor::Aggregate(b)) => Some(a.cmp(b)),
            (Cursor::Opaque(a), Cursor::Opaque(b)) => Some(a.cmp(b)),
            (Cursor::Date(a), Cursor::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Returns true if this cursor is strictly newer than `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &Cursor) -> bool {
        self.compare_recency(other) == Some(Ordering::Greater)
    }

    /// Returns the cursor to store after a sync that ended at `candidate`.
    ///
    /// The current cursor is kept when the candidate is comparable and not
    /// newer. Incomparable candidates replace the current cursor, since they
    /// come from a server that no longer speaks the stored variant.
    #[must_use]
    pub fn advance_to(self, candidate: Cursor) -> Cursor {
        match self.compare_recency(&candidate) {
            Some(Ordering::Less) | None => candidate,
            Some(Ordering::Equal) | Some(Ordering::Greater) => self,
        }
    }

    /// Picks the first non-empty cursor among the candidates.
    ///
    /// Candidates are listed in priority order, e.g. an explicit "resume from
    /// date" argument, then the stored cursor.
    #[must_use]
    pub fn race<I>(candidates: I) -> Cursor
    where
        I: IntoIterator<Item = Cursor>,
    {
        candidates
            .into_iter()
            .find(|cursor| !cursor.is_empty())
            .unwrap_or_default()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Empty => f.write_str("(empty)"),
            Cursor::Aggregate(cursor) => match (&cursor.last_update, &cursor.last_returned_value) {
                (Some(date), Some(uri)) => write!(f, "{} / {}", date.to_rfc3339(), uri),
                (Some(date), None) => write!(f, "{}", date.to_rfc3339()),
                _ => f.write_str("(aggregate)"),
            },
            Cursor::Opaque(value) => f.write_str(value),
            Cursor::Date(date) => write!(f, "{date}"),
        }
    }
}

/// The cursor document returned by Aggregate's `submissionList` endpoint.
///
/// ```xml
/// <cursor xmlns="http://www.opendatakit.org/cursor">
///   <attributeName>_LAST_UPDATE_DATE</attributeName>
///   <attributeValue>2018-03-01T10:00:00.000+0000</attributeValue>
///   <uriLastReturnedValue>uuid:...</uriLastReturnedValue>
///   <isForwardCursor>true</isForwardCursor>
/// </cursor>
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AggregateCursor {
    last_update: Option<DateTime<Utc>>,
    last_returned_value: Option<String>,
    raw: String,
}

impl AggregateCursor {
    /// Parses a cursor document.
    pub fn parse(xml: &str) -> crate::Result<Self> {
        let invalid = |reason: String| crate::Error::InvalidCursor {
            kind: "aggregate",
            reason,
        };

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut saw_root = false;
        let mut current: Option<String> = None;
        let mut attribute_value: Option<String> = None;
        let mut last_returned_value: Option<String> = None;

        loop {
            match reader.read_event().map_err(|e| invalid(e.to_string()))? {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if !saw_root {
                        if name != "cursor" {
                            return Err(invalid(format!("unexpected root element <{name}>")));
                        }
                        saw_root = true;
                    }
                    current = Some(name);
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| invalid(e.to_string()))?;
                    match current.as_deref() {
                        Some("attributeValue") => attribute_value = Some(text.into_owned()),
                        Some("uriLastReturnedValue") => {
                            last_returned_value = Some(text.into_owned())
                        }
                        _ => {}
                    }
                }
                Event::End(_) => current = None,
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(invalid("missing <cursor> element".to_string()));
        }

        let last_update = match attribute_value {
            Some(value) => Some(parse_aggregate_date(&value).ok_or_else(|| {
                invalid(format!("unparseable attributeValue {value:?}"))
            })?),
            None => None,
        };

        Ok(Self {
            last_update,
            last_returned_value: last_returned_value.filter(|v| !v.is_empty()),
            raw: xml.to_string(),
        })
    }

    /// Builds a cursor positioned at the start of `date`, with no last-returned uri.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        let last_update = date.and_time(NaiveTime::MIN).and_utc();
        let raw = format!(
            "<cursor xmlns=\"{CURSOR_NAMESPACE}\">\
             <attributeName>{LAST_UPDATE_ATTRIBUTE}</attributeName>\
             <attributeValue>{}</attributeValue>\
             <isForwardCursor>true</isForwardCursor>\
             </cursor>",
            quick_xml::escape::escape(format_aggregate_date(&last_update).as_str())
        );
        Self {
            last_update: Some(last_update),
            last_returned_value: None,
            raw,
        }
    }

    /// Timestamp of the last submission covered by this cursor.
    #[must_use]
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Instance id of the last submission covered by this cursor.
    #[must_use]
    pub fn last_returned_value(&self) -> Option<&str> {
        self.last_returned_value.as_deref()
    }

    /// The document exactly as the server sent it.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn sort_key(&self) -> (Option<DateTime<Utc>>, Option<&str>, &str) {
        (
            self.last_update,
            self.last_returned_value.as_deref(),
            self.raw.as_str(),
        )
    }
}

impl PartialEq for AggregateCursor {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for AggregateCursor {}

impl PartialOrd for AggregateCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AggregateCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl TryFrom<String> for AggregateCursor {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AggregateCursor::parse(&value)
    }
}

impl From<AggregateCursor> for String {
    fn from(cursor: AggregateCursor) -> Self {
        cursor.raw
    }
}

fn parse_aggregate_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn format_aggregate_date(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.3f+0000").to_string()
}

#[derive(Serialize, Deserialize)]
struct SerializedCursor {
    #[serde(rename = "type")]
    cursor_type: String,
    value: String,
}

impl From<Cursor> for SerializedCursor {
    fn from(cursor: Cursor) -> Self {
        let (cursor_type, value) = cursor.serialize();
        Self {
            cursor_type: cursor_type.as_str().to_string(),
            value,
        }
    }
}

impl TryFrom<SerializedCursor> for Cursor {
    type Error = crate::Error;

    fn try_from(value: SerializedCursor) -> Result<Self, Self::Error> {
        Cursor::deserialize(&value.cursor_type, &value.value)
    }
}
