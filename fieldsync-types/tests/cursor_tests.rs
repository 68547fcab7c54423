use chrono::NaiveDate;
use fieldsync_types::{AggregateCursor, Cursor, CursorType};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::cmp::Ordering;

fn aggregate(date: &str, uri: &str) -> Cursor {
    Cursor::from_server(&format!(
        "<cursor xmlns=\"http://www.opendatakit.org/cursor\">\
         <attributeName>_LAST_UPDATE_DATE</attributeName>\
         <attributeValue>{date}</attributeValue>\
         <uriLastReturnedValue>{uri}</uriLastReturnedValue>\
         <isForwardCursor>true</isForwardCursor></cursor>"
    ))
}

// ── Parsing ───────────────────────────────────────────────────────

#[test]
fn from_server_parses_aggregate_document() {
    let cursor = aggregate("2018-03-01T10:00:00.000+0000", "uuid:abc");
    let Cursor::Aggregate(inner) = &cursor else {
        panic!("expected aggregate cursor, got {cursor:?}");
    };
    assert_eq!(inner.last_returned_value(), Some("uuid:abc"));
    assert_eq!(
        inner.last_update().unwrap().to_rfc3339(),
        "2018-03-01T10:00:00+00:00"
    );
}

#[test]
fn from_server_blank_is_empty() {
    assert!(Cursor::from_server("").is_empty());
    assert!(Cursor::from_server("  \n").is_empty());
}

#[test]
fn from_server_keeps_unknown_tokens_verbatim() {
    let cursor = Cursor::from_server("page-42");
    assert_eq!(cursor, Cursor::Opaque("page-42".into()));
}

#[test]
fn aggregate_parse_rejects_other_roots() {
    assert!(AggregateCursor::parse("<token>1</token>").is_err());
}

#[test]
fn date_cursor_renders_aggregate_document_for_server() {
    let cursor = Cursor::of_date(NaiveDate::from_ymd_opt(2020, 5, 17).unwrap());
    let value = cursor.value_for_server().unwrap();
    assert!(value.contains("<attributeValue>2020-05-17T00:00:00.000+0000</attributeValue>"));
    assert!(!value.contains("uriLastReturnedValue"));

    let reparsed = AggregateCursor::parse(&value).unwrap();
    assert_eq!(reparsed.last_returned_value(), None);
}

#[test]
fn empty_cursor_sends_nothing() {
    assert_eq!(Cursor::Empty.value_for_server(), None);
}

// ── Recency ───────────────────────────────────────────────────────

#[test]
fn empty_is_older_than_every_variant() {
    let others = [
        aggregate("2018-03-01T10:00:00.000+0000", "uuid:a"),
        Cursor::Opaque("x".into()),
        Cursor::of_date(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()),
    ];
    for other in &others {
        assert_eq!(Cursor::Empty.compare_recency(other), Some(Ordering::Less));
        assert!(other.is_newer_than(&Cursor::Empty));
    }
}

#[test]
fn aggregate_cursors_order_by_date_then_uri() {
    let early = aggregate("2018-03-01T10:00:00.000+0000", "uuid:z");
    let late = aggregate("2018-03-02T10:00:00.000+0000", "uuid:a");
    let late_b = aggregate("2018-03-02T10:00:00.000+0000", "uuid:b");
    assert!(late.is_newer_than(&early));
    assert!(late_b.is_newer_than(&late));
    assert!(!early.is_newer_than(&late));
}

#[test]
fn different_variants_are_incomparable() {
    let a = aggregate("2018-03-01T10:00:00.000+0000", "uuid:a");
    let d = Cursor::of_date(NaiveDate::from_ymd_opt(2018, 1, 1).unwrap());
    assert_eq!(a.compare_recency(&d), None);
    assert!(!a.is_newer_than(&d));
    assert!(!d.is_newer_than(&a));
}

#[test]
fn advance_never_regresses_within_variant() {
    let newer = aggregate("2018-03-02T10:00:00.000+0000", "uuid:a");
    let older = aggregate("2018-03-01T10:00:00.000+0000", "uuid:a");
    assert_eq!(newer.clone().advance_to(older.clone()), newer);
    assert_eq!(older.advance_to(newer.clone()), newer);
    assert_eq!(newer.clone().advance_to(Cursor::Empty), newer);
}

#[test]
fn advance_accepts_incomparable_candidate() {
    let date = Cursor::of_date(NaiveDate::from_ymd_opt(2018, 1, 1).unwrap());
    let server = aggregate("2017-01-01T00:00:00.000+0000", "uuid:a");
    assert_eq!(date.advance_to(server.clone()), server);
}

#[test]
fn race_picks_first_non_empty() {
    let date = Cursor::of_date(NaiveDate::from_ymd_opt(2018, 1, 1).unwrap());
    let stored = Cursor::Opaque("stored".into());
    assert_eq!(
        Cursor::race([Cursor::Empty, date.clone(), stored.clone()]),
        date
    );
    assert_eq!(Cursor::race([Cursor::Empty, stored.clone()]), stored);
    assert_eq!(Cursor::race([Cursor::Empty, Cursor::Empty]), Cursor::Empty);
    assert_eq!(Cursor::race(Vec::new()), Cursor::Empty);
}

// ── Serialization ─────────────────────────────────────────────────

#[test]
fn serialize_reports_type() {
    assert_eq!(Cursor::Empty.serialize(), (CursorType::Empty, String::new()));
    let (kind, value) = Cursor::of_date(NaiveDate::from_ymd_opt(2021, 2, 3).unwrap()).serialize();
    assert_eq!(kind, CursorType::Date);
    assert_eq!(value, "2021-02-03");
}

#[test]
fn deserialize_rejects_unknown_type() {
    assert!(Cursor::deserialize("bogus", "x").is_err());
    assert!(Cursor::deserialize("date", "yesterday").is_err());
}

#[test]
fn serde_uses_type_value_pair() {
    let cursor = aggregate("2018-03-01T10:00:00.000+0000", "uuid:a");
    let json = serde_json::to_value(&cursor).unwrap();
    assert_eq!(json["type"], "aggregate");
    let back: Cursor = serde_json::from_value(json).unwrap();
    assert_eq!(back, cursor);
}

#[test]
fn aggregate_cursor_serde_goes_through_the_document() {
    let Cursor::Aggregate(inner) = aggregate("2018-03-01T10:00:00.000+0000", "uuid:a") else {
        panic!("expected aggregate cursor");
    };
    let json = serde_json::to_value(&inner).unwrap();
    assert_eq!(json, serde_json::Value::String(inner.raw().to_string()));

    let back: AggregateCursor = serde_json::from_value(json).unwrap();
    assert_eq!(back.last_returned_value(), Some("uuid:a"));
    assert_eq!(back, inner);

    // The ordering key always comes from the parsed text.
    let forged = serde_json::json!({
        "last_update": null,
        "last_returned_value": "uuid:z",
        "raw": "<cursor/>",
    });
    assert!(serde_json::from_value::<AggregateCursor>(forged).is_err());
    assert!(serde_json::from_str::<AggregateCursor>("\"<other/>\"").is_err());
}

fn arb_cursor() -> impl Strategy<Value = Cursor> {
    prop_oneof![
        Just(Cursor::Empty),
        "[a-zA-Z0-9:_-]{1,24}".prop_map(Cursor::Opaque),
        (1970i32..2100, 1u32..13, 1u32..29).prop_map(|(y, m, d)| {
            Cursor::of_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
        }),
        (0i64..4_000_000_000, "uuid:[a-f0-9]{8}").prop_map(|(secs, uri)| {
            let date = chrono::DateTime::from_timestamp(secs, 0).unwrap();
            aggregate(&date.format("%Y-%m-%dT%H:%M:%S%.3f+0000").to_string(), &uri)
        }),
    ]
}

proptest! {
    #[test]
    fn serialize_roundtrips(cursor in arb_cursor()) {
        let (kind, value) = cursor.serialize();
        let back = Cursor::deserialize(kind.as_str(), &value).unwrap();
        prop_assert_eq!(back, cursor);
    }

    #[test]
    fn advance_is_monotonic(a in arb_cursor(), b in arb_cursor()) {
        let advanced = a.clone().advance_to(b.clone());
        if a.compare_recency(&b).is_some() {
            prop_assert!(!a.is_newer_than(&advanced));
        }
    }
}
