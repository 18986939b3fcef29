//! Calendar tools end to end through the dispatcher, against an in-memory CalDAV server.

mod mocks;

use chrono::{Duration, Utc};
use icloud_gateway::credentials::resolver::{META_EMAIL, META_PASSWORD};
use icloud_gateway::session::DavCollection;
use icloud_gateway::{Config, Dispatcher, ErrorKind, Metrics, RequestMetadata, ToolRequest, ToolResult};
use mocks::MockSessionFactory;
use serde_json::{json, Value};
use std::sync::Arc;

const HOME: &str = "https://dav.example.com/1234/calendars/home/";
const WORK: &str = "https://dav.example.com/1234/calendars/work/";

fn metadata() -> RequestMetadata {
    RequestMetadata::new()
        .with(META_EMAIL, "user@icloud.com")
        .with(META_PASSWORD, "abcd-efgh-ijkl-mnop")
}

fn calendar(href: &str, name: &str, components: &[&str]) -> DavCollection {
    DavCollection {
        href: href.to_string(),
        display_name: Some(name.to_string()),
        is_calendar: true,
        is_addressbook: false,
        components: components.iter().map(|c| c.to_string()).collect(),
    }
}

fn ics(uid: &str, summary: &str, start: &str, end: &str, extra: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Fixture//EN\r\nBEGIN:VEVENT\r\nUID:{}\r\nDTSTAMP:20260101T000000Z\r\nDTSTART:{}\r\nDTEND:{}\r\nSUMMARY:{}\r\n{}END:VEVENT\r\nEND:VCALENDAR\r\n",
        uid, start, end, summary, extra
    )
}

fn stamp(offset_days: i64) -> String {
    (Utc::now() + Duration::days(offset_days))
        .format("%Y%m%dT%H%M%SZ")
        .to_string()
}

fn setup() -> (MockSessionFactory, Dispatcher) {
    let factory = MockSessionFactory::new();
    factory.upstream.add_collection(calendar(HOME, "Home", &["VEVENT"]));
    factory.upstream.add_collection(calendar(WORK, "Work", &["VEVENT"]));
    factory
        .upstream
        .add_collection(calendar("https://dav.example.com/1234/calendars/tasks/", "Reminders \u{26A0}\u{FE0F}", &["VTODO"]));
    let dispatcher = Dispatcher::new(&Config::default(), Arc::new(factory.clone()), Metrics::new());
    (factory, dispatcher)
}

async fn call(dispatcher: &Dispatcher, tool: &str, args: Value) -> Value {
    match dispatcher.dispatch(ToolRequest::new(tool, args, metadata())).await {
        ToolResult::Success(value) => value,
        failure => panic!("{} failed: {:?}", tool, failure),
    }
}

#[tokio::test]
async fn test_list_calendars() {
    let (_factory, dispatcher) = setup();
    let calendars = call(&dispatcher, "calendar_list_calendars", json!({})).await;
    let calendars = calendars.as_array().unwrap();
    assert_eq!(calendars.len(), 3);
    assert_eq!(calendars[0]["id"], "home");
    assert_eq!(calendars[0]["url"], HOME);
    assert_eq!(calendars[2]["supports_events"], false);
}

#[tokio::test]
async fn test_default_window_is_bounded_and_non_empty() {
    let (factory, dispatcher) = setup();
    let upstream = &factory.upstream;
    upstream.add_object(
        &format!("{}soon.ics", HOME),
        &ics("soon", "Soon", &stamp(7), &stamp(7), ""),
    );
    upstream.add_object(
        &format!("{}ancient.ics", HOME),
        &ics("ancient", "Ancient", &stamp(-400), &stamp(-400), ""),
    );
    upstream.add_object(
        &format!("{}distant.ics", WORK),
        &ics("distant", "Distant", &stamp(800), &stamp(800), ""),
    );
    upstream.add_object(
        &format!("{}recent.ics", WORK),
        &ics("recent", "Recent", &stamp(-10), &stamp(-10), ""),
    );

    let events = call(&dispatcher, "calendar_list_events", json!({})).await;
    let summaries: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["summary"].as_str().unwrap())
        .collect();

    assert_eq!(summaries, vec!["Recent", "Soon"]);
}

#[tokio::test]
async fn test_explicit_window_and_calendar_filter() {
    let (factory, dispatcher) = setup();
    factory.upstream.add_object(
        &format!("{}a.ics", HOME),
        &ics("a", "Dentist", "20260310T090000Z", "20260310T100000Z", ""),
    );
    factory.upstream.add_object(
        &format!("{}b.ics", WORK),
        &ics("b", "Standup", "20260310T090000Z", "20260310T091500Z", ""),
    );

    let events = call(
        &dispatcher,
        "calendar_list_events",
        json!({"calendar_id": "work", "start_date": "2026-03-10", "end_date": "2026-03-10"}),
    )
    .await;
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["summary"], "Standup");
    assert_eq!(events[0]["calendar"], WORK);
}

#[tokio::test]
async fn test_malformed_event_degrades_to_warning() {
    let (factory, dispatcher) = setup();
    factory.upstream.add_object(
        &format!("{}good.ics", HOME),
        &ics("good", "Good", &stamp(3), &stamp(3), ""),
    );
    factory
        .upstream
        .add_object(&format!("{}broken.ics", HOME), "this is not iCalendar");

    let events = call(&dispatcher, "calendar_list_events", json!({})).await;
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 2);

    let good = events.iter().find(|e| e["summary"] == "Good").unwrap();
    assert!(good.get("warnings").is_none());

    let broken = events
        .iter()
        .find(|e| e["id"].as_str().unwrap().ends_with("broken.ics"))
        .unwrap();
    assert!(!broken["warnings"].as_array().unwrap().is_empty());
    assert!(broken["summary"].is_null());
}

#[tokio::test]
async fn test_partial_update_keeps_other_fields() {
    let (factory, dispatcher) = setup();

    let created = call(
        &dispatcher,
        "calendar_create_event",
        json!({
            "summary": "Team lunch",
            "start": "2026-05-01T12:00:00Z",
            "end": "2026-05-01T13:00:00Z",
            "description": "Bring receipts",
            "location": "Cafe",
            "attendees": ["bob@example.com"]
        }),
    )
    .await;
    let event_id = created["id"].as_str().unwrap().to_string();
    assert!(event_id.starts_with(HOME));
    assert_eq!(created["attendees"], json!(["bob@example.com"]));

    let updated = call(
        &dispatcher,
        "calendar_update_event",
        json!({"event_id": event_id, "summary": "Team lunch (moved)"}),
    )
    .await;
    assert_eq!(updated["summary"], "Team lunch (moved)");
    assert_eq!(updated["description"], "Bring receipts");
    assert_eq!(updated["location"], "Cafe");
    assert_eq!(updated["start"], created["start"]);
    assert_eq!(updated["attendees"], json!(["bob@example.com"]));

    let stored = factory.upstream.object(&event_id).unwrap();
    let data = stored.data.unwrap();
    assert!(data.contains("LOCATION:Cafe"));
    assert!(data.contains("SEQUENCE:1"));
}

#[tokio::test]
async fn test_all_day_event_from_dates() {
    let (_factory, dispatcher) = setup();
    let created = call(
        &dispatcher,
        "calendar_create_event",
        json!({"summary": "Holiday", "start": "2026-07-04", "end": "2026-07-05", "calendar_id": "work"}),
    )
    .await;
    assert_eq!(created["all_day"], true);
    assert_eq!(created["start"], "2026-07-04");
    assert!(created["id"].as_str().unwrap().starts_with(WORK));
}

#[tokio::test]
async fn test_update_without_fields_is_rejected() {
    let (factory, dispatcher) = setup();
    let result = dispatcher
        .dispatch(ToolRequest::new(
            "calendar_update_event",
            json!({"event_id": format!("{}x.ics", HOME)}),
            metadata(),
        ))
        .await;
    assert_eq!(result.kind(), Some(ErrorKind::InvalidArgument));
    assert_eq!(factory.upstream.open_attempts(), 0);
}

#[tokio::test]
async fn test_search_and_delete() {
    let (factory, dispatcher) = setup();
    let href = format!("{}dentist.ics", HOME);
    factory.upstream.add_object(
        &href,
        &ics("d", "Dentist", &stamp(2), &stamp(2), "LOCATION:Main Street\r\n"),
    );
    factory.upstream.add_object(
        &format!("{}other.ics", HOME),
        &ics("o", "Gym", &stamp(2), &stamp(2), ""),
    );

    let found = call(&dispatcher, "calendar_search_events", json!({"query": "main street"})).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["id"], href.as_str());

    let ack = call(&dispatcher, "calendar_delete_event", json!({"event_id": href})).await;
    assert_eq!(ack["status"], "success");
    assert!(factory.upstream.object(&href).is_none());
}
