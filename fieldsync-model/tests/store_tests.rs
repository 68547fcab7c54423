use chrono::{NaiveDate, TimeZone, Utc};
use fieldsync_model::{
    FormMetadata, InMemoryMetadataStore, JsonFileMetadataStore, LastExportedSubmission,
    MetadataPort, ModelError, RemoteSource, SubmissionMetadata, Workspace, sanitize_file_name,
    sanitize_instance_id,
};
use fieldsync_types::{Cursor, FormKey};
use pretty_assertions::assert_eq;
use std::path::Path;

fn key(id: &str) -> FormKey {
    FormKey::of(id).unwrap()
}

fn form(id: &str) -> FormMetadata {
    FormMetadata::new(key(id), format!("{id} form"), format!("/ws/forms/{id}/{id}.xml"))
}

fn date(y: i32, m: u32, d: u32) -> Cursor {
    Cursor::of_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

// ── FormMetadata ────────────────────────────────────────────────

#[test]
fn cursor_never_moves_backward() {
    let mut meta = form("a").with_cursor(date(2024, 3, 1));
    meta.advance_cursor(date(2024, 1, 1));
    assert_eq!(meta.cursor, date(2024, 3, 1));
    meta.advance_cursor(date(2024, 5, 1));
    assert_eq!(meta.cursor, date(2024, 5, 1));
    meta.advance_cursor(Cursor::Empty);
    assert_eq!(meta.cursor, date(2024, 5, 1));
}

#[test]
fn clean_cursor_resets_to_empty() {
    let mut meta = form("a").with_cursor(date(2024, 3, 1));
    meta.clean_cursor();
    assert!(meta.cursor.is_empty());
}

#[test]
fn last_exported_keeps_newest_submission() {
    let mut meta = form("a");
    let now = Utc::now();
    let newer = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    meta.mark_exported(LastExportedSubmission::new("uuid:2", newer, now));
    meta.mark_exported(LastExportedSubmission::new("uuid:1", older, now));
    assert_eq!(meta.last_exported.unwrap().instance_id, "uuid:2");
}

#[test]
fn directories_derive_from_form_file() {
    let meta = form("household");
    assert_eq!(meta.form_dir(), Path::new("/ws/forms/household"));
    assert_eq!(meta.media_dir(), Path::new("/ws/forms/household/household-media"));
    assert_eq!(
        meta.submission_file("uuid:1"),
        Path::new("/ws/forms/household/instances/uuid1/submission.xml")
    );
}

#[test]
fn form_metadata_serde_roundtrip() {
    let meta = form("a")
        .with_encrypted(true)
        .with_remote(RemoteSource {
            download_url: Some("https://x/formXml?formId=a".into()),
            manifest_url: None,
        })
        .with_cursor(date(2024, 1, 2));
    let json = serde_json::to_string(&meta).unwrap();
    let back: FormMetadata = serde_json::from_str(&json).unwrap();
    assert_eq!(back, meta);
}

#[test]
fn submission_metadata_can_be_repointed() {
    let mut sub = SubmissionMetadata::new(key("a"), "uuid:1", "/old/submission.xml", None);
    sub.repoint("/new/dir/submission.xml");
    assert_eq!(sub.submission_dir(), Path::new("/new/dir"));
}

// ── Stores ──────────────────────────────────────────────────────

fn exercise_store(store: &dyn MetadataPort) {
    assert_eq!(store.fetch(&key("a")).unwrap(), None);

    store.persist(form("a")).unwrap();
    store.persist(form("b")).unwrap();
    let mut updated = form("a");
    updated.mark_pulled();
    store.persist(updated.clone()).unwrap();

    assert_eq!(store.fetch(&key("a")).unwrap(), Some(updated));
    assert_eq!(store.fetch_all().unwrap().len(), 2);

    store
        .persist_submission(SubmissionMetadata::new(key("a"), "uuid:2", "/x/2.xml", None))
        .unwrap();
    store
        .persist_submission(SubmissionMetadata::new(key("a"), "uuid:1", "/x/1.xml", None))
        .unwrap();
    let ids: Vec<String> = store
        .fetch_submissions(&key("a"))
        .unwrap()
        .into_iter()
        .map(|s| s.instance_id)
        .collect();
    assert_eq!(ids, vec!["uuid:1", "uuid:2"]);
    assert!(store.fetch_submissions(&key("b")).unwrap().is_empty());
}

#[test]
fn in_memory_store_contract() {
    exercise_store(&InMemoryMetadataStore::new());
}

#[test]
fn json_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    exercise_store(&JsonFileMetadataStore::open(dir.path().join("meta.json")).unwrap());
}

#[test]
fn failed_command_leaves_store_untouched() {
    let store = InMemoryMetadataStore::new();
    store.persist(form("a")).unwrap();
    let result = store.execute(&mut |state| {
        state.upsert_form(form("b"));
        Err(ModelError::Store("abort".into()))
    });
    assert!(result.is_err());
    assert_eq!(store.fetch_all().unwrap().len(), 1);
}

#[test]
fn clean_cursor_through_port() {
    let store = InMemoryMetadataStore::new();
    store.persist(form("a").with_cursor(date(2024, 1, 1))).unwrap();
    store.clean_cursor(&key("a")).unwrap();
    assert!(store.fetch(&key("a")).unwrap().unwrap().cursor.is_empty());
    assert!(store.clean_cursor(&key("missing")).is_err());
}

#[test]
fn json_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("meta.json");
    {
        let store = JsonFileMetadataStore::open(&path).unwrap();
        store.persist(form("a").with_cursor(date(2024, 1, 1))).unwrap();
    }
    let reopened = JsonFileMetadataStore::open(&path).unwrap();
    assert_eq!(
        reopened.fetch(&key("a")).unwrap().unwrap().cursor,
        date(2024, 1, 1)
    );
    assert!(!path.with_extension("json.tmp").exists());
}

// ── Workspace ───────────────────────────────────────────────────

const FORM: &str = r#"<h:html xmlns:h="x"><h:head><h:title>Simple</h:title><model>
    <instance><data id="simple" version="1"><a/><meta><instanceID/></meta></data></instance>
  </model></h:head></h:html>"#;

#[test]
fn sanitizes_names() {
    assert_eq!(sanitize_file_name("a/b:c?"), "a_b_c_");
    assert_eq!(sanitize_file_name("  My Form  "), "My Form");
    assert_eq!(sanitize_file_name(".."), "_");
    assert_eq!(sanitize_instance_id("uuid:1234-abcd"), "uuid1234-abcd");
}

#[test]
fn instance_directories_never_collide() {
    let ids = [
        "uuid:ab",
        "uuidab",
        "uuid:a/b",
        "uuid:a_b",
        "uuid:a:b",
        "uuid:",
        "..",
        "~uuidab",
        "a b",
        "a%20b",
    ];
    let dirs: std::collections::HashSet<String> =
        ids.iter().map(|id| sanitize_instance_id(id)).collect();
    assert_eq!(dirs.len(), ids.len());
    for dir in &dirs {
        assert!(!dir.contains('/') && !dir.contains('\\') && !dir.contains(':'), "{dir}");
        assert!(!dir.starts_with('.'), "{dir}");
    }
}

#[test]
fn form_layout_under_forms_dir() {
    let ws = Workspace::new("/ws");
    assert_eq!(ws.form_file("My: Form"), Path::new("/ws/forms/My_ Form/My_ Form.xml"));
    let meta = ws.form_metadata(key("f"), "Simple");
    assert_eq!(meta.form_file, Path::new("/ws/forms/Simple/Simple.xml"));
}

#[test]
fn scans_forms_and_submissions() {
    let dir = tempfile::tempdir().unwrap();
    let ws = Workspace::new(dir.path());
    assert!(ws.scan_forms().unwrap().is_empty());

    let form_file = ws.form_file("Simple");
    std::fs::create_dir_all(form_file.parent().unwrap()).unwrap();
    std::fs::write(&form_file, FORM).unwrap();
    std::fs::create_dir_all(ws.forms_dir().join("junk")).unwrap();

    let forms = ws.scan_forms().unwrap();
    assert_eq!(forms.len(), 1);
    let meta = &forms[0];
    assert_eq!(meta.key.to_string(), "simple[1]");
    assert_eq!(meta.form_name, "Simple");

    for (iid, body) in [
        ("uuid:1", r#"<data id="simple" instanceID="uuid:1" submissionDate="2024-01-01T00:00:00Z"/>"#),
        ("uuid:2", "<data><broken></data>"),
    ] {
        let file = meta.submission_file(iid);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, body).unwrap();
    }

    assert_eq!(ws.submission_files(meta).unwrap().len(), 2);
    let subs = ws.scan_submissions(meta).unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].instance_id, "uuid:1");
    assert!(subs[0].submission_date.is_some());
    assert!(ws.has_submission(meta, "uuid:1"));
    assert!(!ws.has_submission(meta, "uuid:3"));
}
