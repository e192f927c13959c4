#![allow(dead_code)]

include!("../src/main.rs");

fn temp_paths() -> CodexPaths {
    let root = std::env::temp_dir().join(format!("csa-store-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(root.join("sessions")).expect("mkdir sessions");
    std::fs::create_dir_all(root.join("archived_sessions")).expect("mkdir archive");
    CodexPaths::new(root)
}

fn write_lines(path: &Path, lines: &[&str]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(path, lines.join("\n")).expect("write");
}

fn make_record(name: &str, tags: &[&str], sort_key: i64, archived: bool) -> SessionRecord {
    SessionRecord {
        path: PathBuf::from(format!("/tmp/{name}.jsonl")),
        file_name: format!("{name}.jsonl"),
        archived,
        title: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        timestamp: None,
        date_label: None,
        display_name: name.to_string(),
        sort_key,
        id: None,
        cwd: None,
        originator: None,
        cli_version: None,
        model_provider: None,
        git: None,
    }
}

#[test]
fn load_reads_first_line_only_and_skips_foreign_files() {
    let paths = temp_paths();
    let good = paths.sessions_dir.join("2026/01/02/good.jsonl");
    write_lines(
        &good,
        &[
            r#"{"type":"session_meta","payload":{"id":"s1","timestamp":"2026-01-02T03:04:05Z","cwd":"/home/dev/proj","tags":["rust","tui"]}}"#,
            "this line is not JSON at all",
        ],
    );
    // First line is not a session_meta envelope.
    write_lines(
        &paths.sessions_dir.join("2026/01/02/foreign.jsonl"),
        &[r#"{"type":"response_item","payload":{"type":"message"}}"#],
    );
    // Unparseable first line.
    write_lines(&paths.sessions_dir.join("2026/01/02/broken.jsonl"), &["{oops"]);
    // Wrong extension.
    write_lines(&paths.sessions_dir.join("2026/01/02/notes.txt"), &["hello"]);

    let records = load_records(&paths).expect("load");
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.file_name, "good.jsonl");
    assert!(!record.archived);
    assert_eq!(record.display_name, "proj");
    assert_eq!(record.tags, vec!["rust".to_string(), "tui".to_string()]);
    assert_eq!(record.date_label.as_deref(), Some("2026-01-02"));
}

#[test]
fn sort_key_prefers_explicit_timestamp() {
    let paths = temp_paths();
    let path = paths.sessions_dir.join("2026/01/02/rollout-2026-01-02T03-04-05-x.jsonl");
    write_lines(
        &path,
        &[r#"{"type":"session_meta","payload":{"id":"s","timestamp":"2026-06-07T08:09:10Z"}}"#],
    );

    let records = load_records(&paths).expect("load");
    let expected = DateTime::parse_from_rfc3339("2026-06-07T08:09:10Z")
        .unwrap()
        .timestamp_millis();
    assert_eq!(records[0].sort_key, expected);
}

#[test]
fn sort_key_falls_back_to_filename_then_mtime() {
    let paths = temp_paths();
    let named = paths.sessions_dir.join("2026/01/02/rollout-2026-01-02T03-04-05-x.jsonl");
    write_lines(&named, &[r#"{"type":"session_meta","payload":{"id":"a"}}"#]);
    let plain = paths.sessions_dir.join("2026/01/02/untagged.jsonl");
    write_lines(&plain, &[r#"{"type":"session_meta","payload":{"id":"b"}}"#]);

    let records = load_records(&paths).expect("load");
    let by_name = records.iter().find(|r| r.file_name.starts_with("rollout")).unwrap();
    let expected = Utc
        .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
        .unwrap()
        .timestamp_millis();
    assert_eq!(by_name.sort_key, expected);

    let by_mtime = records.iter().find(|r| r.file_name == "untagged.jsonl").unwrap();
    assert!(by_mtime.sort_key > 0);
}

#[test]
fn filter_matches_name_or_tags_case_insensitively() {
    let records = vec![
        make_record("alpha-project", &["Rust"], 3, false),
        make_record("beta", &["python"], 2, false),
        make_record("gamma", &[], 1, true),
    ];

    let all = filter_records(&records, "", ArchiveScope::All);
    assert_eq!(all.len(), 3);

    let active = filter_records(&records, "", ArchiveScope::ActiveOnly);
    assert_eq!(active.len(), 2);

    let archived = filter_records(&records, "", ArchiveScope::ArchivedOnly);
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].display_name, "gamma");

    let by_tag = filter_records(&records, "RUST", ArchiveScope::All);
    assert_eq!(by_tag.len(), 1);
    assert_eq!(by_tag[0].display_name, "alpha-project");

    let by_name = filter_records(&records, "ALPHA", ArchiveScope::All);
    assert_eq!(by_name.len(), 1);
}

#[test]
fn sort_orders_reverse_each_other_for_distinct_keys() {
    let records = vec![
        make_record("two", &[], 2, false),
        make_record("one", &[], 1, false),
        make_record("three", &[], 3, false),
    ];

    let asc = sort_records(records.clone(), SortOrder::Ascending);
    let asc_keys: Vec<i64> = asc.iter().map(|r| r.sort_key).collect();
    assert_eq!(asc_keys, vec![1, 2, 3]);

    let desc = sort_records(records, SortOrder::Descending);
    let desc_keys: Vec<i64> = desc.iter().map(|r| r.sort_key).collect();
    assert_eq!(desc_keys, vec![3, 2, 1]);

    let mut reversed = desc.clone();
    reversed.reverse();
    assert_eq!(reversed, asc);
}

#[test]
fn filter_then_sort_is_idempotent() {
    let records = vec![
        make_record("b", &["shared"], 2, false),
        make_record("a", &["shared"], 1, true),
        make_record("c", &[], 3, false),
    ];

    let once = sort_records(
        filter_records(&records, "shared", ArchiveScope::All),
        SortOrder::Descending,
    );
    let twice = sort_records(
        filter_records(&once, "shared", ArchiveScope::All),
        SortOrder::Descending,
    );
    assert_eq!(once, twice);
}

#[test]
fn update_metadata_round_trips_and_preserves_later_lines() {
    let paths = temp_paths();
    let path = paths.sessions_dir.join("2026/01/02/sess.jsonl");
    let rest_lines = [
        r#"{"type":"response_item","payload":{"type":"message","content":[{"text":"hi"}]}}"#,
        r#"{"type":"event_msg","payload":{"type":"token_count"}}"#,
    ];
    write_lines(
        &path,
        &[
            r#"{"type":"session_meta","payload":{"id":"s1","timestamp":"2026-01-02T03:04:05Z"}}"#,
            rest_lines[0],
            rest_lines[1],
        ],
    );

    let tags = vec!["Tag".to_string(), "tag".to_string(), "".to_string()];
    update_metadata(&path, Some("My run"), Some(&tags)).expect("update");

    let record = read_record(&path, false).expect("record");
    assert_eq!(record.title.as_deref(), Some("My run"));
    assert_eq!(record.display_name, "My run");
    assert_eq!(record.tags, vec!["Tag".to_string()]);

    let content = std::fs::read_to_string(&path).expect("read back");
    let (first, rest) = content.split_once('\n').expect("two lines");
    let value: Value = serde_json::from_str(first).expect("json");
    assert_eq!(
        value["payload"]["name"].as_str(),
        Some("My run"),
        "legacy alias must track the title"
    );
    assert_eq!(rest, rest_lines.join("\n"));
}

#[test]
fn update_metadata_removes_fields_when_cleared() {
    let paths = temp_paths();
    let path = paths.sessions_dir.join("2026/01/02/sess.jsonl");
    write_lines(
        &path,
        &[r#"{"type":"session_meta","payload":{"id":"s1","title":"old","name":"old","tags":["x"]}}"#],
    );

    update_metadata(&path, Some("   "), Some(&[])).expect("update");

    let content = std::fs::read_to_string(&path).expect("read back");
    let value: Value = serde_json::from_str(content.trim_end()).expect("json");
    let payload = value["payload"].as_object().expect("payload");
    assert!(!payload.contains_key("title"));
    assert!(!payload.contains_key("name"));
    assert!(!payload.contains_key("tags"));
    assert_eq!(payload["id"].as_str(), Some("s1"));
}

#[test]
fn update_metadata_rejects_non_meta_first_line() {
    let paths = temp_paths();
    let path = paths.sessions_dir.join("2026/01/02/other.jsonl");
    write_lines(
        &path,
        &[r#"{"type":"response_item","payload":{"type":"message"}}"#],
    );

    let err = update_metadata(&path, Some("t"), None).unwrap_err();
    assert!(err.to_string().contains("not session metadata"));
}

#[test]
fn archive_then_restore_uses_resolved_date_bucket() {
    let paths = temp_paths();
    let file_name = "rollout-2026-01-02T03-04-05-x.jsonl";
    let original = paths.sessions_dir.join("2026/01/02").join(file_name);
    // The explicit timestamp disagrees with the filename bucket on purpose.
    write_lines(
        &original,
        &[r#"{"type":"session_meta","payload":{"id":"s1","timestamp":"2026-05-06T07:08:09Z"}}"#],
    );

    let records = load_records(&paths).expect("load");
    let record = &records[0];
    assert!(!record.archived);

    let archived_path = set_archive_status(record, true, &paths).expect("archive");
    assert_eq!(archived_path, paths.archived_dir.join(file_name));
    assert!(archived_path.exists());
    assert!(!original.exists());

    let records = load_records(&paths).expect("reload");
    let record = &records[0];
    assert!(record.archived);

    let restored = set_archive_status(record, false, &paths).expect("restore");
    assert_eq!(
        restored,
        paths.sessions_dir.join("2026/05/06").join(file_name),
        "restore follows the explicit timestamp, not the filename bucket"
    );
    assert!(restored.exists());
}

#[test]
fn archive_into_existing_destination_fails() {
    let paths = temp_paths();
    let file_name = "sess.jsonl";
    let original = paths.sessions_dir.join("2026/01/02").join(file_name);
    write_lines(
        &original,
        &[r#"{"type":"session_meta","payload":{"id":"s1"}}"#],
    );
    write_lines(
        &paths.archived_dir.join(file_name),
        &[r#"{"type":"session_meta","payload":{"id":"other"}}"#],
    );

    let records = load_records(&paths).expect("load");
    let record = records.iter().find(|r| !r.archived).expect("active record");

    let err = set_archive_status(record, true, &paths).unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert!(original.exists(), "source must not be touched on conflict");
}

#[test]
fn set_archive_status_is_a_noop_when_already_in_target_state() {
    let paths = temp_paths();
    let original = paths.sessions_dir.join("2026/01/02/sess.jsonl");
    write_lines(
        &original,
        &[r#"{"type":"session_meta","payload":{"id":"s1"}}"#],
    );

    let records = load_records(&paths).expect("load");
    let same = set_archive_status(&records[0], false, &paths).expect("noop");
    assert_eq!(same, records[0].path);
    assert!(original.exists());
}
