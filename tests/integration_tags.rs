#![allow(dead_code)]

include!("../src/main.rs");

fn tagged_record(name: &str, tags: &[&str]) -> SessionRecord {
    SessionRecord {
        path: PathBuf::from(format!("/tmp/{name}.jsonl")),
        file_name: format!("{name}.jsonl"),
        archived: false,
        title: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        timestamp: None,
        date_label: None,
        display_name: name.to_string(),
        sort_key: 0,
        id: None,
        cwd: None,
        originator: None,
        cli_version: None,
        model_provider: None,
        git: None,
    }
}

fn vocab(tags: &[&str]) -> Vec<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

#[test]
fn dedupe_is_case_insensitive_and_keeps_first_casing() {
    let cleaned = dedupe_tags(
        ["Tag", "tag", ""].iter().map(|t| t.to_string()),
    );
    assert_eq!(cleaned, vec!["Tag".to_string()]);
}

#[test]
fn tag_index_unions_and_sorts_case_insensitively() {
    let records = vec![
        tagged_record("one", &["Zeta", "beta"]),
        tagged_record("two", &["alpha", "ZETA"]),
    ];
    let index = build_tag_index(&records);
    assert_eq!(
        index,
        vec!["alpha".to_string(), "beta".to_string(), "Zeta".to_string()]
    );
}

#[test]
fn suggestions_exclude_used_tags_and_match_prefix() {
    let tags = vocab(&["beta", "bravo", "alpha"]);
    let suggestions = suggest_tags("alpha, b", &tags, SUGGESTION_LIMIT);
    assert_eq!(suggestions, vec!["beta".to_string(), "bravo".to_string()]);
}

#[test]
fn fragment_does_not_exclude_its_own_matches() {
    let tags = vocab(&["beta"]);
    let suggestions = suggest_tags("bet", &tags, SUGGESTION_LIMIT);
    assert_eq!(suggestions, vec!["beta".to_string()]);
}

#[test]
fn empty_fragment_offers_all_unused_tags() {
    let tags = vocab(&["beta", "alpha"]);
    let suggestions = suggest_tags("alpha, ", &tags, SUGGESTION_LIMIT);
    assert_eq!(suggestions, vec!["beta".to_string()]);
}

#[test]
fn suggestions_are_capped_at_the_limit() {
    let tags = vocab(&["a1", "a2", "a3", "a4"]);
    let suggestions = suggest_tags("a", &tags, 2);
    assert_eq!(suggestions, vec!["a1".to_string(), "a2".to_string()]);
}

#[test]
fn matching_is_case_insensitive() {
    let tags = vocab(&["Backend"]);
    let suggestions = suggest_tags("back", &tags, SUGGESTION_LIMIT);
    assert_eq!(suggestions, vec!["Backend".to_string()]);
}

#[test]
fn apply_suggestion_replaces_only_the_trailing_fragment() {
    assert_eq!(apply_suggestion("alpha, b", "beta"), "alpha, beta");
    assert_eq!(apply_suggestion("b", "beta"), "beta");
    assert_eq!(apply_suggestion("alpha ", "beta"), "alpha beta");
}
