use std::fs;

use reqdb_core::config::Config;
use reqdb_core::error::Error;
use reqdb_core::storage::{read_if_exists, stage_bytes};
use reqdb_core::types::{Requirement, SearchHit, SearchMode, SourceKind};

#[test]
fn requirement_json_fills_optional_fields() {
    let r: Requirement = serde_json::from_str(r#"{"id": "REQ-9", "normalized_text": "Back up nightly"}"#).expect("parse");
    assert_eq!(r.id, "REQ-9");
    assert!(r.raw_text.is_empty());
    assert!(r.action.is_none() && r.criticality.is_none());
    assert!(r.entities.is_empty());

    let meta = r.metadata();
    assert_eq!(meta.id, "REQ-9");
    assert_eq!(meta.normalized_text, "Back up nightly");
}

#[test]
fn requirement_without_text_is_rejected() {
    assert!(serde_json::from_str::<Requirement>(r#"{"id": "REQ-9"}"#).is_err());
}

#[test]
fn hits_serialize_without_absent_metadata() {
    let json = serde_json::to_value(SearchHit::new("a", 1.0, SourceKind::Hybrid)).expect("json");
    assert_eq!(json["source"], "hybrid");
    assert!(json.get("metadata").is_none());
}

#[test]
fn search_modes_parse_with_aliases() {
    assert_eq!("Hybrid".parse::<SearchMode>().expect("hybrid"), SearchMode::Hybrid);
    assert_eq!("semantic".parse::<SearchMode>().expect("semantic"), SearchMode::Vector);
    assert_eq!("bm25".parse::<SearchMode>().expect("bm25"), SearchMode::Keyword);
    assert!(matches!("fuzzy".parse::<SearchMode>(), Err(Error::InvalidConfig(_))));
}

#[test]
fn config_file_overrides_defaults() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("reqdb.toml");
    fs::write(
        &path,
        "[data]\nindex_dir = \"~/reqdb/indexes\"\n\n[retrieval]\ndefault_top_k = 25\n\n[embedding]\ndimension = 768\n",
    )
    .expect("write");

    let config = Config::load_file(&path).expect("load");
    let settings = config.settings().expect("settings");
    assert_eq!(settings.retrieval.default_top_k, 25);
    assert_eq!(settings.retrieval.rrf_k, 60.0);
    assert_eq!(settings.embedding.dimension, Some(768));
    assert_eq!(settings.embedding.batch_size, 64);
    assert_eq!(config.get::<String>("data.index_dir").expect("get"), "~/reqdb/indexes");
}

#[test]
fn invalid_config_file_fails_to_load() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("reqdb.toml");
    fs::write(&path, "[retrieval]\ncandidate_multiplier = 0\n").expect("write");
    assert!(Config::load_file(&path).is_err());
    assert!(Config::load_file(&tmp.path().join("missing.toml")).is_err());
}

#[test]
fn staged_file_is_invisible_until_committed() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let target = tmp.path().join("nested").join("snapshot.json");

    let staged = stage_bytes(&target, b"v1").expect("stage");
    assert_eq!(read_if_exists(&target).expect("read"), None);
    staged.commit().expect("commit");
    assert_eq!(read_if_exists(&target).expect("read").as_deref(), Some(&b"v1"[..]));

    stage_bytes(&target, b"v2").expect("stage").discard();
    assert_eq!(read_if_exists(&target).expect("read").as_deref(), Some(&b"v1"[..]));
    let names: Vec<_> = fs::read_dir(tmp.path().join("nested")).expect("ls").map(|e| e.expect("entry").file_name()).collect();
    assert_eq!(names, vec!["snapshot.json"]);
}
