//! Requirement records read from JSON files.
//!
//! A file holds either one requirement object or an array of them. A
//! directory is walked recursively for `*.json` files in file-name order.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use reqdb_core::types::Requirement;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Requirement>),
    One(Box<Requirement>),
}

pub fn load_requirements(path: &Path) -> Result<Vec<Requirement>> {
    if path.is_file() {
        return load_file(path);
    }
    let mut out = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", path.display()))?;
        let p = entry.path();
        if entry.file_type().is_file() && p.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
            out.extend(load_file(p)?);
        }
    }
    Ok(out)
}

fn load_file(path: &Path) -> Result<Vec<Requirement>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let parsed: OneOrMany =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a requirement or list of requirements", path.display()))?;
    let reqs = match parsed {
        OneOrMany::Many(v) => v,
        OneOrMany::One(r) => vec![*r],
    };
    debug!(file = %path.display(), count = reqs.len(), "loaded requirements");
    Ok(reqs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_single_objects_and_arrays_from_a_tree() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("nested")).expect("mkdir");
        fs::write(tmp.path().join("a.json"), r#"{"id": "R1", "normalized_text": "lock idle sessions"}"#).expect("write");
        fs::write(
            tmp.path().join("nested/b.json"),
            r#"[{"id": "R2", "normalized_text": "audit logins", "entities": {"actors": ["admin"]}},
                {"id": "R3", "normalized_text": "export csv", "criticality": "low"}]"#,
        )
        .expect("write");
        fs::write(tmp.path().join("notes.txt"), "ignored").expect("write");

        let reqs = load_requirements(tmp.path()).expect("load");
        let ids: Vec<&str> = reqs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["R1", "R2", "R3"]);
        assert_eq!(reqs[1].entities["actors"], vec!["admin".to_string()]);
        assert_eq!(reqs[2].criticality.as_deref(), Some("low"));
    }

    #[test]
    fn malformed_file_names_the_path() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("bad.json");
        fs::write(&path, "{not json").expect("write");
        let err = load_requirements(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad.json"));
    }
}
