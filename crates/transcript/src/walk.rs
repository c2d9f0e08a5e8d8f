//! `walkConversations(root)` — lists `${root}/projects/*/*.jsonl` and
//! parses each file; file-level errors are logged and never abort the
//! walk (§4.C).

use std::path::Path;

use conductor_storage::Storage;

use crate::parser::{parse_file, ParseSummary};

pub fn walk_conversations(root: &Path, storage: &Storage) -> Vec<(std::path::PathBuf, ParseSummary)> {
    let projects_dir = root.join("projects");
    let mut results = Vec::new();

    let Ok(project_dirs) = std::fs::read_dir(&projects_dir) else {
        tracing::warn!(path = %projects_dir.display(), "projects directory not found");
        return results;
    };

    for project_entry in project_dirs.flatten() {
        if !project_entry.path().is_dir() {
            continue;
        }
        let Ok(files) = std::fs::read_dir(project_entry.path()) else {
            continue;
        };
        for file_entry in files.flatten() {
            let path = file_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            match parse_file(&path, storage) {
                Ok(summary) => results.push((path, summary)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "transcript ingest failed");
                }
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_skips_missing_projects_dir_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();
        let results = walk_conversations(dir.path(), &storage);
        assert!(results.is_empty());
    }

    #[test]
    fn walk_finds_jsonl_files_under_projects() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();
        let project = dir.path().join("projects").join("proj1");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("s1.jsonl"), "").unwrap();
        std::fs::write(project.join("ignore.txt"), "").unwrap();

        let results = walk_conversations(dir.path(), &storage);
        assert_eq!(results.len(), 1);
    }
}
