//! Best-effort literal text search over a directory tree.

use std::fs;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

/// Matches found by [`search_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHits {
    /// `relative_path:line_number: text`, at most `max_matches` entries.
    pub matches: Vec<String>,
    /// Total number of matching lines, including those beyond the cap.
    pub total: usize,
}

/// Scan every readable text file under `dir` for lines containing `pattern`.
///
/// Paths in the output are relative to `base`. Unreadable or non-UTF-8 files are
/// skipped, as are `.git` directories. Files are visited in sorted order so results
/// are deterministic.
pub fn search_tree(base: &Path, dir: &Path, pattern: &str, max_matches: usize) -> SearchHits {
    let mut matches = Vec::new();
    let mut total = 0usize;

    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");
    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(contents) = fs::read_to_string(entry.path()) else {
            debug!(path = %entry.path().display(), "skipping unreadable file");
            continue;
        };
        let rel = entry.path().strip_prefix(base).unwrap_or(entry.path());
        for (idx, line) in contents.lines().enumerate() {
            if !line.contains(pattern) {
                continue;
            }
            total += 1;
            if matches.len() < max_matches {
                matches.push(format!("{}:{}: {}", rel.display(), idx + 1, line));
            }
        }
    }

    SearchHits { matches, total }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_relative_paths_and_line_numbers() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        fs::write(temp.path().join("src/main.rs"), "fn main() {}\n// needle here\n")
            .expect("write");
        fs::write(temp.path().join("README"), "no match\n").expect("write");

        let hits = search_tree(temp.path(), temp.path(), "needle", 50);
        assert_eq!(hits.total, 1);
        assert_eq!(
            hits.matches,
            vec![format!("{}:2: // needle here", Path::new("src").join("main.rs").display())]
        );
    }

    #[test]
    fn caps_matches_but_counts_all() {
        let temp = tempfile::tempdir().expect("tempdir");
        let body = "hit\n".repeat(75);
        fs::write(temp.path().join("many.txt"), body).expect("write");

        let hits = search_tree(temp.path(), temp.path(), "hit", 50);
        assert_eq!(hits.matches.len(), 50);
        assert_eq!(hits.total, 75);
    }

    #[test]
    fn skips_binary_files_and_git_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("blob.bin"), [0xff, 0xfe, b'x', b'\n']).expect("write");
        fs::create_dir_all(temp.path().join(".git")).expect("mkdir");
        fs::write(temp.path().join(".git/config"), "x\n").expect("write");
        fs::write(temp.path().join("ok.txt"), "x\n").expect("write");

        let hits = search_tree(temp.path(), temp.path(), "x", 50);
        assert_eq!(hits.matches, vec!["ok.txt:1: x".to_string()]);
    }
}
