use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::error::ProjectError;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").unwrap());

/// Longest run of topic bytes spelled out in a fallback key.
const FALLBACK_KEY_BYTES: usize = 24;

/// Lower-cases the topic and collapses anything that isn't a letter or digit
/// into `_`. A topic with no letters or digits at all gets a hex key of its
/// bytes, so the result is never empty.
pub fn normalize_topic(topic: &str) -> String {
    let trimmed = topic.trim();
    let lowered = trimmed.to_lowercase();
    let key = NON_ALNUM.replace_all(&lowered, "_").trim_matches('_').to_string();
    if !key.is_empty() {
        return key;
    }
    let hex: String = trimmed
        .bytes()
        .take(FALLBACK_KEY_BYTES)
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("topic_{}", hex)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ProjectError> {
    let data = fs::read_to_string(path).map_err(|e| ProjectError::io(path, e))?;
    serde_json::from_str(&data).map_err(|source| ProjectError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes into a sibling temp file and renames it over `path`, so readers never
/// observe a half-written document.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), ProjectError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| ProjectError::io(dir, e))?;

    let data = serde_json::to_string_pretty(value).map_err(|source| ProjectError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ProjectError::io(dir, e))?;
    tmp.write_all(data.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| ProjectError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| ProjectError::io(path, e.error))?;
    Ok(())
}

/// Appends one record to a JSON array file, creating it when missing.
pub fn append_json_record<T>(path: &Path, record: &T) -> Result<usize, ProjectError>
where
    T: Serialize + DeserializeOwned + Clone,
{
    let mut records: Vec<T> = if path.exists() {
        read_json(path)?
    } else {
        Vec::new()
    };
    records.push(record.clone());
    write_json_atomic(path, &records)?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_spaces_and_case() {
        assert_eq!(normalize_topic("Spiderman origin"), "spiderman_origin");
        assert_eq!(normalize_topic("  Iron-Man: story! "), "iron_man_story");
    }

    #[test]
    fn keeps_non_ascii_letters() {
        assert_eq!(normalize_topic("東京の歴史"), "東京の歴史");
        assert_eq!(normalize_topic("Café Müller"), "café_müller");
    }

    #[test]
    fn symbol_only_topics_get_a_stable_key() {
        assert_eq!(normalize_topic("!!!"), "topic_212121");
        assert_eq!(normalize_topic(" !!! "), normalize_topic("!!!"));
        assert_ne!(normalize_topic("???"), normalize_topic("!!!"));
        assert_eq!(normalize_topic(&normalize_topic("!!!")), "topic_212121");
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomic(&path, &vec![4]).unwrap();

        let back: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(back, vec![4]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn append_preserves_prior_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        assert_eq!(append_json_record(&path, &"first".to_string()).unwrap(), 1);
        assert_eq!(append_json_record(&path, &"second".to_string()).unwrap(), 2);

        let back: Vec<String> = read_json(&path).unwrap();
        assert_eq!(back, vec!["first", "second"]);
    }
}
