//! Persisted record types and JSONL I/O.
//!
//! Training records (`docstring`, `signature`, `code`, `_id`) and sampled
//! generations (`task_id`, `generation`) are stored one JSON object per line.
//! Both types keep unrecognized keys in an `extra` map so round-tripping a
//! file never loses fields added upstream.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::RecordError;

/// A paired (docstring, code) training record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_id", deserialize_with = "string_or_number")]
    pub id: String,
    pub docstring: String,
    /// Absent in plain (docstring, code) datasets.
    #[serde(default)]
    pub signature: String,
    pub code: String,
    /// Keys this crate does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        docstring: impl Into<String>,
        signature: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            docstring: docstring.into(),
            signature: signature.into(),
            code: code.into(),
            extra: Map::new(),
        }
    }
}

/// One sampled generation for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSample {
    pub task_id: String,
    pub generation: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerationSample {
    pub fn new(task_id: impl Into<String>, generation: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            generation: generation.into(),
            extra: Map::new(),
        }
    }
}

/// All sampled generations sharing one `task_id`, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroup {
    pub task_id: String,
    pub samples: Vec<GenerationSample>,
}

impl TaskGroup {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Groups samples by `task_id`.
///
/// Groups appear in order of first occurrence and samples keep their input
/// order inside each group, so the grouping is deterministic for a given file.
pub fn group_by_task(samples: Vec<GenerationSample>) -> Vec<TaskGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<TaskGroup> = Vec::new();

    for sample in samples {
        match index.get(&sample.task_id) {
            Some(&pos) => groups[pos].samples.push(sample),
            None => {
                index.insert(sample.task_id.clone(), groups.len());
                groups.push(TaskGroup {
                    task_id: sample.task_id.clone(),
                    samples: vec![sample],
                });
            }
        }
    }

    groups
}

/// Reads a JSONL file into typed items.
///
/// Blank lines are skipped. The first malformed line fails the whole load.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, RecordError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut items = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str::<T>(&line).map_err(|e| RecordError::Malformed {
            path: path.display().to_string(),
            line: idx + 1,
            message: e.to_string(),
        })?;
        items.push(item);
    }

    tracing::debug!(path = %path.display(), count = items.len(), "Loaded JSONL records");
    Ok(items)
}

/// Writes items as JSONL, one object per line.
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<(), RecordError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or integer _id, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_record_roundtrip_preserves_extra_keys() {
        let line = r#"{"_id":"7","docstring":"Add","signature":"","code":"return a+b","repo":"x/y","stars":3}"#;
        let record: Record = serde_json::from_str(line).unwrap();
        assert_eq!(record.id, "7");
        assert_eq!(record.extra.get("repo"), Some(&Value::from("x/y")));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["stars"], Value::from(3));
        assert_eq!(back["_id"], Value::from("7"));
    }

    #[test]
    fn test_numeric_id_is_stringified() {
        let line = r#"{"_id":42,"docstring":"","signature":"","code":""}"#;
        let record: Record = serde_json::from_str(line).unwrap();
        assert_eq!(record.id, "42");
    }

    #[test]
    fn test_missing_required_key_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, r#"{{"_id":"1","docstring":"a","signature":"","code":"b"}}"#).unwrap();
        writeln!(f, r#"{{"_id":"2","signature":"","code":"b"}}"#).unwrap();

        let err = read_jsonl::<Record>(&path).unwrap_err();
        match err {
            RecordError::Malformed { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_signature_is_optional() {
        let line = r#"{"_id":"s","docstring":"d","code":"c"}"#;
        let record: Record = serde_json::from_str(line).unwrap();
        assert!(record.signature.is_empty());
        assert!(record.extra.is_empty());
    }

    #[test]
    fn test_read_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.jsonl");
        let mut f = File::create(&path).unwrap();
        writeln!(f, r#"{{"task_id":"t1","generation":"x"}}"#).unwrap();
        writeln!(f).unwrap();
        writeln!(f, r#"{{"task_id":"t1","generation":"y","score":0.5}}"#).unwrap();

        let samples = read_jsonl::<GenerationSample>(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].extra.get("score"), Some(&Value::from(0.5)));
    }

    #[test]
    fn test_group_by_task_keeps_first_seen_order() {
        let samples = vec![
            GenerationSample::new("b", "1"),
            GenerationSample::new("a", "2"),
            GenerationSample::new("b", "3"),
        ];
        let groups = group_by_task(samples);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].task_id, "b");
        assert_eq!(groups[0].samples[1].generation, "3");
        assert_eq!(groups[1].task_id, "a");
    }

    #[test]
    fn test_write_then_read_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.jsonl");
        let records = vec![Record::new("1", "doc", "", "code")];
        write_jsonl(&path, &records).unwrap();
        let back: Vec<Record> = read_jsonl(&path).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_extra_keys_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jsonl");
        let output = dir.path().join("out.jsonl");
        let line = r#"{"task_id":"t","generation":"g","zeta":1,"alpha":2,"mid":{"b":1,"a":2}}"#;
        std::fs::write(&input, format!("{line}\n")).unwrap();

        let samples: Vec<GenerationSample> = read_jsonl(&input).unwrap();
        let keys: Vec<&str> = samples[0].extra.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);

        write_jsonl(&output, &samples).unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), format!("{line}\n"));
    }
}
