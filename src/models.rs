use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;

/// Topic assigned to questions whose record carries none.
pub const DEFAULT_TOPIC: &str = "biology";

pub const CENTERPIECE_KEY: &str = "centerpiece";
pub const OPTIONS_KEY: &str = "options";
pub const CORRECT_OPTIONS_IDX_KEY: &str = "correct_options_idx";
pub const TOPIC_KEY: &str = "topic";

/// Keys a record must carry to pass strict extraction.
pub const REQUIRED_KEYS: [&str; 3] = [CENTERPIECE_KEY, OPTIONS_KEY, CORRECT_OPTIONS_IDX_KEY];

// --- Input Records ---

/// One parsed input line.
///
/// Known keys are typed and validated during deserialization. Unknown keys are
/// kept in `extra` so a record can be serialized back to what was read.
///
/// A JSON `null` for a known key is the same as a missing key, and it is not
/// written back: `{"topic": null, ...}` serializes without `topic`.
/// Integer indices beyond the `i64` range are clamped to `i64::MIN`/`i64::MAX`;
/// like any out-of-range index they never match an option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centerpiece: Option<String>,
    // Entries stay as JSON values; the loader decides how to store non-strings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<Value>>,
    #[serde(
        default,
        deserialize_with = "deserialize_indices",
        skip_serializing_if = "Option::is_none"
    )]
    pub correct_options_idx: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Accepts any integral JSON number, clamping it into i64. Fractions are rejected.
fn deserialize_indices<'de, D>(deserializer: D) -> Result<Option<Vec<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(numbers) = Option::<Vec<Number>>::deserialize(deserializer)? else {
        return Ok(None);
    };
    numbers
        .into_iter()
        .map(|n| {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.is_u64() {
                Ok(i64::MAX)
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => Ok(f as i64),
                    _ => Err(<D::Error as de::Error>::custom(format!(
                        "invalid option index: {}",
                        n
                    ))),
                }
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

impl RawRecord {
    /// Builds a record carrying the three required keys.
    pub fn new(centerpiece: &str, options: &[&str], correct_options_idx: &[i64]) -> Self {
        RawRecord {
            centerpiece: Some(centerpiece.to_string()),
            options: Some(options.iter().map(|o| Value::from(*o)).collect()),
            correct_options_idx: Some(correct_options_idx.to_vec()),
            topic: None,
            extra: Map::new(),
        }
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }

    /// Returns whether `key` is present (and not null) on this record.
    pub fn has_key(&self, key: &str) -> bool {
        match key {
            CENTERPIECE_KEY => self.centerpiece.is_some(),
            OPTIONS_KEY => self.options.is_some(),
            CORRECT_OPTIONS_IDX_KEY => self.correct_options_idx.is_some(),
            TOPIC_KEY => self.topic.is_some(),
            other => self.extra.contains_key(other),
        }
    }

    pub fn has_required_keys(&self) -> bool {
        REQUIRED_KEYS.iter().all(|key| self.has_key(key))
    }

    /// Iterates over the keys present on this record.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        [CENTERPIECE_KEY, OPTIONS_KEY, CORRECT_OPTIONS_IDX_KEY, TOPIC_KEY]
            .into_iter()
            .filter(|key| self.has_key(key))
            .chain(self.extra.keys().map(String::as_str))
    }
}

/// Records extracted from one input file, with the union of their keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    columns: BTreeSet<String>,
    records: Vec<RawRecord>,
}

impl RecordTable {
    pub fn from_records(records: Vec<RawRecord>) -> Self {
        let columns = records
            .iter()
            .flat_map(|r| r.keys())
            .map(String::from)
            .collect();
        RecordTable { columns, records }
    }

    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// --- Transform Output ---

/// A record that passed the answer-key filter, ready for loading.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRow {
    /// Lowercased and trimmed `centerpiece`.
    pub question_text: String,
    pub options: Vec<Value>,
    pub correct_options_idx: Vec<i64>,
    pub topic: String,
}

impl QuestionRow {
    /// Returns whether the option at `position` is marked correct.
    pub fn is_correct(&self, position: usize) -> bool {
        i64::try_from(position)
            .map(|p| self.correct_options_idx.contains(&p))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCount {
    pub topic: String,
    pub question_count: usize,
}

// --- Persisted Entities ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionOption {
    pub id: i64,
    pub question_id: i64,
    pub option_text: String,
    pub is_correct: bool,
}
