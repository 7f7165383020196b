//! Filtering, normalization and per-topic aggregation of extracted records.

use crate::error::{EtlError, Result};
use crate::models::{
    CENTERPIECE_KEY, CORRECT_OPTIONS_IDX_KEY, DEFAULT_TOPIC, QuestionRow, RecordTable, TopicCount,
};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Decides whether a record is eligible for loading from its answer key.
pub trait AnswerKeyFilter {
    fn accepts(&self, correct_options_idx: &[i64]) -> bool;
}

impl<F> AnswerKeyFilter for F
where
    F: Fn(&[i64]) -> bool,
{
    fn accepts(&self, correct_options_idx: &[i64]) -> bool {
        self(correct_options_idx)
    }
}

/// The built-in answer-key filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterPolicy {
    /// At least one option is marked correct.
    #[default]
    AnyCorrect,
    /// The first listed correct index is 0. An empty key fails.
    FirstIsCorrect,
}

impl AnswerKeyFilter for FilterPolicy {
    fn accepts(&self, correct_options_idx: &[i64]) -> bool {
        match self {
            FilterPolicy::AnyCorrect => !correct_options_idx.is_empty(),
            FilterPolicy::FirstIsCorrect => correct_options_idx.first() == Some(&0),
        }
    }
}

impl fmt::Display for FilterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterPolicy::AnyCorrect => write!(f, "any-correct"),
            FilterPolicy::FirstIsCorrect => write!(f, "first-is-correct"),
        }
    }
}

impl FromStr for FilterPolicy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "any-correct" | "any" => Ok(FilterPolicy::AnyCorrect),
            "first-is-correct" | "first" => Ok(FilterPolicy::FirstIsCorrect),
            _ => Err(format!("Invalid filter policy: {}", s)),
        }
    }
}

/// Output of [`transform`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transformed {
    pub questions: Vec<QuestionRow>,
    /// One entry per distinct topic, sorted by topic.
    pub topic_counts: Vec<TopicCount>,
}

/// Canonical form of a question's text: lowercased, surrounding whitespace removed.
pub fn normalize_question_text(text: &str) -> String {
    text.to_lowercase().trim().to_string()
}

pub fn transform(table: &RecordTable, filter: &dyn AnswerKeyFilter) -> Result<Transformed> {
    for column in [CORRECT_OPTIONS_IDX_KEY, CENTERPIECE_KEY] {
        if !table.has_column(column) {
            error!("Missing column in record table: {}", column);
            return Err(EtlError::Schema(column.to_string()));
        }
    }

    let mut questions = Vec::new();
    for (index, record) in table.records().iter().enumerate() {
        let correct_options_idx = record.correct_options_idx.as_deref().unwrap_or_default();
        if !filter.accepts(correct_options_idx) {
            continue;
        }
        let Some(centerpiece) = record.centerpiece.as_deref() else {
            warn!("Skipping record {} with no centerpiece", index + 1);
            continue;
        };
        questions.push(QuestionRow {
            question_text: normalize_question_text(centerpiece),
            options: record.options.clone().unwrap_or_default(),
            correct_options_idx: correct_options_idx.to_vec(),
            topic: record
                .topic
                .clone()
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
        });
    }

    let topic_counts = count_by_topic(&questions);
    info!("Transformed {} records", questions.len());
    Ok(Transformed {
        questions,
        topic_counts,
    })
}

fn count_by_topic(questions: &[QuestionRow]) -> Vec<TopicCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for question in questions {
        *counts.entry(question.topic.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(topic, question_count)| TopicCount {
            topic: topic.to_string(),
            question_count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;

    fn table(records: Vec<RawRecord>) -> RecordTable {
        RecordTable::from_records(records)
    }

    #[test]
    fn test_transform_single_record() {
        let t = table(vec![RawRecord::new("Test question", &["A", "B"], &[0])]);
        let out = transform(&t, &FilterPolicy::AnyCorrect).unwrap();
        assert_eq!(out.questions.len(), 1);
        assert_eq!(out.questions[0].question_text, "test question");
        assert_eq!(out.questions[0].topic, DEFAULT_TOPIC);
        assert_eq!(
            out.topic_counts,
            vec![TopicCount {
                topic: DEFAULT_TOPIC.to_string(),
                question_count: 1
            }]
        );
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_question_text("  What is DNA?\n"), "what is dna?");
        for input in ["  MiXeD Case \t", "ÉCOLE", "already clean", ""] {
            let once = normalize_question_text(input);
            assert_eq!(normalize_question_text(&once), once);
        }
    }

    #[test]
    fn test_policies_differ() {
        let t = table(vec![
            RawRecord::new("zero first", &["a", "b"], &[0]),
            RawRecord::new("one first", &["a", "b"], &[1]),
            RawRecord::new("both", &["a", "b"], &[1, 0]),
            RawRecord::new("none", &["a", "b"], &[]),
        ]);

        let any = transform(&t, &FilterPolicy::AnyCorrect).unwrap();
        let texts: Vec<_> = any.questions.iter().map(|q| q.question_text.as_str()).collect();
        assert_eq!(texts, vec!["zero first", "one first", "both"]);

        let first = transform(&t, &FilterPolicy::FirstIsCorrect).unwrap();
        let texts: Vec<_> = first.questions.iter().map(|q| q.question_text.as_str()).collect();
        assert_eq!(texts, vec!["zero first"]);
    }

    #[test]
    fn test_empty_key_dropped_under_both_policies() {
        let t = table(vec![RawRecord::new("Nothing right", &["a"], &[])]);
        for policy in [FilterPolicy::AnyCorrect, FilterPolicy::FirstIsCorrect] {
            let out = transform(&t, &policy).unwrap();
            assert!(out.questions.is_empty(), "{} kept an empty key", policy);
            assert!(out.topic_counts.is_empty());
        }
    }

    #[test]
    fn test_custom_filter_closure() {
        let t = table(vec![
            RawRecord::new("single", &["a", "b"], &[1]),
            RawRecord::new("multi", &["a", "b"], &[0, 1]),
        ]);
        let single_answer = |idx: &[i64]| idx.len() == 1;
        let out = transform(&t, &single_answer).unwrap();
        assert_eq!(out.questions.len(), 1);
        assert_eq!(out.questions[0].question_text, "single");
    }

    #[test]
    fn test_topic_counts_sum_to_filtered_rows() {
        let t = table(vec![
            RawRecord::new("q1", &["a"], &[0]).with_topic("chemistry"),
            RawRecord::new("q2", &["a"], &[0]).with_topic("physics"),
            RawRecord::new("q3", &["a"], &[0]).with_topic("chemistry"),
            RawRecord::new("q4", &["a"], &[0]),
            RawRecord::new("q5", &["a"], &[]).with_topic("physics"),
        ]);
        let out = transform(&t, &FilterPolicy::AnyCorrect).unwrap();
        let total: usize = out.topic_counts.iter().map(|c| c.question_count).sum();
        assert_eq!(total, out.questions.len());
        assert_eq!(
            out.topic_counts,
            vec![
                TopicCount { topic: "biology".to_string(), question_count: 1 },
                TopicCount { topic: "chemistry".to_string(), question_count: 2 },
                TopicCount { topic: "physics".to_string(), question_count: 1 },
            ]
        );
    }

    #[test]
    fn test_missing_columns_are_schema_errors() {
        let mut no_key = RawRecord::new("q", &["a"], &[0]);
        no_key.correct_options_idx = None;
        let result = transform(&table(vec![no_key]), &FilterPolicy::AnyCorrect);
        assert!(matches!(result, Err(EtlError::Schema(c)) if c == "correct_options_idx"));

        let mut no_text = RawRecord::new("q", &["a"], &[0]);
        no_text.centerpiece = None;
        let result = transform(&table(vec![no_text]), &FilterPolicy::AnyCorrect);
        assert!(matches!(result, Err(EtlError::Schema(c)) if c == "centerpiece"));

        let result = transform(&RecordTable::default(), &FilterPolicy::AnyCorrect);
        assert!(matches!(result, Err(EtlError::Schema(_))));
    }

    #[test]
    fn test_rows_missing_fields_in_mixed_table() {
        let mut no_key = RawRecord::new("no key", &["a"], &[0]);
        no_key.correct_options_idx = None;
        let mut no_text = RawRecord::new("unused", &["a"], &[0]);
        no_text.centerpiece = None;
        let mut no_options = RawRecord::new("No Options", &[], &[0]);
        no_options.options = None;

        let t = table(vec![no_key, no_text, no_options]);
        let out = transform(&t, &FilterPolicy::AnyCorrect).unwrap();
        assert_eq!(out.questions.len(), 1);
        assert_eq!(out.questions[0].question_text, "no options");
        assert!(out.questions[0].options.is_empty());
    }

    #[test]
    fn test_filter_policy_from_str() {
        assert_eq!("any-correct".parse(), Ok(FilterPolicy::AnyCorrect));
        assert_eq!("FIRST_IS_CORRECT".parse(), Ok(FilterPolicy::FirstIsCorrect));
        assert!("all".parse::<FilterPolicy>().is_err());
    }
}
