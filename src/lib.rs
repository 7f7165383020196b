// Declare modules
pub mod db;
pub mod error;
pub mod extract;
pub mod models;
pub mod progress;
pub mod transform;

// Re-export key types for easier use
pub use db::{
    DbLocation, DedupPolicy, LoadOptions, LoadSummary, OptionTextPolicy, QuizStore, load_questions,
};
pub use error::{EtlError, Result, StorageError};
pub use extract::{KeyPolicy, extract_records};
pub use models::{
    DEFAULT_TOPIC, Question, QuestionOption, QuestionRow, RawRecord, RecordTable, TopicCount,
};
pub use transform::{AnswerKeyFilter, FilterPolicy, Transformed, normalize_question_text, transform};

use log::info;
use progress::ProgressCallback;
use std::path::{Path, PathBuf};

/// Options controlling one pipeline run.
///
/// The defaults are the strict variant: required keys enforced, any-correct
/// filtering, deduplication by question text, non-string options skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub key_policy: KeyPolicy,
    pub filter: FilterPolicy,
    pub load: LoadOptions,
    pub db: DbLocation,
}

impl PipelineOptions {
    pub fn strict() -> Self {
        Self::default()
    }

    /// Keeps every record, requires the first option to be correct and never deduplicates.
    pub fn lenient() -> Self {
        PipelineOptions {
            key_policy: KeyPolicy::Lenient,
            filter: FilterPolicy::FirstIsCorrect,
            load: LoadOptions {
                dedup: DedupPolicy::AlwaysInsert,
                option_text: OptionTextPolicy::AnyJson,
            },
            db: DbLocation::default(),
        }
    }

    pub fn with_db(mut self, db: DbLocation) -> Self {
        self.db = db;
        self
    }
}

/// What one pipeline run did for one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub source: PathBuf,
    pub records_extracted: usize,
    pub questions_kept: usize,
    pub topic_counts: Vec<TopicCount>,
    pub load: LoadSummary,
}

/// Extract, transform and load, one input file at a time.
pub struct Pipeline {
    options: PipelineOptions,
    custom_filter: Option<Box<dyn AnswerKeyFilter>>,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Pipeline {
            options,
            custom_filter: None,
        }
    }

    /// Replaces the configured [`FilterPolicy`] with a custom predicate.
    pub fn with_filter(mut self, filter: impl AnswerKeyFilter + 'static) -> Self {
        self.custom_filter = Some(Box::new(filter));
        self
    }

    pub fn run(&self, path: &Path) -> Result<PipelineReport> {
        self.run_with_progress(path, None)
    }

    pub fn run_with_progress(
        &self,
        path: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<PipelineReport> {
        info!("Processing {} into {}", path.display(), self.options.db);

        let table = extract_records(path, self.options.key_policy)?;
        let filter: &dyn AnswerKeyFilter = match &self.custom_filter {
            Some(custom) => custom.as_ref(),
            None => &self.options.filter,
        };
        let transformed = transform(&table, filter)?;
        let load = load_questions(
            &transformed.questions,
            &self.options.db,
            &self.options.load,
            progress,
        )?;

        Ok(PipelineReport {
            source: path.to_path_buf(),
            records_extracted: table.len(),
            questions_kept: transformed.questions.len(),
            topic_counts: transformed.topic_counts,
            load,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLE: &str = concat!(
        "{\"centerpiece\": \"What is DNA?\", \"options\": [\"A molecule\", \"A cell\"], \"correct_options_idx\": [0]}\n",
        "{\"centerpiece\": \"  WHAT IS DNA?  \", \"options\": [\"A molecule\", \"A cell\"], \"correct_options_idx\": [0]}\n",
        "{\"centerpiece\": \"Which is a noble gas?\", \"options\": [\"Iron\", \"Neon\"], \"correct_options_idx\": [1], \"topic\": \"chemistry\"}\n",
        "{\"centerpiece\": \"Unanswered\", \"options\": [\"A\", \"B\"], \"correct_options_idx\": []}\n",
        "{\"centerpiece\": \"No options key\", \"correct_options_idx\": [0]}\n",
    );

    #[test]
    fn test_strict_pipeline_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempdir().unwrap();
        let input = dir.path().join("dev.jsonl");
        fs::write(&input, SAMPLE).unwrap();
        let db = DbLocation::File(dir.path().join("etl_data.db"));

        let pipeline = Pipeline::new(PipelineOptions::strict().with_db(db.clone()));
        let report = pipeline.run(&input).unwrap();
        assert_eq!(report.records_extracted, 4);
        assert_eq!(report.questions_kept, 3);
        assert_eq!(
            report.topic_counts,
            vec![
                TopicCount { topic: "biology".to_string(), question_count: 2 },
                TopicCount { topic: "chemistry".to_string(), question_count: 1 },
            ]
        );
        assert_eq!(report.load.questions_written, 2);
        assert_eq!(report.load.options_written, 4);
        assert_eq!(report.load.duplicates_skipped, 1);

        // A second run over the same file adds nothing
        let again = pipeline.run(&input).unwrap();
        assert_eq!(again.load.questions_written, 0);

        let store = QuizStore::open(&db).unwrap();
        assert_eq!(store.question_count().unwrap(), 2);
        assert_eq!(store.option_count().unwrap(), 4);
    }

    #[test]
    fn test_lenient_pipeline_end_to_end() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("test.jsonl");
        fs::write(&input, SAMPLE).unwrap();
        let db = DbLocation::File(dir.path().join("lenient.db"));

        let pipeline = Pipeline::new(PipelineOptions::lenient().with_db(db.clone()));
        let report = pipeline.run(&input).unwrap();
        assert_eq!(report.records_extracted, 5);
        // First-is-correct keeps both DNA rows and the row without options
        assert_eq!(report.questions_kept, 3);
        assert_eq!(report.load.questions_written, 3);
        assert_eq!(report.load.options_written, 4);

        pipeline.run(&input).unwrap();
        let store = QuizStore::open(&db).unwrap();
        assert_eq!(store.question_count().unwrap(), 6);
    }

    #[test]
    fn test_custom_filter_overrides_policy() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("dev.jsonl");
        fs::write(&input, SAMPLE).unwrap();

        let pipeline = Pipeline::new(PipelineOptions::strict().with_db(DbLocation::InMemory))
            .with_filter(|idx: &[i64]| idx.contains(&1));
        let report = pipeline.run(&input).unwrap();
        assert_eq!(report.questions_kept, 1);
        assert_eq!(report.topic_counts[0].topic, "chemistry");
    }

    #[test]
    fn test_stage_errors_propagate() {
        let dir = tempdir().unwrap();
        let pipeline = Pipeline::new(PipelineOptions::strict().with_db(DbLocation::InMemory));

        let missing = dir.path().join("missing.jsonl");
        assert!(matches!(
            pipeline.run(&missing),
            Err(EtlError::InputNotFound(_))
        ));

        let malformed = dir.path().join("bad.jsonl");
        fs::write(&malformed, "not json\n").unwrap();
        assert!(matches!(
            pipeline.run(&malformed),
            Err(EtlError::MalformedInput { line: 1, .. })
        ));

        let lenient = Pipeline::new(PipelineOptions::lenient().with_db(DbLocation::InMemory));
        let no_columns = dir.path().join("topics.jsonl");
        fs::write(&no_columns, "{\"topic\": \"biology\"}\n").unwrap();
        assert!(matches!(lenient.run(&no_columns), Err(EtlError::Schema(_))));
    }
}
