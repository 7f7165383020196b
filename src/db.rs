use crate::error::{EtlError, Result, StorageError};
use crate::models::{DEFAULT_TOPIC, Question, QuestionOption, QuestionRow};
use crate::progress::{ProgressCallback, ProgressUpdate};
use log::{debug, error, info, warn};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, params};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

// --- Schema Definition ---

const CREATE_QUESTIONS_TABLE_UNIQUE: &str = "
CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY,
    question_text TEXT NOT NULL UNIQUE,
    topic TEXT DEFAULT 'biology'
);";

const CREATE_QUESTIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY,
    question_text TEXT NOT NULL,
    topic TEXT DEFAULT 'biology'
);";

const CREATE_OPTIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS options (
    id INTEGER PRIMARY KEY,
    question_id INTEGER NOT NULL,
    option_text TEXT NOT NULL,
    is_correct BOOLEAN NOT NULL, -- 0 for false, 1 for true
    FOREIGN KEY (question_id) REFERENCES questions(id)
);";

// --- Indices ---

const CREATE_QUESTION_TEXT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_question_text ON questions (question_text);";
const CREATE_OPTION_QUESTION_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_question_id ON options (question_id);";

const LOAD_STAGE: &str = "Loading questions";

// --- Load Configuration ---

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    InMemory,
}

impl Default for DbLocation {
    fn default() -> Self {
        DbLocation::File(PathBuf::from("etl_data.db"))
    }
}

impl fmt::Display for DbLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbLocation::File(path) => write!(f, "{}", path.display()),
            DbLocation::InMemory => write!(f, ":memory:"),
        }
    }
}

/// Accepts `sqlite:///<path>` URLs, `sqlite://` or `:memory:` for an
/// in-memory database, and plain filesystem paths.
impl FromStr for DbLocation {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let path = match s.strip_prefix("sqlite://") {
            Some(rest) => rest.strip_prefix('/').unwrap_or(rest),
            None if s.contains("://") => {
                return Err(format!("Unsupported database location: {}", s));
            }
            None => s,
        };
        match path {
            "" | ":memory:" => Ok(DbLocation::InMemory),
            _ => Ok(DbLocation::File(PathBuf::from(path))),
        }
    }
}

/// What to do with a question whose normalized text is already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Skip the question and its options. `question_text` is UNIQUE in the schema.
    #[default]
    SkipExisting,
    /// Insert a new question row every time.
    AlwaysInsert,
}

impl fmt::Display for DedupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupPolicy::SkipExisting => write!(f, "skip-existing"),
            DedupPolicy::AlwaysInsert => write!(f, "always-insert"),
        }
    }
}

impl FromStr for DedupPolicy {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "skip-existing" | "skip" => Ok(DedupPolicy::SkipExisting),
            "always-insert" | "always" => Ok(DedupPolicy::AlwaysInsert),
            _ => Err(format!("Invalid dedup policy: {}", s)),
        }
    }
}

/// How option entries that are not JSON strings are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptionTextPolicy {
    /// Skip non-string entries.
    #[default]
    StringsOnly,
    /// Store non-string entries as their JSON text.
    AnyJson,
}

/// Options for loading transformed rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub dedup: DedupPolicy,
    pub option_text: OptionTextPolicy,
}

/// Counts of what a load wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub questions_written: usize,
    pub options_written: usize,
    pub duplicates_skipped: usize,
}

// --- Store ---

/// Schema and connection context for one load.
///
/// The connection is closed when the store is dropped.
pub struct QuizStore {
    conn: Connection,
    location: DbLocation,
}

// Opens the connection and applies pragmas
fn open_db_connection(location: &DbLocation) -> Result<Connection> {
    let conn = match location {
        DbLocation::File(path) => {
            ensure_parent_dir(path)?;
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            )?;
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!("Journal mode for {}: {}", path.display(), mode);
            conn
        }
        DbLocation::InMemory => Connection::open_in_memory()?,
    };

    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| StorageError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
            Ok(())
        }
        _ => Ok(()),
    }
}

impl QuizStore {
    pub fn open(location: &DbLocation) -> Result<Self> {
        debug!("Opening database: {}", location);
        let conn = open_db_connection(location)?;
        Ok(QuizStore {
            conn,
            location: location.clone(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&DbLocation::InMemory)
    }

    /// Direct access to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Creates the tables and indices if they don't exist.
    ///
    /// The `question_text` column is UNIQUE only for [`DedupPolicy::SkipExisting`].
    /// An existing `questions` table is left as it is.
    pub fn initialize_schema(&mut self, dedup: DedupPolicy) -> Result<()> {
        debug!("Initializing database schema ({})...", dedup);
        let tx = self.conn.transaction()?;

        let questions_table = match dedup {
            DedupPolicy::SkipExisting => CREATE_QUESTIONS_TABLE_UNIQUE,
            DedupPolicy::AlwaysInsert => CREATE_QUESTIONS_TABLE,
        };
        tx.execute(questions_table, [])?;
        tx.execute(CREATE_OPTIONS_TABLE, [])?;

        tx.execute(CREATE_QUESTION_TEXT_INDEX, [])?;
        tx.execute(CREATE_OPTION_QUESTION_INDEX, [])?;

        tx.commit()?;
        debug!("Database schema initialization complete.");
        Ok(())
    }

    /// Inserts all rows in a single transaction.
    ///
    /// Either every question and option of the batch is committed or, on the
    /// first failure, nothing is.
    pub fn insert_questions(
        &mut self,
        rows: &[QuestionRow],
        options: &LoadOptions,
        mut progress: Option<ProgressCallback>,
    ) -> Result<LoadSummary> {
        let start_time = Instant::now();
        let tx = self.conn.transaction()?;

        match insert_rows(&tx, rows, options, &mut progress) {
            Ok(summary) => {
                tx.commit().map_err(|e| {
                    error!("Loading failed on commit: {}", e);
                    EtlError::from(e)
                })?;
                info!(
                    "Loaded {} questions, {} options into {} ({} duplicates skipped). Took {:.2?}",
                    summary.questions_written,
                    summary.options_written,
                    self.location,
                    summary.duplicates_skipped,
                    start_time.elapsed()
                );
                Ok(summary)
            }
            Err(e) => {
                error!("Loading failed: {}", e);
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    pub fn question_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn option_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM options", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// All stored questions, in insertion order.
    pub fn questions(&self) -> Result<Vec<Question>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, question_text, topic FROM questions ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Question {
                id: row.get(0)?,
                question_text: row.get(1)?,
                topic: row
                    .get::<_, Option<String>>(2)?
                    .unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(EtlError::from)
    }

    pub fn options_for_question(&self, question_id: i64) -> Result<Vec<QuestionOption>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, question_id, option_text, is_correct FROM options
             WHERE question_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![question_id], |row| {
            Ok(QuestionOption {
                id: row.get(0)?,
                question_id: row.get(1)?,
                option_text: row.get(2)?,
                is_correct: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(EtlError::from)
    }
}

fn insert_rows(
    tx: &Transaction,
    rows: &[QuestionRow],
    options: &LoadOptions,
    progress: &mut Option<ProgressCallback>,
) -> Result<LoadSummary> {
    let mut maybe_report = |update: ProgressUpdate| {
        if let Some(cb) = progress.as_mut() {
            cb(update);
        }
    };

    let mut find_question_stmt =
        tx.prepare("SELECT id FROM questions WHERE question_text = ?1 LIMIT 1")?;
    let mut question_stmt =
        tx.prepare("INSERT INTO questions (question_text, topic) VALUES (?1, ?2)")?;
    let mut option_stmt = tx.prepare(
        "INSERT INTO options (question_id, option_text, is_correct) VALUES (?1, ?2, ?3)",
    )?;

    let total = rows.len() as u64;
    maybe_report(ProgressUpdate::new_stage(LOAD_STAGE.to_string(), Some(total)));

    let mut summary = LoadSummary::default();
    for (current, row) in rows.iter().enumerate() {
        maybe_report(ProgressUpdate {
            stage_description: LOAD_STAGE.to_string(),
            current_item: current as u64 + 1,
            total_items: Some(total),
            message: Some(row.question_text.clone()),
        });

        if options.dedup == DedupPolicy::SkipExisting {
            // Rows inserted earlier in this transaction are visible here too
            let existing: Option<i64> = find_question_stmt
                .query_row(params![row.question_text], |r| r.get(0))
                .optional()?;
            if let Some(id) = existing {
                debug!(
                    "Question already stored as {}, skipping: {}",
                    id, row.question_text
                );
                summary.duplicates_skipped += 1;
                continue;
            }
        }

        let question_id = question_stmt.insert(params![row.question_text, row.topic])?;
        summary.questions_written += 1;

        for &idx in &row.correct_options_idx {
            if idx < 0 || idx as usize >= row.options.len() {
                warn!(
                    "Correct index {} out of range for '{}' ({} options)",
                    idx,
                    row.question_text,
                    row.options.len()
                );
            }
        }

        for (position, option) in row.options.iter().enumerate() {
            let option_text = match (option, options.option_text) {
                (Value::String(text), _) => text.clone(),
                (other, OptionTextPolicy::AnyJson) => other.to_string(),
                (other, OptionTextPolicy::StringsOnly) => {
                    debug!(
                        "Skipping non-string option {} for '{}'",
                        other, row.question_text
                    );
                    continue;
                }
            };
            option_stmt.execute(params![question_id, option_text, row.is_correct(position)])?;
            summary.options_written += 1;
        }
    }

    Ok(summary)
}

/// Opens the database at `location`, ensures the schema exists and loads `rows`.
pub fn load_questions(
    rows: &[QuestionRow],
    location: &DbLocation,
    options: &LoadOptions,
    progress: Option<ProgressCallback>,
) -> Result<LoadSummary> {
    let mut store = QuizStore::open(location).map_err(|e| {
        error!("Loading failed: could not open {}: {}", location, e);
        e
    })?;
    store.initialize_schema(options.dedup).map_err(|e| {
        error!("Loading failed: could not initialize schema in {}: {}", location, e);
        e
    })?;
    store.insert_questions(rows, options, progress)
}
