use async_trait::async_trait;
use north::cli::{apply_scripts, render_plan};
use north::engine::{ExecutionResult, Executor};
use north::{BlockKind, ExecutionError, ParseError, RunnerConfig, Script};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn sql_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/sql")
}

fn load(relative: &str, config: &RunnerConfig) -> Script {
    Script::from_path(&sql_root().join(relative), config).expect("fixture should parse")
}

fn kinds(script: &Script) -> Vec<BlockKind> {
    script.block_list().iter().map(|b| b.kind()).collect()
}

/// Drops comment lines so assertions can focus on the SQL that was sent.
fn sql_only(statement: &str) -> String {
    statement
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Stands in for a database connection. Statements containing `counted`
/// consume the queued row counts; everything else reports 0 rows.
#[derive(Default)]
struct Recorder {
    submitted: Vec<String>,
    counted: Option<&'static str>,
    rowcounts: VecDeque<u64>,
    fail_on: Option<&'static str>,
}

impl Recorder {
    fn with_rowcounts(counted: &'static str, rowcounts: Vec<u64>) -> Self {
        Self {
            counted: Some(counted),
            rowcounts: rowcounts.into(),
            ..Default::default()
        }
    }

    fn heads(&self) -> Vec<String> {
        self.submitted
            .iter()
            .map(|s| sql_only(s).lines().next().unwrap_or("").to_string())
            .collect()
    }
}

#[async_trait]
impl Executor for Recorder {
    async fn execute(&mut self, sql: &str) -> ExecutionResult<u64> {
        self.submitted.push(sql.to_string());

        if let Some(needle) = self.fail_on {
            if sql.contains(needle) {
                return Err(ExecutionError::Database(format!("relation missing: {}", needle)));
            }
        }

        match self.counted {
            Some(needle) if sql.contains(needle) => Ok(self.rowcounts.pop_front().unwrap_or(0)),
            _ => Ok(0),
        }
    }
}

#[test]
fn script_classification() {
    let config = RunnerConfig::default();

    // Simple script
    let script = load("16.12/16.12-0-version-dml.sql", &config);
    assert_eq!(kinds(&script), vec![BlockKind::Simple]);
    assert!(script.block_list()[0].is_transactional());

    // Manual script without meta blocks
    let script = load("17.01/manual/17.01-feature_a-070-dl.sql", &config);
    assert!(script.is_manual());
    assert_eq!(kinds(&script), vec![BlockKind::Plain]);
    assert!(!script.block_list()[0].is_transactional());

    // Manual script with meta blocks
    let script = load("17.01/manual/17.01-feature_a-040-dml.sql", &config);
    assert_eq!(
        kinds(&script),
        vec![BlockKind::Plain, BlockKind::Meta, BlockKind::Plain]
    );

    // Manual script outside of a 'manual' directory
    let script = load("17.02/17.02-feature_b_manual-dml.sql", &config);
    assert!(!script.is_manual());
    assert_eq!(
        kinds(&script),
        vec![BlockKind::Plain, BlockKind::Meta, BlockKind::Plain]
    );

    // Only quotes the marker, so still a simple script
    let script = load("17.02/17.02-feature_c_fakemanual-ddl.sql", &config);
    assert_eq!(kinds(&script), vec![BlockKind::Simple]);
}

#[test]
fn non_transactional_keyword_follows_configuration() {
    let path = "17.01/17.01-feature_b-ddl.sql";

    let with_keyword = RunnerConfig::default().with_keywords(["CONCURRENTLY"]);
    let script = load(path, &with_keyword);
    assert_eq!(kinds(&script), vec![BlockKind::Plain]);

    let script = load(path, &RunnerConfig::default());
    assert_eq!(kinds(&script), vec![BlockKind::Simple]);
}

#[tokio::test]
async fn simple_script_runs_once_then_discards() {
    let script = load("16.12/16.12-0-version-dml.sql", &RunnerConfig::default());
    let mut recorder = Recorder::default();

    script.run(&mut recorder).await.unwrap();

    assert_eq!(
        recorder.heads(),
        vec![
            "BEGIN",
            "INSERT INTO north_version (version_num) VALUES ('16.12')",
            "COMMIT",
            "DISCARD ALL",
        ]
    );
}

#[tokio::test]
async fn simple_script_without_discard() {
    let config = RunnerConfig::default().with_discard_on_completion(false);
    let script = load("16.12/16.12-0-version-dml.sql", &config);
    let mut recorder = Recorder::default();

    script.run(&mut recorder).await.unwrap();

    assert_eq!(recorder.submitted.len(), 3);
    assert!(!recorder.submitted.iter().any(|s| s.contains("DISCARD")));
}

#[tokio::test]
async fn manual_script_runs_meta_block_until_zero_rows() {
    let script = load("17.01/manual/17.01-feature_a-040-dml.sql", &RunnerConfig::default());
    let mut recorder = Recorder::with_rowcounts("UPDATE book", vec![500, 299, 0]);

    script.run(&mut recorder).await.unwrap();

    assert_eq!(
        recorder.heads(),
        vec![
            "ALTER TABLE book ADD COLUMN author_id integer",
            "UPDATE book SET author_id = legacy.author_id",
            "UPDATE book SET author_id = legacy.author_id",
            "UPDATE book SET author_id = legacy.author_id",
            "ALTER TABLE book ALTER COLUMN author_id SET NOT NULL",
            "DISCARD ALL",
        ]
    );
    assert!(recorder.rowcounts.is_empty());
    assert!(!recorder.submitted.iter().any(|s| s == "BEGIN"));
}

#[tokio::test]
async fn failure_aborts_the_script_and_skips_discard() {
    let script = load("17.01/manual/17.01-feature_a-040-dml.sql", &RunnerConfig::default());
    let mut recorder = Recorder {
        fail_on: Some("legacy_author_lookup"),
        ..Default::default()
    };

    let err = script.run(&mut recorder).await.unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::Database(ref msg) if msg.contains("legacy_author_lookup")
    ));
    assert_eq!(recorder.submitted.len(), 2);
    assert!(!recorder.submitted.iter().any(|s| s.contains("DISCARD")));
}

#[tokio::test]
async fn apply_parses_every_script_before_running_any() {
    let dir = TempDir::new().unwrap();
    let broken = dir.path().join("18.01-broken-dml.sql");
    fs::write(&broken, "SELECT 1;\n--meta-psql:do-until-0\nUPDATE t SET x = 1;\n").unwrap();

    let paths = vec![sql_root().join("16.12/16.12-0-version-dml.sql"), broken];
    let mut recorder = Recorder::default();

    let err = apply_scripts(&paths, &RunnerConfig::default(), &mut recorder)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ParseError>(),
        Some(ParseError::UnclosedMetaBlock { line: 2 })
    ));
    assert!(recorder.submitted.is_empty());
}

#[tokio::test]
async fn apply_runs_scripts_in_the_given_order() {
    let paths = vec![
        sql_root().join("17.01/manual/17.01-feature_a-070-dl.sql"),
        sql_root().join("16.12/16.12-0-version-dml.sql"),
    ];
    let config = RunnerConfig::default().with_discard_on_completion(false);
    let mut recorder = Recorder::default();

    let applied = apply_scripts(&paths, &config, &mut recorder).await.unwrap();

    assert_eq!(applied, 2);
    assert_eq!(
        recorder.heads(),
        vec![
            "DROP TABLE IF EXISTS legacy_author_lookup",
            "BEGIN",
            "INSERT INTO north_version (version_num) VALUES ('16.12')",
            "COMMIT",
        ]
    );
}

#[test]
fn plan_lists_blocks_and_discard() {
    let script = load("17.02/17.02-feature_b_manual-dml.sql", &RunnerConfig::default());
    let table = render_plan(&script);

    assert!(table.contains("meta"));
    assert!(table.contains("plain"));
    assert!(table.contains("discard"));
    assert!(table.contains("UPDATE book SET title_normalized = lower(title)"));

    let config = RunnerConfig::default().with_discard_on_completion(false);
    let script = load("17.02/17.02-feature_b_manual-dml.sql", &config);
    assert!(!render_plan(&script).contains("discard"));
}
