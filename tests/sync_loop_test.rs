//! Integration tests for the sync loop against a scripted upstream.

mod common;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{count, message, post_ids, setup_db};
use discord_channel_mirror::config::Config;
use discord_channel_mirror::db::{ensure_schema, get_cursor, Database, StoreProfile};
use discord_channel_mirror::discord::Message;
use discord_channel_mirror::sync::{
    Connector, FetchError, MessageSource, StepOutcome, SyncLoop, SyncSettings, SyncState,
};
use tempfile::TempDir;

/// Upstream behavior shared between the connector and every session it opens.
#[derive(Clone, Default)]
struct Script {
    windows: Arc<Mutex<VecDeque<Result<Vec<Message>, FetchError>>>>,
    singles: Arc<Mutex<HashMap<String, Message>>>,
    single_failures: Arc<Mutex<VecDeque<FetchError>>>,
    afters: Arc<Mutex<Vec<String>>>,
    connects: Arc<AtomicUsize>,
    /// Number of upcoming connect attempts that fail.
    refused_connects: Arc<AtomicUsize>,
}

impl Script {
    fn push(&self, window: Result<Vec<Message>, FetchError>) {
        self.windows.lock().unwrap().push_back(window);
    }

    fn push_ids(&self, ids: &[&str]) {
        self.push(Ok(ids.iter().map(|id| message(id, "hi")).collect()));
    }

    fn insert_single(&self, message: Message) {
        self.singles
            .lock()
            .unwrap()
            .insert(message.id.clone(), message);
    }

    fn fail_single(&self, error: FetchError) {
        self.single_failures.lock().unwrap().push_back(error);
    }

    fn afters(&self) -> Vec<String> {
        self.afters.lock().unwrap().clone()
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

struct ScriptedConnector {
    script: Script,
}

struct ScriptedSource {
    script: Script,
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Source = ScriptedSource;

    async fn connect(&self) -> Result<ScriptedSource, FetchError> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .script
            .refused_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(FetchError::transient("gateway unavailable"));
        }
        Ok(ScriptedSource {
            script: self.script.clone(),
        })
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn fetch_after(&self, after: &str, _limit: u8) -> Result<Vec<Message>, FetchError> {
        self.script.afters.lock().unwrap().push(after.to_string());
        self.script
            .windows
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_single(&self, message_id: &str) -> Result<Message, FetchError> {
        if let Some(error) = self.script.single_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.script
            .singles
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(message_id.to_string()))
    }
}

fn settings() -> SyncSettings {
    Config::for_testing().sync_settings()
}

async fn setup() -> (Database, TempDir) {
    let (db, temp_dir) = setup_db(StoreProfile::sqlite()).await;
    ensure_schema(&db).await.expect("Failed to ensure schema");
    (db, temp_dir)
}

async fn sync_loop(
    db: &Database,
    script: &Script,
    settings: SyncSettings,
) -> SyncLoop<ScriptedConnector> {
    let connector = ScriptedConnector {
        script: script.clone(),
    };
    SyncLoop::new(connector, db.clone(), settings)
        .await
        .expect("Failed to create sync loop")
}

#[tokio::test]
async fn test_window_is_stored_oldest_first() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.push_ids(&["5", "4", "3"]);

    let mut sync = sync_loop(&db, &script, settings()).await;
    let outcome = sync.step().await;

    assert!(matches!(outcome, StepOutcome::Committed(ref r) if r.inserted == 3));
    assert_eq!(post_ids(&db).await, vec!["3", "4", "5"]);
    assert_eq!(sync.cursor(), "5");
    assert_eq!(get_cursor(db.pool(), "0").await.unwrap(), "5");
    assert_eq!(script.afters(), vec!["0"]);
}

#[tokio::test]
async fn test_empty_channel_goes_idle() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();

    let mut sync = sync_loop(&db, &script, settings()).await;
    assert_eq!(sync.state(), SyncState::CatchingUp);

    let outcome = sync.step().await;

    assert!(matches!(outcome, StepOutcome::Idle(_)));
    assert_eq!(outcome.delay(), Some(settings().idle_interval));
    assert_eq!(sync.state(), SyncState::Idle);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM posts").await, 0);
    assert_eq!(get_cursor(db.pool(), "0").await.unwrap(), "0");
}

#[tokio::test]
async fn test_cursor_only_moves_forward_across_windows() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.push_ids(&["2", "1"]);
    script.push_ids(&["4", "3"]);

    let mut sync = sync_loop(&db, &script, settings()).await;

    sync.step().await;
    assert_eq!(sync.cursor(), "2");
    sync.step().await;
    assert_eq!(sync.cursor(), "4");
    let outcome = sync.step().await;
    assert!(matches!(outcome, StepOutcome::Idle(_)));

    assert_eq!(script.afters(), vec!["0", "2", "4"]);
    assert_eq!(post_ids(&db).await, vec!["1", "2", "3", "4"]);
    assert_eq!(sync.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_new_messages_after_idle_resume_catch_up() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.push(Ok(Vec::new()));
    script.push_ids(&["10"]);

    let mut sync = sync_loop(&db, &script, settings()).await;
    sync.step().await;
    assert_eq!(sync.state(), SyncState::Idle);

    sync.step().await;
    assert_eq!(sync.state(), SyncState::CatchingUp);
    assert_eq!(sync.cursor(), "10");
}

#[tokio::test]
async fn test_restart_resumes_from_stored_cursor() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.push_ids(&["3", "2", "1"]);

    let mut first = sync_loop(&db, &script, settings()).await;
    first.step().await;
    drop(first);

    let mut second = sync_loop(&db, &script, settings()).await;
    assert_eq!(second.cursor(), "3");
    second.step().await;

    assert_eq!(script.afters(), vec!["0", "3"]);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM posts").await, 3);
}

#[tokio::test]
async fn test_transient_error_retries_same_window() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.push(Err(FetchError::transient("timed out")));
    script.push(Err(FetchError::transient("timed out again")));
    script.push_ids(&["1"]);

    let mut sync = sync_loop(&db, &script, settings()).await;

    let first = sync.step().await;
    let second = sync.step().await;
    match (&first, &second) {
        (StepOutcome::FetchRetry(a), StepOutcome::FetchRetry(b)) => assert!(b > a),
        other => panic!("unexpected outcomes: {other:?}"),
    }
    assert_eq!(sync.cursor(), "0");
    assert!(sync.is_connected());

    assert!(matches!(sync.step().await, StepOutcome::Committed(_)));
    assert_eq!(script.afters(), vec!["0", "0", "0"]);
    assert_eq!(script.connects(), 1);
}

#[tokio::test]
async fn test_rate_limit_hint_is_honored() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.push(Err(FetchError::Transient {
        reason: "rate limited".to_string(),
        retry_after: Some(std::time::Duration::from_secs(3)),
    }));

    let mut sync = sync_loop(&db, &script, settings()).await;
    let outcome = sync.step().await;

    assert_eq!(outcome.delay(), Some(std::time::Duration::from_secs(3)));
}

#[tokio::test]
async fn test_fatal_error_reconnects_from_stored_cursor() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.push_ids(&["2", "1"]);
    script.push(Err(FetchError::Fatal("401 Unauthorized".to_string())));
    script.push_ids(&["12"]);

    let mut sync = sync_loop(&db, &script, settings()).await;
    sync.step().await;

    assert!(matches!(sync.step().await, StepOutcome::Disconnected));
    assert!(!sync.is_connected());

    // Another writer moved the cursor while the session was down.
    sqlx::query("UPDATE internal SET top_message = '11'")
        .execute(db.pool())
        .await
        .unwrap();

    assert!(matches!(sync.step().await, StepOutcome::Committed(_)));
    assert_eq!(script.connects(), 2);
    assert_eq!(script.afters(), vec!["0", "2", "11"]);
    assert_eq!(sync.cursor(), "12");
}

#[tokio::test]
async fn test_write_failure_retries_same_window() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.push_ids(&["2", "1"]);
    script.push_ids(&["2", "1"]);

    sqlx::query(
        "CREATE TRIGGER reject_post BEFORE INSERT ON posts WHEN NEW.discord_id = '2' \
         BEGIN SELECT RAISE(ABORT, 'injected'); END",
    )
    .execute(db.pool())
    .await
    .unwrap();

    let mut sync = sync_loop(&db, &script, settings()).await;
    assert!(matches!(sync.step().await, StepOutcome::WriteRetry(_)));
    assert_eq!(sync.cursor(), "0");
    assert_eq!(count(&db, "SELECT COUNT(*) FROM posts").await, 0);

    sqlx::query("DROP TRIGGER reject_post")
        .execute(db.pool())
        .await
        .unwrap();

    assert!(matches!(sync.step().await, StepOutcome::Committed(_)));
    assert_eq!(script.afters(), vec!["0", "0"]);
    assert_eq!(post_ids(&db).await, vec!["1", "2"]);
}

#[tokio::test]
async fn test_capture_genesis_stores_seed_message() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.insert_single(message("5", "in the beginning"));
    script.push_ids(&["6"]);

    let mut settings = settings();
    settings.seed_cursor = "5".to_string();
    let mut sync = sync_loop(&db, &script, settings).await;

    let result = sync.capture_genesis().await.unwrap().expect("genesis stored");
    assert_eq!(result.inserted, 1);
    assert_eq!(get_cursor(db.pool(), "0").await.unwrap(), "5");

    sync.step().await;
    assert_eq!(post_ids(&db).await, vec!["5", "6"]);
    assert_eq!(script.afters(), vec!["5"]);

    // Past the seed, there is nothing left to capture.
    assert!(sync.capture_genesis().await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_genesis_is_skipped() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();

    let mut settings = settings();
    settings.seed_cursor = "5".to_string();
    let mut sync = sync_loop(&db, &script, settings).await;

    assert!(sync.capture_genesis().await.unwrap().is_none());
    assert_eq!(count(&db, "SELECT COUNT(*) FROM posts").await, 0);
}

#[tokio::test]
async fn test_genesis_survives_transient_fetch_error() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.insert_single(message("5", "in the beginning"));
    script.fail_single(FetchError::transient("429 Too Many Requests"));
    script.fail_single(FetchError::Transient {
        reason: "rate limited".to_string(),
        retry_after: Some(std::time::Duration::from_millis(20)),
    });
    script.push_ids(&["6"]);

    let mut settings = settings();
    settings.seed_cursor = "5".to_string();
    let mut sync = sync_loop(&db, &script, settings).await;

    let result = sync.capture_genesis().await.unwrap().expect("genesis stored");
    assert_eq!(result.inserted, 1);

    sync.step().await;
    assert_eq!(post_ids(&db).await, vec!["5", "6"]);
    assert_eq!(script.connects(), 1);
}

#[tokio::test]
async fn test_genesis_waits_for_upstream_connection() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.insert_single(message("5", "in the beginning"));
    script.refused_connects.store(2, Ordering::SeqCst);

    let mut settings = settings();
    settings.seed_cursor = "5".to_string();
    let mut sync = sync_loop(&db, &script, settings).await;

    let result = sync.capture_genesis().await.unwrap();
    assert!(result.is_some());
    assert_eq!(script.connects(), 3);
    assert_eq!(post_ids(&db).await, vec!["5"]);
}

#[tokio::test]
async fn test_genesis_gives_up_on_fatal_error() {
    let (db, _temp_dir) = setup().await;
    let script = Script::default();
    script.insert_single(message("5", "in the beginning"));
    script.fail_single(FetchError::Fatal("403 Forbidden".to_string()));

    let mut settings = settings();
    settings.seed_cursor = "5".to_string();
    let mut sync = sync_loop(&db, &script, settings).await;

    assert!(sync.capture_genesis().await.is_err());
    assert!(!sync.is_connected());
    assert_eq!(count(&db, "SELECT COUNT(*) FROM posts").await, 0);
}
