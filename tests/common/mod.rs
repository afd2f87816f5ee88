//! Shared fixtures for integration tests.

#![allow(dead_code)]

use discord_channel_mirror::db::{sqlite_url, Database, StoreProfile};
use discord_channel_mirror::discord::{Attachment, Message, User};
use tempfile::TempDir;

pub async fn setup_db(profile: StoreProfile) -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = open_db(&temp_dir, profile).await;
    (db, temp_dir)
}

pub async fn open_db(temp_dir: &TempDir, profile: StoreProfile) -> Database {
    let url = sqlite_url(&temp_dir.path().join("test.sqlite"));
    Database::connect(&url, profile, 1)
        .await
        .expect("Failed to connect to store")
}

pub async fn count(db: &Database, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .fetch_one(db.pool())
        .await
        .expect("Failed to count rows")
}

pub async fn post_ids(db: &Database) -> Vec<String> {
    sqlx::query_scalar::<_, String>("SELECT discord_id FROM posts ORDER BY rowid")
        .fetch_all(db.pool())
        .await
        .expect("Failed to list posts")
}

pub fn message(id: &str, content: &str) -> Message {
    Message {
        id: id.to_string(),
        channel_id: "100000000000000000".to_string(),
        author: User {
            id: "42".to_string(),
            username: "alice".to_string(),
            global_name: None,
            avatar: None,
        },
        content: content.to_string(),
        timestamp: "2024-03-01T10:00:00.000000+00:00".to_string(),
        ..Message::default()
    }
}

pub fn with_attachment(mut message: Message, attachment_id: &str) -> Message {
    message.attachments.push(Attachment {
        id: attachment_id.to_string(),
        filename: format!("{attachment_id}.png"),
        size: 1024,
        url: format!("https://cdn.example.com/{attachment_id}.png"),
        proxy_url: format!("https://media.example.com/{attachment_id}.png"),
        height: Some(64),
        width: Some(64),
    });
    message
}
