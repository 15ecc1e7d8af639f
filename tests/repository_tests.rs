//! Repository tests against the local SQLite store
//!
//! Each test gets its own in-memory database with migrations applied.

use converso::infrastructure::database::DatabaseConnection;
use converso::infrastructure::entities::NewCompanion;
use converso::infrastructure::repositories::DbCompanionRepository;
use converso::infrastructure::traits::{CompanionFilter, CompanionRepository};
use di::Ref;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

async fn setup_repository() -> DbCompanionRepository {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let connection = DatabaseConnection::sqlite(pool);
    connection.migrate().await.unwrap();
    DbCompanionRepository::new(Ref::new(connection))
}

fn fields(name: &str, subject: &str, topic: &str) -> NewCompanion {
    NewCompanion {
        name: name.into(),
        subject: subject.into(),
        topic: topic.into(),
        voice: Some("female".into()),
        style: Some("casual".into()),
        duration: 15,
    }
}

fn filter(subject: Option<&str>, topic: Option<&str>) -> CompanionFilter {
    CompanionFilter {
        subject: subject.map(str::to_owned),
        topic: topic.map(str::to_owned),
        from: 0,
        to: 9,
    }
}

fn names(companions: &[converso::infrastructure::entities::Companion]) -> Vec<&str> {
    companions.iter().map(|c| c.name.as_str()).collect()
}

#[tokio::test]
async fn test_insert_and_find_companion() {
    let repo = setup_repository().await;

    let created = repo
        .insert_companion(None, "user_1", fields("Neura", "science", "Neural networks"))
        .await
        .unwrap();

    assert_eq!(created.author, "user_1");
    assert_eq!(created.voice.as_deref(), Some("female"));
    assert!(created.created_at.is_some());

    let found = repo.find_companion(None, created.id).await.unwrap();
    assert_eq!(found, Some(created));
}

#[tokio::test]
async fn test_find_missing_companion() {
    let repo = setup_repository().await;

    let found = repo.find_companion(None, Uuid::new_v4()).await.unwrap();

    assert!(found.is_none());
}

#[tokio::test]
async fn test_library_filters() {
    let repo = setup_repository().await;
    for (name, subject, topic) in [
        ("Neura", "science", "Neural networks"),
        ("Countsy", "maths", "Derivatives"),
        ("Loopy", "coding", "Loops in Rust"),
        ("Derivo", "science", "Cells"),
    ] {
        repo.insert_companion(None, "user_1", fields(name, subject, topic))
            .await
            .unwrap();
    }

    let all = repo.list_companions(None, &filter(None, None)).await.unwrap();
    assert_eq!(all.len(), 4);

    // subject matches partially and ignores case
    let science = repo
        .list_companions(None, &filter(Some("SCI"), None))
        .await
        .unwrap();
    assert_eq!(names(&science), vec!["Neura", "Derivo"]);

    // topic searches both topic and name
    let derivatives = repo
        .list_companions(None, &filter(None, Some("deriv")))
        .await
        .unwrap();
    assert_eq!(names(&derivatives), vec!["Countsy", "Derivo"]);

    let both = repo
        .list_companions(None, &filter(Some("science"), Some("deriv")))
        .await
        .unwrap();
    assert_eq!(names(&both), vec!["Derivo"]);
}

#[tokio::test]
async fn test_library_pagination() {
    let repo = setup_repository().await;
    for i in 0..12 {
        repo.insert_companion(None, "user_1", fields(&format!("Companion {i}"), "maths", "Algebra"))
            .await
            .unwrap();
    }

    let first = repo
        .list_companions(None, &CompanionFilter { from: 0, to: 9, ..CompanionFilter::default() })
        .await
        .unwrap();
    let second = repo
        .list_companions(None, &CompanionFilter { from: 10, to: 19, ..CompanionFilter::default() })
        .await
        .unwrap();

    assert_eq!(first.len(), 10);
    assert_eq!(names(&second), vec!["Companion 10", "Companion 11"]);
}

#[tokio::test]
async fn test_companions_by_author() {
    let repo = setup_repository().await;
    for author in ["user_1", "user_1", "user_2"] {
        repo.insert_companion(None, author, fields("Neura", "science", "Cells"))
            .await
            .unwrap();
    }

    let authored = repo.list_companions_by_author(None, "user_1").await.unwrap();
    assert_eq!(authored.len(), 2);
    assert!(authored.iter().all(|c| c.author == "user_1"));

    assert_eq!(repo.count_companions_by_author(None, "user_1").await.unwrap(), 2);
    assert_eq!(repo.count_companions_by_author(None, "user_3").await.unwrap(), 0);
}

#[tokio::test]
async fn test_session_history_newest_first() {
    let repo = setup_repository().await;
    let neura = repo
        .insert_companion(None, "user_1", fields("Neura", "science", "Cells"))
        .await
        .unwrap();
    let countsy = repo
        .insert_companion(None, "user_1", fields("Countsy", "maths", "Algebra"))
        .await
        .unwrap();

    repo.insert_session(None, "user_1", neura.id).await.unwrap();
    repo.insert_session(None, "user_2", countsy.id).await.unwrap();
    repo.insert_session(None, "user_1", countsy.id).await.unwrap();

    let recent = repo.list_session_companions(None, None, 10).await.unwrap();
    assert_eq!(names(&recent), vec!["Countsy", "Countsy", "Neura"]);

    let limited = repo.list_session_companions(None, None, 1).await.unwrap();
    assert_eq!(names(&limited), vec!["Countsy"]);

    let user_1 = repo
        .list_session_companions(None, Some("user_1"), 10)
        .await
        .unwrap();
    assert_eq!(names(&user_1), vec!["Countsy", "Neura"]);

    let nobody = repo
        .list_session_companions(None, Some("user_3"), 10)
        .await
        .unwrap();
    assert!(nobody.is_empty());
}

#[tokio::test]
async fn test_session_for_missing_companion_fails() {
    let repo = setup_repository().await;

    let result = repo.insert_session(None, "user_1", Uuid::new_v4()).await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_bookmarks() {
    let repo = setup_repository().await;
    let neura = repo
        .insert_companion(None, "user_1", fields("Neura", "science", "Cells"))
        .await
        .unwrap();

    assert!(repo.insert_bookmark(None, "user_1", neura.id).await.unwrap());
    assert!(!repo.insert_bookmark(None, "user_1", neura.id).await.unwrap());
    assert!(repo.insert_bookmark(None, "user_2", neura.id).await.unwrap());

    let bookmarked = repo.list_bookmarked_companions(None, "user_1").await.unwrap();
    assert_eq!(bookmarked, vec![neura.clone()]);

    repo.delete_bookmark(None, "user_1", neura.id).await.unwrap();
    assert!(repo
        .list_bookmarked_companions(None, "user_1")
        .await
        .unwrap()
        .is_empty());

    // other users keep theirs, and deleting twice is fine
    repo.delete_bookmark(None, "user_1", neura.id).await.unwrap();
    assert_eq!(
        repo.list_bookmarked_companions(None, "user_2").await.unwrap().len(),
        1
    );
}
