//! Adapter transaction behavior against a recording client.

mod common;

use common::{Events, RecordingClient};
use pgbind::{Adapter, OrmError, OrmResult, TrackType, params};

fn adapter() -> Adapter<RecordingClient> {
    Adapter::new(RecordingClient::new())
}

#[tokio::test]
async fn nested_commit_uses_savepoints_and_fires_in_order() {
    let mut db = adapter();
    let events = Events::default();

    db.start_transaction().await.unwrap();
    db.track_model(TrackType::Committed, events.push("outer"));
    db.start_transaction().await.unwrap();
    assert_eq!(db.transaction_depth(), 2);
    db.track_model(TrackType::Committed, events.push("inner"));
    db.track_model(TrackType::Aborted, events.push("inner-aborted"));

    db.commit_transaction().await.unwrap();
    assert!(events.take().is_empty());
    assert!(db.in_transaction());

    db.commit_transaction().await.unwrap();
    assert_eq!(events.take(), ["outer", "inner"]);
    assert!(!db.in_transaction());

    assert_eq!(
        db.client().log(),
        ["BEGIN", "SAVEPOINT point_1", "RELEASE SAVEPOINT point_1", "COMMIT"]
    );
}

#[tokio::test]
async fn aborting_a_savepoint_keeps_the_outer_transaction() {
    let mut db = adapter();
    let events = Events::default();

    db.start_transaction().await.unwrap();
    db.track_model(TrackType::Committed, events.push("outer"));
    db.start_transaction().await.unwrap();
    db.track_model(TrackType::Committed, events.push("inner"));
    db.track_model(TrackType::Aborted, events.push("inner-aborted"));

    db.abort_transaction().await.unwrap();
    assert_eq!(events.take(), ["inner-aborted"]);
    assert_eq!(db.transaction_depth(), 1);

    db.commit_transaction().await.unwrap();
    assert_eq!(events.take(), ["outer"]);
    assert_eq!(
        db.client().log(),
        ["BEGIN", "SAVEPOINT point_1", "ROLLBACK TO SAVEPOINT point_1", "COMMIT"]
    );
}

#[tokio::test]
async fn outer_abort_fires_callbacks_from_released_savepoints() {
    let mut db = adapter();
    let events = Events::default();

    db.start_transaction().await.unwrap();
    db.start_transaction().await.unwrap();
    db.track_model(TrackType::Aborted, events.push("a"));
    db.commit_transaction().await.unwrap();
    db.track_model(TrackType::Aborted, events.push("b"));
    db.track_model(TrackType::Committed, events.push("never"));

    db.abort_transaction().await.unwrap();
    assert_eq!(events.take(), ["a", "b"]);
    assert_eq!(db.client().log().last().unwrap(), "ROLLBACK");
}

#[tokio::test]
async fn savepoint_names_follow_depth() {
    let mut db = adapter();
    for _ in 0..3 {
        db.start_transaction().await.unwrap();
    }
    db.abort_transaction().await.unwrap();
    db.start_transaction().await.unwrap();

    assert_eq!(
        db.client().log(),
        [
            "BEGIN",
            "SAVEPOINT point_1",
            "SAVEPOINT point_2",
            "ROLLBACK TO SAVEPOINT point_2",
            "SAVEPOINT point_2",
        ]
    );
}

#[tokio::test]
async fn callbacks_outside_a_transaction() {
    let mut db = adapter();
    let events = Events::default();

    db.track_model(TrackType::Committed, events.push("now"));
    db.track_model(TrackType::Aborted, events.push("dropped"));
    assert_eq!(events.take(), ["now"]);
}

#[tokio::test]
async fn commit_and_abort_without_transaction_are_noops() {
    let mut db = adapter();
    db.commit_transaction().await.unwrap();
    db.abort_transaction().await.unwrap();
    assert!(db.client().log().is_empty());
    assert_eq!(db.transaction_depth(), 0);
}

#[tokio::test]
async fn failed_begin_leaves_no_frame() {
    let mut db = Adapter::new(RecordingClient::failing_on("BEGIN"));
    assert!(db.start_transaction().await.is_err());
    assert!(!db.in_transaction());
    assert!(db.last_error().is_some());
}

#[tokio::test]
async fn failed_commit_fires_aborted_callbacks() {
    let mut db = Adapter::new(RecordingClient::failing_on("COMMIT"));
    let events = Events::default();

    db.start_transaction().await.unwrap();
    db.track_model(TrackType::Committed, events.push("committed"));
    db.track_model(TrackType::Aborted, events.push("aborted"));

    assert!(db.commit_transaction().await.is_err());
    assert_eq!(events.take(), ["aborted"]);
    assert!(!db.in_transaction());
}

#[tokio::test]
async fn with_transaction_commits_on_ok() {
    let mut db = adapter();
    let value = db
        .with_transaction(|db| {
            Box::pin(async move {
                db.execute("DELETE FROM sessions WHERE user_id = :id:", &params! { "id" => 4 })
                    .await?;
                Ok(42)
            })
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(
        db.client().log(),
        ["BEGIN", "DELETE FROM sessions WHERE user_id = 4", "COMMIT"]
    );
}

#[tokio::test]
async fn with_transaction_aborts_and_propagates_on_err() {
    let mut db = adapter();
    let events = Events::default();
    let tracked = events.clone();

    let err = db
        .with_transaction(|db| {
            Box::pin(async move {
                db.track_model(TrackType::Aborted, tracked.push("reverted"));
                Err::<(), _>(OrmError::not_found("missing"))
            })
        })
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(events.take(), ["reverted"]);
    assert_eq!(db.client().log(), ["BEGIN", "ROLLBACK"]);
}

#[tokio::test]
async fn with_transaction_reports_both_errors_when_abort_fails() {
    let mut db = Adapter::new(RecordingClient::failing_on("ROLLBACK"));
    let err = db
        .with_transaction(|_db| Box::pin(async move { Err::<(), _>(OrmError::Other("first".into())) }))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("first"));
    assert!(message.contains("abort failed"));
    assert!(!db.in_transaction());
}

async fn transfer(db: &mut Adapter<RecordingClient>, fail: bool) -> OrmResult<u64> {
    pgbind::transaction!(db, {
        let n = db
            .execute(
                "UPDATE accounts SET balance = balance - :amount: WHERE id = :id:",
                &params! { "amount" => 10, "id" => 1 },
            )
            .await?;
        if fail {
            return Err(OrmError::invalid_operation("insufficient funds"));
        }
        Ok(n)
    })
}

#[tokio::test]
async fn transaction_macro_commits_and_aborts() {
    let mut db = adapter();
    assert_eq!(transfer(&mut db, false).await.unwrap(), 1);
    assert_eq!(db.client().log().last().unwrap(), "COMMIT");

    assert!(transfer(&mut db, true).await.is_err());
    assert_eq!(db.client().log().last().unwrap(), "ROLLBACK");
    assert!(!db.in_transaction());
}

#[tokio::test]
async fn last_query_and_last_error() {
    let mut db = Adapter::new(RecordingClient::failing_on("SELECT"));

    db.execute("UPDATE t SET a = :a: WHERE b = :b:", &params! { "a" => 5 })
        .await
        .unwrap();
    assert_eq!(db.last_query(), "UPDATE t SET a = 5 WHERE b IS NULL");
    assert!(db.last_error().is_none());

    assert!(db.query("SELECT 1", &params! {}).await.is_err());
    assert_eq!(db.last_query(), "SELECT 1");
    assert!(db.last_error().unwrap().contains("refused"));
}

#[tokio::test]
async fn malformed_template_is_never_sent() {
    let mut db = adapter();
    let err = db
        .query("SELECT * FROM t WHERE a = 'open", &params! {})
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::MalformedQuery(_)));
    assert!(db.client().log().is_empty());
}

#[tokio::test]
async fn populate_query_does_not_execute() {
    let db = adapter();
    let sql = db
        .populate_query(
            "SELECT * FROM t WHERE a != :a: AND b IN :b:",
            &params! { "b" => vec![1, 2, 3] },
        )
        .unwrap();
    assert_eq!(sql, "SELECT * FROM t WHERE a IS NOT NULL AND b IN (1,2,3)");
    assert!(db.client().log().is_empty());
}
