use std::time::Duration;

use sqlx::FromRow;
use stowage_core::{Classify, Context, ErrorKind, Interrupted};
use stowage_data::{
    build_page, decode_token, Column, ColumnType, Condition, Criteria, DataError, Direction,
    Entity, Order, Repository, TableSchema, Value,
};
use stowage_data_sqlx::{DatabaseConfig, Driver, SqlxRepository};

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
struct User {
    id: i64,
    name: String,
    email: Option<String>,
}

impl Entity for User {
    fn table_name() -> &'static str {
        "users"
    }

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("id", ColumnType::BigInt).primary_key(),
            Column::new("name", ColumnType::Text),
            Column::new("email", ColumnType::Text).nullable().unique(),
        ];
        COLUMNS
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.name.clone().into(), self.email.clone().into()]
    }
}

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
struct Membership {
    user_id: i64,
    team: String,
    role: String,
}

impl Entity for Membership {
    fn table_name() -> &'static str {
        "memberships"
    }

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[
            Column::new("user_id", ColumnType::BigInt).primary_key(),
            Column::new("team", ColumnType::Text).primary_key(),
            Column::new("role", ColumnType::Text),
        ];
        COLUMNS
    }

    fn values(&self) -> Vec<Value> {
        vec![self.user_id.into(), self.team.clone().into(), self.role.clone().into()]
    }
}

/// A table without a primary key.
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
struct Tag {
    label: String,
}

impl Entity for Tag {
    fn table_name() -> &'static str {
        "tags"
    }

    fn columns() -> &'static [Column] {
        const COLUMNS: &[Column] = &[Column::new("label", ColumnType::Text)];
        COLUMNS
    }

    fn values(&self) -> Vec<Value> {
        vec![self.label.clone().into()]
    }
}

fn user(id: i64, name: &str) -> User {
    User {
        id,
        name: name.to_string(),
        email: None,
    }
}

async fn repo() -> SqlxRepository {
    let config = DatabaseConfig::new(Driver::Sqlite, ":memory:").pool_max(1);
    let repo = SqlxRepository::connect(&config).await.unwrap();
    repo.migrate(
        &Context::background(),
        &[User::schema(), Membership::schema(), Tag::schema()],
    )
    .await
    .unwrap();
    repo
}

async fn names(repo: &SqlxRepository) -> Vec<String> {
    let ctx = Context::background();
    repo.list::<User>(&ctx, &[Criteria::order_by("id", Order::Asc)])
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.name)
        .collect()
}

#[tokio::test]
async fn test_migrate_is_idempotent() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.create(&ctx, &[user(1, "a")], false).await.unwrap();

    repo.migrate(&ctx, &[User::schema(), Membership::schema()])
        .await
        .unwrap();

    assert_eq!(names(&repo).await, vec!["a"]);
}

#[tokio::test]
async fn test_migrate_reports_failing_table() {
    let ctx = Context::background();
    let repo = repo().await;
    const BAD: TableSchema = TableSchema {
        table: "bad table",
        columns: &[Column::new("id", ColumnType::BigInt)],
    };

    let err = repo.migrate(&ctx, &[BAD]).await.unwrap_err();
    assert!(matches!(err, DataError::Migration { ref table, .. } if table == "bad table"));
}

#[tokio::test]
async fn test_create_and_find_by_pk() {
    let ctx = Context::background();
    let repo = repo().await;
    let alice = User {
        id: 1,
        name: "alice".into(),
        email: Some("alice@example.com".into()),
    };
    repo.create(&ctx, &[alice.clone(), user(2, "bob")], false)
        .await
        .unwrap();

    let mut found = User {
        id: 1,
        ..User::default()
    };
    repo.find_by_pk(&ctx, &mut found).await.unwrap();
    assert_eq!(found, alice);

    let mut missing = User {
        id: 42,
        ..User::default()
    };
    let err = repo.find_by_pk(&ctx, &mut missing).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_duplicate_insert() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.create(&ctx, &[user(1, "a")], false).await.unwrap();

    let err = repo.create(&ctx, &[user(1, "again")], false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    repo.create(&ctx, &[user(1, "again"), user(2, "b")], true)
        .await
        .unwrap();
    assert_eq!(names(&repo).await, vec!["a", "b"]);
}

#[tokio::test]
async fn test_upsert_replaces_row() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.upsert(&ctx, &[user(1, "a")]).await.unwrap();
    repo.upsert(&ctx, &[user(1, "b")]).await.unwrap();

    let mut found = user(1, "");
    repo.find_by_pk(&ctx, &mut found).await.unwrap();
    assert_eq!(found.name, "b");
    assert_eq!(names(&repo).await, vec!["b"]);
}

#[tokio::test]
async fn test_upsert_composite_key() {
    let ctx = Context::background();
    let repo = repo().await;
    let member = |team: &str, role: &str| Membership {
        user_id: 1,
        team: team.into(),
        role: role.into(),
    };
    repo.upsert(&ctx, &[member("core", "dev"), member("ops", "dev")])
        .await
        .unwrap();
    repo.upsert(&ctx, &[member("core", "lead")]).await.unwrap();

    let rows: Vec<Membership> = repo
        .list(&ctx, &[Criteria::order_by("team", Order::Asc)])
        .await
        .unwrap();
    assert_eq!(rows, vec![member("core", "lead"), member("ops", "dev")]);

    let deleted = repo.delete_by_pk(&ctx, &[member("ops", "")]).await.unwrap();
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn test_find_where_and_columns() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.create(
        &ctx,
        &[user(1, "anna"), user(2, "abel"), user(3, "zoe")],
        false,
    )
    .await
    .unwrap();

    let mut found = User::default();
    repo.find_where(
        &ctx,
        &mut found,
        &[
            Criteria::filter(Condition::like("name", "a%")),
            Criteria::order_by("name", Order::Asc),
        ],
    )
    .await
    .unwrap();
    assert_eq!(found.name, "abel");

    let mut by_name = User::default();
    repo.find_by_column(&ctx, &mut by_name, "name", "zoe".into())
        .await
        .unwrap();
    assert_eq!(by_name.id, 3);

    let listed: Vec<User> = repo.list_by_column(&ctx, "email", Value::from(None::<String>)).await.unwrap();
    assert_eq!(listed.len(), 3);

    let err = repo
        .find_where(
            &ctx,
            &mut found,
            &[Criteria::filter(Condition::eq("name", "nobody"))],
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_list_criteria() {
    let ctx = Context::background();
    let repo = repo().await;
    let users: Vec<User> = (1..=6).map(|i| user(i, &format!("u{i}"))).collect();
    repo.create(&ctx, &users, false).await.unwrap();

    let page: Vec<User> = repo
        .list(
            &ctx,
            &[
                Criteria::filter(Condition::gt("id", 1)),
                Criteria::filter(Condition::lte("id", 5)),
                Criteria::order_by("id", Order::Desc),
                Criteria::limit(2),
                Criteria::offset(1),
            ],
        )
        .await
        .unwrap();
    assert_eq!(page.iter().map(|u| u.id).collect::<Vec<_>>(), vec![4, 3]);

    let none: Vec<User> = repo
        .list(&ctx, &[Criteria::filter(Condition::is_in("id", Vec::<i64>::new()))])
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_keyset_pagination() {
    let ctx = Context::background();
    let repo = repo().await;
    let users: Vec<User> = (1..=5).map(|i| user(i, &format!("u{i}"))).collect();
    repo.create(&ctx, &users, false).await.unwrap();
    let limit = 2;

    let fetch = |after: i64| {
        let repo = repo.clone();
        let ctx = ctx.clone();
        async move {
            repo.list::<User>(
                &ctx,
                &[
                    Criteria::filter(Condition::gt("id", after)),
                    Criteria::order_by("id", Order::Asc),
                    Criteria::limit(limit as u64 + 1),
                ],
            )
            .await
            .unwrap()
        }
    };

    let (cursor, first) = build_page(fetch(0).await, true, limit, |u| u.id);
    assert_eq!(first.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2]);
    let token = cursor.next_token().unwrap();

    let (direction, after) = decode_token(&token).unwrap();
    assert_eq!(direction, Direction::Next);
    let (cursor, second) = build_page(fetch(after.parse().unwrap()).await, false, limit, |u| u.id);
    assert_eq!(second.iter().map(|u| u.id).collect::<Vec<_>>(), vec![3, 4]);
    assert!(cursor.has_prev_page);
    assert!(cursor.has_next_page);
}

#[tokio::test]
async fn test_update() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.create(&ctx, &[user(1, "a")], false).await.unwrap();

    let mut renamed = user(1, "renamed");
    renamed.email = Some("r@example.com".into());
    repo.update(&ctx, &renamed).await.unwrap();

    let mut found = user(1, "");
    repo.find_by_pk(&ctx, &mut found).await.unwrap();
    assert_eq!(found, renamed);

    let err = repo.update(&ctx, &user(99, "ghost")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_update_bulk_is_all_or_nothing() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.create(&ctx, &[user(1, "a"), user(2, "b")], false)
        .await
        .unwrap();

    repo.update_bulk(&ctx, &[user(1, "a2"), user(2, "b2")])
        .await
        .unwrap();
    assert_eq!(names(&repo).await, vec!["a2", "b2"]);

    let err = repo
        .update_bulk(&ctx, &[user(1, "a3"), user(99, "ghost")])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(names(&repo).await, vec!["a2", "b2"]);
}

#[tokio::test]
async fn test_update_bulk_inside_transaction_is_all_or_nothing() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.create(&ctx, &[user(1, "a"), user(2, "b")], false)
        .await
        .unwrap();

    let tx = repo.begin(&ctx).await.unwrap();
    let tx_repo = repo.with_tx(&tx);
    let err = tx_repo
        .update_bulk(&ctx, &[user(1, "a2"), user(99, "ghost")])
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(names(&tx_repo).await, vec!["a", "b"]);

    tx_repo
        .update_bulk(&ctx, &[user(1, "a3"), user(2, "b3")])
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(names(&repo).await, vec!["a3", "b3"]);
}

#[tokio::test]
async fn test_update_bulk_composite_key() {
    let ctx = Context::background();
    let repo = repo().await;
    let member = |team: &str, role: &str| Membership {
        user_id: 7,
        team: team.into(),
        role: role.into(),
    };
    repo.create(&ctx, &[member("core", "dev"), member("ops", "dev")], false)
        .await
        .unwrap();

    repo.update_bulk(&ctx, &[member("core", "lead"), member("ops", "oncall")])
        .await
        .unwrap();
    let rows: Vec<Membership> = repo
        .list(&ctx, &[Criteria::order_by("team", Order::Asc)])
        .await
        .unwrap();
    assert_eq!(rows, vec![member("core", "lead"), member("ops", "oncall")]);
}

#[tokio::test]
async fn test_delete_by_pk_ignores_absent_keys() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.create(&ctx, &[user(1, "a"), user(2, "b"), user(3, "c")], false)
        .await
        .unwrap();

    let deleted = repo
        .delete_by_pk(&ctx, &[user(1, ""), user(3, ""), user(77, "")])
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(names(&repo).await, vec!["b"]);
    assert_eq!(repo.delete_by_pk::<User>(&ctx, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_where_requires_conditions() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.create(&ctx, &[user(1, "a"), user(2, "b"), user(3, "c")], false)
        .await
        .unwrap();

    let err = repo.delete_where::<User>(&ctx, &[]).await.unwrap_err();
    assert!(matches!(err, DataError::UnguardedDelete(_)));
    assert_eq!(names(&repo).await.len(), 3);

    let deleted = repo
        .delete_where::<User>(&ctx, &[Condition::gte("id", 2)])
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    assert_eq!(repo.delete_all::<User>(&ctx).await.unwrap(), 1);
    assert!(names(&repo).await.is_empty());
}

#[tokio::test]
async fn test_missing_primary_key_fails() {
    let ctx = Context::background();
    let repo = repo().await;
    let tag = Tag {
        label: "rust".into(),
    };
    repo.create(&ctx, &[tag.clone()], false).await.unwrap();

    let err = repo.upsert(&ctx, &[tag.clone()]).await.unwrap_err();
    assert!(matches!(err, DataError::MissingPrimaryKey(_)));
    let err = repo.update(&ctx, &tag).await.unwrap_err();
    assert!(matches!(err, DataError::MissingPrimaryKey(_)));
    let mut lookup = tag.clone();
    let err = repo.find_by_pk(&ctx, &mut lookup).await.unwrap_err();
    assert!(matches!(err, DataError::MissingPrimaryKey(_)));
    let err = repo.delete_by_pk(&ctx, &[tag]).await.unwrap_err();
    assert!(matches!(err, DataError::MissingPrimaryKey(_)));
}

#[tokio::test]
async fn test_zero_primary_key_is_rejected() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.create(&ctx, &[user(0, "zero")], false).await.unwrap();

    let mut lookup = user(0, "");
    let err = repo.find_by_pk(&ctx, &mut lookup).await.unwrap_err();
    assert!(matches!(err, DataError::MissingPrimaryKey(_)));
    assert_eq!(lookup.name, "");

    let err = repo.update(&ctx, &user(0, "changed")).await.unwrap_err();
    assert!(matches!(err, DataError::MissingPrimaryKey(_)));
    let err = repo.update_bulk(&ctx, &[user(0, "changed")]).await.unwrap_err();
    assert!(matches!(err, DataError::MissingPrimaryKey(_)));
    let err = repo.delete_by_pk(&ctx, &[user(0, "")]).await.unwrap_err();
    assert!(matches!(err, DataError::MissingPrimaryKey(_)));
    assert_eq!(names(&repo).await, vec!["zero"]);

    let blank_team = Membership {
        user_id: 1,
        team: String::new(),
        role: "dev".into(),
    };
    let err = repo.delete_by_pk(&ctx, &[blank_team]).await.unwrap_err();
    assert!(matches!(err, DataError::MissingPrimaryKey(_)));
}

#[tokio::test]
async fn test_transactional_commits() {
    let ctx = Context::background();
    let repo = repo().await;

    let created = repo
        .transactional(&ctx, |ctx, tx_repo| async move {
            tx_repo.create(&ctx, &[user(1, "a"), user(2, "b")], false).await?;
            tx_repo.update(&ctx, &user(2, "b2")).await?;
            Ok::<_, DataError>(2)
        })
        .await
        .unwrap();

    assert_eq!(created, 2);
    assert_eq!(names(&repo).await, vec!["a", "b2"]);
}

#[tokio::test]
async fn test_transactional_rolls_back_on_error() {
    let ctx = Context::background();
    let repo = repo().await;

    let err = repo
        .transactional(&ctx, |ctx, tx_repo| async move {
            tx_repo.create(&ctx, &[user(1, "a")], false).await?;
            tx_repo.update(&ctx, &user(99, "ghost")).await?;
            Ok::<_, DataError>(())
        })
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(names(&repo).await.is_empty());
}

#[derive(Debug)]
enum AppError {
    Data(DataError),
    Rejected(&'static str),
}

impl From<DataError> for AppError {
    fn from(err: DataError) -> Self {
        AppError::Data(err)
    }
}

#[tokio::test]
async fn test_transactional_returns_callback_error_type() {
    let ctx = Context::background();
    let repo = repo().await;

    let err = repo
        .transactional(&ctx, |ctx, tx_repo| async move {
            tx_repo.create(&ctx, &[user(1, "a")], false).await?;
            Err::<(), _>(AppError::Rejected("quota exceeded"))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Rejected("quota exceeded")));
    assert!(names(&repo).await.is_empty());
}

#[tokio::test]
#[allow(unreachable_code)]
async fn test_transactional_rolls_back_on_panic() {
    let ctx = Context::background();
    let repo = repo().await;

    let task = {
        let repo = repo.clone();
        tokio::spawn(async move {
            repo.transactional(&ctx, |ctx, tx_repo| async move {
                tx_repo.create(&ctx, &[user(1, "a")], false).await?;
                panic!("callback failed");
                Ok::<(), DataError>(())
            })
            .await
        })
    };

    let joined = task.await;
    assert!(joined.unwrap_err().is_panic());
    assert!(names(&repo).await.is_empty());
}

#[tokio::test]
async fn test_nested_transactional_is_rejected() {
    let ctx = Context::background();
    let repo = repo().await;

    repo.transactional(&ctx, |ctx, tx_repo| async move {
        let nested = tx_repo
            .transactional(&ctx, |_, _| async { Ok::<(), DataError>(()) })
            .await;
        assert!(matches!(nested, Err(DataError::NestedTransaction)));
        tx_repo.create(&ctx, &[user(1, "a")], false).await?;
        Ok::<_, DataError>(())
    })
    .await
    .unwrap();

    assert_eq!(names(&repo).await, vec!["a"]);
}

#[tokio::test]
async fn test_manual_transaction() {
    let ctx = Context::background();
    let repo = repo().await;

    let tx = repo.begin(&ctx).await.unwrap();
    let tx_repo = repo.with_tx(&tx);
    assert!(tx_repo.tx().is_some());
    assert!(repo.tx().is_none());
    tx_repo.create(&ctx, &[user(1, "a")], false).await.unwrap();
    tx.rollback().await.unwrap();
    assert!(!tx.is_active().await);
    assert!(names(&repo).await.is_empty());

    let tx = repo.begin(&ctx).await.unwrap();
    let tx_repo = repo.with_tx(&tx);
    tx_repo.create(&ctx, &[user(2, "b")], false).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(names(&repo).await, vec!["b"]);

    let err = tx_repo.create(&ctx, &[user(3, "c")], false).await.unwrap_err();
    assert!(matches!(err, DataError::TransactionClosed));
    assert!(matches!(tx.commit().await, Err(DataError::TransactionClosed)));
}

#[tokio::test]
async fn test_cancelled_context() {
    let repo = repo().await;
    let ctx = Context::background();
    ctx.cancel();

    let err = repo.list::<User>(&ctx, &[]).await.unwrap_err();
    assert!(matches!(err, DataError::Interrupted(Interrupted::Cancelled)));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn test_elapsed_deadline() {
    let repo = repo().await;
    let ctx = Context::background().with_timeout(Duration::from_millis(1));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = repo.create(&ctx, &[user(1, "a")], false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    assert!(names(&repo).await.is_empty());
}

#[tokio::test]
async fn test_ping_and_close() {
    let ctx = Context::background();
    let repo = repo().await;
    repo.ping(&ctx).await.unwrap();

    repo.close().await;
    let err = repo.ping(&ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}
