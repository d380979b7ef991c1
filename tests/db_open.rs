use anyhow::Result;
use hromada::db::open_sqlite_pool;
use hromada::migrate;
use tempfile::tempdir;

#[tokio::test]
async fn opens_with_wal_and_survives_reopen() -> Result<()> {
    let tmp = tempdir()?;
    let db_path = tmp.path().join("data").join("hromada.sqlite3");

    {
        let pool = open_sqlite_pool(&db_path).await?;
        let journal: (String,) = sqlx::query_as("PRAGMA journal_mode;")
            .fetch_one(&pool)
            .await?;
        assert!(journal.0.eq_ignore_ascii_case("wal"));

        migrate::apply_migrations(&pool).await?;
        sqlx::query(
            "INSERT INTO associations (id, name, created_at, updated_at) VALUES ('t1', 'North Block', 1, 1)",
        )
        .execute(&pool)
        .await?;
        pool.close().await;
    }

    let pool = open_sqlite_pool(&db_path).await?;
    migrate::apply_migrations(&pool).await?;
    let name: String = sqlx::query_scalar("SELECT name FROM associations WHERE id = 't1'")
        .fetch_one(&pool)
        .await?;
    assert_eq!(name, "North Block");
    Ok(())
}

#[tokio::test]
async fn foreign_keys_are_enforced() -> Result<()> {
    let tmp = tempdir()?;
    let pool = open_sqlite_pool(&tmp.path().join("fk.sqlite3")).await?;
    migrate::apply_migrations(&pool).await?;

    let result = sqlx::query(
        "INSERT INTO reports \
         (id, title, description, status, priority, latitude, longitude, author_id, created_at, updated_at) \
         VALUES ('r1', 't', 'd', 'NEW', 'NORMAL', 0, 0, 'missing-user', 1, 1)",
    )
    .execute(&pool)
    .await;
    assert!(result.is_err(), "dangling author must be rejected");
    Ok(())
}
