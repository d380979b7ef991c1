use anyhow::Result;
use hromada::notifications::{self, NewNotification};
use hromada::{
    delete_user, list_users, load_user, update_user, AccessScope, NotificationPriority,
    NotificationType, UserAdminError, UserPatch, UserRole,
};

#[path = "util.rs"]
mod util;
use util::{memory_pool, seed_association, seed_report, seed_user};

#[tokio::test]
async fn delete_refuses_while_reports_exist() -> Result<()> {
    let pool = memory_pool().await?;
    seed_user(&pool, "res1", "RESIDENT", None).await?;
    seed_report(&pool, "r1", "res1", "open issue").await?;

    let err = delete_user(&pool, "res1", &AccessScope::global_admin())
        .await
        .expect_err("author with reports");
    assert!(matches!(err, UserAdminError::Conflict));
    assert!(load_user(&pool, "res1").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn delete_cascades_notifications_and_history_authorship() -> Result<()> {
    let pool = memory_pool().await?;
    seed_user(&pool, "author", "RESIDENT", None).await?;
    seed_user(&pool, "actor", "GLOBAL_ADMIN", None).await?;
    seed_report(&pool, "r1", "author", "open issue").await?;

    // A history line written by the actor, and a notification addressed
    // to them.
    sqlx::query(
        "INSERT INTO report_history (id, report_id, description, author_id, created_at) \
         VALUES ('h1', 'r1', 'note', 'actor', 1)",
    )
    .execute(&pool)
    .await?;
    notifications::create(
        &pool,
        NewNotification {
            user_id: "actor".into(),
            report_id: Some("r1".into()),
            title: "open issue".into(),
            message: "assigned to you".into(),
            kind: NotificationType::GeneralUpdate,
            priority: NotificationPriority::Low,
        },
    )
    .await?
    .expect("stored");

    delete_user(&pool, "actor", &AccessScope::global_admin()).await?;

    assert!(load_user(&pool, "actor").await?.is_none());
    let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM report_history WHERE author_id = 'actor'")
        .fetch_one(&pool)
        .await?;
    assert_eq!(history, 0);
    let inbox: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = 'actor'")
        .fetch_one(&pool)
        .await?;
    assert_eq!(inbox, 0);
    Ok(())
}

#[tokio::test]
async fn tenant_admin_cannot_touch_foreign_users() -> Result<()> {
    let pool = memory_pool().await?;
    seed_association(&pool, "t1", "North Block").await?;
    seed_association(&pool, "t2", "South Block").await?;
    seed_user(&pool, "res2", "RESIDENT", Some("t2")).await?;

    let scope = AccessScope::association_admin("t1");
    let err = update_user(&pool, "res2", UserPatch::default(), &scope)
        .await
        .expect_err("foreign tenant");
    assert!(matches!(err, UserAdminError::Forbidden));

    let err = delete_user(&pool, "res2", &scope)
        .await
        .expect_err("foreign tenant");
    assert!(matches!(err, UserAdminError::Forbidden));
    Ok(())
}

#[tokio::test]
async fn tenant_admin_cannot_rehome_users() -> Result<()> {
    let pool = memory_pool().await?;
    seed_association(&pool, "t1", "North Block").await?;
    seed_association(&pool, "t2", "South Block").await?;
    seed_user(&pool, "res1", "RESIDENT", Some("t1")).await?;

    let scope = AccessScope::association_admin("t1");
    let patch = UserPatch {
        association_id: Some(Some("t2".into())),
        ..Default::default()
    };
    let err = update_user(&pool, "res1", patch, &scope)
        .await
        .expect_err("re-homing is a global-admin move");
    assert!(matches!(err, UserAdminError::Forbidden));

    // Restating the current association is not a move.
    let patch = UserPatch {
        association_id: Some(Some("t1".into())),
        phone: Some("+380501112233".into()),
        ..Default::default()
    };
    let updated = update_user(&pool, "res1", patch, &scope).await?;
    assert_eq!(updated.phone.as_deref(), Some("+380501112233"));
    assert_eq!(updated.association_id.as_deref(), Some("t1"));
    Ok(())
}

#[tokio::test]
async fn global_admin_rehomes_and_detaches() -> Result<()> {
    let pool = memory_pool().await?;
    seed_association(&pool, "t1", "North Block").await?;
    seed_association(&pool, "t2", "South Block").await?;
    seed_user(&pool, "res1", "RESIDENT", Some("t1")).await?;

    let scope = AccessScope::global_admin();
    let patch = UserPatch {
        association_id: Some(Some("t2".into())),
        ..Default::default()
    };
    let updated = update_user(&pool, "res1", patch, &scope).await?;
    assert_eq!(updated.association_id.as_deref(), Some("t2"));

    let patch = UserPatch {
        association_id: Some(None),
        ..Default::default()
    };
    let updated = update_user(&pool, "res1", patch, &scope).await?;
    assert!(updated.association_id.is_none());
    Ok(())
}

#[tokio::test]
async fn role_changes_round_trip() -> Result<()> {
    let pool = memory_pool().await?;
    seed_association(&pool, "t1", "North Block").await?;
    seed_user(&pool, "res1", "RESIDENT", Some("t1")).await?;

    let patch = UserPatch {
        role: Some(UserRole::AssociationAdmin),
        ..Default::default()
    };
    let updated = update_user(&pool, "res1", patch, &AccessScope::global_admin()).await?;
    assert_eq!(updated.role, UserRole::AssociationAdmin);
    Ok(())
}

#[tokio::test]
async fn list_users_respects_scope() -> Result<()> {
    let pool = memory_pool().await?;
    seed_association(&pool, "t1", "North Block").await?;
    seed_association(&pool, "t2", "South Block").await?;
    seed_user(&pool, "res1", "RESIDENT", Some("t1")).await?;
    seed_user(&pool, "res2", "RESIDENT", Some("t2")).await?;
    seed_user(&pool, "free", "RESIDENT", None).await?;

    let all = list_users(&pool, &AccessScope::global_admin()).await?;
    assert_eq!(all.len(), 3);

    let north = list_users(&pool, &AccessScope::association_admin("t1")).await?;
    assert_eq!(north.len(), 1);
    assert_eq!(north[0].id, "res1");

    let closed = AccessScope {
        role: UserRole::AssociationAdmin,
        association_id: None,
    };
    assert!(list_users(&pool, &closed).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_of_missing_user_is_not_found() -> Result<()> {
    let pool = memory_pool().await?;
    let err = delete_user(&pool, "ghost", &AccessScope::global_admin())
        .await
        .expect_err("absent user");
    assert!(matches!(err, UserAdminError::NotFound));
    Ok(())
}
