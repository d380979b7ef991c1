#![allow(dead_code)]

use anyhow::Result;
use hromada::{migrate, AddressResolver, GeoPoint, IdentityVerifier, VerifiedIdentity};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::sync::atomic::{AtomicUsize, Ordering};

pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;").execute(&pool).await?;
    migrate::apply_migrations(&pool).await?;
    Ok(pool)
}

pub async fn seed_association(pool: &SqlitePool, id: &str, name: &str) -> Result<()> {
    sqlx::query("INSERT INTO associations (id, name, created_at, updated_at) VALUES (?, ?, 1, 1)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn seed_user(
    pool: &SqlitePool,
    id: &str,
    role: &str,
    association_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO users (id, email, role, association_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 1, 1)",
    )
    .bind(id)
    .bind(format!("{id}@example.test"))
    .bind(role)
    .bind(association_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn seed_report(pool: &SqlitePool, id: &str, author_id: &str, title: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO reports \
         (id, title, description, status, priority, latitude, longitude, author_id, \
          association_id, created_at, updated_at) \
         VALUES (?, ?, 'seeded report', 'NEW', 'NORMAL', 50.45, 30.52, ?, \
                 (SELECT association_id FROM users WHERE id = ?), 1, 1)",
    )
    .bind(id)
    .bind(title)
    .bind(author_id)
    .bind(author_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Resolver that answers every address with a fixed point and counts how
/// often it was consulted.
pub struct FixedResolver {
    pub point: GeoPoint,
    pub calls: AtomicUsize,
}

impl FixedResolver {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        FixedResolver {
            point: GeoPoint {
                latitude,
                longitude,
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AddressResolver for FixedResolver {
    fn resolve(&self, _address: &str) -> Result<Option<GeoPoint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(self.point))
    }
}

/// Accepts credentials of the form `token-<user_id>`.
pub struct TokenVerifier;

impl IdentityVerifier for TokenVerifier {
    fn verify(&self, credential: &str) -> Option<VerifiedIdentity> {
        credential
            .strip_prefix("token-")
            .map(|user_id| VerifiedIdentity {
                user_id: user_id.to_string(),
            })
    }
}
