//! User repository implementation

use libsql::Connection;

use crate::error::{Error, Result};
use crate::models::{SubscriptionTier, User, UserId};

/// libSQL implementation of user storage
pub struct LibSqlUserRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlUserRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a new user
    pub async fn create(&self, user: &User) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (id, email, subscription_tier, created_at) VALUES (?, ?, ?, ?)",
                libsql::params![
                    user.id.as_str(),
                    user.email.clone(),
                    user.subscription_tier.as_str(),
                    user.created_at
                ],
            )
            .await?;
        Ok(())
    }

    /// Fetch a user by id
    pub async fn get(&self, id: &UserId) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, email, subscription_tier, created_at FROM users WHERE id = ?",
                libsql::params![id.as_str()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(parse_user(&row)?))
    }

    /// Subscription tier for a user; `Free` when the user row is missing
    pub async fn subscription_tier(&self, id: &UserId) -> Result<SubscriptionTier> {
        Ok(self
            .get(id)
            .await?
            .map_or(SubscriptionTier::Free, |user| user.subscription_tier))
    }
}

fn parse_user(row: &libsql::Row) -> Result<User> {
    let id: String = row.get(0)?;
    let tier: String = row.get(2)?;
    Ok(User {
        id: id
            .parse()
            .map_err(|_| Error::Database("Invalid user ID".into()))?,
        email: row.get(1)?,
        subscription_tier: tier.parse().map_err(Error::Database)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlUserRepository::new(db.connection());

        let user = User::new("player@example.com");
        repo.create(&user).await.unwrap();

        let fetched = repo.get(&user.id).await.unwrap().unwrap();
        assert_eq!(fetched, user);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_user_defaults_to_free_tier() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlUserRepository::new(db.connection());

        let tier = repo.subscription_tier(&UserId::new()).await.unwrap();
        assert_eq!(tier, SubscriptionTier::Free);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_email_rejected() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlUserRepository::new(db.connection());

        repo.create(&User::new("player@example.com")).await.unwrap();
        let duplicate = User::new("player@example.com");
        assert!(repo.create(&duplicate).await.is_err());
    }
}
