//! Plan limits
//!
//! The quota/entitlement check consulted when a save is promoted to the
//! `shared` strategy. Admission control never consults this; quota applies
//! only at the policy toggle.

use libsql::Connection;

use crate::db::{LibSqlSaveRepository, LibSqlUserRepository};
use crate::error::Result;
use crate::models::{SaveId, UserId};

/// Shared saves allowed on the free tier
pub const FREE_MAX_SHARED_SAVES: u64 = 3;

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub count: Option<u64>,
}

impl PlanDecision {
    const fn allow(count: Option<u64>) -> Self {
        Self {
            allowed: true,
            reason: None,
            count,
        }
    }
}

/// Whether `user_id` may have one more shared save.
///
/// `exclude` is the save currently being promoted, so re-promoting an
/// already-shared save never counts against the user.
pub async fn can_enable_shared_save(
    conn: &Connection,
    user_id: &UserId,
    exclude: Option<&SaveId>,
) -> Result<PlanDecision> {
    let tier = LibSqlUserRepository::new(conn)
        .subscription_tier(user_id)
        .await?;
    if tier.is_paid() {
        return Ok(PlanDecision::allow(None));
    }

    let count = LibSqlSaveRepository::new(conn)
        .count_shared(user_id, exclude)
        .await?;
    if count >= FREE_MAX_SHARED_SAVES {
        return Ok(PlanDecision {
            allowed: false,
            reason: Some(format!(
                "Free plan allows up to {FREE_MAX_SHARED_SAVES} shared saves. \
                 Upgrade to sync more games across devices."
            )),
            count: Some(count),
        });
    }

    Ok(PlanDecision::allow(Some(count)))
}
