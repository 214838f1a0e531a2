//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A logged-in browser, referenced by the `sessionid` cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Random token stored in the cookie
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Start a new session for `user_id` lasting `days`.
    pub fn new(user_id: i64, days: i64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            user_id,
            expires_at: now + Duration::days(days),
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Remaining lifetime in whole seconds, for the cookie `Max-Age`
    pub fn max_age(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}
