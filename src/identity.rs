//! Sender to team-member resolution for access control.

use std::collections::HashMap;

use crate::Result;

/// Maps transport sender IDs to internal member IDs.
pub trait MemberResolver: Send + Sync {
    /// Resolve `sender_id`; an empty member ID means no restriction applies.
    ///
    /// # Errors
    ///
    /// Implementations backed by external directories may return
    /// [`AppError::Store`](crate::AppError::Store) or
    /// [`AppError::Unauthorized`](crate::AppError::Unauthorized).
    fn resolve_identity(&self, sender_id: &str) -> Result<String>;
}

/// Resolver backed by the `[members]` config table.
#[derive(Debug, Clone, Default)]
pub struct StaticMemberResolver {
    members: HashMap<String, String>,
}

impl StaticMemberResolver {
    /// Build from a sender → member map.
    #[must_use]
    pub fn new(members: HashMap<String, String>) -> Self {
        Self { members }
    }
}

impl MemberResolver for StaticMemberResolver {
    fn resolve_identity(&self, sender_id: &str) -> Result<String> {
        Ok(self.members.get(sender_id).cloned().unwrap_or_default())
    }
}
