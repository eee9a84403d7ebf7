//! Who may use the admin surface.
//!
//! A [`RoleResolver`] asks each configured [`RoleSource`] in turn and grants
//! access as soon as one says yes. A source that fails is treated as a no.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::SiteResult;
use crate::remote::{DocumentStore, Identity, TEAM_MEMBERS_COLLECTION};

#[async_trait]
pub trait RoleSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn is_admin(&self, identity: &Identity) -> SiteResult<bool>;
}

/// Emails (case-insensitive) and uids taken from configuration.
pub struct StaticAllowList {
    emails: HashSet<String>,
    uids: HashSet<String>,
}

impl StaticAllowList {
    pub fn new<E, U>(emails: E, uids: U) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        U: IntoIterator,
        U::Item: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            uids: uids
                .into_iter()
                .map(|u| u.as_ref().trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.uids.is_empty()
    }
}

#[async_trait]
impl RoleSource for StaticAllowList {
    fn name(&self) -> &'static str {
        "allow-list"
    }

    async fn is_admin(&self, identity: &Identity) -> SiteResult<bool> {
        Ok(self.uids.contains(&identity.uid) || self.emails.contains(&identity.email.to_lowercase()))
    }
}

/// Membership is the existence of `teamMembers/{uid}` in the document store.
pub struct TeamMembersDirectory {
    docs: Arc<dyn DocumentStore>,
}

impl TeamMembersDirectory {
    pub fn new(docs: Arc<dyn DocumentStore>) -> Self {
        Self { docs }
    }
}

#[async_trait]
impl RoleSource for TeamMembersDirectory {
    fn name(&self) -> &'static str {
        "team-members"
    }

    async fn is_admin(&self, identity: &Identity) -> SiteResult<bool> {
        let doc = self
            .docs
            .get_document(TEAM_MEMBERS_COLLECTION, &identity.uid, Some(&identity.credentials))
            .await?;
        Ok(doc.is_some())
    }
}

pub struct RoleResolver {
    sources: Vec<Box<dyn RoleSource>>,
}

impl RoleResolver {
    pub fn new(sources: Vec<Box<dyn RoleSource>>) -> Self {
        Self { sources }
    }

    /// The usual pair: configured allow-list, then the team directory.
    pub fn standard(allow_list: StaticAllowList, docs: Arc<dyn DocumentStore>) -> Self {
        Self::new(vec![
            Box::new(allow_list),
            Box::new(TeamMembersDirectory::new(docs)),
        ])
    }

    pub async fn can_administer(&self, identity: &Identity) -> bool {
        for source in &self.sources {
            match source.is_admin(identity).await {
                Ok(true) => {
                    debug!(uid = %identity.uid, source = source.name(), "admin granted");
                    return true;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(uid = %identity.uid, source = source.name(), error = %e, "role check failed");
                }
            }
        }
        false
    }
}
