//! In-memory member roster and ministry catalog

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::RwLock;

use crate::{
    client::{Gateway, GatewayError},
    member::{Member, MinistryId, Ministry},
    search,
    session::SessionContext,
};

/// Outcome of one section of a load cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLoad {
    /// Replaced with this many entries
    Loaded(usize),
    /// Request failed, previous contents kept
    Stale,
    /// No session to authenticate with
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub members: SectionLoad,
    pub ministries: SectionLoad,
}

/// Shared roster and catalog. Cloning shares the same state.
///
/// Each list is swapped wholesale on a successful fetch, so readers see
/// either the previous snapshot or the new one.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    inner: Arc<RosterInner>,
}

#[derive(Debug, Default)]
struct RosterInner {
    members: RwLock<Arc<Vec<Member>>>,
    ministries: RwLock<Arc<Vec<Ministry>>>,
    members_ready: AtomicBool,
    ministries_ready: AtomicBool,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch members and ministries. The two requests run concurrently and
    /// each list is applied as soon as its own response arrives.
    pub async fn load(&self, gateway: &dyn Gateway, session: &SessionContext) -> LoadReport {
        let Some(token) = session.token() else {
            tracing::warn!("Skipping roster load without a session");
            return LoadReport {
                members: SectionLoad::Skipped,
                ministries: SectionLoad::Skipped,
            };
        };

        let (ministries, members) = tokio::join!(
            self.fetch_ministries(gateway, token),
            self.fetch_members(gateway, token)
        );

        LoadReport {
            members,
            ministries,
        }
    }

    /// Retry just the ministry catalog
    pub async fn reload_ministries(
        &self,
        gateway: &dyn Gateway,
        session: &SessionContext,
    ) -> SectionLoad {
        match session.token() {
            Some(token) => self.fetch_ministries(gateway, token).await,
            None => SectionLoad::Skipped,
        }
    }

    async fn fetch_members(&self, gateway: &dyn Gateway, token: &str) -> SectionLoad {
        self.inner.members_ready.store(false, Ordering::Release);

        let outcome = match gateway.list_members(token).await {
            Ok(members) => {
                let count = members.len();
                *self.inner.members.write().await = Arc::new(members);
                tracing::debug!(count, "Roster refreshed");
                SectionLoad::Loaded(count)
            }
            Err(e) => {
                tracing::warn!(status = ?e.status(), "Failed to load members: {}", e);
                SectionLoad::Stale
            }
        };

        self.inner.members_ready.store(true, Ordering::Release);
        outcome
    }

    async fn fetch_ministries(&self, gateway: &dyn Gateway, token: &str) -> SectionLoad {
        self.inner.ministries_ready.store(false, Ordering::Release);

        let outcome = match gateway.list_ministries(token).await {
            Ok(ministries) => {
                let count = ministries.len();
                *self.inner.ministries.write().await = Arc::new(ministries);
                tracing::debug!(count, "Ministry catalog refreshed");
                SectionLoad::Loaded(count)
            }
            // Anything but a list of ministries means there are none to offer
            Err(GatewayError::Decode(e)) => {
                tracing::warn!("Ministry catalog was not a list: {}", e);
                *self.inner.ministries.write().await = Arc::new(Vec::new());
                SectionLoad::Loaded(0)
            }
            Err(e) => {
                tracing::warn!(status = ?e.status(), "Failed to load ministries: {}", e);
                SectionLoad::Stale
            }
        };

        self.inner.ministries_ready.store(true, Ordering::Release);
        outcome
    }

    pub fn members_ready(&self) -> bool {
        self.inner.members_ready.load(Ordering::Acquire)
    }

    pub fn ministries_ready(&self) -> bool {
        self.inner.ministries_ready.load(Ordering::Acquire)
    }

    pub async fn members(&self) -> Arc<Vec<Member>> {
        self.inner.members.read().await.clone()
    }

    pub async fn ministries(&self) -> Arc<Vec<Ministry>> {
        self.inner.ministries.read().await.clone()
    }

    pub async fn active_members(&self) -> Vec<Member> {
        self.members()
            .await
            .iter()
            .filter(|m| m.is_active())
            .cloned()
            .collect()
    }

    /// Members whose name contains `query`, ignoring case and accents
    pub async fn search(&self, query: &str) -> Vec<Member> {
        let members = self.members().await;
        search::filter_by_name(&members, query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn ministry_id(&self, name: &str) -> Option<MinistryId> {
        self.ministries()
            .await
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.id)
    }
}
