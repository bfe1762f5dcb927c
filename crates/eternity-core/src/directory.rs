//! Cached view of the guild directory: roles and eligible members.
//!
//! Each resource lives in its own immutable snapshot behind a swappable
//! `Arc`. Refreshes build a complete replacement off to the side and publish
//! it with a single pointer swap, so readers always see one whole snapshot.

use crate::error::{CoreError, UpstreamError};
use crate::schedule::Scheduler;
use eternity_models::{Member, RawMember, Role};
use eternity_util::nickname::parse_level_nickname;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Job roles a member must hold one of to appear in the directory.
pub const DEFAULT_JOB_ROLES: [&str; 10] = [
    "다크나이트",
    "히어로",
    "팔라딘",
    "보우마스터",
    "신궁",
    "아크메이지(썬,콜)",
    "아크메이지(불,독)",
    "비숍",
    "나이트로드",
    "섀도어",
];

pub fn default_job_roles() -> Vec<String> {
    DEFAULT_JOB_ROLES.iter().map(|r| r.to_string()).collect()
}

/// Where guild roles and members come from (normally the chat platform's REST API).
pub trait DirectorySource: Send + Sync + 'static {
    fn fetch_roles(
        &self,
        guild_id: i64,
    ) -> impl Future<Output = Result<Vec<Role>, UpstreamError>> + Send;

    fn fetch_members(
        &self,
        guild_id: i64,
    ) -> impl Future<Output = Result<Vec<RawMember>, UpstreamError>> + Send;
}

#[derive(Debug, Default)]
pub struct RoleSnapshot {
    roles: Vec<Role>,
    by_name: HashMap<String, i64>,
    by_id: HashMap<i64, String>,
}

impl RoleSnapshot {
    pub fn new(roles: Vec<Role>) -> Self {
        let mut by_name = HashMap::with_capacity(roles.len());
        let mut by_id = HashMap::with_capacity(roles.len());
        for role in &roles {
            by_name.insert(role.name.clone(), role.id);
            by_id.insert(role.id, role.name.clone());
        }
        Self {
            roles,
            by_name,
            by_id,
        }
    }

    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MemberSnapshot {
    by_id: BTreeMap<i64, Member>,
    by_nickname: HashMap<String, i64>,
}

impl MemberSnapshot {
    /// Keep only eligible members: holding a job role and carrying a parseable level.
    pub fn build(raw_members: Vec<RawMember>, roles: &RoleSnapshot, job_roles: &[String]) -> Self {
        let job_role_ids: Vec<(&str, i64)> = job_roles
            .iter()
            .filter_map(|name| roles.id_of(name).map(|id| (name.as_str(), id)))
            .collect();

        let mut by_id = BTreeMap::new();
        for raw in raw_members {
            let Some(job_role) = job_role_ids
                .iter()
                .find(|(_, id)| raw.role_ids.contains(id))
                .map(|(name, _)| name.to_string())
            else {
                continue;
            };
            let (level, display_name) = parse_level_nickname(&raw.raw_nickname);
            if level == 0 {
                continue;
            }
            by_id.insert(
                raw.id,
                Member {
                    id: raw.id,
                    raw_nickname: raw.raw_nickname,
                    role_ids: raw.role_ids.into_iter().collect(),
                    is_bot: raw.is_bot,
                    level,
                    display_name,
                    job_role,
                },
            );
        }

        let mut by_nickname = HashMap::with_capacity(by_id.len());
        for member in by_id.values() {
            if by_nickname
                .insert(member.display_name.clone(), member.id)
                .is_some()
            {
                tracing::debug!(
                    "directory: nickname '{}' is shared, keeping member {}",
                    member.display_name,
                    member.id
                );
            }
        }

        Self { by_id, by_nickname }
    }

    pub fn get(&self, id: i64) -> Option<&Member> {
        self.by_id.get(&id)
    }

    pub fn by_nickname(&self, nickname: &str) -> Option<&Member> {
        self.by_nickname
            .get(nickname)
            .and_then(|id| self.by_id.get(id))
    }

    /// Members in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

pub struct DirectoryCache<S> {
    source: S,
    guild_id: i64,
    job_roles: Vec<String>,
    roles: RwLock<Arc<RoleSnapshot>>,
    members: RwLock<Arc<MemberSnapshot>>,
}

impl<S: DirectorySource> DirectoryCache<S> {
    pub fn new(source: S, guild_id: i64, job_roles: Vec<String>) -> Self {
        Self {
            source,
            guild_id,
            job_roles,
            roles: RwLock::new(Arc::new(RoleSnapshot::default())),
            members: RwLock::new(Arc::new(MemberSnapshot::default())),
        }
    }

    pub fn job_roles(&self) -> &[String] {
        &self.job_roles
    }

    pub fn roles(&self) -> Arc<RoleSnapshot> {
        match self.roles.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn members(&self) -> Arc<MemberSnapshot> {
        match self.members.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn publish_roles(&self, snapshot: RoleSnapshot) {
        let mut guard = match self.roles.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(snapshot);
    }

    fn publish_members(&self, snapshot: MemberSnapshot) {
        let mut guard = match self.members.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(snapshot);
    }

    /// Replace the role snapshot. On failure the previous snapshot stays published.
    pub async fn refresh_roles(&self) -> Result<usize, CoreError> {
        let roles = match self.source.fetch_roles(self.guild_id).await {
            Ok(roles) => roles,
            Err(err) => {
                tracing::warn!("directory: role refresh failed, keeping previous snapshot: {}", err);
                return Err(err.into());
            }
        };
        let snapshot = RoleSnapshot::new(roles);
        let count = snapshot.len();
        self.publish_roles(snapshot);
        tracing::debug!("directory: published {} roles", count);
        Ok(count)
    }

    /// Replace the member snapshot, resolving job roles against the current role snapshot.
    pub async fn refresh_members(&self) -> Result<usize, CoreError> {
        let raw = match self.source.fetch_members(self.guild_id).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(
                    "directory: member refresh failed, keeping previous snapshot: {}",
                    err
                );
                return Err(err.into());
            }
        };
        let fetched = raw.len();
        let roles = self.roles();
        let snapshot = MemberSnapshot::build(raw, &roles, &self.job_roles);
        let count = snapshot.len();
        self.publish_members(snapshot);
        tracing::debug!(
            "directory: published {} eligible members (of {} fetched)",
            count,
            fetched
        );
        Ok(count)
    }

    /// Roles first, then members, so eligibility sees fresh role ids.
    pub async fn refresh_all(&self) -> Result<(), CoreError> {
        let roles = self.refresh_roles().await;
        let members = self.refresh_members().await;
        roles?;
        members?;
        Ok(())
    }

    pub fn lookup_role_id(&self, name: &str) -> Option<i64> {
        self.roles().id_of(name)
    }

    pub fn lookup_role_name(&self, id: i64) -> Option<String> {
        self.roles().name_of(id).map(str::to_string)
    }

    pub fn list_roles(&self) -> Vec<Role> {
        self.roles().roles().to_vec()
    }

    pub fn lookup_member(&self, id: i64) -> Option<Member> {
        self.members().get(id).cloned()
    }

    pub fn lookup_member_by_nickname(&self, nickname: &str) -> Option<Member> {
        self.members().by_nickname(nickname).cloned()
    }

    pub fn list_members(&self) -> Vec<Member> {
        self.members().iter().cloned().collect()
    }

    /// Register the role and member refresh loops on `scheduler`.
    ///
    /// The first run of each loop happens one period from now; call
    /// [`refresh_all`](Self::refresh_all) beforehand to prime the cache.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        scheduler: &mut Scheduler,
        role_period: Duration,
        member_period: Duration,
    ) {
        let cache = self.clone();
        scheduler.spawn_delayed("refresh_roles", role_period, role_period, move || {
            let cache = cache.clone();
            async move {
                let _ = cache.refresh_roles().await;
            }
        });

        let cache = self.clone();
        scheduler.spawn_delayed("refresh_members", member_period, member_period, move || {
            let cache = cache.clone();
            async move {
                let _ = cache.refresh_members().await;
            }
        });
    }

    /// Prime both snapshots and start the refresh loops. `stop()` the returned
    /// scheduler to shut them down.
    pub async fn start(self: &Arc<Self>, role_period: Duration, member_period: Duration) -> Scheduler {
        if let Err(err) = self.refresh_all().await {
            tracing::warn!("directory: initial refresh incomplete: {}", err);
        }
        let mut scheduler = Scheduler::new();
        self.spawn_refresh(&mut scheduler, role_period, member_period);
        scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDirectory;

    fn cache(directory: &FakeDirectory) -> DirectoryCache<FakeDirectory> {
        DirectoryCache::new(directory.clone(), 1, default_job_roles())
    }

    #[tokio::test]
    async fn test_refresh_builds_role_lookups_in_both_directions() {
        let directory = FakeDirectory::with_job_roles();
        directory.add_role(99, "운영진");
        let cache = cache(&directory);
        assert_eq!(cache.refresh_roles().await.unwrap(), 11);

        assert_eq!(cache.lookup_role_id("비숍"), Some(8));
        assert_eq!(cache.lookup_role_name(99).as_deref(), Some("운영진"));
        assert_eq!(cache.lookup_role_id("없는직업"), None);
        assert_eq!(cache.list_roles().len(), 11);
    }

    #[tokio::test]
    async fn test_member_refresh_keeps_only_eligible_members() {
        let directory = FakeDirectory::with_job_roles();
        directory.add_role(99, "운영진");
        directory.add_member(1, "Lv120 바람", &[8]);
        directory.add_member(2, "Lv7일반유저", &[8]);
        directory.add_member(3, "Lv150 구름", &[99]);
        directory.add_member(4, "Lv.99 하늘", &[99, 2]);
        let cache = cache(&directory);
        cache.refresh_all().await.unwrap();

        let ids: Vec<i64> = cache.list_members().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 4]);

        let wind = cache.lookup_member(1).unwrap();
        assert_eq!(wind.level, 120);
        assert_eq!(wind.display_name, "바람");
        assert_eq!(wind.job_role, "비숍");

        let sky = cache.lookup_member_by_nickname("하늘").unwrap();
        assert_eq!(sky.id, 4);
        assert_eq!(sky.job_role, "히어로");
        assert!(cache.lookup_member_by_nickname("구름").is_none());
    }

    #[tokio::test]
    async fn test_members_without_role_snapshot_are_ineligible() {
        let directory = FakeDirectory::with_job_roles();
        directory.add_member(1, "Lv120 바람", &[8]);
        let cache = cache(&directory);
        cache.refresh_members().await.unwrap();
        assert!(cache.list_members().is_empty());

        cache.refresh_roles().await.unwrap();
        cache.refresh_members().await.unwrap();
        assert_eq!(cache.list_members().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let directory = FakeDirectory::with_job_roles();
        directory.add_member(1, "Lv120 바람", &[8]);
        let cache = cache(&directory);
        cache.refresh_all().await.unwrap();

        directory.set_failing(true);
        directory.add_member(2, "Lv130 구름", &[8]);
        assert!(matches!(
            cache.refresh_members().await,
            Err(CoreError::UpstreamUnavailable(_))
        ));
        assert!(matches!(
            cache.refresh_roles().await,
            Err(CoreError::UpstreamUnavailable(_))
        ));
        assert_eq!(cache.list_members().len(), 1);
        assert_eq!(cache.list_roles().len(), 10);

        directory.set_failing(false);
        cache.refresh_members().await.unwrap();
        assert_eq!(cache.list_members().len(), 2);
    }

    #[tokio::test]
    async fn test_held_snapshot_is_unaffected_by_refresh() {
        let directory = FakeDirectory::with_job_roles();
        directory.add_member(1, "Lv120 바람", &[8]);
        let cache = cache(&directory);
        cache.refresh_all().await.unwrap();

        let before = cache.members();
        directory.remove_member(1);
        directory.add_member(2, "Lv130 구름", &[8]);
        cache.refresh_members().await.unwrap();

        assert_eq!(before.len(), 1);
        assert!(before.get(1).is_some());
        assert!(before.by_nickname("바람").is_some());
        let after = cache.members();
        assert!(after.get(1).is_none());
        assert!(after.by_nickname("구름").is_some());
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_snapshots() {
        let directory = FakeDirectory::with_job_roles();
        let cache = Arc::new(cache(&directory));
        cache.refresh_roles().await.unwrap();

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let snapshot = cache.members();
                    // Every published snapshot has its two indexes built together.
                    for member in snapshot.iter() {
                        assert_eq!(
                            snapshot.by_nickname(&member.display_name).map(|m| m.id),
                            Some(member.id)
                        );
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        for round in 0..50 {
            directory.add_member(1000 + round, &format!("Lv{} 길드원{}", 100 + round, round), &[1]);
            cache.refresh_members().await.unwrap();
            tokio::task::yield_now().await;
        }
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(cache.list_members().len(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_primes_and_stop_halts_loops() {
        let directory = FakeDirectory::with_job_roles();
        directory.add_member(1, "Lv120 바람", &[8]);
        let cache = Arc::new(cache(&directory));

        let scheduler = cache
            .start(Duration::from_secs(60), Duration::from_secs(30))
            .await;
        assert_eq!(cache.list_members().len(), 1);
        assert_eq!(directory.member_fetches(), 1);

        directory.add_member(2, "Lv130 구름", &[8]);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(directory.member_fetches(), 2);
        assert_eq!(cache.list_members().len(), 2);

        scheduler.stop().await;
        let fetches = directory.member_fetches();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(directory.member_fetches(), fetches);
    }
}
