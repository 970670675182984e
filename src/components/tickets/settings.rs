//! Lecture et modification de la configuration des serveurs.
//!
//! [`DbSettings`] lit toujours la base. [`CachedSettings`] l'enveloppe avec un cache à durée
//! de vie limitée, invalidé à chaque modification.

use std::{sync::Arc, time::Duration};

use sea_orm::DatabaseConnection;
use serenity::async_trait;

use crate::components::utils::TtlCache;
use crate::db::{
    controller::{self, guild::ConfigChange, guild as guild_ctrl, staff},
    from_db, to_db,
    model::guild,
};
use crate::log_debug;

#[async_trait]
pub trait GuildSettings: Send + Sync {
    /// Configuration du serveur, créée avec les valeurs par défaut au premier accès
    async fn config(&self, guild_id: u64) -> controller::Result<guild::Model>;
    async fn update_config(&self, guild_id: u64, changes: Vec<ConfigChange>) -> controller::Result<guild::Model>;
    async fn staff_roles(&self, guild_id: u64) -> controller::Result<Vec<u64>>;
    /// Retourne `false` si le rôle faisait déjà partie de l'équipe
    async fn add_staff_role(&self, guild_id: u64, role_id: u64) -> controller::Result<bool>;
    async fn remove_staff_role(&self, guild_id: u64, role_id: u64) -> controller::Result<bool>;
}

pub struct DbSettings {
    db: Arc<DatabaseConnection>,
}

impl DbSettings {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GuildSettings for DbSettings {
    async fn config(&self, guild_id: u64) -> controller::Result<guild::Model> {
        guild_ctrl::get_or_create(&*self.db, to_db(guild_id)).await
    }
    async fn update_config(&self, guild_id: u64, changes: Vec<ConfigChange>) -> controller::Result<guild::Model> {
        guild_ctrl::update(&*self.db, to_db(guild_id), changes).await
    }
    async fn staff_roles(&self, guild_id: u64) -> controller::Result<Vec<u64>> {
        let roles = staff::list(&*self.db, to_db(guild_id)).await?;
        Ok(roles.into_iter().map(from_db).collect())
    }
    async fn add_staff_role(&self, guild_id: u64, role_id: u64) -> controller::Result<bool> {
        staff::add(&*self.db, to_db(guild_id), to_db(role_id)).await
    }
    async fn remove_staff_role(&self, guild_id: u64, role_id: u64) -> controller::Result<bool> {
        staff::remove(&*self.db, to_db(guild_id), to_db(role_id)).await
    }
}

const CONFIG: &str = "config";
const STAFF: &str = "staff";

#[derive(Debug, Clone)]
enum Cached {
    Config(guild::Model),
    Staff(Vec<u64>),
}

/// Cache devant un [`GuildSettings`]
pub struct CachedSettings<S> {
    inner: S,
    cache: TtlCache<Cached>,
}

impl<S: GuildSettings> CachedSettings<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self { inner, cache: TtlCache::new(ttl) }
    }
    /// Oublie tout ce qui est connu d'un serveur
    pub async fn invalidate(&self, guild_id: u64) {
        self.cache.invalidate(guild_id, None).await;
    }
}

#[async_trait]
impl<S: GuildSettings> GuildSettings for CachedSettings<S> {
    async fn config(&self, guild_id: u64) -> controller::Result<guild::Model> {
        if let Some(Cached::Config(config)) = self.cache.get(guild_id, CONFIG).await {
            return Ok(config);
        }
        let generation = self.cache.generation(guild_id).await;
        let config = self.inner.config(guild_id).await?;
        self.cache.insert_if_current(guild_id, CONFIG, Cached::Config(config.clone()), generation).await;
        Ok(config)
    }
    async fn update_config(&self, guild_id: u64, changes: Vec<ConfigChange>) -> controller::Result<guild::Model> {
        let res = self.inner.update_config(guild_id, changes).await;
        self.cache.invalidate(guild_id, Some(CONFIG)).await;
        log_debug!("Cache de configuration invalidé pour le serveur {}", guild_id);
        res
    }
    async fn staff_roles(&self, guild_id: u64) -> controller::Result<Vec<u64>> {
        if let Some(Cached::Staff(roles)) = self.cache.get(guild_id, STAFF).await {
            return Ok(roles);
        }
        let generation = self.cache.generation(guild_id).await;
        let roles = self.inner.staff_roles(guild_id).await?;
        if !self.cache.insert_if_current(guild_id, STAFF, Cached::Staff(roles.clone()), generation).await {
            log_debug!("Rôles de l'équipe du serveur {} modifiés pendant la lecture, non mis en cache", guild_id);
        }
        Ok(roles)
    }
    async fn add_staff_role(&self, guild_id: u64, role_id: u64) -> controller::Result<bool> {
        let res = self.inner.add_staff_role(guild_id, role_id).await;
        self.cache.invalidate(guild_id, Some(STAFF)).await;
        res
    }
    async fn remove_staff_role(&self, guild_id: u64, role_id: u64) -> controller::Result<bool> {
        let res = self.inner.remove_staff_role(guild_id, role_id).await;
        self.cache.invalidate(guild_id, Some(STAFF)).await;
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;
    use crate::db::{controller::guild::LogChannel, tests::memory_db};

    async fn settings() -> (Arc<DatabaseConnection>, CachedSettings<DbSettings>) {
        let db = Arc::new(memory_db().await);
        let settings = CachedSettings::new(DbSettings::new(db.clone()), Duration::from_secs(300));
        (db, settings)
    }

    #[tokio::test]
    async fn update_is_visible_immediately() {
        let (_, settings) = settings().await;
        assert_eq!(settings.config(1).await.unwrap().log_channel_tickets, None);
        settings.update_config(1, vec![ConfigChange::LogChannel(LogChannel::Tickets, Some(42))]).await.unwrap();
        assert_eq!(settings.config(1).await.unwrap().log_channel_tickets, Some(42));
    }

    #[tokio::test]
    async fn cache_hides_direct_writes_until_invalidated() {
        let (db, settings) = settings().await;
        settings.staff_roles(1).await.unwrap();
        staff::add(&*db, 1, 10).await.unwrap();
        assert!(settings.staff_roles(1).await.unwrap().is_empty());
        settings.invalidate(1).await;
        assert_eq!(settings.staff_roles(1).await.unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn staff_mutations_invalidate() {
        let (_, settings) = settings().await;
        assert!(settings.staff_roles(1).await.unwrap().is_empty());
        assert!(settings.add_staff_role(1, 10).await.unwrap());
        assert!(!settings.add_staff_role(1, 10).await.unwrap());
        assert_eq!(settings.staff_roles(1).await.unwrap(), vec![10]);
        assert!(settings.remove_staff_role(1, 10).await.unwrap());
        assert!(settings.staff_roles(1).await.unwrap().is_empty());
    }

    /// Met en pause la première lecture des rôles juste après la lecture en base
    struct PausedRead {
        inner: DbSettings,
        paused: AtomicBool,
        reached: Arc<Notify>,
        resume: Arc<Notify>,
    }

    #[async_trait]
    impl GuildSettings for PausedRead {
        async fn config(&self, guild_id: u64) -> controller::Result<guild::Model> {
            self.inner.config(guild_id).await
        }
        async fn update_config(&self, guild_id: u64, changes: Vec<ConfigChange>) -> controller::Result<guild::Model> {
            self.inner.update_config(guild_id, changes).await
        }
        async fn staff_roles(&self, guild_id: u64) -> controller::Result<Vec<u64>> {
            let roles = self.inner.staff_roles(guild_id).await?;
            if !self.paused.swap(true, Ordering::SeqCst) {
                self.reached.notify_one();
                self.resume.notified().await;
            }
            Ok(roles)
        }
        async fn add_staff_role(&self, guild_id: u64, role_id: u64) -> controller::Result<bool> {
            self.inner.add_staff_role(guild_id, role_id).await
        }
        async fn remove_staff_role(&self, guild_id: u64, role_id: u64) -> controller::Result<bool> {
            self.inner.remove_staff_role(guild_id, role_id).await
        }
    }

    #[tokio::test]
    async fn read_in_flight_during_removal_is_not_cached() {
        let db = Arc::new(memory_db().await);
        staff::add(&*db, 1, 10).await.unwrap();
        let reached = Arc::new(Notify::new());
        let resume = Arc::new(Notify::new());
        let settings = Arc::new(CachedSettings::new(
            PausedRead {
                inner: DbSettings::new(db.clone()),
                paused: AtomicBool::new(false),
                reached: reached.clone(),
                resume: resume.clone(),
            },
            Duration::from_secs(300),
        ));

        let reader = tokio::spawn({
            let settings = settings.clone();
            async move { settings.staff_roles(1).await }
        });
        reached.notified().await;
        assert!(settings.remove_staff_role(1, 10).await.unwrap());
        resume.notify_one();
        assert_eq!(reader.await.unwrap().unwrap(), vec![10]);

        assert!(staff::list(&*db, 1).await.unwrap().is_empty());
        assert!(settings.staff_roles(1).await.unwrap().is_empty());
    }
}
