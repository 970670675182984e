//! Core de l'application.
//! L'initialisation du bot et l'assemblage du gestionnaire de tickets se font dans ce module.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serenity::{
    client::bridge::gateway::ShardManager,
    http::Http,
    prelude::{GatewayIntents, Mutex},
    Client,
};

use crate::components::{
    tickets::{
        engine::TicketEngine,
        platform::{ChatPlatform, SerenityPlatform},
        settings::{CachedSettings, DbSettings, GuildSettings},
        Tickets,
    },
    utils::LocalRateLimiter,
};
use crate::{config::Config, log_info};

type Result<T> = serenity::Result<T>;

/// Structure du bot.
///
/// Le client Discord reçoit les événements et les transmet au gestionnaire de tickets.
/// Le gestionnaire utilise son propre client HTTP, créé avant la connexion à la gateway.
pub struct Bot {
    /// Client discord de serenity
    client: Client,
}

impl Bot {
    /// Crée un nouveau bot et l'initialise.
    pub async fn new(config: &Config, database: Arc<DatabaseConnection>) -> Result<Bot> {
        let http = Arc::new(Http::new(&config.token));
        let bot_user = http.get_current_user().await?;
        log_info!("Connecté à l'API en tant que {} ({})", bot_user.name, bot_user.id);

        let platform: Arc<dyn ChatPlatform> = Arc::new(SerenityPlatform::new(http, bot_user.id.0));
        let settings: Arc<dyn GuildSettings> = Arc::new(CachedSettings::new(
            DbSettings::new(database.clone()),
            config.cache_ttl(),
        ));
        let engine = Arc::new(TicketEngine::new(
            database,
            settings,
            platform,
            Arc::new(LocalRateLimiter::new()),
            config.tickets.clone(),
        ));
        let client = Client::builder(&config.token, GatewayIntents::non_privileged() | GatewayIntents::GUILD_MEMBERS)
            .event_handler(Tickets::new(engine))
            .application_id(config.app_id)
            .await?;
        Ok(Bot { client })
    }
    /// Gestionnaire des shards, utilisé pour arrêter le bot depuis une autre tâche
    pub fn shard_manager(&self) -> Arc<Mutex<ShardManager>> {
        self.client.shard_manager.clone()
    }
    /// Lance le bot. Retourne une fois tous les shards arrêtés.
    pub async fn start(&mut self) -> Result<()> {
        self.client.start().await
    }
}
