//! Configuration des serveurs et compteur de tickets

use std::fmt;

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    entity::*, ConnectionTrait, QueryTrait,
    sea_query::{Expr, OnConflict, Query},
};
use serde_json::Value;

use crate::db::{model, model::guild, to_db, IDType};
use crate::log_info;
use super::{Error, Result};

/// Salons de logs configurables d'un serveur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogChannel {
    General,
    Tickets,
    Moderation,
    Sales,
    Members,
}

impl guild::Model {
    pub fn log_channel(&self, kind: LogChannel) -> Option<IDType> {
        match kind {
            LogChannel::General => self.log_channel_general,
            LogChannel::Tickets => self.log_channel_tickets,
            LogChannel::Moderation => self.log_channel_moderation,
            LogChannel::Sales => self.log_channel_sales,
            LogChannel::Members => self.log_channel_members,
        }
    }
}

/// Modification d'un champ de la configuration d'un serveur.
///
/// Seuls les champs listés ici peuvent être modifiés. Le compteur de tickets n'en fait pas partie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    LogChannel(LogChannel, Option<u64>),
    RatingEnabled(bool),
    RatingChannel(Option<u64>),
    RatingEmbedTitle(Option<String>),
    RatingEmbedDescription(Option<String>),
    RatingEmbedColor(Option<String>),
    RatingEmbedFooter(Option<String>),
    WelcomeMessage(Option<String>),
    VisitorRole(Option<u64>),
    ClientRole(Option<u64>),
    ActiveClientRole(Option<u64>),
}

/// Erreur de validation d'une modification de configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownKey(String),
    InvalidValue { key: String, expected: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownKey(key) => write!(f, "Paramètre inconnu: {}", key),
            ConfigError::InvalidValue { key, expected } => write!(f, "{}: {} attendu", key, expected),
        }
    }
}

lazy_static! {
    static ref COLOR_RE: Regex = Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap();
}

fn parse_id(key: &str, value: &Value) -> std::result::Result<Option<u64>, ConfigError> {
    let invalid = || ConfigError::InvalidValue { key: key.to_string(), expected: "identifiant Discord" };
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => s.parse().map(Some).map_err(|_| invalid()),
        Value::Number(n) => n.as_u64().map(Some).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn parse_text(key: &str, value: &Value) -> std::result::Result<Option<String>, ConfigError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(ConfigError::InvalidValue { key: key.to_string(), expected: "texte" }),
    }
}

/// Champs dont la valeur est toujours du texte libre
const TEXT_KEYS: [&str; 5] = [
    "rating_embed_title",
    "rating_embed_description",
    "rating_embed_color",
    "rating_embed_footer",
    "welcome_message",
];

impl ConfigChange {
    /// `true` si la clé attend du texte libre
    pub fn is_text_key(key: &str) -> bool {
        TEXT_KEYS.contains(&key)
    }
    /// Valide une paire clé/valeur venant du tableau de bord
    pub fn parse(key: &str, value: &Value) -> std::result::Result<Self, ConfigError> {
        let change = match key {
            "log_channel_general" | "log_channel_id" => ConfigChange::LogChannel(LogChannel::General, parse_id(key, value)?),
            "log_channel_tickets" => ConfigChange::LogChannel(LogChannel::Tickets, parse_id(key, value)?),
            "log_channel_moderation" => ConfigChange::LogChannel(LogChannel::Moderation, parse_id(key, value)?),
            "log_channel_sales" => ConfigChange::LogChannel(LogChannel::Sales, parse_id(key, value)?),
            "log_channel_members" => ConfigChange::LogChannel(LogChannel::Members, parse_id(key, value)?),
            "rating_enabled" => match value {
                Value::Bool(b) => ConfigChange::RatingEnabled(*b),
                _ => return Err(ConfigError::InvalidValue { key: key.to_string(), expected: "booléen" }),
            },
            "rating_channel_id" => ConfigChange::RatingChannel(parse_id(key, value)?),
            "rating_embed_title" => ConfigChange::RatingEmbedTitle(parse_text(key, value)?),
            "rating_embed_description" => ConfigChange::RatingEmbedDescription(parse_text(key, value)?),
            "rating_embed_color" => {
                let color = parse_text(key, value)?;
                if let Some(ref c) = color {
                    if !COLOR_RE.is_match(c) {
                        return Err(ConfigError::InvalidValue { key: key.to_string(), expected: "couleur #rrggbb" });
                    }
                }
                ConfigChange::RatingEmbedColor(color)
            }
            "rating_embed_footer" => ConfigChange::RatingEmbedFooter(parse_text(key, value)?),
            "welcome_message" => ConfigChange::WelcomeMessage(parse_text(key, value)?),
            "visitor_role_id" => ConfigChange::VisitorRole(parse_id(key, value)?),
            "client_role_id" => ConfigChange::ClientRole(parse_id(key, value)?),
            "active_client_role_id" => ConfigChange::ActiveClientRole(parse_id(key, value)?),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(change)
    }
    /// Valide un objet JSON complet. La première clé invalide rejette l'ensemble.
    pub fn parse_object(settings: &serde_json::Map<String, Value>) -> std::result::Result<Vec<Self>, ConfigError> {
        settings.iter().map(|(k, v)| Self::parse(k, v)).collect()
    }
    /// Clé du champ modifié
    pub fn key(&self) -> &'static str {
        match self {
            ConfigChange::LogChannel(LogChannel::General, _) => "log_channel_general",
            ConfigChange::LogChannel(LogChannel::Tickets, _) => "log_channel_tickets",
            ConfigChange::LogChannel(LogChannel::Moderation, _) => "log_channel_moderation",
            ConfigChange::LogChannel(LogChannel::Sales, _) => "log_channel_sales",
            ConfigChange::LogChannel(LogChannel::Members, _) => "log_channel_members",
            ConfigChange::RatingEnabled(_) => "rating_enabled",
            ConfigChange::RatingChannel(_) => "rating_channel_id",
            ConfigChange::RatingEmbedTitle(_) => "rating_embed_title",
            ConfigChange::RatingEmbedDescription(_) => "rating_embed_description",
            ConfigChange::RatingEmbedColor(_) => "rating_embed_color",
            ConfigChange::RatingEmbedFooter(_) => "rating_embed_footer",
            ConfigChange::WelcomeMessage(_) => "welcome_message",
            ConfigChange::VisitorRole(_) => "visitor_role_id",
            ConfigChange::ClientRole(_) => "client_role_id",
            ConfigChange::ActiveClientRole(_) => "active_client_role_id",
        }
    }
    fn apply(self, active: &mut guild::ActiveModel) {
        let id = |v: Option<u64>| v.map(to_db);
        match self {
            ConfigChange::LogChannel(LogChannel::General, v) => active.log_channel_general = Set(id(v)),
            ConfigChange::LogChannel(LogChannel::Tickets, v) => active.log_channel_tickets = Set(id(v)),
            ConfigChange::LogChannel(LogChannel::Moderation, v) => active.log_channel_moderation = Set(id(v)),
            ConfigChange::LogChannel(LogChannel::Sales, v) => active.log_channel_sales = Set(id(v)),
            ConfigChange::LogChannel(LogChannel::Members, v) => active.log_channel_members = Set(id(v)),
            ConfigChange::RatingEnabled(v) => active.rating_enabled = Set(v),
            ConfigChange::RatingChannel(v) => active.rating_channel_id = Set(id(v)),
            ConfigChange::RatingEmbedTitle(v) => active.rating_embed_title = Set(v),
            ConfigChange::RatingEmbedDescription(v) => active.rating_embed_description = Set(v),
            ConfigChange::RatingEmbedColor(v) => active.rating_embed_color = Set(v),
            ConfigChange::RatingEmbedFooter(v) => active.rating_embed_footer = Set(v),
            ConfigChange::WelcomeMessage(v) => active.welcome_message = Set(v),
            ConfigChange::VisitorRole(v) => active.visitor_role_id = Set(id(v)),
            ConfigChange::ClientRole(v) => active.client_role_id = Set(id(v)),
            ConfigChange::ActiveClientRole(v) => active.active_client_role_id = Set(id(v)),
        }
    }
}

/// Crée la ligne de configuration du serveur si elle n'existe pas encore
pub async fn ensure_guild<C: ConnectionTrait>(conn: &C, guild_id: IDType) -> Result<()> {
    let active: guild::ActiveModel = guild::Model::default_for(guild_id).into_active_model();
    let stmt = model::GuildConfig::insert(active)
        .on_conflict(OnConflict::column(guild::Column::GuildId).do_nothing().to_owned())
        .build(conn.get_database_backend());
    conn.execute(stmt).await.map_err(Error::SeaORM)?;
    Ok(())
}

/// Lit la configuration du serveur, en la créant avec les valeurs par défaut au premier accès
pub async fn get_or_create<C: ConnectionTrait>(conn: &C, guild_id: IDType) -> Result<guild::Model> {
    if let Some(config) = model::GuildConfig::find_by_id(guild_id).one(conn).await.map_err(Error::SeaORM)? {
        return Ok(config);
    }
    ensure_guild(conn, guild_id).await?;
    log_info!("Configuration créée pour le serveur {}", guild_id);
    model::GuildConfig::find_by_id(guild_id)
        .one(conn).await
        .map_err(Error::SeaORM)?
        .ok_or_else(|| Error::Custom(format!("Configuration du serveur {} introuvable après création", guild_id)))
}

/// Applique des modifications à la configuration et retourne la nouvelle valeur
pub async fn update<C: ConnectionTrait>(conn: &C, guild_id: IDType, changes: Vec<ConfigChange>) -> Result<guild::Model> {
    let current = get_or_create(conn, guild_id).await?;
    if changes.is_empty() {
        return Ok(current);
    }
    let mut active: guild::ActiveModel = current.into();
    for change in changes {
        change.apply(&mut active);
    }
    active.updated_at = Set(Utc::now());
    active.update(conn).await.map_err(Error::SeaORM)
}

/// Incrémente le compteur du serveur et retourne la nouvelle valeur.
///
/// L'incrément et la lecture se font dans une seule requête `UPDATE .. RETURNING`.
pub async fn next_ticket_number<C: ConnectionTrait>(conn: &C, guild_id: IDType) -> Result<i32> {
    ensure_guild(conn, guild_id).await?;
    let backend = conn.get_database_backend();
    let stmt = Query::update()
        .table(model::GuildConfig)
        .value(guild::Column::TicketCount, Expr::col(guild::Column::TicketCount).add(1))
        .value(guild::Column::UpdatedAt, Utc::now())
        .and_where(Expr::col(guild::Column::GuildId).eq(guild_id))
        .returning_col(guild::Column::TicketCount)
        .to_owned();
    let row = conn.query_one(backend.build(&stmt)).await
        .map_err(Error::SeaORM)?
        .ok_or_else(|| Error::Custom(format!("Compteur de tickets introuvable pour le serveur {}", guild_id)))?;
    row.try_get::<i32>("", "ticket_count").map_err(Error::SeaORM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;
    use serde_json::json;

    #[tokio::test]
    async fn config_is_created_lazily() {
        let db = memory_db().await;
        assert!(model::GuildConfig::find_by_id(1).one(&db).await.unwrap().is_none());
        let config = get_or_create(&db, 1).await.unwrap();
        assert_eq!(config.ticket_count, 0);
        assert!(config.rating_enabled);
        let again = get_or_create(&db, 1).await.unwrap();
        assert_eq!(config, again);
    }

    #[tokio::test]
    async fn update_round_trip() {
        let db = memory_db().await;
        let updated = update(&db, 7, vec![
            ConfigChange::LogChannel(LogChannel::Tickets, Some(555)),
            ConfigChange::WelcomeMessage(Some("Salut {user}".into())),
        ]).await.unwrap();
        assert_eq!(updated.log_channel_tickets, Some(555));
        let read = get_or_create(&db, 7).await.unwrap();
        assert_eq!(read.log_channel(LogChannel::Tickets), Some(555));
        assert_eq!(read.welcome_message.as_deref(), Some("Salut {user}"));
        assert_eq!(read.ticket_count, 0);
    }

    #[tokio::test]
    async fn counter_only_increases() {
        let db = memory_db().await;
        assert_eq!(next_ticket_number(&db, 3).await.unwrap(), 1);
        assert_eq!(next_ticket_number(&db, 3).await.unwrap(), 2);
        assert_eq!(next_ticket_number(&db, 4).await.unwrap(), 1);
        update(&db, 3, vec![ConfigChange::RatingEnabled(false)]).await.unwrap();
        assert_eq!(next_ticket_number(&db, 3).await.unwrap(), 3);
    }

    #[test]
    fn parse_allow_list() {
        assert_eq!(
            ConfigChange::parse("log_channel_tickets", &json!("123")),
            Ok(ConfigChange::LogChannel(LogChannel::Tickets, Some(123)))
        );
        assert_eq!(ConfigChange::parse("rating_channel_id", &json!(null)), Ok(ConfigChange::RatingChannel(None)));
        assert_eq!(ConfigChange::parse("rating_enabled", &json!(false)), Ok(ConfigChange::RatingEnabled(false)));
        assert_eq!(
            ConfigChange::parse("ticket_count", &json!(0)),
            Err(ConfigError::UnknownKey("ticket_count".into()))
        );
        assert!(ConfigChange::parse("rating_enabled", &json!("oui")).is_err());
        assert!(ConfigChange::parse("rating_embed_color", &json!("violet")).is_err());
        assert!(ConfigChange::parse("rating_embed_color", &json!("#9d32ff")).is_ok());
        assert!(ConfigChange::parse("client_role_id", &json!("abc")).is_err());
    }

    #[test]
    fn parse_object_rejects_everything_on_one_bad_key() {
        let settings = json!({ "rating_enabled": true, "guild_id": "1" });
        let settings = settings.as_object().unwrap();
        assert!(ConfigChange::parse_object(settings).is_err());
    }
}
