//! Configuration de l'application.
//!
//! Le fichier `config.json` est lu au démarrage. Toutes les clés hors `token` et `app_id`
//! possèdent une valeur par défaut.

use std::{path::Path, time::Duration};
use serde::{Deserialize, Serialize};

/// Configuration de l'application
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub token: String,
    pub app_id: u64,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Durée de vie des entrées du cache de configuration
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Temps laissé au client pour s'arrêter après un signal
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub tickets: TicketOptions,
}

/// Catégories Discord globales utilisées par le cycle de vie des tickets
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketParents {
    /// Catégorie de repli des nouveaux tickets si le panel n'en définit pas
    pub open: Option<u64>,
    /// Catégorie des tickets acceptés
    pub accepted: Option<u64>,
    /// Catégorie des tickets fermés
    pub closed: Option<u64>,
}

/// Format des transcriptions archivées et envoyées en message privé
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptFormat {
    #[default]
    Html,
    Txt,
}

/// Options du composant de tickets
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TicketOptions {
    pub creation_cooldown_secs: u64,
    pub interaction_debounce_ms: u64,
    /// Délai avant la suppression du salon après l'archivage
    pub delete_delay_secs: u64,
    /// Phrase à saisir pour confirmer la suppression, comparée sans tenir compte de la casse
    pub delete_confirmation: String,
    /// Nombre maximal de salons dans une catégorie Discord
    pub category_capacity: usize,
    pub transcript_format: TranscriptFormat,
    pub categories: TicketParents,
}

impl Default for TicketOptions {
    fn default() -> Self {
        Self {
            creation_cooldown_secs: 10,
            interaction_debounce_ms: 1500,
            delete_delay_secs: 5,
            delete_confirmation: "SUPPRIMER".to_string(),
            category_capacity: 50,
            transcript_format: TranscriptFormat::Html,
            categories: TicketParents::default(),
        }
    }
}

impl TicketOptions {
    #[inline]
    pub fn creation_cooldown(&self) -> Duration {
        Duration::from_secs(self.creation_cooldown_secs)
    }
    #[inline]
    pub fn interaction_debounce(&self) -> Duration {
        Duration::from_millis(self.interaction_debounce_ms)
    }
    #[inline]
    pub fn delete_delay(&self) -> Duration {
        Duration::from_secs(self.delete_delay_secs)
    }
}

fn default_database_url() -> String {
    "sqlite://nexoticket.db?mode=rwc".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_shutdown_grace() -> u64 {
    5
}

impl Config {
    pub fn read_file<P: AsRef<Path>>(filepath: P) -> Result<Self, String> {
        let str_config = match std::fs::read_to_string(filepath.as_ref()) {
            Ok(v) => v,
            Err(e) => return Err(format!("Unable to read file {}: {}", filepath.as_ref().to_string_lossy(), e)),
        };
        Self::parse(&str_config)
            .map_err(|e| format!("Unable to parse {}: {}", filepath.as_ref().to_string_lossy(), e))
    }
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
    #[inline]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
    #[inline]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_takes_defaults() {
        let config = Config::parse(r#"{"token": "abc", "app_id": 42}"#).unwrap();
        assert_eq!(config.app_id, 42);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.tickets, TicketOptions::default());
        assert_eq!(config.tickets.creation_cooldown(), Duration::from_secs(10));
        assert_eq!(config.tickets.delete_confirmation, "SUPPRIMER");
    }

    #[test]
    fn partial_ticket_section() {
        let config = Config::parse(r#"{
            "token": "abc",
            "app_id": 1,
            "tickets": { "category_capacity": 10, "categories": { "accepted": 99 } }
        }"#).unwrap();
        assert_eq!(config.tickets.category_capacity, 10);
        assert_eq!(config.tickets.creation_cooldown_secs, 10);
        assert_eq!(config.tickets.categories.accepted, Some(99));
        assert_eq!(config.tickets.categories.open, None);
    }

    #[test]
    fn missing_token_is_an_error() {
        assert!(Config::parse(r#"{"app_id": 1}"#).is_err());
    }
}
