//! Journal des actions: une ligne en base et un message dans le salon de logs du serveur

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde_json::Value;

use crate::db::{controller::{guild::LogChannel, ticket}, from_db, to_db};
use crate::log_warn;
use super::{
    platform::{ChatPlatform, Embed, OutgoingMessage},
    settings::GuildSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    TicketCreated,
    TicketClaimed,
    TicketAccepted,
    TicketTransferred,
    TicketClosed,
    TicketDeleted,
    RatingSubmitted,
    ConfigUpdated,
    StaffRoleAdded,
    StaffRoleRemoved,
    PanelCreated,
    PanelUpdated,
    PanelDeleted,
    CategoryCreated,
    CategoryUpdated,
    CategoryDeleted,
    TicketsCleared,
    FeedbackCleared,
    MemberRolesChanged,
    MemberJoined,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        use AuditAction::*;
        match self {
            TicketCreated => "ticket_created",
            TicketClaimed => "ticket_claimed",
            TicketAccepted => "ticket_accepted",
            TicketTransferred => "ticket_transferred",
            TicketClosed => "ticket_closed",
            TicketDeleted => "ticket_deleted",
            RatingSubmitted => "rating_submitted",
            ConfigUpdated => "config_updated",
            StaffRoleAdded => "staff_role_added",
            StaffRoleRemoved => "staff_role_removed",
            PanelCreated => "panel_created",
            PanelUpdated => "panel_updated",
            PanelDeleted => "panel_deleted",
            CategoryCreated => "category_created",
            CategoryUpdated => "category_updated",
            CategoryDeleted => "category_deleted",
            TicketsCleared => "tickets_cleared",
            FeedbackCleared => "feedback_cleared",
            MemberRolesChanged => "member_roles_changed",
            MemberJoined => "member_joined",
        }
    }
    fn title(self) -> &'static str {
        use AuditAction::*;
        match self {
            TicketCreated => "Ticket créé",
            TicketClaimed => "Ticket pris en charge",
            TicketAccepted => "Ticket accepté",
            TicketTransferred => "Ticket transféré",
            TicketClosed => "Ticket fermé",
            TicketDeleted => "Ticket supprimé",
            RatingSubmitted => "Nouvelle évaluation",
            ConfigUpdated => "Configuration modifiée",
            StaffRoleAdded => "Rôle ajouté à l'équipe",
            StaffRoleRemoved => "Rôle retiré de l'équipe",
            PanelCreated => "Panel créé",
            PanelUpdated => "Panel modifié",
            PanelDeleted => "Panel supprimé",
            CategoryCreated => "Catégorie créée",
            CategoryUpdated => "Catégorie modifiée",
            CategoryDeleted => "Catégorie supprimée",
            TicketsCleared => "Tickets purgés",
            FeedbackCleared => "Évaluations purgées",
            MemberRolesChanged => "Rôles d'un membre modifiés",
            MemberJoined => "Nouveau membre",
        }
    }
    /// Salon de logs qui reçoit l'action
    pub fn route(self) -> LogChannel {
        use AuditAction::*;
        match self {
            TicketCreated | TicketClaimed | TicketAccepted | TicketTransferred | TicketClosed
            | TicketDeleted | RatingSubmitted => LogChannel::Tickets,
            MemberRolesChanged | MemberJoined => LogChannel::Members,
            _ => LogChannel::Moderation,
        }
    }
    fn color(self) -> u32 {
        use AuditAction::*;
        match self {
            TicketCreated | TicketAccepted | PanelCreated | CategoryCreated | StaffRoleAdded => 0x2ecc71,
            TicketClosed | TicketDeleted | PanelDeleted | CategoryDeleted | StaffRoleRemoved
            | TicketsCleared | FeedbackCleared => 0xe74c3c,
            _ => 0x3498db,
        }
    }
}

/// Une entrée du journal
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub guild_id: u64,
    pub ticket_id: Option<i32>,
    pub action: AuditAction,
    pub performer_id: u64,
    pub details: Option<Value>,
}

impl AuditEntry {
    pub fn new(guild_id: u64, action: AuditAction, performer_id: u64) -> Self {
        Self { guild_id, ticket_id: None, action, performer_id, details: None }
    }
    pub fn ticket(mut self, ticket_id: i32) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }
    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
    fn to_message(&self) -> OutgoingMessage {
        let mut fields = vec![("Par".to_string(), format!("<@{}>", self.performer_id), true)];
        if let Some(Value::Object(details)) = &self.details {
            for (key, value) in details {
                let value = match value {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                };
                fields.push((key.clone(), value, true));
            }
        }
        OutgoingMessage::embed(Embed {
            title: Some(self.action.title().to_string()),
            color: Some(self.action.color()),
            fields,
            ..Default::default()
        })
    }
}

pub struct TicketAudit {
    db: Arc<DatabaseConnection>,
    settings: Arc<dyn GuildSettings>,
    platform: Arc<dyn ChatPlatform>,
}

impl TicketAudit {
    pub fn new(db: Arc<DatabaseConnection>, settings: Arc<dyn GuildSettings>, platform: Arc<dyn ChatPlatform>) -> Self {
        Self { db, settings, platform }
    }

    /// Enregistre l'action puis la publie. Les deux étapes sont indépendantes et un échec
    /// n'est que journalisé.
    pub async fn record(&self, entry: AuditEntry) {
        if let Err(e) = ticket::insert_log(
            &*self.db,
            to_db(entry.guild_id),
            entry.ticket_id,
            entry.action.as_str(),
            to_db(entry.performer_id),
            entry.details.clone(),
        ).await {
            log_warn!("Journal {} non enregistré pour le serveur {}: {}", entry.action.as_str(), entry.guild_id, e);
        }
        let config = match self.settings.config(entry.guild_id).await {
            Ok(config) => config,
            Err(e) => {
                log_warn!("Configuration du serveur {} illisible pour le journal: {}", entry.guild_id, e);
                return;
            }
        };
        let channel = config.log_channel(entry.action.route()).or(config.log_channel(LogChannel::General));
        let channel = match channel {
            Some(channel) => from_db(channel),
            None => return,
        };
        if let Err(e) = self.platform.send_message(channel, &entry.to_message()).await {
            log_warn!(
                "Journal {} non publié dans le salon {} du serveur {}: {}",
                entry.action.as_str(), channel, entry.guild_id, e
            );
        }
    }
}
