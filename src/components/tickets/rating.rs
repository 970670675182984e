//! Évaluation des tickets après leur fermeture

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde_json::json;

use crate::db::{
    controller::{rating as rating_ctrl, ticket as ticket_ctrl},
    from_db, to_db,
    model::{rating, ticket},
};
use crate::{log_info, log_warn};
use super::{
    audit::{AuditAction, AuditEntry, TicketAudit},
    error::RatingError,
    platform::{ButtonKind, ChatPlatform, Component, Embed, OutgoingMessage},
    settings::GuildSettings,
};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

const DEFAULT_COLOR: u32 = 0x5865f2;

/// Identifiant du bouton de note `value` pour un ticket
pub fn rating_button_id(ticket_id: i32, value: i32) -> String {
    format!("rate_{}_{}", ticket_id, value)
}

/// Retrouve le ticket et la note d'un identifiant `rate_<ticket>_<note>`
pub fn parse_rating_button(custom_id: &str) -> Option<(i32, i32)> {
    let mut parts = custom_id.strip_prefix("rate_")?.splitn(2, '_');
    let ticket = parts.next()?.parse().ok()?;
    let value = parts.next()?.parse().ok()?;
    Some((ticket, value))
}

/// Convertit une couleur `#rrggbb`
pub fn parse_color(color: &str) -> Option<u32> {
    u32::from_str_radix(color.strip_prefix('#')?, 16).ok()
}

fn score_color(value: i32) -> u32 {
    match value {
        v if v <= 2 => 0xe74c3c,
        3 => 0xf39c12,
        _ => 0x2ecc71,
    }
}

pub fn stars(value: i32) -> String {
    let value = value.clamp(0, MAX_RATING) as usize;
    format!("{}{}", "★".repeat(value), "☆".repeat(MAX_RATING as usize - value))
}

pub struct RatingService {
    db: Arc<DatabaseConnection>,
    settings: Arc<dyn GuildSettings>,
    platform: Arc<dyn ChatPlatform>,
    audit: Arc<TicketAudit>,
}

impl RatingService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        settings: Arc<dyn GuildSettings>,
        platform: Arc<dyn ChatPlatform>,
        audit: Arc<TicketAudit>,
    ) -> Self {
        Self { db, settings, platform, audit }
    }

    /// Propose à l'utilisateur de noter son ticket.
    ///
    /// Retourne `true` si la demande a été envoyée. Un échec n'est que journalisé.
    pub async fn request_rating(&self, user_id: u64, ticket: &ticket::Model) -> bool {
        let guild_id = from_db(ticket.guild_id);
        let config = match self.settings.config(guild_id).await {
            Ok(config) => config,
            Err(e) => {
                log_warn!("Demande d'évaluation du ticket {} abandonnée: {}", ticket.id, e);
                return false;
            }
        };
        if !config.rating_enabled {
            return false;
        }
        let buttons = (MIN_RATING..=MAX_RATING)
            .map(|value| Component::Button {
                custom_id: rating_button_id(ticket.id, value),
                label: stars(value),
                kind: ButtonKind::Secondary,
            })
            .collect();
        let message = OutgoingMessage {
            embed: Some(Embed {
                title: Some(config.rating_embed_title.clone().unwrap_or_else(|| "Évaluez notre support".to_string())),
                description: Some(config.rating_embed_description.clone().unwrap_or_else(|| {
                    format!("Votre ticket #{} est fermé. Comment s'est passée votre prise en charge ?", ticket.ticket_number)
                })),
                color: Some(config.rating_embed_color.as_deref().and_then(parse_color).unwrap_or(DEFAULT_COLOR)),
                footer: config.rating_embed_footer.clone(),
                ..Default::default()
            }),
            rows: vec![buttons],
            ..Default::default()
        };
        match self.platform.send_direct_message(user_id, &message).await {
            Ok(_) => true,
            Err(e) => {
                log_warn!("Demande d'évaluation non délivrée à {} pour le ticket {}: {}", user_id, ticket.id, e);
                false
            }
        }
    }

    /// Enregistre une note puis la publie dans le salon des évaluations
    pub async fn submit_rating(
        &self,
        ticket_id: i32,
        user_id: u64,
        value: i32,
        feedback: Option<String>,
    ) -> Result<rating::Model, RatingError> {
        if !(MIN_RATING..=MAX_RATING).contains(&value) {
            return Err(RatingError::OutOfRange(value));
        }
        let ticket = ticket_ctrl::find_by_id(&*self.db, ticket_id).await?
            .ok_or(RatingError::TicketNotFound)?;
        let feedback = feedback
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        let saved = rating_ctrl::insert(&*self.db, rating_ctrl::NewRating {
            ticket_id: Some(ticket.id),
            guild_id: ticket.guild_id,
            user_id: to_db(user_id),
            staff_id: ticket.claimed_by,
            rating: value,
            feedback,
        }).await?;
        log_info!("Ticket {} noté {}/5 par {}", ticket.id, value, user_id);

        let guild_id = from_db(ticket.guild_id);
        self.audit.record(
            AuditEntry::new(guild_id, AuditAction::RatingSubmitted, user_id)
                .ticket(ticket.id)
                .details(json!({ "Ticket": format!("#{}", ticket.ticket_number), "Note": value })),
        ).await;
        self.publish(&ticket, &saved).await;
        Ok(saved)
    }

    async fn publish(&self, ticket: &ticket::Model, saved: &rating::Model) {
        let guild_id = from_db(ticket.guild_id);
        let channel = match self.settings.config(guild_id).await {
            Ok(config) => match config.rating_channel_id {
                Some(channel) => from_db(channel),
                None => return,
            },
            Err(e) => {
                log_warn!("Évaluation {} non publiée: {}", saved.id, e);
                return;
            }
        };
        let mut fields = vec![
            ("Ticket".to_string(), format!("#{}", ticket.ticket_number), true),
            ("Utilisateur".to_string(), format!("<@{}>", from_db(saved.user_id)), true),
        ];
        if let Some(staff) = saved.staff_id {
            fields.push(("Pris en charge par".to_string(), format!("<@{}>", from_db(staff)), true));
        }
        if let Some(feedback) = &saved.feedback {
            fields.push(("Commentaire".to_string(), feedback.clone(), false));
        }
        let message = OutgoingMessage::embed(Embed {
            title: Some(format!("{} ({}/5)", stars(saved.rating), saved.rating)),
            color: Some(score_color(saved.rating)),
            fields,
            ..Default::default()
        });
        if let Err(e) = self.platform.send_message(channel, &message).await {
            log_warn!("Évaluation {} non publiée dans le salon {}: {}", saved.id, channel, e);
        }
    }
}
