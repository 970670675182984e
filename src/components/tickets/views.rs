//! Messages et identifiants des composants affichés par les tickets

use crate::db::{
    from_db,
    model::ticket::{self, category, panel},
};
use super::platform::{ButtonKind, Component, Embed, MemberInfo, OutgoingMessage, SelectOption};

const COLOR_TICKET: u32 = 0x5865f2;
const COLOR_CLOSED: u32 = 0xf1c40f;
const DEFAULT_OPTION_DESCRIPTION: &str = "Ouvrir un ticket dans cette catégorie";
/// Longueur maximale d'une description d'option d'un menu Discord
const OPTION_DESCRIPTION_MAX: usize = 100;
/// Nombre maximal d'options d'un menu Discord
pub const SELECT_MAX_OPTIONS: usize = 25;

/// Actions déclenchées par les boutons et menus d'un ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketAction {
    Claim,
    Accept,
    TransferMenu,
    TransferSelect,
    Close,
    Delete,
}

impl TicketAction {
    const ALL: [TicketAction; 6] = [
        TicketAction::Claim,
        TicketAction::Accept,
        TicketAction::TransferMenu,
        TicketAction::TransferSelect,
        TicketAction::Close,
        TicketAction::Delete,
    ];
    fn prefix(self) -> &'static str {
        match self {
            TicketAction::Claim => "ticket_claim_",
            TicketAction::Accept => "ticket_accept_",
            TicketAction::TransferMenu => "ticket_transfer_menu_",
            TicketAction::TransferSelect => "ticket_transfer_select_",
            TicketAction::Close => "ticket_close_",
            TicketAction::Delete => "ticket_delete_",
        }
    }
    pub fn custom_id(self, channel_id: u64) -> String {
        format!("{}{}", self.prefix(), channel_id)
    }
    /// Retrouve l'action et le salon d'un identifiant de composant
    pub fn parse(custom_id: &str) -> Option<(TicketAction, u64)> {
        Self::ALL.iter().find_map(|action| {
            let channel = custom_id.strip_prefix(action.prefix())?.parse().ok()?;
            Some((*action, channel))
        })
    }
    /// Nom court utilisé pour limiter les clics répétés
    pub fn name(self) -> &'static str {
        match self {
            TicketAction::Claim => "claim",
            TicketAction::Accept => "accept",
            TicketAction::TransferMenu => "transfer_menu",
            TicketAction::TransferSelect => "transfer",
            TicketAction::Close => "close",
            TicketAction::Delete => "delete",
        }
    }
}

pub const PANEL_SELECT_PREFIX: &str = "category_select_";
pub const DELETE_MODAL_ID: &str = "ticket_confirm_delete_modal";
pub const DELETE_INPUT_ID: &str = "confirm_input";
pub const RATING_MODAL_PREFIX: &str = "rating_modal_";
pub const FEEDBACK_INPUT_ID: &str = "feedback_input";

/// Salon du panel d'un identifiant `category_select_<salon>`
pub fn parse_panel_select(custom_id: &str) -> Option<u64> {
    custom_id.strip_prefix(PANEL_SELECT_PREFIX)?.parse().ok()
}

pub fn rating_modal_id(ticket_id: i32, value: i32) -> String {
    format!("{}{}_{}", RATING_MODAL_PREFIX, ticket_id, value)
}

/// Retrouve le ticket et la note d'un identifiant `rating_modal_<ticket>_<note>`
pub fn parse_rating_modal(custom_id: &str) -> Option<(i32, i32)> {
    let (ticket, value) = custom_id.strip_prefix(RATING_MODAL_PREFIX)?.split_once('_')?;
    Some((ticket.parse().ok()?, value.parse().ok()?))
}

/// Menu de choix du membre de l'équipe qui reçoit le ticket
pub fn transfer_menu(channel_id: u64, candidates: &[MemberInfo]) -> Vec<Vec<Component>> {
    let options = candidates.iter()
        .take(SELECT_MAX_OPTIONS)
        .map(|m| SelectOption {
            label: truncate(&m.display_name, OPTION_DESCRIPTION_MAX),
            value: m.user_id.to_string(),
            description: None,
            emoji: None,
        })
        .collect();
    vec![vec![Component::Select {
        custom_id: TicketAction::TransferSelect.custom_id(channel_id),
        placeholder: Some("Choisissez un membre de l'équipe".to_string()),
        options,
    }]]
}

fn button(action: TicketAction, channel_id: u64, label: &str, kind: ButtonKind) -> Component {
    Component::Button { custom_id: action.custom_id(channel_id), label: label.to_string(), kind }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(max - 3).collect();
        truncated.push_str("...");
        truncated
    }
}

/// Options du menu de sélection d'un panel
pub fn category_options(categories: &[category::Model]) -> Vec<SelectOption> {
    categories.iter()
        .take(SELECT_MAX_OPTIONS)
        .map(|c| SelectOption {
            label: c.label.clone(),
            value: c.option_value(),
            description: Some(truncate(
                c.description.as_deref().filter(|d| !d.trim().is_empty()).unwrap_or(DEFAULT_OPTION_DESCRIPTION),
                OPTION_DESCRIPTION_MAX,
            )),
            emoji: c.emoji.clone(),
        })
        .collect()
}

/// Message d'un panel. Sans catégorie, le menu est remplacé par un avertissement.
pub fn panel_message(panel: &panel::Model, categories: &[category::Model]) -> OutgoingMessage {
    let color = panel.color.as_deref()
        .and_then(super::rating::parse_color)
        .unwrap_or(COLOR_TICKET);
    let mut embed = Embed {
        title: Some(panel.title.clone()),
        description: panel.description.clone(),
        color: Some(color),
        image: panel.image_url.clone(),
        ..Default::default()
    };
    if categories.is_empty() {
        embed.footer = Some("Aucune catégorie disponible pour le moment".to_string());
        return OutgoingMessage::embed(embed);
    }
    OutgoingMessage {
        embed: Some(embed),
        rows: vec![vec![Component::Select {
            custom_id: panel.select_custom_id(),
            placeholder: Some(panel.placeholder.clone().unwrap_or_else(|| "Choisissez une catégorie".to_string())),
            options: category_options(categories),
        }]],
        ..Default::default()
    }
}

/// Message d'accueil posté dans un nouveau ticket
pub fn welcome_message(
    template: Option<&str>,
    ticket: &ticket::Model,
    category: &category::Model,
    staff_roles: &[u64],
) -> OutgoingMessage {
    let user = format!("<@{}>", from_db(ticket.user_id));
    let description = template
        .unwrap_or("Bienvenue {user} ! Décrivez votre demande, l'équipe vous répondra rapidement.")
        .replace("{user}", &user);
    let mut content = user;
    for role in staff_roles {
        content.push_str(&format!(" <@&{}>", role));
    }
    let channel = from_db(ticket.channel_id);
    OutgoingMessage {
        content: Some(content),
        embed: Some(Embed {
            title: Some(format!("Ticket #{} · {}", ticket.ticket_number, category.label)),
            description: Some(description),
            color: Some(COLOR_TICKET),
            ..Default::default()
        }),
        rows: vec![vec![
            button(TicketAction::Claim, channel, "Prendre en charge", ButtonKind::Primary),
            button(TicketAction::Accept, channel, "Accepter", ButtonKind::Success),
            button(TicketAction::TransferMenu, channel, "Transférer", ButtonKind::Secondary),
            button(TicketAction::Close, channel, "Fermer", ButtonKind::Danger),
        ]],
        ..Default::default()
    }
}

/// Message posté à la fermeture d'un ticket
pub fn closed_message(closer_id: u64, channel_id: u64, duration: &str) -> OutgoingMessage {
    OutgoingMessage {
        embed: Some(Embed {
            title: Some("Ticket fermé".to_string()),
            description: Some(format!(
                "Ticket fermé par <@{}>.\n\nPour le supprimer définitivement et générer la transcription, utilisez le bouton ci-dessous.",
                closer_id
            )),
            color: Some(COLOR_CLOSED),
            fields: vec![("Durée".to_string(), duration.to_string(), true)],
            ..Default::default()
        }),
        rows: vec![vec![
            button(TicketAction::Delete, channel_id, "Supprimer", ButtonKind::Danger),
            button(TicketAction::TransferMenu, channel_id, "Transférer", ButtonKind::Secondary),
        ]],
        ..Default::default()
    }
}

/// Formate une durée en `Xm`, ou `Xh Ym` au-delà d'une heure
pub fn format_duration(duration: chrono::Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    if minutes > 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}
