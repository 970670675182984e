//! Gestionnaire de tickets.
//!
//! [`Tickets`] reçoit les événements Discord et les traduit en appels au [`TicketEngine`]
//! et au [`TicketAdmin`]. Toutes les réponses sont éphémères et affichent le message de
//! l'erreur en cas de refus.

pub mod admin;
pub mod archive;
pub mod audit;
pub mod engine;
pub mod error;
pub mod platform;
pub mod rating;
pub mod settings;
pub mod views;
#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use serde_json::Value;
use serenity::{
    async_trait,
    builder::CreateApplicationCommand,
    client::{Context, EventHandler},
    model::{
        application::{
            command::{Command, CommandOptionType},
            component::{ActionRowComponent, InputTextStyle},
            interaction::{
                application_command::{ApplicationCommandInteraction, CommandDataOption},
                message_component::MessageComponentInteraction,
                modal::ModalSubmitInteraction,
                Interaction, InteractionResponseType,
            },
        },
        gateway::Ready,
        guild::Member,
        permissions::Permissions,
    },
};

use crate::db::{
    controller::{guild::ConfigChange, panel::{self as panel_ctrl, CategoryUpdate, NewCategory, PanelUpdate}},
    from_db, to_db,
};
use crate::{log_error, log_info, log_warn};
use self::{
    admin::{PanelRequest, TicketAdmin},
    engine::{ClaimOutcome, CreateRequest, TicketEngine},
    error::TicketError,
    platform::OutgoingMessage,
    views::TicketAction,
};

const COMMAND_NAME: &str = "tickets";

/// Réponses aux interactions, identiques pour les commandes, les composants et les formulaires
#[async_trait]
trait Reply {
    /// Accuse réception de l'interaction. Retourne `false` si Discord a refusé.
    async fn defer_reply(&self, ctx: &Context) -> bool;
    async fn answer(&self, ctx: &Context, deferred: bool, content: String);
}

macro_rules! impl_reply {
    ($($interaction:ty),*) => {$(
        #[async_trait]
        impl Reply for $interaction {
            async fn defer_reply(&self, ctx: &Context) -> bool {
                match self.create_interaction_response(&ctx.http, |resp| {
                    resp.kind(InteractionResponseType::DeferredChannelMessageWithSource)
                        .interaction_response_data(|data| data.ephemeral(true))
                }).await {
                    Ok(()) => true,
                    Err(e) => {
                        log_warn!("Erreur lors de la création de l'interaction: {}", e);
                        false
                    }
                }
            }
            async fn answer(&self, ctx: &Context, deferred: bool, content: String) {
                let result = if deferred {
                    self.edit_original_interaction_response(&ctx.http, |resp| resp.content(&content))
                        .await
                        .map(|_| ())
                } else {
                    self.create_interaction_response(&ctx.http, |resp| {
                        resp.kind(InteractionResponseType::ChannelMessageWithSource)
                            .interaction_response_data(|data| data.content(&content).ephemeral(true))
                    }).await
                };
                if let Err(e) = result {
                    log_error!("Erreur lors de l'envoi d'une réponse d'interaction: {}", e);
                }
            }
        }
    )*};
}

impl_reply!(ApplicationCommandInteraction, MessageComponentInteraction, ModalSubmitInteraction);

/// Texte de réponse d'une opération. Les échecs qui ne sont pas des refus sont journalisés.
fn outcome<T, F: FnOnce(T) -> String>(result: error::Result<T>, ok: F) -> String {
    match result {
        Ok(value) => ok(value),
        Err(e) => {
            if !e.is_rejection() {
                log_error!("Erreur du gestionnaire de tickets: {}", e);
            }
            e.to_string()
        }
    }
}

fn input_value(modal: &ModalSubmitInteraction, custom_id: &str) -> Option<String> {
    modal.data.components.iter()
        .flat_map(|row| row.components.iter())
        .find_map(|component| match component {
            ActionRowComponent::InputText(input) if input.custom_id == custom_id => Some(input.value.clone()),
            _ => None,
        })
}

fn option_str<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options.iter().find(|o| o.name == name)?.value.as_ref()?.as_str()
}

fn option_id(options: &[CommandDataOption], name: &str) -> Option<u64> {
    option_str(options, name)?.parse().ok()
}

fn option_int(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options.iter().find(|o| o.name == name)?.value.as_ref()?.as_i64()
}

fn option_text(options: &[CommandDataOption], name: &str) -> Option<String> {
    option_str(options, name).map(str::to_string)
}

/// Valeur de configuration saisie. Les champs texte gardent la saisie telle quelle, sauf
/// `null` qui efface. Les autres sont lus en JSON si possible.
fn config_value(key: &str, raw: &str) -> Value {
    if raw.trim() == "null" {
        return Value::Null;
    }
    if ConfigChange::is_text_key(key) {
        return Value::String(raw.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn register(command: &mut CreateApplicationCommand) -> &mut CreateApplicationCommand {
    command
        .name(COMMAND_NAME)
        .description("Gestion des tickets du serveur")
        .default_member_permissions(Permissions::MANAGE_GUILD)
        .dm_permission(false)
        .create_option(|o| o
            .name("config").description("Modifie la configuration du serveur").kind(CommandOptionType::SubCommand)
            .create_sub_option(|s| s.name("cle").description("Champ à modifier").kind(CommandOptionType::String).required(true))
            .create_sub_option(|s| s.name("valeur").description("Nouvelle valeur, null pour effacer").kind(CommandOptionType::String).required(true)))
        .create_option(|o| o
            .name("staff-add").description("Ajoute un rôle à l'équipe").kind(CommandOptionType::SubCommand)
            .create_sub_option(|s| s.name("role").description("Rôle de l'équipe").kind(CommandOptionType::Role).required(true)))
        .create_option(|o| o
            .name("staff-remove").description("Retire un rôle de l'équipe").kind(CommandOptionType::SubCommand)
            .create_sub_option(|s| s.name("role").description("Rôle de l'équipe").kind(CommandOptionType::Role).required(true)))
        .create_option(|o| o
            .name("category-add").description("Ajoute une catégorie de ticket").kind(CommandOptionType::SubCommand)
            .create_sub_option(|s| s.name("nom").description("Identifiant de la catégorie").kind(CommandOptionType::String).required(true))
            .create_sub_option(|s| s.name("libelle").description("Nom affiché dans le menu").kind(CommandOptionType::String).required(true))
            .create_sub_option(|s| s.name("description").description("Description affichée dans le menu").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("emoji").description("Emoji de la catégorie").kind(CommandOptionType::String)))
        .create_option(|o| o
            .name("category-edit").description("Modifie une catégorie de ticket").kind(CommandOptionType::SubCommand)
            .create_sub_option(|s| s.name("nom").description("Identifiant de la catégorie").kind(CommandOptionType::String).required(true))
            .create_sub_option(|s| s.name("nouveau-nom").description("Nouvel identifiant").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("libelle").description("Nom affiché dans le menu").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("description").description("Description affichée dans le menu").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("emoji").description("Emoji de la catégorie").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("ordre").description("Position dans le menu").kind(CommandOptionType::Integer)))
        .create_option(|o| o
            .name("category-remove").description("Supprime une catégorie de ticket").kind(CommandOptionType::SubCommand)
            .create_sub_option(|s| s.name("nom").description("Identifiant de la catégorie").kind(CommandOptionType::String).required(true)))
        .create_option(|o| o
            .name("panel").description("Publie un panel de création de tickets").kind(CommandOptionType::SubCommand)
            .create_sub_option(|s| s.name("titre").description("Titre du panel").kind(CommandOptionType::String).required(true))
            .create_sub_option(|s| s.name("salon").description("Salon du panel, celui-ci par défaut").kind(CommandOptionType::Channel))
            .create_sub_option(|s| s.name("categorie").description("Catégorie Discord des tickets").kind(CommandOptionType::Channel))
            .create_sub_option(|s| s.name("description").description("Texte du panel").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("couleur").description("Couleur #rrggbb").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("image").description("URL d'une image").kind(CommandOptionType::String)))
        .create_option(|o| o
            .name("panel-edit").description("Modifie le panel d'un salon").kind(CommandOptionType::SubCommand)
            .create_sub_option(|s| s.name("salon").description("Salon du panel").kind(CommandOptionType::Channel).required(true))
            .create_sub_option(|s| s.name("titre").description("Titre du panel").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("categorie").description("Catégorie Discord des tickets").kind(CommandOptionType::Channel))
            .create_sub_option(|s| s.name("description").description("Texte du panel").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("couleur").description("Couleur #rrggbb").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("image").description("URL d'une image").kind(CommandOptionType::String))
            .create_sub_option(|s| s.name("texte-menu").description("Texte affiché dans le menu vide").kind(CommandOptionType::String)))
        .create_option(|o| o
            .name("panel-remove").description("Supprime le panel d'un salon").kind(CommandOptionType::SubCommand)
            .create_sub_option(|s| s.name("salon").description("Salon du panel").kind(CommandOptionType::Channel).required(true)))
        .create_option(|o| o
            .name("orphans").description("Liste les salons de tickets sans ticket en base").kind(CommandOptionType::SubCommand))
        .create_option(|o| o
            .name("clear-tickets").description("Supprime tous les tickets du serveur").kind(CommandOptionType::SubCommand)
            .create_sub_option(|s| s.name("confirmation").description("Phrase de confirmation").kind(CommandOptionType::String).required(true)))
        .create_option(|o| o
            .name("clear-feedback").description("Supprime toutes les évaluations du serveur").kind(CommandOptionType::SubCommand))
}

/// Le composant de gestion des tickets
pub struct Tickets {
    engine: Arc<TicketEngine>,
    admin: TicketAdmin,
}

impl Tickets {
    pub fn new(engine: Arc<TicketEngine>) -> Self {
        Self { admin: TicketAdmin::new(engine.clone()), engine }
    }

    /// Message public posté dans le salon du ticket, sans bloquer l'opération
    async fn notify(&self, channel_id: u64, message: &OutgoingMessage) {
        if let Err(e) = self.engine.platform().send_message(channel_id, message).await {
            log_warn!("Message non posté dans le ticket {}: {}", channel_id, e);
        }
    }

    async fn on_component(&self, ctx: &Context, interaction: MessageComponentInteraction) {
        let custom_id = interaction.data.custom_id.as_str();
        let user_id = interaction.user.id.0;
        if let Some(panel_channel) = views::parse_panel_select(custom_id) {
            return self.on_panel_select(ctx, &interaction, panel_channel).await;
        }
        if let Some((ticket_id, value)) = rating::parse_rating_button(custom_id) {
            return Self::show_rating_modal(ctx, &interaction, ticket_id, value).await;
        }
        let (action, channel_id) = match TicketAction::parse(custom_id) {
            Some(parsed) => parsed,
            None => return,
        };
        if !self.engine.allow_interaction(user_id, action.name()) {
            return interaction.answer(ctx, false, TicketError::TooFast.to_string()).await;
        }
        match action {
            TicketAction::Claim => {
                let deferred = interaction.defer_reply(ctx).await;
                let result = self.engine.claim(channel_id, user_id).await;
                if matches!(result, Ok(ClaimOutcome::Claimed) | Ok(ClaimOutcome::TakenOver { .. })) {
                    self.notify(channel_id, &OutgoingMessage::text(format!("<@{}> prend en charge ce ticket.", user_id))).await;
                }
                let text = outcome(result, |o| match o {
                    ClaimOutcome::Claimed => "Vous avez pris en charge ce ticket.".to_string(),
                    ClaimOutcome::AlreadyClaimed => "Vous avez déjà pris en charge ce ticket.".to_string(),
                    ClaimOutcome::TakenOver { previous } => format!("Vous avez repris ce ticket à <@{}>.", previous),
                });
                interaction.answer(ctx, deferred, text).await;
            }
            TicketAction::Accept => {
                let deferred = interaction.defer_reply(ctx).await;
                let result = self.engine.accept(channel_id, user_id).await;
                if result.is_ok() {
                    self.notify(channel_id, &OutgoingMessage::text(format!("Ticket accepté par <@{}>.", user_id))).await;
                }
                let text = outcome(result, |accepted| match accepted.thread_id {
                    Some(thread) => format!("Ticket accepté, suivi dans <#{}>.", thread),
                    None => "Ticket accepté.".to_string(),
                });
                interaction.answer(ctx, deferred, text).await;
            }
            TicketAction::TransferMenu => self.show_transfer_menu(ctx, &interaction, channel_id).await,
            TicketAction::TransferSelect => {
                let target = interaction.data.values.first().and_then(|v| v.parse::<u64>().ok());
                let target = match target {
                    Some(target) => target,
                    None => return interaction.answer(ctx, false, "Aucun membre sélectionné.".to_string()).await,
                };
                let deferred = interaction.defer_reply(ctx).await;
                let result = self.engine.transfer(channel_id, user_id, target).await;
                if result.is_ok() {
                    self.notify(channel_id, &OutgoingMessage::text(format!("Ticket transféré à <@{}> par <@{}>.", target, user_id))).await;
                }
                let text = outcome(result, |_| format!("Ticket transféré à <@{}>.", target));
                interaction.answer(ctx, deferred, text).await;
            }
            TicketAction::Close => {
                let deferred = interaction.defer_reply(ctx).await;
                let result = self.engine.close(channel_id, user_id).await;
                if let Ok(closed) = &result {
                    self.notify(channel_id, &views::closed_message(user_id, channel_id, &closed.duration)).await;
                }
                let text = outcome(result, |closed| format!("Ticket #{} fermé.", closed.ticket.ticket_number));
                interaction.answer(ctx, deferred, text).await;
            }
            TicketAction::Delete => self.show_delete_modal(ctx, &interaction).await,
        }
    }

    async fn on_panel_select(&self, ctx: &Context, interaction: &MessageComponentInteraction, panel_channel: u64) {
        let guild_id = match interaction.guild_id {
            Some(guild_id) => guild_id.0,
            None => {
                log_error!("Le menu n'est pas dans un serveur");
                return;
            }
        };
        let selection = match interaction.data.values.first() {
            Some(value) => value.clone(),
            None => {
                log_error!("Aucun item n'a été sélectionné");
                return;
            }
        };
        let deferred = interaction.defer_reply(ctx).await;
        let request = CreateRequest {
            guild_id,
            user_id: interaction.user.id.0,
            username: interaction.user.name.clone(),
            panel_channel_id: panel_channel,
            selection,
        };
        let result = self.engine.create(request).await;
        if let Ok(created) = &result {
            self.notify(created.channel_id, &created.welcome).await;
        }
        let text = outcome(result, |created| format!("Ticket créé: <#{}>", created.channel_id));
        interaction.answer(ctx, deferred, text).await;
    }

    async fn show_transfer_menu(&self, ctx: &Context, interaction: &MessageComponentInteraction, channel_id: u64) {
        let guild_id = match interaction.guild_id {
            Some(guild_id) => guild_id.0,
            None => return,
        };
        let user_id = interaction.user.id.0;
        let candidates = match self.engine.is_staff(guild_id, user_id).await {
            Ok(true) => self.engine.staff_candidates(guild_id).await,
            Ok(false) => Err(TicketError::NotStaff),
            Err(e) => Err(e),
        };
        let candidates = match candidates {
            Ok(candidates) => candidates.into_iter().filter(|m| m.user_id != user_id).collect::<Vec<_>>(),
            Err(e) => return interaction.answer(ctx, false, outcome::<(), _>(Err(e), |_| String::new())).await,
        };
        if candidates.is_empty() {
            return interaction.answer(ctx, false, "Aucun autre membre de l'équipe disponible.".to_string()).await;
        }
        let rows = views::transfer_menu(channel_id, &candidates);
        if let Err(e) = interaction.create_interaction_response(&ctx.http, |resp| {
            resp.kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|data| {
                    data.content("À qui transférer ce ticket ?")
                        .ephemeral(true)
                        .components(|c| platform::build_components(c, &rows))
                })
        }).await {
            log_error!("Erreur lors de l'envoi du menu de transfert: {}", e);
        }
    }

    async fn show_delete_modal(&self, ctx: &Context, interaction: &MessageComponentInteraction) {
        let phrase = self.engine.options().delete_confirmation.clone();
        if let Err(e) = interaction.create_interaction_response(&ctx.http, |resp| {
            resp.kind(InteractionResponseType::Modal)
                .interaction_response_data(|data| {
                    data.custom_id(views::DELETE_MODAL_ID)
                        .title("Supprimer le ticket")
                        .components(|c| c.create_action_row(|row| row.create_input_text(|input| {
                            input.custom_id(views::DELETE_INPUT_ID)
                                .label(format!("Tapez {} pour confirmer", phrase))
                                .style(InputTextStyle::Short)
                                .required(true)
                        })))
                })
        }).await {
            log_error!("Erreur lors de l'ouverture du formulaire de suppression: {}", e);
        }
    }

    async fn show_rating_modal(ctx: &Context, interaction: &MessageComponentInteraction, ticket_id: i32, value: i32) {
        if let Err(e) = interaction.create_interaction_response(&ctx.http, |resp| {
            resp.kind(InteractionResponseType::Modal)
                .interaction_response_data(|data| {
                    data.custom_id(views::rating_modal_id(ticket_id, value))
                        .title(format!("Votre note: {}", rating::stars(value)))
                        .components(|c| c.create_action_row(|row| row.create_input_text(|input| {
                            input.custom_id(views::FEEDBACK_INPUT_ID)
                                .label("Un commentaire ? (facultatif)")
                                .style(InputTextStyle::Paragraph)
                                .required(false)
                        })))
                })
        }).await {
            log_error!("Erreur lors de l'ouverture du formulaire d'évaluation: {}", e);
        }
    }

    async fn on_modal(&self, ctx: &Context, modal: ModalSubmitInteraction) {
        let user_id = modal.user.id.0;
        let custom_id = modal.data.custom_id.as_str();
        if custom_id == views::DELETE_MODAL_ID {
            let confirmation = input_value(&modal, views::DELETE_INPUT_ID).unwrap_or_default();
            let deferred = modal.defer_reply(ctx).await;
            let result = self.engine.delete(modal.channel_id.0, user_id, &confirmation).await;
            let text = outcome(result, |report| format!(
                "Ticket #{} supprimé, transcription envoyée à {} membre(s).",
                report.ticket.ticket_number,
                report.delivered_to.len()
            ));
            modal.answer(ctx, deferred, text).await;
        } else if let Some((ticket_id, value)) = views::parse_rating_modal(custom_id) {
            let feedback = input_value(&modal, views::FEEDBACK_INPUT_ID);
            let deferred = modal.defer_reply(ctx).await;
            let text = match self.engine.ratings().submit_rating(ticket_id, user_id, value, feedback).await {
                Ok(_) => "Merci pour votre évaluation !".to_string(),
                Err(e) => {
                    log_warn!("Évaluation du ticket {} refusée: {}", ticket_id, e);
                    e.to_string()
                }
            };
            modal.answer(ctx, deferred, text).await;
        }
    }

    async fn on_command(&self, ctx: &Context, command: ApplicationCommandInteraction) {
        if command.data.name != COMMAND_NAME {
            return;
        }
        let guild_id = match command.guild_id {
            Some(guild_id) => guild_id.0,
            None => return,
        };
        let sub = match command.data.options.first() {
            Some(sub) => sub,
            None => return,
        };
        let actor = command.user.id.0;
        let options = sub.options.as_slice();
        let deferred = command.defer_reply(ctx).await;
        let text = match sub.name.as_str() {
            "config" => {
                let key = option_str(options, "cle").unwrap_or_default();
                let value = config_value(key, option_str(options, "valeur").unwrap_or_default());
                match ConfigChange::parse(key, &value) {
                    Ok(change) => outcome(
                        self.admin.update_config(actor, guild_id, vec![change]).await,
                        |_| format!("`{}` mis à jour.", key),
                    ),
                    Err(e) => e.to_string(),
                }
            }
            "staff-add" => match option_id(options, "role") {
                Some(role) => outcome(self.admin.add_staff_role(actor, guild_id, role).await, |added| match added {
                    true => format!("<@&{}> fait maintenant partie de l'équipe.", role),
                    false => format!("<@&{}> fait déjà partie de l'équipe.", role),
                }),
                None => "Rôle invalide.".to_string(),
            },
            "staff-remove" => match option_id(options, "role") {
                Some(role) => outcome(self.admin.remove_staff_role(actor, guild_id, role).await, |removed| match removed {
                    true => format!("<@&{}> ne fait plus partie de l'équipe.", role),
                    false => format!("<@&{}> ne faisait pas partie de l'équipe.", role),
                }),
                None => "Rôle invalide.".to_string(),
            },
            "category-add" => {
                let new = NewCategory {
                    name: option_str(options, "nom").unwrap_or_default().to_string(),
                    label: option_str(options, "libelle").unwrap_or_default().to_string(),
                    description: option_str(options, "description").map(str::to_string),
                    emoji: option_str(options, "emoji").map(str::to_string),
                };
                outcome(self.admin.create_category(actor, guild_id, new).await, |c| format!("Catégorie `{}` ajoutée.", c.name))
            }
            "category-edit" => {
                let name = option_str(options, "nom").unwrap_or_default().trim().to_lowercase();
                let changes = CategoryUpdate {
                    name: option_text(options, "nouveau-nom"),
                    label: option_text(options, "libelle"),
                    description: option_text(options, "description").map(Some),
                    emoji: option_text(options, "emoji").map(Some),
                    display_order: option_int(options, "ordre").and_then(|o| i32::try_from(o).ok()),
                };
                let result = match panel_ctrl::list_categories(&**self.engine.db(), to_db(guild_id)).await {
                    Ok(categories) => match categories.into_iter().find(|c| c.name == name) {
                        Some(category) => self.admin.update_category(actor, guild_id, category.id, changes).await,
                        None => Err(TicketError::CategoryNotFound),
                    },
                    Err(e) => Err(e.into()),
                };
                outcome(result, |c| format!("Catégorie `{}` modifiée.", c.name))
            }
            "category-remove" => {
                let name = option_str(options, "nom").unwrap_or_default().trim().to_lowercase();
                let result = match panel_ctrl::list_categories(&**self.engine.db(), to_db(guild_id)).await {
                    Ok(categories) => match categories.into_iter().find(|c| c.name == name) {
                        Some(category) => self.admin.delete_category(actor, guild_id, category.id).await,
                        None => Err(TicketError::CategoryNotFound),
                    },
                    Err(e) => Err(e.into()),
                };
                outcome(result, |_| format!("Catégorie `{}` supprimée.", name))
            }
            "panel" => {
                let request = PanelRequest {
                    guild_id,
                    channel_id: option_id(options, "salon").unwrap_or(command.channel_id.0),
                    title: option_str(options, "titre").unwrap_or_default().to_string(),
                    description: option_str(options, "description").map(str::to_string),
                    color: option_str(options, "couleur").map(str::to_string),
                    image_url: option_str(options, "image").map(str::to_string),
                    category_id: option_id(options, "categorie"),
                    placeholder: None,
                };
                outcome(self.admin.create_panel(actor, request).await, |p| format!("Panel publié dans <#{}>.", from_db(p.channel_id)))
            }
            "panel-edit" => {
                let channel = option_id(options, "salon").unwrap_or_default();
                let changes = PanelUpdate {
                    title: option_text(options, "titre"),
                    description: option_text(options, "description").map(Some),
                    color: option_text(options, "couleur").map(Some),
                    image_url: option_text(options, "image").map(Some),
                    category_id: option_id(options, "categorie").map(|id| Some(to_db(id))),
                    placeholder: option_text(options, "texte-menu").map(Some),
                };
                let result = match panel_ctrl::get_by_channel(&**self.engine.db(), to_db(channel)).await {
                    Ok(Some(panel)) => self.admin.update_panel(actor, guild_id, panel.id, changes).await,
                    Ok(None) => Err(TicketError::PanelNotFound),
                    Err(e) => Err(e.into()),
                };
                outcome(result, |p| format!("Panel de <#{}> modifié.", from_db(p.channel_id)))
            }
            "panel-remove" => {
                let channel = option_id(options, "salon").unwrap_or_default();
                let result = match panel_ctrl::get_by_channel(&**self.engine.db(), to_db(channel)).await {
                    Ok(Some(panel)) => self.admin.delete_panel(actor, guild_id, panel.id).await,
                    Ok(None) => Err(TicketError::PanelNotFound),
                    Err(e) => Err(e.into()),
                };
                outcome(result, |_| format!("Panel de <#{}> supprimé.", channel))
            }
            "orphans" => outcome(self.engine.find_orphan_channels(guild_id).await, |orphans| {
                if orphans.is_empty() {
                    "Aucun salon orphelin.".to_string()
                } else {
                    let list: Vec<String> = orphans.iter().map(|c| format!("<#{}>", c.id)).collect();
                    format!("Salons sans ticket: {}", list.join(", "))
                }
            }),
            "clear-tickets" => {
                let confirmation = option_str(options, "confirmation").unwrap_or_default();
                if confirmation.trim().to_lowercase() != self.engine.options().delete_confirmation.to_lowercase() {
                    TicketError::BadConfirmation.to_string()
                } else {
                    outcome(self.admin.clear_tickets(actor, guild_id).await, |r| format!("{} ticket(s) supprimé(s).", r.tickets))
                }
            }
            "clear-feedback" => outcome(self.admin.clear_feedback(actor, guild_id).await, |n| format!("{} évaluation(s) supprimée(s).", n)),
            other => {
                log_warn!("Sous-commande inconnue: {}", other);
                return;
            }
        };
        command.answer(ctx, deferred, text).await;
    }
}

#[async_trait]
impl EventHandler for Tickets {
    async fn ready(&self, ctx: Context, ready: Ready) {
        log_info!("{} est connecté sur {} serveur(s)", ready.user.name, ready.guilds.len());
        if let Err(e) = Command::set_global_application_commands(&ctx.http, |commands| {
            commands.create_application_command(register)
        }).await {
            log_error!("Impossible d'enregistrer la commande /{}: {}", COMMAND_NAME, e);
        }
        for guild in &ready.guilds {
            if let Err(e) = self.engine.find_orphan_channels(guild.id.0).await {
                log_warn!("Recherche des salons orphelins impossible sur {}: {}", guild.id, e);
            }
        }
    }

    async fn guild_member_addition(&self, _ctx: Context, member: Member) {
        if let Err(e) = self.engine.member_joined(member.guild_id.0, member.user.id.0, member.user.bot).await {
            log_error!("Arrivée de {} sur {} non traitée: {}", member.user.id, member.guild_id, e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::MessageComponent(component) => self.on_component(&ctx, component).await,
            Interaction::ModalSubmit(modal) => self.on_modal(&ctx, modal).await,
            Interaction::ApplicationCommand(command) => self.on_command(&ctx, command).await,
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_values() {
        assert_eq!(config_value("rating_enabled", "true"), Value::Bool(true));
        assert_eq!(config_value("rating_channel_id", "null"), Value::Null);
        assert_eq!(config_value("rating_channel_id", "123"), serde_json::json!(123));
        assert_eq!(config_value("welcome_message", "Bienvenue {user}"), Value::String("Bienvenue {user}".into()));
    }

    #[test]
    fn text_fields_keep_json_looking_input() {
        for raw in ["123", "true", "[1]"] {
            let value = config_value("welcome_message", raw);
            assert_eq!(value, Value::String(raw.to_string()));
            assert_eq!(
                ConfigChange::parse("welcome_message", &value).unwrap(),
                ConfigChange::WelcomeMessage(Some(raw.to_string()))
            );
        }
        assert_eq!(config_value("rating_embed_title", "null"), Value::Null);
    }

    /// L'accusé de réception passe par [`Reply`] et non par le `defer` de serenity,
    /// qui ne rend pas la réponse éphémère.
    #[test]
    fn interactions_defer_through_reply() {
        fn deferral<T: Reply + Sync>() -> for<'a> fn(&'a T, &'a Context) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
            |interaction, ctx| interaction.defer_reply(ctx)
        }
        let _ = deferral::<ApplicationCommandInteraction>();
        let _ = deferral::<MessageComponentInteraction>();
        let _ = deferral::<ModalSubmitInteraction>();
    }

    #[test]
    fn rejections_are_shown_without_logging() {
        let text = outcome::<(), _>(Err(TicketError::AlreadyOpen), |_| String::new());
        assert_eq!(text, TicketError::AlreadyOpen.to_string());
        assert_eq!(outcome(Ok(3), |n| n.to_string()), "3");
    }
}
