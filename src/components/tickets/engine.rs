//! Cycle de vie des tickets: création, prise en charge, acceptation, transfert, fermeture
//! et suppression.
//!
//! Chaque opération lit l'état du ticket en base avant de modifier la base puis le salon.
//! Une fois l'écriture en base validée, l'opération est considérée comme réussie: les effets
//! secondaires distants (rôles, fil privé, messages privés, renommage, suppression du salon)
//! sont tentés une fois et leurs échecs sont seulement journalisés.

use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use futures::future::join_all;
use sea_orm::DatabaseConnection;
use serde_json::json;
use serenity::model::permissions::Permissions;
use tokio::task::JoinHandle;

use crate::components::utils::RateLimiter;
use crate::config::TicketOptions;
use crate::db::{
    controller::{panel as panel_ctrl, ticket as ticket_ctrl},
    from_db, to_db,
    model::ticket::{self, category, TicketStatus},
    IDType,
};
use crate::{log_error, log_info, log_warn};
use super::{
    archive::{self, renderer_for, TranscriptHeader, TranscriptRenderer},
    audit::{AuditAction, AuditEntry, TicketAudit},
    error::{Result, TicketError},
    platform::{children_by_parent, Attachment, CategoryInfo, ChannelSummary, ChatPlatform, MemberInfo, OutgoingMessage, Overwrite, Principal},
    rating::RatingService,
    settings::GuildSettings,
    views,
};

/// Nombre de membres parcourus pour proposer un transfert
const MEMBER_SCAN_LIMIT: u64 = 1000;

fn creator_allow() -> Permissions {
    Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY | Permissions::ATTACH_FILES
}

fn staff_allow() -> Permissions {
    Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY
}

fn bot_allow() -> Permissions {
    creator_allow()
        | Permissions::EMBED_LINKS
        | Permissions::MANAGE_CHANNELS
        | Permissions::MANAGE_MESSAGES
        | Permissions::MANAGE_THREADS
}

/// Nom du salon d'un ticket: `<catégorie>-<pseudo>`
fn channel_name(prefix: &str, username: &str) -> String {
    let user: String = username
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(12)
        .collect();
    if user.is_empty() {
        format!("{}-ticket", prefix)
    } else {
        format!("{}-{}", prefix, user)
    }
}

/// Demande de création d'un ticket depuis le menu d'un panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub guild_id: u64,
    pub user_id: u64,
    pub username: String,
    /// Salon du panel dont le menu a été utilisé
    pub panel_channel_id: u64,
    /// Valeur de l'option choisie, `cat_<id>`
    pub selection: String,
}

#[derive(Debug, Clone)]
pub struct CreatedTicket {
    pub ticket: ticket::Model,
    pub channel_id: u64,
    /// Message d'accueil à poster dans le salon
    pub welcome: OutgoingMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// Le ticket était déjà pris en charge par ce membre
    AlreadyClaimed,
    /// Le ticket était pris en charge par un autre membre, remplacé
    TakenOver { previous: u64 },
}

#[derive(Debug, Clone)]
pub struct AcceptedTicket {
    pub ticket: ticket::Model,
    /// Fil privé de suivi, absent si sa création a échoué
    pub thread_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ClosedTicket {
    pub ticket: ticket::Model,
    pub duration: String,
    pub rating_requested: bool,
}

#[derive(Debug)]
pub struct DeleteReport {
    pub ticket: ticket::Model,
    pub transcript_id: i32,
    /// Utilisateurs ayant reçu la transcription
    pub delivered_to: Vec<u64>,
    /// Suppression différée du salon, `true` si elle a réussi
    pub cleanup: JoinHandle<bool>,
}

pub struct TicketEngine {
    db: Arc<DatabaseConnection>,
    settings: Arc<dyn GuildSettings>,
    platform: Arc<dyn ChatPlatform>,
    limiter: Arc<dyn RateLimiter>,
    renderer: Arc<dyn TranscriptRenderer>,
    ratings: Arc<RatingService>,
    audit: Arc<TicketAudit>,
    options: TicketOptions,
}

impl TicketEngine {
    pub fn new(
        db: Arc<DatabaseConnection>,
        settings: Arc<dyn GuildSettings>,
        platform: Arc<dyn ChatPlatform>,
        limiter: Arc<dyn RateLimiter>,
        options: TicketOptions,
    ) -> Self {
        let audit = Arc::new(TicketAudit::new(db.clone(), settings.clone(), platform.clone()));
        let ratings = Arc::new(RatingService::new(db.clone(), settings.clone(), platform.clone(), audit.clone()));
        Self {
            db,
            settings,
            platform,
            limiter,
            renderer: renderer_for(options.transcript_format),
            ratings,
            audit,
            options,
        }
    }
    pub fn db(&self) -> &Arc<DatabaseConnection> {
        &self.db
    }
    pub fn settings(&self) -> &Arc<dyn GuildSettings> {
        &self.settings
    }
    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }
    pub fn ratings(&self) -> &Arc<RatingService> {
        &self.ratings
    }
    pub fn audit(&self) -> &Arc<TicketAudit> {
        &self.audit
    }
    pub fn options(&self) -> &TicketOptions {
        &self.options
    }

    /// Limite les clics répétés d'un utilisateur sur une même action
    pub fn allow_interaction(&self, user_id: u64, action: &str) -> bool {
        self.limiter.try_acquire(&format!("{}:{}", user_id, action), self.options.interaction_debounce())
    }

    /// L'utilisateur est administrateur ou possède un rôle de l'équipe
    pub async fn is_staff(&self, guild_id: u64, user_id: u64) -> Result<bool> {
        let member = self.platform.member(guild_id, user_id).await?;
        if member.administrator {
            return Ok(true);
        }
        let staff_roles = self.settings.staff_roles(guild_id).await?;
        Ok(member.roles.iter().any(|r| staff_roles.contains(r)))
    }

    async fn require_staff(&self, guild_id: u64, user_id: u64) -> Result<()> {
        if self.is_staff(guild_id, user_id).await? {
            Ok(())
        } else {
            Err(TicketError::NotStaff)
        }
    }

    async fn load_ticket(&self, channel_id: u64) -> Result<ticket::Model> {
        ticket_ctrl::find_by_channel(&*self.db, to_db(channel_id)).await?
            .ok_or(TicketError::NotATicket)
    }

    async fn reload(&self, ticket: &ticket::Model) -> Result<ticket::Model> {
        ticket_ctrl::find_by_id(&*self.db, ticket.id).await?
            .ok_or(TicketError::NotATicket)
    }

    /// Catégorie Discord de destination: celle du panel, sinon celle par défaut
    async fn resolve_parent(&self, guild_id: u64, panel_parent: Option<IDType>) -> Result<CategoryInfo> {
        let candidates: Vec<u64> = panel_parent.map(from_db)
            .into_iter()
            .chain(self.options.categories.open)
            .collect();
        if candidates.is_empty() {
            return Err(TicketError::NoParentCategory);
        }
        for candidate in candidates {
            match self.platform.category_info(guild_id, candidate).await? {
                Some(info) => return Ok(info),
                None => log_warn!("Catégorie {} introuvable sur le serveur {}", candidate, guild_id),
            }
        }
        Err(TicketError::ParentCategoryInvalid)
    }

    fn ticket_overwrites(&self, guild_id: u64, user_id: u64, staff_roles: &[u64]) -> Vec<Overwrite> {
        let mut overwrites = vec![
            Overwrite::deny(Principal::Role(guild_id), Permissions::VIEW_CHANNEL),
            Overwrite::allow(Principal::Member(user_id), creator_allow()),
            Overwrite::allow(Principal::Member(self.platform.bot_id()), bot_allow()),
        ];
        overwrites.extend(staff_roles.iter().map(|role| Overwrite::allow(Principal::Role(*role), staff_allow())));
        overwrites
    }

    /// Ajoute puis retire un rôle à un membre. Les échecs sont journalisés.
    async fn swap_roles(&self, guild_id: u64, user_id: u64, grant: Option<IDType>, revoke: Option<IDType>, reason: &str) {
        let mut changes = Vec::new();
        if let Some(role) = grant.map(from_db) {
            match self.platform.add_role(guild_id, user_id, role).await {
                Ok(()) => changes.push(format!("+<@&{}>", role)),
                Err(e) => log_warn!("Rôle {} non attribué à {} sur {} ({}): {}", role, user_id, guild_id, reason, e),
            }
        }
        if let Some(role) = revoke.map(from_db) {
            match self.platform.remove_role(guild_id, user_id, role).await {
                Ok(()) => changes.push(format!("-<@&{}>", role)),
                Err(e) => log_warn!("Rôle {} non retiré à {} sur {} ({}): {}", role, user_id, guild_id, reason, e),
            }
        }
        if !changes.is_empty() {
            self.audit.record(
                AuditEntry::new(guild_id, AuditAction::MemberRolesChanged, self.platform.bot_id())
                    .details(json!({
                        "Membre": format!("<@{}>", user_id),
                        "Rôles": changes.join(" "),
                        "Raison": reason,
                    })),
            ).await;
        }
    }

    /// Arrivée d'un membre: journalisée, puis le rôle visiteur configuré lui est attribué.
    ///
    /// Retourne `true` si le rôle a été attribué. Un échec d'attribution est journalisé sans
    /// être remonté.
    pub async fn member_joined(&self, guild_id: u64, user_id: u64, bot: bool) -> Result<bool> {
        if bot {
            return Ok(false);
        }
        self.audit.record(
            AuditEntry::new(guild_id, AuditAction::MemberJoined, user_id)
                .details(json!({ "Membre": format!("<@{}>", user_id) })),
        ).await;
        let role = match self.settings.config(guild_id).await?.visitor_role_id.map(from_db) {
            Some(role) => role,
            None => return Ok(false),
        };
        match self.platform.add_role(guild_id, user_id, role).await {
            Ok(()) => {
                log_info!("Rôle visiteur {} attribué à {} sur {}", role, user_id, guild_id);
                Ok(true)
            }
            Err(e) => {
                log_warn!("Rôle visiteur {} non attribué à {} sur {}: {}", role, user_id, guild_id, e);
                Ok(false)
            }
        }
    }

    /// Crée un ticket depuis le menu d'un panel
    pub async fn create(&self, req: CreateRequest) -> Result<CreatedTicket> {
        let guild_db = to_db(req.guild_id);
        if !self.limiter.try_acquire(&format!("create:{}", req.user_id), self.options.creation_cooldown()) {
            return Err(TicketError::TooFast);
        }
        if ticket_ctrl::has_open_ticket(&*self.db, guild_db, to_db(req.user_id)).await? {
            return Err(TicketError::AlreadyOpen);
        }
        let panel = panel_ctrl::get_by_channel(&*self.db, to_db(req.panel_channel_id)).await?
            .filter(|p| p.guild_id == guild_db)
            .ok_or(TicketError::PanelNotFound)?;
        let category = match category::Model::parse_option_value(&req.selection) {
            Some(id) => panel_ctrl::find_category(&*self.db, id).await?.filter(|c| c.guild_id == guild_db),
            None => None,
        }.ok_or(TicketError::CategoryNotFound)?;
        let parent = self.resolve_parent(req.guild_id, panel.category_id).await?;
        if parent.channel_count >= self.options.category_capacity {
            return Err(TicketError::CategoryFull);
        }
        let permissions = self.platform.bot_permissions(req.guild_id).await?;
        if !permissions.contains(Permissions::MANAGE_CHANNELS | Permissions::MANAGE_ROLES) {
            return Err(TicketError::BotMissingPermissions);
        }

        let staff_roles = self.settings.staff_roles(req.guild_id).await?;
        let overwrites = self.ticket_overwrites(req.guild_id, req.user_id, &staff_roles);
        let name = channel_name(&category.name, &req.username);
        let channel_id = self.platform.create_channel(req.guild_id, parent.id, &name, &overwrites).await?;

        let new = ticket_ctrl::NewTicket {
            guild_id: guild_db,
            channel_id: to_db(channel_id),
            user_id: to_db(req.user_id),
            panel_id: Some(panel.id),
            category_id: Some(to_db(parent.id)),
            ticket_category_id: Some(category.id),
        };
        let ticket = match ticket_ctrl::create(&*self.db, new).await {
            Ok(ticket) => ticket,
            Err(e) => return Err(self.recover_failed_insert(&req, channel_id, e).await),
        };
        log_info!(
            "Ticket #{} ouvert par {} sur le serveur {} (salon {})",
            ticket.ticket_number, req.user_id, req.guild_id, channel_id
        );

        let template = match self.settings.config(req.guild_id).await {
            Ok(config) => {
                self.swap_roles(req.guild_id, req.user_id, config.client_role_id, config.visitor_role_id, "ticket ouvert").await;
                config.welcome_message
            }
            Err(e) => {
                log_warn!("Configuration du serveur {} illisible après la création du ticket {}: {}", req.guild_id, ticket.id, e);
                None
            }
        };
        self.audit.record(
            AuditEntry::new(req.guild_id, AuditAction::TicketCreated, req.user_id)
                .ticket(ticket.id)
                .details(json!({
                    "Ticket": format!("#{}", ticket.ticket_number),
                    "Salon": format!("<#{}>", channel_id),
                    "Catégorie": category.label,
                })),
        ).await;
        let welcome = views::welcome_message(template.as_deref(), &ticket, &category, &staff_roles);
        Ok(CreatedTicket { ticket, channel_id, welcome })
    }

    /// Le salon existe mais le ticket n'a pas été enregistré.
    ///
    /// Si un ticket ouvert a été enregistré entre-temps pour le même utilisateur, le salon
    /// créé en trop est supprimé. Sinon il reste en place pour être rapproché manuellement.
    async fn recover_failed_insert(&self, req: &CreateRequest, channel_id: u64, err: crate::db::controller::Error) -> TicketError {
        if let Ok(true) = ticket_ctrl::has_open_ticket(&*self.db, to_db(req.guild_id), to_db(req.user_id)).await {
            if let Err(e) = self.platform.delete_channel(channel_id).await {
                log_error!("Salon orphelin {} du serveur {} non supprimé: {}", channel_id, req.guild_id, e);
            }
            return TicketError::AlreadyOpen;
        }
        log_error!(
            "Salon orphelin {} créé pour {} sur le serveur {}: ticket non enregistré: {}",
            channel_id, req.user_id, req.guild_id, err
        );
        TicketError::Orphaned { channel: channel_id }
    }

    async fn mark_claimed_name(&self, channel_id: u64) {
        let channel = match self.platform.fetch_channel(channel_id).await {
            Ok(channel) => channel,
            Err(e) => {
                log_warn!("Salon {} introuvable pour le renommage: {}", channel_id, e);
                return;
            }
        };
        if channel.name.ends_with("-claimed") {
            return;
        }
        if let Err(e) = self.platform.rename_channel(channel_id, &format!("{}-claimed", channel.name)).await {
            log_warn!("Salon {} non renommé après sa prise en charge: {}", channel_id, e);
        }
    }

    /// Prise en charge d'un ticket. Le dernier membre à le prendre en charge l'emporte.
    pub async fn claim(&self, channel_id: u64, staff_id: u64) -> Result<ClaimOutcome> {
        let ticket = self.load_ticket(channel_id).await?;
        let guild_id = from_db(ticket.guild_id);
        self.require_staff(guild_id, staff_id).await?;
        if ticket.status != TicketStatus::Open {
            return Err(TicketError::TicketNotOpen);
        }
        let outcome = match ticket.claimed_by.map(from_db) {
            Some(current) if current == staff_id => return Ok(ClaimOutcome::AlreadyClaimed),
            Some(previous) => ClaimOutcome::TakenOver { previous },
            None => ClaimOutcome::Claimed,
        };
        ticket_ctrl::set_claimed_by(&*self.db, ticket.id, to_db(staff_id)).await?;
        self.mark_claimed_name(channel_id).await;
        self.audit.record(
            AuditEntry::new(guild_id, AuditAction::TicketClaimed, staff_id)
                .ticket(ticket.id)
                .details(json!({ "Ticket": format!("#{}", ticket.ticket_number) })),
        ).await;
        Ok(outcome)
    }

    /// Acceptation d'un ticket: prise en charge, déplacement dans la catégorie des tickets
    /// acceptés et ouverture d'un fil privé de suivi.
    pub async fn accept(&self, channel_id: u64, staff_id: u64) -> Result<AcceptedTicket> {
        let ticket = self.load_ticket(channel_id).await?;
        let guild_id = from_db(ticket.guild_id);
        let creator = from_db(ticket.user_id);
        self.require_staff(guild_id, staff_id).await?;
        if ticket.status != TicketStatus::Open {
            return Err(TicketError::TicketNotOpen);
        }
        ticket_ctrl::set_claimed_by(&*self.db, ticket.id, to_db(staff_id)).await?;

        if let Some(accepted) = self.options.categories.accepted {
            match self.platform.set_channel_parent(channel_id, accepted, true).await {
                Ok(()) => {
                    // La synchronisation retire les permissions propres au créateur
                    let creator_overwrite = Overwrite::allow(Principal::Member(creator), creator_allow());
                    if let Err(e) = self.platform.set_permission_overwrite(channel_id, &creator_overwrite).await {
                        log_error!("Accès de {} au ticket {} non rétabli après déplacement: {}", creator, channel_id, e);
                    }
                    if let Err(e) = ticket_ctrl::set_category(&*self.db, ticket.id, Some(to_db(accepted))).await {
                        log_warn!("Catégorie du ticket {} non mise à jour: {}", ticket.id, e);
                    }
                }
                Err(e) => log_warn!("Ticket {} non déplacé dans la catégorie {}: {}", channel_id, accepted, e),
            }
        }

        match self.settings.config(guild_id).await {
            Ok(config) if config.active_client_role_id.is_some() => {
                self.swap_roles(guild_id, creator, config.active_client_role_id, config.client_role_id, "ticket accepté").await;
            }
            Ok(_) => (),
            Err(e) => log_warn!("Rôles non mis à jour pour le ticket {}: {}", ticket.id, e),
        }

        let thread_name = format!("suivi-{}", ticket.ticket_number);
        let thread_id = match self.platform.create_private_thread(channel_id, &thread_name, &[creator, staff_id]).await {
            Ok(thread) => Some(thread),
            Err(e) => {
                log_warn!("Fil privé du ticket {} non créé: {}", channel_id, e);
                None
            }
        };
        self.audit.record(
            AuditEntry::new(guild_id, AuditAction::TicketAccepted, staff_id)
                .ticket(ticket.id)
                .details(json!({ "Ticket": format!("#{}", ticket.ticket_number) })),
        ).await;
        Ok(AcceptedTicket { ticket: self.reload(&ticket).await?, thread_id })
    }

    /// Confie le ticket à un autre membre, quel que soit le responsable actuel
    pub async fn transfer(&self, channel_id: u64, from_staff: u64, to_staff: u64) -> Result<ticket::Model> {
        let ticket = self.load_ticket(channel_id).await?;
        let guild_id = from_db(ticket.guild_id);
        self.require_staff(guild_id, from_staff).await?;
        if ticket.status == TicketStatus::Deleted {
            return Err(TicketError::AlreadyDeleted);
        }
        ticket_ctrl::set_claimed_by(&*self.db, ticket.id, to_db(to_staff)).await?;
        self.audit.record(
            AuditEntry::new(guild_id, AuditAction::TicketTransferred, from_staff)
                .ticket(ticket.id)
                .details(json!({
                    "Ticket": format!("#{}", ticket.ticket_number),
                    "Vers": format!("<@{}>", to_staff),
                })),
        ).await;
        self.reload(&ticket).await
    }

    /// Membres de l'équipe pouvant recevoir un ticket
    pub async fn staff_candidates(&self, guild_id: u64) -> Result<Vec<MemberInfo>> {
        let staff_roles = self.settings.staff_roles(guild_id).await?;
        let members = self.platform.list_members(guild_id, MEMBER_SCAN_LIMIT).await?;
        Ok(members.into_iter()
            .filter(|m| !m.bot && (m.administrator || m.roles.iter().any(|r| staff_roles.contains(r))))
            .take(views::SELECT_MAX_OPTIONS)
            .collect())
    }

    /// Ferme un ticket. Le créateur du ticket peut fermer son propre ticket.
    pub async fn close(&self, channel_id: u64, closer_id: u64) -> Result<ClosedTicket> {
        let ticket = self.load_ticket(channel_id).await?;
        let guild_id = from_db(ticket.guild_id);
        let creator = from_db(ticket.user_id);
        if closer_id != creator && !self.is_staff(guild_id, closer_id).await? {
            return Err(TicketError::NotAllowedToClose);
        }
        match ticket.status {
            TicketStatus::Open => (),
            TicketStatus::Closed => return Err(TicketError::AlreadyClosed),
            TicketStatus::Deleted => return Err(TicketError::AlreadyDeleted),
        }
        if !ticket_ctrl::close_if_open(&*self.db, ticket.id).await? {
            return Err(TicketError::AlreadyClosed);
        }
        let ticket = self.reload(&ticket).await?;
        let closed_at = ticket.closed_at.unwrap_or_else(Utc::now);
        let duration = views::format_duration(closed_at - ticket.created_at);
        log_info!("Ticket #{} du serveur {} fermé par {} après {}", ticket.ticket_number, guild_id, closer_id, duration);

        let read_only = Overwrite {
            target: Principal::Member(creator),
            allow: Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY,
            deny: Permissions::SEND_MESSAGES,
        };
        if let Err(e) = self.platform.set_permission_overwrite(channel_id, &read_only).await {
            log_warn!("Écriture non retirée à {} dans le ticket {}: {}", creator, channel_id, e);
        }
        if let Err(e) = self.platform.rename_channel(channel_id, &format!("closed-{}", ticket.ticket_number)).await {
            log_warn!("Ticket {} non renommé à la fermeture: {}", channel_id, e);
        }
        if let Some(closed) = self.options.categories.closed {
            match self.platform.set_channel_parent(channel_id, closed, false).await {
                Ok(()) => {
                    if let Err(e) = ticket_ctrl::set_category(&*self.db, ticket.id, Some(to_db(closed))).await {
                        log_warn!("Catégorie du ticket {} non mise à jour: {}", ticket.id, e);
                    }
                }
                Err(e) => log_warn!("Ticket {} non déplacé dans la catégorie {}: {}", channel_id, closed, e),
            }
        }

        let rating_requested = self.ratings.request_rating(creator, &ticket).await;
        match self.settings.config(guild_id).await {
            Ok(config) if config.active_client_role_id.is_some() => {
                self.swap_roles(guild_id, creator, config.client_role_id, config.active_client_role_id, "ticket fermé").await;
            }
            Ok(_) => (),
            Err(e) => log_warn!("Rôles non mis à jour pour le ticket {}: {}", ticket.id, e),
        }
        self.audit.record(
            AuditEntry::new(guild_id, AuditAction::TicketClosed, closer_id)
                .ticket(ticket.id)
                .details(json!({
                    "Ticket": format!("#{}", ticket.ticket_number),
                    "Durée": duration,
                })),
        ).await;
        Ok(ClosedTicket { ticket, duration, rating_requested })
    }

    /// Supprime un ticket après confirmation: transcription archivée avec le passage à l'état
    /// supprimé, envoi aux intéressés puis suppression différée du salon.
    pub async fn delete(&self, channel_id: u64, deleter_id: u64, confirmation: &str) -> Result<DeleteReport> {
        if confirmation.trim().to_lowercase() != self.options.delete_confirmation.to_lowercase() {
            return Err(TicketError::BadConfirmation);
        }
        let ticket = self.load_ticket(channel_id).await?;
        if ticket.status == TicketStatus::Deleted {
            return Err(TicketError::AlreadyDeleted);
        }
        let guild_id = from_db(ticket.guild_id);
        let creator = from_db(ticket.user_id);
        let header = TranscriptHeader {
            guild_id,
            channel_id,
            ticket_number: ticket.ticket_number,
            creator_id: creator,
            generated_by: deleter_id,
            generated_at: Utc::now(),
        };
        let history = archive::fetch_history(&*self.platform, channel_id).await
            .map_err(|e| TicketError::Transcript(e.to_string()))?;
        let content = self.renderer.render(&header, &history);
        // Un seul appel peut passer le ticket à l'état supprimé
        let transcript_id = ticket_ctrl::delete_with_transcript(
            &*self.db,
            &ticket,
            to_db(deleter_id),
            content.clone(),
            self.renderer.format(),
        ).await?.ok_or(TicketError::AlreadyDeleted)?;

        let attachment = Attachment { filename: self.renderer.filename(&header), data: content.into_bytes() };
        let mut recipients = vec![(deleter_id, format!("Transcription du ticket #{} supprimé.", ticket.ticket_number))];
        if creator != deleter_id {
            recipients.push((creator, format!("Votre ticket #{} est terminé et a été supprimé. Voici sa transcription.", ticket.ticket_number)));
        }
        let deliveries = recipients.into_iter().map(|(user, text)| {
            let message = OutgoingMessage {
                content: Some(text),
                attachment: Some(attachment.clone()),
                ..Default::default()
            };
            async move { (user, self.platform.send_direct_message(user, &message).await) }
        });
        let mut delivered_to = Vec::new();
        for (user, result) in join_all(deliveries).await {
            match result {
                Ok(_) => delivered_to.push(user),
                Err(e) => log_warn!("Transcription du ticket {} non envoyée à {}: {}", ticket.id, user, e),
            }
        }

        log_info!("Ticket #{} du serveur {} supprimé par {}", ticket.ticket_number, guild_id, deleter_id);
        self.audit.record(
            AuditEntry::new(guild_id, AuditAction::TicketDeleted, deleter_id)
                .ticket(ticket.id)
                .details(json!({
                    "Ticket": format!("#{}", ticket.ticket_number),
                    "Créateur": format!("<@{}>", creator),
                    "Transcription": transcript_id,
                })),
        ).await;
        let cleanup = self.schedule_channel_removal(channel_id);
        Ok(DeleteReport { ticket: self.reload(&ticket).await?, transcript_id, delivered_to, cleanup })
    }

    fn schedule_channel_removal(&self, channel_id: u64) -> JoinHandle<bool> {
        let platform = self.platform.clone();
        let delay = self.options.delete_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match platform.delete_channel(channel_id).await {
                Ok(()) => true,
                Err(e) => {
                    log_error!("Salon {} d'un ticket supprimé non retiré: {}", channel_id, e);
                    false
                }
            }
        })
    }

    /// Salons rangés dans les catégories de tickets sans ticket correspondant en base
    pub async fn find_orphan_channels(&self, guild_id: u64) -> Result<Vec<ChannelSummary>> {
        let guild_db = to_db(guild_id);
        let panels = panel_ctrl::list_panels(&*self.db, guild_db).await?;
        let mut parents: HashSet<u64> = panels.iter().filter_map(|p| p.category_id.map(from_db)).collect();
        let fallbacks = &self.options.categories;
        parents.extend([fallbacks.open, fallbacks.accepted, fallbacks.closed].into_iter().flatten());
        let panel_channels: HashSet<u64> = panels.iter().map(|p| from_db(p.channel_id)).collect();
        let known: HashSet<u64> = ticket_ctrl::list_active(&*self.db, guild_db).await?
            .iter()
            .map(|t| from_db(t.channel_id))
            .collect();

        let channels = self.platform.list_channels(guild_id).await?;
        let grouped = children_by_parent(&channels);
        let mut orphans: Vec<ChannelSummary> = parents.iter()
            .filter_map(|parent| grouped.get(parent))
            .flatten()
            .filter(|c| !c.is_category && !known.contains(&c.id) && !panel_channels.contains(&c.id))
            .map(|c| (*c).clone())
            .collect();
        orphans.sort_by_key(|c| c.id);
        for orphan in &orphans {
            log_warn!("Salon {} ({}) du serveur {} sans ticket en base", orphan.id, orphan.name, guild_id);
        }
        Ok(orphans)
    }
}
