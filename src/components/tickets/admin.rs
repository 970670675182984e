//! Administration des tickets: panels, catégories, configuration, équipe et purges.
//!
//! Toute modification des catégories republie les panels du serveur pour que leur menu
//! reste à jour.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::db::{
    controller::{
        guild::ConfigChange,
        management::{self, PurgeReport},
        panel::{self as panel_ctrl, CategoryUpdate, NewCategory, NewPanel, PanelUpdate},
        ticket as ticket_ctrl,
    },
    from_db, to_db,
    model::{guild, ticket::{category, panel}},
};
use crate::{log_info, log_warn};
use super::{
    audit::{AuditAction, AuditEntry},
    engine::TicketEngine,
    error::{Result, TicketError},
    platform::PlatformError,
    views,
};

/// Nombre de messages supprimés dans le salon des évaluations lors d'une purge
const FEEDBACK_SWEEP: u8 = 100;

/// Contenu d'un nouveau panel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelRequest {
    pub guild_id: u64,
    pub channel_id: u64,
    pub title: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub image_url: Option<String>,
    /// Catégorie Discord des tickets de ce panel
    pub category_id: Option<u64>,
    pub placeholder: Option<String>,
}

pub struct TicketAdmin {
    engine: Arc<TicketEngine>,
}

impl TicketAdmin {
    pub fn new(engine: Arc<TicketEngine>) -> Self {
        Self { engine }
    }

    async fn record(&self, entry: AuditEntry) {
        self.engine.audit().record(entry).await;
    }

    async fn guild_category(&self, guild_id: u64, category_id: i32) -> Result<category::Model> {
        panel_ctrl::find_category(&**self.engine.db(), category_id).await?
            .filter(|c| c.guild_id == to_db(guild_id))
            .ok_or(TicketError::CategoryNotFound)
    }

    async fn guild_panel(&self, guild_id: u64, panel_id: i32) -> Result<panel::Model> {
        panel_ctrl::find_panel(&**self.engine.db(), panel_id).await?
            .filter(|p| p.guild_id == to_db(guild_id))
            .ok_or(TicketError::PanelNotFound)
    }

    /// Refuse un nom déjà porté par une autre catégorie du serveur
    async fn check_category_name(&self, guild_id: u64, name: &str, except: Option<i32>) -> Result<()> {
        let name = name.trim().to_lowercase();
        let categories = panel_ctrl::list_categories(&**self.engine.db(), to_db(guild_id)).await?;
        if categories.iter().any(|c| c.name == name && Some(c.id) != except) {
            return Err(TicketError::CategoryExists);
        }
        Ok(())
    }

    /// Publie le panel dans son salon et l'enregistre
    pub async fn create_panel(&self, actor: u64, req: PanelRequest) -> Result<panel::Model> {
        let db = &**self.engine.db();
        let platform = self.engine.platform();
        let categories = panel_ctrl::list_categories(db, to_db(req.guild_id)).await?;
        if categories.is_empty() {
            return Err(TicketError::NoCategories);
        }
        if panel_ctrl::get_by_channel(db, to_db(req.channel_id)).await?.is_some() {
            return Err(TicketError::PanelExists);
        }
        let now = Utc::now();
        let draft = panel::Model {
            id: 0,
            guild_id: to_db(req.guild_id),
            channel_id: to_db(req.channel_id),
            message_id: 0,
            title: req.title.clone(),
            description: req.description.clone(),
            color: req.color.clone(),
            image_url: req.image_url.clone(),
            category_id: req.category_id.map(to_db),
            placeholder: req.placeholder.clone(),
            created_at: now,
            updated_at: now,
        };
        let message_id = platform.send_message(req.channel_id, &views::panel_message(&draft, &categories)).await?;
        let new = NewPanel {
            guild_id: draft.guild_id,
            channel_id: draft.channel_id,
            message_id: to_db(message_id),
            title: req.title,
            description: req.description,
            color: req.color,
            image_url: req.image_url,
            category_id: draft.category_id,
            placeholder: req.placeholder,
        };
        let panel = match panel_ctrl::create_panel(db, new).await {
            Ok(panel) => panel,
            Err(e) => {
                if let Err(e) = platform.delete_message(req.channel_id, message_id).await {
                    log_warn!("Message {} d'un panel non enregistré laissé dans {}: {}", message_id, req.channel_id, e);
                }
                return Err(e.into());
            }
        };
        self.record(
            AuditEntry::new(req.guild_id, AuditAction::PanelCreated, actor)
                .details(json!({ "Panel": panel.title, "Salon": format!("<#{}>", req.channel_id) })),
        ).await;
        Ok(panel)
    }

    /// Met à jour le message d'un panel. Un message disparu est republié.
    async fn publish_panel(&self, panel: &panel::Model, categories: &[category::Model]) -> Result<()> {
        let platform = self.engine.platform();
        let channel_id = from_db(panel.channel_id);
        let message = views::panel_message(panel, categories);
        match platform.edit_message(channel_id, from_db(panel.message_id), &message).await {
            Ok(()) => Ok(()),
            Err(PlatformError::NotFound) => {
                let message_id = platform.send_message(channel_id, &message).await?;
                panel_ctrl::set_message(&**self.engine.db(), panel.id, to_db(message_id)).await?;
                log_info!("Panel {} republié dans le salon {}", panel.id, channel_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Republie tous les panels du serveur et retourne le nombre de panels à jour
    pub async fn sync_panels(&self, guild_id: u64) -> Result<usize> {
        let db = &**self.engine.db();
        let categories = panel_ctrl::list_categories(db, to_db(guild_id)).await?;
        let mut synced = 0;
        for panel in panel_ctrl::list_panels(db, to_db(guild_id)).await? {
            match self.publish_panel(&panel, &categories).await {
                Ok(()) => synced += 1,
                Err(e) => log_warn!("Panel {} du serveur {} non mis à jour: {}", panel.id, guild_id, e),
            }
        }
        Ok(synced)
    }

    pub async fn update_panel(&self, actor: u64, guild_id: u64, panel_id: i32, changes: PanelUpdate) -> Result<panel::Model> {
        let db = &**self.engine.db();
        self.guild_panel(guild_id, panel_id).await?;
        let panel = panel_ctrl::update_panel(db, panel_id, changes).await?;
        let categories = panel_ctrl::list_categories(db, to_db(guild_id)).await?;
        self.publish_panel(&panel, &categories).await?;
        self.record(
            AuditEntry::new(guild_id, AuditAction::PanelUpdated, actor)
                .details(json!({ "Panel": panel.title })),
        ).await;
        panel_ctrl::find_panel(db, panel_id).await?.ok_or(TicketError::PanelNotFound)
    }

    /// Supprime le panel puis son message
    pub async fn delete_panel(&self, actor: u64, guild_id: u64, panel_id: i32) -> Result<()> {
        let panel = self.guild_panel(guild_id, panel_id).await?;
        if !panel_ctrl::delete_panel(&**self.engine.db(), panel_id).await? {
            return Err(TicketError::PanelNotFound);
        }
        let channel_id = from_db(panel.channel_id);
        if let Err(e) = self.engine.platform().delete_message(channel_id, from_db(panel.message_id)).await {
            log_warn!("Message du panel {} non supprimé dans {}: {}", panel.id, channel_id, e);
        }
        self.record(
            AuditEntry::new(guild_id, AuditAction::PanelDeleted, actor)
                .details(json!({ "Panel": panel.title, "Salon": format!("<#{}>", channel_id) })),
        ).await;
        Ok(())
    }

    pub async fn create_category(&self, actor: u64, guild_id: u64, new: NewCategory) -> Result<category::Model> {
        self.check_category_name(guild_id, &new.name, None).await?;
        let category = panel_ctrl::create_category(&**self.engine.db(), to_db(guild_id), new).await?;
        self.sync_panels(guild_id).await?;
        self.record(
            AuditEntry::new(guild_id, AuditAction::CategoryCreated, actor)
                .details(json!({ "Catégorie": category.label, "Nom": category.name })),
        ).await;
        Ok(category)
    }

    pub async fn update_category(&self, actor: u64, guild_id: u64, category_id: i32, changes: CategoryUpdate) -> Result<category::Model> {
        self.guild_category(guild_id, category_id).await?;
        if let Some(name) = &changes.name {
            self.check_category_name(guild_id, name, Some(category_id)).await?;
        }
        let category = panel_ctrl::update_category(&**self.engine.db(), category_id, changes).await?;
        self.sync_panels(guild_id).await?;
        self.record(
            AuditEntry::new(guild_id, AuditAction::CategoryUpdated, actor)
                .details(json!({ "Catégorie": category.label, "Nom": category.name })),
        ).await;
        Ok(category)
    }

    pub async fn delete_category(&self, actor: u64, guild_id: u64, category_id: i32) -> Result<()> {
        let category = self.guild_category(guild_id, category_id).await?;
        if !panel_ctrl::delete_category(&**self.engine.db(), category_id).await? {
            return Err(TicketError::CategoryNotFound);
        }
        self.sync_panels(guild_id).await?;
        self.record(
            AuditEntry::new(guild_id, AuditAction::CategoryDeleted, actor)
                .details(json!({ "Catégorie": category.label, "Nom": category.name })),
        ).await;
        Ok(())
    }

    pub async fn update_config(&self, actor: u64, guild_id: u64, changes: Vec<ConfigChange>) -> Result<guild::Model> {
        let keys: Vec<&str> = changes.iter().map(|c| c.key()).collect();
        let details = json!({ "Champs": keys.join(", ") });
        let config = self.engine.settings().update_config(guild_id, changes).await?;
        self.record(AuditEntry::new(guild_id, AuditAction::ConfigUpdated, actor).details(details)).await;
        Ok(config)
    }

    /// Retourne `false` si le rôle faisait déjà partie de l'équipe
    pub async fn add_staff_role(&self, actor: u64, guild_id: u64, role_id: u64) -> Result<bool> {
        let added = self.engine.settings().add_staff_role(guild_id, role_id).await?;
        if added {
            self.record(
                AuditEntry::new(guild_id, AuditAction::StaffRoleAdded, actor)
                    .details(json!({ "Rôle": format!("<@&{}>", role_id) })),
            ).await;
        }
        Ok(added)
    }

    pub async fn remove_staff_role(&self, actor: u64, guild_id: u64, role_id: u64) -> Result<bool> {
        let removed = self.engine.settings().remove_staff_role(guild_id, role_id).await?;
        if removed {
            self.record(
                AuditEntry::new(guild_id, AuditAction::StaffRoleRemoved, actor)
                    .details(json!({ "Rôle": format!("<@&{}>", role_id) })),
            ).await;
        }
        Ok(removed)
    }

    /// Supprime les salons des tickets actifs puis efface tous les tickets du serveur.
    ///
    /// Le compteur de tickets n'est pas remis à zéro.
    pub async fn clear_tickets(&self, actor: u64, guild_id: u64) -> Result<PurgeReport> {
        let db = &**self.engine.db();
        for ticket in ticket_ctrl::list_active(db, to_db(guild_id)).await? {
            let channel_id = from_db(ticket.channel_id);
            if let Err(e) = self.engine.platform().delete_channel(channel_id).await {
                log_warn!("Salon {} du ticket {} non supprimé lors de la purge: {}", channel_id, ticket.id, e);
            }
        }
        let report = management::purge_tickets(db, to_db(guild_id)).await?;
        log_info!("Tickets du serveur {} purgés par {}: {:?}", guild_id, actor, report);
        self.record(
            AuditEntry::new(guild_id, AuditAction::TicketsCleared, actor)
                .details(json!({
                    "Tickets": report.tickets,
                    "Transcriptions": report.transcripts,
                    "Journaux": report.logs,
                    "Évaluations": report.ratings,
                })),
        ).await;
        Ok(report)
    }

    /// Vide le salon des évaluations et supprime les évaluations du serveur
    pub async fn clear_feedback(&self, actor: u64, guild_id: u64) -> Result<u64> {
        let config = self.engine.settings().config(guild_id).await?;
        if let Some(channel_id) = config.rating_channel_id.map(from_db) {
            let platform = self.engine.platform();
            match platform.fetch_message_history(channel_id, None, FEEDBACK_SWEEP).await {
                Ok(messages) => {
                    for message in messages {
                        if let Err(e) = platform.delete_message(channel_id, message.id).await {
                            log_warn!("Évaluation {} non supprimée du salon {}: {}", message.id, channel_id, e);
                        }
                    }
                }
                Err(e) => log_warn!("Salon des évaluations {} illisible: {}", channel_id, e),
            }
        }
        let removed = management::purge_ratings(&**self.engine.db(), to_db(guild_id)).await?;
        self.record(
            AuditEntry::new(guild_id, AuditAction::FeedbackCleared, actor)
                .details(json!({ "Évaluations": removed })),
        ).await;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::controller::ticket as ticket_ctrl;
    use super::super::testing::*;

    fn request(channel_id: u64) -> PanelRequest {
        PanelRequest {
            guild_id: GUILD,
            channel_id,
            title: "Boutique".to_string(),
            category_id: Some(PARENT),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn panel_needs_categories() {
        let fx = Fixture::new().await;
        let admin = TicketAdmin::new(fx.engine.clone());
        let err = admin.create_panel(STAFF, PanelRequest { guild_id: 2, ..request(42) }).await.unwrap_err();
        assert!(matches!(err, TicketError::NoCategories));
        assert!(fx.platform.messages_in(42).is_empty());
    }

    #[tokio::test]
    async fn panel_is_published_then_stored() {
        let fx = Fixture::new().await;
        let admin = TicketAdmin::new(fx.engine.clone());
        let panel = admin.create_panel(STAFF, request(42)).await.unwrap();
        let message = fx.platform.message(from_db(panel.message_id)).unwrap();
        assert_eq!(message.rows.len(), 1);
        assert!(matches!(
            admin.create_panel(STAFF, request(42)).await.unwrap_err(),
            TicketError::PanelExists
        ));
    }

    #[tokio::test]
    async fn category_changes_refresh_panels() {
        let fx = Fixture::new().await;
        let admin = TicketAdmin::new(fx.engine.clone());
        let panel = admin.create_panel(STAFF, request(42)).await.unwrap();
        admin.create_category(STAFF, GUILD, NewCategory {
            name: "Achat".to_string(),
            label: "Achat".to_string(),
            ..Default::default()
        }).await.unwrap();
        let message = fx.platform.message(from_db(panel.message_id)).unwrap();
        match &message.rows[0][0] {
            super::super::platform::Component::Select { options, .. } => assert_eq!(options.len(), 2),
            other => panic!("menu attendu, reçu {:?}", other),
        }
        let duplicate = admin.create_category(STAFF, GUILD, NewCategory {
            name: " ACHAT ".to_string(),
            label: "Achat".to_string(),
            ..Default::default()
        }).await.unwrap_err();
        assert!(matches!(duplicate, TicketError::CategoryExists));
    }

    #[tokio::test]
    async fn panel_edits_are_pushed_to_the_message() {
        let fx = Fixture::new().await;
        let admin = TicketAdmin::new(fx.engine.clone());
        let panel = admin.create_panel(STAFF, request(42)).await.unwrap();
        let updated = admin.update_panel(STAFF, GUILD, panel.id, PanelUpdate {
            title: Some("Support 24/7".to_string()),
            placeholder: Some(Some("Votre demande".to_string())),
            ..Default::default()
        }).await.unwrap();
        assert_eq!(updated.title, "Support 24/7");
        let message = fx.platform.message(from_db(panel.message_id)).unwrap();
        assert_eq!(message.embed.unwrap().title.as_deref(), Some("Support 24/7"));
        match &message.rows[0][0] {
            super::super::platform::Component::Select { placeholder, .. } => {
                assert_eq!(placeholder.as_deref(), Some("Votre demande"))
            }
            other => panic!("menu attendu, reçu {:?}", other),
        }
        assert!(matches!(
            admin.update_panel(STAFF, 2, panel.id, PanelUpdate::default()).await.unwrap_err(),
            TicketError::PanelNotFound
        ));
        let logs = ticket_ctrl::list_logs(&*fx.db, to_db(GUILD)).await.unwrap();
        assert_eq!(logs.iter().filter(|l| l.action == "panel_updated").count(), 1);
    }

    #[tokio::test]
    async fn category_edits_refresh_panels() {
        let fx = Fixture::new().await;
        let admin = TicketAdmin::new(fx.engine.clone());
        let panel = admin.create_panel(STAFF, request(42)).await.unwrap();
        let other = admin.create_category(STAFF, GUILD, NewCategory {
            name: "achat".to_string(),
            label: "Achat".to_string(),
            ..Default::default()
        }).await.unwrap();
        assert!(matches!(
            admin.update_category(STAFF, GUILD, other.id, CategoryUpdate {
                name: Some("Support".to_string()),
                ..Default::default()
            }).await.unwrap_err(),
            TicketError::CategoryExists
        ));
        let renamed = admin.update_category(STAFF, GUILD, other.id, CategoryUpdate {
            label: Some("Achats".to_string()),
            display_order: Some(0),
            ..Default::default()
        }).await.unwrap();
        assert_eq!(renamed.label, "Achats");
        let message = fx.platform.message(from_db(panel.message_id)).unwrap();
        match &message.rows[0][0] {
            super::super::platform::Component::Select { options, .. } => {
                assert!(options.iter().any(|o| o.label == "Achats"))
            }
            other => panic!("menu attendu, reçu {:?}", other),
        }
        let logs = ticket_ctrl::list_logs(&*fx.db, to_db(GUILD)).await.unwrap();
        assert_eq!(logs.iter().filter(|l| l.action == "category_updated").count(), 1);
    }

    #[tokio::test]
    async fn missing_panel_message_is_republished() {
        let fx = Fixture::new().await;
        let admin = TicketAdmin::new(fx.engine.clone());
        // Le message du panel de la fixture n'a jamais été posté
        assert_eq!(admin.sync_panels(GUILD).await.unwrap(), 1);
        let panel = panel_ctrl::find_panel(&*fx.db, fx.panel.id).await.unwrap().unwrap();
        assert_ne!(panel.message_id, fx.panel.message_id);
        assert_eq!(fx.platform.messages_in(PANEL_CHANNEL).len(), 1);
    }

    #[tokio::test]
    async fn deleting_a_panel_removes_its_message() {
        let fx = Fixture::new().await;
        let admin = TicketAdmin::new(fx.engine.clone());
        let panel = admin.create_panel(STAFF, request(42)).await.unwrap();
        admin.delete_panel(STAFF, GUILD, panel.id).await.unwrap();
        assert_eq!(fx.platform.deleted_messages(), vec![(42, from_db(panel.message_id))]);
        assert!(matches!(
            admin.delete_panel(STAFF, GUILD, panel.id).await.unwrap_err(),
            TicketError::PanelNotFound
        ));
    }

    #[tokio::test]
    async fn clearing_tickets_keeps_the_counter() {
        let fx = Fixture::new().await;
        let admin = TicketAdmin::new(fx.engine.clone());
        let first = fx.open(10).await;
        fx.open(11).await;
        let report = admin.clear_tickets(STAFF, GUILD).await.unwrap();
        assert_eq!(report.tickets, 2);
        assert!(fx.platform.channel(first.channel_id).is_none());
        assert!(ticket_ctrl::list_active(&*fx.db, to_db(GUILD)).await.unwrap().is_empty());
        assert_eq!(fx.open(12).await.ticket.ticket_number, 3);
    }

    #[tokio::test]
    async fn staff_roles_are_audited_once() {
        let fx = Fixture::new().await;
        let admin = TicketAdmin::new(fx.engine.clone());
        assert!(admin.add_staff_role(STAFF, GUILD, 42).await.unwrap());
        assert!(!admin.add_staff_role(STAFF, GUILD, 42).await.unwrap());
        let logs = ticket_ctrl::list_logs(&*fx.db, to_db(GUILD)).await.unwrap();
        assert_eq!(logs.iter().filter(|l| l.action == "staff_role_added").count(), 1);
        assert!(admin.remove_staff_role(STAFF, GUILD, 42).await.unwrap());
        assert!(!admin.remove_staff_role(STAFF, GUILD, 42).await.unwrap());
    }
}
