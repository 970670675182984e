//! Configuration d'un serveur

pub mod staff_role;

use sea_orm::entity::prelude::*;
use crate::db::IDType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "guild_config")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: IDType,
    /// Compteur de tickets, ne fait qu'augmenter
    pub ticket_count: i32,

    pub log_channel_general: Option<IDType>,
    pub log_channel_tickets: Option<IDType>,
    pub log_channel_moderation: Option<IDType>,
    pub log_channel_sales: Option<IDType>,
    pub log_channel_members: Option<IDType>,

    pub rating_enabled: bool,
    pub rating_channel_id: Option<IDType>,
    pub rating_embed_title: Option<String>,
    pub rating_embed_description: Option<String>,
    /// Couleur au format `#rrggbb`
    pub rating_embed_color: Option<String>,
    pub rating_embed_footer: Option<String>,

    /// Message d'accueil des tickets. `{user}` est remplacé par la mention du créateur.
    #[sea_orm(column_type = "Text", nullable)]
    pub welcome_message: Option<String>,

    pub visitor_role_id: Option<IDType>,
    pub client_role_id: Option<IDType>,
    pub active_client_role_id: Option<IDType>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "staff_role::Entity")]
    StaffRoles,
}

impl Related<staff_role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StaffRoles.def()
    }
}

impl ActiveModelBehavior for ActiveModel
{}

impl Model {
    /// Configuration par défaut d'un serveur qui n'a encore rien enregistré
    pub fn default_for(guild_id: IDType) -> Self {
        let now = chrono::Utc::now();
        Self {
            guild_id,
            ticket_count: 0,
            log_channel_general: None,
            log_channel_tickets: None,
            log_channel_moderation: None,
            log_channel_sales: None,
            log_channel_members: None,
            rating_enabled: true,
            rating_channel_id: None,
            rating_embed_title: None,
            rating_embed_description: None,
            rating_embed_color: None,
            rating_embed_footer: None,
            welcome_message: None,
            visitor_role_id: None,
            client_role_id: None,
            active_client_role_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
