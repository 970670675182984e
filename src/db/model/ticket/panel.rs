use sea_orm::entity::prelude::*;

use crate::db::IDType;

/// Message portant le menu de création de tickets.
///
/// Il n'existe qu'un seul panel par salon et un message n'est jamais réutilisé.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "panels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub guild_id: IDType,
    #[sea_orm(unique)]
    pub channel_id: IDType,
    #[sea_orm(unique)]
    pub message_id: IDType,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub color: Option<String>,
    pub image_url: Option<String>,
    /// Catégorie Discord où sont créés les tickets de ce panel
    pub category_id: Option<IDType>,
    pub placeholder: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::Entity")]
    Tickets,
}

impl Related<super::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tickets.def()
    }
}

impl ActiveModelBehavior for ActiveModel
{}

impl Model {
    /// Identifiant du menu de sélection du panel
    pub fn select_custom_id(&self) -> String {
        format!("category_select_{}", self.channel_id)
    }
}
