use sea_orm::entity::prelude::*;

use crate::db::IDType;

/// Trace d'une action effectuée sur un ticket ou sur la configuration
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ticket_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub guild_id: IDType,
    pub ticket_id: Option<i32>,
    pub action: String,
    pub performer_id: IDType,
    /// Détails de l'action au format JSON
    #[sea_orm(column_type = "Text", nullable)]
    pub details: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::Entity",
        from = "Column::TicketId",
        to = "super::Column::Id",
        on_delete = "SetNull"
    )]
    Ticket,
}

impl Related<super::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ticket.def()
    }
}

impl ActiveModelBehavior for ActiveModel
{}
