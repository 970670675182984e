use sea_orm::entity::prelude::*;
use crate::db::{
    IDType,
    model::ticket
};

/// Transcription d'un ticket supprimé.
///
/// L'historique survit à la suppression du ticket: la référence passe alors à `NULL`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "transcripts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub ticket_id: Option<i32>,
    pub channel_id: IDType,
    pub guild_id: IDType,
    pub generated_by: IDType,
    #[sea_orm(column_type = "Text")]
    pub content: String,
    /// `html` ou `txt`
    pub format: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "ticket::Entity",
        from = "Column::TicketId",
        to = "ticket::Column::Id",
        on_delete = "SetNull"
    )]
    Ticket
}

impl Related<ticket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ticket.def()
    }
}

impl ActiveModelBehavior for ActiveModel
{}

