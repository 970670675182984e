use sea_orm::entity::prelude::*;
use crate::db::{
    IDType,
    model::ticket
};

/// Note laissée par un utilisateur après la fermeture de son ticket
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ratings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub ticket_id: Option<i32>,
    pub guild_id: IDType,
    pub user_id: IDType,
    /// Membre de l'équipe qui avait pris en charge le ticket
    pub staff_id: Option<IDType>,
    /// Note entre 1 et 5
    pub rating: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub feedback: Option<String>,
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
