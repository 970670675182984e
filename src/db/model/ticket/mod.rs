//! Tickets et leurs tables associées

pub mod category;
pub mod panel;
pub mod log;

use sea_orm::entity::prelude::*;
use crate::db::IDType;

/// État d'un ticket.
///
/// Les transitions vont uniquement dans le sens `Open -> Closed -> Deleted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(Some(20))")]
pub enum TicketStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

impl TicketStatus {
    /// Indique si la transition vers `next` respecte l'ordre du cycle de vie
    pub fn can_become(self, next: TicketStatus) -> bool {
        self.rank() < next.rank()
    }
    fn rank(self) -> u8 {
        match self {
            TicketStatus::Open => 0,
            TicketStatus::Closed => 1,
            TicketStatus::Deleted => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tickets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub guild_id: IDType,
    /// Un salon n'est un ticket qu'une seule fois
    #[sea_orm(unique)]
    pub channel_id: IDType,
    /// Créateur du ticket
    pub user_id: IDType,
    pub panel_id: Option<i32>,
    /// Numéro unique par serveur, attribué à la création
    pub ticket_number: i32,
    pub status: TicketStatus,
    pub claimed_by: Option<IDType>,
    /// Catégorie Discord dans laquelle le salon a été créé
    pub category_id: Option<IDType>,
    /// Catégorie de ticket choisie dans le panel
    pub ticket_category_id: Option<i32>,
    pub created_at: DateTimeUtc,
    pub closed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "panel::Entity",
        from = "Column::PanelId",
        to = "panel::Column::Id",
        on_delete = "SetNull"
    )]
    Panel,
    #[sea_orm(has_many = "crate::db::model::archive::Entity")]
    Transcripts,
    #[sea_orm(has_many = "crate::db::model::rating::Entity")]
    Ratings,
}

impl Related<panel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Panel.def()
    }
}
impl Related<crate::db::model::archive::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transcripts.def()
    }
}
impl Related<crate::db::model::rating::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ratings.def()
    }
}

impl ActiveModelBehavior for ActiveModel
{}


#[cfg(test)]
mod tests {
    use super::TicketStatus::*;

    #[test]
    fn status_only_moves_forward() {
        assert!(Open.can_become(Closed));
        assert!(Open.can_become(Deleted));
        assert!(Closed.can_become(Deleted));
        assert!(!Closed.can_become(Open));
        assert!(!Deleted.can_become(Closed));
        assert!(!Closed.can_become(Closed));
    }
}
