use sea_orm::entity::prelude::*;
use crate::db::IDType;

/// Rôle autorisé à gérer les tickets d'un serveur.
///
/// La clé composite garantit l'unicité du couple serveur/rôle.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "staff_roles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub guild_id: IDType,
    #[sea_orm(primary_key, auto_increment = false)]
    pub role_id: IDType,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::Entity",
        from = "Column::GuildId",
        to = "super::Column::GuildId",
        on_delete = "Cascade"
    )]
    Guild,
}

impl Related<super::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Guild.def()
    }
}

impl ActiveModelBehavior for ActiveModel
{}
