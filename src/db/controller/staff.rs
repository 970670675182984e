//! Rôles de l'équipe autorisés à gérer les tickets

use sea_orm::{
    entity::*, query::*, ConnectionTrait,
    sea_query::OnConflict,
};

use crate::db::{model, model::guild::staff_role, IDType};
use super::{guild::ensure_guild, Error, Result};

/// Ajoute un rôle à l'équipe du serveur.
///
/// Retourne `false` si le rôle en faisait déjà partie.
pub async fn add<C: ConnectionTrait>(conn: &C, guild_id: IDType, role_id: IDType) -> Result<bool> {
    ensure_guild(conn, guild_id).await?;
    let active = staff_role::ActiveModel {
        guild_id: Set(guild_id),
        role_id: Set(role_id),
    };
    let stmt = model::StaffRole::insert(active)
        .on_conflict(
            OnConflict::columns([staff_role::Column::GuildId, staff_role::Column::RoleId])
                .do_nothing()
                .to_owned()
        )
        .build(conn.get_database_backend());
    let res = conn.execute(stmt).await.map_err(Error::SeaORM)?;
    Ok(res.rows_affected() > 0)
}

/// Retire un rôle de l'équipe. Retourne `false` s'il n'en faisait pas partie.
pub async fn remove<C: ConnectionTrait>(conn: &C, guild_id: IDType, role_id: IDType) -> Result<bool> {
    let res = model::StaffRole::delete_many()
        .filter(staff_role::Column::GuildId.eq(guild_id))
        .filter(staff_role::Column::RoleId.eq(role_id))
        .exec(conn).await
        .map_err(Error::SeaORM)?;
    Ok(res.rows_affected > 0)
}

pub async fn list<C: ConnectionTrait>(conn: &C, guild_id: IDType) -> Result<Vec<IDType>> {
    let roles = model::StaffRole::find()
        .filter(staff_role::Column::GuildId.eq(guild_id))
        .order_by_asc(staff_role::Column::RoleId)
        .all(conn).await
        .map_err(Error::SeaORM)?;
    Ok(roles.into_iter().map(|r| r.role_id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;

    #[tokio::test]
    async fn add_is_idempotent() {
        let db = memory_db().await;
        assert!(add(&db, 1, 10).await.unwrap());
        assert!(!add(&db, 1, 10).await.unwrap());
        assert!(add(&db, 1, 11).await.unwrap());
        assert!(add(&db, 2, 10).await.unwrap());
        assert_eq!(list(&db, 1).await.unwrap(), vec![10, 11]);
    }

    #[tokio::test]
    async fn remove_reports_absence() {
        let db = memory_db().await;
        add(&db, 1, 10).await.unwrap();
        assert!(remove(&db, 1, 10).await.unwrap());
        assert!(!remove(&db, 1, 10).await.unwrap());
        assert!(list(&db, 1).await.unwrap().is_empty());
    }
}
