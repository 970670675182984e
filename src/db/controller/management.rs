//! Purges de données d'un serveur

use sea_orm::{entity::*, query::*, ConnectionTrait, TransactionTrait};

use crate::db::{
    model::{self, archive, rating, ticket, ticket::log},
    IDType,
};
use crate::log_warn;
use super::{Error, Result};

/// Nombre de lignes supprimées par une purge de tickets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub tickets: u64,
    pub transcripts: u64,
    pub logs: u64,
    pub ratings: u64,
}

/// Supprime tous les tickets d'un serveur ainsi que leurs transcriptions, journaux et notes.
///
/// Le compteur de tickets n'est pas remis à zéro.
pub async fn purge_tickets<C>(conn: &C, guild_id: IDType) -> Result<PurgeReport>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = conn.begin().await.map_err(Error::SeaORM)?;
    let transcripts = model::Transcript::delete_many()
        .filter(archive::Column::GuildId.eq(guild_id))
        .exec(&txn).await
        .map_err(Error::SeaORM)?;
    let logs = model::TicketLog::delete_many()
        .filter(log::Column::GuildId.eq(guild_id))
        .exec(&txn).await
        .map_err(Error::SeaORM)?;
    let ratings = model::Rating::delete_many()
        .filter(rating::Column::GuildId.eq(guild_id))
        .exec(&txn).await
        .map_err(Error::SeaORM)?;
    let tickets = model::Ticket::delete_many()
        .filter(ticket::Column::GuildId.eq(guild_id))
        .exec(&txn).await
        .map_err(Error::SeaORM)?;
    txn.commit().await.map_err(Error::SeaORM)?;
    let report = PurgeReport {
        tickets: tickets.rows_affected,
        transcripts: transcripts.rows_affected,
        logs: logs.rows_affected,
        ratings: ratings.rows_affected,
    };
    log_warn!("Tickets du serveur {} purgés: {:?}", guild_id, report);
    Ok(report)
}

/// Supprime toutes les notes d'un serveur
pub async fn purge_ratings<C: ConnectionTrait>(conn: &C, guild_id: IDType) -> Result<u64> {
    let res = model::Rating::delete_many()
        .filter(rating::Column::GuildId.eq(guild_id))
        .exec(conn).await
        .map_err(Error::SeaORM)?;
    log_warn!("{} notes du serveur {} supprimées", res.rows_affected, guild_id);
    Ok(res.rows_affected)
}
