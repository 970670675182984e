use chrono::Utc;
use sea_orm::{
    entity::*, query::*, ConnectionTrait, PaginatorTrait, TransactionTrait,
    sea_query::Expr,
};

use crate::db::{
    model::{self, ticket::{self, TicketStatus}, ticket::log, archive},
    IDType,
};
use crate::{log_info, log_debug};
use super::{guild, Error, Result};

/// Données d'un ticket à enregistrer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub guild_id: IDType,
    pub channel_id: IDType,
    pub user_id: IDType,
    pub panel_id: Option<i32>,
    pub category_id: Option<IDType>,
    pub ticket_category_id: Option<i32>,
}

/// Indique si l'utilisateur possède déjà un ticket ouvert sur le serveur
pub async fn has_open_ticket<C: ConnectionTrait>(conn: &C, guild_id: IDType, user_id: IDType) -> Result<bool> {
    let count = model::Ticket::find()
        .filter(ticket::Column::GuildId.eq(guild_id))
        .filter(ticket::Column::UserId.eq(user_id))
        .filter(ticket::Column::Status.eq(TicketStatus::Open))
        .count(conn).await
        .map_err(Error::SeaORM)?;
    Ok(count > 0)
}

pub async fn find_by_channel<C: ConnectionTrait>(conn: &C, channel_id: IDType) -> Result<Option<ticket::Model>> {
    model::Ticket::find()
        .filter(ticket::Column::ChannelId.eq(channel_id))
        .one(conn).await
        .map_err(Error::SeaORM)
}

pub async fn find_by_id<C: ConnectionTrait>(conn: &C, ticket_id: i32) -> Result<Option<ticket::Model>> {
    model::Ticket::find_by_id(ticket_id).one(conn).await.map_err(Error::SeaORM)
}

/// Tickets non supprimés d'un serveur
pub async fn list_active<C: ConnectionTrait>(conn: &C, guild_id: IDType) -> Result<Vec<ticket::Model>> {
    model::Ticket::find()
        .filter(ticket::Column::GuildId.eq(guild_id))
        .filter(ticket::Column::Status.ne(TicketStatus::Deleted))
        .order_by_asc(ticket::Column::TicketNumber)
        .all(conn).await
        .map_err(Error::SeaORM)
}

/// Enregistre un ticket.
///
/// Le numéro est attribué dans la même transaction que l'insertion: si l'insertion échoue,
/// le compteur n'est pas consommé.
pub async fn create<C>(conn: &C, new: NewTicket) -> Result<ticket::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = conn.begin().await.map_err(Error::SeaORM)?;
    let number = guild::next_ticket_number(&txn, new.guild_id).await?;
    let active = ticket::ActiveModel {
        guild_id: Set(new.guild_id),
        channel_id: Set(new.channel_id),
        user_id: Set(new.user_id),
        panel_id: Set(new.panel_id),
        ticket_number: Set(number),
        status: Set(TicketStatus::Open),
        claimed_by: Set(None),
        category_id: Set(new.category_id),
        ticket_category_id: Set(new.ticket_category_id),
        created_at: Set(Utc::now()),
        closed_at: Set(None),
        ..Default::default()
    };
    let model = active.insert(&txn).await.map_err(Error::SeaORM)?;
    txn.commit().await.map_err(Error::SeaORM)?;
    log_info!("Ticket #{} enregistré pour le serveur {}", number, new.guild_id);
    Ok(model)
}

/// Définit le membre de l'équipe en charge du ticket. Le dernier appel l'emporte.
pub async fn set_claimed_by<C: ConnectionTrait>(conn: &C, ticket_id: i32, staff_id: IDType) -> Result<()> {
    model::Ticket::update_many()
        .col_expr(ticket::Column::ClaimedBy, Expr::value(Some(staff_id)))
        .filter(ticket::Column::Id.eq(ticket_id))
        .exec(conn).await
        .map_err(Error::SeaORM)?;
    Ok(())
}

/// Mémorise la catégorie Discord du salon après un déplacement
pub async fn set_category<C: ConnectionTrait>(conn: &C, ticket_id: i32, category_id: Option<IDType>) -> Result<()> {
    model::Ticket::update_many()
        .col_expr(ticket::Column::CategoryId, Expr::value(category_id))
        .filter(ticket::Column::Id.eq(ticket_id))
        .exec(conn).await
        .map_err(Error::SeaORM)?;
    Ok(())
}

/// Ferme le ticket s'il est encore ouvert.
///
/// Retourne `false` si le ticket n'était plus ouvert: un seul appelant concurrent gagne.
pub async fn close_if_open<C: ConnectionTrait>(conn: &C, ticket_id: i32) -> Result<bool> {
    let res = model::Ticket::update_many()
        .col_expr(ticket::Column::Status, Expr::value(TicketStatus::Closed))
        .col_expr(ticket::Column::ClosedAt, Expr::value(Some(Utc::now())))
        .filter(ticket::Column::Id.eq(ticket_id))
        .filter(ticket::Column::Status.eq(TicketStatus::Open))
        .exec(conn).await
        .map_err(Error::SeaORM)?;
    Ok(res.rows_affected == 1)
}

/// Passe le ticket à l'état supprimé. Retourne `false` s'il l'était déjà.
pub async fn mark_deleted<C: ConnectionTrait>(conn: &C, ticket_id: i32) -> Result<bool> {
    let res = model::Ticket::update_many()
        .col_expr(ticket::Column::Status, Expr::value(TicketStatus::Deleted))
        .filter(ticket::Column::Id.eq(ticket_id))
        .filter(ticket::Column::Status.ne(TicketStatus::Deleted))
        .exec(conn).await
        .map_err(Error::SeaORM)?;
    Ok(res.rows_affected == 1)
}

/// Enregistre la transcription d'un ticket
pub async fn save_transcript<C: ConnectionTrait>(
    conn: &C,
    ticket: &ticket::Model,
    generated_by: IDType,
    content: String,
    format: &str,
) -> Result<i32> {
    let active = archive::ActiveModel {
        ticket_id: Set(Some(ticket.id)),
        channel_id: Set(ticket.channel_id),
        guild_id: Set(ticket.guild_id),
        generated_by: Set(generated_by),
        content: Set(content),
        format: Set(format.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let res = model::Transcript::insert(active).exec(conn).await.map_err(Error::SeaORM)?;
    log_debug!("Transcription {} enregistrée pour le ticket {}", res.last_insert_id, ticket.id);
    Ok(res.last_insert_id)
}

/// Archive la transcription et passe le ticket à l'état supprimé dans la même transaction.
///
/// Retourne `None` sans rien enregistrer si le ticket était déjà supprimé.
pub async fn delete_with_transcript<C>(
    conn: &C,
    ticket: &ticket::Model,
    generated_by: IDType,
    content: String,
    format: &str,
) -> Result<Option<i32>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = conn.begin().await.map_err(Error::SeaORM)?;
    if !mark_deleted(&txn, ticket.id).await? {
        txn.rollback().await.map_err(Error::SeaORM)?;
        return Ok(None);
    }
    let transcript_id = save_transcript(&txn, ticket, generated_by, content, format).await?;
    txn.commit().await.map_err(Error::SeaORM)?;
    Ok(Some(transcript_id))
}

pub async fn find_transcripts<C: ConnectionTrait>(conn: &C, ticket_id: i32) -> Result<Vec<archive::Model>> {
    model::Transcript::find()
        .filter(archive::Column::TicketId.eq(ticket_id))
        .all(conn).await
        .map_err(Error::SeaORM)
}

/// Ajoute une entrée au journal des actions
pub async fn insert_log<C: ConnectionTrait>(
    conn: &C,
    guild_id: IDType,
    ticket_id: Option<i32>,
    action: &str,
    performer_id: IDType,
    details: Option<serde_json::Value>,
) -> Result<i32> {
    let active = log::ActiveModel {
        guild_id: Set(guild_id),
        ticket_id: Set(ticket_id),
        action: Set(action.to_string()),
        performer_id: Set(performer_id),
        details: Set(details.map(|d| d.to_string())),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let res = model::TicketLog::insert(active).exec(conn).await.map_err(Error::SeaORM)?;
    Ok(res.last_insert_id)
}

pub async fn list_logs<C: ConnectionTrait>(conn: &C, guild_id: IDType) -> Result<Vec<log::Model>> {
    model::TicketLog::find()
        .filter(log::Column::GuildId.eq(guild_id))
        .order_by_asc(log::Column::Id)
        .all(conn).await
        .map_err(Error::SeaORM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;

    fn new_ticket(guild_id: IDType, user_id: IDType, channel_id: IDType) -> NewTicket {
        NewTicket {
            guild_id,
            channel_id,
            user_id,
            panel_id: None,
            category_id: None,
            ticket_category_id: None,
        }
    }

    #[tokio::test]
    async fn numbers_follow_the_counter() {
        let db = memory_db().await;
        let a = create(&db, new_ticket(1, 100, 1000)).await.unwrap();
        let b = create(&db, new_ticket(1, 101, 1001)).await.unwrap();
        let c = create(&db, new_ticket(2, 100, 1002)).await.unwrap();
        assert_eq!((a.ticket_number, b.ticket_number, c.ticket_number), (1, 2, 1));
        assert_eq!(guild::get_or_create(&db, 1).await.unwrap().ticket_count, 2);
    }

    #[tokio::test]
    async fn one_open_ticket_per_user() {
        let db = memory_db().await;
        let first = create(&db, new_ticket(1, 100, 1000)).await.unwrap();
        assert!(has_open_ticket(&db, 1, 100).await.unwrap());
        assert!(create(&db, new_ticket(1, 100, 1001)).await.is_err());
        // L'échec n'a pas consommé de numéro
        assert_eq!(guild::get_or_create(&db, 1).await.unwrap().ticket_count, 1);

        assert!(close_if_open(&db, first.id).await.unwrap());
        assert!(!has_open_ticket(&db, 1, 100).await.unwrap());
        let second = create(&db, new_ticket(1, 100, 1001)).await.unwrap();
        assert_eq!(second.ticket_number, 2);
    }

    #[tokio::test]
    async fn close_then_delete() {
        let db = memory_db().await;
        let t = create(&db, new_ticket(1, 100, 1000)).await.unwrap();
        assert!(close_if_open(&db, t.id).await.unwrap());
        assert!(!close_if_open(&db, t.id).await.unwrap());
        let closed = find_by_channel(&db, 1000).await.unwrap().unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);
        assert!(closed.closed_at.is_some());

        assert!(mark_deleted(&db, t.id).await.unwrap());
        assert!(!mark_deleted(&db, t.id).await.unwrap());
        assert_eq!(find_by_id(&db, t.id).await.unwrap().unwrap().status, TicketStatus::Deleted);
        assert!(list_active(&db, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_overwrites() {
        let db = memory_db().await;
        let t = create(&db, new_ticket(1, 100, 1000)).await.unwrap();
        set_claimed_by(&db, t.id, 5).await.unwrap();
        set_claimed_by(&db, t.id, 6).await.unwrap();
        assert_eq!(find_by_id(&db, t.id).await.unwrap().unwrap().claimed_by, Some(6));
    }

    #[tokio::test]
    async fn transcript_and_log_rows() {
        let db = memory_db().await;
        let t = create(&db, new_ticket(1, 100, 1000)).await.unwrap();
        save_transcript(&db, &t, 5, "<html></html>".into(), "html").await.unwrap();
        insert_log(&db, 1, Some(t.id), "ticket_deleted", 5, Some(serde_json::json!({"n": 1}))).await.unwrap();
        let transcripts = find_transcripts(&db, t.id).await.unwrap();
        assert_eq!(transcripts.len(), 1);
        assert_eq!(transcripts[0].format, "html");
        let logs = list_logs(&db, 1).await.unwrap();
        assert_eq!(logs[0].action, "ticket_deleted");
        assert_eq!(logs[0].details.as_deref(), Some(r#"{"n":1}"#));
    }
}
