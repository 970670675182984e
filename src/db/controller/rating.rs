use chrono::Utc;
use sea_orm::{entity::*, query::*, ConnectionTrait};

use crate::db::{model::{self, rating}, IDType};
use super::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRating {
    pub ticket_id: Option<i32>,
    pub guild_id: IDType,
    pub user_id: IDType,
    pub staff_id: Option<IDType>,
    pub rating: i32,
    pub feedback: Option<String>,
}

pub async fn insert<C: ConnectionTrait>(conn: &C, new: NewRating) -> Result<rating::Model> {
    let active = rating::ActiveModel {
        ticket_id: Set(new.ticket_id),
        guild_id: Set(new.guild_id),
        user_id: Set(new.user_id),
        staff_id: Set(new.staff_id),
        rating: Set(new.rating),
        feedback: Set(new.feedback),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    active.insert(conn).await.map_err(Error::SeaORM)
}

pub async fn list_for_ticket<C: ConnectionTrait>(conn: &C, ticket_id: i32) -> Result<Vec<rating::Model>> {
    model::Rating::find()
        .filter(rating::Column::TicketId.eq(ticket_id))
        .order_by_asc(rating::Column::Id)
        .all(conn).await
        .map_err(Error::SeaORM)
}

pub async fn list_for_guild<C: ConnectionTrait>(conn: &C, guild_id: IDType) -> Result<Vec<rating::Model>> {
    model::Rating::find()
        .filter(rating::Column::GuildId.eq(guild_id))
        .order_by_asc(rating::Column::Id)
        .all(conn).await
        .map_err(Error::SeaORM)
}
