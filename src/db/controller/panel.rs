//! Panels de création de tickets et catégories proposées dans leur menu

use chrono::Utc;
use sea_orm::{entity::*, query::*, ConnectionTrait};

use crate::db::{
    model::{self, ticket::{category, panel}},
    IDType,
};
use crate::log_info;
use super::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPanel {
    pub guild_id: IDType,
    pub channel_id: IDType,
    pub message_id: IDType,
    pub title: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub image_url: Option<String>,
    pub category_id: Option<IDType>,
    pub placeholder: Option<String>,
}

/// Champs modifiables d'un panel. `None` laisse le champ inchangé.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub category_id: Option<Option<IDType>>,
    pub placeholder: Option<Option<String>>,
}

pub async fn create_panel<C: ConnectionTrait>(conn: &C, new: NewPanel) -> Result<panel::Model> {
    let now = Utc::now();
    let active = panel::ActiveModel {
        guild_id: Set(new.guild_id),
        channel_id: Set(new.channel_id),
        message_id: Set(new.message_id),
        title: Set(new.title),
        description: Set(new.description),
        color: Set(new.color),
        image_url: Set(new.image_url),
        category_id: Set(new.category_id),
        placeholder: Set(new.placeholder),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let panel = active.insert(conn).await.map_err(Error::SeaORM)?;
    log_info!("Panel {} créé dans le salon {}", panel.id, panel.channel_id);
    Ok(panel)
}

pub async fn find_panel<C: ConnectionTrait>(conn: &C, panel_id: i32) -> Result<Option<panel::Model>> {
    model::Panel::find_by_id(panel_id).one(conn).await.map_err(Error::SeaORM)
}

pub async fn get_by_channel<C: ConnectionTrait>(conn: &C, channel_id: IDType) -> Result<Option<panel::Model>> {
    model::Panel::find()
        .filter(panel::Column::ChannelId.eq(channel_id))
        .one(conn).await
        .map_err(Error::SeaORM)
}

pub async fn list_panels<C: ConnectionTrait>(conn: &C, guild_id: IDType) -> Result<Vec<panel::Model>> {
    model::Panel::find()
        .filter(panel::Column::GuildId.eq(guild_id))
        .order_by_asc(panel::Column::Id)
        .all(conn).await
        .map_err(Error::SeaORM)
}

pub async fn update_panel<C: ConnectionTrait>(conn: &C, panel_id: i32, changes: PanelUpdate) -> Result<panel::Model> {
    let current = find_panel(conn, panel_id).await?
        .ok_or_else(|| Error::Custom(format!("Panel {} introuvable", panel_id)))?;
    let mut active: panel::ActiveModel = current.into();
    if let Some(v) = changes.title { active.title = Set(v); }
    if let Some(v) = changes.description { active.description = Set(v); }
    if let Some(v) = changes.color { active.color = Set(v); }
    if let Some(v) = changes.image_url { active.image_url = Set(v); }
    if let Some(v) = changes.category_id { active.category_id = Set(v); }
    if let Some(v) = changes.placeholder { active.placeholder = Set(v); }
    active.updated_at = Set(Utc::now());
    active.update(conn).await.map_err(Error::SeaORM)
}

/// Remplace le message porteur du panel après une republication
pub async fn set_message<C: ConnectionTrait>(conn: &C, panel_id: i32, message_id: IDType) -> Result<()> {
    let active = panel::ActiveModel {
        id: Unchanged(panel_id),
        message_id: Set(message_id),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    active.update(conn).await.map_err(Error::SeaORM)?;
    Ok(())
}

pub async fn delete_panel<C: ConnectionTrait>(conn: &C, panel_id: i32) -> Result<bool> {
    let res = model::Panel::delete_by_id(panel_id).exec(conn).await.map_err(Error::SeaORM)?;
    Ok(res.rows_affected > 0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    pub label: String,
    pub description: Option<String>,
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub label: Option<String>,
    pub description: Option<Option<String>>,
    pub emoji: Option<Option<String>>,
    pub display_order: Option<i32>,
}

/// Ajoute une catégorie en dernière position du menu.
///
/// Le nom est enregistré en minuscules; un doublon sur le serveur est refusé par la base.
pub async fn create_category<C: ConnectionTrait>(conn: &C, guild_id: IDType, new: NewCategory) -> Result<category::Model> {
    let last = model::TicketCategory::find()
        .filter(category::Column::GuildId.eq(guild_id))
        .order_by_desc(category::Column::DisplayOrder)
        .one(conn).await
        .map_err(Error::SeaORM)?;
    let active = category::ActiveModel {
        guild_id: Set(guild_id),
        name: Set(new.name.trim().to_lowercase()),
        label: Set(new.label),
        description: Set(new.description),
        emoji: Set(new.emoji),
        display_order: Set(last.map_or(0, |c| c.display_order + 1)),
        ..Default::default()
    };
    let category = active.insert(conn).await.map_err(Error::SeaORM)?;
    log_info!("Catégorie {} ajoutée au serveur {}", category.name, guild_id);
    Ok(category)
}

pub async fn find_category<C: ConnectionTrait>(conn: &C, category_id: i32) -> Result<Option<category::Model>> {
    model::TicketCategory::find_by_id(category_id).one(conn).await.map_err(Error::SeaORM)
}

/// Catégories d'un serveur dans l'ordre d'affichage
pub async fn list_categories<C: ConnectionTrait>(conn: &C, guild_id: IDType) -> Result<Vec<category::Model>> {
    model::TicketCategory::find()
        .filter(category::Column::GuildId.eq(guild_id))
        .order_by_asc(category::Column::DisplayOrder)
        .order_by_asc(category::Column::Id)
        .all(conn).await
        .map_err(Error::SeaORM)
}

pub async fn update_category<C: ConnectionTrait>(conn: &C, category_id: i32, changes: CategoryUpdate) -> Result<category::Model> {
    let current = find_category(conn, category_id).await?
        .ok_or_else(|| Error::Custom(format!("Catégorie {} introuvable", category_id)))?;
    let mut active: category::ActiveModel = current.into();
    if let Some(v) = changes.name { active.name = Set(v.trim().to_lowercase()); }
    if let Some(v) = changes.label { active.label = Set(v); }
    if let Some(v) = changes.description { active.description = Set(v); }
    if let Some(v) = changes.emoji { active.emoji = Set(v); }
    if let Some(v) = changes.display_order { active.display_order = Set(v); }
    active.update(conn).await.map_err(Error::SeaORM)
}

pub async fn delete_category<C: ConnectionTrait>(conn: &C, category_id: i32) -> Result<bool> {
    let res = model::TicketCategory::delete_by_id(category_id).exec(conn).await.map_err(Error::SeaORM)?;
    Ok(res.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;

    fn category(name: &str) -> NewCategory {
        NewCategory { name: name.into(), label: name.into(), ..Default::default() }
    }

    #[tokio::test]
    async fn categories_are_appended() {
        let db = memory_db().await;
        let a = create_category(&db, 1, category("Support")).await.unwrap();
        let b = create_category(&db, 1, category("Achat")).await.unwrap();
        let other = create_category(&db, 2, category("support")).await.unwrap();
        assert_eq!(a.name, "support");
        assert_eq!((a.display_order, b.display_order, other.display_order), (0, 1, 0));
        let names: Vec<_> = list_categories(&db, 1).await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["support", "achat"]);
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let db = memory_db().await;
        create_category(&db, 1, category("support")).await.unwrap();
        assert!(create_category(&db, 1, category("SUPPORT")).await.is_err());
    }

    #[tokio::test]
    async fn reorder_and_delete() {
        let db = memory_db().await;
        let a = create_category(&db, 1, category("a")).await.unwrap();
        let b = create_category(&db, 1, category("b")).await.unwrap();
        update_category(&db, a.id, CategoryUpdate { display_order: Some(5), ..Default::default() }).await.unwrap();
        let ids: Vec<_> = list_categories(&db, 1).await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
        assert!(delete_category(&db, a.id).await.unwrap());
        assert!(!delete_category(&db, a.id).await.unwrap());
    }

    #[tokio::test]
    async fn panel_lifecycle() {
        let db = memory_db().await;
        let panel = create_panel(&db, NewPanel {
            guild_id: 1,
            channel_id: 10,
            message_id: 100,
            title: "Support".into(),
            ..Default::default()
        }).await.unwrap();
        assert_eq!(panel.select_custom_id(), "category_select_10");
        set_message(&db, panel.id, 101).await.unwrap();
        let updated = update_panel(&db, panel.id, PanelUpdate {
            placeholder: Some(Some("Choisissez".into())),
            ..Default::default()
        }).await.unwrap();
        assert_eq!(updated.message_id, 101);
        assert_eq!(updated.placeholder.as_deref(), Some("Choisissez"));
        assert_eq!(get_by_channel(&db, 10).await.unwrap().map(|p| p.id), Some(panel.id));
        assert_eq!(list_panels(&db, 1).await.unwrap().len(), 1);
        assert!(delete_panel(&db, panel.id).await.unwrap());
    }
}
