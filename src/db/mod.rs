//! Accès à la base de données.
//!
//! Les entités sont décrites dans [`model`], les fonctions d'accès dans [`controller`].

pub mod model;
pub mod controller;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DbConn, DbErr, EntityTrait, Schema, Statement,
    TransactionTrait,
    sea_query::{Index, IndexCreateStatement},
};

/// Type des identifiants Discord en base
pub type IDType = i64;

/// Convertit un identifiant Discord en identifiant de base de données
#[inline]
pub fn to_db(id: u64) -> IDType {
    id as IDType
}
/// Convertit un identifiant de base de données en identifiant Discord
#[inline]
pub fn from_db(id: IDType) -> u64 {
    id as u64
}

pub async fn start_db(url: &str) -> Result<DbConn, DbErr> {
    let mut options = ConnectOptions::new(url.to_string());
    options.sqlx_logging(false);
    if url.contains(":memory:") {
        // Chaque connexion SQLite en mémoire possède sa propre base
        options.max_connections(1).min_connections(1);
    }
    let db = Database::connect(options).await?;
    check_tables(&db).await?;
    Ok(db)
}

fn create_table<E: EntityTrait>(schema: &Schema, entity: E) -> sea_orm::sea_query::TableCreateStatement {
    schema.create_table_from_entity(entity).if_not_exists().to_owned()
}

fn indexes() -> Vec<IndexCreateStatement> {
    use model::{ticket, ticket::category, ticket::panel};
    vec![
        Index::create()
            .name("idx_tickets_guild_number")
            .table(model::Ticket)
            .col(ticket::Column::GuildId)
            .col(ticket::Column::TicketNumber)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_tickets_guild_status")
            .table(model::Ticket)
            .col(ticket::Column::GuildId)
            .col(ticket::Column::Status)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_tickets_user_status")
            .table(model::Ticket)
            .col(ticket::Column::UserId)
            .col(ticket::Column::Status)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_categories_guild_name")
            .table(model::TicketCategory)
            .col(category::Column::GuildId)
            .col(category::Column::Name)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_panels_guild_channel")
            .table(model::Panel)
            .col(panel::Column::GuildId)
            .col(panel::Column::ChannelId)
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_ratings_ticket_id")
            .table(model::Rating)
            .col(model::rating::Column::TicketId)
            .if_not_exists()
            .to_owned(),
    ]
}

/// Index partiel: un utilisateur n'a qu'un seul ticket ouvert par serveur
const OPEN_TICKET_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS idx_tickets_one_open \
    ON tickets (guild_id, user_id) WHERE status = 'open'";

async fn check_tables(db: &DbConn) -> Result<(), DbErr> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let transaction = db.begin().await?;

    transaction.execute(builder.build(&create_table(&schema, model::GuildConfig))).await?;
    transaction.execute(builder.build(&create_table(&schema, model::StaffRole))).await?;
    transaction.execute(builder.build(&create_table(&schema, model::TicketCategory))).await?;
    transaction.execute(builder.build(&create_table(&schema, model::Panel))).await?;
    transaction.execute(builder.build(&create_table(&schema, model::Ticket))).await?;
    transaction.execute(builder.build(&create_table(&schema, model::Transcript))).await?;
    transaction.execute(builder.build(&create_table(&schema, model::Rating))).await?;
    transaction.execute(builder.build(&create_table(&schema, model::TicketLog))).await?;
    for index in indexes() {
        transaction.execute(builder.build(&index)).await?;
    }
    transaction.execute(Statement::from_string(builder, OPEN_TICKET_INDEX.to_string())).await?;
    transaction.commit().await?;

    Ok(())
}
