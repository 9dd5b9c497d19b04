use sea_orm::sea_query::{Table, TableCreateStatement};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use std::time::Duration;

use crate::models::{activity, friend, map, uploaded_file, user};

pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(10)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    Database::connect(opt).await
}

/// Tables in dependency order: every table only references tables before it.
fn create_statements(schema: &Schema) -> Vec<TableCreateStatement> {
    vec![
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(friend::Entity),
        schema.create_table_from_entity(map::Entity),
        schema.create_table_from_entity(activity::Entity),
        schema.create_table_from_entity(uploaded_file::Entity),
    ]
}

/// Create any missing tables from the entity definitions.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    for mut stmt in create_statements(&schema) {
        stmt.if_not_exists();
        db.execute(backend.build(&stmt)).await?;
    }

    log::info!("Database schema ready");
    Ok(())
}

/// Drop every table and recreate the schema from scratch.
pub async fn reset_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    drop_table(db, uploaded_file::Entity).await?;
    drop_table(db, activity::Entity).await?;
    drop_table(db, map::Entity).await?;
    drop_table(db, friend::Entity).await?;
    drop_table(db, user::Entity).await?;

    log::warn!("Dropped all tables ({:?})", backend);
    create_schema(db).await
}

async fn drop_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let stmt = Table::drop().table(entity).if_exists().to_owned();
    db.execute(db.get_database_backend().build(&stmt)).await?;
    Ok(())
}
