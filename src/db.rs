use crate::config::AppConfig;
use crate::entities;
use crate::errors::ServiceError;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for the database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Establishes a connection pool using explicit pool settings.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(options).await?;
    info!("Database connection established");
    Ok(pool)
}

/// Establishes a connection from the application configuration and builds the
/// schema when `auto_migrate` is set.
pub async fn establish_connection_from_app_config(
    app_config: &AppConfig,
) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: app_config.database_url.clone(),
        max_connections: app_config.db_max_connections,
        min_connections: app_config.db_min_connections,
        ..Default::default()
    };
    let pool = establish_connection_with_config(&config).await?;

    if app_config.auto_migrate {
        build_schema(&pool).await?;
    }

    Ok(pool)
}

/// Creates every table from the entity definitions. Idempotent: existing
/// tables are left alone.
pub async fn build_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    async fn create<E: EntityTrait>(
        db: &DatabaseConnection,
        schema: &Schema,
        entity: E,
    ) -> Result<(), DbErr> {
        let backend = db.get_database_backend();
        let mut stmt = schema.create_table_from_entity(entity);
        stmt.if_not_exists();
        db.execute(backend.build(&stmt)).await?;
        debug!(table = %entity.table_name(), "schema table ensured");
        Ok(())
    }

    create(db, &schema, entities::app_user::Entity).await?;
    create(db, &schema, entities::product::Entity).await?;
    create(db, &schema, entities::storage::Entity).await?;
    create(db, &schema, entities::storage_cell::Entity).await?;
    create(db, &schema, entities::shift::Entity).await?;
    create(db, &schema, entities::external_source::Entity).await?;
    create(db, &schema, entities::operation::Entity).await?;
    create(db, &schema, entities::pallet::Entity).await?;
    create(db, &schema, entities::aggregation_code::Entity).await?;
    create(db, &schema, entities::pallet_product::Entity).await?;
    create(db, &schema, entities::pallet_source::Entity).await?;
    create(db, &schema, entities::operation_pallet::Entity).await?;
    create(db, &schema, entities::operation_product::Entity).await?;
    create(db, &schema, entities::operation_cell::Entity).await?;
    create(db, &schema, entities::storage_cell_state::Entity).await?;

    info!("Database schema ensured");
    Ok(())
}
