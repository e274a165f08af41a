//! SQLite persistence through SeaORM.
//!
//! Records live in the `tasks` table, created from the [`task`] entity on
//! connect. Each [`WriteBatch`] is applied inside one database transaction;
//! any failing statement drops the transaction and rolls every row back.

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, ExecResult, QueryOrder, Schema, TransactionTrait,
    sea_query::SqliteQueryBuilder,
};
use uuid::Uuid;

use crate::persistence::{TaskPersistence, WriteBatch};
use crate::record::{TaskRecord, normalize_remote_id};

pub mod task {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "tasks")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        pub title: String,
        pub description: Option<String>,
        pub is_completed: bool,
        pub owner_id: i64,
        pub created_at: DateTimeUtc,
        pub remote_id: Option<i64>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

impl TryFrom<task::Model> for TaskRecord {
    type Error = DbErr;

    fn try_from(model: task::Model) -> Result<Self, Self::Error> {
        let local_id = Uuid::parse_str(&model.id)
            .map_err(|e| DbErr::Type(format!("invalid task id {:?}: {}", model.id, e)))?;
        Ok(TaskRecord {
            local_id,
            title: model.title,
            description: model.description,
            is_completed: model.is_completed,
            owner_id: model.owner_id,
            created_at: model.created_at,
            remote_id: normalize_remote_id(model.remote_id),
        })
    }
}

impl From<&TaskRecord> for task::ActiveModel {
    fn from(record: &TaskRecord) -> Self {
        task::ActiveModel {
            id: Set(record.local_id.to_string()),
            title: Set(record.title.clone()),
            description: Set(record.description.clone()),
            is_completed: Set(record.is_completed),
            owner_id: Set(record.owner_id),
            created_at: Set(record.created_at),
            remote_id: Set(normalize_remote_id(record.remote_id)),
        }
    }
}

/// Create the `tasks` table if it does not already exist.
pub async fn create_task_table(db: &impl ConnectionTrait) -> Result<ExecResult, DbErr> {
    let schema = Schema::new(db.get_database_backend());
    let create_stmt = schema
        .create_table_from_entity(task::Entity)
        .if_not_exists()
        .to_owned();
    db.execute_unprepared(&create_stmt.to_string(SqliteQueryBuilder))
        .await
}

/// SeaORM-backed [`TaskPersistence`].
#[derive(Debug, Clone)]
pub struct SqlitePersistence {
    db: DatabaseConnection,
}

impl SqlitePersistence {
    /// Open (or create) the database at `url` and ensure the schema exists.
    ///
    /// The pool is capped at one connection: every write goes through the
    /// same connection, and `sqlite::memory:` stays a single database.
    pub async fn connect(url: &str) -> Result<Self, DbErr> {
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await?;
        Self::from_connection(db).await
    }

    /// Wrap an existing connection, creating the `tasks` table if needed.
    pub async fn from_connection(db: DatabaseConnection) -> Result<Self, DbErr> {
        create_task_table(&db).await?;
        log::debug!("Task table ready");
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait::async_trait]
impl TaskPersistence for SqlitePersistence {
    async fn load_all(&self) -> Result<Vec<TaskRecord>, DbErr> {
        task::Entity::find()
            .order_by_desc(task::Column::CreatedAt)
            .order_by_asc(task::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(TaskRecord::try_from)
            .collect()
    }

    async fn load(&self, local_id: Uuid) -> Result<Option<TaskRecord>, DbErr> {
        task::Entity::find_by_id(local_id.to_string())
            .one(&self.db)
            .await?
            .map(TaskRecord::try_from)
            .transpose()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), DbErr> {
        let (saves, deletes) = batch.into_parts();
        let txn = self.db.begin().await?;

        for record in &saves {
            let exists = task::Entity::find_by_id(record.local_id.to_string())
                .one(&txn)
                .await?
                .is_some();
            let model = task::ActiveModel::from(record);
            if exists {
                model.update(&txn).await?;
            } else {
                model.insert(&txn).await?;
            }
        }
        for local_id in &deletes {
            task::Entity::delete_by_id(local_id.to_string())
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        log::debug!(
            "Committed {} saves and {} deletes",
            saves.len(),
            deletes.len()
        );
        Ok(())
    }
}
