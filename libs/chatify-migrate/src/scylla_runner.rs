use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;

use crate::{Migration, MigrationError, MigrationRecord, MigrationRunner};

pub struct ScyllaMigrationRunner {
    session: Session,
    ledger_table: String,
}

impl ScyllaMigrationRunner {
    /// Connects and ensures the keyspace exists (creating it with a
    /// single-datacenter `SimpleStrategy` replication factor when missing —
    /// adequate for the ledger table's own bootstrap; the deployed keyspace's
    /// real replication is expected to already exist in production).
    ///
    /// `ledger_table` is `Schema.MigrationTable` — the name of the
    /// applied-migrations ledger, configurable per deployment so it can
    /// coexist with another schema owner's own migration bookkeeping in the
    /// same keyspace.
    pub async fn connect(
        contact_points: &[String],
        keyspace: &str,
        ledger_table: &str,
    ) -> Result<Self, MigrationError> {
        let session = SessionBuilder::new()
            .known_nodes(contact_points)
            .build()
            .await
            .map_err(|err| MigrationError::Connect(anyhow::Error::new(err)))?;

        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {keyspace} WITH replication = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}"
                ),
                &[],
            )
            .await
            .map_err(|err| MigrationError::Connect(anyhow::Error::new(err)))?;
        session
            .use_keyspace(keyspace, false)
            .await
            .map_err(|err| MigrationError::Connect(anyhow::Error::new(err)))?;

        // The ledger table must exist before `applied()` can be queried; this
        // bootstraps it outside the normal migration list since it is what
        // makes that list's idempotence possible in the first place.
        session
            .query_unpaged(
                format!(
                    "CREATE TABLE IF NOT EXISTS {ledger_table} (
                        module_name text,
                        migration_id text,
                        applied_at_utc timestamp,
                        applied_by text,
                        PRIMARY KEY (module_name, migration_id)
                    )"
                ),
                &[],
            )
            .await
            .map_err(|err| MigrationError::Connect(anyhow::Error::new(err)))?;

        Ok(Self {
            session,
            ledger_table: ledger_table.to_string(),
        })
    }
}

#[async_trait]
impl MigrationRunner for ScyllaMigrationRunner {
    async fn applied(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let select = format!(
            "SELECT module_name, migration_id, applied_at_utc, applied_by FROM {}",
            self.ledger_table
        );
        let result = self
            .session
            .query_unpaged(select, &[])
            .await
            .map_err(|err| {
                MigrationError::Apply {
                    module: self.ledger_table.clone(),
                    id: "select".into(),
                    source: anyhow::Error::new(err),
                }
            })?;
        let rows = result.into_rows_result().map_err(|err| MigrationError::Apply {
            module: self.ledger_table.clone(),
            id: "select".into(),
            source: anyhow::Error::new(err),
        })?;

        let mut records = Vec::new();
        for row in rows
            .rows::<(String, String, time::OffsetDateTime, String)>()
            .map_err(|err| MigrationError::Apply {
                module: self.ledger_table.clone(),
                id: "select".into(),
                source: anyhow::Error::new(err),
            })?
        {
            let (module, id, applied_at_utc, applied_by) = row.map_err(|err| MigrationError::Apply {
                module: self.ledger_table.clone(),
                id: "select".into(),
                source: anyhow::Error::new(err),
            })?;
            records.push(MigrationRecord {
                module,
                id,
                applied_at_utc,
                applied_by,
            });
        }
        Ok(records)
    }

    async fn apply(&self, migration: &Migration, applied_by: &str) -> Result<(), MigrationError> {
        self.session
            .query_unpaged(migration.ddl, &[])
            .await
            .map_err(|err| MigrationError::Apply {
                module: migration.module.into(),
                id: migration.id.into(),
                source: anyhow::Error::new(err),
            })?;
        let insert = format!(
            "INSERT INTO {} (module_name, migration_id, applied_at_utc, applied_by) VALUES (?, ?, ?, ?)",
            self.ledger_table
        );
        self.session
            .query_unpaged(
                insert,
                (
                    migration.module,
                    migration.id,
                    time::OffsetDateTime::now_utc(),
                    applied_by,
                ),
            )
            .await
            .map_err(|err| MigrationError::Apply {
                module: migration.module.into(),
                id: migration.id.into(),
                source: anyhow::Error::new(err),
            })?;
        Ok(())
    }
}
