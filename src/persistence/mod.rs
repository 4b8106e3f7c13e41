use crate::external_connections;
use crate::external_connections::ConnectionHandle;
use anyhow::Context;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

pub mod db_task_ports;
pub mod db_user_ports;
pub mod dyn_query;

/// Connectivity to the app's backing services, handing out pooled database connections.
#[derive(Clone)]
pub struct ExternalConnectivity {
    db: PgPool,
}

impl ExternalConnectivity {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

pub struct PoolConnectionHandle {
    active_connection: PoolConnection<Postgres>,
}

impl ConnectionHandle for PoolConnectionHandle {
    fn borrow_connection(&mut self) -> &mut PgConnection {
        &mut self.active_connection
    }
}

impl external_connections::ExternalConnectivity for ExternalConnectivity {
    type Handle<'cxn>
        = PoolConnectionHandle
    where
        Self: 'cxn;

    async fn database_cxn(&mut self) -> Result<PoolConnectionHandle, anyhow::Error> {
        let handle = PoolConnectionHandle {
            active_connection: self.db.acquire().await?,
        };

        Ok(handle)
    }
}

impl external_connections::Transactable for ExternalConnectivity {
    type Handle = ExternalConnectionsInTransaction;

    async fn start_transaction(&self) -> Result<ExternalConnectionsInTransaction, anyhow::Error> {
        let transaction = self
            .db
            .begin()
            .await
            .context("starting a transaction from the db pool")?;

        Ok(ExternalConnectionsInTransaction { txn: transaction })
    }
}

/// Connectivity where every handed-out connection participates in one database
/// transaction. Dropping this without committing rolls everything back.
pub struct ExternalConnectionsInTransaction {
    txn: Transaction<'static, Postgres>,
}

pub struct TransactionHandle<'tx> {
    active_transaction: &'tx mut PgConnection,
}

impl external_connections::ExternalConnectivity for ExternalConnectionsInTransaction {
    type Handle<'cxn>
        = TransactionHandle<'cxn>
    where
        Self: 'cxn;

    async fn database_cxn(&mut self) -> Result<TransactionHandle<'_>, anyhow::Error> {
        Ok(TransactionHandle {
            active_transaction: &mut *self.txn,
        })
    }
}

impl ConnectionHandle for TransactionHandle<'_> {
    fn borrow_connection(&mut self) -> &mut PgConnection {
        &mut *self.active_transaction
    }
}

impl external_connections::TransactionHandle for ExternalConnectionsInTransaction {
    async fn commit(self) -> Result<(), anyhow::Error> {
        self.txn
            .commit()
            .await
            .context("committing a database transaction")?;

        Ok(())
    }
}
