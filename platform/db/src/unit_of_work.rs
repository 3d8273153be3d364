use sea_orm::{DatabaseTransaction, EntityTrait, TransactionTrait};
use tracing::debug;

use crate::{DbPool, DbResult, Repository};

/// Entry point to data access. Reads go straight to the pool; writes that
/// must land together run inside a [`Transaction`].
#[derive(Clone)]
pub struct UnitOfWork {
    pool: DbPool,
}

impl UnitOfWork {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn repository<E: EntityTrait>(&self) -> Repository<'_, E, DbPool> {
        Repository::new(&self.pool)
    }

    pub async fn begin(&self) -> DbResult<Transaction> {
        let txn = self.pool.begin().await?;
        debug!("transaction started");
        Ok(Transaction { txn })
    }
}

/// An open transaction. Writes issued through its repositories become
/// visible on [`Transaction::commit`]; dropping it without committing rolls
/// back.
pub struct Transaction {
    txn: DatabaseTransaction,
}

impl Transaction {
    pub fn repository<E: EntityTrait>(&self) -> Repository<'_, E, DatabaseTransaction> {
        Repository::new(&self.txn)
    }

    pub fn connection(&self) -> &DatabaseTransaction {
        &self.txn
    }

    pub async fn commit(self) -> DbResult<()> {
        self.txn.commit().await?;
        debug!("transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.txn.rollback().await?;
        debug!("transaction rolled back");
        Ok(())
    }
}
