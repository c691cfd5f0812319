use crate::error::ExecutionError;
use async_trait::async_trait;

pub mod postgres_psql;

pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Something able to run SQL against a database and report how many rows the
/// statement touched.
///
/// Blocks submit one statement per `execute` call. Transactional blocks go
/// through `atomic` instead, so an engine that cannot keep a session open
/// between calls can still wrap them in a single transaction.
#[async_trait]
pub trait Executor: Send {
    /// Runs one statement and returns its affected row count.
    async fn execute(&mut self, sql: &str) -> ExecutionResult<u64>;

    /// Runs `statements` inside one transaction and returns the row count of
    /// the last one.
    async fn atomic(&mut self, statements: &[String]) -> ExecutionResult<u64> {
        self.execute("BEGIN").await?;

        let mut rowcount = 0;
        for statement in statements {
            match self.execute(statement).await {
                Ok(count) => rowcount = count,
                Err(e) => {
                    if let Err(rollback) = self.execute("ROLLBACK").await {
                        tracing::warn!("rollback after failed statement also failed: {}", rollback);
                    }
                    return Err(e);
                }
            }
        }

        self.execute("COMMIT").await?;
        Ok(rowcount)
    }
}

#[async_trait]
impl<E: Executor + ?Sized> Executor for Box<E> {
    async fn execute(&mut self, sql: &str) -> ExecutionResult<u64> {
        (**self).execute(sql).await
    }

    async fn atomic(&mut self, statements: &[String]) -> ExecutionResult<u64> {
        (**self).atomic(statements).await
    }
}
