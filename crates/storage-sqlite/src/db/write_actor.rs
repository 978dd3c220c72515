//! Single-writer actor for the sqlite database.
//!
//! All mutations are funneled through one dedicated thread holding one
//! connection at a time, each job wrapped in an IMMEDIATE transaction.
//! This sidesteps `SQLITE_BUSY` contention between pooled writers while
//! reads keep using the pool directly.

use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::error;
use tokio::sync::{mpsc, oneshot};

use ledgersync_core::Result;

use crate::errors::StorageError;

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Cloneable handle submitting write jobs to the writer thread.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<WriteJob>,
}

impl WriteHandle {
    /// Run `job` inside an IMMEDIATE transaction on the writer thread.
    ///
    /// An error returned by the closure rolls the transaction back and is
    /// handed back to the caller unchanged.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();

        let wrapped: WriteJob = Box::new(move |conn| {
            let result = conn
                .immediate_transaction::<T, StorageError, _>(|tx| {
                    job(tx).map_err(StorageError::from)
                })
                .map_err(ledgersync_core::Error::from);
            let _ = reply_tx.send(result);
        });

        self.tx
            .send(wrapped)
            .map_err(|_| StorageError::WriterGone("writer thread has shut down".to_string()))?;

        reply_rx
            .await
            .map_err(|_| StorageError::WriterGone("writer dropped the reply".to_string()))?
    }
}

/// Spawn the writer thread. The thread exits when every [`WriteHandle`]
/// clone has been dropped.
pub fn spawn_writer(pool: Pool<ConnectionManager<SqliteConnection>>) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteJob>();

    std::thread::Builder::new()
        .name("sqlite-writer".to_string())
        .spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                match pool.get() {
                    Ok(mut conn) => job(&mut conn),
                    // The job's reply channel is dropped with the job; the
                    // caller observes a WriterGone error.
                    Err(err) => error!("Writer could not obtain a connection: {}", err),
                }
            }
        })
        .ok();

    WriteHandle { tx }
}
