use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use autorc_protocol::CoreError;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::conn::ModbusConn;

pub type Connector = Arc<dyn Fn() -> BoxFuture<'static, Result<Box<dyn ModbusConn>, CoreError>> + Send + Sync>;
type Grant = Result<Box<dyn ModbusConn>, CoreError>;

struct PoolState {
    num_open: usize,
    closed: bool,
    waiters: VecDeque<oneshot::Sender<Grant>>,
}

/// A bounded pool of field-bus connections with FIFO waiters.
///
/// `max_open` is a soft cap (`0` means unlimited). A connection is never
/// reused across acquires — [`ConnPool::release`] always drops the
/// underlying transport; the pool's only cache is the open-connection
/// count. See the module invariants in [`crate`] docs for the release/FIFO
/// contract this implements.
pub struct ConnPool {
    connector: Connector,
    max_open: usize,
    conn_timeout: Duration,
    state: Mutex<PoolState>,
}

impl ConnPool {
    /// Builds the pool and issues one startup `Ping` through the normal
    /// acquire path (§4.6); failure returns `PoolConnFailed`.
    pub async fn connect(connector: Connector, max_open: usize, conn_timeout: Duration) -> Result<Arc<Self>, CoreError> {
        let pool = Arc::new(Self {
            connector,
            max_open,
            conn_timeout,
            state: Mutex::new(PoolState {
                num_open: 0,
                closed: false,
                waiters: VecDeque::new(),
            }),
        });

        let cancel = CancellationToken::new();
        let mut conn = pool.acquire(&cancel).await?;
        let result = conn.ping().await;
        pool.release(conn).await;
        result.map_err(CoreError::pool_conn_failed)?;
        Ok(pool)
    }

    /// Parks if `max_open` is already reached; honors `cancel` while
    /// parked and before dialing.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Box<dyn ModbusConn>, CoreError> {
        if cancel.is_cancelled() {
            return Err(CoreError::ConnClosed);
        }

        let mut state = self.state.lock().await;
        if state.closed {
            return Err(CoreError::PoolClosed);
        }

        if self.max_open == 0 || state.num_open < self.max_open {
            state.num_open += 1;
            drop(state);
            return match (self.connector)().await {
                Ok(conn) => Ok(conn),
                Err(err) => {
                    let mut state = self.state.lock().await;
                    state.num_open = state.num_open.saturating_sub(1);
                    Err(CoreError::pool_conn_failed(err))
                },
            };
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        drop(state);

        tokio::select! {
            () = cancel.cancelled() => Err(CoreError::ConnClosed),
            grant = rx => grant.unwrap_or(Err(CoreError::PoolClosed)),
        }
    }

    /// Releases `conn` back to the pool: decrements `num_open` once, and if
    /// a waiter is parked, opens a fresh connection outside the lock and
    /// hands it to the oldest waiter without a second increment — the
    /// decrement-then-forward sequence nets to one fewer open connection,
    /// same as a release with no waiter.
    pub async fn release(&self, conn: Box<dyn ModbusConn>) {
        drop(conn);

        let waiter = {
            let mut state = self.state.lock().await;
            state.num_open = state.num_open.saturating_sub(1);
            state.waiters.pop_front()
        };

        let Some(tx) = waiter else { return };
        let grant = (self.connector)().await.map_err(CoreError::pool_conn_failed);
        if tx.send(grant).is_err() {
            warn!("pool waiter dropped before a forwarded connection could be delivered");
        }
    }

    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        while let Some(tx) = state.waiters.pop_front() {
            let _ = tx.send(Err(CoreError::PoolClosed));
        }
    }

    /// Acquires, reads one holding-register word, and releases — even on
    /// error.
    pub async fn read_word(&self, cancel: &CancellationToken, register: u16) -> Result<u16, CoreError> {
        let mut conn = self.acquire(cancel).await?;
        if !conn.can_read() {
            self.release(conn).await;
            return Err(CoreError::WriteOnly);
        }
        let result = tokio::time::timeout(self.conn_timeout, conn.read_word(register))
            .await
            .unwrap_or(Err(CoreError::ConnTimeout));
        self.release(conn).await;
        result
    }

    /// Acquires, writes one holding-register word, and releases — even on
    /// error.
    pub async fn write_word(&self, cancel: &CancellationToken, register: u16, value: u16) -> Result<(), CoreError> {
        let mut conn = self.acquire(cancel).await?;
        if !conn.can_write() {
            self.release(conn).await;
            return Err(CoreError::ReadOnly);
        }
        let result = tokio::time::timeout(self.conn_timeout, conn.write_word(register, value))
            .await
            .unwrap_or(Err(CoreError::ConnTimeout));
        self.release(conn).await;
        result
    }

    #[must_use]
    pub async fn num_open(&self) -> usize {
        self.state.lock().await.num_open
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct FakeConn {
        id: u64,
    }

    #[async_trait]
    impl ModbusConn for FakeConn {
        async fn read_word(&mut self, _register: u16) -> Result<u16, CoreError> {
            Ok(u16::try_from(self.id).unwrap_or(0))
        }

        async fn write_word(&mut self, _register: u16, _value: u16) -> Result<(), CoreError> {
            Ok(())
        }

        async fn ping(&mut self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn counting_connector() -> Connector {
        let next = Arc::new(AtomicU64::new(0));
        Arc::new(move || {
            let id = next.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(Box::new(FakeConn { id }) as Box<dyn ModbusConn>) })
        })
    }

    #[tokio::test]
    async fn num_open_never_exceeds_max_open() {
        let pool = ConnPool::connect(counting_connector(), 2, Duration::from_millis(100)).await.unwrap();
        let cancel = CancellationToken::new();

        let a = pool.acquire(&cancel).await.unwrap();
        let b = pool.acquire(&cancel).await.unwrap();
        assert_eq!(pool.num_open().await, 2);

        pool.release(a).await;
        pool.release(b).await;
        assert_eq!(pool.num_open().await, 0);
    }

    #[tokio::test]
    async fn waiters_are_granted_in_fifo_order() {
        let pool = ConnPool::connect(counting_connector(), 1, Duration::from_millis(100)).await.unwrap();
        let cancel = CancellationToken::new();

        let held = pool.acquire(&cancel).await.unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3u32 {
            let pool = Arc::clone(&pool);
            let cancel = cancel.clone();
            let order = Arc::clone(&order);
            tokio::time::sleep(Duration::from_millis(5)).await;
            handles.push(tokio::spawn(async move {
                let conn = pool.acquire(&cancel).await.unwrap();
                order.lock().await.push(i);
                pool.release(conn).await;
            }));
        }

        // Give all three a chance to park before releasing the held slot.
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.release(held).await;
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock().await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn closed_pool_rejects_acquire() {
        let pool = ConnPool::connect(counting_connector(), 1, Duration::from_millis(100)).await.unwrap();
        pool.close().await;
        let cancel = CancellationToken::new();
        assert!(matches!(pool.acquire(&cancel).await, Err(CoreError::PoolClosed)));
    }
}
