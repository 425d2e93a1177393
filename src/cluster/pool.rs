//! Connection pool
//!
//! A small generic object pool: a semaphore caps how many objects are out at
//! once, returned objects are kept idle up to a limit, and borrowing hands out
//! an RAII guard that goes back to the pool when dropped.

use crate::client::PeerClient;
use parking_lot::Mutex;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Pool errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool is closed")]
    Closed,

    #[error("failed to create object: {0}")]
    Factory(String),

    #[error("timed out waiting for an idle object")]
    Exhausted,
}

/// Creates, destroys and checks pooled objects
pub trait PoolFactory: Send + Sync + 'static {
    type Object: Send + 'static;

    fn make_object(&self) -> impl Future<Output = Result<Self::Object, PoolError>> + Send;

    fn destroy_object(&self, object: Self::Object) -> impl Future<Output = ()> + Send;

    /// Whether an idle object may be handed out again
    fn validate_object(&self, _object: &Self::Object) -> bool {
        true
    }
}

/// Pool sizing
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Objects that may be borrowed at the same time
    pub max_total: usize,
    /// Returned objects kept for reuse
    pub max_idle: usize,
    /// How long `borrow` waits for a permit once `max_total` are out
    pub max_wait: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_total: 8,
            max_idle: 8,
            max_wait: Duration::from_secs(3),
        }
    }
}

struct PoolInner<F: PoolFactory> {
    factory: F,
    idle: Mutex<Vec<F::Object>>,
    permits: Arc<Semaphore>,
    max_idle: usize,
    max_wait: Duration,
    closed: AtomicBool,
}

impl<F: PoolFactory> PoolInner<F> {
    fn give_back(self: &Arc<Self>, object: F::Object) {
        if !self.closed.load(Ordering::Acquire) {
            let mut idle = self.idle.lock();
            if idle.len() < self.max_idle {
                idle.push(object);
                return;
            }
        }

        // Outside a runtime the object is simply dropped
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let pool = self.clone();
            handle.spawn(async move { pool.factory.destroy_object(object).await });
        }
    }
}

/// Generic object pool
pub struct ObjectPool<F: PoolFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: PoolFactory> ObjectPool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        ObjectPool {
            inner: Arc::new(PoolInner {
                factory,
                idle: Mutex::new(Vec::with_capacity(config.max_idle)),
                permits: Arc::new(Semaphore::new(config.max_total)),
                max_idle: config.max_idle,
                max_wait: config.max_wait,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Take an object, waiting up to `max_wait` while `max_total` are already out
    pub async fn borrow(&self) -> Result<PooledObject<F>, PoolError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        let acquire = self.inner.permits.clone().acquire_owned();
        let permit = tokio::time::timeout(self.inner.max_wait, acquire)
            .await
            .map_err(|_| PoolError::Exhausted)?
            .map_err(|_| PoolError::Closed)?;

        loop {
            let candidate = self.inner.idle.lock().pop();
            match candidate {
                Some(object) if self.inner.factory.validate_object(&object) => {
                    return Ok(self.guard(object, permit));
                }
                Some(stale) => {
                    debug!("Discarding invalid pooled object");
                    self.inner.factory.destroy_object(stale).await;
                }
                None => break,
            }
        }

        let object = self.inner.factory.make_object().await?;
        Ok(self.guard(object, permit))
    }

    fn guard(&self, object: F::Object, permit: OwnedSemaphorePermit) -> PooledObject<F> {
        PooledObject {
            object: Some(object),
            pool: self.inner.clone(),
            _permit: permit,
        }
    }

    /// Objects currently idle
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Reject further borrows and destroy every idle object
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.permits.close();

        let idle: Vec<F::Object> = self.inner.idle.lock().drain(..).collect();
        for object in idle {
            self.inner.factory.destroy_object(object).await;
        }
    }
}

/// A borrowed object; dropping it returns it to the pool
pub struct PooledObject<F: PoolFactory> {
    object: Option<F::Object>,
    pool: Arc<PoolInner<F>>,
    _permit: OwnedSemaphorePermit,
}

impl<F: PoolFactory> Deref for PooledObject<F> {
    type Target = F::Object;

    fn deref(&self) -> &Self::Target {
        match &self.object {
            Some(object) => object,
            // Only emptied inside Drop
            None => unreachable!("pooled object used after return"),
        }
    }
}

impl<F: PoolFactory> Drop for PooledObject<F> {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            self.pool.give_back(object);
        }
    }
}

/// Dials peer clients for one peer address
pub struct PeerClientFactory {
    addr: String,
}

impl PeerClientFactory {
    pub fn new(addr: impl Into<String>) -> Self {
        PeerClientFactory { addr: addr.into() }
    }
}

impl PoolFactory for PeerClientFactory {
    type Object = PeerClient;

    async fn make_object(&self) -> Result<PeerClient, PoolError> {
        PeerClient::connect(&self.addr)
            .await
            .map_err(|e| PoolError::Factory(e.to_string()))
    }

    async fn destroy_object(&self, client: PeerClient) {
        debug!("Closing pooled client for {}", client.addr());
        client.close().await;
    }

    fn validate_object(&self, client: &PeerClient) -> bool {
        !client.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        made: AtomicUsize,
        destroyed: AtomicUsize,
    }

    struct CountingFactory(Arc<Counters>);

    impl PoolFactory for CountingFactory {
        type Object = usize;

        async fn make_object(&self) -> Result<usize, PoolError> {
            Ok(self.0.made.fetch_add(1, Ordering::SeqCst))
        }

        async fn destroy_object(&self, _object: usize) {
            self.0.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool(config: PoolConfig) -> (ObjectPool<CountingFactory>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (ObjectPool::new(CountingFactory(counters.clone()), config), counters)
    }

    #[tokio::test]
    async fn test_returned_object_is_reused() {
        let (pool, counters) = pool(PoolConfig::default());

        let first = pool.borrow().await.unwrap();
        assert_eq!(*first, 0);
        drop(first);
        assert_eq!(pool.idle_count(), 1);

        let again = pool.borrow().await.unwrap();
        assert_eq!(*again, 0);
        assert_eq!(counters.made.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_borrow_waits_at_max_total() {
        let (pool, _) = pool(PoolConfig {
            max_total: 2,
            max_idle: 2,
            ..PoolConfig::default()
        });

        let a = pool.borrow().await.unwrap();
        let _b = pool.borrow().await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), pool.borrow()).await.is_err());

        drop(a);
        let c = tokio::time::timeout(Duration::from_millis(500), pool.borrow()).await;
        assert!(c.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_excess_idle_objects_are_destroyed() {
        let (pool, counters) = pool(PoolConfig {
            max_total: 4,
            max_idle: 1,
            ..PoolConfig::default()
        });

        let a = pool.borrow().await.unwrap();
        let b = pool.borrow().await.unwrap();
        drop(a);
        drop(b);

        for _ in 0..50 {
            if counters.destroyed.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_destroys_idle_and_rejects_borrow() {
        let (pool, counters) = pool(PoolConfig::default());
        drop(pool.borrow().await.unwrap());

        pool.close().await;
        assert_eq!(counters.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.borrow().await.err(), Some(PoolError::Closed));
    }

    #[tokio::test]
    async fn test_borrow_gives_up_after_max_wait() {
        let (pool, _) = pool(PoolConfig {
            max_total: 1,
            max_idle: 1,
            max_wait: Duration::from_millis(50),
        });

        let held = pool.borrow().await.unwrap();
        assert_eq!(pool.borrow().await.err(), Some(PoolError::Exhausted));

        drop(held);
        assert!(pool.borrow().await.is_ok());
    }
}
