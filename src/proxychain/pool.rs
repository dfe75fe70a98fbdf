//! Reusable chain pool.
//!
//! A chain is exclusively owned by one request. The pool hands out idle
//! chains built from a shared template and takes them back, reset, when the
//! guard is dropped.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use super::chain::ProxyChain;
use super::client::UpstreamClient;
use super::modifier::{RequestModifier, ResponseModifier};
use super::resolver::TargetResolver;

/// Everything a fresh chain is configured with.
#[derive(Clone)]
pub struct ChainTemplate {
    pub client: Arc<dyn UpstreamClient>,
    pub request_modifiers: Vec<Arc<dyn RequestModifier>>,
    pub response_modifiers: Vec<Arc<dyn ResponseModifier>>,
    pub resolver: TargetResolver,
    pub debug: bool,
}

impl ChainTemplate {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self {
            client,
            request_modifiers: Vec::new(),
            response_modifiers: Vec::new(),
            resolver: TargetResolver::default(),
            debug: false,
        }
    }

    fn build(&self) -> ProxyChain {
        let mut chain = ProxyChain::new(self.client.clone());
        chain
            .set_request_modifiers(self.request_modifiers.clone())
            .set_response_modifiers(self.response_modifiers.clone())
            .set_resolver(self.resolver.clone())
            .set_debug(self.debug);
        chain
    }
}

/// Free list of idle chains.
pub struct ChainPool {
    template: ChainTemplate,
    idle: Mutex<Vec<ProxyChain>>,
    capacity: usize,
}

impl ChainPool {
    /// `capacity` bounds the number of idle chains kept for reuse.
    pub fn new(template: ChainTemplate, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            template,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        })
    }

    pub fn template(&self) -> &ChainTemplate {
        &self.template
    }

    /// Take an idle chain, or build one if none is free.
    pub fn acquire(self: &Arc<Self>) -> PooledChain {
        let chain = self.lock_idle().pop().unwrap_or_else(|| {
            tracing::trace!("Building new proxy chain");
            self.template.build()
        });
        PooledChain {
            pool: self.clone(),
            chain: Some(chain),
        }
    }

    /// Number of chains waiting for reuse.
    pub fn idle(&self) -> usize {
        self.lock_idle().len()
    }

    fn release(&self, mut chain: ProxyChain) {
        chain.reset();
        let mut idle = self.lock_idle();
        if idle.len() < self.capacity {
            idle.push(chain);
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<ProxyChain>> {
        self.idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A chain on loan from a [`ChainPool`]; returned on drop.
pub struct PooledChain {
    pool: Arc<ChainPool>,
    chain: Option<ProxyChain>,
}

impl Deref for PooledChain {
    type Target = ProxyChain;
    fn deref(&self) -> &Self::Target {
        // only None inside drop
        self.chain.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledChain {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.chain.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledChain {
    fn drop(&mut self) {
        if let Some(chain) = self.chain.take() {
            self.pool.release(chain);
        }
    }
}
