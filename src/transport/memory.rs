//! In-Memory Query Client
//!
//! A deterministic stand-in for a live remote node. Values are written with
//! [`InMemoryClient::insert`] and pushed as full snapshots to every open
//! subscription that covers the written address. Failure modes (refused
//! subscriptions, silent feeds, subscriptions that never open, a lost
//! connection) can be switched on per query, which is how the batch machinery is exercised in tests and in the
//! demo binary.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::{LiveSubscription, QueryDescriptor, RemoteQueryClient, Snapshot, Unsubscribe};
use crate::batch::Address;
use crate::error::{MetaError, MetaResult};

struct Subscriber {
    id: Uuid,
    query: QueryDescriptor,
    addresses: Vec<Address>,
    tx: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct State {
    storage: HashMap<QueryDescriptor, HashMap<Address, Value>>,
    subscribers: Vec<Subscriber>,
    refused: HashSet<QueryDescriptor>,
    silent: HashSet<QueryDescriptor>,
    stalled: HashSet<QueryDescriptor>,
    calls: Vec<(QueryDescriptor, Vec<Address>)>,
}

impl State {
    fn snapshot(&self, query: &QueryDescriptor, addresses: &[Address]) -> Snapshot {
        let map = self.storage.get(query);
        addresses
            .iter()
            .map(|a| map.and_then(|m| m.get(a)).cloned())
            .collect()
    }

    fn notify(&mut self, query: &QueryDescriptor, changed: &[Address]) {
        if self.silent.contains(query) {
            return;
        }
        let mut updates = Vec::new();
        for sub in self.subscribers.iter().filter(|s| &s.query == query) {
            if sub.addresses.iter().any(|a| changed.contains(a)) {
                updates.push((sub.tx.clone(), self.snapshot(query, &sub.addresses)));
            }
        }
        for (tx, snapshot) in updates {
            let _ = tx.send(snapshot);
        }
    }
}

#[derive(Clone)]
pub struct InMemoryClient {
    state: Arc<Mutex<State>>,
    ready: Arc<AtomicBool>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Store a value and push fresh snapshots to affected subscriptions
    pub fn insert(&self, query: &QueryDescriptor, address: impl Into<Address>, value: Value) {
        let address = address.into();
        let mut state = self.lock();
        state
            .storage
            .entry(query.clone())
            .or_default()
            .insert(address.clone(), value);
        state.notify(query, &[address]);
    }

    /// Store several values, notifying each subscription once
    pub fn insert_all<I, A>(&self, query: &QueryDescriptor, values: I)
    where
        I: IntoIterator<Item = (A, Value)>,
        A: Into<Address>,
    {
        let mut state = self.lock();
        let mut changed = Vec::new();
        let map = state.storage.entry(query.clone()).or_default();
        for (address, value) in values {
            let address = address.into();
            map.insert(address.clone(), value);
            changed.push(address);
        }
        state.notify(query, &changed);
    }

    /// Delete a stored value and push fresh snapshots
    pub fn remove(&self, query: &QueryDescriptor, address: &Address) {
        let mut state = self.lock();
        if let Some(map) = state.storage.get_mut(query) {
            map.remove(address);
        }
        state.notify(query, std::slice::from_ref(address));
    }

    /// Deliver an arbitrary snapshot to every subscription of `query`,
    /// whether or not it matches the subscribed address count
    pub fn push_raw(&self, query: &QueryDescriptor, snapshot: Snapshot) {
        let state = self.lock();
        for sub in state.subscribers.iter().filter(|s| &s.query == query) {
            let _ = sub.tx.send(snapshot.clone());
        }
    }

    /// Make subscribe calls for `query` fail
    pub fn refuse(&self, query: &QueryDescriptor, refuse: bool) {
        let mut state = self.lock();
        if refuse {
            state.refused.insert(query.clone());
        } else {
            state.refused.remove(query);
        }
    }

    /// Establish subscriptions for `query` but never deliver on them
    pub fn silence(&self, query: &QueryDescriptor, silent: bool) {
        let mut state = self.lock();
        if silent {
            state.silent.insert(query.clone());
        } else {
            state.silent.remove(query);
        }
    }

    /// Make subscribe calls for `query` hang without ever resolving
    pub fn stall(&self, query: &QueryDescriptor, stall: bool) {
        let mut state = self.lock();
        if stall {
            state.stalled.insert(query.clone());
        } else {
            state.stalled.remove(query);
        }
    }

    /// Number of subscriptions that have not been cancelled
    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn active_for(&self, query: &QueryDescriptor) -> usize {
        self.lock().subscribers.iter().filter(|s| &s.query == query).count()
    }

    /// Subscriptions of `query` whose consumer is still receiving
    pub fn open_feeds(&self, query: &QueryDescriptor) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|s| &s.query == query && !s.tx.is_closed())
            .count()
    }

    /// Address lists of every subscribe call made for `query`, in order
    pub fn subscribe_calls(&self, query: &QueryDescriptor) -> Vec<Vec<Address>> {
        self.lock()
            .calls
            .iter()
            .filter(|(q, _)| q == query)
            .map(|(_, a)| a.clone())
            .collect()
    }
}

impl Default for InMemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteQueryClient for InMemoryClient {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn subscribe_multi(&self, query: &QueryDescriptor, addresses: &[Address]) -> MetaResult<LiveSubscription> {
        if !self.is_ready() {
            return Err(MetaError::NotReady);
        }

        let stalled = {
            let mut state = self.lock();
            state.calls.push((query.clone(), addresses.to_vec()));
            state.stalled.contains(query)
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        {
            let mut state = self.lock();
            if state.refused.contains(query) {
                return Err(MetaError::Transport(format!("subscription to {} refused", query)));
            }
            if !state.silent.contains(query) {
                let _ = tx.send(state.snapshot(query, addresses));
            }
            state.subscribers.push(Subscriber {
                id,
                query: query.clone(),
                addresses: addresses.to_vec(),
                tx,
            });
        }
        debug!("Opened {} over {} addresses ({})", query, addresses.len(), id);

        let state = self.state.clone();
        let handle = Unsubscribe::new(move || {
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.subscribers.retain(|s| s.id != id);
        });

        Ok(LiveSubscription { handle, updates: rx })
    }

    async fn query_single_once(&self, query: &QueryDescriptor, address: &Address) -> MetaResult<Option<Value>> {
        if !self.is_ready() {
            return Err(MetaError::NotReady);
        }
        let state = self.lock();
        Ok(state.storage.get(query).and_then(|m| m.get(address)).cloned())
    }

    async fn entries(&self, query: &QueryDescriptor) -> MetaResult<Vec<(Address, Value)>> {
        if !self.is_ready() {
            return Err(MetaError::NotReady);
        }
        let state = self.lock();
        let mut entries: Vec<_> = state
            .storage
            .get(query)
            .map(|m| m.iter().map(|(a, v)| (a.clone(), v.clone())).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}
