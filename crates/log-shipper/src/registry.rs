//! Shared rotating registry of remote-endpoint links.
//!
//! One registry is shared by every pipeline in the process, so the rotation
//! cursor interleaves acquisitions across businesses. It is passed around as
//! `Arc<LinkRegistry>` rather than living in a global.

use crate::pool::ClientPool;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// One rotation entry: a client pool and the businesses routed to it.
///
/// Attachments are counted per business, so a business stays routed while
/// any of its attachments is held.
pub struct PoolLink {
    pool: Arc<dyn ClientPool>,
    businesses: Mutex<HashMap<String, usize>>,
}

impl PoolLink {
    /// Create a link with no businesses attached.
    pub fn new(pool: Arc<dyn ClientPool>) -> Self {
        Self {
            pool,
            businesses: Mutex::new(HashMap::new()),
        }
    }

    /// The link's client pool.
    pub fn pool(&self) -> &Arc<dyn ClientPool> {
        &self.pool
    }

    /// Take one attachment for a business. Returns true if the business was
    /// not routed to this link before.
    pub fn attach_business(&self, business: &str) -> bool {
        let mut businesses = self.businesses.lock();
        let count = businesses.entry(business.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Release one attachment. Returns false if the business held none.
    pub fn detach_business(&self, business: &str) -> bool {
        let mut businesses = self.businesses.lock();
        match businesses.get_mut(business) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                businesses.remove(business);
                true
            }
            None => false,
        }
    }

    pub fn has_business(&self, business: &str) -> bool {
        self.businesses.lock().contains_key(business)
    }

    /// Snapshot of the attached businesses.
    pub fn businesses(&self) -> Vec<String> {
        self.businesses.lock().keys().cloned().collect()
    }
}

impl std::fmt::Debug for PoolLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolLink")
            .field("endpoint", &self.pool.endpoint())
            .field("businesses", &self.businesses())
            .finish()
    }
}

/// Round-robin registry of links.
///
/// The cursor is the back of the deque: `next_link` hands out the back entry
/// and moves it to the front.
#[derive(Default)]
pub struct LinkRegistry {
    links: Mutex<VecDeque<Arc<PoolLink>>>,
}

impl LinkRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with one link per pool.
    pub fn from_pools<I>(pools: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ClientPool>>,
    {
        let registry = Self::new();
        for pool in pools {
            registry.add_link(Arc::new(PoolLink::new(pool)));
        }
        registry
    }

    /// Add a link; it becomes the next one handed out.
    pub fn add_link(&self, link: Arc<PoolLink>) {
        debug!(endpoint = %link.pool().endpoint(), "Registered pool link");
        self.links.lock().push_back(link);
    }

    /// The link the cursor currently points at.
    pub fn current_link(&self) -> Option<Arc<PoolLink>> {
        self.links.lock().back().cloned()
    }

    /// Move the cursor one step.
    pub fn advance_rotation(&self) {
        let mut links = self.links.lock();
        if let Some(link) = links.pop_back() {
            links.push_front(link);
        }
    }

    /// Take the current link and advance the cursor, as one step.
    pub fn next_link(&self) -> Option<Arc<PoolLink>> {
        let mut links = self.links.lock();
        let link = links.pop_back()?;
        links.push_front(link.clone());
        Some(link)
    }

    /// Snapshot of all links in rotation order (next first).
    pub fn links(&self) -> Vec<Arc<PoolLink>> {
        self.links.lock().iter().rev().cloned().collect()
    }

    /// Take one attachment for a business on every link.
    pub fn attach_business(&self, business: &str) {
        for link in self.links() {
            link.attach_business(business);
        }
    }

    /// Release one attachment for a business on every link. Returns how many
    /// links held one.
    pub fn detach_business(&self, business: &str) -> usize {
        self.links()
            .iter()
            .filter(|link| link.detach_business(business))
            .count()
    }

    pub fn len(&self) -> usize {
        self.links.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.lock().is_empty()
    }
}
