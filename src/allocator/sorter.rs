//! Dominant resource fairness sorter.

use std::collections::BTreeMap;

use crate::allocator::resources::Resources;

/// Orders clients by dominant share of the cluster total, lowest first.
#[derive(Debug, Clone, Default)]
pub struct DrfSorter {
    total: Resources,
    clients: BTreeMap<String, Resources>,
}

impl DrfSorter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, client: &str) {
        self.clients.entry(client.to_string()).or_default();
    }

    pub fn remove(&mut self, client: &str) {
        self.clients.remove(client);
    }

    pub fn contains(&self, client: &str) -> bool {
        self.clients.contains_key(client)
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn total(&self) -> Resources {
        self.total
    }

    pub fn add_total(&mut self, resources: Resources) {
        self.total += resources;
    }

    pub fn remove_total(&mut self, resources: Resources) {
        self.total -= resources;
    }

    pub fn allocated(&mut self, client: &str, resources: Resources) {
        if let Some(allocation) = self.clients.get_mut(client) {
            *allocation += resources;
        }
    }

    pub fn unallocated(&mut self, client: &str, resources: Resources) {
        if let Some(allocation) = self.clients.get_mut(client) {
            *allocation -= resources;
        }
    }

    pub fn share(&self, client: &str) -> f64 {
        self.clients
            .get(client)
            .map(|allocation| allocation.dominant_share(&self.total))
            .unwrap_or(0.0)
    }

    /// Clients ordered by ascending share; ties break on name.
    pub fn sort(&self) -> Vec<String> {
        let mut ordered: Vec<(f64, &String)> = self
            .clients
            .iter()
            .map(|(name, allocation)| (allocation.dominant_share(&self.total), name))
            .collect();
        ordered.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        ordered.into_iter().map(|(_, name)| name.clone()).collect()
    }
}
