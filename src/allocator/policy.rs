//! Allocation policies.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::allocator::resources::Resources;
use crate::allocator::sorter::DrfSorter;
use crate::ids::{AgentId, FrameworkId};

/// Resources of one agent handed to one framework.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub framework_id: FrameworkId,
    pub agent_id: AgentId,
    pub resources: Resources,
}

/// Decides which framework receives which agent's free resources.
///
/// Implementations are driven by a single allocator actor, so they need no
/// internal synchronization.
pub trait AllocatorPolicy: Send + 'static {
    fn name(&self) -> &'static str;

    fn add_framework(&mut self, framework_id: FrameworkId, role: &str);

    /// Forget the framework and return everything it held to its agents.
    fn remove_framework(&mut self, framework_id: &FrameworkId);

    fn add_agent(&mut self, agent_id: AgentId, total: Resources);

    fn remove_agent(&mut self, agent_id: &AgentId);

    /// Give back resources previously allocated to a framework.
    fn recover(&mut self, framework_id: &FrameworkId, agent_id: &AgentId, resources: Resources);

    /// Hand out every agent's free resources.
    fn allocate(&mut self) -> Vec<Allocation>;
}

#[derive(Debug, Clone)]
struct Agent {
    total: Resources,
    available: Resources,
}

/// Two-level DRF: roles compete first, then frameworks within the role.
#[derive(Debug, Default)]
pub struct HierarchicalDrfPolicy {
    roles: DrfSorter,
    frameworks: HashMap<String, DrfSorter>,
    framework_roles: HashMap<FrameworkId, String>,
    agents: BTreeMap<AgentId, Agent>,
    allocations: HashMap<FrameworkId, HashMap<AgentId, Resources>>,
}

impl HierarchicalDrfPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dominant share of a framework within its role.
    pub fn framework_share(&self, framework_id: &FrameworkId) -> Option<f64> {
        let role = self.framework_roles.get(framework_id)?;
        let sorter = self.frameworks.get(role)?;
        Some(sorter.share(framework_id.as_str()))
    }

    pub fn available(&self, agent_id: &AgentId) -> Option<Resources> {
        self.agents.get(agent_id).map(|agent| agent.available)
    }

    /// Next framework in (role order, framework order).
    fn next_framework(&self) -> Option<(String, FrameworkId)> {
        for role in self.roles.sort() {
            let Some(sorter) = self.frameworks.get(&role) else {
                continue;
            };
            if let Some(framework) = sorter.sort().into_iter().next() {
                return Some((role, FrameworkId::from(framework)));
            }
        }
        None
    }

    fn unallocate(&mut self, framework_id: &FrameworkId, resources: Resources) {
        if let Some(role) = self.framework_roles.get(framework_id) {
            self.roles.unallocated(role, resources);
            if let Some(sorter) = self.frameworks.get_mut(role) {
                sorter.unallocated(framework_id.as_str(), resources);
            }
        }
    }
}

impl AllocatorPolicy for HierarchicalDrfPolicy {
    fn name(&self) -> &'static str {
        "hierarchical-drf"
    }

    fn add_framework(&mut self, framework_id: FrameworkId, role: &str) {
        if self.framework_roles.contains_key(&framework_id) {
            return;
        }

        if !self.roles.contains(role) {
            self.roles.add(role);
            let mut sorter = DrfSorter::new();
            sorter.add_total(self.roles.total());
            self.frameworks.insert(role.to_string(), sorter);
        }
        if let Some(sorter) = self.frameworks.get_mut(role) {
            sorter.add(framework_id.as_str());
        }

        tracing::debug!(framework_id = %framework_id, role, "Framework added to allocator");
        self.framework_roles.insert(framework_id, role.to_string());
    }

    fn remove_framework(&mut self, framework_id: &FrameworkId) {
        if let Some(held) = self.allocations.remove(framework_id) {
            for (agent_id, resources) in held {
                if let Some(agent) = self.agents.get_mut(&agent_id) {
                    agent.available += resources;
                }
                self.unallocate(framework_id, resources);
            }
        }

        let Some(role) = self.framework_roles.remove(framework_id) else {
            return;
        };
        let role_empty = match self.frameworks.get_mut(&role) {
            Some(sorter) => {
                sorter.remove(framework_id.as_str());
                sorter.is_empty()
            }
            None => true,
        };
        if role_empty {
            self.frameworks.remove(&role);
            self.roles.remove(&role);
        }
        tracing::debug!(framework_id = %framework_id, "Framework removed from allocator");
    }

    fn add_agent(&mut self, agent_id: AgentId, total: Resources) {
        if self.agents.contains_key(&agent_id) {
            return;
        }
        self.roles.add_total(total);
        for sorter in self.frameworks.values_mut() {
            sorter.add_total(total);
        }
        self.agents.insert(
            agent_id,
            Agent {
                total,
                available: total,
            },
        );
    }

    fn remove_agent(&mut self, agent_id: &AgentId) {
        let Some(agent) = self.agents.remove(agent_id) else {
            return;
        };
        self.roles.remove_total(agent.total);
        for sorter in self.frameworks.values_mut() {
            sorter.remove_total(agent.total);
        }

        let mut released = Vec::new();
        for (framework_id, held) in self.allocations.iter_mut() {
            if let Some(resources) = held.remove(agent_id) {
                released.push((framework_id.clone(), resources));
            }
        }
        for (framework_id, resources) in released {
            self.unallocate(&framework_id, resources);
        }
    }

    fn recover(&mut self, framework_id: &FrameworkId, agent_id: &AgentId, resources: Resources) {
        let Some(agent) = self.agents.get_mut(agent_id) else {
            return;
        };
        let Some(held) = self
            .allocations
            .get_mut(framework_id)
            .and_then(|held| held.get_mut(agent_id))
        else {
            return;
        };

        // Never recover more than was handed out.
        let recovered = Resources {
            cpus: resources.cpus.min(held.cpus),
            mem: resources.mem.min(held.mem),
            disk: resources.disk.min(held.disk),
        };
        *held -= recovered;
        agent.available += recovered;
        self.unallocate(framework_id, recovered);
    }

    fn allocate(&mut self) -> Vec<Allocation> {
        let mut allocations = Vec::new();
        let agent_ids: Vec<AgentId> = self.agents.keys().cloned().collect();

        for agent_id in agent_ids {
            let available = match self.agents.get(&agent_id) {
                Some(agent) if !agent.available.is_empty() => agent.available,
                _ => continue,
            };
            let Some((role, framework_id)) = self.next_framework() else {
                break;
            };

            if let Some(agent) = self.agents.get_mut(&agent_id) {
                agent.available = Resources::default();
            }
            self.roles.allocated(&role, available);
            if let Some(sorter) = self.frameworks.get_mut(&role) {
                sorter.allocated(framework_id.as_str(), available);
            }
            *self
                .allocations
                .entry(framework_id.clone())
                .or_default()
                .entry(agent_id.clone())
                .or_default() += available;

            allocations.push(Allocation {
                framework_id,
                agent_id,
                resources: available,
            });
        }

        allocations
    }
}
