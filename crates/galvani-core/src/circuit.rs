//! Circuit topology: the node arena, attached components, and the
//! voltage-source registry.
//!
//! All structural state is index-addressed: nodes renumber on deletion and
//! the circuit fixes up every port assignment, so there are no dangling
//! references to chase. Structural mutations must not interleave with a
//! running simulation; the host suspends the engine around them.

use std::collections::HashMap;

use crate::device::{ComponentId, Device};
use crate::error::{Error, Result};
use crate::event::{SimEvent, Subscribers};
use crate::loops::{self, Loop};
use crate::node::{Node, NodeId, PortRef};

/// An unordered combination of two distinct ports of one component.
///
/// A k-port device carries C(k,2) pairs, built once at attach time. The
/// loop analyzer walks them as traversal edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    /// First port index.
    pub p1: usize,
    /// Second port index.
    pub p2: usize,
}

impl Pair {
    /// Whether the pair contains the given port.
    pub fn contains(&self, port: usize) -> bool {
        self.p1 == port || self.p2 == port
    }

    /// The pair's other port, if `port` is a member.
    pub fn other(&self, port: usize) -> Option<usize> {
        if self.p1 == port {
            Some(self.p2)
        } else if self.p2 == port {
            Some(self.p1)
        } else {
            None
        }
    }
}

/// A component's circuit-side entry: the boxed device model plus the
/// topology state the circuit owns for it.
#[derive(Debug)]
pub struct ComponentEntry {
    device: Box<dyn Device>,
    ports: Vec<Option<NodeId>>,
    pairs: Vec<Pair>,
    source_row: Option<usize>,
}

impl ComponentEntry {
    /// The device model.
    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }

    /// The device model, mutably.
    pub fn device_mut(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }

    /// Port-to-node assignments (`None` = floating).
    pub fn ports(&self) -> &[Option<NodeId>] {
        &self.ports
    }

    /// The component's port pairs.
    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// The voltage-source row this component claims, if any.
    pub fn source_row(&self) -> Option<usize> {
        self.source_row
    }

    /// Split borrow for the engine's hook calls: mutable device, shared
    /// port map.
    pub fn hook_parts(&mut self) -> (&mut dyn Device, &[Option<NodeId>]) {
        (self.device.as_mut(), &self.ports)
    }
}

/// The circuit aggregate: node arena (index 0 = ground), attached
/// components, and the contiguous voltage-source registry.
#[derive(Debug)]
pub struct Circuit {
    nodes: Vec<Node>,
    components: Vec<Option<ComponentEntry>>,
    /// Registry of source-row owners; position = row index.
    sources: Vec<ComponentId>,
    loop_cache: HashMap<ComponentId, Vec<Loop>>,
    subscribers: Subscribers,
    description: Option<String>,
    author: Option<String>,
    keywords: Option<String>,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    /// Create a new circuit containing only the ground node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new()],
            components: Vec::new(),
            sources: Vec::new(),
            loop_cache: HashMap::new(),
            subscribers: Subscribers::default(),
            description: None,
            author: None,
            keywords: None,
        }
    }

    // ---- metadata ----------------------------------------------------

    /// Free-text description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Set the free-text description.
    pub fn set_description(&mut self, text: impl Into<String>) {
        self.description = Some(text.into());
    }

    /// Author field.
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Set the author field.
    pub fn set_author(&mut self, text: impl Into<String>) {
        self.author = Some(text.into());
    }

    /// Keyword field.
    pub fn keywords(&self) -> Option<&str> {
        self.keywords.as_deref()
    }

    /// Set the keyword field.
    pub fn set_keywords(&mut self, text: impl Into<String>) {
        self.keywords = Some(text.into());
    }

    // ---- notifications -----------------------------------------------

    /// Subscribe to circuit and engine notifications.
    pub fn subscribe(&mut self, callback: impl FnMut(&SimEvent) + 'static) {
        self.subscribers.subscribe(callback);
    }

    /// Deliver a notification to every subscriber.
    pub fn emit(&mut self, event: SimEvent) {
        self.subscribers.emit(&event);
    }

    // ---- nodes -------------------------------------------------------

    /// Add a fresh, unconnected node and return its ID.
    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new());
        self.loop_cache.clear();
        id
    }

    /// Remove an empty node. All higher node IDs shift down by one and
    /// every port assignment is fixed up.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        if id.is_ground() {
            return Err(Error::GroundImmutable);
        }
        let node = self.nodes.get(id.index()).ok_or(Error::UnknownNode(id))?;
        let branches = node.branches().len();
        if branches > 0 {
            return Err(Error::NodeInUse { node: id, branches });
        }
        self.remove_node_and_shift(id.index());
        self.loop_cache.clear();
        Ok(())
    }

    /// Merge two nodes, moving every branch of the higher-indexed node onto
    /// the lower and deleting the emptied node. Returns the surviving ID.
    ///
    /// Merging a node with itself is rejected as a redundant connection and
    /// leaves the network untouched.
    pub fn merge_nodes(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        if a.index() >= self.nodes.len() {
            return Err(Error::UnknownNode(a));
        }
        if b.index() >= self.nodes.len() {
            return Err(Error::UnknownNode(b));
        }
        if a == b {
            return Err(Error::RedundantConnection(a));
        }

        let (lo, hi) = if a.index() < b.index() { (a, b) } else { (b, a) };

        // Move all branches of `hi` onto `lo`, updating the port map.
        let moved = self.nodes[hi.index()].take_branches();
        for branch in moved {
            if let Some(entry) = self.components[branch.component.0].as_mut() {
                entry.ports[branch.port] = Some(lo);
            }
            self.nodes[lo.index()].add_branch(branch);
        }

        // Keep the survivor's name; adopt the victim's if it had none.
        if self.nodes[lo.index()].name().is_none() {
            if let Some(name) = self.nodes[hi.index()].name().map(String::from) {
                self.nodes[lo.index()].set_name(name);
            }
        }

        self.remove_node_and_shift(hi.index());
        self.loop_cache.clear();
        Ok(lo)
    }

    /// Remove the node at `idx` and renumber everything above it.
    fn remove_node_and_shift(&mut self, idx: usize) {
        self.nodes.remove(idx);
        for entry in self.components.iter_mut().flatten() {
            for port in entry.ports.iter_mut() {
                if let Some(node) = port {
                    if node.index() > idx {
                        *node = NodeId(node.0 - 1);
                    }
                }
            }
        }
    }

    /// Look up a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Number of nodes excluding ground.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Assign a symbolic name to a node.
    pub fn set_node_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<()> {
        self.nodes
            .get_mut(id.index())
            .ok_or(Error::UnknownNode(id))?
            .set_name(name);
        Ok(())
    }

    /// Find a node by its symbolic name.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name() == Some(name))
            .map(|idx| NodeId(idx as u32))
    }

    // ---- components --------------------------------------------------

    /// Attach a component, creating one fresh node and branch per port.
    ///
    /// The host wires the component up afterwards with [`merge_nodes`].
    /// If the device claims a voltage-source row it is registered here and
    /// notified of its index.
    ///
    /// [`merge_nodes`]: Circuit::merge_nodes
    pub fn attach(&mut self, device: Box<dyn Device>) -> ComponentId {
        let id = ComponentId(self.components.len());
        let num_ports = device.num_ports();

        let mut ports = Vec::with_capacity(num_ports);
        for port in 0..num_ports {
            let node = self.add_node();
            self.nodes[node.index()].add_branch(PortRef {
                component: id,
                port,
            });
            ports.push(Some(node));
        }

        self.insert_entry(id, device, ports);
        id
    }

    /// Attach a component directly onto existing nodes (persisted-circuit
    /// loading and programmatic construction).
    pub fn attach_at(&mut self, device: Box<dyn Device>, nodes: &[NodeId]) -> Result<ComponentId> {
        if nodes.len() != device.num_ports() {
            return Err(Error::PortCountMismatch {
                name: device.name().to_string(),
                expected: device.num_ports(),
                actual: nodes.len(),
            });
        }
        for &node in nodes {
            if node.index() >= self.nodes.len() {
                return Err(Error::UnknownNode(node));
            }
        }

        let id = ComponentId(self.components.len());
        for (port, &node) in nodes.iter().enumerate() {
            self.nodes[node.index()].add_branch(PortRef {
                component: id,
                port,
            });
        }
        let ports = nodes.iter().copied().map(Some).collect();
        self.insert_entry(id, device, ports);
        Ok(id)
    }

    fn insert_entry(
        &mut self,
        id: ComponentId,
        mut device: Box<dyn Device>,
        ports: Vec<Option<NodeId>>,
    ) {
        let num_ports = ports.len();
        let mut pairs = Vec::new();
        for p1 in 0..num_ports {
            for p2 in (p1 + 1)..num_ports {
                pairs.push(Pair { p1, p2 });
            }
        }

        let source_row = if device.num_sources() > 0 {
            let row = self.sources.len();
            self.sources.push(id);
            device.source_index_changed(row);
            Some(row)
        } else {
            None
        };

        self.components.push(Some(ComponentEntry {
            device,
            ports,
            pairs,
            source_row,
        }));
        self.loop_cache.clear();
        self.emit(SimEvent::ComponentConnected(id));
    }

    /// Detach a component, removing its branches and releasing its source
    /// row. Sources above the released row shift down by one and their
    /// owners are notified of the new index.
    pub fn detach(&mut self, id: ComponentId) -> Result<()> {
        let entry = self
            .components
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(Error::UnknownComponent(id))?;

        for (port, node) in entry.ports.iter().enumerate() {
            if let Some(node) = node {
                self.nodes[node.index()].remove_branch(PortRef {
                    component: id,
                    port,
                });
            }
        }

        if let Some(row) = entry.source_row {
            self.sources.remove(row);
            for r in row..self.sources.len() {
                let owner = self.sources[r];
                if let Some(owner_entry) = self.components[owner.0].as_mut() {
                    owner_entry.source_row = Some(r);
                    owner_entry.device.source_index_changed(r);
                }
            }
        }

        self.loop_cache.clear();
        self.emit(SimEvent::ComponentDisconnected(id));
        Ok(())
    }

    /// Connect a port onto a node (moving it if already connected).
    pub fn connect(&mut self, id: ComponentId, port: usize, node: NodeId) -> Result<()> {
        if node.index() >= self.nodes.len() {
            return Err(Error::UnknownNode(node));
        }
        self.disconnect(id, port)?;
        let entry = self
            .components
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownComponent(id))?;
        entry.ports[port] = Some(node);
        self.nodes[node.index()].add_branch(PortRef { component: id, port });
        self.loop_cache.clear();
        Ok(())
    }

    /// Disconnect a port, leaving it floating. No-op if already floating.
    pub fn disconnect(&mut self, id: ComponentId, port: usize) -> Result<()> {
        let entry = self
            .components
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownComponent(id))?;
        if port >= entry.ports.len() {
            return Err(Error::UnknownPort {
                component: id,
                port,
            });
        }
        if let Some(node) = entry.ports[port].take() {
            self.nodes[node.index()].remove_branch(PortRef { component: id, port });
            self.loop_cache.clear();
        }
        Ok(())
    }

    /// Look up a component entry.
    pub fn entry(&self, id: ComponentId) -> Option<&ComponentEntry> {
        self.components.get(id.0).and_then(Option::as_ref)
    }

    /// The node a component port is assigned to (`None` if floating or the
    /// component is unknown).
    pub fn port_node(&self, id: ComponentId, port: usize) -> Option<NodeId> {
        self.entry(id).and_then(|e| e.ports.get(port).copied().flatten())
    }

    /// The device model of a component.
    pub fn device(&self, id: ComponentId) -> Option<&dyn Device> {
        self.entry(id).map(|e| e.device())
    }

    /// Iterate over attached components.
    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &ComponentEntry)> {
        self.components
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|e| (ComponentId(idx), e)))
    }

    /// Iterate mutably over attached component entries (engine hook loop).
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut ComponentEntry> {
        self.components.iter_mut().flatten()
    }

    /// Number of attached components.
    pub fn component_count(&self) -> usize {
        self.components.iter().flatten().count()
    }

    // ---- voltage sources ---------------------------------------------

    /// Number of claimed voltage-source rows.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// The component owning a source row.
    pub fn source_owner(&self, row: usize) -> Option<ComponentId> {
        self.sources.get(row).copied()
    }

    /// Find a source row by its owning device's name (case-insensitive).
    pub fn find_source(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|&owner| {
            self.device(owner)
                .map(|d| d.name().eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
    }

    // ---- loops -------------------------------------------------------

    /// Loops closing through a voltage source's terminals, computed on
    /// demand and cached until the next structural mutation.
    pub fn source_loops(&mut self, source: ComponentId) -> Result<&[Loop]> {
        if !self.loop_cache.contains_key(&source) {
            let loops = loops::find_source_loops(self, source)?;
            self.loop_cache.insert(source, loops);
        }
        Ok(self
            .loop_cache
            .get(&source)
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }
}
