//! Named notifications emitted across the host collaboration boundary.
//!
//! The editor, plotting scope, or test harness subscribes on the circuit;
//! these notifications are the only two-way contract the core requires.

use crate::device::ComponentId;

/// A notification emitted by the circuit or the simulation engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEvent {
    /// A simulation run started.
    SimBegin,
    /// A simulation run stopped or halted.
    SimEnd,
    /// A time step is about to be computed.
    StepBegin { time: f64 },
    /// A time step converged.
    StepEnd { time: f64, iterations: usize },
    /// A component was attached to the circuit.
    ComponentConnected(ComponentId),
    /// A component was detached from the circuit.
    ComponentDisconnected(ComponentId),
}

/// Subscriber callback storage.
///
/// Single-threaded by design: callbacks run synchronously on the thread
/// that mutates the circuit or drives the engine.
#[derive(Default)]
pub struct Subscribers {
    callbacks: Vec<Box<dyn FnMut(&SimEvent)>>,
}

impl Subscribers {
    /// Register a callback for every future notification.
    pub fn subscribe(&mut self, callback: impl FnMut(&SimEvent) + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Deliver an event to every subscriber in registration order.
    pub fn emit(&mut self, event: &SimEvent) {
        for callback in &mut self.callbacks {
            callback(event);
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether any subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.callbacks.len())
            .finish()
    }
}
