//! Binding identifiers
//!
//! A buffer is registered under either a fixed slot or a resolver mapping the
//! simulation step to a slot. Resolvers implement double buffering: two buffers
//! registered with mirrored resolvers swap slots every step.

use std::{fmt, sync::Arc};

/// Step-dependent slot resolver
pub type SlotResolver = Arc<dyn Fn(u64) -> u32 + Send + Sync>;

/// Identifies the slot a registered buffer occupies within the bind group
#[derive(Clone)]
pub enum Binding {
    /// Fixed slot
    Static(u32),
    /// Slot computed from the current simulation step
    Dynamic(SlotResolver),
}

impl Binding {
    /// Creates a dynamic binding from an arbitrary resolver
    pub fn dynamic(resolver: impl Fn(u64) -> u32 + Send + Sync + 'static) -> Self {
        Self::Dynamic(Arc::new(resolver))
    }

    /// Creates a ping-pong binding occupying `even` on even steps and `odd` on odd steps
    ///
    /// Register the partner buffer with `ping_pong(odd, even)` so both swap every step.
    pub fn ping_pong(even: u32, odd: u32) -> Self {
        Self::dynamic(move |step| if step % 2 == 0 { even } else { odd })
    }

    /// Resolves the slot for `step`
    pub fn resolve(&self, step: u64) -> u32 {
        match self {
            Binding::Static(slot) => *slot,
            Binding::Dynamic(resolver) => resolver(step),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Binding::Dynamic(_))
    }
}

impl From<u32> for Binding {
    fn from(slot: u32) -> Self {
        Binding::Static(slot)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Static(slot) => f.debug_tuple("Static").field(slot).finish(),
            Binding::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}
