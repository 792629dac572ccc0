//! Live fan-out of the muxer's output to listeners.
//!
//! - [`BroadcastBuffer`]: per-epoch header cache plus a single latest-unit slot
//! - [`Listener`]: one reader's subscription, header first, then live units
//! - [`ListenerGuard`]: per-connection delivery logging

mod broadcast;
mod guard;

pub use broadcast::{BroadcastBuffer, BroadcastStats, Listener, StreamEpoch};
pub use guard::ListenerGuard;
