#![deny(missing_docs)]

//! Fine-grained reactive dependency tracking.
//!
//! Mutable cells ([`Signal`]) automatically notify the derived values
//! ([`Computed`]) and tracked procedures ([`Effect`]) that read them.
//! No manual subscription wiring: reading inside an effect body
//! records the dependency, and the set of dependencies is
//! re-discovered on every run, so conditional reads subscribe and
//! unsubscribe on their own.
//!
//! # Quick Start
//!
//! ```ignore
//! use finegrain::{Computed, Effect, Runtime, Signal};
//!
//! let rt = Runtime::new();
//! let count = Signal::new(&rt, 0);
//!
//! let doubled = Computed::new(&rt, {
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! let effect = Effect::new(&rt, {
//!     let doubled = doubled.clone();
//!     move || println!("doubled = {}", doubled.get())
//! });
//! // prints "doubled = 0"
//!
//! count.set(5);
//! // prints "doubled = 10"
//!
//! rt.batch(|| {
//!     count.set(6);
//!     count.set(7);
//! });
//! // one re-run, prints "doubled = 14"
//!
//! effect.close();
//! ```
//!
//! # Core Types
//!
//! - [`Runtime`] - one reactive graph; independent runtimes share
//!   nothing, so tests and embedders can hold several.
//! - [`Signal`] - mutable cell. Tracked reads, equality-deduped writes.
//! - [`Computed`] - lazy cached derivation. Upstream writes push a
//!   dirty flag; the body runs again only on the next read.
//! - [`Effect`] - tracked side-effecting computation and its disposal
//!   handle.
//! - [`Lifecycle`] - host-driven start/destroy binding for effects.
//!
//! # Nesting
//!
//! An effect created inside another effect's body becomes its child.
//! When the parent re-runs or closes, all children from the previous
//! run are disposed first, so conditionally created subtrees never
//! leak subscriptions.
//!
//! ```ignore
//! let _outer = Effect::new(&rt, move || {
//!     if show_details.get() {
//!         // disposed and recreated whenever the outer body re-runs
//!         Effect::new(&rt, move || println!("{}", details.get()));
//!     }
//! });
//! ```
//!
//! # Batching
//!
//! Writes inside [`Runtime::batch`] coalesce: each affected effect
//! re-runs once at the outermost scope exit, observing all new values
//! together. A bare write is an implicit single-write batch.
//!
//! # Single evaluation context
//!
//! Execution is synchronous and single-context: `get`, `set`, and
//! flushes complete before returning, and nested synchronous re-entry
//! (an effect body writing a signal) is the supported shape. The
//! runtime is not a parallelism primitive; concurrent mutation from
//! several threads is not a supported mode.

pub(crate) mod arena;
mod batch;
mod computed;
mod effect;
pub(crate) mod hash;
mod lifecycle;
mod runtime;
mod signal;

pub use computed::Computed;
pub use effect::Effect;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use runtime::Runtime;
pub use signal::Signal;
