//! Stratus Core
//!
//! Vendor-neutral building blocks for cloud providers: resource and state
//! values, the `Provider` trait, a state poller for asynchronous operations
//! and a retry wrapper for transient API failures.

pub mod differ;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod sets;
pub mod waiter;

pub use provider::{Provider, ProviderError, ProviderResult};
pub use resource::{Resource, ResourceId, State, Value};
pub use waiter::{Observation, PollFailure, PollOutcome, StateWaiter, WaitError, poll};
