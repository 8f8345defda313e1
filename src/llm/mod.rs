//! Language-model access layer.
//!
//! Every outbound LM request in the process goes through [`gateway`], under
//! a permit from the global slot semaphore in [`slots`]. The gateway owns
//! timeout/retry handling and the strict-JSON parse ladder; callers receive
//! `Option<Value>` and decide between another prompt, a rule fallback, or
//! surfacing partial success. No error crosses the gateway boundary.

pub mod gateway;
pub mod repair;
pub mod slots;
pub mod trace;

pub use gateway::{call_json, CallOptions};
pub use slots::{acquire_slot, llm_slots};
