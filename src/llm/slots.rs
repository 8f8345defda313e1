//! Process-wide LM slot semaphore.
//!
//! Bounds concurrent outbound LM calls across all sessions and stages.
//! Initialized lazily on first use; safe under concurrent first-use.

use std::sync::{Arc, OnceLock};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config;
use crate::config::DEFAULT_LLM_SLOT_COUNT;

static LLM_SLOTS: OnceLock<Arc<Semaphore>> = OnceLock::new();

/// The global semaphore. Slot count comes from `VERISIFT_LLM_SLOT_COUNT`
/// at first use and is fixed for the process lifetime.
pub fn llm_slots() -> Arc<Semaphore> {
    LLM_SLOTS
        .get_or_init(|| {
            let count =
                config::int_var("LLM_SLOT_COUNT", DEFAULT_LLM_SLOT_COUNT as i64, 1, 64) as usize;
            Arc::new(Semaphore::new(count))
        })
        .clone()
}

/// Acquire one LM slot. The permit releases on drop, on every exit path.
pub async fn acquire_slot() -> OwnedSemaphorePermit {
    // The semaphore is never closed, so acquisition only fails if the
    // process is tearing down; parking the caller forever is acceptable then.
    match llm_slots().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slots_bound_concurrency() {
        let sem = llm_slots();
        let total = sem.available_permits();
        let p1 = acquire_slot().await;
        assert_eq!(llm_slots().available_permits(), total - 1);
        drop(p1);
        assert_eq!(llm_slots().available_permits(), total);
    }
}
