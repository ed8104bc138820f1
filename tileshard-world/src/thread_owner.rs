//! Debug-build check that a structure is only touched by its owning thread.
//!
//! Game state is confined to the tick thread by design rather than by locks.
//! The first thread to call [`ThreadOwner::check`] claims ownership; any
//! later access from a different thread panics. Release builds compile the
//! whole thing down to nothing.

#[cfg(debug_assertions)]
mod imp {
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
    }

    fn current_thread_id() -> u64 {
        THREAD_ID.with(|id| *id)
    }

    #[derive(Debug, Default)]
    pub struct ThreadOwner {
        // 0 means unclaimed.
        owner: AtomicU64,
    }

    impl ThreadOwner {
        pub fn check(&self) {
            let current = current_thread_id();
            match self
                .owner
                .compare_exchange(0, current, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => (),
                Err(owner) => assert_eq!(
                    owner, current,
                    "structure accessed from thread {current} but owned by thread {owner}",
                ),
            }
        }
    }
}

#[cfg(not(debug_assertions))]
mod imp {
    #[derive(Debug, Default)]
    pub struct ThreadOwner;

    impl ThreadOwner {
        #[inline(always)]
        pub fn check(&self) {}
    }
}

pub use imp::ThreadOwner;

#[cfg(test)]
mod tests {
    use super::ThreadOwner;

    #[test]
    fn same_thread_access_is_fine() {
        let owner = ThreadOwner::default();
        owner.check();
        owner.check();
    }

    #[test]
    #[cfg(debug_assertions)]
    fn cross_thread_access_panics() {
        let owner = std::sync::Arc::new(ThreadOwner::default());
        owner.check();
        let other = std::sync::Arc::clone(&owner);
        let result = std::thread::spawn(move || other.check()).join();
        assert!(result.is_err());
    }
}
