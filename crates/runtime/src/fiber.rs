//! Cooperative fiber scheduling, per spec.md §5: "a running VM is
//! single-threaded cooperative... scheduling is explicit, a
//! yield-equivalent builtin (`Gosched`) parks the current fiber so others
//! can run." Built on `may`'s green threads, the same concurrency crate
//! this project's own runtime reaches for.

use crate::value::Value;
use crate::vm::Vm;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// `may::coroutine::JoinHandle<T>` requires `T: Send`, but `Value` holds
/// `Rc`s throughout (single-threaded by design, spec.md's VM is
/// explicitly cooperative, not parallel). `may` pins its scheduler to one
/// worker thread here (`set_workers(1)`), so a spawned coroutine never
/// actually runs concurrently with its parent on a different OS thread;
/// this wrapper just satisfies the trait bound for that single-worker
/// configuration. Safe only because the runtime never configures more
/// than one `may` worker.
struct AssertSend<T>(T);
unsafe impl<T> Send for AssertSend<T> {}

/// Ensures `may`'s global scheduler is configured for exactly one OS
/// thread before anything spawns a coroutine, matching the safety
/// invariant `AssertSend` relies on. Idempotent; cheap to call from every
/// VM construction site.
pub fn ensure_single_worker() {
    may::config().set_workers(1);
}

/// Parks the current coroutine so another one gets a turn. A no-op if
/// called from the main, non-coroutine thread (nothing else to switch
/// to).
pub fn yield_now() {
    may::coroutine::yield_now();
}

/// Runs `closure` (a zero-argument callable value) in its own fiber,
/// sharing the parent `Vm`'s globals, module cache, and abort flag. The
/// spawned fiber's own `Vm` instance owns its own data/call-frame stacks.
pub fn spawn(parent: &Vm, closure: Value, abort: Arc<AtomicBool>) -> may::coroutine::JoinHandle<()> {
    ensure_single_worker();
    let shared = AssertSend((parent.shared_state(), closure, abort));
    may::go!(move || {
        let AssertSend((shared, closure, abort)) = shared;
        let mut fiber_vm = Vm::with_shared_state(shared, abort);
        let _ = fiber_vm.call_value(closure, &[]);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_single_worker_is_idempotent() {
        ensure_single_worker();
        ensure_single_worker();
    }
}
