//! C ABI over the session context.
//!
//! Handles are opaque non-zero integers minted by a process-wide registry;
//! `0` is the allocation-failure sentinel. The evaluation callback is a
//! function pointer plus opaque `user_data`, forwarded untouched and invoked
//! exactly once per accepted evaluation, from a bridge thread. The message
//! pointer passed to the callback is valid only for the duration of the call.
//!
//! Lifecycle misuse (destroying twice, evaluating after destroy) is a caller
//! contract violation; the registry downgrades it from undefined behavior to
//! a rejected call with a warning, but callers must not rely on that.

use crate::context::AuthContext;
use crate::error::AuthError;
use crate::policy::Policy;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Completion callback: `(user_data, success, host_code, message)`.
/// `message` is null unless the outcome carries a diagnostic.
pub type CompletionCallback =
    unsafe extern "C" fn(user_data: *mut c_void, success: i32, code: i32, message: *const c_char);

pub const LAUTH_OK: i32 = 0;
pub const LAUTH_ERR_INVALID_HANDLE: i32 = 1;
pub const LAUTH_ERR_BUSY: i32 = 2;
pub const LAUTH_ERR_INVALID_ARGUMENT: i32 = 3;

/// How long `destroy` waits for an outstanding callback to be delivered.
const DESTROY_DELIVERY_WAIT: Duration = Duration::from_secs(5);

/// Counts callbacks handed to bridge threads but not yet invoked, so destroy
/// can block until delivery has actually happened, not merely been queued.
struct DeliveryGate {
    pending: Mutex<usize>,
    drained: Condvar,
}

impl DeliveryGate {
    fn new() -> Arc<Self> {
        Arc::new(DeliveryGate { pending: Mutex::new(0), drained: Condvar::new() })
    }

    fn enter(&self) {
        *self.pending.lock() += 1;
    }

    fn exit(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        self.drained.notify_all();
    }

    fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock();
        while *pending > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if self.drained.wait_for(&mut pending, deadline - now).timed_out() && *pending > 0 {
                return false;
            }
        }
        true
    }
}

struct FfiContext {
    ctx: Mutex<AuthContext>,
    deliveries: Arc<DeliveryGate>,
}

static CONTEXTS: Lazy<RwLock<HashMap<u64, Arc<FfiContext>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Register an already-built context (e.g. one backed by a scripted host)
/// and return its handle. The extern `create` goes through the platform
/// backend; embedders and tests use this to drive the C surface with a
/// custom one.
pub fn register(ctx: AuthContext) -> u64 {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::SeqCst);
    let entry = Arc::new(FfiContext { ctx: Mutex::new(ctx), deliveries: DeliveryGate::new() });
    CONTEXTS.write().insert(handle, entry);
    debug!(handle, "ffi context registered");
    handle
}

fn lookup(handle: u64) -> Option<Arc<FfiContext>> {
    CONTEXTS.read().get(&handle).cloned()
}

/// Allocate a session context. Returns a non-zero handle, or `0` when the
/// host subsystem cannot allocate one.
#[no_mangle]
pub extern "C" fn lauth_context_create() -> u64 {
    match AuthContext::new() {
        Ok(ctx) => register(ctx),
        Err(err) => {
            warn!(%err, "ffi context allocation failed");
            0
        }
    }
}

/// Release a context. If an evaluation is in flight it is cancelled and its
/// callback is delivered (classified as a cancellation) before this returns.
/// Must be called exactly once per handle returned by `create`.
#[no_mangle]
pub extern "C" fn lauth_context_destroy(handle: u64) {
    let entry = CONTEXTS.write().remove(&handle);
    let Some(entry) = entry else {
        warn!(handle, "destroy on unknown or already-destroyed handle");
        return;
    };
    let gate = entry.deliveries.clone();
    // Dropping the context cancels any in-flight evaluation and holds the
    // host session open until its responder has been consumed.
    drop(entry);
    if !gate.wait_drained(DESTROY_DELIVERY_WAIT) {
        warn!(handle, "pending callback not delivered within destroy bound");
    }
    debug!(handle, "ffi context destroyed");
}

/// Set the cancel-affordance label for subsequent evaluations.
///
/// # Safety
/// `title` must be a valid NUL-terminated string or null (null is a no-op).
#[no_mangle]
pub unsafe extern "C" fn lauth_context_set_cancel_title(handle: u64, title: *const c_char) {
    if title.is_null() {
        return;
    }
    let Ok(title) = CStr::from_ptr(title).to_str() else {
        warn!(handle, "cancel title is not valid UTF-8; ignored");
        return;
    };
    match lookup(handle) {
        Some(entry) => entry.ctx.lock().set_cancel_title(title),
        None => warn!(handle, "set_cancel_title on unknown handle"),
    }
}

/// Whether `policy` is currently satisfiable on this context. Returns 1 or 0;
/// unknown handles and unknown policies both report 0.
#[no_mangle]
pub extern "C" fn lauth_context_can_evaluate(handle: u64, policy: i32) -> i32 {
    match lookup(handle) {
        Some(entry) => entry.ctx.lock().can_evaluate(Policy::new(policy)) as i32,
        None => 0,
    }
}

struct UserData(*mut c_void);
// The bridge only forwards the pointer back through the callback; it never
// dereferences it. The caller owns its thread-safety.
unsafe impl Send for UserData {}

/// Start one asynchronous evaluation. Returns `LAUTH_OK` when accepted, in
/// which case `callback(user_data, ...)` is invoked exactly once from a
/// bridge thread; on any non-zero return no callback is or will be scheduled.
///
/// # Safety
/// `reason` must be a valid NUL-terminated string. `user_data` must stay
/// valid until the callback has run.
#[no_mangle]
pub unsafe extern "C" fn lauth_context_evaluate(
    handle: u64,
    policy: i32,
    reason: *const c_char,
    user_data: *mut c_void,
    callback: Option<CompletionCallback>,
) -> i32 {
    let Some(callback) = callback else { return LAUTH_ERR_INVALID_ARGUMENT };
    if reason.is_null() {
        return LAUTH_ERR_INVALID_ARGUMENT;
    }
    let Ok(reason) = CStr::from_ptr(reason).to_str() else {
        return LAUTH_ERR_INVALID_ARGUMENT;
    };
    let Some(entry) = lookup(handle) else { return LAUTH_ERR_INVALID_HANDLE };

    let pending = match entry.ctx.lock().evaluate(Policy::new(policy), reason) {
        Ok(pending) => pending,
        Err(AuthError::EvaluationInFlight) => return LAUTH_ERR_BUSY,
        Err(AuthError::AllocationFailed) => return LAUTH_ERR_INVALID_HANDLE,
    };

    entry.deliveries.enter();
    let gate = entry.deliveries.clone();
    let user_data = UserData(user_data);
    std::thread::spawn(move || {
        // Capture the whole `UserData` wrapper (not just its field) so the
        // `Send` impl applies under 2021 disjoint closure captures.
        let user_data = user_data;
        let outcome = pending.wait();
        let message = outcome
            .message()
            .map(|m| CString::new(m).unwrap_or_default());
        let message_ptr = message.as_ref().map(|m| m.as_ptr()).unwrap_or(ptr::null());
        unsafe {
            callback(user_data.0, outcome.is_success() as i32, outcome.host_code(), message_ptr)
        };
        gate.exit();
    });
    LAUTH_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_handles_are_rejected_without_side_effects() {
        assert_eq!(lauth_context_can_evaluate(u64::MAX, 1), 0);
        // Destroy on a stale handle is a logged no-op.
        lauth_context_destroy(u64::MAX);
    }

    #[test]
    fn delivery_gate_drains() {
        let gate = DeliveryGate::new();
        gate.enter();
        let g2 = gate.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            g2.exit();
        });
        assert!(gate.wait_drained(Duration::from_secs(5)));
        t.join().unwrap();
    }

    #[test]
    fn delivery_gate_times_out_when_blocked() {
        let gate = DeliveryGate::new();
        gate.enter();
        assert!(!gate.wait_drained(Duration::from_millis(20)));
        gate.exit();
    }
}
