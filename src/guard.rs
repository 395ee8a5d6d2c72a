//! Fail-open guard.
//!
//! Every hook, per-item rewrite and bootstrap step runs through
//! [`fail_open`]: an `Err` or a panic inside the operation yields the
//! fallback instead, and nothing escapes to the host page. Failures are
//! recorded at `trace` level only; a chained panic hook keeps panics raised
//! inside a guarded step off stderr while leaving every other panic to the
//! previously installed hook.

use std::cell::Cell;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
}

static QUIET_HOOK: Once = Once::new();

fn install_quiet_hook() {
    QUIET_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if in_guarded_step() {
                tracing::trace!("guarded step panicked: {}", info);
                return;
            }
            previous(info);
        }));
    });
}

fn in_guarded_step() -> bool {
    GUARD_DEPTH.with(|depth| depth.get() > 0)
}

struct GuardScope;

impl GuardScope {
    fn enter() -> Self {
        GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
        GuardScope
    }
}

impl Drop for GuardScope {
    fn drop(&mut self) {
        GUARD_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Run `op`, returning `fallback()` if it errors or panics.
pub fn fail_open<T, E, F, G>(step: &'static str, op: F, fallback: G) -> T
where
    F: FnOnce() -> Result<T, E>,
    G: FnOnce() -> T,
    E: Display,
{
    install_quiet_hook();
    let outcome = {
        let _scope = GuardScope::enter();
        catch_unwind(AssertUnwindSafe(op))
    };
    match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            tracing::trace!(step, "failing open: {}", err);
            fallback()
        }
        Err(_) => {
            tracing::trace!(step, "failing open after panic");
            fallback()
        }
    }
}

/// [`fail_open`] for side-effect-only steps. Returns whether the step succeeded.
pub fn swallow<E, F>(step: &'static str, op: F) -> bool
where
    F: FnOnce() -> Result<(), E>,
    E: Display,
{
    fail_open(step, || op().map(|_| true), || false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_success() {
        let value = fail_open("ok", || Ok::<_, String>(7), || 0);
        assert_eq!(value, 7);
    }

    #[test]
    fn errors_fall_back() {
        let value = fail_open("err", || Err::<i32, _>("boom"), || 42);
        assert_eq!(value, 42);
        assert!(!swallow("err", || Err::<(), _>("boom")));
        assert!(swallow("ok", || Ok::<(), String>(())));
    }

    #[test]
    fn panics_fall_back() {
        let value = fail_open(
            "panic",
            || -> Result<i32, String> { panic!("hook exploded") },
            || -1,
        );
        assert_eq!(value, -1);
    }

    #[test]
    fn guard_scope_is_left_after_a_panic() {
        assert!(!in_guarded_step());
        let nested = fail_open(
            "outer",
            || {
                assert!(in_guarded_step());
                Ok::<_, String>(fail_open("inner", || -> Result<i32, String> { panic!("inner") }, || 3))
            },
            || 0,
        );
        assert_eq!(nested, 3);
        assert!(!in_guarded_step());
    }
}
