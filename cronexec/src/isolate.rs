//! Isolated execution units.
//!
//! Every firing and callback delivery runs on its own task wrapped in a panic boundary, so a
//! failure inside one never reaches the clock, other firings or the process. A caught panic is
//! logged together with the stack trace captured where it was raised.
use std::{
    any::Any,
    backtrace::Backtrace,
    cell::RefCell,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::Once,
};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::Instrument;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook in front of the current panic hook that records a backtrace of every panic on the
/// panicking thread.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

fn take_backtrace() -> Option<Backtrace> {
    LAST_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// A panic caught at an isolation boundary.
#[derive(Debug)]
pub struct CaughtPanic {
    pub message: String,
    /// Captured where the panic was raised; absent if the panic hook was replaced since.
    pub backtrace: Option<Backtrace>,
}

impl CaughtPanic {
    pub fn backtrace_text(&self) -> String {
        self.backtrace
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

/// Poll `fut` to completion, catching a panic raised inside it.
pub async fn catch_panic<F>(fut: F) -> Result<F::Output, CaughtPanic>
where
    F: Future,
{
    install_panic_hook();
    // The catch returns on the thread that unwound, where the hook stored the trace.
    AssertUnwindSafe(fut).catch_unwind().await.map_err(|payload| CaughtPanic {
        message: panic_message(payload.as_ref())
            .unwrap_or("Box<dyn Any>")
            .to_owned(),
        backtrace: take_backtrace(),
    })
}

/// Spawn `fut` as an isolated unit: a panic inside it is caught and logged.
pub fn spawn_isolated<F>(name: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(
        async move {
            if let Err(panic) = catch_panic(fut).await {
                let message = &panic.message;
                let backtrace = panic.backtrace_text();
                tracing::error!(
                    task = name,
                    panic = %message,
                    %backtrace,
                    "Task {name} panicked: {message}\n{backtrace}"
                );
            }
        }
        .in_current_span(),
    )
}

/// The message of a panic payload raised through `panic!`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

#[cfg(test)]
mod test {
    use std::{
        backtrace::BacktraceStatus,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };

    use super::*;

    #[tokio::test]
    async fn panic_is_contained() {
        let handle = spawn_isolated("boom", async { panic!("boom") });

        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn caught_panic_carries_a_backtrace() {
        let caught = catch_panic(async { panic!("with trace") }).await.unwrap_err();

        assert_eq!(caught.message, "with trace");
        let backtrace = caught.backtrace.as_ref().unwrap();
        assert_eq!(backtrace.status(), BacktraceStatus::Captured);
        assert!(!caught.backtrace_text().is_empty());
    }

    #[tokio::test]
    async fn completed_future_is_returned() {
        assert_eq!(catch_panic(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn body_runs_to_completion() {
        let ran = Arc::new(AtomicBool::new(false));
        spawn_isolated("flag", {
            let ran = ran.clone();
            async move { ran.store(true, Ordering::SeqCst) }
        })
        .await
        .unwrap();

        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), Some("static"));
        let payload: Box<dyn Any + Send> = Box::new(format!("owned {}", 1));
        assert_eq!(panic_message(payload.as_ref()), Some("owned 1"));
        let payload: Box<dyn Any + Send> = Box::new(3);
        assert_eq!(panic_message(payload.as_ref()), None);
    }
}
