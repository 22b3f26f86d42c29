use std::future::Future;
use std::pin::pin;
use std::task::Poll;

use crate::context::{EntryContext, TaskContext};
use crate::error::IllegalContext;

/// Waits for a future to complete and returns its output, from plain
/// synchronous code.
///
/// Callable at any depth below a function adopted by [`async_entry`]; only
/// the identity of the current stack matters, not how many frames sit in
/// between. While the future is pending the whole synchronous stack is
/// suspended and the enclosing task yields to its executor, so other tasks
/// keep running. A panic raised by the future's `poll` resumes at this call
/// site and can be caught with `catch_unwind`; error values are ordinary
/// return values.
///
/// # Panics
///
/// Panics if no enclosing [`async_entry`] owns the current stack. Use
/// [`try_await_from_sync`] to handle that case as a value.
///
/// [`async_entry`]: crate::async_entry
pub fn await_from_sync<F: Future>(fut: F) -> F::Output {
    match try_await_from_sync(fut) {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

/// Non-panicking form of [`await_from_sync`].
///
/// Fails with [`IllegalContext`] when called from a stack no entry owns:
/// the root stack, a bare thread, or the `poll` of a future this same entry
/// is currently awaiting. The rejected future is dropped rather than left
/// pending.
pub fn try_await_from_sync<F: Future>(fut: F) -> Result<F::Output, IllegalContext> {
    let context = match EntryContext::current() {
        // SAFETY: a registered context lives in a frame of the coroutine
        // stack this call is executing on, below the current frame, and
        // stays there until the child finishes.
        Some(ptr) => unsafe { &*ptr },
        None => return Err(IllegalContext),
    };

    let mut fut = pin!(fut);
    loop {
        let poll = {
            let task_cx = context.take_task_cx().ok_or(IllegalContext)?;
            context.mark_awaited();
            let restore = RestoreTaskCx { context, task_cx };
            // SAFETY: the pointer was delivered by the driver's in-progress
            // poll and stays valid until the child suspends, which happens
            // only after `restore` has put it back. The take above keeps the
            // borrow exclusive.
            let cx = unsafe { &mut *task_cx };
            let poll = fut.as_mut().poll(cx);
            drop(restore);
            poll
        };
        match poll {
            Poll::Ready(value) => return Ok(value),
            Poll::Pending => context.suspend(),
        }
    }
}

/// Puts the task context back even if the poll above unwinds, so a child
/// that catches the panic can keep awaiting.
struct RestoreTaskCx<'a> {
    context: &'a EntryContext,
    task_cx: TaskContext,
}

impl Drop for RestoreTaskCx<'_> {
    fn drop(&mut self) {
        self.context.restore_task_cx(self.task_cx);
    }
}

#[test]
fn echo() {
    let v = async_std::task::block_on(crate::async_entry(|| {
        let base = await_from_sync(async {
            async_std::task::sleep(std::time::Duration::from_millis(1)).await;
            "hi".to_string()
        });
        base + "!"
    }));
    assert_eq!(v, "hi!");
}

#[test]
fn awaits_deep_in_the_call_stack() {
    fn leaf() -> u32 {
        await_from_sync(async {
            async_std::task::yield_now().await;
            20
        })
    }

    fn middle() -> u32 {
        leaf() + 1
    }

    let v = async_std::task::block_on(crate::async_entry(|| middle() * 2));
    assert_eq!(v, 42);
}

#[test]
fn error_values_pass_through() {
    let res = async_std::task::block_on(crate::async_entry(|| -> Result<u32, String> {
        let n = await_from_sync(async { Ok::<u32, String>(7) })?;
        Ok(n + 1)
    }));
    assert_eq!(res, Ok(8));
}

#[test]
fn future_panic_caught_at_the_call_site() {
    let v = async_std::task::block_on(crate::async_entry(|| {
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            await_from_sync(async {
                async_std::task::yield_now().await;
                panic!("boom");
            })
        }));
        let payload = caught.unwrap_err();
        // The child keeps running after catching.
        let after = await_from_sync(async { "still alive" });
        format!("{}: {after}", payload.downcast_ref::<&str>().unwrap())
    }));
    assert_eq!(v, "boom: still alive");
}

#[test]
fn future_panic_propagates_out_of_the_entry() {
    let res = std::panic::catch_unwind(|| {
        async_std::task::block_on(crate::async_entry(|| {
            await_from_sync(async { panic!("kaboom") })
        }))
    });
    let payload = res.unwrap_err();
    assert_eq!(*payload.downcast_ref::<&str>().unwrap(), "kaboom");
}

#[test]
fn illegal_context_outside_any_entry() {
    assert_eq!(try_await_from_sync(async { 1 }), Err(IllegalContext));
}

#[test]
#[should_panic(expected = "async_entry")]
fn await_from_sync_outside_any_entry_panics() {
    await_from_sync(async { 1 });
}

#[test]
fn await_inside_a_polled_future_is_illegal() {
    use std::pin::Pin;
    use std::task::Context;

    struct AwaitsWhilePolled;

    impl Future for AwaitsWhilePolled {
        type Output = Result<u32, IllegalContext>;

        fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
            Poll::Ready(try_await_from_sync(async { 1 }))
        }
    }

    let res = async_std::task::block_on(crate::async_entry(|| {
        await_from_sync(AwaitsWhilePolled)
    }));
    assert_eq!(res, Err(IllegalContext));
}
