use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult};

use crate::context::{self, EntryContext, TaskContext};
use crate::error::NoSuspension;

/// Future driving one synchronous child stack.
///
/// Each poll resumes the child with the current task context; the child
/// yields back once per pending poll of whatever it is awaiting. Resolves to
/// the child's return value plus whether it ever awaited.
struct EntryFuture<'a, T> {
    coroutine: Coroutine<TaskContext, (), (T, bool), DefaultStack>,
    // The child keeps thread-bound state while suspended.
    _not_send: PhantomData<*mut ()>,
    // Ties the child closure's captured lifetime to this future so it
    // cannot outlive whatever it borrowed.
    _lifetime: PhantomData<&'a ()>,
}

// Movable between polls: everything the child keeps lives on its own
// heap-allocated stack.
impl<T> Unpin for EntryFuture<'_, T> {}

impl<'a, T> EntryFuture<'a, T> {
    fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> T + 'a,
    {
        Self {
            // SAFETY: this mirrors `ScopedCoroutine`, which is unavailable
            // here without giving up direct access to `resume`/`done`/
            // `started`/`force_unwind` across polls. `f` (and anything it
            // borrows via `'a`) stays valid until the coroutine is driven to
            // completion or dropped, per `EntryFuture`'s `'a` bound; the
            // coroutine is never leaked with `mem::forget`.
            coroutine: unsafe {
                Coroutine::with_stack_unchecked(
                    DefaultStack::default(),
                    move |yielder, task_cx: TaskContext| {
                        let context = EntryContext::new(yielder, task_cx);
                        let scope = context.enter();
                        let value = f();
                        drop(scope);
                        (value, context.awaited())
                    },
                )
            },
            _not_send: PhantomData,
            _lifetime: PhantomData,
        }
    }
}

impl<T> Future for EntryFuture<'_, T> {
    type Output = (T, bool);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<(T, bool)> {
        let this = self.get_mut();
        assert!(!this.coroutine.done(), "polled a completed entry");
        // The child only dereferences this between the resume below and its
        // next suspension, while `cx` is still live.
        let task_cx = cx as *mut Context<'_> as TaskContext;
        match this.coroutine.resume(task_cx) {
            CoroutineResult::Yield(()) => Poll::Pending,
            CoroutineResult::Return(output) => Poll::Ready(output),
        }
    }
}

impl<T> Drop for EntryFuture<'_, T> {
    fn drop(&mut self) {
        if self.coroutine.started() && !self.coroutine.done() {
            tracing::warn!(
                "entry dropped while its synchronous stack was suspended; \
                 unwinding the abandoned stack"
            );
            // Destructors on the dying stack must not observe an enclosing
            // entry as a legal await site.
            context::masked(|| self.coroutine.force_unwind());
        }
    }
}

/// Runs the synchronous function `f` inside the enclosing async context.
///
/// `f` executes on its own call stack and may call [`await_from_sync`] at
/// any depth. The future resolves to `f`'s return value once `f` returns; a
/// panic in `f`, or one left uncaught from an awaited future, resumes
/// unwinding out of this future with its payload intact. A function that
/// never awaits completes in a single poll.
///
/// Arguments are passed by capturing them in the closure. The returned
/// future is not `Send`; drive it with a current-thread executor or a local
/// task. Dropping it mid-flight unwinds the child stack, running the
/// destructors of whatever `f` had live at its suspension point.
///
/// ```
/// use synclet::{async_entry, await_from_sync};
///
/// fn greet(name: &str) -> String {
///     let greeting: &str = await_from_sync(async { "hello" });
///     format!("{greeting}, {name}")
/// }
///
/// # async_std::task::block_on(async {
/// let out = async_entry(|| greet("world")).await;
/// assert_eq!(out, "hello, world");
/// # });
/// ```
///
/// [`await_from_sync`]: crate::await_from_sync
pub async fn async_entry<T, F>(f: F) -> T
where
    F: FnOnce() -> T,
{
    let (value, _) = EntryFuture::new(f).await;
    value
}

/// Like [`async_entry`], but fails with [`NoSuspension`] if `f` returned
/// without ever calling [`await_from_sync`].
///
/// Useful when a straight-line completion would mean the caller wrapped the
/// wrong function. The check counts calls, not suspensions: awaiting a
/// future that completes on its first poll satisfies it. A panic from `f`
/// still propagates as such and takes precedence over the check.
///
/// [`await_from_sync`]: crate::await_from_sync
pub async fn async_entry_require_suspension<T, F>(f: F) -> Result<T, NoSuspension>
where
    F: FnOnce() -> T,
{
    let (value, awaited) = EntryFuture::new(f).await;
    if awaited {
        Ok(value)
    } else {
        Err(NoSuspension)
    }
}

#[test]
fn plain_return() {
    let v = async_std::task::block_on(async_entry(|| 41 + 1));
    assert_eq!(v, 42);
}

#[test]
#[should_panic(expected = "sync boom")]
fn sync_panic_propagates() {
    async_std::task::block_on(async_entry(|| {
        crate::await_from_sync(async_std::task::yield_now());
        panic!("sync boom");
    }));
}

#[test]
fn require_suspension_flags_straight_line_functions() {
    let r = async_std::task::block_on(async_entry_require_suspension(|| 1 + 1));
    assert_eq!(r, Err(NoSuspension));

    let r = async_std::task::block_on(async_entry_require_suspension(|| {
        crate::await_from_sync(async_std::task::yield_now());
        2
    }));
    assert_eq!(r, Ok(2));
}

#[test]
fn ready_future_counts_as_awaiting() {
    let r = async_std::task::block_on(async_entry_require_suspension(|| {
        crate::await_from_sync(async { 3 })
    }));
    assert_eq!(r, Ok(3));
}

#[test]
fn nested_entries() {
    let v = async_std::task::block_on(async_entry(|| {
        let inner = crate::await_from_sync(async_entry(|| {
            crate::await_from_sync(async_std::task::yield_now());
            21
        }));
        inner * 2
    }));
    assert_eq!(v, 42);
}

#[test]
fn multi_suspension_polls_once_per_round_trip() {
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountPolls<F> {
        inner: Pin<Box<F>>,
        polls: Rc<Cell<u32>>,
    }

    impl<F: Future> Future for CountPolls<F> {
        type Output = F::Output;

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
            self.polls.set(self.polls.get() + 1);
            self.inner.as_mut().poll(cx)
        }
    }

    let polls = Rc::new(Cell::new(0));
    let entry = CountPolls {
        inner: Box::pin(async_entry(|| {
            let a = crate::await_from_sync(async {
                async_std::task::yield_now().await;
                1
            });
            let b = crate::await_from_sync(async {
                async_std::task::yield_now().await;
                2
            });
            a + b
        })),
        polls: polls.clone(),
    };
    assert_eq!(async_std::task::block_on(entry), 3);
    // Initial poll plus one per suspension.
    assert_eq!(polls.get(), 3);
}

#[test]
fn drop_before_polling_never_runs_the_child() {
    use std::cell::Cell;
    use std::rc::Rc;

    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    drop(EntryFuture::new(move || flag.set(true)));
    assert!(!ran.get());
}

#[test]
fn drop_while_suspended_unwinds_the_child() {
    use std::cell::Cell;
    use std::rc::Rc;

    struct SetOnDrop(Rc<Cell<bool>>);
    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    let unwound = Rc::new(Cell::new(false));
    let flag = unwound.clone();
    let waker = futures::task::noop_waker_ref();
    let mut cx = Context::from_waker(waker);
    let mut fut = Box::pin(async_entry(move || {
        let _guard = SetOnDrop(flag);
        crate::await_from_sync(async_std::task::sleep(std::time::Duration::from_secs(10)));
    }));
    assert!(fut.as_mut().poll(&mut cx).is_pending());
    drop(fut);
    assert!(unwound.get());
    assert!(crate::context::chain_is_empty());
}

#[test]
fn cancellation_surfaces_to_the_caller() {
    use futures::future::{AbortHandle, Abortable, Aborted};

    let (handle, registration) = AbortHandle::new_pair();
    let result = async_std::task::block_on(async {
        let entry = Abortable::new(
            async_entry(|| {
                crate::await_from_sync(async_std::task::sleep(
                    std::time::Duration::from_secs(10),
                ))
            }),
            registration,
        );
        let cancel = async {
            async_std::task::sleep(std::time::Duration::from_millis(10)).await;
            handle.abort();
        };
        futures::future::join(entry, cancel).await.0
    });
    assert_eq!(result, Err(Aborted));
}
