use std::cell::Cell;
use std::task;
use std::thread::{self, ThreadId};

use corosensei::Yielder;

/// Task context pointer delivered by the driver on each resume. Valid from
/// that resume until the child suspends again.
pub(crate) type TaskContext = *mut task::Context<'static>;

thread_local! {
    /// Innermost running child on this thread, if any. Entries nest, so the
    /// registered contexts form a chain through `EntryContext::parent`.
    static CURRENT: Cell<Option<*const EntryContext>> = const { Cell::new(None) };
}

/// Per-entry record tagging a child stack as driver-owned.
///
/// Lives in a frame near the bottom of the child stack, so any code running
/// on that stack can reach it through [`EntryContext::current`] for as long
/// as the child is alive.
pub(crate) struct EntryContext {
    /// Context of the enclosing entry when entries nest.
    parent: Cell<Option<*const EntryContext>>,
    yielder: *const Yielder<TaskContext, ()>,
    /// Empty while a future is being polled on behalf of the child, so a
    /// reentrant await from inside that poll is caught instead of aliasing
    /// the task context.
    task_cx: Cell<Option<TaskContext>>,
    awaited: Cell<bool>,
    created_on: ThreadId,
}

impl EntryContext {
    pub(crate) fn new(yielder: &Yielder<TaskContext, ()>, task_cx: TaskContext) -> Self {
        Self {
            parent: Cell::new(None),
            yielder,
            task_cx: Cell::new(Some(task_cx)),
            awaited: Cell::new(false),
            created_on: thread::current().id(),
        }
    }

    /// Registers this context as the innermost running child. The returned
    /// guard deregisters it on every exit path; after a forced unwind the
    /// registration is already gone and the guard leaves the chain alone.
    pub(crate) fn enter(&self) -> Scope<'_> {
        CURRENT.with(|cell| self.parent.set(cell.replace(Some(self as *const _))));
        Scope { context: self }
    }

    pub(crate) fn current() -> Option<*const EntryContext> {
        CURRENT.with(Cell::get)
    }

    pub(crate) fn mark_awaited(&self) {
        self.awaited.set(true);
    }

    pub(crate) fn awaited(&self) -> bool {
        self.awaited.get()
    }

    pub(crate) fn take_task_cx(&self) -> Option<TaskContext> {
        self.task_cx.take()
    }

    pub(crate) fn restore_task_cx(&self, task_cx: TaskContext) {
        self.task_cx.set(Some(task_cx));
    }

    /// Hands control back to the driver for one native suspension, then
    /// reinstates this context with the task context of the next poll.
    ///
    /// While the child is suspended it is absent from the chain, so the
    /// driver side of the entry never looks like a legal await site.
    pub(crate) fn suspend(&self) {
        debug_assert_eq!(thread::current().id(), self.created_on);
        CURRENT.with(|cell| cell.set(self.parent.take()));
        // SAFETY: the yielder lives on this coroutine's stack for as long as
        // the child does. If the stack is being torn down, the unwind starts
        // inside `suspend` and skips the reinstatement below, leaving the
        // chain without this context.
        let task_cx = unsafe { (*self.yielder).suspend(()) };
        self.task_cx.set(Some(task_cx));
        CURRENT.with(|cell| self.parent.set(cell.replace(Some(self as *const _))));
    }
}

/// Removes the owning context from the chain on scope exit, but only if it
/// is still the innermost one. A child that was force-unwound mid-suspension
/// already left the chain.
pub(crate) struct Scope<'a> {
    context: &'a EntryContext,
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        let me = self.context as *const EntryContext;
        CURRENT.with(|cell| {
            if cell.get() == Some(me) {
                cell.set(self.context.parent.take());
            }
        });
    }
}

/// Runs `f` with the chain hidden, so destructors executing on an abandoned
/// stack cannot reach an enclosing entry's suspension handle.
pub(crate) fn masked<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(Option<*const EntryContext>);
    impl Drop for Restore {
        fn drop(&mut self) {
            CURRENT.with(|cell| cell.set(self.0));
        }
    }
    let restore = Restore(CURRENT.with(Cell::take));
    let value = f();
    drop(restore);
    value
}

#[cfg(test)]
pub(crate) fn chain_is_empty() -> bool {
    CURRENT.with(|cell| cell.get().is_none())
}
