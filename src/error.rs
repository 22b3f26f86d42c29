use thiserror::Error;

/// The current call stack is not owned by an [`async_entry`] driver.
///
/// Returned by [`try_await_from_sync`] (and carried in the panic message of
/// [`await_from_sync`]) when the primitive is called from the root stack, or
/// from inside the `poll` of a future that is itself being awaited through
/// this entry. The future that was passed in is dropped before the error is
/// reported.
///
/// [`async_entry`]: crate::async_entry
/// [`await_from_sync`]: crate::await_from_sync
/// [`try_await_from_sync`]: crate::try_await_from_sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("await_from_sync() may only be called from synchronous code running under async_entry()")]
pub struct IllegalContext;

/// The adopted function returned without ever awaiting.
///
/// Only reported by [`async_entry_require_suspension`]; the plain
/// [`async_entry`] treats a straight-line function as an ordinary call.
///
/// [`async_entry`]: crate::async_entry
/// [`async_entry_require_suspension`]: crate::async_entry_require_suspension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("synchronous function returned without calling await_from_sync()")]
pub struct NoSuspension;
