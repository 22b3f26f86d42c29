//! # Functional await for synchronous call stacks
//!
//! Rust's `async` is intrusive: once a function needs to await, every
//! caller up the chain usually has to become `async` too. That makes it
//! hard to drop asynchronous work into an existing synchronous middle
//! layer, or to expose one blocking-style API over an async core.
//!
//! `synclet` removes the constraint for code that already runs inside an
//! async runtime. A plain function adopted with [`async_entry`] executes on
//! its own call stack, and anywhere inside it, at any depth, a call to
//! [`await_from_sync`] suspends that whole stack on a future and returns
//! the future's output as an ordinary value. The enclosing task yields to
//! its executor while the future is pending; no thread is blocked and no
//! event loop is created or replaced.
//!
//! ## Usage
//!
//! Adopt a synchronous function and await from inside it:
//!
//! ```
//! use synclet::{async_entry, await_from_sync};
//!
//! fn fetch_greeting() -> String {
//!     let base: &str = await_from_sync(async { "hi" });
//!     format!("{base}!")
//! }
//!
//! # async_std::task::block_on(async {
//! assert_eq!(async_entry(fetch_greeting).await, "hi!");
//! # });
//! ```
//!
//! Intermediate frames stay untouched, which is the point: the decision to
//! await can live behind an ordinary function signature.
//!
//! ```
//! use std::time::Duration;
//! use synclet::{async_entry, await_from_sync};
//!
//! fn maybe_pause(dur: Option<Duration>) {
//!     if let Some(d) = dur {
//!         await_from_sync(async_std::task::sleep(d));
//!     }
//! }
//!
//! # async_std::task::block_on(async {
//! async_entry(|| maybe_pause(Some(Duration::from_millis(1)))).await;
//! # });
//! ```
//!
//! ## Model
//!
//! Each entry pairs exactly one task with exactly one child stack and
//! alternates between them: the child runs until it awaits, the task
//! suspends until the future is ready, the child resumes with the result.
//! Values, panics, and cancellation all cross the boundary unchanged.
//! Panics from the adopted function or from an awaited future keep their
//! payload; dropping the entry future mid-flight unwinds the child stack so
//! destructors run at the suspension point. Entries may nest, and any
//! number of entries can run as separate tasks on the same executor.
//!
//! Misuse is reported, not absorbed: awaiting from a stack no entry owns
//! fails with [`IllegalContext`], and [`async_entry_require_suspension`]
//! rejects an adopted function that never awaited with [`NoSuspension`].

mod context;
mod entry;
mod error;
mod suspend;

pub use entry::{async_entry, async_entry_require_suspension};
pub use error::{IllegalContext, NoSuspension};
pub use suspend::{await_from_sync, try_await_from_sync};

#[test]
fn entries_share_the_event_loop() {
    let start = std::time::Instant::now();
    let values = async_std::task::block_on(futures::future::join_all((0..5).map(|i| {
        async_entry(move || {
            await_from_sync(async_std::task::sleep(std::time::Duration::from_millis(100)));
            i * 2
        })
    })));
    // Five sleeps overlap instead of running back to back, and each entry
    // keeps its own result.
    assert_eq!(values, vec![0, 2, 4, 6, 8]);
    assert!(start.elapsed() < std::time::Duration::from_millis(400));
}
