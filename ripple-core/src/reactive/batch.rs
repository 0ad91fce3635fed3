//! Transactions
//!
//! Group multiple writes into a single notification pass.

use super::runtime::Runtime;

/// Batch multiple cell writes into a single notification pass.
///
/// Without batching, each write notifies its dependents immediately. Inside
/// a batch, dependents are notified once, after the outermost batch returns,
/// and only ever observe the final value of each cell. Batches nest; inner
/// batches only adjust the depth.
///
/// # Example
///
/// ```rust,ignore
/// let a = Cell::new(0);
/// let b = Cell::new(0);
///
/// let _sum = subscribe({
///     let (a, b) = (a.clone(), b.clone());
///     move |scope| println!("sum: {}", *a.read(scope) + *b.read(scope))
/// });
///
/// batch(|| {
///     a.write(2);
///     b.write(3);
/// }); // prints "sum: 5" once
/// ```
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    Runtime::with(Runtime::enter_batch);

    // Close the level even if `f` panics
    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let _ = Runtime::try_with(Runtime::abandon_batch);
        }
    }

    let guard = BatchGuard;
    let value = f();
    std::mem::forget(guard);

    Runtime::with(Runtime::exit_batch);
    value
}
