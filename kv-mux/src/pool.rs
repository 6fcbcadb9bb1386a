use std::sync::Mutex;

/// A process-lifetime free-list of reusable `T`s.
///
/// Mirrors a Go `sync.Pool` with a `New` func: [`Pool::acquire`] returns a recycled
/// value if one is free, otherwise constructs a fresh one via the factory passed to
/// [`Pool::new`]. Every value taken out must eventually come back through
/// [`Pool::release`] exactly once; nothing enforces that at the type level, the same
/// way a `sync.Pool` doesn't either.
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    new: fn() -> T,
}

impl<T> Pool<T> {
    pub fn new(new: fn() -> T) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            new,
        }
    }

    /// Takes a value out of the pool, constructing one if none are free.
    pub fn acquire(&self) -> T {
        if let Some(value) = self.free.lock().unwrap().pop() {
            value
        } else {
            (self.new)()
        }
    }

    /// Returns a value to the pool for later reuse.
    pub fn release(&self, value: T) {
        self.free.lock().unwrap().push(value);
    }
}
