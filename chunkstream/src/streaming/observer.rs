//! Observer position provider.
//!
//! The streaming controller reads the reference point (usually the camera)
//! once per tick through the [`Observer`] trait. An observer without a
//! position makes the controller skip its diff for that tick.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`. [`SharedObserver`] keeps the
//! position behind a mutex so a game loop can move it while the controller
//! runs on the async runtime.

use parking_lot::Mutex;

/// Provides the world-space position the world streams around.
///
/// # Example
///
/// ```
/// use chunkstream::streaming::{Observer, SharedObserver};
///
/// let observer = SharedObserver::new();
/// assert_eq!(observer.position(), None);
///
/// observer.set_position([10.0, 0.0, -4.0]);
/// assert_eq!(observer.position(), Some([10.0, 0.0, -4.0]));
/// ```
pub trait Observer: Send + Sync {
    /// Current position as `[x, y, z]`; `y` is up and ignored by streaming.
    fn position(&self) -> Option<[f32; 3]>;
}

/// Observer whose position is set from outside.
#[derive(Debug, Default)]
pub struct SharedObserver {
    position: Mutex<Option<[f32; 3]>>,
}

impl SharedObserver {
    /// Creates an observer with no position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an observer at `position`.
    pub fn at(position: [f32; 3]) -> Self {
        Self {
            position: Mutex::new(Some(position)),
        }
    }

    pub fn set_position(&self, position: [f32; 3]) {
        *self.position.lock() = Some(position);
    }

    /// Moves the observer by `delta`. Does nothing without a position.
    pub fn translate(&self, delta: [f32; 3]) {
        if let Some(position) = self.position.lock().as_mut() {
            for (axis, d) in position.iter_mut().zip(delta) {
                *axis += d;
            }
        }
    }

    /// Removes the position.
    pub fn clear(&self) {
        *self.position.lock() = None;
    }
}

impl Observer for SharedObserver {
    fn position(&self) -> Option<[f32; 3]> {
        *self.position.lock()
    }
}

/// Observer pinned to one position.
impl Observer for [f32; 3] {
    fn position(&self) -> Option<[f32; 3]> {
        Some(*self)
    }
}
