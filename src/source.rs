//! Capability seams between the engine and the outside world.
//!
//! [`ValueSource`] is the only way the engine reaches a sensor: anything
//! that can produce a signed 32-bit raw sample, optionally bounded by a
//! deadline, can be plugged in. [`Clock`] supplies the monotonic time the
//! time-boxed sampling strategy needs for its deadline accounting; it is
//! passed into each read call rather than stored, the same way a delay
//! provider is passed into a driver's measure call.

/// A producer of raw, uncalibrated readings.
pub trait ValueSource {
    /// Hardware-specific failure reported by the concrete source.
    type Error;

    /// Obtain one raw sample, blocking for as long as it takes.
    fn read(&mut self) -> Result<i32, Self::Error>;

    /// Obtain one raw sample within `timeout_us` microseconds, failing if
    /// none could be produced before the deadline.
    fn read_timeout(&mut self, timeout_us: u32) -> Result<i32, Self::Error>;
}

impl<V: ValueSource + ?Sized> ValueSource for &mut V {
    type Error = V::Error;

    fn read(&mut self) -> Result<i32, Self::Error> {
        V::read(self)
    }

    fn read_timeout(&mut self, timeout_us: u32) -> Result<i32, Self::Error> {
        V::read_timeout(self, timeout_us)
    }
}

/// A monotonic microsecond clock.
///
/// Only differences between two readings are meaningful; the epoch is
/// whatever the implementation chooses (boot, typically).
pub trait Clock {
    /// Microseconds elapsed since the clock's epoch.
    fn now_us(&mut self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &mut C {
    fn now_us(&mut self) -> u64 {
        C::now_us(self)
    }
}
