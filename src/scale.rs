use core::fmt;

use crate::mass::{Mass, MassUnit};
use crate::source::{Clock, ValueSource};
use crate::utils;

/// How many raw samples to collect for one reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Strategy {
    /// Collect exactly this many samples, blocking without a deadline.
    Samples(usize),
    /// Collect as many samples as the buffer holds within this many
    /// microseconds, keeping whatever was gathered when the deadline or a
    /// late read failure cuts the collection short.
    Time(u32),
}

/// How collected samples are reduced to one representative value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Aggregate {
    /// Sorted middle sample; for an even count, the lower-middle one.
    Median,
    /// Arithmetic mean.
    Average,
}

/// Per-call sampling configuration.
///
/// The sample buffer is not part of the options: it is caller-owned and
/// passed alongside them, so the engine never allocates.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Options {
    pub strategy: Strategy,
    pub aggregate: Aggregate,
}

impl Default for Options {
    /// Median of three samples.
    fn default() -> Self {
        Self {
            strategy: Strategy::Samples(3),
            aggregate: Aggregate::Median,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<SourceError> {
    /// The value source failed before any usable sample was collected.
    Source(SourceError),
    /// A time-boxed collection reached its deadline with zero samples.
    DeadlineExpired,
    /// The reference unit was zero at normalise time. Unreachable through
    /// [`Scale::new`], which rejects a zero reference unit.
    ZeroReferenceUnit,
}

impl<SourceError> From<SourceError> for Error<SourceError> {
    fn from(value: SourceError) -> Self {
        Error::Source(value)
    }
}

impl<SourceError> fmt::Display for Error<SourceError>
where
    SourceError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Source(e) => write!(f, "value source error: {e:?}"),
            Error::DeadlineExpired => {
                write!(f, "deadline expired before any sample was collected")
            }
            Error::ZeroReferenceUnit => write!(f, "reference unit is zero"),
        }
    }
}

impl<SourceError> core::error::Error for Error<SourceError> where SourceError: fmt::Debug {}

/// Calibrated sampling engine over a [`ValueSource`].
///
/// Holds the linear calibration `(raw − offset) / ref_unit` mapping raw
/// readings to masses in `unit`, and borrows the value source for its own
/// lifetime; it never takes ownership of it. A `Scale` is not safe for
/// concurrent mutation; callers needing shared access must serialise calls
/// externally.
pub struct Scale<'a, V: ValueSource> {
    source: &'a mut V,
    unit: MassUnit,
    ref_unit: i32,
    offset: i32,
}

impl<'a, V: ValueSource> Scale<'a, V> {
    /// A scale calibrated against `ref_unit` raw counts per one `unit`,
    /// with `offset` the raw reading at zero physical mass.
    ///
    /// # Panics
    ///
    /// Panics if `ref_unit` is zero.
    pub fn new(source: &'a mut V, unit: MassUnit, ref_unit: i32, offset: i32) -> Self {
        assert!(ref_unit != 0, "reference unit must be nonzero");
        Self {
            source,
            unit,
            ref_unit,
            offset,
        }
    }

    /// The unit weights are reported in.
    pub fn unit(&self) -> MassUnit {
        self.unit
    }

    /// Raw counts per one [`Scale::unit`].
    pub fn ref_unit(&self) -> i32 {
        self.ref_unit
    }

    /// Raw reading corresponding to zero physical mass.
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Map an aggregated raw value to physical units.
    pub fn normalise(&self, raw: f64) -> Result<f64, Error<V::Error>> {
        if self.ref_unit == 0 {
            return Err(Error::ZeroReferenceUnit);
        }
        Ok((raw - f64::from(self.offset)) / f64::from(self.ref_unit))
    }

    /// Fill `buffer` with one blocking read per slot, in call order.
    /// Any read failure aborts the whole collection.
    fn collect_fixed(&mut self, buffer: &mut [i32]) -> Result<(), Error<V::Error>> {
        for slot in buffer.iter_mut() {
            *slot = self.source.read()?;
        }
        Ok(())
    }

    /// Collect bounded reads into `buffer` until it is full or the deadline
    /// passes, returning how many samples were gathered.
    ///
    /// A bounded read may legitimately fail close to the deadline even
    /// though earlier reads succeeded, so a failure only aborts the
    /// collection when no sample was gathered at all.
    fn collect_deadline(
        &mut self,
        clock: &mut impl Clock,
        buffer: &mut [i32],
        timeout_us: u32,
    ) -> Result<usize, Error<V::Error>> {
        let deadline = clock.now_us().saturating_add(u64::from(timeout_us));
        let mut count = 0;

        while count < buffer.len() {
            let now = clock.now_us();
            if now >= deadline {
                break;
            }
            let remaining = (deadline - now).min(u64::from(u32::MAX)) as u32;

            match self.source.read_timeout(remaining) {
                Ok(value) => {
                    buffer[count] = value;
                    count += 1;
                }
                Err(e) if count == 0 => return Err(Error::Source(e)),
                Err(_) => break,
            }
        }

        if count == 0 {
            return Err(Error::DeadlineExpired);
        }
        Ok(count)
    }

    /// Collect raw samples into `buffer` per `options` and aggregate them
    /// into one representative value. Does not touch calibration state.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is empty, or if a [`Strategy::Samples`] count is
    /// zero or larger than the buffer.
    pub fn read(
        &mut self,
        mut clock: impl Clock,
        buffer: &mut [i32],
        options: &Options,
    ) -> Result<f64, Error<V::Error>> {
        assert!(!buffer.is_empty(), "sample buffer must not be empty");

        let collected = match options.strategy {
            Strategy::Samples(count) => {
                assert!(count > 0, "sample count must be nonzero");
                assert!(
                    buffer.len() >= count,
                    "sample buffer shorter than requested sample count"
                );
                self.collect_fixed(&mut buffer[..count])?;
                &mut buffer[..count]
            }
            Strategy::Time(timeout_us) => {
                let count = self.collect_deadline(&mut clock, buffer, timeout_us)?;
                &mut buffer[..count]
            }
        };

        Ok(match options.aggregate {
            Aggregate::Median => utils::median(collected),
            Aggregate::Average => utils::average(collected),
        })
    }

    /// Re-zero (tare) the scale: the current aggregated raw reading becomes
    /// the new offset.
    ///
    /// The reference unit is set to 1 for the duration of the internal read
    /// and restored whether or not the read succeeds; the offset is only
    /// updated on success.
    pub fn zero(
        &mut self,
        clock: impl Clock,
        buffer: &mut [i32],
        options: &Options,
    ) -> Result<(), Error<V::Error>> {
        let ref_backup = self.ref_unit;
        self.ref_unit = 1;
        let outcome = self.read(clock, buffer, options);
        self.ref_unit = ref_backup;

        self.offset = libm::round(outcome?) as i32;
        #[cfg(feature = "defmt")]
        defmt::trace!("tare offset = {}", self.offset);
        Ok(())
    }

    /// Measure a mass: collect and aggregate raw samples, normalise the
    /// result through the calibration, and express it in the scale's unit.
    pub fn weight(
        &mut self,
        clock: impl Clock,
        buffer: &mut [i32],
        options: &Options,
    ) -> Result<Mass, Error<V::Error>> {
        let raw = self.read(clock, buffer, options)?;
        let normalised = self.normalise(raw)?;
        Ok(Mass::new(self.unit, normalised))
    }
}

#[cfg(test)]
mod test {
    use super::{Aggregate, Error, Options, Scale, Strategy};
    use crate::mass::{Mass, MassUnit};
    use crate::source::{Clock, ValueSource};
    use std::vec::Vec;

    /// Replays a fixed list of readings (cycling), failing every call once
    /// `fail_after` reads have been handed out.
    struct ScriptedSource {
        readings: Vec<i32>,
        handed_out: usize,
        fail_after: usize,
    }

    impl ScriptedSource {
        fn new(readings: &[i32]) -> Self {
            Self::failing_after(readings, usize::MAX)
        }

        fn failing_after(readings: &[i32], fail_after: usize) -> Self {
            Self {
                readings: readings.to_vec(),
                handed_out: 0,
                fail_after,
            }
        }

        fn next(&mut self) -> Result<i32, &'static str> {
            if self.handed_out >= self.fail_after {
                return Err("sensor gave up");
            }
            let value = self.readings[self.handed_out % self.readings.len()];
            self.handed_out += 1;
            Ok(value)
        }
    }

    impl ValueSource for ScriptedSource {
        type Error = &'static str;

        fn read(&mut self) -> Result<i32, Self::Error> {
            self.next()
        }

        fn read_timeout(&mut self, _timeout_us: u32) -> Result<i32, Self::Error> {
            self.next()
        }
    }

    /// Advances a fixed step on every reading.
    struct TickingClock {
        now: u64,
        step: u64,
    }

    impl TickingClock {
        fn with_step(step: u64) -> Self {
            Self { now: 0, step }
        }
    }

    impl Clock for TickingClock {
        fn now_us(&mut self) -> u64 {
            let now = self.now;
            self.now += self.step;
            now
        }
    }

    fn options(strategy: Strategy, aggregate: Aggregate) -> Options {
        Options {
            strategy,
            aggregate,
        }
    }

    #[test]
    fn fixed_count_collects_in_call_order() {
        let mut source = ScriptedSource::new(&[10, 20, 30, 40]);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 1, 0);
        let mut buffer = [0i32; 4];

        let value = scale
            .read(
                TickingClock::with_step(1),
                &mut buffer,
                &options(Strategy::Samples(4), Aggregate::Average),
            )
            .unwrap();

        assert_eq!(value, 25.0);
        assert_eq!(buffer, [10, 20, 30, 40]);
    }

    #[test]
    fn fixed_count_fails_if_any_read_fails() {
        let mut source = ScriptedSource::failing_after(&[10, 20], 2);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 1, 0);
        let mut buffer = [0i32; 3];

        let result = scale.read(
            TickingClock::with_step(1),
            &mut buffer,
            &options(Strategy::Samples(3), Aggregate::Average),
        );

        assert_eq!(result, Err(Error::Source("sensor gave up")));
    }

    #[test]
    #[should_panic(expected = "sample buffer shorter")]
    fn fixed_count_requires_buffer_capacity() {
        let mut source = ScriptedSource::new(&[1]);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 1, 0);
        let mut buffer = [0i32; 2];

        let _ = scale.read(
            TickingClock::with_step(1),
            &mut buffer,
            &options(Strategy::Samples(4), Aggregate::Median),
        );
    }

    #[test]
    #[should_panic(expected = "reference unit must be nonzero")]
    fn construction_rejects_zero_reference_unit() {
        let mut source = ScriptedSource::new(&[1]);
        let _ = Scale::new(&mut source, MassUnit::Gram, 0, 0);
    }

    #[test]
    fn time_boxed_fills_the_buffer_given_a_generous_deadline() {
        let mut source = ScriptedSource::new(&[1, 2, 3, 4]);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 1, 0);
        let mut buffer = [0i32; 4];

        let value = scale
            .read(
                TickingClock::with_step(1),
                &mut buffer,
                &options(Strategy::Time(1_000_000), Aggregate::Average),
            )
            .unwrap();

        assert_eq!(value, 2.5);
        assert_eq!(buffer, [1, 2, 3, 4]);
    }

    #[test]
    fn time_boxed_keeps_partial_samples_on_late_failure() {
        let mut source = ScriptedSource::failing_after(&[100, 200], 2);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 1, 0);
        let mut buffer = [0i32; 8];

        let value = scale
            .read(
                TickingClock::with_step(1),
                &mut buffer,
                &options(Strategy::Time(1_000_000), Aggregate::Average),
            )
            .unwrap();

        assert_eq!(value, 150.0);
    }

    #[test]
    fn time_boxed_fails_if_the_first_read_fails() {
        let mut source = ScriptedSource::failing_after(&[1], 0);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 1, 0);
        let mut buffer = [0i32; 4];

        let result = scale.read(
            TickingClock::with_step(1),
            &mut buffer,
            &options(Strategy::Time(1_000_000), Aggregate::Median),
        );

        assert_eq!(result, Err(Error::Source("sensor gave up")));
    }

    #[test]
    fn time_boxed_fails_when_deadline_passes_with_no_samples() {
        let mut source = ScriptedSource::new(&[1]);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 1, 0);
        let mut buffer = [0i32; 4];

        // The clock jumps past the deadline before the first read attempt.
        let result = scale.read(
            TickingClock::with_step(2_000),
            &mut buffer,
            &options(Strategy::Time(1_000), Aggregate::Median),
        );

        assert_eq!(result, Err(Error::DeadlineExpired));
    }

    #[test]
    fn median_read_uses_lower_middle_for_even_counts() {
        let mut source = ScriptedSource::new(&[40, 10, 30, 20]);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 1, 0);
        let mut buffer = [0i32; 4];

        let value = scale
            .read(
                TickingClock::with_step(1),
                &mut buffer,
                &options(Strategy::Samples(4), Aggregate::Median),
            )
            .unwrap();

        assert_eq!(value, 20.0);
    }

    #[test]
    fn zero_sets_offset_and_preserves_reference_unit() {
        let mut source = ScriptedSource::new(&[5_000]);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 400, 0);
        let mut buffer = [0i32; 3];
        let opt = Options::default();

        scale
            .zero(TickingClock::with_step(1), &mut buffer, &opt)
            .unwrap();

        assert_eq!(scale.offset(), 5_000);
        assert_eq!(scale.ref_unit(), 400);

        // The same raw reading now normalises to (approximately) zero mass.
        let mass = scale
            .weight(TickingClock::with_step(1), &mut buffer, &opt)
            .unwrap();
        assert_eq!(mass, Mass::new(MassUnit::Gram, 0.0));
    }

    #[test]
    fn zero_rounds_the_aggregated_value() {
        let mut source = ScriptedSource::new(&[5_000, 5_001]);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 400, 0);
        let mut buffer = [0i32; 2];

        scale
            .zero(
                TickingClock::with_step(1),
                &mut buffer,
                &options(Strategy::Samples(2), Aggregate::Average),
            )
            .unwrap();

        // round(5000.5) away from zero
        assert_eq!(scale.offset(), 5_001);
    }

    #[test]
    fn failed_zero_leaves_calibration_untouched() {
        let mut source = ScriptedSource::failing_after(&[1], 0);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 400, 123);
        let mut buffer = [0i32; 3];

        let result = scale.zero(TickingClock::with_step(1), &mut buffer, &Options::default());

        assert_eq!(result, Err(Error::Source("sensor gave up")));
        assert_eq!(scale.ref_unit(), 400);
        assert_eq!(scale.offset(), 123);
    }

    #[test]
    fn weight_normalises_through_the_calibration() {
        let mut source = ScriptedSource::new(&[9_000]);
        let mut scale = Scale::new(&mut source, MassUnit::Gram, 400, 1_000);
        let mut buffer = [0i32; 3];

        let mass = scale
            .weight(TickingClock::with_step(1), &mut buffer, &Options::default())
            .unwrap();

        // (9000 - 1000) / 400 = 20 g
        assert_eq!(mass, Mass::new(MassUnit::Gram, 20.0));
        assert_eq!(mass.unit(), MassUnit::Gram);
    }

    #[test]
    fn weight_failure_propagates() {
        let mut source = ScriptedSource::failing_after(&[1], 0);
        let mut scale = Scale::new(&mut source, MassUnit::Kilogram, 400, 0);
        let mut buffer = [0i32; 3];

        let result = scale.weight(TickingClock::with_step(1), &mut buffer, &Options::default());

        assert_eq!(result, Err(Error::Source("sensor gave up")));
    }

    #[test]
    fn normalise_applies_offset_then_reference_unit() {
        let mut source = ScriptedSource::new(&[1]);
        let scale = Scale::new(&mut source, MassUnit::Gram, 200, -400);

        assert_eq!(scale.normalise(600.0).unwrap(), 5.0);
        assert_eq!(scale.normalise(-400.0).unwrap(), 0.0);
    }
}
