//! Bit-bang HX711 driver and the [`ValueSource`] adapter for it.
//!
//! The HX711 is a 24-bit ADC for load cells, clocked over two GPIO lines:
//! DOUT goes low when a conversion is ready, then each PD_SCK pulse shifts
//! out one bit, MSB first. 25 to 27 pulses per frame select the input
//! channel and gain of the *next* conversion. Holding PD_SCK high for more
//! than 60 µs powers the chip down.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::source::ValueSource;

/// How often the ready line is polled while waiting for a conversion.
/// The fastest HX711 rate is 80 samples per second (12.5 ms per frame).
const READY_POLL_INTERVAL_US: u32 = 100;

/// PD_SCK half-period. The datasheet requires a 0.2–50 µs high time.
const CLOCK_HALF_PERIOD_US: u32 = 1;

/// Minimum PD_SCK high time that powers the chip down.
const POWER_DOWN_US: u32 = 60;

/// Input channel and gain applied to the conversion after each frame,
/// selected by the number of clock pulses beyond the 24 data bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gain {
    /// Channel A, gain 128 (one extra pulse).
    A128,
    /// Channel B, gain 32 (two extra pulses).
    B32,
    /// Channel A, gain 64 (three extra pulses).
    A64,
}

impl Gain {
    fn extra_pulses(self) -> u8 {
        match self {
            Gain::A128 => 1,
            Gain::B32 => 2,
            Gain::A64 => 3,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<PinError> {
    Pin(PinError),
    /// No conversion became ready within the requested time budget.
    Timeout,
}

impl<PinError> From<PinError> for Error<PinError> {
    fn from(value: PinError) -> Self {
        Error::Pin(value)
    }
}

impl<PinError> core::fmt::Display for Error<PinError>
where
    PinError: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Pin(e) => write!(f, "pin error: {e:?}"),
            Error::Timeout => write!(f, "no conversion ready before the deadline"),
        }
    }
}

impl<PinError> core::error::Error for Error<PinError> where PinError: core::fmt::Debug {}

/// HX711 over two GPIO lines and a delay provider.
pub struct Hx711<In, Out, D> {
    dout: In,
    pd_sck: Out,
    delay: D,
    gain: Gain,
}

impl<In, Out, D> Hx711<In, Out, D>
where
    In: InputPin,
    Out: OutputPin<Error = In::Error>,
    D: DelayNs,
{
    /// A driver over the given pins. The clock pin should start low;
    /// call [`Hx711::power_up`] if the chip may be powered down.
    pub fn new(dout: In, pd_sck: Out, delay: D, gain: Gain) -> Self {
        Self {
            dout,
            pd_sck,
            delay,
            gain,
        }
    }

    /// Release the pins and delay provider.
    pub fn destroy(self) -> (In, Out, D) {
        (self.dout, self.pd_sck, self.delay)
    }

    /// Wake the chip. The first conversion after power-up uses channel A
    /// with gain 128 regardless of the configured gain.
    pub fn power_up(&mut self) -> Result<(), Error<In::Error>> {
        self.pd_sck.set_low()?;
        Ok(())
    }

    /// Put the chip into its low-power state by holding PD_SCK high.
    pub fn power_down(&mut self) -> Result<(), Error<In::Error>> {
        self.pd_sck.set_high()?;
        self.delay.delay_us(POWER_DOWN_US);
        Ok(())
    }

    /// A conversion is ready when DOUT is low.
    fn is_ready(&mut self) -> Result<bool, Error<In::Error>> {
        Ok(self.dout.is_low()?)
    }

    /// Shift out one 24-bit frame plus the gain-select pulses.
    ///
    /// Must only be called when a conversion is ready; clocking the chip
    /// early yields garbage.
    fn read_frame(&mut self) -> Result<i32, Error<In::Error>> {
        let mut raw: u32 = 0;

        for _ in 0..24 {
            self.pd_sck.set_high()?;
            self.delay.delay_us(CLOCK_HALF_PERIOD_US);
            raw = (raw << 1) | u32::from(self.dout.is_high()?);
            self.pd_sck.set_low()?;
            self.delay.delay_us(CLOCK_HALF_PERIOD_US);
        }

        for _ in 0..self.gain.extra_pulses() {
            self.pd_sck.set_high()?;
            self.delay.delay_us(CLOCK_HALF_PERIOD_US);
            self.pd_sck.set_low()?;
            self.delay.delay_us(CLOCK_HALF_PERIOD_US);
        }

        Ok(sign_extend(raw))
    }
}

/// Widen a 24-bit two's-complement frame to `i32`.
fn sign_extend(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

impl<In, Out, D> ValueSource for Hx711<In, Out, D>
where
    In: InputPin,
    Out: OutputPin<Error = In::Error>,
    D: DelayNs,
{
    type Error = Error<In::Error>;

    fn read(&mut self) -> Result<i32, Self::Error> {
        while !self.is_ready()? {
            self.delay.delay_us(READY_POLL_INTERVAL_US);
        }
        self.read_frame()
    }

    fn read_timeout(&mut self, timeout_us: u32) -> Result<i32, Self::Error> {
        let mut waited = 0u32;
        while !self.is_ready()? {
            if waited >= timeout_us {
                return Err(Error::Timeout);
            }
            let step = READY_POLL_INTERVAL_US.min(timeout_us - waited);
            self.delay.delay_us(step);
            waited += step;
        }
        self.read_frame()
    }
}
