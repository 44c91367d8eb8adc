use core::fmt;
use core::ops::{Add, AddAssign, Mul, MulAssign, Sub, SubAssign};

/// Micrograms per one of each unit, indexed by [`MassUnit`] discriminant.
static UG_PER_UNIT: [f64; 10] = [
    1.0,
    1_000.0,
    1_000_000.0,
    1_000_000_000.0,
    1_000_000_000_000.0,
    1_016_046_908_800.0,
    907_184_740_000.0,
    6_350_293_180.0,
    453_592_370.0,
    28_349_523.125,
];

/// Display symbols, indexed by [`MassUnit`] discriminant.
static UNIT_SYMBOLS: [&str; 10] = [
    "µg",
    "mg",
    "g",
    "kg",
    "ton",
    "ton (IMP)",
    "ton (US)",
    "st",
    "lb",
    "oz",
];

/// Upper bound on the rendered length of a [`Mass`], in bytes.
///
/// The capacity of the string returned by [`Mass::to_text`]. Comfortably
/// larger than any amount the supported units and precision rule produce.
pub const MASS_TEXT_SIZE: usize = 64;

/// Units a [`Mass`] can be expressed in.
///
/// Discriminants index the ratio and symbol tables, so the order here is
/// load-bearing. Micrograms are the canonical unit: every conversion between
/// two other units routes through micrograms rather than using a pairwise
/// table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(usize)]
pub enum MassUnit {
    Microgram = 0,
    Milligram,
    Gram,
    Kilogram,
    /// Metric ton (1,000 kg).
    MetricTon,
    /// Imperial (long) ton, 2,240 lb.
    ImperialTon,
    /// US (short) ton, 2,000 lb.
    UsTon,
    Stone,
    Pound,
    Ounce,
}

impl MassUnit {
    /// Number of micrograms in one of this unit.
    pub fn ratio(self) -> f64 {
        UG_PER_UNIT[self as usize]
    }

    /// Display symbol for this unit, e.g. `"kg"`.
    pub fn symbol(self) -> &'static str {
        UNIT_SYMBOLS[self as usize]
    }

    /// Convert `amount` expressed in `self` to `target`.
    ///
    /// Converting a unit to itself returns `amount` unchanged, with no
    /// floating-point drift. Any other pair routes through micrograms.
    pub fn convert(self, amount: f64, target: MassUnit) -> f64 {
        if self == target {
            amount
        } else if target == MassUnit::Microgram {
            amount * self.ratio()
        } else if self == MassUnit::Microgram {
            amount / target.ratio()
        } else {
            MassUnit::Microgram.convert(self.convert(amount, MassUnit::Microgram), target)
        }
    }
}

impl fmt::Display for MassUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A physical mass.
///
/// Stored canonically as `f64` micrograms so that arithmetic and comparison
/// are unit-independent; the unit given at construction is kept only for
/// presentation and defaults the unit of [`Mass::value`]. Arithmetic between
/// two masses operates on the canonical values and the result adopts the
/// left-hand operand's display unit.
///
/// Equality is approximate by design: two masses compare equal when their
/// canonical values differ by less than [`f64::EPSILON`]. [`PartialOrd`] is
/// consistent with that, so a pair within tolerance is neither less than nor
/// greater than the other.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Mass {
    ug: f64,
    unit: MassUnit,
}

impl Mass {
    /// A mass of `amount` expressed in `unit`.
    pub fn new(unit: MassUnit, amount: f64) -> Self {
        Self {
            ug: unit.convert(amount, MassUnit::Microgram),
            unit,
        }
    }

    /// The amount in the display unit.
    pub fn value(&self) -> f64 {
        self.value_in(self.unit)
    }

    /// The amount converted to `unit`.
    pub fn value_in(&self, unit: MassUnit) -> f64 {
        MassUnit::Microgram.convert(self.ug, unit)
    }

    /// The canonical value in micrograms.
    pub fn micrograms(&self) -> f64 {
        self.ug
    }

    /// The display unit.
    pub fn unit(&self) -> MassUnit {
        self.unit
    }

    /// Divide by `rhs`, or `None` when `rhs` is within [`f64::EPSILON`]
    /// of zero. Neither operand is modified on failure.
    pub fn checked_div(self, rhs: Mass) -> Option<Mass> {
        if libm::fabs(rhs.ug) < f64::EPSILON {
            return None;
        }
        Some(Mass {
            ug: self.ug / rhs.ug,
            unit: self.unit,
        })
    }

    /// In-place [`Mass::checked_div`]. Returns whether the division was
    /// performed; `self` is untouched when it was not.
    pub fn checked_div_assign(&mut self, rhs: Mass) -> bool {
        match self.checked_div(rhs) {
            Some(res) => {
                *self = res;
                true
            }
            None => false,
        }
    }

    /// Render into a bounded string, e.g. `"32.4762 mg"`.
    ///
    /// Truncates (never panics) in the unreachable case that the rendering
    /// exceeds [`MASS_TEXT_SIZE`] bytes.
    pub fn to_text(&self) -> heapless::String<MASS_TEXT_SIZE> {
        let mut out = heapless::String::new();
        let _ = fmt::write(&mut out, format_args!("{self}"));
        out
    }
}

impl Add for Mass {
    type Output = Mass;

    fn add(self, rhs: Mass) -> Mass {
        Mass {
            ug: self.ug + rhs.ug,
            unit: self.unit,
        }
    }
}

impl Sub for Mass {
    type Output = Mass;

    fn sub(self, rhs: Mass) -> Mass {
        Mass {
            ug: self.ug - rhs.ug,
            unit: self.unit,
        }
    }
}

impl Mul for Mass {
    type Output = Mass;

    fn mul(self, rhs: Mass) -> Mass {
        Mass {
            ug: self.ug * rhs.ug,
            unit: self.unit,
        }
    }
}

impl AddAssign for Mass {
    fn add_assign(&mut self, rhs: Mass) {
        *self = *self + rhs;
    }
}

impl SubAssign for Mass {
    fn sub_assign(&mut self, rhs: Mass) {
        *self = *self - rhs;
    }
}

impl MulAssign for Mass {
    fn mul_assign(&mut self, rhs: Mass) {
        *self = *self * rhs;
    }
}

impl PartialEq for Mass {
    fn eq(&self, other: &Self) -> bool {
        libm::fabs(self.ug - other.ug) < f64::EPSILON
    }
}

impl PartialOrd for Mass {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        if self == other {
            Some(core::cmp::Ordering::Equal)
        } else {
            self.ug.partial_cmp(&other.ug)
        }
    }
}

impl fmt::Display for Mass {
    /// Formats as `"<amount> <unit-symbol>"`.
    ///
    /// The number of decimal places is chosen so the first significant
    /// fractional digit is visible: whole numbers render with none, `1.5`
    /// renders as `1.5` and `0.003` as `0.003`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value();
        let frac = libm::fabs(value - libm::trunc(value));
        let decimals = if frac < f64::EPSILON {
            0
        } else {
            let wanted = libm::ceil(-libm::log10(frac));
            if wanted > 0.0 { wanted as usize } else { 0 }
        };
        write!(f, "{:.*} {}", decimals, value, self.unit)
    }
}
