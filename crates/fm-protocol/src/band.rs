//! Band plan and channel arithmetic
//!
//! Frequencies travel over the link as integers in units of 10 kHz, so
//! 87.5 MHz is `8750`. A [`BandConfiguration`] fixes the lower and upper
//! bounds and the channel step for a session; channel numbers count steps
//! up from the lower bound.

use std::fmt;

use crate::codes::{Deemphasis, Region};
use crate::error::ProtocolError;

/// A tuned frequency in link units of 10 kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Frequency(pub u32);

impl Frequency {
    /// Build from a value in MHz, rounding to the nearest 10 kHz
    pub fn from_mhz(mhz: f64) -> Self {
        Self((mhz * 100.0).round() as u32)
    }

    /// Raw link value
    pub fn units(self) -> u32 {
        self.0
    }

    /// Value in kHz
    pub fn khz(self) -> u32 {
        self.0 * 10
    }

    /// Value in MHz
    pub fn mhz(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02} MHz", self.0 / 100, self.0 % 100)
    }
}

impl From<u32> for Frequency {
    fn from(units: u32) -> Self {
        Self(units)
    }
}

/// Band limits and channel grid for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BandConfiguration {
    /// Lowest tunable frequency
    pub low: Frequency,
    /// Highest tunable frequency
    pub high: Frequency,
    /// Channel spacing in link units
    pub step: u32,
    /// Deemphasis time constant
    pub deemphasis: Deemphasis,
    /// World region
    pub region: Region,
}

impl BandConfiguration {
    /// Build a band, validating that it is non-empty with a non-zero step
    pub fn new(
        low: Frequency,
        high: Frequency,
        step: u32,
        deemphasis: Deemphasis,
        region: Region,
    ) -> Result<Self, ProtocolError> {
        if step == 0 {
            return Err(ProtocolError::InvalidParameter("channel step is zero".into()));
        }
        if low > high {
            return Err(ProtocolError::InvalidParameter(format!(
                "band low bound {} above high bound {}",
                low, high
            )));
        }
        Ok(Self {
            low,
            high,
            step,
            deemphasis,
            region,
        })
    }

    /// Standard band plan for a region
    pub fn for_region(region: Region) -> Self {
        let (low, high, step, deemphasis) = match region {
            Region::Na => (8750, 10800, 20, Deemphasis::Us75),
            Region::Eur => (8750, 10800, 10, Deemphasis::Us50),
            Region::Jp => (7600, 9000, 10, Deemphasis::Us50),
            Region::JpII => (7600, 9500, 10, Deemphasis::Us50),
        };
        Self {
            low: Frequency(low),
            high: Frequency(high),
            step,
            deemphasis,
            region,
        }
    }

    /// Channel number for a frequency; frequencies below the band map to 0
    pub fn channel_of(&self, freq: Frequency) -> u16 {
        let offset = freq.0.saturating_sub(self.low.0);
        (offset / self.step) as u16
    }

    /// Frequency of a channel number
    pub fn frequency_of(&self, channel: u16) -> Frequency {
        Frequency(self.low.0 + channel as u32 * self.step)
    }

    /// Whether a frequency lies in the band and on the channel grid
    pub fn is_valid(&self, freq: Frequency) -> bool {
        self.contains(freq) && (freq.0 - self.low.0) % self.step == 0
    }

    /// Whether a frequency lies between the bounds, grid ignored
    pub fn contains(&self, freq: Frequency) -> bool {
        self.low <= freq && freq <= self.high
    }

    /// Validate a frequency, returning it unchanged when tunable
    pub fn check(&self, freq: Frequency) -> Result<Frequency, ProtocolError> {
        if self.is_valid(freq) {
            Ok(freq)
        } else {
            Err(ProtocolError::InvalidFrequency(freq.0))
        }
    }

    /// Highest channel number in the band
    pub fn max_channel(&self) -> u16 {
        self.channel_of(self.high)
    }
}

impl Default for BandConfiguration {
    fn default() -> Self {
        Self::for_region(Region::Na)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn na_channel_numbers() {
        let band = BandConfiguration::for_region(Region::Na);
        assert_eq!(band.channel_of(Frequency(8790)), 2);
        assert_eq!(band.channel_of(Frequency(8910)), 8);
        assert_eq!(band.channel_of(Frequency(9530)), 39);
        assert_eq!(band.channel_of(Frequency(10130)), 69);
        assert_eq!(band.channel_of(Frequency(10790)), 102);
        assert_eq!(band.frequency_of(102), Frequency(10790));
    }

    #[test]
    fn validity_respects_grid_and_bounds() {
        let band = BandConfiguration::for_region(Region::Na);
        assert!(band.is_valid(Frequency(8750)));
        assert!(band.is_valid(Frequency(9730)));
        assert!(!band.is_valid(Frequency(9740)));
        assert!(!band.is_valid(Frequency(8730)));
        assert!(!band.is_valid(Frequency(10820)));
        assert!(band.check(Frequency(9740)).is_err());
    }

    #[test]
    fn frequency_display_and_conversion() {
        assert_eq!(Frequency(8750).to_string(), "87.50 MHz");
        assert_eq!(Frequency::from_mhz(97.3), Frequency(9730));
        assert_eq!(Frequency(9730).khz(), 97_300);
        assert!((Frequency(10130).mhz() - 101.3).abs() < 1e-9);
    }

    #[test]
    fn rejects_degenerate_bands() {
        assert!(BandConfiguration::new(
            Frequency(8750),
            Frequency(10800),
            0,
            Deemphasis::Us75,
            Region::Na
        )
        .is_err());
        assert!(BandConfiguration::new(
            Frequency(10800),
            Frequency(8750),
            10,
            Deemphasis::Us75,
            Region::Na
        )
        .is_err());
    }

    #[test]
    fn japan_plan() {
        let band = BandConfiguration::for_region(Region::Jp);
        assert_eq!(band.low, Frequency(7600));
        assert_eq!(band.max_channel(), 140);
    }

    fn region() -> impl Strategy<Value = Region> {
        prop_oneof![
            Just(Region::Na),
            Just(Region::Eur),
            Just(Region::Jp),
            Just(Region::JpII),
        ]
    }

    proptest! {
        #[test]
        fn channel_round_trip(region in region(), pick in 0u16..1000) {
            let band = BandConfiguration::for_region(region);
            let channel = pick % (band.max_channel() + 1);
            let freq = band.frequency_of(channel);
            prop_assert!(band.is_valid(freq));
            prop_assert_eq!(band.channel_of(freq), channel);
        }
    }
}
