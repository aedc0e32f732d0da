//! Output levels for the LED collaborator.
//!
//! Pins themselves come from the board HAL through [`embedded_hal::digital`].

use embedded_hal::digital::{PinState, StatefulOutputPin};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    #[must_use]
    pub fn inverted(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl From<Level> for bool {
    fn from(value: Level) -> Self {
        match value {
            Level::Low => false,
            Level::High => true,
        }
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        match value {
            false => Level::Low,
            true => Level::High,
        }
    }
}

impl From<Level> for PinState {
    fn from(value: Level) -> Self {
        match value {
            Level::Low => PinState::Low,
            Level::High => PinState::High,
        }
    }
}

/// Level the pin is currently driven to.
pub fn output_level<P: StatefulOutputPin>(pin: &mut P) -> Result<Level, P::Error> {
    pin.is_set_high().map(Level::from)
}
