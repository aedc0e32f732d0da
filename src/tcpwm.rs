//! Timer/counter with software-settable interrupt causes.
//!
//! [`Registers`] holds the state of one counter: control, count, period and
//! compare values, and the interrupt registers. Interrupt causes latch in
//! `INTR`, either from the counting logic or from software writing `INTR_SET`.
//! They are cleared by writing ones to `INTR` and reach the interrupt
//! controller only through `INTR_MASK`.
//!
//! Every read-modify-write happens inside a critical section, since the main
//! loop arms causes while the interrupt handler clears them.

use core::cell::Cell;
use core::fmt;
use core::ops::BitOr;

use embassy_sync::blocking_mutex::CriticalSectionMutex;

use crate::sysint::InterruptLine;

#[allow(missing_docs)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// One interrupt cause of the counter.
pub enum Cause {
    /// The counter reached its period (counting up) or zero (counting down).
    TerminalCount = 0,
    CaptureCompare0,
    CaptureCompare1,
}

impl Cause {
    const fn mask(&self) -> u8 {
        1 << (*self as u8)
    }
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A selection of interrupt causes, laid out as in the `INTR*` registers.
pub struct Causes(u8);

impl Causes {
    pub const NONE: Causes = Causes(0);
    pub const ALL: Causes = Causes(0b111);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Get whether `cause` is set in the current selection.
    pub fn get(&self, cause: Cause) -> bool {
        self.0 & cause.mask() != 0x0
    }

    /// Set whether `cause` is set in the current selection, depending on the `value`.
    pub fn set(&mut self, cause: Cause, value: bool) {
        if value {
            self.0 |= cause.mask();
        } else {
            self.0 &= !cause.mask();
        }
    }
}

impl From<Cause> for Causes {
    fn from(value: Cause) -> Self {
        let mut res = Causes::default();
        res.set(value, true);
        res
    }
}

impl BitOr for Causes {
    type Output = Causes;

    fn bitor(self, rhs: Causes) -> Causes {
        Causes(self.0 | rhs.0)
    }
}

impl BitOr for Cause {
    type Output = Causes;

    fn bitor(self, rhs: Cause) -> Causes {
        Causes::from(self) | rhs
    }
}

impl BitOr<Cause> for Causes {
    type Output = Causes;

    fn bitor(self, rhs: Cause) -> Causes {
        self | Causes::from(rhs)
    }
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    #[default]
    Up,
    Down,
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunMode {
    /// Reload and keep counting after terminal count.
    #[default]
    Continuous,
    /// Stop at terminal count.
    OneShot,
}

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Input clock divider.
pub enum Prescaler {
    #[default]
    Div1 = 0,
    Div2,
    Div4,
    Div8,
    Div16,
    Div32,
    Div64,
    Div128,
}

impl Prescaler {
    const fn divisor(self) -> u8 {
        1 << (self as u8)
    }
}

#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Counter configuration, applied by [`Counter::init`].
pub struct Config {
    /// Terminal value when counting up, reload value when counting down.
    ///
    /// The counter runs through `0..=period` inclusive, so one wrap takes
    /// `period + 1` counter clocks in either direction.
    pub period: u32,
    /// Compare value raising [`Cause::CaptureCompare0`].
    pub compare0: u32,
    /// Compare value raising [`Cause::CaptureCompare1`].
    pub compare1: Option<u32>,
    pub direction: Direction,
    pub run_mode: RunMode,
    pub prescaler: Prescaler,
    /// Causes forwarded to the interrupt controller after init.
    pub interrupt_mask: Causes,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            period: 32_767,
            compare0: 16_384,
            compare1: None,
            direction: Direction::Up,
            run_mode: RunMode::Continuous,
            prescaler: Prescaler::Div1,
            interrupt_mask: Causes::NONE,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A zero period never produces a terminal count.
    InvalidPeriod,
    /// A compare value lies beyond the period.
    CompareOutOfRange,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPeriod => f.write_str("counter period must be non-zero"),
            Error::CompareOutOfRange => f.write_str("compare value exceeds the counter period"),
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct State {
    enabled: bool,
    config: Config,
    counter: u32,
    prescale: u8,
    intr: u8,
    intr_mask: u8,
}

impl State {
    const RESET: State = State {
        enabled: false,
        config: Config {
            period: 0,
            compare0: 0,
            compare1: None,
            direction: Direction::Up,
            run_mode: RunMode::Continuous,
            prescaler: Prescaler::Div1,
            interrupt_mask: Causes::NONE,
        },
        counter: 0,
        prescale: 0,
        intr: 0,
        intr_mask: 0,
    };

    fn asserted(&self) -> bool {
        self.intr & self.intr_mask != 0
    }

    /// Advance by one counter clock, returning the causes raised.
    fn count(&mut self) -> u8 {
        let cfg = self.config;
        let mut raised = 0;

        let terminal = match cfg.direction {
            Direction::Up => self.counter >= cfg.period,
            Direction::Down => self.counter == 0,
        };

        let moved = if terminal {
            raised |= Cause::TerminalCount.mask();
            match cfg.run_mode {
                RunMode::OneShot => {
                    self.enabled = false;
                    false
                }
                RunMode::Continuous => {
                    self.counter = match cfg.direction {
                        Direction::Up => 0,
                        Direction::Down => cfg.period,
                    };
                    true
                }
            }
        } else {
            self.counter = match cfg.direction {
                Direction::Up => self.counter + 1,
                Direction::Down => self.counter - 1,
            };
            true
        };

        // The reload value is a count like any other and can match.
        if moved {
            if self.counter == cfg.compare0 {
                raised |= Cause::CaptureCompare0.mask();
            }
            if Some(self.counter) == cfg.compare1 {
                raised |= Cause::CaptureCompare1.mask();
            }
        }

        raised
    }
}

fn no_notify(_line: u16) {}

/// Register state of one counter.
pub struct Registers {
    line: u16,
    notify: fn(u16),
    state: CriticalSectionMutex<Cell<State>>,
}

impl Registers {
    /// Counter wired to interrupt controller input `line`.
    pub const fn new(line: u16) -> Self {
        Self::with_notify(line, no_notify)
    }

    /// Like [`Registers::new`], calling `notify` with the line number whenever
    /// the output becomes asserted.
    ///
    /// Used where the controller does not sample the line by itself.
    pub const fn with_notify(line: u16, notify: fn(u16)) -> Self {
        Self {
            line,
            notify,
            state: CriticalSectionMutex::new(Cell::new(State::RESET)),
        }
    }

    fn modify<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let (res, rising) = self.state.lock(|cell| {
            let mut state = cell.get();
            let before = state.asserted();
            let res = f(&mut state);
            let rising = !before && state.asserted();
            cell.set(state);
            (res, rising)
        });

        if rising {
            (self.notify)(self.line);
        }

        res
    }

    fn read(&self) -> State {
        self.state.lock(Cell::get)
    }

    /// `INTR`: latched causes.
    pub fn intr(&self) -> u8 {
        self.read().intr
    }

    /// Write-one-to-clear on `INTR`.
    pub fn write_intr_clear(&self, bits: u8) {
        self.modify(|s| s.intr &= !bits);
    }

    /// `INTR_SET`: latch causes by software.
    pub fn write_intr_set(&self, bits: u8) {
        self.modify(|s| s.intr |= bits & Causes::ALL.bits());
    }

    pub fn intr_mask(&self) -> u8 {
        self.read().intr_mask
    }

    pub fn write_intr_mask(&self, bits: u8) {
        self.modify(|s| s.intr_mask = bits & Causes::ALL.bits());
    }

    /// `INTR_MASKED`: causes the controller sees.
    pub fn intr_masked(&self) -> u8 {
        let s = self.read();
        s.intr & s.intr_mask
    }
}

impl InterruptLine for Registers {
    fn line(&self) -> u16 {
        self.line
    }

    fn is_asserted(&self) -> bool {
        self.read().asserted()
    }
}

/// Driver for one counter.
pub struct Counter<'d> {
    regs: &'d Registers,
}

impl<'d> Counter<'d> {
    pub fn new(regs: &'d Registers) -> Self {
        Self { regs }
    }

    pub fn regs(&self) -> &'d Registers {
        self.regs
    }

    /// Apply `config`, leaving the counter stopped at its start value.
    pub fn init(&mut self, config: &Config) -> Result<(), Error> {
        if config.period == 0 {
            return Err(Error::InvalidPeriod);
        }
        if config.compare0 > config.period || config.compare1.is_some_and(|c| c > config.period) {
            return Err(Error::CompareOutOfRange);
        }

        let config = *config;
        self.regs.modify(|s| {
            s.enabled = false;
            s.config = config;
            s.prescale = 0;
            s.counter = match config.direction {
                Direction::Up => 0,
                Direction::Down => config.period,
            };
            s.intr_mask = config.interrupt_mask.bits();
        });

        Ok(())
    }

    /// Start counting.
    pub fn enable(&mut self) {
        self.regs.modify(|s| s.enabled = true);
    }

    pub fn disable(&mut self) {
        self.regs.modify(|s| s.enabled = false);
    }

    pub fn is_enabled(&self) -> bool {
        self.regs.read().enabled
    }

    /// Current count.
    pub fn counter(&self) -> u32 {
        self.regs.read().counter
    }

    /// Select the causes forwarded to the interrupt controller.
    pub fn set_interrupt_mask(&mut self, causes: impl Into<Causes>) {
        self.regs.write_intr_mask(causes.into().bits());
    }

    pub fn interrupt_mask(&self) -> Causes {
        Causes::from_bits(self.regs.intr_mask())
    }

    /// Clear exactly `causes`, leaving other latched causes alone.
    pub fn clear_interrupt(&self, causes: impl Into<Causes>) {
        self.regs.write_intr_clear(causes.into().bits());
    }

    /// Latch `causes` as if the counter had raised them.
    pub fn set_interrupt(&self, causes: impl Into<Causes>) {
        self.regs.write_intr_set(causes.into().bits());
    }

    /// Latched causes, masked or not.
    pub fn interrupt_status(&self) -> Causes {
        Causes::from_bits(self.regs.intr())
    }

    /// Latched causes that are forwarded to the interrupt controller.
    pub fn interrupt_status_masked(&self) -> Causes {
        Causes::from_bits(self.regs.intr_masked())
    }

    /// Feed one input clock. Returns the causes raised by this clock.
    pub fn tick(&self) -> Causes {
        let raised = self.regs.modify(|s| {
            if !s.enabled {
                return 0;
            }

            s.prescale += 1;
            if s.prescale < s.config.prescaler.divisor() {
                return 0;
            }
            s.prescale = 0;

            let raised = s.count();
            s.intr |= raised;
            raised
        });

        Causes(raised)
    }
}
