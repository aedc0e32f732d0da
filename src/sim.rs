//! Host model of the board: interrupt controller, LED pin and terminal.
//!
//! [`SimController`] behaves like a nested vectored interrupt controller in
//! front of level-sensitive peripheral lines. Each step it samples every wired
//! line into the channel's pending latch, whether or not the channel is
//! enabled, then runs the most urgent enabled pending channel to completion. A
//! line still asserted after its handler returns is latched again on the next
//! step, so a handler that forgets to clear its cause keeps being dispatched.

use core::convert::Infallible;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embedded_hal::digital::{ErrorType, OutputPin, StatefulOutputPin};
use embedded_io::{ErrorKind, Read, ReadReady, Write};
use heapless::{Deque, Vec};

use crate::gpio::Level;
use crate::sysint::{ConfigError, InterruptBinding, InterruptController, InterruptLine, MuxChannel, VectorTable, MUX_CHANNELS};

/// A channel kept dispatching past the allowed budget.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DispatchStorm {
    pub channel: MuxChannel,
    pub dispatches: u32,
}

impl fmt::Display for DispatchStorm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} re-dispatched {} times without settling", self.channel, self.dispatches)
    }
}

pub struct SimController<'a, const N: usize = MUX_CHANNELS> {
    vectors: VectorTable<N>,
    lines: &'a [&'a dyn InterruptLine],
    enabled: [bool; N],
    pending: [bool; N],
    dispatches: [u32; N],
}

impl<'a, const N: usize> SimController<'a, N> {
    /// Controller with the given peripheral lines wired to its inputs.
    pub fn new(lines: &'a [&'a dyn InterruptLine]) -> Self {
        Self {
            vectors: VectorTable::new(),
            lines,
            enabled: [false; N],
            pending: [false; N],
            dispatches: [0; N],
        }
    }

    fn line_asserted(&self, line: u16) -> bool {
        self.lines.iter().any(|l| l.line() == line && l.is_asserted())
    }

    fn sample(&mut self) {
        for binding in self.vectors.bindings() {
            if self.line_asserted(binding.source().line) {
                self.pending[binding.source().mux.index()] = true;
            }
        }
    }

    fn flag(flags: &[bool; N], channel: MuxChannel) -> bool {
        flags.get(channel.index()).copied().unwrap_or(false)
    }

    /// Whether the channel is latched pending or its line is asserted.
    pub fn is_pending(&self, channel: MuxChannel) -> bool {
        Self::flag(&self.pending, channel)
            || self.vectors.get(channel).is_some_and(|b| self.line_asserted(b.source().line))
    }

    /// Number of times the channel's handler has run.
    pub fn dispatch_count(&self, channel: MuxChannel) -> u32 {
        self.dispatches.get(channel.index()).copied().unwrap_or(0)
    }

    /// Dispatch at most one handler. Returns the channel serviced.
    pub fn step(&mut self) -> Option<MuxChannel> {
        self.sample();

        let binding: InterruptBinding = *self
            .vectors
            .bindings()
            .filter(|b| {
                let mux = b.source().mux;
                Self::flag(&self.pending, mux) && Self::flag(&self.enabled, mux)
            })
            .min_by_key(|b| (b.priority(), b.source().mux))?;

        let channel = binding.source().mux;
        self.pending[channel.index()] = false;

        trace!("sim: dispatch {}", channel);
        (binding.handler())();
        self.dispatches[channel.index()] += 1;

        Some(channel)
    }

    /// Dispatch until nothing is pending.
    ///
    /// Gives up with [`DispatchStorm`] once more than `budget` handlers have run.
    pub fn run_until_idle(&mut self, budget: u32) -> Result<u32, DispatchStorm> {
        let mut dispatches = 0;
        while let Some(channel) = self.step() {
            dispatches += 1;
            if dispatches > budget {
                warn!("sim: {} still pending after {} dispatches", channel, budget);
                return Err(DispatchStorm { channel, dispatches });
            }
        }
        Ok(dispatches)
    }
}

impl<const N: usize> InterruptController for SimController<'_, N> {
    fn configure(&mut self, binding: InterruptBinding) -> Result<(), ConfigError> {
        self.vectors.bind(binding, self.lines)?;
        debug!(
            "sim: bound line {} to {} at priority {}",
            binding.source().line,
            binding.source().mux,
            binding.priority().level()
        );
        Ok(())
    }

    fn enable(&mut self, channel: MuxChannel) {
        match self.enabled.get_mut(channel.index()) {
            Some(enabled) => *enabled = true,
            None => warn!("sim: enable of missing channel {}", channel),
        }
    }

    fn disable(&mut self, channel: MuxChannel) {
        if let Some(enabled) = self.enabled.get_mut(channel.index()) {
            *enabled = false;
        }
    }

    fn is_enabled(&self, channel: MuxChannel) -> bool {
        Self::flag(&self.enabled, channel)
    }
}

/// Push-pull output that remembers its level and counts toggles.
///
/// The pin traits are implemented for `&SimPin`, so a `static` pin can be
/// driven from a plain `fn()` handler.
pub struct SimPin {
    high: AtomicBool,
    toggles: AtomicU32,
}

impl SimPin {
    pub const fn new(level: Level) -> Self {
        Self {
            high: AtomicBool::new(matches!(level, Level::High)),
            toggles: AtomicU32::new(0),
        }
    }

    pub fn level(&self) -> Level {
        self.high.load(Ordering::SeqCst).into()
    }

    pub fn toggles(&self) -> u32 {
        self.toggles.load(Ordering::SeqCst)
    }
}

impl ErrorType for &SimPin {
    type Error = Infallible;
}

impl OutputPin for &SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl StatefulOutputPin for &SimPin {
    fn is_set_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.high.load(Ordering::SeqCst))
    }

    fn is_set_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.high.load(Ordering::SeqCst))
    }

    fn toggle(&mut self) -> Result<(), Infallible> {
        self.high.fetch_xor(true, Ordering::SeqCst);
        self.toggles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

const RX_CAPACITY: usize = 64;
const TX_CAPACITY: usize = 512;

/// Terminal on the other end of the console: queued keystrokes in, captured text out.
pub struct SimConsole {
    rx: Deque<u8, RX_CAPACITY>,
    tx: Vec<u8, TX_CAPACITY>,
    fail_writes: bool,
}

impl Default for SimConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl SimConsole {
    pub const fn new() -> Self {
        Self {
            rx: Deque::new(),
            tx: Vec::new(),
            fail_writes: false,
        }
    }

    /// Queue keystrokes. Bytes beyond the receive FIFO are dropped.
    pub fn push_input(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.rx.push_back(b).is_err() {
                warn!("sim: console receive overrun");
                break;
            }
        }
    }

    pub fn output(&self) -> &[u8] {
        &self.tx
    }

    /// Make every write fail, as a console whose setup went wrong would.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl embedded_io::ErrorType for SimConsole {
    type Error = ErrorKind;
}

impl ReadReady for SimConsole {
    fn read_ready(&mut self) -> Result<bool, ErrorKind> {
        Ok(!self.rx.is_empty())
    }
}

impl Read for SimConsole {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl Write for SimConsole {
    fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        if self.fail_writes {
            return Err(ErrorKind::NotConnected);
        }
        let room = TX_CAPACITY - self.tx.len();
        let n = buf.len().min(room);
        if n == 0 && !buf.is_empty() {
            return Err(ErrorKind::OutOfMemory);
        }
        // Cannot fail, `n` fits in the remaining capacity.
        let _ = self.tx.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), ErrorKind> {
        if self.fail_writes {
            return Err(ErrorKind::NotConnected);
        }
        Ok(())
    }
}
