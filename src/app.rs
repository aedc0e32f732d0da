//! Software interrupt using peripheral registers.
//!
//! The counter's terminal-count cause is bound to a controller channel and
//! serviced by a handler that clears the cause and toggles the LED. Pressing
//! the trigger key on the console sets the cause by software, which makes the
//! controller dispatch the handler exactly as if the counter had wrapped.
//!
//! Initialization is all-or-nothing: any error is passed to [`fail_fast`].

use core::fmt;

use embedded_hal::digital::StatefulOutputPin;
use embedded_io::{Read, ReadReady, Write};

use crate::console::{Command, Console};
use crate::sysint::{ConfigError, Handler, InterruptBinding, InterruptController, InterruptSource, MuxChannel, Priority};
use crate::tcpwm::{self, Cause, Counter};

/// Controller channel the counter interrupt is routed through.
pub const COUNTER_MUX: MuxChannel = MuxChannel::new(5);

pub const COUNTER_PRIORITY: Priority = Priority::new(3);

/// Cause the trigger key sets and the handler clears.
pub const INTR_CAUSE: Cause = Cause::TerminalCount;

/// Binding of the counter on `line` to `handler`, on [`COUNTER_MUX`] at [`COUNTER_PRIORITY`].
pub const fn counter_binding(line: u16, handler: Handler) -> InterruptBinding {
    InterruptBinding::new(InterruptSource::new(COUNTER_MUX, line), COUNTER_PRIORITY, handler)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    Counter(tcpwm::Error),
    Interrupt(ConfigError),
    /// The console could not print the startup banner.
    Console,
}

impl From<tcpwm::Error> for InitError {
    fn from(value: tcpwm::Error) -> Self {
        InitError::Counter(value)
    }
}

impl From<ConfigError> for InitError {
    fn from(value: ConfigError) -> Self {
        InitError::Interrupt(value)
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Counter(e) => write!(f, "counter setup failed: {}", e),
            InitError::Interrupt(e) => write!(f, "{}", e),
            InitError::Console => f.write_str("console setup failed"),
        }
    }
}

/// Stop on an initialization error.
///
/// There is nothing above this program to recover, and the console may not be
/// usable yet, so the error is logged and the panic handler takes over.
pub fn fail_fast<T>(result: Result<T, InitError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            error!("initialization failed: {}", e);
            panic!("initialization failed: {}", e);
        }
    }
}

/// Start the counter, unmask `cause`, bind the interrupt and enable its channel.
///
/// Must run before the channel could already be pending with interrupts unmasked.
pub fn init_counter_interrupt<C: InterruptController>(
    controller: &mut C,
    counter: &mut Counter<'_>,
    config: &tcpwm::Config,
    cause: Cause,
    binding: InterruptBinding,
) -> Result<(), InitError> {
    counter.init(config)?;
    counter.enable();
    counter.set_interrupt_mask(cause);

    controller.configure(binding)?;
    controller.enable(binding.source().mux);

    info!(
        "counter line {} bound to {} at priority {}",
        binding.source().line,
        binding.source().mux,
        binding.priority().level()
    );
    Ok(())
}

/// Set `cause` pending on the counter by software.
///
/// The cause only reaches the controller if it is unmasked on the counter and
/// its channel is enabled. Otherwise the flag latches and nothing is
/// dispatched; that case is logged. Arming an already pending cause changes
/// nothing.
pub fn arm(counter: &Counter<'_>, cause: Cause) {
    if !counter.interrupt_mask().get(cause) {
        warn!("arming a masked cause, no interrupt will be dispatched");
    }
    counter.set_interrupt(cause);
}

/// Body of the counter interrupt handler.
///
/// Clears exactly `cause`, then toggles the LED. Leaving the cause set would
/// re-trigger the interrupt as soon as the handler returns.
#[inline]
pub fn service<P: StatefulOutputPin>(counter: &Counter<'_>, cause: Cause, led: &mut P) {
    counter.clear_interrupt(cause);
    // No error path out of interrupt context.
    let _ = led.toggle();
}

#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub counter: tcpwm::Config,
    pub cause: Cause,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            counter: tcpwm::Config::default(),
            cause: INTR_CAUSE,
        }
    }
}

/// Outcome of one pass of the poll loop.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    Idle,
    Armed,
    Ignored(u8),
}

/// Everything the main loop owns: controller, console and counter.
pub struct Device<'d, C, IO> {
    controller: C,
    console: Console<IO>,
    counter: Counter<'d>,
    cause: Cause,
}

impl<'d, C, IO> Device<'d, C, IO>
where
    C: InterruptController,
    IO: Read + ReadReady + Write,
{
    /// Wire the counter interrupt and greet the terminal.
    pub fn init(
        mut controller: C,
        mut console: Console<IO>,
        mut counter: Counter<'d>,
        config: &Config,
        binding: InterruptBinding,
    ) -> Result<Self, InitError> {
        init_counter_interrupt(&mut controller, &mut counter, &config.counter, config.cause, binding)?;

        console.write_banner().map_err(|_| InitError::Console)?;

        Ok(Self {
            controller,
            console,
            counter,
            cause: config.cause,
        })
    }

    /// Check the console once, arming the interrupt on the trigger key.
    pub fn poll_once(&mut self) -> Event {
        let Some(byte) = self.console.poll_byte() else {
            return Event::Idle;
        };

        match self.console.decode(byte) {
            Command::Arm => {
                debug!("trigger received, arming");
                arm(&self.counter, self.cause);
                Event::Armed
            }
            Command::Ignore(byte) => Event::Ignored(byte),
        }
    }

    /// Poll the console forever.
    pub fn run(mut self) -> ! {
        loop {
            self.poll_once();
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn console_mut(&mut self) -> &mut Console<IO> {
        &mut self.console
    }

    pub fn counter(&self) -> &Counter<'d> {
        &self.counter
    }
}
