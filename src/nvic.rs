//! NVIC backend for Cortex-M targets.
//!
//! Each controller channel is backed by one NVIC interrupt chosen by the board
//! (see [`bind_interrupts!`](crate::bind_interrupts)). Bindings live in a
//! vector table shared with the interrupt trampolines. Peripheral lines are
//! level sensitive: [`raise`] pends the channel when a line becomes asserted and
//! [`dispatch`] pends it again if the line is still asserted once the handler
//! returns.

use core::cell::RefCell;

pub use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;
use embassy_sync::blocking_mutex::CriticalSectionMutex;

use crate::sysint::{
    BindError, ConfigError, InterruptBinding, InterruptController, InterruptLine, MuxChannel, VectorTable,
};

#[derive(Debug, Copy, Clone)]
struct Irq(u16);

// Safety: the numbers come from the board's `Interrupt` enum through `Routes`.
unsafe impl InterruptNumber for Irq {
    fn number(self) -> u16 {
        self.0
    }
}

/// Channel-to-NVIC-interrupt assignment of a board.
///
/// # Safety
///
/// Every routed interrupt must have a trampoline calling [`dispatch`] for its
/// channel. Implemented by [`bind_interrupts!`](crate::bind_interrupts).
pub unsafe trait Routes {
    fn irq(channel: MuxChannel) -> Option<u16>;
}

struct Routing {
    vectors: VectorTable,
    irq: fn(MuxChannel) -> Option<u16>,
    lines: &'static [&'static dyn InterruptLine],
}

fn unrouted(_channel: MuxChannel) -> Option<u16> {
    None
}

static ROUTING: CriticalSectionMutex<RefCell<Routing>> = CriticalSectionMutex::new(RefCell::new(Routing {
    vectors: VectorTable::new(),
    irq: unrouted,
    lines: &[],
}));

pub struct NvicController {
    nvic: NVIC,
}

impl NvicController {
    /// Take over the NVIC with the board's channel routes and peripheral lines.
    pub fn new<R: Routes>(nvic: NVIC, _routes: R, lines: &'static [&'static dyn InterruptLine]) -> Self {
        ROUTING.lock(|r| {
            let mut r = r.borrow_mut();
            r.irq = R::irq;
            r.lines = lines;
        });

        Self { nvic }
    }

    fn irq(channel: MuxChannel) -> Option<Irq> {
        ROUTING.lock(|r| (r.borrow().irq)(channel)).map(Irq)
    }
}

impl InterruptController for NvicController {
    fn configure(&mut self, binding: InterruptBinding) -> Result<(), ConfigError> {
        let irq = Self::irq(binding.source().mux).ok_or(BindError::InvalidChannel)?;

        ROUTING.lock(|r| {
            let mut r = r.borrow_mut();
            let lines = r.lines;
            r.vectors.bind(binding, lines)
        })?;

        // Safety: the channel is not enabled yet, nothing depends on its priority.
        unsafe { self.nvic.set_priority(irq, binding.priority().to_register()) };

        debug!("nvic: {} routed to irq {}", binding.source().mux, irq.0);
        Ok(())
    }

    fn enable(&mut self, channel: MuxChannel) {
        let bound = ROUTING.lock(|r| r.borrow().vectors.get(channel).is_some());
        match Self::irq(channel) {
            // Safety: a handler is bound, so dispatch has something to run.
            Some(irq) if bound => unsafe { NVIC::unmask(irq) },
            _ => warn!("nvic: not enabling unbound {}", channel),
        }
    }

    fn disable(&mut self, channel: MuxChannel) {
        if let Some(irq) = Self::irq(channel) {
            NVIC::mask(irq);
        }
    }

    fn is_enabled(&self, channel: MuxChannel) -> bool {
        Self::irq(channel).is_some_and(NVIC::is_enabled)
    }
}

/// Pend the channel bound to peripheral `line`.
///
/// Suitable as the notify hook of [`tcpwm::Registers`](crate::tcpwm::Registers).
pub fn raise(line: u16) {
    let irq = ROUTING.lock(|r| {
        let r = r.borrow();
        r.vectors.channel_for_line(line).and_then(r.irq)
    });

    if let Some(irq) = irq {
        NVIC::pend(Irq(irq));
    }
}

/// Run the handler bound to `channel`. Called from the interrupt trampolines.
pub fn dispatch(channel: MuxChannel) {
    let Some((binding, line, irq)) = ROUTING.lock(|r| {
        let r = r.borrow();
        let binding = *r.vectors.get(channel)?;
        let line = r.lines.iter().copied().find(|l| l.line() == binding.source().line);
        Some((binding, line, (r.irq)(channel)))
    }) else {
        return;
    };

    (binding.handler())();

    if let (Some(line), Some(irq)) = (line, irq) {
        if line.is_asserted() {
            NVIC::pend(Irq(irq));
        }
    }
}
