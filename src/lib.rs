//! Software-triggered timer/counter interrupt.
//!
//! A counter interrupt cause is bound to a controller channel, enabled, and
//! serviced by a short handler that clears the cause and toggles an LED. A key
//! on the console sets the cause by software. See [`app`] for the wiring and
//! [`sim`] for the host model of the board that the tests run against.
#![cfg_attr(not(test), no_std)]

// This must go first, the macros are used by every other module.
mod fmt;

pub mod app;
pub mod console;
pub mod gpio;
pub mod sim;
pub mod sysint;
pub mod tcpwm;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod nvic;

/// Route NVIC interrupts to controller channels.
///
/// Each entry names an interrupt of the board's `Interrupt` enum and the
/// channel it serves. The macro emits the interrupt vector, which dispatches to
/// whatever handler is bound to that channel, and implements
/// [`nvic::Routes`] for the marker struct.
///
/// ```ignore
/// bind_interrupts!(struct Irqs: pac::Interrupt {
///     ITIM32_1 => swint::app::COUNTER_MUX;
/// });
/// ```
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[macro_export]
macro_rules! bind_interrupts {
    ($vis:vis struct $name:ident : $interrupt:ty {
        $(
            $(#[cfg($cond_irq:meta)])?
            $irq:ident => $channel:expr;
        )*
    }) => {
        #[derive(Copy, Clone)]
        $vis struct $name;

        $(
            #[allow(non_snake_case)]
            #[no_mangle]
            $(#[cfg($cond_irq)])?
            unsafe extern "C" fn $irq() {
                $crate::nvic::dispatch($channel);
            }
        )*

        unsafe impl $crate::nvic::Routes for $name {
            fn irq(channel: $crate::sysint::MuxChannel) -> Option<u16> {
                $(
                    $(#[cfg($cond_irq)])?
                    if channel == $channel {
                        return Some($crate::nvic::InterruptNumber::number(<$interrupt>::$irq));
                    }
                )*
                None
            }
        }
    };
}
