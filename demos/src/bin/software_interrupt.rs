#![no_main]
#![no_std]

use core::cell::RefCell;
use core::convert::Infallible;

use cortex_m_rt::entry;
use embassy_npcx::gpio::{Level, Output, OutputOnly};
use embassy_npcx::{pac, Config};
use embassy_sync::blocking_mutex::CriticalSectionMutex;
use embedded_hal::digital::{OutputPin, StatefulOutputPin};
use embedded_io::{Read, ReadReady, Write};
use panic_probe as _;
use rtt_target::{rtt_init, ChannelMode, DownChannel, UpChannel};
use swint::app::{self, Device, COUNTER_MUX, INTR_CAUSE};
use swint::bind_interrupts;
use swint::console::{self, Console};
use swint::nvic::{self, NvicController};
use swint::sysint::InterruptLine;
use swint::tcpwm::{Counter, Registers};

const COUNTER_LINE: u16 = 1;

bind_interrupts!(struct Irqs: pac::Interrupt {
    ITIM32_1 => COUNTER_MUX;
});

static COUNTER: Registers = Registers::with_notify(COUNTER_LINE, nvic::raise);
static LINES: [&dyn InterruptLine; 1] = [&COUNTER];
static LED: CriticalSectionMutex<RefCell<Option<Led>>> = CriticalSectionMutex::new(RefCell::new(None));

fn on_counter_interrupt() {
    let counter = Counter::new(&COUNTER);
    LED.lock(|led| match led.borrow_mut().as_mut() {
        Some(led) => app::service(&counter, INTR_CAUSE, led),
        None => counter.clear_interrupt(INTR_CAUSE),
    });
}

struct Led(Output<'static, OutputOnly>);

impl embedded_hal::digital::ErrorType for Led {
    type Error = Infallible;
}

impl OutputPin for Led {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.set_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.set_high();
        Ok(())
    }
}

impl StatefulOutputPin for Led {
    fn is_set_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.is_set_high())
    }

    fn is_set_low(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.is_set_low())
    }

    fn toggle(&mut self) -> Result<(), Infallible> {
        self.0.toggle();
        Ok(())
    }
}

/// RTT terminal channel pair.
struct Terminal {
    up: UpChannel,
    down: DownChannel,
    peeked: Option<u8>,
}

impl embedded_io::ErrorType for Terminal {
    type Error = Infallible;
}

impl ReadReady for Terminal {
    fn read_ready(&mut self) -> Result<bool, Infallible> {
        if self.peeked.is_none() {
            let mut buf = [0u8; 1];
            if self.down.read(&mut buf) == 1 {
                self.peeked = Some(buf[0]);
            }
        }
        Ok(self.peeked.is_some())
    }
}

impl Read for Terminal {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(b) = self.peeked.take() {
            buf[0] = b;
            return Ok(1);
        }
        loop {
            let n = self.down.read(buf);
            if n > 0 {
                return Ok(n);
            }
        }
    }
}

impl Write for Terminal {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        Ok(self.up.write(buf))
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

#[entry]
fn main() -> ! {
    let channels = rtt_init! {
        up: {
            0: { size: 1024, name: "Terminal" }
            1: { size: 1024, name: "defmt" }
        }
        down: {
            0: { size: 16, name: "Terminal" }
        }
    };
    rtt_target::set_defmt_channel(channels.up.1);

    let (p, _) = embassy_npcx::init_espi(Config::default());

    let led = Output::<'_, OutputOnly>::new(p.PJ07, Level::Low);
    LED.lock(|cell| cell.replace(Some(Led(led))));

    let Some(core) = cortex_m::Peripherals::take() else {
        panic!("core peripherals already taken");
    };

    let mut up = channels.up.0;
    up.set_mode(ChannelMode::BlockIfFull);
    let terminal = Terminal {
        up,
        down: channels.down.0,
        peeked: None,
    };

    let device = app::fail_fast(Device::init(
        NvicController::new(core.NVIC, Irqs, &LINES),
        Console::new(terminal, console::Config::default()),
        Counter::new(&COUNTER),
        &app::Config::default(),
        app::counter_binding(COUNTER_LINE, on_counter_interrupt),
    ));

    defmt::info!("Waiting for the trigger key");
    device.run()
}
