//! End-to-end runs of the software interrupt wiring on the host board model.

use embedded_hal::digital::StatefulOutputPin;
use swint::app::{self, Device, Event, COUNTER_MUX, INTR_CAUSE};
use swint::console::{Config as ConsoleConfig, Console};
use swint::gpio::{self, Level};
use swint::sim::{DispatchStorm, SimConsole, SimController, SimPin};
use swint::sysint::{InterruptController, InterruptLine};
use swint::tcpwm::{self, Cause, Causes, Counter, Registers};

const LINE: u16 = 1;
const BUDGET: u32 = 64;

fn device<'l>(
    regs: &'static Registers,
    lines: &'l [&'l dyn InterruptLine],
    handler: fn(),
) -> Device<'static, SimController<'l>, SimConsole> {
    let console = Console::new(SimConsole::new(), ConsoleConfig::default());
    let res = Device::init(
        SimController::new(lines),
        console,
        Counter::new(regs),
        &app::Config::default(),
        app::counter_binding(LINE, handler),
    );
    app::fail_fast(res)
}

fn press(dev: &mut Device<'static, SimController<'_>, SimConsole>, keys: &[u8]) -> Vec<Event> {
    dev.console_mut().io_mut().push_input(keys);
    keys.iter().map(|_| dev.poll_once()).collect()
}

#[test]
fn banner_is_printed_once_wired() {
    static REGS: Registers = Registers::new(LINE);
    fn on_interrupt() {}

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut dev = device(&REGS, &lines, on_interrupt);

    let out = dev.console_mut().io_mut().output();
    let text = core::str::from_utf8(out).unwrap();
    assert!(text.contains("Software Interrupt using Peripheral registers example"));
    assert!(text.contains("Press 'p'"));
    assert!(dev.controller().is_enabled(COUNTER_MUX));
}

#[test]
fn idle_console_arms_nothing() {
    static REGS: Registers = Registers::new(LINE);
    fn on_interrupt() {}

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut dev = device(&REGS, &lines, on_interrupt);

    assert_eq!(dev.poll_once(), Event::Idle);
    assert_eq!(dev.controller_mut().run_until_idle(BUDGET), Ok(0));
}

#[test]
fn single_trigger_dispatches_once_and_lights_the_led() {
    static REGS: Registers = Registers::new(LINE);
    static LED: SimPin = SimPin::new(Level::Low);
    fn on_interrupt() {
        app::service(&Counter::new(&REGS), INTR_CAUSE, &mut &LED);
    }

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut dev = device(&REGS, &lines, on_interrupt);

    assert_eq!(press(&mut dev, b"p"), [Event::Armed]);
    assert_eq!(dev.controller_mut().run_until_idle(BUDGET), Ok(1));

    assert_eq!(LED.level(), Level::High);
    assert!(dev.counter().interrupt_status().is_empty());
    assert!(!dev.controller().is_pending(COUNTER_MUX));
}

#[test]
fn rapid_triggers_coalesce_into_one_dispatch() {
    static REGS: Registers = Registers::new(LINE);
    static LED: SimPin = SimPin::new(Level::Low);
    fn on_interrupt() {
        app::service(&Counter::new(&REGS), INTR_CAUSE, &mut &LED);
    }

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut dev = device(&REGS, &lines, on_interrupt);

    assert_eq!(press(&mut dev, b"pp"), [Event::Armed, Event::Armed]);
    assert_eq!(dev.controller_mut().run_until_idle(BUDGET), Ok(1));

    assert_eq!(LED.toggles(), 1);
    assert!(dev.counter().interrupt_status().is_empty());
}

#[test]
fn other_keys_change_nothing() {
    static REGS: Registers = Registers::new(LINE);
    static LED: SimPin = SimPin::new(Level::Low);
    fn on_interrupt() {
        app::service(&Counter::new(&REGS), INTR_CAUSE, &mut &LED);
    }

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut dev = device(&REGS, &lines, on_interrupt);

    assert_eq!(press(&mut dev, b"xP"), [Event::Ignored(b'x'), Event::Ignored(b'P')]);
    assert_eq!(dev.controller_mut().run_until_idle(BUDGET), Ok(0));

    assert_eq!(LED.level(), Level::Low);
    assert_eq!(LED.toggles(), 0);
    assert!(dev.counter().interrupt_status().is_empty());
}

#[test]
fn handler_that_skips_the_clear_never_settles() {
    static REGS: Registers = Registers::new(LINE);
    static LED: SimPin = SimPin::new(Level::Low);
    fn on_interrupt() {
        let _ = (&LED).toggle();
    }

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut dev = device(&REGS, &lines, on_interrupt);

    press(&mut dev, b"p");

    assert_eq!(
        dev.controller_mut().run_until_idle(BUDGET),
        Err(DispatchStorm {
            channel: COUNTER_MUX,
            dispatches: BUDGET + 1,
        })
    );
    assert_eq!(LED.toggles(), BUDGET + 1);
    assert!(dev.counter().interrupt_status().get(INTR_CAUSE));
}

#[test]
fn handler_clears_only_the_fired_cause() {
    static REGS: Registers = Registers::new(LINE);
    static LED: SimPin = SimPin::new(Level::Low);
    fn on_interrupt() {
        app::service(&Counter::new(&REGS), INTR_CAUSE, &mut &LED);
    }

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut dev = device(&REGS, &lines, on_interrupt);

    // Latched but masked off, so they never reach the controller.
    dev.counter().set_interrupt(Cause::CaptureCompare0 | Cause::CaptureCompare1);
    press(&mut dev, b"p");
    assert_eq!(dev.controller_mut().run_until_idle(BUDGET), Ok(1));

    let status = dev.counter().interrupt_status();
    assert!(!status.get(INTR_CAUSE));
    assert_eq!(status, Cause::CaptureCompare0 | Cause::CaptureCompare1);
}

#[test]
fn arming_while_pending_touches_nothing_else() {
    static REGS: Registers = Registers::new(LINE);
    static LED: SimPin = SimPin::new(Level::Low);
    fn on_interrupt() {
        app::service(&Counter::new(&REGS), INTR_CAUSE, &mut &LED);
    }

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut dev = device(&REGS, &lines, on_interrupt);

    press(&mut dev, b"p");
    let (intr, mask, count) = (REGS.intr(), REGS.intr_mask(), dev.counter().counter());

    press(&mut dev, b"p");
    assert_eq!((REGS.intr(), REGS.intr_mask(), dev.counter().counter()), (intr, mask, count));
    assert!(dev.controller().is_enabled(COUNTER_MUX));

    assert_eq!(dev.controller_mut().run_until_idle(BUDGET), Ok(1));
}

#[test]
fn unenabled_channel_never_dispatches() {
    static REGS: Registers = Registers::new(LINE);
    static LED: SimPin = SimPin::new(Level::Low);
    fn on_interrupt() {
        app::service(&Counter::new(&REGS), INTR_CAUSE, &mut &LED);
    }

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut ctrl = SimController::<8>::new(&lines);
    let mut counter = Counter::new(&REGS);
    counter.init(&tcpwm::Config::default()).unwrap();
    counter.set_interrupt_mask(INTR_CAUSE);
    ctrl.configure(app::counter_binding(LINE, on_interrupt)).unwrap();

    app::arm(&counter, INTR_CAUSE);

    assert_eq!(ctrl.run_until_idle(BUDGET), Ok(0));
    assert!(ctrl.is_pending(COUNTER_MUX));
    assert_eq!(LED.toggles(), 0);
    assert!(counter.interrupt_status().get(INTR_CAUSE));
}

#[test]
fn led_level_follows_dispatch_parity() {
    static REGS: Registers = Registers::new(LINE);
    static LED: SimPin = SimPin::new(Level::Low);
    fn on_interrupt() {
        app::service(&Counter::new(&REGS), INTR_CAUSE, &mut &LED);
    }

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut dev = device(&REGS, &lines, on_interrupt);

    let mut expected = Level::Low;
    for _ in 0..6 {
        press(&mut dev, b"p");
        assert_eq!(dev.controller_mut().run_until_idle(BUDGET), Ok(1));

        expected = expected.inverted();
        assert_eq!(gpio::output_level(&mut &LED), Ok(expected));
    }
    assert_eq!(expected, Level::Low);
    assert_eq!(LED.toggles(), 6);
    assert_eq!(dev.controller().dispatch_count(COUNTER_MUX), 6);
}

#[test]
fn counter_wrap_runs_the_same_handler() {
    static REGS: Registers = Registers::new(LINE);
    static LED: SimPin = SimPin::new(Level::Low);
    fn on_interrupt() {
        app::service(&Counter::new(&REGS), INTR_CAUSE, &mut &LED);
    }

    let lines: [&dyn InterruptLine; 1] = [&REGS];
    let mut ctrl = SimController::<8>::new(&lines);
    let mut counter = Counter::new(&REGS);
    let mut config = tcpwm::Config::default();
    config.period = 4;
    config.compare0 = 2;

    app::init_counter_interrupt(&mut ctrl, &mut counter, &config, INTR_CAUSE, app::counter_binding(LINE, on_interrupt))
        .unwrap();

    for _ in 0..4 {
        counter.tick();
    }
    assert_eq!(ctrl.run_until_idle(BUDGET), Ok(0));

    assert!(counter.tick().get(Cause::TerminalCount));
    assert_eq!(ctrl.run_until_idle(BUDGET), Ok(1));
    assert_eq!(LED.level(), Level::High);
    assert_eq!(counter.interrupt_status(), Causes::from(Cause::CaptureCompare0));
}
