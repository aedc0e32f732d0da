//! Terminal console: non-blocking key polling and the startup banner.

use embedded_io::{Read, ReadReady, Write};

/// Byte a raw UART receive register returns when its FIFO is empty.
///
/// Never reported as received data.
pub const NO_DATA: u8 = 0xFF;

/// ANSI sequence clearing the screen and homing the cursor.
pub const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[;H";

const TITLE: &[u8] = b"****************** Software Interrupt using Peripheral registers example ****************** \r\n\n";

#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Key that arms the interrupt.
    pub trigger: u8,
    /// Clear the terminal before printing the banner.
    pub clear_screen: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trigger: b'p',
            clear_screen: true,
        }
    }
}

/// What a received byte asks for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Arm,
    Ignore(u8),
}

pub struct Console<IO> {
    io: IO,
    config: Config,
}

impl<IO: Read + ReadReady + Write> Console<IO> {
    pub fn new(io: IO, config: Config) -> Self {
        Self { io, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read one byte if one is waiting. Never blocks.
    pub fn poll_byte(&mut self) -> Option<u8> {
        match self.io.read_ready() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(_) => {
                warn!("console: read_ready failed");
                return None;
            }
        }

        let mut buf = [0u8; 1];
        match self.io.read(&mut buf) {
            Ok(1) if buf[0] != NO_DATA => Some(buf[0]),
            Ok(_) => None,
            Err(_) => {
                warn!("console: read failed");
                None
            }
        }
    }

    pub fn decode(&self, byte: u8) -> Command {
        if byte == self.config.trigger {
            Command::Arm
        } else {
            Command::Ignore(byte)
        }
    }

    /// Clear the terminal and print the title and key prompt.
    pub fn write_banner(&mut self) -> Result<(), IO::Error> {
        if self.config.clear_screen {
            self.io.write_all(CLEAR_SCREEN)?;
        }
        self.io.write_all(TITLE)?;
        self.io.write_all(b"Press '")?;
        self.io.write_all(&[self.config.trigger])?;
        self.io.write_all(b"' for interrupts using peripheral registers\r\n\n")?;
        self.io.flush()
    }

    pub fn io_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    pub fn into_inner(self) -> IO {
        self.io
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimConsole;
    use embedded_io::{ErrorKind, ErrorType};

    /// Receive register that always reads back, like a polled UART data register.
    struct RawRegister(Option<u8>);

    impl ErrorType for RawRegister {
        type Error = ErrorKind;
    }

    impl ReadReady for RawRegister {
        fn read_ready(&mut self) -> Result<bool, ErrorKind> {
            Ok(true)
        }
    }

    impl Read for RawRegister {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
            buf[0] = self.0.take().unwrap_or(NO_DATA);
            Ok(1)
        }
    }

    impl Write for RawRegister {
        fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), ErrorKind> {
            Ok(())
        }
    }

    #[test]
    fn empty_register_sentinel_is_not_data() {
        let mut console = Console::new(RawRegister(Some(b'p')), Config::default());

        assert_eq!(console.poll_byte(), Some(b'p'));
        assert_eq!(console.poll_byte(), None);
    }

    #[test]
    fn poll_does_not_block_on_an_idle_line() {
        let mut console = Console::new(SimConsole::new(), Config::default());
        assert_eq!(console.poll_byte(), None);

        console.io_mut().push_input(b"xp");
        assert_eq!(console.poll_byte(), Some(b'x'));
        assert_eq!(console.poll_byte(), Some(b'p'));
        assert_eq!(console.poll_byte(), None);
    }

    #[test]
    fn only_the_trigger_arms() {
        let console = Console::new(SimConsole::new(), Config::default());

        assert_eq!(console.decode(b'p'), Command::Arm);
        assert_eq!(console.decode(b'P'), Command::Ignore(b'P'));
        assert_eq!(console.decode(b'x'), Command::Ignore(b'x'));
    }

    #[test]
    fn banner_clears_screen_and_names_the_trigger() {
        let mut config = Config::default();
        config.trigger = b'k';
        let mut console = Console::new(SimConsole::new(), config);

        console.write_banner().unwrap();

        let out = console.io_mut().output();
        assert!(out.starts_with(CLEAR_SCREEN));
        assert!(out.ends_with(b"Press 'k' for interrupts using peripheral registers\r\n\n"));
    }

    #[test]
    fn banner_reports_a_broken_console() {
        let mut console = Console::new(SimConsole::new(), Config::default());
        console.io_mut().fail_writes(true);

        assert!(console.write_banner().is_err());
    }
}
