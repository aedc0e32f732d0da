//! System interrupt configuration.
//!
//! Peripheral interrupt lines reach the CPU through a small set of multiplexed
//! controller channels. An [`InterruptBinding`] ties one peripheral line to one
//! channel, at a priority, with a handler. Controllers keep their bindings in a
//! [`VectorTable`] and refuse anything they cannot route.

use core::fmt;

/// Number of multiplexed controller channels.
pub const MUX_CHANNELS: usize = 8;

/// Number of priority bits implemented by the controller.
pub const PRIORITY_BITS: u8 = 3;

/// One of the multiplexed controller channels.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MuxChannel(u8);

impl MuxChannel {
    /// Name a channel. Range is checked when the channel is bound.
    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    pub const fn number(self) -> u8 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MuxChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mux{}", self.0)
    }
}

/// Interrupt priority, lower values preempt higher ones.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Priority(u8);

impl Priority {
    /// Most urgent priority.
    pub const HIGHEST: Priority = Priority(0);
    /// Least urgent priority the controller implements.
    pub const LOWEST: Priority = Priority((1 << PRIORITY_BITS) - 1);

    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    pub const fn level(self) -> u8 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 <= Self::LOWEST.0
    }

    /// Value for an 8-bit priority register, implemented bits left aligned.
    pub const fn to_register(self) -> u8 {
        self.0 << (8 - PRIORITY_BITS)
    }
}

/// Peripheral interrupt line routed through a controller channel.
///
/// The raw form packs the channel in the upper half-word and the peripheral
/// line in the lower one, the layout the vendor startup tables use.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptSource {
    pub mux: MuxChannel,
    pub line: u16,
}

impl InterruptSource {
    pub const fn new(mux: MuxChannel, line: u16) -> Self {
        Self { mux, line }
    }

    pub const fn to_raw(self) -> u32 {
        ((self.mux.0 as u32) << 16) | self.line as u32
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self {
            mux: MuxChannel((raw >> 16) as u8),
            line: raw as u16,
        }
    }
}

/// Interrupt service routine.
///
/// Runs in interrupt context: it must not block, allocate, or touch the console.
pub type Handler = fn();

/// A source, its priority and the routine servicing it.
#[derive(Debug, Copy, Clone)]
pub struct InterruptBinding {
    source: InterruptSource,
    priority: Priority,
    handler: Handler,
}

impl InterruptBinding {
    pub const fn new(source: InterruptSource, priority: Priority, handler: Handler) -> Self {
        Self {
            source,
            priority,
            handler,
        }
    }

    pub const fn source(&self) -> InterruptSource {
        self.source
    }

    pub const fn priority(&self) -> Priority {
        self.priority
    }

    pub fn handler(&self) -> Handler {
        self.handler
    }
}

/// Why a controller refused a binding.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BindError {
    /// The channel does not exist on this controller.
    InvalidChannel,
    /// The peripheral line is not wired to the controller.
    UnknownLine,
    /// The priority is outside the implemented range.
    InvalidPriority,
    /// The channel already has a handler.
    AlreadyBound,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    BindFailed(BindError),
}

impl From<BindError> for ConfigError {
    fn from(value: BindError) -> Self {
        ConfigError::BindFailed(value)
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            BindError::InvalidChannel => "invalid controller channel",
            BindError::UnknownLine => "peripheral line not wired to the controller",
            BindError::InvalidPriority => "priority out of range",
            BindError::AlreadyBound => "channel already bound",
        };
        f.write_str(msg)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::BindFailed(reason) => write!(f, "interrupt binding rejected: {}", reason),
        }
    }
}

/// Level of a peripheral interrupt output, as seen by the controller.
pub trait InterruptLine: Sync {
    /// Line number on the controller input side.
    fn line(&self) -> u16;

    /// Whether the peripheral currently requests service.
    fn is_asserted(&self) -> bool;
}

/// An interrupt controller able to dispatch bound handlers.
pub trait InterruptController {
    /// Bind `binding` to its channel.
    ///
    /// One-shot: call it once per channel, before the channel is enabled.
    fn configure(&mut self, binding: InterruptBinding) -> Result<(), ConfigError>;

    /// Allow the channel to dispatch. Enabling twice is harmless.
    fn enable(&mut self, channel: MuxChannel);

    fn disable(&mut self, channel: MuxChannel);

    fn is_enabled(&self, channel: MuxChannel) -> bool;
}

/// Software copy of the channel-to-handler assignments.
pub struct VectorTable<const N: usize = MUX_CHANNELS> {
    slots: [Option<InterruptBinding>; N],
}

impl<const N: usize> Default for VectorTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> VectorTable<N> {
    pub const fn new() -> Self {
        Self { slots: [None; N] }
    }

    /// Record `binding` after checking it against the controller's limits and wiring.
    pub fn bind(&mut self, binding: InterruptBinding, lines: &[&dyn InterruptLine]) -> Result<(), ConfigError> {
        let source = binding.source();

        let slot = self.slots.get_mut(source.mux.index()).ok_or(BindError::InvalidChannel)?;

        if !binding.priority().is_valid() {
            return Err(BindError::InvalidPriority.into());
        }

        if !lines.iter().any(|l| l.line() == source.line) {
            return Err(BindError::UnknownLine.into());
        }

        if slot.is_some() {
            return Err(BindError::AlreadyBound.into());
        }

        *slot = Some(binding);
        Ok(())
    }

    pub fn get(&self, channel: MuxChannel) -> Option<&InterruptBinding> {
        self.slots.get(channel.index()).and_then(Option::as_ref)
    }

    /// Channel the given peripheral line is routed to, if any.
    pub fn channel_for_line(&self, line: u16) -> Option<MuxChannel> {
        self.bindings().find(|b| b.source().line == line).map(|b| b.source().mux)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &InterruptBinding> {
        self.slots.iter().flatten()
    }
}
