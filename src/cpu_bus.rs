//! Trait representing the read-only bus view the tracer needs from the host.
//!
//! Reads here are debugger reads: they must not trigger open-bus latching,
//! register side effects or timing penalties on the emulated machine.

/// 24-bit address mask of the 65C816.
pub const ADDRESS_MASK: u32 = 0x00FF_FFFF;

pub trait DebugBus {
    fn peek_u8(&self, addr: u32) -> u8;

    fn peek_u16(&self, addr: u32) -> u16 {
        let lo = self.peek_u8(addr & ADDRESS_MASK) as u16;
        let hi = self.peek_u8(addr.wrapping_add(1) & ADDRESS_MASK) as u16;
        (hi << 8) | lo
    }

    fn peek_u24(&self, addr: u32) -> u32 {
        let lo = self.peek_u16(addr) as u32;
        let bank = self.peek_u8(addr.wrapping_add(2) & ADDRESS_MASK) as u32;
        (bank << 16) | lo
    }
}

impl<B: DebugBus + ?Sized> DebugBus for &B {
    fn peek_u8(&self, addr: u32) -> u8 {
        (**self).peek_u8(addr)
    }
}
