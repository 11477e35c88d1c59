//! Characteristic property bits, mirroring the standard GATT characteristic
//! properties field (Bluetooth Core Spec, Vol 3, Part G, §3.3.1.1).

use bitflags::bitflags;

bitflags! {
    /// Which operations a characteristic supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CharacteristicProperties: u16 {
        const BROADCAST = 0x0001;
        const READ = 0x0002;
        const WRITE_WITHOUT_RESPONSE = 0x0004;
        const WRITE = 0x0008;
        const NOTIFY = 0x0010;
        const INDICATE = 0x0020;
        const AUTHENTICATED_SIGNED_WRITES = 0x0040;
        const EXTENDED_PROPERTIES = 0x0080;
    }
}
