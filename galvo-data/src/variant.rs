#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bit depth of the mirror driver's serial position protocol.
///
/// The baseline hardware latches 16-bit axis codes; the extended driver
/// board takes 18-bit codes behind a shorter enable preamble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProtocolVariant {
    Bits16,
    Bits18,
}

impl ProtocolVariant {
    /// Number of data bits clocked out per axis.
    pub fn bit_depth(&self) -> u32 {
        match self {
            ProtocolVariant::Bits16 => 16,
            ProtocolVariant::Bits18 => 18,
        }
    }

    /// Largest axis code, 2^N - 1.
    pub fn max_code(&self) -> u32 {
        (1 << self.bit_depth()) - 1
    }

    /// Code a zero deflection must map to, 2^(N-1).
    pub fn mid_scale(&self) -> u32 {
        1 << (self.bit_depth() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_ranges() {
        assert_eq!(ProtocolVariant::Bits16.max_code(), 65535);
        assert_eq!(ProtocolVariant::Bits16.mid_scale(), 32768);
        assert_eq!(ProtocolVariant::Bits18.max_code(), 262143);
        assert_eq!(ProtocolVariant::Bits18.mid_scale(), 131072);
    }
}
