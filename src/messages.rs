// Result records printed by the sumo-i2c binary

use serde::{Deserialize, Serialize};

/// One register (or register pair) read from a device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegisterReading {
    pub device: u8,
    pub register: u8,
    pub value: u8,
    /// Present when the next register was read as the high byte
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word: Option<i16>,
}

impl RegisterReading {
    pub fn byte(device: u8, register: u8, value: u8) -> Self {
        Self {
            device,
            register,
            value,
            high: None,
            word: None,
        }
    }

    /// Low/high pair decoded as a signed word
    pub fn word(device: u8, register: u8, low: u8, high: u8) -> Self {
        Self {
            device,
            register,
            value: low,
            high: Some(high),
            word: Some(crate::i2c::decode_signed16(low, high)),
        }
    }
}
