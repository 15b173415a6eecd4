/// Combine a low/high register pair into a signed 16-bit reading
/// (two's complement, as most sensors report their axes).
pub fn decode_signed16(low: u8, high: u8) -> i16 {
    let word = low as i32 | ((high as i32) << 8);
    if word & 0x8000 != 0 {
        (word - 0x1_0000) as i16
    } else {
        word as i16
    }
}
