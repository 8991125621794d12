use crate::constants::{
    FRAME_LEN, PIN_CLOCK, PIN_DATA_X, PIN_DATA_Y, PIN_ENABLE, POSTAMBLE, PREAMBLE_16, PREAMBLE_18,
};
use crate::error::GalvoError;
use galvo_data::ProtocolVariant;

fn preamble(variant: ProtocolVariant) -> &'static [u8] {
    match variant {
        ProtocolVariant::Bits16 => &PREAMBLE_16,
        ProtocolVariant::Bits18 => &PREAMBLE_18,
    }
}

/// Maps a clamped deflection from [-1, 1] onto [0, 2^N - 1].
///
/// Rounds rather than truncates so zero lands on exact mid-scale instead
/// of half an LSB below it.
fn quantize(value: f64, variant: ProtocolVariant) -> u32 {
    let clamped = value.clamp(-1.0, 1.0);
    (((clamped + 1.0) / 2.0) * (variant.max_code() as f64)).round() as u32
}

fn dequantize(code: u32, variant: ProtocolVariant) -> f64 {
    ((code as f64) / (variant.max_code() as f64)) * 2.0 - 1.0
}

/// Builds the position frame instructing the mirror to move to `(x, y)`.
///
/// The frame is a fixed preamble, then the two axis codes MSB-first with
/// both data lines sharing each pin state (Y on bit 0, X on bit 1), each
/// bit clocked out as a clock-low byte followed by the same byte with the
/// clock set, then a postamble that de-asserts enable. Always
/// [`FRAME_LEN`] bytes for a given variant; pure function of its inputs.
pub fn encode_frame(x: f64, y: f64, variant: ProtocolVariant) -> Result<Vec<u8>, GalvoError> {
    if !x.is_finite() || !y.is_finite() {
        // Clamping NaN would silently produce an arbitrary code.
        return Err(GalvoError::InvalidCoordinate(x, y));
    }

    let x_code = quantize(x, variant);
    let y_code = quantize(y, variant);
    let n = variant.bit_depth();

    let mut frame = Vec::with_capacity(FRAME_LEN);
    frame.extend_from_slice(preamble(variant));
    for i in 0..n {
        let shift = n - 1 - i;
        let xb = ((x_code >> shift) & 1) as u8;
        let yb = ((y_code >> shift) & 1) as u8;
        let pins = yb * PIN_DATA_Y + xb * PIN_DATA_X + PIN_ENABLE;
        frame.push(pins);
        frame.push(pins | PIN_CLOCK);
    }
    frame.extend_from_slice(&POSTAMBLE);
    Ok(frame)
}

/// Recovers the coordinate pair a frame encodes. Diagnostic inverse of
/// [`encode_frame`]; the result is exact up to one quantization step.
pub fn decode_frame(frame: &[u8], variant: ProtocolVariant) -> Result<(f64, f64), GalvoError> {
    if frame.len() != FRAME_LEN {
        return Err(GalvoError::FrameLength(frame.len()));
    }
    let n = variant.bit_depth();
    let data_start = preamble(variant).len();
    let mut x_code: u32 = 0;
    let mut y_code: u32 = 0;
    for i in 0..n as usize {
        let pins = frame[data_start + 2 * i];
        x_code = (x_code << 1) | (((pins & PIN_DATA_X) >> 1) as u32);
        y_code = (y_code << 1) | ((pins & PIN_DATA_Y) as u32);
    }
    Ok((dequantize(x_code, variant), dequantize(y_code, variant)))
}
