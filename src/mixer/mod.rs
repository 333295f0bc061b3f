//! Sample mixing primitives
//!
//! Each active track's samples are scaled by the track's current gain and summed
//! into a shared 16-bit mix buffer. The gain follows a linear fade-in envelope
//! that is advanced once per mix cycle, after the track has been mixed.

use crate::config::Accumulation;

/// Add `sample * gain` to an accumulated mix value.
///
/// The sum is formed in floating point and truncated toward zero once, so a
/// fractional term can pull the accumulator across an integer boundary.
#[inline]
pub fn mix_sample(acc: i16, sample: i16, gain: f32, mode: Accumulation) -> i16 {
    let sum = (acc as f32 + sample as f32 * gain) as i32;
    match mode {
        Accumulation::Wrapping => sum as i16,
        Accumulation::Saturating => sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
    }
}

/// Mix `samples` into the front of `out` at `gain`.
///
/// Only `min(out.len(), samples.len())` positions are touched.
pub fn accumulate(out: &mut [i16], samples: &[i16], gain: f32, mode: Accumulation) {
    for (acc, &sample) in out.iter_mut().zip(samples) {
        *acc = mix_sample(*acc, sample, gain, mode);
    }
}

/// Next fade gain: one `step` closer to `volume`, never past it
#[inline]
pub fn advance_fade(fade: f32, volume: f32, step: f32) -> f32 {
    if fade < volume {
        (fade + step).min(volume)
    } else {
        fade
    }
}
