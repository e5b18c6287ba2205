/// Affine remap anchored at the previous block's tail value:
/// `out = a * (in * prescale - b) + b`, written at stride 2 over `[start, end)`.
#[inline]
pub(crate) fn poly_fit(
    input: &[f32],
    start: usize,
    end: usize,
    out: &mut [i16],
    prescale: f32,
    poly_a: f32,
    poly_b: f32,
) {
    let mut pos = start;
    while pos < end {
        let fitted = poly_a * (input[pos] * prescale - poly_b) + poly_b;
        debug_assert!(fitted.abs() < i16::MAX as f32, "poly fit overflow: {fitted}");
        out[pos] = fitted as i16;
        pos += 2;
    }
}

/// Multiplies `[start, end)` by `scalar` at stride 2, truncating toward zero.
#[inline]
pub(crate) fn linear_scale(input: &[f32], start: usize, end: usize, out: &mut [i16], scalar: f32) {
    let mut pos = start;
    while pos < end {
        let scaled = input[pos] * scalar;
        debug_assert!(scaled.abs() < i16::MAX as f32, "linear scale overflow: {scaled}");
        out[pos] = scaled as i16;
        pos += 2;
    }
}
