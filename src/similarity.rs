/// Why two vectors could not be scored against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incomparable {
    DimensionMismatch {
        left: usize,
        right: usize,
    },
    ZeroMagnitude,
}

/// Cosine similarity, accumulated in f64 so that long vectors do not lose
/// precision to cancellation. The result is clamped to `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, Incomparable> {
    if a.len() != b.len() {
        return Err(Incomparable::DimensionMismatch { left: a.len(), right: b.len() });
    }

    let (dot_product, norm_a, norm_b) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f64, 0.0f64, 0.0f64), |(dot, na, nb), (&x, &y)| {
            let (x, y) = (f64::from(x), f64::from(y));
            (dot + x * y, na + x * x, nb + y * y)
        });

    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    if magnitude == 0.0 || !magnitude.is_finite() {
        return Err(Incomparable::ZeroMagnitude);
    }

    Ok((dot_product / magnitude).clamp(-1.0, 1.0))
}
