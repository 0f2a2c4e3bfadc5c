/// Intensity of a candidate transition normalized against the strongest
/// candidate for the same compound. Yields 0 when the compound has no signal.
pub(crate) fn normalized_intensity(intensity: f64, max_intensity: f64) -> f64 {
    if max_intensity <= 0.0 {
        return 0.0;
    }
    (intensity / max_intensity).clamp(0.0, 1.0)
}

/// Fraction of other-compound transitions that do NOT interfere with the
/// candidate, i.e. fall outside the m/z window or the RT window. 1.0 means
/// the candidate is fully specific; an empty `others` is treated as specific.
pub(crate) fn interference_free_fraction(
    product_mz: f64,
    rt: f64,
    others: &[(f64, f64)],
    mz_tolerance: f64,
    rt_tolerance: f64,
) -> f64 {
    if others.is_empty() {
        return 1.0;
    }
    let interfering = others
        .iter()
        .filter(|(other_mz, other_rt)| {
            (other_mz - product_mz).abs() <= mz_tolerance
                && (other_rt - rt).abs() <= rt_tolerance
        })
        .count();
    1.0 - interfering as f64 / others.len() as f64
}

/// Blend the intensity and specificity terms with the configured weight.
pub(crate) fn blend(intensity_score: f64, specificity_score: f64, weight: f64) -> f64 {
    (1.0 - weight) * intensity_score + weight * specificity_score
}
