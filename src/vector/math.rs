//! Vector arithmetic shared by the index and the embedder

use crate::error::{Result, VaultError};

/// Inner product of two equally sized slices.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place.
///
/// Zero-length and non-finite vectors have no direction and are rejected.
pub fn l2_normalize(v: &mut [f32]) -> Result<()> {
    if v.iter().any(|x| !x.is_finite()) {
        return Err(VaultError::InvalidVector(
            "vector contains NaN or infinite components".to_string(),
        ));
    }

    let mag = magnitude(v);
    if mag == 0.0 || !mag.is_finite() {
        return Err(VaultError::InvalidVector(
            "vector has zero magnitude".to_string(),
        ));
    }

    for val in v.iter_mut() {
        *val /= mag;
    }
    Ok(())
}

pub fn normalized(v: &[f32]) -> Result<Vec<f32>> {
    let mut out = v.to_vec();
    l2_normalize(&mut out)?;
    Ok(out)
}
