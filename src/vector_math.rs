use std::cmp::Ordering;

use ndarray::ArrayView1;

use crate::core::errors::LabError;

pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, LabError> {
    if query.is_empty() || candidate.is_empty() {
        return Err(LabError::Internal("Vectors must not be empty".to_string()));
    }
    if query.len() != candidate.len() {
        return Err(LabError::Internal(format!(
            "Vector length mismatch: {} != {}",
            query.len(),
            candidate.len()
        )));
    }

    let query_view = ArrayView1::from(query);
    let candidate_view = ArrayView1::from(candidate);

    let dot = query_view.dot(&candidate_view);
    let denom = l2_norm(query_view) * l2_norm(candidate_view);
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }

    Ok((dot / denom).clamp(-1.0, 1.0))
}

/// Indices of `candidates` ordered by descending cosine to `query`.
///
/// Equal scores keep candidate order, so the result is deterministic.
pub fn rank_descending_by_cosine(
    query: &[f32],
    candidates: &[Vec<f32>],
) -> Result<Vec<(usize, f32)>, LabError> {
    let mut scores = Vec::with_capacity(candidates.len());
    for (idx, candidate) in candidates.iter().enumerate() {
        let score = cosine_similarity(query, candidate)?;
        scores.push((idx, score));
    }

    scores.sort_by(|left, right| descending_score(left.1, right.1).then(left.0.cmp(&right.0)));
    Ok(scores)
}

/// Ordering for sorting scores high-to-low, NaN last.
pub fn descending_score(left: f32, right: f32) -> Ordering {
    match (left.is_nan(), right.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
    }
}

pub fn normalize(vector: &mut [f32]) {
    let norm = l2_norm(ArrayView1::from(&*vector));
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn l2_norm(view: ArrayView1<'_, f32>) -> f32 {
    view.dot(&view).sqrt()
}
