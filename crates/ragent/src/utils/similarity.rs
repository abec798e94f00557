use anyhow::Result;

/// Cosine similarity in [-1, 1]; zero when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        anyhow::bail!("Vector dimensions must match: {} != {}", a.len(), b.len());
    }
    if a.is_empty() {
        anyhow::bail!("Vectors cannot be empty");
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Component-wise mean of equally sized vectors
pub fn mean_vector(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = vectors
        .first()
        .ok_or_else(|| anyhow::anyhow!("No vectors to average"))?;
    let mut sum = vec![0.0f32; first.len()];

    for vector in vectors {
        if vector.len() != sum.len() {
            anyhow::bail!("Vector dimensions must match: {} != {}", vector.len(), sum.len());
        }
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += value;
        }
    }

    let count = vectors.len() as f32;
    Ok(sum.into_iter().map(|v| v / count).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let sim = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_mean_vector() {
        let mean = mean_vector(&[vec![1.0, 3.0], vec![3.0, 5.0]]).unwrap();
        assert_eq!(mean, vec![2.0, 4.0]);
        assert!(mean_vector(&[]).is_err());
        assert!(mean_vector(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
