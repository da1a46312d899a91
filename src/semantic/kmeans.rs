//! K-means clustering over embedding vectors.
//!
//! Plain random initialization (shuffle, take the first k points), Euclidean
//! distance, stops when an iteration leaves every label unchanged or after
//! `max_iterations`. A cluster that loses all its points keeps its previous
//! centroid; it is not re-seeded.

use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClusterError {
    #[error("k must be greater than 0")]
    InvalidK,

    #[error("Dimension mismatch at point {index}: expected {expected}, got {got}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },
}

/// A cluster's centroid and the indices of its member points.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub centroid: Vec<f32>,
    pub members: Vec<usize>,
}

/// Outcome of one K-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// One label per input point, in `0..centroids.len()`
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f32>>,
    /// Assignment passes performed
    pub iterations: usize,
}

impl Clustering {
    /// Non-empty clusters in label order.
    pub fn clusters(&self) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = self
            .centroids
            .iter()
            .map(|centroid| Cluster {
                centroid: centroid.clone(),
                members: Vec::new(),
            })
            .collect();

        for (index, &label) in self.labels.iter().enumerate() {
            clusters[label].members.push(index);
        }

        clusters.retain(|c| !c.members.is_empty());
        clusters
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeans {
    k: usize,
    max_iterations: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::new(5, 100)
    }
}

impl KMeans {
    pub fn new(k: usize, max_iterations: usize) -> Self {
        Self { k, max_iterations }
    }

    /// Partition `points` into at most `k` groups.
    ///
    /// With fewer points than `k`, every point seeds its own centroid.
    pub fn fit<R: Rng + ?Sized>(&self, points: &[Vec<f32>], rng: &mut R) -> Result<Clustering, ClusterError> {
        if self.k == 0 {
            return Err(ClusterError::InvalidK);
        }

        let Some(first) = points.first() else {
            return Ok(Clustering {
                labels: Vec::new(),
                centroids: Vec::new(),
                iterations: 0,
            });
        };

        let dimensions = first.len();
        if let Some((index, point)) = points.iter().enumerate().find(|(_, p)| p.len() != dimensions) {
            return Err(ClusterError::DimensionMismatch {
                index,
                expected: dimensions,
                got: point.len(),
            });
        }

        let mut order: Vec<usize> = (0..points.len()).collect();
        order.shuffle(rng);
        let mut centroids: Vec<Vec<f32>> = order
            .iter()
            .take(self.k)
            .map(|&i| points[i].clone())
            .collect();

        let mut labels: Option<Vec<usize>> = None;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            let assigned: Vec<usize> = points.iter().map(|p| nearest_centroid(p, &centroids)).collect();
            iterations += 1;

            if labels.as_ref() == Some(&assigned) {
                break;
            }

            update_centroids(&mut centroids, points, &assigned);
            labels = Some(assigned);
        }

        Ok(Clustering {
            labels: labels.unwrap_or_else(|| vec![0; points.len()]),
            centroids,
            iterations,
        })
    }
}

/// Euclidean distance between two vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Index of the closest centroid; the lowest index wins ties.
fn nearest_centroid(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut nearest = 0;
    let mut min_distance = f32::INFINITY;

    for (index, centroid) in centroids.iter().enumerate() {
        let distance = euclidean_distance(point, centroid);
        if distance < min_distance {
            min_distance = distance;
            nearest = index;
        }
    }

    nearest
}

/// Move every non-empty cluster's centroid to the mean of its points.
fn update_centroids(centroids: &mut [Vec<f32>], points: &[Vec<f32>], labels: &[usize]) {
    for (cluster, centroid) in centroids.iter_mut().enumerate() {
        let mut sum = vec![0.0f32; centroid.len()];
        let mut count = 0usize;

        for (point, _) in points.iter().zip(labels).filter(|&(_, &l)| l == cluster) {
            for (s, v) in sum.iter_mut().zip(point) {
                *s += v;
            }
            count += 1;
        }

        // empty clusters keep their centroid
        if count > 0 {
            *centroid = sum.into_iter().map(|s| s / count as f32).collect();
        }
    }
}
