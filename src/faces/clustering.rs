//! Incremental face clustering.
//!
//! Each new face is compared against every stored face. If the nearest one is
//! closer than the distance threshold the new face joins that face's group,
//! otherwise it starts a new group. Stored assignments are never revisited, so
//! groups never merge or split.
//!
//! The comparison is against individual faces, not group centroids. A group can
//! therefore drift: A joins via B, C joins via A without being near B, and so
//! on down a chain. This is an accepted approximation of the online setting;
//! changing it changes which group faces land in.

use rayon::prelude::*;
use std::collections::HashSet;

/// Default Euclidean distance threshold for face embeddings
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.45;

/// Populations at least this large compute distances on the rayon pool.
const PARALLEL_SCAN_MIN: usize = 4096;

/// Nearest stored face for a query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position in the population's insertion order
    pub index: usize,
    pub distance: f32,
}

/// Nearest-neighbour search over the stored population.
///
/// Implementations must return the lowest-index neighbour among equidistant ones.
pub trait NeighborIndex {
    fn nearest(&self, query: &[f32]) -> Option<Neighbor>;
}

/// Exhaustive search over every stored embedding.
pub struct LinearScan<'a> {
    embeddings: &'a [Vec<f32>],
}

impl<'a> LinearScan<'a> {
    pub fn new(embeddings: &'a [Vec<f32>]) -> Self {
        Self { embeddings }
    }
}

impl NeighborIndex for LinearScan<'_> {
    fn nearest(&self, query: &[f32]) -> Option<Neighbor> {
        let distances: Vec<f32> = if self.embeddings.len() >= PARALLEL_SCAN_MIN {
            self.embeddings
                .par_iter()
                .map(|e| euclidean_distance(query, e))
                .collect()
        } else {
            self.embeddings
                .iter()
                .map(|e| euclidean_distance(query, e))
                .collect()
        };

        // Strict less-than keeps the first occurrence on ties.
        let mut best: Option<Neighbor> = None;
        for (index, &distance) in distances.iter().enumerate() {
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(Neighbor { index, distance });
            }
        }
        best
    }
}

/// Group decision for one new face.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Joined the group of an existing face
    Existing { group_id: String, distance: f32 },
    /// Nothing within threshold; a new group was minted
    New { group_id: String },
}

impl Assignment {
    pub fn group_id(&self) -> &str {
        match self {
            Assignment::Existing { group_id, .. } | Assignment::New { group_id } => group_id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Assignment::New { .. })
    }
}

/// Assigns faces to groups against an insertion-ordered population.
pub struct Clusterer {
    threshold: f32,
}

impl Default for Clusterer {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_THRESHOLD)
    }
}

impl Clusterer {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Decide the group for `embedding` given parallel `existing_embeddings` / `existing_group_ids`.
    pub fn assign_group(
        &self,
        embedding: &[f32],
        existing_embeddings: &[Vec<f32>],
        existing_group_ids: &[String],
    ) -> Assignment {
        let index = LinearScan::new(existing_embeddings);
        self.assign_with_index(embedding, &index, existing_group_ids)
    }

    /// Same as [`Clusterer::assign_group`] with a caller-supplied search structure.
    pub fn assign_with_index(
        &self,
        embedding: &[f32],
        index: &dyn NeighborIndex,
        existing_group_ids: &[String],
    ) -> Assignment {
        if let Some(neighbor) = index.nearest(embedding) {
            if neighbor.distance < self.threshold {
                if let Some(group_id) = existing_group_ids.get(neighbor.index) {
                    return Assignment::Existing {
                        group_id: group_id.clone(),
                        distance: neighbor.distance,
                    };
                }
            }
        }

        Assignment::New {
            group_id: mint_group_id(existing_group_ids),
        }
    }
}

/// Running population for clustering several faces in sequence.
///
/// Faces assigned earlier in a batch are visible to later ones, so two
/// unmatched faces of one upload never share a freshly minted id by accident.
pub struct Population {
    embeddings: Vec<Vec<f32>>,
    group_ids: Vec<String>,
}

impl Population {
    pub fn new(embeddings: Vec<Vec<f32>>, group_ids: Vec<String>) -> Self {
        Self {
            embeddings,
            group_ids,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }

    /// Assign `embedding` and add it to the population.
    pub fn assign(&mut self, clusterer: &Clusterer, embedding: &[f32]) -> Assignment {
        let assignment = clusterer.assign_group(embedding, &self.embeddings, &self.group_ids);
        self.embeddings.push(embedding.to_vec());
        self.group_ids.push(assignment.group_id().to_string());
        assignment
    }
}

/// Next unused `Group_<k>` id, starting from the number of distinct groups plus one.
pub fn mint_group_id(existing_group_ids: &[String]) -> String {
    let known: HashSet<&str> = existing_group_ids.iter().map(String::as_str).collect();
    let mut k = known.len() + 1;
    loop {
        let candidate = format!("Group_{}", k);
        if !known.contains(candidate.as_str()) {
            return candidate;
        }
        k += 1;
    }
}

/// Euclidean distance; vectors of different length never match.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::INFINITY;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
