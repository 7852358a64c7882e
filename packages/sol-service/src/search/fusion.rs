use std::{
	cmp::Ordering,
	collections::{BTreeMap, HashMap},
};

use serde::{Deserialize, Serialize};

/// Per-request blend of the two normalized score sets.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct FusionWeights {
	pub lexical: f32,
	pub vector: f32,
}
impl FusionWeights {
	pub fn from_config(cfg: &sol_config::Fusion) -> Self {
		Self { lexical: cfg.lexical_weight, vector: cfg.vector_weight }
	}

	pub fn validate(&self) -> Result<(), String> {
		for (name, value) in [("lexical", self.lexical), ("vector", self.vector)] {
			if !value.is_finite() || value < 0.0 {
				return Err(format!("weights.{name} must be a finite number of at least zero."));
			}
		}

		if self.lexical == 0.0 && self.vector == 0.0 {
			return Err("weights must not both be zero.".to_string());
		}

		Ok(())
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModeScore {
	pub raw: f32,
	pub normalized: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FusedResult {
	pub id: String,
	pub fused: f32,
	pub lexical: Option<ModeScore>,
	pub vector: Option<ModeScore>,
}

/// Min-max normalization into `[0, 1]`.
///
/// A set whose finite scores are all equal maps every finite score to 1.0. Non-finite scores
/// always map to 0.0 and are ignored when computing the range.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
	let mut min = f32::INFINITY;
	let mut max = f32::NEG_INFINITY;

	for score in scores.iter().copied().filter(|score| score.is_finite()) {
		min = min.min(score);
		max = max.max(score);
	}

	let range = max - min;

	scores
		.iter()
		.map(|&score| {
			if !score.is_finite() {
				0.0
			} else if range <= 0.0 || !range.is_finite() {
				1.0
			} else {
				((score - min) / range).clamp(0.0, 1.0)
			}
		})
		.collect()
}

/// Fuses the ranked lists of the modes that ran.
///
/// `None` means the mode did not run; `Some(&[])` means it ran and found nothing. When only one
/// mode ran its normalized score passes through unweighted. The output is sorted by fused score
/// descending, ties broken by id ascending, and truncated to `limit`.
pub fn fuse(
	lexical: Option<&[(String, f32)]>,
	vector: Option<&[(String, f32)]>,
	weights: FusionWeights,
	limit: usize,
) -> Vec<FusedResult> {
	let lexical = lexical.map(normalize_mode);
	let vector = vector.map(normalize_mode);
	let mut merged: BTreeMap<&str, (Option<ModeScore>, Option<ModeScore>)> = BTreeMap::new();

	if let Some(scores) = &lexical {
		for (id, score) in scores {
			merged.entry(id.as_str()).or_default().0 = Some(*score);
		}
	}
	if let Some(scores) = &vector {
		for (id, score) in scores {
			merged.entry(id.as_str()).or_default().1 = Some(*score);
		}
	}

	let both_ran = lexical.is_some() && vector.is_some();
	let mut results: Vec<FusedResult> = merged
		.into_iter()
		.map(|(id, (lexical, vector))| {
			let lexical_norm = lexical.map(|score| score.normalized).unwrap_or(0.0);
			let vector_norm = vector.map(|score| score.normalized).unwrap_or(0.0);
			let fused = if both_ran {
				weights.lexical * lexical_norm + weights.vector * vector_norm
			} else {
				lexical_norm + vector_norm
			};

			FusedResult { id: id.to_string(), fused, lexical, vector }
		})
		.collect();

	results.sort_by(|a, b| cmp_f32_desc(a.fused, b.fused).then_with(|| a.id.cmp(&b.id)));
	results.truncate(limit);

	results
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

/// Keeps the best raw score per id, then normalizes within the mode.
fn normalize_mode(hits: &[(String, f32)]) -> Vec<(String, ModeScore)> {
	let mut order = Vec::new();
	let mut best: HashMap<&str, f32> = HashMap::new();

	for (id, score) in hits {
		match best.get_mut(id.as_str()) {
			Some(current) =>
				if score.is_finite() && (!current.is_finite() || *score > *current) {
					*current = *score;
				},
			None => {
				order.push(id.as_str());
				best.insert(id.as_str(), *score);
			},
		}
	}

	let raw: Vec<f32> = order.iter().map(|id| best.get(id).copied().unwrap_or(f32::NAN)).collect();
	let normalized = min_max_normalize(&raw);

	order
		.into_iter()
		.zip(raw.into_iter().zip(normalized))
		.map(|(id, (raw, normalized))| (id.to_string(), ModeScore { raw, normalized }))
		.collect()
}
