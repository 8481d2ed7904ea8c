//! Classification adapter and built-in classifiers.
//!
//! [`ClassifierAdapter`] drives two [`ClassifierModel`]s, one for contract
//! type and one for risk level, concurrently under a shared timeout. Raw
//! scores are re-normalised per task so probabilities sum to 1.
//!
//! Built-in models:
//! - [`LexiconClassifier`] scores labels by term-profile frequencies.
//! - [`CentroidClassifier`] scores labels by cosine similarity between a
//!   document embedding and per-label centroids.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use contrisk_core::{
    ClassifierOutput, ClassifierScore, ClassifierTask, ModelUnavailableError, RiskDictionary,
};

use crate::features::DocumentFeatures;
use crate::labels::{CONTRACT_TYPE_PROFILES, normalize_class_label};

/// Capability interface for document classifiers.
///
/// Scores need not be normalised; the adapter handles that.
#[async_trait]
pub trait ClassifierModel: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, features: &DocumentFeatures) -> anyhow::Result<Vec<(String, f64)>>;
}

/// Wraps the contract-type and risk-level classifiers behind one call.
#[derive(Clone)]
pub struct ClassifierAdapter {
    contract_type: Arc<dyn ClassifierModel>,
    risk_level: Arc<dyn ClassifierModel>,
    timeout: Duration,
}

impl ClassifierAdapter {
    pub fn new(
        contract_type: Arc<dyn ClassifierModel>,
        risk_level: Arc<dyn ClassifierModel>,
        timeout: Duration,
    ) -> Self {
        Self {
            contract_type,
            risk_level,
            timeout,
        }
    }

    /// Run both classifiers. Either one failing fails the whole call.
    pub async fn classify(
        &self,
        features: &DocumentFeatures,
    ) -> Result<ClassifierOutput, ModelUnavailableError> {
        let started = Instant::now();
        let (contract_type, risk_level) = tokio::join!(
            self.invoke(ClassifierTask::ContractType, self.contract_type.as_ref(), features),
            self.invoke(ClassifierTask::RiskLevel, self.risk_level.as_ref(), features),
        );
        let output = ClassifierOutput {
            contract_type: contract_type?,
            risk_level: risk_level?,
        };

        tracing::info!(
            contract_type_labels = output.contract_type.len(),
            risk_level_labels = output.risk_level.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "classification complete"
        );
        Ok(output)
    }

    async fn invoke(
        &self,
        task: ClassifierTask,
        model: &dyn ClassifierModel,
        features: &DocumentFeatures,
    ) -> Result<Vec<ClassifierScore>, ModelUnavailableError> {
        let raw = tokio::time::timeout(self.timeout, model.classify(features))
            .await
            .map_err(|_| ModelUnavailableError::TimedOut {
                model: model.name().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| ModelUnavailableError::Invocation {
                model: model.name().to_string(),
                reason: format!("{e:#}"),
            })?;
        Ok(normalize_scores(task, raw))
    }
}

/// Turn raw label scores into a probability distribution.
///
/// Negative and non-finite scores count as 0 and duplicate labels are summed.
/// If nothing positive remains the result is empty. Output is ordered by
/// descending probability, then label.
pub fn normalize_scores(task: ClassifierTask, raw: Vec<(String, f64)>) -> Vec<ClassifierScore> {
    let mut mass: BTreeMap<String, f64> = BTreeMap::new();
    for (label, score) in raw {
        let label = normalize_class_label(&label);
        if label.is_empty() {
            continue;
        }
        let score = if score.is_finite() { score.max(0.0) } else { 0.0 };
        *mass.entry(label).or_insert(0.0) += score;
    }

    let total: f64 = mass.values().sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut scores: Vec<ClassifierScore> = mass
        .into_iter()
        .map(|(label, m)| ClassifierScore {
            task,
            label,
            probability: m / total,
        })
        .collect();
    scores.sort_by(|a, b| {
        b.probability
            .total_cmp(&a.probability)
            .then_with(|| a.label.cmp(&b.label))
    });
    scores
}

// ── Lexicon classifier ──

/// Scores each label by how often its profile terms occur in the document.
pub struct LexiconClassifier {
    name: String,
    profiles: Vec<(String, Vec<String>)>,
}

impl LexiconClassifier {
    pub fn new(name: impl Into<String>, profiles: Vec<(String, Vec<String>)>) -> Self {
        Self {
            name: name.into(),
            profiles,
        }
    }

    /// Contract-type classifier over the built-in term profiles.
    pub fn contract_types() -> Self {
        let profiles = CONTRACT_TYPE_PROFILES
            .iter()
            .map(|(label, terms)| {
                (
                    label.to_string(),
                    terms.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect();
        Self::new("lexicon-contract-type", profiles)
    }

    /// Risk-level classifier whose labels are the dictionary's categories.
    pub fn risk_categories(dictionary: &RiskDictionary) -> Self {
        let profiles = dictionary
            .categories()
            .into_iter()
            .map(|category| {
                let phrases = dictionary
                    .phrases_for(category)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                (category.to_string(), phrases)
            })
            .collect();
        Self::new("lexicon-risk-level", profiles)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|(label, _)| label.as_str())
    }

    pub fn scores(&self, features: &DocumentFeatures) -> Vec<(String, f64)> {
        self.profiles
            .iter()
            .map(|(label, terms)| {
                let hits: usize = terms.iter().map(|t| features.phrase_frequency(t)).sum();
                (label.clone(), hits as f64)
            })
            .collect()
    }
}

#[async_trait]
impl ClassifierModel for LexiconClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, features: &DocumentFeatures) -> anyhow::Result<Vec<(String, f64)>> {
        Ok(self.scores(features))
    }
}

// ── Centroid classifier ──

/// Nearest-centroid classifier over document embeddings.
///
/// Centroids are the L2-normalised mean of each label's example embeddings.
/// A label's score is its cosine similarity to the document, floored at 0.
pub struct CentroidClassifier {
    name: String,
    centroids: HashMap<String, Vec<f32>>,
    dim: usize,
}

impl CentroidClassifier {
    /// Build centroids from labelled example embeddings.
    ///
    /// Examples whose dimensionality differs from the first are skipped.
    pub fn build(name: impl Into<String>, examples: &[(String, Vec<f32>)]) -> Self {
        let dim = examples.first().map(|(_, v)| v.len()).unwrap_or(0);

        let mut accum: HashMap<&str, (Vec<f32>, usize)> = HashMap::new();
        for (label, emb) in examples {
            if emb.len() != dim {
                tracing::debug!(label = %label, dim = emb.len(), expected = dim, "skipping example");
                continue;
            }
            let entry = accum
                .entry(label.as_str())
                .or_insert_with(|| (vec![0.0f32; dim], 0));
            for (acc, &val) in entry.0.iter_mut().zip(emb) {
                *acc += val;
            }
            entry.1 += 1;
        }

        Self {
            name: name.into(),
            centroids: finalize_centroids(accum),
            dim,
        }
    }

    /// Use precomputed centroids. Each is L2-normalised on the way in.
    pub fn from_centroids(name: impl Into<String>, centroids: HashMap<String, Vec<f32>>) -> Self {
        let dim = centroids.values().next().map(|v| v.len()).unwrap_or(0);
        let centroids = centroids
            .into_iter()
            .filter(|(_, v)| v.len() == dim)
            .map(|(label, mut v)| {
                normalize(&mut v);
                (label, v)
            })
            .collect();
        Self {
            name: name.into(),
            centroids,
            dim,
        }
    }

    pub fn label_count(&self) -> usize {
        self.centroids.len()
    }

    /// Embedding dimensionality.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Cosine similarity to every centroid, highest first.
    pub fn similarities(&self, embedding: &[f32]) -> anyhow::Result<Vec<(String, f32)>> {
        if embedding.len() != self.dim {
            anyhow::bail!(
                "embedding has {} dimensions, centroids have {}",
                embedding.len(),
                self.dim
            );
        }
        let mut unit = embedding.to_vec();
        normalize(&mut unit);

        let mut sims: Vec<(String, f32)> = self
            .centroids
            .iter()
            .map(|(label, centroid)| (label.clone(), cosine_sim(&unit, centroid)))
            .collect();
        sims.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(sims)
    }

    /// The nearest centroid, if any.
    pub fn best_match(&self, embedding: &[f32]) -> anyhow::Result<Option<(String, f32)>> {
        Ok(self.similarities(embedding)?.into_iter().next())
    }
}

#[async_trait]
impl ClassifierModel for CentroidClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn classify(&self, features: &DocumentFeatures) -> anyhow::Result<Vec<(String, f64)>> {
        let embedding = features
            .embedding
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("document features carry no embedding"))?;
        Ok(self
            .similarities(embedding)?
            .into_iter()
            .map(|(label, sim)| (label, f64::from(sim.max(0.0))))
            .collect())
    }
}

fn finalize_centroids(accum: HashMap<&str, (Vec<f32>, usize)>) -> HashMap<String, Vec<f32>> {
    let mut result = HashMap::with_capacity(accum.len());
    for (label, (mut sum, count)) in accum {
        if count > 0 {
            for v in &mut sum {
                *v /= count as f32;
            }
            normalize(&mut sum);
            result.insert(label.to_string(), sum);
        }
    }
    result
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
