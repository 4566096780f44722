//! Candidate selection as predicate composition over the oracle.
//!
//! Candidates are the union of every unreachability signal, minus the union
//! of every exclusion. Each exclusion is subtracted from the full signal
//! union rather than from what earlier exclusions left over, so every
//! reason an entity was excluded is reported and loosening one exclusion
//! never un-excludes an entity another exclusion still covers.

use chrono::{DateTime, Utc};
use regex::Regex;
use remedy_common::config::{ExclusionScope, ExclusionSpec, SelectionConfig, SignalSpec};
use remedy_common::{CandidateSet, Entity, Oracle, OracleError, Sample};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of one [`CandidateSelector::select`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionReport {
    pub candidates: CandidateSet,
    /// Size of the signal union before exclusions.
    pub raw_count: usize,
    /// Excluded entity name to the exclusions that removed it.
    pub excluded: BTreeMap<String, Vec<String>>,
    /// Per configured exclusion, how many signal candidates it covered.
    pub exclusion_counts: BTreeMap<String, usize>,
    /// Wall time of every query, keyed by signal or exclusion name.
    pub query_durations: Vec<(String, Duration)>,
}

#[derive(Debug, Clone)]
pub struct CandidateSelector {
    signals: Vec<SignalSpec>,
    exclusions: Vec<ExclusionSpec>,
    lookback_minutes: u32,
    name_labels: Vec<String>,
    site_label: String,
    site_pattern: Regex,
    timeout: Duration,
}

impl CandidateSelector {
    /// `timeout` bounds each individual query.
    pub fn new(config: &SelectionConfig, timeout: Duration) -> Result<Self, regex::Error> {
        Ok(Self {
            signals: config.signals.clone(),
            exclusions: config.exclusions.clone(),
            lookback_minutes: config.lookback_minutes,
            name_labels: config.name_labels.clone(),
            site_label: config.site_label.clone(),
            site_pattern: Regex::new(&config.site_pattern)?,
            timeout,
        })
    }

    /// Substitute the lookback window into a query template.
    pub fn render(&self, template: &str) -> String {
        template.replace("{lookback}", &self.lookback_minutes.to_string())
    }

    /// Entity identity of a sample, or `None` when no name label is present.
    pub fn entity_of(&self, sample: &Sample) -> Option<Entity> {
        let name = self
            .name_labels
            .iter()
            .find_map(|label| sample.label(label).filter(|v| !v.is_empty()))?;
        let site = self.site_of(sample, Some(name)).unwrap_or_default();
        Some(Entity::new(name, site))
    }

    fn site_of(&self, sample: &Sample, name: Option<&str>) -> Option<String> {
        if let Some(site) = sample.label(&self.site_label).filter(|s| !s.is_empty()) {
            return Some(site.to_string());
        }
        let name = name.or_else(|| {
            self.name_labels
                .iter()
                .find_map(|label| sample.label(label))
        })?;
        self.site_pattern
            .captures(name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    async fn evaluate<O: Oracle>(
        &self,
        oracle: &O,
        name: &str,
        template: &str,
        at: DateTime<Utc>,
        durations: &mut Vec<(String, Duration)>,
    ) -> Result<Vec<Sample>, OracleError> {
        let query = self.render(template);
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, oracle.evaluate(&query, at)).await;
        durations.push((name.to_string(), started.elapsed()));

        let samples = match result {
            Ok(samples) => samples?,
            Err(_) => return Err(OracleError::Timeout(self.timeout)),
        };
        debug!(query = name, samples = samples.len(), "Query evaluated");
        Ok(samples)
    }

    /// Evaluate every signal and exclusion at `at` and compose the result.
    ///
    /// Any query failure fails the whole selection: "no information" must
    /// never be mistaken for "nothing is down".
    pub async fn select<O: Oracle>(
        &self,
        oracle: &O,
        at: DateTime<Utc>,
    ) -> Result<SelectionReport, OracleError> {
        let mut durations = Vec::new();

        let mut union = CandidateSet::new();
        for signal in &self.signals {
            let samples = self
                .evaluate(oracle, &signal.name, &signal.query, at, &mut durations)
                .await?;
            for sample in &samples {
                match self.entity_of(sample) {
                    Some(entity) => {
                        union.insert(entity);
                    }
                    None => warn!(
                        signal = %signal.name,
                        labels = ?sample.labels,
                        "Sample has no machine name label, skipping it"
                    ),
                }
            }
        }

        let mut excluded: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut exclusion_counts = BTreeMap::new();
        for exclusion in &self.exclusions {
            let samples = self
                .evaluate(oracle, &exclusion.name, &exclusion.query, at, &mut durations)
                .await?;
            let hits = self.covered(exclusion.scope, &samples, &union);
            debug!(
                exclusion = %exclusion.name,
                scope = exclusion.scope.as_str(),
                covered = hits.len(),
                "Exclusion applied"
            );
            exclusion_counts.insert(exclusion.name.clone(), hits.len());
            for name in hits {
                excluded.entry(name).or_default().push(exclusion.name.clone());
            }
        }

        let raw_count = union.len();
        let mut candidates = union;
        candidates.retain(|e| !excluded.contains_key(&e.name));

        for (name, reasons) in &excluded {
            info!(machine = %name, reasons = %reasons.join(","), "Excluding candidate");
        }
        info!(
            raw = raw_count,
            excluded = excluded.len(),
            candidates = candidates.len(),
            "Selected candidates"
        );

        Ok(SelectionReport {
            candidates,
            raw_count,
            excluded,
            exclusion_counts,
            query_durations: durations,
        })
    }

    /// Names of the signal candidates an exclusion's result covers.
    fn covered(&self, scope: ExclusionScope, samples: &[Sample], union: &CandidateSet) -> Vec<String> {
        match scope {
            ExclusionScope::Entity => {
                let names: BTreeSet<String> = samples
                    .iter()
                    .filter_map(|s| self.entity_of(s))
                    .map(|e| e.name)
                    .collect();
                union
                    .names()
                    .filter(|n| names.contains(*n))
                    .map(String::from)
                    .collect()
            }
            ExclusionScope::Site => {
                let sites: BTreeSet<String> = samples
                    .iter()
                    .filter_map(|s| self.site_of(s, None))
                    .collect();
                union
                    .iter()
                    .filter(|e| !e.site.is_empty() && sites.contains(&e.site))
                    .map(|e| e.name.clone())
                    .collect()
            }
        }
    }
}
