use std::time::Instant;

use rand_pcg::Pcg64Mcg;
use tracing::{debug, error, info};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::risk_thresholds::{HIGH_MIN, MEDIUM_MIN};
use crate::dataset::Dataset;
use crate::db::PersistenceWriter;
use crate::error::{AppError, Result};
use crate::model::ModelRegistry;
use crate::pipeline::sampler::Reservoir;
use crate::scorer::ChunkedScorer;
use crate::types::{ModelId, ScoredRow};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Validating,
    Scoring(usize),
    Persisting(usize),
    Aggregating,
    Done,
    /// Terminal. `None` when validation failed before any chunk.
    Failed(Option<usize>),
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Validating => write!(f, "validating"),
            PipelineState::Scoring(i) => write!(f, "scoring({i})"),
            PipelineState::Persisting(i) => write!(f, "persisting({i})"),
            PipelineState::Aggregating => write!(f, "aggregating"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed(Some(i)) => write!(f, "failed({i})"),
            PipelineState::Failed(None) => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Running counts over every committed row.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FraudTally {
    pub total: usize,
    /// probability >= 0.7
    pub high_risk: usize,
    /// 0.5 <= probability < 0.7
    pub medium_risk: usize,
    /// probability >= 0.5
    pub flagged: usize,
}

impl FraudTally {
    pub fn record(&mut self, rows: &[ScoredRow]) {
        for row in rows {
            let p = row.fraud_probability;
            self.total += 1;
            if p >= HIGH_MIN {
                self.high_risk += 1;
            } else if p >= MEDIUM_MIN {
                self.medium_risk += 1;
            }
            if p >= MEDIUM_MIN {
                self.flagged += 1;
            }
        }
    }

    /// Share of rows with probability >= 0.5; 0 for an empty run.
    pub fn fraud_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.flagged as f64 / self.total as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct ScoreRequest<'a> {
    pub dataset: &'a Dataset,
    pub model_id: &'a str,
    pub sample_size: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub model_used: ModelId,
    pub tally: FraudTally,
    pub sample: Vec<ScoredRow>,
    pub chunks: usize,
}

/// Drives scoring and persistence chunk by chunk, strictly in order: chunk
/// i+1 is not scored until chunk i has committed.
pub struct Pipeline<'a> {
    registry: &'a ModelRegistry,
    writer: &'a PersistenceWriter,
    chunk_size: usize,
    latency: Option<&'a LatencyStats>,
    health: Option<&'a HealthState>,
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a ModelRegistry, writer: &'a PersistenceWriter, chunk_size: usize) -> Self {
        Self {
            registry,
            writer,
            chunk_size,
            latency: None,
            health: None,
        }
    }

    pub fn with_latency(mut self, latency: &'a LatencyStats) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_health(mut self, health: &'a HealthState) -> Self {
        self.health = Some(health);
        self
    }

    /// Run one request to completion or to the first unrecoverable chunk.
    /// On failure, chunks committed before the failing one stay committed.
    pub async fn run(&self, request: ScoreRequest<'_>, rng: Pcg64Mcg) -> Result<PipelineOutcome> {
        let started = Instant::now();
        let mut state = PipelineState::Idle;

        advance(&mut state, PipelineState::Validating);
        let selected = match self.registry.get(request.model_id) {
            Ok(m) => m,
            Err(e) => return Err(fail(&mut state, None, e)),
        };
        let mut scorer = match ChunkedScorer::new(request.dataset, selected, self.chunk_size) {
            Ok(s) => s,
            Err(e) => return Err(fail(&mut state, None, e)),
        };

        let total_chunks = scorer.chunk_count();
        if request.dataset.is_empty() {
            info!("Upload has a header but no rows, nothing to score");
        }
        info!(
            rows = request.dataset.len(),
            chunks = total_chunks,
            chunk_size = self.chunk_size,
            model = %selected.id,
            "Starting scoring run"
        );

        let mut tally = FraudTally::default();
        let mut reservoir = Reservoir::new(request.sample_size, rng);

        for i in 0..total_chunks {
            let chunk_started = Instant::now();

            advance(&mut state, PipelineState::Scoring(i));
            let chunk = match scorer.next() {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Err(fail(&mut state, Some(i), e)),
                None => break,
            };

            advance(&mut state, PipelineState::Persisting(i));
            if let Err(e) = self.writer.upsert_batch(chunk.index, &chunk.rows).await {
                return Err(fail(&mut state, Some(i), e));
            }

            tally.record(&chunk.rows);
            for row in &chunk.rows {
                reservoir.offer(row);
            }
            if let Some(health) = self.health {
                health.add_rows_committed(chunk.rows.len() as u64);
            }
            if let Some(latency) = self.latency {
                latency.record(chunk_started.elapsed());
            }
            info!(
                chunk = i,
                of = total_chunks,
                rows = chunk.rows.len(),
                elapsed_ms = chunk_started.elapsed().as_millis() as u64,
                "Chunk processed"
            );
        }

        advance(&mut state, PipelineState::Aggregating);
        debug!(offered = reservoir.seen(), "Drawing response sample");
        let sample = reservoir.into_items();
        let elapsed = started.elapsed();
        advance(&mut state, PipelineState::Done);

        info!(
            rows = tally.total,
            high_risk = tally.high_risk,
            medium_risk = tally.medium_risk,
            sample = sample.len(),
            "Scoring run complete in {:.2}s",
            elapsed.as_secs_f64()
        );

        Ok(PipelineOutcome {
            model_used: selected.id,
            tally,
            sample,
            chunks: total_chunks,
        })
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    debug!(from = %state, to = %next, "Pipeline transition");
    *state = next;
}

fn fail(state: &mut PipelineState, chunk: Option<usize>, e: AppError) -> AppError {
    advance(state, PipelineState::Failed(chunk));
    match chunk {
        Some(i) => error!(chunk = i, kind = e.kind(), "Scoring run stopped at chunk {i}: {e}"),
        None => error!(kind = e.kind(), "Scoring run rejected: {e}"),
    }
    e
}
