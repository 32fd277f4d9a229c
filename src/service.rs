// src/service.rs - Consolidation orchestration
//
// Owns the injected collaborators and runs the parse -> match -> merge ->
// validate pipeline. Every storage call and every whole merge run is
// bounded by a configured deadline.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{Job, Order, OrderState, PackageSummary};
use crate::package::concat::{ConcatenationEngine, ReplicationPart};
use crate::package::metadata::{MetadataExtractor, SliceMetadata};
use crate::package::reader::{plate_stats, read_entries, read_package, PackageContent};
use crate::package::validator::{validate, ValidationReport};
use crate::queue::matcher::{propose, ConcatenationProposal};
use crate::queue::state::apply_transition;
use crate::store::{JobStore, ObjectStore, OrderStore};

/// Result of one executed merge.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    /// Storage path of the uploaded artifact.
    pub artifact_path: String,
    pub summary: PackageSummary,
    /// Truncation and well-formedness warnings, if any.
    pub warnings: Vec<String>,
}

/// Result of a batch re-analysis run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// At most the configured cap of per-item error messages.
    pub sample_errors: Vec<String>,
}

pub struct ConsolidationService {
    objects: Arc<dyn ObjectStore>,
    orders: Arc<dyn OrderStore>,
    jobs: Arc<dyn JobStore>,
    metadata_cache: TtlCache<String, SliceMetadata>,
    extractor: MetadataExtractor,
    engine: ConcatenationEngine,
    config: Config,
}

impl ConsolidationService {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        orders: Arc<dyn OrderStore>,
        jobs: Arc<dyn JobStore>,
        config: Config,
    ) -> Self {
        Self {
            metadata_cache: TtlCache::new(
                Duration::from_secs(config.cache.ttl_secs),
                config.cache.capacity,
            ),
            extractor: MetadataExtractor::new(config.consolidation.auto_profile_marker.clone()),
            engine: ConcatenationEngine::new(config.size_ceiling_bytes()),
            objects,
            orders,
            jobs,
            config,
        }
    }

    /// Register a job for a package already present in object storage:
    /// parse it, extract metadata, and persist the row.
    pub async fn register_job(&self, package_path: &str, file_id: Uuid) -> Result<Job> {
        let (content, meta) = self.analyze_package(package_path).await?;
        let stats = plate_stats(&content.entries);
        let job = Job {
            id: Uuid::new_v4(),
            file_id,
            package_path: package_path.to_string(),
            weight_g: stats.weight_g.unwrap_or(0.0),
            duration_min: stats.duration_min.unwrap_or(0.0),
            material: meta
                .material_type
                .clone()
                .or_else(|| meta.material_name.clone())
                .unwrap_or_default(),
            printer_model: meta.printer_model.clone().unwrap_or_default(),
            print_profile: meta.print_profile.clone().unwrap_or_default(),
            uploaded_at: Utc::now(),
        };
        self.jobs.insert(job.clone()).await?;
        tracing::info!(
            "registered job {} from '{}' (printer '{}', material '{}')",
            job.id,
            package_path,
            job.printer_model,
            job.material
        );
        Ok(job)
    }

    /// Submit a new order against an existing job. Starts in `processing`.
    pub async fn submit_order(
        &self,
        job_id: Uuid,
        project_id: Uuid,
        requested_by: String,
        quantity: u32,
        due_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<Order> {
        self.jobs.get(job_id).await?;
        let order = Order::new(job_id, project_id, requested_by, quantity, due_at)?;
        self.orders.insert(order.clone()).await?;
        tracing::info!("order {} submitted for job {} x{}", order.id, job_id, quantity);
        Ok(order)
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        self.orders.list().await
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.jobs.list().await
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.orders.get(id).await
    }

    /// Compute merge proposals over the active queue. Before grouping, a
    /// bounded batch of packages whose job lacks a printer identity is
    /// re-parsed to shrink the unknown bucket; failures there are logged
    /// and skipped, never fatal.
    pub async fn proposals(&self) -> Result<Vec<ConcatenationProposal>> {
        let eligible = self
            .orders
            .list_by_states(&[
                OrderState::Queued,
                OrderState::Printing,
                OrderState::Ready,
                OrderState::Error,
            ])
            .await?;

        let mut jobs: HashMap<Uuid, Job> = HashMap::new();
        for order in &eligible {
            if jobs.contains_key(&order.job_id) {
                continue;
            }
            match self.jobs.get(order.job_id).await {
                Ok(job) => {
                    jobs.insert(job.id, job);
                }
                Err(Error::NotFound(_)) => {
                    tracing::warn!("order {} references missing job {}", order.id, order.job_id);
                }
                Err(e) => return Err(e),
            }
        }

        self.backfill_printer_identities(&mut jobs).await;
        Ok(propose(&eligible, &jobs))
    }

    async fn backfill_printer_identities(&self, jobs: &mut HashMap<Uuid, Job>) {
        let unanalyzed: Vec<Uuid> = jobs
            .values()
            .filter(|j| j.printer_model.trim().is_empty())
            .map(|j| j.id)
            .take(self.config.consolidation.backfill_batch)
            .collect();
        for job_id in unanalyzed {
            let path = jobs[&job_id].package_path.clone();
            let meta = match self.metadata_cache.get(&path).await {
                Some(meta) => meta,
                None => match self.analyze_package(&path).await {
                    Ok((_, meta)) => meta,
                    Err(e) => {
                        tracing::warn!("backfill skipped for job {}: {}", job_id, e);
                        continue;
                    }
                },
            };
            let Some(printer_model) = meta.printer_model else {
                continue;
            };
            if let Some(job) = jobs.get_mut(&job_id) {
                job.printer_model = printer_model;
                if let Err(e) = self.jobs.update(job.clone()).await {
                    tracing::warn!("backfill persist failed for job {}: {}", job_id, e);
                }
            }
        }
    }

    /// Execute a merge over the given orders: fetch each distinct job's
    /// package sequentially, concatenate at exact multiplicity, validate,
    /// and upload the artifact. Consumed orders are left untouched; the
    /// result is only a new downloadable package.
    pub async fn execute_merge(&self, order_ids: &[Uuid]) -> Result<MergeOutcome> {
        let deadline = Duration::from_secs(self.config.timeouts.merge_secs);
        match tokio::time::timeout(deadline, self.execute_merge_inner(order_ids)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "concatenation run exceeded {}s deadline",
                self.config.timeouts.merge_secs
            ))),
        }
    }

    async fn execute_merge_inner(&self, order_ids: &[Uuid]) -> Result<MergeOutcome> {
        if order_ids.is_empty() {
            return Err(Error::Parse("nothing to merge: no orders given".to_string()));
        }

        // Per-job quantities, preserving first-seen job order: the output
        // segment order is the candidate's enumeration order.
        let mut job_quantities: Vec<(Uuid, u32)> = Vec::new();
        for order_id in order_ids {
            let order = self.orders.get(*order_id).await?;
            if !order.state.is_merge_eligible() {
                return Err(Error::InvalidTransition(format!(
                    "order {} in state {} cannot be merged",
                    order.id, order.state
                )));
            }
            match job_quantities.iter_mut().find(|(id, _)| *id == order.job_id) {
                Some((_, quantity)) => *quantity += order.quantity,
                None => job_quantities.push((order.job_id, order.quantity)),
            }
        }

        // Jobs are fetched one at a time to bound peak memory; a single
        // stream can be tens of megabytes before replication.
        let mut base: Option<PackageContent> = None;
        let mut parts = Vec::new();
        for (job_id, quantity) in &job_quantities {
            let job = self.jobs.get(*job_id).await?;
            let bytes = self
                .with_deadline("package download", self.objects.download(&job.package_path))
                .await?;
            let content = read_package(&bytes)?;
            parts.push(ReplicationPart {
                job_id: *job_id,
                source_name: job.package_path.clone(),
                machine_code: content.machine_code.clone(),
                quantity: *quantity,
            });
            if base.is_none() {
                base = Some(content);
            }
        }
        let base = base.ok_or_else(|| {
            Error::Parse("nothing to merge: no readable packages".to_string())
        })?;

        let merged = self.engine.concatenate(&base, &parts)?;

        // Mandatory gate: a merged package that fails the container
        // contract is never surfaced.
        let report = validate(&merged.entries);
        if !report.is_valid {
            return Err(Error::Validation {
                errors: report.errors,
            });
        }

        let artifact_path = format!("merged/{}.gcode.3mf", Uuid::new_v4());
        self.with_deadline(
            "artifact upload",
            self.objects.upload(&artifact_path, &merged.archive),
        )
        .await?;

        let mut warnings = merged.warnings;
        warnings.extend(report.warnings);
        tracing::info!(
            "merged {} orders into '{}' ({} source files, {} warnings)",
            order_ids.len(),
            artifact_path,
            merged.summary.original_files.len(),
            warnings.len()
        );
        Ok(MergeOutcome {
            artifact_path,
            summary: merged.summary,
            warnings,
        })
    }

    /// Apply a lifecycle transition. The `error` transition creates a
    /// compensating reprint order; if persisting that fails, the primary
    /// transition still stands and the failure is only logged.
    pub async fn transition_order(&self, id: Uuid, target: OrderState) -> Result<Order> {
        let order = self.orders.get(id).await?;
        let outcome = apply_transition(order, target, Utc::now())?;
        self.orders.update(outcome.order.clone()).await?;
        tracing::info!("order {} -> {}", id, target);

        if let Some(reprint) = outcome.reprint {
            let reprint_id = reprint.id;
            match self.orders.insert(reprint).await {
                Ok(()) => {
                    tracing::info!("reprint order {} queued for failed order {}", reprint_id, id)
                }
                Err(e) => {
                    tracing::error!("reprint creation failed for order {}: {}", id, e);
                }
            }
        }
        Ok(outcome.order)
    }

    /// Re-derive metadata for every job. Per-item failures are isolated;
    /// the batch keeps going and reports an aggregate.
    pub async fn reanalyze_jobs(&self) -> Result<BatchOutcome> {
        let jobs = self.jobs.list().await?;
        let mut outcome = BatchOutcome::default();
        for mut job in jobs {
            match self.reanalyze_one(&mut job).await {
                Ok(()) => outcome.succeeded += 1,
                Err(e) => {
                    outcome.failed += 1;
                    if outcome.sample_errors.len() < self.config.consolidation.error_sample_cap {
                        outcome.sample_errors.push(format!("job {}: {}", job.id, e));
                    }
                }
            }
        }
        tracing::info!(
            "re-analysis finished: {} succeeded, {} failed",
            outcome.succeeded,
            outcome.failed
        );
        Ok(outcome)
    }

    async fn reanalyze_one(&self, job: &mut Job) -> Result<()> {
        let bytes = self
            .with_deadline("package download", self.objects.download(&job.package_path))
            .await?;
        let content = read_package(&bytes)?;
        let meta = self.extractor.extract(&content);
        self.metadata_cache
            .insert(job.package_path.clone(), meta.clone())
            .await;

        let stats = plate_stats(&content.entries);
        if let Some(weight) = stats.weight_g {
            job.weight_g = weight;
        }
        if let Some(duration) = stats.duration_min {
            job.duration_min = duration;
        }
        if let Some(material) = meta.material_type.or(meta.material_name) {
            job.material = material;
        }
        if let Some(printer_model) = meta.printer_model {
            job.printer_model = printer_model;
        }
        if let Some(profile) = meta.print_profile {
            job.print_profile = profile;
        }
        self.jobs.update(job.clone()).await
    }

    /// Advisory validation of an existing stored package.
    pub async fn validate_package(&self, path: &str) -> Result<ValidationReport> {
        let bytes = self
            .with_deadline("package download", self.objects.download(path))
            .await?;
        let entries = read_entries(&bytes)?;
        Ok(validate(&entries))
    }

    async fn analyze_package(&self, path: &str) -> Result<(PackageContent, SliceMetadata)> {
        let bytes = self
            .with_deadline("package download", self.objects.download(path))
            .await?;
        let content = read_package(&bytes)?;
        let meta = self.extractor.extract(&content);
        self.metadata_cache
            .insert(path.to_string(), meta.clone())
            .await;
        Ok((content, meta))
    }

    async fn with_deadline<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let deadline = Duration::from_secs(self.config.timeouts.storage_secs);
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} exceeded {}s deadline",
                what, self.config.timeouts.storage_secs
            ))),
        }
    }
}
