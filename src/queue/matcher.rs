//! Merge-candidate discovery over the active queue.
//!
//! The matcher is a pure function over loaded rows; the service layer feeds
//! it and handles printer-identity backfill beforehand.

use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::{ConcatenationCandidate, Job, Order};
use crate::printer::PrinterFamily;

/// How a proposal's orders were grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    SameGcode,
    SameMaterial,
}

/// A candidate plus what the operator needs to judge it.
#[derive(Debug, Clone, Serialize)]
pub struct ConcatenationProposal {
    pub kind: ProposalKind,
    pub candidate: ConcatenationCandidate,
    pub description: String,
    pub estimated_minutes: f64,
    pub estimated_grams: f64,
}

/// Bucket label used for orders whose job has no printer identity.
const UNKNOWN_PRINTER: &str = "unknown";

/// Scan the queue and propose merges. Orders whose state is not
/// merge-eligible, or whose job cannot be resolved, are ignored. Proposals
/// appear in discovery order; no ranking is imposed.
///
/// Same-job and same-material groupings are deliberately not disjoint: the
/// same orders can back one proposal of each kind, and the operator picks.
/// Exact duplicates (same kind, same order set) are collapsed.
pub fn propose(orders: &[Order], jobs: &HashMap<Uuid, Job>) -> Vec<ConcatenationProposal> {
    let eligible: Vec<&Order> = orders
        .iter()
        .filter(|o| o.state.is_merge_eligible() && jobs.contains_key(&o.job_id))
        .collect();

    let buckets = partition_by_printer(&eligible, jobs);
    let mut proposals = Vec::new();

    for (printer, bucket) in &buckets {
        if bucket.len() < 2 {
            continue;
        }
        let family = PrinterFamily::from_identifier(printer);
        if !family.driver().supports_merged_plates() {
            continue;
        }
        same_job_groups(printer, family, bucket, jobs, &mut proposals);
        same_material_groups(printer, family, bucket, jobs, &mut proposals, false);
    }
    let grouped = proposals.len();

    // Any single order with quantity > 1 can replicate its own content.
    for &order in &eligible {
        if order.quantity > 1 {
            let job = &jobs[&order.job_id];
            push_unique(
                &mut proposals,
                ConcatenationProposal {
                    kind: ProposalKind::SameGcode,
                    candidate: candidate_for(std::slice::from_ref(&order), jobs, true),
                    description: format!(
                        "replicate order {} content {} times on '{}'",
                        order.id, order.quantity, printer_label(&job.printer_model)
                    ),
                    estimated_minutes: job.duration_min * order.quantity as f64,
                    estimated_grams: job.weight_g * order.quantity as f64,
                },
            );
        }
    }

    // When per-printer grouping found nothing, retry the material grouping
    // across every printer.
    if grouped == 0 {
        same_material_groups(
            "",
            PrinterFamily::Unknown,
            &eligible,
            jobs,
            &mut proposals,
            true,
        );
    }

    proposals
}

/// Partition by printer identity, preserving first-seen printer order so
/// proposal output is stable.
fn partition_by_printer<'a>(
    orders: &[&'a Order],
    jobs: &HashMap<Uuid, Job>,
) -> Vec<(String, Vec<&'a Order>)> {
    let mut buckets: Vec<(String, Vec<&'a Order>)> = Vec::new();
    for &order in orders {
        let printer = printer_label(&jobs[&order.job_id].printer_model);
        match buckets.iter_mut().find(|(p, _)| *p == printer) {
            Some((_, bucket)) => bucket.push(order),
            None => buckets.push((printer, vec![order])),
        }
    }
    buckets
}

fn printer_label(printer_model: &str) -> String {
    let trimmed = printer_model.trim();
    if trimmed.is_empty() {
        UNKNOWN_PRINTER.to_string()
    } else {
        trimmed.to_string()
    }
}

fn same_job_groups(
    printer: &str,
    family: PrinterFamily,
    bucket: &[&Order],
    jobs: &HashMap<Uuid, Job>,
    proposals: &mut Vec<ConcatenationProposal>,
) {
    for (job_id, group) in group_by(bucket, |o| o.job_id) {
        let total: u32 = group.iter().map(|o| o.quantity).sum();
        if total <= 1 {
            continue;
        }
        let job = &jobs[&job_id];
        push_unique(
            proposals,
            ConcatenationProposal {
                kind: ProposalKind::SameGcode,
                candidate: candidate_for(&group, jobs, true),
                description: format!(
                    "{} copies of job {} across {} orders on '{}' ({} family)",
                    total,
                    job_id,
                    group.len(),
                    printer,
                    family.driver().display_name()
                ),
                estimated_minutes: estimate(&group, jobs, |j| j.duration_min),
                estimated_grams: estimate(&group, jobs, |j| j.weight_g),
            },
        );
    }
}

fn same_material_groups(
    printer: &str,
    family: PrinterFamily,
    bucket: &[&Order],
    jobs: &HashMap<Uuid, Job>,
    proposals: &mut Vec<ConcatenationProposal>,
    across_printers: bool,
) {
    let with_material: Vec<&Order> = bucket
        .iter()
        .copied()
        .filter(|o| !jobs[&o.job_id].material.trim().is_empty())
        .collect();
    for (material, group) in group_by(&with_material, |o| jobs[&o.job_id].material.clone()) {
        let total: u32 = group.iter().map(|o| o.quantity).sum();
        if total <= 1 {
            continue;
        }
        // The fallback exists to find cross-printer merges; a one-order
        // group there is just self-replication, which is already proposed.
        if across_printers && group.len() < 2 {
            continue;
        }
        let distinct_jobs: usize = {
            let mut seen = Vec::new();
            for order in &group {
                if !seen.contains(&order.job_id) {
                    seen.push(order.job_id);
                }
            }
            seen.len()
        };
        let where_clause = if across_printers {
            "across all printers".to_string()
        } else {
            format!("on '{}' ({} family)", printer, family.driver().display_name())
        };
        push_unique(
            proposals,
            ConcatenationProposal {
                kind: ProposalKind::SameMaterial,
                candidate: candidate_for(&group, jobs, distinct_jobs == 1),
                description: format!(
                    "{} copies over {} jobs sharing material '{}' {}",
                    total, distinct_jobs, material, where_clause
                ),
                estimated_minutes: estimate(&group, jobs, |j| j.duration_min),
                estimated_grams: estimate(&group, jobs, |j| j.weight_g),
            },
        );
    }
}

/// Group preserving first-seen key order.
fn group_by<'a, K: PartialEq, F: Fn(&Order) -> K>(
    orders: &[&'a Order],
    key: F,
) -> Vec<(K, Vec<&'a Order>)> {
    let mut groups: Vec<(K, Vec<&'a Order>)> = Vec::new();
    for &order in orders {
        let k = key(order);
        match groups.iter_mut().find(|(gk, _)| *gk == k) {
            Some((_, group)) => group.push(order),
            None => groups.push((k, vec![order])),
        }
    }
    groups
}

fn candidate_for(
    group: &[&Order],
    jobs: &HashMap<Uuid, Job>,
    is_same_gcode: bool,
) -> ConcatenationCandidate {
    let mut job_ids = Vec::new();
    for order in group {
        if !job_ids.contains(&order.job_id) {
            job_ids.push(order.job_id);
        }
    }
    let first_job = &jobs[&group[0].job_id];
    ConcatenationCandidate {
        order_ids: group.iter().map(|o| o.id).collect(),
        job_ids,
        printer_model: first_job.printer_model.clone(),
        material: first_job.material.clone(),
        print_profile: first_job.print_profile.clone(),
        total_quantity: group.iter().map(|o| o.quantity).sum(),
        is_same_gcode,
    }
}

fn estimate<F: Fn(&Job) -> f64>(group: &[&Order], jobs: &HashMap<Uuid, Job>, field: F) -> f64 {
    group
        .iter()
        .map(|o| field(&jobs[&o.job_id]) * o.quantity as f64)
        .sum()
}

fn push_unique(proposals: &mut Vec<ConcatenationProposal>, proposal: ConcatenationProposal) {
    let duplicate = proposals.iter().any(|p| {
        p.kind == proposal.kind && p.candidate.order_ids == proposal.candidate.order_ids
    });
    if !duplicate {
        proposals.push(proposal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrderState;
    use chrono::Utc;

    fn job(printer: &str, material: &str) -> Job {
        Job {
            id: Uuid::new_v4(),
            file_id: Uuid::new_v4(),
            package_path: format!("jobs/{}.gcode.3mf", Uuid::new_v4()),
            weight_g: 10.0,
            duration_min: 60.0,
            material: material.to_string(),
            printer_model: printer.to_string(),
            print_profile: "0.20mm Standard".to_string(),
            uploaded_at: Utc::now(),
        }
    }

    fn order(job: &Job, quantity: u32) -> Order {
        let mut order = Order::new(job.id, Uuid::new_v4(), "op".to_string(), quantity, None).unwrap();
        order.state = OrderState::Queued;
        order
    }

    fn jobs_map(jobs: &[&Job]) -> HashMap<Uuid, Job> {
        jobs.iter().map(|j| (j.id, (*j).clone())).collect()
    }

    #[test]
    fn same_job_orders_merge_into_one_proposal() {
        let j = job("X1C", "PLA");
        let a = order(&j, 2);
        let b = order(&j, 3);
        let proposals = propose(&[a.clone(), b.clone()], &jobs_map(&[&j]));

        let same_gcode: Vec<_> = proposals
            .iter()
            .filter(|p| p.kind == ProposalKind::SameGcode && p.candidate.order_ids.len() == 2)
            .collect();
        assert_eq!(same_gcode.len(), 1);
        let p = same_gcode[0];
        assert_eq!(p.candidate.total_quantity, 5);
        assert!(p.candidate.is_same_gcode);
        assert_eq!(p.candidate.job_ids, vec![j.id]);
        assert!((p.estimated_minutes - 300.0).abs() < 1e-9);
        assert!((p.estimated_grams - 50.0).abs() < 1e-9);
    }

    #[test]
    fn single_order_with_quantity_replicates_itself() {
        let j = job("X1C", "PLA");
        let c = order(&j, 4);
        let proposals = propose(&[c.clone()], &jobs_map(&[&j]));
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].kind, ProposalKind::SameGcode);
        assert_eq!(proposals[0].candidate.total_quantity, 4);
        assert_eq!(proposals[0].candidate.order_ids, vec![c.id]);
        assert!(proposals[0].candidate.is_same_gcode);
    }

    #[test]
    fn aggregate_quantity_of_one_is_never_proposed() {
        let j = job("X1C", "PLA");
        let k = job("X1C", "PETG");
        let a = order(&j, 1);
        let b = order(&k, 1);
        // Two different jobs, different materials, one copy each: nothing
        // worth merging by job, and each material group sums to 1.
        let proposals = propose(&[a, b], &jobs_map(&[&j, &k]));
        assert!(proposals.is_empty());
    }

    #[test]
    fn same_material_groups_are_not_disjoint_from_same_job() {
        let j = job("X1C", "PLA");
        let a = order(&j, 2);
        let b = order(&j, 3);
        let proposals = propose(&[a, b], &jobs_map(&[&j]));
        // One same-gcode group proposal, one same-material proposal over
        // the identical order set, plus two self-replication proposals.
        assert!(proposals.iter().any(|p| p.kind == ProposalKind::SameGcode));
        assert!(proposals.iter().any(|p| p.kind == ProposalKind::SameMaterial));
        let material = proposals
            .iter()
            .find(|p| p.kind == ProposalKind::SameMaterial)
            .unwrap();
        assert_eq!(material.candidate.total_quantity, 5);
        assert!(material.candidate.is_same_gcode);
    }

    #[test]
    fn printers_partition_independently() {
        let j1 = job("X1C", "PLA");
        let j2 = job("MK4", "PLA");
        let a = order(&j1, 1);
        let b = order(&j1, 1);
        let c = order(&j2, 1);
        let d = order(&j2, 2);
        let proposals = propose(&[a, b, c, d], &jobs_map(&[&j1, &j2]));
        for p in &proposals {
            let printers: Vec<&str> = p
                .candidate
                .job_ids
                .iter()
                .map(|id| {
                    if *id == j1.id {
                        "X1C"
                    } else {
                        "MK4"
                    }
                })
                .collect();
            assert!(printers.windows(2).all(|w| w[0] == w[1]));
        }
    }

    #[test]
    fn unknown_printer_is_its_own_bucket() {
        let j1 = job("", "PLA");
        let j2 = job("X1C", "PLA");
        let a = order(&j1, 1);
        let b = order(&j1, 1);
        let c = order(&j2, 1);
        let proposals = propose(&[a.clone(), b.clone(), c], &jobs_map(&[&j1, &j2]));
        // The two unknown-printer orders group by material; the lone X1C
        // order cannot join them.
        let material: Vec<_> = proposals
            .iter()
            .filter(|p| p.kind == ProposalKind::SameMaterial)
            .collect();
        assert_eq!(material.len(), 1);
        assert_eq!(material[0].candidate.order_ids, vec![a.id, b.id]);
    }

    #[test]
    fn fallback_regroups_across_printers() {
        let j1 = job("X1C", "PLA");
        let j2 = job("MK4", "PLA");
        let a = order(&j1, 1);
        let b = order(&j2, 1);
        // Each printer bucket has a single order, so per-printer grouping
        // yields nothing and the matcher falls back to material grouping
        // over everything.
        let proposals = propose(&[a.clone(), b.clone()], &jobs_map(&[&j1, &j2]));
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].kind, ProposalKind::SameMaterial);
        assert_eq!(proposals[0].candidate.order_ids, vec![a.id, b.id]);
        assert_eq!(proposals[0].candidate.total_quantity, 2);
        assert!(!proposals[0].candidate.is_same_gcode);
        assert!(proposals[0].description.contains("across all printers"));
    }

    #[test]
    fn ineligible_states_are_ignored() {
        let j = job("X1C", "PLA");
        let mut a = order(&j, 2);
        a.state = OrderState::Processing;
        let mut b = order(&j, 3);
        b.state = OrderState::Delivered;
        assert!(propose(&[a, b], &jobs_map(&[&j])).is_empty());
    }

    #[test]
    fn empty_material_never_groups_by_material() {
        let j1 = job("X1C", "");
        let j2 = job("X1C", "");
        let a = order(&j1, 1);
        let b = order(&j2, 1);
        let proposals = propose(&[a, b], &jobs_map(&[&j1, &j2]));
        assert!(proposals.is_empty());
    }
}
