//! Capacity planning: distributes estimated work over the declared hours of
//! each team member.
//!
//! Every strategy is a greedy pass over the work items in descending effort
//! order (ties by issue key). A work item may be split: whatever the preferred
//! member cannot absorb spills over to the next member in that strategy's
//! preference order. A member is never given more than their available hours.

use crate::engine::status::{StatusCategory, StatusMap};
use crate::errors::{Result, SprintLensError};
use crate::models::Issue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const EPSILON: f64 = 1e-9;

pub const DEFAULT_HOURLY_RATE: f64 = 100.0;

const LOW_UTILIZATION_RATE: f64 = 0.7;
const HIGH_UTILIZATION_RATE: f64 = 0.95;
const MIN_SATISFACTION_RATE: f64 = 0.9;
const LOW_EFFICIENCY_SCORE: f64 = 0.6;
const HIGH_TOTAL_COST: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityStrategy {
    #[default]
    LoadBalance,
    CostOptimize,
    EfficiencyMax,
}

impl CapacityStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityStrategy::LoadBalance => "load-balance",
            CapacityStrategy::CostOptimize => "cost-optimize",
            CapacityStrategy::EfficiencyMax => "efficiency-max",
        }
    }
}

impl fmt::Display for CapacityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapacityStrategy {
    type Err = SprintLensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "load-balance" | "load-balancing" => Ok(CapacityStrategy::LoadBalance),
            "cost-optimize" | "cost-optimization" => Ok(CapacityStrategy::CostOptimize),
            "efficiency-max" | "efficiency-maximization" => Ok(CapacityStrategy::EfficiencyMax),
            other => Err(SprintLensError::ConfigurationError(format!(
                "unknown capacity strategy '{}' (expected load-balance, cost-optimize or efficiency-max)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: String,
    pub available_hours: f64,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkItem {
    pub issue_key: String,
    pub issue_type: String,
    pub effort_hours: f64,
}

/// Historical completion rate (0..=1) per member, per issue type.
pub type EfficiencyScores = HashMap<String, HashMap<String, f64>>;

#[derive(Debug, Clone, PartialEq)]
pub struct CapacityOptions {
    pub strategy: CapacityStrategy,
    /// Percentage by which demand may exceed capacity before the allocation
    /// is rejected outright.
    pub overflow_tolerance_pct: f64,
    pub default_hourly_rate: f64,
}

impl Default for CapacityOptions {
    fn default() -> Self {
        Self {
            strategy: CapacityStrategy::default(),
            overflow_tolerance_pct: 0.0,
            default_hourly_rate: DEFAULT_HOURLY_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub issue_key: String,
    pub hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberAllocation {
    pub member_id: String,
    pub available_hours: f64,
    pub assigned_hours: f64,
    pub utilization_percentage: f64,
    pub hourly_rate: f64,
    pub cost: f64,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityAllocation {
    pub strategy: CapacityStrategy,
    pub members: Vec<MemberAllocation>,
    pub unallocated: Vec<Assignment>,
    pub total_demand_hours: f64,
    pub total_capacity_hours: f64,
    pub total_cost: f64,
}

impl CapacityAllocation {
    pub fn unallocated_hours(&self) -> f64 {
        self.unallocated.iter().map(|a| a.hours).sum()
    }
}

/// Health figures of an allocation plus plain-language advice derived from
/// fixed thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanAssessment {
    /// Assigned hours over available hours, 0..=1.
    pub utilization_rate: f64,
    /// Placed demand over total demand, 0..=1.
    pub satisfaction_rate: f64,
    /// Mean completion history of the members over the issue types they
    /// received; absent when none of the assignments has history.
    pub average_efficiency: Option<f64>,
    pub total_cost: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityPlan {
    #[serde(flatten)]
    pub allocation: CapacityAllocation,
    pub assessment: PlanAssessment,
}

struct Slot<'a> {
    member: &'a TeamMember,
    rate: f64,
    remaining: f64,
    assignments: Vec<Assignment>,
}

pub fn allocate(
    members: &[TeamMember],
    items: &[WorkItem],
    options: &CapacityOptions,
    scores: &EfficiencyScores,
) -> Result<CapacityAllocation> {
    validate(members, items, options)?;

    let total_capacity_hours: f64 = members.iter().map(|m| m.available_hours).sum();
    let total_demand_hours: f64 = items.iter().map(|i| i.effort_hours).sum();
    let ceiling = total_capacity_hours * (1.0 + options.overflow_tolerance_pct / 100.0);
    if total_demand_hours > ceiling + EPSILON {
        return Err(SprintLensError::CapacityExceeded {
            demand_hours: total_demand_hours,
            capacity_hours: total_capacity_hours,
            tolerance_pct: options.overflow_tolerance_pct,
        });
    }

    let mut slots: Vec<Slot> = members
        .iter()
        .map(|member| Slot {
            member,
            rate: member.hourly_rate.unwrap_or(options.default_hourly_rate),
            remaining: member.available_hours,
            assignments: Vec::new(),
        })
        .collect();

    let mut ordered: Vec<&WorkItem> = items.iter().collect();
    ordered.sort_by(|a, b| {
        b.effort_hours
            .total_cmp(&a.effort_hours)
            .then_with(|| a.issue_key.cmp(&b.issue_key))
    });

    let mut unallocated = Vec::new();
    for item in ordered {
        let preference = match options.strategy {
            CapacityStrategy::LoadBalance => load_balance_order(&slots),
            CapacityStrategy::CostOptimize => cost_order(&slots),
            CapacityStrategy::EfficiencyMax => efficiency_order(&slots, item, scores),
        };
        let leftover = place(&mut slots, &preference, item);
        if leftover > EPSILON || (preference.is_empty() && item.effort_hours <= EPSILON) {
            unallocated.push(Assignment {
                issue_key: item.issue_key.clone(),
                hours: leftover,
            });
        }
    }

    let members: Vec<MemberAllocation> = slots
        .into_iter()
        .map(|slot| {
            let available = slot.member.available_hours;
            let assigned = available - slot.remaining;
            MemberAllocation {
                member_id: slot.member.id.clone(),
                available_hours: available,
                assigned_hours: assigned,
                utilization_percentage: if available > 0.0 {
                    assigned / available * 100.0
                } else {
                    0.0
                },
                hourly_rate: slot.rate,
                cost: assigned * slot.rate,
                assignments: slot.assignments,
            }
        })
        .collect();
    let total_cost = members.iter().map(|m| m.cost).sum();

    debug!(
        strategy = %options.strategy,
        demand = total_demand_hours,
        capacity = total_capacity_hours,
        unallocated = unallocated.len(),
        "capacity allocation computed"
    );

    Ok(CapacityAllocation {
        strategy: options.strategy,
        members,
        unallocated,
        total_demand_hours,
        total_capacity_hours,
        total_cost,
    })
}

/// Gives `item` to the slots in `preference` order, splitting across members
/// as needed. Returns the hours nobody could take.
fn place(slots: &mut [Slot], preference: &[usize], item: &WorkItem) -> f64 {
    if item.effort_hours <= EPSILON {
        if let Some(&first) = preference.first() {
            slots[first].assignments.push(Assignment {
                issue_key: item.issue_key.clone(),
                hours: 0.0,
            });
        }
        return 0.0;
    }

    let mut need = item.effort_hours;
    for &index in preference {
        if need <= EPSILON {
            break;
        }
        let slot = &mut slots[index];
        if slot.remaining <= EPSILON {
            continue;
        }
        let hours = if need >= slot.remaining {
            let hours = slot.remaining;
            slot.remaining = 0.0;
            hours
        } else {
            slot.remaining -= need;
            need
        };
        need -= hours;
        slot.assignments.push(Assignment {
            issue_key: item.issue_key.clone(),
            hours,
        });
    }
    need.max(0.0)
}

fn load_balance_order(slots: &[Slot]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..slots.len()).collect();
    order.sort_by(|&a, &b| by_free_capacity(&slots[a], &slots[b]));
    order
}

fn by_free_capacity(a: &Slot, b: &Slot) -> Ordering {
    b.remaining
        .total_cmp(&a.remaining)
        .then_with(|| a.member.id.cmp(&b.member.id))
}

/// Cheapest first. A greedy heuristic, not an optimal cost matching.
fn cost_order(slots: &[Slot]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..slots.len()).collect();
    order.sort_by(|&a, &b| {
        slots[a]
            .rate
            .total_cmp(&slots[b].rate)
            .then_with(|| slots[a].member.id.cmp(&slots[b].member.id))
    });
    order
}

/// Members with a recorded completion rate for the item's type come first,
/// best rate first; everyone else follows in load-balance order.
fn efficiency_order(slots: &[Slot], item: &WorkItem, scores: &EfficiencyScores) -> Vec<usize> {
    let score_of = |slot: &Slot| {
        scores
            .get(&slot.member.id)
            .and_then(|by_type| by_type.get(&item.issue_type))
            .copied()
    };

    let (mut scored, mut unscored): (Vec<usize>, Vec<usize>) =
        (0..slots.len()).partition(|&i| score_of(&slots[i]).is_some());

    scored.sort_by(|&a, &b| {
        let (sa, sb) = (score_of(&slots[a]), score_of(&slots[b]));
        sb.unwrap_or(0.0)
            .total_cmp(&sa.unwrap_or(0.0))
            .then_with(|| by_free_capacity(&slots[a], &slots[b]))
    });
    unscored.sort_by(|&a, &b| by_free_capacity(&slots[a], &slots[b]));

    scored.extend(unscored);
    scored
}

fn validate(members: &[TeamMember], items: &[WorkItem], options: &CapacityOptions) -> Result<()> {
    let tolerance = options.overflow_tolerance_pct;
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(SprintLensError::InvalidInput(format!(
            "overflow tolerance must be a non-negative percentage, got {}",
            tolerance
        )));
    }
    if !options.default_hourly_rate.is_finite() || options.default_hourly_rate < 0.0 {
        return Err(SprintLensError::InvalidInput(format!(
            "default hourly rate must be non-negative, got {}",
            options.default_hourly_rate
        )));
    }

    let mut seen = HashSet::new();
    for member in members {
        if !seen.insert(member.id.as_str()) {
            return Err(SprintLensError::InvalidInput(format!(
                "team member '{}' is declared twice",
                member.id
            )));
        }
        if !member.available_hours.is_finite() || member.available_hours < 0.0 {
            return Err(SprintLensError::InvalidInput(format!(
                "team member '{}' has invalid available hours {}",
                member.id, member.available_hours
            )));
        }
        if let Some(rate) = member.hourly_rate {
            if !rate.is_finite() || rate < 0.0 {
                return Err(SprintLensError::InvalidInput(format!(
                    "team member '{}' has invalid hourly rate {}",
                    member.id, rate
                )));
            }
        }
    }

    for item in items {
        if !item.effort_hours.is_finite() || item.effort_hours < 0.0 {
            return Err(SprintLensError::InvalidInput(format!(
                "issue {} has invalid effort {}",
                item.issue_key, item.effort_hours
            )));
        }
    }
    Ok(())
}

pub fn assess(
    allocation: &CapacityAllocation,
    items: &[WorkItem],
    scores: &EfficiencyScores,
) -> PlanAssessment {
    let assigned: f64 = allocation.members.iter().map(|m| m.assigned_hours).sum();
    let utilization_rate = if allocation.total_capacity_hours > EPSILON {
        assigned / allocation.total_capacity_hours
    } else {
        0.0
    };
    let satisfaction_rate = if allocation.total_demand_hours > EPSILON {
        1.0 - allocation.unallocated_hours() / allocation.total_demand_hours
    } else {
        1.0
    };

    let types: HashMap<&str, &str> = items
        .iter()
        .map(|i| (i.issue_key.as_str(), i.issue_type.as_str()))
        .collect();
    let known: Vec<f64> = allocation
        .members
        .iter()
        .flat_map(|member| {
            member.assignments.iter().filter_map(|assignment| {
                let issue_type = types.get(assignment.issue_key.as_str())?;
                scores.get(&member.member_id)?.get(*issue_type).copied()
            })
        })
        .collect();
    let average_efficiency = if known.is_empty() {
        None
    } else {
        Some(known.iter().sum::<f64>() / known.len() as f64)
    };

    let mut recommendations = Vec::new();
    if allocation.total_capacity_hours > EPSILON {
        if utilization_rate < LOW_UTILIZATION_RATE {
            recommendations.push(
                "Consider increasing resource utilization to improve efficiency".to_string(),
            );
        } else if utilization_rate > HIGH_UTILIZATION_RATE {
            recommendations.push(
                "High utilization detected - consider adding more resources to prevent bottlenecks"
                    .to_string(),
            );
        }
    }
    if satisfaction_rate < MIN_SATISFACTION_RATE {
        recommendations
            .push("Not all sprint work can be covered by the current team".to_string());
    }
    if average_efficiency.is_some_and(|score| score < LOW_EFFICIENCY_SCORE) {
        recommendations.push(
            "Low efficiency scores detected - review member and issue type assignments".to_string(),
        );
    }
    if allocation.total_cost > HIGH_TOTAL_COST {
        recommendations.push("High total cost - consider cost optimization strategies".to_string());
    }

    PlanAssessment {
        utilization_rate,
        satisfaction_rate,
        average_efficiency,
        total_cost: allocation.total_cost,
        recommendations,
    }
}

/// Open issues as work items. Effort is the remaining estimate when the
/// tracker has one, else story points times `hours_per_point`, else zero.
pub fn work_items_from_issues(
    issues: &[Issue],
    statuses: &StatusMap,
    hours_per_point: f64,
) -> Result<Vec<WorkItem>> {
    if !hours_per_point.is_finite() || hours_per_point < 0.0 {
        return Err(SprintLensError::InvalidInput(format!(
            "hours per story point must be non-negative, got {}",
            hours_per_point
        )));
    }

    let mut items = Vec::new();
    for issue in issues {
        if statuses.classify(&issue.status)? == StatusCategory::Done {
            continue;
        }
        items.push(WorkItem {
            issue_key: issue.key.clone(),
            issue_type: issue.issue_type.clone(),
            effort_hours: estimated_effort_hours(issue, hours_per_point),
        });
    }
    Ok(items)
}

pub fn estimated_effort_hours(issue: &Issue, hours_per_point: f64) -> f64 {
    issue
        .remaining_estimate_hours()
        .or_else(|| issue.story_points.map(|points| points * hours_per_point))
        .unwrap_or(0.0)
}

/// Share of each assignee's issues, per issue type, that reached Done.
pub fn completion_history(issues: &[Issue], statuses: &StatusMap) -> Result<EfficiencyScores> {
    let mut tallies: BTreeMap<(String, String), (u32, u32)> = BTreeMap::new();
    for issue in issues {
        let Some(assignee) = issue.assignee.as_ref() else {
            continue;
        };
        let done = statuses.classify(&issue.status)? == StatusCategory::Done;
        let tally = tallies
            .entry((assignee.clone(), issue.issue_type.clone()))
            .or_insert((0, 0));
        tally.1 += 1;
        if done {
            tally.0 += 1;
        }
    }

    let mut scores = EfficiencyScores::new();
    for ((assignee, issue_type), (done, total)) in tallies {
        scores
            .entry(assignee)
            .or_default()
            .insert(issue_type, f64::from(done) / f64::from(total));
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::issue::fixtures::issue;
    use proptest::prelude::*;

    fn member(id: &str, hours: f64) -> TeamMember {
        TeamMember {
            id: id.to_string(),
            available_hours: hours,
            hourly_rate: None,
        }
    }

    fn item(key: &str, hours: f64) -> WorkItem {
        WorkItem {
            issue_key: key.to_string(),
            issue_type: "Story".to_string(),
            effort_hours: hours,
        }
    }

    fn options(strategy: CapacityStrategy) -> CapacityOptions {
        CapacityOptions {
            strategy,
            ..CapacityOptions::default()
        }
    }

    fn keys(allocation: &MemberAllocation) -> Vec<(&str, f64)> {
        allocation
            .assignments
            .iter()
            .map(|a| (a.issue_key.as_str(), a.hours))
            .collect()
    }

    #[test]
    fn test_load_balance_fills_exact_capacity() {
        let team = vec![member("A", 10.0), member("B", 5.0)];
        let items = vec![item("I1", 8.0), item("I2", 4.0), item("I3", 3.0)];

        let result = allocate(
            &team,
            &items,
            &options(CapacityStrategy::LoadBalance),
            &EfficiencyScores::new(),
        )
        .unwrap();

        assert!(result.unallocated.is_empty());
        assert_eq!(keys(&result.members[0]), vec![("I1", 8.0), ("I3", 2.0)]);
        assert_eq!(keys(&result.members[1]), vec![("I2", 4.0), ("I3", 1.0)]);
        assert_eq!(result.members[0].assigned_hours, 10.0);
        assert_eq!(result.members[1].utilization_percentage, 100.0);
    }

    #[test]
    fn test_load_balance_tie_goes_to_lowest_member_id() {
        let team = vec![member("zoe", 8.0), member("amy", 8.0)];
        let result = allocate(
            &team,
            &[item("I1", 2.0)],
            &options(CapacityStrategy::LoadBalance),
            &EfficiencyScores::new(),
        )
        .unwrap();
        assert!(result.members[0].assignments.is_empty());
        assert_eq!(keys(&result.members[1]), vec![("I1", 2.0)]);
    }

    #[test]
    fn test_demand_beyond_capacity_is_rejected() {
        let team = vec![member("A", 10.0), member("B", 5.0)];
        let items = vec![item("I1", 12.0), item("I2", 8.0)];

        for strategy in [
            CapacityStrategy::LoadBalance,
            CapacityStrategy::CostOptimize,
            CapacityStrategy::EfficiencyMax,
        ] {
            let err = allocate(&team, &items, &options(strategy), &EfficiencyScores::new())
                .unwrap_err();
            assert!(matches!(
                err,
                SprintLensError::CapacityExceeded { demand_hours, capacity_hours, .. }
                    if demand_hours == 20.0 && capacity_hours == 15.0
            ));
        }
    }

    #[test]
    fn test_tolerance_allows_overflow_and_reports_remainder() {
        let team = vec![member("A", 10.0), member("B", 5.0)];
        let items = vec![item("I1", 12.0), item("I2", 6.0)];
        let opts = CapacityOptions {
            overflow_tolerance_pct: 20.0,
            ..CapacityOptions::default()
        };

        let result = allocate(&team, &items, &opts, &EfficiencyScores::new()).unwrap();

        assert_eq!(result.unallocated_hours(), 3.0);
        assert_eq!(result.unallocated.len(), 1);
        assert_eq!(result.unallocated[0].issue_key, "I2");
        assert!(result.members.iter().all(|m| m.assigned_hours <= m.available_hours));
    }

    #[test]
    fn test_cost_optimize_prefers_cheapest_member() {
        let team = vec![
            TeamMember {
                id: "senior".to_string(),
                available_hours: 20.0,
                hourly_rate: Some(150.0),
            },
            TeamMember {
                id: "junior".to_string(),
                available_hours: 6.0,
                hourly_rate: Some(60.0),
            },
            member("contractor", 10.0),
        ];
        let items = vec![item("I1", 10.0), item("I2", 4.0)];

        let result = allocate(
            &team,
            &items,
            &options(CapacityStrategy::CostOptimize),
            &EfficiencyScores::new(),
        )
        .unwrap();

        // junior (60) fills first, then contractor at the default rate (100)
        assert_eq!(keys(&result.members[1]), vec![("I1", 6.0)]);
        assert_eq!(keys(&result.members[2]), vec![("I1", 4.0), ("I2", 4.0)]);
        assert!(result.members[0].assignments.is_empty());
        assert_eq!(result.total_cost, 6.0 * 60.0 + 8.0 * 100.0);
    }

    #[test]
    fn test_efficiency_prefers_best_history_for_issue_type() {
        let team = vec![member("A", 10.0), member("B", 10.0)];
        let items = vec![
            WorkItem {
                issue_key: "BUG-1".to_string(),
                issue_type: "Bug".to_string(),
                effort_hours: 4.0,
            },
            item("STORY-1", 5.0),
        ];
        let mut scores = EfficiencyScores::new();
        scores.entry("B".to_string()).or_default().insert("Bug".to_string(), 0.9);
        scores.entry("A".to_string()).or_default().insert("Bug".to_string(), 0.4);

        let result = allocate(
            &team,
            &items,
            &options(CapacityStrategy::EfficiencyMax),
            &scores,
        )
        .unwrap();

        // STORY-1 has no history and is placed first (larger effort) by load balance
        assert_eq!(keys(&result.members[0]), vec![("STORY-1", 5.0)]);
        assert_eq!(keys(&result.members[1]), vec![("BUG-1", 4.0)]);
    }

    #[test]
    fn test_efficiency_without_history_matches_load_balance() {
        let team = vec![member("A", 10.0), member("B", 5.0)];
        let items = vec![item("I1", 8.0), item("I2", 4.0), item("I3", 3.0)];
        let none = EfficiencyScores::new();

        let balanced =
            allocate(&team, &items, &options(CapacityStrategy::LoadBalance), &none).unwrap();
        let efficient =
            allocate(&team, &items, &options(CapacityStrategy::EfficiencyMax), &none).unwrap();

        assert_eq!(balanced.members, efficient.members);
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let none = EfficiencyScores::new();
        let opts = CapacityOptions::default();

        let err = allocate(&[member("A", -1.0)], &[], &opts, &none).unwrap_err();
        assert!(matches!(err, SprintLensError::InvalidInput(_)));

        let err = allocate(&[member("A", 1.0), member("A", 2.0)], &[], &opts, &none).unwrap_err();
        assert!(matches!(err, SprintLensError::InvalidInput(_)));

        let err = allocate(&[member("A", 1.0)], &[item("I1", -2.0)], &opts, &none).unwrap_err();
        assert!(matches!(err, SprintLensError::InvalidInput(_)));

        let negative_tolerance = CapacityOptions {
            overflow_tolerance_pct: -5.0,
            ..CapacityOptions::default()
        };
        let err = allocate(&[member("A", 1.0)], &[], &negative_tolerance, &none).unwrap_err();
        assert!(matches!(err, SprintLensError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_team_with_no_work_is_fine() {
        let result = allocate(&[], &[], &CapacityOptions::default(), &EfficiencyScores::new())
            .unwrap();
        assert!(result.members.is_empty());
        assert!(result.unallocated.is_empty());
    }

    #[test]
    fn test_zero_capacity_member_has_zero_utilization() {
        let result = allocate(
            &[member("A", 0.0), member("B", 4.0)],
            &[item("I1", 4.0)],
            &CapacityOptions::default(),
            &EfficiencyScores::new(),
        )
        .unwrap();
        assert_eq!(result.members[0].utilization_percentage, 0.0);
        assert_eq!(result.members[1].utilization_percentage, 100.0);
    }

    #[test]
    fn test_assessment_of_a_balanced_plan_has_no_advice() {
        let members = vec![member("A", 10.0), member("B", 5.0)];
        let items = vec![item("I1", 8.0), item("I2", 4.0), item("I3", 2.5)];
        let allocation = allocate(
            &members,
            &items,
            &options(CapacityStrategy::LoadBalance),
            &EfficiencyScores::new(),
        )
        .unwrap();

        let assessment = assess(&allocation, &items, &EfficiencyScores::new());

        assert!((assessment.utilization_rate - 14.5 / 15.0).abs() < 1e-9);
        assert_eq!(assessment.satisfaction_rate, 1.0);
        assert_eq!(assessment.average_efficiency, None);
        assert_eq!(
            assessment.recommendations,
            vec!["High utilization detected - consider adding more resources to prevent bottlenecks"]
        );
    }

    #[test]
    fn test_assessment_flags_idle_team_and_weak_history() {
        let members = vec![member("A", 40.0)];
        let items = vec![item("I1", 8.0)];
        let mut scores = EfficiencyScores::new();
        scores
            .entry("A".to_string())
            .or_default()
            .insert("Story".to_string(), 0.25);
        let allocation =
            allocate(&members, &items, &options(CapacityStrategy::EfficiencyMax), &scores).unwrap();

        let assessment = assess(&allocation, &items, &scores);

        assert_eq!(assessment.utilization_rate, 0.2);
        assert_eq!(assessment.average_efficiency, Some(0.25));
        assert_eq!(assessment.recommendations.len(), 2);
        assert!(assessment.recommendations[0].starts_with("Consider increasing resource utilization"));
        assert!(assessment.recommendations[1].starts_with("Low efficiency scores"));
    }

    #[test]
    fn test_assessment_flags_uncovered_work_and_cost() {
        let members = vec![TeamMember {
            id: "A".to_string(),
            available_hours: 10.0,
            hourly_rate: Some(200_000.0),
        }];
        let items = vec![item("I1", 20.0)];
        let opts = CapacityOptions {
            overflow_tolerance_pct: 100.0,
            ..options(CapacityStrategy::CostOptimize)
        };
        let allocation = allocate(&members, &items, &opts, &EfficiencyScores::new()).unwrap();

        let assessment = assess(&allocation, &items, &EfficiencyScores::new());

        assert_eq!(assessment.satisfaction_rate, 0.5);
        assert!(assessment
            .recommendations
            .iter()
            .any(|r| r == "Not all sprint work can be covered by the current team"));
        assert!(assessment
            .recommendations
            .iter()
            .any(|r| r == "High total cost - consider cost optimization strategies"));
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("load-balance".parse::<CapacityStrategy>().unwrap(), CapacityStrategy::LoadBalance);
        assert_eq!("cost_optimize".parse::<CapacityStrategy>().unwrap(), CapacityStrategy::CostOptimize);
        assert_eq!("Efficiency-Max".parse::<CapacityStrategy>().unwrap(), CapacityStrategy::EfficiencyMax);
        let err = "round-robin".parse::<CapacityStrategy>().unwrap_err();
        assert!(matches!(err, SprintLensError::ConfigurationError(_)));
    }

    #[test]
    fn test_work_items_skip_done_and_prefer_remaining_estimate() {
        let mut estimated = issue("PROJ-1", "In Progress", Some(3.0));
        estimated.remaining_estimate_seconds = Some(2 * 3600);
        let pointed = issue("PROJ-2", "To Do", Some(2.0));
        let bare = issue("PROJ-3", "To Do", None);
        let finished = issue("PROJ-4", "Done", Some(8.0));

        let items = work_items_from_issues(
            &[estimated, pointed, bare, finished],
            &StatusMap::default(),
            8.0,
        )
        .unwrap();

        let efforts: Vec<(&str, f64)> = items
            .iter()
            .map(|i| (i.issue_key.as_str(), i.effort_hours))
            .collect();
        assert_eq!(efforts, vec![("PROJ-1", 2.0), ("PROJ-2", 16.0), ("PROJ-3", 0.0)]);
    }

    #[test]
    fn test_completion_history_ratio_per_type() {
        let mut a = issue("PROJ-1", "Done", None);
        a.assignee = Some("alice".to_string());
        let mut b = issue("PROJ-2", "In Progress", None);
        b.assignee = Some("alice".to_string());
        let mut c = issue("PROJ-3", "Done", None);
        c.assignee = Some("alice".to_string());
        c.issue_type = "Bug".to_string();
        let unassigned = issue("PROJ-4", "Done", None);

        let scores = completion_history(&[a, b, c, unassigned], &StatusMap::default()).unwrap();
        assert_eq!(scores["alice"]["Story"], 0.5);
        assert_eq!(scores["alice"]["Bug"], 1.0);
        assert_eq!(scores.len(), 1);
    }

    fn strategy_strategy() -> impl Strategy<Value = CapacityStrategy> {
        prop_oneof![
            Just(CapacityStrategy::LoadBalance),
            Just(CapacityStrategy::CostOptimize),
            Just(CapacityStrategy::EfficiencyMax),
        ]
    }

    proptest! {
        #[test]
        fn prop_no_member_exceeds_available_hours(
            hours in prop::collection::vec((0u32..40, prop::option::of(20u32..200)), 1..6),
            efforts in prop::collection::vec(0u32..30, 0..12),
            tolerance in 0u32..60,
            strategy in strategy_strategy(),
        ) {
            let team: Vec<TeamMember> = hours
                .iter()
                .enumerate()
                .map(|(i, (h, rate))| TeamMember {
                    id: format!("m{}", i),
                    available_hours: f64::from(*h),
                    hourly_rate: rate.map(f64::from),
                })
                .collect();
            let items: Vec<WorkItem> = efforts
                .iter()
                .enumerate()
                .map(|(i, e)| item(&format!("I{}", i), f64::from(*e) * 0.5))
                .collect();
            let mut scores = EfficiencyScores::new();
            scores.entry("m0".to_string()).or_default().insert("Story".to_string(), 0.8);

            let opts = CapacityOptions {
                strategy,
                overflow_tolerance_pct: f64::from(tolerance),
                ..CapacityOptions::default()
            };

            let capacity: f64 = team.iter().map(|m| m.available_hours).sum();
            let demand: f64 = items.iter().map(|i| i.effort_hours).sum();

            match allocate(&team, &items, &opts, &scores) {
                Ok(result) => {
                    for m in &result.members {
                        prop_assert!(m.assigned_hours <= m.available_hours);
                        let summed: f64 = m.assignments.iter().map(|a| a.hours).sum();
                        prop_assert!(summed <= m.available_hours + 1e-6);
                    }
                    let placed: f64 = result.members.iter().map(|m| m.assigned_hours).sum();
                    prop_assert!((placed + result.unallocated_hours() - demand).abs() < 1e-6);
                    if demand <= capacity {
                        prop_assert!(result.unallocated_hours() < 1e-6);
                    }
                }
                Err(SprintLensError::CapacityExceeded { .. }) => {
                    prop_assert!(demand > capacity * (1.0 + f64::from(tolerance) / 100.0));
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }
    }
}
