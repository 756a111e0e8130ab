use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::CallerRole;
use crate::workflows::scoring::EmployeeId;

/// Configuration errors in the org hierarchy or approval chain. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("hierarchy contains a blank employee id")]
    BlankId,
    #[error("{id} is listed as their own subordinate")]
    SelfSupervision { id: EmployeeId },
    #[error("{subordinate} is listed twice under {supervisor}")]
    DuplicateSubordinate {
        supervisor: EmployeeId,
        subordinate: EmployeeId,
    },
    #[error("approval chain has no tiers")]
    EmptyChain,
    #[error("tier '{tier}' lets {role} approve their own submissions")]
    SelfApprovingTier { tier: String, role: CallerRole },
    #[error("role {role} submits in more than one tier")]
    AmbiguousSubmitterRole { role: CallerRole },
    #[error("tier name '{0}' is used twice")]
    DuplicateTier(String),
}

/// Supervisor to subordinate mapping. Read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<EmployeeId, Vec<EmployeeId>>",
    into = "BTreeMap<EmployeeId, Vec<EmployeeId>>"
)]
pub struct OrgHierarchy {
    teams: BTreeMap<EmployeeId, Vec<EmployeeId>>,
}

impl OrgHierarchy {
    pub fn new<I, S, T>(teams: I) -> Result<Self, HierarchyError>
    where
        I: IntoIterator<Item = (S, Vec<T>)>,
        S: Into<EmployeeId>,
        T: Into<EmployeeId>,
    {
        let teams = teams
            .into_iter()
            .map(|(supervisor, members)| {
                (
                    supervisor.into(),
                    members.into_iter().map(Into::into).collect(),
                )
            })
            .collect::<BTreeMap<EmployeeId, Vec<EmployeeId>>>();
        Self::try_from(teams)
    }

    /// Ordered subordinates of `supervisor`; empty when they supervise nobody.
    pub fn subordinates(&self, supervisor: &EmployeeId) -> &[EmployeeId] {
        self.teams
            .get(supervisor)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_supervisor(&self, id: &EmployeeId) -> bool {
        self.teams.contains_key(id)
    }

    pub fn supervises(&self, supervisor: &EmployeeId, subordinate: &EmployeeId) -> bool {
        self.subordinates(supervisor).contains(subordinate)
    }

    pub fn supervisors(&self) -> impl Iterator<Item = &EmployeeId> {
        self.teams.keys()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

impl TryFrom<BTreeMap<EmployeeId, Vec<EmployeeId>>> for OrgHierarchy {
    type Error = HierarchyError;

    fn try_from(teams: BTreeMap<EmployeeId, Vec<EmployeeId>>) -> Result<Self, Self::Error> {
        for (supervisor, members) in &teams {
            if supervisor.is_unknown() {
                return Err(HierarchyError::BlankId);
            }
            for (index, member) in members.iter().enumerate() {
                if member.is_unknown() {
                    return Err(HierarchyError::BlankId);
                }
                if member == supervisor {
                    return Err(HierarchyError::SelfSupervision {
                        id: supervisor.clone(),
                    });
                }
                if members[..index].contains(member) {
                    return Err(HierarchyError::DuplicateSubordinate {
                        supervisor: supervisor.clone(),
                        subordinate: member.clone(),
                    });
                }
            }
        }
        Ok(Self { teams })
    }
}

impl From<OrgHierarchy> for BTreeMap<EmployeeId, Vec<EmployeeId>> {
    fn from(value: OrgHierarchy) -> Self {
        value.teams
    }
}

/// One level of the approval chain: who submits and who signs off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTier {
    pub name: String,
    pub submitter_role: CallerRole,
    pub approver_role: CallerRole,
}

impl ApprovalTier {
    pub fn new(name: &str, submitter_role: CallerRole, approver_role: CallerRole) -> Self {
        Self {
            name: name.to_string(),
            submitter_role,
            approver_role,
        }
    }
}

/// Ordered approval tiers sharing one submit/approve/reject mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalChain {
    tiers: Vec<ApprovalTier>,
}

impl ApprovalChain {
    pub fn new(tiers: Vec<ApprovalTier>) -> Result<Self, HierarchyError> {
        if tiers.is_empty() {
            return Err(HierarchyError::EmptyChain);
        }
        for (index, tier) in tiers.iter().enumerate() {
            if tier.submitter_role == tier.approver_role {
                return Err(HierarchyError::SelfApprovingTier {
                    tier: tier.name.clone(),
                    role: tier.submitter_role,
                });
            }
            let earlier = &tiers[..index];
            if earlier.iter().any(|other| other.name == tier.name) {
                return Err(HierarchyError::DuplicateTier(tier.name.clone()));
            }
            if earlier
                .iter()
                .any(|other| other.submitter_role == tier.submitter_role)
            {
                return Err(HierarchyError::AmbiguousSubmitterRole {
                    role: tier.submitter_role,
                });
            }
        }
        Ok(Self { tiers })
    }

    /// Team leads rate analysts for the head of function; the head of function rates
    /// team leads for the senior approver.
    pub fn two_tier() -> Self {
        Self {
            tiers: vec![
                ApprovalTier::new("team_lead", CallerRole::TeamLead, CallerRole::HeadOfFunction),
                ApprovalTier::new(
                    "head_of_function",
                    CallerRole::HeadOfFunction,
                    CallerRole::SeniorApprover,
                ),
            ],
        }
    }

    pub fn tiers(&self) -> &[ApprovalTier] {
        &self.tiers
    }

    pub fn tier_for_submitter(&self, role: CallerRole) -> Option<&ApprovalTier> {
        self.tiers.iter().find(|tier| tier.submitter_role == role)
    }

    pub fn tier(&self, name: &str) -> Option<&ApprovalTier> {
        self.tiers.iter().find(|tier| tier.name == name)
    }

    pub fn approves_any(&self, role: CallerRole) -> bool {
        self.tiers.iter().any(|tier| tier.approver_role == role)
    }
}

impl Default for ApprovalChain {
    fn default() -> Self {
        Self::two_tier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> OrgHierarchy {
        OrgHierarchy::new([
            ("lead.east", vec!["amir.k", "nadia.f"]),
            ("head.ops", vec!["lead.east"]),
        ])
        .expect("valid hierarchy")
    }

    #[test]
    fn subordinates_are_looked_up_case_insensitively() {
        let hierarchy = hierarchy();
        let members = hierarchy.subordinates(&EmployeeId::new("LEAD.EAST"));
        assert_eq!(members, &[EmployeeId::new("AMIR.K"), EmployeeId::new("NADIA.F")]);
        assert!(hierarchy.supervises(&EmployeeId::new("head.ops"), &EmployeeId::new("lead.east")));
        assert!(hierarchy.subordinates(&EmployeeId::new("amir.k")).is_empty());
    }

    #[test]
    fn self_supervision_is_rejected() {
        let error = OrgHierarchy::new([("lead.east", vec!["LEAD.EAST"])]).expect_err("invalid");
        assert!(matches!(error, HierarchyError::SelfSupervision { .. }));
    }

    #[test]
    fn duplicate_subordinates_are_rejected() {
        let error =
            OrgHierarchy::new([("lead.east", vec!["amir.k", "Amir.K"])]).expect_err("invalid");
        assert!(matches!(error, HierarchyError::DuplicateSubordinate { .. }));
    }

    #[test]
    fn blank_ids_are_rejected() {
        let error = OrgHierarchy::new([("lead.east", vec!["  "])]).expect_err("invalid");
        assert_eq!(error, HierarchyError::BlankId);
    }

    #[test]
    fn hierarchy_deserializes_with_validation() {
        let parsed: OrgHierarchy =
            serde_json::from_str(r#"{"lead.east": ["amir.k"]}"#).expect("valid json");
        assert!(parsed.supervises(&EmployeeId::new("LEAD.EAST"), &EmployeeId::new("AMIR.K")));

        let invalid = serde_json::from_str::<OrgHierarchy>(r#"{"lead.east": ["lead.east"]}"#);
        assert!(invalid.is_err());
    }

    #[test]
    fn chain_rejects_ambiguous_submitters() {
        let error = ApprovalChain::new(vec![
            ApprovalTier::new("a", CallerRole::TeamLead, CallerRole::HeadOfFunction),
            ApprovalTier::new("b", CallerRole::TeamLead, CallerRole::SeniorApprover),
        ])
        .expect_err("ambiguous");
        assert_eq!(
            error,
            HierarchyError::AmbiguousSubmitterRole {
                role: CallerRole::TeamLead
            }
        );
    }

    #[test]
    fn chain_rejects_self_approval() {
        let error = ApprovalChain::new(vec![ApprovalTier::new(
            "a",
            CallerRole::TeamLead,
            CallerRole::TeamLead,
        )])
        .expect_err("self approving");
        assert!(matches!(error, HierarchyError::SelfApprovingTier { .. }));
    }

    #[test]
    fn two_tier_chain_routes_roles() {
        let chain = ApprovalChain::two_tier();
        assert_eq!(
            chain
                .tier_for_submitter(CallerRole::HeadOfFunction)
                .map(|tier| tier.approver_role),
            Some(CallerRole::SeniorApprover)
        );
        assert!(chain.approves_any(CallerRole::HeadOfFunction));
        assert!(!chain.approves_any(CallerRole::Admin));
        assert!(chain.tier_for_submitter(CallerRole::Analyst).is_none());
    }
}
