use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::WorkflowRules;
use crate::domain::request::{ApprovalRole, OrgId, Priority};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    ItemClaim,
    EvidenceReview,
    OrgTransfer,
}

/// A finder or owner claiming a found item back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemClaimPayload {
    pub item_description: String,
    pub declared_value: Decimal,
    pub claim_details: String,
    pub identifying_features: String,
    pub proof_description: String,
    pub photo_reference: Option<String>,
}

/// A request to run a found item past the police evidence desk,
/// typically a stolen-property check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePayload {
    pub item_description: String,
    pub serial_number: Option<String>,
    pub alternate_identifier: Option<String>,
    pub stolen_check: bool,
    pub case_reference: Option<String>,
}

/// A handoff of custody between organizations, e.g. transit to university.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub item_description: String,
    pub origin_org: OrgId,
    pub destination_org: OrgId,
    pub justification: String,
    pub manifest_reference: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestPayload {
    ItemClaim(ItemClaimPayload),
    EvidenceReview(EvidencePayload),
    OrgTransfer(TransferPayload),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::ItemClaim(_) => RequestKind::ItemClaim,
            Self::EvidenceReview(_) => RequestKind::EvidenceReview,
            Self::OrgTransfer(_) => RequestKind::OrgTransfer,
        }
    }

    pub fn approval_chain(&self, rules: &WorkflowRules) -> Vec<ApprovalRole> {
        match self {
            Self::ItemClaim(claim) => {
                if claim.declared_value <= rules.police_review_value_threshold {
                    vec![ApprovalRole::CampusCoordinator]
                } else {
                    vec![ApprovalRole::CampusCoordinator, ApprovalRole::PoliceEvidenceCustodian]
                }
            }
            Self::EvidenceReview(_) => vec![ApprovalRole::PoliceEvidenceCustodian],
            Self::OrgTransfer(_) => vec![
                ApprovalRole::OriginEnterpriseManager,
                ApprovalRole::DestinationCoordinator,
                ApprovalRole::RequesterConfirmation,
            ],
        }
    }

    pub fn priority(&self, rules: &WorkflowRules) -> Priority {
        match self {
            Self::ItemClaim(claim) => {
                if claim.declared_value > rules.urgent_value_threshold {
                    Priority::Urgent
                } else {
                    Priority::Normal
                }
            }
            Self::EvidenceReview(evidence) => {
                if evidence.stolen_check {
                    Priority::Urgent
                } else {
                    Priority::High
                }
            }
            Self::OrgTransfer(_) => Priority::High,
        }
    }

    pub fn sla_target_hours(&self, rules: &WorkflowRules) -> i64 {
        rules.sla.for_priority(self.priority(rules))
    }

    pub fn validate(&self, rules: &WorkflowRules) -> Result<(), String> {
        match self {
            Self::ItemClaim(claim) => claim.validate(rules),
            Self::EvidenceReview(evidence) => evidence.validate(),
            Self::OrgTransfer(transfer) => transfer.validate(),
        }
    }

    pub fn confidence_score(&self) -> u8 {
        match self {
            Self::ItemClaim(claim) => claim.confidence_score(),
            Self::EvidenceReview(evidence) => evidence.confidence_score(),
            Self::OrgTransfer(transfer) => transfer.confidence_score(),
        }
    }
}

impl ItemClaimPayload {
    fn validate(&self, rules: &WorkflowRules) -> Result<(), String> {
        let minimum = rules.min_narrative_length;
        if self.claim_details.trim().len() < minimum {
            return Err(format!("claim details must be at least {minimum} characters"));
        }
        if self.identifying_features.trim().len() < minimum {
            return Err(format!("identifying features must be at least {minimum} characters"));
        }
        if self.proof_description.trim().len() < minimum {
            return Err(format!("proof description must be at least {minimum} characters"));
        }
        Ok(())
    }

    fn confidence_score(&self) -> u8 {
        let mut score = narrative_points(&self.claim_details, 30)
            + narrative_points(&self.identifying_features, 30)
            + narrative_points(&self.proof_description, 25);
        if self.photo_reference.as_deref().is_some_and(|photo| !photo.trim().is_empty()) {
            score += 15;
        }
        score.min(100) as u8
    }
}

impl EvidencePayload {
    fn validate(&self) -> Result<(), String> {
        let has_serial = self.serial_number.as_deref().is_some_and(|s| !s.trim().is_empty());
        let has_alternate =
            self.alternate_identifier.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !has_serial && !has_alternate {
            return Err("a serial number or equivalent identifier is required".to_owned());
        }
        Ok(())
    }

    fn confidence_score(&self) -> u8 {
        let mut score: usize = 0;
        if self.serial_number.as_deref().is_some_and(|s| !s.trim().is_empty()) {
            score += 45;
        } else if self.alternate_identifier.as_deref().is_some_and(|s| !s.trim().is_empty()) {
            score += 25;
        }
        if self.case_reference.as_deref().is_some_and(|s| !s.trim().is_empty()) {
            score += 25;
        }
        if !self.item_description.trim().is_empty() {
            score += 15;
        }
        if self.stolen_check {
            score += 15;
        }
        score.min(100) as u8
    }
}

impl TransferPayload {
    fn validate(&self) -> Result<(), String> {
        if self.origin_org == self.destination_org {
            return Err("origin and destination organizations must differ".to_owned());
        }
        if self.justification.trim().is_empty() {
            return Err("a transfer justification is required".to_owned());
        }
        Ok(())
    }

    fn confidence_score(&self) -> u8 {
        let mut score = 40 + narrative_points(&self.justification, 30);
        if self.manifest_reference.as_deref().is_some_and(|s| !s.trim().is_empty()) {
            score += 30;
        }
        score.min(100) as u8
    }
}

fn narrative_points(text: &str, max: usize) -> usize {
    let length = text.trim().len();
    if length == 0 {
        return 0;
    }
    (10 + length / 8).min(max)
}
