//! Proposal vocabulary: lifecycle statuses, categories, vote directions and
//! treasury actions.
//!
//! Proposals go through states: Active -> Passed/Rejected/Expired, and a
//! Passed proposal carrying a treasury action moves on to Executed.

use crate::error::TypesError;
use crate::Amount;
use std::fmt;
use std::str::FromStr;

/// Proposal status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProposalStatus {
    /// Voting is open (or closed but not yet finalized)
    Active,
    /// Quorum met and approval threshold cleared
    Passed,
    /// Quorum met, approval threshold not cleared
    Rejected,
    /// Quorum not met
    Expired,
    /// Treasury transfer performed
    Executed,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 5] = [
        ProposalStatus::Active,
        ProposalStatus::Passed,
        ProposalStatus::Rejected,
        ProposalStatus::Expired,
        ProposalStatus::Executed,
    ];

    /// Check if voting is still possible.
    pub fn can_vote(&self) -> bool {
        matches!(self, ProposalStatus::Active)
    }

    /// Check if the outcome has been resolved.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ProposalStatus::Active)
    }

    /// Check if a treasury transfer may be attempted.
    pub fn is_executable(&self) -> bool {
        matches!(self, ProposalStatus::Passed)
    }

    /// Forward-only transition table.
    ///
    /// Whether a Passed proposal actually carries a treasury action is checked
    /// by the caller; this table only encodes the edge set.
    pub fn can_transition_to(&self, next: ProposalStatus) -> bool {
        use ProposalStatus::*;
        match (self, next) {
            (Active, Passed) | (Active, Rejected) | (Active, Expired) => true,
            (Passed, Executed) => true,
            (Active, _) | (Passed, _) | (Rejected, _) | (Expired, _) | (Executed, _) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Active => "active",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Expired => "expired",
            ProposalStatus::Executed => "executed",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProposalStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TypesError::UnknownStatus(s.to_string()))
    }
}

/// What area of the platform a proposal touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProposalCategory {
    /// Protocol parameter change
    Protocol,
    /// Treasury spending (requires a treasury action)
    Treasury,
    /// Incentive program change
    Incentive,
    /// Community matters
    #[default]
    Community,
}

impl ProposalCategory {
    /// Whether proposals in this category must carry a treasury action.
    pub fn requires_treasury_action(&self) -> bool {
        matches!(self, ProposalCategory::Treasury)
    }
}

/// Vote support options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VoteDirection {
    /// Vote in favor
    For,
    /// Vote against
    Against,
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteDirection::For => f.write_str("for"),
            VoteDirection::Against => f.write_str("against"),
        }
    }
}

impl FromStr for VoteDirection {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "for" | "yes" | "yea" => Ok(VoteDirection::For),
            "against" | "no" | "nay" => Ok(VoteDirection::Against),
            _ => Err(TypesError::UnknownDirection(s.to_string())),
        }
    }
}

/// Currencies the treasury can pay out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Currency {
    /// Guardian Truth Token
    Gtt,
    Eth,
    Matic,
}

impl Currency {
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Gtt => "GTT",
            Currency::Eth => "ETH",
            Currency::Matic => "MATIC",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Currency {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GTT" => Ok(Currency::Gtt),
            "ETH" => Ok(Currency::Eth),
            "MATIC" => Ok(Currency::Matic),
            _ => Err(TypesError::UnknownCurrency(s.to_string())),
        }
    }
}

/// Fund transfer performed when a proposal passes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreasuryAction {
    /// Recipient wallet or account
    pub recipient: String,
    /// Amount in base units
    pub amount: Amount,
    /// Payout currency
    pub currency: Currency,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProposalStatus::*;

    #[test]
    fn test_transition_table() {
        assert!(Active.can_transition_to(Passed));
        assert!(Active.can_transition_to(Rejected));
        assert!(Active.can_transition_to(Expired));
        assert!(Passed.can_transition_to(Executed));

        // Never backwards, never skipping straight to Executed
        assert!(!Active.can_transition_to(Executed));
        assert!(!Active.can_transition_to(Active));
        assert!(!Passed.can_transition_to(Active));
        assert!(!Rejected.can_transition_to(Executed));
        assert!(!Expired.can_transition_to(Passed));
        for next in ProposalStatus::ALL {
            assert!(!Executed.can_transition_to(next));
        }
    }

    #[test]
    fn test_status_helpers() {
        assert!(Active.can_vote());
        assert!(!Active.is_settled());
        assert!(Passed.is_executable());
        assert!(!Executed.is_executable());
        assert!(Rejected.is_settled());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("PASSED".parse::<ProposalStatus>().unwrap(), Passed);
        assert_eq!(" active ".parse::<ProposalStatus>().unwrap(), Active);
        assert!("cancelled".parse::<ProposalStatus>().is_err());
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("yes".parse::<VoteDirection>().unwrap(), VoteDirection::For);
        assert_eq!("Against".parse::<VoteDirection>().unwrap(), VoteDirection::Against);
        // Abstain is not a direction in this engine
        assert!("abstain".parse::<VoteDirection>().is_err());
    }

    #[test]
    fn test_currency_serde() {
        assert_eq!(serde_json::to_string(&Currency::Gtt).unwrap(), "\"GTT\"");
        let c: Currency = serde_json::from_str("\"MATIC\"").unwrap();
        assert_eq!(c, Currency::Matic);
        assert_eq!("eth".parse::<Currency>().unwrap(), Currency::Eth);
    }

    #[test]
    fn test_category_treasury_requirement() {
        assert!(ProposalCategory::Treasury.requires_treasury_action());
        assert!(!ProposalCategory::Protocol.requires_treasury_action());
        assert_eq!(ProposalCategory::default(), ProposalCategory::Community);
    }
}
