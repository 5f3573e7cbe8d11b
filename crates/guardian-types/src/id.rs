use crate::error::TypesError;
use derive_more::Display;
use std::str::FromStr;

/// Sequential proposal identifier assigned by the proposal store.
///
/// Doubles as the treasury idempotency key for the proposal's transfer.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[display(fmt = "{}", _0)]
pub struct ProposalId(u64);

impl ProposalId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The id following this one.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Key used for the treasury transfer of this proposal: the bare id.
    pub fn idempotency_key(&self) -> String {
        self.0.to_string()
    }
}

impl From<u64> for ProposalId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for ProposalId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('#');
        Ok(Self(trimmed.parse::<u64>()?))
    }
}

/// Opaque member identifier owned by the membership service.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
#[display(fmt = "{}", _0)]
pub struct MemberId(String);

impl MemberId {
    /// Create a member id, rejecting blank input.
    pub fn new(id: impl Into<String>) -> Result<Self, TypesError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(TypesError::EmptyMemberId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MemberId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MemberId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MemberId> for String {
    fn from(id: MemberId) -> Self {
        id.0
    }
}

impl AsRef<str> for MemberId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_id_parse() {
        assert_eq!("42".parse::<ProposalId>().unwrap(), ProposalId::new(42));
        assert_eq!("#7".parse::<ProposalId>().unwrap(), ProposalId::new(7));
        assert!("abc".parse::<ProposalId>().is_err());
    }

    #[test]
    fn test_idempotency_key_is_stable() {
        let id = ProposalId::new(9);
        assert_eq!(id.idempotency_key(), "9");
        assert_eq!(id.idempotency_key(), id.idempotency_key());
    }

    #[test]
    fn test_member_id_rejects_blank() {
        assert!(MemberId::new("").is_err());
        assert!(MemberId::new("   ").is_err());
        assert_eq!(MemberId::new("guardian_1").unwrap().as_str(), "guardian_1");
    }

    #[test]
    fn test_serde_transparent() {
        let id = ProposalId::new(3);
        assert_eq!(serde_json::to_string(&id).unwrap(), "3");
        let member: MemberId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(member.to_string(), "alice");
        assert!(serde_json::from_str::<MemberId>("\"\"").is_err());
    }
}
