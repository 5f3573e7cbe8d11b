//! Governance JSON-RPC methods.
//!
//! Amounts travel as decimal strings so no client loses precision on
//! 128-bit values; thresholds travel either as fractions in (0, 1] or as
//! basis points, never both.

use crate::error::{RpcError, RpcResult};
use guardian_governance::{
    CreateProposal, ExecutionOutcome, FinalizeReport, GovernanceService, GovernanceStats,
    Proposal, Vote,
};
use guardian_types::{
    Amount, BasisPoints, Currency, MemberId, ProposalCategory, ProposalId, ProposalStatus,
    Timestamp, TreasuryAction, VoteDirection,
};
use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Treasury action as sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryActionParams {
    pub recipient: String,
    /// Decimal amount in base units
    pub amount: String,
    /// GTT, ETH or MATIC
    pub currency: String,
}

impl TryFrom<TreasuryActionParams> for TreasuryAction {
    type Error = RpcError;

    fn try_from(params: TreasuryActionParams) -> Result<Self, Self::Error> {
        let amount: Amount = params
            .amount
            .trim()
            .parse()
            .map_err(|e| RpcError::InvalidParams(format!("amount: {}", e)))?;
        Ok(TreasuryAction {
            recipient: params.recipient,
            amount,
            currency: params.currency.parse::<Currency>()?,
        })
    }
}

/// Proposal creation request as sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalParams {
    pub creator_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Absolute deadline in Unix seconds
    #[serde(default)]
    pub voting_ends_at: Option<u64>,
    #[serde(default)]
    pub quorum_fraction: Option<f64>,
    #[serde(default)]
    pub approval_fraction: Option<f64>,
    #[serde(default)]
    pub quorum_bps: Option<u32>,
    #[serde(default)]
    pub approval_bps: Option<u32>,
    #[serde(default)]
    pub treasury_action: Option<TreasuryActionParams>,
}

impl TryFrom<CreateProposalParams> for CreateProposal {
    type Error = RpcError;

    fn try_from(params: CreateProposalParams) -> Result<Self, Self::Error> {
        Ok(CreateProposal {
            creator_id: MemberId::new(params.creator_id)?,
            title: params.title,
            body: params.body,
            category: params
                .category
                .as_deref()
                .map(parse_category)
                .transpose()?
                .unwrap_or_default(),
            voting_ends_at: params.voting_ends_at.map(Timestamp::new),
            quorum: threshold("quorum", params.quorum_fraction, params.quorum_bps)?,
            approval: threshold("approval", params.approval_fraction, params.approval_bps)?,
            treasury_action: params
                .treasury_action
                .map(TreasuryAction::try_from)
                .transpose()?,
        })
    }
}

fn threshold(
    name: &str,
    fraction: Option<f64>,
    bps: Option<u32>,
) -> Result<Option<BasisPoints>, RpcError> {
    match (fraction, bps) {
        (Some(_), Some(_)) => Err(RpcError::InvalidParams(format!(
            "{name}: give either {name}Fraction or {name}Bps"
        ))),
        (Some(f), None) => Ok(Some(BasisPoints::from_fraction(f)?)),
        (None, Some(b)) => Ok(Some(BasisPoints::new(b)?)),
        (None, None) => Ok(None),
    }
}

fn parse_category(s: &str) -> Result<ProposalCategory, RpcError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "protocol" => Ok(ProposalCategory::Protocol),
        "treasury" => Ok(ProposalCategory::Treasury),
        "incentive" => Ok(ProposalCategory::Incentive),
        "community" => Ok(ProposalCategory::Community),
        other => Err(RpcError::InvalidParams(format!("unknown category: {}", other))),
    }
}

/// Health report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub proposals: usize,
}

#[rpc(server)]
pub trait GovernanceApi {
    #[method(name = "gov_createProposal")]
    async fn create_proposal(&self, request: CreateProposalParams) -> RpcResult<Proposal>;

    #[method(name = "gov_vote")]
    async fn vote(
        &self,
        member_id: String,
        proposal_id: u64,
        direction: String,
        reason: Option<String>,
    ) -> RpcResult<Vote>;

    #[method(name = "gov_getProposal")]
    async fn get_proposal(&self, proposal_id: u64) -> RpcResult<Proposal>;

    #[method(name = "gov_listActiveProposals")]
    async fn list_active_proposals(&self) -> RpcResult<Vec<Proposal>>;

    #[method(name = "gov_listProposals")]
    async fn list_proposals(&self, status: Option<String>) -> RpcResult<Vec<Proposal>>;

    #[method(name = "gov_getVotes")]
    async fn get_votes(&self, proposal_id: u64) -> RpcResult<Vec<Vote>>;

    #[method(name = "gov_finalize")]
    async fn finalize(&self, proposal_id: u64) -> RpcResult<FinalizeReport>;

    #[method(name = "gov_execute")]
    async fn execute(&self, proposal_id: u64) -> RpcResult<ExecutionOutcome>;

    #[method(name = "gov_stats")]
    async fn stats(&self) -> RpcResult<GovernanceStats>;

    #[method(name = "gov_health")]
    async fn health(&self) -> RpcResult<HealthStatus>;
}

/// Governance RPC handler.
pub struct GovernanceRpc {
    service: Arc<GovernanceService>,
    started_at: Instant,
}

impl GovernanceRpc {
    pub fn new(service: Arc<GovernanceService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}

#[async_trait]
impl GovernanceApiServer for GovernanceRpc {
    async fn create_proposal(&self, request: CreateProposalParams) -> RpcResult<Proposal> {
        let request = CreateProposal::try_from(request)?;
        Ok(self.service.create_proposal(request).await?)
    }

    async fn vote(
        &self,
        member_id: String,
        proposal_id: u64,
        direction: String,
        reason: Option<String>,
    ) -> RpcResult<Vote> {
        let member_id = MemberId::new(member_id)?;
        let direction: VoteDirection = direction.parse()?;
        Ok(self
            .service
            .vote(member_id, ProposalId::new(proposal_id), direction, reason)
            .await?)
    }

    async fn get_proposal(&self, proposal_id: u64) -> RpcResult<Proposal> {
        Ok(self.service.get_proposal(ProposalId::new(proposal_id))?)
    }

    async fn list_active_proposals(&self) -> RpcResult<Vec<Proposal>> {
        Ok(self.service.list_active())
    }

    async fn list_proposals(&self, status: Option<String>) -> RpcResult<Vec<Proposal>> {
        let status = status
            .as_deref()
            .map(str::parse::<ProposalStatus>)
            .transpose()?;
        Ok(self.service.list_proposals(status))
    }

    async fn get_votes(&self, proposal_id: u64) -> RpcResult<Vec<Vote>> {
        Ok(self.service.votes(ProposalId::new(proposal_id))?)
    }

    async fn finalize(&self, proposal_id: u64) -> RpcResult<FinalizeReport> {
        Ok(self.service.finalize(ProposalId::new(proposal_id)).await?)
    }

    async fn execute(&self, proposal_id: u64) -> RpcResult<ExecutionOutcome> {
        Ok(self.service.execute(ProposalId::new(proposal_id)).await?)
    }

    async fn stats(&self) -> RpcResult<GovernanceStats> {
        Ok(self.service.stats().await)
    }

    async fn health(&self) -> RpcResult<HealthStatus> {
        Ok(HealthStatus {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            proposals: self.service.store().len(),
        })
    }
}
