//! JSON request / response protocol of the node.
//!
//! Each request line carries the caller (`from`), an optional block
//! `timestamp` and an `op` tag naming the operation, e.g.
//!
//! ```json
//! {"from": "0x…0100", "op": "create_keys", "mining_key": "0x…", "payout_key": "0x…", "voting_key": "0x…"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use poa_consensus::ValidatorSet;
use poa_keys::KeyLedger;
use poa_shared_types::{Address, Call, ErrorKind, EventRecord, KeyTriad};

use crate::deployment::Deployment;
use crate::error::{NodeError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: Address,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(flatten)]
    pub request: Request,
}

impl Envelope {
    pub fn new(from: Address, request: Request) -> Self {
        Self {
            from,
            timestamp: 0,
            request,
        }
    }

    pub fn call(&self) -> Call {
        Call::new(self.from).at(self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    // Initial key ceremony
    InitiateKeys { key: Address },
    CreateKeys { mining_key: Address, payout_key: Address, voting_key: Address },

    // Voting gateway key management
    AddMiningKey { key: Address },
    RemoveMiningKey { key: Address },
    SwapMiningKey { new_key: Address, old_key: Address },
    AddVotingKey { key: Address, mining_key: Address },
    RemoveVotingKey { mining_key: Address },
    SwapVotingKey { key: Address, mining_key: Address },
    AddPayoutKey { key: Address, mining_key: Address },
    RemovePayoutKey { mining_key: Address },
    SwapPayoutKey { key: Address, mining_key: Address },
    SetMaxTotalValidators { max: u64 },
    SetVotingGateway { address: Address },

    // Migration from the previous key manager
    MigrateInitialKey { key: Address },
    MigrateMiningKey { key: Address },

    // Coordinator
    FinalizeChange,
    SetSystemAddress { address: Address },
    RedeployKeyManager { address: Address },
    SupportValidator { validator: Address },
    WithdrawSupport { validator: Address },
    SetValidatorSupportDivisor { divisor: u64 },

    // Queries
    GetInitialKey { key: Address },
    GetValidatorKeys { mining_key: Address },
    GetMiningKeyByVoting { voting_key: Address },
    GetMiningKeyByPayout { payout_key: Address },
    GetMiningKeyHistory { mining_key: Address },
    IsMiningActive { mining_key: Address },
    IsPayoutActive { mining_key: Address },
    IsVotingActive { voting_key: Address },
    HasValidatorClone { mining_key: Address },
    GetValidators,
    GetPendingValidators,
    GetValidatorMetadata { validator: Address },
    GetValidatorSupportDivisor,
    GetValidatorSupportCount { validator: Address },
    HasEnoughSupport { validator: Address },
    Status,
}

impl Request {
    /// Whether the request only reads state. Queries never emit events.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Request::GetInitialKey { .. }
                | Request::GetValidatorKeys { .. }
                | Request::GetMiningKeyByVoting { .. }
                | Request::GetMiningKeyByPayout { .. }
                | Request::GetMiningKeyHistory { .. }
                | Request::IsMiningActive { .. }
                | Request::IsPayoutActive { .. }
                | Request::IsVotingActive { .. }
                | Request::HasValidatorClone { .. }
                | Request::GetValidators
                | Request::GetPendingValidators
                | Request::GetValidatorMetadata { .. }
                | Request::GetValidatorSupportDivisor
                | Request::GetValidatorSupportCount { .. }
                | Request::HasEnoughSupport { .. }
                | Request::Status
        )
    }

    /// Runs the request against `deployment` on behalf of `call`.
    ///
    /// Mutations return `None`; queries return their JSON result.
    pub fn execute(&self, deployment: &mut Deployment, call: &Call) -> Result<Option<Value>> {
        let manager = deployment.key_manager();
        let consensus = deployment.consensus();
        match *self {
            Request::InitiateKeys { key } => manager.initiate_keys(call, key)?,
            Request::CreateKeys {
                mining_key,
                payout_key,
                voting_key,
            } => manager.create_keys(call, KeyTriad::new(mining_key, payout_key, voting_key))?,
            Request::AddMiningKey { key } => manager.add_mining_key(call, key)?,
            Request::RemoveMiningKey { key } => manager.remove_mining_key(call, key)?,
            Request::SwapMiningKey { new_key, old_key } => manager.swap_mining_key(call, new_key, old_key)?,
            Request::AddVotingKey { key, mining_key } => manager.add_voting_key(call, key, mining_key)?,
            Request::RemoveVotingKey { mining_key } => manager.remove_voting_key(call, mining_key)?,
            Request::SwapVotingKey { key, mining_key } => manager.swap_voting_key(call, key, mining_key)?,
            Request::AddPayoutKey { key, mining_key } => manager.add_payout_key(call, key, mining_key)?,
            Request::RemovePayoutKey { mining_key } => manager.remove_payout_key(call, mining_key)?,
            Request::SwapPayoutKey { key, mining_key } => manager.swap_payout_key(call, key, mining_key)?,
            Request::SetMaxTotalValidators { max } => manager.set_max_total_validators(call, max)?,
            Request::SetVotingGateway { address } => manager.set_voting_gateway(call, address)?,
            Request::MigrateInitialKey { key } => manager.migrate_initial_key(call, key)?,
            Request::MigrateMiningKey { key } => manager.migrate_mining_key(call, key)?,
            Request::FinalizeChange => consensus.finalize_change(call)?,
            Request::SetSystemAddress { address } => consensus.set_system_address(call, address)?,
            Request::RedeployKeyManager { address } => deployment.redeploy_key_manager(call, address)?,
            Request::SupportValidator { validator } => consensus.support_validator(call, validator)?,
            Request::WithdrawSupport { validator } => consensus.withdraw_support(call, validator)?,
            Request::SetValidatorSupportDivisor { divisor } => {
                consensus.set_validator_support_divisor(call, divisor)?
            }

            Request::GetInitialKey { key } => return to_result(manager.get_initial_key(&key)?),
            Request::GetValidatorKeys { mining_key } => {
                return to_result(manager.get_validator_keys(&mining_key)?)
            }
            Request::GetMiningKeyByVoting { voting_key } => {
                return to_result(manager.get_mining_key_by_voting(&voting_key)?)
            }
            Request::GetMiningKeyByPayout { payout_key } => {
                return to_result(manager.get_mining_key_by_payout(&payout_key)?)
            }
            Request::GetMiningKeyHistory { mining_key } => {
                return to_result(manager.get_mining_key_history(&mining_key)?)
            }
            Request::IsMiningActive { mining_key } => return to_result(manager.is_mining_active(&mining_key)?),
            Request::IsPayoutActive { mining_key } => return to_result(manager.is_payout_active(&mining_key)?),
            Request::IsVotingActive { voting_key } => return to_result(manager.is_voting_active(&voting_key)?),
            Request::HasValidatorClone { mining_key } => {
                return to_result(manager.has_validator_clone(&mining_key)?)
            }
            Request::GetValidators => return to_result(consensus.get_validators()?),
            Request::GetPendingValidators => return to_result(consensus.get_pending_validators()?),
            Request::GetValidatorMetadata { validator } => {
                return to_result(consensus.get_validator_metadata(&validator)?)
            }
            Request::GetValidatorSupportDivisor => return to_result(consensus.get_validator_support_divisor()?),
            Request::GetValidatorSupportCount { validator } => {
                return to_result(consensus.get_validator_support_count(&validator)?)
            }
            Request::HasEnoughSupport { validator } => return to_result(consensus.has_enough_support(&validator)?),
            Request::Status => return to_result(deployment.status()?),
        }
        Ok(None)
    }
}

fn to_result<T: Serialize>(value: T) -> Result<Option<Value>> {
    Ok(Some(serde_json::to_value(value)?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        /// Events emitted while handling the request, in emission order.
        #[serde(default)]
        events: Vec<EventRecord>,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}

impl From<&NodeError> for Response {
    fn from(err: &NodeError) -> Self {
        Response::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_are_told_apart_from_mutations() {
        let validator = Address::from_low_u64(7);
        assert!(Request::Status.is_query());
        assert!(Request::GetValidatorSupportCount { validator }.is_query());
        assert!(Request::HasEnoughSupport { validator }.is_query());
        assert!(!Request::SupportValidator { validator }.is_query());
        assert!(!Request::FinalizeChange.is_query());
        assert!(!Request::AddMiningKey { key: validator }.is_query());
    }

    #[test]
    fn test_request_wire_names() {
        let line = r#"{"from":"0x0000000000000000000000000000000000000100","op":"set_validator_support_divisor","divisor":3}"#;
        let envelope: Envelope = serde_json::from_str(line).unwrap();
        assert_eq!(envelope.request, Request::SetValidatorSupportDivisor { divisor: 3 });
        assert_eq!(envelope.timestamp, 0);
    }
}
