use serde::{Deserialize, Serialize};

use poa_shared_types::Address;

/// A typed value held in eternal storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredValue {
    Address(Address),
    Bool(bool),
    Uint(u64),
    AddressArray(Vec<Address>),
    UintArray(Vec<u64>),
}

impl StoredValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            StoredValue::Address(_) => "address",
            StoredValue::Bool(_) => "bool",
            StoredValue::Uint(_) => "uint",
            StoredValue::AddressArray(_) => "address[]",
            StoredValue::UintArray(_) => "uint[]",
        }
    }
}
