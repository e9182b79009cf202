// Contract ABI model
// Parses the ABI a node returns for a class (Sierra JSON or legacy Cairo 0 entries)
// into the functions, structs and enums the calldata codec needs

use serde::Deserialize;
use serde_json::Value;
use starknet::core::types::Felt;
use starknet::core::utils::get_selector_from_name;
use std::collections::{BTreeMap, HashMap};

use crate::error::{OpsError, Result};

pub mod codec;

pub use codec::{decode_outputs, encode_inputs, AbiValue};

/// Whether a function may change contract state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMutability {
    View,
    External,
}

/// A named, typed parameter, struct member or enum variant
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiFunction {
    pub name: String,
    pub inputs: Vec<AbiParam>,
    pub outputs: Vec<String>,
    pub mutability: StateMutability,
}

/// Callable surface of a deployed contract
#[derive(Debug, Clone, Default)]
pub struct ContractAbi {
    functions: BTreeMap<String, AbiFunction>,
    structs: HashMap<String, Vec<AbiParam>>,
    enums: HashMap<String, Vec<AbiParam>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawEntry {
    Function(RawFunction),
    Interface {
        #[serde(default)]
        items: Vec<RawEntry>,
    },
    Struct {
        name: String,
        #[serde(default)]
        members: Vec<AbiParam>,
    },
    Enum {
        name: String,
        #[serde(default)]
        variants: Vec<AbiParam>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    #[serde(default)]
    inputs: Vec<AbiParam>,
    #[serde(default)]
    outputs: Vec<AbiParam>,
    #[serde(default, alias = "stateMutability")]
    state_mutability: Option<String>,
}

impl ContractAbi {
    /// Build from the JSON array a node returns (already parsed)
    pub fn from_json(value: Value) -> Result<Self> {
        let entries: Vec<RawEntry> = serde_json::from_value(value)
            .map_err(|e| OpsError::Encoding(format!("malformed contract ABI: {}", e)))?;

        let mut abi = ContractAbi::default();
        for entry in entries {
            abi.absorb(entry);
        }
        Ok(abi)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| OpsError::Encoding(format!("malformed contract ABI: {}", e)))?;
        Self::from_json(value)
    }

    fn absorb(&mut self, entry: RawEntry) {
        match entry {
            RawEntry::Function(raw) => {
                let mutability = match raw.state_mutability.as_deref() {
                    Some("view") => StateMutability::View,
                    _ => StateMutability::External,
                };
                let function = AbiFunction {
                    name: raw.name.clone(),
                    inputs: raw.inputs,
                    outputs: raw.outputs.into_iter().map(|o| o.ty).collect(),
                    mutability,
                };
                self.functions.insert(raw.name, function);
            }
            RawEntry::Interface { items } => {
                for item in items {
                    self.absorb(item);
                }
            }
            RawEntry::Struct { name, members } => {
                self.structs.insert(name, members);
            }
            RawEntry::Enum { name, variants } => {
                self.enums.insert(name, variants);
            }
            RawEntry::Other => {}
        }
    }

    pub fn function(&self, name: &str) -> Option<&AbiFunction> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &AbiFunction> {
        self.functions.values()
    }

    pub fn struct_members(&self, name: &str) -> Option<&[AbiParam]> {
        self.structs.get(name).map(Vec::as_slice)
    }

    pub fn enum_variants(&self, name: &str) -> Option<&[AbiParam]> {
        self.enums.get(name).map(Vec::as_slice)
    }

    /// No callable functions at all
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Entrypoint selector (starknet_keccak of the name)
pub fn selector(name: &str) -> Result<Felt> {
    get_selector_from_name(name)
        .map_err(|_| OpsError::Encoding(format!("entrypoint name '{}' is not ASCII", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sierra_abi() -> Value {
        json!([
            { "type": "impl", "name": "TicketImpl", "interface_name": "openmark::ITicket" },
            {
                "type": "struct",
                "name": "core::integer::u256",
                "members": [
                    { "name": "low", "type": "core::integer::u128" },
                    { "name": "high", "type": "core::integer::u128" }
                ]
            },
            {
                "type": "enum",
                "name": "core::bool",
                "variants": [
                    { "name": "False", "type": "()" },
                    { "name": "True", "type": "()" }
                ]
            },
            {
                "type": "interface",
                "name": "openmark::ITicket",
                "items": [
                    {
                        "type": "function",
                        "name": "ticketPrice",
                        "inputs": [],
                        "outputs": [{ "type": "core::integer::u256" }],
                        "state_mutability": "view"
                    },
                    {
                        "type": "function",
                        "name": "updateTicketPrice",
                        "inputs": [{ "name": "price", "type": "core::integer::u256" }],
                        "outputs": [],
                        "state_mutability": "external"
                    }
                ]
            },
            {
                "type": "constructor",
                "name": "constructor",
                "inputs": [{ "name": "owner", "type": "core::starknet::contract_address::ContractAddress" }]
            },
            { "type": "event", "name": "openmark::Ticket::Event", "kind": "enum", "variants": [] }
        ])
    }

    #[test]
    fn test_sierra_interface_functions_are_flattened() {
        let abi = ContractAbi::from_json(sierra_abi()).unwrap();

        let price = abi.function("ticketPrice").unwrap();
        assert_eq!(price.mutability, StateMutability::View);
        assert_eq!(price.outputs, vec!["core::integer::u256".to_string()]);

        let update = abi.function("updateTicketPrice").unwrap();
        assert_eq!(update.mutability, StateMutability::External);
        assert_eq!(update.inputs[0].name, "price");

        // constructors are not callable entrypoints
        assert!(abi.function("constructor").is_none());
        assert_eq!(abi.struct_members("core::integer::u256").unwrap().len(), 2);
        assert_eq!(abi.enum_variants("core::bool").unwrap()[1].name, "True");
        assert_eq!(abi.functions().count(), 2);
    }

    #[test]
    fn test_legacy_abi_entries() {
        let abi = ContractAbi::from_json_str(
            r#"[
                {"type": "struct", "name": "Uint256", "size": 2, "members": [
                    {"name": "low", "type": "felt", "offset": 0},
                    {"name": "high", "type": "felt", "offset": 1}
                ]},
                {"type": "function", "name": "balanceOf",
                 "inputs": [{"name": "account", "type": "felt"}],
                 "outputs": [{"name": "balance", "type": "Uint256"}],
                 "stateMutability": "view"},
                {"type": "function", "name": "approve",
                 "inputs": [{"name": "spender", "type": "felt"}, {"name": "amount", "type": "Uint256"}],
                 "outputs": [{"name": "success", "type": "felt"}]},
                {"type": "event", "name": "Transfer", "keys": [], "data": []}
            ]"#,
        )
        .unwrap();

        assert_eq!(abi.function("balanceOf").unwrap().mutability, StateMutability::View);
        assert_eq!(abi.function("approve").unwrap().mutability, StateMutability::External);
        assert_eq!(abi.function("approve").unwrap().inputs.len(), 2);
    }

    #[test]
    fn test_malformed_abi_is_an_encoding_error() {
        assert!(matches!(
            ContractAbi::from_json(json!({ "not": "an array" })),
            Err(OpsError::Encoding(_))
        ));
        assert!(ContractAbi::from_json(json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_selector_matches_known_value() {
        // selector of "transfer" as used by every ERC-20 on Starknet
        assert_eq!(
            selector("transfer").unwrap(),
            Felt::from_hex("0x83afd3f4caedc6eebf44246fe54e38c95e3179a5ec9ea81740eca5b482d12e").unwrap()
        );
    }
}
