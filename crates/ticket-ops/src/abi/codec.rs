// Cairo calldata serialization driven by ABI type names

use primitive_types::U256;
use starknet::core::types::Felt;
use std::fmt;

use super::{AbiFunction, ContractAbi};
use crate::error::{OpsError, Result};
use crate::utils::{felt_to_u256, fmt_felt, join_u256, split_u256, u256_to_felt};

/// A decoded (or to-be-encoded) Cairo value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Felt(Felt),
    /// Any unsigned integer type, `u8` through `u256`
    Uint(U256),
    Bool(bool),
    Struct(Vec<AbiValue>),
    Array(Vec<AbiValue>),
    Enum {
        variant: String,
        value: Option<Box<AbiValue>>,
    },
    Unit,
}

impl AbiValue {
    pub fn as_u256(&self) -> Result<U256> {
        match self {
            AbiValue::Uint(v) => Ok(*v),
            AbiValue::Felt(f) => Ok(felt_to_u256(f)),
            other => Err(OpsError::Encoding(format!("expected an integer, got {}", other))),
        }
    }

    pub fn as_felt(&self) -> Result<Felt> {
        match self {
            AbiValue::Felt(f) => Ok(*f),
            AbiValue::Uint(v) => u256_to_felt(*v),
            other => Err(OpsError::Encoding(format!("expected a felt, got {}", other))),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            AbiValue::Bool(b) => Ok(*b),
            other => Err(OpsError::Encoding(format!("expected a bool, got {}", other))),
        }
    }
}

impl From<U256> for AbiValue {
    fn from(value: U256) -> Self {
        AbiValue::Uint(value)
    }
}

impl From<Felt> for AbiValue {
    fn from(value: Felt) -> Self {
        AbiValue::Felt(value)
    }
}

impl From<u64> for AbiValue {
    fn from(value: u64) -> Self {
        AbiValue::Uint(U256::from(value))
    }
}

impl From<u32> for AbiValue {
    fn from(value: u32) -> Self {
        AbiValue::Uint(U256::from(value))
    }
}

impl From<bool> for AbiValue {
    fn from(value: bool) -> Self {
        AbiValue::Bool(value)
    }
}

impl fmt::Display for AbiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiValue::Felt(v) => write!(f, "{}", fmt_felt(v)),
            AbiValue::Uint(v) => write!(f, "{}", v),
            AbiValue::Bool(v) => write!(f, "{}", v),
            AbiValue::Struct(items) | AbiValue::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                if matches!(self, AbiValue::Struct(_)) {
                    write!(f, "{{{}}}", rendered.join(", "))
                } else {
                    write!(f, "[{}]", rendered.join(", "))
                }
            }
            AbiValue::Enum { variant, value: Some(value) } => write!(f, "{}({})", variant, value),
            AbiValue::Enum { variant, value: None } => write!(f, "{}", variant),
            AbiValue::Unit => write!(f, "()"),
        }
    }
}

/// How a type name lays out in calldata
#[derive(Debug, PartialEq, Eq)]
enum Kind<'a> {
    Felt,
    Int(u32),
    U256,
    Bool,
    Unit,
    Array(&'a str),
    Named(&'a str),
}

fn classify(ty: &str) -> Kind<'_> {
    match ty {
        "felt" | "core::felt252"
        | "core::starknet::contract_address::ContractAddress"
        | "core::starknet::class_hash::ClassHash"
        | "core::starknet::eth_address::EthAddress"
        | "core::bytes_31::bytes31" => Kind::Felt,
        "core::integer::u8" => Kind::Int(8),
        "core::integer::u16" => Kind::Int(16),
        "core::integer::u32" | "core::integer::usize" => Kind::Int(32),
        "core::integer::u64" => Kind::Int(64),
        "core::integer::u128" => Kind::Int(128),
        "core::integer::u256" | "Uint256" => Kind::U256,
        "core::bool" => Kind::Bool,
        "()" => Kind::Unit,
        _ => {
            let inner = ty
                .strip_prefix("core::array::Array::<")
                .or_else(|| ty.strip_prefix("core::array::Span::<"))
                .and_then(|rest| rest.strip_suffix('>'));
            match inner {
                Some(inner) => Kind::Array(inner),
                None => Kind::Named(ty),
            }
        }
    }
}

fn mismatch(ty: &str, value: &AbiValue) -> OpsError {
    OpsError::Encoding(format!("cannot encode {} as {}", value, ty))
}

/// Append the calldata for `value` typed as `ty`
pub fn encode(abi: &ContractAbi, ty: &str, value: &AbiValue, out: &mut Vec<Felt>) -> Result<()> {
    match classify(ty) {
        Kind::Felt => out.push(value.as_felt().map_err(|_| mismatch(ty, value))?),
        Kind::Int(bits) => {
            let v = value.as_u256().map_err(|_| mismatch(ty, value))?;
            if v.bits() > bits as usize {
                return Err(OpsError::Encoding(format!("{} does not fit in {}", v, ty)));
            }
            out.push(u256_to_felt(v)?);
        }
        Kind::U256 => {
            let (low, high) = split_u256(value.as_u256().map_err(|_| mismatch(ty, value))?);
            out.push(low);
            out.push(high);
        }
        Kind::Bool => {
            let b = value.as_bool().map_err(|_| mismatch(ty, value))?;
            out.push(if b { Felt::ONE } else { Felt::ZERO });
        }
        Kind::Unit => {}
        Kind::Array(inner) => {
            let AbiValue::Array(items) = value else {
                return Err(mismatch(ty, value));
            };
            out.push(Felt::from(items.len() as u64));
            for item in items {
                encode(abi, inner, item, out)?;
            }
        }
        Kind::Named(name) => {
            if let Some(members) = abi.struct_members(name) {
                let AbiValue::Struct(fields) = value else {
                    return Err(mismatch(ty, value));
                };
                if fields.len() != members.len() {
                    return Err(OpsError::Encoding(format!(
                        "{} has {} members, got {}",
                        name,
                        members.len(),
                        fields.len()
                    )));
                }
                for (member, field) in members.iter().zip(fields) {
                    encode(abi, &member.ty, field, out)?;
                }
            } else if let Some(variants) = abi.enum_variants(name) {
                let AbiValue::Enum { variant, value: payload } = value else {
                    return Err(mismatch(ty, value));
                };
                let index = variants
                    .iter()
                    .position(|v| &v.name == variant)
                    .ok_or_else(|| OpsError::Encoding(format!("{} has no variant {}", name, variant)))?;
                out.push(Felt::from(index as u64));
                let payload = payload.as_deref().unwrap_or(&AbiValue::Unit);
                encode(abi, &variants[index].ty, payload, out)?;
            } else {
                return Err(OpsError::Encoding(format!("unsupported ABI type {}", ty)));
            }
        }
    }
    Ok(())
}

/// Read one value typed as `ty` from the front of `input`
pub fn decode<'a, I>(abi: &ContractAbi, ty: &str, input: &mut I) -> Result<AbiValue>
where
    I: Iterator<Item = &'a Felt>,
{
    let mut next = || {
        input
            .next()
            .copied()
            .ok_or_else(|| OpsError::Encoding(format!("ran out of data decoding {}", ty)))
    };

    let value = match classify(ty) {
        Kind::Felt => AbiValue::Felt(next()?),
        Kind::Int(bits) => {
            let v = felt_to_u256(&next()?);
            if v.bits() > bits as usize {
                return Err(OpsError::Encoding(format!("{} does not fit in {}", v, ty)));
            }
            AbiValue::Uint(v)
        }
        Kind::U256 => {
            let low = next()?;
            let high = next()?;
            AbiValue::Uint(join_u256(&low, &high)?)
        }
        Kind::Bool => {
            let raw = next()?;
            if raw == Felt::ZERO {
                AbiValue::Bool(false)
            } else if raw == Felt::ONE {
                AbiValue::Bool(true)
            } else {
                return Err(OpsError::Encoding(format!("{} is not a bool", fmt_felt(&raw))));
            }
        }
        Kind::Unit => AbiValue::Unit,
        Kind::Array(inner) => {
            let len = felt_to_u256(&next()?);
            if len.bits() > 32 {
                return Err(OpsError::Encoding(format!("array length {} is implausible", len)));
            }
            let mut items = Vec::with_capacity(len.low_u64() as usize);
            for _ in 0..len.low_u64() {
                items.push(decode(abi, inner, input)?);
            }
            AbiValue::Array(items)
        }
        Kind::Named(name) => {
            if let Some(members) = abi.struct_members(name) {
                let mut fields = Vec::with_capacity(members.len());
                for member in members {
                    fields.push(decode(abi, &member.ty, input)?);
                }
                AbiValue::Struct(fields)
            } else if let Some(variants) = abi.enum_variants(name) {
                let index = felt_to_u256(&next()?);
                let variant = variants
                    .get(index.low_u64() as usize)
                    .filter(|_| index.bits() <= 32)
                    .ok_or_else(|| OpsError::Encoding(format!("{} has no variant #{}", name, index)))?;
                let payload = decode(abi, &variant.ty, input)?;
                AbiValue::Enum {
                    variant: variant.name.clone(),
                    value: (payload != AbiValue::Unit).then(|| Box::new(payload)),
                }
            } else {
                return Err(OpsError::Encoding(format!("unsupported ABI type {}", ty)));
            }
        }
    };
    Ok(value)
}

/// Encode a full argument list for `function`, checking arity
pub fn encode_inputs(abi: &ContractAbi, function: &AbiFunction, args: &[AbiValue]) -> Result<Vec<Felt>> {
    if args.len() != function.inputs.len() {
        return Err(OpsError::Encoding(format!(
            "{} expects {} argument(s), got {}",
            function.name,
            function.inputs.len(),
            args.len()
        )));
    }
    let mut calldata = Vec::new();
    for (param, arg) in function.inputs.iter().zip(args) {
        encode(abi, &param.ty, arg, &mut calldata)
            .map_err(|e| OpsError::Encoding(format!("{}({}): {}", function.name, param.name, e)))?;
    }
    Ok(calldata)
}

pub fn decode_outputs(abi: &ContractAbi, function: &AbiFunction, data: &[Felt]) -> Result<Vec<AbiValue>> {
    let mut input = data.iter();
    function
        .outputs
        .iter()
        .map(|ty| decode(abi, ty, &mut input))
        .collect()
}
