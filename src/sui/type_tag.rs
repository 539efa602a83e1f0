//! Move type tags
//!
//! Parses strings such as `0x2::coin::Coin<0x2::sui::SUI>` into their BCS
//! form for `type_arguments` of a Move call.

use std::fmt;
use thiserror::Error;

use crate::sui::address::SuiAddress;
use crate::sui::bcs::BcsWriter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeTagError {
    #[error("Empty type tag")]
    Empty,

    #[error("Invalid address in type tag: {0}")]
    InvalidAddress(String),

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Unbalanced type parameters in '{0}'")]
    Unbalanced(String),

    #[error("Malformed struct tag '{0}'")]
    MalformedStruct(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructTag {
    pub address: SuiAddress,
    pub module: String,
    pub name: String,
    pub type_params: Vec<TypeTag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    Bool,
    U8,
    U16,
    U32,
    U64,
    U128,
    U256,
    Address,
    Signer,
    Vector(Box<TypeTag>),
    Struct(Box<StructTag>),
}

/// Identifiers: ASCII alphanumerics and underscores, not starting with a digit
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && s != "_"
}

impl TypeTag {
    pub fn parse(s: &str) -> Result<Self, TypeTagError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TypeTagError::Empty);
        }
        match s {
            "bool" => return Ok(TypeTag::Bool),
            "u8" => return Ok(TypeTag::U8),
            "u16" => return Ok(TypeTag::U16),
            "u32" => return Ok(TypeTag::U32),
            "u64" => return Ok(TypeTag::U64),
            "u128" => return Ok(TypeTag::U128),
            "u256" => return Ok(TypeTag::U256),
            "address" => return Ok(TypeTag::Address),
            "signer" => return Ok(TypeTag::Signer),
            _ => {}
        }

        if let Some(inner) = s.strip_prefix("vector<") {
            let inner = inner
                .strip_suffix('>')
                .ok_or_else(|| TypeTagError::Unbalanced(s.to_string()))?;
            return Ok(TypeTag::Vector(Box::new(TypeTag::parse(inner)?)));
        }

        Ok(TypeTag::Struct(Box::new(StructTag::parse(s)?)))
    }

    pub fn write_bcs(&self, w: &mut BcsWriter) {
        match self {
            TypeTag::Bool => {
                w.write_variant(0);
            }
            TypeTag::U8 => {
                w.write_variant(1);
            }
            TypeTag::U64 => {
                w.write_variant(2);
            }
            TypeTag::U128 => {
                w.write_variant(3);
            }
            TypeTag::Address => {
                w.write_variant(4);
            }
            TypeTag::Signer => {
                w.write_variant(5);
            }
            TypeTag::Vector(inner) => {
                w.write_variant(6);
                inner.write_bcs(w);
            }
            TypeTag::Struct(tag) => {
                w.write_variant(7);
                tag.address.write_bcs(w);
                w.write_str(&tag.module);
                w.write_str(&tag.name);
                w.write_uleb128(tag.type_params.len() as u32);
                for param in &tag.type_params {
                    param.write_bcs(w);
                }
            }
            TypeTag::U16 => {
                w.write_variant(8);
            }
            TypeTag::U32 => {
                w.write_variant(9);
            }
            TypeTag::U256 => {
                w.write_variant(10);
            }
        }
    }
}

impl StructTag {
    fn parse(s: &str) -> Result<Self, TypeTagError> {
        let (head, params) = match s.find('<') {
            Some(open) => {
                let body = s[open + 1..]
                    .strip_suffix('>')
                    .ok_or_else(|| TypeTagError::Unbalanced(s.to_string()))?;
                (&s[..open], split_top_level(body, s)?)
            }
            None => (s, Vec::new()),
        };

        let parts: Vec<&str> = head.split("::").collect();
        if parts.len() != 3 {
            return Err(TypeTagError::MalformedStruct(s.to_string()));
        }
        let address = SuiAddress::from_string(parts[0])
            .map_err(|_| TypeTagError::InvalidAddress(parts[0].to_string()))?;
        for ident in &parts[1..] {
            if !is_valid_identifier(ident) {
                return Err(TypeTagError::InvalidIdentifier(ident.to_string()));
            }
        }

        let type_params = params
            .into_iter()
            .map(TypeTag::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            address,
            module: parts[1].to_string(),
            name: parts[2].to_string(),
            type_params,
        })
    }
}

/// Split `A, B<C, D>` on commas outside angle brackets
fn split_top_level<'a>(body: &'a str, whole: &str) -> Result<Vec<&'a str>, TypeTagError> {
    let mut depth = 0i32;
    let mut start = 0;
    let mut out = Vec::new();
    for (i, c) in body.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth < 0 {
                    return Err(TypeTagError::Unbalanced(whole.to_string()));
                }
            }
            ',' if depth == 0 => {
                out.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(TypeTagError::Unbalanced(whole.to_string()));
    }
    out.push(body[start..].trim());
    if out.iter().any(|p| p.is_empty()) {
        return Err(TypeTagError::MalformedStruct(whole.to_string()));
    }
    Ok(out)
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::U8 => write!(f, "u8"),
            TypeTag::U16 => write!(f, "u16"),
            TypeTag::U32 => write!(f, "u32"),
            TypeTag::U64 => write!(f, "u64"),
            TypeTag::U128 => write!(f, "u128"),
            TypeTag::U256 => write!(f, "u256"),
            TypeTag::Address => write!(f, "address"),
            TypeTag::Signer => write!(f, "signer"),
            TypeTag::Vector(inner) => write!(f, "vector<{}>", inner),
            TypeTag::Struct(tag) => {
                write!(f, "{}::{}::{}", tag.address, tag.module, tag.name)?;
                if !tag.type_params.is_empty() {
                    let params: Vec<String> = tag.type_params.iter().map(|p| p.to_string()).collect();
                    write!(f, "<{}>", params.join(", "))?;
                }
                Ok(())
            }
        }
    }
}
