//! Contract manifest model.
//!
//! Only the ABI method table is typed; every other manifest field is carried through
//! untouched so that a rewritten manifest differs from its input in method offsets only.

use crate::result::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractManifest {
    pub name: String,
    pub abi: ContractAbi,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractAbi {
    pub methods: Vec<MethodDescriptor>,
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    #[serde(rename = "returntype")]
    pub return_type: String,
    /// Byte offset of the method's first instruction.
    pub offset: usize,
    #[serde(default)]
    pub safe: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ContractManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Method offsets in ascending order, without duplicates.
    pub fn method_offsets(&self) -> Vec<usize> {
        let mut offsets: Vec<usize> = self.abi.methods.iter().map(|m| m.offset).collect();
        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.abi.methods.iter().find(|m| m.name == name)
    }
}
