//! Names for `SYSCALL` hashes and native contract script hashes.
//!
//! The registry is plain data handed to whoever renders instructions; nothing in the core
//! consults a global table.

use crate::nef::script_hash_string;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

const NEO_N3_SYSCALLS: &[&str] = &[
    "System.Contract.Call",
    "System.Contract.CallNative",
    "System.Contract.GetCallFlags",
    "System.Contract.CreateStandardAccount",
    "System.Contract.CreateMultisigAccount",
    "System.Contract.NativeOnPersist",
    "System.Contract.NativePostPersist",
    "System.Crypto.CheckSig",
    "System.Crypto.CheckMultisig",
    "System.Iterator.Next",
    "System.Iterator.Value",
    "System.Runtime.Platform",
    "System.Runtime.GetNetwork",
    "System.Runtime.GetAddressVersion",
    "System.Runtime.GetTrigger",
    "System.Runtime.GetTime",
    "System.Runtime.GetScriptContainer",
    "System.Runtime.GetExecutingScriptHash",
    "System.Runtime.GetCallingScriptHash",
    "System.Runtime.GetEntryScriptHash",
    "System.Runtime.LoadScript",
    "System.Runtime.CheckWitness",
    "System.Runtime.GetInvocationCounter",
    "System.Runtime.GetRandom",
    "System.Runtime.Log",
    "System.Runtime.Notify",
    "System.Runtime.GetNotifications",
    "System.Runtime.GasLeft",
    "System.Runtime.BurnGas",
    "System.Runtime.CurrentSigners",
    "System.Storage.GetContext",
    "System.Storage.GetReadOnlyContext",
    "System.Storage.AsReadOnly",
    "System.Storage.Get",
    "System.Storage.Find",
    "System.Storage.Put",
    "System.Storage.Delete",
    "System.Storage.Local.Get",
    "System.Storage.Local.Find",
    "System.Storage.Local.Put",
    "System.Storage.Local.Delete",
];

const NEO_N3_CONTRACTS: &[(&str, &str)] = &[
    ("0xfffdc93764dbaddd97c48f252a53ea4643faa3fd", "ContractManagement"),
    ("0xacce6fd80d44e1796aa0c2c625e9e4e0ce39efc0", "StdLib"),
    ("0x726cb6e0cd8628a1350a611384688911ab75f51b", "CryptoLib"),
    ("0xda65b600f7124ce6c79950c1772a36403104f2be", "LedgerContract"),
    ("0xef4073a0f2b305a38ec4050e4d3d28bc40ea63f5", "NeoToken"),
    ("0xd2a4cff31913016155e38e474a2c06d08be276cf", "GasToken"),
    ("0xcc5e4edd9f5f8dba8bb65734541df7a1c081c67b", "PolicyContract"),
    ("0x49cf4e5378ffcd4dec034fd98a174c5491e395e2", "RoleManagement"),
    ("0xfe924b7cfe89ddd271abaf7210a80a7e11178758", "OracleContract"),
];

/// `SYSCALL` operand value for an interop service name.
pub fn interop_hash(name: &str) -> u32 {
    let digest = Sha256::digest(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Lookup table for interop service names and well-known contract hashes.
#[derive(Debug, Clone, Default)]
pub struct InteropRegistry {
    syscalls: HashMap<u32, String>,
    /// Keyed by `0x`-prefixed big-endian hash text.
    contracts: HashMap<String, String>,
}

impl InteropRegistry {
    /// An empty registry: every syscall and token renders as unknown.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Interop services and native contracts of Neo N3.
    pub fn neo_n3() -> Self {
        let mut registry = Self::from_names(NEO_N3_SYSCALLS.iter().copied());
        for (hash, name) in NEO_N3_CONTRACTS {
            registry.register_contract(hash, *name);
        }
        registry
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let syscalls = names
            .into_iter()
            .map(|name| (interop_hash(name), name.to_string()))
            .collect();
        Self {
            syscalls,
            contracts: HashMap::new(),
        }
    }

    pub fn register_syscall(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.syscalls.insert(interop_hash(&name), name);
    }

    /// Registers a contract by its `0x`-prefixed big-endian hash.
    pub fn register_contract(&mut self, hash: &str, name: impl Into<String>) {
        self.contracts.insert(hash.to_ascii_lowercase(), name.into());
    }

    pub fn syscall_name(&self, hash: u32) -> Option<&str> {
        self.syscalls.get(&hash).map(String::as_str)
    }

    /// Name of the contract with the given little-endian script hash.
    pub fn contract_name(&self, hash: &[u8; 20]) -> Option<&str> {
        self.contracts
            .get(&script_hash_string(hash))
            .map(String::as_str)
    }
}
