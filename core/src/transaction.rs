//! Transaction structures and types

use crate::asset::AssetType;
use crate::types::{Fixed8, Hash160, Hash256};
use serde::{Deserialize, Serialize};

/// Pointer to output `prev_index` of transaction `prev_hash`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoinReference {
    pub prev_hash: Hash256,
    pub prev_index: u16,
}

impl CoinReference {
    pub fn new(prev_hash: Hash256, prev_index: u16) -> Self {
        Self {
            prev_hash,
            prev_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub asset_id: Hash256,
    pub value: Fixed8,
    /// Owner of the output
    pub script_hash: Hash160,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AttributeUsage {
    ContractHash = 0x00,
    /// Reserved for ECDH key exchange, never valid on the wire
    Ecdh02 = 0x02,
    /// Reserved for ECDH key exchange, never valid on the wire
    Ecdh03 = 0x03,
    Script = 0x20,
    Vote = 0x30,
    DescriptionUrl = 0x81,
    Description = 0x90,
    Remark = 0xf0,
}

impl AttributeUsage {
    pub fn is_reserved(&self) -> bool {
        matches!(self, AttributeUsage::Ecdh02 | AttributeUsage::Ecdh03)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAttribute {
    pub usage: AttributeUsage,
    pub data: Vec<u8>,
}

/// Signature proof authorizing a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Signature bytes
    pub invocation_script: Vec<u8>,
    /// Public key bytes
    pub verification_script: Vec<u8>,
}

/// Kind-specific transaction payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Block reward, first transaction of every block
    Miner { nonce: u32 },
    Issue,
    Claim { claims: Vec<CoinReference> },
    Enrollment { public_key: Vec<u8> },
    Register {
        asset_type: AssetType,
        name: String,
        amount: Fixed8,
        precision: u8,
        admin: Hash160,
    },
    Contract,
    /// Deploys a contract script
    Publish { script: Vec<u8>, name: String },
    Invocation { script: Vec<u8>, gas: Fixed8 },
}

impl TransactionKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransactionKind::Miner { .. } => "miner",
            TransactionKind::Issue => "issue",
            TransactionKind::Claim { .. } => "claim",
            TransactionKind::Enrollment { .. } => "enrollment",
            TransactionKind::Register { .. } => "register",
            TransactionKind::Contract => "contract",
            TransactionKind::Publish { .. } => "publish",
            TransactionKind::Invocation { .. } => "invocation",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            TransactionKind::Miner { .. } => 0x00,
            TransactionKind::Issue => 0x01,
            TransactionKind::Claim { .. } => 0x02,
            TransactionKind::Enrollment { .. } => 0x20,
            TransactionKind::Register { .. } => 0x40,
            TransactionKind::Contract => 0x80,
            TransactionKind::Publish { .. } => 0xd0,
            TransactionKind::Invocation { .. } => 0xd1,
        }
    }

    fn write_hash_input(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag());
        match self {
            TransactionKind::Miner { nonce } => buf.extend_from_slice(&nonce.to_le_bytes()),
            TransactionKind::Claim { claims } => {
                buf.extend_from_slice(&(claims.len() as u32).to_le_bytes());
                for claim in claims {
                    claim.write_hash_input(buf);
                }
            }
            TransactionKind::Enrollment { public_key } => put_bytes(buf, public_key),
            TransactionKind::Register {
                asset_type,
                name,
                amount,
                precision,
                admin,
            } => {
                buf.push(*asset_type as u8);
                put_bytes(buf, name.as_bytes());
                buf.extend_from_slice(&amount.raw().to_le_bytes());
                buf.push(*precision);
                buf.extend_from_slice(&admin.0);
            }
            TransactionKind::Publish { script, name } => {
                put_bytes(buf, script);
                put_bytes(buf, name.as_bytes());
            }
            TransactionKind::Invocation { script, gas } => {
                put_bytes(buf, script);
                buf.extend_from_slice(&gas.raw().to_le_bytes());
            }
            TransactionKind::Issue | TransactionKind::Contract => {}
        }
    }
}

impl CoinReference {
    fn write_hash_input(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.prev_hash.0);
        buf.extend_from_slice(&self.prev_index.to_le_bytes());
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u8,
    pub kind: TransactionKind,
    pub attributes: Vec<TransactionAttribute>,
    pub inputs: Vec<CoinReference>,
    pub outputs: Vec<TransactionOutput>,
    pub witnesses: Vec<Witness>,
    /// Set once by `sign`, never rewritten
    #[serde(default)]
    hash: Option<Hash256>,
}

impl Transaction {
    pub fn new(kind: TransactionKind) -> Self {
        Transaction {
            version: 0,
            kind,
            attributes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            witnesses: Vec::new(),
            hash: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<TransactionAttribute>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<CoinReference>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<TransactionOutput>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_witnesses(mut self, witnesses: Vec<Witness>) -> Self {
        self.witnesses = witnesses;
        self
    }

    pub fn hash(&self) -> Option<Hash256> {
        self.hash
    }

    pub fn is_signed(&self) -> bool {
        self.hash.is_some()
    }

    /// Compute and store the hash if it has not been computed yet
    pub fn sign(&mut self) -> Hash256 {
        match self.hash {
            Some(hash) => hash,
            None => {
                let hash = self.compute_hash();
                self.hash = Some(hash);
                hash
            }
        }
    }

    /// Double SHA-256 over everything except witnesses
    pub fn compute_hash(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(128);
        buf.push(self.version);
        self.kind.write_hash_input(&mut buf);

        buf.extend_from_slice(&(self.attributes.len() as u32).to_le_bytes());
        for attribute in &self.attributes {
            buf.push(attribute.usage as u8);
            put_bytes(&mut buf, &attribute.data);
        }

        buf.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            input.write_hash_input(&mut buf);
        }

        buf.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            buf.extend_from_slice(&output.asset_id.0);
            buf.extend_from_slice(&output.value.raw().to_le_bytes());
            buf.extend_from_slice(&output.script_hash.0);
        }

        Hash256::digest(&buf)
    }

    /// True when the stored hash (if any) matches the content
    pub fn is_hash_consistent(&self) -> bool {
        self.hash.map_or(true, |hash| hash == self.compute_hash())
    }

    pub fn is_miner(&self) -> bool {
        matches!(self.kind, TransactionKind::Miner { .. })
    }

    pub fn is_claim(&self) -> bool {
        matches!(self.kind, TransactionKind::Claim { .. })
    }
}
