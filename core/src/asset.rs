//! Registered assets

use crate::types::{Fixed8, Hash256};
use serde::{Deserialize, Serialize};

/// Asset classes. Discriminants follow the on-chain flag layout: the high
/// bit marks duty-flag (non-transferable) classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AssetType {
    GoverningToken = 0x00,
    UtilityToken = 0x01,
    Currency = 0x08,
    Token = 0x60,
    Share = 0x90,
    Invoice = 0x98,
    DutyFlag = 0x80,
}

impl AssetType {
    const DUTY_FLAG_BIT: u8 = 0x80;

    /// Duty-flag classes cannot move between arbitrary owners
    pub fn is_duty_flag(&self) -> bool {
        (*self as u8) & Self::DUTY_FLAG_BIT != 0
    }

    pub fn is_transferable(&self) -> bool {
        !self.is_duty_flag()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Hash of the register transaction that created the asset
    pub id: Hash256,
    pub asset_type: AssetType,
    pub name: String,
    /// Total issuable amount
    pub amount: Fixed8,
    /// Decimal places allowed in output values
    pub precision: u8,
}
