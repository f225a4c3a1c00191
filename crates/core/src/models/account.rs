use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::instrument::InstrumentType;
use super::money::Money;

/// Kind of brokerage account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Broker,
    Iis,
    InvestBox,
}

impl AccountType {
    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind.trim().to_uppercase().as_str() {
            "ACCOUNT_TYPE_TINKOFF" | "BROKER" => Some(AccountType::Broker),
            "ACCOUNT_TYPE_TINKOFF_IIS" | "IIS" => Some(AccountType::Iis),
            "ACCOUNT_TYPE_INVEST_BOX" | "INVESTBOX" | "INVEST_BOX" => Some(AccountType::InvestBox),
            _ => None,
        }
    }

    /// Only brokerage and IIS accounts are synced.
    pub fn is_tracked(&self) -> bool {
        matches!(self, AccountType::Broker | AccountType::Iis)
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountType::Broker => write!(f, "Broker"),
            AccountType::Iis => write!(f, "IIS"),
            AccountType::InvestBox => write!(f, "InvestBox"),
        }
    }
}

/// One holding of one account at one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument_type: InstrumentType,
    /// Legacy (figi-like) instrument id as reported with the holding.
    pub instrument_id: String,
    pub instrument_uid: String,
    pub quantity: f64,
    pub average_price: Money,
    /// Unrealized gain, in the average price currency.
    pub expected_yield: Money,
    /// Accrued coupon interest of the whole holding.
    pub accrued_interest: Money,
}

/// Identity of an account as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub account_type: AccountType,
}

/// An account with its dated snapshot history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub account_type: AccountType,
    /// Snapshot date → holdings, at most one entry per instrument.
    pub positions: BTreeMap<NaiveDate, Vec<Position>>,
}

impl Account {
    pub fn new(info: &AccountInfo) -> Self {
        Self {
            id: info.id.clone(),
            name: info.name.clone(),
            account_type: info.account_type,
            positions: BTreeMap::new(),
        }
    }

    /// Snapshot dates, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.positions.keys().copied().collect()
    }

    pub fn snapshot(&self, date: NaiveDate) -> Option<&[Position]> {
        self.positions.get(&date).map(|p| p.as_slice())
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.positions.keys().next_back().copied()
    }
}
