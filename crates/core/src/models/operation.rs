use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::money::Money;

/// Declares `OperationType` together with its wire table so the two can never drift.
macro_rules! operation_types {
    ($($variant:ident = $code:literal, $wire:literal;)+) => {
        /// Cash-flow / trade event kinds reported by the broker.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum OperationType {
            $($variant,)+
        }

        /// Upstream numeric code and enum name for every variant.
        /// Version 1 of the broker's operation enumeration.
        pub const OPERATION_WIRE_TABLE: &[(i32, &str, OperationType)] = &[
            $(($code, $wire, OperationType::$variant),)+
        ];
    };
}

operation_types! {
    Unspecified = 0, "OPERATION_TYPE_UNSPECIFIED";
    Input = 1, "OPERATION_TYPE_INPUT";
    BondTax = 2, "OPERATION_TYPE_BOND_TAX";
    OutputSecurities = 3, "OPERATION_TYPE_OUTPUT_SECURITIES";
    Overnight = 4, "OPERATION_TYPE_OVERNIGHT";
    Tax = 5, "OPERATION_TYPE_TAX";
    BondRepaymentFull = 6, "OPERATION_TYPE_BOND_REPAYMENT_FULL";
    SellCard = 7, "OPERATION_TYPE_SELL_CARD";
    DividendTax = 8, "OPERATION_TYPE_DIVIDEND_TAX";
    Output = 9, "OPERATION_TYPE_OUTPUT";
    BondRepayment = 10, "OPERATION_TYPE_BOND_REPAYMENT";
    TaxCorrection = 11, "OPERATION_TYPE_TAX_CORRECTION";
    ServiceFee = 12, "OPERATION_TYPE_SERVICE_FEE";
    BenefitTax = 13, "OPERATION_TYPE_BENEFIT_TAX";
    MarginFee = 14, "OPERATION_TYPE_MARGIN_FEE";
    Buy = 15, "OPERATION_TYPE_BUY";
    BuyCard = 16, "OPERATION_TYPE_BUY_CARD";
    InputSecurities = 17, "OPERATION_TYPE_INPUT_SECURITIES";
    SellMargin = 18, "OPERATION_TYPE_SELL_MARGIN";
    BrokerFee = 19, "OPERATION_TYPE_BROKER_FEE";
    BuyMargin = 20, "OPERATION_TYPE_BUY_MARGIN";
    Dividend = 21, "OPERATION_TYPE_DIVIDEND";
    Sell = 22, "OPERATION_TYPE_SELL";
    Coupon = 23, "OPERATION_TYPE_COUPON";
    SuccessFee = 24, "OPERATION_TYPE_SUCCESS_FEE";
    DividendTransfer = 25, "OPERATION_TYPE_DIVIDEND_TRANSFER";
    AccruingVarmargin = 26, "OPERATION_TYPE_ACCRUING_VARMARGIN";
    WritingOffVarmargin = 27, "OPERATION_TYPE_WRITING_OFF_VARMARGIN";
    DeliveryBuy = 28, "OPERATION_TYPE_DELIVERY_BUY";
    DeliverySell = 29, "OPERATION_TYPE_DELIVERY_SELL";
    TrackMfee = 30, "OPERATION_TYPE_TRACK_MFEE";
    TrackPfee = 31, "OPERATION_TYPE_TRACK_PFEE";
    TaxProgressive = 32, "OPERATION_TYPE_TAX_PROGRESSIVE";
    BondTaxProgressive = 33, "OPERATION_TYPE_BOND_TAX_PROGRESSIVE";
    DividendTaxProgressive = 34, "OPERATION_TYPE_DIVIDEND_TAX_PROGRESSIVE";
    BenefitTaxProgressive = 35, "OPERATION_TYPE_BENEFIT_TAX_PROGRESSIVE";
    TaxCorrectionProgressive = 36, "OPERATION_TYPE_TAX_CORRECTION_PROGRESSIVE";
    TaxRepoProgressive = 37, "OPERATION_TYPE_TAX_REPO_PROGRESSIVE";
    TaxRepo = 38, "OPERATION_TYPE_TAX_REPO";
    TaxRepoHold = 39, "OPERATION_TYPE_TAX_REPO_HOLD";
    TaxRepoRefund = 40, "OPERATION_TYPE_TAX_REPO_REFUND";
    TaxRepoHoldProgressive = 41, "OPERATION_TYPE_TAX_REPO_HOLD_PROGRESSIVE";
    TaxRepoRefundProgressive = 42, "OPERATION_TYPE_TAX_REPO_REFUND_PROGRESSIVE";
    DivExt = 43, "OPERATION_TYPE_DIV_EXT";
    TaxCorrectionCoupon = 44, "OPERATION_TYPE_TAX_CORRECTION_COUPON";
    CashFee = 45, "OPERATION_TYPE_CASH_FEE";
    OutFee = 46, "OPERATION_TYPE_OUT_FEE";
    OutStampDuty = 47, "OPERATION_TYPE_OUT_STAMP_DUTY";
    OutputSwift = 50, "OPERATION_TYPE_OUTPUT_SWIFT";
    InputSwift = 51, "OPERATION_TYPE_INPUT_SWIFT";
    OutputAcquiring = 53, "OPERATION_TYPE_OUTPUT_ACQUIRING";
    InputAcquiring = 54, "OPERATION_TYPE_INPUT_ACQUIRING";
    OutputPenalty = 55, "OPERATION_TYPE_OUTPUT_PENALTY";
    AdviceFee = 56, "OPERATION_TYPE_ADVICE_FEE";
    TransIisBs = 57, "OPERATION_TYPE_TRANS_IIS_BS";
    TransBsBs = 58, "OPERATION_TYPE_TRANS_BS_BS";
    OutMulti = 59, "OPERATION_TYPE_OUT_MULTI";
    InpMulti = 60, "OPERATION_TYPE_INP_MULTI";
    OverPlacement = 61, "OPERATION_TYPE_OVER_PLACEMENT";
    OverCom = 62, "OPERATION_TYPE_OVER_COM";
    OverIncome = 63, "OPERATION_TYPE_OVER_INCOME";
    OptionExpiration = 64, "OPERATION_TYPE_OPTION_EXPIRATION";
}

const WIRE_PREFIX: &str = "OPERATION_TYPE_";

impl OperationType {
    /// Every variant, in declaration order.
    pub fn all() -> impl Iterator<Item = OperationType> {
        OPERATION_WIRE_TABLE.iter().map(|(_, _, ty)| *ty)
    }

    pub fn from_code(code: i32) -> Option<Self> {
        OPERATION_WIRE_TABLE
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(_, _, ty)| *ty)
    }

    /// Accepts both `OPERATION_TYPE_BUY` and the bare `BUY`.
    pub fn from_wire(name: &str) -> Option<Self> {
        let upper = name.trim().to_uppercase();
        let bare = upper.strip_prefix(WIRE_PREFIX).unwrap_or(&upper);
        OPERATION_WIRE_TABLE
            .iter()
            .find(|(_, wire, _)| &wire[WIRE_PREFIX.len()..] == bare)
            .map(|(_, _, ty)| *ty)
    }

    pub fn code(&self) -> i32 {
        self.entry().0
    }

    pub fn wire_name(&self) -> &'static str {
        self.entry().1
    }

    fn entry(&self) -> &'static (i32, &'static str, OperationType) {
        OPERATION_WIRE_TABLE
            .iter()
            .find(|(_, _, ty)| ty == self)
            .unwrap_or(&OPERATION_WIRE_TABLE[0])
    }

    /// Human title, e.g. "Bond tax" for `BondTax`.
    pub fn title(&self) -> String {
        let bare = &self.wire_name()[WIRE_PREFIX.len()..];
        let lower = bare.replace('_', " ").to_lowercase();
        let mut chars = lower.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Types always shown in comparison aggregates, even when unchanged.
    pub fn always_visible(&self) -> bool {
        matches!(
            self,
            OperationType::Input
                | OperationType::Output
                | OperationType::Dividend
                | OperationType::Coupon
        )
    }

    /// Deposits and withdrawals: the external flows behind the total XIRR.
    pub fn is_pay_in_out(&self) -> bool {
        matches!(self, OperationType::Input | OperationType::Output)
    }

    /// Flows that move money in or out of a single holding.
    pub fn is_instrument_flow(&self) -> bool {
        matches!(
            self,
            OperationType::Buy
                | OperationType::BuyCard
                | OperationType::Sell
                | OperationType::Coupon
                | OperationType::Dividend
        )
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// One cash-flow / trade event of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationItem {
    pub id: String,
    pub instrument_uid: String,
    /// Legacy id after identifier upgrades.
    pub legacy_id: String,
    /// Local (broker-timezone) timestamp.
    pub date: NaiveDateTime,
    pub operation_type: OperationType,
    pub payment: Money,
}

impl OperationItem {
    pub fn key(&self) -> OperationKey {
        OperationKey {
            date: self.date,
            operation_type: self.operation_type,
            id: self.id.clone(),
        }
    }
}

/// Merge key derived from immutable operation identity.
/// Field order makes the ledger map iterate by date first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationKey {
    pub date: NaiveDateTime,
    pub operation_type: OperationType,
    pub id: String,
}

/// Running cumulative sums per operation type, sampled at requested dates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationTotals {
    pub totals: HashMap<OperationType, BTreeMap<NaiveDate, f64>>,
}

impl OperationTotals {
    /// Cumulative total of `operation_type` as of the end of `date` (0.0 if unsampled).
    pub fn get(&self, operation_type: OperationType, date: NaiveDate) -> f64 {
        self.totals
            .get(&operation_type)
            .and_then(|by_date| by_date.get(&date))
            .copied()
            .unwrap_or(0.0)
    }

    /// Whether every date in `dates` was sampled.
    pub fn covers(&self, dates: &[NaiveDate]) -> bool {
        self.totals
            .get(&OperationType::Input)
            .is_some_and(|by_date| dates.iter().all(|d| by_date.contains_key(d)))
    }
}
