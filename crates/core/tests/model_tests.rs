// ═══════════════════════════════════════════════════════════════════
// Model Tests — currencies, operation kinds, identifiers, settings
// ═══════════════════════════════════════════════════════════════════

use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};

use portfolio_ledger_core::errors::CoreError;
use portfolio_ledger_core::models::account::AccountType;
use portfolio_ledger_core::models::clock::{end_of_day, start_of_day, Clock};
use portfolio_ledger_core::models::comparison::Delta;
use portfolio_ledger_core::models::instrument::{Instrument, InstrumentType, BASE_CASH_ID};
use portfolio_ledger_core::models::money::{Currency, Money};
use portfolio_ledger_core::models::operation::{OperationType, OPERATION_WIRE_TABLE};
use portfolio_ledger_core::models::price::{PriceItem, PriceSeries};
use portfolio_ledger_core::models::remap::IdentifierRemap;
use portfolio_ledger_core::models::settings::LedgerSettings;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn item(date: NaiveDate, price: f64) -> PriceItem {
    PriceItem {
        date,
        price,
        is_closed: true,
    }
}

// ═══════════════════════════════════════════════════════════════════
// Currency & Money
// ═══════════════════════════════════════════════════════════════════

mod currency {
    use super::*;

    #[test]
    fn codes_parse_case_insensitively() {
        assert_eq!(Currency::from_code("usd"), Some(Currency::Usd));
        assert_eq!(Currency::from_code(" RUB "), Some(Currency::Rub));
        assert_eq!(Currency::from_code("xau"), None);
        assert_eq!("eur".parse::<Currency>().unwrap(), Currency::Eur);
    }

    #[test]
    fn unknown_code_is_an_error() {
        let err = "btc".parse::<Currency>().unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedCurrency(code) if code == "btc"));
    }

    #[test]
    fn every_code_round_trips() {
        for c in Currency::ALL {
            assert_eq!(Currency::from_code(c.code()), Some(c));
            assert_eq!(c.to_string(), c.code());
        }
    }

    #[test]
    fn money_defaults_to_zero_rubles() {
        assert_eq!(Money::default(), Money::zero(Currency::Rub));
        assert_eq!(Money::new(Currency::Usd, 2.5).amount, 2.5);
    }
}

// ═══════════════════════════════════════════════════════════════════
// OperationType
// ═══════════════════════════════════════════════════════════════════

mod operation_type {
    use super::*;

    #[test]
    fn wire_names_with_and_without_prefix() {
        assert_eq!(OperationType::from_wire("OPERATION_TYPE_BUY"), Some(OperationType::Buy));
        assert_eq!(OperationType::from_wire("buy"), Some(OperationType::Buy));
        assert_eq!(
            OperationType::from_wire("OPERATION_TYPE_DIVIDEND_TAX"),
            Some(OperationType::DividendTax)
        );
        assert_eq!(OperationType::from_wire("OPERATION_TYPE_NOPE"), None);
    }

    #[test]
    fn numeric_codes() {
        assert_eq!(OperationType::from_code(15), Some(OperationType::Buy));
        assert_eq!(OperationType::from_code(64), Some(OperationType::OptionExpiration));
        // Gaps in the upstream numbering.
        assert_eq!(OperationType::from_code(48), None);
        assert_eq!(OperationType::Coupon.code(), 23);
    }

    #[test]
    fn table_is_consistent() {
        assert_eq!(OperationType::all().count(), OPERATION_WIRE_TABLE.len());
        for ty in OperationType::all() {
            assert_eq!(OperationType::from_code(ty.code()), Some(ty));
            assert_eq!(OperationType::from_wire(ty.wire_name()), Some(ty));
        }
    }

    #[test]
    fn titles() {
        assert_eq!(OperationType::Input.title(), "Input");
        assert_eq!(OperationType::BondTax.title(), "Bond tax");
        assert_eq!(OperationType::BrokerFee.to_string(), "Broker fee");
    }

    #[test]
    fn classification() {
        assert!(OperationType::Input.always_visible());
        assert!(OperationType::Coupon.always_visible());
        assert!(!OperationType::Tax.always_visible());

        assert!(OperationType::Output.is_pay_in_out());
        assert!(!OperationType::Dividend.is_pay_in_out());

        assert!(OperationType::BuyCard.is_instrument_flow());
        assert!(OperationType::Dividend.is_instrument_flow());
        assert!(!OperationType::BrokerFee.is_instrument_flow());
    }
}

// ═══════════════════════════════════════════════════════════════════
// IdentifierRemap
// ═══════════════════════════════════════════════════════════════════

mod remap {
    use super::*;

    #[test]
    fn unknown_ids_pass_through() {
        assert_eq!(IdentifierRemap::new().upgrade("AAA"), "AAA");
    }

    #[test]
    fn chains_are_followed() {
        let remap = IdentifierRemap::from_pairs([("A1", "A2"), ("A2", "A3")]);
        assert_eq!(remap.upgrade("A1"), "A3");
        assert_eq!(remap.upgrade("A2"), "A3");
        assert_eq!(remap.len(), 2);
    }

    #[test]
    fn cycles_terminate() {
        let mut remap = IdentifierRemap::new();
        remap.insert("X", "Y");
        remap.insert("Y", "X");
        let upgraded = remap.upgrade("X");
        assert!(upgraded == "X" || upgraded == "Y");
    }

    #[test]
    fn serializes_as_a_plain_map() {
        let remap = IdentifierRemap::from_pairs([("OLD", "NEW")]);
        assert_eq!(serde_json::to_string(&remap).unwrap(), r#"{"OLD":"NEW"}"#);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Delta
// ═══════════════════════════════════════════════════════════════════

mod delta {
    use super::*;

    #[test]
    fn both_zero_is_empty() {
        assert_eq!(Delta::between(0.0, 0.0), Delta::empty());
    }

    #[test]
    fn unchanged_keeps_values_only() {
        let delta = Delta::between(5.0, 5.0);
        assert_eq!(delta.old, Some(5.0));
        assert_eq!(delta.new, Some(5.0));
        assert_eq!(delta.diff, None);
        assert_eq!(delta.diff_pct, None);
    }

    #[test]
    fn percent_is_relative_to_the_magnitude() {
        let delta = Delta::between(-100.0, -50.0);
        assert_eq!(delta.diff, Some(50.0));
        assert_eq!(delta.diff_pct, Some(50.0));
    }

    #[test]
    fn from_zero_is_infinite() {
        assert_eq!(Delta::between(0.0, 3.0).diff_pct, Some(f64::INFINITY));
    }
}

// ═══════════════════════════════════════════════════════════════════
// PriceSeries
// ═══════════════════════════════════════════════════════════════════

mod price_series {
    use super::*;

    #[test]
    fn set_keeps_order_and_replaces() {
        let mut series = PriceSeries::new();
        series.set(item(d(2024, 6, 3), 3.0));
        series.set(item(d(2024, 6, 1), 1.0));
        series.set(item(d(2024, 6, 3), 4.0));
        assert_eq!(series.len(), 2);
        assert_eq!(series.first_date(), Some(d(2024, 6, 1)));
        assert_eq!(series.get(d(2024, 6, 3)).unwrap().price, 4.0);
    }

    #[test]
    fn neighbours() {
        let mut series = PriceSeries::new();
        series.set(item(d(2024, 6, 1), 1.0));
        series.set(item(d(2024, 6, 5), 5.0));
        assert_eq!(series.find_lt(d(2024, 6, 5)), Some(d(2024, 6, 1)));
        assert_eq!(series.find_lt(d(2024, 6, 1)), None);
        assert_eq!(series.find_gt(d(2024, 6, 1)), Some(d(2024, 6, 5)));
        assert_eq!(series.find_gt(d(2024, 6, 5)), None);
    }

    #[test]
    fn fill_forward_leaves_the_head_empty() {
        let mut series = PriceSeries::new();
        series.set(item(d(2024, 6, 3), 3.0));
        series.set(item(d(2024, 6, 6), 6.0));

        let filled = series.fill_forward(d(2024, 6, 1), d(2024, 6, 8));
        // 4th, 5th, 7th, 8th.
        assert_eq!(filled, 4);
        assert!(series.get(d(2024, 6, 2)).is_none());
        assert_eq!(series.get(d(2024, 6, 5)).unwrap().price, 3.0);
        assert_eq!(series.get(d(2024, 6, 8)).unwrap().price, 6.0);
        assert_eq!(series.range(d(2024, 6, 4), d(2024, 6, 6)).len(), 3);
    }

    #[test]
    fn provisional_items_are_evicted() {
        let mut series = PriceSeries::new();
        series.set(item(d(2024, 6, 1), 1.0));
        series.set(PriceItem {
            is_closed: false,
            ..item(d(2024, 6, 2), 2.0)
        });
        assert_eq!(series.evict_unclosed(), 1);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn tail_fills_marked_provisional() {
        let mut series = PriceSeries::new();
        series.set(item(d(2024, 6, 10), 1.0));
        series.set(item(d(2024, 6, 12), 2.0));
        assert_eq!(series.fill_forward(d(2024, 6, 10), d(2024, 6, 14)), 3);

        assert_eq!(series.mark_provisional_after(d(2024, 6, 12), d(2024, 6, 14)), 2);
        assert!(series.get(d(2024, 6, 11)).unwrap().is_closed);
        assert!(series.get(d(2024, 6, 12)).unwrap().is_closed);
        assert!(!series.get(d(2024, 6, 13)).unwrap().is_closed);

        assert_eq!(series.evict_unclosed(), 2);
        assert_eq!(series.len(), 3);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Instruments & accounts
// ═══════════════════════════════════════════════════════════════════

mod instrument {
    use super::*;

    fn bond(nominal: Option<Money>) -> Instrument {
        Instrument {
            instrument_type: InstrumentType::Bond,
            nominal,
            sector: String::new(),
            ..Instrument::base_cash(Currency::Rub)
        }
    }

    #[test]
    fn bonds_are_quoted_in_percent_of_nominal() {
        assert_eq!(bond(Some(Money::new(Currency::Rub, 1000.0))).nominal_rate(), 10.0);
        assert_eq!(bond(None).nominal_rate(), 1.0);
        assert_eq!(Instrument::base_cash(Currency::Rub).nominal_rate(), 1.0);
    }

    #[test]
    fn display_sector() {
        let mut instrument = bond(None);
        assert_eq!(instrument.display_sector(), "Other");
        instrument.sector = "it".into();
        assert_eq!(instrument.display_sector(), "It");
        instrument.sector = " FINANCIAL ".into();
        assert_eq!(instrument.display_sector(), "Financial");
    }

    #[test]
    fn base_cash() {
        let cash = Instrument::base_cash(Currency::Rub);
        assert_eq!(cash.uid, BASE_CASH_ID);
        assert_eq!(cash.ticker, "RUB");
        assert_eq!(cash.name, "Russian ruble");
        assert_eq!(cash.instrument_type, InstrumentType::Currency);
    }

    #[test]
    fn base_cash_follows_the_base_currency() {
        let cash = Instrument::base_cash(Currency::Usd);
        assert_eq!(cash.uid, BASE_CASH_ID);
        assert_eq!(cash.currency, Currency::Usd);
        assert_eq!(cash.ticker, "USD");
        assert_eq!(cash.name, "US dollar");
        assert_eq!(cash.nominal, Some(Money::zero(Currency::Usd)));
    }

    #[test]
    fn instrument_kinds_from_wire() {
        assert_eq!(InstrumentType::from_wire("share"), Some(InstrumentType::Share));
        assert_eq!(InstrumentType::from_wire("INSTRUMENT_TYPE_BOND"), Some(InstrumentType::Bond));
        assert_eq!(InstrumentType::from_wire("option"), None);
        assert_eq!(InstrumentType::Share.to_string(), "Stock");
    }

    #[test]
    fn account_kinds() {
        assert_eq!(AccountType::from_wire("ACCOUNT_TYPE_TINKOFF"), Some(AccountType::Broker));
        assert_eq!(AccountType::from_wire("ACCOUNT_TYPE_TINKOFF_IIS"), Some(AccountType::Iis));
        assert_eq!(AccountType::from_wire("ACCOUNT_TYPE_UNSPECIFIED"), None);
        assert!(AccountType::Iis.is_tracked());
        assert!(!AccountType::InvestBox.is_tracked());
    }
}

// ═══════════════════════════════════════════════════════════════════
// LedgerSettings
// ═══════════════════════════════════════════════════════════════════

mod settings {
    use super::*;

    #[test]
    fn empty_document_is_the_default() {
        let settings = LedgerSettings::from_json("{}").unwrap();
        assert_eq!(settings, LedgerSettings::default());
        assert_eq!(settings.base_currency, Currency::Rub);
        assert_eq!(settings.fx_proxies[&Currency::Usd], "BBG0013HGFT4");
        assert!(settings.cash_ledger_ids.contains("RUB000UTSTOM"));
        assert_eq!(settings.price_window_days, 180);
        assert_eq!(settings.retention.bucket_days, 28);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let json = r#"{
            "price_window_days": 30,
            "identifier_upgrades": {"OLD": "NEW"},
            "retention": {"bucket_days": 7}
        }"#;
        let settings = LedgerSettings::from_json(json).unwrap();
        assert_eq!(settings.price_window_days, 30);
        assert_eq!(settings.identifier_upgrades.upgrade("OLD"), "NEW");
        assert_eq!(settings.retention.bucket_days, 7);
        assert_eq!(settings.retention.full_density_days, 180);
    }

    #[test]
    fn json_round_trip() {
        let settings = LedgerSettings::default();
        let json = settings.to_json().unwrap();
        assert_eq!(LedgerSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn invalid_values() {
        for json in [
            r#"{"price_window_days": 0}"#,
            r#"{"operations_page_size": 0}"#,
            r#"{"utc_offset_seconds": 200000}"#,
            r#"{"retention": {"bucket_days": 0}}"#,
            r#"{"price_window_days": 100000000000}"#,
            r#"{"first_trade_lookback_days": 36501}"#,
            r#"{"retention": {"full_density_days": 9223372036854775807}}"#,
            r#"{"retention": {"bucket_days": 50000}}"#,
        ] {
            let err = LedgerSettings::from_json(json).unwrap_err();
            assert!(matches!(err, CoreError::InvalidSettings(_)), "{json}");
        }
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            LedgerSettings::from_json("{not json"),
            Err(CoreError::Deserialization(_))
        ));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Clock
// ═══════════════════════════════════════════════════════════════════

mod clock {
    use super::*;

    fn msk() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    #[test]
    fn late_utc_evening_is_next_local_day() {
        let instant = Utc.with_ymd_and_hms(2024, 6, 14, 22, 30, 0).unwrap();
        let clock = Clock::at(msk(), instant);
        assert_eq!(clock.today(), d(2024, 6, 15));
        assert_eq!(clock.local_date(instant), d(2024, 6, 15));
    }

    #[test]
    fn local_and_utc_agree() {
        let clock = Clock::fixed(msk(), d(2024, 6, 15).and_hms_opt(12, 0, 0).unwrap());
        let utc = clock.to_utc(clock.now());
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap());
        assert_eq!(clock.to_local(utc), clock.now());
    }

    #[test]
    fn day_bounds() {
        assert_eq!(start_of_day(d(2024, 6, 15)), d(2024, 6, 15).and_hms_opt(0, 0, 0).unwrap());
        let end = end_of_day(d(2024, 6, 15));
        assert_eq!(end.date(), d(2024, 6, 15));
        assert!(end > d(2024, 6, 15).and_hms_opt(23, 59, 59).unwrap());
    }
}
