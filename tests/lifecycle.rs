//! End-to-end order and position lifecycle through the public engine API

use aleph_margin::core::{
    AccountId, Config, FillConfirmation, InboundEvent, OrderRequest, OrderStatus, PriceTick, RejectNotice, Side,
};
use aleph_margin::execution::{PaperMatcher, matching};
use aleph_margin::feeds::{Inbound, ipc};
use aleph_margin::settlement::{CreditLedger, ForceClose};
use aleph_margin::{EngineEvent, Error, RiskCalculator, TradingEngine};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn setup(balance: Decimal) -> TradingEngine {
    let engine = TradingEngine::new(RiskCalculator::default());
    engine.open_account(AccountId::new("paper"), "USDT", balance).unwrap();
    engine
}

fn paper() -> AccountId {
    AccountId::new("paper")
}

fn fill(engine: &TradingEngine, order_id: uuid::Uuid, amount: Decimal, price: Decimal) {
    engine.handle(InboundEvent::Fill(FillConfirmation {
        order_id,
        filled_delta: amount,
        fill_price: price,
    }));
}

#[test]
fn test_market_buy_debits_margin_and_fee() {
    let engine = setup(dec!(100000));
    engine.handle(InboundEvent::Tick(PriceTick::new("BTC", dec!(35000))));

    let order = engine
        .place_order(&OrderRequest::market("paper", "BTC", Side::Buy, dec!(1)).with_leverage(10))
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.margin, dec!(3500));
    assert_eq!(order.fee, dec!(17.5));
    assert_eq!(engine.snapshot(&paper()).unwrap().available, dec!(96482.5));

    fill(&engine, order.id, dec!(1), dec!(35000));
    let snapshot = engine.snapshot(&paper()).unwrap();
    assert_eq!(snapshot.positions.len(), 1);
    assert_eq!(snapshot.positions[0].liquidation_price, dec!(31675));
    assert_eq!(snapshot.history_orders[0].status, OrderStatus::Filled);
}

#[test]
fn test_sell_liquidation_above_entry() {
    let engine = setup(dec!(100000));
    engine.on_price_tick(&PriceTick::new("BTC", dec!(35000)));

    let quote = engine
        .quote(&OrderRequest::market("paper", "BTC", Side::Sell, dec!(1)).with_leverage(10))
        .unwrap();
    assert_eq!(quote.liquidation_price, dec!(38325));
}

#[test]
fn test_same_direction_fills_average_entry() {
    let engine = setup(dec!(100000));
    let first = engine
        .place_order(&OrderRequest::limit("paper", "BTC", Side::Buy, dec!(1), dec!(30000)))
        .unwrap();
    let second = engine
        .place_order(&OrderRequest::limit("paper", "BTC", Side::Buy, dec!(1), dec!(32000)))
        .unwrap();

    fill(&engine, first.id, dec!(1), dec!(30000));
    fill(&engine, second.id, dec!(1), dec!(32000));

    let positions = engine.snapshot(&paper()).unwrap().positions;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].amount, dec!(2));
    assert_eq!(positions[0].entry_price, dec!(31000));
}

#[test]
fn test_tick_revalues_open_position() {
    let engine = setup(dec!(100000));
    let order = engine
        .place_order(&OrderRequest::limit("paper", "BTC", Side::Buy, dec!(2), dec!(30000)).with_leverage(5))
        .unwrap();
    fill(&engine, order.id, dec!(2), dec!(30000));

    assert_eq!(engine.on_price_tick(&PriceTick::new("BTC", dec!(31000))), 1);
    let snapshot = engine.snapshot(&paper()).unwrap();
    assert_eq!(snapshot.positions[0].mark_price, dec!(31000));
    assert_eq!(snapshot.positions[0].unrealized_pnl, dec!(10000));
    assert_eq!(snapshot.total_unrealized_pnl, dec!(10000));
}

#[test]
fn test_cancel_filled_order_is_noop() {
    let engine = setup(dec!(100000));
    let order = engine
        .place_order(&OrderRequest::limit("paper", "BTC", Side::Buy, dec!(1), dec!(30000)))
        .unwrap();
    fill(&engine, order.id, dec!(1), dec!(30000));

    assert!(engine.cancel_order(&paper(), &order.id).is_none());
    let snapshot = engine.snapshot(&paper()).unwrap();
    assert_eq!(snapshot.history_orders[0].status, OrderStatus::Filled);
}

#[test]
fn test_partial_fill_then_cancel() {
    let engine = setup(dec!(100000));
    let order = engine
        .place_order(&OrderRequest::limit("paper", "ETH", Side::Sell, dec!(4), dec!(2000)))
        .unwrap();
    fill(&engine, order.id, dec!(1), dec!(2000));

    let snapshot = engine.snapshot(&paper()).unwrap();
    assert_eq!(snapshot.active_orders[0].status, OrderStatus::Partially);
    assert_eq!(snapshot.positions[0].amount, dec!(1));

    let canceled = engine.cancel_order(&paper(), &order.id).unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert_eq!(canceled.filled, dec!(1));

    // fills after cancel are dropped
    fill(&engine, order.id, dec!(1), dec!(2000));
    assert_eq!(engine.snapshot(&paper()).unwrap().positions[0].amount, dec!(1));
}

#[test]
fn test_reject_pending_order() {
    let engine = setup(dec!(100000));
    let events = engine.subscribe();
    let order = engine
        .place_order(&OrderRequest::limit("paper", "BTC", Side::Buy, dec!(1), dec!(30000)))
        .unwrap();

    engine.handle(InboundEvent::Reject(RejectNotice {
        order_id: order.id,
        reason: "risk limit".into(),
    }));

    let snapshot = engine.snapshot(&paper()).unwrap();
    assert!(snapshot.active_orders.is_empty());
    assert_eq!(snapshot.history_orders[0].status, OrderStatus::Rejected);
    assert!(events.drain().iter().any(|e| matches!(
        e,
        EngineEvent::OrderRejected { reason, .. } if reason == "risk limit"
    )));
}

#[test]
fn test_insufficient_funds_leaves_ledger() {
    let engine = setup(dec!(1000));
    let err = engine
        .place_order(&OrderRequest::limit("paper", "BTC", Side::Buy, dec!(1), dec!(30000)).with_leverage(10))
        .unwrap_err();

    assert!(matches!(err, Error::InsufficientFunds { .. }));
    let snapshot = engine.snapshot(&paper()).unwrap();
    assert_eq!(snapshot.available, dec!(1000));
    assert!(snapshot.active_orders.is_empty());
}

#[test]
fn test_market_without_price_is_unavailable() {
    let engine = setup(dec!(100000));
    let err = engine
        .place_order(&OrderRequest::market("paper", "DOGE", Side::Buy, dec!(10)))
        .unwrap_err();
    assert!(matches!(err, Error::PriceUnavailable(_)));
}

#[test]
fn test_paper_matcher_round_trip() {
    let engine = setup(dec!(100000));
    engine.on_price_tick(&PriceTick::new("BTC", dec!(30500)));
    engine
        .place_order(&OrderRequest::limit("paper", "BTC", Side::Buy, dec!(1), dec!(30000)))
        .unwrap();

    let matcher = PaperMatcher::new();
    assert!(matching::sweep(&matcher, &engine.open_orders(), engine.prices()).is_empty());

    engine.on_price_tick(&PriceTick::new("BTC", dec!(29900)));
    for f in matching::sweep(&matcher, &engine.open_orders(), engine.prices()) {
        engine.handle(InboundEvent::Fill(f));
    }

    let snapshot = engine.snapshot(&paper()).unwrap();
    assert!(snapshot.active_orders.is_empty());
    assert_eq!(snapshot.positions[0].entry_price, dec!(30000));
}

#[test]
fn test_ipc_lines_drive_engine() {
    let engine = setup(dec!(100000));
    let lines = [
        r#"{"type":"tick","payload":{"symbol":"BTC","price":"35000","ts":1}}"#,
        r#"{"type":"place","payload":{"account":"paper","symbol":"BTC","kind":"market","side":"buy","amount":"1","leverage":10}}"#,
    ];
    for line in lines {
        match ipc::decode(line).unwrap() {
            Inbound::Event(event) => engine.handle(event),
            Inbound::Place(request) => {
                engine.place_order(&request).unwrap();
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    let snapshot = engine.snapshot(&paper()).unwrap();
    assert_eq!(snapshot.active_orders.len(), 1);
    assert_eq!(snapshot.active_orders[0].price, dec!(35000));
}

#[test]
fn test_root_config_parses() {
    let config = Config::parse(include_str!("../config.toml")).unwrap();
    assert_eq!(config.risk.fee_rate, dec!(0.0005));
    assert_eq!(config.risk.maintenance_margin_rate, dec!(0.005));
    assert_eq!(config.account.id, "paper");

    let engine = TradingEngine::from_config(&config);
    assert!(
        engine
            .open_account(AccountId::new(config.account.id.clone()), config.account.quote_asset, config.account.initial_balance)
            .is_ok()
    );
}

/// Any positive decimal, from the smallest fraction up to `Decimal::MAX`
fn any_positive() -> impl Strategy<Value = Decimal> {
    (1u128..(1u128 << 96), 0u32..=28).prop_map(|(m, scale)| Decimal::from_i128_with_scale(m as i128, scale))
}

fn any_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

/// Leverages whose reciprocal terminates, plus out-of-range inputs
fn leverage() -> impl Strategy<Value = u32> {
    prop::sample::select(vec![0u32, 1, 2, 4, 5, 8, 10, 20, 25, 50, 100, 150])
}

proptest! {
    // Every accepted placement lowers the balance by exactly margin + fee.
    #[test]
    fn prop_placement_debits_exactly(
        price in 1u32..100_000,
        amount_milli in 1u32..5_000,
        leverage in leverage(),
    ) {
        let engine = setup(dec!(10000000));
        let amount = Decimal::new(amount_milli as i64, 3);
        let before = engine.snapshot(&paper()).unwrap().available;

        let order = engine
            .place_order(
                &OrderRequest::limit("paper", "BTC", Side::Buy, amount, Decimal::from(price)).with_leverage(leverage),
            )
            .unwrap();

        let after = engine.snapshot(&paper()).unwrap().available;
        prop_assert!(after < before);
        prop_assert_eq!(before - after, order.margin + order.fee);
        prop_assert!(order.leverage.get() >= 1 && order.leverage.get() <= 100);
    }

    // With margin released and PnL credited on close, a round trip costs
    // exactly the two fees plus the realized PnL, whatever the fill price.
    #[test]
    fn prop_round_trip_conserves_balance(
        side in any_side(),
        order_price in 1u32..100_000,
        fill_price in 1u32..100_000,
        close_price in 1u32..100_000,
        units in 1u32..1_000,
        leverage in leverage(),
    ) {
        let engine = TradingEngine::new(RiskCalculator::default()).with_realizer(CreditLedger);
        let initial = dec!(1000000000);
        engine.open_account(paper(), "USDT", initial).unwrap();
        let events = engine.subscribe();

        let amount = Decimal::new(units as i64, 2);
        let order = engine
            .place_order(
                &OrderRequest::limit("paper", "BTC", side, amount, Decimal::from(order_price)).with_leverage(leverage),
            )
            .unwrap();
        let half = amount / Decimal::TWO;
        for _ in 0..2 {
            engine
                .apply_fill(&FillConfirmation {
                    order_id: order.id,
                    filled_delta: half,
                    fill_price: Decimal::from(fill_price),
                })
                .unwrap();
        }

        engine.on_price_tick(&PriceTick::new("BTC", Decimal::from(close_price)));
        let position = engine.snapshot(&paper()).unwrap().positions[0].clone();
        prop_assert_eq!(position.margin, order.margin);
        let close = engine.close_position(&paper(), &position.id, None).unwrap();

        let realized = events
            .drain()
            .into_iter()
            .find_map(|e| match e {
                EngineEvent::PositionClosed(r) => Some(r),
                _ => None,
            })
            .unwrap();
        prop_assert_eq!(realized.released_margin, order.margin);
        prop_assert_eq!(
            engine.snapshot(&paper()).unwrap().available,
            initial - order.fee - close.fee + realized.realized_pnl
        );
    }

    // No input decimal, however large or small, brings the engine down.
    #[test]
    fn prop_extreme_decimals_never_panic(
        side in any_side(),
        price in any_positive(),
        amount in any_positive(),
        fill_price in any_positive(),
        first_tick in any_positive(),
        second_tick in any_positive(),
        leverage in 0u32..=150,
    ) {
        let engine = TradingEngine::new(RiskCalculator::default())
            .with_liquidation_handler(ForceClose)
            .with_realizer(CreditLedger);
        engine.open_account(paper(), "USDT", Decimal::MAX).unwrap();

        engine.handle(InboundEvent::Tick(PriceTick::new("BTC", first_tick)));
        let _ = engine.quote(&OrderRequest::market("paper", "BTC", side, amount).with_leverage(leverage));
        let _ = engine.place_order(&OrderRequest::market("paper", "BTC", side, amount).with_leverage(leverage));
        let placed = engine.place_order(&OrderRequest::limit("paper", "BTC", side, amount, price).with_leverage(leverage));

        if let Ok(order) = placed {
            fill(&engine, order.id, amount, fill_price);
            engine.handle(InboundEvent::Tick(PriceTick::new("BTC", second_tick)));
            let snapshot = engine.snapshot(&paper()).unwrap();
            for position in snapshot.positions {
                let _ = engine.close_position(&paper(), &position.id, Some(position.amount / Decimal::TWO));
                let _ = engine.close_position(&paper(), &position.id, None);
            }
        }
        prop_assert!(engine.snapshot(&paper()).is_some());
    }
}
