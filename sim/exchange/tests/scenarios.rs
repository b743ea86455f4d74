//! End-to-end venue scenarios: submit through the latency queue, match
//! against book state, observe the emitted lifecycle events.

use rust_decimal::Decimal;
use uuid::Uuid;

use exchange::{ExchangeConfig, SimulatedExchange};
use model::account::AccountType;
use model::commands::{SubmitOrder, TradingCommand};
use model::data::{
    AggressorSide, BookAction, BookOrder, BookSide, BookType, OrderBookDelta, QuoteTick,
    TradeTick,
};
use model::events::OrderEventAny;
use model::ids::{ClientOrderId, StrategyId, TradeId, TraderId};
use model::instrument::spot_instrument;
use model::order::{
    ContingencyType, LiquiditySide, Order, OrderDef, OrderKind, OrderSide, OrderStatus,
    TimeInForce, TriggerType,
};
use model::position::PositionSide;

const ETHUSDT: &str = "ETHUSDT.SIM";

fn venue(book_type: BookType) -> SimulatedExchange {
    let config = ExchangeConfig {
        account_type: AccountType::Cash,
        starting_balances: vec!["100000.00 USDT".parse().unwrap()],
        book_type,
        ..Default::default()
    };
    let mut exchange = SimulatedExchange::new(config).unwrap();
    exchange
        .register_instrument(spot_instrument(ETHUSDT.into(), 2, 0))
        .unwrap();
    exchange.initialize_account();
    exchange
}

fn order_def(id: &str, side: OrderSide, qty: &str, kind: OrderKind) -> OrderDef {
    OrderDef {
        trader_id: TraderId::new("TRADER-001"),
        strategy_id: StrategyId::new("S-001"),
        instrument_id: ETHUSDT.into(),
        client_order_id: ClientOrderId::new(id),
        side,
        kind,
        quantity: qty.parse().unwrap(),
        time_in_force: TimeInForce::Gtc,
        expire_time_ns: None,
        post_only: false,
        reduce_only: false,
        display_qty: None,
        contingency_type: ContingencyType::NoContingency,
        order_list_id: None,
        parent_order_id: None,
        linked_order_ids: Vec::new(),
        init_id: Uuid::nil(),
        ts_init: 0,
    }
}

fn submit(exchange: &mut SimulatedExchange, order: Order, ts: i64) {
    let command = TradingCommand::SubmitOrder(SubmitOrder {
        trader_id: order.trader_id.clone(),
        strategy_id: order.strategy_id.clone(),
        instrument_id: order.instrument_id.clone(),
        client_id: None,
        order,
        position_id: None,
        check_position_exists: false,
        command_id: Uuid::new_v4(),
        ts_init: ts,
    });
    exchange.send(command);
    exchange.process(ts);
}

fn quote(bid: &str, ask: &str, bid_size: &str, ask_size: &str, ts: i64) -> QuoteTick {
    QuoteTick::new(
        ETHUSDT.into(),
        bid.parse().unwrap(),
        ask.parse().unwrap(),
        bid_size.parse().unwrap(),
        ask_size.parse().unwrap(),
        ts,
        ts,
    )
    .unwrap()
}

fn trade(px: &str, size: &str, ts: i64) -> TradeTick {
    TradeTick::new(
        ETHUSDT.into(),
        px.parse().unwrap(),
        size.parse().unwrap(),
        AggressorSide::Seller,
        TradeId::new(format!("X-{ts}")),
        ts,
        ts,
    )
    .unwrap()
}

fn ask_delta(px: &str, size: &str, id: u64, seq: u64) -> OrderBookDelta {
    OrderBookDelta::new(
        ETHUSDT.into(),
        BookAction::Add,
        BookOrder::new(BookSide::Ask, px.parse().unwrap(), size.parse().unwrap(), id),
        seq,
        seq as i64,
        seq as i64,
    )
    .unwrap()
}

fn kinds(events: &[OrderEventAny]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind_name()).collect()
}

#[test]
fn limit_at_spread_rests_without_fill() {
    let mut exchange = venue(BookType::L1Tbbo);
    exchange.process_quote_tick(&quote("100.00", "100.02", "10", "10", 1));

    let order = Order::new(order_def(
        "O-1",
        OrderSide::Buy,
        "5",
        OrderKind::Limit {
            price: "100.01".parse().unwrap(),
        },
    ))
    .unwrap();
    submit(&mut exchange, order, 1);

    let events = exchange.drain_events();
    assert_eq!(kinds(&events), vec!["ORDER_SUBMITTED", "ORDER_ACCEPTED"]);

    let order = exchange
        .order(&ETHUSDT.into(), &ClientOrderId::new("O-1"))
        .unwrap();
    assert_eq!(order.status, OrderStatus::Accepted);

    // The resting order is now the top of book.
    let book = exchange.book(&ETHUSDT.into()).unwrap();
    assert_eq!(book.best_bid_price().unwrap().to_string(), "100.01");
    assert_eq!(book.best_bid_size().unwrap().to_string(), "5");
}

#[test]
fn marketable_limit_ioc_walks_two_levels() {
    let mut exchange = venue(BookType::L2Mbp);
    exchange.process_order_book_delta(&ask_delta("100.02", "3", 1, 1));
    exchange.process_order_book_delta(&ask_delta("100.03", "5", 2, 2));

    let mut def = order_def(
        "O-1",
        OrderSide::Buy,
        "6",
        OrderKind::Limit {
            price: "100.03".parse().unwrap(),
        },
    );
    def.time_in_force = TimeInForce::Ioc;
    submit(&mut exchange, Order::new(def).unwrap(), 3);

    let events = exchange.drain_events();
    assert_eq!(
        kinds(&events),
        vec![
            "ORDER_SUBMITTED",
            "ORDER_ACCEPTED",
            "ORDER_FILLED",
            "ORDER_FILLED"
        ]
    );
    let fills: Vec<(String, String)> = events
        .iter()
        .filter_map(|e| match e {
            OrderEventAny::Filled(f) => {
                Some((f.last_px.to_string(), f.last_qty.to_string()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        fills,
        vec![
            ("100.02".to_string(), "3".to_string()),
            ("100.03".to_string(), "3".to_string())
        ]
    );

    let order = exchange
        .order(&ETHUSDT.into(), &ClientOrderId::new("O-1"))
        .unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.liquidity_side, LiquiditySide::Taker);
    assert_eq!(
        order.avg_px.unwrap(),
        Decimal::from_str_exact("100.025").unwrap()
    );
}

#[test]
fn stop_market_triggers_then_fills() {
    let mut exchange = venue(BookType::L1Tbbo);
    exchange.process_quote_tick(&quote("99.99", "100.01", "10", "10", 1));

    let order = Order::new(order_def(
        "O-1",
        OrderSide::Sell,
        "2",
        OrderKind::StopMarket {
            trigger_price: "99.50".parse().unwrap(),
            trigger_type: TriggerType::LastPrice,
        },
    ))
    .unwrap();
    submit(&mut exchange, order, 1);
    let events = exchange.drain_events();
    assert_eq!(kinds(&events), vec!["ORDER_SUBMITTED", "ORDER_ACCEPTED"]);

    exchange.process_trade_tick(&trade("99.49", "5", 2));
    let events = exchange.drain_events();
    assert_eq!(kinds(&events), vec!["ORDER_TRIGGERED", "ORDER_FILLED"]);

    let order = exchange
        .order(&ETHUSDT.into(), &ClientOrderId::new("O-1"))
        .unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(order.avg_px.unwrap(), Decimal::from_str_exact("99.49").unwrap());

    // The fill opened a short position.
    let positions = exchange.open_positions();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].side, PositionSide::Short);
    assert_eq!(positions[0].signed_qty, Decimal::from(-2));
}

#[test]
fn oco_pair_one_fills_other_cancels() {
    let mut exchange = venue(BookType::L1Tbbo);
    exchange.process_quote_tick(&quote("100.00", "100.02", "10", "10", 1));

    let mut sell_limit = order_def(
        "O-TP",
        OrderSide::Sell,
        "1",
        OrderKind::Limit {
            price: "101.00".parse().unwrap(),
        },
    );
    sell_limit.contingency_type = ContingencyType::Oco;
    sell_limit.linked_order_ids = vec![ClientOrderId::new("O-SL")];

    let mut sell_stop = order_def(
        "O-SL",
        OrderSide::Sell,
        "1",
        OrderKind::StopMarket {
            trigger_price: "99.00".parse().unwrap(),
            trigger_type: TriggerType::LastPrice,
        },
    );
    sell_stop.contingency_type = ContingencyType::Oco;
    sell_stop.linked_order_ids = vec![ClientOrderId::new("O-TP")];

    submit(&mut exchange, Order::new(sell_limit).unwrap(), 1);
    submit(&mut exchange, Order::new(sell_stop).unwrap(), 1);
    exchange.drain_events();

    exchange.process_trade_tick(&trade("101.00", "5", 2));
    let events = exchange.drain_events();
    assert_eq!(kinds(&events), vec!["ORDER_FILLED", "ORDER_CANCELED"]);

    let tp = exchange
        .order(&ETHUSDT.into(), &ClientOrderId::new("O-TP"))
        .unwrap();
    assert_eq!(tp.status, OrderStatus::Filled);

    let sl = exchange
        .order(&ETHUSDT.into(), &ClientOrderId::new("O-SL"))
        .unwrap();
    assert_eq!(sl.status, OrderStatus::Canceled);
    match sl.last_event().unwrap() {
        OrderEventAny::Canceled(event) => {
            assert_eq!(event.reason.as_deref(), Some("contingency"));
        }
        other => panic!("expected cancel, got {}", other.kind_name()),
    }
}

#[test]
fn gtd_order_expires_when_time_advances() {
    let mut exchange = venue(BookType::L1Tbbo);
    exchange.process_quote_tick(&quote("100.00", "100.02", "10", "10", 1_000));

    let mut def = order_def(
        "O-1",
        OrderSide::Buy,
        "1",
        OrderKind::Limit {
            price: "50.00".parse().unwrap(),
        },
    );
    def.time_in_force = TimeInForce::Gtd;
    def.expire_time_ns = Some(10_000_000_000);
    submit(&mut exchange, Order::new(def).unwrap(), 1_000);
    let events = exchange.drain_events();
    assert_eq!(kinds(&events), vec!["ORDER_SUBMITTED", "ORDER_ACCEPTED"]);

    // No touch; advancing past the deadline expires the order.
    exchange.process(10_000_000_001);
    let events = exchange.drain_events();
    assert_eq!(kinds(&events), vec!["ORDER_EXPIRED"]);

    let order = exchange
        .order(&ETHUSDT.into(), &ClientOrderId::new("O-1"))
        .unwrap();
    assert_eq!(order.status, OrderStatus::Expired);
    assert!(exchange.open_orders().is_empty());
}

#[test]
fn fok_with_insufficient_depth_rejects_without_fill() {
    let mut exchange = venue(BookType::L1Tbbo);
    exchange.process_quote_tick(&quote("99.98", "100.00", "2", "2", 1));

    let mut def = order_def(
        "O-1",
        OrderSide::Buy,
        "5",
        OrderKind::Limit {
            price: "100.00".parse().unwrap(),
        },
    );
    def.time_in_force = TimeInForce::Fok;
    submit(&mut exchange, Order::new(def).unwrap(), 1);

    let events = exchange.drain_events();
    assert_eq!(kinds(&events), vec!["ORDER_SUBMITTED", "ORDER_REJECTED"]);
    match &events[1] {
        OrderEventAny::Rejected(event) => assert_eq!(event.reason, "insufficient depth"),
        other => panic!("expected rejection, got {}", other.kind_name()),
    }

    // Book unchanged: nothing was consumed.
    let book = exchange.book(&ETHUSDT.into()).unwrap();
    assert_eq!(book.best_ask_price().unwrap().to_string(), "100.00");
    assert_eq!(book.best_ask_size().unwrap().to_string(), "2");
    assert!(exchange.trade_reports().is_empty());
}

#[test]
fn market_order_settles_into_account_and_reports() {
    let mut exchange = venue(BookType::L1Tbbo);
    exchange.process_quote_tick(&quote("100.00", "100.02", "10", "10", 1));

    let order = Order::new(order_def("O-1", OrderSide::Buy, "4", OrderKind::Market)).unwrap();
    submit(&mut exchange, order, 1);
    let events = exchange.drain_events();
    assert_eq!(
        kinds(&events),
        vec!["ORDER_SUBMITTED", "ORDER_ACCEPTED", "ORDER_FILLED"]
    );

    let trades = exchange.trade_reports();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].last_px.to_string(), "100.02");
    assert_eq!(trades[0].last_qty.to_string(), "4");

    let mass = exchange.execution_mass_status();
    assert_eq!(mass.order_reports.len(), 1);
    assert_eq!(mass.trade_reports.len(), 1);
    assert_eq!(mass.position_reports.len(), 1);
    assert_eq!(mass.order_reports[0].order_status, OrderStatus::Filled);
    assert_eq!(mass.position_reports[0].signed_qty, Decimal::from(4));
}

#[test]
fn post_only_crossing_limit_is_rejected() {
    let mut exchange = venue(BookType::L1Tbbo);
    exchange.process_quote_tick(&quote("100.00", "100.02", "10", "10", 1));

    let mut def = order_def(
        "O-1",
        OrderSide::Sell,
        "1",
        OrderKind::Limit {
            price: "99.99".parse().unwrap(),
        },
    );
    def.post_only = true;
    submit(&mut exchange, Order::new(def).unwrap(), 1);

    let events = exchange.drain_events();
    assert_eq!(kinds(&events), vec!["ORDER_SUBMITTED", "ORDER_REJECTED"]);
}

#[test]
fn bar_execution_touches_low_before_high_on_bullish_bar() {
    use model::data::{Bar, BarAggregation, BarSpecification, BarType, PriceType};

    let mut exchange = venue(BookType::L1Tbbo);
    exchange.process_quote_tick(&quote("100.00", "100.02", "10", "10", 1));

    // Resting buy below the open only fills if the bar's low trades.
    let order = Order::new(order_def(
        "O-1",
        OrderSide::Buy,
        "1",
        OrderKind::Limit {
            price: "99.50".parse().unwrap(),
        },
    ))
    .unwrap();
    submit(&mut exchange, order, 1);
    exchange.drain_events();

    let bar_type = BarType {
        instrument_id: ETHUSDT.into(),
        spec: BarSpecification {
            step: 1,
            aggregation: BarAggregation::Minute,
            price_type: PriceType::Last,
        },
    };
    let bar = Bar::new(
        bar_type,
        "100.01".parse().unwrap(),
        "100.80".parse().unwrap(),
        "99.40".parse().unwrap(),
        "100.60".parse().unwrap(),
        "40".parse().unwrap(),
        60_000_000_000,
        60_000_000_000,
    )
    .unwrap();
    exchange.process_bar(&bar);

    let order = exchange
        .order(&ETHUSDT.into(), &ClientOrderId::new("O-1"))
        .unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    // Filled at the synthetic low touch.
    assert_eq!(order.avg_px.unwrap(), Decimal::from_str_exact("99.40").unwrap());
}
