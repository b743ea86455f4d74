//! Property tests over the book and fill accounting invariants.

use proptest::prelude::*;

use exchange::{ExchangeConfig, SimulatedExchange};
use model::account::AccountType;
use model::data::{BookAction, BookOrder, BookSide, BookType, OrderBookDelta};
use model::instrument::spot_instrument;
use model::numeric::{Price, Quantity};

const ETHUSDT: &str = "ETHUSDT.SIM";

fn venue() -> SimulatedExchange {
    let config = ExchangeConfig {
        account_type: AccountType::Cash,
        starting_balances: vec!["100000.00 USDT".parse().unwrap()],
        book_type: BookType::L2Mbp,
        ..Default::default()
    };
    let mut exchange = SimulatedExchange::new(config).unwrap();
    exchange
        .register_instrument(spot_instrument(ETHUSDT.into(), 2, 0))
        .unwrap();
    exchange.initialize_account();
    exchange
}

#[derive(Debug, Clone)]
struct DeltaSpec {
    action: u8,
    side: bool,
    price_ticks: i64,
    size: u64,
    order_id: u64,
}

fn delta_strategy() -> impl Strategy<Value = DeltaSpec> {
    (0u8..3, any::<bool>(), 1i64..200, 1u64..50, 1u64..20).prop_map(
        |(action, side, price_ticks, size, order_id)| DeltaSpec {
            action,
            side,
            price_ticks,
            size,
            order_id,
        },
    )
}

proptest! {
    /// Whatever delta sequence is applied, bid levels stay strictly
    /// descending and ask levels strictly ascending.
    #[test]
    fn ladders_stay_sorted(specs in prop::collection::vec(delta_strategy(), 1..60)) {
        let mut exchange = venue();
        for (sequence, spec) in specs.iter().enumerate() {
            let side = if spec.side { BookSide::Bid } else { BookSide::Ask };
            // Bids priced below 100, asks above, so the book never crosses
            // and the match loop stays out of the way.
            let base = if spec.side { 9_000 } else { 10_100 };
            let price = Price::from_raw((base + spec.price_ticks) * 10_000_000, 2);
            let action = match spec.action {
                0 => BookAction::Add,
                1 => BookAction::Update,
                _ => BookAction::Delete,
            };
            let delta = OrderBookDelta::new(
                ETHUSDT.into(),
                action,
                BookOrder::new(side, price, Quantity::from_raw(spec.size * 1_000_000_000, 0), spec.order_id),
                sequence as u64,
                sequence as i64,
                sequence as i64,
            )
            .unwrap();
            exchange.process_order_book_delta(&delta);
        }

        let book = exchange.book(&ETHUSDT.into()).unwrap();
        let (bids, asks) = book.depth(usize::MAX);
        for pair in bids.windows(2) {
            prop_assert!(pair[0].0 > pair[1].0, "bids not strictly descending");
        }
        for pair in asks.windows(2) {
            prop_assert!(pair[0].0 < pair[1].0, "asks not strictly ascending");
        }
        for (_, size) in bids.iter().chain(asks.iter()) {
            prop_assert!(!size.is_zero(), "empty level left in book");
        }
    }
}

mod fill_conservation {
    use super::*;
    use model::commands::{SubmitOrder, TradingCommand};
    use model::data::QuoteTick;
    use model::events::OrderEventAny;
    use model::ids::{ClientOrderId, StrategyId, TraderId};
    use model::order::{ContingencyType, Order, OrderDef, OrderKind, OrderSide, TimeInForce};
    use uuid::Uuid;

    proptest! {
        /// The sum of fill quantities always equals the order's filled_qty,
        /// and leaves_qty is the exact complement.
        #[test]
        fn fills_conserve_quantity(qty in 1u64..40, depth in 1u64..40) {
            let mut exchange = venue();
            let tick = QuoteTick::new(
                ETHUSDT.into(),
                "100.00".parse().unwrap(),
                "100.02".parse().unwrap(),
                Quantity::from_raw(depth * 1_000_000_000, 0),
                Quantity::from_raw(depth * 1_000_000_000, 0),
                1,
                1,
            )
            .unwrap();
            // An L2 venue still takes top-of-book quotes for this check.
            exchange.process_quote_tick(&tick);

            let order = Order::new(OrderDef {
                trader_id: TraderId::new("TRADER-001"),
                strategy_id: StrategyId::new("S-001"),
                instrument_id: ETHUSDT.into(),
                client_order_id: ClientOrderId::new("O-1"),
                side: OrderSide::Buy,
                kind: OrderKind::Limit { price: "100.02".parse().unwrap() },
                quantity: Quantity::from_raw(qty * 1_000_000_000, 0),
                time_in_force: TimeInForce::Ioc,
                expire_time_ns: None,
                post_only: false,
                reduce_only: false,
                display_qty: None,
                contingency_type: ContingencyType::NoContingency,
                order_list_id: None,
                parent_order_id: None,
                linked_order_ids: Vec::new(),
                init_id: Uuid::nil(),
                ts_init: 1,
            })
            .unwrap();
            let command = TradingCommand::SubmitOrder(SubmitOrder {
                trader_id: order.trader_id.clone(),
                strategy_id: order.strategy_id.clone(),
                instrument_id: order.instrument_id.clone(),
                client_id: None,
                order,
                position_id: None,
                check_position_exists: false,
                command_id: Uuid::nil(),
                ts_init: 1,
            });
            exchange.send(command);
            exchange.process(1);

            let events = exchange.drain_events();
            let filled_from_events: u64 = events
                .iter()
                .filter_map(|e| match e {
                    OrderEventAny::Filled(f) => Some(f.last_qty.raw()),
                    _ => None,
                })
                .sum();
            let order = exchange
                .order(&ETHUSDT.into(), &ClientOrderId::new("O-1"))
                .unwrap();
            prop_assert_eq!(filled_from_events, order.filled_qty.raw());
            prop_assert_eq!(
                order.leaves_qty().raw(),
                order.quantity.raw() - order.filled_qty.raw()
            );
            prop_assert!(order.filled_qty <= order.quantity);
        }
    }
}
