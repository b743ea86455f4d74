//! The simulated exchange
//!
//! Orchestrates everything for one venue: instrument registry, per-instrument
//! books and matching engines, the single account, the latency-delayed
//! inflight command queue, deterministic identifier generation, and the
//! outbound event stream. `process(now_ns)` is the only way time advances.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use model::account::{Account, AccountType, OmsType};
use model::commands::TradingCommand;
use model::currency::CurrencyRegistry;
use model::data::{Bar, BookType, OrderBookDelta, OrderBookSnapshot, QuoteTick, TradeTick};
use model::errors::ExchangeError;
use model::events::{OrderDenied, OrderEventAny};
use model::ids::{AccountId, ClientId, InstrumentId, Venue};
use model::instrument::Instrument;
use model::money::Money;
use model::order::Order;
use model::reports::{
    ExecutionMassStatus, OrderStatusReport, PositionStatusReport, TradeReport,
};

use crate::accounting::AccountingEngine;
use crate::book::OrderBook;
use crate::idgen::IdGenerator;
use crate::inflight::InflightQueue;
use crate::matching::{MatchingConfig, OrderMatchingEngine};
use crate::models::commission::{CommissionModel, MakerTakerCommission};
use crate::models::fill::FillModel;
use crate::models::latency::LatencyModel;

/// Venue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub venue: String,
    pub oms_type: OmsType,
    pub account_type: AccountType,
    /// Single-currency accounts report in this currency code.
    pub base_currency: Option<String>,
    pub starting_balances: Vec<Money>,
    pub default_leverage: Decimal,
    pub book_type: BookType,
    pub bar_execution: bool,
    pub trade_execution: bool,
    pub reject_stop_orders: bool,
    pub support_gtd_orders: bool,
    pub support_contingent_orders: bool,
    pub prob_fill_on_limit: f64,
    pub prob_fill_on_stop: f64,
    pub prob_slippage: f64,
    pub latency: LatencyModel,
    /// Seeds the fill model and event id generation.
    pub seed: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            venue: "SIM".to_string(),
            oms_type: OmsType::Netting,
            account_type: AccountType::Margin,
            base_currency: None,
            starting_balances: Vec::new(),
            default_leverage: Decimal::ONE,
            book_type: BookType::L1Tbbo,
            bar_execution: true,
            trade_execution: true,
            reject_stop_orders: false,
            support_gtd_orders: true,
            support_contingent_orders: true,
            prob_fill_on_limit: 1.0,
            prob_fill_on_stop: 1.0,
            prob_slippage: 0.0,
            latency: LatencyModel::none(),
            seed: 0,
        }
    }
}

impl ExchangeConfig {
    fn matching_config(&self) -> MatchingConfig {
        MatchingConfig {
            oms_type: self.oms_type,
            reject_stop_orders: self.reject_stop_orders,
            support_gtd_orders: self.support_gtd_orders,
            support_contingent_orders: self.support_contingent_orders,
            bar_execution: self.bar_execution,
            trade_execution: self.trade_execution,
        }
    }
}

/// A complete simulated venue.
pub struct SimulatedExchange {
    pub venue: Venue,
    config: ExchangeConfig,
    currencies: CurrencyRegistry,
    instruments: BTreeMap<InstrumentId, Instrument>,
    engines: BTreeMap<InstrumentId, OrderMatchingEngine>,
    accounting: Option<AccountingEngine>,
    registered_clients: Vec<ClientId>,
    inflight: InflightQueue,
    latency: LatencyModel,
    ids: IdGenerator,
    clock_ns: i64,
    events: Vec<OrderEventAny>,
    trade_reports: Vec<TradeReport>,
    query_reports: Vec<OrderStatusReport>,
}

impl SimulatedExchange {
    pub fn new(config: ExchangeConfig) -> Result<Self, ExchangeError> {
        // Validate the fill probabilities up front.
        FillModel::new(
            config.prob_fill_on_limit,
            config.prob_fill_on_stop,
            config.prob_slippage,
            config.seed,
        )?;
        let venue = Venue::new(config.venue.clone());
        let latency = config.latency;
        let ids = IdGenerator::new(venue.clone(), config.seed);
        info!(venue = %venue, "initialized simulated exchange");
        Ok(Self {
            venue,
            config,
            currencies: CurrencyRegistry::new(),
            instruments: BTreeMap::new(),
            engines: BTreeMap::new(),
            accounting: None,
            registered_clients: Vec::new(),
            inflight: InflightQueue::new(),
            latency,
            ids,
            clock_ns: 0,
            events: Vec::new(),
            trade_reports: Vec::new(),
            query_reports: Vec::new(),
        })
    }

    /// Current simulated time in nanoseconds.
    pub fn clock_ns(&self) -> i64 {
        self.clock_ns
    }

    pub fn currencies_mut(&mut self) -> &mut CurrencyRegistry {
        &mut self.currencies
    }

    /// Register an execution client id routing to this venue.
    pub fn register_client(&mut self, client_id: ClientId) {
        if !self.registered_clients.contains(&client_id) {
            self.registered_clients.push(client_id);
        }
    }

    /// Register an instrument and build its book and matching engine.
    pub fn register_instrument(&mut self, instrument: Instrument) -> Result<(), ExchangeError> {
        instrument.validate()?;
        if instrument.id.venue != self.venue {
            return Err(ExchangeError::Configuration(format!(
                "instrument {} does not belong to venue {}",
                instrument.id, self.venue
            )));
        }
        let id = instrument.id.clone();
        let engine = self.build_engine(&instrument);
        self.instruments.insert(id.clone(), instrument);
        self.engines.insert(id.clone(), engine);
        debug!(instrument_id = %id, "registered instrument");
        Ok(())
    }

    fn build_engine(&self, instrument: &Instrument) -> OrderMatchingEngine {
        // Each engine draws from its own stream, offset so instruments do
        // not share randomness.
        let engine_seed = self.config.seed.wrapping_add(self.engines.len() as u64);
        let fill_model = FillModel::new(
            self.config.prob_fill_on_limit,
            self.config.prob_fill_on_stop,
            self.config.prob_slippage,
            engine_seed,
        )
        .expect("probabilities validated at construction");
        OrderMatchingEngine::new(
            instrument.clone(),
            OrderBook::new(instrument.id.clone(), self.config.book_type),
            self.config.matching_config(),
            self.account_id(),
            fill_model,
            Box::new(MakerTakerCommission),
        )
    }

    fn account_id(&self) -> AccountId {
        AccountId::new(format!("{}-001", self.venue))
    }

    /// Create the venue account with the configured starting balances.
    pub fn initialize_account(&mut self) {
        let base_currency = self
            .config
            .base_currency
            .as_ref()
            .map(|code| self.currencies.get_or_default(code));
        let mut account = Account::new(self.account_id(), self.config.account_type, base_currency);
        account.default_leverage = self.config.default_leverage;
        for money in self.config.starting_balances.clone() {
            account.deposit(money);
        }
        self.accounting = Some(AccountingEngine::new(account, self.config.oms_type));
    }

    /// Apply a manual balance adjustment.
    pub fn adjust_account(&mut self, money: Money) -> Result<(), ExchangeError> {
        let accounting = self
            .accounting
            .as_mut()
            .ok_or(ExchangeError::AccountNotInitialized)?;
        accounting.account.adjust(money)
    }

    pub fn account(&self) -> Option<&Account> {
        self.accounting.as_ref().map(|a| &a.account)
    }

    pub fn account_mut(&mut self) -> Option<&mut Account> {
        self.accounting.as_mut().map(|a| &mut a.account)
    }

    /// Replace the fill model probabilities on every engine.
    pub fn set_fill_model(
        &mut self,
        prob_fill_on_limit: f64,
        prob_fill_on_stop: f64,
        prob_slippage: f64,
    ) -> Result<(), ExchangeError> {
        self.config.prob_fill_on_limit = prob_fill_on_limit;
        self.config.prob_fill_on_stop = prob_fill_on_stop;
        self.config.prob_slippage = prob_slippage;
        for (index, engine) in self.engines.values_mut().enumerate() {
            let model = FillModel::new(
                prob_fill_on_limit,
                prob_fill_on_stop,
                prob_slippage,
                self.config.seed.wrapping_add(index as u64),
            )?;
            engine.set_fill_model(model);
        }
        Ok(())
    }

    /// Replace the commission model on every engine.
    pub fn set_commission_model(&mut self, build: impl Fn() -> Box<dyn CommissionModel>) {
        for engine in self.engines.values_mut() {
            engine.set_commission_model(build());
        }
    }

    pub fn set_latency_model(&mut self, latency: LatencyModel) {
        self.latency = latency;
        self.config.latency = latency;
    }

    /// The registered instrument set.
    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    /// Direct access to an instrument's book (tests, diagnostics).
    pub fn book(&self, instrument_id: &InstrumentId) -> Option<&OrderBook> {
        self.engines.get(instrument_id).map(|e| &e.book)
    }

    pub fn order(&self, instrument_id: &InstrumentId, client_order_id: &model::ids::ClientOrderId) -> Option<&Order> {
        self.engines
            .get(instrument_id)
            .and_then(|e| e.order(client_order_id))
    }

    /// Orders currently working across all instruments.
    pub fn open_orders(&self) -> Vec<&Order> {
        self.engines
            .values()
            .flat_map(|e| e.open_orders())
            .collect()
    }

    // === COMMAND PATH ===

    /// Queue a command; it commits at `now + latency(kind)`.
    pub fn send(&mut self, command: TradingCommand) {
        let commit_ns = self.clock_ns + self.latency.delay_for(&command);
        debug!(commit_ns, "command queued inflight");
        self.inflight.push(command, commit_ns);
    }

    /// Advance simulated time, committing every inflight command whose time
    /// has come, in commit order with FIFO tie-break, then run every match
    /// loop at the new time (expiry and pending-trigger evaluation).
    pub fn process(&mut self, now_ns: i64) {
        for (commit_ns, command) in self.inflight.pop_ready(now_ns) {
            self.clock_ns = self.clock_ns.max(commit_ns);
            self.dispatch(command, commit_ns);
        }
        self.clock_ns = self.clock_ns.max(now_ns);
        let instrument_ids: Vec<InstrumentId> = self.engines.keys().cloned().collect();
        for instrument_id in instrument_ids {
            if let Some(engine) = self.engines.get_mut(&instrument_id) {
                engine.process_time(now_ns, &mut self.ids);
            }
            self.post_dispatch(&instrument_id);
        }
    }

    fn dispatch(&mut self, command: TradingCommand, commit_ns: i64) {
        let instrument_id = command.instrument_id().clone();
        if !self.engines.contains_key(&instrument_id) {
            self.refuse_unknown_instrument(command, commit_ns);
            return;
        }
        match command {
            TradingCommand::SubmitOrder(submit) => {
                if submit.check_position_exists {
                    if let Some(position_id) = &submit.position_id {
                        let known = self
                            .accounting
                            .as_ref()
                            .map(|a| a.position(position_id).is_some())
                            .unwrap_or(false);
                        if !known {
                            self.deny_order(
                                submit.order,
                                format!("position not found: {position_id}"),
                                commit_ns,
                            );
                            return;
                        }
                    }
                }
                let mut order = submit.order;
                if order.position_id.is_none() {
                    order.position_id = submit.position_id;
                }
                let engine = self.engines.get_mut(&instrument_id).expect("engine exists");
                engine.process_order(order, &mut self.ids, commit_ns);
            }
            TradingCommand::SubmitOrderList(submit) => {
                let engine = self.engines.get_mut(&instrument_id).expect("engine exists");
                engine.process_order_list(submit.order_list, &mut self.ids, commit_ns);
            }
            TradingCommand::ModifyOrder(modify) => {
                let engine = self.engines.get_mut(&instrument_id).expect("engine exists");
                engine.process_modify(&modify, &mut self.ids, commit_ns);
            }
            TradingCommand::CancelOrder(cancel) => {
                let engine = self.engines.get_mut(&instrument_id).expect("engine exists");
                engine.process_cancel(&cancel, &mut self.ids, commit_ns);
            }
            TradingCommand::CancelAllOrders(cancel_all) => {
                let engine = self.engines.get_mut(&instrument_id).expect("engine exists");
                engine.process_cancel_all(&cancel_all, &mut self.ids, commit_ns);
            }
            TradingCommand::QueryOrder(query) => {
                let report = self
                    .engines
                    .get(&instrument_id)
                    .and_then(|e| e.order(&query.client_order_id))
                    .map(|order| self.order_report(order));
                match report {
                    Some(report) => self.query_reports.push(report),
                    None => warn!(
                        client_order_id = %query.client_order_id,
                        "query for unknown order"
                    ),
                }
            }
        }
        self.post_dispatch(&instrument_id);
    }

    fn refuse_unknown_instrument(&mut self, command: TradingCommand, commit_ns: i64) {
        warn!(instrument_id = %command.instrument_id(), "command for unregistered instrument");
        if let TradingCommand::SubmitOrder(submit) = command {
            let reason = format!(
                "instrument not registered: {}",
                submit.order.instrument_id
            );
            self.deny_order(submit.order, reason, commit_ns);
        }
    }

    /// Deny an order that never reaches a matching engine.
    fn deny_order(&mut self, mut order: Order, reason: String, commit_ns: i64) {
        let denied = OrderEventAny::Denied(OrderDenied {
            trader_id: order.trader_id.clone(),
            strategy_id: order.strategy_id.clone(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            reason,
            event_id: self.ids.event_id(),
            ts_event: commit_ns,
            ts_init: commit_ns,
        });
        if order.apply(denied.clone()).is_ok() {
            self.events.push(denied);
        }
    }

    // === MARKET DATA PATH ===

    pub fn process_quote_tick(&mut self, tick: &QuoteTick) {
        self.clock_ns = self.clock_ns.max(tick.ts_event);
        if let Some(engine) = self.engines.get_mut(&tick.instrument_id) {
            engine.process_quote_tick(tick, &mut self.ids);
            self.post_dispatch(&tick.instrument_id);
        }
    }

    pub fn process_trade_tick(&mut self, tick: &TradeTick) {
        self.clock_ns = self.clock_ns.max(tick.ts_event);
        if let Some(engine) = self.engines.get_mut(&tick.instrument_id) {
            engine.process_trade_tick(tick, &mut self.ids);
            self.post_dispatch(&tick.instrument_id);
        }
    }

    pub fn process_bar(&mut self, bar: &Bar) {
        self.clock_ns = self.clock_ns.max(bar.ts_event);
        if let Some(engine) = self.engines.get_mut(&bar.bar_type.instrument_id) {
            engine.process_bar(bar, &mut self.ids);
            self.post_dispatch(&bar.bar_type.instrument_id);
        }
    }

    pub fn process_order_book_delta(&mut self, delta: &OrderBookDelta) {
        self.clock_ns = self.clock_ns.max(delta.ts_event);
        if let Some(engine) = self.engines.get_mut(&delta.instrument_id) {
            engine.process_delta(delta, &mut self.ids);
            self.post_dispatch(&delta.instrument_id);
        }
    }

    pub fn process_order_book_deltas(&mut self, deltas: &[OrderBookDelta]) {
        let Some(first) = deltas.first() else { return };
        if let Some(last) = deltas.last() {
            self.clock_ns = self.clock_ns.max(last.ts_event);
        }
        if let Some(engine) = self.engines.get_mut(&first.instrument_id) {
            engine.process_deltas(deltas, &mut self.ids);
            self.post_dispatch(&first.instrument_id);
        }
    }

    pub fn process_order_book_snapshot(&mut self, snapshot: &OrderBookSnapshot) {
        self.clock_ns = self.clock_ns.max(snapshot.ts_event);
        if let Some(engine) = self.engines.get_mut(&snapshot.instrument_id) {
            engine.process_snapshot(snapshot, &mut self.ids);
            self.post_dispatch(&snapshot.instrument_id);
        }
    }

    /// Drain engine output: settle fills into the account and positions,
    /// refresh the engine's position view, publish everything.
    fn post_dispatch(&mut self, instrument_id: &InstrumentId) {
        let Some(engine) = self.engines.get_mut(instrument_id) else {
            return;
        };
        let drained = engine.drain_events();
        for event in drained {
            if let OrderEventAny::Filled(fill) = &event {
                self.trade_reports.push(trade_report(fill));
                if let Some(accounting) = self.accounting.as_mut() {
                    let instrument = &self.instruments[instrument_id];
                    accounting.apply_fill(fill, instrument);
                    let net = accounting.net_position(instrument_id);
                    if let Some(position_id) = &fill.venue_position_id {
                        let engine = self
                            .engines
                            .get_mut(instrument_id)
                            .expect("engine exists");
                        engine.update_position(position_id, net, &mut self.ids);
                    }
                }
            }
            self.events.push(event);
        }
        // Position-view updates may have produced follow-up events.
        if let Some(engine) = self.engines.get_mut(instrument_id) {
            let follow_ups = engine.drain_events();
            for event in follow_ups {
                if let OrderEventAny::Filled(fill) = &event {
                    // Venue-initiated resizes never fill, but keep the
                    // ledger consistent if one ever does.
                    self.trade_reports.push(trade_report(fill));
                    if let Some(accounting) = self.accounting.as_mut() {
                        let instrument = &self.instruments[instrument_id];
                        accounting.apply_fill(fill, instrument);
                    }
                }
                self.events.push(event);
            }
        }
    }

    /// Take every event emitted since the last drain, in emission order.
    pub fn drain_events(&mut self) -> Vec<OrderEventAny> {
        std::mem::take(&mut self.events)
    }

    /// Reports produced in response to `QueryOrder` commands.
    pub fn drain_query_reports(&mut self) -> Vec<OrderStatusReport> {
        std::mem::take(&mut self.query_reports)
    }

    // === REPORTS ===

    fn order_report(&self, order: &Order) -> OrderStatusReport {
        let ts_accepted = order.events().iter().find_map(|e| match e {
            OrderEventAny::Accepted(a) => Some(a.ts_event),
            _ => None,
        });
        OrderStatusReport {
            account_id: self.account_id(),
            instrument_id: order.instrument_id.clone(),
            client_order_id: order.client_order_id.clone(),
            venue_order_id: order.venue_order_id.clone(),
            order_side: order.side,
            order_type: order.order_type(),
            time_in_force: order.time_in_force,
            order_status: order.status,
            quantity: order.quantity,
            filled_qty: order.filled_qty,
            leaves_qty: order.leaves_qty(),
            price: order.price(),
            trigger_price: order.trigger_price(),
            avg_px: order.avg_px,
            post_only: order.post_only,
            reduce_only: order.reduce_only,
            ts_accepted,
            ts_last: order.ts_last,
            ts_init: order.ts_init,
        }
    }

    /// Status reports for every order the venue has seen.
    pub fn order_status_reports(&self) -> Vec<OrderStatusReport> {
        self.engines
            .values()
            .flat_map(|e| e.all_orders())
            .map(|order| self.order_report(order))
            .collect()
    }

    /// One report per fill, in execution order.
    pub fn trade_reports(&self) -> Vec<TradeReport> {
        self.trade_reports.clone()
    }

    /// Status reports for every position, open and closed.
    pub fn position_status_reports(&self) -> Vec<PositionStatusReport> {
        let Some(accounting) = self.accounting.as_ref() else {
            return Vec::new();
        };
        accounting
            .positions()
            .map(|position| PositionStatusReport {
                account_id: self.account_id(),
                instrument_id: position.instrument_id.clone(),
                venue_position_id: position.id.clone(),
                position_side: position.side,
                quantity: position.quantity(),
                signed_qty: position.signed_qty,
                avg_px_open: position.avg_px_open,
                realized_pnl: position.realized_pnl.clone(),
                ts_last: position.ts_last,
                ts_init: position.ts_opened,
            })
            .collect()
    }

    /// Positions currently open.
    pub fn open_positions(&self) -> Vec<&model::position::Position> {
        self.accounting
            .as_ref()
            .map(|a| a.open_positions())
            .unwrap_or_default()
    }

    /// Everything at once, for reconciliation.
    pub fn execution_mass_status(&self) -> ExecutionMassStatus {
        ExecutionMassStatus {
            account_id: self.account_id(),
            order_reports: self.order_status_reports(),
            trade_reports: self.trade_reports(),
            position_reports: self.position_status_reports(),
            ts_init: self.clock_ns,
        }
    }

    /// Return the venue to its initial state: books, engines, inflight
    /// queue, counters and the account are rebuilt; registered instruments
    /// and configuration survive.
    pub fn reset(&mut self) {
        info!(venue = %self.venue, "resetting exchange");
        self.inflight.clear();
        self.events.clear();
        self.trade_reports.clear();
        self.query_reports.clear();
        self.ids.reset();
        self.clock_ns = 0;
        let instruments: Vec<Instrument> = self.instruments.values().cloned().collect();
        self.engines.clear();
        for instrument in instruments {
            let engine = self.build_engine(&instrument);
            self.engines.insert(instrument.id.clone(), engine);
        }
        if self.accounting.is_some() {
            self.initialize_account();
        }
    }
}

fn trade_report(fill: &model::events::OrderFilled) -> TradeReport {
    TradeReport {
        account_id: fill.account_id.clone(),
        instrument_id: fill.instrument_id.clone(),
        client_order_id: fill.client_order_id.clone(),
        venue_order_id: fill.venue_order_id.clone(),
        venue_position_id: fill.venue_position_id.clone(),
        trade_id: fill.trade_id.clone(),
        order_side: fill.order_side,
        last_qty: fill.last_qty,
        last_px: fill.last_px,
        commission: fill.commission.clone(),
        liquidity_side: fill.liquidity_side,
        ts_event: fill.ts_event,
        ts_init: fill.ts_init,
    }
}
