//! Paper terminal
//!
//! In-memory stand-in for an MT5 terminal. Orders fill at the requested
//! price and open or close simulated positions. Used for `--paper` dry runs
//! and as the terminal double in tests; failure modes can be scripted.

use super::types::*;
use super::Terminal;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Invalid request (TRADE_RETCODE_INVALID)
pub const TRADE_RETCODE_INVALID: u32 = 10013;

/// Units per lot used for simulated profit
const CONTRACT_SIZE: f64 = 100_000.0;

struct PaperSymbol {
    info: SymbolInfo,
    tick: Option<Tick>,
    selectable: bool,
}

struct PaperState {
    reachable: bool,
    initialized: bool,
    logged_in: bool,
    reject_logins: bool,
    login_count: u32,
    last_error: TerminalError,
    account: AccountInfo,
    symbols: BTreeMap<String, PaperSymbol>,
    positions: BTreeMap<u64, PositionRecord>,
    sent: Vec<OrderRequest>,
    reject_retcode: Option<u32>,
    drop_results: bool,
    next_ticket: u64,
    next_deal: u64,
}

/// Simulated MT5 terminal
pub struct PaperTerminal {
    state: Mutex<PaperState>,
}

impl PaperTerminal {
    /// Empty terminal with a demo account and no symbols
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PaperState {
                reachable: true,
                initialized: false,
                logged_in: false,
                reject_logins: false,
                login_count: 0,
                last_error: TerminalError::success(),
                account: AccountInfo {
                    login: 12345678,
                    name: "Paper Trading".to_string(),
                    server: "Paper-Demo".to_string(),
                    currency: "USD".to_string(),
                    balance: 10_000.0,
                    equity: 10_000.0,
                    margin: 0.0,
                    margin_free: 10_000.0,
                    leverage: 100,
                },
                symbols: BTreeMap::new(),
                positions: BTreeMap::new(),
                sent: Vec::new(),
                reject_retcode: None,
                drop_results: false,
                next_ticket: 100_000_001,
                next_deal: 200_000_001,
            }),
        }
    }

    /// Terminal seeded with the major FX pairs at 5-digit pricing
    pub fn with_forex_majors() -> Self {
        let terminal = Self::new();
        let majors = [
            ("EURUSD", 0.00001, 5, 1.10000, 1.10020),
            ("GBPUSD", 0.00001, 5, 1.27000, 1.27025),
            ("USDJPY", 0.001, 3, 149.500, 149.520),
            ("AUDUSD", 0.00001, 5, 0.65500, 0.65515),
            ("USDCHF", 0.00001, 5, 0.88100, 0.88120),
        ];
        for (name, point, digits, bid, ask) in majors {
            terminal.add_symbol(name, point, digits, bid, ask);
        }
        terminal
    }

    /// Add (or replace) a visible symbol with a quote
    pub fn add_symbol(&self, name: &str, point: f64, digits: u32, bid: f64, ask: f64) {
        let mut state = self.state.lock();
        state.symbols.insert(
            name.to_string(),
            PaperSymbol {
                info: SymbolInfo {
                    name: name.to_string(),
                    point,
                    digits: Some(digits),
                    visible: true,
                    description: String::new(),
                },
                tick: Some(Tick {
                    time: chrono::Utc::now().timestamp(),
                    bid,
                    ask,
                    last: 0.0,
                }),
                selectable: true,
            },
        );
    }

    pub fn set_quote(&self, name: &str, bid: f64, ask: f64) {
        if let Some(symbol) = self.state.lock().symbols.get_mut(name) {
            symbol.tick = Some(Tick {
                time: chrono::Utc::now().timestamp(),
                bid,
                ask,
                last: 0.0,
            });
        }
    }

    /// Remove market data so `symbol_tick` returns nothing
    pub fn clear_quote(&self, name: &str) {
        if let Some(symbol) = self.state.lock().symbols.get_mut(name) {
            symbol.tick = None;
        }
    }

    /// Hide a symbol from Market Watch; `selectable` controls whether
    /// `symbol_select` can bring it back
    pub fn hide_symbol(&self, name: &str, selectable: bool) {
        if let Some(symbol) = self.state.lock().symbols.get_mut(name) {
            symbol.info.visible = false;
            symbol.selectable = selectable;
        }
    }

    /// Answer every order with this return code instead of filling it
    pub fn reject_orders(&self, retcode: Option<u32>) {
        self.state.lock().reject_retcode = retcode;
    }

    /// Make `order_send` return no result at all
    pub fn drop_order_results(&self, drop: bool) {
        self.state.lock().drop_results = drop;
    }

    pub fn reject_logins(&self, reject: bool) {
        self.state.lock().reject_logins = reject;
    }

    pub fn set_reachable(&self, reachable: bool) {
        let mut state = self.state.lock();
        state.reachable = reachable;
        if !reachable {
            state.initialized = false;
            state.logged_in = false;
        }
    }

    /// Simulate the terminal going away until the next initialize
    pub fn drop_connection(&self) {
        let mut state = self.state.lock();
        state.initialized = false;
        state.logged_in = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn login_count(&self) -> u32 {
        self.state.lock().login_count
    }

    /// Every request received by `order_send`, in order
    pub fn sent_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().sent.clone()
    }

    /// Open a position directly, bypassing `order_send`. Returns its ticket.
    pub fn open_position(
        &self,
        symbol: &str,
        order_type: OrderType,
        volume: f64,
        price: f64,
    ) -> u64 {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let now = chrono::Utc::now().timestamp();
        state.positions.insert(
            ticket,
            PositionRecord {
                ticket,
                time: now,
                time_update: now,
                position_type: order_type,
                magic: 0,
                identifier: ticket,
                volume,
                price_open: price,
                sl: 0.0,
                tp: 0.0,
                price_current: price,
                swap: 0.0,
                profit: 0.0,
                symbol: symbol.to_string(),
                comment: String::new(),
            },
        );
        ticket
    }

    fn fill(state: &mut PaperState, request: &OrderRequest) -> OrderSendResult {
        let tick = state
            .symbols
            .get(&request.symbol)
            .and_then(|s| s.tick);
        let Some(tick) = tick else {
            return Self::invalid(request, "Invalid request");
        };

        let ticket = match request.position {
            Some(ticket) => {
                let Some(position) = state.positions.get_mut(&ticket) else {
                    return Self::invalid(request, "Position doesn't exist");
                };
                if position.position_type == request.order_type {
                    return Self::invalid(request, "Invalid close direction");
                }
                if request.volume + f64::EPSILON >= position.volume {
                    state.positions.remove(&ticket);
                } else {
                    position.volume -= request.volume;
                }
                ticket
            }
            None => {
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                let now = chrono::Utc::now().timestamp();
                state.positions.insert(
                    ticket,
                    PositionRecord {
                        ticket,
                        time: now,
                        time_update: now,
                        position_type: request.order_type,
                        magic: request.magic,
                        identifier: ticket,
                        volume: request.volume,
                        price_open: request.price,
                        sl: request.sl,
                        tp: request.tp,
                        price_current: request.price,
                        swap: 0.0,
                        profit: 0.0,
                        symbol: request.symbol.clone(),
                        comment: request.comment.clone(),
                    },
                );
                ticket
            }
        };

        let deal = state.next_deal;
        state.next_deal += 1;

        OrderSendResult {
            retcode: TRADE_RETCODE_DONE,
            deal,
            order: ticket,
            volume: request.volume,
            price: request.price,
            bid: tick.bid,
            ask: tick.ask,
            comment: "Request executed".to_string(),
            request_id: deal,
            retcode_external: 0,
        }
    }

    fn invalid(request: &OrderRequest, comment: &str) -> OrderSendResult {
        OrderSendResult {
            retcode: TRADE_RETCODE_INVALID,
            deal: 0,
            order: 0,
            volume: request.volume,
            price: request.price,
            bid: 0.0,
            ask: 0.0,
            comment: comment.to_string(),
            request_id: 0,
            retcode_external: 0,
        }
    }

    /// Refresh current price and profit from the latest quotes
    fn mark_to_market(state: &PaperState, mut position: PositionRecord) -> PositionRecord {
        if let Some(tick) = state.symbols.get(&position.symbol).and_then(|s| s.tick) {
            let (current, direction) = match position.position_type {
                OrderType::Buy => (tick.bid, 1.0),
                OrderType::Sell => (tick.ask, -1.0),
            };
            position.price_current = current;
            let units = position.volume * CONTRACT_SIZE;
            position.profit =
                ((current - position.price_open) * direction * units * 100.0).round() / 100.0;
        }
        position
    }

    fn check_ready(state: &mut PaperState) -> bool {
        if state.reachable && state.initialized && state.logged_in {
            true
        } else {
            state.last_error = TerminalError::new(-10004, "No IPC connection");
            false
        }
    }
}

impl Default for PaperTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Terminal for PaperTerminal {
    fn id(&self) -> &'static str {
        "paper"
    }

    async fn initialize(&self, _path: &str) -> bool {
        let mut state = self.state.lock();
        if !state.reachable {
            state.last_error =
                TerminalError::new(-10003, "IPC initialize failed, MetaTrader 5 x64 not found");
            return false;
        }
        state.initialized = true;
        state.last_error = TerminalError::success();
        true
    }

    async fn login(&self, account: u64, _password: &str, server: &str) -> bool {
        let mut state = self.state.lock();
        if !state.initialized {
            state.last_error = TerminalError::new(-10004, "No IPC connection");
            return false;
        }
        if state.reject_logins {
            state.last_error = TerminalError::new(-6, "Terminal: Authorization failed");
            return false;
        }
        state.login_count += 1;
        state.logged_in = true;
        state.account.login = account;
        state.account.server = server.to_string();
        true
    }

    async fn shutdown(&self) {
        let mut state = self.state.lock();
        state.initialized = false;
        state.logged_in = false;
    }

    async fn is_alive(&self) -> bool {
        let state = self.state.lock();
        state.reachable && state.initialized
    }

    async fn last_error(&self) -> TerminalError {
        self.state.lock().last_error.clone()
    }

    async fn account_info(&self) -> Option<AccountInfo> {
        let mut state = self.state.lock();
        if !Self::check_ready(&mut state) {
            return None;
        }
        Some(state.account.clone())
    }

    async fn symbols(&self) -> Option<Vec<String>> {
        let mut state = self.state.lock();
        if !Self::check_ready(&mut state) {
            return None;
        }
        Some(state.symbols.keys().cloned().collect())
    }

    async fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo> {
        let mut state = self.state.lock();
        if !Self::check_ready(&mut state) {
            return None;
        }
        let info = state.symbols.get(symbol).map(|s| s.info.clone());
        if info.is_none() {
            state.last_error = TerminalError::new(-1, "Terminal: Call failed");
        }
        info
    }

    async fn symbol_select(&self, symbol: &str) -> bool {
        let mut state = self.state.lock();
        if !Self::check_ready(&mut state) {
            return false;
        }
        match state.symbols.get_mut(symbol) {
            Some(entry) if entry.selectable => {
                entry.info.visible = true;
                true
            }
            _ => false,
        }
    }

    async fn symbol_tick(&self, symbol: &str) -> Option<Tick> {
        let mut state = self.state.lock();
        if !Self::check_ready(&mut state) {
            return None;
        }
        state.symbols.get(symbol).and_then(|s| s.tick)
    }

    async fn order_send(&self, request: &OrderRequest) -> Option<OrderSendResult> {
        let mut state = self.state.lock();
        if !Self::check_ready(&mut state) {
            return None;
        }
        state.sent.push(request.clone());

        if state.drop_results {
            state.last_error = TerminalError::new(-2, "Terminal: Invalid params");
            return None;
        }

        if let Some(retcode) = state.reject_retcode {
            let mut result = Self::invalid(request, "Rejected");
            result.retcode = retcode;
            return Some(result);
        }

        Some(Self::fill(&mut state, request))
    }

    async fn positions(&self, filter: &PositionFilter) -> Option<Vec<PositionRecord>> {
        let mut state = self.state.lock();
        if !Self::check_ready(&mut state) {
            return None;
        }
        let state = &*state;
        let positions = state
            .positions
            .values()
            .filter(|p| match filter {
                PositionFilter::All => true,
                PositionFilter::Symbol(symbol) => &p.symbol == symbol,
                PositionFilter::Ticket(ticket) => p.ticket == *ticket,
            })
            .cloned()
            .map(|p| Self::mark_to_market(state, p))
            .collect();
        Some(positions)
    }

    async fn recent_rates(&self, symbol: &str, count: usize) -> Vec<RateBar> {
        let mut state = self.state.lock();
        if !Self::check_ready(&mut state) {
            return Vec::new();
        }
        let Some(tick) = state.symbols.get(symbol).and_then(|s| s.tick) else {
            return Vec::new();
        };
        let minute = tick.time - tick.time.rem_euclid(60);
        (0..count)
            .rev()
            .map(|i| RateBar {
                time: minute - 60 * i as i64,
                open: tick.bid,
                high: tick.ask,
                low: tick.bid,
                close: tick.bid,
                tick_volume: 0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected() -> PaperTerminal {
        let terminal = PaperTerminal::with_forex_majors();
        assert!(terminal.initialize("").await);
        assert!(terminal.login(1, "pw", "Paper-Demo").await);
        terminal
    }

    fn market_request(symbol: &str, order_type: OrderType, price: f64) -> OrderRequest {
        OrderRequest {
            action: TradeAction::Deal,
            position: None,
            symbol: symbol.to_string(),
            volume: 0.1,
            order_type,
            price,
            sl: 0.0,
            tp: 0.0,
            deviation: 30,
            magic: 234000,
            comment: "test".to_string(),
            type_time: OrderTime::Gtc,
            type_filling: OrderFilling::Ioc,
        }
    }

    #[tokio::test]
    async fn test_calls_fail_before_login() {
        let terminal = PaperTerminal::with_forex_majors();
        assert!(terminal.symbols().await.is_none());
        assert!(terminal.positions(&PositionFilter::All).await.is_none());
        assert_eq!(terminal.last_error().await.code, -10004);
    }

    #[tokio::test]
    async fn test_open_and_close_round_trip() {
        let terminal = connected().await;

        let opened = terminal
            .order_send(&market_request("EURUSD", OrderType::Buy, 1.1002))
            .await
            .unwrap();
        assert!(opened.is_done());

        let positions = terminal.positions(&PositionFilter::All).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].ticket, opened.order);
        assert_eq!(positions[0].price_current, 1.1);

        let mut close = market_request("EURUSD", OrderType::Sell, 1.1);
        close.position = Some(opened.order);
        assert!(terminal.order_send(&close).await.unwrap().is_done());
        assert!(terminal.positions(&PositionFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_invalid_request() {
        let terminal = connected().await;
        let result = terminal
            .order_send(&market_request("XAUUSD", OrderType::Buy, 2000.0))
            .await
            .unwrap();
        assert_eq!(result.retcode, TRADE_RETCODE_INVALID);
    }

    #[tokio::test]
    async fn test_scripted_rejection() {
        let terminal = connected().await;
        terminal.reject_orders(Some(10019));

        let result = terminal
            .order_send(&market_request("EURUSD", OrderType::Sell, 1.1))
            .await
            .unwrap();
        assert_eq!(result.retcode, 10019);
        assert_eq!(terminal.sent_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_position_filters() {
        let terminal = connected().await;
        let eur = terminal.open_position("EURUSD", OrderType::Buy, 0.1, 1.09);
        terminal.open_position("GBPUSD", OrderType::Sell, 0.2, 1.28);

        let by_symbol = terminal
            .positions(&PositionFilter::Symbol("GBPUSD".to_string()))
            .await
            .unwrap();
        assert_eq!(by_symbol.len(), 1);

        let by_ticket = terminal.positions(&PositionFilter::Ticket(eur)).await.unwrap();
        assert_eq!(by_ticket[0].symbol, "EURUSD");
        // (1.10000 - 1.09) * 0.1 lots * 100k
        assert!((by_ticket[0].profit - 100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_recent_rates_are_minute_aligned() {
        let terminal = connected().await;
        let bars = terminal.recent_rates("EURUSD", 5).await;
        assert_eq!(bars.len(), 5);
        assert!(bars.windows(2).all(|w| w[1].time - w[0].time == 60));
        assert_eq!(bars[4].time % 60, 0);
    }
}
