//! Terminal connection self-test (`--test-mt5`)
//!
//! Exercises every read-only terminal call the bridge depends on and prints
//! a human-readable report. No orders are sent.

use crate::error::{AppError, Result};
use crate::terminal::types::{AccountInfo, PositionFilter, PositionRecord, RateBar, Tick};
use crate::terminal::TerminalSession;
use chrono::DateTime;
use tracing::{info, warn};

/// Symbol used for the market data check
pub const QUOTE_SYMBOL: &str = "EURUSD";

const SAMPLE_SYMBOLS: usize = 10;
const SAMPLE_BARS: usize = 5;
const SAMPLE_POSITIONS: usize = 5;

/// What the self-test observed
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub account: AccountInfo,
    pub symbol_count: usize,
    pub sample_symbols: Vec<String>,
    /// `false` when the quote symbol could not be added to Market Watch
    pub quote_selected: bool,
    pub quote_tick: Option<Tick>,
    pub recent_bars: Vec<RateBar>,
    /// `None` when the position query failed
    pub position_count: Option<usize>,
    pub sample_positions: Vec<PositionRecord>,
}

/// Connect, collect the report, print it and shut the terminal down
pub async fn run_connection_test(session: &mut TerminalSession) -> Result<DiagnosticsReport> {
    println!("Testing MT5 connection...");

    if let Err(e) = session.connect().await {
        println!("{}", e);
        return Err(e);
    }

    let report = collect(session).await;
    session.close().await;

    let report = report?;
    print_report(&report);
    println!("\nMT5 connection test completed successfully!");
    info!("MT5 connection test completed");
    Ok(report)
}

async fn collect(session: &TerminalSession) -> Result<DiagnosticsReport> {
    let terminal = session.terminal();

    let account = terminal.account_info().await.ok_or_else(|| {
        println!("Failed to get account info");
        AppError::Connectivity("Failed to get account info".to_string())
    })?;

    let symbols = match terminal.symbols().await {
        Some(symbols) => symbols,
        None => {
            warn!("Failed to get symbols: {}", terminal.last_error().await);
            Vec::new()
        }
    };

    let quote_selected = terminal.symbol_select(QUOTE_SYMBOL).await;
    let (quote_tick, recent_bars) = if quote_selected {
        let tick = terminal.symbol_tick(QUOTE_SYMBOL).await;
        let bars = terminal.recent_rates(QUOTE_SYMBOL, SAMPLE_BARS).await;
        (tick, bars)
    } else {
        warn!("Failed to select {}", QUOTE_SYMBOL);
        (None, Vec::new())
    };

    let (position_count, sample_positions) = match terminal.positions(&PositionFilter::All).await {
        Some(mut positions) => {
            let count = positions.len();
            positions.truncate(SAMPLE_POSITIONS);
            (Some(count), positions)
        }
        None => {
            warn!("Failed to get positions: {}", terminal.last_error().await);
            (None, Vec::new())
        }
    };

    Ok(DiagnosticsReport {
        account,
        symbol_count: symbols.len(),
        sample_symbols: symbols.into_iter().take(SAMPLE_SYMBOLS).collect(),
        quote_selected,
        quote_tick,
        recent_bars,
        position_count,
        sample_positions,
    })
}

fn print_report(report: &DiagnosticsReport) {
    let account = &report.account;
    println!("\n=== Account Information ===");
    println!("Name: {}", account.name);
    println!("Server: {}", account.server);
    println!("Balance: {}", account.balance);
    println!("Equity: {}", account.equity);
    println!("Margin: {}", account.margin);
    println!("Free Margin: {}", account.margin_free);
    println!("Leverage: 1:{}", account.leverage);

    println!("\n=== Symbol Information ===");
    println!("Total symbols available: {}", report.symbol_count);
    println!("\nSample symbols:");
    for (i, name) in report.sample_symbols.iter().enumerate() {
        println!("{}. {}", i + 1, name);
    }

    println!("\n=== Market Data Test for {} ===", QUOTE_SYMBOL);
    if !report.quote_selected {
        println!("Failed to select {}", QUOTE_SYMBOL);
    } else {
        match &report.quote_tick {
            Some(tick) => println!("Current bid/ask: {:.5}/{:.5}", tick.bid, tick.ask),
            None => println!("Failed to get tick data for {}", QUOTE_SYMBOL),
        }

        if report.recent_bars.is_empty() {
            println!("Failed to get rate data for {}", QUOTE_SYMBOL);
        } else {
            println!("\nRecent 1-minute candles:");
            println!(
                "{:<20} {:>10} {:>10} {:>10} {:>10} {:>8}",
                "time", "open", "high", "low", "close", "volume"
            );
            for bar in &report.recent_bars {
                let time = DateTime::from_timestamp(bar.time, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| bar.time.to_string());
                println!(
                    "{:<20} {:>10.5} {:>10.5} {:>10.5} {:>10.5} {:>8}",
                    time, bar.open, bar.high, bar.low, bar.close, bar.tick_volume
                );
            }
        }
    }

    println!("\n=== Open Positions ===");
    match report.position_count {
        Some(count) => println!("Total open positions: {}", count),
        None => println!("No open positions or error getting positions"),
    }
    for (i, position) in report.sample_positions.iter().enumerate() {
        println!(
            "{}. Symbol: {}, Type: {}, Volume: {}, Profit: {}",
            i + 1,
            position.symbol,
            position.position_type.label(),
            position.volume,
            position.profit
        );
    }
}
