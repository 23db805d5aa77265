//! Inspect command: per-day outcome and code for a single source file

use anyhow::Result;
use intraday_patterns::data::{group_bars_by_day, load_bars, stock_name_from_path};
use intraday_patterns::grid::GridEncoder;
use intraday_patterns::simulator::TradeSimulator;
use tracing::info;

pub fn run(file: String, config_path: Option<String>) -> Result<()> {
    let config = super::load_config(config_path.as_deref())?;
    config.validate()?;

    let stock = stock_name_from_path(&file)?;
    let bars = load_bars(&file, &config.data.session())?;
    let total_bars = bars.len();
    let days = group_bars_by_day(bars, &stock, config.data.bars_per_day);
    info!("{}: {} bars, {} complete days", stock, total_bars, days.len());

    let simulator = TradeSimulator::new(
        config.simulation.stop_loss_percent,
        config.simulation.warm_up_depth,
    );
    let encoder = GridEncoder::new(
        config.grid.volatility_unit,
        config.grid.depth,
        config.grid.price_basis,
    );

    println!("\n{}", "=".repeat(110));
    println!("{} - {} DAYS", stock, days.len());
    println!("{}", "=".repeat(110));
    println!(
        "{:<10} {:<5} {:>9} {:>9} {:>9} {:<10} {:>5}-{:<5} | Code",
        "Date", "Side", "Entry", "Exit", "Rev%", "Close", "In", "Out"
    );
    println!("{}", "-".repeat(110));

    for (date, day) in &days {
        let code = match encoder.encode(&day.bars) {
            Ok(code) => code.to_string(),
            Err(e) => format!("<{}>", e),
        };

        match simulator.simulate(day) {
            Ok(Some(o)) => println!(
                "{:<10} {:<5} {:>9.2} {:>9.2} {:>9} {:<10} {:>5}-{:<5} | {}",
                date.to_string(),
                o.side.to_string(),
                o.entry_price,
                o.exit_price,
                o.revenue.to_string(),
                o.close_reason.to_string(),
                o.entry_time.format("%H:%M").to_string(),
                o.exit_time.format("%H:%M").to_string(),
                code
            ),
            Ok(None) => println!("{:<10} no trade | {}", date.to_string(), code),
            Err(e) => println!("{:<10} error: {} | {}", date.to_string(), e, code),
        }
    }
    println!("{}", "=".repeat(110));

    Ok(())
}
