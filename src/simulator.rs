//! Single-trade day simulator
//!
//! Walks one session's bars after a warm-up window, opens exactly one
//! position and closes it either on a stop-loss breach or on the last bar.
//!
//! The walk is an explicit state machine:
//!
//! ```text
//! Flat --(first bar after warm-up)--> Open --(stop breached | last bar)--> Closed
//! ```
//!
//! Each transition is a pure function of the current state and one bar, so
//! the machine can be driven and tested bar by bar.

use chrono::NaiveDateTime;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::error::{PatternError, PatternResult};
use crate::{Bar, CloseReason, Side, TradeOutcome, TradingDay};

/// Per-day facts every transition needs
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub stock: String,
    /// Open of the session's very first bar, used to pick the side
    pub first_open: f64,
    pub stop_loss_percent: f64,
    stop_loss_revenue: Decimal,
}

impl SessionContext {
    pub fn new(day: &TradingDay, stop_loss_percent: f64) -> PatternResult<Self> {
        let first_open = day
            .bars
            .first()
            .map(|b| b.open)
            .ok_or_else(|| PatternError::invalid("trading day has no bars"))?;

        let stop_loss_revenue = Decimal::from_f64(stop_loss_percent)
            .filter(|_| stop_loss_percent >= 0.0)
            .map(|sl| -sl)
            .ok_or_else(|| {
                PatternError::invalid(format!("invalid stop loss percent: {}", stop_loss_percent))
            })?;

        Ok(Self {
            stock: day.stock.clone(),
            first_open,
            stop_loss_percent,
            stop_loss_revenue,
        })
    }
}

/// An open position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenPosition {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
}

impl OpenPosition {
    /// Enter at the bar's open. The side is decided here and never revisited.
    pub fn enter(ctx: &SessionContext, bar: &Bar) -> Self {
        let side = if bar.close >= ctx.first_open {
            Side::Long
        } else {
            Side::Short
        };

        Self {
            side,
            entry_price: bar.open,
            entry_time: bar.datetime,
        }
    }

    pub fn stop_price(&self, stop_loss_percent: f64) -> f64 {
        match self.side {
            Side::Long => self.entry_price * (1.0 - stop_loss_percent / 100.0),
            Side::Short => self.entry_price * (1.0 + stop_loss_percent / 100.0),
        }
    }

    /// Stop price if this bar breaches it
    pub fn breached_stop(&self, ctx: &SessionContext, bar: &Bar) -> Option<f64> {
        let stop = self.stop_price(ctx.stop_loss_percent);
        let breached = match self.side {
            Side::Long => bar.low < stop,
            Side::Short => bar.high > stop,
        };
        breached.then_some(stop)
    }

    fn stop_out(self, ctx: &SessionContext, stop: f64, bar: &Bar) -> TradeOutcome {
        TradeOutcome {
            close_reason: CloseReason::StopLoss,
            revenue: ctx.stop_loss_revenue,
            side: self.side,
            stock: ctx.stock.clone(),
            entry_price: self.entry_price,
            entry_time: self.entry_time,
            exit_price: stop,
            exit_time: bar.datetime,
        }
    }

    fn close_end_of_day(self, ctx: &SessionContext, bar: &Bar) -> TradeOutcome {
        TradeOutcome {
            close_reason: CloseReason::EndOfDay,
            revenue: absolute_move_percent(self.entry_price, bar.close),
            side: self.side,
            stock: ctx.stock.clone(),
            entry_price: self.entry_price,
            entry_time: self.entry_time,
            exit_price: bar.close,
            exit_time: bar.datetime,
        }
    }
}

/// Unsigned percent move from entry to exit, rounded to 2 places.
///
/// Rounding acts on the exact binary value of the float, not on its
/// shortest decimal rendering: 4.0549999... rounds to 4.05, not 4.06.
fn absolute_move_percent(entry: f64, exit: f64) -> Decimal {
    if entry == 0.0 {
        return Decimal::ZERO;
    }
    let pct = ((exit - entry) / entry * 100.0).abs();
    Decimal::from_f64_retain(pct)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
        .unwrap_or(Decimal::ZERO)
}

/// Simulator state for one walk over a day
#[derive(Debug, Clone, PartialEq)]
pub enum TradeState {
    Flat,
    Open(OpenPosition),
    Closed(TradeOutcome),
}

impl TradeState {
    /// Advance by one bar.
    ///
    /// The entry bar itself is never checked for a stop. If the entry bar is
    /// also the last bar, the position is closed on it at end of day.
    pub fn step(self, ctx: &SessionContext, bar: &Bar, is_last: bool) -> TradeState {
        match self {
            TradeState::Flat => {
                let position = OpenPosition::enter(ctx, bar);
                if is_last {
                    TradeState::Closed(position.close_end_of_day(ctx, bar))
                } else {
                    TradeState::Open(position)
                }
            }
            TradeState::Open(position) => {
                if let Some(stop) = position.breached_stop(ctx, bar) {
                    TradeState::Closed(position.stop_out(ctx, stop, bar))
                } else if is_last {
                    TradeState::Closed(position.close_end_of_day(ctx, bar))
                } else {
                    TradeState::Open(position)
                }
            }
            closed @ TradeState::Closed(_) => closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, TradeState::Closed(_))
    }
}

/// Stop-loss / end-of-day trade simulator
#[derive(Debug, Clone, Copy)]
pub struct TradeSimulator {
    pub stop_loss_percent: f64,
    pub warm_up_depth: usize,
}

impl TradeSimulator {
    pub fn new(stop_loss_percent: f64, warm_up_depth: usize) -> Self {
        Self {
            stop_loss_percent,
            warm_up_depth,
        }
    }

    /// Simulate one trade on `day`.
    ///
    /// Returns `Ok(None)` when the day is too short to get past the warm-up.
    pub fn simulate(&self, day: &TradingDay) -> PatternResult<Option<TradeOutcome>> {
        day.validate()?;

        if day.bars.len() < self.warm_up_depth + 1 {
            debug!(
                "{} {}: {} bars, need {} to enter",
                day.stock,
                day.date,
                day.bars.len(),
                self.warm_up_depth + 1
            );
            return Ok(None);
        }

        let ctx = SessionContext::new(day, self.stop_loss_percent)?;
        let last = day.bars.len() - 1;
        let mut state = TradeState::Flat;

        for (i, bar) in day.bars.iter().enumerate().skip(self.warm_up_depth) {
            state = match state.step(&ctx, bar, i == last) {
                TradeState::Closed(outcome) => return Ok(Some(outcome)),
                next => next,
            };
        }

        Ok(None)
    }
}
