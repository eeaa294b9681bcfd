//! Pricing engine: quote validation, leg pricing, notional sizing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dn_core::{ExecutionMode, InstrumentId, Leg, OrderSide, Price, Quote, Size};

use crate::error::{PricingError, PricingResult};

/// Pricing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Ticks inside the touch for passive orders. 0 = join the touch.
    #[serde(default)]
    pub maker_offset_ticks: u32,
    /// Ticks through the opposite touch for aggressive orders, to
    /// guarantee crossing.
    #[serde(default = "default_slippage_ticks")]
    pub slippage_ticks: u32,
    /// Maximum quote age before it is considered stale.
    #[serde(default = "default_max_quote_age_ms")]
    pub max_quote_age_ms: i64,
}

fn default_slippage_ticks() -> u32 {
    5
}

fn default_max_quote_age_ms() -> i64 {
    500
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            maker_offset_ticks: 0,
            slippage_ticks: default_slippage_ticks(),
            max_quote_age_ms: default_max_quote_age_ms(),
        }
    }
}

/// Computes per-leg order price and tick-rounded quantity.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Reject crossed, non-positive, or stale quotes.
    pub fn validate(&self, quote: &Quote) -> PricingResult<()> {
        if !quote.is_well_formed() {
            return Err(PricingError::InvalidQuote(format!(
                "bid {} / ask {}",
                quote.bid, quote.ask
            )));
        }
        let age_ms = quote.age_ms();
        if age_ms > self.config.max_quote_age_ms {
            return Err(PricingError::StaleQuote {
                age_ms,
                max_age_ms: self.config.max_quote_age_ms,
            });
        }
        Ok(())
    }

    /// Price for one leg at the given mode.
    ///
    /// Passive orders rest at the touch (buys at the bid, sells at the
    /// ask), nudged toward the spread interior by the maker offset but
    /// clamped one tick short of crossing. Aggressive prices take the
    /// opposite touch plus a slippage buffer so the order is guaranteed
    /// to cross.
    pub fn leg_price(
        &self,
        quote: &Quote,
        side: OrderSide,
        mode: ExecutionMode,
        tick_size: Price,
    ) -> PricingResult<Price> {
        self.validate(quote)?;

        let price = match (mode, side) {
            (ExecutionMode::Passive, OrderSide::Buy) => {
                let offered = quote
                    .bid
                    .offset_ticks(tick_size, self.config.maker_offset_ticks as i32);
                let ceiling = quote.ask.offset_ticks(tick_size, -1);
                offered.min(ceiling)
            }
            (ExecutionMode::Passive, OrderSide::Sell) => {
                let offered = quote
                    .ask
                    .offset_ticks(tick_size, -(self.config.maker_offset_ticks as i32));
                let floor = quote.bid.offset_ticks(tick_size, 1);
                offered.max(floor)
            }
            (ExecutionMode::Aggressive, OrderSide::Buy) => quote
                .ask
                .offset_ticks(tick_size, self.config.slippage_ticks as i32),
            (ExecutionMode::Aggressive, OrderSide::Sell) => quote
                .bid
                .offset_ticks(tick_size, -(self.config.slippage_ticks as i32)),
        };

        if !price.is_positive() {
            return Err(PricingError::InvalidQuote(format!(
                "computed non-positive {side} price {price}"
            )));
        }
        Ok(price)
    }

    /// Quantity for a target notional at a reference price, rounded
    /// half-up to the nearest multiple of `step`.
    pub fn size_for_notional(
        &self,
        notional: Decimal,
        reference: Price,
        step: Size,
    ) -> PricingResult<Size> {
        if notional <= Decimal::ZERO {
            return Err(PricingError::InsufficientLiquidity(format!(
                "non-positive notional {notional}"
            )));
        }
        if !reference.is_positive() || !step.is_positive() {
            return Err(PricingError::InvalidQuote(format!(
                "reference {reference} / step {step}"
            )));
        }
        let raw = Size::new(notional / reference.inner());
        let rounded = raw.round_to_step_half_up(step);
        if !rounded.is_positive() {
            return Err(PricingError::InsufficientLiquidity(format!(
                "notional {notional} rounds to zero at {reference}"
            )));
        }
        Ok(rounded)
    }

    /// Assemble a leg for the given notional against a validated quote.
    ///
    /// Quantity is sized off the mid price so both legs of the pair carry
    /// the same notional regardless of side.
    pub fn build_leg(
        &self,
        instrument: InstrumentId,
        side: OrderSide,
        quote: &Quote,
        tick_size: Price,
        size_step: Size,
        notional: Decimal,
    ) -> PricingResult<Leg> {
        self.validate(quote)?;
        let mid = quote
            .mid()
            .ok_or_else(|| PricingError::InvalidQuote("no mid price".to_string()))?;
        let qty = self.size_for_notional(notional, mid, size_step)?;
        Ok(Leg::new(instrument, side, qty, tick_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn engine() -> PricingEngine {
        PricingEngine::new(PricingConfig {
            maker_offset_ticks: 0,
            slippage_ticks: 5,
            max_quote_age_ms: 500,
        })
    }

    fn quote(bid: Decimal, ask: Decimal) -> Quote {
        Quote::new(Price::new(bid), Price::new(ask))
    }

    #[test]
    fn test_passive_buy_joins_the_bid() {
        let price = engine()
            .leg_price(
                &quote(dec!(1999.99), dec!(2000.01)),
                OrderSide::Buy,
                ExecutionMode::Passive,
                Price::new(dec!(0.01)),
            )
            .unwrap();
        assert_eq!(price.inner(), dec!(1999.99));
    }

    #[test]
    fn test_passive_sell_joins_the_ask() {
        let price = engine()
            .leg_price(
                &quote(dec!(1999.99), dec!(2000.01)),
                OrderSide::Sell,
                ExecutionMode::Passive,
                Price::new(dec!(0.01)),
            )
            .unwrap();
        assert_eq!(price.inner(), dec!(2000.01));
    }

    #[test]
    fn test_maker_offset_never_crosses() {
        let wide_offset = PricingEngine::new(PricingConfig {
            maker_offset_ticks: 50,
            slippage_ticks: 5,
            max_quote_age_ms: 500,
        });
        // Spread is only 2 ticks; offered bid+50 ticks must clamp to ask-1.
        let price = wide_offset
            .leg_price(
                &quote(dec!(2000.00), dec!(2000.02)),
                OrderSide::Buy,
                ExecutionMode::Passive,
                Price::new(dec!(0.01)),
            )
            .unwrap();
        assert_eq!(price.inner(), dec!(2000.01));
    }

    #[test]
    fn test_aggressive_buy_crosses_with_buffer() {
        let price = engine()
            .leg_price(
                &quote(dec!(1999.99), dec!(2000.01)),
                OrderSide::Buy,
                ExecutionMode::Aggressive,
                Price::new(dec!(0.01)),
            )
            .unwrap();
        // ask + 5 ticks
        assert_eq!(price.inner(), dec!(2000.06));
    }

    #[test]
    fn test_crossed_quote_is_invalid() {
        let err = engine()
            .leg_price(
                &quote(dec!(2000.02), dec!(2000.00)),
                OrderSide::Buy,
                ExecutionMode::Passive,
                Price::new(dec!(0.01)),
            )
            .unwrap_err();
        assert!(matches!(err, PricingError::InvalidQuote(_)));
    }

    #[test]
    fn test_stale_quote_rejected() {
        let old = Utc::now() - chrono::Duration::milliseconds(800);
        let q = Quote::at(Price::new(dec!(100)), Price::new(dec!(101)), old);
        let err = engine().validate(&q).unwrap_err();
        assert!(matches!(err, PricingError::StaleQuote { .. }));
    }

    #[test]
    fn test_sizing_exact_multiple() {
        // notional=100, price=2000, tick=0.01 -> raw 0.05, already exact
        let qty = engine()
            .size_for_notional(dec!(100), Price::new(dec!(2000)), Size::new(dec!(0.01)))
            .unwrap();
        assert_eq!(qty.inner(), dec!(0.05));
    }

    #[test]
    fn test_sizing_rounds_half_up() {
        // 100 / 1818 = 0.05500... -> rounds up to 0.06
        let qty = engine()
            .size_for_notional(dec!(100), Price::new(dec!(1818)), Size::new(dec!(0.01)))
            .unwrap();
        assert_eq!(qty.inner(), dec!(0.06));
    }

    #[test]
    fn test_sizing_zero_quantity_is_insufficient_liquidity() {
        let err = engine()
            .size_for_notional(dec!(0.1), Price::new(dec!(50000)), Size::new(dec!(0.01)))
            .unwrap_err();
        assert!(matches!(err, PricingError::InsufficientLiquidity(_)));
    }

    #[test]
    fn test_build_leg_sizes_off_mid() {
        let leg = engine()
            .build_leg(
                InstrumentId::from("ETH-PERP"),
                OrderSide::Buy,
                &quote(dec!(1999), dec!(2001)),
                Price::new(dec!(0.01)),
                Size::new(dec!(0.01)),
                dec!(100),
            )
            .unwrap();
        assert_eq!(leg.target.inner(), dec!(0.05));
        assert_eq!(leg.mode, ExecutionMode::Passive);
        assert!(leg.attempts.is_empty());
    }
}
