//! Bonding-curve market model
//!
//! Virtual-reserve constant-product curve: a buy of `input` returns
//! `virtual_output * input / (virtual_input + input)`. The curve sells only its
//! real reserve; once that is exhausted (or an admin marks it graduated) it is
//! inactive and every buy fails.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::floor_amount;
use crate::error::{Result, SluiceError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondingCurve {
    pub virtual_input: Decimal,
    pub virtual_output: Decimal,
    /// Output actually held by the curve
    pub real_output: Decimal,
    /// Input collected from buyers
    pub collected_input: Decimal,
    pub graduated: bool,
    pub enabled: bool,
}

impl BondingCurve {
    pub fn new(virtual_input: Decimal, virtual_output: Decimal, real_output: Decimal) -> Self {
        Self {
            virtual_input,
            virtual_output,
            real_output,
            collected_input: Decimal::ZERO,
            graduated: false,
            enabled: true,
        }
    }

    /// A curve that never quotes or fills
    pub fn disabled() -> Self {
        Self {
            virtual_input: Decimal::ZERO,
            virtual_output: Decimal::ZERO,
            real_output: Decimal::ZERO,
            collected_input: Decimal::ZERO,
            graduated: false,
            enabled: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.virtual_input <= Decimal::ZERO || self.virtual_output <= Decimal::ZERO {
            return Err(SluiceError::Validation(
                "bonding curve virtual reserves must be positive".to_string(),
            ));
        }
        if self.real_output < Decimal::ZERO || self.real_output >= self.virtual_output {
            return Err(SluiceError::Validation(
                "bonding curve real_output must be in [0, virtual_output)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.graduated && self.real_output > Decimal::ZERO
    }

    /// Input that buys the whole real reserve
    pub fn max_input(&self) -> Decimal {
        if !self.is_active() {
            return Decimal::ZERO;
        }
        let denominator = self.virtual_output - self.real_output;
        if denominator <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.real_output * self.virtual_input / denominator
    }

    /// Output a buy of `input` would return right now
    pub fn quote_buy(&self, input: Decimal) -> Decimal {
        if !self.is_active() || input <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let raw = self.virtual_output * input / (self.virtual_input + input);
        floor_amount(raw).min(self.real_output)
    }

    /// Execute a buy against the curve state. Returns the output bought.
    pub fn apply_buy(&mut self, input: Decimal) -> Result<Decimal> {
        if !self.is_active() {
            return Err(SluiceError::SourceUnavailable(
                "bonding curve is not active".to_string(),
            ));
        }
        if input <= Decimal::ZERO {
            return Err(SluiceError::ZeroAmount);
        }

        let output = floor_amount(self.virtual_output * input / (self.virtual_input + input));
        if output > self.real_output {
            return Err(SluiceError::SourceUnavailable(format!(
                "bonding curve reserve {} below requested output {}",
                self.real_output, output
            )));
        }
        if output.is_zero() {
            return Err(SluiceError::SourceUnavailable(
                "bonding curve buy rounds to zero output".to_string(),
            ));
        }

        self.virtual_input += input;
        self.virtual_output -= output;
        self.real_output -= output;
        self.collected_input += input;
        if self.real_output.is_zero() {
            self.graduated = true;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn curve() -> BondingCurve {
        // Spot price 2400 input per output
        BondingCurve::new(dec!(240000), dec!(100), dec!(10))
    }

    #[test]
    fn test_quote_buy_has_price_impact() {
        let c = curve();
        let small = c.quote_buy(dec!(2400));
        let large = c.quote_buy(dec!(24000));
        assert!(small > Decimal::ZERO);
        // Larger buys get a worse average price
        assert!(large / dec!(24000) < small / dec!(2400));
    }

    #[test]
    fn test_max_input_buys_whole_reserve() {
        let c = curve();
        let max_in = c.max_input();
        // 10 * 240000 / 90
        assert_eq!(floor_amount(max_in), floor_amount(dec!(2400000) / dec!(90)));
        assert!(c.quote_buy(max_in * dec!(2)) <= c.real_output);
    }

    #[test]
    fn test_apply_buy_updates_reserves() {
        let mut c = curve();
        let expected = c.quote_buy(dec!(2400));
        let out = c.apply_buy(dec!(2400)).unwrap();
        assert_eq!(out, expected);
        assert_eq!(c.collected_input, dec!(2400));
        assert_eq!(c.real_output, dec!(10) - out);
    }

    #[test]
    fn test_inactive_curve_rejects_buys() {
        let mut c = curve();
        c.graduated = true;
        assert!(!c.is_active());
        assert_eq!(c.quote_buy(dec!(100)), Decimal::ZERO);
        assert!(c.apply_buy(dec!(100)).is_err());

        assert!(BondingCurve::disabled().apply_buy(dec!(1)).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(curve().validate().is_ok());
        assert!(BondingCurve::new(dec!(1), dec!(10), dec!(10)).validate().is_err());
        assert!(BondingCurve::disabled().validate().is_ok());
    }
}
