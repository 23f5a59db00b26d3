use crate::{Error, Result};
use rust_decimal::Decimal;

/// Convert a quote-asset notional into an exchange-legal base quantity
///
/// The raw quantity `target_notional / entry_price` is floored to a whole
/// multiple of `lot_step`, or to whole units when the step is zero.
/// A result of zero or below is rejected with [`Error::InvalidQuantity`];
/// callers skip the order rather than resize it.
pub fn size_entry(target_notional: Decimal, entry_price: Decimal, lot_step: Decimal) -> Result<Decimal> {
    if entry_price <= Decimal::ZERO {
        return Err(Error::InvalidQuantity {
            quantity: Decimal::ZERO,
        });
    }

    let raw = target_notional / entry_price;
    let quantity = if lot_step.is_zero() {
        raw.floor()
    } else {
        (raw / lot_step).floor() * lot_step
    };

    if quantity <= Decimal::ZERO {
        return Err(Error::InvalidQuantity { quantity });
    }

    Ok(quantity.normalize())
}
