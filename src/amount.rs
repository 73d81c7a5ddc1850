//! BTC/satoshi conversion and fee math.
//!
//! Kept as small, pure, heavily unit-tested leaf functions.

use bitcoin::Amount;

use crate::domain::Sats;

/// Percentage of `pay_amount` forwarded to the merchant. The remaining 1% is
/// the service fee retained on the deposit address.
pub const DEFAULT_FORWARD_PERCENT: u8 = 99;

/// Assumed size, in vbytes, of a 1-in/1-out/1-change segwit forwarding
/// transaction.
pub const FORWARD_TX_SIZE_VBYTES: u64 = 141;

/// Assumed size, in vbytes, of a single change output.
pub const CHANGE_OUTPUT_SIZE_VBYTES: u64 = 32;

/// Converts a BTC amount (as reported by Bitcoin Core) to satoshis.
///
/// `bitcoin::Amount::from_btc` already rounds to the nearest satoshi and
/// rejects values that don't fit, so there is no hand-rolled rounding here —
/// the round-trip is exact for any value representable in 1e-8 BTC.
pub fn btc_to_sats(btc: f64) -> Result<Sats, bitcoin::amount::ParseAmountError> {
    Ok(Sats(Amount::from_btc(btc)?.to_sat()))
}

/// Converts satoshis back to a BTC float, e.g. for RPC calls that want BTC.
pub fn sats_to_btc(sats: Sats) -> f64 {
    Amount::from_sat(sats.0).to_btc()
}

/// 99% of `pay_amount`, rounded down — the amount forwarded to the merchant.
/// The floor means the 1% service fee never comes up short by a rounding
/// satoshi.
pub fn forward_amount(pay_amount: Sats, forward_percent: u8) -> Sats {
    Sats(pay_amount.0 * forward_percent as u64 / 100)
}

/// Fee, in satoshis, for a transaction of `size_vbytes` at `fee_rate_btc_per_kb`.
///
/// `feePerByte = feeRate(BTC/kB) * 1e8 / 1000`; `fee = ceil(feePerByte * size)`.
pub fn fee_for_size(fee_rate_btc_per_kb: f64, size_vbytes: u64) -> Sats {
    let fee_per_byte = fee_rate_btc_per_kb * 100_000_000.0 / 1000.0;
    let fee = (fee_per_byte * size_vbytes as f64).ceil();
    Sats(fee.max(0.0) as u64)
}

/// Whether `pay_amount` leaves enough room for the forwarding transaction's
/// fee and the service's change output once the 1% fee is skimmed off
/// the gateway rejects invoices too small to survive forwarding fees.
///
/// `payAmount > 2*txFee` AND `(payAmount - forwardAmount) > changeFee`.
pub fn is_payment_viable(pay_amount: Sats, fee_rate_btc_per_kb: f64, forward_percent: u8) -> bool {
    let tx_fee = fee_for_size(fee_rate_btc_per_kb, FORWARD_TX_SIZE_VBYTES);
    let change_fee = fee_for_size(fee_rate_btc_per_kb, CHANGE_OUTPUT_SIZE_VBYTES);

    let min_pay_amount = Sats(tx_fee.0.saturating_mul(2));
    let forward = forward_amount(pay_amount, forward_percent);
    let change_amount = pay_amount.checked_sub(forward);

    pay_amount > min_pay_amount && change_amount > change_fee
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_to_sats_round_trips() {
        let cases = [0.003403, 1.0, 0.00000001, 21_000_000.0, 0.0];
        for btc in cases {
            let sats = btc_to_sats(btc).unwrap();
            assert_eq!(sats_to_btc(sats), btc);
        }
    }

    #[test]
    fn forward_amount_is_99_percent_floor() {
        assert_eq!(forward_amount(Sats(340_300), 99).0, 336_897);
        assert_eq!(forward_amount(Sats(100), 99).0, 99);
        assert_eq!(forward_amount(Sats(1), 99).0, 0);
    }

    #[test]
    fn fee_for_size_rounds_up() {
        // 0.00002986 BTC/kB fallback fee, 141 vbyte tx.
        let fee = fee_for_size(0.00002986, 141);
        assert_eq!(fee.0, ((0.00002986 * 100_000_000.0 / 1000.0) * 141.0).ceil() as u64);
    }

    #[test]
    fn viability_rejects_dust_amounts() {
        assert!(!is_payment_viable(Sats(0), 0.00002986, 99));
        assert!(!is_payment_viable(Sats(500), 0.00002986, 99));
    }

    #[test]
    fn viability_accepts_realistic_payment() {
        assert!(is_payment_viable(Sats(340_300), 0.00002986, 99));
    }
}
