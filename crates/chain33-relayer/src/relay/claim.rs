use crate::error::RelayError;
use ethers::{
    types::{H256, U256},
    utils::keccak256,
};

/// Big-endian bytes of `value` with leading zeros stripped; zero is empty.
pub fn minimal_be_bytes(value: U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let first = buf.iter().position(|b| *b != 0).unwrap_or(buf.len());
    buf[first..].to_vec()
}

/// `keccak256(nonce ‖ sender ‖ receiver ‖ symbol ‖ amount)`, identical for
/// every replay of the same source event.
pub fn compute_claim_id(
    nonce: U256,
    sender: &str,
    receiver: &str,
    symbol: &str,
    amount: U256,
) -> H256 {
    let mut preimage = minimal_be_bytes(nonce);
    preimage.extend_from_slice(sender.as_bytes());
    preimage.extend_from_slice(receiver.as_bytes());
    preimage.extend_from_slice(symbol.as_bytes());
    preimage.extend_from_slice(&minimal_be_bytes(amount));
    H256::from(keccak256(preimage))
}

/// Rescales `amount` from `from_decimals` to `to_decimals`. Scaling down
/// truncates.
pub fn adjust_precision(amount: U256, from_decimals: u8, to_decimals: u8) -> Result<U256, RelayError> {
    if from_decimals == to_decimals {
        return Ok(amount);
    }

    let shift = u32::from(from_decimals.abs_diff(to_decimals));
    let factor = U256::from(10u8).checked_pow(U256::from(shift));
    if to_decimals > from_decimals {
        factor
            .and_then(|factor| amount.checked_mul(factor))
            .ok_or_else(|| RelayError::AmountOverflow {
                amount: amount.to_string(),
                shift,
            })
    } else {
        Ok(factor.map(|factor| amount / factor).unwrap_or_default())
    }
}
