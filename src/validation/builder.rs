//! Transaction construction
//!
//! Greedy coin selection over the sender's unspent outputs, change back to
//! the sender, then id, sign and validate.

use super::transaction::{unix_now, validate, Tx, TxError, TxIn, TxOut, UTxOut};
use crate::crypto::Hash;
use crate::wallet::SigningService;

/// Build a signed, validated transaction moving `amount` from `from` to `to`.
///
/// `unspent` must be the sender's spendable outputs in scan order; `find_tx`
/// resolves chain transactions for the final validation pass.
pub fn build_transaction<F>(
    unspent: &[UTxOut],
    from: &str,
    to: &str,
    amount: u64,
    signer: &dyn SigningService,
    find_tx: F,
) -> Result<Tx, TxError>
where
    F: Fn(&Hash) -> Option<Tx>,
{
    let balance = unspent
        .iter()
        .fold(0u64, |sum, u| sum.saturating_add(u.amount));
    if balance < amount {
        return Err(TxError::InsufficientFunds {
            have: balance,
            need: amount,
        });
    }

    let mut tx_ins = Vec::new();
    let mut total: u64 = 0;
    for utxo in unspent {
        if total >= amount {
            break;
        }
        tx_ins.push(TxIn {
            tx_id: utxo.tx_id,
            index: utxo.index,
            signature: from.to_string(),
        });
        total = total.saturating_add(utxo.amount);
    }

    let mut tx_outs = Vec::with_capacity(2);
    if total > amount {
        tx_outs.push(TxOut {
            address: from.to_string(),
            amount: total - amount,
        });
    }
    tx_outs.push(TxOut {
        address: to.to_string(),
        amount,
    });

    let mut tx = Tx::new(unix_now(), tx_ins, tx_outs);
    tx.sign(signer)?;

    validate(&tx, find_tx, signer)
        .map_err(|e| TxError::InvalidTransaction(e.to_string()))?;

    Ok(tx)
}
