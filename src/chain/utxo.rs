//! Unspent-output and balance derivation, and transaction construction on
//! top of it. Derived views are computed on demand from the chain plus the
//! pending mempool transactions and are never cached.

use crate::core::block::Block;
use crate::core::transaction::{Tx, TxIn, TxOut, UTxOut, find_tx, validate};
use crate::error::{NodeError, Result};
use crate::wallet::Wallet;
use std::collections::HashSet;

/// True when any pending input already references the output `(tx_id, index)`.
fn is_on_mempool(pending: &[Tx], tx_id: &str, index: i64) -> bool {
    pending.iter().any(|tx| {
        tx.get_tx_ins()
            .iter()
            .any(|input| input.get_tx_id() == tx_id && input.get_index() == index)
    })
}

///
/// The `unspent_outputs` function finds every output owned by `address` that
/// no input has consumed. Pending mempool transactions are scanned ahead of
/// the chain (newest block first), so unconfirmed change is spendable and
/// outputs referenced by a pending input are shadowed.
///
/// Once any output of a transaction has been spent by the owner, the
/// remaining outputs of that same transaction are also considered
/// unavailable: the spent set is keyed by the referenced transaction id, not
/// by (id, index). Balance-compatible consumers depend on this.
///
pub fn unspent_outputs(blocks: &[Block], pending: &[Tx], address: &str) -> Vec<UTxOut> {
    let mut unspent = vec![];
    let mut spent_by_owner: HashSet<String> = HashSet::new();

    let chain_txs = blocks.iter().flat_map(|block| block.get_transactions());
    for tx in pending.iter().chain(chain_txs) {
        for input in tx.get_tx_ins() {
            if input.is_coinbase() {
                break;
            }
            // A referenced transaction can be missing from a malformed chain;
            // such inputs spend nothing.
            let Some(prev) = find_tx(pending, blocks, input.get_tx_id()) else {
                continue;
            };
            let Ok(index) = usize::try_from(input.get_index()) else {
                continue;
            };
            if let Some(prev_out) = prev.get_tx_outs().get(index) {
                if prev_out.get_address() == address {
                    spent_by_owner.insert(input.get_tx_id().to_string());
                }
            }
        }
        for (index, output) in tx.get_tx_outs().iter().enumerate() {
            if output.get_address() == address
                && !spent_by_owner.contains(tx.get_id())
                && !is_on_mempool(pending, tx.get_id(), index as i64)
            {
                unspent.push(UTxOut::new(tx.get_id(), index as i64, output.get_amount()));
            }
        }
    }
    unspent
}

/// Sum of the unspent outputs owned by `address`.
pub fn total_balance(blocks: &[Block], pending: &[Tx], address: &str) -> i64 {
    unspent_outputs(blocks, pending, address)
        .iter()
        .map(|u| u.get_amount())
        .sum()
}

///
/// The `make_tx` function builds and signs a payment from the local wallet.
/// Unspent outputs are consumed in scan order until they cover the amount;
/// when they overshoot, the change output comes first so it occupies a
/// stable index, then the payment output. Every input is signed over the
/// transaction id and the result is validated before being returned.
///
/// # Arguments
///
/// * `wallet` - the sending wallet.
/// * `blocks` - the chain, newest first.
/// * `pending` - snapshot of the mempool.
/// * `to` - recipient address.
/// * `amount` - amount to transfer.
///
pub fn make_tx(
    wallet: &Wallet,
    blocks: &[Block],
    pending: &[Tx],
    to: &str,
    amount: i64,
) -> Result<Tx> {
    if amount <= 0 {
        return Err(NodeError::TxInvalid);
    }
    let from = wallet.address();
    if total_balance(blocks, pending, from) < amount {
        return Err(NodeError::NotEnoughFunds);
    }

    let mut tx_ins = vec![];
    let mut total = 0;
    for unspent in unspent_outputs(blocks, pending, from) {
        if total >= amount {
            break;
        }
        // Placeholder signature, overwritten when the inputs are signed.
        tx_ins.push(TxIn::new(unspent.get_tx_id(), unspent.get_index(), from));
        total += unspent.get_amount();
    }

    let mut tx_outs = vec![];
    if total > amount {
        tx_outs.push(TxOut::new(from, total - amount));
    }
    tx_outs.push(TxOut::new(to, amount));

    let mut tx = Tx::assemble(tx_ins, tx_outs)?;
    tx.sign_inputs(wallet)?;
    if !validate(&tx, pending, blocks) {
        return Err(NodeError::TxInvalid);
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::core::mempool::Mempool;
    use crate::store::Store;

    struct Fixture {
        chain: Chain,
        mempool: Mempool,
        wallet: Wallet,
        _dir: tempfile::TempDir,
    }

    /// A chain whose genesis coinbase pays the fixture wallet 50 coins.
    async fn funded_fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = Store::open(&dir.path().join("db")).expect("Failed to open store");
        let wallet = Wallet::open(&dir.path().join("test.wallet")).expect("Failed to open wallet");
        let mempool = Mempool::new();
        let chain = Chain::initialize(store, wallet.address(), &mempool)
            .await
            .expect("Failed to initialize chain");
        Fixture {
            chain,
            mempool,
            wallet,
            _dir: dir,
        }
    }

    fn other_address() -> String {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        Wallet::open(&dir.path().join("other.wallet"))
            .expect("Failed to open wallet")
            .address()
            .to_string()
    }

    #[tokio::test]
    async fn test_genesis_coinbase_is_spendable() {
        let fx = funded_fixture().await;
        let blocks = fx.chain.all_blocks().await.expect("all_blocks failed");
        let pending = fx.mempool.pending().expect("pending failed");

        let unspent = unspent_outputs(&blocks, &pending, fx.wallet.address());
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].get_index(), 0);
        assert_eq!(unspent[0].get_amount(), 50);
        assert_eq!(total_balance(&blocks, &pending, fx.wallet.address()), 50);
    }

    #[tokio::test]
    async fn test_make_tx_orders_change_before_payment() {
        let fx = funded_fixture().await;
        let to = other_address();
        let blocks = fx.chain.all_blocks().await.expect("all_blocks failed");
        let pending = fx.mempool.pending().expect("pending failed");

        let tx = make_tx(&fx.wallet, &blocks, &pending, to.as_str(), 30).expect("make_tx failed");
        assert_eq!(tx.get_tx_outs().len(), 2);
        assert_eq!(tx.get_tx_outs()[0].get_address(), fx.wallet.address());
        assert_eq!(tx.get_tx_outs()[0].get_amount(), 20);
        assert_eq!(tx.get_tx_outs()[1].get_address(), to.as_str());
        assert_eq!(tx.get_tx_outs()[1].get_amount(), 30);
        assert!(validate(&tx, &pending, &blocks));
    }

    #[tokio::test]
    async fn test_make_tx_without_change() {
        let fx = funded_fixture().await;
        let to = other_address();
        let blocks = fx.chain.all_blocks().await.expect("all_blocks failed");

        let tx = make_tx(&fx.wallet, &blocks, &[], to.as_str(), 50).expect("make_tx failed");
        assert_eq!(tx.get_tx_outs().len(), 1);
        assert_eq!(tx.get_tx_outs()[0].get_address(), to.as_str());
        assert_eq!(tx.get_tx_outs()[0].get_amount(), 50);
    }

    #[tokio::test]
    async fn test_make_tx_insufficient_funds() {
        let fx = funded_fixture().await;
        let blocks = fx.chain.all_blocks().await.expect("all_blocks failed");

        let err = make_tx(&fx.wallet, &blocks, &[], other_address().as_str(), 51)
            .expect_err("should fail");
        assert!(matches!(err, NodeError::NotEnoughFunds));
    }

    #[tokio::test]
    async fn test_make_tx_rejects_non_positive_amount() {
        let fx = funded_fixture().await;
        let blocks = fx.chain.all_blocks().await.expect("all_blocks failed");

        let err =
            make_tx(&fx.wallet, &blocks, &[], other_address().as_str(), 0).expect_err("zero");
        assert!(matches!(err, NodeError::TxInvalid));
    }

    #[tokio::test]
    async fn test_mempool_shadow_blocks_double_spend() {
        let fx = funded_fixture().await;
        let to = other_address();
        let blocks = fx.chain.all_blocks().await.expect("all_blocks failed");

        let first = make_tx(&fx.wallet, &blocks, &[], to.as_str(), 30).expect("make_tx failed");
        fx.mempool.insert(first.clone()).expect("insert failed");
        let pending = fx.mempool.pending().expect("pending failed");

        // The genesis coinbase is shadowed; only the pending change remains.
        let unspent = unspent_outputs(&blocks, &pending, fx.wallet.address());
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].get_tx_id(), first.get_id());
        assert_eq!(unspent[0].get_index(), 0);
        assert_eq!(unspent[0].get_amount(), 20);

        // Re-spending the original 30 now exceeds what is available.
        let err =
            make_tx(&fx.wallet, &blocks, &pending, to.as_str(), 30).expect_err("double spend");
        assert!(matches!(err, NodeError::NotEnoughFunds));
    }

    #[tokio::test]
    async fn test_pending_outputs_visible_to_recipient() {
        let fx = funded_fixture().await;
        let to = other_address();
        let blocks = fx.chain.all_blocks().await.expect("all_blocks failed");

        let tx = make_tx(&fx.wallet, &blocks, &[], to.as_str(), 30).expect("make_tx failed");
        fx.mempool.insert(tx.clone()).expect("insert failed");
        let pending = fx.mempool.pending().expect("pending failed");

        let theirs = unspent_outputs(&blocks, &pending, to.as_str());
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].get_tx_id(), tx.get_id());
        assert_eq!(theirs[0].get_index(), 1);
        assert_eq!(theirs[0].get_amount(), 30);
        assert_eq!(total_balance(&blocks, &pending, to.as_str()), 30);
    }

    #[tokio::test]
    async fn test_unconfirmed_change_can_be_respent() {
        let fx = funded_fixture().await;
        let to = other_address();
        let blocks = fx.chain.all_blocks().await.expect("all_blocks failed");

        let first = make_tx(&fx.wallet, &blocks, &[], to.as_str(), 30).expect("make_tx failed");
        fx.mempool.insert(first).expect("insert failed");
        let pending = fx.mempool.pending().expect("pending failed");

        let second =
            make_tx(&fx.wallet, &blocks, &pending, to.as_str(), 15).expect("make_tx failed");
        assert!(validate(&second, &pending, &blocks));
        fx.mempool.insert(second).expect("insert failed");

        let pending = fx.mempool.pending().expect("pending failed");
        assert_eq!(total_balance(&blocks, &pending, fx.wallet.address()), 5);
    }
}
