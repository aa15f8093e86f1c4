use crate::core::block::Block;
use crate::error::Result;
use crate::util::{current_timestamp, hash_value};
use crate::wallet::{self, Wallet};
use serde::{Deserialize, Serialize};

/// Amount minted to the miner by the coinbase transaction of every block.
pub const MINER_REWARD: i64 = 50;

/// Sentinel signature identifying coinbase inputs in downstream scans.
pub const COINBASE_SIGNATURE: &str = "COINBASE";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    /// Id of the transaction whose output is being spent; empty for coinbase.
    #[serde(rename = "txid")]
    tx_id: String,
    /// Index into that transaction's outputs; -1 for coinbase.
    index: i64,
    /// Hex of the ECDSA r‖s signature over the spending transaction's id,
    /// or the literal `COINBASE`.
    signature: String,
}

impl TxIn {
    pub fn new(tx_id: &str, index: i64, signature: &str) -> TxIn {
        TxIn {
            tx_id: tx_id.to_string(),
            index,
            signature: signature.to_string(),
        }
    }

    pub fn get_tx_id(&self) -> &str {
        self.tx_id.as_str()
    }

    pub fn get_index(&self) -> i64 {
        self.index
    }

    pub fn get_signature(&self) -> &str {
        self.signature.as_str()
    }

    pub fn is_coinbase(&self) -> bool {
        self.signature == COINBASE_SIGNATURE
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Hex of the owner's public point X‖Y.
    address: String,
    amount: i64,
}

impl TxOut {
    pub fn new(address: &str, amount: i64) -> TxOut {
        TxOut {
            address: address.to_string(),
            amount,
        }
    }

    pub fn get_address(&self) -> &str {
        self.address.as_str()
    }

    pub fn get_amount(&self) -> i64 {
        self.amount
    }
}

/// An output not yet consumed by any input, in the chain or tentatively in
/// the mempool. Derived on demand, never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UTxOut {
    tx_id: String,
    index: i64,
    amount: i64,
}

impl UTxOut {
    pub fn new(tx_id: &str, index: i64, amount: i64) -> UTxOut {
        UTxOut {
            tx_id: tx_id.to_string(),
            index,
            amount,
        }
    }

    pub fn get_tx_id(&self) -> &str {
        self.tx_id.as_str()
    }

    pub fn get_index(&self) -> i64 {
        self.index
    }

    pub fn get_amount(&self) -> i64 {
        self.amount
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tx {
    id: String,
    timestamp: i64,
    tx_ins: Vec<TxIn>,
    tx_outs: Vec<TxOut>,
}

impl Tx {
    /// Builds a transaction from prepared inputs and outputs, stamping the
    /// current time and the content id. Inputs still carry placeholder
    /// signatures at this point; signing happens against the final id.
    pub(crate) fn assemble(tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>) -> Result<Tx> {
        let mut tx = Tx {
            id: String::new(),
            timestamp: current_timestamp(),
            tx_ins,
            tx_outs,
        };
        tx.id = tx.compute_id()?;
        Ok(tx)
    }

    /// The coinbase transaction minting the block reward to the miner.
    pub fn new_coinbase(address: &str) -> Result<Tx> {
        Tx::assemble(
            vec![TxIn::new("", -1, COINBASE_SIGNATURE)],
            vec![TxOut::new(address, MINER_REWARD)],
        )
    }

    /// Hash of the transaction with its id cleared. Any field mutation
    /// invalidates the stored id.
    pub fn compute_id(&self) -> Result<String> {
        let mut copy = self.clone();
        copy.id = String::new();
        hash_value(&copy)
    }

    /// Overwrites every input signature with the wallet's signature over the
    /// transaction id.
    pub(crate) fn sign_inputs(&mut self, wallet: &Wallet) -> Result<()> {
        let signature = wallet.sign(self.id.as_str())?;
        for tx_in in self.tx_ins.iter_mut() {
            tx_in.signature = signature.clone();
        }
        Ok(())
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx_ins.len() == 1 && self.tx_ins[0].is_coinbase()
    }

    pub fn get_id(&self) -> &str {
        self.id.as_str()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_tx_ins(&self) -> &[TxIn] {
        self.tx_ins.as_slice()
    }

    pub fn get_tx_outs(&self) -> &[TxOut] {
        self.tx_outs.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        crate::util::encode_to_bytes(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Tx> {
        crate::util::decode_from_bytes(bytes)
    }
}

///
/// The `find_tx` function resolves a transaction id against the pending
/// mempool transactions first, then every transaction recorded in the chain
/// (blocks newest-first).
///
pub fn find_tx<'a>(pending: &'a [Tx], blocks: &'a [Block], id: &str) -> Option<&'a Tx> {
    pending.iter().find(|tx| tx.get_id() == id).or_else(|| {
        blocks
            .iter()
            .flat_map(|block| block.get_transactions())
            .find(|tx| tx.get_id() == id)
    })
}

///
/// The `validate` function checks ownership of the money a transaction
/// spends: every input must reference an existing transaction, and its
/// signature over this transaction's id must verify against the address of
/// the referenced output. The first failing input short-circuits.
///
/// Coinbase inputs are never validated here; they are produced only by the
/// local miner and identified by their sentinel signature downstream.
///
pub fn validate(tx: &Tx, pending: &[Tx], blocks: &[Block]) -> bool {
    for tx_in in tx.get_tx_ins() {
        let Some(prev) = find_tx(pending, blocks, tx_in.get_tx_id()) else {
            return false;
        };
        let Ok(index) = usize::try_from(tx_in.get_index()) else {
            return false;
        };
        let Some(prev_out) = prev.get_tx_outs().get(index) else {
            return false;
        };
        if !wallet::verify(tx_in.get_signature(), tx.get_id(), prev_out.get_address()) {
            return false;
        }
    }
    true
}
