//! Consensus validation rules
//!
//! Pure functions checking transactions and blocks against a given
//! UTXO set and chain tail. Every violation is a typed rejection;
//! callers never receive a partially accepted result.

use crate::core::block::Block;
use crate::core::transaction::{Transaction, TxType, BLOCK_REWARD, FEE_PER_TRANSACTION};
use crate::core::utxo::UtxoSet;
use crate::crypto::{is_valid_address, verify_signature};
use std::collections::HashSet;
use thiserror::Error;

/// Allowed clock drift for block timestamps, in seconds, relative to
/// both the previous block and the local clock
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 60;

/// A named consensus-rule violation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Transaction id mismatch for '{stored}'")]
    IdMismatch { stored: String },
    #[error("Transaction '{tx_id}' has no inputs")]
    MissingInputs { tx_id: String },
    #[error("Transaction '{tx_id}' has no outputs")]
    MissingOutputs { tx_id: String },
    #[error("Malformed address '{address}'")]
    MalformedAddress { address: String },
    #[error("Zero-amount output in transaction '{tx_id}'")]
    MalformedAmount { tx_id: String },
    #[error("Coinbase transaction '{tx_id}' where a regular transaction is required")]
    UnexpectedCoinbase { tx_id: String },
    #[error("Referenced output not found: {tx_id}:{output_index}")]
    UnknownUtxo { tx_id: String, output_index: u64 },
    #[error("Invalid signature for input {tx_id}:{output_index}")]
    BadSignature { tx_id: String, output_index: u64 },
    #[error("Unbalanced amounts: inputs {inputs}, outputs {outputs}")]
    UnbalancedAmounts { inputs: u64, outputs: u64 },
    #[error("Output {tx_id}:{output_index} referenced more than once")]
    DoubleSpend { tx_id: String, output_index: u64 },
    #[error("Invalid coinbase transaction: {reason}")]
    BadCoinbase { reason: &'static str },
    #[error("Block has no coinbase transaction")]
    MissingCoinbase,
    #[error("Invalid index: expected {expected}, got {got}")]
    BadIndex { expected: u64, got: u64 },
    #[error("Previous hash mismatch")]
    BadPreviousHash,
    #[error("Stored block hash does not match recomputation")]
    BadHash,
    #[error("Unexpected difficulty: expected {expected}, got {got}")]
    BadDifficulty { expected: u32, got: u32 },
    #[error("Block hash does not satisfy difficulty {difficulty}")]
    BadProofOfWork { difficulty: u32 },
    #[error("Block timestamp out of tolerance")]
    BadTimestamp,
}

/// Validate a Regular transaction against the current UTXO set.
///
/// Checks, in order: structure, id re-derivation (tamper detection),
/// input resolution and ownership signatures (message = tx id),
/// duplicate inputs, and exact value conservation.
pub fn validate_transaction(tx: &Transaction, utxo: &UtxoSet) -> Result<(), ValidationError> {
    if tx.tx_type != TxType::Regular {
        return Err(ValidationError::UnexpectedCoinbase {
            tx_id: tx.id.clone(),
        });
    }

    validate_structure(tx)?;

    if tx.compute_id() != tx.id {
        return Err(ValidationError::IdMismatch {
            stored: tx.id.clone(),
        });
    }

    let mut seen: HashSet<(&str, u64)> = HashSet::new();
    let mut input_total: u64 = 0;

    for input in &tx.inputs {
        let entry = utxo.get(&input.tx_id, input.output_index).ok_or_else(|| {
            ValidationError::UnknownUtxo {
                tx_id: input.tx_id.clone(),
                output_index: input.output_index,
            }
        })?;

        if !seen.insert((input.tx_id.as_str(), input.output_index)) {
            return Err(ValidationError::DoubleSpend {
                tx_id: input.tx_id.clone(),
                output_index: input.output_index,
            });
        }

        let signature = hex::decode(&input.signature).map_err(|_| ValidationError::BadSignature {
            tx_id: input.tx_id.clone(),
            output_index: input.output_index,
        })?;
        let valid = verify_signature(&entry.address, tx.id.as_bytes(), &signature)
            .unwrap_or(false);
        if !valid {
            return Err(ValidationError::BadSignature {
                tx_id: input.tx_id.clone(),
                output_index: input.output_index,
            });
        }

        input_total += entry.amount;
    }

    let output_total = tx.total_output();
    if input_total != output_total {
        return Err(ValidationError::UnbalancedAmounts {
            inputs: input_total,
            outputs: output_total,
        });
    }

    Ok(())
}

/// Validate the Reward coinbase of a block: one placeholder input bound
/// to the block index, one output of exactly the block reward.
pub fn validate_reward(tx: &Transaction, block_index: u64) -> Result<(), ValidationError> {
    if tx.tx_type != TxType::Reward {
        return Err(ValidationError::BadCoinbase {
            reason: "first transaction must be the reward",
        });
    }
    validate_coinbase_shape(tx, block_index)?;
    if tx.outputs[0].amount != BLOCK_REWARD {
        return Err(ValidationError::BadCoinbase {
            reason: "reward amount mismatch",
        });
    }
    Ok(())
}

/// Validate the Fee coinbase of a block: one placeholder input bound to
/// the block index, one output of fee-per-transaction times the number
/// of Regular transactions in the block.
pub fn validate_fee(
    tx: &Transaction,
    block_index: u64,
    regular_count: usize,
) -> Result<(), ValidationError> {
    if tx.tx_type != TxType::Fee {
        return Err(ValidationError::BadCoinbase {
            reason: "not a fee transaction",
        });
    }
    if regular_count == 0 {
        return Err(ValidationError::BadCoinbase {
            reason: "fee transaction in a block without regular transactions",
        });
    }
    validate_coinbase_shape(tx, block_index)?;
    if tx.outputs[0].amount != FEE_PER_TRANSACTION * regular_count as u64 {
        return Err(ValidationError::BadCoinbase {
            reason: "fee amount mismatch",
        });
    }
    Ok(())
}

/// Shape checks shared by Reward and Fee coinbases
fn validate_coinbase_shape(tx: &Transaction, block_index: u64) -> Result<(), ValidationError> {
    if tx.compute_id() != tx.id {
        return Err(ValidationError::IdMismatch {
            stored: tx.id.clone(),
        });
    }
    if tx.inputs.len() != 1 {
        return Err(ValidationError::BadCoinbase {
            reason: "exactly one placeholder input required",
        });
    }
    if !tx.inputs[0].is_placeholder() || tx.inputs[0].output_index != block_index {
        return Err(ValidationError::BadCoinbase {
            reason: "placeholder input must encode the block index",
        });
    }
    if tx.outputs.len() != 1 {
        return Err(ValidationError::BadCoinbase {
            reason: "exactly one output required",
        });
    }
    if !is_valid_address(&tx.outputs[0].address) {
        return Err(ValidationError::MalformedAddress {
            address: tx.outputs[0].address.clone(),
        });
    }
    Ok(())
}

/// Validate a block's transaction batch against the pre-block UTXO set.
///
/// The Reward coinbase comes first, an optional Fee coinbase second,
/// Regular transactions after. No outpoint may be referenced by two
/// transactions anywhere in the block; all Regular transactions are
/// validated against the same pre-block snapshot.
pub fn validate_block_transactions(
    transactions: &[Transaction],
    utxo: &UtxoSet,
    block_index: u64,
) -> Result<(), ValidationError> {
    let reward = transactions.first().ok_or(ValidationError::MissingCoinbase)?;
    validate_reward(reward, block_index)?;

    let reward_count = transactions
        .iter()
        .filter(|tx| tx.tx_type == TxType::Reward)
        .count();
    if reward_count != 1 {
        return Err(ValidationError::BadCoinbase {
            reason: "more than one reward transaction",
        });
    }

    let fee_count = transactions
        .iter()
        .filter(|tx| tx.tx_type == TxType::Fee)
        .count();
    if fee_count > 1 {
        return Err(ValidationError::BadCoinbase {
            reason: "more than one fee transaction",
        });
    }
    if fee_count == 1 && transactions[1].tx_type != TxType::Fee {
        return Err(ValidationError::BadCoinbase {
            reason: "fee transaction must follow the reward",
        });
    }

    let regulars: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| tx.tx_type == TxType::Regular)
        .collect();

    if fee_count == 1 {
        validate_fee(&transactions[1], block_index, regulars.len())?;
    }

    // Intra-block double spend across regular transactions; coinbase
    // placeholder inputs reference no real output and are exempt.
    let mut seen: HashSet<(&str, u64)> = HashSet::new();
    for tx in &regulars {
        for input in &tx.inputs {
            if !seen.insert((input.tx_id.as_str(), input.output_index)) {
                return Err(ValidationError::DoubleSpend {
                    tx_id: input.tx_id.clone(),
                    output_index: input.output_index,
                });
            }
        }
    }

    for tx in &regulars {
        validate_transaction(tx, utxo)?;
    }

    Ok(())
}

/// Validate a block header against the chain tail.
///
/// `expected_difficulty` is the value the active difficulty schedule
/// prescribes for this height; `now` is the local clock in unix
/// seconds.
pub fn validate_block(
    block: &Block,
    previous: &Block,
    expected_difficulty: u32,
    now: i64,
) -> Result<(), ValidationError> {
    if block.index != previous.index + 1 {
        return Err(ValidationError::BadIndex {
            expected: previous.index + 1,
            got: block.index,
        });
    }
    if block.previous_hash != previous.hash {
        return Err(ValidationError::BadPreviousHash);
    }
    if !block.verify_hash() {
        return Err(ValidationError::BadHash);
    }
    if block.difficulty != expected_difficulty {
        return Err(ValidationError::BadDifficulty {
            expected: expected_difficulty,
            got: block.difficulty,
        });
    }
    if !block.has_valid_pow() {
        return Err(ValidationError::BadProofOfWork {
            difficulty: block.difficulty,
        });
    }
    // Reject both far-past (relative to the previous block) and
    // far-future (relative to the local clock) timestamps.
    if block.timestamp < previous.timestamp - TIMESTAMP_TOLERANCE_SECS
        || block.timestamp > now + TIMESTAMP_TOLERANCE_SECS
    {
        return Err(ValidationError::BadTimestamp);
    }
    Ok(())
}

fn validate_structure(tx: &Transaction) -> Result<(), ValidationError> {
    if tx.inputs.is_empty() {
        return Err(ValidationError::MissingInputs {
            tx_id: tx.id.clone(),
        });
    }
    if tx.outputs.is_empty() {
        return Err(ValidationError::MissingOutputs {
            tx_id: tx.id.clone(),
        });
    }
    for output in &tx.outputs {
        if !is_valid_address(&output.address) {
            return Err(ValidationError::MalformedAddress {
                address: output.address.clone(),
            });
        }
        if output.amount == 0 {
            return Err(ValidationError::MalformedAmount {
                tx_id: tx.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::GENESIS_TIMESTAMP;
    use crate::core::transaction::{TxIn, TxOut};
    use crate::crypto::KeyPair;

    fn funded_set(kp: &KeyPair) -> (UtxoSet, Transaction) {
        let reward = Transaction::reward(&kp.address(), 1);
        let set = UtxoSet::new().apply(std::slice::from_ref(&reward)).unwrap();
        (set, reward)
    }

    fn signed_spend(kp: &KeyPair, source: &Transaction, to: &str, amount: u64) -> Transaction {
        let change = BLOCK_REWARD - amount;
        let mut outputs = vec![TxOut {
            address: to.to_string(),
            amount,
        }];
        if change > 0 {
            outputs.push(TxOut {
                address: kp.address(),
                amount: change,
            });
        }
        let mut tx = Transaction::new_regular(
            vec![TxIn {
                tx_id: source.id.clone(),
                output_index: 0,
                signature: String::new(),
            }],
            outputs,
        );
        tx.sign(kp).unwrap();
        tx
    }

    #[test]
    fn test_valid_transaction_passes() {
        let kp = KeyPair::generate();
        let recipient = KeyPair::generate();
        let (set, reward) = funded_set(&kp);

        let tx = signed_spend(&kp, &reward, &recipient.address(), 20);
        assert!(validate_transaction(&tx, &set).is_ok());
    }

    #[test]
    fn test_tampered_id_rejected() {
        let kp = KeyPair::generate();
        let (set, reward) = funded_set(&kp);

        let mut tx = signed_spend(&kp, &reward, &kp.address(), 20);
        tx.outputs[0].amount = 1;
        let err = validate_transaction(&tx, &set).unwrap_err();
        assert!(matches!(err, ValidationError::IdMismatch { .. }));
    }

    #[test]
    fn test_wrong_signer_rejected() {
        let kp = KeyPair::generate();
        let intruder = KeyPair::generate();
        let (set, reward) = funded_set(&kp);

        let mut tx = Transaction::new_regular(
            vec![TxIn {
                tx_id: reward.id.clone(),
                output_index: 0,
                signature: String::new(),
            }],
            vec![TxOut {
                address: intruder.address(),
                amount: BLOCK_REWARD,
            }],
        );
        tx.sign(&intruder).unwrap();

        let err = validate_transaction(&tx, &set).unwrap_err();
        assert!(matches!(err, ValidationError::BadSignature { .. }));
    }

    #[test]
    fn test_unbalanced_amounts_rejected() {
        let kp = KeyPair::generate();
        let (set, reward) = funded_set(&kp);

        let mut tx = Transaction::new_regular(
            vec![TxIn {
                tx_id: reward.id.clone(),
                output_index: 0,
                signature: String::new(),
            }],
            vec![TxOut {
                address: kp.address(),
                amount: BLOCK_REWARD + 10,
            }],
        );
        tx.sign(&kp).unwrap();

        let err = validate_transaction(&tx, &set).unwrap_err();
        assert!(matches!(err, ValidationError::UnbalancedAmounts { .. }));
    }

    #[test]
    fn test_reward_bound_to_block_index() {
        let kp = KeyPair::generate();
        let tx = Transaction::reward(&kp.address(), 3);

        assert!(validate_reward(&tx, 3).is_ok());
        assert!(validate_reward(&tx, 4).is_err());
    }

    #[test]
    fn test_fee_amount_checked() {
        let kp = KeyPair::generate();
        let tx = Transaction::fee(&kp.address(), 2, 3);

        assert!(validate_fee(&tx, 2, 3).is_ok());
        assert!(validate_fee(&tx, 2, 2).is_err());
        assert!(validate_fee(&tx, 1, 3).is_err());
    }

    #[test]
    fn test_block_transactions_require_reward_first() {
        let kp = KeyPair::generate();
        let set = UtxoSet::new();

        let err = validate_block_transactions(&[], &set, 1).unwrap_err();
        assert!(matches!(err, ValidationError::MissingCoinbase));

        let fee = Transaction::fee(&kp.address(), 1, 1);
        let err = validate_block_transactions(&[fee], &set, 1).unwrap_err();
        assert!(matches!(err, ValidationError::BadCoinbase { .. }));
    }

    #[test]
    fn test_block_transactions_detect_double_spend() {
        let kp = KeyPair::generate();
        let (set, source) = funded_set(&kp);

        let tx1 = signed_spend(&kp, &source, &kp.address(), 10);
        let tx2 = signed_spend(&kp, &source, &KeyPair::generate().address(), 10);
        let reward = Transaction::reward(&kp.address(), 2);
        let fee = Transaction::fee(&kp.address(), 2, 2);

        let err =
            validate_block_transactions(&[reward, fee, tx1, tx2], &set, 2).unwrap_err();
        assert!(matches!(err, ValidationError::DoubleSpend { .. }));
    }

    #[test]
    fn test_validate_block_linkage() {
        let genesis = Block::genesis();
        let kp = KeyPair::generate();
        let reward = Transaction::reward(&kp.address(), 1);
        let now = GENESIS_TIMESTAMP + 100;

        let good = Block::new(1, genesis.hash.clone(), now, 0, vec![reward.clone()]);
        assert!(validate_block(&good, &genesis, 0, now).is_ok());

        let bad_index = Block::new(2, genesis.hash.clone(), now, 0, vec![reward.clone()]);
        assert!(matches!(
            validate_block(&bad_index, &genesis, 0, now).unwrap_err(),
            ValidationError::BadIndex { .. }
        ));

        let bad_prev = Block::new(1, "00".repeat(32), now, 0, vec![reward.clone()]);
        assert!(matches!(
            validate_block(&bad_prev, &genesis, 0, now).unwrap_err(),
            ValidationError::BadPreviousHash
        ));

        let mut bad_hash = good.clone();
        bad_hash.nonce += 1; // stale hash
        assert!(matches!(
            validate_block(&bad_hash, &genesis, 0, now).unwrap_err(),
            ValidationError::BadHash
        ));
    }

    #[test]
    fn test_validate_block_rejects_wrong_difficulty() {
        let genesis = Block::genesis();
        let now = GENESIS_TIMESTAMP + 100;
        let block = Block::new(1, genesis.hash.clone(), now, 0, vec![]);

        assert!(matches!(
            validate_block(&block, &genesis, 16, now).unwrap_err(),
            ValidationError::BadDifficulty { .. }
        ));
    }

    #[test]
    fn test_validate_block_rejects_unsatisfied_pow() {
        let genesis = Block::genesis();
        let now = GENESIS_TIMESTAMP + 100;
        // difficulty 255 is practically unmatchable; the unmined block
        // is well-formed otherwise
        let block = Block::new(1, genesis.hash.clone(), now, 255, vec![]);

        assert!(matches!(
            validate_block(&block, &genesis, 255, now).unwrap_err(),
            ValidationError::BadProofOfWork { .. }
        ));
    }

    #[test]
    fn test_validate_block_timestamp_window() {
        let genesis = Block::genesis();
        let now = GENESIS_TIMESTAMP + 100;

        let far_future = Block::new(1, genesis.hash.clone(), now + 3600, 0, vec![]);
        assert!(matches!(
            validate_block(&far_future, &genesis, 0, now).unwrap_err(),
            ValidationError::BadTimestamp
        ));

        let far_past = Block::new(1, genesis.hash.clone(), GENESIS_TIMESTAMP - 3600, 0, vec![]);
        assert!(matches!(
            validate_block(&far_past, &genesis, 0, now).unwrap_err(),
            ValidationError::BadTimestamp
        ));
    }
}
