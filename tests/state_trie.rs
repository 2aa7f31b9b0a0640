//! Account and storage proofs checked by the reference verifier.
mod common;

use anyhow::Result;
use common::{init_logger, update_root, verify_proof};
use ethers::{
    types::{H160, U256, U64},
    utils::keccak256,
};
use trieproof::{
    account::{Account, EMPTY_TRIE_ROOT},
    rlp::{decode_account, decode_account_leaf, decode_storage_value, encode_account},
    trie::{increase_balance, subtract_balance_and_increment_nonce, StateTrie, StateTrieError},
    utils::slot_key,
};

fn address(byte: u8) -> H160 {
    H160::repeat_byte(byte)
}

#[test]
fn account_proof_lifecycle() -> Result<()> {
    init_logger();
    let mut state = StateTrie::new();
    let alice = address(0xaa);
    let account = Account::new(2, U256::from(500));
    state.put_account(alice, &account)?;
    state.put_account(address(0xbb), &Account::new(0, U256::from(1)))?;

    let proof = state.get_account_proof(alice)?;
    let verified = verify_proof(state.root(), &keccak256(alice), &proof)?;
    assert!(verified.success);
    let value = verified.value.expect("account present");
    assert_eq!(decode_account(&value)?, account);

    // Account leaves are never embedded, the last proof node is the account leaf.
    let leaf = proof.proof_nodes()?.pop().expect("non-empty proof");
    assert_eq!(decode_account_leaf(&leaf)?, account);
    Ok(())
}

#[test]
fn missing_account_proof() -> Result<()> {
    let mut state = StateTrie::new();
    state.put_account(address(0xaa), &Account::new(1, U256::from(10)))?;
    state.put_account(address(0xbb), &Account::new(1, U256::from(10)))?;

    let absent = address(0xcc);
    assert_eq!(state.get_account(absent)?, Account::default());
    let proof = state.prove_account(absent)?;
    assert!(!proof.outcome.is_found());
    let verified = verify_proof(state.root(), &keccak256(absent), &proof.encoded)?;
    assert!(verified.success);
    assert_eq!(verified.value, None);
    Ok(())
}

#[test]
fn storage_proof_against_account_storage_root() -> Result<()> {
    let mut state = StateTrie::new();
    let contract = address(0x42);
    state.put_account(contract, &Account::new(1, U256::zero()))?;
    for slot in 0..20u64 {
        state.put_account_storage(contract, U256::from(slot), U256::from(slot * 1000 + 7))?;
    }
    let storage_hash = state.get_account(contract)?.storage_hash;
    assert_ne!(storage_hash, EMPTY_TRIE_ROOT);

    for slot in [0u64, 3, 19] {
        let slot = U256::from(slot);
        let storage = state.get_account_storage_proof(contract, slot)?;
        let key = keccak256(slot_key(slot));
        let verified = verify_proof(storage_hash, &key, &storage.proof)?;
        assert!(verified.success);
        let value = decode_storage_value(&verified.value.expect("slot present"))?;
        assert_eq!(value, storage.value);
    }

    let missing = U256::from(500);
    let storage = state.get_account_storage_proof(contract, missing)?;
    assert_eq!(storage.value, U256::zero());
    let verified = verify_proof(storage_hash, &keccak256(slot_key(missing)), &storage.proof)?;
    assert!(verified.success);
    assert_eq!(verified.value, None);
    Ok(())
}

#[test]
fn storage_of_account_without_storage() -> Result<()> {
    let mut state = StateTrie::new();
    let eoa = address(0x01);
    state.put_account(eoa, &Account::new(0, U256::from(5)))?;
    let storage = state.get_account_storage_proof(eoa, U256::one())?;
    assert_eq!(storage.value, U256::zero());
    let verified = verify_proof(EMPTY_TRIE_ROOT, &keccak256(slot_key(U256::one())), &storage.proof)?;
    assert!(verified.success);
    assert_eq!(verified.value, None);
    Ok(())
}

#[test]
fn balance_transfer_proofs_update_state_root() -> Result<()> {
    let mut state = StateTrie::new();
    let sender = address(0x10);
    let recipient = address(0x20);
    for byte in 0x30..0x40 {
        state.put_account(address(byte), &Account::new(1, U256::from(byte)))?;
    }
    state.put_account(sender, &Account::new(4, U256::from(1_000)))?;

    let debit = subtract_balance_and_increment_nonce(&mut state, sender, U256::from(300))?;
    let sender_after = state.get_account(sender)?;
    assert_eq!(sender_after.nonce, U64::from(5));
    assert_eq!(sender_after.balance, U256::from(700));
    let computed = update_root(
        debit.state_root,
        &keccak256(sender),
        &encode_account(&sender_after),
        &debit.state_proof,
    )?;
    assert_eq!(computed, Some(state.root()));

    // Recipient does not exist yet, the proof shows its absence.
    let credit = increase_balance(&mut state, recipient, U256::from(300))?;
    let recipient_after = state.get_account(recipient)?;
    assert_eq!(recipient_after, Account::new(0, U256::from(300)));
    let verified = verify_proof(credit.state_root, &keccak256(recipient), &credit.state_proof)?;
    assert!(verified.success);
    assert_eq!(verified.value, None);
    let computed = update_root(
        credit.state_root,
        &keccak256(recipient),
        &encode_account(&recipient_after),
        &credit.state_proof,
    )?;
    assert_eq!(computed, Some(state.root()));
    Ok(())
}

#[test]
fn overdrawn_sender_is_rejected() -> Result<()> {
    let mut state = StateTrie::new();
    let sender = address(0x10);
    state.put_account(sender, &Account::new(0, U256::from(10)))?;
    let root = state.root();
    let result = subtract_balance_and_increment_nonce(&mut state, sender, U256::from(11));
    assert!(matches!(
        result,
        Err(StateTrieError::InsufficientBalance { .. })
    ));
    assert_eq!(state.root(), root);
    Ok(())
}
