//! For holding account and storage state in tries that can produce proofs.
//!
//! The tries are `eth_trie` tries over a shared in-memory database. Every mutation is
//! committed immediately and the database keeps the nodes of every root, so a proof can
//! be made for the current root at any time.
use std::sync::Arc;

use eth_trie::{EthTrie, MemoryDB, Trie, TrieError};
use ethers::{
    types::{H160, H256, U256, U64},
    utils::keccak256,
};
use log::debug;
use thiserror::Error;

use crate::{
    account::{Account, EMPTY_TRIE_ROOT},
    encode::EncodedProof,
    proof::{build_proof, KeyProof, ProofError},
    rlp::{
        decode_account, decode_storage_value, encode_account, encode_storage_value,
        RlpValueError,
    },
    store::TrieSnapshot,
    utils::{hex_encode, slot_key},
};

#[derive(Debug, Error)]
pub enum StateTrieError {
    #[error("Trie error {0}")]
    TrieError(#[from] TrieError),
    #[error("ProofError {0}")]
    ProofError(#[from] ProofError),
    #[error("RlpValueError {0}")]
    RlpValueError(#[from] RlpValueError),
    #[error("Account {address} has balance {balance}, unable to subtract {amount}")]
    InsufficientBalance {
        address: String,
        balance: U256,
        amount: U256,
    },
    #[error("Account {address} balance overflows when adding {amount}")]
    BalanceOverflow { address: String, amount: U256 },
}

/// A trie that keeps every committed root readable and proves keys against the current root.
pub struct ProofTrie {
    db: Arc<MemoryDB>,
    trie: EthTrie<MemoryDB>,
    root: H256,
    /// Keys are hashed with keccak256 before use.
    secure: bool,
}

impl Default for ProofTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofTrie {
    /// Empty trie, keys used as given.
    pub fn new() -> Self {
        Self::empty_in(Arc::new(MemoryDB::new(false)), false)
    }
    /// Empty trie, keys hashed before use.
    pub fn new_secure() -> Self {
        Self::empty_in(Arc::new(MemoryDB::new(false)), true)
    }
    /// Empty trie in an existing database.
    pub fn empty_in(db: Arc<MemoryDB>, secure: bool) -> Self {
        Self {
            trie: EthTrie::new(db.clone()),
            db,
            root: EMPTY_TRIE_ROOT,
            secure,
        }
    }
    /// Trie at a root whose nodes are already in the database.
    pub fn at_root(db: Arc<MemoryDB>, root: H256, secure: bool) -> Result<Self, StateTrieError> {
        if root == EMPTY_TRIE_ROOT {
            return Ok(Self::empty_in(db, secure));
        }
        let trie = EthTrie::from(db.clone(), root.to_fixed_bytes().into())?;
        Ok(Self {
            db,
            trie,
            root,
            secure,
        })
    }
    pub fn root(&self) -> H256 {
        self.root
    }
    pub fn db(&self) -> Arc<MemoryDB> {
        self.db.clone()
    }
    /// Path in the trie for a key.
    fn trie_key(&self, key: &[u8]) -> Vec<u8> {
        match self.secure {
            true => keccak256(key).to_vec(),
            false => key.to_vec(),
        }
    }
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateTrieError> {
        Ok(self.trie.get(&self.trie_key(key))?)
    }
    /// Stores the value under the key. An empty value removes the key.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StateTrieError> {
        if value.is_empty() {
            self.delete(key)?;
            return Ok(());
        }
        let key = self.trie_key(key);
        self.trie.insert(&key, value)?;
        self.commit()
    }
    /// Removes the key, returning whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool, StateTrieError> {
        let key = self.trie_key(key);
        let removed = self.trie.remove(&key)?;
        self.commit()?;
        Ok(removed)
    }
    fn commit(&mut self) -> Result<(), StateTrieError> {
        let root = self.trie.root_hash()?;
        let root = H256::from_slice(root.as_bytes());
        if root != self.root {
            debug!("Trie root {} -> {}", hex_encode(self.root), hex_encode(root));
        }
        self.root = root;
        Ok(())
    }
    /// A read only view of the current root.
    pub fn snapshot(&self) -> TrieSnapshot {
        TrieSnapshot::new(self.db.clone(), self.root)
    }
    pub fn prove(&self, key: &[u8]) -> Result<EncodedProof, StateTrieError> {
        Ok(self.prove_key(key)?.encoded)
    }
    /// Proof for the key with the outcome of the walk that produced it.
    pub fn prove_key(&self, key: &[u8]) -> Result<KeyProof, StateTrieError> {
        Ok(build_proof(&self.snapshot(), &self.trie_key(key))?)
    }
}

/// Storage of one account. Slots are keyed by their 32 byte index, values are rlp(U256).
pub struct StorageTrie {
    trie: ProofTrie,
}

impl Default for StorageTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageTrie {
    pub fn new() -> Self {
        Self {
            trie: ProofTrie::new_secure(),
        }
    }
    pub fn at_root(db: Arc<MemoryDB>, root: H256) -> Result<Self, StateTrieError> {
        Ok(Self {
            trie: ProofTrie::at_root(db, root, true)?,
        })
    }
    pub fn root(&self) -> H256 {
        self.trie.root()
    }
    pub fn get(&self, slot: U256) -> Result<Option<U256>, StateTrieError> {
        self.trie
            .get(slot_key(slot).as_bytes())?
            .map(|value| decode_storage_value(&value).map_err(StateTrieError::from))
            .transpose()
    }
    pub fn put(&mut self, slot: U256, value: U256) -> Result<(), StateTrieError> {
        self.trie
            .put(slot_key(slot).as_bytes(), &encode_storage_value(value))
    }
    pub fn delete(&mut self, slot: U256) -> Result<bool, StateTrieError> {
        self.trie.delete(slot_key(slot).as_bytes())
    }
    pub fn prove(&self, slot: U256) -> Result<EncodedProof, StateTrieError> {
        self.trie.prove(slot_key(slot).as_bytes())
    }
    pub fn prove_key(&self, slot: U256) -> Result<KeyProof, StateTrieError> {
        self.trie.prove_key(slot_key(slot).as_bytes())
    }
}

/// A storage value with its proof against the account storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageProof {
    pub value: U256,
    pub proof: EncodedProof,
}

/// Account state, keyed by address.
pub struct StateTrie {
    trie: ProofTrie,
}

impl Default for StateTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTrie {
    pub fn new() -> Self {
        Self {
            trie: ProofTrie::new_secure(),
        }
    }
    pub fn at_root(db: Arc<MemoryDB>, root: H256) -> Result<Self, StateTrieError> {
        Ok(Self {
            trie: ProofTrie::at_root(db, root, true)?,
        })
    }
    pub fn root(&self) -> H256 {
        self.trie.root()
    }
    pub fn db(&self) -> Arc<MemoryDB> {
        self.trie.db()
    }
    /// The account at the address, or an empty account if there is none.
    pub fn get_account(&self, address: H160) -> Result<Account, StateTrieError> {
        match self.trie.get(address.as_bytes())? {
            Some(value) => Ok(decode_account(&value)?),
            None => Ok(Account::default()),
        }
    }
    pub fn put_account(&mut self, address: H160, account: &Account) -> Result<(), StateTrieError> {
        self.trie.put(address.as_bytes(), &encode_account(account))
    }
    pub fn get_account_proof(&self, address: H160) -> Result<EncodedProof, StateTrieError> {
        self.trie.prove(address.as_bytes())
    }
    pub fn prove_account(&self, address: H160) -> Result<KeyProof, StateTrieError> {
        self.trie.prove_key(address.as_bytes())
    }
    /// Storage trie at the storage root of the account, sharing this trie's database.
    pub fn get_account_storage_trie(&self, address: H160) -> Result<StorageTrie, StateTrieError> {
        let account = self.get_account(address)?;
        if account.storage_hash == EMPTY_TRIE_ROOT {
            return Ok(StorageTrie {
                trie: ProofTrie::empty_in(self.db(), true),
            });
        }
        StorageTrie::at_root(self.db(), account.storage_hash)
    }
    pub fn get_account_storage_proof(
        &self,
        address: H160,
        slot: U256,
    ) -> Result<StorageProof, StateTrieError> {
        let storage = self.get_account_storage_trie(address)?;
        let value = storage.get(slot)?.unwrap_or_default();
        let proof = storage.prove(slot)?;
        Ok(StorageProof { value, proof })
    }
    /// Writes a storage slot and records the new storage root in the account.
    pub fn put_account_storage(
        &mut self,
        address: H160,
        slot: U256,
        value: U256,
    ) -> Result<(), StateTrieError> {
        let mut storage = self.get_account_storage_trie(address)?;
        storage.put(slot, value)?;
        let mut account = self.get_account(address)?;
        account.storage_hash = storage.root();
        self.put_account(address, &account)
    }
}

/// An account proof taken before the account was modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdateProof {
    /// Root of the state trie before the update.
    pub state_root: H256,
    pub address: H160,
    /// Proof of the account before the update.
    pub state_proof: EncodedProof,
}

/// Adds to the balance of an account.
pub fn increase_balance(
    trie: &mut StateTrie,
    address: H160,
    amount: U256,
) -> Result<StateUpdateProof, StateTrieError> {
    let state_root = trie.root();
    let state_proof = trie.get_account_proof(address)?;
    let mut account = trie.get_account(address)?;
    account.balance =
        account
            .balance
            .checked_add(amount)
            .ok_or_else(|| StateTrieError::BalanceOverflow {
                address: hex_encode(address),
                amount,
            })?;
    trie.put_account(address, &account)?;
    Ok(StateUpdateProof {
        state_root,
        address,
        state_proof,
    })
}

/// Subtracts from the balance of an account and increments its nonce, as a sender does.
pub fn subtract_balance_and_increment_nonce(
    trie: &mut StateTrie,
    address: H160,
    amount: U256,
) -> Result<StateUpdateProof, StateTrieError> {
    let state_root = trie.root();
    let state_proof = trie.get_account_proof(address)?;
    let mut account = trie.get_account(address)?;
    debug!("Current balance: {}", account.balance);
    account.balance =
        account
            .balance
            .checked_sub(amount)
            .ok_or_else(|| StateTrieError::InsufficientBalance {
                address: hex_encode(address),
                balance: account.balance,
                amount,
            })?;
    account.nonce += U64::one();
    debug!("New balance: {}", account.balance);
    trie.put_account(address, &account)?;
    Ok(StateUpdateProof {
        state_root,
        address,
        state_proof,
    })
}
