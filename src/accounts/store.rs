use std::collections::HashMap;

use parking_lot::RwLock;

use super::Account;

/// Key-value storage behind account records
pub trait AccountStore: Send + Sync {
    fn get(&self, account_id: &str) -> Option<Account>;
    fn put(&self, account: Account);
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` accounts with ids starting at 10000, named `Person_<n>`
    pub fn seeded(count: usize) -> Self {
        let store = Self::new();
        for i in 0..count {
            store.put(Account::new((10000 + i).to_string(), format!("Person_{}", i)));
        }
        store
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn get(&self, account_id: &str) -> Option<Account> {
        self.accounts.read().get(account_id).cloned()
    }

    fn put(&self, account: Account) {
        self.accounts.write().insert(account.id.clone(), account);
    }
}
