//! Shared fixture: a bootstrapped core with one funded account per role

#![allow(dead_code)]

use wagerbook::{Account, AccountId, Amount, Role, TransferKind, WagerCore};

pub struct Fixture {
    pub core: WagerCore,
    pub root: AccountId,
    pub admin: Account,
    pub client: Account,
    pub customer: Account,
}

impl Fixture {
    /// Root issues `funds` and seeds it down the chain so every account
    /// below ends up holding `customer_funds` at the customer
    pub fn with_funds(core: WagerCore, funds: u64, customer_funds: u64) -> Self {
        let root = core.bootstrap("Root", "root@example.com").unwrap().super_admin.id;
        let accounts = core.accounts();
        let admin = accounts.create_account(&root, Role::Admin, "Admin", "admin@example.com").unwrap();
        let client = accounts
            .create_account(&admin.id, Role::Client, "Client", "client@example.com")
            .unwrap();
        let customer = accounts
            .create_account(&client.id, Role::Customer, "Customer", "customer@example.com")
            .unwrap();

        let transfers = core.transfers();
        let funds = Amount::from_major(funds);
        let customer_funds = Amount::from_major(customer_funds);
        transfers.issue(&root, &root, funds).unwrap();
        transfers.transfer(&root, &admin.id, funds, TransferKind::Seed, &root).unwrap();
        transfers
            .transfer(&admin.id, &client.id, funds, TransferKind::Seed, &admin.id)
            .unwrap();
        transfers
            .transfer(&client.id, &customer.id, customer_funds, TransferKind::Seed, &client.id)
            .unwrap();

        Self {
            core,
            root,
            admin,
            client,
            customer,
        }
    }

    pub fn new() -> Self {
        Self::with_funds(WagerCore::in_memory(), 10_000, 1_000)
    }

    pub fn balance(&self, account: &AccountId) -> Amount {
        self.core.ledger().balance(account).unwrap()
    }

    /// Another customer under the same client, seeded with `funds`
    pub fn extra_customer(&self, tag: &str, funds: u64) -> Account {
        let customer = self
            .core
            .accounts()
            .create_account(&self.client.id, Role::Customer, tag, &format!("{}@example.com", tag))
            .unwrap();
        self.core
            .transfers()
            .transfer(
                &self.client.id,
                &customer.id,
                Amount::from_major(funds),
                TransferKind::Seed,
                &self.client.id,
            )
            .unwrap();
        customer
    }
}
