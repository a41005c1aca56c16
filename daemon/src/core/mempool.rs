use abacus_common::{crypto::Hash, transaction::Transaction};

/// FIFO buffer of admitted but not yet committed transactions. Submission
/// order is preserved so that earlier transactions win when balances are
/// tight at block assembly.
pub struct Mempool {
    transactions: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self {
            transactions: Vec::new(),
        }
    }

    pub fn push(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.transactions.iter().any(|tx| tx.get_hash() == hash)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Hand the whole queue to block assembly, leaving the pool empty.
    pub fn take(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.transactions)
    }

    /// Put back transactions that were not committed. They keep their
    /// priority over anything admitted in the meantime.
    pub fn restore(&mut self, mut transactions: Vec<Transaction>) {
        transactions.append(&mut self.transactions);
        self.transactions = transactions;
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}
