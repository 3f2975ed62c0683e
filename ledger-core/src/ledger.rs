//! The bilateral mutual-credit ledger.
//!
//! `LedgerStore` is a plain, synchronous data container; it has no
//! internal locking of its own. `Engine` (`lib.rs`) is what wraps it in
//! a single-writer/multiple-reader concurrency contract. Keeping the two
//! separate mirrors a split between pure computation modules and the
//! binary's own I/O, concurrency, and CLI wiring.

use std::collections::{BTreeMap, HashMap};

use ledger_amount::Amount;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::node::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CreditLineId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub u64);

/// A node's sign on its half of an `Account`: each side is `Pos` or `Neg`,
/// never both the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalMult {
    Pos,
    Neg,
}

impl BalMult {
    pub fn as_i64(self) -> i64 {
        match self {
            BalMult::Pos => 1,
            BalMult::Neg => -1,
        }
    }

    pub fn opposite(self) -> BalMult {
        match self {
            BalMult::Pos => BalMult::Neg,
            BalMult::Neg => BalMult::Pos,
        }
    }
}

/// A bilateral mutual-credit relationship between exactly two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub balance: Amount,
    pub active: bool,
    pub created_at: u64,
}

/// One node's view of an `Account`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditLine {
    pub id: CreditLineId,
    pub account: AccountId,
    pub node: NodeId,
    pub bal_mult: BalMult,
    /// Max obligations this node will emit to its partner.
    /// `Amount::Infinity` means "no limit".
    pub limit: Amount,
}

impl CreditLine {
    /// This node's signed balance on the account: `account.balance * bal_mult`.
    pub fn signed_balance(&self, account: &Account) -> Amount {
        account
            .balance
            .checked_mul_small(self.bal_mult.as_i64())
            .expect("bal_mult is ±1, cannot overflow a finite balance")
    }
}

/// A posted change to an `Account`, created only as part of a committed `Payment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub payment: PaymentId,
    pub account: AccountId,
    /// Signed, in the account's sign convention (not the creditline's).
    pub amount: Amount,
    pub new_balance: Amount,
    pub date: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub payer: NodeId,
    pub recipient: NodeId,
    pub amount: Amount,
    pub memo: String,
    pub submitted_at: u64,
    pub last_attempted_at: Option<u64>,
    pub status: PaymentStatus,
}

/// Read-only view of an account from one node's perspective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountView {
    pub account: AccountId,
    pub balance: Amount,
    pub out_limit: Amount,
    pub in_limit: Amount,
    pub bal_mult: BalMult,
}

/// Newest-first view of a posted `Entry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    pub payment: PaymentId,
    pub amount: Amount,
    pub new_balance: Amount,
    pub date: u64,
}

fn canonical_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// The ledger store. Holds nodes, accounts, creditlines, entries, and
/// payments, plus the indices needed for fast bilateral lookups.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LedgerStore {
    next_account_id: u64,
    next_creditline_id: u64,
    next_entry_id: u64,
    next_payment_id: u64,
    pub(crate) nodes: std::collections::BTreeSet<NodeId>,
    pub(crate) accounts: BTreeMap<AccountId, Account>,
    pub(crate) creditlines: BTreeMap<CreditLineId, CreditLine>,
    /// `account -> [pos creditline id, neg creditline id]`.
    pub(crate) creditlines_by_account: BTreeMap<AccountId, [CreditLineId; 2]>,
    /// Canonical node pair -> account, for bilateral lookup.
    pub(crate) account_by_pair: HashMap<(NodeId, NodeId), AccountId>,
    /// Entries for an account, in commit order.
    pub(crate) entries_by_account: BTreeMap<AccountId, Vec<EntryId>>,
    pub(crate) entries: BTreeMap<EntryId, Entry>,
    pub(crate) payments: BTreeMap<PaymentId, Payment>,
}

impl LedgerStore {
    pub fn new() -> Self {
        LedgerStore::default()
    }

    pub fn create_node(&mut self, id: NodeId) {
        self.nodes.insert(id);
    }

    pub fn node_exists(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Remove `n` and all its creditlines. Payments referencing
    /// `n` remain as historical records; their entries are untouched.
    pub fn delete_node(&mut self, n: NodeId) -> LedgerEvent {
        self.nodes.remove(&n);
        let stale: Vec<AccountId> = self
            .creditlines
            .values()
            .filter(|cl| cl.node == n)
            .map(|cl| cl.account)
            .collect();
        for account_id in stale {
            if let Some(ids) = self.creditlines_by_account.remove(&account_id) {
                for id in ids {
                    self.creditlines.remove(&id);
                }
            }
            self.accounts.remove(&account_id);
            self.account_by_pair.retain(|_, v| *v != account_id);
            self.entries_by_account.remove(&account_id);
        }
        LedgerEvent::NodeDeleted { node: n }
    }

    /// Create an account between `n1` and `n2` with its two creditlines.
    /// `n1` gets `bal_mult = +1`.
    pub fn create_account(&mut self, n1: NodeId, n2: NodeId) -> Result<AccountId, LedgerError> {
        if !self.node_exists(n1) {
            return Err(LedgerError::NodeNotFound(n1));
        }
        if !self.node_exists(n2) {
            return Err(LedgerError::NodeNotFound(n2));
        }
        self.next_account_id += 1;
        let account_id = AccountId(self.next_account_id);
        self.accounts.insert(
            account_id,
            Account {
                id: account_id,
                balance: Amount::ZERO,
                active: true,
                created_at: 0,
            },
        );

        self.next_creditline_id += 1;
        let pos_id = CreditLineId(self.next_creditline_id);
        self.next_creditline_id += 1;
        let neg_id = CreditLineId(self.next_creditline_id);

        self.creditlines.insert(
            pos_id,
            CreditLine {
                id: pos_id,
                account: account_id,
                node: n1,
                bal_mult: BalMult::Pos,
                limit: Amount::Infinity,
            },
        );
        self.creditlines.insert(
            neg_id,
            CreditLine {
                id: neg_id,
                account: account_id,
                node: n2,
                bal_mult: BalMult::Neg,
                limit: Amount::Infinity,
            },
        );
        self.creditlines_by_account
            .insert(account_id, [pos_id, neg_id]);
        self.account_by_pair
            .insert(canonical_pair(n1, n2), account_id);
        self.entries_by_account.insert(account_id, Vec::new());
        Ok(account_id)
    }

    /// Unique bilateral lookup.
    pub fn get_account(&self, n1: NodeId, n2: NodeId) -> Option<AccountId> {
        self.account_by_pair.get(&canonical_pair(n1, n2)).copied()
    }

    pub fn get_or_create_account(
        &mut self,
        n1: NodeId,
        n2: NodeId,
    ) -> Result<AccountId, LedgerError> {
        match self.get_account(n1, n2) {
            Some(id) => Ok(id),
            None => self.create_account(n1, n2),
        }
    }

    pub fn account(&self, id: AccountId) -> Result<&Account, LedgerError> {
        self.accounts.get(&id).ok_or(LedgerError::AccountNotFound(id))
    }

    pub fn creditline(&self, id: CreditLineId) -> Result<&CreditLine, LedgerError> {
        self.creditlines
            .get(&id)
            .ok_or(LedgerError::CreditLineNotFound(id))
    }

    /// The creditline `node` owns on its account with `partner`, if any.
    pub fn creditline_of(&self, node: NodeId, partner: NodeId) -> Option<&CreditLine> {
        let account_id = self.get_account(node, partner)?;
        let ids = self.creditlines_by_account.get(&account_id)?;
        ids.iter()
            .map(|id| &self.creditlines[id])
            .find(|cl| cl.node == node)
    }

    /// Both creditlines (this node's, then the partner's) of an account.
    pub fn creditline_pair(&self, account: AccountId) -> Option<(&CreditLine, &CreditLine)> {
        let ids = self.creditlines_by_account.get(&account)?;
        Some((&self.creditlines[&ids[0]], &self.creditlines[&ids[1]]))
    }

    pub fn partner_creditline(&self, cl: &CreditLine) -> &CreditLine {
        let ids = &self.creditlines_by_account[&cl.account];
        ids.iter()
            .map(|id| &self.creditlines[id])
            .find(|other| other.id != cl.id)
            .expect("every account has exactly two creditlines")
    }

    /// All creditlines owned by `node`, used to build the flow graph.
    pub fn iter_creditlines_of(&self, node: NodeId) -> impl Iterator<Item = &CreditLine> {
        self.creditlines.values().filter(move |cl| cl.node == node)
    }

    pub fn iter_all_creditlines(&self) -> impl Iterator<Item = &CreditLine> {
        self.creditlines.values()
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    /// The highest node id currently present, if any (used to resume a
    /// `NodeIdAllocator` after loading a persisted ledger).
    pub fn max_node_id(&self) -> Option<NodeId> {
        self.nodes.iter().next_back().copied()
    }

    /// Sets the recipient-side creditline's `limit` in the endorser↔recipient
    /// account, creating the account if absent. Idempotent.
    pub fn set_credit_limit(
        &mut self,
        endorser: NodeId,
        recipient: NodeId,
        weight: Amount,
    ) -> Result<LedgerEvent, LedgerError> {
        if weight.is_negative() {
            return Err(LedgerError::NegativeLimit { limit: weight });
        }

        let account_id = self.get_or_create_account(endorser, recipient)?;
        let recipient_cl_id = {
            let ids = &self.creditlines_by_account[&account_id];
            ids.iter()
                .copied()
                .find(|id| self.creditlines[id].node == recipient)
                .expect("account always has a creditline for each of its two nodes")
        };

        // The recipient's signed balance must stay within
        // [-new_limit, partner_limit] for the *current* balance.
        let account = &self.accounts[&account_id];
        let recipient_cl = &self.creditlines[&recipient_cl_id];
        let signed_balance = recipient_cl.signed_balance(account);
        if weight != Amount::Infinity {
            let lower_ok = match weight.checked_neg() {
                Ok(neg_limit) => signed_balance >= neg_limit,
                Err(_) => true,
            };
            if !lower_ok {
                return Err(LedgerError::LimitBelowBalance { account: account_id });
            }
        }

        self.creditlines.get_mut(&recipient_cl_id).unwrap().limit = weight;
        Ok(LedgerEvent::CreditLimitChanged {
            account: account_id,
            creditline: recipient_cl_id,
        })
    }

    /// Applies one committed payment's per-creditline flow to account
    /// balances, in deterministic order by account id. All-or-nothing: on
    /// any `LimitCollision`, no balance is left changed.
    pub fn commit_payment(
        &mut self,
        payment: PaymentId,
        mut edge_flows: Vec<(CreditLineId, Amount)>,
        now: u64,
    ) -> Result<LedgerEvent, LedgerError> {
        edge_flows.sort_by_key(|(cl_id, _)| self.creditlines[cl_id].account);

        // Pre-flight: validate every leg's limit before mutating anything,
        // so a failure leaves the store untouched.
        let mut planned: Vec<(AccountId, Amount, Amount)> = Vec::with_capacity(edge_flows.len());
        for &(cl_id, amount) in &edge_flows {
            let cl = self.creditline(cl_id)?;
            let account = self.account(cl.account)?;
            let delta = amount
                .checked_neg()
                .and_then(|neg| neg.checked_mul_small(cl.bal_mult.as_i64()))
                .map_err(LedgerError::from)?;
            let new_balance = account
                .balance
                .checked_add(delta)
                .map_err(LedgerError::from)?;

            if cl.limit != Amount::Infinity {
                let node_signed = new_balance
                    .checked_mul_small(cl.bal_mult.as_i64())
                    .map_err(LedgerError::from)?;
                let neg_limit = cl.limit.checked_neg().map_err(LedgerError::from)?;
                if node_signed < neg_limit {
                    return Err(LedgerError::LimitCollision { account: cl.account });
                }
            }
            let partner = self.partner_creditline(cl);
            if partner.limit != Amount::Infinity {
                let partner_signed = new_balance
                    .checked_mul_small(partner.bal_mult.as_i64())
                    .map_err(LedgerError::from)?;
                let neg_partner_limit = partner.limit.checked_neg().map_err(LedgerError::from)?;
                if partner_signed < neg_partner_limit {
                    return Err(LedgerError::LimitCollision { account: cl.account });
                }
            }
            planned.push((cl.account, delta, new_balance));
        }

        let mut changed_accounts = Vec::with_capacity(planned.len());
        for (account_id, delta, new_balance) in planned {
            let account = self.accounts.get_mut(&account_id).unwrap();
            account.balance = account.balance.checked_add(delta).map_err(LedgerError::from)?;
            debug_assert_eq!(account.balance, new_balance);

            self.next_entry_id += 1;
            let entry_id = EntryId(self.next_entry_id);
            self.entries.insert(
                entry_id,
                Entry {
                    id: entry_id,
                    payment,
                    account: account_id,
                    amount: delta,
                    new_balance,
                    date: now,
                },
            );
            self.entries_by_account
                .entry(account_id)
                .or_default()
                .push(entry_id);
            changed_accounts.push(account_id);
        }

        changed_accounts.sort();
        changed_accounts.dedup();
        Ok(LedgerEvent::PaymentCommitted {
            payment,
            accounts: changed_accounts,
        })
    }

    /// Direct-entry commit: posts a single entry on the payer↔recipient
    /// account, bypassing the per-edge limit check. Returns the account id
    /// so the caller can patch the graph cache.
    pub fn commit_direct_entry(
        &mut self,
        payment: PaymentId,
        payer: NodeId,
        recipient: NodeId,
        amount: Amount,
        now: u64,
    ) -> Result<(AccountId, LedgerEvent), LedgerError> {
        let account_id = self.get_or_create_account(payer, recipient)?;
        let payer_cl = self
            .creditline_of(payer, recipient)
            .expect("just created or fetched this account")
            .clone();
        let delta = amount
            .checked_neg()
            .and_then(|neg| neg.checked_mul_small(payer_cl.bal_mult.as_i64()))
            .map_err(LedgerError::from)?;

        let account = self.accounts.get_mut(&account_id).unwrap();
        account.balance = account.balance.checked_add(delta).map_err(LedgerError::from)?;
        let new_balance = account.balance;

        self.next_entry_id += 1;
        let entry_id = EntryId(self.next_entry_id);
        self.entries.insert(
            entry_id,
            Entry {
                id: entry_id,
                payment,
                account: account_id,
                amount: delta,
                new_balance,
                date: now,
            },
        );
        self.entries_by_account
            .entry(account_id)
            .or_default()
            .push(entry_id);

        Ok((
            account_id,
            LedgerEvent::PaymentCommitted {
                payment,
                accounts: vec![account_id],
            },
        ))
    }

    /// Allocates and registers a new `Payment`. Rejects any `amount` that
    /// is not finite and strictly positive, since a payment of zero moves
    /// nothing and a negative amount would invert payer and recipient once
    /// it reaches the router's signed demand vector.
    pub fn create_payment(
        &mut self,
        payer: NodeId,
        recipient: NodeId,
        amount: Amount,
        memo: String,
        now: u64,
    ) -> Result<PaymentId, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositivePaymentAmount { amount });
        }

        self.next_payment_id += 1;
        let id = PaymentId(self.next_payment_id);
        self.payments.insert(
            id,
            Payment {
                id,
                payer,
                recipient,
                amount,
                memo,
                submitted_at: now,
                last_attempted_at: None,
                status: PaymentStatus::Pending,
            },
        );
        Ok(id)
    }

    pub fn payment(&self, id: PaymentId) -> Result<&Payment, LedgerError> {
        self.payments.get(&id).ok_or(LedgerError::PaymentNotFound(id))
    }

    pub fn payment_mut(&mut self, id: PaymentId) -> Option<&mut Payment> {
        self.payments.get_mut(&id)
    }

    pub fn account_view(&self, a: NodeId, b: NodeId) -> Option<AccountView> {
        let cl = self.creditline_of(a, b)?;
        let account = &self.accounts[&cl.account];
        let in_limit = self.partner_creditline(cl).limit;
        Some(AccountView {
            account: cl.account,
            balance: cl.signed_balance(account),
            out_limit: cl.limit,
            in_limit,
            bal_mult: cl.bal_mult,
        })
    }

    /// Newest-first entries on the account between `a` and `b`, from `a`'s
    /// sign convention.
    pub fn iter_entries_of(&self, a: NodeId, b: NodeId) -> Vec<EntryView> {
        let cl = match self.creditline_of(a, b) {
            Some(cl) => cl,
            None => return Vec::new(),
        };
        let ids = self
            .entries_by_account
            .get(&cl.account)
            .cloned()
            .unwrap_or_default();
        let mult = cl.bal_mult.as_i64();
        ids.into_iter()
            .rev()
            .map(|id| {
                let e = &self.entries[&id];
                EntryView {
                    payment: e.payment,
                    amount: e
                        .amount
                        .checked_mul_small(mult)
                        .expect("bal_mult is ±1"),
                    new_balance: e
                        .new_balance
                        .checked_mul_small(mult)
                        .expect("bal_mult is ±1"),
                    date: e.date,
                }
            })
            .collect()
    }

    pub fn iter_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn iter_entries_of_account(&self, account: AccountId) -> impl Iterator<Item = &Entry> {
        self.entries_by_account
            .get(&account)
            .into_iter()
            .flatten()
            .map(move |id| &self.entries[id])
    }

    pub fn iter_payments(&self) -> impl Iterator<Item = &Payment> {
        self.payments.values()
    }

    pub fn iter_entries_of_payment(&self, payment: PaymentId) -> impl Iterator<Item = &Entry> {
        self.entries.values().filter(move |e| e.payment == payment)
    }
}
