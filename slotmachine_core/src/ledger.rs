use crate::types::{Address, Balance};
use std::collections::HashMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("balance {available} below transfer amount {required}")]
    InsufficientBalance { required: Balance, available: Balance },
    #[error("allowance {available} below transfer amount {required}")]
    InsufficientAllowance { required: Balance, available: Balance },
    #[error("transfer to the zero address")]
    ZeroRecipient,
    #[error("balance overflow")]
    Overflow,
}

/// Token ledger the machine settles against. Every mutating call applies
/// fully or not at all.
pub trait TokenLedger {
    fn balance_of(&self, token: &Address, holder: &Address) -> Balance;

    fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Balance;

    /// Moves `amount` from `owner` to `to`, spending `spender`'s allowance.
    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), LedgerError>;

    /// Moves `amount` out of `from`'s own balance.
    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), LedgerError>;

    /// Raises `spender`'s allowance over `owner` by `amount`. Used to give
    /// back allowance spent by a `transfer_from` whose play is unwound.
    fn increase_allowance(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: Balance,
    ) -> Result<(), LedgerError>;
}

/// Multi-token ledger held in memory. An allowance of `Balance::MAX` is
/// treated as unlimited and never decremented.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedger {
    balances: HashMap<(Address, Address), Balance>,
    allowances: HashMap<(Address, Address, Address), Balance>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, token: &Address, to: &Address, amount: Balance) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroRecipient);
        }
        let balance = self.balance_of(token, to);
        let updated = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        self.balances.insert((*token, *to), updated);
        Ok(())
    }

    pub fn approve(&mut self, token: &Address, owner: &Address, spender: &Address, amount: Balance) {
        self.allowances.insert((*token, *owner, *spender), amount);
    }

    /// Computes both post-transfer balances before writing either.
    fn move_balance(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroRecipient);
        }
        let available = self.balance_of(token, from);
        let debited = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                required: amount,
                available,
            })?;
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(token, to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.balances.insert((*token, *from), debited);
        self.balances.insert((*token, *to), credited);
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn increase_allowance(
        &mut self,
        token: &Address,
        owner: &Address,
        spender: &Address,
        amount: Balance,
    ) -> Result<(), LedgerError> {
        let allowed = self.allowance(token, owner, spender);
        let updated = allowed.checked_add(amount).ok_or(LedgerError::Overflow)?;
        self.allowances.insert((*token, *owner, *spender), updated);
        Ok(())
    }

    fn balance_of(&self, token: &Address, holder: &Address) -> Balance {
        self.balances.get(&(*token, *holder)).copied().unwrap_or(0)
    }

    fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> Balance {
        self.allowances
            .get(&(*token, *owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), LedgerError> {
        let allowed = self.allowance(token, owner, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                required: amount,
                available: allowed,
            });
        }
        self.move_balance(token, owner, to, amount)?;
        if allowed != Balance::MAX {
            self.allowances
                .insert((*token, *owner, *spender), allowed - amount);
        }
        Ok(())
    }

    fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: Balance,
    ) -> Result<(), LedgerError> {
        self.move_balance(token, from, to, amount)
    }
}
