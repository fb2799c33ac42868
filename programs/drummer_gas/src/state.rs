use anchor_lang::prelude::*;

use crate::{
    DepositLimitsUpdated, DrumHitRecorded, EmergencyWithdraw, GasDeposited, GasError,
    GasPerHitUpdated, GasWithdrawn, OwnershipTransferProposed, OwnershipTransferred, Paused,
    RelayerUpdated, Unpaused, DEFAULT_GAS_PER_HIT, DEFAULT_MAX_DEPOSIT, DEFAULT_MIN_DEPOSIT,
    MAX_ACCURACY,
};

/// Who may invoke an entry point. Checked explicitly by [`GasLedger::authorize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Owner,
    RelayerOrOwner,
    Any,
}

// ══════════════════════════════════════════════════════════════════════════
//  ACCOUNTS
// ══════════════════════════════════════════════════════════════════════════

/// Global ledger PDA. Holds the configuration, the aggregate totals and,
/// physically, every lamport credited to a user.
#[account]
pub struct GasLedger {
    pub owner:              Pubkey,          // 32
    pub relayer:            Pubkey,          // 32
    pub pending_owner:      Option<Pubkey>,  // 1 + 32 = 33
    pub min_deposit:        u64,             // 8
    pub max_deposit:        u64,             // 8
    pub gas_per_hit:        u64,             // 8
    pub paused:             bool,            // 1
    pub hit_counter:        u64,             // 8 — last issued hit id
    pub total_balance_held: u64,             // 8
    pub bump:               u8,              // 1
}
impl GasLedger { pub const LEN: usize = 32 + 32 + 33 + 8 + 8 + 8 + 1 + 8 + 8 + 1; }

/// Per-user gas credit. Created lazily by the first deposit.
#[account]
#[derive(Default)]
pub struct UserAccount {
    pub user:        Pubkey,  // 32
    pub balance:     u64,     // 8
    pub hit_count:   u64,     // 8
    pub total_score: u128,    // 16
    pub bump:        u8,      // 1
}
impl UserAccount { pub const LEN: usize = 32 + 8 + 8 + 16 + 1; }

// ── Read models (returned through instruction return data) ────────────────

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserStats {
    pub balance:     u64,
    pub hit_count:   u64,
    pub total_score: u128,
}

impl UserStats {
    /// Unknown users read as all-zero.
    pub fn of(account: Option<&UserAccount>) -> Self {
        account
            .map(|a| UserStats {
                balance:     a.balance,
                hit_count:   a.hit_count,
                total_score: a.total_score,
            })
            .unwrap_or_default()
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContractStats {
    pub total_hits:    u64,
    pub total_balance: u64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DepositLimits {
    pub min: u64,
    pub max: u64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    pub owner:       Pubkey,
    pub relayer:     Pubkey,
    pub gas_per_hit: u64,
    pub paused:      bool,
    pub hit_counter: u64,
}

// ══════════════════════════════════════════════════════════════════════════
//  TRANSITIONS
// ══════════════════════════════════════════════════════════════════════════
//
// Every transition validates first, computes every new value second and
// writes last, so a failed call leaves both structs untouched. Handlers move
// lamports out of the PDA only after the transition has been applied.

impl GasLedger {
    pub fn init(&mut self, owner: Pubkey, relayer: Pubkey, bump: u8) {
        self.owner              = owner;
        self.relayer            = relayer;
        self.pending_owner      = None;
        self.min_deposit        = DEFAULT_MIN_DEPOSIT;
        self.max_deposit        = DEFAULT_MAX_DEPOSIT;
        self.gas_per_hit        = DEFAULT_GAS_PER_HIT;
        self.paused             = false;
        self.hit_counter        = 0;
        self.total_balance_held = 0;
        self.bump               = bump;
    }

    pub fn authorize(&self, caller: &Pubkey, role: Role) -> Result<()> {
        match role {
            Role::Any => {}
            Role::Owner => {
                require_keys_eq!(*caller, self.owner, GasError::OnlyOwner);
            }
            Role::RelayerOrOwner => {
                require!(
                    *caller == self.relayer || *caller == self.owner,
                    GasError::OnlyRelayerOrOwner
                );
            }
        }
        Ok(())
    }

    fn when_not_paused(&self) -> Result<()> {
        require!(!self.paused, GasError::EnforcedPause);
        Ok(())
    }

    fn when_paused(&self) -> Result<()> {
        require!(self.paused, GasError::ExpectedPause);
        Ok(())
    }

    // ── Deposit ───────────────────────────────────────────────────

    /// Checks that can run before any lamports move.
    pub fn check_deposit(&self, amount: u64) -> Result<()> {
        self.when_not_paused()?;
        require!(amount >= self.min_deposit, GasError::DepositTooSmall);
        require!(amount <= self.max_deposit, GasError::DepositTooLarge);
        Ok(())
    }

    /// `received` is the lamport delta the ledger PDA actually observed.
    pub fn deposit(
        &mut self,
        account:  &mut UserAccount,
        user:     Pubkey,
        amount:   u64,
        received: u64,
        now:      i64,
    ) -> Result<GasDeposited> {
        self.check_deposit(amount)?;
        require!(received == amount, GasError::AmountMismatch);

        let balance = account.balance.checked_add(amount).ok_or(GasError::ArithmeticOverflow)?;
        let held    = self.total_balance_held.checked_add(amount).ok_or(GasError::ArithmeticOverflow)?;

        account.user            = user;
        account.balance         = balance;
        self.total_balance_held = held;

        Ok(GasDeposited { user, amount, timestamp: now })
    }

    // ── Withdraw ──────────────────────────────────────────────────

    pub fn withdraw(&mut self, account: &mut UserAccount, amount: u64, now: i64) -> Result<GasWithdrawn> {
        self.when_not_paused()?;
        require!(amount > 0, GasError::AmountMustBePositive);
        require!(amount <= account.balance, GasError::InsufficientBalance);

        let held = self.total_balance_held.checked_sub(amount).ok_or(GasError::AccountingBroken)?;

        account.balance        -= amount;
        self.total_balance_held = held;

        Ok(GasWithdrawn { user: account.user, amount, timestamp: now })
    }

    // ── Record hit ────────────────────────────────────────────────

    /// Debits `gas_per_hit` and credits `accuracy * combo` to the score.
    /// A user without an account has no gas to spend.
    pub fn record_hit(
        &mut self,
        caller:   &Pubkey,
        account:  Option<&mut UserAccount>,
        accuracy: u8,
        combo:    u64,
        now:      i64,
    ) -> Result<DrumHitRecorded> {
        self.when_not_paused()?;
        self.authorize(caller, Role::RelayerOrOwner)?;
        require!(accuracy <= MAX_ACCURACY, GasError::InvalidAccuracy);
        require!(combo >= 1,               GasError::InvalidCombo);

        let account = match account {
            Some(a) if a.balance >= self.gas_per_hit => a,
            _ => return err!(GasError::InsufficientGasBalance),
        };

        let score       = u128::from(accuracy) * u128::from(combo);
        let hit_id      = self.hit_counter.checked_add(1).ok_or(GasError::ArithmeticOverflow)?;
        let hit_count   = account.hit_count.checked_add(1).ok_or(GasError::ArithmeticOverflow)?;
        let total_score = account.total_score.checked_add(score).ok_or(GasError::ArithmeticOverflow)?;
        let held        = self.total_balance_held
            .checked_sub(self.gas_per_hit)
            .ok_or(GasError::AccountingBroken)?;

        account.balance        -= self.gas_per_hit;
        account.hit_count       = hit_count;
        account.total_score     = total_score;
        self.hit_counter        = hit_id;
        self.total_balance_held = held;

        Ok(DrumHitRecorded { user: account.user, hit_id, accuracy, combo, timestamp: now })
    }

    // ── Emergency unwind ──────────────────────────────────────────

    /// Zeroes the user's balance; the handler pays it back to the user.
    pub fn emergency_withdraw(
        &mut self,
        caller:  &Pubkey,
        account: Option<&mut UserAccount>,
        now:     i64,
    ) -> Result<EmergencyWithdraw> {
        self.authorize(caller, Role::Owner)?;
        self.when_paused()?;

        let account = match account {
            Some(a) if a.balance > 0 => a,
            _ => return err!(GasError::NoBalanceToWithdraw),
        };
        let amount = account.balance;
        let held   = self.total_balance_held.checked_sub(amount).ok_or(GasError::AccountingBroken)?;

        account.balance         = 0;
        self.total_balance_held = held;

        Ok(EmergencyWithdraw { user: account.user, amount, timestamp: now })
    }

    // ── Administration ────────────────────────────────────────────

    pub fn update_relayer(&mut self, caller: &Pubkey, new_relayer: Pubkey) -> Result<RelayerUpdated> {
        self.authorize(caller, Role::Owner)?;
        let old_relayer = self.relayer;
        self.relayer = new_relayer;
        Ok(RelayerUpdated { old_relayer, new_relayer })
    }

    /// No bounds and no pause requirement.
    pub fn update_gas_per_hit(&mut self, caller: &Pubkey, new_gas_per_hit: u64) -> Result<GasPerHitUpdated> {
        self.authorize(caller, Role::Owner)?;
        let old_gas_per_hit = self.gas_per_hit;
        self.gas_per_hit = new_gas_per_hit;
        Ok(GasPerHitUpdated { old_gas_per_hit, new_gas_per_hit })
    }

    pub fn update_deposit_limits(&mut self, caller: &Pubkey, min: u64, max: u64) -> Result<DepositLimitsUpdated> {
        self.authorize(caller, Role::Owner)?;
        require!(min <= max, GasError::InvalidLimits);
        self.min_deposit = min;
        self.max_deposit = max;
        Ok(DepositLimitsUpdated { min, max })
    }

    pub fn pause(&mut self, caller: &Pubkey) -> Result<Paused> {
        self.authorize(caller, Role::Owner)?;
        require!(!self.paused, GasError::AlreadyPaused);
        self.paused = true;
        Ok(Paused { account: *caller })
    }

    pub fn unpause(&mut self, caller: &Pubkey) -> Result<Unpaused> {
        self.authorize(caller, Role::Owner)?;
        require!(self.paused, GasError::AlreadyUnpaused);
        self.paused = false;
        Ok(Unpaused { account: *caller })
    }

    pub fn propose_owner(&mut self, caller: &Pubkey, proposed: Pubkey) -> Result<OwnershipTransferProposed> {
        self.authorize(caller, Role::Owner)?;
        require!(proposed != self.owner,        GasError::InvalidOwner);
        require!(proposed != Pubkey::default(), GasError::InvalidOwner);
        self.pending_owner = Some(proposed);
        Ok(OwnershipTransferProposed { current: self.owner, proposed })
    }

    /// The proposed owner must sign to accept.
    pub fn accept_ownership(&mut self, caller: &Pubkey) -> Result<OwnershipTransferred> {
        let pending = self.pending_owner.ok_or(GasError::NotPendingOwner)?;
        require_keys_eq!(*caller, pending, GasError::NotPendingOwner);
        let previous_owner = self.owner;
        self.owner         = pending;
        self.pending_owner = None;
        Ok(OwnershipTransferred { previous_owner, new_owner: pending })
    }

    // ── Queries ───────────────────────────────────────────────────

    /// Affordability only: ignores pause state and authorization.
    pub fn can_hit(&self, account: Option<&UserAccount>) -> bool {
        UserStats::of(account).balance >= self.gas_per_hit
    }

    pub fn contract_stats(&self) -> ContractStats {
        ContractStats { total_hits: self.hit_counter, total_balance: self.total_balance_held }
    }

    pub fn deposit_limits(&self) -> DepositLimits {
        DepositLimits { min: self.min_deposit, max: self.max_deposit }
    }

    pub fn config(&self) -> LedgerConfig {
        LedgerConfig {
            owner:       self.owner,
            relayer:     self.relayer,
            gas_per_hit: self.gas_per_hit,
            paused:      self.paused,
            hit_counter: self.hit_counter,
        }
    }

    /// Physical lamports above rent must cover every credited balance.
    /// Extra lamports pushed in by a bare system transfer are never credited.
    pub fn check_custody(&self, lamports: u64, rent_exempt_minimum: u64) -> Result<()> {
        let physical = lamports.saturating_sub(rent_exempt_minimum);
        require!(physical >= self.total_balance_held, GasError::AccountingBroken);
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════
//  TESTS
// ══════════════════════════════════════════════════════════════════════════
