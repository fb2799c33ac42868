use anchor_lang::prelude::*;
use anchor_lang::solana_program::system_instruction;
use anchor_lang::solana_program::program::invoke;

pub mod state;

pub use state::*;

declare_id!("C3Um58AggPWi4dmwAJo3c2t2tD4rmdzdBBYu3Bv7Pu1q");

// ── Constants ─────────────────────────────────────────────────────────────
pub const LEDGER_SEED: &[u8] = b"gas_ledger";
pub const USER_SEED:   &[u8] = b"user_gas";

pub const DEFAULT_MIN_DEPOSIT: u64 = 1_000_000;     // 0.001 SOL
pub const DEFAULT_MAX_DEPOSIT: u64 = 1_000_000_000; // 1 SOL
pub const DEFAULT_GAS_PER_HIT: u64 = 80_000;        // lamports debited per hit
pub const MAX_ACCURACY:        u8  = 100;

// Funds enter only through deposit_gas. Fund-moving instructions debit the
// ledger state before lamports leave the PDA, then re-check custody.
//
// Hit debits reimburse whoever submitted the hit (relayer or owner), so the
// debited lamports leave custody together with the accounting entry.

#[program]
pub mod drummer_gas {
    use super::*;

    // ── Initialize ────────────────────────────────────────────────
    pub fn initialize(ctx: Context<Initialize>, relayer: Pubkey) -> Result<()> {
        let owner = ctx.accounts.owner.key();
        ctx.accounts.ledger.init(owner, relayer, ctx.bumps.ledger);
        msg!("Gas ledger initialized: owner {} relayer {}", owner, relayer);
        Ok(())
    }

    // ── Deposit gas credit ────────────────────────────────────────
    pub fn deposit_gas(ctx: Context<DepositGas>, amount: u64) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        ctx.accounts.ledger.check_deposit(amount)?;

        let user_key  = ctx.accounts.user.key();
        let ledger_ai = ctx.accounts.ledger.to_account_info();
        let before    = ledger_ai.lamports();

        let ix = system_instruction::transfer(&user_key, ledger_ai.key, amount);
        invoke(&ix, &[
            ctx.accounts.user.to_account_info(),
            ledger_ai.clone(),
        ])?;
        let received = ledger_ai.lamports().saturating_sub(before);

        let ledger  = &mut ctx.accounts.ledger;
        let account = &mut ctx.accounts.user_account;
        account.bump = ctx.bumps.user_account;
        let event = ledger.deposit(account, user_key, amount, received, now)?;

        verify_custody(ledger, &ledger_ai)?;
        emit!(event);
        Ok(())
    }

    // ── Withdraw gas credit ───────────────────────────────────────
    pub fn withdraw_gas(ctx: Context<WithdrawGas>, amount: u64) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let ledger_ai = ctx.accounts.ledger.to_account_info();
        let user_ai   = ctx.accounts.user.to_account_info();

        let ledger  = &mut ctx.accounts.ledger;
        let account = &mut ctx.accounts.user_account;
        let event = ledger.withdraw(account, amount, now)?;

        **ledger_ai.try_borrow_mut_lamports()? -= amount;
        **user_ai.try_borrow_mut_lamports()?   += amount;

        verify_custody(ledger, &ledger_ai)?;
        emit!(event);
        Ok(())
    }

    // ── Record a drum hit (relayer or owner) ──────────────────────
    pub fn record_drum_hit(
        ctx:      Context<RecordDrumHit>,
        _user:    Pubkey,
        accuracy: u8,
        combo:    u64,
    ) -> Result<u64> {
        let now = Clock::get()?.unix_timestamp;
        let caller    = ctx.accounts.caller.key();
        let caller_ai = ctx.accounts.caller.to_account_info();
        let ledger_ai = ctx.accounts.ledger.to_account_info();

        let ledger  = &mut ctx.accounts.ledger;
        let account = ctx.accounts.user_account.as_deref_mut();
        let debit   = ledger.gas_per_hit;
        let event = ledger.record_hit(&caller, account, accuracy, combo, now)?;

        if debit > 0 {
            **ledger_ai.try_borrow_mut_lamports()? -= debit;
            **caller_ai.try_borrow_mut_lamports()? += debit;
        }

        verify_custody(ledger, &ledger_ai)?;
        let hit_id = event.hit_id;
        emit!(event);
        Ok(hit_id)
    }

    // ── Queries (return data only) ────────────────────────────────
    pub fn get_user_stats(ctx: Context<UserView>, _user: Pubkey) -> Result<UserStats> {
        Ok(UserStats::of(ctx.accounts.user_account.as_deref()))
    }

    pub fn can_hit(ctx: Context<UserView>, _user: Pubkey) -> Result<bool> {
        Ok(ctx.accounts.ledger.can_hit(ctx.accounts.user_account.as_deref()))
    }

    pub fn get_contract_stats(ctx: Context<LedgerView>) -> Result<ContractStats> {
        Ok(ctx.accounts.ledger.contract_stats())
    }

    pub fn get_deposit_limits(ctx: Context<LedgerView>) -> Result<DepositLimits> {
        Ok(ctx.accounts.ledger.deposit_limits())
    }

    pub fn get_config(ctx: Context<LedgerView>) -> Result<LedgerConfig> {
        Ok(ctx.accounts.ledger.config())
    }

    // ── Admin: relayer & economics ────────────────────────────────
    pub fn update_relayer(ctx: Context<AdminOnly>, new_relayer: Pubkey) -> Result<()> {
        let owner = ctx.accounts.owner.key();
        let event = ctx.accounts.ledger.update_relayer(&owner, new_relayer)?;
        msg!("Relayer updated: {} → {}", event.old_relayer, event.new_relayer);
        emit!(event);
        Ok(())
    }

    pub fn update_gas_per_hit(ctx: Context<AdminOnly>, new_gas_per_hit: u64) -> Result<()> {
        let owner = ctx.accounts.owner.key();
        let event = ctx.accounts.ledger.update_gas_per_hit(&owner, new_gas_per_hit)?;
        msg!("Gas per hit: {} → {}", event.old_gas_per_hit, event.new_gas_per_hit);
        emit!(event);
        Ok(())
    }

    pub fn update_deposit_limits(ctx: Context<AdminOnly>, min: u64, max: u64) -> Result<()> {
        let owner = ctx.accounts.owner.key();
        let event = ctx.accounts.ledger.update_deposit_limits(&owner, min, max)?;
        emit!(event);
        Ok(())
    }

    // ── Admin: circuit breaker ────────────────────────────────────
    pub fn pause(ctx: Context<AdminOnly>) -> Result<()> {
        let owner = ctx.accounts.owner.key();
        let event = ctx.accounts.ledger.pause(&owner)?;
        msg!("Ledger paused by {}", owner);
        emit!(event);
        Ok(())
    }

    pub fn unpause(ctx: Context<AdminOnly>) -> Result<()> {
        let owner = ctx.accounts.owner.key();
        let event = ctx.accounts.ledger.unpause(&owner)?;
        msg!("Ledger unpaused by {}", owner);
        emit!(event);
        Ok(())
    }

    // ── Emergency unwind (paused only, funds go back to the user) ─
    pub fn emergency_withdraw(ctx: Context<EmergencyWithdrawCtx>, _user: Pubkey) -> Result<()> {
        let now = Clock::get()?.unix_timestamp;
        let owner     = ctx.accounts.owner.key();
        let ledger_ai = ctx.accounts.ledger.to_account_info();
        let user_ai   = ctx.accounts.recipient.to_account_info();

        let ledger  = &mut ctx.accounts.ledger;
        let account = ctx.accounts.user_account.as_deref_mut();
        let event = ledger.emergency_withdraw(&owner, account, now)?;

        **ledger_ai.try_borrow_mut_lamports()? -= event.amount;
        **user_ai.try_borrow_mut_lamports()?   += event.amount;

        verify_custody(ledger, &ledger_ai)?;
        msg!("Emergency withdraw: {} lamports returned to {}", event.amount, event.user);
        emit!(event);
        Ok(())
    }

    // ── Ownership transfer (two-step) ─────────────────────────────
    pub fn propose_owner(ctx: Context<AdminOnly>, new_owner: Pubkey) -> Result<()> {
        let owner = ctx.accounts.owner.key();
        let event = ctx.accounts.ledger.propose_owner(&owner, new_owner)?;
        emit!(event);
        Ok(())
    }

    pub fn accept_ownership(ctx: Context<AcceptOwnership>) -> Result<()> {
        let new_owner = ctx.accounts.new_owner.key();
        let event = ctx.accounts.ledger.accept_ownership(&new_owner)?;
        msg!("Ownership transferred: {} → {}", event.previous_owner, event.new_owner);
        emit!(event);
        Ok(())
    }

    // ── Anything that is not a known instruction ──────────────────
    pub fn fallback<'info>(
        _program_id: &Pubkey,
        _accounts:   &'info [AccountInfo<'info>],
        _data:       &[u8],
    ) -> Result<()> {
        err!(GasError::UseDepositInstruction)
    }
}

// ══════════════════════════════════════════════════════════════════════════
//  CONTEXTS
// ══════════════════════════════════════════════════════════════════════════

#[derive(Accounts)]
pub struct Initialize<'info> {
    #[account(init, payer = owner, space = 8 + GasLedger::LEN,
              seeds = [LEDGER_SEED], bump)]
    pub ledger: Account<'info, GasLedger>,
    #[account(mut)] pub owner: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct DepositGas<'info> {
    #[account(mut, seeds = [LEDGER_SEED], bump = ledger.bump)]
    pub ledger: Account<'info, GasLedger>,
    #[account(init_if_needed, payer = user, space = 8 + UserAccount::LEN,
              seeds = [USER_SEED, user.key().as_ref()], bump)]
    pub user_account: Account<'info, UserAccount>,
    #[account(mut)] pub user: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct WithdrawGas<'info> {
    #[account(mut, seeds = [LEDGER_SEED], bump = ledger.bump)]
    pub ledger: Account<'info, GasLedger>,
    #[account(mut, seeds = [USER_SEED, user.key().as_ref()], bump = user_account.bump,
              has_one = user)]
    pub user_account: Account<'info, UserAccount>,
    #[account(mut)] pub user: Signer<'info>,
}

/// `user_account` may be omitted for a user that never deposited.
#[derive(Accounts)]
#[instruction(user: Pubkey)]
pub struct RecordDrumHit<'info> {
    #[account(mut, seeds = [LEDGER_SEED], bump = ledger.bump)]
    pub ledger: Account<'info, GasLedger>,
    #[account(mut, seeds = [USER_SEED, user.as_ref()], bump)]
    pub user_account: Option<Account<'info, UserAccount>>,
    /// Relayer or owner; checked against the ledger in the handler.
    #[account(mut)] pub caller: Signer<'info>,
}

#[derive(Accounts)]
#[instruction(user: Pubkey)]
pub struct UserView<'info> {
    #[account(seeds = [LEDGER_SEED], bump = ledger.bump)]
    pub ledger: Account<'info, GasLedger>,
    #[account(seeds = [USER_SEED, user.as_ref()], bump)]
    pub user_account: Option<Account<'info, UserAccount>>,
}

#[derive(Accounts)]
pub struct LedgerView<'info> {
    #[account(seeds = [LEDGER_SEED], bump = ledger.bump)]
    pub ledger: Account<'info, GasLedger>,
}

/// Ownership is checked in the handler so callers get `OnlyOwner`.
#[derive(Accounts)]
pub struct AdminOnly<'info> {
    #[account(mut, seeds = [LEDGER_SEED], bump = ledger.bump)]
    pub ledger: Account<'info, GasLedger>,
    pub owner: Signer<'info>,
}

#[derive(Accounts)]
#[instruction(user: Pubkey)]
pub struct EmergencyWithdrawCtx<'info> {
    #[account(mut, seeds = [LEDGER_SEED], bump = ledger.bump)]
    pub ledger: Account<'info, GasLedger>,
    #[account(mut, seeds = [USER_SEED, user.as_ref()], bump)]
    pub user_account: Option<Account<'info, UserAccount>>,
    /// CHECK: receives the unwound balance; pinned to the instruction argument.
    #[account(mut, address = user)]
    pub recipient: UncheckedAccount<'info>,
    pub owner: Signer<'info>,
}

#[derive(Accounts)]
pub struct AcceptOwnership<'info> {
    #[account(mut, seeds = [LEDGER_SEED], bump = ledger.bump)]
    pub ledger: Account<'info, GasLedger>,
    /// The proposed owner must sign to accept.
    pub new_owner: Signer<'info>,
}

// ══════════════════════════════════════════════════════════════════════════
//  HELPERS
// ══════════════════════════════════════════════════════════════════════════

/// Custody check against the PDA's physical lamports, net of rent.
fn verify_custody(ledger: &GasLedger, ledger_ai: &AccountInfo) -> Result<()> {
    let rent = Rent::get()?.minimum_balance(ledger_ai.data_len());
    ledger.check_custody(ledger_ai.lamports(), rent)
}

// ══════════════════════════════════════════════════════════════════════════
//  ERRORS & EVENTS
// ══════════════════════════════════════════════════════════════════════════

#[error_code]
pub enum GasError {
    #[msg("Deposit too small")]
    DepositTooSmall,
    #[msg("Deposit too large")]
    DepositTooLarge,
    #[msg("Amount mismatch")]
    AmountMismatch,
    #[msg("Amount must be positive")]
    AmountMustBePositive,
    #[msg("Insufficient balance")]
    InsufficientBalance,
    #[msg("Invalid accuracy (0-100)")]
    InvalidAccuracy,
    #[msg("Invalid combo (must be at least 1)")]
    InvalidCombo,
    #[msg("Invalid limits")]
    InvalidLimits,
    #[msg("No balance to withdraw")]
    NoBalanceToWithdraw,
    #[msg("Invalid owner")]
    InvalidOwner,
    #[msg("Use deposit_gas instruction")]
    UseDepositInstruction,
    #[msg("Only relayer or owner")]
    OnlyRelayerOrOwner,
    #[msg("Only owner")]
    OnlyOwner,
    #[msg("Caller is not the pending owner")]
    NotPendingOwner,
    #[msg("Ledger is paused")]
    EnforcedPause,
    #[msg("Ledger is not paused")]
    ExpectedPause,
    #[msg("Insufficient gas balance")]
    InsufficientGasBalance,
    #[msg("Ledger already paused")]
    AlreadyPaused,
    #[msg("Ledger already unpaused")]
    AlreadyUnpaused,
    #[msg("Arithmetic overflow")]
    ArithmeticOverflow,
    #[msg("Accounting invariant violated")]
    AccountingBroken,
}

/// Coarse failure classes surfaced to relayers and clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    Paused,
    NotPaused,
    InsufficientBalance,
    AlreadyInState,
    Internal,
}

impl GasError {
    pub fn kind(&self) -> ErrorKind {
        use GasError::*;
        match self {
            DepositTooSmall | DepositTooLarge | AmountMismatch | AmountMustBePositive
            | InsufficientBalance | InvalidAccuracy | InvalidCombo | InvalidLimits
            | NoBalanceToWithdraw | InvalidOwner | UseDepositInstruction => ErrorKind::Validation,
            OnlyRelayerOrOwner | OnlyOwner | NotPendingOwner => ErrorKind::Authorization,
            EnforcedPause                                    => ErrorKind::Paused,
            ExpectedPause                                    => ErrorKind::NotPaused,
            InsufficientGasBalance                           => ErrorKind::InsufficientBalance,
            AlreadyPaused | AlreadyUnpaused                  => ErrorKind::AlreadyInState,
            ArithmeticOverflow | AccountingBroken            => ErrorKind::Internal,
        }
    }
}

#[event] pub struct GasDeposited              { pub user: Pubkey, pub amount: u64, pub timestamp: i64 }
#[event] pub struct GasWithdrawn              { pub user: Pubkey, pub amount: u64, pub timestamp: i64 }
#[event] pub struct DrumHitRecorded           { pub user: Pubkey, pub hit_id: u64, pub accuracy: u8, pub combo: u64, pub timestamp: i64 }
#[event] pub struct RelayerUpdated            { pub old_relayer: Pubkey, pub new_relayer: Pubkey }
#[event] pub struct GasPerHitUpdated          { pub old_gas_per_hit: u64, pub new_gas_per_hit: u64 }
#[event] pub struct DepositLimitsUpdated      { pub min: u64, pub max: u64 }
#[event] pub struct Paused                    { pub account: Pubkey }
#[event] pub struct Unpaused                  { pub account: Pubkey }
#[event] pub struct EmergencyWithdraw         { pub user: Pubkey, pub amount: u64, pub timestamp: i64 }
#[event] pub struct OwnershipTransferProposed { pub current: Pubkey, pub proposed: Pubkey }
#[event] pub struct OwnershipTransferred      { pub previous_owner: Pubkey, pub new_owner: Pubkey }
