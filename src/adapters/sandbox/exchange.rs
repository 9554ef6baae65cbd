//! Ref-style exchange for the sandbox.
//!
//! Users deposit tokens with `ft_transfer_call`, swap inside their
//! exchange balance against constant-product pools and `withdraw` back to
//! their wallet. Only simple two-token pools are modeled.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Deserialize;
use serde_json::{json, Value};

use super::Reply;
use crate::domain::units::{FORTY_TGAS, FIVE_TGAS, ONE_YOCTO, STORAGE_DEPOSIT};
use crate::domain::wire::{
    AccountArgs, ExchangeSwapArgs, ExchangeWithdrawArgs, FtOnTransferArgs, FtTransferArgs,
    GetPoolsArgs, GetReturnArgs, PoolInfo, RegisterTokensArgs, StorageBalance, StorageDepositArgs,
    SwapAction, SIMPLE_POOL,
};
use crate::domain::{
    AccountId, Balance, CallContext, CallGraph, CallOutcome, FunctionCall, OutboundCall, PoolId,
    PromiseResult, U128,
};

/// Fee denominator; pool fees are in basis points.
pub const FEE_DIVISOR: u32 = 10_000;

/// `a * b / c` without intermediate overflow.
pub fn mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    const MASK: u128 = u64::MAX as u128;
    if c == 0 {
        return None;
    }
    if let Some(p) = a.checked_mul(b) {
        return Some(p / c);
    }

    let (a_hi, a_lo) = (a >> 64, a & MASK);
    let (b_hi, b_lo) = (b >> 64, b & MASK);
    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;
    let mid = (ll >> 64) + (lh & MASK) + (hl & MASK);
    let lo = (ll & MASK) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    if hi >= c {
        return None;
    }

    // Long division of (hi, lo) by c; rem < c throughout.
    let mut rem = hi;
    let mut quotient = 0u128;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quotient |= 1;
        }
    }
    Some(quotient)
}

/// Two-token constant-product pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub tokens: [AccountId; 2],
    pub reserves: [Balance; 2],
    /// Fee in basis points.
    pub total_fee: u32,
    pub shares_total_supply: Balance,
}

impl Pool {
    fn index_of(&self, token: &AccountId) -> Option<usize> {
        self.tokens.iter().position(|t| t == token)
    }

    /// Output of swapping `amount_in` of `token_in` for `token_out`.
    pub fn get_return(
        &self,
        token_in: &AccountId,
        amount_in: Balance,
        token_out: &AccountId,
    ) -> anyhow::Result<Balance> {
        let i = self
            .index_of(token_in)
            .ok_or_else(|| anyhow::anyhow!("E12: token {token_in} not in pool"))?;
        let o = self
            .index_of(token_out)
            .ok_or_else(|| anyhow::anyhow!("E12: token {token_out} not in pool"))?;
        anyhow::ensure!(i != o, "E31: token_in and token_out are the same");
        anyhow::ensure!(
            self.reserves[i] > 0 && self.reserves[o] > 0,
            "E13: pool has no liquidity"
        );

        let with_fee = amount_in
            .checked_mul(u128::from(FEE_DIVISOR - self.total_fee))
            .ok_or_else(|| anyhow::anyhow!("Swap amount overflows"))?;
        let denominator = self.reserves[i]
            .checked_mul(u128::from(FEE_DIVISOR))
            .and_then(|r| r.checked_add(with_fee))
            .ok_or_else(|| anyhow::anyhow!("Pool reserve overflows"))?;
        mul_div(with_fee, self.reserves[o], denominator)
            .ok_or_else(|| anyhow::anyhow!("Swap return overflows"))
    }

    fn swap(&mut self, action: &SwapAction) -> anyhow::Result<Balance> {
        let out = self.get_return(&action.token_in, action.amount_in.0, &action.token_out)?;
        anyhow::ensure!(
            out >= action.min_amount_out.0,
            "E68: slippage error, got {out}, min {}",
            action.min_amount_out.0
        );
        let i = self.index_of(&action.token_in).unwrap_or(0);
        let o = 1 - i;
        self.reserves[i] += action.amount_in.0;
        self.reserves[o] -= out;
        Ok(out)
    }

    fn info(&self) -> PoolInfo {
        PoolInfo {
            pool_kind: SIMPLE_POOL.to_string(),
            token_account_ids: self.tokens.to_vec(),
            amounts: self.reserves.iter().map(|r| U128(*r)).collect(),
            total_fee: self.total_fee,
            shares_total_supply: U128(self.shares_total_supply),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostWithdrawArgs {
    token_id: AccountId,
    sender_id: AccountId,
    amount: U128,
}

#[derive(Debug, Deserialize)]
struct PoolArgs {
    pool_id: PoolId,
}

/// Exchange state.
#[derive(Debug, Clone, Default)]
pub struct Exchange {
    pools: Vec<Pool>,
    /// Registered accounts and their internal token balances.
    deposits: HashMap<AccountId, BTreeMap<AccountId, Balance>>,
    whitelist: BTreeSet<AccountId>,
}

impl Exchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pool; returns its id.
    pub fn add_pool(&mut self, pool: Pool) -> PoolId {
        self.pools.push(pool);
        (self.pools.len() - 1) as PoolId
    }

    pub fn whitelist(&mut self, token: AccountId) {
        self.whitelist.insert(token);
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    /// Internal balance of `token` held for `account`.
    pub fn deposit_of(&self, account: &AccountId, token: &AccountId) -> Balance {
        self.deposits
            .get(account)
            .and_then(|d| d.get(token))
            .copied()
            .unwrap_or(0)
    }

    fn account_mut(&mut self, account: &AccountId) -> anyhow::Result<&mut BTreeMap<AccountId, Balance>> {
        self.deposits
            .get_mut(account)
            .ok_or_else(|| anyhow::anyhow!("E10: account {account} not registered"))
    }

    fn credit(&mut self, account: &AccountId, token: &AccountId, amount: Balance) -> anyhow::Result<()> {
        let balance = self.account_mut(account)?.entry(token.clone()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Deposit overflows"))?;
        Ok(())
    }

    fn debit(&mut self, account: &AccountId, token: &AccountId, amount: Balance) -> anyhow::Result<()> {
        let balance = self
            .account_mut(account)?
            .get_mut(token)
            .ok_or_else(|| anyhow::anyhow!("E11: token {token} not registered for {account}"))?;
        anyhow::ensure!(*balance >= amount, "E22: not enough tokens in deposit");
        *balance -= amount;
        Ok(())
    }

    fn pool(&self, pool_id: PoolId) -> anyhow::Result<&Pool> {
        usize::try_from(pool_id)
            .ok()
            .and_then(|i| self.pools.get(i))
            .ok_or_else(|| anyhow::anyhow!("E85: invalid pool id {pool_id}"))
    }

    pub fn call(&mut self, ctx: &CallContext, call: &FunctionCall) -> anyhow::Result<Reply> {
        match call.method_name.as_str() {
            "storage_deposit" => {
                let args: StorageDepositArgs = call.args_json()?;
                let account = args.account_id.unwrap_or_else(|| ctx.predecessor.clone());
                let refund = if self.deposits.contains_key(&account) {
                    ctx.attached_deposit
                } else {
                    anyhow::ensure!(
                        ctx.attached_deposit >= STORAGE_DEPOSIT,
                        "E11: insufficient $NEAR storage deposit"
                    );
                    self.deposits.insert(account, BTreeMap::new());
                    ctx.attached_deposit - STORAGE_DEPOSIT
                };
                Ok(Reply::refund(
                    CallOutcome::json(&StorageBalance {
                        total: U128(STORAGE_DEPOSIT),
                        available: U128(0),
                    }),
                    refund,
                ))
            }
            "register_tokens" => {
                ctx.assert_one_yocto()?;
                let args: RegisterTokensArgs = call.args_json()?;
                let account = self.account_mut(&ctx.predecessor)?;
                for token in args.token_ids {
                    account.entry(token).or_insert(0);
                }
                Ok(Reply::value(CallOutcome::empty()))
            }
            "ft_on_transfer" => {
                let args: FtOnTransferArgs = call.args_json()?;
                self.credit(&args.sender_id, &ctx.predecessor, args.amount.0)?;
                Ok(Reply::value(CallOutcome::json(&U128(0))))
            }
            "swap" => {
                ctx.assert_one_yocto()?;
                let args: ExchangeSwapArgs = call.args_json()?;
                let out = self.swap(&ctx.predecessor, &args.actions)?;
                Ok(Reply::value(CallOutcome::json(&U128(out))))
            }
            "withdraw" => {
                ctx.assert_one_yocto()?;
                let args: ExchangeWithdrawArgs = call.args_json()?;
                anyhow::ensure!(args.amount.0 > 0, "E29: illegal withdraw amount");
                self.debit(&ctx.predecessor, &args.token_id, args.amount.0)?;
                let graph = withdraw_chain(ctx, &args)?;
                Ok(Reply::value(CallOutcome::Promise(graph)))
            }
            "exchange_callback_post_withdraw" => {
                ctx.assert_private("exchange_callback_post_withdraw")?;
                let args: PostWithdrawArgs = call.args_json()?;
                if !matches!(ctx.promise_results.first(), Some(PromiseResult::Successful(_))) {
                    // Transfer failed: the tokens never left, put them back.
                    self.credit(&args.sender_id, &args.token_id, args.amount.0)?;
                }
                Ok(Reply::value(CallOutcome::empty()))
            }
            view => {
                let args: Value = call.args_json()?;
                self.view(view, args).map(|v| Reply::value(CallOutcome::json(&v)))
            }
        }
    }

    /// Run a chain of swap actions inside `account`'s deposits. Returns
    /// the output of the last action.
    fn swap(&mut self, account: &AccountId, actions: &[SwapAction]) -> anyhow::Result<Balance> {
        anyhow::ensure!(!actions.is_empty(), "E24: no swap actions");
        let mut out = 0;
        for action in actions {
            self.debit(account, &action.token_in, action.amount_in.0)?;
            let pool_id = usize::try_from(action.pool_id).unwrap_or(usize::MAX);
            let pool = self
                .pools
                .get_mut(pool_id)
                .ok_or_else(|| anyhow::anyhow!("E85: invalid pool id {}", action.pool_id))?;
            out = pool.swap(action)?;
            self.credit(account, &action.token_out, out)?;
        }
        Ok(out)
    }

    pub fn view(&self, method: &str, args: Value) -> anyhow::Result<Value> {
        let value = match method {
            "get_return" => {
                let args: GetReturnArgs = serde_json::from_value(args)?;
                let out = self
                    .pool(args.pool_id)?
                    .get_return(&args.token_in, args.amount_in.0, &args.token_out)?;
                json!(U128(out))
            }
            "get_number_of_pools" => json!(self.pools.len() as u64),
            "get_pools" => {
                let args: GetPoolsArgs = serde_json::from_value(args)?;
                let from = usize::try_from(args.from_index).unwrap_or(usize::MAX);
                let limit = usize::try_from(args.limit).unwrap_or(usize::MAX);
                let page: Vec<PoolInfo> = self.pools.iter().skip(from).take(limit).map(Pool::info).collect();
                json!(page)
            }
            "get_pool" => {
                let args: PoolArgs = serde_json::from_value(args)?;
                json!(self.pool(args.pool_id)?.info())
            }
            "get_whitelisted_tokens" => json!(self.whitelist),
            "get_deposits" => {
                let args: AccountArgs = serde_json::from_value(args)?;
                let deposits: BTreeMap<&AccountId, U128> = self
                    .deposits
                    .get(&args.account_id)
                    .map(|d| d.iter().map(|(t, b)| (t, U128(*b))).collect())
                    .unwrap_or_default();
                json!(deposits)
            }
            "storage_balance_of" => {
                let args: AccountArgs = serde_json::from_value(args)?;
                if self.deposits.contains_key(&args.account_id) {
                    json!(StorageBalance {
                        total: U128(STORAGE_DEPOSIT),
                        available: U128(0),
                    })
                } else {
                    Value::Null
                }
            }
            other => anyhow::bail!("Method {other} not found"),
        };
        Ok(value)
    }
}

/// `ft_transfer` to the caller, then re-credit on failure.
fn withdraw_chain(ctx: &CallContext, args: &ExchangeWithdrawArgs) -> anyhow::Result<CallGraph> {
    let transfer = FunctionCall::json(
        "ft_transfer",
        &FtTransferArgs {
            receiver_id: ctx.predecessor.clone(),
            amount: args.amount,
            memo: None,
        },
        ONE_YOCTO,
        FORTY_TGAS,
    )?;
    let post = FunctionCall::json(
        "exchange_callback_post_withdraw",
        &json!({
            "token_id": args.token_id,
            "sender_id": ctx.predecessor,
            "amount": args.amount,
        }),
        0,
        FIVE_TGAS,
    )?;

    let mut graph = CallGraph::new();
    let sent = graph.spawn(OutboundCall::new(args.token_id.clone()).function_call(transfer));
    graph.then(&sent, OutboundCall::new(ctx.current_account.clone()).function_call(post));
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acc(s: &str) -> AccountId {
        s.parse().unwrap()
    }

    fn pool(a: Balance, b: Balance) -> Pool {
        Pool {
            tokens: [acc("wrap.testnet"), acc("a.testnet")],
            reserves: [a, b],
            total_fee: 30,
            shares_total_supply: 1,
        }
    }

    #[test]
    fn test_mul_div_matches_narrow_math() {
        assert_eq!(mul_div(6, 7, 4), Some(10));
        assert_eq!(mul_div(1, 1, 0), None);
    }

    #[test]
    fn test_mul_div_wide_product() {
        let a = 10_u128.pow(30);
        let b = 10_u128.pow(24);
        assert_eq!(mul_div(a, b, 10_u128.pow(30)), Some(b));
        assert_eq!(mul_div(u128::MAX, 2, 4), Some(u128::MAX / 2));
        assert_eq!(mul_div(u128::MAX, u128::MAX, 1), None);
    }

    #[test]
    fn test_constant_product_return() {
        let p = pool(1_000, 1_000);
        // 5 * 9970 * 1000 / (1000 * 10000 + 5 * 9970)
        let out = p
            .get_return(&acc("wrap.testnet"), 5, &acc("a.testnet"))
            .unwrap();
        assert_eq!(out, 4);
        assert!(p.get_return(&acc("wrap.testnet"), 5, &acc("b.testnet")).is_err());
    }

    #[test]
    fn test_swap_moves_deposits_and_reserves() {
        let mut ex = Exchange::new();
        ex.add_pool(pool(1_000, 1_000));
        let user = acc("idx.testnet");
        ex.deposits.insert(user.clone(), BTreeMap::new());
        ex.credit(&user, &acc("wrap.testnet"), 10).unwrap();

        let out = ex
            .swap(
                &user,
                &[SwapAction {
                    pool_id: 0,
                    token_in: acc("wrap.testnet"),
                    amount_in: U128(10),
                    token_out: acc("a.testnet"),
                    min_amount_out: U128(0),
                }],
            )
            .unwrap();
        assert_eq!(ex.deposit_of(&user, &acc("a.testnet")), out);
        assert_eq!(ex.deposit_of(&user, &acc("wrap.testnet")), 0);
        assert_eq!(ex.pools()[0].reserves, [1_010, 1_000 - out]);
    }
}
