/// Leverage ladder keyed to the composite quality score: high-quality setups
/// earn more leverage, everything below 4.0 stays near flat.
pub fn leverage_for_score(score: f64) -> u32 {
    if score >= 9.0 {
        20
    } else if score >= 8.0 {
        15
    } else if score >= 7.0 {
        10
    } else if score >= 6.0 {
        8
    } else if score >= 5.0 {
        5
    } else if score >= 4.0 {
        3
    } else {
        2
    }
}

/// Order notional from account balance and a per-trade risk estimate.
///
/// Base allocation is 5% of the balance, scaled down in risky conditions and
/// up slightly in calm ones, clamped to [5 quote units, 10% of balance].
pub fn order_notional(account_balance: f64, risk: f64) -> f64 {
    let base_pct = 5.0;
    let adjusted_pct = if risk > 0.05 {
        base_pct * 0.6
    } else if risk > 0.03 {
        base_pct * 0.8
    } else if risk < 0.01 {
        base_pct * 1.2
    } else {
        base_pct
    };

    let amount = account_balance * (adjusted_pct / 100.0);
    let min_amount = 5.0;
    let max_amount = account_balance * 0.1;
    amount.clamp(min_amount, max_amount.max(min_amount))
}
