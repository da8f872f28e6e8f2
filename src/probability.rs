/// Implied win probability (percent) of an American money line.
///
/// Negative prices are favorites; zero and positive prices use the underdog formula.
pub fn implied_probability(money_line: i32) -> f64 {
    let ml = money_line as f64;
    let p = if money_line < 0 {
        100.0 * (-ml) / (-ml + 100.0)
    } else {
        100.0 * 100.0 / (ml + 100.0)
    };
    round_to(p, 3)
}

/// Profit on a winning stake at the given price, rounded to cents.
///
/// A zero price takes the favorite branch and divides by zero, so the profit is infinite.
pub fn payout(amount: f64, money_line: i32) -> f64 {
    let ml = money_line as f64;
    let winnings = if money_line > 0 {
        amount * ml / 100.0
    } else {
        amount * 100.0 / ml.abs()
    };
    round_to(winnings, 2)
}

/// Fair money line for a probability in (0, 1). Used to price synthetic games.
pub fn money_line_for(prob: f64) -> i32 {
    let p = prob.clamp(0.01, 0.99);
    if p >= 0.5 {
        -((p / (1.0 - p)) * 100.0).round() as i32
    } else {
        (((1.0 - p) / p) * 100.0).round() as i32
    }
}

/// Rounds half away from zero.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}
